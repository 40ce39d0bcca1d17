use despesas_db::DemoDirectory;

use crate::commands::{open_database, prepare, CommandResult};

pub fn run() -> CommandResult {
    let (config, runtime) = match prepare("seed") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = open_database(&config).await?;

        let seeded = DemoDirectory::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;
        let verification = DemoDirectory::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

        let outcome = if verification.all_present {
            Ok(seed_summary(&seeded.users_seeded, seeded.departments_seeded))
        } else {
            let failed = verification
                .checks
                .iter()
                .filter_map(|(check, passed)| (!passed).then_some(*check))
                .collect::<Vec<_>>();
            Err(("seed_verification", verification_failure(&failed), 6u8))
        };

        pool.close().await;
        outcome
    });

    match result {
        Ok(message) => CommandResult::success("seed", message),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

fn seed_summary(users: &[(i64, &str, &str)], departments: usize) -> String {
    let lines = users
        .iter()
        .map(|(id, name, role)| format!("  - user {id}: {name} ({role})"))
        .collect::<Vec<_>>();
    format!(
        "demo directory loaded ({} users, {departments} departments):\n{}",
        users.len(),
        lines.join("\n")
    )
}

fn verification_failure(failed: &[&str]) -> String {
    if failed.is_empty() {
        "demo directory failed to load".to_string()
    } else {
        format!("demo directory verification failed for: {}", failed.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::{seed_summary, verification_failure};

    #[test]
    fn verification_failure_names_missing_records() {
        assert_eq!(
            verification_failure(&["Marta Reis", "Almoxarifado"]),
            "demo directory verification failed for: Marta Reis, Almoxarifado"
        );
        assert_eq!(verification_failure(&[]), "demo directory failed to load");
    }

    #[test]
    fn summary_lists_each_seeded_user() {
        let summary = seed_summary(&[(1, "Ana Souza", "requester"), (4, "Dora Castro", "director")], 4);

        assert!(summary.starts_with("demo directory loaded (2 users, 4 departments):"));
        assert!(summary.contains("  - user 4: Dora Castro (director)"));
    }
}
