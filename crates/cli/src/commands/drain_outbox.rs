use despesas_engine::{DispatchSettings, DrainReport, OutboxDispatcher};
use despesas_server::notifier::gateway_from_config;

use crate::commands::{open_database, prepare, CommandResult, StepError};

/// Delivers due notifications until a pass comes back short or `max_passes` is hit.
pub fn run(max_passes: u32) -> CommandResult {
    let (config, runtime) = match prepare("drain-outbox") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = open_database(&config).await?;
        let gateway = gateway_from_config(&config.notifications)
            .map_err(|error| ("gateway_init", error.to_string(), 6u8))?;
        let settings = DispatchSettings::from(&config.notifications);
        let batch_size = settings.batch_size;
        let dispatcher = OutboxDispatcher::new(pool.clone(), gateway, settings);

        let mut total = DrainReport::default();
        for _ in 0..max_passes.max(1) {
            let pass = dispatcher
                .drain_once()
                .await
                .map_err(|error| ("outbox_drain", error.to_string(), 7u8))?;
            accumulate(&mut total, pass);
            if pass.claimed < batch_size as usize {
                break;
            }
        }

        pool.close().await;
        Ok::<DrainReport, StepError>(total)
    });

    match result {
        Ok(report) => CommandResult::success("drain-outbox", describe(&report)),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("drain-outbox", error_class, message, exit_code)
        }
    }
}

fn accumulate(total: &mut DrainReport, pass: DrainReport) {
    total.claimed += pass.claimed;
    total.delivered += pass.delivered;
    total.retried += pass.retried;
    total.failed += pass.failed;
}

fn describe(report: &DrainReport) -> String {
    format!(
        "claimed {}, delivered {}, rescheduled {}, failed {}",
        report.claimed, report.delivered, report.retried, report.failed
    )
}
