//! Users, roles and the department/manager directory.

use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection};

use despesas_core::domain::actor::{Actor, Role, UserId};
use despesas_core::domain::allocation::{Department, DepartmentId};
use despesas_core::domain::requisition::RequisitionId;
use despesas_core::notification::Recipient;

use super::{format_timestamp, RepositoryError};

pub async fn insert_user(
    conn: &mut SqliteConnection,
    name: &str,
    email: Option<&str>,
    roles: &[Role],
) -> Result<UserId, RepositoryError> {
    let id = sqlx::query("INSERT INTO app_user (name, email, created_at) VALUES (?, ?, ?)")
        .bind(name)
        .bind(email)
        .bind(format_timestamp(Utc::now()))
        .execute(&mut *conn)
        .await?
        .last_insert_rowid();

    for role in roles {
        sqlx::query("INSERT INTO user_role (user_id, role) VALUES (?, ?)")
            .bind(id)
            .bind(role.as_str())
            .execute(&mut *conn)
            .await?;
    }

    Ok(UserId(id))
}

pub async fn user_exists(conn: &mut SqliteConnection, id: UserId) -> Result<bool, RepositoryError> {
    let row = sqlx::query("SELECT 1 FROM app_user WHERE id = ?")
        .bind(id.0)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.is_some())
}

/// Resolves a caller to its roles. `None` when the user does not exist.
pub async fn load_actor(
    conn: &mut SqliteConnection,
    id: UserId,
) -> Result<Option<Actor>, RepositoryError> {
    if !user_exists(conn, id).await? {
        return Ok(None);
    }

    let rows = sqlx::query("SELECT role FROM user_role WHERE user_id = ? ORDER BY role")
        .bind(id.0)
        .fetch_all(&mut *conn)
        .await?;

    let mut roles = Vec::with_capacity(rows.len());
    for row in rows {
        let raw = row.try_get::<String, _>("role")?;
        let role = Role::parse(&raw)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown role `{raw}`")))?;
        roles.push(role);
    }

    Ok(Some(Actor::new(id, roles)))
}

pub async fn recipients(
    conn: &mut SqliteConnection,
    ids: &[UserId],
) -> Result<Vec<Recipient>, RepositoryError> {
    let mut recipients = Vec::with_capacity(ids.len());
    for id in ids {
        let row = sqlx::query("SELECT id, name, email FROM app_user WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&mut *conn)
            .await?;
        if let Some(row) = row {
            recipients.push(Recipient {
                user_id: UserId(row.try_get("id")?),
                name: row.try_get("name")?,
                email: row.try_get("email")?,
            });
        }
    }
    Ok(recipients)
}

pub async fn insert_department(
    conn: &mut SqliteConnection,
    name: &str,
    manager_id: Option<UserId>,
) -> Result<DepartmentId, RepositoryError> {
    let id = sqlx::query("INSERT INTO department (name, manager_id) VALUES (?, ?)")
        .bind(name)
        .bind(manager_id.map(|manager| manager.0))
        .execute(&mut *conn)
        .await?
        .last_insert_rowid();
    Ok(DepartmentId(id))
}

pub async fn find_department(
    conn: &mut SqliteConnection,
    id: DepartmentId,
) -> Result<Option<Department>, RepositoryError> {
    let row = sqlx::query("SELECT id, name, manager_id FROM department WHERE id = ?")
        .bind(id.0)
        .fetch_optional(&mut *conn)
        .await?;

    row.map(department_from_row).transpose()
}

/// Whether `manager_id` currently manages one of the departments sharing the cost.
pub async fn manages_requisition_department(
    conn: &mut SqliteConnection,
    requisition_id: RequisitionId,
    manager_id: UserId,
) -> Result<bool, RepositoryError> {
    let row = sqlx::query(
        "SELECT 1
         FROM requisition_department rd
         JOIN department d ON d.id = rd.department_id
         WHERE rd.requisition_id = ? AND d.manager_id = ?
         LIMIT 1",
    )
    .bind(requisition_id.0)
    .bind(manager_id.0)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.is_some())
}

fn department_from_row(row: SqliteRow) -> Result<Department, RepositoryError> {
    Ok(Department {
        id: DepartmentId(row.try_get("id")?),
        name: row.try_get("name")?,
        manager_id: row.try_get::<Option<i64>, _>("manager_id")?.map(UserId),
    })
}

#[cfg(test)]
mod tests {
    use despesas_core::domain::actor::{Capability, Role, UserId};

    use super::{find_department, load_actor, recipients};
    use crate::repositories::test_support::{department, setup_pool, user};

    #[tokio::test]
    async fn actors_carry_their_stored_roles() {
        let pool = setup_pool().await;
        let mut conn = pool.acquire().await.expect("acquire");

        let id = user(&mut conn, "marta", &[Role::Manager, Role::Master]).await;
        let actor = load_actor(&mut conn, id).await.expect("load").expect("actor exists");

        assert!(actor.can(Capability::Override));
        assert!(actor.has_role(Role::Manager));
        assert!(load_actor(&mut conn, UserId(999)).await.expect("load").is_none());
    }

    #[tokio::test]
    async fn departments_keep_an_optional_manager() {
        let pool = setup_pool().await;
        let mut conn = pool.acquire().await.expect("acquire");

        let manager = user(&mut conn, "joao", &[Role::Manager]).await;
        let staffed = department(&mut conn, "Financeiro", Some(manager)).await;
        let orphan = department(&mut conn, "Almoxarifado", None).await;

        let staffed = find_department(&mut conn, staffed).await.expect("find").expect("exists");
        let orphan = find_department(&mut conn, orphan).await.expect("find").expect("exists");
        assert_eq!(staffed.manager_id, Some(manager));
        assert_eq!(orphan.manager_id, None);
    }

    #[tokio::test]
    async fn recipients_skip_unknown_users() {
        let pool = setup_pool().await;
        let mut conn = pool.acquire().await.expect("acquire");

        let known = user(&mut conn, "rita", &[Role::Director]).await;
        let resolved = recipients(&mut conn, &[known, UserId(404)]).await.expect("resolve");

        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].email.as_deref(), Some("rita@example.test"));
    }
}
