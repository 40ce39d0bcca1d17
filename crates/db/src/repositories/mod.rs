//! Transaction-scoped store access.
//!
//! Every function takes the connection of an open unit of work (`&mut *tx`), so
//! an engine operation composes as many reads and writes as it needs and they
//! commit or roll back together. The pool itself is only used by the read side.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use despesas_core::errors::ApplicationError;

pub mod approvals;
pub mod directory;
pub mod outbox;
pub mod quotes;
pub mod read;
pub mod requisitions;
pub mod tokens;

pub use outbox::{OutboxMessage, OutboxStatus};
pub use read::{
    QuoteView, RequisitionFilter, RequisitionReadRepository, RequisitionView,
    SqlRequisitionReadRepository,
};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl RepositoryError {
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Self::Database(sqlx::Error::Database(error)) => error.is_unique_violation(),
            _ => false,
        }
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(error: RepositoryError) -> Self {
        ApplicationError::Persistence(error.to_string())
    }
}

/// RFC 3339 in UTC with fixed precision, so stored timestamps sort as text.
pub fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}

pub(crate) fn parse_decimal(column: &str, value: String) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(&value).map_err(|error| {
        RepositoryError::Decode(format!("invalid decimal in `{column}`: `{value}` ({error})"))
    })
}

pub(crate) fn parse_optional_decimal(
    column: &str,
    value: Option<String>,
) -> Result<Option<Decimal>, RepositoryError> {
    value.map(|decimal| parse_decimal(column, decimal)).transpose()
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{DateTime, Utc};
    use sqlx::SqliteConnection;

    use despesas_core::domain::actor::{Role, UserId};
    use despesas_core::domain::allocation::DepartmentId;

    use super::directory;
    use crate::{connect_with_settings, migrations, DbPool};

    pub async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    pub fn parse_ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid timestamp").with_timezone(&Utc)
    }

    pub async fn user(conn: &mut SqliteConnection, name: &str, roles: &[Role]) -> UserId {
        directory::insert_user(conn, name, Some(&format!("{name}@example.test")), roles)
            .await
            .expect("insert user")
    }

    pub async fn department(
        conn: &mut SqliteConnection,
        name: &str,
        manager: Option<UserId>,
    ) -> DepartmentId {
        directory::insert_department(conn, name, manager).await.expect("insert department")
    }
}
