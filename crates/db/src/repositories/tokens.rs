use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteConnection};

use despesas_core::domain::requisition::RequisitionId;
use despesas_core::token::{EntityKind, VerificationToken};

use super::{format_timestamp, RepositoryError};

pub async fn insert_token(
    conn: &mut SqliteConnection,
    token: &VerificationToken,
    issued_at: DateTime<Utc>,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO verification_token (requisition_id, entity_kind, token, issued_at)
         VALUES (?, ?, ?, ?)",
    )
    .bind(token.requisition_id.0)
    .bind(token.entity_kind.as_str())
    .bind(&token.token)
    .bind(format_timestamp(issued_at))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn find_token(
    conn: &mut SqliteConnection,
    requisition_id: RequisitionId,
) -> Result<Option<VerificationToken>, RepositoryError> {
    let row = sqlx::query(
        "SELECT requisition_id, entity_kind, token FROM verification_token WHERE requisition_id = ?",
    )
    .bind(requisition_id.0)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(|row| {
        let kind_raw = row.try_get::<String, _>("entity_kind")?;
        let entity_kind = EntityKind::parse(&kind_raw)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown entity kind `{kind_raw}`")))?;
        Ok(VerificationToken {
            entity_kind,
            requisition_id: RequisitionId(row.try_get("requisition_id")?),
            token: row.try_get("token")?,
        })
    })
    .transpose()
}
