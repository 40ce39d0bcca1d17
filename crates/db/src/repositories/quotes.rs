use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection};

use despesas_core::domain::quote::{ItemId, Quote, QuoteId, QuoteItem, QuoteStatus};
use despesas_core::domain::requisition::RequisitionId;
use despesas_core::domain::supplier::{Supplier, SupplierId};

use super::{format_timestamp, parse_decimal, parse_timestamp, RepositoryError};

const QUOTE_COLUMNS: &str = "id,
    requisition_id,
    supplier_id,
    total_value,
    status,
    approved_by_managers,
    approved_by_director,
    created_at,
    updated_at";

/// Returns the supplier with exactly this name, creating it on first use.
pub async fn find_or_create_supplier(
    conn: &mut SqliteConnection,
    name: &str,
    now: DateTime<Utc>,
) -> Result<SupplierId, RepositoryError> {
    let existing = sqlx::query("SELECT id FROM supplier WHERE name = ?")
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?;
    if let Some(row) = existing {
        return Ok(SupplierId(row.try_get("id")?));
    }

    let id = sqlx::query("INSERT INTO supplier (name, created_at) VALUES (?, ?)")
        .bind(name)
        .bind(format_timestamp(now))
        .execute(&mut *conn)
        .await?
        .last_insert_rowid();
    Ok(SupplierId(id))
}

pub async fn find_supplier(
    conn: &mut SqliteConnection,
    id: SupplierId,
) -> Result<Option<Supplier>, RepositoryError> {
    let row = sqlx::query("SELECT id, name FROM supplier WHERE id = ?")
        .bind(id.0)
        .fetch_optional(&mut *conn)
        .await?;

    row.map(|row| Ok(Supplier { id: SupplierId(row.try_get("id")?), name: row.try_get("name")? }))
        .transpose()
}

pub async fn insert_item(
    conn: &mut SqliteConnection,
    requisition_id: RequisitionId,
    description: &str,
    quantity: Decimal,
    unit_price: Decimal,
) -> Result<ItemId, RepositoryError> {
    let id = sqlx::query(
        "INSERT INTO item (requisition_id, description, quantity, unit_price) VALUES (?, ?, ?, ?)",
    )
    .bind(requisition_id.0)
    .bind(description)
    .bind(quantity.to_string())
    .bind(unit_price.to_string())
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();
    Ok(ItemId(id))
}

pub async fn insert_quote(
    conn: &mut SqliteConnection,
    requisition_id: RequisitionId,
    supplier_id: SupplierId,
    total_value: Decimal,
    now: DateTime<Utc>,
) -> Result<QuoteId, RepositoryError> {
    let timestamp = format_timestamp(now);
    let id = sqlx::query(
        "INSERT INTO quote (requisition_id, supplier_id, total_value, status, created_at, updated_at)
         VALUES (?, ?, ?, 'pending', ?, ?)",
    )
    .bind(requisition_id.0)
    .bind(supplier_id.0)
    .bind(total_value.to_string())
    .bind(&timestamp)
    .bind(&timestamp)
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();
    Ok(QuoteId(id))
}

pub async fn link_item(
    conn: &mut SqliteConnection,
    quote_id: QuoteId,
    item_id: ItemId,
    unit_price: Decimal,
) -> Result<(), RepositoryError> {
    sqlx::query("INSERT INTO quote_item (quote_id, item_id, unit_price) VALUES (?, ?, ?)")
        .bind(quote_id.0)
        .bind(item_id.0)
        .bind(unit_price.to_string())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Looks the quote up within its requisition; a quote of another requisition is not found.
pub async fn find_quote(
    conn: &mut SqliteConnection,
    requisition_id: RequisitionId,
    quote_id: QuoteId,
) -> Result<Option<Quote>, RepositoryError> {
    let row = sqlx::query(&format!(
        "SELECT {QUOTE_COLUMNS} FROM quote WHERE id = ? AND requisition_id = ?"
    ))
    .bind(quote_id.0)
    .bind(requisition_id.0)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(quote_from_row).transpose()
}

pub async fn list_quotes(
    conn: &mut SqliteConnection,
    requisition_id: RequisitionId,
) -> Result<Vec<Quote>, RepositoryError> {
    let rows = sqlx::query(&format!(
        "SELECT {QUOTE_COLUMNS} FROM quote WHERE requisition_id = ? ORDER BY id ASC"
    ))
    .bind(requisition_id.0)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(quote_from_row).collect()
}

/// The quote the managers locked in, if any.
pub async fn selected_quote(
    conn: &mut SqliteConnection,
    requisition_id: RequisitionId,
) -> Result<Option<Quote>, RepositoryError> {
    let row = sqlx::query(&format!(
        "SELECT {QUOTE_COLUMNS} FROM quote WHERE requisition_id = ? AND status = 'approved'"
    ))
    .bind(requisition_id.0)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(quote_from_row).transpose()
}

/// First-chooser claim: the quote becomes the requisition's selection only if
/// it is still pending and no sibling has been selected. Returns whether this
/// call won.
pub async fn claim_quote(
    conn: &mut SqliteConnection,
    requisition_id: RequisitionId,
    quote_id: QuoteId,
    now: DateTime<Utc>,
) -> Result<bool, RepositoryError> {
    let result = sqlx::query(
        "UPDATE quote
         SET status = 'approved', updated_at = ?
         WHERE id = ?
           AND requisition_id = ?
           AND status = 'pending'
           AND NOT EXISTS (
               SELECT 1 FROM quote AS sibling
               WHERE sibling.requisition_id = ? AND sibling.status = 'approved'
           )",
    )
    .bind(format_timestamp(now))
    .bind(quote_id.0)
    .bind(requisition_id.0)
    .bind(requisition_id.0)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn reject_other_quotes(
    conn: &mut SqliteConnection,
    requisition_id: RequisitionId,
    keep: QuoteId,
    now: DateTime<Utc>,
) -> Result<u64, RepositoryError> {
    let result = sqlx::query(
        "UPDATE quote SET status = 'rejected', updated_at = ?
         WHERE requisition_id = ? AND id <> ? AND status <> 'rejected'",
    )
    .bind(format_timestamp(now))
    .bind(requisition_id.0)
    .bind(keep.0)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

pub async fn reject_all_quotes(
    conn: &mut SqliteConnection,
    requisition_id: RequisitionId,
    now: DateTime<Utc>,
) -> Result<u64, RepositoryError> {
    let result = sqlx::query(
        "UPDATE quote SET status = 'rejected', updated_at = ?
         WHERE requisition_id = ? AND status <> 'rejected'",
    )
    .bind(format_timestamp(now))
    .bind(requisition_id.0)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

pub async fn count_open_quotes(
    conn: &mut SqliteConnection,
    requisition_id: RequisitionId,
) -> Result<i64, RepositoryError> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS count FROM quote WHERE requisition_id = ? AND status <> 'rejected'",
    )
    .bind(requisition_id.0)
    .fetch_one(&mut *conn)
    .await?;
    Ok(row.try_get("count")?)
}

pub async fn mark_manager_consensus(
    conn: &mut SqliteConnection,
    quote_id: QuoteId,
    now: DateTime<Utc>,
) -> Result<bool, RepositoryError> {
    let result = sqlx::query(
        "UPDATE quote SET approved_by_managers = 1, updated_at = ?
         WHERE id = ? AND status = 'approved' AND approved_by_managers = 0",
    )
    .bind(format_timestamp(now))
    .bind(quote_id.0)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn mark_director_approved(
    conn: &mut SqliteConnection,
    quote_id: QuoteId,
    now: DateTime<Utc>,
) -> Result<bool, RepositoryError> {
    let result = sqlx::query(
        "UPDATE quote SET approved_by_director = 1, updated_at = ?
         WHERE id = ? AND status = 'approved' AND approved_by_managers = 1
           AND approved_by_director = 0",
    )
    .bind(format_timestamp(now))
    .bind(quote_id.0)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Items as priced by one quote.
pub async fn list_quote_items(
    conn: &mut SqliteConnection,
    quote_id: QuoteId,
) -> Result<Vec<QuoteItem>, RepositoryError> {
    let rows = sqlx::query(
        "SELECT qi.quote_id, qi.item_id, i.description, i.quantity, qi.unit_price
         FROM quote_item qi
         JOIN item i ON i.id = qi.item_id
         WHERE qi.quote_id = ?
         ORDER BY qi.item_id ASC",
    )
    .bind(quote_id.0)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter()
        .map(|row| {
            Ok(QuoteItem {
                quote_id: QuoteId(row.try_get("quote_id")?),
                item_id: ItemId(row.try_get("item_id")?),
                description: row.try_get("description")?,
                quantity: parse_decimal("quantity", row.try_get("quantity")?)?,
                unit_price: parse_decimal("unit_price", row.try_get("unit_price")?)?,
            })
        })
        .collect()
}

fn quote_from_row(row: SqliteRow) -> Result<Quote, RepositoryError> {
    let status_raw = row.try_get::<String, _>("status")?;
    let status = QuoteStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown quote status `{status_raw}`")))?;

    Ok(Quote {
        id: QuoteId(row.try_get("id")?),
        requisition_id: RequisitionId(row.try_get("requisition_id")?),
        supplier_id: SupplierId(row.try_get("supplier_id")?),
        total_value: parse_decimal("total_value", row.try_get("total_value")?)?,
        status,
        approved_by_managers: row.try_get::<i64, _>("approved_by_managers")? != 0,
        approved_by_director: row.try_get::<i64, _>("approved_by_director")? != 0,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}
