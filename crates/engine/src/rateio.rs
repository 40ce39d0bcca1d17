use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::info;

use despesas_core::domain::quote::{QuoteId, QuoteStatus};
use despesas_core::domain::requisition::RequisitionId;
use despesas_core::errors::{ApplicationError, ConsistencyError, ValidationError};
use despesas_core::rateio::{self, DepartmentCharge};
use despesas_db::repositories::requisitions;
use despesas_db::{begin, commit, DbPool};

use crate::support::{load_quote, load_requisition};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RateioOutcome {
    Allocated(Vec<DepartmentCharge>),
    /// The `rateada` latch was already set; nothing was written.
    AlreadyAllocated,
}

/// Posts an approved quote's value to the departments that share the requisition.
pub struct RateioCalculator {
    pool: DbPool,
}

impl RateioCalculator {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn allocate(
        &self,
        requisition_id: RequisitionId,
        quote_id: QuoteId,
    ) -> Result<RateioOutcome, ApplicationError> {
        let mut tx = begin(&self.pool).await?;
        let outcome = allocate_in(&mut tx, requisition_id, quote_id, Utc::now()).await?;
        commit(tx).await?;
        Ok(outcome)
    }
}

/// Runs the allocation inside the caller's unit of work.
pub(crate) async fn allocate_in(
    conn: &mut SqliteConnection,
    requisition_id: RequisitionId,
    quote_id: QuoteId,
    now: DateTime<Utc>,
) -> Result<RateioOutcome, ApplicationError> {
    let requisition = load_requisition(conn, requisition_id).await?;
    if requisition.rateada {
        return Ok(RateioOutcome::AlreadyAllocated);
    }

    let quote = load_quote(conn, requisition_id, quote_id).await?;
    if quote.status != QuoteStatus::Approved {
        return Err(ValidationError::QuoteNotApproved(quote_id).into());
    }

    let allocations = requisitions::list_allocations(conn, requisition_id).await?;
    let charges = rateio::split(requisition_id, quote.total_value, &allocations)?;

    for charge in &charges {
        requisitions::set_spent_value(conn, requisition_id, charge.department_id, charge.spent_value)
            .await?;
    }
    if !requisitions::latch_rateada(conn, requisition_id, now).await? {
        return Err(ConsistencyError::ConcurrentModification(requisition_id).into());
    }

    info!(
        event_name = "engine.rateio.allocated",
        requisition_id = %requisition_id,
        quote_id = %quote_id,
        departments = charges.len(),
        total = %quote.total_value,
        "quote value allocated across departments"
    );

    Ok(RateioOutcome::Allocated(charges))
}
