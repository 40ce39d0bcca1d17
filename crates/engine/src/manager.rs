use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use sqlx::SqliteConnection;
use tracing::info;

use despesas_core::domain::actor::{Capability, UserId};
use despesas_core::domain::approval::{ApprovalOrigin, ManagerApproval};
use despesas_core::domain::quote::{Quote, QuoteId, QuoteStatus};
use despesas_core::domain::requisition::{Requisition, RequisitionId};
use despesas_core::errors::{ApplicationError, ConsistencyError, ValidationError};
use despesas_core::notification::NotificationTemplate;
use despesas_db::repositories::{approvals, directory, quotes, requisitions};
use despesas_db::{begin, commit, DbPool};

use crate::notify::{self, NotificationLinks};
use crate::support::{authorize, ensure_open, load_quote, load_requisition};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ManagerApprovalOutcome {
    pub requisition_id: RequisitionId,
    pub quote_id: QuoteId,
    /// True when this approval was the one that picked the quote.
    pub selected_quote: bool,
    pub approvals: usize,
    pub required: usize,
    pub consensus_reached: bool,
}

/// Collects manager picks and detects when the required set agrees on one quote.
pub struct ManagerApprovalCoordinator {
    pool: DbPool,
    links: NotificationLinks,
}

impl ManagerApprovalCoordinator {
    pub fn new(pool: DbPool, links: NotificationLinks) -> Self {
        Self { pool, links }
    }

    pub async fn approve_quote(
        &self,
        requisition_id: RequisitionId,
        quote_id: QuoteId,
        manager_id: UserId,
    ) -> Result<ManagerApprovalOutcome, ApplicationError> {
        let now = Utc::now();
        let mut tx = begin(&self.pool).await?;

        authorize(&mut tx, manager_id, Capability::ApproveAsManager).await?;
        let requisition = load_requisition(&mut tx, requisition_id).await?;
        ensure_open(&requisition)?;
        let quote = load_quote(&mut tx, requisition_id, quote_id).await?;

        if !directory::manages_requisition_department(&mut tx, requisition_id, manager_id).await? {
            return Err(ValidationError::NotRequiredManager {
                actor: manager_id,
                requisition: requisition_id,
            }
            .into());
        }
        if approvals::find_manager_approval(&mut tx, requisition_id, manager_id).await?.is_some() {
            return Err(already_responded(manager_id, requisition_id));
        }

        let selected_quote = select_quote(&mut tx, &quote, now).await?;

        let approval = ManagerApproval {
            requisition_id,
            manager_id,
            quote_id,
            origin: ApprovalOrigin::Normal,
            created_at: now,
        };
        if let Err(error) = approvals::insert_manager_approval(&mut tx, &approval).await {
            if error.is_unique_violation() {
                return Err(already_responded(manager_id, requisition_id));
            }
            return Err(error.into());
        }

        ensure_single_choice(&mut tx, requisition_id, quote_id).await?;
        let (approvals, required, consensus_reached) =
            settle_consensus(&mut tx, &self.links, &requisition, &quote, now).await?;

        commit(tx).await?;

        info!(
            event_name = "engine.manager.approved",
            requisition_id = %requisition_id,
            quote_id = %quote_id,
            actor_id = %manager_id,
            selected_quote,
            approvals,
            required,
            consensus_reached,
            "manager approval recorded"
        );

        Ok(ManagerApprovalOutcome {
            requisition_id,
            quote_id,
            selected_quote,
            approvals,
            required,
            consensus_reached,
        })
    }
}

fn already_responded(actor: UserId, requisition: RequisitionId) -> ApplicationError {
    ValidationError::AlreadyResponded { actor, requisition }.into()
}

/// Makes `quote` the requisition's selection, or confirms it already is.
///
/// The first caller claims the quote with a conditional update and rejects every
/// sibling in the same unit of work. Returns whether this call made the pick.
pub(crate) async fn select_quote(
    conn: &mut SqliteConnection,
    quote: &Quote,
    now: DateTime<Utc>,
) -> Result<bool, ApplicationError> {
    let requisition_id = quote.requisition_id;

    if let Some(selected) = quotes::selected_quote(conn, requisition_id).await? {
        if selected.id == quote.id {
            return Ok(false);
        }
        return Err(ValidationError::DifferentQuoteChosen {
            requisition: requisition_id,
            chosen: selected.id,
        }
        .into());
    }

    if quote.status == QuoteStatus::Rejected {
        return Err(ValidationError::QuoteAlreadyDecided(quote.id).into());
    }

    if !quotes::claim_quote(conn, requisition_id, quote.id, now).await? {
        return match quotes::selected_quote(conn, requisition_id).await? {
            Some(winner) => Err(ValidationError::DifferentQuoteChosen {
                requisition: requisition_id,
                chosen: winner.id,
            }
            .into()),
            None => Err(ConsistencyError::ConcurrentModification(requisition_id).into()),
        };
    }

    quotes::reject_other_quotes(conn, requisition_id, quote.id, now).await?;
    Ok(true)
}

/// Managers must never end up split across quotes of one requisition.
pub(crate) async fn ensure_single_choice(
    conn: &mut SqliteConnection,
    requisition_id: RequisitionId,
    requested: QuoteId,
) -> Result<(), ApplicationError> {
    let approved = approvals::approved_quote_ids(conn, requisition_id).await?;
    if approved.iter().any(|quote| *quote != requested) {
        return Err(ConsistencyError::ConflictingManagerChoices {
            requisition: requisition_id,
            approved,
            requested,
        }
        .into());
    }
    Ok(())
}

/// Flags manager consensus once every required manager picked `quote`, and
/// asks the director to sign off. Returns (approvals, required, consensus).
pub(crate) async fn settle_consensus(
    conn: &mut SqliteConnection,
    links: &NotificationLinks,
    requisition: &Requisition,
    quote: &Quote,
    now: DateTime<Utc>,
) -> Result<(usize, usize, bool), ApplicationError> {
    let required = requisitions::list_required_managers(conn, requisition.id).await?.len();
    let approvals =
        approvals::count_required_approvals_for_quote(conn, requisition.id, quote.id).await?;
    let approvals = usize::try_from(approvals).unwrap_or_default();

    if required == 0 || approvals < required {
        return Ok((approvals, required, false));
    }

    if quotes::mark_manager_consensus(conn, quote.id, now).await? {
        notify::enqueue(
            conn,
            links,
            requisition.id,
            NotificationTemplate::DirectorApprovalRequested,
            &[requisition.director_id],
            json!({
                "requisition_id": requisition.id,
                "quote_id": quote.id,
                "total_value": quote.total_value,
                "description": requisition.description,
            }),
            now,
        )
        .await?;

        info!(
            event_name = "engine.manager.consensus_reached",
            requisition_id = %requisition.id,
            quote_id = %quote.id,
            required,
            "manager consensus reached"
        );
    }

    Ok((approvals, required, true))
}
