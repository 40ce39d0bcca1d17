use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::info;

use despesas_core::domain::actor::{Capability, UserId};
use despesas_core::domain::quote::{QuoteId, QuoteStatus};
use despesas_core::domain::requisition::RequisitionId;
use despesas_core::errors::{ApplicationError, ConsistencyError, NotFoundError, ValidationError};
use despesas_core::notification::NotificationTemplate;
use despesas_db::repositories::{approvals, directory, quotes, requisitions};
use despesas_db::{begin, commit, DbPool};

use crate::notify::{self, NotificationLinks};
use crate::support::{ensure_open, load_quote, load_requisition};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectingRole {
    Manager,
    Director,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RejectionOutcome {
    pub requisition_id: RequisitionId,
    pub quote_id: QuoteId,
    pub rejected_by: UserId,
    pub role: RejectingRole,
    pub quotes_rejected: u64,
    pub requisition_rejected: bool,
}

/// Rejects a quote, and with it the whole supplier comparison of the requisition.
pub struct RejectionCascade {
    pool: DbPool,
    links: NotificationLinks,
}

impl RejectionCascade {
    pub fn new(pool: DbPool, links: NotificationLinks) -> Self {
        Self { pool, links }
    }

    pub async fn reject_quote(
        &self,
        requisition_id: RequisitionId,
        quote_id: QuoteId,
        actor_id: UserId,
    ) -> Result<RejectionOutcome, ApplicationError> {
        let now = Utc::now();
        let mut tx = begin(&self.pool).await?;

        let actor =
            directory::load_actor(&mut tx, actor_id).await?.ok_or(NotFoundError::User(actor_id))?;
        let requisition = load_requisition(&mut tx, requisition_id).await?;

        let role = if requisition.director_id == actor_id && actor.can(Capability::ApproveAsDirector)
        {
            if requisition.is_director_approved() {
                return Err(
                    ValidationError::RequisitionAlreadyDirectorApproved(requisition_id).into()
                );
            }
            RejectingRole::Director
        } else if actor.can(Capability::ApproveAsManager)
            && directory::manages_requisition_department(&mut tx, requisition_id, actor_id).await?
        {
            if approvals::find_manager_approval(&mut tx, requisition_id, actor_id).await?.is_some()
            {
                return Err(ValidationError::AlreadyResponded {
                    actor: actor_id,
                    requisition: requisition_id,
                }
                .into());
            }
            RejectingRole::Manager
        } else {
            return Err(ValidationError::NotRequiredManager {
                actor: actor_id,
                requisition: requisition_id,
            }
            .into());
        };

        ensure_open(&requisition)?;
        let quote = load_quote(&mut tx, requisition_id, quote_id).await?;
        match quote.status {
            QuoteStatus::Rejected => {
                return Err(ValidationError::QuoteAlreadyDecided(quote_id).into());
            }
            QuoteStatus::Approved if !actor.can(Capability::RejectApprovedQuote) => {
                return Err(ValidationError::CannotRejectApprovedQuote(quote_id).into());
            }
            _ => {}
        }

        let quotes_rejected = quotes::reject_all_quotes(&mut tx, requisition_id, now).await?;

        let requisition_rejected = quotes::count_open_quotes(&mut tx, requisition_id).await? == 0;
        if requisition_rejected {
            if !requisitions::mark_rejected(&mut tx, requisition_id, actor_id, now).await? {
                return Err(ConsistencyError::ConcurrentModification(requisition_id).into());
            }
            notify::enqueue(
                &mut tx,
                &self.links,
                requisition_id,
                NotificationTemplate::RequisitionRejected,
                &[requisition.requester_id],
                json!({
                    "requisition_id": requisition_id,
                    "quote_id": quote_id,
                    "rejected_by": actor_id,
                    "description": requisition.description,
                }),
                now,
            )
            .await?;
        }

        commit(tx).await?;

        info!(
            event_name = "engine.quote.rejected",
            requisition_id = %requisition_id,
            quote_id = %quote_id,
            actor_id = %actor_id,
            role = ?role,
            quotes_rejected,
            requisition_rejected,
            "quote rejected"
        );

        Ok(RejectionOutcome {
            requisition_id,
            quote_id,
            rejected_by: actor_id,
            role,
            quotes_rejected,
            requisition_rejected,
        })
    }
}
