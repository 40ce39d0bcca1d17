use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use sqlx::SqliteConnection;
use tracing::{info, warn};

use despesas_core::domain::actor::{Capability, UserId};
use despesas_core::domain::quote::{Quote, QuoteId};
use despesas_core::domain::requisition::{Requisition, RequisitionId};
use despesas_core::errors::{ApplicationError, ConsistencyError, ValidationError};
use despesas_core::notification::NotificationTemplate;
use despesas_core::rateio::DepartmentCharge;
use despesas_core::token::{EntityKind, VerificationTokenIssuer};
use despesas_db::repositories::{quotes, requisitions, tokens};
use despesas_db::{begin, commit, DbPool};

use crate::notify::{self, NotificationLinks};
use crate::rateio::{allocate_in, RateioOutcome};
use crate::support::{authorize, ensure_open, load_quote, load_requisition};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DirectorApprovalOutcome {
    pub requisition_id: RequisitionId,
    pub quote_id: QuoteId,
    pub director_id: UserId,
    pub token: String,
    pub charges: Vec<DepartmentCharge>,
}

/// Final sign-off on the quote the managers agreed on.
pub struct DirectorApprovalGate {
    pool: DbPool,
    issuer: Arc<dyn VerificationTokenIssuer>,
    links: NotificationLinks,
}

impl DirectorApprovalGate {
    pub fn new(
        pool: DbPool,
        issuer: Arc<dyn VerificationTokenIssuer>,
        links: NotificationLinks,
    ) -> Self {
        Self { pool, issuer, links }
    }

    pub async fn approve(
        &self,
        requisition_id: RequisitionId,
        quote_id: QuoteId,
        director_id: UserId,
    ) -> Result<DirectorApprovalOutcome, ApplicationError> {
        let now = Utc::now();
        let mut tx = begin(&self.pool).await?;

        authorize(&mut tx, director_id, Capability::ApproveAsDirector).await?;
        let requisition = load_requisition(&mut tx, requisition_id).await?;
        if requisition.director_id != director_id {
            return Err(ValidationError::NotAssignedDirector {
                actor: director_id,
                requisition: requisition_id,
            }
            .into());
        }
        let quote = load_quote(&mut tx, requisition_id, quote_id).await?;
        ensure_ready_for_director(&requisition, &quote)?;

        let outcome = finalize(
            &mut tx,
            self.issuer.as_ref(),
            &self.links,
            &requisition,
            &quote,
            director_id,
            now,
        )
        .await?;

        commit(tx).await?;

        info!(
            event_name = "engine.director.approved",
            requisition_id = %requisition_id,
            quote_id = %quote_id,
            actor_id = %director_id,
            "requisition approved by director"
        );

        Ok(outcome)
    }
}

/// Stage checks shared by the director and the master substitute.
pub(crate) fn ensure_ready_for_director(
    requisition: &Requisition,
    quote: &Quote,
) -> Result<(), ValidationError> {
    if quote.approved_by_director {
        return Err(ValidationError::QuoteAlreadyDirectorApproved(quote.id));
    }
    if !quote.is_manager_consensus_approved() {
        return Err(ValidationError::NotFullyApprovedByManagers(quote.id));
    }
    if requisition.is_director_approved() {
        return Err(ValidationError::RequisitionAlreadyDirectorApproved(requisition.id));
    }
    ensure_open(requisition)
}

/// Approves the requisition, allocates the quote value and issues the
/// verification token, all inside the caller's unit of work.
///
/// A token issuer failure is returned as is so the caller's transaction is
/// dropped and nothing above is persisted.
pub(crate) async fn finalize(
    conn: &mut SqliteConnection,
    issuer: &dyn VerificationTokenIssuer,
    links: &NotificationLinks,
    requisition: &Requisition,
    quote: &Quote,
    approver_id: UserId,
    now: DateTime<Utc>,
) -> Result<DirectorApprovalOutcome, ApplicationError> {
    let requisition_id = requisition.id;

    if !quotes::mark_director_approved(conn, quote.id, now).await?
        || !requisitions::mark_approved(conn, requisition_id, quote.id, approver_id, now).await?
    {
        return Err(ConsistencyError::ConcurrentModification(requisition_id).into());
    }

    let charges = match allocate_in(conn, requisition_id, quote.id, now).await? {
        RateioOutcome::Allocated(charges) => charges,
        RateioOutcome::AlreadyAllocated => Vec::new(),
    };

    let token = issuer.issue_token(EntityKind::Expense, requisition_id).await.map_err(|error| {
        warn!(
            event_name = "engine.token.issuance_failed",
            requisition_id = %requisition_id,
            error = %error,
            "verification token issuance failed; approval rolled back"
        );
        ApplicationError::from(error)
    })?;
    tokens::insert_token(conn, &token, now).await?;

    notify::enqueue(
        conn,
        links,
        requisition_id,
        NotificationTemplate::RequisitionApproved,
        &[requisition.requester_id],
        json!({
            "requisition_id": requisition_id,
            "quote_id": quote.id,
            "total_value": quote.total_value,
            "approved_by": approver_id,
            "description": requisition.description,
        }),
        now,
    )
    .await?;

    Ok(DirectorApprovalOutcome {
        requisition_id,
        quote_id: quote.id,
        director_id: approver_id,
        token: token.token,
        charges,
    })
}
