use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::info;

use despesas_core::domain::actor::{Capability, UserId};
use despesas_core::domain::approval::{ApprovalOrigin, ManagerApproval, OverrideAction};
use despesas_core::domain::quote::QuoteId;
use despesas_core::domain::requisition::RequisitionId;
use despesas_core::errors::{ApplicationError, ConsistencyError};
use despesas_core::notification::NotificationTemplate;
use despesas_core::token::VerificationTokenIssuer;
use despesas_db::repositories::{approvals, quotes, requisitions};
use despesas_db::{begin, commit, DbPool};

use crate::director::{ensure_ready_for_director, finalize, DirectorApprovalOutcome};
use crate::manager::{ensure_single_choice, select_quote, settle_consensus};
use crate::notify::{self, NotificationLinks};
use crate::support::{authorize, ensure_open, load_quote, load_requisition};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ForceConsensusOutcome {
    pub requisition_id: RequisitionId,
    pub quote_id: QuoteId,
    /// Managers that received an override-origin approval in this call.
    pub approved_on_behalf_of: Vec<UserId>,
    pub approvals: usize,
    pub required: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SubstituteDirectorOutcome {
    pub replaced_director_id: UserId,
    #[serde(flatten)]
    pub approval: DirectorApprovalOutcome,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MasterRejectionOutcome {
    pub requisition_id: RequisitionId,
    pub rejected_by: UserId,
    pub quotes_rejected: u64,
}

/// Privileged interventions that bypass the normal approval chain.
///
/// Each operation keeps the in-place effect of the normal path and appends an
/// `override_event` row naming the master and whom it acted for.
pub struct MasterOverrideController {
    pool: DbPool,
    issuer: Arc<dyn VerificationTokenIssuer>,
    links: NotificationLinks,
}

impl MasterOverrideController {
    pub fn new(
        pool: DbPool,
        issuer: Arc<dyn VerificationTokenIssuer>,
        links: NotificationLinks,
    ) -> Self {
        Self { pool, issuer, links }
    }

    pub async fn force_consensus(
        &self,
        requisition_id: RequisitionId,
        quote_id: QuoteId,
        master_id: UserId,
    ) -> Result<ForceConsensusOutcome, ApplicationError> {
        let now = Utc::now();
        let mut tx = begin(&self.pool).await?;

        authorize(&mut tx, master_id, Capability::Override).await?;
        let requisition = load_requisition(&mut tx, requisition_id).await?;
        ensure_open(&requisition)?;
        let quote = load_quote(&mut tx, requisition_id, quote_id).await?;

        ensure_single_choice(&mut tx, requisition_id, quote_id).await?;
        select_quote(&mut tx, &quote, now).await?;

        let mut approved_on_behalf_of = Vec::new();
        for manager_id in requisitions::list_required_managers(&mut tx, requisition_id).await? {
            if approvals::find_manager_approval(&mut tx, requisition_id, manager_id)
                .await?
                .is_some()
            {
                continue;
            }
            approvals::insert_manager_approval(
                &mut tx,
                &ManagerApproval {
                    requisition_id,
                    manager_id,
                    quote_id,
                    origin: ApprovalOrigin::Override,
                    created_at: now,
                },
            )
            .await?;
            approvals::append_override_event(
                &mut tx,
                &approvals::override_event(
                    requisition_id,
                    master_id,
                    OverrideAction::ApproveOnBehalfOfManager,
                    Some(manager_id),
                    Some(quote_id),
                    now,
                ),
            )
            .await?;
            approved_on_behalf_of.push(manager_id);
        }

        approvals::append_override_event(
            &mut tx,
            &approvals::override_event(
                requisition_id,
                master_id,
                OverrideAction::ForceConsensus,
                None,
                Some(quote_id),
                now,
            ),
        )
        .await?;

        let (approvals, required, consensus_reached) =
            settle_consensus(&mut tx, &self.links, &requisition, &quote, now).await?;
        if !consensus_reached {
            return Err(ConsistencyError::ConcurrentModification(requisition_id).into());
        }

        commit(tx).await?;

        info!(
            event_name = "engine.master.consensus_forced",
            requisition_id = %requisition_id,
            quote_id = %quote_id,
            actor_id = %master_id,
            created = approved_on_behalf_of.len(),
            approvals,
            required,
            "manager consensus forced"
        );

        Ok(ForceConsensusOutcome {
            requisition_id,
            quote_id,
            approved_on_behalf_of,
            approvals,
            required,
        })
    }

    pub async fn substitute_director(
        &self,
        requisition_id: RequisitionId,
        quote_id: QuoteId,
        master_id: UserId,
    ) -> Result<SubstituteDirectorOutcome, ApplicationError> {
        let now = Utc::now();
        let mut tx = begin(&self.pool).await?;

        authorize(&mut tx, master_id, Capability::Override).await?;
        let mut requisition = load_requisition(&mut tx, requisition_id).await?;
        let quote = load_quote(&mut tx, requisition_id, quote_id).await?;
        ensure_ready_for_director(&requisition, &quote)?;

        let replaced_director_id = requisition.director_id;
        requisitions::replace_director(&mut tx, requisition_id, master_id, now).await?;
        requisition.director_id = master_id;
        approvals::append_override_event(
            &mut tx,
            &approvals::override_event(
                requisition_id,
                master_id,
                OverrideAction::SubstituteDirector,
                Some(replaced_director_id),
                Some(quote_id),
                now,
            ),
        )
        .await?;

        let approval = finalize(
            &mut tx,
            self.issuer.as_ref(),
            &self.links,
            &requisition,
            &quote,
            master_id,
            now,
        )
        .await?;

        commit(tx).await?;

        info!(
            event_name = "engine.master.director_substituted",
            requisition_id = %requisition_id,
            quote_id = %quote_id,
            actor_id = %master_id,
            replaced_director_id = %replaced_director_id,
            "requisition approved by master in place of the director"
        );

        Ok(SubstituteDirectorOutcome { replaced_director_id, approval })
    }

    pub async fn reject_unconditionally(
        &self,
        requisition_id: RequisitionId,
        master_id: UserId,
    ) -> Result<MasterRejectionOutcome, ApplicationError> {
        let now = Utc::now();
        let mut tx = begin(&self.pool).await?;

        authorize(&mut tx, master_id, Capability::Override).await?;
        let requisition = load_requisition(&mut tx, requisition_id).await?;
        ensure_open(&requisition)?;

        let quotes_rejected = quotes::reject_all_quotes(&mut tx, requisition_id, now).await?;
        if !requisitions::mark_rejected(&mut tx, requisition_id, master_id, now).await? {
            return Err(ConsistencyError::ConcurrentModification(requisition_id).into());
        }
        approvals::append_override_event(
            &mut tx,
            &approvals::override_event(
                requisition_id,
                master_id,
                OverrideAction::RejectRequisition,
                None,
                None,
                now,
            ),
        )
        .await?;
        notify::enqueue(
            &mut tx,
            &self.links,
            requisition_id,
            NotificationTemplate::RequisitionRejected,
            &[requisition.requester_id],
            json!({
                "requisition_id": requisition_id,
                "rejected_by": master_id,
                "description": requisition.description,
            }),
            now,
        )
        .await?;

        commit(tx).await?;

        info!(
            event_name = "engine.master.rejected",
            requisition_id = %requisition_id,
            actor_id = %master_id,
            quotes_rejected,
            "requisition rejected by master"
        );

        Ok(MasterRejectionOutcome { requisition_id, rejected_by: master_id, quotes_rejected })
    }
}
