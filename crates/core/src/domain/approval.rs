use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::actor::UserId;
use crate::domain::quote::QuoteId;
use crate::domain::requisition::RequisitionId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalOrigin {
    Normal,
    Override,
}

impl ApprovalOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Override => "override",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "normal" => Some(Self::Normal),
            "override" => Some(Self::Override),
            _ => None,
        }
    }
}

/// A manager's pick for a requisition; at most one per (requisition, manager).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerApproval {
    pub requisition_id: RequisitionId,
    pub manager_id: UserId,
    pub quote_id: QuoteId,
    pub origin: ApprovalOrigin,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideAction {
    ForceConsensus,
    ApproveOnBehalfOfManager,
    SubstituteDirector,
    RejectRequisition,
}

impl OverrideAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ForceConsensus => "force_consensus",
            Self::ApproveOnBehalfOfManager => "approve_on_behalf_of_manager",
            Self::SubstituteDirector => "substitute_director",
            Self::RejectRequisition => "reject_requisition",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "force_consensus" => Some(Self::ForceConsensus),
            "approve_on_behalf_of_manager" => Some(Self::ApproveOnBehalfOfManager),
            "substitute_director" => Some(Self::SubstituteDirector),
            "reject_requisition" => Some(Self::RejectRequisition),
            _ => None,
        }
    }
}

/// Append-only record of a privileged intervention.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideEvent {
    pub requisition_id: RequisitionId,
    pub actor_id: UserId,
    pub action: OverrideAction,
    pub on_behalf_of: Option<UserId>,
    pub quote_id: Option<QuoteId>,
    pub occurred_at: DateTime<Utc>,
}
