use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::actor::UserId;
use crate::errors::ExternalDependencyError;

pub const EXPENSE_MODULE: &str = "despesas";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationTemplate {
    ManagerApprovalRequested,
    RequisitionCreated,
    DirectorApprovalRequested,
    RequisitionApproved,
    RequisitionRejected,
}

impl NotificationTemplate {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ManagerApprovalRequested => "manager_approval_requested",
            Self::RequisitionCreated => "requisition_created",
            Self::DirectorApprovalRequested => "director_approval_requested",
            Self::RequisitionApproved => "requisition_approved",
            Self::RequisitionRejected => "requisition_rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "manager_approval_requested" => Some(Self::ManagerApprovalRequested),
            "requisition_created" => Some(Self::RequisitionCreated),
            "director_approval_requested" => Some(Self::DirectorApprovalRequested),
            "requisition_approved" => Some(Self::RequisitionApproved),
            "requisition_rejected" => Some(Self::RequisitionRejected),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub user_id: UserId,
    pub name: String,
    pub email: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub recipients: Vec<Recipient>,
    pub template: NotificationTemplate,
    pub data: Value,
    pub link: String,
    pub module: String,
}

/// Outbound message delivery. Callers treat every failure as non-fatal.
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), ExternalDependencyError>;
}
