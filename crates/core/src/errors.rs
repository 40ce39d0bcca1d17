use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::actor::{Capability, UserId};
use crate::domain::allocation::DepartmentId;
use crate::domain::quote::QuoteId;
use crate::domain::requisition::{RequisitionId, RequisitionStatus};

/// Caller mistakes. Raised before anything is committed.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("department percentages must sum to exactly 100, got {total}")]
    AllocationSum { total: Decimal },
    #[error("department {department} has a non-positive percentage {percent}")]
    NonPositivePercent { department: DepartmentId, percent: Decimal },
    #[error("department {0} is listed more than once")]
    DuplicateDepartment(DepartmentId),
    #[error("supplier `{0}` is listed more than once")]
    DuplicateSupplier(String),
    #[error("supplier `{0}` has no items")]
    SupplierWithoutItems(String),
    #[error("item `{description}` from supplier `{supplier}` must have quantity > 0")]
    InvalidQuantity { supplier: String, description: String },
    #[error("item `{description}` from supplier `{supplier}` must have unit price > 0")]
    InvalidUnitPrice { supplier: String, description: String },
    #[error("amounts for {0} exceed the supported decimal range")]
    AmountOverflow(String),
    #[error("no manager assigned to department(s) {}", join_ids(.departments))]
    NoManagerAssigned { departments: Vec<DepartmentId> },
    #[error("department {department} is managed by user {user}, who lacks the manager role")]
    ManagerWithoutRole { department: DepartmentId, user: UserId },
    #[error("user {user} cannot act as director (missing director role)")]
    NotADirector { user: UserId },
    #[error("user {actor} lacks the `{}` capability", .capability.as_str())]
    Forbidden { actor: UserId, capability: Capability },
    #[error("user {actor} is not a required manager of requisition {requisition}")]
    NotRequiredManager { actor: UserId, requisition: RequisitionId },
    #[error("user {actor} is not the director assigned to requisition {requisition}")]
    NotAssignedDirector { actor: UserId, requisition: RequisitionId },
    #[error("user {actor} has already responded to requisition {requisition}")]
    AlreadyResponded { actor: UserId, requisition: RequisitionId },
    #[error("a different quote ({chosen}) was already chosen for requisition {requisition}")]
    DifferentQuoteChosen { requisition: RequisitionId, chosen: QuoteId },
    #[error("quote {0} has already been decided")]
    QuoteAlreadyDecided(QuoteId),
    #[error("quote {0} is not fully approved by managers")]
    NotFullyApprovedByManagers(QuoteId),
    #[error("quote {0} is already approved by the director")]
    QuoteAlreadyDirectorApproved(QuoteId),
    #[error("requisition {0} already has a director approval")]
    RequisitionAlreadyDirectorApproved(RequisitionId),
    #[error("quote {0} is approved and the actor may not reject it")]
    CannotRejectApprovedQuote(QuoteId),
    #[error("requisition {requisition} is already {}", .status.as_str())]
    RequisitionTerminal { requisition: RequisitionId, status: RequisitionStatus },
    #[error("quote {0} is not approved")]
    QuoteNotApproved(QuoteId),
    #[error("requisition {0} has no department allocations")]
    NoAllocations(RequisitionId),
    #[error("department percentages of requisition {requisition} sum to {total}, not 100")]
    AllocationDrift { requisition: RequisitionId, total: Decimal },
}

impl ValidationError {
    /// Authorization failures, as opposed to malformed input or wrong stage.
    pub fn is_forbidden(&self) -> bool {
        matches!(
            self,
            Self::Forbidden { .. }
                | Self::NotRequiredManager { .. }
                | Self::NotAssignedDirector { .. }
                | Self::CannotRejectApprovedQuote(_)
        )
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NotFoundError {
    #[error("requisition {0} not found")]
    Requisition(RequisitionId),
    #[error("quote {quote} not found for requisition {requisition}")]
    Quote { requisition: RequisitionId, quote: QuoteId },
    #[error("user {0} not found")]
    User(UserId),
    #[error("department {0} not found")]
    Department(DepartmentId),
    #[error("module `{0}` is not registered")]
    Module(String),
}

/// States that should be unreachable; they point at a race or a bug elsewhere.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConsistencyError {
    #[error(
        "managers of requisition {requisition} approved quote(s) {} but quote {requested} was requested",
        join_ids(.approved)
    )]
    ConflictingManagerChoices {
        requisition: RequisitionId,
        approved: Vec<QuoteId>,
        requested: QuoteId,
    },
    #[error("stored value `{value}` is not a valid {field}")]
    CorruptValue { field: &'static str, value: String },
    #[error("requisition {0} changed while the operation was running")]
    ConcurrentModification(RequisitionId),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    NotFound(#[from] NotFoundError),
    #[error(transparent)]
    Consistency(#[from] ConsistencyError),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ExternalDependencyError {
    #[error("verification token issuance failed: {0}")]
    TokenIssuance(String),
    #[error("notification delivery failed: {0}")]
    Notification(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    ExternalDependency(#[from] ExternalDependencyError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl From<ValidationError> for ApplicationError {
    fn from(value: ValidationError) -> Self {
        Self::Domain(value.into())
    }
}

impl From<NotFoundError> for ApplicationError {
    fn from(value: NotFoundError) -> Self {
        Self::Domain(value.into())
    }
}

impl From<ConsistencyError> for ApplicationError {
    fn from(value: ConsistencyError) -> Self {
        Self::Domain(value.into())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Consistency,
    ExternalDependency,
    Persistence,
    Configuration,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::Consistency => "consistency",
            Self::ExternalDependency => "external_dependency",
            Self::Persistence => "persistence",
            Self::Configuration => "configuration",
        }
    }
}

impl ApplicationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Domain(DomainError::Validation(_)) => ErrorKind::Validation,
            Self::Domain(DomainError::NotFound(_)) => ErrorKind::NotFound,
            Self::Domain(DomainError::Consistency(_)) => ErrorKind::Consistency,
            Self::ExternalDependency(_) => ErrorKind::ExternalDependency,
            Self::Persistence(_) => ErrorKind::Persistence,
            Self::Configuration(_) => ErrorKind::Configuration,
        }
    }

    pub fn validation(&self) -> Option<&ValidationError> {
        match self {
            Self::Domain(DomainError::Validation(error)) => Some(error),
            _ => None,
        }
    }

    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Forbidden { .. } => "You are not allowed to perform this action.",
            Self::NotFound { .. } => "The requested record does not exist.",
            Self::Conflict { .. } => {
                "The requisition is in an inconsistent state. Contact an administrator."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest { message, .. }
            | Self::Forbidden { message, .. }
            | Self::NotFound { message, .. }
            | Self::Conflict { message, .. }
            | Self::ServiceUnavailable { message, .. }
            | Self::Internal { message, .. } => message,
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::Forbidden { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let message = value.to_string();
        let correlation_id = "unassigned".to_owned();
        match value {
            ApplicationError::Domain(DomainError::Validation(error)) if error.is_forbidden() => {
                Self::Forbidden { message, correlation_id }
            }
            ApplicationError::Domain(DomainError::Validation(_)) => {
                Self::BadRequest { message, correlation_id }
            }
            ApplicationError::Domain(DomainError::NotFound(_)) => {
                Self::NotFound { message, correlation_id }
            }
            ApplicationError::Domain(DomainError::Consistency(_)) => {
                Self::Conflict { message, correlation_id }
            }
            ApplicationError::ExternalDependency(_) | ApplicationError::Persistence(_) => {
                Self::ServiceUnavailable { message, correlation_id }
            }
            ApplicationError::Configuration(_) => Self::Internal { message, correlation_id },
        }
    }
}

fn join_ids<T: std::fmt::Display>(ids: &[T]) -> String {
    ids.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}
