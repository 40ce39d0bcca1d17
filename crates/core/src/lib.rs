pub mod config;
pub mod domain;
pub mod errors;
pub mod intake;
pub mod notification;
pub mod rateio;
pub mod token;

pub use domain::actor::{Actor, Capability, Role, UserId};
pub use domain::allocation::{Department, DepartmentAllocation, DepartmentId};
pub use domain::approval::{ApprovalOrigin, ManagerApproval, OverrideAction, OverrideEvent};
pub use domain::quote::{Item, ItemId, Quote, QuoteId, QuoteItem, QuoteStatus};
pub use domain::requisition::{Requisition, RequisitionId, RequisitionStatus};
pub use domain::supplier::{Supplier, SupplierId};
pub use errors::{
    ApplicationError, ConsistencyError, DomainError, ErrorKind, ExternalDependencyError,
    InterfaceError, NotFoundError, ValidationError,
};
pub use intake::{NewRequisition, ValidatedRequisition};
pub use notification::{Notification, NotificationGateway, NotificationTemplate, Recipient};
pub use token::{EntityKind, HmacTokenIssuer, VerificationToken, VerificationTokenIssuer};
