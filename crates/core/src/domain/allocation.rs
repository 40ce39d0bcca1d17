use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::actor::UserId;
use crate::domain::numeric_id;
use crate::domain::requisition::RequisitionId;

numeric_id!(DepartmentId);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    pub id: DepartmentId,
    pub name: String,
    pub manager_id: Option<UserId>,
}

/// Share of a requisition's cost carried by one department.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepartmentAllocation {
    pub requisition_id: RequisitionId,
    pub department_id: DepartmentId,
    pub percent: Decimal,
    /// `valor_gasto`: written once by the rateio step.
    pub spent_value: Option<Decimal>,
}
