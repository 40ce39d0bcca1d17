//! Shape checks for a new expense requisition.
//!
//! Everything here is pure: it runs before the store is touched, so a draft that
//! fails validation never opens a unit of work. Directory lookups (does the
//! department exist, who manages it) happen later, in the engine.

use std::collections::HashSet;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::actor::UserId;
use crate::domain::allocation::DepartmentId;
use crate::errors::ValidationError;

pub const FULL_ALLOCATION: Decimal = Decimal::ONE_HUNDRED;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRequisition {
    pub description: String,
    pub requester_id: UserId,
    pub director_id: UserId,
    pub departments: Vec<DepartmentShare>,
    pub suppliers: Vec<SupplierOffer>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepartmentShare {
    pub department_id: DepartmentId,
    pub percent: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierOffer {
    pub name: String,
    pub items: Vec<OfferedItem>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferedItem {
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

impl OfferedItem {
    /// `None` when the product does not fit in a `Decimal`.
    pub fn line_total(&self) -> Option<Decimal> {
        self.quantity.checked_mul(self.unit_price)
    }
}

impl SupplierOffer {
    /// Quote value: the sum of this supplier's item lines.
    pub fn total(&self) -> Option<Decimal> {
        self.items
            .iter()
            .try_fold(Decimal::ZERO, |sum, item| sum.checked_add(item.line_total()?))
    }
}

/// A draft that passed every shape rule, with quote totals precomputed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedRequisition {
    pub draft: NewRequisition,
    pub quote_totals: Vec<Decimal>,
}

pub fn validate(draft: NewRequisition) -> Result<ValidatedRequisition, ValidationError> {
    if draft.description.trim().is_empty() {
        return Err(ValidationError::MissingField("description"));
    }
    if draft.departments.is_empty() {
        return Err(ValidationError::MissingField("departments"));
    }
    if draft.suppliers.is_empty() {
        return Err(ValidationError::MissingField("suppliers"));
    }

    validate_shares(&draft.departments)?;

    let mut seen_suppliers = HashSet::new();
    for supplier in &draft.suppliers {
        validate_offer(supplier)?;
        if !seen_suppliers.insert(supplier.name.as_str()) {
            return Err(ValidationError::DuplicateSupplier(supplier.name.clone()));
        }
    }

    let quote_totals = draft
        .suppliers
        .iter()
        .map(|supplier| {
            supplier.total().ok_or_else(|| {
                ValidationError::AmountOverflow(format!("supplier `{}`", supplier.name))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ValidatedRequisition { draft, quote_totals })
}

/// Percentages must add up to exactly 100 when the requisition is created.
pub fn validate_shares(shares: &[DepartmentShare]) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for share in shares {
        if !seen.insert(share.department_id) {
            return Err(ValidationError::DuplicateDepartment(share.department_id));
        }
        if share.percent <= Decimal::ZERO {
            return Err(ValidationError::NonPositivePercent {
                department: share.department_id,
                percent: share.percent,
            });
        }
    }

    let total = shares
        .iter()
        .try_fold(Decimal::ZERO, |sum, share| sum.checked_add(share.percent))
        .ok_or_else(|| ValidationError::AmountOverflow("department percentages".to_string()))?;
    if total != FULL_ALLOCATION {
        return Err(ValidationError::AllocationSum { total });
    }

    Ok(())
}

fn validate_offer(offer: &SupplierOffer) -> Result<(), ValidationError> {
    if offer.name.trim().is_empty() {
        return Err(ValidationError::MissingField("suppliers[].name"));
    }
    if offer.items.is_empty() {
        return Err(ValidationError::SupplierWithoutItems(offer.name.clone()));
    }

    for item in &offer.items {
        if item.description.trim().is_empty() {
            return Err(ValidationError::MissingField("suppliers[].items[].description"));
        }
        if item.quantity <= Decimal::ZERO {
            return Err(ValidationError::InvalidQuantity {
                supplier: offer.name.clone(),
                description: item.description.clone(),
            });
        }
        if item.unit_price <= Decimal::ZERO {
            return Err(ValidationError::InvalidUnitPrice {
                supplier: offer.name.clone(),
                description: item.description.clone(),
            });
        }
    }

    Ok(())
}
