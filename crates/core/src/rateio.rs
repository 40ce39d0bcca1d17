//! Rateio: split an approved quote's value across the departments that share it.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use crate::domain::allocation::{DepartmentAllocation, DepartmentId};
use crate::domain::requisition::RequisitionId;
use crate::errors::ValidationError;
use crate::intake::FULL_ALLOCATION;

/// Drift tolerated between stored percentages and 100 when posting the rateio.
pub const POSTING_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

const MONEY_SCALE: u32 = 2;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DepartmentCharge {
    pub department_id: DepartmentId,
    pub percent: Decimal,
    pub spent_value: Decimal,
}

/// `spent_value = percent / 100 × total`, per allocation, rounded to cents.
pub fn split(
    requisition: RequisitionId,
    total: Decimal,
    allocations: &[DepartmentAllocation],
) -> Result<Vec<DepartmentCharge>, ValidationError> {
    if allocations.is_empty() {
        return Err(ValidationError::NoAllocations(requisition));
    }

    let overflow = || ValidationError::AmountOverflow(format!("requisition {requisition}"));

    let percent_total = allocations
        .iter()
        .try_fold(Decimal::ZERO, |sum, allocation| sum.checked_add(allocation.percent))
        .ok_or_else(overflow)?;
    let drift = percent_total.checked_sub(FULL_ALLOCATION).ok_or_else(overflow)?;
    if drift.abs() > POSTING_TOLERANCE {
        return Err(ValidationError::AllocationDrift { requisition, total: percent_total });
    }

    allocations
        .iter()
        .map(|allocation| -> Result<DepartmentCharge, ValidationError> {
            let spent_value = (allocation.percent / FULL_ALLOCATION)
                .checked_mul(total)
                .ok_or_else(overflow)?
                .round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero);
            Ok(DepartmentCharge {
                department_id: allocation.department_id,
                percent: allocation.percent,
                spent_value,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{split, POSTING_TOLERANCE};
    use crate::domain::allocation::{DepartmentAllocation, DepartmentId};
    use crate::domain::requisition::RequisitionId;
    use crate::errors::ValidationError;

    fn allocation(department: i64, percent: Decimal) -> DepartmentAllocation {
        DepartmentAllocation {
            requisition_id: RequisitionId(1),
            department_id: DepartmentId(department),
            percent,
            spent_value: None,
        }
    }

    #[test]
    fn tolerance_is_one_cent_of_a_percent() {
        assert_eq!(POSTING_TOLERANCE, Decimal::new(1, 2));
    }

    #[test]
    fn splits_sixty_forty() {
        let charges = split(
            RequisitionId(1),
            Decimal::new(1000, 0),
            &[allocation(1, Decimal::new(60, 0)), allocation(2, Decimal::new(40, 0))],
        )
        .expect("valid allocation");

        assert_eq!(charges[0].spent_value, Decimal::new(600, 0));
        assert_eq!(charges[1].spent_value, Decimal::new(400, 0));
    }

    #[test]
    fn accepts_drift_within_tolerance() {
        let charges = split(
            RequisitionId(1),
            Decimal::new(300, 0),
            &[
                allocation(1, Decimal::new(3333, 2)),
                allocation(2, Decimal::new(3333, 2)),
                allocation(3, Decimal::new(3333, 2)),
            ],
        )
        .expect("99.99 is within tolerance");

        assert!(charges.iter().all(|charge| charge.spent_value == Decimal::new(9999, 2)));
    }

    #[test]
    fn rejects_drift_beyond_tolerance() {
        let error = split(
            RequisitionId(7),
            Decimal::new(300, 0),
            &[allocation(1, Decimal::new(5000, 2)), allocation(2, Decimal::new(4998, 2))],
        )
        .expect_err("99.98 drifts too far");

        assert_eq!(
            error,
            ValidationError::AllocationDrift {
                requisition: RequisitionId(7),
                total: Decimal::new(9998, 2)
            }
        );
    }

    #[test]
    fn tolerance_applies_above_one_hundred_too() {
        let charges = split(
            RequisitionId(1),
            Decimal::new(100, 0),
            &[allocation(1, Decimal::new(5001, 2)), allocation(2, Decimal::new(5000, 2))],
        )
        .expect("100.01 is within tolerance");
        assert_eq!(charges[0].spent_value, Decimal::new(5001, 2));

        let error = split(
            RequisitionId(7),
            Decimal::new(100, 0),
            &[allocation(1, Decimal::new(5002, 2)), allocation(2, Decimal::new(5000, 2))],
        )
        .expect_err("100.02 drifts too far");
        assert_eq!(
            error,
            ValidationError::AllocationDrift {
                requisition: RequisitionId(7),
                total: Decimal::new(10002, 2)
            }
        );
    }

    #[test]
    fn rejects_charges_beyond_the_decimal_range() {
        let error = split(
            RequisitionId(9),
            Decimal::MAX,
            &[allocation(1, Decimal::new(150, 0)), allocation(2, Decimal::new(-50, 0))],
        )
        .expect_err("150% of the maximum value overflows");

        assert_eq!(error, ValidationError::AmountOverflow("requisition 9".to_string()));
    }

    #[test]
    fn rejects_missing_allocations() {
        assert_eq!(
            split(RequisitionId(3), Decimal::new(10, 0), &[]),
            Err(ValidationError::NoAllocations(RequisitionId(3)))
        );
    }
}
