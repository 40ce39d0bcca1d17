use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::numeric_id;
use crate::domain::requisition::RequisitionId;
use crate::domain::supplier::SupplierId;

numeric_id!(QuoteId);
numeric_id!(ItemId);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStatus {
    Pending,
    Approved,
    Rejected,
}

impl QuoteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// One supplier's offer for a requisition.
///
/// `status == Approved` marks the quote the managers locked in; it only becomes
/// the requisition's final choice once `approved_by_director` is also set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub id: QuoteId,
    pub requisition_id: RequisitionId,
    pub supplier_id: SupplierId,
    pub total_value: Decimal,
    pub status: QuoteStatus,
    pub approved_by_managers: bool,
    pub approved_by_director: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Quote {
    pub fn is_manager_consensus_approved(&self) -> bool {
        self.approved_by_managers && self.status == QuoteStatus::Approved
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub requisition_id: RequisitionId,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

/// An item as priced inside one particular quote.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteItem {
    pub quote_id: QuoteId,
    pub item_id: ItemId,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

impl QuoteItem {
    pub fn line_total(&self) -> Decimal {
        self.quantity * self.unit_price
    }
}
