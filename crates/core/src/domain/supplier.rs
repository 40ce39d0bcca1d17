use serde::{Deserialize, Serialize};

use crate::domain::numeric_id;

numeric_id!(SupplierId);

/// Vendor shared across requisitions, keyed by its exact (case-sensitive) name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Supplier {
    pub id: SupplierId,
    pub name: String,
}
