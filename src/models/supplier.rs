use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::validate_not_blank;
use crate::ids::EntityId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Supplier {
    pub id: EntityId,
    #[validate(custom = "validate_not_blank")]
    pub name: String,
    pub phone: String,
    pub email: String,
    pub address: String,
    pub city: String,
    pub country: String,
    pub registered_at: Option<DateTime<Utc>>,
}

/// Input for registering a supplier. Contact fields are free text and may be
/// left empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct NewSupplier {
    #[validate(custom = "validate_not_blank")]
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
}

impl NewSupplier {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}
