use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::validate_not_blank;
use crate::ids::EntityId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Category {
    pub id: EntityId,
    #[validate(custom = "validate_not_blank")]
    pub name: String,
    pub description: String,
    /// Assigned by the store on creation.
    pub created_at: Option<DateTime<Utc>>,
}

/// Input for creating a category.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct NewCategory {
    #[validate(custom = "validate_not_blank")]
    pub name: String,
    pub description: Option<String>,
}

impl NewCategory {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}
