use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use super::{validate_not_blank, validate_positive_price};
use crate::ids::EntityId;

/// Lifecycle state derived from the `active` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductState {
    Active,
    Inactive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_product_price"))]
pub struct Product {
    pub id: EntityId,
    #[validate(custom = "validate_not_blank")]
    pub name: String,
    pub description: String,
    pub unit_price: f64,
    #[validate(range(min = 0))]
    pub stock_on_hand: i32,
    #[validate(range(min = 0))]
    pub stock_min: i32,
    pub category_id: i32,
    pub supplier_id: i32,
    pub barcode: String,
    pub active: bool,
    pub registered_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Resolved on read; never persisted.
    #[serde(default)]
    pub category_name: Option<String>,
    /// Resolved on read; never persisted.
    #[serde(default)]
    pub supplier_name: Option<String>,
}

impl Product {
    pub fn state(&self) -> ProductState {
        if self.active {
            ProductState::Active
        } else {
            ProductState::Inactive
        }
    }

    /// Stock on hand at or below the configured minimum.
    pub fn is_low_stock(&self) -> bool {
        self.stock_on_hand <= self.stock_min
    }

    pub fn stock_value(&self) -> f64 {
        self.unit_price * f64::from(self.stock_on_hand)
    }
}

/// Input for adding a product. New products always start active.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_new_product_price"))]
pub struct NewProduct {
    #[validate(custom = "validate_not_blank")]
    pub name: String,
    pub description: Option<String>,
    pub unit_price: f64,
    #[validate(range(min = 0))]
    pub stock_on_hand: i32,
    #[validate(range(min = 0))]
    pub stock_min: i32,
    pub category_id: i32,
    pub supplier_id: i32,
    pub barcode: Option<String>,
}

fn validate_product_price(product: &Product) -> Result<(), ValidationError> {
    validate_positive_price(product.unit_price)
}

fn validate_new_product_price(product: &NewProduct) -> Result<(), ValidationError> {
    validate_positive_price(product.unit_price)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn product(stock_on_hand: i32, stock_min: i32) -> Product {
        Product {
            id: EntityId::from_document_id("p1"),
            name: "Mouse".into(),
            description: String::new(),
            unit_price: 10.5,
            stock_on_hand,
            stock_min,
            category_id: 1,
            supplier_id: 2,
            barcode: "B1".into(),
            active: true,
            registered_at: None,
            updated_at: None,
            category_name: None,
            supplier_name: None,
        }
    }

    fn new_product() -> NewProduct {
        NewProduct {
            name: "Mouse".into(),
            unit_price: 10.5,
            stock_on_hand: 20,
            stock_min: 5,
            category_id: 1,
            supplier_id: 2,
            ..NewProduct::default()
        }
    }

    #[rstest]
    #[case(2, 5, true)]
    #[case(5, 5, true)]
    #[case(6, 5, false)]
    #[case(0, 0, true)]
    fn low_stock_includes_the_minimum(#[case] stock: i32, #[case] min: i32, #[case] low: bool) {
        assert_eq!(product(stock, min).is_low_stock(), low);
    }

    #[test]
    fn state_follows_active_flag() {
        let mut p = product(1, 1);
        assert_eq!(p.state(), ProductState::Active);
        p.active = false;
        assert_eq!(p.state(), ProductState::Inactive);
    }

    #[test]
    fn valid_input_passes() {
        assert!(new_product().validate().is_ok());
        assert!(product(3, 1).validate().is_ok());
    }

    #[rstest]
    #[case::blank_name(NewProduct { name: " ".into(), ..new_product() })]
    #[case::zero_price(NewProduct { unit_price: 0.0, ..new_product() })]
    #[case::negative_price(NewProduct { unit_price: -1.0, ..new_product() })]
    #[case::negative_stock(NewProduct { stock_on_hand: -1, ..new_product() })]
    #[case::negative_minimum(NewProduct { stock_min: -2, ..new_product() })]
    fn invalid_input_is_rejected(#[case] input: NewProduct) {
        assert!(input.validate().is_err());
    }
}
