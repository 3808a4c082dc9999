//! Domain values: categories, suppliers and the products that reference them.

use validator::ValidationError;

pub mod category;
pub mod product;
pub mod supplier;

pub use category::{Category, NewCategory};
pub use product::{NewProduct, Product, ProductState};
pub use supplier::{NewSupplier, Supplier};

/// Decoration for products whose category cannot be resolved.
pub const UNCATEGORIZED: &str = "Uncategorized";
/// Decoration for products whose supplier cannot be resolved.
pub const NO_SUPPLIER: &str = "No supplier";

pub(crate) fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("must not be empty".into());
        return Err(err);
    }
    Ok(())
}

pub(crate) fn validate_positive_price(price: f64) -> Result<(), ValidationError> {
    if !price.is_finite() || price <= 0.0 {
        let mut err = ValidationError::new("non_positive_price");
        err.message = Some("must be a finite amount greater than zero".into());
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_names_are_rejected() {
        assert!(validate_not_blank("Mouse").is_ok());
        assert!(validate_not_blank("").is_err());
        assert!(validate_not_blank("   ").is_err());
    }

    #[test]
    fn price_must_be_positive_and_finite() {
        assert!(validate_positive_price(0.01).is_ok());
        assert!(validate_positive_price(0.0).is_err());
        assert!(validate_positive_price(-3.0).is_err());
        assert!(validate_positive_price(f64::NAN).is_err());
        assert!(validate_positive_price(f64::INFINITY).is_err());
    }
}
