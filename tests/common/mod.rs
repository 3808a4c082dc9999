#![allow(dead_code)]

use std::sync::Arc;

use stockkeeper::store::{Fields, FieldValue, InMemoryStore, StoreHandle};
use stockkeeper::{Category, InventoryRepository, NewCategory, NewProduct, NewSupplier, Supplier};

/// Repositories over a fresh in-memory store.
pub struct TestInventory {
    pub store: Arc<InMemoryStore>,
    pub handle: StoreHandle,
    pub repo: InventoryRepository,
}

impl TestInventory {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let handle = StoreHandle::new(store.clone());
        let repo = InventoryRepository::new(handle.clone());
        Self {
            store,
            handle,
            repo,
        }
    }

    /// Category "Electronics" and supplier "ACME", the references most
    /// tests hang their products on.
    pub async fn seed_references(&self) -> (Category, Supplier) {
        let category = self
            .repo
            .categories()
            .add(NewCategory::new("Electronics").description("x"))
            .await
            .expect("seed category");
        let supplier = self
            .repo
            .suppliers()
            .add(NewSupplier {
                phone: Some("+1 555 0100".into()),
                email: Some("sales@acme.test".into()),
                ..NewSupplier::new("ACME")
            })
            .await
            .expect("seed supplier");
        (category, supplier)
    }
}

pub fn new_product(
    name: &str,
    stock_on_hand: i32,
    stock_min: i32,
    category: &Category,
    supplier: &Supplier,
) -> NewProduct {
    NewProduct {
        name: name.to_string(),
        description: None,
        unit_price: 10.5,
        stock_on_hand,
        stock_min,
        category_id: category.id.value(),
        supplier_id: supplier.id.value(),
        barcode: None,
    }
}

pub fn fields(pairs: &[(&str, FieldValue)]) -> Fields {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}
