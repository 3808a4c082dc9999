use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use validator::Validate;

use super::{BaseRepository, Filter, LookupCache, Repository};
use crate::errors::ServiceError;
use crate::mapper::{product, ProductMapper, SupplierMapper};
use crate::models::{NewSupplier, Supplier};
use crate::store::{FieldValue, StoreHandle};

#[derive(Debug, Clone)]
pub struct SupplierRepository {
    base: BaseRepository,
    lookups: Arc<LookupCache>,
}

fn by_name(a: &Supplier, b: &Supplier) -> std::cmp::Ordering {
    a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id))
}

fn active_products_of(supplier_id: i32) -> [Filter; 2] {
    [
        (product::fields::SUPPLIER_ID, FieldValue::from(supplier_id)),
        (product::fields::ACTIVE, FieldValue::from(true)),
    ]
}

impl SupplierRepository {
    pub fn new(store: StoreHandle) -> Self {
        Self::from_parts(BaseRepository::new(store), Arc::new(LookupCache::default()))
    }

    pub(crate) fn from_parts(base: BaseRepository, lookups: Arc<LookupCache>) -> Self {
        Self { base, lookups }
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            base: self.base.with_timeout(timeout),
            lookups: Arc::clone(&self.lookups),
        }
    }

    #[instrument(skip(self))]
    pub async fn list_all(&self) -> Result<Vec<Supplier>, ServiceError> {
        let mut suppliers = self.base.fetch_all::<SupplierMapper>().await?;
        suppliers.sort_by(by_name);
        Ok(suppliers)
    }

    /// Case-insensitive substring match on the name. An empty query matches
    /// every supplier.
    #[instrument(skip(self))]
    pub async fn search_by_name(&self, query: &str) -> Result<Vec<Supplier>, ServiceError> {
        let needle = query.to_lowercase();
        let mut suppliers: Vec<_> = self
            .base
            .fetch_all::<SupplierMapper>()
            .await?
            .into_iter()
            .filter(|s| s.name.to_lowercase().contains(&needle))
            .collect();
        suppliers.sort_by(by_name);
        Ok(suppliers)
    }

    #[instrument(skip(self))]
    pub async fn get_by_id(&self, id: i32) -> Result<Option<Supplier>, ServiceError> {
        self.base.locate::<SupplierMapper>(id).await
    }

    #[instrument(skip(self))]
    pub async fn get_by_document_id(&self, document_id: &str) -> Result<Option<Supplier>, ServiceError> {
        self.base.find_by_document_id::<SupplierMapper>(document_id).await
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn add(&self, input: NewSupplier) -> Result<Supplier, ServiceError> {
        input.validate()?;

        let (id, write) = self
            .base
            .create::<SupplierMapper, _>(|id| SupplierMapper::creation_payload(id, &input))
            .await?;
        self.lookups.invalidate().await;

        info!(supplier_id = %id, document_id = %id.document_id(), "Supplier registered");
        Ok(Supplier {
            id,
            name: input.name,
            phone: input.phone.unwrap_or_default(),
            email: input.email.unwrap_or_default(),
            address: input.address.unwrap_or_default(),
            city: input.city.unwrap_or_default(),
            country: input.country.unwrap_or_default(),
            registered_at: Some(write.commit_time),
        })
    }

    #[instrument(skip(self, supplier), fields(supplier_id = %supplier.id))]
    pub async fn update(&self, supplier: &Supplier) -> Result<Supplier, ServiceError> {
        supplier.validate()?;

        let located = self
            .base
            .locate::<SupplierMapper>(supplier.id.value())
            .await?
            .ok_or_else(|| ServiceError::not_found("Supplier", supplier.id.value()))?;
        self.base
            .update::<SupplierMapper>(&located, SupplierMapper::update_payload(supplier))
            .await?;
        self.lookups.invalidate().await;

        info!("Supplier updated");
        Ok(Supplier {
            id: located.id,
            registered_at: located.registered_at,
            ..supplier.clone()
        })
    }

    /// Hard delete, refused while an active product references the supplier.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: i32) -> Result<(), ServiceError> {
        let located = self
            .base
            .locate::<SupplierMapper>(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Supplier", id))?;

        let in_use = self
            .base
            .any_where::<ProductMapper, _>(&active_products_of(id), |p| {
                p.active && p.supplier_id == id
            })
            .await?;
        if in_use {
            warn!(supplier_id = id, "Refusing to delete supplier referenced by active products");
            return Err(ServiceError::InUse(format!(
                "Supplier with ID {} is referenced by active products",
                id
            )));
        }

        self.base.delete::<SupplierMapper>(&located).await?;
        self.lookups.invalidate().await;
        info!(supplier_id = id, "Supplier deleted");
        Ok(())
    }

    /// Number of active products supplied by `supplier_id`.
    #[instrument(skip(self))]
    pub async fn count_products(&self, supplier_id: i32) -> Result<usize, ServiceError> {
        let products = self
            .base
            .fetch_where::<ProductMapper, _>(&active_products_of(supplier_id), |p| {
                p.active && p.supplier_id == supplier_id
            })
            .await?;
        Ok(products.len())
    }

    #[instrument(skip(self))]
    pub async fn count(&self) -> Result<usize, ServiceError> {
        Ok(self.base.fetch_all::<SupplierMapper>().await?.len())
    }
}

impl Repository for SupplierRepository {
    fn store(&self) -> &StoreHandle {
        self.base.store()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::DocumentMapper;
    use crate::store::{Fields, InMemoryStore};

    #[tokio::test]
    async fn search_is_case_insensitive_and_ordered() {
        let repo = SupplierRepository::new(StoreHandle::new(Arc::new(InMemoryStore::new())));
        for name in ["Acme Tools", "Global Parts", "ACME Foods"] {
            repo.add(NewSupplier::new(name)).await.unwrap();
        }
        let names: Vec<_> = repo
            .search_by_name("acme")
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["ACME Foods", "Acme Tools"]);
        assert_eq!(repo.search_by_name("").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn count_products_includes_legacy_documents() {
        let store = Arc::new(InMemoryStore::new());
        let repo = SupplierRepository::new(StoreHandle::new(store.clone()));

        let mut canonical = Fields::new();
        canonical.insert("supplierId".into(), FieldValue::from(9));
        canonical.insert("active".into(), FieldValue::from(true));
        store.insert_raw(ProductMapper::COLLECTION, "p1", canonical).await;

        let mut legacy = Fields::new();
        legacy.insert("id_proveedor".into(), FieldValue::from(9));
        legacy.insert("activo".into(), FieldValue::from(true));
        store.insert_raw(ProductMapper::COLLECTION, "p2", legacy).await;

        let mut inactive = Fields::new();
        inactive.insert("supplierId".into(), FieldValue::from(9));
        inactive.insert("active".into(), FieldValue::from(false));
        store.insert_raw(ProductMapper::COLLECTION, "p3", inactive).await;

        assert_eq!(repo.count_products(9).await.unwrap(), 2);
        assert_eq!(repo.count_products(10).await.unwrap(), 0);
    }
}
