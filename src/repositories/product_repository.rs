use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};
use validator::Validate;

use super::{BaseRepository, Filter, LookupCache, LookupTables, Repository};
use crate::errors::ServiceError;
use crate::mapper::product::fields;
use crate::mapper::{CategoryMapper, ProductMapper, SupplierMapper};
use crate::models::{Category, NewProduct, Product, Supplier};
use crate::store::{FieldValue, StoreHandle};

/// Products, with category and supplier names resolved client-side.
///
/// Listings only ever return active products. Soft-deleted products remain
/// readable through [`ProductRepository::get_by_id`].
#[derive(Debug, Clone)]
pub struct ProductRepository {
    base: BaseRepository,
    lookups: Arc<LookupCache>,
}

fn by_name(a: &Product, b: &Product) -> Ordering {
    a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id))
}

fn active() -> Filter {
    (fields::ACTIVE, FieldValue::from(true))
}

impl ProductRepository {
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

    /// Current lookup tables, cached when a TTL is configured.
    async fn lookups(&self) -> Result<Arc<LookupTables>, ServiceError> {
        if let Some(tables) = self.lookups.get().await {
            return Ok(tables);
        }
        let categories = self.base.fetch_all::<CategoryMapper>().await?;
        let suppliers = self.base.fetch_all::<SupplierMapper>().await?;
        debug!(
            categories = categories.len(),
            suppliers = suppliers.len(),
            "Loaded lookup tables"
        );
        let tables = Arc::new(LookupTables::new(&categories, &suppliers));
        self.lookups.put(Arc::clone(&tables)).await;
        Ok(tables)
    }

    async fn active_where(&self, extra: Option<Filter>) -> Result<Vec<Product>, ServiceError> {
        let mut filters = vec![active()];
        filters.extend(extra);
        self.base
            .fetch_where::<ProductMapper, _>(&filters, |p| p.active)
            .await
    }

    async fn enrich(&self, products: Vec<Product>) -> Result<Vec<Product>, ServiceError> {
        let tables = self.lookups().await?;
        Ok(products.into_iter().map(|p| tables.decorate(p)).collect())
    }

    /// Resolves both references, failing with `ValidationFailed` if either is
    /// missing.
    async fn resolve_references(
        &self,
        category_id: i32,
        supplier_id: i32,
    ) -> Result<(Category, Supplier), ServiceError> {
        let category = self
            .base
            .locate::<CategoryMapper>(category_id)
            .await?
            .ok_or_else(|| {
                ServiceError::validation(format!("Category with ID {} does not exist", category_id))
            })?;
        let supplier = self
            .base
            .locate::<SupplierMapper>(supplier_id)
            .await?
            .ok_or_else(|| {
                ServiceError::validation(format!("Supplier with ID {} does not exist", supplier_id))
            })?;
        Ok((category, supplier))
    }

    async fn locate(&self, id: i32) -> Result<Product, ServiceError> {
        self.base
            .locate::<ProductMapper>(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Product", id))
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn add(&self, input: NewProduct) -> Result<Product, ServiceError> {
        input.validate()?;
        let (category, supplier) = self
            .resolve_references(input.category_id, input.supplier_id)
            .await?;

        let (id, write) = self
            .base
            .create::<ProductMapper, _>(|id| ProductMapper::creation_payload(id, &input))
            .await?;

        info!(product_id = %id, document_id = %id.document_id(), "Product created");
        Ok(Product {
            id,
            name: input.name,
            description: input.description.unwrap_or_default(),
            unit_price: input.unit_price,
            stock_on_hand: input.stock_on_hand,
            stock_min: input.stock_min,
            category_id: input.category_id,
            supplier_id: input.supplier_id,
            barcode: input.barcode.unwrap_or_default(),
            active: true,
            registered_at: Some(write.commit_time),
            updated_at: Some(write.commit_time),
            category_name: Some(category.name),
            supplier_name: Some(supplier.name),
        })
    }

    /// Overwrites the mutable fields of the product with `product.id`,
    /// including `active`, and refreshes `updatedAt`.
    #[instrument(skip(self, product), fields(product_id = %product.id))]
    pub async fn update(&self, product: &Product) -> Result<Product, ServiceError> {
        product.validate()?;
        let (category, supplier) = self
            .resolve_references(product.category_id, product.supplier_id)
            .await?;
        let located = self.locate(product.id.value()).await?;

        let write = self
            .base
            .update::<ProductMapper>(&located, ProductMapper::update_payload(product))
            .await?;

        info!("Product updated");
        Ok(Product {
            id: located.id,
            registered_at: located.registered_at,
            updated_at: Some(write.commit_time),
            category_name: Some(category.name),
            supplier_name: Some(supplier.name),
            ..product.clone()
        })
    }

    #[instrument(skip(self))]
    pub async fn soft_delete(&self, id: i32) -> Result<(), ServiceError> {
        let located = self.locate(id).await?;
        self.base
            .update::<ProductMapper>(&located, ProductMapper::deactivation_payload())
            .await?;
        info!(product_id = id, "Product deactivated");
        Ok(())
    }

    /// Any product with this id, active or not.
    #[instrument(skip(self))]
    pub async fn get_by_id(&self, id: i32) -> Result<Option<Product>, ServiceError> {
        match self.base.locate::<ProductMapper>(id).await? {
            Some(product) => Ok(Some(self.lookups().await?.decorate(product))),
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    pub async fn get_by_document_id(&self, document_id: &str) -> Result<Option<Product>, ServiceError> {
        match self.base.find_by_document_id::<ProductMapper>(document_id).await? {
            Some(product) => Ok(Some(self.lookups().await?.decorate(product))),
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    pub async fn list_all_active(&self) -> Result<Vec<Product>, ServiceError> {
        let mut products = self.enrich(self.active_where(None).await?).await?;
        products.sort_by(by_name);
        Ok(products)
    }

    /// Case-insensitive substring match on the name over active products.
    #[instrument(skip(self))]
    pub async fn search_by_name(&self, query: &str) -> Result<Vec<Product>, ServiceError> {
        let needle = query.to_lowercase();
        let matching = self
            .active_where(None)
            .await?
            .into_iter()
            .filter(|p| p.name.to_lowercase().contains(&needle))
            .collect();
        let mut products = self.enrich(matching).await?;
        products.sort_by(by_name);
        Ok(products)
    }

    #[instrument(skip(self))]
    pub async fn find_by_category(&self, category_id: i32) -> Result<Vec<Product>, ServiceError> {
        let matching = self
            .active_where(Some((fields::CATEGORY_ID, FieldValue::from(category_id))))
            .await?
            .into_iter()
            .filter(|p| p.category_id == category_id)
            .collect();
        let mut products = self.enrich(matching).await?;
        products.sort_by(by_name);
        Ok(products)
    }

    /// First active product with exactly this barcode, by name order.
    #[instrument(skip(self))]
    pub async fn find_by_barcode(&self, barcode: &str) -> Result<Option<Product>, ServiceError> {
        let first = self
            .active_where(Some((fields::BARCODE, FieldValue::from(barcode))))
            .await?
            .into_iter()
            .filter(|p| p.barcode == barcode)
            .min_by(by_name);
        match first {
            Some(product) => Ok(Some(self.lookups().await?.decorate(product))),
            None => Ok(None),
        }
    }

    /// Active products with stock on hand at or below their minimum, lowest
    /// stock first.
    #[instrument(skip(self))]
    pub async fn list_low_stock(&self) -> Result<Vec<Product>, ServiceError> {
        let low = self
            .active_where(None)
            .await?
            .into_iter()
            .filter(Product::is_low_stock)
            .collect();
        let mut products = self.enrich(low).await?;
        products.sort_by(|a, b| {
            a.stock_on_hand
                .cmp(&b.stock_on_hand)
                .then_with(|| by_name(a, b))
        });
        Ok(products)
    }

    /// Overwrites `stockOnHand` only.
    #[instrument(skip(self))]
    pub async fn set_stock(&self, id: i32, stock_on_hand: i32) -> Result<(), ServiceError> {
        if stock_on_hand < 0 {
            return Err(ServiceError::validation(format!(
                "stock on hand must not be negative, got {}",
                stock_on_hand
            )));
        }
        let located = self.locate(id).await?;
        self.base
            .update::<ProductMapper>(&located, ProductMapper::stock_payload(stock_on_hand))
            .await?;
        info!(product_id = id, stock_on_hand, "Stock updated");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn count_active(&self) -> Result<usize, ServiceError> {
        Ok(self.active_where(None).await?.len())
    }

    /// Sum of `unitPrice × stockOnHand` over active products.
    #[instrument(skip(self))]
    pub async fn inventory_value(&self) -> Result<f64, ServiceError> {
        Ok(self
            .active_where(None)
            .await?
            .iter()
            .map(Product::stock_value)
            .sum())
    }
}

impl Repository for ProductRepository {
    fn store(&self) -> &StoreHandle {
        self.base.store()
    }
}
