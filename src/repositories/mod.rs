/*!
 * # Repositories
 *
 * Per-entity data access over a [`StoreHandle`]. The store answers equality
 * queries only, so every repository follows the same pattern: narrow
 * server-side with equality predicates, then filter, order and aggregate the
 * decoded entities client-side.
 *
 * Predicates are issued once per combination of canonical and legacy field
 * names, the results merged by document id and re-checked against the
 * decoded entity, where the canonical value wins. Documents written before a
 * field was renamed therefore stay visible to the same listings.
 */

use metrics::counter;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::errors::ServiceError;
use crate::ids::EntityId;
use crate::mapper::{DocumentMapper, FieldSpec};
use crate::store::{Document, FieldValue, Fields, Query, StoreHandle, WriteResult};

pub mod category_repository;
pub mod lookup;
pub mod product_repository;
pub mod supplier_repository;

pub use category_repository::CategoryRepository;
pub use lookup::{LookupCache, LookupTables};
pub use product_repository::ProductRepository;
pub use supplier_repository::SupplierRepository;

/// Repository trait for common store access
pub trait Repository {
    fn store(&self) -> &StoreHandle;
}

/// Equality predicate on a field, matched under any of its names.
pub type Filter = (FieldSpec, FieldValue);

#[derive(Debug, Clone)]
pub struct BaseRepository {
    store: StoreHandle,
}

impl BaseRepository {
    pub fn new(store: StoreHandle) -> Self {
        Self { store }
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            store: self.store.with_timeout(timeout),
        }
    }

    /// Decodes a listed document, logging and counting it when it is skipped.
    fn decode<M: DocumentMapper>(doc: &Document) -> Option<M::Entity> {
        match M::from_document(doc) {
            Ok(entity) => Some(entity),
            Err(e) => {
                warn!(
                    collection = %e.collection,
                    document_id = %e.document_id,
                    reason = %e.reason,
                    "Skipping undecodable document"
                );
                counter!("stockkeeper_mapper.decode.skipped", 1, "collection" => M::COLLECTION);
                None
            }
        }
    }

    /// One query per combination of field names, canonical names first.
    fn variants(collection: &str, filters: &[Filter]) -> Vec<Query> {
        filters
            .iter()
            .fold(vec![Query::collection(collection)], |queries, (spec, value)| {
                queries
                    .iter()
                    .flat_map(|query| {
                        spec.names()
                            .map(move |name| query.clone().where_eq(name, value.clone()))
                    })
                    .collect()
            })
    }

    /// Every decodable document of the collection.
    pub async fn fetch_all<M: DocumentMapper>(&self) -> Result<Vec<M::Entity>, ServiceError> {
        let docs = self.store.query(&Query::collection(M::COLLECTION)).await?;
        Ok(docs.iter().filter_map(Self::decode::<M>).collect())
    }

    /// Decodable documents matching `filters` under any field name and
    /// accepted by `accept`, in document id order.
    pub async fn fetch_where<M, F>(
        &self,
        filters: &[Filter],
        accept: F,
    ) -> Result<Vec<M::Entity>, ServiceError>
    where
        M: DocumentMapper,
        F: Fn(&M::Entity) -> bool,
    {
        let mut merged: BTreeMap<String, Document> = BTreeMap::new();
        for query in Self::variants(M::COLLECTION, filters) {
            for doc in self.store.query(&query).await? {
                merged.entry(doc.id.clone()).or_insert(doc);
            }
        }
        Ok(merged
            .values()
            .filter_map(Self::decode::<M>)
            .filter(|entity| accept(entity))
            .collect())
    }

    /// Whether any document matches, using `LIMIT 1` per name combination.
    pub async fn any_where<M, F>(&self, filters: &[Filter], accept: F) -> Result<bool, ServiceError>
    where
        M: DocumentMapper,
        F: Fn(&M::Entity) -> bool,
    {
        for query in Self::variants(M::COLLECTION, filters) {
            let hits = self.store.query(&query.clone().limit(1)).await?;
            if hits.is_empty() {
                continue;
            }
            if hits.iter().filter_map(Self::decode::<M>).any(|e| accept(&e)) {
                return Ok(true);
            }
            // The first hit was overridden by a canonical value; check the rest.
            let all = self.store.query(&query).await?;
            if all.iter().filter_map(Self::decode::<M>).any(|e| accept(&e)) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Locates an entity by numeric id: `id == n LIMIT 1` under each id field
    /// name, then a collection scan for ids synthesized from the document id.
    ///
    /// A located document that cannot be decoded is an error, not a miss.
    pub async fn locate<M: DocumentMapper>(&self, id: i32) -> Result<Option<M::Entity>, ServiceError> {
        let matches = |entity: &M::Entity| M::entity_id(entity).value() == id;

        for query in Self::variants(M::COLLECTION, &[(M::ID, FieldValue::from(id))]) {
            let hits = self.store.query(&query.clone().limit(1)).await?;
            let Some(doc) = hits.first() else {
                continue;
            };
            let entity = M::from_document(doc)?;
            if matches(&entity) {
                return Ok(Some(entity));
            }
            let all = self.store.query(&query).await?;
            if let Some(entity) = all.iter().filter_map(Self::decode::<M>).find(|e| matches(e)) {
                return Ok(Some(entity));
            }
        }

        debug!(collection = M::COLLECTION, id, "Falling back to collection scan");
        Ok(self.fetch_all::<M>().await?.into_iter().find(|e| matches(e)))
    }

    pub async fn find_by_document_id<M: DocumentMapper>(
        &self,
        document_id: &str,
    ) -> Result<Option<M::Entity>, ServiceError> {
        match self.store.get(M::COLLECTION, document_id).await? {
            Some(doc) => Ok(Some(M::from_document(&doc)?)),
            None => Ok(None),
        }
    }

    /// Allocates a document id, derives the numeric id from it and writes the
    /// payload in a single create.
    pub async fn create<M, P>(&self, payload: P) -> Result<(EntityId, WriteResult), ServiceError>
    where
        M: DocumentMapper,
        P: FnOnce(&EntityId) -> Fields,
    {
        let id = EntityId::from_document_id(self.store.allocate_id()?);
        let result = self
            .store
            .create(M::COLLECTION, id.document_id(), payload(&id))
            .await?;
        Ok((id, result))
    }

    pub async fn update<M: DocumentMapper>(
        &self,
        located: &M::Entity,
        fields: Fields,
    ) -> Result<WriteResult, ServiceError> {
        self.store
            .update(M::COLLECTION, M::entity_id(located).document_id(), fields)
            .await
    }

    pub async fn delete<M: DocumentMapper>(&self, located: &M::Entity) -> Result<(), ServiceError> {
        self.store
            .delete(M::COLLECTION, M::entity_id(located).document_id())
            .await
    }
}

impl Repository for BaseRepository {
    fn store(&self) -> &StoreHandle {
        &self.store
    }
}

/// Category, supplier and product repositories sharing one store handle and
/// one lookup cache, so category and supplier writes invalidate the product
/// decorations.
#[derive(Debug, Clone)]
pub struct InventoryRepository {
    categories: CategoryRepository,
    suppliers: SupplierRepository,
    products: ProductRepository,
}

impl InventoryRepository {
    pub fn new(store: StoreHandle) -> Self {
        Self::with_lookup_ttl(store, None)
    }

    /// Caches the product lookup tables for `ttl`.
    pub fn with_lookup_ttl(store: StoreHandle, ttl: Option<Duration>) -> Self {
        let base = BaseRepository::new(store);
        let lookups = Arc::new(LookupCache::new(ttl));
        Self {
            categories: CategoryRepository::from_parts(base.clone(), Arc::clone(&lookups)),
            suppliers: SupplierRepository::from_parts(base.clone(), Arc::clone(&lookups)),
            products: ProductRepository::from_parts(base, lookups),
        }
    }

    /// Repositories over the process-global connector's handle.
    pub fn from_global() -> Result<Self, ServiceError> {
        let connector = crate::connector::global();
        Ok(Self::with_lookup_ttl(
            connector.handle()?,
            connector.lookup_cache_ttl(),
        ))
    }

    /// Same repositories with a different per-operation deadline.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            categories: self.categories.with_timeout(timeout),
            suppliers: self.suppliers.with_timeout(timeout),
            products: self.products.with_timeout(timeout),
        }
    }

    pub fn categories(&self) -> &CategoryRepository {
        &self.categories
    }

    pub fn suppliers(&self) -> &SupplierRepository {
        &self.suppliers
    }

    pub fn products(&self) -> &ProductRepository {
        &self.products
    }
}
