use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

use crate::models::{Category, Product, Supplier, NO_SUPPLIER, UNCATEGORIZED};

/// `categoryId → name` and `supplierId → name` maps used to decorate products.
#[derive(Debug, Clone, Default)]
pub struct LookupTables {
    categories: HashMap<i32, String>,
    suppliers: HashMap<i32, String>,
}

impl LookupTables {
    pub fn new(categories: &[Category], suppliers: &[Supplier]) -> Self {
        Self {
            categories: categories
                .iter()
                .map(|c| (c.id.value(), c.name.clone()))
                .collect(),
            suppliers: suppliers
                .iter()
                .map(|s| (s.id.value(), s.name.clone()))
                .collect(),
        }
    }

    pub fn category_name(&self, id: i32) -> &str {
        self.categories.get(&id).map_or(UNCATEGORIZED, String::as_str)
    }

    pub fn supplier_name(&self, id: i32) -> &str {
        self.suppliers.get(&id).map_or(NO_SUPPLIER, String::as_str)
    }

    pub fn decorate(&self, mut product: Product) -> Product {
        product.category_name = Some(self.category_name(product.category_id).to_string());
        product.supplier_name = Some(self.supplier_name(product.supplier_id).to_string());
        product
    }
}

#[derive(Debug)]
struct CacheEntry {
    tables: Arc<LookupTables>,
    /// `None` when the TTL reaches past what `Instant` can represent.
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.expires_at
            .map_or(false, |expires_at| Instant::now() > expires_at)
    }
}

/// Optional time-bounded cache of [`LookupTables`]. With no TTL nothing is
/// ever cached and every listing re-reads both collections.
#[derive(Debug, Default)]
pub struct LookupCache {
    ttl: Option<Duration>,
    entry: RwLock<Option<CacheEntry>>,
}

impl LookupCache {
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            ttl: ttl.filter(|ttl| !ttl.is_zero()),
            entry: RwLock::new(None),
        }
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    pub async fn get(&self) -> Option<Arc<LookupTables>> {
        self.ttl?;
        let entry = self.entry.read().await;
        entry
            .as_ref()
            .filter(|entry| !entry.is_expired())
            .map(|entry| Arc::clone(&entry.tables))
    }

    pub async fn put(&self, tables: Arc<LookupTables>) {
        if let Some(ttl) = self.ttl {
            *self.entry.write().await = Some(CacheEntry {
                tables,
                expires_at: Instant::now().checked_add(ttl),
            });
        }
    }

    pub async fn invalidate(&self) {
        if self.entry.write().await.take().is_some() {
            debug!("Lookup tables invalidated");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::EntityId;

    fn tables() -> LookupTables {
        let category = Category {
            id: EntityId::new(1, "c1"),
            name: "Electronics".into(),
            description: String::new(),
            created_at: None,
        };
        LookupTables::new(&[category], &[])
    }

    #[test]
    fn unknown_references_get_placeholders() {
        let tables = tables();
        assert_eq!(tables.category_name(1), "Electronics");
        assert_eq!(tables.category_name(2), UNCATEGORIZED);
        assert_eq!(tables.supplier_name(9), NO_SUPPLIER);
    }

    #[tokio::test]
    async fn disabled_cache_never_returns_tables() {
        let cache = LookupCache::new(None);
        cache.put(Arc::new(tables())).await;
        assert!(cache.get().await.is_none());
    }

    #[tokio::test]
    async fn cached_tables_expire_and_invalidate() {
        let cache = LookupCache::new(Some(Duration::from_secs(60)));
        cache.put(Arc::new(tables())).await;
        assert!(cache.get().await.is_some());
        cache.invalidate().await;
        assert!(cache.get().await.is_none());

        let short = LookupCache::new(Some(Duration::from_millis(5)));
        short.put(Arc::new(tables())).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(short.get().await.is_none());
    }

    #[tokio::test]
    async fn oversized_ttl_caches_without_expiry() {
        let cache = LookupCache::new(Some(Duration::from_secs(u64::MAX)));
        cache.put(Arc::new(tables())).await;
        assert!(cache.get().await.is_some());
        cache.invalidate().await;
        assert!(cache.get().await.is_none());
    }
}
