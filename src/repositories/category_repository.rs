use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use validator::Validate;

use super::{BaseRepository, LookupCache, Repository};
use crate::errors::ServiceError;
use crate::mapper::{product, CategoryMapper, ProductMapper};
use crate::models::{Category, NewCategory};
use crate::store::{FieldValue, StoreHandle};

/// Categories, ordered by name wherever a list is returned.
#[derive(Debug, Clone)]
pub struct CategoryRepository {
    base: BaseRepository,
    lookups: Arc<LookupCache>,
}

impl CategoryRepository {
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
    pub async fn list_all(&self) -> Result<Vec<Category>, ServiceError> {
        let mut categories = self.base.fetch_all::<CategoryMapper>().await?;
        categories.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(categories)
    }

    #[instrument(skip(self))]
    pub async fn get_by_id(&self, id: i32) -> Result<Option<Category>, ServiceError> {
        self.base.locate::<CategoryMapper>(id).await
    }

    #[instrument(skip(self))]
    pub async fn get_by_document_id(&self, document_id: &str) -> Result<Option<Category>, ServiceError> {
        self.base.find_by_document_id::<CategoryMapper>(document_id).await
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn add(&self, input: NewCategory) -> Result<Category, ServiceError> {
        input.validate()?;

        let (id, write) = self
            .base
            .create::<CategoryMapper, _>(|id| CategoryMapper::creation_payload(id, &input))
            .await?;
        self.lookups.invalidate().await;

        info!(category_id = %id, document_id = %id.document_id(), "Category created");
        Ok(Category {
            id,
            name: input.name,
            description: input.description.unwrap_or_default(),
            created_at: Some(write.commit_time),
        })
    }

    /// Overwrites name and description of the category with `category.id`.
    #[instrument(skip(self, category), fields(category_id = %category.id))]
    pub async fn update(&self, category: &Category) -> Result<Category, ServiceError> {
        category.validate()?;

        let located = self
            .base
            .locate::<CategoryMapper>(category.id.value())
            .await?
            .ok_or_else(|| ServiceError::not_found("Category", category.id.value()))?;
        self.base
            .update::<CategoryMapper>(&located, CategoryMapper::update_payload(category))
            .await?;
        self.lookups.invalidate().await;

        info!("Category updated");
        Ok(Category {
            id: located.id,
            created_at: located.created_at,
            ..category.clone()
        })
    }

    /// Hard delete, refused while an active product references the category.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: i32) -> Result<(), ServiceError> {
        let located = self
            .base
            .locate::<CategoryMapper>(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Category", id))?;

        let in_use = self
            .base
            .any_where::<ProductMapper, _>(
                &[
                    (product::fields::CATEGORY_ID, FieldValue::from(id)),
                    (product::fields::ACTIVE, FieldValue::from(true)),
                ],
                |p| p.active && p.category_id == id,
            )
            .await?;
        if in_use {
            warn!(category_id = id, "Refusing to delete category referenced by active products");
            return Err(ServiceError::InUse(format!(
                "Category with ID {} is referenced by active products",
                id
            )));
        }

        self.base.delete::<CategoryMapper>(&located).await?;
        self.lookups.invalidate().await;
        info!(category_id = id, "Category deleted");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn count(&self) -> Result<usize, ServiceError> {
        Ok(self.base.fetch_all::<CategoryMapper>().await?.len())
    }
}

impl Repository for CategoryRepository {
    fn store(&self) -> &StoreHandle {
        self.base.store()
    }
}
