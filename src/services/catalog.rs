use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::entities::cart_item;
use crate::entities::category::{self, Entity as Category};
use crate::entities::product::{self, Entity as Product};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::images::ImageStore;

/// Catalog service owning categories, products and their stored images.
///
/// Public reads return [`ProductView`]s with the category name and image URL
/// already joined in; admin mutations keep the image files on disk in step
/// with the `image_name` column.
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    image_store: ImageStore,
    default_page_size: u64,
    max_page_size: u64,
}

/// Product as served to clients. Prices are live catalog prices.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProductView {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub weight: Decimal,
    pub category_id: Uuid,
    pub category_name: Option<String>,
    pub image_url: Option<String>,
    #[schema(value_type = String, format = DateTime)]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = String, format = DateTime)]
    pub updated_at: DateTime<Utc>,
}

/// One page of products plus the unpaged total.
#[derive(Debug, Clone)]
pub struct ProductPage {
    pub products: Vec<ProductView>,
    pub total: u64,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateCategoryInput {
    #[validate(length(min = 1, max = 100, message = "Category name is required"))]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct UpdateCategoryInput {
    #[validate(length(min = 1, max = 100, message = "Category name is required"))]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateProductInput {
    #[validate(length(min = 1, max = 200, message = "Product name is required"))]
    pub name: String,
    #[validate(length(max = 4000, message = "Description is too long"))]
    pub description: String,
    pub price: Decimal,
    pub weight: Decimal,
    pub category_id: Uuid,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateProductInput {
    #[validate(length(min = 1, max = 200, message = "Product name is required"))]
    pub name: String,
    #[validate(length(max = 4000, message = "Description is too long"))]
    pub description: String,
    pub price: Decimal,
    pub weight: Decimal,
    pub category_id: Uuid,
}

/// Raw upload as received from a multipart form.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl CatalogService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        image_store: ImageStore,
        default_page_size: u64,
        max_page_size: u64,
    ) -> Self {
        Self {
            db,
            event_sender,
            image_store,
            default_page_size,
            max_page_size,
        }
    }

    pub fn default_page_size(&self) -> u64 {
        self.default_page_size
    }

    fn clamp_page(&self, page: u64, per_page: u64) -> (u64, u64) {
        let page = page.max(1);
        let per_page = per_page.clamp(1, self.max_page_size);
        (page, per_page)
    }

    fn view_from(&self, model: product::Model, category: Option<category::Model>) -> ProductView {
        let image_url = model
            .image_name
            .as_deref()
            .map(|name| self.image_store.url_for(name));

        ProductView {
            id: model.id,
            name: model.name,
            description: model.description,
            price: model.price,
            weight: model.weight,
            category_id: model.category_id,
            category_name: category.map(|c| c.name),
            image_url,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }

    // Categories

    #[instrument(skip(self))]
    pub async fn list_categories(&self) -> Result<Vec<category::Model>, ServiceError> {
        let categories = Category::find()
            .order_by_asc(category::Column::Name)
            .all(&*self.db)
            .await?;
        Ok(categories)
    }

    #[instrument(skip(self))]
    pub async fn get_category(&self, category_id: Uuid) -> Result<category::Model, ServiceError> {
        Category::find_by_id(category_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Category {} not found", category_id)))
    }

    #[instrument(skip(self))]
    pub async fn create_category(
        &self,
        input: CreateCategoryInput,
    ) -> Result<category::Model, ServiceError> {
        input.validate()?;

        let category_id = Uuid::new_v4();
        let category = category::ActiveModel {
            id: Set(category_id),
            name: Set(input.name.trim().to_string()),
            ..Default::default()
        };
        let category = category.insert(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::CategoryCreated(category_id))
            .await;

        info!("Created category {}", category_id);
        Ok(category)
    }

    #[instrument(skip(self))]
    pub async fn update_category(
        &self,
        category_id: Uuid,
        input: UpdateCategoryInput,
    ) -> Result<category::Model, ServiceError> {
        input.validate()?;

        let category = self.get_category(category_id).await?;

        let mut category: category::ActiveModel = category.into();
        category.name = Set(input.name.trim().to_string());
        let category = category.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::CategoryUpdated(category_id))
            .await;

        Ok(category)
    }

    /// Deletes a category. Refused while any product still references it;
    /// products must be moved or removed first.
    #[instrument(skip(self))]
    pub async fn delete_category(&self, category_id: Uuid) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;

        let category = Category::find_by_id(category_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Category {} not found", category_id)))?;

        let product_count = Product::find()
            .filter(product::Column::CategoryId.eq(category_id))
            .count(&txn)
            .await?;
        if product_count > 0 {
            return Err(ServiceError::Conflict(format!(
                "Category {} still has {} product(s)",
                category_id, product_count
            )));
        }

        category.delete(&txn).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CategoryDeleted(category_id))
            .await;

        info!("Deleted category {}", category_id);
        Ok(())
    }

    // Products

    #[instrument(skip(self))]
    pub async fn list_products(&self, page: u64, per_page: u64) -> Result<ProductPage, ServiceError> {
        let (page, per_page) = self.clamp_page(page, per_page);

        let paginator = Product::find()
            .find_also_related(Category)
            .order_by_asc(product::Column::Name)
            .paginate(&*self.db, per_page);

        let total = paginator.num_items().await?;
        let rows = paginator.fetch_page(page - 1).await?;

        Ok(ProductPage {
            products: rows
                .into_iter()
                .map(|(product, category)| self.view_from(product, category))
                .collect(),
            total,
        })
    }

    #[instrument(skip(self))]
    pub async fn list_products_by_category(
        &self,
        category_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<ProductPage, ServiceError> {
        // Listing an unknown category is a 404, not an empty page.
        self.get_category(category_id).await?;

        let (page, per_page) = self.clamp_page(page, per_page);

        let paginator = Product::find()
            .filter(product::Column::CategoryId.eq(category_id))
            .find_also_related(Category)
            .order_by_asc(product::Column::Name)
            .paginate(&*self.db, per_page);

        let total = paginator.num_items().await?;
        let rows = paginator.fetch_page(page - 1).await?;

        Ok(ProductPage {
            products: rows
                .into_iter()
                .map(|(product, category)| self.view_from(product, category))
                .collect(),
            total,
        })
    }

    #[instrument(skip(self))]
    pub async fn get_product(&self, product_id: Uuid) -> Result<ProductView, ServiceError> {
        let (product, category) = Product::find_by_id(product_id)
            .find_also_related(Category)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        Ok(self.view_from(product, category))
    }

    #[instrument(skip(self, image))]
    pub async fn create_product(
        &self,
        input: CreateProductInput,
        image: Option<ImageUpload>,
    ) -> Result<ProductView, ServiceError> {
        input.validate()?;
        validate_amounts(input.price, input.weight)?;

        // An unknown category is a caller mistake, not a missing resource.
        let category = Category::find_by_id(input.category_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::BadRequest(format!("Category {} does not exist", input.category_id))
            })?;

        let stored_image = match image {
            Some(upload) => Some(self.image_store.save(&upload.file_name, &upload.bytes).await?),
            None => None,
        };

        let product_id = Uuid::new_v4();
        let product = product::ActiveModel {
            id: Set(product_id),
            name: Set(input.name.trim().to_string()),
            description: Set(input.description),
            price: Set(input.price),
            weight: Set(input.weight),
            category_id: Set(input.category_id),
            image_name: Set(stored_image.clone()),
            ..Default::default()
        };

        let product = match product.insert(&*self.db).await {
            Ok(product) => product,
            Err(e) => {
                // Do not leave an orphaned file behind a failed insert.
                if let Some(name) = stored_image {
                    self.image_store.delete(&name).await;
                }
                return Err(e.into());
            }
        };

        self.event_sender
            .send_or_log(Event::ProductCreated(product_id))
            .await;

        info!("Created product {}", product_id);
        Ok(self.view_from(product, Some(category)))
    }

    #[instrument(skip(self, image))]
    pub async fn update_product(
        &self,
        product_id: Uuid,
        input: UpdateProductInput,
        image: Option<ImageUpload>,
    ) -> Result<ProductView, ServiceError> {
        input.validate()?;
        validate_amounts(input.price, input.weight)?;

        let product = Product::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        let category = Category::find_by_id(input.category_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::BadRequest(format!("Category {} does not exist", input.category_id))
            })?;

        let stored_image = match image {
            Some(upload) => Some(self.image_store.save(&upload.file_name, &upload.bytes).await?),
            None => None,
        };
        let previous_image = product.image_name.clone();

        let mut product: product::ActiveModel = product.into();
        product.name = Set(input.name.trim().to_string());
        product.description = Set(input.description);
        product.price = Set(input.price);
        product.weight = Set(input.weight);
        product.category_id = Set(input.category_id);
        if let Some(ref name) = stored_image {
            product.image_name = Set(Some(name.clone()));
        }

        let updated = match product.update(&*self.db).await {
            Ok(updated) => updated,
            Err(e) => {
                if let Some(name) = stored_image {
                    self.image_store.delete(&name).await;
                }
                return Err(e.into());
            }
        };

        // Replacing an image retires the previous file best-effort.
        if stored_image.is_some() {
            if let Some(old) = previous_image {
                if stored_image.as_deref() != Some(old.as_str()) {
                    self.image_store.delete(&old).await;
                }
            }
        }

        self.event_sender
            .send_or_log(Event::ProductUpdated(product_id))
            .await;

        Ok(self.view_from(updated, Some(category)))
    }

    /// Deletes a product. Cart lines referencing it are removed in the same
    /// transaction; existing order lines keep their snapshotted copy.
    #[instrument(skip(self))]
    pub async fn delete_product(&self, product_id: Uuid) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;

        let product = Product::find_by_id(product_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;
        let image_name = product.image_name.clone();

        cart_item::Entity::delete_many()
            .filter(cart_item::Column::ProductId.eq(product_id))
            .exec(&txn)
            .await?;

        product.delete(&txn).await?;
        txn.commit().await?;

        if let Some(name) = image_name {
            self.image_store.delete(&name).await;
        }

        self.event_sender
            .send_or_log(Event::ProductDeleted(product_id))
            .await;

        info!("Deleted product {}", product_id);
        Ok(())
    }
}

fn validate_amounts(price: Decimal, weight: Decimal) -> Result<(), ServiceError> {
    if price < Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "Price cannot be negative".to_string(),
        ));
    }
    if weight < Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "Weight cannot be negative".to_string(),
        ));
    }
    Ok(())
}
