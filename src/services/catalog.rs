//! Categories, user profiles and directory-wide counts.

use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use super::listing::slug_base;
use super::{ensure_admin, ServiceContext};
use crate::error::{DirectoryError, Result};
use crate::models::{
    Actor, Category, CategoryRequest, DirectoryStats, NewCategory, NewUser, RegisterUserRequest,
    UpdateProfileRequest, User, UserRole,
};

#[derive(Clone)]
pub struct CatalogService {
    ctx: ServiceContext,
}

impl CatalogService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    // ========================================================================
    // CATEGORIES
    // ========================================================================

    pub async fn list_categories(&self, active_only: bool) -> Result<Vec<Category>> {
        self.ctx.store.list_categories(active_only).await
    }

    pub async fn get_category(&self, category_id: i32) -> Result<Category> {
        self.ctx
            .store
            .get_category(category_id)
            .await?
            .ok_or_else(|| DirectoryError::not_found("Category"))
    }

    pub async fn create_category(&self, request: CategoryRequest, actor: &Actor) -> Result<Category> {
        ensure_admin(actor)?;
        request.validate()?;
        let name = request.name.trim().to_string();
        let category = NewCategory {
            slug: category_slug(&name)?,
            name,
            icon: request.icon,
            description: request.description,
            display_order: request.display_order,
            is_active: request.is_active,
        };
        let created = self.ctx.store.create_category(category).await?;

        self.ctx
            .record(
                "category_created",
                format!("Category \"{}\" was created", created.name),
                Some(actor),
                json!({ "categoryId": created.id }),
            )
            .await;
        Ok(created)
    }

    pub async fn update_category(
        &self,
        category_id: i32,
        request: CategoryRequest,
        actor: &Actor,
    ) -> Result<Category> {
        ensure_admin(actor)?;
        request.validate()?;
        let mut category = self.get_category(category_id).await?;

        let name = request.name.trim().to_string();
        if name != category.name {
            category.slug = category_slug(&name)?;
            category.name = name;
        }
        category.icon = request.icon;
        category.description = request.description;
        category.display_order = request.display_order;
        category.is_active = request.is_active;

        let updated = self.ctx.store.update_category(category).await?;
        self.ctx
            .record(
                "category_updated",
                format!("Category \"{}\" was updated", updated.name),
                Some(actor),
                json!({ "categoryId": updated.id }),
            )
            .await;
        Ok(updated)
    }

    /// Blocked with `Conflict` while listings still use the category.
    pub async fn delete_category(&self, category_id: i32, actor: &Actor) -> Result<()> {
        ensure_admin(actor)?;
        self.ctx.store.delete_category(category_id).await?;
        self.ctx
            .record(
                "category_deleted",
                format!("Category {category_id} was deleted"),
                Some(actor),
                json!({ "categoryId": category_id }),
            )
            .await;
        Ok(())
    }

    // ========================================================================
    // USERS
    // ========================================================================

    /// Creates the directory profile for an identity the gateway has already
    /// authenticated. Everyone starts as a plain user.
    pub async fn register_user(&self, request: RegisterUserRequest, actor: &Actor) -> Result<User> {
        request.validate()?;
        let user = NewUser {
            id: actor.id,
            email: request.email.trim().to_lowercase(),
            name: request.name.trim().to_string(),
            role: UserRole::User,
        };
        let user = self.ctx.store.create_user(user).await?;

        self.ctx
            .record(
                "user_registered",
                format!("{} joined the directory", user.name),
                Some(actor),
                json!({ "userId": user.id }),
            )
            .await;
        Ok(user)
    }

    pub async fn profile(&self, actor: &Actor) -> Result<User> {
        self.load_user(actor.id).await
    }

    pub async fn update_profile(&self, request: UpdateProfileRequest, actor: &Actor) -> Result<User> {
        request.validate()?;
        let mut user = self.load_user(actor.id).await?;
        request.apply_to_existing(&mut user);
        self.ctx.store.update_user_profile(user).await
    }

    pub async fn stats(&self, actor: &Actor) -> Result<DirectoryStats> {
        ensure_admin(actor)?;
        self.ctx.store.stats().await
    }

    async fn load_user(&self, user_id: Uuid) -> Result<User> {
        self.ctx
            .store
            .get_user(user_id)
            .await?
            .ok_or_else(|| DirectoryError::not_found("User"))
    }
}

fn category_slug(name: &str) -> Result<String> {
    let slug = slug_base(name);
    if slug.is_empty() {
        return Err(DirectoryError::Validation(
            "Category name must contain letters or digits".into(),
        ));
    }
    Ok(slug)
}
