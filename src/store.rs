//! Storage port. [`crate::database::Database`] is the Postgres adapter; the
//! in-memory adapter backs unit tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::filters::{ListingQuery, Page};
use crate::models::{
    Actor, Business, BusinessStatus, Category, DirectoryStats, LifecycleChange, NewBusiness,
    NewCategory, NewUser, Review, User,
};

#[cfg(test)]
pub mod memory;

#[async_trait]
pub trait DirectoryStore: Send + Sync {
    // Categories
    async fn list_categories(&self, active_only: bool) -> Result<Vec<Category>>;
    async fn get_category(&self, category_id: i32) -> Result<Option<Category>>;
    async fn categories_by_ids(&self, ids: &[i32]) -> Result<Vec<Category>>;
    async fn create_category(&self, category: NewCategory) -> Result<Category>;
    async fn update_category(&self, category: Category) -> Result<Category>;
    /// Fails with `Conflict` while any listing references the category.
    async fn delete_category(&self, category_id: i32) -> Result<()>;

    // Users
    async fn create_user(&self, user: NewUser) -> Result<User>;
    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>>;
    async fn users_by_ids(&self, ids: &[Uuid]) -> Result<Vec<User>>;
    async fn update_user_profile(&self, user: User) -> Result<User>;

    // Listings
    /// One page of matches plus the total match count.
    async fn search_businesses(&self, query: &ListingQuery, page: Page)
        -> Result<(Vec<Business>, i64)>;
    async fn get_business(&self, business_id: Uuid) -> Result<Option<Business>>;
    /// Atomic `views = views + 1`.
    async fn increment_views(&self, business_id: Uuid) -> Result<()>;
    async fn businesses_for_owner(&self, owner_id: Uuid) -> Result<Vec<Business>>;
    /// Case-sensitive distinct, lexicographically sorted, non-blank cities of active listings.
    async fn distinct_active_cities(&self) -> Result<Vec<String>>;
    /// Inserts the listing and promotes/links the creator in one transaction.
    async fn insert_business(&self, business: NewBusiness, creator: &Actor) -> Result<Business>;
    async fn update_business(&self, business: Business) -> Result<Business>;
    /// Reviews cascade.
    async fn delete_business(&self, business_id: Uuid) -> Result<()>;
    /// Sets owner, claim time and pending state only if the listing is still unowned,
    /// and promotes/links the claimer in the same transaction. `None` when already owned
    /// or missing.
    async fn claim_business(
        &self,
        business_id: Uuid,
        claimer: &Actor,
        claimed_at: DateTime<Utc>,
    ) -> Result<Option<Business>>;
    /// Compare-and-set on the derived status: applies `change` only when the listing is
    /// currently in one of `from`. `None` when the guard fails or the listing is missing.
    async fn transition_business(
        &self,
        business_id: Uuid,
        from: &[BusinessStatus],
        change: &LifecycleChange,
    ) -> Result<Option<Business>>;

    // Suggestions (active listings / categories only)
    async fn business_name_matches(&self, fragment: &str, limit: i64) -> Result<Vec<Business>>;
    async fn category_name_matches(&self, fragment: &str, limit: i64) -> Result<Vec<Category>>;
    async fn location_matches(&self, fragment: &str, limit: i64) -> Result<Vec<(String, String)>>;

    // Reviews
    async fn create_review(&self, review: Review) -> Result<Review>;
    async fn get_review(&self, review_id: Uuid) -> Result<Option<Review>>;
    async fn reviews_for_business(
        &self,
        business_id: Uuid,
        include_unapproved: bool,
    ) -> Result<Vec<Review>>;
    /// Marks approved and recomputes the parent's rating aggregates atomically.
    async fn approve_review(&self, review_id: Uuid) -> Result<Option<Review>>;
    /// Deletes and recomputes the parent's rating aggregates atomically.
    async fn delete_review(&self, review_id: Uuid) -> Result<()>;

    async fn stats(&self) -> Result<DirectoryStats>;
}
