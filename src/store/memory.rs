use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::DirectoryStore;
use crate::error::{DirectoryError, Result};
use crate::filters::{ListingQuery, Page};
use crate::models::{
    Actor, Business, BusinessStatus, Category, DirectoryStats, LifecycleChange, NewBusiness,
    NewCategory, NewUser, Review, User, UserRole,
};

#[derive(Default)]
struct State {
    categories: Vec<Category>,
    users: Vec<User>,
    businesses: Vec<Business>,
    reviews: Vec<Review>,
}

/// In-process store with the same observable semantics as the Postgres adapter.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    pub fail_view_increments: AtomicBool,
}

impl MemoryStore {
    pub fn seed_category(&self, name: &str) -> Category {
        let mut state = self.state.lock().unwrap();
        let now = Utc::now();
        let category = Category {
            id: state.categories.iter().map(|c| c.id).max().unwrap_or(0) + 1,
            name: name.to_string(),
            slug: name.to_lowercase().replace(' ', "-"),
            icon: None,
            description: None,
            display_order: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        state.categories.push(category.clone());
        category
    }

    pub fn seed_user(&self, name: &str, role: UserRole) -> User {
        let user = NewUser {
            id: Uuid::new_v4(),
            email: format!("{}@example.com", name.to_lowercase()),
            name: name.to_string(),
            role,
        };
        self.state
            .lock()
            .unwrap()
            .insert_user(user)
            .expect("seeded users have unique emails")
    }

    pub fn seed_business(&self, business: Business) -> Business {
        self.state.lock().unwrap().businesses.push(business.clone());
        business
    }

    pub fn business(&self, business_id: Uuid) -> Option<Business> {
        let state = self.state.lock().unwrap();
        state.businesses.iter().find(|b| b.id == business_id).cloned()
    }

    pub fn user(&self, user_id: Uuid) -> Option<User> {
        let state = self.state.lock().unwrap();
        state.users.iter().find(|u| u.id == user_id).cloned()
    }

    pub fn review_count(&self) -> usize {
        self.state.lock().unwrap().reviews.len()
    }
}

impl State {
    fn insert_user(&mut self, user: NewUser) -> Result<User> {
        if self.users.iter().any(|u| u.email == user.email) {
            return Err(DirectoryError::Conflict("Duplicate email".into()));
        }
        let now = Utc::now();
        let record = User {
            id: user.id,
            email: user.email,
            password_hash: None,
            name: user.name,
            role: user.role,
            first_name: None,
            last_name: None,
            phone: None,
            city: None,
            state: None,
            country: None,
            business_id: None,
            is_active: true,
            last_login: None,
            created_at: now,
            updated_at: now,
        };
        self.users.push(record.clone());
        Ok(record)
    }

    fn promote(&mut self, user_id: Uuid, business_id: Uuid) {
        if let Some(user) = self.users.iter_mut().find(|u| u.id == user_id) {
            user.role = user.role.promoted();
            user.business_id = Some(business_id);
            user.updated_at = Utc::now();
        }
    }

    fn recompute_rating(&mut self, business_id: Uuid) {
        let ratings: Vec<f64> = self
            .reviews
            .iter()
            .filter(|r| r.business_id == business_id && r.is_approved)
            .map(|r| f64::from(r.rating))
            .collect();
        if let Some(business) = self.businesses.iter_mut().find(|b| b.id == business_id) {
            business.rating_count = ratings.len() as i32;
            business.rating_average = if ratings.is_empty() {
                0.0
            } else {
                let avg = ratings.iter().sum::<f64>() / ratings.len() as f64;
                (avg * 10.0).round() / 10.0
            };
        }
    }
}

fn contains(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[async_trait]
impl DirectoryStore for MemoryStore {
    async fn list_categories(&self, active_only: bool) -> Result<Vec<Category>> {
        let state = self.state.lock().unwrap();
        let mut categories: Vec<Category> = state
            .categories
            .iter()
            .filter(|c| !active_only || c.is_active)
            .cloned()
            .collect();
        categories.sort_by(|a, b| {
            a.display_order
                .cmp(&b.display_order)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(categories)
    }

    async fn get_category(&self, category_id: i32) -> Result<Option<Category>> {
        let state = self.state.lock().unwrap();
        Ok(state.categories.iter().find(|c| c.id == category_id).cloned())
    }

    async fn categories_by_ids(&self, ids: &[i32]) -> Result<Vec<Category>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .categories
            .iter()
            .filter(|c| ids.contains(&c.id))
            .cloned()
            .collect())
    }

    async fn create_category(&self, category: NewCategory) -> Result<Category> {
        let mut state = self.state.lock().unwrap();
        if state
            .categories
            .iter()
            .any(|c| c.name == category.name || c.slug == category.slug)
        {
            return Err(DirectoryError::Conflict("Duplicate category".into()));
        }
        let now = Utc::now();
        let record = Category {
            id: state.categories.iter().map(|c| c.id).max().unwrap_or(0) + 1,
            name: category.name,
            slug: category.slug,
            icon: category.icon,
            description: category.description,
            display_order: category.display_order,
            is_active: category.is_active,
            created_at: now,
            updated_at: now,
        };
        state.categories.push(record.clone());
        Ok(record)
    }

    async fn update_category(&self, category: Category) -> Result<Category> {
        let mut state = self.state.lock().unwrap();
        let slot = state
            .categories
            .iter_mut()
            .find(|c| c.id == category.id)
            .ok_or_else(|| DirectoryError::not_found("Category"))?;
        *slot = category.clone();
        Ok(category)
    }

    async fn delete_category(&self, category_id: i32) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let in_use = state
            .businesses
            .iter()
            .filter(|b| b.category_id == category_id)
            .count();
        if in_use > 0 {
            return Err(DirectoryError::Conflict(format!(
                "Category is still used by {in_use} business listing(s)"
            )));
        }
        let before = state.categories.len();
        state.categories.retain(|c| c.id != category_id);
        if state.categories.len() == before {
            return Err(DirectoryError::not_found("Category"));
        }
        Ok(())
    }

    async fn create_user(&self, user: NewUser) -> Result<User> {
        self.state.lock().unwrap().insert_user(user)
    }

    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>> {
        Ok(self.user(user_id))
    }

    async fn users_by_ids(&self, ids: &[Uuid]) -> Result<Vec<User>> {
        let state = self.state.lock().unwrap();
        Ok(state.users.iter().filter(|u| ids.contains(&u.id)).cloned().collect())
    }

    async fn update_user_profile(&self, user: User) -> Result<User> {
        let mut state = self.state.lock().unwrap();
        let slot = state
            .users
            .iter_mut()
            .find(|u| u.id == user.id)
            .ok_or_else(|| DirectoryError::not_found("User"))?;
        *slot = user.clone();
        Ok(user)
    }

    async fn search_businesses(
        &self,
        query: &ListingQuery,
        page: Page,
    ) -> Result<(Vec<Business>, i64)> {
        let state = self.state.lock().unwrap();
        let mut matches: Vec<Business> = state
            .businesses
            .iter()
            .filter(|b| query.predicate.matches(b))
            .cloned()
            .collect();
        matches.sort_by(|a, b| query.sort.compare(a, b));
        let total = matches.len() as i64;
        let items = matches
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.size as usize)
            .collect();
        Ok((items, total))
    }

    async fn get_business(&self, business_id: Uuid) -> Result<Option<Business>> {
        Ok(self.business(business_id))
    }

    async fn increment_views(&self, business_id: Uuid) -> Result<()> {
        if self.fail_view_increments.load(Ordering::SeqCst) {
            return Err(DirectoryError::Storage(sqlx::Error::PoolTimedOut));
        }
        let mut state = self.state.lock().unwrap();
        if let Some(business) = state.businesses.iter_mut().find(|b| b.id == business_id) {
            business.views += 1;
        }
        Ok(())
    }

    async fn businesses_for_owner(&self, owner_id: Uuid) -> Result<Vec<Business>> {
        let state = self.state.lock().unwrap();
        let mut owned: Vec<Business> = state
            .businesses
            .iter()
            .filter(|b| b.owner_id == Some(owner_id))
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(owned)
    }

    async fn distinct_active_cities(&self) -> Result<Vec<String>> {
        let state = self.state.lock().unwrap();
        let cities: BTreeSet<String> = state
            .businesses
            .iter()
            .filter(|b| b.is_active && !b.city.trim().is_empty())
            .map(|b| b.city.clone())
            .collect();
        Ok(cities.into_iter().collect())
    }

    async fn insert_business(&self, business: NewBusiness, creator: &Actor) -> Result<Business> {
        let mut state = self.state.lock().unwrap();
        if state.businesses.iter().any(|b| b.slug == business.slug) {
            return Err(DirectoryError::Conflict("Duplicate slug".into()));
        }
        let record = Business {
            id: business.id,
            slug: business.slug,
            name: business.name,
            description: business.description,
            category_id: business.category_id,
            address: business.address,
            city: business.city,
            state: business.state,
            zip_code: business.zip_code,
            country: business.country,
            phone: business.phone,
            email: business.email,
            website: business.website,
            hours: business.hours,
            social_links: business.social_links,
            rating_average: 0.0,
            rating_count: 0,
            views: 0,
            is_featured: false,
            owner_id: business.owner_id,
            is_active: false,
            is_verified: false,
            claimed_at: None,
            approved_at: None,
            rejected_at: None,
            rejection_reason: None,
            resubmitted_at: None,
            created_at: business.created_at,
            updated_at: business.created_at,
        };
        state.businesses.push(record.clone());
        state.promote(creator.id, record.id);
        Ok(record)
    }

    async fn update_business(&self, business: Business) -> Result<Business> {
        let mut state = self.state.lock().unwrap();
        let slot = state
            .businesses
            .iter_mut()
            .find(|b| b.id == business.id)
            .ok_or_else(|| DirectoryError::not_found("Business"))?;
        // descriptive columns only; lifecycle and ownership are untouched
        let mut updated = slot.clone();
        updated.name = business.name;
        updated.description = business.description;
        updated.category_id = business.category_id;
        updated.address = business.address;
        updated.city = business.city;
        updated.state = business.state;
        updated.zip_code = business.zip_code;
        updated.country = business.country;
        updated.phone = business.phone;
        updated.email = business.email;
        updated.website = business.website;
        updated.hours = business.hours;
        updated.social_links = business.social_links;
        updated.is_featured = business.is_featured;
        updated.updated_at = Utc::now();
        *slot = updated.clone();
        Ok(updated)
    }

    async fn delete_business(&self, business_id: Uuid) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let before = state.businesses.len();
        state.businesses.retain(|b| b.id != business_id);
        if state.businesses.len() == before {
            return Err(DirectoryError::not_found("Business"));
        }
        state.reviews.retain(|r| r.business_id != business_id);
        for user in state.users.iter_mut() {
            if user.business_id == Some(business_id) {
                user.business_id = None;
            }
        }
        Ok(())
    }

    async fn claim_business(
        &self,
        business_id: Uuid,
        claimer: &Actor,
        claimed_at: DateTime<Utc>,
    ) -> Result<Option<Business>> {
        let mut state = self.state.lock().unwrap();
        let Some(business) = state
            .businesses
            .iter_mut()
            .find(|b| b.id == business_id && b.owner_id.is_none())
        else {
            return Ok(None);
        };
        business.owner_id = Some(claimer.id);
        business.claimed_at = Some(claimed_at);
        business.is_active = false;
        business.rejected_at = None;
        business.rejection_reason = None;
        business.updated_at = Utc::now();
        let record = business.clone();
        state.promote(claimer.id, business_id);
        Ok(Some(record))
    }

    async fn transition_business(
        &self,
        business_id: Uuid,
        from: &[BusinessStatus],
        change: &LifecycleChange,
    ) -> Result<Option<Business>> {
        let mut state = self.state.lock().unwrap();
        let Some(business) = state
            .businesses
            .iter_mut()
            .find(|b| b.id == business_id && from.contains(&b.status()))
        else {
            return Ok(None);
        };
        change.apply(business);
        Ok(Some(business.clone()))
    }

    async fn business_name_matches(&self, fragment: &str, limit: i64) -> Result<Vec<Business>> {
        let state = self.state.lock().unwrap();
        let mut matches: Vec<Business> = state
            .businesses
            .iter()
            .filter(|b| b.is_active && contains(&b.name, fragment))
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        matches.truncate(limit as usize);
        Ok(matches)
    }

    async fn category_name_matches(&self, fragment: &str, limit: i64) -> Result<Vec<Category>> {
        let state = self.state.lock().unwrap();
        let mut matches: Vec<Category> = state
            .categories
            .iter()
            .filter(|c| c.is_active && contains(&c.name, fragment))
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.name.cmp(&b.name));
        matches.truncate(limit as usize);
        Ok(matches)
    }

    async fn location_matches(&self, fragment: &str, limit: i64) -> Result<Vec<(String, String)>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .businesses
            .iter()
            .filter(|b| b.is_active && (contains(&b.city, fragment) || contains(&b.state, fragment)))
            .take(limit as usize)
            .map(|b| (b.city.clone(), b.state.clone()))
            .collect())
    }

    async fn create_review(&self, review: Review) -> Result<Review> {
        let mut state = self.state.lock().unwrap();
        if !state.businesses.iter().any(|b| b.id == review.business_id) {
            return Err(DirectoryError::Validation("Referenced record does not exist".into()));
        }
        state.reviews.push(review.clone());
        Ok(review)
    }

    async fn get_review(&self, review_id: Uuid) -> Result<Option<Review>> {
        let state = self.state.lock().unwrap();
        Ok(state.reviews.iter().find(|r| r.id == review_id).cloned())
    }

    async fn reviews_for_business(
        &self,
        business_id: Uuid,
        include_unapproved: bool,
    ) -> Result<Vec<Review>> {
        let state = self.state.lock().unwrap();
        let mut reviews: Vec<Review> = state
            .reviews
            .iter()
            .filter(|r| r.business_id == business_id && (include_unapproved || r.is_approved))
            .cloned()
            .collect();
        reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(reviews)
    }

    async fn approve_review(&self, review_id: Uuid) -> Result<Option<Review>> {
        let mut state = self.state.lock().unwrap();
        let Some(review) = state.reviews.iter_mut().find(|r| r.id == review_id) else {
            return Ok(None);
        };
        review.is_approved = true;
        review.updated_at = Utc::now();
        let record = review.clone();
        state.recompute_rating(record.business_id);
        Ok(Some(record))
    }

    async fn delete_review(&self, review_id: Uuid) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let Some(position) = state.reviews.iter().position(|r| r.id == review_id) else {
            return Err(DirectoryError::not_found("Review"));
        };
        let removed = state.reviews.remove(position);
        state.recompute_rating(removed.business_id);
        Ok(())
    }

    async fn stats(&self) -> Result<DirectoryStats> {
        let state = self.state.lock().unwrap();
        let count = |status: BusinessStatus| {
            state
                .businesses
                .iter()
                .filter(|b| b.status() == status)
                .count() as i64
        };
        Ok(DirectoryStats {
            users: state.users.len() as i64,
            businesses: state.businesses.len() as i64,
            active_businesses: count(BusinessStatus::Active),
            pending_businesses: count(BusinessStatus::Pending),
            rejected_businesses: count(BusinessStatus::Rejected),
            reviews: state.reviews.len() as i64,
            pending_reviews: state.reviews.iter().filter(|r| !r.is_approved).count() as i64,
            categories: state.categories.len() as i64,
        })
    }
}
