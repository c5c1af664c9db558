use std::collections::HashMap;

use chrono::Utc;
use html_escape::encode_safe;
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use super::{ensure_admin, LifecycleManager, ServiceContext};
use crate::error::{DirectoryError, Result};
use crate::filters::{
    ListingFacets, ListingParams, ListingQuery, Page, SortKey, Visibility, DEFAULT_PAGE_SIZE,
};
use crate::models::{
    Actor, Business, BusinessDetail, CategorySummary, ContactBusinessRequest,
    CreateBusinessRequest, FilterOptions, ListingPage, OwnerSummary, UpdateBusinessRequest,
};

const ADMIN_PAGE_SIZE: i64 = 20;

#[derive(Clone)]
pub struct ListingService {
    ctx: ServiceContext,
    lifecycle: LifecycleManager,
}

impl ListingService {
    pub fn new(ctx: ServiceContext, lifecycle: LifecycleManager) -> Self {
        Self { ctx, lifecycle }
    }

    // ========================================================================
    // READS
    // ========================================================================

    /// Anonymous callers, and callers asking for `publicOnly`, see active
    /// listings only. Identified callers also see their own listings in any status.
    pub async fn list_businesses(
        &self,
        params: &ListingParams,
        actor: Option<&Actor>,
    ) -> Result<ListingPage> {
        let visibility = match actor {
            Some(actor) if !params.public_only => Visibility::OwnerAware(actor.id),
            _ => Visibility::Public,
        };
        let facets = ListingFacets::parse(params)?;
        let query = ListingQuery::build(&facets, visibility);
        self.run(&query, Page::from_params(params, DEFAULT_PAGE_SIZE)).await
    }

    pub async fn search(&self, params: &ListingParams) -> Result<ListingPage> {
        self.list_businesses(params, None).await
    }

    /// Every listing in any status, newest first unless a sort is given.
    pub async fn admin_list(&self, params: &ListingParams, actor: &Actor) -> Result<ListingPage> {
        ensure_admin(actor)?;
        let mut facets = ListingFacets::parse(params)?;
        if params.sort.as_deref().map_or(true, |s| s.trim().is_empty()) {
            facets.sort = SortKey::Newest;
        }
        let query = ListingQuery::build(&facets, Visibility::Unrestricted);
        self.run(&query, Page::from_params(params, ADMIN_PAGE_SIZE)).await
    }

    async fn run(&self, query: &ListingQuery, page: Page) -> Result<ListingPage> {
        let (businesses, total) = self.ctx.store.search_businesses(query, page).await?;
        let businesses = self.enrich(businesses).await?;
        Ok(ListingPage {
            count: businesses.len(),
            businesses,
            total,
            page: page.number,
            page_size: page.size,
            pages: page.page_count(total),
        })
    }

    /// Counts a view on every fetch. The counter is best-effort.
    pub async fn get_business(&self, business_id: Uuid) -> Result<BusinessDetail> {
        let mut business = self
            .ctx
            .store
            .get_business(business_id)
            .await?
            .ok_or_else(|| DirectoryError::not_found("Business"))?;

        match self.ctx.store.increment_views(business_id).await {
            Ok(()) => business.views += 1,
            Err(err) => log::warn!("Failed to count view for business {business_id}: {err}"),
        }

        self.detail(business).await
    }

    pub async fn filter_options(&self) -> Result<FilterOptions> {
        let cities = self.ctx.store.distinct_active_cities().await?;
        let mut categories = self.ctx.store.list_categories(true).await?;
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(FilterOptions {
            cities,
            categories: categories.iter().map(CategorySummary::from).collect(),
        })
    }

    pub async fn my_businesses(&self, actor: &Actor) -> Result<Vec<BusinessDetail>> {
        let owned = self.ctx.store.businesses_for_owner(actor.id).await?;
        self.enrich(owned).await
    }

    pub async fn detail(&self, business: Business) -> Result<BusinessDetail> {
        let mut details = self.enrich(vec![business]).await?;
        details
            .pop()
            .ok_or_else(|| DirectoryError::not_found("Business"))
    }

    /// Joins category and owner summaries with one lookup per table.
    async fn enrich(&self, businesses: Vec<Business>) -> Result<Vec<BusinessDetail>> {
        if businesses.is_empty() {
            return Ok(Vec::new());
        }

        let mut category_ids: Vec<i32> = businesses.iter().map(|b| b.category_id).collect();
        category_ids.sort_unstable();
        category_ids.dedup();
        let mut owner_ids: Vec<Uuid> = businesses.iter().filter_map(|b| b.owner_id).collect();
        owner_ids.sort_unstable();
        owner_ids.dedup();

        let categories: HashMap<i32, CategorySummary> = self
            .ctx
            .store
            .categories_by_ids(&category_ids)
            .await?
            .iter()
            .map(|c| (c.id, CategorySummary::from(c)))
            .collect();
        let owners: HashMap<Uuid, OwnerSummary> = if owner_ids.is_empty() {
            HashMap::new()
        } else {
            self.ctx
                .store
                .users_by_ids(&owner_ids)
                .await?
                .iter()
                .map(|u| (u.id, OwnerSummary::from(u)))
                .collect()
        };

        Ok(businesses
            .into_iter()
            .map(|business| {
                let category = categories.get(&business.category_id).cloned();
                let owner = business.owner_id.and_then(|id| owners.get(&id).cloned());
                BusinessDetail::new(business, category, owner)
            })
            .collect())
    }

    // ========================================================================
    // WRITES
    // ========================================================================

    /// New listings always start pending and owned by their creator.
    pub async fn create_business(
        &self,
        request: CreateBusinessRequest,
        actor: &Actor,
    ) -> Result<BusinessDetail> {
        request.validate()?;
        let category_id = request
            .category_id
            .ok_or_else(|| DirectoryError::Validation("Category is required".into()))?;
        self.ensure_category(category_id).await?;

        let slug = unique_slug(&request.name);
        let new_business = request.into_new_business(category_id, slug, actor.id);
        let business = self.ctx.store.insert_business(new_business, actor).await?;

        self.ctx
            .record(
                "business_submitted",
                format!("Business \"{}\" was submitted for review", business.name),
                Some(actor),
                json!({ "businessId": business.id, "slug": business.slug }),
            )
            .await;
        let body = format!(
            "<p>A new business listing, <strong>{}</strong> ({}, {}), is waiting for review.</p>\
             <p><a href=\"{}/admin/businesses\">Open the moderation queue</a></p>",
            encode_safe(&business.name),
            encode_safe(&business.city),
            encode_safe(&business.state),
            self.ctx.settings.frontend_url
        );
        self.ctx.notify_admin("New business listing submitted", body);

        self.detail(business).await
    }

    pub async fn update_business(
        &self,
        business_id: Uuid,
        request: UpdateBusinessRequest,
        actor: &Actor,
    ) -> Result<BusinessDetail> {
        request.validate()?;
        let mut business = self.load(business_id).await?;
        if !actor.can_manage(&business) {
            return Err(DirectoryError::Forbidden(
                "Only the owner or an admin can update this business".into(),
            ));
        }
        if let Some(category_id) = request.category_id {
            if category_id != business.category_id {
                self.ensure_category(category_id).await?;
            }
        }

        request.apply_to_existing(&mut business, actor);
        let updated = self.ctx.store.update_business(business).await?;

        self.ctx
            .record(
                "business_updated",
                format!("Business \"{}\" was updated", updated.name),
                Some(actor),
                json!({ "businessId": updated.id }),
            )
            .await;

        let updated = self.lifecycle.resubmit_after_edit(updated, actor).await?;
        self.detail(updated).await
    }

    pub async fn delete_business(&self, business_id: Uuid, actor: &Actor) -> Result<()> {
        let business = self.load(business_id).await?;
        if !actor.can_manage(&business) {
            return Err(DirectoryError::Forbidden(
                "Only the owner or an admin can delete this business".into(),
            ));
        }

        self.ctx.store.delete_business(business_id).await?;
        self.ctx
            .record(
                "business_deleted",
                format!("Business \"{}\" was deleted", business.name),
                Some(actor),
                json!({ "businessId": business.id }),
            )
            .await;
        Ok(())
    }

    /// Takes ownership of an unowned listing. The listing goes back to pending
    /// until an admin approves the new owner.
    pub async fn claim_business(&self, business_id: Uuid, actor: &Actor) -> Result<BusinessDetail> {
        let business = self.load(business_id).await?;
        if business.owner_id.is_some() {
            return Err(DirectoryError::Conflict("Business has already been claimed".into()));
        }

        let claimed = self
            .ctx
            .store
            .claim_business(business_id, actor, Utc::now())
            .await?
            .ok_or_else(|| DirectoryError::Conflict("Business has already been claimed".into()))?;

        self.ctx
            .record(
                "business_claimed",
                format!("Business \"{}\" was claimed", claimed.name),
                Some(actor),
                json!({ "businessId": claimed.id }),
            )
            .await;
        let body = format!(
            "<p><strong>{}</strong> was claimed and needs a review of its new owner.</p>\
             <p><a href=\"{}/admin/businesses\">Open the moderation queue</a></p>",
            encode_safe(&claimed.name),
            self.ctx.settings.frontend_url
        );
        self.ctx.notify_admin("Business listing claimed", body);

        self.detail(claimed).await
    }

    /// Forwards a visitor's inquiry to the business, or to the admin address
    /// when the listing has no e-mail.
    pub async fn contact_business(
        &self,
        business_id: Uuid,
        request: ContactBusinessRequest,
        actor: Option<&Actor>,
    ) -> Result<()> {
        request.validate()?;
        let business = self.load(business_id).await?;

        let recipient = business
            .email
            .clone()
            .unwrap_or_else(|| self.ctx.settings.admin_email.clone());
        let phone = request
            .phone
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or("not provided");
        let body = format!(
            "<p>New inquiry for <strong>{}</strong></p>\
             <p>From: {} &lt;{}&gt;<br>Phone: {}</p>\
             <p>{}</p>",
            encode_safe(&business.name),
            encode_safe(&request.name),
            encode_safe(&request.email),
            encode_safe(phone),
            encode_safe(&request.message)
        );
        self.ctx.notify(&recipient, &format!("New inquiry for {}", business.name), body);

        self.ctx
            .record(
                "business_contact",
                format!("Inquiry sent to \"{}\"", business.name),
                actor,
                json!({ "businessId": business.id, "from": request.email }),
            )
            .await;
        Ok(())
    }

    async fn load(&self, business_id: Uuid) -> Result<Business> {
        self.ctx
            .store
            .get_business(business_id)
            .await?
            .ok_or_else(|| DirectoryError::not_found("Business"))
    }

    async fn ensure_category(&self, category_id: i32) -> Result<()> {
        match self.ctx.store.get_category(category_id).await? {
            Some(_) => Ok(()),
            None => Err(DirectoryError::not_found("Category")),
        }
    }
}

/// Lowercased, word characters only, whitespace runs as single hyphens.
pub(crate) fn slug_base(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for ch in name.trim().to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            slug.push(ch);
        } else if (ch.is_whitespace() || ch == '-') && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_string()
}

/// Slug base plus a random token, unique without a lookup.
pub(crate) fn unique_slug(name: &str) -> String {
    let base = slug_base(name);
    let base = if base.is_empty() { "business" } else { base.as_str() };
    let token = Uuid::new_v4().simple().to_string();
    format!("{base}-{}", &token[..10])
}
