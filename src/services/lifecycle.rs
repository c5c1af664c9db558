//! Listing lifecycle: `pending`, `active` and `rejected`.
//!
//! ```text
//! pending  --approve-->  active
//! pending  --reject--->  rejected
//! rejected --approve-->  active
//! rejected --resubmit->  pending   (also on an owner's edit)
//! active   --suspend-->  pending
//! ```
//!
//! Every transition is a compare-and-set on the derived status, so two racing
//! moderators cannot both win and a repeated resubmit fails cleanly.

use chrono::{DateTime, Utc};
use html_escape::encode_safe;
use serde_json::json;
use uuid::Uuid;

use super::{ensure_admin, ServiceContext};
use crate::error::{DirectoryError, Result};
use crate::models::{Actor, Business, BusinessStatus, LifecycleChange};

impl LifecycleChange {
    /// Publishes and verifies in one step.
    pub fn approval(now: DateTime<Utc>) -> Self {
        Self {
            is_active: true,
            is_verified: Some(true),
            approved_at: Some(now),
            keep_approved_at: false,
            rejected_at: None,
            rejection_reason: None,
            resubmitted_at: None,
        }
    }

    pub fn rejection(now: DateTime<Utc>, reason: String) -> Self {
        Self {
            is_active: false,
            is_verified: None,
            approved_at: None,
            keep_approved_at: true,
            rejected_at: Some(now),
            rejection_reason: Some(reason),
            resubmitted_at: None,
        }
    }

    pub fn resubmission(now: DateTime<Utc>) -> Self {
        Self {
            is_active: false,
            is_verified: None,
            approved_at: None,
            keep_approved_at: false,
            rejected_at: None,
            rejection_reason: None,
            resubmitted_at: Some(now),
        }
    }

    pub fn suspension() -> Self {
        Self {
            is_active: false,
            is_verified: None,
            approved_at: None,
            keep_approved_at: true,
            rejected_at: None,
            rejection_reason: None,
            resubmitted_at: None,
        }
    }
}

#[derive(Clone)]
pub struct LifecycleManager {
    ctx: ServiceContext,
}

impl LifecycleManager {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    pub async fn approve(&self, business_id: Uuid, actor: &Actor) -> Result<Business> {
        ensure_admin(actor)?;
        let business = self.load(business_id).await?;
        if business.status() == BusinessStatus::Active {
            return Err(DirectoryError::InvalidState("Business is already active".into()));
        }

        let approved = self
            .transition(
                business_id,
                &[BusinessStatus::Pending, BusinessStatus::Rejected],
                LifecycleChange::approval(Utc::now()),
                "Business is no longer awaiting approval",
            )
            .await?;

        self.ctx
            .record(
                "business_approved",
                format!("Business \"{}\" was approved", approved.name),
                Some(actor),
                json!({ "businessId": approved.id, "previousStatus": business.status() }),
            )
            .await;

        if let Some(owner) = self.ctx.owner_email(approved.owner_id).await {
            let link = format!("{}/business/{}", self.ctx.settings.frontend_url, approved.slug);
            let body = format!(
                "<p>Good news! <strong>{}</strong> is now live in the directory.</p>\
                 <p><a href=\"{link}\">View your listing</a></p>",
                encode_safe(&approved.name)
            );
            self.ctx.notify(&owner, "Your business listing has been approved", body);
        }

        Ok(approved)
    }

    pub async fn reject(&self, business_id: Uuid, reason: &str, actor: &Actor) -> Result<Business> {
        ensure_admin(actor)?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(DirectoryError::Validation("Rejection reason is required".into()));
        }

        let business = self.load(business_id).await?;
        if business.status() != BusinessStatus::Pending {
            return Err(DirectoryError::InvalidState(format!(
                "Only pending businesses can be rejected (current status: {})",
                business.status().as_str()
            )));
        }

        let rejected = self
            .transition(
                business_id,
                &[BusinessStatus::Pending],
                LifecycleChange::rejection(Utc::now(), reason.to_string()),
                "Business is no longer pending",
            )
            .await?;

        self.ctx
            .record(
                "business_rejected",
                format!("Business \"{}\" was rejected", rejected.name),
                Some(actor),
                json!({ "businessId": rejected.id, "reason": reason }),
            )
            .await;

        if let Some(owner) = self.ctx.owner_email(rejected.owner_id).await {
            let body = format!(
                "<p>Your listing <strong>{}</strong> was not approved.</p>\
                 <p>Reason: {}</p>\
                 <p>Edit the listing and resubmit it for review at \
                 <a href=\"{}/dashboard\">your dashboard</a>.</p>",
                encode_safe(&rejected.name),
                encode_safe(reason),
                self.ctx.settings.frontend_url
            );
            self.ctx.notify(&owner, "Your business listing needs changes", body);
        }

        Ok(rejected)
    }

    /// Takes an active listing back to pending. Approval time is kept for audit.
    pub async fn suspend(
        &self,
        business_id: Uuid,
        reason: Option<&str>,
        actor: &Actor,
    ) -> Result<Business> {
        ensure_admin(actor)?;
        let business = self.load(business_id).await?;
        if business.status() != BusinessStatus::Active {
            return Err(DirectoryError::InvalidState("Only active businesses can be suspended".into()));
        }

        let suspended = self
            .transition(
                business_id,
                &[BusinessStatus::Active],
                LifecycleChange::suspension(),
                "Business is no longer active",
            )
            .await?;

        let reason = reason.map(str::trim).filter(|r| !r.is_empty());
        self.ctx
            .record(
                "business_suspended",
                format!("Business \"{}\" was suspended", suspended.name),
                Some(actor),
                json!({ "businessId": suspended.id, "reason": reason }),
            )
            .await;

        Ok(suspended)
    }

    pub async fn resubmit(&self, business_id: Uuid, actor: &Actor) -> Result<Business> {
        let business = self.load(business_id).await?;
        if !actor.owns(&business) {
            return Err(DirectoryError::Forbidden(
                "Only the owner can resubmit this business".into(),
            ));
        }
        if business.status() != BusinessStatus::Rejected {
            return Err(DirectoryError::InvalidState(
                "Only rejected businesses can be resubmitted".into(),
            ));
        }

        let resubmitted = self
            .transition(
                business_id,
                &[BusinessStatus::Rejected],
                LifecycleChange::resubmission(Utc::now()),
                "Business is no longer rejected",
            )
            .await?;

        self.announce_resubmission(&resubmitted, actor).await;
        Ok(resubmitted)
    }

    /// Owner edits of a rejected listing send it back for review. Any other
    /// edit, or a lost race, leaves `business` as it is.
    pub(crate) async fn resubmit_after_edit(
        &self,
        business: Business,
        actor: &Actor,
    ) -> Result<Business> {
        if business.status() != BusinessStatus::Rejected || actor.is_admin() || !actor.owns(&business) {
            return Ok(business);
        }

        match self
            .ctx
            .store
            .transition_business(
                business.id,
                &[BusinessStatus::Rejected],
                &LifecycleChange::resubmission(Utc::now()),
            )
            .await?
        {
            Some(resubmitted) => {
                self.announce_resubmission(&resubmitted, actor).await;
                Ok(resubmitted)
            }
            None => Ok(business),
        }
    }

    async fn announce_resubmission(&self, business: &Business, actor: &Actor) {
        self.ctx
            .record(
                "business_resubmitted",
                format!("Business \"{}\" was resubmitted for review", business.name),
                Some(actor),
                json!({ "businessId": business.id }),
            )
            .await;

        let body = format!(
            "<p><strong>{}</strong> was updated and resubmitted for review.</p>\
             <p><a href=\"{}/admin/businesses\">Open the moderation queue</a></p>",
            encode_safe(&business.name),
            self.ctx.settings.frontend_url
        );
        self.ctx.notify_admin("Business resubmitted for review", body);
    }

    async fn load(&self, business_id: Uuid) -> Result<Business> {
        self.ctx
            .store
            .get_business(business_id)
            .await?
            .ok_or_else(|| DirectoryError::not_found("Business"))
    }

    async fn transition(
        &self,
        business_id: Uuid,
        from: &[BusinessStatus],
        change: LifecycleChange,
        lost_race: &str,
    ) -> Result<Business> {
        self.ctx
            .store
            .transition_business(business_id, from, &change)
            .await?
            .ok_or_else(|| DirectoryError::InvalidState(lost_race.to_string()))
    }
}
