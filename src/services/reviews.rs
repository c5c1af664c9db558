use chrono::Utc;
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use super::{ensure_admin, ServiceContext};
use crate::error::{DirectoryError, Result};
use crate::models::{Actor, CreateReviewRequest, Review};

/// Reviews enter unapproved. Only approved reviews count toward a listing's
/// rating, and the store recomputes the aggregate on approval and deletion.
#[derive(Clone)]
pub struct ReviewService {
    ctx: ServiceContext,
}

impl ReviewService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    /// Admins also see reviews still awaiting moderation.
    pub async fn list_for_business(
        &self,
        business_id: Uuid,
        actor: Option<&Actor>,
    ) -> Result<Vec<Review>> {
        self.ensure_business(business_id).await?;
        let include_unapproved = actor.is_some_and(Actor::is_admin);
        self.ctx
            .store
            .reviews_for_business(business_id, include_unapproved)
            .await
    }

    pub async fn create(
        &self,
        business_id: Uuid,
        request: CreateReviewRequest,
        actor: &Actor,
    ) -> Result<Review> {
        request.validate()?;
        self.ensure_business(business_id).await?;

        let now = Utc::now();
        let review = Review {
            id: Uuid::new_v4(),
            business_id,
            user_id: actor.id,
            rating: request.rating,
            title: request
                .title
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
            comment: request.comment.trim().to_string(),
            is_approved: false,
            created_at: now,
            updated_at: now,
        };
        let review = self.ctx.store.create_review(review).await?;

        self.ctx
            .record(
                "review_submitted",
                format!("A {}-star review was submitted", review.rating),
                Some(actor),
                json!({ "businessId": business_id, "reviewId": review.id }),
            )
            .await;
        Ok(review)
    }

    pub async fn approve(&self, review_id: Uuid, actor: &Actor) -> Result<Review> {
        ensure_admin(actor)?;
        let review = self
            .ctx
            .store
            .approve_review(review_id)
            .await?
            .ok_or_else(|| DirectoryError::not_found("Review"))?;

        self.ctx
            .record(
                "review_approved",
                "A review was approved".to_string(),
                Some(actor),
                json!({ "businessId": review.business_id, "reviewId": review.id }),
            )
            .await;
        Ok(review)
    }

    /// Author or admin only.
    pub async fn delete(&self, review_id: Uuid, actor: &Actor) -> Result<()> {
        let review = self
            .ctx
            .store
            .get_review(review_id)
            .await?
            .ok_or_else(|| DirectoryError::not_found("Review"))?;
        if !actor.is_admin() && review.user_id != actor.id {
            return Err(DirectoryError::Forbidden(
                "Only the author or an admin can delete this review".into(),
            ));
        }

        self.ctx.store.delete_review(review_id).await?;
        self.ctx
            .record(
                "review_deleted",
                "A review was deleted".to_string(),
                Some(actor),
                json!({ "businessId": review.business_id, "reviewId": review.id }),
            )
            .await;
        Ok(())
    }

    async fn ensure_business(&self, business_id: Uuid) -> Result<()> {
        match self.ctx.store.get_business(business_id).await? {
            Some(_) => Ok(()),
            None => Err(DirectoryError::not_found("Business")),
        }
    }
}
