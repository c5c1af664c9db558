//! Business rules on top of the storage port. Handlers stay thin and call into
//! these; every service shares one [`ServiceContext`].

pub mod catalog;
pub mod lifecycle;
pub mod listing;
pub mod reviews;
pub mod suggestions;

use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use crate::clients::{ActivityEvent, ActivityLog, Notifier};
use crate::config::NotificationSettings;
use crate::error::{DirectoryError, Result};
use crate::models::Actor;
use crate::store::DirectoryStore;

pub use catalog::CatalogService;
pub use lifecycle::LifecycleManager;
pub use listing::ListingService;
pub use reviews::ReviewService;
pub use suggestions::SuggestionService;

#[derive(Clone)]
pub struct ServiceContext {
    pub store: Arc<dyn DirectoryStore>,
    pub activity: Arc<dyn ActivityLog>,
    pub notifier: Arc<dyn Notifier>,
    pub settings: NotificationSettings,
}

impl ServiceContext {
    pub fn new(
        store: Arc<dyn DirectoryStore>,
        activity: Arc<dyn ActivityLog>,
        notifier: Arc<dyn Notifier>,
        settings: NotificationSettings,
    ) -> Self {
        Self {
            store,
            activity,
            notifier,
            settings,
        }
    }

    pub(crate) async fn record(
        &self,
        event_type: &str,
        description: String,
        actor: Option<&Actor>,
        metadata: Value,
    ) {
        let event = ActivityEvent::new(event_type, description, actor.map(|a| a.id), metadata);
        self.activity.record(event).await;
    }

    /// Sends and forgets. Delivery runs on a detached task so a slow relay
    /// never holds the request; a failure is logged, never returned.
    pub(crate) fn notify(&self, recipient: &str, subject: &str, body_html: String) {
        let notifier = self.notifier.clone();
        let recipient = recipient.to_string();
        let subject = subject.to_string();
        tokio::spawn(async move {
            if let Err(err) = notifier.send(&recipient, &subject, &body_html).await {
                log::warn!("Failed to send '{subject}' to {recipient}: {err}");
            }
        });
    }

    pub(crate) fn notify_admin(&self, subject: &str, body_html: String) {
        self.notify(&self.settings.admin_email, subject, body_html);
    }

    /// E-mail of a listing's owner, if it has one that can be resolved.
    pub(crate) async fn owner_email(&self, owner_id: Option<Uuid>) -> Option<String> {
        let owner_id = owner_id?;
        match self.store.get_user(owner_id).await {
            Ok(user) => user.map(|u| u.email),
            Err(err) => {
                log::warn!("Failed to resolve owner {owner_id} for notification: {err}");
                None
            }
        }
    }
}

pub(crate) fn ensure_admin(actor: &Actor) -> Result<()> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(DirectoryError::Forbidden("Admin access required".into()))
    }
}

/// Every service, wired to one context. Registered once as actix app data.
#[derive(Clone)]
pub struct Services {
    pub listings: ListingService,
    pub lifecycle: LifecycleManager,
    pub suggestions: SuggestionService,
    pub reviews: ReviewService,
    pub catalog: CatalogService,
}

impl Services {
    pub fn new(ctx: ServiceContext) -> Self {
        let lifecycle = LifecycleManager::new(ctx.clone());
        Self {
            listings: ListingService::new(ctx.clone(), lifecycle.clone()),
            lifecycle,
            suggestions: SuggestionService::new(ctx.clone()),
            reviews: ReviewService::new(ctx.clone()),
            catalog: CatalogService::new(ctx),
        }
    }
}
