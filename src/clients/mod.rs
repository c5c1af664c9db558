//! Outbound collaborators: the activity log and e-mail notifications.
//! Both are best-effort; neither may fail the operation that triggers it.

pub mod mailer;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

pub use mailer::{LogNotifier, MailerClient};

/// Audit trail entry for a state-changing operation.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityEvent {
    pub event_type: String,
    pub description: String,
    pub actor_id: Option<Uuid>,
    pub metadata: Value,
}

impl ActivityEvent {
    pub fn new(event_type: &str, description: String, actor_id: Option<Uuid>, metadata: Value) -> Self {
        Self {
            event_type: event_type.to_string(),
            description,
            actor_id,
            metadata,
        }
    }
}

#[async_trait]
pub trait ActivityLog: Send + Sync {
    /// Fire-and-forget. Implementations swallow their own failures.
    async fn record(&self, event: ActivityEvent);
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, recipient: &str, subject: &str, body_html: &str) -> Result<(), String>;
}
