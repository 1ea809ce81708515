use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{OpError, OpResult};

/// Invoked on the provider's delivery task with `(topic, message)`.
/// Callbacks must not assume single-threading across topics.
pub type MessageCallback = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Invoked when delivery to a subscription fails.
pub type ErrorCallback = Arc<dyn Fn(&OpError) + Send + Sync>;

/// Handle to an active subscription. Dropping it cancels delivery; disposing
/// the owning service cancels all of its subscriptions implicitly.
pub struct Subscription {
    token: CancellationToken,
}

impl Subscription {
    pub fn new(token: CancellationToken) -> Self {
        Subscription { token }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("cancelled", &self.token.is_cancelled()).finish()
    }
}

/// Topic-based messaging with at-least-once delivery and no ordering
/// guarantee across publishers, plus the registry of topics currently wired
/// to bucket events.
#[async_trait]
pub trait PubSubService: Send + Sync {
    /// Topics are also created implicitly on first publish.
    async fn ensure_topic_exists(&self, topic: &str) -> OpResult<()>;

    async fn publish(&self, topic: &str, message: &str) -> OpResult<()>;

    async fn subscribe(
        &self,
        topic: &str,
        on_message: MessageCallback,
        on_error: Option<ErrorCallback>,
    ) -> OpResult<Subscription>;

    async fn delete_topic(&self, topic: &str) -> OpResult<()>;

    // ── Bucket-event markers ──────────────────────────────────────────────

    async fn mark_used_on_bucket_event(&self, topic: &str) -> OpResult<()>;

    async fn unmark_used_on_bucket_event(&self, topic: &str) -> OpResult<()>;

    /// Topics currently wired to bucket events, for operators.
    async fn topics_used_on_bucket_event(&self) -> OpResult<Vec<String>>;
}
