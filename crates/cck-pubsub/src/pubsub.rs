use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use cck_domain::{
    ErrorCallback, MessageCallback, OpError, OpResult, PubSubService, Subscription,
};
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Buffered messages per topic before slow subscribers start lagging.
const TOPIC_CAPACITY: usize = 1024;

#[derive(Default)]
struct Inner {
    topics: HashMap<String, broadcast::Sender<String>>,
    bucket_event_topics: BTreeSet<String>,
}

// ── InMemoryPubSubService ─────────────────────────────────────────────────────

/// Process-local implementation of [`PubSubService`] over broadcast
/// channels.
///
/// Delivery is at-least-once per live subscriber with a bounded buffer; a
/// subscriber that lags far enough loses the overwritten messages and is
/// told so through its error callback. Dropping the service cancels every
/// subscription.
pub struct InMemoryPubSubService {
    inner: Arc<RwLock<Inner>>,
    shutdown: CancellationToken,
}

impl Default for InMemoryPubSubService {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryPubSubService {
    pub fn new() -> Self {
        InMemoryPubSubService {
            inner: Arc::default(),
            shutdown: CancellationToken::new(),
        }
    }

    async fn sender(&self, topic: &str) -> broadcast::Sender<String> {
        let mut inner = self.inner.write().await;
        inner
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .clone()
    }
}

impl Drop for InMemoryPubSubService {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn require_topic(topic: &str) -> OpResult<()> {
    if topic.is_empty() {
        return Err(OpError::bad_request("topic name must not be empty"));
    }
    Ok(())
}

#[async_trait]
impl PubSubService for InMemoryPubSubService {
    async fn ensure_topic_exists(&self, topic: &str) -> OpResult<()> {
        require_topic(topic)?;
        self.sender(topic).await;
        Ok(())
    }

    async fn publish(&self, topic: &str, message: &str) -> OpResult<()> {
        require_topic(topic)?;
        if message.is_empty() {
            return Err(OpError::bad_request("message must not be empty"));
        }
        let sender = self.sender(topic).await;
        // A send without receivers is fine; the topic simply has no
        // subscribers right now.
        let receivers = sender.send(message.to_string()).unwrap_or(0);
        debug!(topic, receivers, "published message");
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
        on_message: MessageCallback,
        on_error: Option<ErrorCallback>,
    ) -> OpResult<Subscription> {
        require_topic(topic)?;
        let mut rx = self.sender(topic).await.subscribe();
        let cancel = self.shutdown.child_token();
        let task_cancel = cancel.clone();
        let topic = topic.to_string();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    received = rx.recv() => match received {
                        Ok(message) => on_message(&topic, &message),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            if let Some(on_error) = &on_error {
                                on_error(&OpError::too_many_requests(format!(
                                    "subscription lagged; {skipped} messages dropped"
                                )));
                            }
                        }
                        // Topic deleted.
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            debug!(topic, "subscription ended");
        });

        Ok(Subscription::new(cancel))
    }

    async fn delete_topic(&self, topic: &str) -> OpResult<()> {
        require_topic(topic)?;
        let mut inner = self.inner.write().await;
        // Dropping the sender closes every receiver and ends deliveries.
        inner.topics.remove(topic);
        Ok(())
    }

    async fn mark_used_on_bucket_event(&self, topic: &str) -> OpResult<()> {
        require_topic(topic)?;
        let mut inner = self.inner.write().await;
        inner.bucket_event_topics.insert(topic.to_string());
        Ok(())
    }

    async fn unmark_used_on_bucket_event(&self, topic: &str) -> OpResult<()> {
        require_topic(topic)?;
        let mut inner = self.inner.write().await;
        inner.bucket_event_topics.remove(topic);
        Ok(())
    }

    async fn topics_used_on_bucket_event(&self) -> OpResult<Vec<String>> {
        let inner = self.inner.read().await;
        Ok(inner.bucket_event_topics.iter().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    fn collector() -> (MessageCallback, mpsc::UnboundedReceiver<(String, String)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let callback: MessageCallback =
            Arc::new(move |topic: &str, message: &str| {
                let _ = tx.send((topic.to_string(), message.to_string()));
            });
        (callback, rx)
    }

    #[tokio::test]
    async fn publish_reaches_subscriber() {
        let pubsub = InMemoryPubSubService::new();
        let (on_message, mut rx) = collector();
        let _sub = pubsub.subscribe("t", on_message, None).await.unwrap();

        pubsub.publish("t", "hello").await.unwrap();

        let (topic, message) =
            timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert_eq!(topic, "t");
        assert_eq!(message, "hello");
    }

    #[tokio::test]
    async fn dropped_subscription_stops_delivery() {
        let pubsub = InMemoryPubSubService::new();
        let (on_message, mut rx) = collector();
        let sub = pubsub.subscribe("t", on_message, None).await.unwrap();
        drop(sub);
        tokio::time::sleep(Duration::from_millis(20)).await;

        pubsub.publish("t", "late").await.unwrap();
        let received = timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(matches!(received, Ok(None) | Err(_)), "no message should be delivered");
    }

    #[tokio::test]
    async fn empty_topic_and_message_are_rejected() {
        let pubsub = InMemoryPubSubService::new();
        assert_eq!(pubsub.publish("", "m").await.unwrap_err().status(), 400);
        assert_eq!(pubsub.publish("t", "").await.unwrap_err().status(), 400);
        assert_eq!(pubsub.ensure_topic_exists("").await.unwrap_err().status(), 400);
    }

    #[tokio::test]
    async fn bucket_event_markers_are_sorted_and_idempotent() {
        let pubsub = InMemoryPubSubService::new();
        pubsub.mark_used_on_bucket_event("b").await.unwrap();
        pubsub.mark_used_on_bucket_event("a").await.unwrap();
        pubsub.mark_used_on_bucket_event("b").await.unwrap();
        assert_eq!(pubsub.topics_used_on_bucket_event().await.unwrap(), vec!["a", "b"]);

        pubsub.unmark_used_on_bucket_event("a").await.unwrap();
        assert_eq!(pubsub.topics_used_on_bucket_event().await.unwrap(), vec!["b"]);
    }

    #[tokio::test]
    async fn delete_topic_ends_subscriptions() {
        let pubsub = InMemoryPubSubService::new();
        let (on_message, mut rx) = collector();
        let sub = pubsub.subscribe("t", on_message, None).await.unwrap();

        pubsub.delete_topic("t").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Republishing creates a fresh topic the old subscription no longer
        // sees.
        pubsub.publish("t", "after-delete").await.unwrap();
        let received = timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(matches!(received, Ok(None) | Err(_)), "no message should be delivered");
        drop(sub);
    }
}
