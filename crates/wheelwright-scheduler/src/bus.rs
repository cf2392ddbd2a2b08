//! In-process event bus.

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};
use wheelwright_core::events::Event;
use wheelwright_core::ports::{EventBus, EventStream};
use wheelwright_core::{Error, Result};

const DEFAULT_CAPACITY: usize = 1024;

/// Broadcast bus that also logs every event it carries.
pub struct LocalEventBus {
    sender: broadcast::Sender<Event>,
}

impl LocalEventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }
}

impl Default for LocalEventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// NATS-style subject matching: `*` matches one token, a trailing `>` one or
/// more.
pub fn subject_matches(pattern: &str, subject: &str) -> bool {
    let mut subject_tokens = subject.split('.');
    for token in pattern.split('.') {
        match token {
            ">" => return subject_tokens.next().is_some(),
            "*" => {
                if subject_tokens.next().is_none() {
                    return false;
                }
            }
            literal => {
                if subject_tokens.next() != Some(literal) {
                    return false;
                }
            }
        }
    }
    subject_tokens.next().is_none()
}

#[async_trait]
impl EventBus for LocalEventBus {
    async fn publish(&self, event: Event) -> Result<()> {
        let subject = event.subject();
        info!(subject = %subject, "Event");
        if tracing::enabled!(tracing::Level::DEBUG) {
            let payload = serde_json::to_string(&event)?;
            debug!(subject = %subject, payload = %payload, "Event payload");
        }

        // No subscribers is not an error
        let _ = self.sender.send(event);
        Ok(())
    }

    async fn subscribe(&self, pattern: &str) -> Result<EventStream> {
        debug!("Subscribing to pattern {}", pattern);
        let pattern = pattern.to_string();
        let receiver = self.sender.subscribe();

        let stream = futures::stream::unfold(receiver, |mut receiver| async move {
            match receiver.recv().await {
                Ok(event) => Some((Ok(event), receiver)),
                Err(RecvError::Lagged(missed)) => Some((
                    Err(Error::EventBus(format!(
                        "subscriber lagged, {} events dropped",
                        missed
                    ))),
                    receiver,
                )),
                Err(RecvError::Closed) => None,
            }
        })
        .filter(move |item| {
            let keep = match item {
                Ok(event) => subject_matches(&pattern, &event.subject()),
                Err(_) => true,
            };
            futures::future::ready(keep)
        });

        Ok(Box::pin(stream))
    }
}
