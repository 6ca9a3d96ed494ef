//! New-image notifications
//!
//! Reconciliation publishes through the [`Notifier`] trait. Publishing is
//! fire-and-forget: it never fails the request and never waits on a client.

use bb_common::events::{BreadboardEvent, EventBus};
use bb_common::{time, Error, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(5);
const USER_AGENT: &str = concat!("bb-server/", env!("CARGO_PKG_VERSION"));

/// A notification about a freshly created image
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    /// Lab name, used as the channel group
    pub lab: String,
    pub image_id: i64,
    /// Image name
    pub message: String,
}

pub trait Notifier: Send + Sync {
    fn publish(&self, notification: Notification);
}

/// Publishes onto the in-process [`EventBus`] (streamed on `/events`)
pub struct BusNotifier {
    bus: EventBus,
}

impl BusNotifier {
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }
}

impl Notifier for BusNotifier {
    fn publish(&self, notification: Notification) {
        debug!(
            lab = %notification.lab,
            image_id = notification.image_id,
            subscribers = self.bus.subscriber_count(),
            "Publishing new-image event"
        );
        self.bus.emit_lossy(BreadboardEvent::NewImage {
            lab: notification.lab,
            image_id: notification.image_id,
            message: notification.message,
            timestamp: time::now(),
        });
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    lab: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    message: &'a str,
    image_id: i64,
}

/// POSTs each notification to an external URL
pub struct WebhookNotifier {
    http_client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .map_err(|e| Error::Config(format!("failed to build webhook client: {}", e)))?;
        Ok(Self {
            http_client,
            url: url.into(),
        })
    }

    #[cfg(test)]
    fn url(&self) -> &str {
        &self.url
    }
}

impl Notifier for WebhookNotifier {
    fn publish(&self, notification: Notification) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("Webhook notification dropped: no async runtime");
            return;
        };
        let client = self.http_client.clone();
        let url = self.url.clone();

        handle.spawn(async move {
            let payload = WebhookPayload {
                lab: &notification.lab,
                kind: "new-image",
                message: &notification.message,
                image_id: notification.image_id,
            };
            match client.post(&url).json(&payload).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!(url = %url, "Webhook delivered");
                }
                Ok(response) => {
                    warn!(url = %url, status = %response.status(), "Webhook rejected notification");
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "Webhook delivery failed");
                }
            }
        });
    }
}

/// Publishes to every inner notifier
#[derive(Default)]
pub struct FanoutNotifier {
    targets: Vec<Arc<dyn Notifier>>,
}

impl FanoutNotifier {
    pub fn new(targets: Vec<Arc<dyn Notifier>>) -> Self {
        Self { targets }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.targets.len()
    }
}

impl Notifier for FanoutNotifier {
    fn publish(&self, notification: Notification) {
        for target in &self.targets {
            target.publish(notification.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording(Mutex<Vec<Notification>>);

    impl Notifier for Recording {
        fn publish(&self, notification: Notification) {
            self.0.lock().unwrap().push(notification);
        }
    }

    fn sample() -> Notification {
        Notification {
            lab: "bec1".to_string(),
            image_id: 7,
            message: "shot_A".to_string(),
        }
    }

    #[test]
    fn test_fanout_reaches_every_target() {
        let a = Arc::new(Recording::default());
        let b = Arc::new(Recording::default());
        let fanout = FanoutNotifier::new(vec![a.clone() as Arc<dyn Notifier>, b.clone()]);

        fanout.publish(sample());

        assert_eq!(fanout.len(), 2);
        assert_eq!(a.0.lock().unwrap().as_slice(), &[sample()]);
        assert_eq!(b.0.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_bus_notifier_emits_new_image() {
        let bus = EventBus::new(4);
        let mut rx = bus.subscribe();
        BusNotifier::new(bus).publish(sample());

        match rx.recv().await.unwrap() {
            BreadboardEvent::NewImage { lab, image_id, message, .. } => {
                assert_eq!(lab, "bec1");
                assert_eq!(image_id, 7);
                assert_eq!(message, "shot_A");
            }
        }
    }

    #[tokio::test]
    async fn test_webhook_failure_does_not_surface() {
        // Nothing listens on port 9; the spawned delivery logs and gives up
        let notifier = WebhookNotifier::new("http://127.0.0.1:9/hook").unwrap();
        notifier.publish(sample());
        assert_eq!(notifier.url(), "http://127.0.0.1:9/hook");
    }
}
