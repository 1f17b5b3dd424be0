//! Operator alerting for high-severity tracing events.
//!
//! A counter store outage makes the admission layer fail open on every
//! request, and each of those requests logs an ERROR. Alerts are therefore
//! throttled per (target, message) pair: the first occurrence is sent, later
//! ones within the cooldown are counted and reported with the next alert.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{Event, Subscriber};
use tracing_subscriber::{Layer, layer::Context};

/// A single alert as delivered to a sink.
#[derive(Debug, Clone)]
pub struct Alert {
    pub level: tracing::Level,
    pub target: String,
    pub message: String,
    pub fields: Vec<(String, String)>,
    /// Identical events swallowed since the previous delivery of this alert.
    pub suppressed: u64,
    pub raised_at: chrono::DateTime<chrono::Utc>,
}

impl Alert {
    fn summary(&self) -> String {
        let mut line = format!("[{}] {}: {}", self.level, self.target, self.message);
        for (k, v) in &self.fields {
            line.push_str(&format!(" {}={}", k, v));
        }
        if self.suppressed > 0 {
            line.push_str(&format!(" (+{} repeats)", self.suppressed));
        }
        line
    }
}

#[derive(Debug, Clone)]
pub struct AlertConfig {
    /// Least severe level that raises an alert.
    pub min_level: tracing::Level,
    /// Pending alerts beyond this are dropped.
    pub buffer_size: usize,
    /// Quiet period for a repeated (target, message) pair.
    pub cooldown: Duration,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            min_level: tracing::Level::ERROR,
            buffer_size: 100,
            cooldown: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    #[error("alert delivery failed: {0}")]
    Delivery(String),
}

/// Destination for alerts.
#[async_trait::async_trait]
pub trait AlertSink: Send + Sync {
    async fn deliver(&self, alert: Alert) -> Result<(), AlertError>;
}

/// Writes alerts to stderr. Used when no webhook is configured.
pub struct StderrSink;

#[async_trait::async_trait]
impl AlertSink for StderrSink {
    async fn deliver(&self, alert: Alert) -> Result<(), AlertError> {
        eprintln!("ALERT {} {}", alert.raised_at.to_rfc3339(), alert.summary());
        Ok(())
    }
}

/// Posts alerts to a chat webhook as `{"text": ...}`.
pub struct WebhookSink {
    url: String,
    service: String,
    client: reqwest::Client,
}

impl WebhookSink {
    pub fn new(url: String, service: String) -> Self {
        Self {
            url,
            service,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait::async_trait]
impl AlertSink for WebhookSink {
    async fn deliver(&self, alert: Alert) -> Result<(), AlertError> {
        let payload = serde_json::json!({
            "text": format!("*{}* {} at {}", self.service, alert.summary(), alert.raised_at.to_rfc3339()),
        });

        self.client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(|e| AlertError::Delivery(e.to_string()))?;

        Ok(())
    }
}

struct Throttle {
    cooldown: Duration,
    last: HashMap<(String, String), (Instant, u64)>,
}

impl Throttle {
    /// Returns the number of suppressed repeats to report, or `None` while
    /// the pair is still cooling down.
    fn admit(&mut self, target: &str, message: &str, now: Instant) -> Option<u64> {
        let key = (target.to_string(), message.to_string());
        match self.last.get_mut(&key) {
            Some((sent, suppressed)) if now.duration_since(*sent) < self.cooldown => {
                *suppressed += 1;
                None
            }
            Some((sent, suppressed)) => {
                let repeats = *suppressed;
                *sent = now;
                *suppressed = 0;
                Some(repeats)
            }
            None => {
                self.last.insert(key, (now, 0));
                Some(0)
            }
        }
    }
}

/// Tracing layer that forwards alert-worthy events to an [`AlertSink`].
pub struct AlertLayer {
    tx: mpsc::Sender<Alert>,
    min_level: tracing::Level,
    throttle: Mutex<Throttle>,
}

impl AlertLayer {
    /// Must be called inside a tokio runtime: delivery runs on a spawned task.
    pub fn new(sink: Arc<dyn AlertSink>, config: AlertConfig) -> Self {
        let (tx, mut rx) = mpsc::channel::<Alert>(config.buffer_size.max(1));

        tokio::spawn(async move {
            while let Some(alert) = rx.recv().await {
                if let Err(e) = sink.deliver(alert).await {
                    // Logging here would feed back into this layer
                    eprintln!("{}", e);
                }
            }
        });

        Self {
            tx,
            min_level: config.min_level,
            throttle: Mutex::new(Throttle {
                cooldown: config.cooldown,
                last: HashMap::new(),
            }),
        }
    }

    pub fn console(config: AlertConfig) -> Self {
        Self::new(Arc::new(StderrSink), config)
    }

    pub fn webhook(url: String, service: String, config: AlertConfig) -> Self {
        Self::new(Arc::new(WebhookSink::new(url, service)), config)
    }
}

#[derive(Default)]
struct EventFields {
    message: String,
    fields: Vec<(String, String)>,
}

impl EventFields {
    fn push(&mut self, name: &str, value: String) {
        if name == "message" {
            self.message = value;
        } else {
            self.fields.push((name.to_string(), value));
        }
    }
}

impl tracing::field::Visit for EventFields {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.push(field.name(), format!("{:?}", value));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.push(field.name(), value.to_string());
    }
}

impl<S> Layer<S> for AlertLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if *meta.level() > self.min_level {
            return;
        }

        let mut visitor = EventFields::default();
        event.record(&mut visitor);

        let suppressed = match self.throttle.lock() {
            Ok(mut throttle) => throttle.admit(meta.target(), &visitor.message, Instant::now()),
            Err(_) => Some(0),
        };
        let Some(suppressed) = suppressed else {
            return;
        };

        let _ = self.tx.try_send(Alert {
            level: *meta.level(),
            target: meta.target().to_string(),
            message: visitor.message,
            fields: visitor.fields,
            suppressed,
            raised_at: chrono::Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;

    struct Collect(Arc<tokio::sync::Mutex<Vec<Alert>>>);

    #[async_trait::async_trait]
    impl AlertSink for Collect {
        async fn deliver(&self, alert: Alert) -> Result<(), AlertError> {
            self.0.lock().await.push(alert);
            Ok(())
        }
    }

    async fn drain() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_only_errors_are_forwarded() {
        let seen = Arc::new(tokio::sync::Mutex::new(Vec::new()));
        let layer = AlertLayer::new(Arc::new(Collect(seen.clone())), AlertConfig::default());
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!("not an alert");
            tracing::error!(stage = "burst", "Counter store unavailable, failing open");
        });
        drain().await;

        let seen = seen.lock().await;
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].message, "Counter store unavailable, failing open");
        assert_eq!(seen[0].fields, vec![("stage".to_string(), "burst".to_string())]);
    }

    #[tokio::test]
    async fn test_repeats_are_throttled() {
        let seen = Arc::new(tokio::sync::Mutex::new(Vec::new()));
        let layer = AlertLayer::new(Arc::new(Collect(seen.clone())), AlertConfig::default());
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            for _ in 0..50 {
                tracing::error!("Counter store unavailable, failing open");
            }
            tracing::error!("Different failure");
        });
        drain().await;

        assert_eq!(seen.lock().await.len(), 2);
    }

    #[test]
    fn test_throttle_reports_suppressed_count() {
        let mut throttle = Throttle {
            cooldown: Duration::from_secs(60),
            last: HashMap::new(),
        };
        let start = Instant::now();

        assert_eq!(throttle.admit("store", "down", start), Some(0));
        assert_eq!(throttle.admit("store", "down", start + Duration::from_secs(1)), None);
        assert_eq!(throttle.admit("store", "down", start + Duration::from_secs(2)), None);
        assert_eq!(
            throttle.admit("store", "down", start + Duration::from_secs(61)),
            Some(2)
        );
    }
}
