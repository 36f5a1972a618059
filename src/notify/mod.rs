//! Notification dispatch.
//!
//! Cycle summaries are forwarded to at most one transport. A failed send is
//! logged and never interrupts the reconciler.

mod email;
mod http;

pub use email::EmailNotifier;
pub use http::HttpNotifier;

use crate::config::NotifyTarget;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Delivers a summary text somewhere outside the process.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> Result<()>;

    /// Short transport name for logs.
    fn name(&self) -> &'static str;
}

/// Used when no transport is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn send(&self, _text: &str) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

/// Build the notifier selected by `target`.
pub fn from_target(target: &NotifyTarget) -> Result<Arc<dyn Notifier>> {
    Ok(match target {
        NotifyTarget::None => Arc::new(NoopNotifier),
        NotifyTarget::Http(settings) => Arc::new(HttpNotifier::new(settings.clone())?),
        NotifyTarget::Email(settings) => Arc::new(EmailNotifier::new(settings.clone())),
    })
}

/// Send `text`, logging instead of propagating failures. Returns whether
/// the message was delivered.
pub async fn dispatch(notifier: &dyn Notifier, text: &str) -> bool {
    match notifier.send(text).await {
        Ok(()) => {
            debug!(transport = notifier.name(), "Notification sent");
            true
        }
        Err(e) => {
            warn!(transport = notifier.name(), "Failed to send notification: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpSettings;
    use crate::error::Error;

    struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn send(&self, _text: &str) -> Result<()> {
            Err(Error::Notify("smtp down".to_string()))
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    #[tokio::test]
    async fn dispatch_swallows_failures() {
        assert!(!dispatch(&FailingNotifier, "hello").await);
        assert!(dispatch(&NoopNotifier, "hello").await);
    }

    #[test]
    fn builds_selected_transport() {
        assert_eq!(from_target(&NotifyTarget::None).unwrap().name(), "none");
        let http = NotifyTarget::Http(HttpSettings {
            url: Some("https://hooks.example.com/x".to_string()),
            subject: "tagwatch".to_string(),
        });
        assert_eq!(from_target(&http).unwrap().name(), "http");
    }
}
