use super::Notifier;
use crate::config::HttpSettings;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct Payload<'a> {
    title: &'a str,
    text: &'a str,
}

/// Webhook notifier: POSTs `{"title": subject, "text": summary}`.
pub struct HttpNotifier {
    client: Client,
    settings: HttpSettings,
}

impl HttpNotifier {
    pub fn new(settings: HttpSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client, settings })
    }

    /// The configured URL, checked to be http(s).
    fn target_url(&self) -> Result<url::Url> {
        let raw = self
            .settings
            .url
            .as_deref()
            .ok_or_else(|| Error::Notify("NOTIFY_HTTP_URL is not set".to_string()))?;
        let parsed = url::Url::parse(raw)
            .map_err(|e| Error::Notify(format!("Invalid webhook URL '{}': {}", raw, e)))?;
        match parsed.scheme() {
            "http" | "https" => Ok(parsed),
            scheme => Err(Error::Notify(format!(
                "Invalid webhook URL '{}': scheme must be http or https, got '{}'",
                raw, scheme
            ))),
        }
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn send(&self, text: &str) -> Result<()> {
        let url = self.target_url()?;
        let payload = Payload {
            title: &self.settings.subject,
            text,
        };
        self.client
            .post(url)
            .json(&payload)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| Error::Notify(format!("webhook request failed: {}", e)))?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notifier(url: Option<&str>) -> HttpNotifier {
        HttpNotifier::new(HttpSettings {
            url: url.map(str::to_string),
            subject: "tagwatch".to_string(),
        })
        .unwrap()
    }

    #[test]
    fn payload_shape() {
        let payload = Payload {
            title: "tagwatch",
            text: "no updates found",
        };
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            serde_json::json!({ "title": "tagwatch", "text": "no updates found" })
        );
    }

    #[tokio::test]
    async fn missing_url_fails_at_send() {
        let err = notifier(None).send("hi").await.unwrap_err();
        assert!(err.to_string().contains("NOTIFY_HTTP_URL"));
    }

    #[test]
    fn rejects_non_http_scheme() {
        assert!(notifier(Some("ftp://example.com")).target_url().is_err());
        assert!(notifier(Some("https://example.com/hook")).target_url().is_ok());
    }
}
