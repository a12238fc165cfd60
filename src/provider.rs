//! Whatsify gateway client
//!
//! Wraps the three remote operations against the provider: media send,
//! number validation and account status. Transport and provider failures
//! are normalized into `Error::Provider` so callers never see a raw
//! transport error type.

use std::path::Path;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::{Error, Result};

/// Upper bound on a media payload, matching the provider's documented limit.
pub const MAX_MEDIA_BYTES: u64 = 100 * 1024 * 1024;

/// Whatsify gateway client.
#[derive(Debug, Clone)]
pub struct WhatsifyClient {
    http: Client,
    base_url: String,
    api_secret: String,
    account_id: String,
}

impl WhatsifyClient {
    /// Create a client for the given gateway.
    pub fn new(
        base_url: impl Into<String>,
        api_secret: impl Into<String>,
        account_id: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self> {
        let api_secret = api_secret.into();
        if api_secret.trim().is_empty() {
            return Err(Error::InvalidArgument("API secret is empty".to_string()));
        }

        let http = Client::builder()
            .user_agent("whatsify_bulk_sender/0.1.0")
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| Error::InvalidArgument(format!("HTTP client error: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_secret,
            account_id: account_id.into(),
        })
    }

    /// Send a media message (video + caption) to one recipient.
    ///
    /// The file is read fully into memory and posted as a multipart form.
    /// Payloads over [`MAX_MEDIA_BYTES`] are rejected before any request
    /// is issued.
    pub async fn send_media(
        &self,
        recipient: &str,
        media_path: &Path,
        caption: &str,
    ) -> Result<Value> {
        let meta = tokio::fs::metadata(media_path)
            .await
            .map_err(|_| Error::MediaFileMissing(media_path.display().to_string()))?;
        if meta.len() > MAX_MEDIA_BYTES {
            return Err(Error::MediaTooLarge {
                size: meta.len(),
                limit: MAX_MEDIA_BYTES,
            });
        }

        let media_bytes = tokio::fs::read(media_path).await?;
        let file_name = media_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("video.mp4")
            .to_string();

        let part = reqwest::multipart::Part::bytes(media_bytes)
            .file_name(file_name)
            .mime_str("video/mp4")
            .map_err(|e| Error::InvalidArgument(format!("Invalid MIME type: {}", e)))?;

        let form = reqwest::multipart::Form::new()
            .text("secret", self.api_secret.clone())
            .text("account", self.account_id.clone())
            .text("recipient", recipient.to_string())
            .text("type", "media")
            .text("message", caption.to_string())
            .part("media_file", part);

        let response = self
            .http
            .post(format!("{}/send/whatsapp", self.base_url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("Send request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::Provider(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(Error::Provider(extract_provider_error(&text)));
        }

        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }

    /// Check whether a number exists on the provider's network.
    ///
    /// `Ok(bool)` reports provider knowledge; `Err` means the check itself
    /// failed and says nothing about the number.
    pub async fn validate_number(&self, number: &str) -> Result<bool> {
        let phone = normalize_number(number);
        if phone.len() < 2 {
            return Err(Error::InvalidArgument(format!(
                "Not a phone number: {:?}",
                number
            )));
        }

        let params = [
            ("secret", self.api_secret.as_str()),
            ("account", self.account_id.as_str()),
            ("phone", phone.as_str()),
        ];

        let response = self
            .http
            .post(format!("{}/validate/whatsapp", self.base_url))
            .form(&params)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("Validation request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::Provider(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(Error::Provider(extract_provider_error(&text)));
        }

        let parsed: ValidateResponse = serde_json::from_str(&text)
            .map_err(|e| Error::Provider(format!("Invalid validation response: {}", e)))?;

        parsed
            .exists()
            .ok_or_else(|| Error::Provider("Validation response missing exists field".to_string()))
    }

    /// Fetch account status from the gateway. Diagnostic only.
    pub async fn account_status(&self) -> Result<Value> {
        let response = self
            .http
            .post(format!("{}/get/wa.accounts", self.base_url))
            .json(&serde_json::json!({ "secret": self.api_secret }))
            .send()
            .await
            .map_err(|e| Error::Provider(format!("Status request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::Provider(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(Error::Provider(extract_provider_error(&text)));
        }

        serde_json::from_str(&text)
            .map_err(|e| Error::Provider(format!("Invalid status response: {}", e)))
    }

}

/// Normalize a phone number: keep digits, ensure a single leading `+`.
pub fn normalize_number(number: &str) -> String {
    let digits: String = number.chars().filter(|c| c.is_ascii_digit()).collect();
    format!("+{}", digits)
}

/// Pull the most specific error message out of a provider response body:
/// the JSON `message` field when present, otherwise the raw body.
fn extract_provider_error(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        if let Some(message) = value.get("message").and_then(|m| m.as_str()) {
            return message.to_string();
        }
    }
    if body.trim().is_empty() {
        "Provider returned an empty error response".to_string()
    } else {
        body.trim().to_string()
    }
}

#[derive(Debug, Deserialize)]
struct ValidateResponse {
    exists: Option<bool>,
    data: Option<ValidateData>,
}

#[derive(Debug, Deserialize)]
struct ValidateData {
    exists: Option<bool>,
}

impl ValidateResponse {
    fn exists(&self) -> Option<bool> {
        self.exists.or_else(|| self.data.as_ref().and_then(|d| d.exists))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn client(server: &MockServer) -> WhatsifyClient {
        WhatsifyClient::new(server.base_url(), "test_secret", "acc_1", 5).expect("client")
    }

    #[test]
    fn test_new_rejects_empty_secret() {
        let err = WhatsifyClient::new("https://x", "   ", "acc", 5).unwrap_err();
        assert!(err.to_string().contains("API secret is empty"));
    }

    #[test]
    fn test_new_strips_trailing_slash() {
        let client = WhatsifyClient::new("https://x/api/", "s", "a", 5).unwrap();
        assert_eq!(client.base_url, "https://x/api");
    }

    #[test]
    fn normalize_number_adds_plus() {
        assert_eq!(normalize_number("10000000001"), "+10000000001");
    }

    #[test]
    fn normalize_number_keeps_single_plus() {
        assert_eq!(normalize_number("+10000000001"), "+10000000001");
    }

    #[test]
    fn normalize_number_strips_formatting() {
        assert_eq!(normalize_number("+1 (000) 000-0001"), "+10000000001");
        assert_eq!(normalize_number("001 234 567 8901"), "+0012345678901");
    }

    #[test]
    fn extract_provider_error_prefers_json_message() {
        let msg = extract_provider_error(r#"{"status":400,"message":"invalid recipient"}"#);
        assert_eq!(msg, "invalid recipient");
    }

    #[test]
    fn extract_provider_error_falls_back_to_body() {
        assert_eq!(extract_provider_error("gateway timeout"), "gateway timeout");
    }

    #[test]
    fn extract_provider_error_handles_empty_body() {
        assert!(extract_provider_error("  ").contains("empty error response"));
    }

    fn write_media(dir: &tempfile::TempDir) -> std::path::PathBuf {
        let path = dir.path().join("video.mp4");
        std::fs::write(&path, b"mp4-bytes").expect("write media");
        path
    }

    #[tokio::test]
    async fn send_media_posts_multipart_and_returns_body() {
        let server = MockServer::start_async().await;

        let send_mock = server.mock(|when, then| {
            when.method(POST).path("/send/whatsapp").is_true(|req| {
                let body = String::from_utf8_lossy(req.body().as_ref()).to_string();
                body.contains("test_secret")
                    && body.contains("acc_1")
                    && body.contains("+10000000001")
                    && body.contains("media")
                    && body.contains("hello caption")
                    && body.contains("mp4-bytes")
            });
            then.status(200)
                .json_body(json!({ "status": 200, "message": "queued" }));
        });

        let dir = tempdir().expect("tempdir");
        let media = write_media(&dir);

        let data = client(&server)
            .send_media("+10000000001", &media, "hello caption")
            .await
            .unwrap();

        assert_eq!(data["message"], "queued");
        send_mock.assert_calls(1);
    }

    #[tokio::test]
    async fn send_media_extracts_provider_message_on_error() {
        let server = MockServer::start_async().await;

        server.mock(|when, then| {
            when.method(POST).path("/send/whatsapp");
            then.status(400)
                .json_body(json!({ "status": 400, "message": "invalid account" }));
        });

        let dir = tempdir().expect("tempdir");
        let media = write_media(&dir);

        let err = client(&server)
            .send_media("+10000000001", &media, "caption")
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Provider(_)));
        assert!(err.to_string().contains("invalid account"));
    }

    #[tokio::test]
    async fn send_media_rejects_oversized_file_without_request() {
        let server = MockServer::start_async().await;
        let send_mock = server.mock(|when, then| {
            when.method(POST).path("/send/whatsapp");
            then.status(200).json_body(json!({}));
        });

        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("huge.mp4");
        let file = std::fs::File::create(&path).expect("create media");
        // Sparse file: over the limit without writing 100 MiB to disk.
        file.set_len(MAX_MEDIA_BYTES + 1).expect("set length");

        let err = client(&server)
            .send_media("+10000000001", &path, "caption")
            .await
            .unwrap_err();

        match err {
            Error::MediaTooLarge { size, limit } => {
                assert_eq!(size, MAX_MEDIA_BYTES + 1);
                assert_eq!(limit, MAX_MEDIA_BYTES);
            }
            other => panic!("expected MediaTooLarge, got {:?}", other),
        }
        send_mock.assert_calls(0);
    }

    #[tokio::test]
    async fn send_media_reports_missing_file() {
        let server = MockServer::start_async().await;
        let send_mock = server.mock(|when, then| {
            when.method(POST).path("/send/whatsapp");
            then.status(200).json_body(json!({}));
        });

        let err = client(&server)
            .send_media("+10000000001", Path::new("/nonexistent/video.mp4"), "c")
            .await
            .unwrap_err();

        assert!(matches!(err, Error::MediaFileMissing(_)));
        send_mock.assert_calls(0);
    }

    #[tokio::test]
    async fn validate_number_reports_existing_number() {
        let server = MockServer::start_async().await;

        let validate_mock = server.mock(|when, then| {
            when.method(POST).path("/validate/whatsapp").is_true(|req| {
                let body = String::from_utf8_lossy(req.body().as_ref()).to_string();
                body.contains("phone=%2B10000000001")
            });
            then.status(200).json_body(json!({ "exists": true }));
        });

        let exists = client(&server).validate_number("+1 000 000 0001").await.unwrap();
        assert!(exists);
        validate_mock.assert_calls(1);
    }

    #[tokio::test]
    async fn validate_number_reads_nested_data_field() {
        let server = MockServer::start_async().await;

        server.mock(|when, then| {
            when.method(POST).path("/validate/whatsapp");
            then.status(200)
                .json_body(json!({ "status": 200, "data": { "exists": false } }));
        });

        let exists = client(&server).validate_number("10000000002").await.unwrap();
        assert!(!exists);
    }

    #[tokio::test]
    async fn validate_number_errors_on_provider_failure() {
        let server = MockServer::start_async().await;

        server.mock(|when, then| {
            when.method(POST).path("/validate/whatsapp");
            then.status(503).body("service unavailable");
        });

        let err = client(&server).validate_number("+10000000001").await.unwrap_err();
        assert!(matches!(err, Error::Provider(_)));
        assert!(err.to_string().contains("service unavailable"));
    }

    #[tokio::test]
    async fn validate_number_errors_on_malformed_response() {
        let server = MockServer::start_async().await;

        server.mock(|when, then| {
            when.method(POST).path("/validate/whatsapp");
            then.status(200).body("not json");
        });

        let err = client(&server).validate_number("+10000000001").await.unwrap_err();
        assert!(err.to_string().contains("Invalid validation response"));
    }

    #[tokio::test]
    async fn validate_number_rejects_garbage_input() {
        let server = MockServer::start_async().await;
        let err = client(&server).validate_number("abc").await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn account_status_returns_json() {
        let server = MockServer::start_async().await;

        let status_mock = server.mock(|when, then| {
            when.method(POST)
                .path("/get/wa.accounts")
                .json_body(json!({ "secret": "test_secret" }));
            then.status(200)
                .json_body(json!({ "status": 200, "data": [{ "id": "acc_1", "status": "connected" }] }));
        });

        let data = client(&server).account_status().await.unwrap();
        assert_eq!(data["data"][0]["status"], "connected");
        status_mock.assert_calls(1);
    }

    #[tokio::test]
    async fn account_status_errors_on_failure() {
        let server = MockServer::start_async().await;

        server.mock(|when, then| {
            when.method(POST).path("/get/wa.accounts");
            then.status(401)
                .json_body(json!({ "message": "invalid secret" }));
        });

        let err = client(&server).account_status().await.unwrap_err();
        assert!(err.to_string().contains("invalid secret"));
    }
}
