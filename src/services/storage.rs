use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::Serialize;

pub const MAX_PHOTO_BYTES: usize = 5 * 1024 * 1024;

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Storage API error (status {status}): {message}")]
    ApiError { status: u16, message: String },
}

/// Client for the hosted object storage API
#[derive(Clone)]
pub struct StorageClient {
    http: Client,
    base_url: String,
    bucket: String,
    service_key: Secret<String>,
}

#[derive(Serialize)]
struct RemoveRequest<'a> {
    prefixes: [&'a str; 1],
}

impl StorageClient {
    pub fn new(base_url: &str, bucket: &str, service_key: Secret<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
            service_key,
        }
    }

    /// Uploads (or replaces) an object and returns its path inside the bucket
    #[tracing::instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn upload(&self, path: &str, content_type: &str, bytes: Vec<u8>) -> Result<String, StorageError> {
        let response = self
            .http
            .post(format!("{}/object/{}/{}", self.base_url, self.bucket, path))
            .bearer_auth(self.service_key.expose_secret())
            .header("x-upsert", "true")
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;

        Self::check_status(response).await?;

        tracing::debug!(path = %path, "Object uploaded");

        Ok(path.to_string())
    }

    pub async fn remove(&self, path: &str) -> Result<(), StorageError> {
        let response = self
            .http
            .delete(format!("{}/object/{}", self.base_url, self.bucket))
            .bearer_auth(self.service_key.expose_secret())
            .json(&RemoveRequest { prefixes: [path] })
            .send()
            .await?;

        Self::check_status(response).await?;
        Ok(())
    }

    /// Public URL of an object in a public bucket
    pub fn public_url(&self, path: &str) -> String {
        format!("{}/object/public/{}/{}", self.base_url, self.bucket, path)
    }

    async fn check_status(response: reqwest::Response) -> Result<(), StorageError> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let message = response.text().await.unwrap_or_default();
        tracing::error!(status = %status, error = %message, "Storage API request failed");

        Err(StorageError::ApiError {
            status: status.as_u16(),
            message,
        })
    }
}

/// Maps an image content type to the file extension used in storage paths
pub fn photo_extension(content_type: &str) -> Option<&'static str> {
    match content_type {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> StorageClient {
        StorageClient::new(
            &format!("{}/", server.uri()),
            "member-photos",
            Secret::new("service-key".to_string()),
        )
    }

    #[tokio::test]
    async fn test_upload_sends_upsert() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/object/member-photos/gym/member.png"))
            .and(header("authorization", "Bearer service-key"))
            .and(header("x-upsert", "true"))
            .and(header("content-type", "image/png"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"Key":"member-photos/gym/member.png"}"#))
            .expect(1)
            .mount(&server)
            .await;

        let stored = client(&server)
            .upload("gym/member.png", "image/png", vec![1, 2, 3])
            .await
            .unwrap();

        assert_eq!(stored, "gym/member.png");
    }

    #[tokio::test]
    async fn test_remove() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/object/member-photos"))
            .and(body_json(serde_json::json!({ "prefixes": ["gym/member.png"] })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        client(&server).remove("gym/member.png").await.unwrap();
    }

    #[tokio::test]
    async fn test_upload_failure() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(413).set_body_string("Payload too large"))
            .mount(&server)
            .await;

        let result = client(&server).upload("a/b.jpg", "image/jpeg", vec![0]).await;

        assert!(matches!(result, Err(StorageError::ApiError { status: 413, .. })));
    }

    #[test]
    fn test_public_url() {
        let client = StorageClient::new(
            "https://project.example.co/storage/v1",
            "member-photos",
            Secret::new("k".to_string()),
        );
        assert_eq!(
            client.public_url("g/m.jpg"),
            "https://project.example.co/storage/v1/object/public/member-photos/g/m.jpg"
        );
    }

    #[test]
    fn test_photo_extension() {
        assert_eq!(photo_extension("image/jpeg"), Some("jpg"));
        assert_eq!(photo_extension("image/webp"), Some("webp"));
        assert_eq!(photo_extension("application/pdf"), None);
    }
}
