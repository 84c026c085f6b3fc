use std::path::Path;
use std::sync::Arc;
use reqwest::Method;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use url::Url;
use crate::upload::{
    AuthTokenSource,
    HttpRequest,
    RequestBuilder,
    Result,
    UploadError,
    VideoSettings,
};

/// Fixed bearer token, set once at construction.
pub struct StaticTokenSource {
    token: String,
}

impl StaticTokenSource {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }
}

impl AuthTokenSource for StaticTokenSource {
    fn token(&self) -> Result<String> {
        if self.token.is_empty() {
            return Err(UploadError::MissingToken);
        }

        Ok(self.token.clone())
    }
}

/// Builds the per-step requests of the remote video API: the video record is
/// created under `me/videos`, the returned upload URI takes the bytes, the
/// activation URI is deleted to commit the upload, and settings are patched
/// onto the video URI.
pub struct ApiRequestBuilder {
    endpoint: Url,
    token_source: Arc<dyn AuthTokenSource>,
}

impl ApiRequestBuilder {
    pub fn new(endpoint: &str, token_source: Arc<dyn AuthTokenSource>) -> Result<Self> {
        let endpoint = Url::parse(endpoint).map_err(|err| {
            UploadError::RequestError(format!("Invalid endpoint {}: {}", endpoint, err))
        })?;

        Ok(Self {
            endpoint,
            token_source,
        })
    }

    fn auth_headers(&self) -> Result<HeaderMap> {
        let token = self.token_source.token()?;

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", token))?);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        Ok(headers)
    }

    /// Step responses reference each other by URI, often relative to the API
    /// origin.
    fn resolve(&self, uri: &str) -> Result<Url> {
        if uri.is_empty() {
            return Err(UploadError::RequestError("URI must not be empty".to_string()));
        }

        if uri.starts_with("http") {
            Url::parse(uri)
                .map_err(|err| UploadError::RequestError(format!("Invalid URI {}: {}", uri, err)))
        } else {
            self.endpoint
                .join(uri)
                .map_err(|err| UploadError::RequestError(format!("Invalid URI {}: {}", uri, err)))
        }
    }
}

impl RequestBuilder for ApiRequestBuilder {
    fn create_video_request(&self, _source: &Path) -> Result<HttpRequest> {
        let url = self.resolve("me/videos")?;
        let mut headers = self.auth_headers()?;
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let body = serde_json::to_vec(&serde_json::json!({ "type": "streaming" }))?;

        Ok(HttpRequest {
            method: Method::POST,
            url,
            headers,
            body: Some(body),
        })
    }

    fn upload_video_request(&self, _source: &Path, upload_uri: &str) -> Result<HttpRequest> {
        let url = self.resolve(upload_uri)?;
        let mut headers = self.auth_headers()?;
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"));

        // the transport streams the body from the source file
        Ok(HttpRequest {
            method: Method::PUT,
            url,
            headers,
            body: None,
        })
    }

    fn activate_video_request(&self, activation_uri: &str) -> Result<HttpRequest> {
        let url = self.resolve(activation_uri)?;
        let headers = self.auth_headers()?;

        Ok(HttpRequest {
            method: Method::DELETE,
            url,
            headers,
            body: None,
        })
    }

    fn video_settings_request(&self, video_uri: &str, settings: &VideoSettings) -> Result<HttpRequest> {
        let url = self.resolve(video_uri)?;
        let mut headers = self.auth_headers()?;
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let body = serde_json::to_vec(&settings.parameters())?;

        Ok(HttpRequest {
            method: Method::PATCH,
            url,
            headers,
            body: Some(body),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> ApiRequestBuilder {
        ApiRequestBuilder::new(
            "https://api.example.com",
            Arc::new(StaticTokenSource::new("abc123")),
        )
        .unwrap()
    }

    #[test]
    fn test_create_video_request() {
        let request = builder().create_video_request(Path::new("A.mp4")).unwrap();

        assert_eq!(request.method, Method::POST);
        assert_eq!(request.url.as_str(), "https://api.example.com/me/videos");
        assert_eq!(request.headers[AUTHORIZATION], "Bearer abc123");
        assert!(request.body.is_some());
    }

    #[test]
    fn test_relative_uris_resolve_against_endpoint() {
        let request = builder().activate_video_request("/uploads/U1/complete").unwrap();

        assert_eq!(request.method, Method::DELETE);
        assert_eq!(request.url.as_str(), "https://api.example.com/uploads/U1/complete");
    }

    #[test]
    fn test_absolute_upload_uri_kept() {
        let request = builder()
            .upload_video_request(Path::new("A.mp4"), "https://upload.example.com/U1")
            .unwrap();

        assert_eq!(request.method, Method::PUT);
        assert_eq!(request.url.as_str(), "https://upload.example.com/U1");
        assert!(request.body.is_none());
    }

    #[test]
    fn test_empty_uri_rejected() {
        let result = builder().activate_video_request("");
        assert!(matches!(result, Err(UploadError::RequestError(_))));
    }

    #[test]
    fn test_missing_token() {
        let builder = ApiRequestBuilder::new(
            "https://api.example.com",
            Arc::new(StaticTokenSource::new("")),
        )
        .unwrap();

        let result = builder.create_video_request(Path::new("A.mp4"));
        assert!(matches!(result, Err(UploadError::MissingToken)));
    }

    #[test]
    fn test_settings_request_body() {
        let settings = VideoSettings {
            title: Some("x".to_string()),
            ..Default::default()
        };
        let request = builder().video_settings_request("/videos/V1", &settings).unwrap();

        assert_eq!(request.method, Method::PATCH);
        let body: serde_json::Value = serde_json::from_slice(&request.body.unwrap()).unwrap();
        assert_eq!(body["name"], "x");
    }
}
