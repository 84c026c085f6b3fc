use serde::Deserialize;
use crate::upload::{CreateVideoPayload, ResponseParser, Result, TaskResponse, UploadError};

/// Interprets the remote API's step responses. The transport has already
/// written download-style bodies to disk; parsing happens off those files.
#[derive(Default)]
pub struct ApiResponseParser;

impl ApiResponseParser {
    pub fn new() -> Self {
        Self
    }
}

/// Create response: an upload ticket.
#[derive(Deserialize)]
struct CreateVideoBody {
    uri: Option<String>,
    upload_link_secure: Option<String>,
    complete_uri: Option<String>,
}

fn ensure_success(response: &TaskResponse) -> Result<()> {
    if response.is_success() {
        Ok(())
    } else {
        Err(UploadError::server_error(response.status, "Request failed"))
    }
}

fn required(field: Option<String>, name: &str) -> Result<String> {
    field
        .filter(|value| !value.is_empty())
        .ok_or_else(|| UploadError::ResponseParseError(format!("Missing '{}' in create video response", name)))
}

impl ResponseParser for ApiResponseParser {
    fn parse_create_video(&self, response: &TaskResponse) -> Result<CreateVideoPayload> {
        ensure_success(response)?;

        let path = response.body.as_ref().ok_or_else(|| {
            UploadError::ResponseParseError("Create video response has no body".to_string())
        })?;
        let data = std::fs::read(path).map_err(|err| {
            UploadError::ResponseParseError(format!(
                "Cannot read response body {}: {}",
                path.display(),
                err
            ))
        })?;
        let body: CreateVideoBody = serde_json::from_slice(&data).map_err(|err| {
            UploadError::ResponseParseError(format!("Malformed create video response: {}", err))
        })?;

        Ok(CreateVideoPayload {
            video_uri: required(body.uri, "uri")?,
            upload_uri: required(body.upload_link_secure, "upload_link_secure")?,
            activation_uri: required(body.complete_uri, "complete_uri")?,
        })
    }

    fn parse_upload_video(&self, response: &TaskResponse) -> Result<()> {
        ensure_success(response)
    }

    fn parse_activate_video(&self, response: &TaskResponse) -> Result<()> {
        ensure_success(response)
    }

    fn parse_video_settings(&self, response: &TaskResponse) -> Result<()> {
        ensure_success(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn response_with_body(status: u16, body: &str) -> (tempfile::TempDir, TaskResponse) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("response.json");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();

        (
            dir,
            TaskResponse {
                status,
                body: Some(path),
            },
        )
    }

    #[test]
    fn test_parse_create_video() {
        let (_dir, response) = response_with_body(
            201,
            r#"{
                "uri": "/videos/V1",
                "upload_link_secure": "https://upload.example.com/U1",
                "complete_uri": "/uploads/U1/complete"
            }"#,
        );

        let payload = ApiResponseParser::new().parse_create_video(&response).unwrap();
        assert_eq!(payload.video_uri, "/videos/V1");
        assert_eq!(payload.upload_uri, "https://upload.example.com/U1");
        assert_eq!(payload.activation_uri, "/uploads/U1/complete");
    }

    #[test]
    fn test_parse_create_video_missing_field() {
        let (_dir, response) = response_with_body(201, r#"{ "uri": "/videos/V1" }"#);

        let result = ApiResponseParser::new().parse_create_video(&response);
        assert!(matches!(result, Err(UploadError::ResponseParseError(_))));
    }

    #[test]
    fn test_parse_create_video_malformed_body() {
        let (_dir, response) = response_with_body(200, "not json");

        let result = ApiResponseParser::new().parse_create_video(&response);
        assert!(matches!(result, Err(UploadError::ResponseParseError(_))));
    }

    #[test]
    fn test_non_success_status() {
        let (_dir, response) = response_with_body(503, "{}");

        let result = ApiResponseParser::new().parse_create_video(&response);
        assert!(matches!(result, Err(UploadError::ServerError { status_code: 503, .. })));

        let result = ApiResponseParser::new().parse_upload_video(&TaskResponse {
            status: 403,
            body: None,
        });
        assert!(matches!(result, Err(UploadError::ServerError { status_code: 403, .. })));
    }

    #[test]
    fn test_bodyless_steps_only_check_status() {
        let parser = ApiResponseParser::new();
        let response = TaskResponse {
            status: 200,
            body: None,
        };

        assert!(parser.parse_upload_video(&response).is_ok());
        assert!(parser.parse_activate_video(&response).is_ok());
        assert!(parser.parse_video_settings(&response).is_ok());
    }
}
