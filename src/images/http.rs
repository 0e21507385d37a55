use super::ImageSource;
use crate::config::ImageConfig;
use crate::error::{Error, ImageError, Result};
use async_trait::async_trait;

/// Extensions accepted when a server labels an image `application/octet-stream`
const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "gif", "bmp", "webp"];

/// Image downloads over HTTP(S)
pub struct HttpImageSource {
    http_client: reqwest::Client,
}

impl HttpImageSource {
    /// Create an image source with the configured download timeout
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(config: &ImageConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { http_client })
    }
}

#[async_trait]
impl ImageSource for HttpImageSource {
    async fn download(&self, url: &str) -> std::result::Result<Vec<u8>, ImageError> {
        let response = self.http_client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                ImageError::Download(format!("timeout fetching '{url}'"))
            } else {
                ImageError::Download(format!("request for '{url}' failed: {e}"))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ImageError::HttpStatus {
                status: status.as_u16(),
            });
        }

        let headers = response.headers();
        let content_type = header_str(headers, reqwest::header::CONTENT_TYPE);
        let disposition = header_str(headers, reqwest::header::CONTENT_DISPOSITION);
        check_content_type(content_type.as_deref(), disposition.as_deref())?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ImageError::Download(format!("failed to read body of '{url}': {e}")))?;
        Ok(bytes.to_vec())
    }
}

fn header_str(headers: &reqwest::header::HeaderMap, name: reqwest::header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Accept `image/*`, or an octet-stream whose attachment name has an image extension
pub(crate) fn check_content_type(
    content_type: Option<&str>,
    disposition: Option<&str>,
) -> std::result::Result<(), ImageError> {
    let mime = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase())
        .unwrap_or_default();

    if mime.starts_with("image/") {
        return Ok(());
    }

    if mime == "application/octet-stream"
        && let Some(name) = disposition.and_then(disposition_filename)
        && let Some((_, ext)) = name.rsplit_once('.')
        && IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
    {
        return Ok(());
    }

    Err(ImageError::ContentType {
        content_type: if mime.is_empty() { "<missing>".to_string() } else { mime },
    })
}

/// Filename from `attachment; filename="x.jpg"`
fn disposition_filename(value: &str) -> Option<String> {
    value.split(';').map(str::trim).find_map(|part| {
        part.strip_prefix("filename=")
            .map(|name| name.trim_matches('"').to_string())
    })
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn content_type_rules() {
        assert!(check_content_type(Some("image/jpeg"), None).is_ok());
        assert!(check_content_type(Some("IMAGE/PNG; charset=binary"), None).is_ok());
        assert!(check_content_type(Some("text/html"), None).is_err());
        assert!(check_content_type(None, None).is_err());

        let attachment = Some("attachment; filename=\"photo.JPG\"");
        assert!(check_content_type(Some("application/octet-stream"), attachment).is_ok());
        assert!(check_content_type(Some("application/octet-stream"), Some("attachment; filename=\"notes.txt\"")).is_err());
        assert!(check_content_type(Some("application/octet-stream"), None).is_err());
    }

    #[tokio::test]
    async fn download_returns_body_for_images() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/x.jpg"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/jpeg")
                    .set_body_bytes(vec![7u8; 2048]),
            )
            .mount(&mock_server)
            .await;

        let source = HttpImageSource::new(&ImageConfig::default()).unwrap();
        let bytes = source
            .download(&format!("{}/x.jpg", mock_server.uri()))
            .await
            .unwrap();
        assert_eq!(bytes.len(), 2048);
    }

    #[tokio::test]
    async fn download_rejects_error_status_and_non_images() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing.jpg"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("<html></html>", "text/html"),
            )
            .mount(&mock_server)
            .await;

        let source = HttpImageSource::new(&ImageConfig::default()).unwrap();

        let err = source
            .download(&format!("{}/missing.jpg", mock_server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, ImageError::HttpStatus { status: 404 }));

        let err = source
            .download(&format!("{}/page", mock_server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, ImageError::ContentType { ref content_type } if content_type == "text/html"));
    }
}
