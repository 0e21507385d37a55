//! Record listings and image payloads served by the mock server

use image::codecs::jpeg::JpegEncoder;
use image::{ImageBuffer, Rgb, RgbImage};
use serde_json::{Value, json};
use wiremock::matchers::{bearer_token, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::config::{COLLECTION_ID, SOURCE_ID, TOKEN, VIEW_ID};

/// Noisy RGB image so the encoded JPEG clears the corruption threshold
fn noisy_rgb(width: u32, height: u32) -> RgbImage {
    let mut state: u32 = 0x9E37_79B9;
    ImageBuffer::from_fn(width, height, |_, _| {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        let [r, g, b, _] = state.to_le_bytes();
        Rgb([r, g, b])
    })
}

/// JPEG bytes of a `width` x `height` noisy image
pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, 90)
        .encode_image(&noisy_rgb(width, height))
        .unwrap();
    out
}

/// One record as the record source returns it
pub fn record(id: &str, fields: Value) -> Value {
    json!({ "id": id, "createdTime": "2024-05-01T10:00:00.000Z", "fields": fields })
}

/// Attachment field value pointing at `url`
pub fn attachment(url: &str) -> Value {
    json!([{ "id": "att1", "url": url, "filename": "photo.jpg", "type": "image/jpeg" }])
}

/// Serve `records` as the listing, `page_size` records per page
pub async fn mount_listing(server: &MockServer, records: Vec<Value>, page_size: usize) {
    let listing_path = format!("/{SOURCE_ID}/{COLLECTION_ID}");
    let pages: Vec<&[Value]> = if records.is_empty() {
        vec![&[]]
    } else {
        records.chunks(page_size.max(1)).collect()
    };
    let last = pages.len() - 1;

    for (i, page) in pages.iter().enumerate() {
        let mut body = json!({ "records": page });
        if i < last {
            body["offset"] = json!(format!("cursor{}", i + 1));
        }

        let mock = Mock::given(method("GET"))
            .and(path(listing_path.as_str()))
            .and(query_param("view", VIEW_ID))
            .and(bearer_token(TOKEN));
        let (mock, priority) = if i == 0 {
            (mock, None)
        } else {
            // Cursor-matched pages take precedence over the first page
            (
                mock.and(query_param("offset", format!("cursor{i}").as_str())),
                Some(1),
            )
        };
        let mut mock = mock.respond_with(ResponseTemplate::new(200).set_body_json(body));
        if let Some(priority) = priority {
            mock = mock.with_priority(priority);
        }
        mock.mount(server).await;
    }
}

/// Serve `bytes` as a JPEG at `image_path`
pub async fn mount_image(server: &MockServer, image_path: &str, bytes: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path(image_path))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/jpeg")
                .set_body_bytes(bytes),
        )
        .mount(server)
        .await;
}

/// Serve an HTML error page with a 200 status at `page_path`
pub async fn mount_html(server: &MockServer, page_path: &str) {
    Mock::given(method("GET"))
        .and(path(page_path))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("<html><body>Not an image</body></html>", "text/html"),
        )
        .mount(server)
        .await;
}
