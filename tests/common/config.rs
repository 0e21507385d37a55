//! Test configuration pointing every network collaborator at a mock server

use auction_export::{Config, RunContext, RunRequest};
use std::path::Path;
use std::time::Duration;

/// Warehouse profile registered by [`test_config`]
pub const WAREHOUSE: &str = "Maule Warehouse";

/// Record source identifiers used by the mock listing
pub const SOURCE_ID: &str = "appTest";
pub const COLLECTION_ID: &str = "tblItems";
pub const VIEW_ID: &str = "viwExport";
pub const TOKEN: &str = "test-token";

/// Public URL prefix of the mock file store
pub const PUBLIC_BASE: &str = "https://cdn.example.com/images";

/// Configuration with the record source at `api_base` and exports under `output_dir`
///
/// Retries are short and the rate limit generous so tests finish quickly;
/// individual tests tighten what they exercise.
pub fn test_config(api_base: &str, output_dir: &Path) -> Config {
    let mut config = Config::default();
    config.source.api_base = api_base.to_string();
    config.source.timeout = Duration::from_secs(5);
    config.images.timeout = Duration::from_secs(5);
    config.upload.public_base_url = PUBLIC_BASE.to_string();
    config.upload.retry.max_attempts = 1;
    config.upload.retry.initial_delay = Duration::from_millis(1);
    config.upload.retry.max_delay = Duration::from_millis(5);
    config.rate_limit.permits = 1000;
    config.export.output_dir = output_dir.to_path_buf();
    config.warehouses.insert(
        WAREHOUSE.to_string(),
        RunContext {
            name: WAREHOUSE.to_string(),
            source_id: SOURCE_ID.to_string(),
            collection_id: COLLECTION_ID.to_string(),
            view_id: VIEW_ID.to_string(),
            token: TOKEN.to_string(),
            region: "88850842".to_string(),
            seller: "702Auctions".to_string(),
            listing_source: "AMZ FC".to_string(),
            pickup_details: "Pickup Mon-Fri 9-5".to_string(),
            ..Default::default()
        },
    );
    config
}

/// Run request against the test warehouse
pub fn run_request(event_id: &str, run_id: &str) -> RunRequest {
    RunRequest {
        event_id: event_id.to_string(),
        warehouse: WAREHOUSE.to_string(),
        starting_price: None,
        run_id: run_id.to_string(),
    }
}
