//! Record mapper
//!
//! Turns one [`SourceRecord`] plus the URLs resolved for its image slots into
//! one [`OutputRow`]. Mapping is pure: the same inputs always produce the same
//! row, and a record that cannot be mapped becomes a [`MappingFailure`] instead
//! of an error that would stop the batch.

mod category;
mod text;

pub use category::{FALLBACK_CATEGORY, resolve_category};
pub use text::{PICKUP_NOTICE, SUBTITLE_BUDGET, TITLE_BUDGET, describe, format_subtitle, shorten};

use crate::config::RunContext;
use crate::error::MappingError;
use crate::types::{MappingFailure, OutputRow, Slot, SourceRecord, image_column};
use std::collections::BTreeMap;

/// Lot number reported for records that have none
pub const UNKNOWN_LOT: &str = "Unknown";

/// MSRP shown when the record carries none
pub const DEFAULT_MSRP: &str = "0.00";

/// Run-wide inputs to the mapper
#[derive(Clone, Copy, Debug)]
pub struct MapContext<'a> {
    /// Business event the export belongs to
    pub event_id: &'a str,
    /// Warehouse profile of the run
    pub run: &'a RunContext,
    /// Price applied to every row when set
    pub starting_price: Option<f64>,
}

/// Map one record, or describe why it cannot be mapped
///
/// `images` holds the resolved URL per slot for this record (absent when no
/// image of the record resolved).
pub fn map_record(
    record: &SourceRecord,
    images: Option<&BTreeMap<Slot, String>>,
    ctx: &MapContext<'_>,
) -> Result<OutputRow, MappingFailure> {
    build_row(record, images, ctx).map_err(|e| {
        let lot_number = record
            .lot_number()
            .unwrap_or_else(|| UNKNOWN_LOT.to_string());
        MappingFailure {
            message: format!("Error processing Lot Number {lot_number}: {e}"),
            lot_number,
            record_id: record.id.clone(),
        }
    })
}

fn build_row(
    record: &SourceRecord,
    images: Option<&BTreeMap<Slot, String>>,
    ctx: &MapContext<'_>,
) -> Result<OutputRow, MappingError> {
    let lot = record
        .lot_number()
        .ok_or(MappingError::MissingField { field: "Lot Number" })?;
    let msrp = record
        .non_blank("MSRP")
        .unwrap_or_else(|| DEFAULT_MSRP.to_string());
    let auction_count = auction_count(record)?;

    let text = |field: &str| record.text(field).unwrap_or_default();
    let product_name = record.non_blank("Product Name");
    let condition = record.non_blank("Condition");
    let notes = record.non_blank("Notes");
    let other_info = record.non_blank("Description");

    let mut row = OutputRow::new();
    let mut put = |column: &str, value: String| {
        row.set(column, value);
    };

    put("EventID", ctx.event_id.to_string());
    put("LotNumber", lot.clone());
    put("Seller", ctx.run.seller.clone());
    put("Category", resolve_category(&text("Category")).to_string());
    put("Region", ctx.run.region.clone());
    put("ListingType", "Auction".to_string());
    put("Currency", "USD".to_string());
    put("Title", title(product_name.as_deref(), ctx.run.title_prefix.as_deref()));
    put(
        "Subtitle",
        format_subtitle(
            Some(auction_count),
            &msrp,
            notes.as_deref().filter(|_| ctx.run.subtitle_notes),
        ),
    );
    put(
        "Description",
        describe(&[
            ("Description", product_name.as_deref()),
            ("MSRP", Some(msrp.as_str())),
            ("Condition", condition.as_deref()),
            ("Notes", notes.as_deref()),
            ("Other info", other_info.as_deref()),
            ("Lot Number", Some(lot.as_str())),
        ]),
    );
    put("Price", price(ctx.starting_price, auction_count));
    put("Quantity", "1".to_string());
    put("IsTaxable", "TRUE".to_string());
    put("PickupDetails", ctx.run.pickup_details.clone());
    put("UPC", text("UPC"));
    put("Truck", text("Shipment"));
    put("Source", ctx.run.listing_source.clone());
    put("Size", text("Size"));
    put("Photo Taker", text("Clerk"));
    put("Other Notes", notes.clone().unwrap_or_default());
    put("MSRP", msrp.clone());
    put("Lot Number", lot);
    put("Location", text("Location"));
    put("Item Condition", condition.unwrap_or_default());
    put("ID", record.id.to_string());
    put("Amazon ID", text("B00 ASIN"));

    // BTreeMap iteration is slot-ascending
    for (slot, url) in images.into_iter().flatten() {
        put(image_column(*slot), url.clone());
    }

    Ok(row)
}

/// Times the item has been listed; prices and subtitles depend on it
fn auction_count(record: &SourceRecord) -> Result<i64, MappingError> {
    if record.non_blank("Auction Count").is_none() {
        return Err(MappingError::MissingField {
            field: "Auction Count",
        });
    }
    match record.number("Auction Count") {
        Some(n) if n.is_finite() => Ok(n.trunc() as i64),
        _ => Err(MappingError::InvalidField {
            field: "Auction Count",
            reason: format!("'{}' is not a number", record.text("Auction Count").unwrap_or_default()),
        }),
    }
}

/// Prefixed, shortened product name; empty without a product name
fn title(product_name: Option<&str>, prefix: Option<&str>) -> String {
    let Some(name) = product_name.map(str::trim).filter(|n| !n.is_empty()) else {
        return String::new();
    };
    let full = format!("{}{name}", prefix.unwrap_or(""));
    shorten(full.trim(), TITLE_BUDGET)
}

/// Opening price: the run's starting price, else cheaper the more often the item was listed
fn price(starting_price: Option<f64>, auction_count: i64) -> String {
    if let Some(price) = starting_price {
        return format!("{price:.2}");
    }
    match auction_count {
        2 => "2.50",
        n if n >= 3 => "1.00",
        _ => "5.00",
    }
    .to_string()
}
