//! Core types for auction-export

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Highest image slot a record can carry
pub const MAX_SLOTS: u8 = 10;

/// Identifier of a source record (opaque, assigned by the record source)
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl RecordId {
    /// Create a new RecordId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the inner identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Image position on a listing, always within `1..=10`
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Slot(u8);

impl Slot {
    /// Create a slot, returning `None` outside `1..=10`
    pub fn new(n: u8) -> Option<Self> {
        (1..=MAX_SLOTS).contains(&n).then_some(Self(n))
    }

    /// Slot number
    pub fn get(self) -> u8 {
        self.0
    }

    /// All slots in ascending order
    pub fn all() -> impl Iterator<Item = Slot> {
        (1..=MAX_SLOTS).map(Slot)
    }
}

impl TryFrom<u8> for Slot {
    type Error = String;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        Slot::new(n).ok_or_else(|| format!("slot {n} outside 1..={MAX_SLOTS}"))
    }
}

impl From<Slot> for u8 {
    fn from(slot: Slot) -> Self {
        slot.0
    }
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference to one image of a record
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    /// Declared slot
    pub slot: Slot,
    /// Where the original image lives
    pub url: String,
}

/// Record exactly as the source API returns it
#[derive(Clone, Debug, Deserialize)]
pub struct RawRecord {
    /// Source identifier
    pub id: String,
    /// Named fields
    #[serde(default)]
    pub fields: Map<String, Value>,
}

/// Inventory record with its image references pulled out of the field map
#[derive(Clone, Debug, PartialEq)]
pub struct SourceRecord {
    /// Source identifier
    pub id: RecordId,
    /// Named, heterogeneous fields
    pub fields: Map<String, Value>,
    /// Image references ordered by slot
    pub images: Vec<ImageRef>,
}

impl SourceRecord {
    /// Build a record, collecting `Image 1` .. `Image 10` attachment fields.
    ///
    /// Each attachment field is a list of objects with a `url`; only the first
    /// entry is used. Plain string values are accepted as a URL too.
    pub fn from_raw(raw: RawRecord) -> Self {
        let images = Slot::all()
            .filter_map(|slot| {
                let url = match raw.fields.get(&format!("Image {slot}"))? {
                    Value::Array(items) => items.first()?.get("url")?.as_str()?.to_string(),
                    Value::String(s) => s.clone(),
                    _ => return None,
                };
                (!url.trim().is_empty()).then_some(ImageRef { slot, url })
            })
            .collect();

        Self {
            id: RecordId(raw.id),
            fields: raw.fields,
            images,
        }
    }

    /// Field rendered as display text: strings as-is, numbers and booleans via
    /// their JSON form, null and missing as `None`.
    pub fn text(&self, field: &str) -> Option<String> {
        match self.fields.get(field)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Array(items) => {
                let parts: Vec<String> = items
                    .iter()
                    .filter_map(|v| match v {
                        Value::String(s) => Some(s.clone()),
                        Value::Number(n) => Some(n.to_string()),
                        _ => None,
                    })
                    .collect();
                (!parts.is_empty()).then(|| parts.join(", "))
            }
            Value::Object(_) => None,
        }
    }

    /// Field as display text, treating blank strings as absent
    pub fn non_blank(&self, field: &str) -> Option<String> {
        self.text(field).filter(|s| !s.trim().is_empty())
    }

    /// Field as a number; numeric strings are parsed
    pub fn number(&self, field: &str) -> Option<f64> {
        match self.fields.get(field)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Lot number as text, if present
    pub fn lot_number(&self) -> Option<String> {
        self.non_blank("Lot Number")
    }
}

/// Image bytes moving through the pipeline for one (record, slot)
#[derive(Clone, Debug)]
pub struct ImageAsset {
    /// Owning record
    pub record_id: RecordId,
    /// Lot number used for the remote file name, empty when the record has none
    pub lot_number: String,
    /// Target slot
    pub slot: Slot,
    /// Raw bytes before normalization, JPEG bytes after
    pub bytes: Vec<u8>,
}

impl ImageAsset {
    /// Remote file name: `<lot>_<record id>_<slot>.jpg`, or `<record id>_<slot>.jpg`
    /// without a lot
    ///
    /// The record id keeps names unique when lots repeat or sanitize alike.
    pub fn file_name(&self) -> String {
        let record = sanitize_file_stem(self.record_id.as_str());
        if self.lot_number.trim().is_empty() {
            format!("{record}_{}.jpg", self.slot)
        } else {
            format!(
                "{}_{record}_{}.jpg",
                sanitize_file_stem(self.lot_number.trim()),
                self.slot
            )
        }
    }
}

fn sanitize_file_stem(stem: &str) -> String {
    stem.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

/// Outcome of re-hosting one image
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResult {
    /// Owning record
    pub record_id: RecordId,
    /// Slot the image belongs to
    pub slot: Slot,
    /// Public URL, `None` when any stage failed
    pub url: Option<String>,
    /// When the attempt finished
    pub completed_at: DateTime<Utc>,
}

/// A record that could not be turned into an output row
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingFailure {
    /// Lot number, or "Unknown" when the record has none
    pub lot_number: String,
    /// Source identifier
    pub record_id: RecordId,
    /// What went wrong
    pub message: String,
}

/// Run stage reported to the status store
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    /// Run accepted, records being fetched
    Started,
    /// Batches being processed
    InProgress,
    /// Export produced
    Completed,
    /// Run aborted
    Error,
}

impl Stage {
    /// COMPLETED and ERROR never change again
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Completed | Stage::Error)
    }

    /// Whether moving from `self` to `next` keeps the stage monotonic
    pub fn can_transition_to(self, next: Stage) -> bool {
        !self.is_terminal() && next >= self
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Started => "STARTED",
            Stage::InProgress => "IN_PROGRESS",
            Stage::Completed => "COMPLETED",
            Stage::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Latest known state of a run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    /// Run identifier
    pub run_id: String,
    /// Current stage
    pub stage: Stage,
    /// Free-text message
    pub message: String,
    /// Unix timestamp (seconds)
    pub timestamp: i64,
    /// Percent complete, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
}

/// Every column of the export, in output order
pub const COLUMNS: [&str; 50] = [
    "EventID",
    "LotNumber",
    "Seller",
    "ConsignorNumber",
    "Category",
    "Region",
    "ListingType",
    "Currency",
    "Title",
    "Subtitle",
    "Description",
    "Price",
    "Quantity",
    "IsTaxable",
    "Image_1",
    "Image_2",
    "Image_3",
    "Image_4",
    "Image_5",
    "Image_6",
    "Image_7",
    "Image_8",
    "Image_9",
    "Image_10",
    "YouTubeID",
    "PdfAttachments",
    "Bold",
    "Badge",
    "Highlight",
    "ShippingOptions",
    "PickupDetails",
    "Duration",
    "StartDTTM",
    "EndDTTM",
    "AutoRelist",
    "GoodTilCanceled",
    "Working Condition",
    "UPC",
    "Truck",
    "Source",
    "Size",
    "Photo Taker",
    "Packaging",
    "Other Notes",
    "MSRP",
    "Lot Number",
    "Location",
    "Item Condition",
    "ID",
    "Amazon ID",
];

/// Column name for an image slot
pub fn image_column(slot: Slot) -> &'static str {
    COLUMNS[13 + slot.get() as usize]
}

/// One mapped record, keyed by export column
///
/// Unknown column names are rejected on write; unset columns read as `""`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct OutputRow {
    cells: BTreeMap<&'static str, String>,
}

impl OutputRow {
    /// Empty row
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a column; returns `false` (and stores nothing) for unknown columns
    pub fn set(&mut self, column: &str, value: impl Into<String>) -> bool {
        match COLUMNS.iter().find(|c| **c == column) {
            Some(known) => {
                self.cells.insert(known, value.into());
                true
            }
            None => false,
        }
    }

    /// Column value, `""` when unset
    pub fn get(&self, column: &str) -> &str {
        self.cells.get(column).map(String::as_str).unwrap_or("")
    }

    /// Values in [`COLUMNS`] order, missing columns filled with `""`
    pub fn values(&self) -> Vec<&str> {
        COLUMNS.iter().map(|c| self.get(c)).collect()
    }
}
