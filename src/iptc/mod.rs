//! IPTC-IIM metadata carried in the Photoshop APP13 segment.
//!
//! [`IptcStore`] holds the application record (record 2) as one [`IptcRecord`] per
//! dataset, the IIM datasets it does not interpret, and every other Photoshop image
//! resource block as an opaque [`OpaqueBlock`]. The codec in [`decode`] / [`encode`]
//! converts between the store and an APP13 payload.

mod codec;

pub use codec::{decode, decode_lossy, encode};

use std::collections::BTreeMap;

/// Application record dataset numbers (record 2).
pub mod dataset {
    pub const RECORD_VERSION: u8 = 0;
    pub const OBJECT_NAME: u8 = 5;
    pub const KEYWORDS: u8 = 25;
    pub const SPECIAL_INSTRUCTIONS: u8 = 40;
    pub const DATE_CREATED: u8 = 55;
    pub const BYLINE: u8 = 80;
    pub const BYLINE_TITLE: u8 = 85;
    pub const CITY: u8 = 90;
    pub const PROVINCE_STATE: u8 = 95;
    pub const COUNTRY: u8 = 101;
    pub const HEADLINE: u8 = 105;
    pub const SOURCE: u8 = 115;
    pub const COPYRIGHT_NOTICE: u8 = 116;
    pub const CONTACT: u8 = 118;
    pub const CAPTION_ABSTRACT: u8 = 120;
    pub const WRITER_EDITOR: u8 = 122;
    pub const IMAGE_ORIENTATION: u8 = 131;
}

/// Photoshop image resource holding the IIM stream.
pub const IPTC_RESOURCE_ID: u16 = 0x0404;

/// One application record dataset with all its values, in stream order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IptcRecord {
    pub dataset: u8,
    pub values: Vec<String>,
}

/// A Photoshop image resource block other than the IIM stream, kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpaqueBlock {
    pub resource_id: u16,
    pub name: Vec<u8>,
    pub data: Vec<u8>,
}

/// An IIM dataset that is not a text field of the application record
/// (envelope record, record version, object data ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDataset {
    pub record: u8,
    pub dataset: u8,
    pub value: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IptcStore {
    records: BTreeMap<u8, IptcRecord>,
    raw: Vec<RawDataset>,
    blocks: Vec<OpaqueBlock>,
    /// Position of the IIM resource among `blocks`, and the name it was stored under.
    iptc_slot: Option<(usize, Vec<u8>)>,
    dirty: bool,
}

impl IptcStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// First value of a dataset.
    pub fn get(&self, dataset: u8) -> Option<&str> {
        self.records
            .get(&dataset)
            .and_then(|r| r.values.first())
            .map(String::as_str)
    }

    /// All values of a dataset (empty when absent).
    pub fn values(&self, dataset: u8) -> &[String] {
        self.records
            .get(&dataset)
            .map(|r| r.values.as_slice())
            .unwrap_or(&[])
    }

    pub fn record(&self, dataset: u8) -> Option<&IptcRecord> {
        self.records.get(&dataset)
    }

    /// Records in ascending dataset order.
    pub fn records(&self) -> impl Iterator<Item = &IptcRecord> {
        self.records.values()
    }

    pub fn raw_datasets(&self) -> &[RawDataset] {
        &self.raw
    }

    pub fn opaque_blocks(&self) -> &[OpaqueBlock] {
        &self.blocks
    }

    /// Replace every prior value of a dataset with a single value.
    pub fn set(&mut self, dataset: u8, value: impl Into<String>) {
        self.set_all(dataset, vec![value.into()]);
    }

    /// Replace every prior value of a dataset. An empty list removes the dataset.
    pub fn set_all(&mut self, dataset: u8, values: Vec<String>) {
        if values.is_empty() {
            self.remove(dataset);
            return;
        }
        self.records
            .insert(dataset, IptcRecord { dataset, values });
        self.dirty = true;
    }

    /// Append a value to a repeatable dataset.
    pub fn push(&mut self, dataset: u8, value: impl Into<String>) {
        self.records
            .entry(dataset)
            .or_insert_with(|| IptcRecord {
                dataset,
                values: Vec::new(),
            })
            .values
            .push(value.into());
        self.dirty = true;
    }

    pub fn remove(&mut self, dataset: u8) -> Option<IptcRecord> {
        let removed = self.records.remove(&dataset);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    /// No records, no raw datasets and no other resource blocks.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.raw.is_empty() && self.blocks.is_empty()
    }

    /// Set by any mutation since the store was decoded or last marked clean.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Used by the decoder: accumulate a value without touching the dirty flag.
    fn accumulate(&mut self, dataset: u8, value: String) {
        self.records
            .entry(dataset)
            .or_insert_with(|| IptcRecord {
                dataset,
                values: Vec::new(),
            })
            .values
            .push(value);
    }
}
