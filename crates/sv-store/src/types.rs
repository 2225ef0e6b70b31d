//! Store data types.

use serde::{Deserialize, Serialize};

pub type RunId = String;

pub const FORMAT_VERSION: u32 = 1;

/// Size of one encoded [`Sample`] in a series file.
pub const SAMPLE_BYTES: usize = 16;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreManifest {
    pub format_version: u32,
    /// File name of the table the store was converted from.
    pub source_file: String,
    pub attribute_names: Vec<String>,
    pub variables: Vec<String>,
    /// Run ids in creation order.
    pub runs: Vec<RunId>,
    pub rows_consumed: usize,
}

/// Column layout shared by every run of one store.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StoreSchema {
    pub attribute_names: Vec<String>,
    pub variables: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

/// Per-run metadata, written once when the run is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunAttributes {
    pub run_id: RunId,
    pub attributes: Vec<Attribute>,
    pub variables: Vec<String>,
}

impl RunAttributes {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }
}

/// One `(tick, value)` record of a time series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub tick: i64,
    pub value: f64,
}

impl Sample {
    pub fn new(tick: i64, value: f64) -> Self {
        Self { tick, value }
    }

    pub fn to_bytes(self) -> [u8; SAMPLE_BYTES] {
        let mut buf = [0u8; SAMPLE_BYTES];
        buf[..8].copy_from_slice(&self.tick.to_le_bytes());
        buf[8..].copy_from_slice(&self.value.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: [u8; SAMPLE_BYTES]) -> Self {
        let mut tick = [0u8; 8];
        let mut value = [0u8; 8];
        tick.copy_from_slice(&buf[..8]);
        value.copy_from_slice(&buf[8..]);
        Self {
            tick: i64::from_le_bytes(tick),
            value: f64::from_le_bytes(value),
        }
    }
}

/// Checks that `run_id` can name a run directory.
pub fn is_valid_run_id(run_id: &str) -> bool {
    !run_id.is_empty()
        && run_id != "."
        && run_id != ".."
        && !run_id
            .chars()
            .any(|c| c == '/' || c == '\\' || c.is_control())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_bytes_are_little_endian() {
        let bytes = Sample::new(1, 2.5).to_bytes();
        assert_eq!(&bytes[..8], &[1, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(Sample::from_bytes(bytes), Sample::new(1, 2.5));
    }

    #[test]
    fn run_id_validation() {
        assert!(is_valid_run_id("42"));
        assert!(is_valid_run_id("run a"));
        assert!(!is_valid_run_id(""));
        assert!(!is_valid_run_id(".."));
        assert!(!is_valid_run_id("a/b"));
        assert!(!is_valid_run_id("a\\b"));
        assert!(!is_valid_run_id("a\nb"));
    }
}
