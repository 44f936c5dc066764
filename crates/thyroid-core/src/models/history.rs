//! Scanned report archive entries.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// An image attached to a history record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryImage {
    /// Hex SHA-256 of `data`
    pub digest: String,
    /// Encoded image bytes as handed over by the host
    #[serde(skip)]
    pub data: Vec<u8>,
    /// Position within the record
    pub position: u32,
}

impl HistoryImage {
    pub fn new(data: Vec<u8>, position: u32) -> Self {
        Self {
            digest: image_digest(&data),
            data,
            position,
        }
    }
}

/// Hex-encoded SHA-256 of image bytes.
pub fn image_digest(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// A document record: dated images with a title and notes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryRecord {
    pub id: String,
    pub date: NaiveDate,
    pub title: String,
    pub notes: String,
    /// Images in display order, duplicates removed
    pub images: Vec<HistoryImage>,
    /// Creation timestamp
    pub created_at: String,
}

impl HistoryRecord {
    pub fn new(date: NaiveDate, title: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            date,
            title,
            notes: String::new(),
            images: Vec::new(),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Attach an image. Returns false when identical bytes are already
    /// attached.
    pub fn add_image(&mut self, data: Vec<u8>) -> bool {
        let digest = image_digest(&data);
        if self.images.iter().any(|i| i.digest == digest) {
            return false;
        }
        let position = self.images.len() as u32;
        self.images.push(HistoryImage {
            digest,
            data,
            position,
        });
        true
    }
}
