//! Lab report reconstruction from platform OCR output.
//!
//! The platform text recognizer returns loose text fragments with bounding
//! boxes. This crate rebuilds the report table from them and pulls out the
//! thyroid indicator readings and the report date.
//!
//! ```text
//! observations → rows (vertical clustering) → name anchors
//!                                                  │
//!      same row → nearby rows → confidence-ranked → result column
//!                                                  │
//!                                         ExtractedIndicator
//! ```
//!
//! Nothing here fails hard: when no value can be recovered the caller gets an
//! extraction flagged for manual completion.

pub mod catalog;
pub mod date;
pub mod extraction;
pub mod layout;
pub mod numeric;
pub mod observation;

pub use catalog::{find_spec, IndicatorSpec, INDICATORS};
pub use date::DateExtractor;
pub use extraction::*;
pub use layout::{cluster_rows, Fragment, Row};
pub use observation::{BoundingBox, TextObservation};
