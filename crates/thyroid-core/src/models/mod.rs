//! Domain models for the thyroid tracker.

mod checkup;
mod history;
mod reminder;
mod status;

pub use checkup::*;
pub use history::*;
pub use reminder::*;
pub use status::*;
