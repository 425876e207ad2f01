mod client;
mod heuristics;
mod parser;

pub use client::{HttpSnapshotSource, Snapshot, SnapshotSource, StaticSnapshotSource, MOCK_PAGE};
pub use heuristics::{classify, Availability};
pub use parser::parse_sessions;

use serde::Serialize;

/// Placeholder used when a row has no description field
pub const MISSING_DESCRIPTION: &str = "N/A";

/// One listed exam session, built fresh every cycle and never mutated.
///
/// Only [`SessionRecord::new`] builds one, so the derived availability always
/// matches the note and purchase link.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionRecord {
    /// Human-readable label (date, time, location)
    pub description: String,
    /// Free-text annotation such as "Esaurito" or "ultimi 3 posti"
    pub note: String,
    /// Purchase target; present iff the row offers a purchase link
    pub purchase_url: Option<String>,
    pub price_public: String,
    pub price_student: String,
    availability: Availability,
}

impl SessionRecord {
    pub fn new(description: String, note: String, purchase_url: Option<String>) -> Self {
        let availability = classify(&note, purchase_url.is_some());
        Self {
            description,
            note,
            purchase_url,
            price_public: String::new(),
            price_student: String::new(),
            availability,
        }
    }

    pub fn with_prices(mut self, public: String, student: String) -> Self {
        self.price_public = public;
        self.price_student = student;
        self
    }

    pub fn has_purchase_link(&self) -> bool {
        self.purchase_url.is_some()
    }

    pub fn is_sold_out(&self) -> bool {
        self.availability.is_sold_out
    }

    pub fn is_available(&self) -> bool {
        self.availability.is_available
    }

    pub fn has_last_spots(&self) -> bool {
        self.availability.has_last_spots
    }
}

/// Sessions that can be booked right now, in document order
pub fn available(sessions: &[SessionRecord]) -> Vec<SessionRecord> {
    sessions.iter().filter(|s| s.is_available()).cloned().collect()
}
