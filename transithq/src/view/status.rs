//! Observable view status.

use chrono::{DateTime, Local, Utc};
use serde::Serialize;

use super::ViewState;

/// What the view currently shows, for status bars and logs.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ViewStatus {
    /// Lifecycle state.
    pub state: ViewState,
    /// Number of displayed entities.
    pub vehicles: usize,
    /// Retrieval time of the displayed snapshot.
    pub last_updated: Option<DateTime<Utc>>,
    /// Sequence number of the displayed snapshot.
    pub sequence: u64,
    /// Feed elements dropped while parsing the displayed snapshot.
    pub rejected: usize,
    /// Latest retrieval failure, cleared by the next successful one.
    pub error: Option<String>,
    /// Retrieval failures reported since mount.
    pub failures: u64,
}

impl ViewStatus {
    /// One-line summary, e.g. `42 vehicles • updated 14:03:07`.
    pub fn status_line(&self) -> String {
        if let Some(error) = &self.error {
            return format!("Error: {}", error);
        }
        match self.last_updated {
            Some(updated) => format!(
                "{} {} • updated {}",
                self.vehicles,
                if self.vehicles == 1 { "vehicle" } else { "vehicles" },
                updated.with_timezone(&Local).format("%H:%M:%S")
            ),
            None => "Loading vehicles...".to_string(),
        }
    }
}
