use serde::{Deserialize, Serialize};

/// One entry of the run's work list, produced by the corpus enumerator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub locator: String,
    pub external_id: String,
}

impl WorkItem {
    pub fn new(locator: impl Into<String>, external_id: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
            external_id: external_id.into(),
        }
    }
}
