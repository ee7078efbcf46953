//! Relay storage model types.

/// One row of the `documents` table; `value` is the raw JSON text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDocument {
    pub path: String,
    pub value: String,
}
