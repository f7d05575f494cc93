use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A row-level write reported by the repository change feed.
///
/// `data` only carries columns that are safe to show to anonymous
/// listeners: no tokens, public keys or account numbers.
#[derive(Debug, Clone, Serialize)]
pub struct ChangeRecord {
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    pub table: &'static str,
    pub data: Value,
}

impl ChangeRecord {
    pub fn new(kind: ChangeKind, table: &'static str, data: Value) -> Self {
        Self { kind, table, data }
    }
}
