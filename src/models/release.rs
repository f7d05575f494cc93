use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One row of `releases.json`. `version` may be written as a number or a string.
#[derive(Debug, Deserialize)]
pub struct ReleaseEntry {
    pub platform: String,
    pub version: Value,
    pub supported: bool,
    pub latest: String,
    pub latest_stable: String,
    #[serde(default)]
    pub latest_beta: Option<String>,
}

impl ReleaseEntry {
    pub fn matches(&self, platform: &str, version: &str) -> bool {
        if self.platform != platform {
            return false;
        }
        match &self.version {
            Value::String(v) => v == version,
            Value::Number(v) => v.to_string() == version,
            _ => false,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReleaseResponse {
    pub supported: bool,
    pub latest: String,
    pub latest_stable: String,
    pub latest_beta: Option<String>,
}

impl From<ReleaseEntry> for ReleaseResponse {
    fn from(entry: ReleaseEntry) -> Self {
        Self {
            supported: entry.supported,
            latest: entry.latest,
            latest_stable: entry.latest_stable,
            latest_beta: entry.latest_beta,
        }
    }
}
