use serde::{Deserialize, Serialize};

/// A normalized model identifier. Empty or whitespace-only names become
/// `"unknown"`. Capability is derived, not stored: `is_base` is true iff
/// the lowercased name contains `"haiku"`; every other model is premium.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Model(String);

impl Model {
    pub fn new(raw: impl AsRef<str>) -> Self {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            Model("unknown".to_string())
        } else {
            Model(trimmed.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Base-tier models (cheap, counted separately from premium).
    pub fn is_base(&self) -> bool {
        self.0.to_lowercase().contains("haiku")
    }

    pub fn is_premium(&self) -> bool {
        !self.is_base()
    }
}

impl Default for Model {
    fn default() -> Self {
        Model::new("")
    }
}

impl std::fmt::Display for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
