use serde::{Deserialize, Serialize};
use std::fmt;

/// How a work unit's page is turned into items
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkKind {
    /// A single product detail page (or a link that redirects to one)
    #[default]
    Product,
    /// A category listing page whose product cards are read directly
    Listing,
}

/// One input row, consumed exactly once by the scheduler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkUnit {
    pub source_url: String,
    /// Explicit category; overrides the categorizer when present
    pub category: Option<String>,
    #[serde(default)]
    pub kind: WorkKind,
}

impl WorkUnit {
    pub fn product(source_url: impl Into<String>, category: Option<String>) -> Self {
        Self {
            source_url: source_url.into(),
            category: category.filter(|c| !c.trim().is_empty()),
            kind: WorkKind::Product,
        }
    }

    pub fn listing(source_url: impl Into<String>, category: impl Into<String>) -> Self {
        let category = category.into();
        Self {
            source_url: source_url.into(),
            category: (!category.trim().is_empty()).then_some(category),
            kind: WorkKind::Listing,
        }
    }

    /// Group key used for pacing between top-level iterations
    pub fn group_key(&self) -> Option<&str> {
        self.category.as_deref()
    }
}

impl fmt::Display for WorkUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.category {
            Some(category) => write!(f, "{} ({:?}, category: {})", self.source_url, self.kind, category),
            None => write!(f, "{} ({:?})", self.source_url, self.kind),
        }
    }
}
