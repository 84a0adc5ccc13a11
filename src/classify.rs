//! File classification by extension
//!
//! The category decides both which worker container handles a file and the
//! folder it lands in inside the storage bucket.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Logical category of an ingested file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    NetworkCapture,
    TextLog,
    Tabular,
    Unclassified,
}

impl Category {
    /// Categories that have a worker container behind them
    pub const WITH_WORKERS: [Category; 3] =
        [Category::NetworkCapture, Category::TextLog, Category::Tabular];

    /// Folder name used inside storage buckets
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::NetworkCapture => "network-capture",
            Category::TextLog => "text-log",
            Category::Tabular => "tabular",
            Category::Unclassified => "unclassified",
        }
    }

    pub fn has_worker(&self) -> bool {
        !matches!(self, Category::Unclassified)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a file name by its extension (case-insensitive).
///
/// Never fails: anything without a known extension is `Unclassified`.
pub fn classify(filename: &str) -> Category {
    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("pcap") => Category::NetworkCapture,
        Some("log") => Category::TextLog,
        Some("csv") => Category::Tabular,
        _ => Category::Unclassified,
    }
}
