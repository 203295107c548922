//! Read-only reports over the artifact tree.

pub mod best;
pub mod counts;

pub use best::{best_clusterings, scan_clusterings, BestClusterings, ScoredClustering};
pub use counts::{category_counts, CategoryCounts};
