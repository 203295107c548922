//! Testing infrastructure for cohortsift.
//!
//! Mock collaborators and demo data for exercising the pipeline without
//! real clustering or an external ranking tool.
//!
//! # Example
//!
//! ```rust,ignore
//! use cohortsift::testing::{write_demo_base, MockClusterer, MockRanker};
//!
//! write_demo_base(root, "demo", "feats")?;
//! let clusterer = MockClusterer::new().with_score(0.42);
//! let ranker = MockRanker::new().returning_count(1);
//! ```

pub mod fixtures;
pub mod mocks;

pub use fixtures::*;
pub use mocks::*;
