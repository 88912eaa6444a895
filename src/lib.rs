//! Rice Group Formation Engine
//!
//! Partitions a cluster's farm plots into production groups for a season/year,
//! subject to spatial proximity, rice variety, planting-date alignment, group
//! size bounds and supervisor capacity. Plots that cannot be grouped are
//! explained, never dropped.
//!
//! Layout:
//! - `stages/`: the eight pipeline stages (s1-s8), pure functions over in-memory data
//! - `engine`: preview / commit orchestration
//! - `geometry/`: `PolygonOps` capability, WKT parsing, GeoJSON/WKT output
//! - `source` / `store`: read-side and persistence collaborators
//! - `response/`: response DTOs and mapping
//! - `data`: CSV-backed farm data loaded with Polars
//! - `utils/`: union-find, date helpers, cancellation

pub mod data;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod params;
pub mod response;
pub mod source;
pub mod stages;
pub mod store;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use engine::{
    verify_invariants, CommitOutcome, FormedGroup, GroupFormationEngine, GroupingRequest, GroupingResult, Warning,
    WarningKind,
};
pub use error::{GeometryError, GroupingError, SourceError, StoreError};
pub use geometry::{GeoPolygonOps, PolygonOps};
pub use params::{GroupingParams, UndersizedPolicy};
pub use source::{FarmDataSource, InMemoryFarmData};
pub use stages::{CandidateKind, UngroupedReason};
pub use store::{GroupStore, GroupTransaction, InMemoryGroupStore};
pub use types::*;
pub use utils::CancellationToken;
