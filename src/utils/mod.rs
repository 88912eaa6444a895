//! Utility modules for group formation
//!
//! Shared functionality used across multiple pipeline stages:
//! - Union-find: connected components for proximity clustering
//! - Dates: median planting date, day gaps, planting windows
//! - Cancellation: cooperative stop between stages

pub mod union_find;
pub mod dates;
pub mod cancellation;

// Re-export commonly used types
pub use union_find::UnionFind;
pub use dates::{median_date, day_gap, date_span};
pub use cancellation::CancellationToken;
