//! Error types
//!
//! Fatal errors abort a run (`GroupingError`). Per-plot problems never show up
//! here; they are absorbed into warnings and the ungrouped-plot explanations.

use thiserror::Error;
use uuid::Uuid;

use crate::types::PlotId;

#[derive(Debug, Error)]
pub enum GroupingError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("invalid grouping request: {0}")]
    Validation(String),

    #[error("{} plot(s) were grouped for this season by a concurrent commit; re-run the preview", plot_ids.len())]
    ConcurrencyConflict { plot_ids: Vec<PlotId> },

    #[error("group formation cancelled before stage '{stage}'")]
    Cancelled { stage: &'static str },

    #[error("data source failed: {0}")]
    Source(#[from] SourceError),

    #[error("group store failed: {0}")]
    Store(#[from] StoreError),
}

/// Failure reported by a read-side collaborator
#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Failure reported by the persistence collaborator
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("plot {plot_id} already belongs to a group for this season")]
    UniqueViolation { plot_id: PlotId },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A plot boundary that could not be read; the plot is treated as having no geometry
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("unsupported geometry type '{0}' (expected POLYGON or MULTIPOLYGON)")]
    UnsupportedType(String),

    #[error("malformed WKT: {0}")]
    Malformed(String),

    #[error("polygon ring has {0} points; at least 4 are required")]
    RingTooShort(usize),

    #[error("polygon is empty")]
    Empty,
}
