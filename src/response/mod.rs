//! Response shaping for preview, commit and ungrouped-plot reports

pub mod builder;
pub mod types;

pub use builder::{form_groups_response, preview_response, ungrouped_response};
pub use types::*;
