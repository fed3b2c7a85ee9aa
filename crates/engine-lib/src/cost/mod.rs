//! Relative cost allocation and waste detection
//!
//! There is no monetary pricing here: costs are shares of the cluster's
//! requested CPU and memory, and waste is scored per pod by fixed rules.

mod relative;
mod waste;

pub use relative::{calculate_relative_cost, NamespaceCost, RelativeCost};
pub use waste::{
    detect_waste, WasteFinding, WasteReason, WasteReport, WasteRule, WasteSeverity, WasteSummary,
};
