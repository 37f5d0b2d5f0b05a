#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Tracking parameters.
pub mod config;

/// Tracking context.
pub mod context;

mod error;
pub use error::TrackingError;

/// Features and feature lists.
pub mod feature;

mod klt_tracker;
pub use klt_tracker::KltTracker;

/// Image and gradient pyramids of a frame.
pub mod pyramid_set;

/// Feature selection.
pub mod selector;

/// Regions restricting feature selection.
pub mod target_area;

/// Feature tracking.
pub mod tracker;

pub use config::{AffineConsistencyCheck, InputRange, TrackingConfig};
pub use context::TrackingContext;
pub use feature::{Feature, FeatureList, FeatureRecord, LossReason};
pub use pyramid_set::PyramidSet;
pub use selector::SelectionMode;
pub use target_area::{Polygon, TargetArea};
