pub mod config;
pub mod error;
pub mod location;
pub mod service;
pub mod sync;
pub mod tracker;

pub use config::{ArrivalPolicy, TrackerConfig};
pub use error::{Result, TrackerError};
pub use service::{TrackerHandle, TrackerService};
pub use tracker::RouteProgressTracker;
