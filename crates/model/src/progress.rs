use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use utility::{id::Id, time};

use crate::stop::Stop;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum TrackerStatus {
    /// No route loaded.
    #[default]
    Idle,
    Active,
    /// Route loaded, location updates are ignored.
    Paused,
    /// The last stop has been passed.
    Completed,
}

/// Observable state of a tracked route, recomputed on every location update.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProgressState {
    pub status: TrackerStatus,
    pub current_segment_index: usize,
    pub progress_fraction: f64,
    pub next_stop_id: Option<Id<Stop>>,
    pub next_stop_name: Option<String>,
    pub distance_to_next_stop_meters: Option<f64>,
    pub eta_seconds: Option<f64>,
    pub proximity_alert: bool,
    pub current_speed_kmh: f64,
    pub heading_degrees: Option<f64>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ProgressState {
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn is_completed(&self) -> bool {
        self.status == TrackerStatus::Completed
    }

    /// ETA formatted as `hh:mm:ss`, or dashes while it is unknown.
    pub fn eta_text(&self) -> String {
        self.eta_seconds
            .and_then(time::seconds_to_duration)
            .map(time::format_hms)
            .unwrap_or_else(|| "--:--:--".to_owned())
    }
}
