use std::fmt;

use indexmap::IndexMap;
use log::{debug, info};
use model::{
    progress::{ProgressState, TrackerStatus},
    route::RouteSnapshot,
    stop::Stop,
};
use utility::{
    geo::{self, Coordinate, MPS_TO_KMH},
    id::Id,
    polyline, time,
};

use crate::{
    config::{ArrivalPolicy, TrackerConfig},
    error::{Result, TrackerError},
};

struct LoadedRoute {
    snapshot: RouteSnapshot,
    stop_index: IndexMap<Id<Stop>, usize>,
    path: Vec<Coordinate>,
    fallback_speed_kmh: f64,
}

impl LoadedRoute {
    fn stops(&self) -> &[Stop] {
        &self.snapshot.stops
    }
}

#[derive(Debug, Clone, Copy)]
struct Fix {
    position: Coordinate,
    timestamp_millis: i64,
}

/// A fix that is not newer than the previous one. The tick is skipped and the
/// previous progress kept.
#[derive(Debug)]
struct StaleTimestamp {
    previous_millis: i64,
    current_millis: i64,
}

impl fmt::Display for StaleTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "stale location fix at {} (previous fix at {})",
            self.current_millis, self.previous_millis
        )
    }
}

/// Follows a vehicle along the stops of a route.
///
/// The tracker is `Idle` until a route is loaded, `Active` while it consumes
/// location updates, `Paused` while updates are ignored and `Completed` once
/// the last stop has been passed. The segment index and the progress fraction
/// never decrease while a route is loaded.
pub struct RouteProgressTracker {
    config: TrackerConfig,
    status: TrackerStatus,
    route: Option<LoadedRoute>,
    current_segment_index: usize,
    last_fix: Option<Fix>,
    progress: ProgressState,
}

impl Default for RouteProgressTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

impl RouteProgressTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            status: TrackerStatus::Idle,
            route: None,
            current_segment_index: 0,
            last_fix: None,
            progress: ProgressState::idle(),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn status(&self) -> TrackerStatus {
        self.status
    }

    pub fn progress(&self) -> &ProgressState {
        &self.progress
    }

    pub fn current_segment_index(&self) -> usize {
        self.current_segment_index
    }

    pub fn route(&self) -> Option<&RouteSnapshot> {
        self.route.as_ref().map(|route| &route.snapshot)
    }

    /// The decoded route polyline, empty without a route.
    pub fn path(&self) -> &[Coordinate] {
        self.route
            .as_ref()
            .map(|route| route.path.as_slice())
            .unwrap_or_default()
    }

    /// Replaces any loaded route and starts tracking it. On error the tracker
    /// is left untouched.
    pub fn load_route(&mut self, mut snapshot: RouteSnapshot) -> Result<&ProgressState> {
        snapshot.sort_stops();
        let stop_index = snapshot.index_stops()?;
        let path = polyline::decode(&snapshot.encoded_polyline)?;
        let fallback_speed_kmh = snapshot
            .average_speed_kmh()
            .unwrap_or(self.config.fallback_speed_kmh);

        if let Some(previous) = &self.route {
            info!(
                "replacing route {:?} ({:?})",
                previous.snapshot.id, self.status
            );
        }
        info!(
            "loaded route {:?} with {} stops and {} path points, fallback speed {:.1} km/h",
            snapshot.id,
            snapshot.stops.len(),
            path.len(),
            fallback_speed_kmh
        );

        self.route = Some(LoadedRoute {
            snapshot,
            stop_index,
            path,
            fallback_speed_kmh,
        });
        self.status = TrackerStatus::Active;
        self.current_segment_index = 0;
        self.last_fix = None;
        self.progress = ProgressState::idle();
        self.skip_completed_stops();
        self.refresh();
        Ok(&self.progress)
    }

    /// Feeds a location fix. Returns the new progress, or `None` if the
    /// tracker is not active and the fix was ignored. A fix that is not newer
    /// than the last accepted one leaves the progress as it was.
    pub fn on_location_update(
        &mut self,
        position: Coordinate,
        timestamp_millis: i64,
    ) -> Option<&ProgressState> {
        if self.status != TrackerStatus::Active {
            debug!("ignoring location fix while {:?}", self.status);
            return None;
        }
        let Some((speed_kmh, heading)) = self.update_motion(position, timestamp_millis) else {
            return Some(&self.progress);
        };

        let route = self.route.as_ref()?;
        let target_index = self.current_segment_index;
        let target = route.stops().get(target_index)?;
        let target_id = target.id;
        let target_name = target.name.clone();
        let distance = target.distance_to(&position);
        let proximity_alert = distance < self.config.proximity_threshold_m;
        let eta_seconds = Self::eta_seconds(
            &self.config,
            distance,
            speed_kmh,
            route.fallback_speed_kmh,
        );
        debug!(
            "{:.0} m to stop {} at {:.1} km/h, eta {:.0} s",
            distance, target_id, speed_kmh, eta_seconds
        );

        if proximity_alert {
            info!("within {:.0} m of stop {} ({})", distance, target_id, target_name);
            if self.config.arrival_policy == ArrivalPolicy::Automatic {
                self.advance_past(target_index);
            }
        }
        let completed = self.check_completed();

        self.progress = ProgressState {
            status: self.status,
            current_segment_index: self.current_segment_index,
            progress_fraction: self.progress_fraction(),
            next_stop_id: Some(target_id),
            next_stop_name: Some(target_name),
            distance_to_next_stop_meters: Some(distance),
            eta_seconds: Some(if completed { 0.0 } else { eta_seconds }),
            proximity_alert,
            current_speed_kmh: speed_kmh,
            heading_degrees: heading,
            updated_at: time::from_timestamp_millis(timestamp_millis)
                .or(self.progress.updated_at),
        };
        Some(&self.progress)
    }

    /// Sets the driver's confirmation of a stop. Completing the stop the
    /// tracker is heading to moves on to the next incomplete one. The segment
    /// index never moves back, even if a passed stop is reopened.
    pub fn mark_stop_completed(
        &mut self,
        stop_id: Id<Stop>,
        completed: bool,
    ) -> Result<&ProgressState> {
        let route = self.route.as_mut().ok_or(TrackerError::NoRoute)?;
        let position = *route
            .stop_index
            .get(&stop_id)
            .ok_or(TrackerError::UnknownStop(stop_id))?;
        route.snapshot.stops[position].completed = completed;
        info!(
            "stop {} marked {}",
            stop_id,
            if completed { "completed" } else { "pending" }
        );

        if completed && position == self.current_segment_index {
            self.skip_completed_stops();
        }
        self.refresh();
        Ok(&self.progress)
    }

    pub fn pause(&mut self) -> Result<()> {
        match self.status {
            TrackerStatus::Active | TrackerStatus::Paused => {
                self.set_status(TrackerStatus::Paused);
                Ok(())
            }
            from => Err(TrackerError::InvalidTransition {
                from,
                action: "pause",
            }),
        }
    }

    pub fn resume(&mut self) -> Result<()> {
        match self.status {
            TrackerStatus::Paused => {
                // the gap would read as a crawl, so speed is measured afresh
                self.last_fix = None;
                self.set_status(TrackerStatus::Active);
                Ok(())
            }
            TrackerStatus::Active => Ok(()),
            from => Err(TrackerError::InvalidTransition {
                from,
                action: "resume",
            }),
        }
    }

    /// Drops the route and all progress.
    pub fn clear(&mut self) {
        if let Some(route) = self.route.take() {
            info!("cleared route {:?}", route.snapshot.id);
        }
        self.status = TrackerStatus::Idle;
        self.current_segment_index = 0;
        self.last_fix = None;
        self.progress = ProgressState::idle();
    }

    /// Distance from the last known position to the next stop plus the
    /// straight legs between the remaining stops.
    pub fn remaining_distance_meters(&self) -> Option<f64> {
        let route = self.route.as_ref()?;
        let Some(next) = route.stops().get(self.current_segment_index) else {
            return Some(0.0);
        };
        let approach = self
            .last_fix
            .map(|fix| next.distance_to(&fix.position))
            .unwrap_or(0.0);
        Some(approach + route.snapshot.distance_from_stop(self.current_segment_index))
    }

    /// Updates the previous fix and returns the current speed and heading,
    /// or `None` for a stale fix.
    fn update_motion(
        &mut self,
        position: Coordinate,
        timestamp_millis: i64,
    ) -> Option<(f64, Option<f64>)> {
        let fix = Fix {
            position,
            timestamp_millis,
        };
        let Some(previous) = self.last_fix else {
            self.last_fix = Some(fix);
            return Some((
                self.progress.current_speed_kmh,
                self.progress.heading_degrees,
            ));
        };
        if timestamp_millis <= previous.timestamp_millis {
            let stale = StaleTimestamp {
                previous_millis: previous.timestamp_millis,
                current_millis: timestamp_millis,
            };
            debug!("{}", stale);
            return None;
        }

        let mut speed_kmh = self.progress.current_speed_kmh;
        let mut heading = self.progress.heading_degrees;
        let distance = previous.position.distance_to(&position);
        // the gap between two i64 timestamps may not fit an i64
        let elapsed_millis =
            i128::from(timestamp_millis) - i128::from(previous.timestamp_millis);
        match geo::speed_kmh(distance, elapsed_millis as f64 / 1000.0) {
            Some(speed) if speed.is_finite() => speed_kmh = speed,
            _ => debug!("no usable speed from {:.1} m", distance),
        }
        if distance > 0.0 {
            heading = Some(previous.position.bearing_to(&position));
        }
        self.last_fix = Some(fix);
        Some((speed_kmh, heading))
    }

    fn eta_seconds(
        config: &TrackerConfig,
        distance_m: f64,
        speed_kmh: f64,
        fallback_speed_kmh: f64,
    ) -> f64 {
        let speed_kmh = if speed_kmh.is_finite() && speed_kmh >= config.min_speed_kmh {
            speed_kmh
        } else {
            fallback_speed_kmh
        };
        distance_m / (speed_kmh / MPS_TO_KMH)
    }

    fn advance_past(&mut self, stop_index: usize) {
        self.current_segment_index = self.current_segment_index.max(stop_index + 1);
        self.skip_completed_stops();
    }

    fn skip_completed_stops(&mut self) {
        let Some(route) = &self.route else {
            return;
        };
        while route
            .stops()
            .get(self.current_segment_index)
            .is_some_and(|stop| stop.completed)
        {
            self.current_segment_index += 1;
        }
    }

    /// Moves to `Completed` once the last stop is passed.
    fn check_completed(&mut self) -> bool {
        let stop_count = self
            .route
            .as_ref()
            .map(|route| route.stops().len())
            .unwrap_or(0);
        let completed = self.route.is_some() && self.current_segment_index >= stop_count;
        if completed && self.status != TrackerStatus::Completed {
            info!("route completed after {} stops", stop_count);
            self.status = TrackerStatus::Completed;
        }
        completed
    }

    /// Share of passed or confirmed stops, never lower than before.
    fn progress_fraction(&self) -> f64 {
        let Some(route) = &self.route else {
            return 0.0;
        };
        let stops = route.stops();
        if self.current_segment_index >= stops.len() {
            return 1.0;
        }
        let passed = self.current_segment_index
            + stops[self.current_segment_index..]
                .iter()
                .filter(|stop| stop.completed)
                .count();
        let fraction = passed as f64 / stops.len() as f64;
        fraction.max(self.progress.progress_fraction)
    }

    /// Recomputes the progress without a new fix, using the last known
    /// position.
    fn refresh(&mut self) {
        let completed = self.check_completed();
        let progress_fraction = self.progress_fraction();
        let next = self
            .route
            .as_ref()
            .and_then(|route| {
                route
                    .stops()
                    .get(self.current_segment_index)
                    .map(|stop| (route, stop))
            });

        let (next_stop_id, next_stop_name, distance, eta_seconds) = match next {
            Some((route, stop)) => {
                let distance = self.last_fix.map(|fix| stop.distance_to(&fix.position));
                let eta = distance.map(|distance| {
                    Self::eta_seconds(
                        &self.config,
                        distance,
                        self.progress.current_speed_kmh,
                        route.fallback_speed_kmh,
                    )
                });
                (Some(stop.id), Some(stop.name.clone()), distance, eta)
            }
            None if completed => (None, None, None, Some(0.0)),
            None => (None, None, None, None),
        };

        self.progress = ProgressState {
            status: self.status,
            current_segment_index: self.current_segment_index,
            progress_fraction,
            next_stop_id,
            next_stop_name,
            distance_to_next_stop_meters: distance,
            eta_seconds,
            proximity_alert: distance
                .is_some_and(|distance| distance < self.config.proximity_threshold_m),
            current_speed_kmh: self.progress.current_speed_kmh,
            heading_degrees: self.progress.heading_degrees,
            updated_at: self.progress.updated_at,
        };
    }

    fn set_status(&mut self, status: TrackerStatus) {
        if self.status != status {
            info!("tracker {:?} -> {:?}", self.status, status);
        }
        self.status = status;
        self.progress.status = status;
    }
}
