use std::{error, fmt};

use indexmap::IndexMap;
use itertools::Itertools;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use utility::{
    geo::{haversine_distance, Coordinate, MPS_TO_KMH},
    id::{HasId, Id},
};

use crate::{
    stop::{Stop, StopKind},
    ExampleData,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    NoStops,
    DuplicateStop(Id<Stop>),
}

impl error::Error for RouteError {}

impl fmt::Display for RouteError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RouteError::NoStops => write!(f, "route has no stops"),
            RouteError::DuplicateStop(id) => {
                write!(f, "stop {} appears more than once", id)
            }
        }
    }
}

/// A planned route as delivered by the backend, either from a saved route or
/// freshly computed.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RouteSnapshot {
    pub id: Option<Id<RouteSnapshot>>,
    pub stops: Vec<Stop>,
    #[serde(default)]
    pub total_distance_meters: f64,
    #[serde(default)]
    pub total_duration_seconds: f64,
    #[serde(default)]
    pub encoded_polyline: String,
}

impl HasId for RouteSnapshot {
    type IdType = i64;
}

impl RouteSnapshot {
    pub fn new(
        stops: Vec<Stop>,
        total_distance_meters: f64,
        total_duration_seconds: f64,
        encoded_polyline: impl Into<String>,
    ) -> Self {
        let mut route = Self {
            id: None,
            stops,
            total_distance_meters,
            total_duration_seconds,
            encoded_polyline: encoded_polyline.into(),
        };
        route.sort_stops();
        route
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(Id::new(id));
        self
    }

    pub fn sort_stops(&mut self) {
        self.stops.sort_by(Stop::route_order);
    }

    /// Checks that the route can be driven and maps every stop id to its
    /// position in `stops`.
    pub fn index_stops(&self) -> Result<IndexMap<Id<Stop>, usize>, RouteError> {
        if self.stops.is_empty() {
            return Err(RouteError::NoStops);
        }
        let mut index = IndexMap::with_capacity(self.stops.len());
        for (position, stop) in self.stops.iter().enumerate() {
            if index.insert(stop.id, position).is_some() {
                return Err(RouteError::DuplicateStop(stop.id));
            }
        }
        Ok(index)
    }

    /// Average planned pace, if the backend delivered usable totals.
    pub fn average_speed_kmh(&self) -> Option<f64> {
        let speed = self.total_distance_meters / self.total_duration_seconds
            * MPS_TO_KMH;
        (self.total_distance_meters > 0.0
            && self.total_duration_seconds > 0.0
            && speed.is_finite())
        .then_some(speed)
    }

    /// Straight line distance from the stop at `position` along all following
    /// stops to the last one.
    pub fn distance_from_stop(&self, position: usize) -> f64 {
        self.stops
            .iter()
            .skip(position)
            .tuple_windows()
            .map(|(a, b)| haversine_distance(&a.coordinate, &b.coordinate))
            .sum()
    }
}

impl ExampleData for RouteSnapshot {
    fn example_data() -> Self {
        RouteSnapshot::new(
            vec![
                Stop::new(
                    11,
                    "Home of Mia",
                    Coordinate::new(54.27851, 10.22992),
                    StopKind::Home,
                    1,
                ),
                Stop::new(
                    12,
                    "Home of Jonas",
                    Coordinate::new(54.27963, 10.23411),
                    StopKind::Home,
                    2,
                ),
                Stop::new(
                    13,
                    "Home of Lea",
                    Coordinate::new(54.28102, 10.23876),
                    StopKind::Home,
                    3,
                ),
                Stop::new(
                    1,
                    "Grundschule Raisdorf",
                    Coordinate::new(54.28190, 10.24310),
                    StopKind::Institution,
                    4,
                ),
            ],
            937.0,
            180.0,
            r"ughjI_`m}@_FeYuGa\oDcZ",
        )
        .with_id(1)
    }
}
