use std::cmp::Ordering;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use utility::{
    geo::Coordinate,
    id::{HasId, Id},
};

use crate::ExampleData;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StopKind {
    /// A child's home, where children are picked up or dropped off.
    Home,
    /// A school or kindergarten.
    Institution,
}

/// A pickup or drop-off point of a route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Stop {
    pub id: Id<Stop>,
    pub name: String,
    pub coordinate: Coordinate,
    pub kind: StopKind,
    pub order: i32,
    /// Set when the driver confirmed the stop.
    #[serde(default)]
    pub completed: bool,
}

impl HasId for Stop {
    type IdType = i64;
}

impl Stop {
    pub fn new<S: Into<String>>(
        id: i64,
        name: S,
        coordinate: Coordinate,
        kind: StopKind,
        order: i32,
    ) -> Self {
        Self {
            id: Id::new(id),
            name: name.into(),
            coordinate,
            kind,
            order,
            completed: false,
        }
    }

    pub fn completed(mut self, completed: bool) -> Self {
        self.completed = completed;
        self
    }

    pub fn distance_to(&self, position: &Coordinate) -> f64 {
        self.coordinate.distance_to(position)
    }

    /// Route order: by `order`, ties broken by ascending id.
    pub fn route_order(&self, other: &Self) -> Ordering {
        self.order
            .cmp(&other.order)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl ExampleData for Stop {
    fn example_data() -> Self {
        Stop::new(
            1,
            "Grundschule Raisdorf",
            Coordinate::new(54.2819, 10.2431),
            StopKind::Institution,
            10,
        )
    }
}
