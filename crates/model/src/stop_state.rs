use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use utility::id::Id;

use crate::{route::RouteSnapshot, stop::Stop};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum StopState {
    Pending,
    Completed,
}

impl From<bool> for StopState {
    fn from(completed: bool) -> Self {
        if completed {
            Self::Completed
        } else {
            Self::Pending
        }
    }
}

/// Body of the request that stores a stop's state on the backend.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StopStateRequest {
    pub route_id: Option<Id<RouteSnapshot>>,
    pub stop_id: Id<Stop>,
    pub state: StopState,
}

impl StopStateRequest {
    pub fn new(
        route_id: Option<Id<RouteSnapshot>>,
        stop_id: Id<Stop>,
        completed: bool,
    ) -> Self {
        Self {
            route_id,
            stop_id,
            state: completed.into(),
        }
    }
}
