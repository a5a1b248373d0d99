use std::{error, fmt, result};

use model::{progress::TrackerStatus, route::RouteError, stop::Stop};
use tokio::sync::{mpsc, oneshot};
use utility::{id::Id, polyline::DecodeError};

use crate::service::Request;

#[derive(Debug, Clone, PartialEq)]
pub enum TrackerError {
    /// The route can not be tracked, e.g. it has no stops.
    InvalidRoute(RouteError),
    /// The route's polyline is malformed.
    Decode(DecodeError),
    /// The operation needs a loaded route.
    NoRoute,
    /// The stop is not part of the loaded route.
    UnknownStop(Id<Stop>),
    InvalidTransition {
        from: TrackerStatus,
        action: &'static str,
    },
    /// The tracker service is no longer running.
    ServiceStopped,
    /// The request failed inside the service, which reset the tracker and
    /// keeps running.
    RequestAborted,
}

pub type Result<T> = result::Result<T, TrackerError>;

impl error::Error for TrackerError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            TrackerError::InvalidRoute(why) => Some(why),
            TrackerError::Decode(why) => Some(why),
            _ => None,
        }
    }
}

impl fmt::Display for TrackerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TrackerError::InvalidRoute(why) => write!(f, "invalid route: {}", why),
            TrackerError::Decode(why) => write!(f, "invalid route polyline: {}", why),
            TrackerError::NoRoute => write!(f, "no route loaded"),
            TrackerError::UnknownStop(id) => {
                write!(f, "stop {} is not part of the route", id)
            }
            TrackerError::InvalidTransition { from, action } => {
                write!(f, "can not {} while {:?}", action, from)
            }
            TrackerError::ServiceStopped => write!(f, "tracker service stopped"),
            TrackerError::RequestAborted => {
                write!(f, "request aborted, tracker was reset")
            }
        }
    }
}

impl From<RouteError> for TrackerError {
    fn from(why: RouteError) -> Self {
        Self::InvalidRoute(why)
    }
}

impl From<DecodeError> for TrackerError {
    fn from(why: DecodeError) -> Self {
        Self::Decode(why)
    }
}

impl From<mpsc::error::SendError<Request>> for TrackerError {
    fn from(_: mpsc::error::SendError<Request>) -> Self {
        Self::ServiceStopped
    }
}

/// A dropped responder means the request panicked. A stopped service is
/// reported when sending.
impl From<oneshot::error::RecvError> for TrackerError {
    fn from(_: oneshot::error::RecvError) -> Self {
        Self::RequestAborted
    }
}
