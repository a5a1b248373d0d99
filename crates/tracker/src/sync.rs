use std::{error, fmt, sync::Arc};

use async_trait::async_trait;
use model::stop_state::StopStateRequest;
use tokio::sync::Mutex;

#[derive(Debug)]
pub enum SyncError {
    Unavailable,
    Rejected(String),
    Other(Box<dyn error::Error + Send + Sync>),
}

impl error::Error for SyncError {}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SyncError::Unavailable => write!(f, "backend unavailable"),
            SyncError::Rejected(why) => write!(f, "rejected by backend: {}", why),
            SyncError::Other(why) => write!(f, "{}", why),
        }
    }
}

/// Stores the driver's stop confirmations remotely. Failures never undo the
/// local state.
#[async_trait]
pub trait StopStateSync: Send + Sync + 'static {
    async fn push(&self, request: StopStateRequest) -> Result<(), SyncError>;
}

/// Keeps stop states local only.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSync;

#[async_trait]
impl StopStateSync for NoopSync {
    async fn push(&self, request: StopStateRequest) -> Result<(), SyncError> {
        log::trace!("not syncing {:?}", request);
        Ok(())
    }
}

/// Records every request, and optionally fails them afterwards.
#[derive(Debug, Clone, Default)]
pub struct RecordingSync {
    requests: Arc<Mutex<Vec<StopStateRequest>>>,
    failing: bool,
}

impl RecordingSync {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub async fn requests(&self) -> Vec<StopStateRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl StopStateSync for RecordingSync {
    async fn push(&self, request: StopStateRequest) -> Result<(), SyncError> {
        self.requests.lock().await.push(request);
        if self.failing {
            Err(SyncError::Unavailable)
        } else {
            Ok(())
        }
    }
}
