use std::{
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use futures::StreamExt;
use model::{
    progress::ProgressState, route::RouteSnapshot, stop::Stop,
    stop_state::StopStateRequest,
};
use tokio::sync::{mpsc, oneshot, watch};
use utility::id::Id;

use crate::{
    config::TrackerConfig,
    error::Result,
    location::{LocationFix, LocationSource},
    sync::StopStateSync,
    tracker::RouteProgressTracker,
};

const MAILBOX_SIZE: usize = 32;

#[derive(Debug)]
pub enum Request {
    LoadRoute {
        route: RouteSnapshot,
        responder: oneshot::Sender<Result<ProgressState>>,
    },
    UpdateLocation {
        fix: LocationFix,
        responder: oneshot::Sender<Option<ProgressState>>,
    },
    MarkStopCompleted {
        stop_id: Id<Stop>,
        completed: bool,
        responder: oneshot::Sender<Result<ProgressState>>,
    },
    Pause {
        responder: oneshot::Sender<Result<()>>,
    },
    Resume {
        responder: oneshot::Sender<Result<()>>,
    },
    Clear {
        responder: oneshot::Sender<()>,
    },
    Progress {
        responder: oneshot::Sender<ProgressState>,
    },
}

/// Owns a tracker and applies requests one at a time, in the order they
/// arrive, so any number of producers can share it.
pub struct TrackerService<S: StopStateSync> {
    config: TrackerConfig,
    tracker: RouteProgressTracker,
    sync: Arc<S>,
    updates: watch::Sender<ProgressState>,
}

impl<S: StopStateSync> TrackerService<S> {
    /// Runs the service on the current tokio runtime until every handle is
    /// dropped. A request that panics resets the tracker to `Idle` and its
    /// caller gets `TrackerError::RequestAborted`.
    pub fn spawn(config: TrackerConfig, sync: S) -> TrackerHandle {
        let (sender, mut receiver) = mpsc::channel(MAILBOX_SIZE);
        let (updates, subscription) = watch::channel(ProgressState::idle());
        let mut service = Self {
            config,
            tracker: RouteProgressTracker::new(config),
            sync: Arc::new(sync),
            updates,
        };

        tokio::spawn(async move {
            while let Some(request) = receiver.recv().await {
                let result =
                    panic::catch_unwind(AssertUnwindSafe(|| service.handle(request)));
                if let Err(why) = result {
                    log::error!("tracker paniced: {:?}", why);
                    service.restart();
                }
            }
            log::debug!("all tracker handles dropped, stopping");
        });

        TrackerHandle {
            sender,
            updates: subscription,
        }
    }

    fn handle(&mut self, request: Request) {
        match request {
            Request::LoadRoute { route, responder } => {
                let result = self.tracker.load_route(route).cloned();
                if result.is_ok() {
                    self.publish();
                }
                respond(responder, result);
            }
            Request::UpdateLocation { fix, responder } => {
                let progress = self
                    .tracker
                    .on_location_update(fix.coordinate, fix.timestamp_millis)
                    .cloned();
                if progress.is_some() {
                    self.publish();
                }
                respond(responder, progress);
            }
            Request::MarkStopCompleted {
                stop_id,
                completed,
                responder,
            } => {
                let result = self.tracker.mark_stop_completed(stop_id, completed).cloned();
                if result.is_ok() {
                    self.publish();
                    self.sync_stop_state(stop_id, completed);
                }
                respond(responder, result);
            }
            Request::Pause { responder } => {
                let result = self.tracker.pause();
                if result.is_ok() {
                    self.publish();
                }
                respond(responder, result);
            }
            Request::Resume { responder } => {
                let result = self.tracker.resume();
                if result.is_ok() {
                    self.publish();
                }
                respond(responder, result);
            }
            Request::Clear { responder } => {
                self.tracker.clear();
                self.publish();
                respond(responder, ());
            }
            Request::Progress { responder } => {
                respond(responder, self.tracker.progress().clone());
            }
        }
    }

    fn publish(&self) {
        self.updates.send_replace(self.tracker.progress().clone());
    }

    /// Forwards the confirmation in the background. The local state stays
    /// authoritative whatever the backend answers.
    fn sync_stop_state(&self, stop_id: Id<Stop>, completed: bool) {
        let route_id = self.tracker.route().and_then(|route| route.id);
        let request = StopStateRequest::new(route_id, stop_id, completed);
        let sync = Arc::clone(&self.sync);
        tokio::spawn(async move {
            match sync.push(request.clone()).await {
                Ok(()) => log::debug!("synced {:?}", request),
                Err(why) => log::warn!(
                    "could not sync state of stop {}: {}",
                    request.stop_id,
                    why
                ),
            }
        });
    }

    fn restart(&mut self) {
        self.tracker = RouteProgressTracker::new(self.config);
        self.publish();
    }
}

fn respond<T>(responder: oneshot::Sender<T>, value: T) {
    if responder.send(value).is_err() {
        log::debug!("requester went away before the response");
    }
}

#[derive(Clone)]
pub struct TrackerHandle {
    sender: mpsc::Sender<Request>,
    updates: watch::Receiver<ProgressState>,
}

impl TrackerHandle {
    pub async fn load_route(&self, route: RouteSnapshot) -> Result<ProgressState> {
        let (responder, response) = oneshot::channel();
        self.sender
            .send(Request::LoadRoute { route, responder })
            .await?;
        response.await?
    }

    /// Returns `None` if the fix was ignored because no route is active.
    pub async fn update_location(&self, fix: LocationFix) -> Result<Option<ProgressState>> {
        let (responder, response) = oneshot::channel();
        self.sender
            .send(Request::UpdateLocation { fix, responder })
            .await?;
        Ok(response.await?)
    }

    pub async fn mark_stop_completed(
        &self,
        stop_id: Id<Stop>,
        completed: bool,
    ) -> Result<ProgressState> {
        let (responder, response) = oneshot::channel();
        self.sender
            .send(Request::MarkStopCompleted {
                stop_id,
                completed,
                responder,
            })
            .await?;
        response.await?
    }

    pub async fn pause(&self) -> Result<()> {
        let (responder, response) = oneshot::channel();
        self.sender.send(Request::Pause { responder }).await?;
        response.await?
    }

    pub async fn resume(&self) -> Result<()> {
        let (responder, response) = oneshot::channel();
        self.sender.send(Request::Resume { responder }).await?;
        response.await?
    }

    pub async fn clear(&self) -> Result<()> {
        let (responder, response) = oneshot::channel();
        self.sender.send(Request::Clear { responder }).await?;
        Ok(response.await?)
    }

    pub async fn progress(&self) -> Result<ProgressState> {
        let (responder, response) = oneshot::channel();
        self.sender.send(Request::Progress { responder }).await?;
        Ok(response.await?)
    }

    /// Every published progress, starting from the latest one.
    pub fn subscribe(&self) -> watch::Receiver<ProgressState> {
        self.updates.clone()
    }

    /// Feeds all fixes of `source` until it ends and returns how many were
    /// applied.
    pub async fn follow<L: LocationSource>(&self, source: L) -> Result<usize> {
        let mut fixes = source.fixes();
        let mut applied = 0;
        while let Some(fix) = fixes.next().await {
            if self.update_location(fix).await?.is_some() {
                applied += 1;
            }
        }
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use model::{progress::TrackerStatus, route::RouteError, ExampleData};
    use utility::geo::Coordinate;

    use super::*;
    use crate::{
        error::TrackerError,
        location::ReplaySource,
        sync::{NoopSync, RecordingSync},
    };

    fn stop_fixes(route: &RouteSnapshot) -> Vec<LocationFix> {
        route
            .stops
            .iter()
            .enumerate()
            .map(|(tick, stop)| LocationFix::new(stop.coordinate, tick as i64 * 20_000))
            .collect()
    }

    async fn wait_for_requests(sync: &RecordingSync, count: usize) -> Vec<StopStateRequest> {
        for _ in 0..200 {
            let requests = sync.requests().await;
            if requests.len() >= count {
                return requests;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {} synced requests", count);
    }

    #[tokio::test]
    async fn follows_a_replayed_drive_to_completion() {
        let _ = env_logger::builder().is_test(true).try_init();
        let handle = TrackerService::spawn(TrackerConfig::default(), NoopSync);
        let mut updates = handle.subscribe();
        let route = RouteSnapshot::example_data();
        let fixes = stop_fixes(&route);

        handle.load_route(route).await.unwrap();
        updates.changed().await.unwrap();
        assert_eq!(updates.borrow_and_update().status, TrackerStatus::Active);

        let applied = handle.follow(ReplaySource::new(fixes)).await.unwrap();
        assert_eq!(applied, 4);

        let progress = handle.progress().await.unwrap();
        assert_eq!(progress.status, TrackerStatus::Completed);
        assert_eq!(progress.progress_fraction, 1.0);
        assert_eq!(*updates.borrow(), progress);
    }

    #[tokio::test]
    async fn empty_route_keeps_the_service_idle() {
        let handle = TrackerService::spawn(TrackerConfig::default(), NoopSync);
        let result = handle
            .load_route(RouteSnapshot::new(vec![], 0.0, 0.0, ""))
            .await;
        assert_eq!(result, Err(TrackerError::InvalidRoute(RouteError::NoStops)));
        assert_eq!(handle.progress().await.unwrap().status, TrackerStatus::Idle);
        assert_eq!(
            handle
                .update_location(LocationFix::new(Coordinate::new(0.0, 0.0), 0))
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn confirmations_are_synced_in_the_background() {
        let sync = RecordingSync::new();
        let handle = TrackerService::spawn(TrackerConfig::default(), sync.clone());
        let route = RouteSnapshot::example_data();
        let first = route.stops[0].id;
        handle.load_route(route).await.unwrap();

        let progress = handle.mark_stop_completed(first, true).await.unwrap();
        assert_eq!(progress.current_segment_index, 1);

        let requests = wait_for_requests(&sync, 1).await;
        assert_eq!(
            requests,
            vec![StopStateRequest::new(Some(Id::new(1)), first, true)]
        );
    }

    #[tokio::test]
    async fn failed_sync_keeps_local_state() {
        let sync = RecordingSync::failing();
        let handle = TrackerService::spawn(TrackerConfig::default(), sync.clone());
        let route = RouteSnapshot::example_data();
        let first = route.stops[0].id;
        handle.load_route(route).await.unwrap();

        handle.mark_stop_completed(first, true).await.unwrap();
        wait_for_requests(&sync, 1).await;

        let progress = handle.progress().await.unwrap();
        assert_eq!(progress.current_segment_index, 1);
        assert!(progress.progress_fraction > 0.0);
    }

    #[tokio::test]
    async fn rejected_requests_are_not_synced() {
        let sync = RecordingSync::new();
        let handle = TrackerService::spawn(TrackerConfig::default(), sync.clone());
        handle.load_route(RouteSnapshot::example_data()).await.unwrap();

        let result = handle.mark_stop_completed(Id::new(999), true).await;
        assert_eq!(result, Err(TrackerError::UnknownStop(Id::new(999))));
        tokio::task::yield_now().await;
        assert!(sync.requests().await.is_empty());
    }

    #[tokio::test]
    async fn pause_resume_and_clear_are_published() {
        let handle = TrackerService::spawn(TrackerConfig::default(), NoopSync);
        let mut updates = handle.subscribe();
        assert!(handle.pause().await.is_err());

        handle.load_route(RouteSnapshot::example_data()).await.unwrap();
        handle.pause().await.unwrap();
        updates.changed().await.unwrap();
        assert_eq!(updates.borrow_and_update().status, TrackerStatus::Paused);

        handle.resume().await.unwrap();
        updates.changed().await.unwrap();
        assert_eq!(updates.borrow_and_update().status, TrackerStatus::Active);

        handle.clear().await.unwrap();
        updates.changed().await.unwrap();
        assert_eq!(*updates.borrow_and_update(), ProgressState::idle());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_producers_are_serialized() {
        let handle = TrackerService::spawn(TrackerConfig::default(), NoopSync);
        let route = RouteSnapshot::example_data();
        let fixes = stop_fixes(&route);
        handle.load_route(route).await.unwrap();

        // a second producer reporting a position far away from every stop,
        // with clocks behind the gps so that only its own fixes turn stale
        let noise = handle.clone();
        let noise_task = tokio::spawn(async move {
            let mut index = 0;
            for tick in 0..50 {
                let fix =
                    LocationFix::new(Coordinate::new(54.0, 10.0), tick * 1_000 - 100_000);
                if let Some(progress) = noise.update_location(fix).await.unwrap() {
                    assert!(progress.current_segment_index >= index);
                    index = progress.current_segment_index;
                }
            }
        });

        let gps = handle.clone();
        let gps_task = tokio::spawn(async move {
            let mut index = 0;
            for fix in fixes {
                let progress = gps.update_location(fix).await.unwrap().unwrap();
                assert!(progress.current_segment_index > index);
                index = progress.current_segment_index;
            }
        });

        gps_task.await.unwrap();
        noise_task.await.unwrap();
        let progress = handle.progress().await.unwrap();
        assert_eq!(progress.status, TrackerStatus::Completed);
    }
}
