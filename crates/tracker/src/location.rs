use std::time::Duration;

use futures::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use utility::geo::Coordinate;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationFix {
    pub coordinate: Coordinate,
    pub timestamp_millis: i64,
}

impl LocationFix {
    pub fn new(coordinate: Coordinate, timestamp_millis: i64) -> Self {
        Self {
            coordinate,
            timestamp_millis,
        }
    }
}

/// Anything that produces location fixes at its own cadence.
pub trait LocationSource {
    fn fixes(self) -> BoxStream<'static, LocationFix>;
}

/// Replays recorded fixes, optionally one per `pace`.
#[derive(Debug, Clone)]
pub struct ReplaySource {
    fixes: Vec<LocationFix>,
    pace: Option<Duration>,
}

impl ReplaySource {
    pub fn new(fixes: Vec<LocationFix>) -> Self {
        Self { fixes, pace: None }
    }

    pub fn paced(mut self, pace: Duration) -> Self {
        self.pace = Some(pace);
        self
    }

    pub fn len(&self) -> usize {
        self.fixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fixes.is_empty()
    }
}

impl LocationSource for ReplaySource {
    fn fixes(self) -> BoxStream<'static, LocationFix> {
        let fixes = tokio_stream::iter(self.fixes);
        match self.pace {
            Some(pace) => tokio_stream::StreamExt::throttle(fixes, pace).boxed(),
            None => fixes.boxed(),
        }
    }
}

/// Fixes pushed by a device callback through the paired sender.
pub struct ChannelSource {
    receiver: mpsc::Receiver<LocationFix>,
}

impl ChannelSource {
    pub fn new(buffer: usize) -> (mpsc::Sender<LocationFix>, Self) {
        let (sender, receiver) = mpsc::channel(buffer);
        (sender, Self { receiver })
    }
}

impl LocationSource for ChannelSource {
    fn fixes(self) -> BoxStream<'static, LocationFix> {
        ReceiverStream::new(self.receiver).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fix(timestamp_millis: i64) -> LocationFix {
        LocationFix::new(Coordinate::new(54.28, 10.24), timestamp_millis)
    }

    #[tokio::test]
    async fn replay_yields_fixes_in_order() {
        let source = ReplaySource::new(vec![fix(1), fix(2), fix(3)]);
        assert_eq!(source.len(), 3);
        let fixes: Vec<_> = source.fixes().collect().await;
        let timestamps: Vec<_> = fixes.iter().map(|fix| fix.timestamp_millis).collect();
        assert_eq!(timestamps, [1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn paced_replay_waits_between_fixes() {
        let started = tokio::time::Instant::now();
        let source = ReplaySource::new(vec![fix(1), fix(2), fix(3)])
            .paced(Duration::from_secs(2));
        let fixes: Vec<_> = source.fixes().collect().await;
        assert_eq!(fixes.len(), 3);
        assert!(started.elapsed() >= Duration::from_secs(4));
    }

    #[tokio::test]
    async fn channel_source_ends_with_its_senders() {
        let (sender, source) = ChannelSource::new(4);
        sender.send(fix(1)).await.unwrap();
        sender.send(fix(2)).await.unwrap();
        drop(sender);
        let fixes: Vec<_> = source.fixes().collect().await;
        assert_eq!(fixes.len(), 2);
    }

    #[test]
    fn deserializes_camel_case() {
        let fix: LocationFix = serde_json::from_str(
            r#"{"coordinate":{"latitude":1.0,"longitude":2.0},"timestampMillis":5}"#,
        )
        .unwrap();
        assert_eq!(fix, LocationFix::new(Coordinate::new(1.0, 2.0), 5));
    }
}
