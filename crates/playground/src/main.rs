use std::{env, error::Error, fs::File, time::Duration};

use futures::StreamExt;
use model::{route::RouteSnapshot, ExampleData};
use serde::Deserialize;
use tracker::{
    location::{LocationFix, LocationSource, ReplaySource},
    sync::RecordingSync,
    TrackerConfig, TrackerService,
};
use utility::{geo::Coordinate, polyline};

/// One row of a recorded GPS trace.
#[derive(Debug, Deserialize)]
struct TraceRow {
    latitude: f64,
    longitude: f64,
    timestamp_millis: i64,
}

impl From<TraceRow> for LocationFix {
    fn from(row: TraceRow) -> Self {
        LocationFix::new(Coordinate::new(row.latitude, row.longitude), row.timestamp_millis)
    }
}

fn read_route(path: &str) -> Result<RouteSnapshot, Box<dyn Error>> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(file)?)
}

fn read_trace(path: &str) -> Result<Vec<LocationFix>, Box<dyn Error>> {
    let file = File::open(path)?;
    let mut reader = csv::Reader::from_reader(file);
    let mut fixes = Vec::new();
    for row in reader.deserialize() {
        let row: TraceRow = row?;
        fixes.push(row.into());
    }
    Ok(fixes)
}

/// Drives along the route's polyline (or its stops) in small steps.
fn synthesize_trace(route: &RouteSnapshot) -> Result<Vec<LocationFix>, Box<dyn Error>> {
    const STEPS_PER_LEG: usize = 5;
    const STEP_MILLIS: i64 = 4_000;

    let mut path = polyline::decode(&route.encoded_polyline)?;
    if path.len() < 2 {
        path = route.stops.iter().map(|stop| stop.coordinate).collect();
    }

    let mut fixes = Vec::new();
    for leg in path.windows(2) {
        let (from, to) = (leg[0], leg[1]);
        for step in 0..STEPS_PER_LEG {
            let t = step as f64 / STEPS_PER_LEG as f64;
            let position = Coordinate::new(
                from.latitude + (to.latitude - from.latitude) * t,
                from.longitude + (to.longitude - from.longitude) * t,
            );
            fixes.push(LocationFix::new(position, fixes.len() as i64 * STEP_MILLIS));
        }
    }
    if let Some(last) = path.last() {
        fixes.push(LocationFix::new(*last, fixes.len() as i64 * STEP_MILLIS));
    }
    Ok(fixes)
}

/// Usage: `playground [route.json] [trace.csv]`
///
/// Without arguments an example school run is driven. `PLAYGROUND_PACE_MS`
/// slows the replay down.
#[tokio::main]
async fn main() {
    env_logger::init();

    let mut args = env::args().skip(1);
    let route = match args.next() {
        Some(path) => read_route(&path).expect("could not read route file."),
        None => RouteSnapshot::example_data(),
    };
    let fixes = match args.next() {
        Some(path) => read_trace(&path).expect("could not read trace file."),
        None => synthesize_trace(&route).expect("could not decode route polyline."),
    };
    let pace = env::var("PLAYGROUND_PACE_MS")
        .ok()
        .and_then(|value| value.parse().ok())
        .map(Duration::from_millis);

    let sync = RecordingSync::new();
    let handle = TrackerService::spawn(TrackerConfig::from_env(), sync.clone());
    handle
        .load_route(route)
        .await
        .expect("could not load route.");

    let mut source = ReplaySource::new(fixes);
    if let Some(pace) = pace {
        source = source.paced(pace);
    }
    let mut fixes = source.fixes();
    while let Some(fix) = fixes.next().await {
        let Some(progress) = handle
            .update_location(fix)
            .await
            .expect("tracker service stopped.")
        else {
            break;
        };
        println!(
            "{:>3.0}% | next: {:<24} | eta {} | {:>5.1} km/h{}",
            progress.progress_fraction * 100.0,
            progress.next_stop_name.as_deref().unwrap_or("-"),
            progress.eta_text(),
            progress.current_speed_kmh,
            if progress.proximity_alert { " | arriving" } else { "" }
        );
        // the driver confirms every stop on arrival
        if progress.proximity_alert {
            if let Some(stop_id) = progress.next_stop_id {
                if let Err(why) = handle.mark_stop_completed(stop_id, true).await {
                    log::warn!("could not confirm stop {}: {}", stop_id, why);
                }
            }
        }
    }

    let progress = handle.progress().await.expect("tracker service stopped.");
    println!("{}", serde_json::to_string_pretty(&progress).expect("could not serialize progress."));

    // give the background sync a moment to finish
    tokio::time::sleep(Duration::from_millis(50)).await;
    println!("synced stop states: {}", sync.requests().await.len());
}
