use std::{env, fmt, str::FromStr};

pub const DEFAULT_PROXIMITY_THRESHOLD_M: f64 = 50.0;
/// Used for the ETA while standing still, unless the route has a planned pace.
pub const DEFAULT_FALLBACK_SPEED_KMH: f64 = 20.0;
/// Below this speed the vehicle counts as standing still.
pub const DEFAULT_MIN_SPEED_KMH: f64 = 3.0;

/// Decides who advances the tracker past a stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArrivalPolicy {
    /// Entering a stop's proximity radius counts as reaching it.
    #[default]
    Automatic,
    /// Only the driver's confirmation moves on to the next stop.
    Manual,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownPolicy(String);

impl fmt::Display for UnknownPolicy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "unknown arrival policy '{}'", self.0)
    }
}

impl FromStr for ArrivalPolicy {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "automatic" | "auto" => Ok(Self::Automatic),
            "manual" => Ok(Self::Manual),
            other => Err(UnknownPolicy(other.to_owned())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerConfig {
    pub proximity_threshold_m: f64,
    pub fallback_speed_kmh: f64,
    pub min_speed_kmh: f64,
    pub arrival_policy: ArrivalPolicy,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            proximity_threshold_m: DEFAULT_PROXIMITY_THRESHOLD_M,
            fallback_speed_kmh: DEFAULT_FALLBACK_SPEED_KMH,
            min_speed_kmh: DEFAULT_MIN_SPEED_KMH,
            arrival_policy: ArrivalPolicy::default(),
        }
    }
}

impl TrackerConfig {
    /// Reads `TRACKER_PROXIMITY_METERS`, `TRACKER_FALLBACK_SPEED_KMH`,
    /// `TRACKER_MIN_SPEED_KMH` and `TRACKER_ARRIVAL_POLICY`. Missing or invalid
    /// values keep their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            proximity_threshold_m: positive_or(
                &lookup,
                "TRACKER_PROXIMITY_METERS",
                defaults.proximity_threshold_m,
            ),
            fallback_speed_kmh: positive_or(
                &lookup,
                "TRACKER_FALLBACK_SPEED_KMH",
                defaults.fallback_speed_kmh,
            ),
            min_speed_kmh: positive_or(
                &lookup,
                "TRACKER_MIN_SPEED_KMH",
                defaults.min_speed_kmh,
            ),
            arrival_policy: parsed_or(
                &lookup,
                "TRACKER_ARRIVAL_POLICY",
                defaults.arrival_policy,
            ),
        }
    }

    pub fn with_arrival_policy(mut self, arrival_policy: ArrivalPolicy) -> Self {
        self.arrival_policy = arrival_policy;
        self
    }

    pub fn with_proximity_threshold(mut self, meters: f64) -> Self {
        self.proximity_threshold_m = meters;
        self
    }
}

fn parsed_or<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr + fmt::Debug,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw.parse().unwrap_or_else(|why| {
            log::warn!("ignoring {}='{}': {}, using {:?}", key, raw, why, default);
            default
        }),
        None => default,
    }
}

fn positive_or<F>(lookup: &F, key: &str, default: f64) -> f64
where
    F: Fn(&str) -> Option<String>,
{
    let value = parsed_or(lookup, key, default);
    if value.is_finite() && value > 0.0 {
        value
    } else {
        log::warn!("ignoring {}={}: must be positive, using {}", key, value, default);
        default
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_without_variables() {
        assert_eq!(TrackerConfig::from_lookup(lookup(&[])), TrackerConfig::default());
        let config = TrackerConfig::default();
        assert_eq!(config.proximity_threshold_m, 50.0);
        assert_eq!(config.fallback_speed_kmh, 20.0);
        assert_eq!(config.arrival_policy, ArrivalPolicy::Automatic);
    }

    #[test]
    fn reads_all_variables() {
        let config = TrackerConfig::from_lookup(lookup(&[
            ("TRACKER_PROXIMITY_METERS", "75"),
            ("TRACKER_FALLBACK_SPEED_KMH", "30.5"),
            ("TRACKER_MIN_SPEED_KMH", "1"),
            ("TRACKER_ARRIVAL_POLICY", "Manual"),
        ]));
        assert_eq!(config.proximity_threshold_m, 75.0);
        assert_eq!(config.fallback_speed_kmh, 30.5);
        assert_eq!(config.min_speed_kmh, 1.0);
        assert_eq!(config.arrival_policy, ArrivalPolicy::Manual);
    }

    #[test]
    fn invalid_values_keep_defaults() {
        let config = TrackerConfig::from_lookup(lookup(&[
            ("TRACKER_PROXIMITY_METERS", "near"),
            ("TRACKER_FALLBACK_SPEED_KMH", "-4"),
            ("TRACKER_MIN_SPEED_KMH", "NaN"),
            ("TRACKER_ARRIVAL_POLICY", "sometimes"),
        ]));
        assert_eq!(config, TrackerConfig::default());
    }
}
