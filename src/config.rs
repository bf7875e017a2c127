use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::model::{MINUTE_MS, Ms};

/// Engine behaviour knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// How long a guest has to confirm or decline an offered table.
    pub response_window_ms: Ms,
    /// Initial estimate per place in the queue.
    pub minutes_per_position: u32,
    /// Reject confirmations after `expires_at` and lapse stale offers.
    pub enforce_expiry: bool,
    /// Max entries ticked at once during a sweep.
    pub sweep_concurrency: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            response_window_ms: 15 * MINUTE_MS,
            minutes_per_position: 15,
            enforce_expiry: true,
            sweep_concurrency: 16,
        }
    }
}

/// Parameters of the random tick policy.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    /// Chance that a tick changes anything at all.
    pub change_probability: f64,
    /// Of the ticks that change something, the share that promote.
    pub promote_share: f64,
    pub max_position_step: u32,
    pub max_wait_step: u32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            change_probability: 0.3,
            promote_share: 0.5,
            max_position_step: 1,
            max_wait_step: 19,
        }
    }
}

/// Process configuration, read from `TABLEWAIT_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub metrics_port: Option<u16>,
    pub tick_interval: Duration,
    pub compact_threshold: u64,
    pub engine: EngineConfig,
    pub simulation: SimulationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            metrics_port: None,
            tick_interval: Duration::from_secs(30),
            compact_threshold: 1000,
            engine: EngineConfig::default(),
            simulation: SimulationConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unset or unparsable values fall
    /// back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let d = Config::default();
        let get = |key: &str| lookup(key);

        let response_window_mins: Ms = parse_or(get("TABLEWAIT_RESPONSE_WINDOW_MINS"), 15);
        let tick_secs: u64 = parse_or(get("TABLEWAIT_TICK_INTERVAL_SECS"), 30).max(1);

        Self {
            data_dir: get("TABLEWAIT_DATA_DIR").map(PathBuf::from).unwrap_or(d.data_dir),
            metrics_port: get("TABLEWAIT_METRICS_PORT").and_then(|s| s.parse().ok()),
            tick_interval: Duration::from_secs(tick_secs),
            compact_threshold: parse_or(get("TABLEWAIT_COMPACT_THRESHOLD"), d.compact_threshold),
            engine: EngineConfig {
                response_window_ms: response_window_mins.max(1) * MINUTE_MS,
                minutes_per_position: parse_or(
                    get("TABLEWAIT_MINUTES_PER_POSITION"),
                    d.engine.minutes_per_position,
                ),
                enforce_expiry: get("TABLEWAIT_ENFORCE_EXPIRY")
                    .and_then(|s| parse_bool(&s))
                    .unwrap_or(d.engine.enforce_expiry),
                sweep_concurrency: parse_or(
                    get("TABLEWAIT_SWEEP_CONCURRENCY"),
                    d.engine.sweep_concurrency,
                )
                .max(1),
            },
            simulation: SimulationConfig {
                change_probability: parse_probability(
                    get("TABLEWAIT_CHANGE_PROBABILITY"),
                    d.simulation.change_probability,
                ),
                promote_share: parse_probability(
                    get("TABLEWAIT_PROMOTE_SHARE"),
                    d.simulation.promote_share,
                ),
                ..d.simulation
            },
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("waitlist.wal")
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|s| s.trim().parse().ok()).unwrap_or(default)
}

/// Clamped to `0.0..=1.0`. NaN and infinities keep the default.
fn parse_probability(value: Option<String>, default: f64) -> f64 {
    value
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|p| p.is_finite())
        .map_or(default, |p| p.clamp(0.0, 1.0))
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> Config {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        assert_eq!(from_pairs(&[]), Config::default());
    }

    #[test]
    fn reads_overrides() {
        let c = from_pairs(&[
            ("TABLEWAIT_DATA_DIR", "/tmp/tw"),
            ("TABLEWAIT_TICK_INTERVAL_SECS", "5"),
            ("TABLEWAIT_RESPONSE_WINDOW_MINS", "10"),
            ("TABLEWAIT_ENFORCE_EXPIRY", "off"),
            ("TABLEWAIT_METRICS_PORT", "9100"),
            ("TABLEWAIT_CHANGE_PROBABILITY", "0.9"),
        ]);
        assert_eq!(c.data_dir, PathBuf::from("/tmp/tw"));
        assert_eq!(c.wal_path(), PathBuf::from("/tmp/tw/waitlist.wal"));
        assert_eq!(c.tick_interval, Duration::from_secs(5));
        assert_eq!(c.engine.response_window_ms, 10 * MINUTE_MS);
        assert!(!c.engine.enforce_expiry);
        assert_eq!(c.metrics_port, Some(9100));
        assert_eq!(c.simulation.change_probability, 0.9);
    }

    #[test]
    fn bad_values_fall_back_or_clamp() {
        let c = from_pairs(&[
            ("TABLEWAIT_TICK_INTERVAL_SECS", "soon"),
            ("TABLEWAIT_PROMOTE_SHARE", "4.2"),
            ("TABLEWAIT_SWEEP_CONCURRENCY", "0"),
            ("TABLEWAIT_ENFORCE_EXPIRY", "maybe"),
        ]);
        assert_eq!(c.tick_interval, Duration::from_secs(30));
        assert_eq!(c.simulation.promote_share, 1.0);
        assert_eq!(c.engine.sweep_concurrency, 1);
        assert!(c.engine.enforce_expiry);
    }

    #[test]
    fn non_finite_probabilities_keep_defaults() {
        let c = from_pairs(&[
            ("TABLEWAIT_CHANGE_PROBABILITY", "NaN"),
            ("TABLEWAIT_PROMOTE_SHARE", "inf"),
        ]);
        assert_eq!(c.simulation.change_probability, 0.3);
        assert_eq!(c.simulation.promote_share, 0.5);

        let c = from_pairs(&[("TABLEWAIT_CHANGE_PROBABILITY", "-infinity")]);
        assert_eq!(c.simulation.change_probability, 0.3);
    }
}
