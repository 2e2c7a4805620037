//! Engine tunables.
//!
//! Every empirical constant — filter noise, deviation thresholds, the
//! 2-minute walk-back window — is injected through these structs rather
//! than baked into a module. Defaults reproduce field-tuned behavior;
//! the structs deserialize from config files with per-field fallbacks.

use serde::Deserialize;

/// Bundle handed to the navigator at construction.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct NavConfig {
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub progress: ProgressConfig,
    #[serde(default)]
    pub instruction: InstructionConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

/// Location filter tuning.
#[derive(Clone, Debug, Deserialize)]
pub struct FilterConfig {
    /// Per-axis Kalman process noise (default: 0.125)
    #[serde(default = "default_process_noise")]
    pub process_noise: f64,

    /// Per-axis Kalman measurement noise (default: 1.0)
    #[serde(default = "default_measurement_noise")]
    pub measurement_noise: f64,

    /// Initial per-axis error covariance (default: 1.0)
    #[serde(default = "default_initial_error")]
    pub initial_error: f64,

    /// Fix history ring capacity, oldest evicted (default: 15)
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Samples passed through unsmoothed while the filter seeds (default: 3)
    #[serde(default = "default_bootstrap_samples")]
    pub bootstrap_samples: usize,

    /// Implied speed above which a fix is discarded as a jump (default: 200 km/h)
    #[serde(default = "default_max_jump_speed_kmh")]
    pub max_jump_speed_kmh: f64,

    /// Silence between fixes that resets the filter (default: 30 s)
    #[serde(default = "default_reset_gap_secs")]
    pub reset_gap_secs: f64,
}

/// Route progress and deviation tuning.
#[derive(Clone, Debug, Deserialize)]
pub struct ProgressConfig {
    /// Lateral distance that counts one deviation miss (default: 50 m)
    #[serde(default = "default_deviation_distance_m")]
    pub deviation_distance_m: f64,

    /// Lateral distance that forces an immediate reroute, no hysteresis
    /// (default: 200 m)
    #[serde(default = "default_reroute_distance_m")]
    pub reroute_distance_m: f64,

    /// Consecutive misses before a deviation is reported (default: 3)
    #[serde(default = "default_hysteresis_hits")]
    pub hysteresis_hits: u32,

    /// Walk-back time under which rejoining beats rerouting (default: 120 s)
    #[serde(default = "default_walk_back_limit_secs")]
    pub walk_back_limit_secs: f64,

    /// Radius that counts as reaching a step end or the destination
    /// (default: 15 m)
    #[serde(default = "default_arrival_tolerance_m")]
    pub arrival_tolerance_m: f64,
}

/// Guidance phrasing and announcement tuning.
#[derive(Clone, Debug, Deserialize)]
pub struct InstructionConfig {
    /// Below this the distance text becomes the immediate-turn phrase
    /// (default: 50 m)
    #[serde(default = "default_immediate_distance_m")]
    pub immediate_distance_m: f64,

    /// Timing class boundary between Near and Normal (default: 200 m)
    #[serde(default = "default_near_distance_m")]
    pub near_distance_m: f64,

    /// Crossing below this re-announces even without a maneuver change
    /// (default: 30 m)
    #[serde(default = "default_announce_threshold_m")]
    pub announce_threshold_m: f64,
}

/// Session lifecycle tuning.
#[derive(Clone, Debug, Deserialize)]
pub struct SessionConfig {
    /// Periodic re-evaluation interval (default: 2 s)
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: f64,

    /// Recalculation attempts before the session fails (default: 3)
    #[serde(default = "default_max_recalc_attempts")]
    pub max_recalc_attempts: u32,

    /// Raw fix channel depth; producers drop on overflow (default: 64)
    #[serde(default = "default_fix_channel_capacity")]
    pub fix_channel_capacity: usize,

    /// Event fan-out channel depth per subscriber (default: 64)
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Gap allowed between consecutive step endpoints before a route is
    /// rejected as malformed (default: 25 m)
    #[serde(default = "default_contiguity_tolerance_m")]
    pub contiguity_tolerance_m: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            process_noise: default_process_noise(),
            measurement_noise: default_measurement_noise(),
            initial_error: default_initial_error(),
            history_capacity: default_history_capacity(),
            bootstrap_samples: default_bootstrap_samples(),
            max_jump_speed_kmh: default_max_jump_speed_kmh(),
            reset_gap_secs: default_reset_gap_secs(),
        }
    }
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            deviation_distance_m: default_deviation_distance_m(),
            reroute_distance_m: default_reroute_distance_m(),
            hysteresis_hits: default_hysteresis_hits(),
            walk_back_limit_secs: default_walk_back_limit_secs(),
            arrival_tolerance_m: default_arrival_tolerance_m(),
        }
    }
}

impl Default for InstructionConfig {
    fn default() -> Self {
        Self {
            immediate_distance_m: default_immediate_distance_m(),
            near_distance_m: default_near_distance_m(),
            announce_threshold_m: default_announce_threshold_m(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval_secs(),
            max_recalc_attempts: default_max_recalc_attempts(),
            fix_channel_capacity: default_fix_channel_capacity(),
            event_channel_capacity: default_event_channel_capacity(),
            contiguity_tolerance_m: default_contiguity_tolerance_m(),
        }
    }
}

// Default value functions
fn default_process_noise() -> f64 {
    0.125
}
fn default_measurement_noise() -> f64 {
    1.0
}
fn default_initial_error() -> f64 {
    1.0
}
fn default_history_capacity() -> usize {
    15
}
fn default_bootstrap_samples() -> usize {
    3
}
fn default_max_jump_speed_kmh() -> f64 {
    200.0
}
fn default_reset_gap_secs() -> f64 {
    30.0
}
fn default_deviation_distance_m() -> f64 {
    50.0
}
fn default_reroute_distance_m() -> f64 {
    200.0
}
fn default_hysteresis_hits() -> u32 {
    3
}
fn default_walk_back_limit_secs() -> f64 {
    120.0
}
fn default_arrival_tolerance_m() -> f64 {
    15.0
}
fn default_immediate_distance_m() -> f64 {
    50.0
}
fn default_near_distance_m() -> f64 {
    200.0
}
fn default_announce_threshold_m() -> f64 {
    30.0
}
fn default_tick_interval_secs() -> f64 {
    2.0
}
fn default_max_recalc_attempts() -> u32 {
    3
}
fn default_fix_channel_capacity() -> usize {
    64
}
fn default_event_channel_capacity() -> usize {
    64
}
fn default_contiguity_tolerance_m() -> f64 {
    25.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_field_tuning() {
        let config = NavConfig::default();
        assert_eq!(config.progress.deviation_distance_m, 50.0);
        assert_eq!(config.progress.reroute_distance_m, 200.0);
        assert_eq!(config.progress.hysteresis_hits, 3);
        assert_eq!(config.progress.walk_back_limit_secs, 120.0);
        assert_eq!(config.filter.max_jump_speed_kmh, 200.0);
    }

    #[test]
    fn test_partial_deserialization_fills_defaults() {
        let json = r#"{ "progress": { "deviation_distance_m": 35.0 } }"#;
        let config: NavConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.progress.deviation_distance_m, 35.0);
        assert_eq!(config.progress.reroute_distance_m, 200.0);
        assert_eq!(config.session.max_recalc_attempts, 3);
    }
}
