//! Raw fix stream conditioning.
//!
//! Turns noisy platform fixes into smoothed, quality-annotated positions:
//! garbage fixes are refused, teleport jumps are discarded against the
//! last known good point, and accepted coordinates run through an
//! independent scalar Kalman filter per axis. History is a bounded ring
//! owned by the enclosing session and reset with it.

use crate::config::FilterConfig;
use crate::error::{NavError, Result};
use crate::geodesy;
use crate::types::{GeoPoint, SignalQuality};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One-dimensional Kalman filter over a single coordinate axis.
///
/// The classic scalar recurrence: predict inflates the error covariance
/// by the process noise, the gain weighs it against the measurement
/// noise, and the estimate moves gain-fraction of the way to the raw
/// measurement.
#[derive(Clone, Debug)]
struct ScalarKalman {
    estimate: f64,
    error: f64,
    process_noise: f64,
    measurement_noise: f64,
}

impl ScalarKalman {
    fn new(initial: f64, config: &FilterConfig) -> Self {
        ScalarKalman {
            estimate: initial,
            error: config.initial_error,
            process_noise: config.process_noise,
            measurement_noise: config.measurement_noise,
        }
    }

    fn update(&mut self, raw: f64) -> f64 {
        let predicted_error = self.error + self.process_noise;
        let gain = predicted_error / (predicted_error + self.measurement_noise);
        self.estimate += gain * (raw - self.estimate);
        self.error = (1.0 - gain) * predicted_error;
        self.estimate
    }
}

/// Output of one filter step.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct FilteredFix {
    /// Smoothed position; the last known good point when the raw fix was
    /// discarded as a jump.
    pub point: GeoPoint,
    pub quality: SignalQuality,
    /// The raw fix implied an impossible speed and was thrown away.
    pub jump_rejected: bool,
}

/// Per-session location filter.
pub struct LocationFilter {
    config: FilterConfig,
    lat_axis: Option<ScalarKalman>,
    lon_axis: Option<ScalarKalman>,
    history: VecDeque<GeoPoint>,
    last_accepted: Option<GeoPoint>,
}

impl LocationFilter {
    pub fn new(config: FilterConfig) -> Self {
        let capacity = config.history_capacity;
        LocationFilter {
            config,
            lat_axis: None,
            lon_axis: None,
            history: VecDeque::with_capacity(capacity),
            last_accepted: None,
        }
    }

    /// Condition one raw fix.
    ///
    /// Order matters: validity, gap reset, jump rejection, bootstrap,
    /// smoothing. Only latitude/longitude are smoothed; accuracy, speed,
    /// heading and timestamp pass through from the raw fix.
    pub fn ingest(&mut self, raw: GeoPoint) -> Result<FilteredFix> {
        if !raw.is_valid() {
            return Err(NavError::SensorDataInvalid(format!(
                "fix ({}, {}) at t={}",
                raw.latitude, raw.longitude, raw.timestamp
            )));
        }

        // A long silence means the traveler may have legitimately moved;
        // restart from scratch instead of rejecting the next fix as a jump.
        if let Some(prev) = self.last_accepted {
            let gap = raw.timestamp - prev.timestamp;
            if gap > self.config.reset_gap_secs {
                debug!("filter reset after {gap:.0}s fix gap");
                self.reset();
            }
        }

        if let Some(prev) = self.last_accepted {
            let dt = (raw.timestamp - prev.timestamp).max(1e-3);
            let implied_mps = geodesy::haversine_m(&prev, &raw) / dt;
            let limit_mps = self.config.max_jump_speed_kmh / 3.6;
            if implied_mps > limit_mps {
                warn!(
                    "jump rejected: {:.0} m/s implied ({:.0} m/s limit)",
                    implied_mps, limit_mps
                );
                return Ok(FilteredFix {
                    point: prev,
                    quality: SignalQuality::from_accuracy(prev.accuracy),
                    jump_rejected: true,
                });
            }
        }

        let quality = SignalQuality::from_accuracy(raw.accuracy);

        if self.history.len() < self.config.bootstrap_samples {
            // Still seeding: pass the raw fix through and restart the
            // axis estimates at it so smoothing begins from fresh state.
            self.lat_axis = Some(ScalarKalman::new(raw.latitude, &self.config));
            self.lon_axis = Some(ScalarKalman::new(raw.longitude, &self.config));
            self.remember(raw);
            return Ok(FilteredFix {
                point: raw,
                quality,
                jump_rejected: false,
            });
        }

        let lat = self
            .lat_axis
            .get_or_insert_with(|| ScalarKalman::new(raw.latitude, &self.config))
            .update(raw.latitude);
        let lon = self
            .lon_axis
            .get_or_insert_with(|| ScalarKalman::new(raw.longitude, &self.config))
            .update(raw.longitude);

        let smoothed = GeoPoint {
            latitude: lat,
            longitude: lon,
            ..raw
        };
        self.remember(smoothed);

        Ok(FilteredFix {
            point: smoothed,
            quality,
            jump_rejected: false,
        })
    }

    /// Drop all history and axis state; error covariance restarts at its
    /// configured initial value on the next fix.
    pub fn reset(&mut self) {
        self.history.clear();
        self.lat_axis = None;
        self.lon_axis = None;
        self.last_accepted = None;
    }

    /// Last point the filter accepted (smoothed), if any.
    pub fn last_accepted(&self) -> Option<&GeoPoint> {
        self.last_accepted.as_ref()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    fn remember(&mut self, point: GeoPoint) {
        self.history.push_back(point);
        while self.history.len() > self.config.history_capacity {
            self.history.pop_front();
        }
        self.last_accepted = Some(point);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geodesy::destination_point;

    fn fix(lat: f64, lon: f64, t: f64) -> GeoPoint {
        GeoPoint::new(lat, lon, t).with_accuracy(8.0)
    }

    fn filter() -> LocationFilter {
        LocationFilter::new(FilterConfig::default())
    }

    #[test]
    fn test_bootstrap_passes_raw_through() {
        let mut f = filter();
        for i in 0..3 {
            let raw = fix(37.7749 + i as f64 * 1e-5, -122.4194, i as f64);
            let out = f.ingest(raw).unwrap();
            assert_eq!(out.point.latitude, raw.latitude, "sample {i} must be unsmoothed");
            assert_eq!(out.point.longitude, raw.longitude);
            assert!(!out.jump_rejected);
        }
    }

    #[test]
    fn test_smoothed_lies_between_estimate_and_raw() {
        // Noise pairs spanning low to high gain; the estimate must sit
        // strictly between the previous estimate and the raw fix for all
        // of them
        let configs = [(0.125, 1.0), (0.01, 4.0), (1.0, 0.05), (0.5, 0.5)];
        for (process_noise, measurement_noise) in configs {
            let mut f = LocationFilter::new(FilterConfig {
                process_noise,
                measurement_noise,
                ..FilterConfig::default()
            });
            for i in 0..3 {
                f.ingest(fix(37.7749, -122.4194, i as f64)).unwrap();
            }
            let prev = f.last_accepted().unwrap().latitude;
            let raw = fix(37.7759, -122.4194, 3.0); // ~111 m north
            let out = f.ingest(raw).unwrap();

            assert!(
                out.point.latitude > prev && out.point.latitude < raw.latitude,
                "q={process_noise} r={measurement_noise}: estimate {} not between {prev} and {}",
                out.point.latitude,
                raw.latitude
            );
        }
    }

    #[test]
    fn test_jump_is_rejected_and_state_retained() {
        let mut f = filter();
        let good = fix(37.7749, -122.4194, 0.0);
        f.ingest(good).unwrap();

        // ~1.1 km in one second, far over 200 km/h
        let jump = fix(37.7849, -122.4194, 1.0);
        let out = f.ingest(jump).unwrap();
        assert!(out.jump_rejected);
        assert_eq!(out.point.latitude, good.latitude);
        assert_eq!(f.history_len(), 1, "rejected fix must not enter history");

        // A sane follow-up keeps flowing
        let next = fix(37.77495, -122.4194, 2.0);
        assert!(!f.ingest(next).unwrap().jump_rejected);
    }

    #[test]
    fn test_fixes_within_speed_bound_never_rejected() {
        // ~100 km/h: 55 m hops every 2 s, well under the 200 km/h bound
        let mut f = filter();
        let mut p = fix(37.7749, -122.4194, 0.0);
        for i in 0..20 {
            let out = f.ingest(p).unwrap();
            assert!(!out.jump_rejected, "fix {i} wrongly rejected");
            p = destination_point(&p, 0.0, 55.0);
            p.timestamp = (i + 1) as f64 * 2.0;
            p.accuracy = Some(8.0);
        }
    }

    #[test]
    fn test_invalid_fix_is_error_and_ignored() {
        let mut f = filter();
        f.ingest(fix(37.7749, -122.4194, 0.0)).unwrap();
        let before = f.history_len();

        let garbage = GeoPoint::new(f64::NAN, -122.4194, 1.0);
        assert!(matches!(
            f.ingest(garbage),
            Err(NavError::SensorDataInvalid(_))
        ));
        assert_eq!(f.history_len(), before);
    }

    #[test]
    fn test_long_gap_resets_filter() {
        let mut f = filter();
        for i in 0..5 {
            f.ingest(fix(37.7749, -122.4194, i as f64)).unwrap();
        }
        assert!(f.history_len() >= 3);

        // 60 s of silence, then a fix 10 km away: a fresh bootstrap, not a jump
        let far = fix(37.8649, -122.4194, 64.0);
        let out = f.ingest(far).unwrap();
        assert!(!out.jump_rejected);
        assert_eq!(out.point.latitude, far.latitude, "post-reset fix passes raw");
        assert_eq!(f.history_len(), 1);
    }

    #[test]
    fn test_history_is_bounded() {
        let config = FilterConfig {
            history_capacity: 10,
            ..FilterConfig::default()
        };
        let mut f = LocationFilter::new(config);
        let mut p = fix(37.7749, -122.4194, 0.0);
        for i in 0..25 {
            f.ingest(p).unwrap();
            p = destination_point(&p, 0.0, 10.0);
            p.timestamp = (i + 1) as f64;
            p.accuracy = Some(8.0);
        }
        assert_eq!(f.history_len(), 10);
    }

    #[test]
    fn test_quality_carried_from_accuracy() {
        let mut f = filter();
        let out = f
            .ingest(GeoPoint::new(37.7749, -122.4194, 0.0).with_accuracy(4.0))
            .unwrap();
        assert_eq!(out.quality, SignalQuality::Excellent);

        let out = f.ingest(GeoPoint::new(37.7749, -122.4194, 1.0)).unwrap();
        assert_eq!(out.quality, SignalQuality::Poor, "missing accuracy is poor");
    }

    #[test]
    fn test_reset_clears_state() {
        let mut f = filter();
        for i in 0..5 {
            f.ingest(fix(37.7749, -122.4194, i as f64)).unwrap();
        }
        f.reset();
        assert_eq!(f.history_len(), 0);
        assert!(f.last_accepted().is_none());
    }
}
