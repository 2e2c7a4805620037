use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A single positioning fix in WGS84 degrees.
///
/// Optional fields stay `None` when the platform location API did not
/// report them. Timestamps are f64 epoch seconds, matching the raw
/// sensor stream.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
    /// Altitude above the WGS84 ellipsoid in meters.
    pub altitude: Option<f64>,
    /// Horizontal accuracy radius in meters.
    pub accuracy: Option<f64>,
    /// Ground speed in m/s.
    pub speed: Option<f64>,
    /// Course over ground in degrees [0, 360).
    pub heading: Option<f64>,
    pub timestamp: f64,
}

impl GeoPoint {
    /// Bare fix with only coordinates and a timestamp.
    pub fn new(latitude: f64, longitude: f64, timestamp: f64) -> Self {
        GeoPoint {
            latitude,
            longitude,
            altitude: None,
            accuracy: None,
            speed: None,
            heading: None,
            timestamp,
        }
    }

    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = Some(accuracy);
        self
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed);
        self
    }

    pub fn with_heading(mut self, heading: f64) -> Self {
        self.heading = Some(heading);
        self
    }

    /// Whether the coordinates are finite and inside WGS84 bounds.
    ///
    /// Garbage fixes (NaN from a flaky sensor bridge, swapped fields
    /// producing |lat| > 90) are dropped at ingest rather than smoothed.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.timestamp.is_finite()
            && self.latitude.abs() <= 90.0
            && self.longitude.abs() <= 180.0
    }
}

/// GPS signal quality bucket, derived from the accuracy radius alone.
///
/// Recomputed for every fix, never persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalQuality {
    Poor,
    Fair,
    Good,
    Excellent,
}

impl SignalQuality {
    /// Classify an accuracy radius in meters. Missing accuracy is Poor.
    pub fn from_accuracy(accuracy: Option<f64>) -> Self {
        match accuracy {
            Some(radius) if radius <= 5.0 => SignalQuality::Excellent,
            Some(radius) if radius <= 10.0 => SignalQuality::Good,
            Some(radius) if radius <= 20.0 => SignalQuality::Fair,
            _ => SignalQuality::Poor,
        }
    }
}

/// How the traveler moves along the route.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TravelMode {
    Walking,
    Cycling,
    Driving,
}

impl TravelMode {
    /// Typical ground speed in m/s, used for ETA and walk-back estimates.
    pub fn default_speed_mps(&self) -> f64 {
        match self {
            TravelMode::Walking => 1.4,  // brisk pedestrian
            TravelMode::Cycling => 4.2,  // ~15 km/h urban
            TravelMode::Driving => 13.9, // ~50 km/h city traffic
        }
    }
}

impl fmt::Display for TravelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TravelMode::Walking => write!(f, "walking"),
            TravelMode::Cycling => write!(f, "cycling"),
            TravelMode::Driving => write!(f, "driving"),
        }
    }
}

impl FromStr for TravelMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "walking" | "walk" | "foot" => Ok(TravelMode::Walking),
            "cycling" | "bike" | "bicycle" => Ok(TravelMode::Cycling),
            "driving" | "drive" | "car" => Ok(TravelMode::Driving),
            other => Err(format!("unknown travel mode: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_buckets() {
        assert_eq!(SignalQuality::from_accuracy(Some(3.0)), SignalQuality::Excellent);
        assert_eq!(SignalQuality::from_accuracy(Some(5.0)), SignalQuality::Excellent);
        assert_eq!(SignalQuality::from_accuracy(Some(7.5)), SignalQuality::Good);
        assert_eq!(SignalQuality::from_accuracy(Some(15.0)), SignalQuality::Fair);
        assert_eq!(SignalQuality::from_accuracy(Some(48.0)), SignalQuality::Poor);
    }

    #[test]
    fn test_quality_missing_accuracy_is_poor() {
        assert_eq!(SignalQuality::from_accuracy(None), SignalQuality::Poor);
    }

    #[test]
    fn test_quality_ordering() {
        assert!(SignalQuality::Poor < SignalQuality::Fair);
        assert!(SignalQuality::Good < SignalQuality::Excellent);
    }

    #[test]
    fn test_point_validity() {
        assert!(GeoPoint::new(37.7749, -122.4194, 0.0).is_valid());
        assert!(!GeoPoint::new(f64::NAN, -122.4194, 0.0).is_valid());
        assert!(!GeoPoint::new(91.0, 0.0, 0.0).is_valid());
        assert!(!GeoPoint::new(0.0, 181.0, 0.0).is_valid());
    }

    #[test]
    fn test_travel_mode_parsing() {
        assert_eq!("walking".parse::<TravelMode>().unwrap(), TravelMode::Walking);
        assert_eq!("BIKE".parse::<TravelMode>().unwrap(), TravelMode::Cycling);
        assert_eq!("car".parse::<TravelMode>().unwrap(), TravelMode::Driving);
        assert!("teleport".parse::<TravelMode>().is_err());
    }
}
