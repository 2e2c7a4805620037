//! Route model: steps, maneuvers and structural validation.
//!
//! Routes arrive from an external routing collaborator; this module only
//! holds their shape and checks it before a session is allowed to track
//! against it.

use crate::error::{NavError, Result};
use crate::geodesy;
use crate::types::{GeoPoint, TravelMode};
use geo::LineString;
use serde::{Deserialize, Serialize};

/// Directional action a route step requires.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ManeuverType {
    Depart,
    Straight,
    SlightLeft,
    SlightRight,
    TurnLeft,
    TurnRight,
    SharpLeft,
    SharpRight,
    UTurn,
    RoundaboutEnter,
    RoundaboutExit,
    Arrive,
}

impl ManeuverType {
    /// Icon tag the presentation layer maps to an arrow glyph.
    pub fn icon_tag(&self) -> &'static str {
        match self {
            ManeuverType::Depart => "depart",
            ManeuverType::Straight => "straight",
            ManeuverType::SlightLeft => "slight-left",
            ManeuverType::SlightRight => "slight-right",
            ManeuverType::TurnLeft => "turn-left",
            ManeuverType::TurnRight => "turn-right",
            ManeuverType::SharpLeft => "sharp-left",
            ManeuverType::SharpRight => "sharp-right",
            ManeuverType::UTurn => "u-turn",
            ManeuverType::RoundaboutEnter => "roundabout-enter",
            ManeuverType::RoundaboutExit => "roundabout-exit",
            ManeuverType::Arrive => "arrive",
        }
    }

    /// Classify a bearing change in degrees into a maneuver.
    ///
    /// Positive angles turn right, negative left; input is normalized to
    /// [-180, 180] first. Used when deriving steps from a bare polyline.
    pub fn from_bearing_change(delta_deg: f64) -> Self {
        let mut angle = delta_deg % 360.0;
        if angle > 180.0 {
            angle -= 360.0;
        } else if angle < -180.0 {
            angle += 360.0;
        }

        let abs = angle.abs();
        if abs > 170.0 {
            ManeuverType::UTurn
        } else if abs > 120.0 {
            if angle > 0.0 { ManeuverType::SharpRight } else { ManeuverType::SharpLeft }
        } else if abs > 60.0 {
            if angle > 0.0 { ManeuverType::TurnRight } else { ManeuverType::TurnLeft }
        } else if abs > 20.0 {
            if angle > 0.0 { ManeuverType::SlightRight } else { ManeuverType::SlightLeft }
        } else {
            ManeuverType::Straight
        }
    }
}

/// One leg of a route, bounded by two maneuver points.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RouteStep {
    /// 0-based position within the route.
    pub index: usize,
    pub start: GeoPoint,
    pub end: GeoPoint,
    pub maneuver: ManeuverType,
    pub length_m: f64,
    /// Road or place name, spliced into generated phrases when present.
    pub name: Option<String>,
    /// Provider-supplied instruction text; wins over the generated phrase.
    pub instruction: Option<String>,
    /// Estimated traversal time in seconds.
    pub duration_secs: f64,
}

impl RouteStep {
    /// Build a step, deriving length from the endpoints and duration from
    /// the travel mode.
    pub fn new(
        index: usize,
        start: GeoPoint,
        end: GeoPoint,
        maneuver: ManeuverType,
        mode: TravelMode,
    ) -> Self {
        let length_m = geodesy::haversine_m(&start, &end);
        RouteStep {
            index,
            start,
            end,
            maneuver,
            length_m,
            name: None,
            instruction: None,
            duration_secs: length_m / mode.default_speed_mps(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_instruction(mut self, text: impl Into<String>) -> Self {
        self.instruction = Some(text.into());
        self
    }
}

/// A precomputed route the engine tracks progress against.
///
/// The optional dense polyline refines projection between maneuver points
/// on curvy legs; when absent, tracking projects onto the straight
/// start-end segments of the steps.
#[derive(Clone, Debug)]
pub struct Route {
    pub steps: Vec<RouteStep>,
    pub total_distance_m: f64,
    pub total_duration_secs: f64,
    pub mode: TravelMode,
    pub polyline: Option<LineString<f64>>,
}

impl Route {
    /// Assemble a route from steps, computing the aggregates.
    ///
    /// Construction never fails; structural checks live in [`validate`]
    /// and run at session start.
    ///
    /// [`validate`]: Route::validate
    pub fn new(steps: Vec<RouteStep>, mode: TravelMode) -> Self {
        let total_distance_m = steps.iter().map(|s| s.length_m).sum();
        let total_duration_secs = steps.iter().map(|s| s.duration_secs).sum();
        Route {
            steps,
            total_distance_m,
            total_duration_secs,
            mode,
            polyline: None,
        }
    }

    /// Attach a dense polyline (lon/lat coordinate order, geo convention).
    pub fn with_polyline(mut self, polyline: LineString<f64>) -> Self {
        self.polyline = Some(polyline);
        self
    }

    /// Final destination: the last step's end point.
    pub fn destination(&self) -> Option<GeoPoint> {
        self.steps.last().map(|s| s.end)
    }

    /// Structural validation run before a session may track this route.
    ///
    /// Rejects empty or zero-length routes, non-contiguous step indices,
    /// and gaps between consecutive step endpoints larger than
    /// `contiguity_tolerance_m`.
    pub fn validate(&self, contiguity_tolerance_m: f64) -> Result<()> {
        if self.steps.is_empty() {
            return Err(NavError::RouteMalformed("route has no steps".into()));
        }
        if self.total_distance_m <= 0.0 {
            return Err(NavError::RouteMalformed("route has zero length".into()));
        }

        for (i, step) in self.steps.iter().enumerate() {
            if step.index != i {
                return Err(NavError::RouteMalformed(format!(
                    "step index {} at position {i}",
                    step.index
                )));
            }
            if !step.length_m.is_finite() || step.length_m < 0.0 {
                return Err(NavError::RouteMalformed(format!(
                    "step {i} has invalid length {}",
                    step.length_m
                )));
            }
        }

        for pair in self.steps.windows(2) {
            let gap = geodesy::haversine_m(&pair[0].end, &pair[1].start);
            if gap > contiguity_tolerance_m {
                return Err(NavError::RouteMalformed(format!(
                    "steps {} and {} are {gap:.0} m apart",
                    pair[0].index, pair[1].index
                )));
            }
        }

        Ok(())
    }
}

/// Two-leg walking route shared by tests across the crate: 500 m due
/// north from downtown San Francisco, then 300 m due east.
#[cfg(test)]
pub(crate) fn l_shaped_route() -> Route {
    let a = GeoPoint::new(37.7749, -122.4194, 0.0);
    let b = geodesy::destination_point(&a, 0.0, 500.0);
    let c = geodesy::destination_point(&b, 90.0, 300.0);
    Route::new(
        vec![
            RouteStep::new(0, a, b, ManeuverType::Straight, TravelMode::Walking),
            RouteStep::new(1, b, c, ManeuverType::TurnRight, TravelMode::Walking),
        ],
        TravelMode::Walking,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geodesy::destination_point;

    fn pt(lat: f64, lon: f64) -> GeoPoint {
        GeoPoint::new(lat, lon, 0.0)
    }

    #[test]
    fn test_aggregates_sum_steps() {
        let route = l_shaped_route();
        assert!((route.total_distance_m - 800.0).abs() < 1.0);
        let expected_secs = route.total_distance_m / TravelMode::Walking.default_speed_mps();
        assert!((route.total_duration_secs - expected_secs).abs() < 1.0);
    }

    #[test]
    fn test_validate_accepts_contiguous_route() {
        assert!(l_shaped_route().validate(25.0).is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_route() {
        let route = Route::new(Vec::new(), TravelMode::Walking);
        assert!(matches!(
            route.validate(25.0),
            Err(NavError::RouteMalformed(_))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_length_route() {
        let a = pt(37.7749, -122.4194);
        let route = Route::new(
            vec![RouteStep::new(0, a, a, ManeuverType::Arrive, TravelMode::Walking)],
            TravelMode::Walking,
        );
        assert!(matches!(
            route.validate(25.0),
            Err(NavError::RouteMalformed(_))
        ));
    }

    #[test]
    fn test_validate_rejects_gap_between_steps() {
        let a = pt(37.7749, -122.4194);
        let b = destination_point(&a, 0.0, 500.0);
        // Second step starts 100 m east of where the first ended
        let detached = destination_point(&b, 90.0, 100.0);
        let c = destination_point(&detached, 90.0, 300.0);
        let route = Route::new(
            vec![
                RouteStep::new(0, a, b, ManeuverType::Straight, TravelMode::Walking),
                RouteStep::new(1, detached, c, ManeuverType::TurnRight, TravelMode::Walking),
            ],
            TravelMode::Walking,
        );
        assert!(matches!(
            route.validate(25.0),
            Err(NavError::RouteMalformed(_))
        ));
    }

    #[test]
    fn test_validate_rejects_shuffled_indices() {
        let a = pt(37.7749, -122.4194);
        let b = destination_point(&a, 0.0, 500.0);
        let mut step = RouteStep::new(0, a, b, ManeuverType::Straight, TravelMode::Walking);
        step.index = 3;
        let route = Route::new(vec![step], TravelMode::Walking);
        assert!(matches!(
            route.validate(25.0),
            Err(NavError::RouteMalformed(_))
        ));
    }

    #[test]
    fn test_bearing_change_classification() {
        assert_eq!(ManeuverType::from_bearing_change(5.0), ManeuverType::Straight);
        assert_eq!(ManeuverType::from_bearing_change(-12.0), ManeuverType::Straight);
        assert_eq!(ManeuverType::from_bearing_change(35.0), ManeuverType::SlightRight);
        assert_eq!(ManeuverType::from_bearing_change(-35.0), ManeuverType::SlightLeft);
        assert_eq!(ManeuverType::from_bearing_change(90.0), ManeuverType::TurnRight);
        assert_eq!(ManeuverType::from_bearing_change(-90.0), ManeuverType::TurnLeft);
        assert_eq!(ManeuverType::from_bearing_change(150.0), ManeuverType::SharpRight);
        assert_eq!(ManeuverType::from_bearing_change(178.0), ManeuverType::UTurn);
        assert_eq!(ManeuverType::from_bearing_change(-175.0), ManeuverType::UTurn);
    }

    #[test]
    fn test_bearing_change_wraps() {
        // 350° measured the long way round is a 10° left drift
        assert_eq!(ManeuverType::from_bearing_change(350.0), ManeuverType::Straight);
    }

    #[test]
    fn test_destination_is_last_step_end() {
        let route = l_shaped_route();
        let dest = route.destination().unwrap();
        assert_eq!(dest, route.steps[1].end);
        assert!(Route::new(Vec::new(), TravelMode::Walking).destination().is_none());
    }
}
