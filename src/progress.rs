//! Route progress tracking and deviation detection.
//!
//! Owns the per-session answer to three questions: where on the route is
//! the traveler, how far along are they, and have they left it. Deviation
//! uses a two-tier threshold (50 m counts a miss, 200 m forces an
//! immediate reroute) with 3-hit hysteresis between them so GPS jitter
//! near intersections does not trigger false reroutes. Thresholds are
//! field-tuned and injected through [`ProgressConfig`].

use crate::config::ProgressConfig;
use crate::geodesy;
use crate::route::Route;
use crate::types::GeoPoint;
use geo::LineString;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Result of snapping a position onto the route.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct RouteLocation {
    /// Step owning the nearest point.
    pub step_index: usize,
    /// Nearest point on the route geometry.
    pub snapped: GeoPoint,
    /// Distance from the position to the route in meters.
    pub lateral_m: f64,
    /// Distance from the owning step's start to the snapped point.
    pub along_step_m: f64,
}

/// Distance accounting along the route.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct RouteProgress {
    pub completed_m: f64,
    pub remaining_m: f64,
    /// Completed share in [0, 100].
    pub percent: f64,
    pub step_index: usize,
    /// Remaining time at the travel mode's default speed.
    pub eta_secs: f64,
}

/// What the session should do about the traveler's current offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviationAction {
    /// On route, keep guiding.
    Continue,
    /// Off route but close enough that rejoining beats rerouting.
    GetBackOnTrack,
    /// Too far gone, request a new route.
    Recalculate,
}

/// Outcome of one deviation check.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct DeviationCheck {
    pub deviated: bool,
    pub lateral_m: f64,
    pub action: DeviationAction,
}

/// Outcome of one step-advancement check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepAdvance {
    /// Still traversing the current step.
    Stayed,
    /// Reached the current step's end, now on the step at this index.
    Advanced(usize),
    /// Reached the end of the last step. Arrival is the session
    /// controller's call, not this tracker's.
    RouteExhausted,
}

/// Per-session progress state.
///
/// The step index only moves forward, one step per evaluation; a reroute
/// replaces the route and resets the tracker instead of rewinding it.
pub struct RouteProgressTracker {
    config: ProgressConfig,
    step_index: usize,
    consecutive_misses: u32,
    last_on_route: Option<GeoPoint>,
}

impl RouteProgressTracker {
    pub fn new(config: ProgressConfig) -> Self {
        RouteProgressTracker {
            config,
            step_index: 0,
            consecutive_misses: 0,
            last_on_route: None,
        }
    }

    pub fn step_index(&self) -> usize {
        self.step_index
    }

    /// Last position that was within the deviation threshold.
    pub fn last_on_route(&self) -> Option<&GeoPoint> {
        self.last_on_route.as_ref()
    }

    /// Rewind to the first step of a fresh route.
    pub fn reset(&mut self) {
        self.step_index = 0;
        self.consecutive_misses = 0;
        self.last_on_route = None;
    }

    /// Snap a position to the nearest point on the route.
    ///
    /// Projects onto the dense polyline when the route carries one,
    /// mapping the hit back to its owning step by cumulative length;
    /// otherwise onto each step's start-end segment.
    pub fn locate(&self, point: &GeoPoint, route: &Route) -> RouteLocation {
        if let Some(line) = route.polyline.as_ref() {
            if let Some(location) = locate_on_polyline(point, route, line) {
                return location;
            }
        }

        let mut best = RouteLocation {
            step_index: 0,
            snapped: *point,
            lateral_m: f64::INFINITY,
            along_step_m: 0.0,
        };
        for step in &route.steps {
            let (snapped, lateral) = geodesy::project_onto_segment(point, &step.start, &step.end);
            if lateral < best.lateral_m {
                best = RouteLocation {
                    step_index: step.index,
                    snapped,
                    lateral_m: lateral,
                    along_step_m: geodesy::haversine_m(&step.start, &snapped),
                };
            }
        }
        best
    }

    /// Distance accounting relative to the tracker's current step.
    ///
    /// `completed + remaining` always equals the route total: remaining is
    /// derived by subtraction after capping, never measured separately.
    pub fn progress(&self, point: &GeoPoint, route: &Route) -> RouteProgress {
        let total = route.total_distance_m;

        let completed = if self.step_index >= route.steps.len() {
            total
        } else {
            let passed: f64 = route.steps[..self.step_index]
                .iter()
                .map(|s| s.length_m)
                .sum();
            let step = &route.steps[self.step_index];
            let (snapped, _) = geodesy::project_onto_segment(point, &step.start, &step.end);
            let along = geodesy::haversine_m(&step.start, &snapped).min(step.length_m);
            (passed + along).min(total)
        };

        let remaining = total - completed;
        let percent = if total > 0.0 {
            completed / total * 100.0
        } else {
            100.0
        };

        RouteProgress {
            completed_m: completed,
            remaining_m: remaining,
            percent,
            step_index: self.step_index,
            eta_secs: remaining / route.mode.default_speed_mps(),
        }
    }

    /// Three-tier deviation check.
    ///
    /// Beyond the reroute distance the verdict is immediate. In the band
    /// between the two thresholds, only the `hysteresis_hits`-th
    /// consecutive miss reports a deviation; whether to rejoin or reroute
    /// then depends on the estimated time to walk back. On-route samples
    /// reset the counter and refresh the last known good point.
    pub fn check_deviation(&mut self, point: &GeoPoint, route: &Route) -> DeviationCheck {
        let location = self.locate(point, route);
        let lateral = location.lateral_m;

        if lateral > self.config.reroute_distance_m {
            warn!("{lateral:.0} m off route, requesting immediate reroute");
            return DeviationCheck {
                deviated: true,
                lateral_m: lateral,
                action: DeviationAction::Recalculate,
            };
        }

        if lateral > self.config.deviation_distance_m {
            self.consecutive_misses += 1;
            if self.consecutive_misses >= self.config.hysteresis_hits {
                let walk_back_secs = lateral / route.mode.default_speed_mps();
                let action = if walk_back_secs <= self.config.walk_back_limit_secs {
                    DeviationAction::GetBackOnTrack
                } else {
                    DeviationAction::Recalculate
                };
                warn!(
                    "deviation confirmed after {} misses: {lateral:.0} m off, {walk_back_secs:.0} s back",
                    self.consecutive_misses
                );
                return DeviationCheck {
                    deviated: true,
                    lateral_m: lateral,
                    action,
                };
            }
            debug!(
                "off-route miss {}/{} at {lateral:.0} m",
                self.consecutive_misses, self.config.hysteresis_hits
            );
            return DeviationCheck {
                deviated: false,
                lateral_m: lateral,
                action: DeviationAction::Continue,
            };
        }

        self.consecutive_misses = 0;
        self.last_on_route = Some(location.snapped);
        DeviationCheck {
            deviated: false,
            lateral_m: lateral,
            action: DeviationAction::Continue,
        }
    }

    /// Advance past the current step when its end is within the arrival
    /// tolerance. Moves at most one step per call.
    pub fn advance_step(&mut self, point: &GeoPoint, route: &Route) -> StepAdvance {
        if self.step_index >= route.steps.len() {
            return StepAdvance::RouteExhausted;
        }

        let step = &route.steps[self.step_index];
        if geodesy::haversine_m(point, &step.end) > self.config.arrival_tolerance_m {
            return StepAdvance::Stayed;
        }

        self.step_index += 1;
        if self.step_index >= route.steps.len() {
            return StepAdvance::RouteExhausted;
        }
        debug!("advanced to step {}", self.step_index);
        StepAdvance::Advanced(self.step_index)
    }
}

/// Project onto the dense polyline and map the hit back to the owning
/// step by cumulative length. Falls back to segment projection when the
/// polyline is too short to hold a segment.
fn locate_on_polyline(
    point: &GeoPoint,
    route: &Route,
    line: &LineString<f64>,
) -> Option<RouteLocation> {
    let vertices: Vec<GeoPoint> = line
        .points()
        .map(|p| GeoPoint::new(p.y(), p.x(), point.timestamp))
        .collect();
    if vertices.len() < 2 {
        return None;
    }

    let mut best: Option<(GeoPoint, f64, f64)> = None;
    let mut cumulative = 0.0;
    for pair in vertices.windows(2) {
        let (snapped, lateral) = geodesy::project_onto_segment(point, &pair[0], &pair[1]);
        if best.map_or(true, |(_, b, _)| lateral < b) {
            let along_route = cumulative + geodesy::haversine_m(&pair[0], &snapped);
            best = Some((snapped, lateral, along_route));
        }
        cumulative += geodesy::haversine_m(&pair[0], &pair[1]);
    }
    let (snapped, lateral_m, along_route) = best?;

    let mut step_start = 0.0;
    for step in &route.steps {
        let step_end = step_start + step.length_m;
        if along_route <= step_end || step.index == route.steps.len() - 1 {
            return Some(RouteLocation {
                step_index: step.index,
                snapped,
                lateral_m,
                along_step_m: (along_route - step_start).clamp(0.0, step.length_m),
            });
        }
        step_start = step_end;
    }
    None
}
