//! Per-session navigation state machine.
//!
//! [`NavigationSession`] owns everything one trip needs: the route, the
//! location filter, the progress tracker and the announcement memory. It
//! is deliberately free of I/O and timers; every input arrives through a
//! method call and every reaction comes back as a [`SessionOutput`] of
//! events to broadcast plus an optional recalculation request. The async
//! shell in [`crate::navigator`] wires those to channels and tasks.

use crate::config::NavConfig;
use crate::error::{NavError, Result};
use crate::events::{DeviationEvent, EndReason, NavEvent, SessionSummary};
use crate::filter::LocationFilter;
use crate::geodesy;
use crate::instruction::{InstructionGenerator, NavigationInstruction};
use crate::progress::{DeviationAction, RouteProgress, RouteProgressTracker, StepAdvance};
use crate::route::Route;
use crate::types::{GeoPoint, SignalQuality, TravelMode};
use chrono::Utc;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

/// Where the session is in its lifecycle. Idle has no session at all, so
/// it lives in the navigator as `None` rather than here.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    /// Tracking progress and announcing maneuvers.
    Active,
    /// Waiting on the routing collaborator for a replacement route.
    Recalculating,
    /// Destination reached; terminal.
    Arrived,
    /// Ended by the user or a fatal error; terminal.
    Stopped,
}

impl SessionPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionPhase::Arrived | SessionPhase::Stopped)
    }
}

/// Ask the navigator to fetch a replacement route.
#[derive(Clone, Copy, Debug)]
pub struct RecalcRequest {
    pub origin: GeoPoint,
    pub destination: GeoPoint,
    pub mode: TravelMode,
}

/// Everything one evaluation produced.
#[derive(Debug, Default)]
pub struct SessionOutput {
    pub events: Vec<NavEvent>,
    pub recalc: Option<RecalcRequest>,
}

/// Point-in-time view of a session for UI polling.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub phase: SessionPhase,
    pub step_index: usize,
    pub progress: Option<RouteProgress>,
    pub quality: Option<SignalQuality>,
    pub distance_traveled_m: f64,
}

/// One navigation trip from start to arrival or stop.
pub struct NavigationSession {
    id: String,
    route: Route,
    phase: SessionPhase,
    config: NavConfig,
    filter: LocationFilter,
    tracker: RouteProgressTracker,
    generator: InstructionGenerator,
    last_announced: Option<NavigationInstruction>,
    current_point: Option<GeoPoint>,
    current_quality: Option<SignalQuality>,
    distance_traveled_m: f64,
    recalc_attempts: u32,
    started_at: chrono::DateTime<Utc>,
}

impl NavigationSession {
    /// Validate the route and open a session on it in the Active phase.
    pub fn start(route: Route, config: NavConfig) -> Result<Self> {
        route.validate(config.session.contiguity_tolerance_m)?;

        // Wall clock for readability, sequence for uniqueness within a
        // millisecond (a new start displaces the old session instantly)
        static SEQ: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
        let seq = SEQ.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let id = format!("nav_{}_{seq}", Utc::now().timestamp_millis());
        info!(
            "session {id} started: {} steps, {:.0} m, {}",
            route.steps.len(),
            route.total_distance_m,
            route.mode
        );

        Ok(NavigationSession {
            id,
            filter: LocationFilter::new(config.filter.clone()),
            tracker: RouteProgressTracker::new(config.progress.clone()),
            generator: InstructionGenerator::new(config.instruction.clone()),
            config,
            route,
            phase: SessionPhase::Active,
            last_announced: None,
            current_point: None,
            current_quality: None,
            distance_traveled_m: 0.0,
            recalc_attempts: 0,
            started_at: Utc::now(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id.clone(),
            phase: self.phase,
            step_index: self.tracker.step_index(),
            progress: self
                .current_point
                .map(|p| self.tracker.progress(&p, &self.route)),
            quality: self.current_quality,
            distance_traveled_m: self.distance_traveled_m,
        }
    }

    /// Feed one raw location fix through the filter and, while Active,
    /// evaluate progress, deviation and guidance against it.
    ///
    /// Invalid fixes are dropped with prior state retained. A rejected
    /// jump keeps the trip on its last known good point and skips the
    /// evaluation; the next sane fix picks it back up.
    pub fn on_fix(&mut self, raw: GeoPoint) -> SessionOutput {
        if self.phase.is_terminal() {
            return SessionOutput::default();
        }

        let filtered = match self.filter.ingest(raw) {
            Ok(f) => f,
            Err(NavError::SensorDataInvalid(detail)) => {
                debug!("dropped invalid fix: {detail}");
                return SessionOutput::default();
            }
            Err(_) => return SessionOutput::default(),
        };

        if let Some(prev) = self.current_point {
            self.distance_traveled_m += geodesy::haversine_m(&prev, &filtered.point);
        }
        self.current_point = Some(filtered.point);
        self.current_quality = Some(filtered.quality);

        if filtered.jump_rejected || self.phase != SessionPhase::Active {
            return SessionOutput::default();
        }

        self.evaluate(filtered.point, true)
    }

    /// Periodic re-evaluation against the newest filtered point.
    ///
    /// Ticks refresh step advancement, arrival and announcements only;
    /// deviation counting stays per-fix so a stale off-route point cannot
    /// inflate the hysteresis between fixes.
    pub fn on_tick(&mut self) -> SessionOutput {
        if self.phase != SessionPhase::Active {
            return SessionOutput::default();
        }
        match self.current_point {
            Some(point) => self.evaluate(point, false),
            None => SessionOutput::default(),
        }
    }

    /// The routing collaborator delivered a replacement route.
    ///
    /// The new route takes over from the first step: tracker, deviation
    /// counters and announcement memory restart, the filter keeps its
    /// history since the traveler has not moved.
    pub fn on_route_replaced(&mut self, route: Route) -> SessionOutput {
        if self.phase != SessionPhase::Recalculating {
            return SessionOutput::default();
        }

        if let Err(err) = route.validate(self.config.session.contiguity_tolerance_m) {
            warn!("recalculated route rejected: {err}");
            return self.on_recalc_failed(&err.to_string());
        }

        info!(
            "session {}: route replaced, {} steps, {:.0} m",
            self.id,
            route.steps.len(),
            route.total_distance_m
        );
        self.route = route;
        self.tracker.reset();
        self.last_announced = None;
        self.recalc_attempts = 0;
        self.phase = SessionPhase::Active;

        SessionOutput {
            events: vec![NavEvent::RouteRecalculated {
                total_distance_m: self.route.total_distance_m,
                steps: self.route.steps.len(),
            }],
            recalc: None,
        }
    }

    /// One recalculation attempt failed.
    ///
    /// Retries against the current position until the retry limit is
    /// reached, then ends the session as a fatal error.
    pub fn on_recalc_failed(&mut self, reason: &str) -> SessionOutput {
        if self.phase != SessionPhase::Recalculating {
            return SessionOutput::default();
        }

        self.recalc_attempts += 1;
        if self.recalc_attempts >= self.config.session.max_recalc_attempts {
            let error = NavError::RecalculationFailed {
                attempts: self.recalc_attempts,
                reason: reason.to_string(),
            };
            warn!("session {}: {error}", self.id);
            return SessionOutput {
                events: self.finish(EndReason::RecalculationFailed),
                recalc: None,
            };
        }

        warn!(
            "session {}: recalculation attempt {} failed, retrying: {reason}",
            self.id, self.recalc_attempts
        );
        SessionOutput {
            events: Vec::new(),
            recalc: self.recalc_request(),
        }
    }

    /// Number of recalculation attempts already spent. Resets when a
    /// replacement route arrives.
    pub fn recalc_attempts(&self) -> u32 {
        self.recalc_attempts
    }

    /// Close the session and emit its summary. Idempotent: a session that
    /// already ended emits nothing.
    pub fn finish(&mut self, reason: EndReason) -> Vec<NavEvent> {
        if self.phase.is_terminal() {
            return Vec::new();
        }
        self.phase = match reason {
            EndReason::Arrived => SessionPhase::Arrived,
            _ => SessionPhase::Stopped,
        };

        let elapsed_secs =
            (Utc::now() - self.started_at).num_milliseconds().max(0) as f64 / 1000.0;
        info!(
            "session {} ended ({reason:?}): {elapsed_secs:.1} s, {:.0} m traveled",
            self.id, self.distance_traveled_m
        );

        vec![NavEvent::NavigationCompleted(SessionSummary {
            session_id: self.id.clone(),
            reason,
            elapsed_secs,
            distance_traveled_m: self.distance_traveled_m,
        })]
    }

    /// Core evaluation: advance the step, check arrival, check deviation,
    /// regenerate guidance. `count_deviation` is false on ticks.
    fn evaluate(&mut self, point: GeoPoint, count_deviation: bool) -> SessionOutput {
        let mut out = SessionOutput::default();

        if self.tracker.advance_step(&point, &self.route) == StepAdvance::RouteExhausted {
            out.events = self.finish(EndReason::Arrived);
            return out;
        }
        if let Some(dest) = self.route.destination() {
            if geodesy::haversine_m(&point, &dest) <= self.config.progress.arrival_tolerance_m {
                out.events = self.finish(EndReason::Arrived);
                return out;
            }
        }

        if count_deviation {
            let check = self.tracker.check_deviation(&point, &self.route);
            match check.action {
                DeviationAction::Continue => {}
                DeviationAction::GetBackOnTrack => {
                    out.events.push(NavEvent::DeviationDetected(DeviationEvent {
                        position: point,
                        lateral_m: check.lateral_m,
                        action: check.action,
                    }));
                    return out;
                }
                DeviationAction::Recalculate => {
                    out.events.push(NavEvent::DeviationDetected(DeviationEvent {
                        position: point,
                        lateral_m: check.lateral_m,
                        action: check.action,
                    }));
                    self.phase = SessionPhase::Recalculating;
                    self.recalc_attempts = 0;
                    out.recalc = self.recalc_request();
                    return out;
                }
            }
        }

        if let Some(step) = self.route.steps.get(self.tracker.step_index()) {
            let to_maneuver = geodesy::haversine_m(&point, &step.end);
            let mut instruction = self.generator.build(step, to_maneuver);
            if self
                .generator
                .should_announce(self.last_announced.as_ref(), &instruction)
            {
                instruction.spoken = true;
                self.last_announced = Some(instruction.clone());
                out.events.push(NavEvent::InstructionUpdated(instruction));
            }
        }

        out
    }

    fn recalc_request(&self) -> Option<RecalcRequest> {
        let origin = self.current_point?;
        let destination = self.route.destination()?;
        Some(RecalcRequest {
            origin,
            destination,
            mode: self.route.mode,
        })
    }
}
