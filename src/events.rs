//! Events the engine emits to presentation sinks.
//!
//! Fire-and-forget: sinks subscribe through the navigator's broadcast
//! channel and the engine never waits on them. Everything here is
//! serializable so sinks can forward events as JSON unchanged.

use crate::instruction::NavigationInstruction;
use crate::progress::DeviationAction;
use crate::types::GeoPoint;
use serde::{Deserialize, Serialize};

/// Why a session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EndReason {
    Arrived,
    UserStopped,
    RecalculationFailed,
}

/// Closing summary of a navigation session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub reason: EndReason,
    pub elapsed_secs: f64,
    /// Ground actually covered, not route length.
    pub distance_traveled_m: f64,
}

/// A confirmed departure from the route.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct DeviationEvent {
    pub position: GeoPoint,
    pub lateral_m: f64,
    pub action: DeviationAction,
}

/// Everything a subscriber can hear from a session.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum NavEvent {
    /// A guidance phrase worth announcing.
    InstructionUpdated(NavigationInstruction),
    /// The traveler left the route.
    DeviationDetected(DeviationEvent),
    /// A reroute succeeded and the active route was replaced.
    RouteRecalculated { total_distance_m: f64, steps: usize },
    /// The session ended; no further events follow for it.
    NavigationCompleted(SessionSummary),
}
