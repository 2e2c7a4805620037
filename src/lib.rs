//! Navigation and location-tracking engine.
//!
//! Turns a stream of noisy positioning fixes plus a precomputed route
//! into smoothed position estimates, route progress with deviation
//! detection and reroute decisions, turn-by-turn guidance, and a
//! navigation session lifecycle. Rendering, audio, persistence and route
//! computation itself stay outside; the engine talks to them through the
//! [`provider::RouteProvider`] seam and the event channel on
//! [`navigator::Navigator`].

pub mod config;
pub mod error;
pub mod events;
pub mod filter;
pub mod geodesy;
pub mod instruction;
pub mod navigator;
pub mod progress;
pub mod provider;
pub mod route;
pub mod session;
pub mod types;

pub use config::NavConfig;
pub use error::{NavError, Result};
pub use events::{EndReason, NavEvent, SessionSummary};
pub use filter::{FilteredFix, LocationFilter};
pub use instruction::{InstructionGenerator, NavigationInstruction};
pub use navigator::Navigator;
pub use progress::{DeviationAction, RouteProgress, RouteProgressTracker};
pub use provider::RouteProvider;
pub use route::{ManeuverType, Route, RouteStep};
pub use session::{NavigationSession, SessionPhase, SessionSnapshot};
pub use types::{GeoPoint, SignalQuality, TravelMode};
