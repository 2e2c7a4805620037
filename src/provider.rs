//! Seam to the external routing collaborator.
//!
//! Route computation lives outside this engine; the session only asks for
//! a fresh route when the traveler has strayed too far. The trait is
//! object-safe so callers inject whatever backend they have (HTTP routing
//! service, on-device graph, a scripted stub in tests).

use crate::error::Result;
use crate::route::Route;
use crate::types::{GeoPoint, TravelMode};
use futures::future::BoxFuture;

/// Computes a route between two points for a travel mode.
///
/// Called once by the application at session start and by the engine
/// itself while recalculating. Implementations may take arbitrarily long;
/// the engine runs the call off its evaluation path and discards results
/// that arrive after the session they belong to ended.
pub trait RouteProvider: Send + Sync {
    fn compute_route(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
        mode: TravelMode,
    ) -> BoxFuture<'static, Result<Route>>;
}
