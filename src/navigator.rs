//! Async shell around the session state machine.
//!
//! One actor task owns the [`NavigationSession`] and is the only code
//! that touches it: commands, raw fixes, the periodic tick and finished
//! recalculations all arrive through channels and are drained by a single
//! `select!` loop, so progress and deviation state never race. The
//! [`Navigator`] handle is what the application holds; dropping it tears
//! the actor down.

use crate::config::NavConfig;
use crate::error::{NavError, Result};
use crate::events::{EndReason, NavEvent};
use crate::provider::RouteProvider;
use crate::route::Route;
use crate::session::{NavigationSession, RecalcRequest, SessionOutput, SessionSnapshot};
use crate::types::GeoPoint;
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

enum Command {
    Start {
        route: Route,
        reply: oneshot::Sender<Result<()>>,
    },
    Stop {
        reply: oneshot::Sender<Result<()>>,
    },
    Snapshot {
        reply: oneshot::Sender<Option<SessionSnapshot>>,
    },
}

/// Handle to the navigation actor.
///
/// Cheap to use from anywhere: commands go over a channel and the reply
/// comes back on a oneshot. At most one session is active; `start` while
/// one is running stops it first.
pub struct Navigator {
    commands: mpsc::Sender<Command>,
    fixes: mpsc::Sender<GeoPoint>,
    events: broadcast::Sender<NavEvent>,
    actor: JoinHandle<()>,
}

impl Navigator {
    pub fn new(provider: Arc<dyn RouteProvider>, config: NavConfig) -> Self {
        let (commands, command_rx) = mpsc::channel(16);
        let (fixes, fix_rx) = mpsc::channel(config.session.fix_channel_capacity);
        let (events, _) = broadcast::channel(config.session.event_channel_capacity);

        let actor = Actor {
            provider,
            config,
            events: events.clone(),
            session: None,
            generation: 0,
        };
        let handle = tokio::spawn(actor.run(command_rx, fix_rx));

        Navigator {
            commands,
            fixes,
            events,
            actor: handle,
        }
    }

    /// Begin navigating a route. Implicitly stops a running session;
    /// fails with `RouteMalformed` without leaving the idle state when
    /// the route does not validate.
    pub async fn start(&self, route: Route) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Start { route, reply })
            .await
            .map_err(|_| NavError::ChannelClosed)?;
        response.await.map_err(|_| NavError::ChannelClosed)?
    }

    /// End the current session with reason user-stopped.
    pub async fn stop(&self) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Stop { reply })
            .await
            .map_err(|_| NavError::ChannelClosed)?;
        response.await.map_err(|_| NavError::ChannelClosed)?
    }

    /// Current session state for UI polling; `None` while idle.
    pub async fn snapshot(&self) -> Result<Option<SessionSnapshot>> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Snapshot { reply })
            .await
            .map_err(|_| NavError::ChannelClosed)?;
        response.await.map_err(|_| NavError::ChannelClosed)
    }

    /// Sender the raw location source pushes fixes into. Sends while no
    /// session is active are drained and ignored.
    pub fn fix_sender(&self) -> mpsc::Sender<GeoPoint> {
        self.fixes.clone()
    }

    /// Subscribe to session events. Fire-and-forget: a lagging receiver
    /// loses old events, never blocks the engine.
    pub fn subscribe(&self) -> broadcast::Receiver<NavEvent> {
        self.events.subscribe()
    }
}

impl Drop for Navigator {
    fn drop(&mut self) {
        self.actor.abort();
    }
}

struct Actor {
    provider: Arc<dyn RouteProvider>,
    config: NavConfig,
    events: broadcast::Sender<NavEvent>,
    session: Option<NavigationSession>,
    /// Stamped onto every in-flight recalculation; bumped on start/stop
    /// so a stale result is discarded when it lands.
    generation: u64,
}

impl Actor {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut fixes: mpsc::Receiver<GeoPoint>,
    ) {
        let (recalc_tx, mut recalc_rx) = mpsc::channel::<(u64, Result<Route>)>(4);
        let mut tick = interval(Duration::from_secs_f64(
            self.config.session.tick_interval_secs,
        ));
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                command = commands.recv() => {
                    match command {
                        Some(command) => self.on_command(command),
                        // Every handle dropped: end the session quietly
                        None => {
                            if let Some(session) = self.session.as_mut() {
                                for event in session.finish(EndReason::UserStopped) {
                                    let _ = self.events.send(event);
                                }
                            }
                            break;
                        }
                    }
                }
                Some(fix) = fixes.recv() => {
                    if let Some(session) = self.session.as_mut() {
                        let output = session.on_fix(fix);
                        self.dispatch(output, &recalc_tx);
                    }
                }
                Some((generation, result)) = recalc_rx.recv() => {
                    self.on_recalc_result(generation, result, &recalc_tx);
                }
                _ = tick.tick() => {
                    if let Some(session) = self.session.as_mut() {
                        let output = session.on_tick();
                        self.dispatch(output, &recalc_tx);
                    }
                }
            }

            // Terminal sessions are dropped so ticks and fixes no-op
            if self
                .session
                .as_ref()
                .is_some_and(|s| s.phase().is_terminal())
            {
                self.session = None;
            }
        }
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Start { route, reply } => {
                let result = self.start_session(route);
                let _ = reply.send(result);
            }
            Command::Stop { reply } => {
                let result = match self.session.as_mut() {
                    Some(session) => {
                        for event in session.finish(EndReason::UserStopped) {
                            let _ = self.events.send(event);
                        }
                        self.session = None;
                        self.generation += 1;
                        Ok(())
                    }
                    None => Err(NavError::SessionNotActive),
                };
                let _ = reply.send(result);
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.session.as_ref().map(|s| s.snapshot()));
            }
        }
    }

    fn start_session(&mut self, route: Route) -> Result<()> {
        if let Some(previous) = self.session.as_mut() {
            info!("session {} displaced by a new start", previous.id());
            for event in previous.finish(EndReason::UserStopped) {
                let _ = self.events.send(event);
            }
        }

        let session = NavigationSession::start(route, self.config.clone())?;
        self.session = Some(session);
        self.generation += 1;
        Ok(())
    }

    fn on_recalc_result(
        &mut self,
        generation: u64,
        result: Result<Route>,
        recalc_tx: &mpsc::Sender<(u64, Result<Route>)>,
    ) {
        if generation != self.generation {
            debug!("discarding recalculation for a stale session");
            return;
        }
        let Some(session) = self.session.as_mut() else {
            return;
        };

        let output = match result {
            Ok(route) => session.on_route_replaced(route),
            Err(err) => session.on_recalc_failed(&err.to_string()),
        };
        self.dispatch(output, recalc_tx);
    }

    /// Broadcast the events and spawn a provider call when asked for one.
    fn dispatch(&mut self, output: SessionOutput, recalc_tx: &mpsc::Sender<(u64, Result<Route>)>) {
        for event in output.events {
            let _ = self.events.send(event);
        }
        if let Some(request) = output.recalc {
            self.spawn_recalculation(request, recalc_tx.clone());
        }
    }

    fn spawn_recalculation(
        &self,
        request: RecalcRequest,
        recalc_tx: mpsc::Sender<(u64, Result<Route>)>,
    ) {
        let generation = self.generation;
        let provider = self.provider.clone();
        debug!(
            "recalculating from ({:.5}, {:.5})",
            request.origin.latitude, request.origin.longitude
        );
        tokio::spawn(async move {
            let result = provider
                .compute_route(request.origin, request.destination, request.mode)
                .await;
            if recalc_tx.send((generation, result)).await.is_err() {
                warn!("recalculation finished after the navigator shut down");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FilterConfig;
    use crate::error::NavError;
    use crate::geodesy::destination_point;
    use crate::route::{l_shaped_route, ManeuverType, Route};
    use crate::types::TravelMode;
    use futures::future::BoxFuture;
    use std::sync::Mutex;
    use tokio::time::{advance, timeout};

    /// Scripted provider: records every call, then hands back the same
    /// L-shaped route, or an error when `fail` is set. An optional delay
    /// keeps the call visibly in flight under the paused test clock.
    struct ScriptedProvider {
        calls: Mutex<Vec<GeoPoint>>,
        fail: bool,
        delay: Option<Duration>,
    }

    impl ScriptedProvider {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(ScriptedProvider {
                calls: Mutex::new(Vec::new()),
                fail,
                delay: None,
            })
        }

        fn slow(delay: Duration) -> Arc<Self> {
            Arc::new(ScriptedProvider {
                calls: Mutex::new(Vec::new()),
                fail: false,
                delay: Some(delay),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl RouteProvider for ScriptedProvider {
        fn compute_route(
            &self,
            origin: GeoPoint,
            _destination: GeoPoint,
            _mode: TravelMode,
        ) -> BoxFuture<'static, Result<Route>> {
            self.calls.lock().unwrap().push(origin);
            let fail = self.fail;
            let delay = self.delay;
            Box::pin(async move {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                if fail {
                    Err(NavError::RouteProvider("routing service down".into()))
                } else {
                    Ok(l_shaped_route())
                }
            })
        }
    }

    fn test_config() -> NavConfig {
        NavConfig {
            filter: FilterConfig {
                measurement_noise: 1e-6,
                ..FilterConfig::default()
            },
            ..NavConfig::default()
        }
    }

    fn navigator(provider: Arc<ScriptedProvider>) -> Navigator {
        // `RUST_LOG=debug cargo test -- --nocapture` surfaces the actor logs
        let _ = env_logger::builder().is_test(true).try_init();
        Navigator::new(provider, test_config())
    }

    async fn next_event(rx: &mut broadcast::Receiver<NavEvent>) -> NavEvent {
        timeout(Duration::from_secs(30), rx.recv())
            .await
            .expect("timed out waiting for an event")
            .expect("event channel closed")
    }

    /// Fix `along` meters up step 0, `offset` meters east.
    fn fix_beside_leg0(along: f64, offset: f64, t: f64) -> GeoPoint {
        let route = l_shaped_route();
        let on = destination_point(&route.steps[0].start, 0.0, along);
        let mut p = destination_point(&on, 90.0, offset);
        p.timestamp = t;
        p.accuracy = Some(5.0);
        p
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_without_session_errors() {
        let navigator = navigator(ScriptedProvider::new(false));
        assert!(matches!(
            navigator.stop().await,
            Err(NavError::SessionNotActive)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_rejects_malformed_route() {
        let navigator = navigator(ScriptedProvider::new(false));
        let empty = Route::new(Vec::new(), TravelMode::Walking);
        assert!(matches!(
            navigator.start(empty).await,
            Err(NavError::RouteMalformed(_))
        ));
        assert!(navigator.snapshot().await.unwrap().is_none(), "still idle");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_emits_user_stopped_summary() {
        let navigator = navigator(ScriptedProvider::new(false));
        let mut events = navigator.subscribe();

        navigator.start(l_shaped_route()).await.unwrap();
        navigator.stop().await.unwrap();

        match next_event(&mut events).await {
            NavEvent::NavigationCompleted(summary) => {
                assert_eq!(summary.reason, EndReason::UserStopped);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(navigator.snapshot().await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_walk_produces_instructions_then_completion() {
        let navigator = navigator(ScriptedProvider::new(false));
        let mut events = navigator.subscribe();
        let fixes = navigator.fix_sender();
        let route = l_shaped_route();

        navigator.start(l_shaped_route()).await.unwrap();

        let mut t = 0.0;
        for along in (0..=8).map(|i| i as f64 * 100.0) {
            let mut p = if along <= 500.0 {
                fix_beside_leg0(along, 0.0, t)
            } else {
                destination_point(&route.steps[1].start, 90.0, along - 500.0)
            };
            p.timestamp = t;
            p.accuracy = Some(5.0);
            t += 5.0;
            fixes.send(p).await.unwrap();
            advance(Duration::from_millis(100)).await;
        }

        let mut announced = Vec::new();
        loop {
            match next_event(&mut events).await {
                NavEvent::InstructionUpdated(instruction) => announced.push(instruction.maneuver),
                NavEvent::NavigationCompleted(summary) => {
                    assert_eq!(summary.reason, EndReason::Arrived);
                    break;
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert_eq!(
            announced,
            vec![ManeuverType::Straight, ManeuverType::TurnRight]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_off_route_fix_invokes_provider_once() {
        let provider = ScriptedProvider::new(false);
        let navigator = navigator(provider.clone());
        let mut events = navigator.subscribe();
        let fixes = navigator.fix_sender();

        navigator.start(l_shaped_route()).await.unwrap();

        let off = fix_beside_leg0(0.0, 300.0, 0.0);
        fixes.send(off).await.unwrap();

        match next_event(&mut events).await {
            NavEvent::DeviationDetected(deviation) => {
                assert!(deviation.lateral_m > 200.0);
            }
            other => panic!("unexpected event {other:?}"),
        }
        match next_event(&mut events).await {
            NavEvent::RouteRecalculated { steps, .. } => assert_eq!(steps, 2),
            other => panic!("unexpected event {other:?}"),
        }

        assert_eq!(provider.call_count(), 1, "exactly one provider call");
        let origin = provider.calls.lock().unwrap()[0];
        assert!((origin.latitude - off.latitude).abs() < 1e-9);
        assert!((origin.longitude - off.longitude).abs() < 1e-9);

        let snapshot = navigator.snapshot().await.unwrap().unwrap();
        assert_eq!(snapshot.step_index, 0, "replacement route starts over");
    }

    #[tokio::test(start_paused = true)]
    async fn test_recalc_failures_exhaust_and_stop() {
        let provider = ScriptedProvider::new(true);
        let navigator = navigator(provider.clone());
        let mut events = navigator.subscribe();
        let fixes = navigator.fix_sender();

        navigator.start(l_shaped_route()).await.unwrap();
        fixes.send(fix_beside_leg0(0.0, 300.0, 0.0)).await.unwrap();

        match next_event(&mut events).await {
            NavEvent::DeviationDetected(_) => {}
            other => panic!("unexpected event {other:?}"),
        }
        match next_event(&mut events).await {
            NavEvent::NavigationCompleted(summary) => {
                assert_eq!(summary.reason, EndReason::RecalculationFailed);
            }
            other => panic!("unexpected event {other:?}"),
        }

        assert_eq!(provider.call_count(), 3, "bounded retry spends all attempts");
        assert!(navigator.snapshot().await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_start_displaces_running_session() {
        let navigator = navigator(ScriptedProvider::new(false));
        let mut events = navigator.subscribe();

        navigator.start(l_shaped_route()).await.unwrap();
        let first = navigator.snapshot().await.unwrap().unwrap().session_id;

        navigator.start(l_shaped_route()).await.unwrap();
        match next_event(&mut events).await {
            NavEvent::NavigationCompleted(summary) => {
                assert_eq!(summary.session_id, first);
                assert_eq!(summary.reason, EndReason::UserStopped);
            }
            other => panic!("unexpected event {other:?}"),
        }

        let second = navigator.snapshot().await.unwrap().unwrap();
        assert_ne!(second.session_id, first);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_recalculation_discarded_after_stop() {
        // Provider needs a minute; the user gives up after seconds
        let provider = ScriptedProvider::slow(Duration::from_secs(60));
        let navigator = navigator(provider.clone());
        let mut events = navigator.subscribe();
        let fixes = navigator.fix_sender();

        navigator.start(l_shaped_route()).await.unwrap();
        fixes.send(fix_beside_leg0(0.0, 300.0, 0.0)).await.unwrap();

        match next_event(&mut events).await {
            NavEvent::DeviationDetected(_) => {}
            other => panic!("unexpected event {other:?}"),
        }

        // Stop while the recalculation is in flight; its eventual result
        // must land on a bumped generation and change nothing
        navigator.stop().await.unwrap();
        match next_event(&mut events).await {
            NavEvent::NavigationCompleted(summary) => {
                assert_eq!(summary.reason, EndReason::UserStopped);
            }
            other => panic!("unexpected event {other:?}"),
        }

        // Let the slow provider finish and its result arrive
        advance(Duration::from_secs(120)).await;
        assert!(navigator.snapshot().await.unwrap().is_none());
        assert!(
            timeout(Duration::from_secs(5), events.recv()).await.is_err(),
            "no further events after stop"
        );
    }
}
