use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use futures::future::BoxFuture;
use nav_engine_rs::{
    geodesy, GeoPoint, ManeuverType, NavConfig, NavEvent, Navigator, Route, RouteProvider,
    RouteStep, TravelMode,
};
use std::sync::Arc;
use tokio::time::{sleep, Duration};

#[derive(Parser, Debug)]
#[command(name = "nav_sim")]
#[command(about = "Navigation engine simulator - synthetic walk along a two-leg route", long_about = None)]
struct Args {
    /// Travel mode (walking, cycling, driving)
    #[arg(long, default_value = "walking")]
    mode: TravelMode,

    /// Seconds between synthetic fixes
    #[arg(long, default_value = "2.0")]
    fix_interval: f64,

    /// Meters covered per fix
    #[arg(long, default_value = "25.0")]
    pace_m: f64,

    /// GPS noise amplitude in meters (0 = clean fixes)
    #[arg(long, default_value = "0.0")]
    noise_m: f64,

    /// Veer off the route after this many fixes (0 = stay on route)
    #[arg(long, default_value = "0")]
    detour_after: usize,

    /// Print events as JSON lines instead of text
    #[arg(long)]
    json: bool,
}

/// Routing stub: answers every request with a direct leg from origin to
/// destination, the way a recalculation would get the traveler back.
struct DirectRouteProvider;

impl RouteProvider for DirectRouteProvider {
    fn compute_route(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
        mode: TravelMode,
    ) -> BoxFuture<'static, nav_engine_rs::Result<Route>> {
        println!(
            "[{}] provider: computing route ({:.5}, {:.5}) -> ({:.5}, {:.5})",
            ts_now(),
            origin.latitude,
            origin.longitude,
            destination.latitude,
            destination.longitude
        );
        Box::pin(async move {
            let step = RouteStep::new(0, origin, destination, ManeuverType::Straight, mode);
            Ok(Route::new(vec![step], mode))
        })
    }
}

/// Two-leg demo route: 500 m north from downtown San Francisco, then
/// 300 m east.
fn demo_route(mode: TravelMode) -> Route {
    let a = GeoPoint::new(37.7749, -122.4194, current_timestamp());
    let b = geodesy::destination_point(&a, 0.0, 500.0);
    let c = geodesy::destination_point(&b, 90.0, 300.0);
    Route::new(
        vec![
            RouteStep::new(0, a, b, ManeuverType::Straight, mode).with_name("Larkin Street"),
            RouteStep::new(1, b, c, ManeuverType::TurnRight, mode).with_name("Geary Street"),
        ],
        mode,
    )
}

/// Feeds synthetic fixes into the engine until the channel closes.
///
/// The walker paces along the demo route; after `detour_after` fixes it
/// veers perpendicular until a reroute lands, then heads straight for the
/// destination. Deterministic sinusoidal jitter stands in for GPS noise.
async fn walker(
    fixes: tokio::sync::mpsc::Sender<GeoPoint>,
    route: Route,
    args: WalkerArgs,
) {
    let corner = route.steps[0].end;
    let destination = route.steps[1].end;
    let leg0 = route.steps[0].length_m;
    let total = route.total_distance_m;

    let mut along = 0.0;
    let mut position = route.steps[0].start;
    let mut detoured = false;

    for seq in 0.. {
        if args.detour_after > 0 && seq >= args.detour_after {
            detoured = true;
        }

        let mut point = if detoured {
            // Veer east until rerouted, then walk straight at the goal
            let to_dest = geodesy::haversine_m(&position, &destination);
            if to_dest <= args.pace_m {
                destination
            } else if seq < args.detour_after + 10 {
                // Keep veering until the 200 m tier forces a reroute
                geodesy::destination_point(&position, 90.0, args.pace_m)
            } else {
                let bearing = geodesy::initial_bearing_deg(&position, &destination);
                geodesy::destination_point(&position, bearing, args.pace_m)
            }
        } else if along < leg0 {
            geodesy::destination_point(&route.steps[0].start, 0.0, along)
        } else if along < total {
            geodesy::destination_point(&corner, 90.0, along - leg0)
        } else {
            // Hold at the destination so the smoothed estimate converges
            destination
        };
        along += args.pace_m;
        position = point;

        if args.noise_m > 0.0 {
            let t = seq as f64;
            point = geodesy::destination_point(&point, 90.0, (t * 0.9).sin() * args.noise_m);
            point = geodesy::destination_point(&point, 0.0, (t * 1.3).cos() * args.noise_m);
        }
        point.timestamp = current_timestamp();
        point.accuracy = Some(5.0 + (seq as f64 * 0.1).sin() * 2.0);

        if fixes.send(point).await.is_err() {
            break;
        }
        sleep(Duration::from_secs_f64(args.fix_interval)).await;
    }
}

struct WalkerArgs {
    fix_interval: f64,
    pace_m: f64,
    noise_m: f64,
    detour_after: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    println!("[{}] Nav Sim Starting", ts_now());
    println!("  Mode: {}", args.mode);
    println!("  Fix interval: {} s, pace: {} m", args.fix_interval, args.pace_m);
    println!("  Noise: {} m, detour after: {} fixes", args.noise_m, args.detour_after);

    let provider = Arc::new(DirectRouteProvider);
    let navigator = Navigator::new(provider, NavConfig::default());
    let mut events = navigator.subscribe();

    let route = demo_route(args.mode);
    println!(
        "[{}] Route: {} steps, {:.0} m, ~{:.0} s",
        ts_now(),
        route.steps.len(),
        route.total_distance_m,
        route.total_duration_secs
    );

    navigator.start(route.clone()).await?;

    let _walker = tokio::spawn(walker(
        navigator.fix_sender(),
        route,
        WalkerArgs {
            fix_interval: args.fix_interval,
            pace_m: args.pace_m,
            noise_m: args.noise_m,
            detour_after: args.detour_after,
        },
    ));

    while let Ok(event) = events.recv().await {
        if args.json {
            println!("{}", serde_json::to_string(&event)?);
        } else {
            print_event(&event);
        }

        if let NavEvent::NavigationCompleted(summary) = &event {
            println!(
                "[{}] Done: {:.0} m traveled in {:.0} s ({:?})",
                ts_now(),
                summary.distance_traveled_m,
                summary.elapsed_secs,
                summary.reason
            );
            break;
        }
    }

    Ok(())
}

fn print_event(event: &NavEvent) {
    match event {
        NavEvent::InstructionUpdated(instruction) => {
            println!(
                "[{}] >> {} ({}, {:?})",
                ts_now(),
                instruction.text,
                instruction.distance_text,
                instruction.timing
            );
        }
        NavEvent::DeviationDetected(deviation) => {
            println!(
                "[{}] !! off route by {:.0} m -> {:?}",
                ts_now(),
                deviation.lateral_m,
                deviation.action
            );
        }
        NavEvent::RouteRecalculated { total_distance_m, steps } => {
            println!(
                "[{}] ** new route: {steps} step(s), {total_distance_m:.0} m",
                ts_now()
            );
        }
        NavEvent::NavigationCompleted(summary) => {
            println!("[{}] session {} completed", ts_now(), summary.session_id);
        }
    }
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}

fn current_timestamp() -> f64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
