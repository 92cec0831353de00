// demos/simulated_flight.rs

use async_trait::async_trait;
use clap::{Parser, ValueEnum};
use std::error::Error;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing_subscriber::EnvFilter;
use virtual_stick_guidance::route::{bearing, haversine_distance, heading_difference};
use virtual_stick_guidance::stick::MAX_ASCENT_SPEED;
use virtual_stick_guidance::telemetry::{
    Attitude, Position3D, TelemetryUpdate, TelemetryWriter, Velocity3D,
};
use virtual_stick_guidance::{
    telemetry_channel, ActuationError, Actuator, Autopilot, AutopilotConfig,
    ControlLoopScheduler, Controls, FlightPhase, GuidanceMode, ManualSticks, RouteMessage,
    RoutePoint, TelemetrySource, TrackingFeed, MAX_STICK,
};

const HOME: RoutePoint = RoutePoint::new(37.5665, 126.9780);
const METRES_PER_DEGREE: f64 = 111_194.9;
const TAKEOFF_ALTITUDE: f64 = 1.2;
const MAX_FORWARD_SPEED: f64 = 5.0;
const MAX_YAW_RATE: f64 = 60.0;
const STEP: Duration = Duration::from_millis(50);

#[derive(Parser, Debug)]
#[command(version, about = "Fly the autopilot against a simulated aircraft.")]
struct Args {
    /// Guidance mode to engage once airborne.
    #[arg(long, value_enum, default_value_t = Mode::Vision)]
    mode: Mode,
    /// How long to fly before shutting down, in seconds.
    #[arg(long, default_value_t = 30)]
    seconds: u64,
    /// JSON file with autopilot configuration overrides.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Inject a gust after this many seconds to trip the safety watchdog.
    #[arg(long)]
    gust_at: Option<u64>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Mode {
    Gps,
    Vision,
    Manual,
}

impl From<Mode> for GuidanceMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Gps => GuidanceMode::Gps,
            Mode::Vision => GuidanceMode::Vision,
            Mode::Manual => GuidanceMode::Manual,
        }
    }
}

#[derive(Debug, Default)]
struct Aircraft {
    position: RoutePoint,
    altitude: f64,
    heading: f64,
    velocity: Velocity3D,
    flying: bool,
    taking_off: bool,
    landing: bool,
    returning: bool,
    controls: Controls,
    gust: bool,
}

impl Aircraft {
    fn step(&mut self, dt: f64) {
        let mut north = 0.0;
        let mut east = 0.0;
        let mut up = 0.0;

        if !self.flying {
            self.velocity = Velocity3D::default();
            return;
        }

        if self.returning && haversine_distance(self.position, HOME) > 0.5 {
            let heading = bearing(self.position, HOME).to_radians();
            north = 2.0 * heading.cos();
            east = 2.0 * heading.sin();
        } else if self.landing || self.returning {
            up = -0.5;
        } else if self.taking_off {
            up = 1.0;
            if self.altitude >= TAKEOFF_ALTITUDE {
                self.taking_off = false;
            }
        } else {
            let axis = |value: i32| value as f64 / MAX_STICK as f64;
            self.heading = (self.heading
                + axis(self.controls.left.horizontal) * MAX_YAW_RATE * dt)
                .rem_euclid(360.0);
            let forward = axis(self.controls.right.vertical) * MAX_FORWARD_SPEED;
            let lateral = axis(self.controls.right.horizontal) * MAX_FORWARD_SPEED;
            let heading = self.heading.to_radians();
            north = forward * heading.cos() - lateral * heading.sin();
            east = forward * heading.sin() + lateral * heading.cos();
            up = axis(self.controls.left.vertical) * MAX_ASCENT_SPEED;
        }

        if std::mem::take(&mut self.gust) {
            east += 1.5;
        }

        self.position.lat += north * dt / METRES_PER_DEGREE;
        self.position.lng +=
            east * dt / (METRES_PER_DEGREE * self.position.lat.to_radians().cos());
        self.altitude = (self.altitude + up * dt).max(0.0);
        self.velocity = Velocity3D {
            x: north,
            y: east,
            z: -up,
        };

        if self.altitude <= 0.0 && (self.landing || self.returning) {
            self.flying = false;
            self.landing = false;
            self.returning = false;
            tracing::info!("simulated aircraft touched down");
        }
    }

    fn publish(&self, writer: &TelemetryWriter) {
        writer.apply(TelemetryUpdate::Connection(true));
        writer.apply(TelemetryUpdate::GpsSignalLevel(5));
        writer.apply(TelemetryUpdate::IsFlying(self.flying));
        writer.apply(TelemetryUpdate::CompassHeading(self.heading));
        writer.apply(TelemetryUpdate::Attitude(Attitude {
            roll: 0.0,
            pitch: 0.0,
            yaw: self.heading,
        }));
        writer.apply(TelemetryUpdate::Velocity(self.velocity));
        writer.apply(TelemetryUpdate::Position(Position3D {
            latitude: self.position.lat,
            longitude: self.position.lng,
            altitude: self.altitude,
        }));
    }
}

#[derive(Debug, Clone)]
struct SimulatedAircraft {
    state: Arc<Mutex<Aircraft>>,
    physics: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl SimulatedAircraft {
    fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(Aircraft {
                position: HOME,
                ..Default::default()
            })),
            physics: Arc::default(),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut Aircraft) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }
}

#[async_trait]
impl Actuator for SimulatedAircraft {
    async fn takeoff(&self) -> Result<(), ActuationError> {
        self.with(|a| {
            if a.flying {
                return Err(ActuationError::rejected("takeoff", "already flying"));
            }
            a.flying = true;
            a.taking_off = true;
            Ok(())
        })
    }

    async fn land(&self) -> Result<(), ActuationError> {
        self.with(|a| a.landing = true);
        Ok(())
    }

    async fn return_home(&self) -> Result<(), ActuationError> {
        self.with(|a| a.returning = true);
        while self.with(|a| a.returning) {
            sleep(Duration::from_millis(100)).await;
        }
        Ok(())
    }

    async fn enable_virtual_stick(&self) -> Result<(), ActuationError> {
        sleep(Duration::from_millis(50)).await;
        Ok(())
    }

    async fn disable_virtual_stick(&self) -> Result<(), ActuationError> {
        sleep(Duration::from_millis(50)).await;
        self.with(|a| a.controls = Controls::NEUTRAL);
        Ok(())
    }

    fn write_sticks(&self, controls: Controls) {
        self.with(|a| a.controls = controls);
    }
}

#[async_trait]
impl TelemetrySource for SimulatedAircraft {
    async fn subscribe(&self, writer: TelemetryWriter) -> Result<(), ActuationError> {
        self.with(|a| a.publish(&writer));
        let aircraft = self.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(STEP);
            loop {
                interval.tick().await;
                aircraft.with(|a| {
                    a.step(STEP.as_secs_f64());
                    a.publish(&writer);
                });
            }
        });
        let previous = self
            .physics
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
        Ok(())
    }

    async fn unsubscribe(&self) {
        let handle = self.physics.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

/// Where the simulated vision target stands: circling 8 m north-east of home.
fn target_position(elapsed: f64) -> RoutePoint {
    let angle = elapsed * 0.1;
    RoutePoint::new(
        HOME.lat + (6.0 + 2.0 * angle.cos()) / METRES_PER_DEGREE,
        HOME.lng + (6.0 + 2.0 * angle.sin()) / (METRES_PER_DEGREE * HOME.lat.to_radians().cos()),
    )
}

fn tracking_datagram(aircraft: &Aircraft, target: RoutePoint) -> String {
    let turn = heading_difference(bearing(aircraft.position, target), aircraft.heading);
    let distance = haversine_distance(aircraft.position, target);
    serde_json::json!({
        "normalized_offset_x": (turn / 40.0).clamp(-1.0, 1.0),
        "normalized_offset_y": (-(distance - 5.0) / 10.0).clamp(-1.0, 1.0),
        "box_width": (1.0 / distance.max(1.0)).min(1.0),
        "box_height": (2.0 / distance.max(1.0)).min(1.0),
        "is_locked": turn.abs() < 60.0,
    })
    .to_string()
}

fn route_datagram(aircraft: &Aircraft, destination: RoutePoint) -> String {
    serde_json::json!({
        "location": { "lat": aircraft.position.lat, "lng": aircraft.position.lng },
        "dest_location": { "lat": destination.lat, "lng": destination.lng },
        "start_flag": false,
    })
    .to_string()
}

async fn wait_for_phase(autopilot: &Autopilot, phase: FlightPhase, timeout: Duration) -> bool {
    let mut state = autopilot.observe_state();
    tokio::time::timeout(timeout, async {
        while state.borrow_and_update().phase != phase {
            if state.changed().await.is_err() {
                return false;
            }
        }
        true
    })
    .await
    .unwrap_or(false)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => AutopilotConfig::from_json_str(&std::fs::read_to_string(path)?)?,
        None => AutopilotConfig::new(),
    };

    let aircraft = SimulatedAircraft::new();
    let (telemetry_writer, telemetry) = telemetry_channel();
    let (mut tracking_feed, tracking) = TrackingFeed::new();
    aircraft.subscribe(telemetry_writer).await?;

    let autopilot = Arc::new(Autopilot::new(
        config,
        Arc::new(aircraft.clone()),
        telemetry,
        tracking,
    ));
    let scheduler = ControlLoopScheduler::start(autopilot.clone());

    autopilot.start_take_off().await?;
    if !wait_for_phase(&autopilot, FlightPhase::Cruising, Duration::from_secs(10)).await {
        return Err("aircraft never became airborne".into());
    }
    sleep(Duration::from_secs(2)).await;

    autopilot.set_guidance_mode(args.mode.into());
    autopilot.enable_virtual_stick_mode().await?;
    if matches!(args.mode, Mode::Manual) {
        autopilot.set_manual_sticks(ManualSticks {
            yaw: 40.0,
            pitch: 20.0,
            roll: 0.0,
            throttle: 0.0,
        })?;
    }

    let destination = RoutePoint::new(HOME.lat + 15.0 / METRES_PER_DEGREE, HOME.lng);
    let started = Instant::now();
    let mut feed = tokio::time::interval(Duration::from_millis(200));
    let mut gust_pending = args.gust_at;
    let mut last_report = Instant::now();

    while started.elapsed() < Duration::from_secs(args.seconds) {
        feed.tick().await;
        let elapsed = started.elapsed().as_secs_f64();

        if gust_pending.is_some_and(|at| elapsed >= at as f64) {
            gust_pending = None;
            tracing::warn!("injecting gust");
            aircraft.with(|a| a.gust = true);
        }

        match args.mode {
            Mode::Vision => {
                let datagram = aircraft.with(|a| tracking_datagram(a, target_position(elapsed)));
                tracking_feed.ingest_datagram(datagram.as_bytes())?;
            }
            Mode::Gps => {
                let datagram = aircraft.with(|a| route_datagram(a, destination));
                autopilot
                    .handle_route_message(RouteMessage::parse(datagram.as_bytes())?)
                    .await?;
            }
            Mode::Manual => {}
        }

        if last_report.elapsed() >= Duration::from_secs(1) {
            last_report = Instant::now();
            let report = autopilot.observe_state().borrow().clone();
            println!(
                "t = {:5.1}  {:<14} authority {:<9} sticks L({:4},{:4}) R({:4},{:4})  alt {:5.2}  skipped {}",
                elapsed,
                format!("{:?}", report.phase),
                format!("{:?}", report.authority),
                report.controls.left.vertical,
                report.controls.left.horizontal,
                report.controls.right.vertical,
                report.controls.right.horizontal,
                report.telemetry.position.map(|p| p.altitude).unwrap_or(0.0),
                report.skipped_ticks,
            );
        }

        if matches!(
            autopilot.phase(),
            FlightPhase::Landed | FlightPhase::Faulted
        ) {
            break;
        }
    }

    if autopilot.phase().is_airborne() {
        autopilot.start_landing().await?;
        wait_for_phase(&autopilot, FlightPhase::Landed, Duration::from_secs(20)).await;
    }

    scheduler.shutdown().await;
    aircraft.unsubscribe().await;
    let report = autopilot.observe_state().borrow().clone();
    println!(
        "final phase {:?}, authority {:?}, last error {:?}",
        report.phase, report.authority, report.last_error
    );
    Ok(())
}
