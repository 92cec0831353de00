// src/autopilot.rs

//! # Autopilot
//!
//! Ties the pieces together: the flight phase machine, the virtual stick
//! session, the guidance laws, the composer, the safety watchdog and the
//! arrival timer.
//!
//! The periodic [`tick`](Autopilot::tick) is synchronous and never waits
//! on the vendor SDK. Anything it wants actuated comes back as
//! [`ActuationRequest`]s which the caller runs with
//! [`settle`](Autopilot::settle); the resolved results are fed back into
//! the state machines, possibly producing further requests. Operator
//! commands on the control surface run the same way but await their own
//! result so it can be returned.
//!
//! All mutable state sits behind one `std::sync::Mutex` that is only held
//! for synchronous work.

use crate::actuation::{Actuator, AuthorityChangeReason, AuthorityOwner};
use crate::arrival::{ArrivalEvent, ArrivalTimer};
use crate::config::{AutopilotConfig, Tunables};
use crate::error::{ActuationError, FlightError};
use crate::guidance::{
    GpsGuidance, GuidanceInput, GuidanceLaw, GuidanceMode, ManualGuidance, ManualSticks,
    VisionGuidance,
};
use crate::phase::{FlightPhase, FlightPhaseMachine, Transition};
use crate::route::{RouteFeed, RouteMessage, RouteReader, RouteUpdate};
use crate::safety::{SafetyAction, SafetyWatchdog};
use crate::session::{AuthorityState, VirtualStickSession};
use crate::stick::{Controls, StickComposer};
use crate::telemetry::{TelemetryReader, TelemetrySnapshot};
use crate::tracking::TrackingReader;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::time::Instant;

/// Vendor call the state machines asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuationRequest {
    /// Start takeoff.
    Takeoff,
    /// Start landing. `forced` when the safety watchdog asked for it.
    Land {
        /// Whether the watchdog forced it.
        forced: bool,
    },
    /// Start return-to-home.
    ReturnHome,
    /// Release virtual stick authority on a teardown path.
    ReleaseAuthority,
}

/// Diagnostic snapshot for UI and telemetry consumers.
#[derive(Debug, Clone, PartialEq)]
pub struct StateReport {
    /// Flight phase.
    pub phase: FlightPhase,
    /// Last composed stick frame.
    pub controls: Controls,
    /// Telemetry at the time of the report.
    pub telemetry: TelemetrySnapshot,
    /// Virtual stick authority.
    pub authority: AuthorityState,
    /// Last reported authority owner.
    pub authority_owner: Option<AuthorityOwner>,
    /// Last reported authority change reason.
    pub authority_reason: Option<AuthorityChangeReason>,
    /// Active guidance mode.
    pub guidance_mode: GuidanceMode,
    /// Active tunables.
    pub tunables: Tunables,
    /// Whether the arrival debounce is running.
    pub arrival_pending: bool,
    /// Whether the safety watchdog has tripped.
    pub safety_tripped: bool,
    /// Ticks that computed no command, stale data included.
    pub skipped_ticks: u64,
    /// Most recent failure, for display.
    pub last_error: Option<String>,
}

struct Core {
    phase: FlightPhaseMachine,
    composer: StickComposer,
    watchdog: SafetyWatchdog,
    arrival: ArrivalTimer,
    mode: GuidanceMode,
    gps: GpsGuidance,
    vision: VisionGuidance,
    manual: ManualGuidance,
    tunables: Tunables,
    last_tick: Option<Instant>,
    last_route_at: Option<Instant>,
    skipped_ticks: u64,
    last_error: Option<String>,
}

impl Core {
    fn new(config: &AutopilotConfig) -> Self {
        let tunables = config.tunables.validated();
        Self {
            phase: FlightPhaseMachine::new(),
            composer: StickComposer::new(tunables.stick_limits()),
            watchdog: SafetyWatchdog::new(config.safety_velocity_limit),
            arrival: ArrivalTimer::new(config.arrival_threshold_deg, config.arrival_dwell),
            mode: GuidanceMode::default(),
            gps: GpsGuidance::with_config(config),
            vision: VisionGuidance::with_config(config),
            manual: ManualGuidance::default(),
            tunables,
            last_tick: None,
            last_route_at: None,
            skipped_ticks: 0,
            last_error: None,
        }
    }

    fn law(&mut self, mode: GuidanceMode) -> &mut dyn GuidanceLaw {
        match mode {
            GuidanceMode::Gps => &mut self.gps,
            GuidanceMode::Vision => &mut self.vision,
            GuidanceMode::Manual => &mut self.manual,
        }
    }

    fn reset_guidance(&mut self) {
        self.gps.reset();
        self.vision.reset();
    }
}

/// The closed-loop control core for one aircraft session.
pub struct Autopilot {
    config: AutopilotConfig,
    session: Arc<VirtualStickSession>,
    telemetry: TelemetryReader,
    tracking: TrackingReader,
    route: RouteFeed,
    route_reader: RouteReader,
    core: Mutex<Core>,
    state_tx: watch::Sender<StateReport>,
}

impl Autopilot {
    /// Creates an autopilot in `Idle` with authority `Disabled`.
    pub fn new(
        config: AutopilotConfig,
        actuator: Arc<dyn Actuator>,
        telemetry: TelemetryReader,
        tracking: TrackingReader,
    ) -> Self {
        let session = Arc::new(VirtualStickSession::new(actuator));
        let (route, route_reader) = RouteFeed::new();
        let core = Core::new(&config);
        let (state_tx, _) = watch::channel(Self::report(&core, &session, &telemetry));

        Self {
            config,
            session,
            telemetry,
            tracking,
            route,
            route_reader,
            core: Mutex::new(core),
            state_tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn report(
        core: &Core,
        session: &VirtualStickSession,
        telemetry: &TelemetryReader,
    ) -> StateReport {
        StateReport {
            phase: core.phase.phase(),
            controls: core.composer.last(),
            telemetry: telemetry.snapshot(),
            authority: session.state(),
            authority_owner: session.owner(),
            authority_reason: session.last_reason(),
            guidance_mode: core.mode,
            tunables: core.tunables,
            arrival_pending: core.arrival.is_pending(),
            safety_tripped: core.watchdog.is_tripped(),
            skipped_ticks: core.skipped_ticks,
            last_error: core.last_error.clone(),
        }
    }

    fn publish(&self, core: &Core) {
        self.state_tx
            .send_replace(Self::report(core, &self.session, &self.telemetry));
    }

    /// The configuration this autopilot runs with.
    pub fn config(&self) -> &AutopilotConfig {
        &self.config
    }

    /// The virtual stick session.
    pub fn session(&self) -> &Arc<VirtualStickSession> {
        &self.session
    }

    /// Current flight phase.
    pub fn phase(&self) -> FlightPhase {
        self.lock().phase.phase()
    }

    /// Another reader on the route feed.
    pub fn route_reader(&self) -> RouteReader {
        self.route.reader()
    }

    /// Stream of diagnostic state.
    pub fn observe_state(&self) -> watch::Receiver<StateReport> {
        self.state_tx.subscribe()
    }

    fn after_transition(
        &self,
        core: &mut Core,
        transition: Transition,
        requests: &mut Vec<ActuationRequest>,
    ) {
        if transition.crosses_guidance() {
            core.reset_guidance();
            core.arrival.reset();
            core.last_route_at = self.route_reader.latest().map(|u| u.received_at);
        }
        match transition.to {
            FlightPhase::Landed | FlightPhase::Faulted => {
                core.arrival.reset();
                if matches!(
                    self.session.state(),
                    AuthorityState::Enabled | AuthorityState::Enabling
                ) {
                    requests.push(ActuationRequest::ReleaseAuthority);
                }
            }
            FlightPhase::Idle | FlightPhase::TakingOff => core.watchdog.rearm(),
            _ => {}
        }
    }

    fn engage_if_ready(&self, core: &mut Core, requests: &mut Vec<ActuationRequest>) {
        if core.phase.phase() != FlightPhase::Cruising
            || core.mode == GuidanceMode::Manual
            || self.session.state() != AuthorityState::Enabled
        {
            return;
        }
        if let Ok(transition) = core.phase.engage_guidance() {
            self.after_transition(core, transition, requests);
        }
    }

    fn disengage(&self, core: &mut Core, requests: &mut Vec<ActuationRequest>) {
        if let Ok(transition) = core.phase.disengage_guidance() {
            self.after_transition(core, transition, requests);
        }
    }

    fn handle_revocation(&self, core: &mut Core, requests: &mut Vec<ActuationRequest>) {
        let Some(reason) = self.session.take_revocation() else {
            return;
        };
        core.last_error = Some(format!("virtual stick authority revoked: {reason:?}"));
        if matches!(
            core.phase.phase(),
            FlightPhase::AutoFollowing | FlightPhase::ReturningHome
        ) {
            if let Some(transition) = core.phase.fault("virtual stick authority revoked") {
                self.after_transition(core, transition, requests);
            }
        }
    }

    fn force_landing(&self, core: &mut Core, requests: &mut Vec<ActuationRequest>) {
        core.composer.zero(&self.session);
        if let Ok(transition) = core.phase.begin_landing() {
            self.after_transition(core, transition, requests);
            requests.push(ActuationRequest::Land { forced: true });
        }
    }

    fn trigger_return_home(&self, core: &mut Core, requests: &mut Vec<ActuationRequest>) {
        core.composer.zero(&self.session);
        if let Ok(transition) = core.phase.begin_return_home() {
            self.after_transition(core, transition, requests);
            requests.push(ActuationRequest::ReturnHome);
        }
    }

    fn poll_arrival(&self, core: &mut Core, now: Instant) -> ArrivalEvent {
        if let Some(update) = self.route_reader.latest() {
            if core.last_route_at != Some(update.received_at) {
                core.last_route_at = Some(update.received_at);
                let event = core.arrival.on_route_update(
                    update.current,
                    update.destination,
                    update.received_at,
                );
                if event == ArrivalEvent::TriggerReturnHome {
                    return event;
                }
            }
        }
        core.arrival.poll(now)
    }

    /// One control loop iteration at `now`.
    ///
    /// Stale telemetry skips the tick entirely. Otherwise the phase machine
    /// observes the airborne flag, the watchdog and the arrival timer get
    /// their say, and the active guidance law writes one stick frame.
    pub fn tick(&self, now: Instant) -> Vec<ActuationRequest> {
        let snapshot = self.telemetry.snapshot();
        let mut requests = Vec::new();
        let mut core = self.lock();
        self.handle_revocation(&mut core, &mut requests);

        if snapshot.is_stale(now, self.config.telemetry_max_age) {
            core.skipped_ticks += 1;
            core.last_tick = None;
            tracing::debug!(age = ?snapshot.age(now), "telemetry stale, tick skipped");
            self.publish(&core);
            return requests;
        }

        if let Some(transition) = core.phase.observe_flying(snapshot.is_flying) {
            self.after_transition(&mut core, transition, &mut requests);
            if transition.to == FlightPhase::Cruising {
                self.engage_if_ready(&mut core, &mut requests);
            }
        }

        let phase = core.phase.phase();
        if let Some(SafetyAction::ForceLanding) = core.watchdog.check(phase, &snapshot) {
            self.force_landing(&mut core, &mut requests);
        }

        if core.phase.phase() == FlightPhase::AutoFollowing
            && self.poll_arrival(&mut core, now) == ArrivalEvent::TriggerReturnHome
        {
            self.trigger_return_home(&mut core, &mut requests);
        }

        let dt = core
            .last_tick
            .map(|last| now.saturating_duration_since(last))
            .unwrap_or(self.config.period)
            .as_secs_f64();
        core.last_tick = Some(now);

        let active = match core.phase.phase() {
            FlightPhase::AutoFollowing => Some(core.mode),
            FlightPhase::Cruising
                if core.mode == GuidanceMode::Manual
                    && self.session.state() == AuthorityState::Enabled =>
            {
                Some(GuidanceMode::Manual)
            }
            _ => None,
        };
        if let Some(mode) = active {
            let input = GuidanceInput {
                telemetry: &snapshot,
                tracking: self.tracking.latest(),
                route: self.route_reader.latest(),
                dt,
                now,
            };
            let tunables = core.tunables;
            match core.law(mode).control(&input, &tunables) {
                Some(intent) => {
                    core.composer.write(intent, &self.session);
                }
                None => {
                    core.skipped_ticks += 1;
                    tracing::debug!(?mode, "no fresh guidance input, tick skipped");
                }
            }
        }

        self.publish(&core);
        requests
    }

    async fn execute(&self, request: ActuationRequest) -> Result<(), ActuationError> {
        tracing::debug!(?request, "dispatching actuation request");
        let actuator = self.session.actuator();
        match request {
            ActuationRequest::Takeoff => actuator.takeoff().await,
            ActuationRequest::Land { .. } => actuator.land().await,
            ActuationRequest::ReturnHome => actuator.return_home().await,
            ActuationRequest::ReleaseAuthority => self.session.disable().await,
        }
    }

    fn apply_outcome(
        &self,
        request: ActuationRequest,
        result: &Result<(), ActuationError>,
    ) -> Vec<ActuationRequest> {
        let mut requests = Vec::new();
        let mut core = self.lock();
        if let Err(err) = result {
            tracing::error!(?request, %err, "actuation request failed");
            core.last_error = Some(err.to_string());
        }

        let transition = match (request, result) {
            (ActuationRequest::Takeoff, Err(_)) => core.phase.takeoff_failed(),
            (ActuationRequest::Land { forced }, Err(_)) => core.phase.landing_failed(forced),
            (ActuationRequest::ReturnHome, result) => {
                core.phase.return_home_resolved(result.is_ok())
            }
            (ActuationRequest::ReleaseAuthority, Err(ActuationError::Rejected { .. })) => {
                core.phase.fault("virtual stick release failed")
            }
            _ => None,
        };
        if let Some(transition) = transition {
            self.after_transition(&mut core, transition, &mut requests);
        }

        self.publish(&core);
        requests
    }

    /// Runs requests to completion, feeding each result back and running
    /// whatever follow-up requests that produces.
    pub async fn settle(&self, requests: Vec<ActuationRequest>) {
        let mut pending: VecDeque<ActuationRequest> = requests.into();
        while let Some(request) = pending.pop_front() {
            let result = self.execute(request).await;
            pending.extend(self.apply_outcome(request, &result));
        }
    }

    async fn run(&self, request: ActuationRequest) -> Result<(), FlightError> {
        let result = self.execute(request).await;
        let follow_up = self.apply_outcome(request, &result);
        self.settle(follow_up).await;
        Ok(result?)
    }

    /// Takes off, provided the aircraft is connected and on the ground.
    pub async fn start_take_off(&self) -> Result<(), FlightError> {
        {
            let snapshot = self.telemetry.snapshot();
            let mut core = self.lock();
            let transition = core.phase.request_takeoff(&snapshot).map_err(|err| {
                tracing::warn!(%err, "takeoff refused");
                err
            })?;
            let mut requests = Vec::new();
            self.after_transition(&mut core, transition, &mut requests);
            debug_assert!(requests.is_empty(), "takeoff produced {requests:?}");
            self.publish(&core);
        }
        self.run(ActuationRequest::Takeoff).await
    }

    /// Centres the sticks and lands.
    ///
    /// A rejected landing is retried up to `landing_attempts` times,
    /// `landing_retry_delay` apart, for as long as the flight is still
    /// `Landing`.
    pub async fn start_landing(&self) -> Result<(), FlightError> {
        let requests = {
            let mut core = self.lock();
            let transition = core.phase.begin_landing()?;
            core.composer.zero(&self.session);
            let mut requests = Vec::new();
            self.after_transition(&mut core, transition, &mut requests);
            self.publish(&core);
            requests
        };
        self.settle(requests).await;

        let request = ActuationRequest::Land { forced: false };
        let mut attempt = 1;
        let result = loop {
            let result = self.execute(request).await;
            if let Err(err) = &result {
                if attempt < self.config.landing_attempts
                    && self.phase() == FlightPhase::Landing
                {
                    tracing::warn!(%err, attempt, "landing rejected, retrying");
                    attempt += 1;
                    tokio::time::sleep(self.config.landing_retry_delay).await;
                    continue;
                }
            }
            break result;
        };
        let follow_up = self.apply_outcome(request, &result);
        self.settle(follow_up).await;
        Ok(result?)
    }

    /// Acquires virtual stick authority and, when cruising with an
    /// automatic guidance mode, engages guidance.
    pub async fn enable_virtual_stick_mode(&self) -> Result<(), FlightError> {
        let result = self.session.enable().await;
        let mut core = self.lock();
        let mut requests = Vec::new();
        match &result {
            Ok(()) => self.engage_if_ready(&mut core, &mut requests),
            Err(err) => core.last_error = Some(err.to_string()),
        }
        debug_assert!(requests.is_empty(), "engage produced {requests:?}");
        self.publish(&core);
        Ok(result?)
    }

    /// Disengages guidance, centres the sticks and releases authority.
    pub async fn disable_virtual_stick_mode(&self) -> Result<(), FlightError> {
        {
            let mut core = self.lock();
            let mut requests = Vec::new();
            self.disengage(&mut core, &mut requests);
            debug_assert!(requests.is_empty(), "disengage produced {requests:?}");
            core.composer.zero(&self.session);
            self.publish(&core);
        }
        let result = self.session.disable().await;
        let mut core = self.lock();
        if let Err(err) = &result {
            core.last_error = Some(err.to_string());
        }
        self.publish(&core);
        Ok(result?)
    }

    /// Switches the guidance source, discarding controller state.
    pub fn set_guidance_mode(&self, mode: GuidanceMode) {
        let mut core = self.lock();
        if core.mode == mode {
            return;
        }
        tracing::info!(from = ?core.mode, to = ?mode, "guidance mode changed");
        core.mode = mode;
        core.reset_guidance();
        core.manual.reset();

        let mut requests = Vec::new();
        if mode == GuidanceMode::Manual {
            self.disengage(&mut core, &mut requests);
        } else {
            self.engage_if_ready(&mut core, &mut requests);
        }
        debug_assert!(requests.is_empty(), "mode switch produced {requests:?}");
        self.publish(&core);
    }

    /// Replaces the tunables, returning the validated values in effect.
    pub fn update_tunables(&self, tunables: Tunables) -> Tunables {
        let tunables = tunables.validated();
        let mut core = self.lock();
        core.tunables = tunables;
        core.composer.set_limits(tunables.stick_limits());
        tracing::info!(?tunables, "tunables updated");
        self.publish(&core);
        tunables
    }

    /// Sets the manual slider positions. Needs virtual stick authority.
    pub fn set_manual_sticks(&self, sticks: ManualSticks) -> Result<(), FlightError> {
        let authority = self.session.state();
        if authority != AuthorityState::Enabled {
            return Err(FlightError::AuthorityRequired(authority));
        }
        self.lock().manual.set(sticks);
        Ok(())
    }

    /// Handles one decoded route datagram.
    pub async fn handle_route_message(&self, message: RouteMessage) -> Result<(), FlightError> {
        match message {
            RouteMessage::Start => self.start_take_off().await,
            RouteMessage::Update {
                current,
                destination,
            } => {
                self.route.publish(RouteUpdate {
                    current,
                    destination,
                    received_at: Instant::now(),
                });
                Ok(())
            }
        }
    }

    /// Passive authority notification from the vendor SDK.
    pub fn on_authority_changed(&self, owner: AuthorityOwner, reason: AuthorityChangeReason) {
        self.session.on_authority_changed(owner, reason);
        let mut core = self.lock();
        let mut requests = Vec::new();
        self.handle_revocation(&mut core, &mut requests);
        debug_assert!(requests.is_empty(), "revocation produced {requests:?}");
        self.publish(&core);
    }

    /// `Faulted | Landed -> Idle`.
    pub fn dismiss_fault(&self) -> Result<(), FlightError> {
        let mut core = self.lock();
        let transition = core.phase.dismiss()?;
        let mut requests = Vec::new();
        self.after_transition(&mut core, transition, &mut requests);
        debug_assert!(requests.is_empty(), "dismiss produced {requests:?}");
        core.last_error = None;
        self.publish(&core);
        Ok(())
    }

    /// Cancels pending arrival, centres the sticks and releases authority.
    pub async fn shutdown(&self) {
        {
            let mut core = self.lock();
            let mut requests = Vec::new();
            self.disengage(&mut core, &mut requests);
            debug_assert!(requests.is_empty(), "disengage produced {requests:?}");
            core.arrival.reset();
            core.composer.zero(&self.session);
            self.publish(&core);
        }

        if self.session.state() != AuthorityState::Disabled {
            if let Err(err) = self.session.disable().await {
                tracing::error!(%err, "releasing virtual stick on shutdown failed");
                self.lock().last_error = Some(err.to_string());
            }
        }

        let core = self.lock();
        self.publish(&core);
        tracing::info!("autopilot shut down");
    }
}
