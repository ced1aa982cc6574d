use super::{
    command_dispatcher::{CommandDispatcher, DispatchError},
    pid_tracker::PidTracker,
    safety_monitor::{SafetyMonitor, SafetyVerdict, SafetyViolation},
    transport::{FlipDirection, MoveDirection, RcCommand, Rotation, TransportError, VehicleTransport},
    vehicle_command::VehicleCommand,
};
use crate::config::{DispatcherConfig, FollowConfig};
use crate::{error, event, info, log, warn};
use chrono::{DateTime, Utc};
use image::RgbImage;
use serde::Serialize;
use std::{
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use strum_macros::Display;
use tokio::time::{Instant, sleep};

#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum ActuatorError {
    NotConnected,
    NotFlying,
    NotStreaming,
    AlreadyFlying,
    Safety(SafetyViolation),
    Transport(TransportError),
    Dispatch(DispatchError),
}

impl std::error::Error for ActuatorError {}

impl From<TransportError> for ActuatorError {
    fn from(value: TransportError) -> Self { ActuatorError::Transport(value) }
}

impl From<DispatchError> for ActuatorError {
    fn from(value: DispatchError) -> Self {
        match value {
            DispatchError::Transport(e) => ActuatorError::Transport(e),
            other => ActuatorError::Dispatch(other),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct FlightStats {
    pub start_time: Option<DateTime<Utc>>,
    pub total_flight_secs: f64,
}

/// Point-in-time view of the vehicle, unreadable telemetry is `None`.
#[derive(Debug, Clone, Serialize)]
pub struct VehicleStatus {
    pub connected: bool,
    pub flying: bool,
    pub streaming: bool,
    pub battery: Option<u8>,
    pub height: Option<u16>,
    pub temperature: Option<i16>,
    pub flight_time: Option<u32>,
    pub total_commands: usize,
    pub total_flight_secs: f64,
}

/// Safety-gated facade over the vehicle link.
///
/// Every movement, rotation and RC command first passes the
/// [`SafetyMonitor`] and the flying-state check, then runs through the
/// [`CommandDispatcher`]. Failures come back as [`ActuatorError`] and are
/// never fatal for the caller.
pub struct VehicleActuator {
    transport: Arc<dyn VehicleTransport>,
    safety: SafetyMonitor,
    dispatcher_config: DispatcherConfig,
    dispatcher: Mutex<Option<Arc<CommandDispatcher>>>,
    connected: AtomicBool,
    flying: AtomicBool,
    streaming: AtomicBool,
    stats: Mutex<FlightStats>,
    tracker: Mutex<PidTracker>,
    takeoff_hop_cm: u16,
    takeoff_settle: Duration,
}

impl VehicleActuator {
    pub const MOVE_RANGE_CM: (u16, u16) = (20, 500);
    pub const ROTATE_RANGE_DEG: (u16, u16) = (1, 360);
    const STREAM_POLL: Duration = Duration::from_millis(100);
    const EMERGENCY_HOVER: Duration = Duration::from_millis(200);
    const EMERGENCY_DESCENT_STEPS: usize = 15;
    const EMERGENCY_DESCENT_SPEED: i32 = -80;
    const EMERGENCY_STEP: Duration = Duration::from_millis(100);

    pub fn new(transport: Arc<dyn VehicleTransport>, config: &FollowConfig) -> Self {
        Self {
            transport,
            safety: SafetyMonitor::new(config.safety),
            dispatcher_config: config.dispatcher,
            dispatcher: Mutex::new(None),
            connected: AtomicBool::new(false),
            flying: AtomicBool::new(false),
            streaming: AtomicBool::new(false),
            stats: Mutex::new(FlightStats::default()),
            tracker: Mutex::new(PidTracker::new()),
            takeoff_hop_cm: config.flight.takeoff_hop_cm,
            takeoff_settle: config.flight.takeoff_settle,
        }
    }

    pub fn is_connected(&self) -> bool { self.connected.load(Ordering::Acquire) }
    pub fn is_flying(&self) -> bool { self.flying.load(Ordering::Acquire) }
    pub fn is_streaming(&self) -> bool { self.streaming.load(Ordering::Acquire) }
    pub fn safety(&self) -> &SafetyMonitor { &self.safety }

    fn lock_stats(&self) -> MutexGuard<'_, FlightStats> {
        self.stats.lock().expect("[FATAL] Mutex poisoned: Failed to acquire flight stats")
    }

    fn lock_dispatcher(&self) -> MutexGuard<'_, Option<Arc<CommandDispatcher>>> {
        self.dispatcher.lock().expect("[FATAL] Mutex poisoned: Failed to acquire dispatcher")
    }

    fn dispatcher(&self) -> Result<Arc<CommandDispatcher>, ActuatorError> {
        self.lock_dispatcher().clone().ok_or(ActuatorError::Dispatch(DispatchError::Stopped))
    }

    async fn execute(&self, command: VehicleCommand) -> Result<(), ActuatorError> {
        Ok(self.dispatcher()?.execute(command).await?)
    }

    /// Connects to the vehicle and starts the command dispatcher.
    ///
    /// Connecting an already connected actuator is a no-op.
    pub async fn connect(&self) -> Result<(), ActuatorError> {
        if self.is_connected() {
            return Ok(());
        }
        if let Err(e) = self.transport.connect().await {
            error!("Failed to connect to vehicle: {e}");
            return Err(e.into());
        }
        self.connected.store(true, Ordering::Release);
        let battery = self.transport.battery().ok();
        let temp = self.transport.temperature().ok();
        info!("Connected to vehicle - Battery: {battery:?}%, Temp: {temp:?}°C");
        if battery.is_some_and(|b| b < self.safety.limits().min_battery()) {
            warn!("Low battery: {battery:?}%. Consider charging before flight.");
        }
        let dispatcher = CommandDispatcher::start(Arc::clone(&self.transport), self.dispatcher_config);
        *self.lock_dispatcher() = Some(Arc::new(dispatcher));
        Ok(())
    }

    /// Lands if needed, stops the video stream and the dispatcher.
    pub async fn disconnect(&self) {
        if self.is_flying() {
            info!("Landing before disconnect...");
            if let Err(e) = self.land().await {
                error!("Landing before disconnect failed: {e}");
            }
        }
        if self.is_streaming() {
            if let Err(e) = self.stream_off().await {
                warn!("Stopping stream before disconnect failed: {e}");
            }
        }
        let dispatcher = self.lock_dispatcher().take();
        if let Some(d) = dispatcher {
            d.shutdown().await;
        }
        self.connected.store(false, Ordering::Release);
        info!("Disconnected from vehicle.");
    }

    /// Runs the safety check before a command.
    ///
    /// A critical battery triggers a landing right here, before the
    /// caller's command could execute.
    pub async fn check_safety(&self) -> Result<SafetyVerdict, ActuatorError> {
        let connected = self.is_connected();
        let (battery, height) = if connected {
            (self.battery().ok(), self.height().ok())
        } else {
            (None, None)
        };
        let verdict = self.safety.check(connected, battery, height);
        if let SafetyVerdict::EmergencyLand(_) = verdict {
            if let Err(e) = self.land().await {
                error!("Forced landing failed: {e}");
            }
        }
        match verdict.violation() {
            Some(v) => Err(ActuatorError::Safety(v)),
            None => Ok(verdict),
        }
    }

    async fn ensure_flying_and_safe(&self) -> Result<(), ActuatorError> {
        if !self.is_flying() {
            return Err(ActuatorError::NotFlying);
        }
        self.check_safety().await.map(|_| ())
    }

    /// Takes off, then climbs a fixed hop and lets the vehicle settle.
    pub async fn takeoff(&self) -> Result<(), ActuatorError> {
        if self.is_flying() {
            return Err(ActuatorError::AlreadyFlying);
        }
        self.check_safety().await?;
        if let Err(e) = self.execute(VehicleCommand::Takeoff).await {
            error!("Takeoff failed: {e}");
            return Err(e);
        }
        self.flying.store(true, Ordering::Release);
        self.lock_stats().start_time = Some(Utc::now());
        if let Err(e) = self.execute(VehicleCommand::Move(MoveDirection::Up, self.takeoff_hop_cm)).await {
            error!("Post-takeoff climb failed: {e}");
            return Err(e);
        }
        info!("Vehicle took off.");
        sleep(self.takeoff_settle).await;
        Ok(())
    }

    /// Lands and books the flight time.
    pub async fn land(&self) -> Result<(), ActuatorError> {
        if !self.is_connected() {
            return Err(ActuatorError::NotConnected);
        }
        if let Err(e) = self.execute(VehicleCommand::Land).await {
            error!("Landing failed: {e}");
            return Err(e);
        }
        self.flying.store(false, Ordering::Release);
        self.book_flight_time();
        Ok(())
    }

    #[allow(clippy::cast_precision_loss)]
    fn book_flight_time(&self) {
        let mut stats = self.lock_stats();
        if let Some(start) = stats.start_time.take() {
            let secs = (Utc::now() - start).num_milliseconds() as f64 / 1000.0;
            stats.total_flight_secs += secs;
            info!("Vehicle landed. Flight time: {secs:.1}s");
        } else {
            info!("Vehicle landed.");
        }
    }

    /// Moves relative to the current position, distance clamped to `[20, 500]` cm.
    pub async fn move_by(&self, direction: MoveDirection, cm: u16) -> Result<(), ActuatorError> {
        self.ensure_flying_and_safe().await?;
        let (lo, hi) = Self::MOVE_RANGE_CM;
        let cm = cm.clamp(lo, hi);
        match self.execute(VehicleCommand::Move(direction, cm)).await {
            Ok(()) => {
                log!("Moved {direction} {cm}cm");
                Ok(())
            }
            Err(e) => {
                error!("Move {direction} failed: {e}");
                Err(e)
            }
        }
    }

    /// Rotates in place, angle clamped to `[1, 360]` degrees.
    pub async fn rotate(&self, rotation: Rotation, degrees: u16) -> Result<(), ActuatorError> {
        self.ensure_flying_and_safe().await?;
        let (lo, hi) = Self::ROTATE_RANGE_DEG;
        let degrees = degrees.clamp(lo, hi);
        match self.execute(VehicleCommand::Rotate(rotation, degrees)).await {
            Ok(()) => {
                log!("Rotated {rotation} {degrees}°");
                Ok(())
            }
            Err(e) => {
                error!("Rotate failed: {e}");
                Err(e)
            }
        }
    }

    pub async fn flip(&self, direction: FlipDirection) -> Result<(), ActuatorError> {
        self.ensure_flying_and_safe().await?;
        self.execute(VehicleCommand::Flip(direction)).await.inspect(|_| log!("Performed flip {direction}"))
    }

    /// Sends a continuous stick command, every axis clamped to `[-100, 100]`.
    pub async fn send_rc(
        &self,
        left_right: i32,
        forward_back: i32,
        up_down: i32,
        yaw: i32,
    ) -> Result<(), ActuatorError> {
        self.ensure_flying_and_safe().await?;
        let rc = RcCommand::clamped(left_right, forward_back, up_down, yaw);
        self.execute(VehicleCommand::Rc(rc)).await.inspect_err(|e| error!("RC control failed: {e}"))
    }

    /// Queues an RC command without waiting for it. An RC command still
    /// waiting in the dispatcher queue is replaced, so the vehicle always
    /// receives the most recent velocity.
    ///
    /// # Returns
    /// `Ok(true)` if a stale RC command was superseded.
    pub async fn send_latest_rc(&self, rc: RcCommand) -> Result<bool, ActuatorError> {
        self.ensure_flying_and_safe().await?;
        let superseded = self.dispatcher()?.dispatch_latest_rc(rc)?;
        if superseded {
            event!("Superseded queued RC command with {rc}");
        }
        Ok(superseded)
    }

    /// Stops all movement and holds position.
    pub async fn hover(&self) -> Result<(), ActuatorError> { self.send_rc(0, 0, 0, 0).await }

    /// Re-centres a target given in normalised frame coordinates with
    /// discrete PID-scaled moves.
    ///
    /// # Returns
    /// `Ok(true)` if moves were issued, `Ok(false)` during cooldown or when
    /// the target is already centred.
    pub async fn track_target(
        &self,
        target_x: f32,
        target_y: f32,
        target_z: Option<f32>,
    ) -> Result<bool, ActuatorError> {
        self.ensure_flying_and_safe().await?;
        let plan = self
            .tracker
            .lock()
            .expect("[FATAL] Mutex poisoned: Failed to acquire PID tracker")
            .plan(target_x, target_y, target_z, Instant::now());
        let Some(moves) = plan else { return Ok(false) };
        for (direction, cm) in moves {
            if let Err(e) = self.move_by(direction, cm).await {
                warn!("Tracking move {direction} {cm}cm skipped: {e}");
            }
        }
        Ok(true)
    }

    pub fn reset_tracking(&self) {
        self.tracker.lock().expect("[FATAL] Mutex poisoned: Failed to acquire PID tracker").reset();
        info!("Tracking controllers reset.");
    }

    pub fn battery(&self) -> Result<u8, ActuatorError> { self.telemetry("battery", |t| t.battery()) }
    pub fn height(&self) -> Result<u16, ActuatorError> { self.telemetry("height", |t| t.height()) }
    pub fn temperature(&self) -> Result<i16, ActuatorError> {
        self.telemetry("temperature", |t| t.temperature())
    }
    pub fn flight_time(&self) -> Result<u32, ActuatorError> {
        self.telemetry("flight time", |t| t.flight_time())
    }

    fn telemetry<T, F>(&self, what: &str, read: F) -> Result<T, ActuatorError>
    where F: FnOnce(&dyn VehicleTransport) -> Result<T, TransportError> {
        if !self.is_connected() {
            return Err(ActuatorError::NotConnected);
        }
        read(self.transport.as_ref()).map_err(|e| {
            error!("Failed to get {what}: {e}");
            e.into()
        })
    }

    pub fn commands_executed(&self) -> usize {
        self.lock_dispatcher().as_ref().map_or(0, |d| d.executed())
    }

    pub fn flight_stats(&self) -> FlightStats { *self.lock_stats() }

    pub fn status(&self) -> VehicleStatus {
        VehicleStatus {
            connected: self.is_connected(),
            flying: self.is_flying(),
            streaming: self.is_streaming(),
            battery: self.battery().ok(),
            height: self.height().ok(),
            temperature: self.temperature().ok(),
            flight_time: self.flight_time().ok(),
            total_commands: self.commands_executed(),
            total_flight_secs: self.flight_stats().total_flight_secs,
        }
    }

    /// Cuts the motors immediately, bypassing the command queue.
    ///
    /// Always attempted, whatever the connection and flying state.
    pub async fn emergency_stop(&self) {
        match self.transport.emergency().await {
            Ok(()) => {
                self.flying.store(false, Ordering::Release);
                warn!("EMERGENCY STOP ACTIVATED - MOTORS CUT");
            }
            Err(e) => error!("Emergency stop failed: {e}"),
        }
    }

    /// Rapid controlled descent followed by a normal landing.
    ///
    /// Hovers briefly, commands a strong sink rate for about 1.5 s and then
    /// lands. If any step fails the motors are cut via
    /// [`VehicleActuator::emergency_stop`].
    pub async fn emergency_land(&self) -> Result<(), ActuatorError> {
        if !self.is_flying() {
            return Err(ActuatorError::NotFlying);
        }
        warn!("EMERGENCY LANDING - RAPID DESCENT");
        match self.rapid_descent().await {
            Ok(()) => Ok(()),
            Err(e) => {
                error!("Emergency land failed, using emergency stop: {e}");
                self.emergency_stop().await;
                Err(e)
            }
        }
    }

    async fn rapid_descent(&self) -> Result<(), ActuatorError> {
        // Descent commands are the safety action itself and skip the safety gate.
        self.execute(VehicleCommand::Rc(RcCommand::HOVER)).await?;
        sleep(Self::EMERGENCY_HOVER).await;
        let dispatcher = self.dispatcher()?;
        let sink = RcCommand::clamped(0, 0, Self::EMERGENCY_DESCENT_SPEED, 0);
        for _ in 0..Self::EMERGENCY_DESCENT_STEPS {
            dispatcher.dispatch(VehicleCommand::Rc(sink))?;
            sleep(Self::EMERGENCY_STEP).await;
        }
        self.land().await
    }

    pub async fn stream_on(&self) -> Result<(), ActuatorError> {
        if !self.is_connected() {
            return Err(ActuatorError::NotConnected);
        }
        self.execute(VehicleCommand::StreamOn)
            .await
            .inspect_err(|e| error!("Failed to start stream: {e}"))?;
        self.streaming.store(true, Ordering::Release);
        info!("Video stream started.");
        Ok(())
    }

    pub async fn stream_off(&self) -> Result<(), ActuatorError> {
        if !self.is_connected() {
            return Err(ActuatorError::NotConnected);
        }
        self.execute(VehicleCommand::StreamOff)
            .await
            .inspect_err(|e| error!("Failed to stop stream: {e}"))?;
        self.streaming.store(false, Ordering::Release);
        info!("Video stream stopped.");
        Ok(())
    }

    /// Latest camera frame, `None` if unavailable for any reason.
    pub fn get_frame(&self) -> Option<RgbImage> {
        if !self.is_connected() || !self.is_streaming() {
            return None;
        }
        match self.transport.read_frame() {
            Ok(frame) => frame,
            Err(e) => {
                event!("Failed to get frame: {e}");
                None
            }
        }
    }

    /// Polls for a first frame every 100 ms until `timeout` elapses.
    pub async fn wait_for_stream(&self, timeout: Duration) -> bool {
        if !self.is_streaming() {
            warn!("Stream not started.");
            return false;
        }
        info!("Waiting for video stream to be ready...");
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.get_frame().is_some() {
                info!("Video stream ready!");
                return true;
            }
            sleep(Self::STREAM_POLL).await;
        }
        error!("Video stream failed to start within {}s.", timeout.as_secs_f32());
        false
    }
}
