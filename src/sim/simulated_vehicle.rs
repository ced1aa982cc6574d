use crate::flight_control::{
    CommandKind, FlipDirection, MoveDirection, RcCommand, Rotation, TransportError, VehicleCommand,
    VehicleTransport,
};
use async_trait::async_trait;
use image::{Rgb, RgbImage};
use rand::Rng;
use std::{
    collections::{HashSet, VecDeque},
    sync::{Mutex, MutexGuard},
    time::Duration,
};
use tokio::time::Instant;

/// Failure modes that can be switched on in a [`SimulatedVehicle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimFault {
    /// `connect` fails with a link error.
    Connect,
    /// The video stream never delivers frames.
    NoFrames,
    /// Telemetry reads fail.
    Telemetry,
    /// Every command of this kind is rejected.
    Command(CommandKind),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimSettings {
    pub frame_width: u32,
    pub frame_height: u32,
    /// Time each command takes on the simulated link.
    pub command_latency: Duration,
    pub battery: u8,
    /// Height reached by the takeoff command itself.
    pub takeoff_height: u16,
    /// Initial target offset from the frame centre and apparent size in pixels.
    pub target: (f32, f32, f32),
    /// Uniform noise on the rendered target centre, in pixels.
    pub jitter_px: f32,
}

impl Default for SimSettings {
    fn default() -> Self {
        Self {
            frame_width: 320,
            frame_height: 240,
            command_latency: Duration::from_millis(20),
            battery: 87,
            takeoff_height: 80,
            target: (60.0, -30.0, 70.0),
            jitter_px: 1.5,
        }
    }
}

#[derive(Debug)]
struct SimState {
    connected: bool,
    flying: bool,
    streaming: bool,
    battery: u8,
    height: u16,
    airborne_since: Option<Instant>,
    target_dx: f32,
    target_dy: f32,
    target_size: f32,
    target_visible: bool,
    faults: HashSet<SimFault>,
    commands: VecDeque<VehicleCommand>,
    emergency_stops: usize,
}

/// In-process vehicle with a single red target in front of its camera.
///
/// RC and move commands shift the rendered target the way a real vehicle
/// motion would: yaw and lateral moves shift it sideways, climbing moves it
/// down in the image and flying forward makes it larger.
#[derive(Debug)]
pub struct SimulatedVehicle {
    settings: SimSettings,
    state: Mutex<SimState>,
}

impl SimulatedVehicle {
    /// Oldest commands are evicted from the log beyond this many entries.
    pub const COMMAND_LOG_CAPACITY: usize = 512;
    /// Image shift per unit of RC yaw and per tick.
    const YAW_GAIN: f32 = 0.4;
    const CLIMB_GAIN: f32 = 0.4;
    const APPROACH_GAIN: f32 = 0.15;
    const PX_PER_CM: f32 = 0.8;
    const PX_PER_DEG: f32 = 4.0;
    const MIN_TARGET_SIZE: f32 = 8.0;
    const MAX_TARGET_SIZE: f32 = 230.0;
    const BACKGROUND: Rgb<u8> = Rgb([96, 110, 96]);
    const TARGET_COLOR: Rgb<u8> = Rgb([220, 30, 30]);

    pub fn new(settings: SimSettings) -> Self {
        let (dx, dy, size) = settings.target;
        let state = SimState {
            connected: false,
            flying: false,
            streaming: false,
            battery: settings.battery,
            height: 0,
            airborne_since: None,
            target_dx: dx,
            target_dy: dy,
            target_size: size,
            target_visible: true,
            faults: HashSet::new(),
            commands: VecDeque::with_capacity(Self::COMMAND_LOG_CAPACITY),
            emergency_stops: 0,
        };
        Self { settings, state: Mutex::new(state) }
    }

    fn lock_state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().expect("[FATAL] Mutex poisoned: Failed to acquire simulator state")
    }

    pub fn inject(&self, fault: SimFault) { self.lock_state().faults.insert(fault); }
    pub fn clear_fault(&self, fault: SimFault) { self.lock_state().faults.remove(&fault); }
    pub fn set_battery(&self, battery: u8) { self.lock_state().battery = battery; }
    pub fn set_height(&self, height: u16) { self.lock_state().height = height; }
    pub fn set_target_visible(&self, visible: bool) { self.lock_state().target_visible = visible; }

    pub fn place_target(&self, dx: f32, dy: f32, size: f32) {
        let mut state = self.lock_state();
        state.target_dx = dx;
        state.target_dy = dy;
        state.target_size = size;
    }

    /// Target offset from the frame centre and apparent size.
    pub fn target(&self) -> (f32, f32, f32) {
        let state = self.lock_state();
        (state.target_dx, state.target_dy, state.target_size)
    }

    /// The most recent commands the vehicle accepted or rejected, in arrival order.
    pub fn commands(&self) -> Vec<VehicleCommand> { self.lock_state().commands.iter().copied().collect() }
    pub fn emergency_stops(&self) -> usize { self.lock_state().emergency_stops }
    pub fn is_flying(&self) -> bool { self.lock_state().flying }

    async fn run_command(&self, command: VehicleCommand) -> Result<(), TransportError> {
        {
            let mut state = self.lock_state();
            if state.commands.len() == Self::COMMAND_LOG_CAPACITY {
                state.commands.pop_front();
            }
            state.commands.push_back(command);
            if !state.connected {
                return Err(TransportError::NotConnected);
            }
            if state.faults.contains(&SimFault::Command(command.kind())) {
                return Err(TransportError::Rejected(format!("injected failure for {command}")));
            }
            let needs_air = !matches!(
                command,
                VehicleCommand::Takeoff | VehicleCommand::Land | VehicleCommand::StreamOn | VehicleCommand::StreamOff
            );
            if needs_air && !state.flying {
                return Err(TransportError::Rejected(format!("{command} while grounded")));
            }
        }
        tokio::time::sleep(self.settings.command_latency).await;
        let mut state = self.lock_state();
        Self::apply(&mut state, command, self.settings.takeoff_height);
        Ok(())
    }

    fn apply(state: &mut SimState, command: VehicleCommand, takeoff_height: u16) {
        match command {
            VehicleCommand::Takeoff => {
                state.flying = true;
                state.height = takeoff_height;
                state.airborne_since = Some(Instant::now());
            }
            VehicleCommand::Land => {
                state.flying = false;
                state.height = 0;
                state.airborne_since = None;
            }
            VehicleCommand::Move(direction, cm) => Self::apply_move(state, direction, cm),
            VehicleCommand::Rotate(rotation, degrees) => {
                let shift = f32::from(degrees) * Self::PX_PER_DEG;
                match rotation {
                    Rotation::Clockwise => state.target_dx -= shift,
                    Rotation::CounterClockwise => state.target_dx += shift,
                }
            }
            VehicleCommand::StreamOn => state.streaming = true,
            VehicleCommand::StreamOff => state.streaming = false,
            VehicleCommand::Flip(_) => {}
            VehicleCommand::Rc(rc) => Self::apply_rc(state, rc),
        }
    }

    fn apply_move(state: &mut SimState, direction: MoveDirection, cm: u16) {
        let shift = f32::from(cm) * Self::PX_PER_CM;
        match direction {
            MoveDirection::Up => {
                state.height = state.height.saturating_add(cm);
                state.target_dy += shift;
            }
            MoveDirection::Down => {
                state.height = state.height.saturating_sub(cm);
                state.target_dy -= shift;
            }
            MoveDirection::Left => state.target_dx += shift,
            MoveDirection::Right => state.target_dx -= shift,
            MoveDirection::Forward => state.target_size += shift,
            MoveDirection::Back => state.target_size -= shift,
        }
        state.target_size = state.target_size.clamp(Self::MIN_TARGET_SIZE, Self::MAX_TARGET_SIZE);
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn apply_rc(state: &mut SimState, rc: RcCommand) {
        state.target_dx -= f32::from(rc.yaw) * Self::YAW_GAIN + f32::from(rc.left_right) * Self::YAW_GAIN;
        state.target_dy += f32::from(rc.up_down) * Self::CLIMB_GAIN;
        state.target_size = (state.target_size + f32::from(rc.forward_back) * Self::APPROACH_GAIN)
            .clamp(Self::MIN_TARGET_SIZE, Self::MAX_TARGET_SIZE);
        let climb = i32::from(rc.up_down) / 10;
        state.height = (i32::from(state.height) + climb).max(0) as u16;
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn render(&self, state: &SimState) -> RgbImage {
        let (w, h) = (self.settings.frame_width, self.settings.frame_height);
        let mut frame = RgbImage::from_pixel(w, h, Self::BACKGROUND);
        if !state.target_visible {
            return frame;
        }
        let (jx, jy) = if self.settings.jitter_px > 0.0 {
            let mut rng = rand::rng();
            let j = self.settings.jitter_px;
            (rng.random_range(-j..=j), rng.random_range(-j..=j))
        } else {
            (0.0, 0.0)
        };
        let cx = w as f32 / 2.0 + state.target_dx + jx;
        let cy = h as f32 / 2.0 + state.target_dy + jy;
        let r = state.target_size / 2.0;
        let x0 = (cx - r).floor().max(0.0) as u32;
        let y0 = (cy - r).floor().max(0.0) as u32;
        let x1 = ((cx + r).ceil().max(0.0) as u32).min(w);
        let y1 = ((cy + r).ceil().max(0.0) as u32).min(h);
        for y in y0..y1 {
            for x in x0..x1 {
                let (px, py) = (x as f32 + 0.5 - cx, y as f32 + 0.5 - cy);
                if px.hypot(py) <= r {
                    frame.put_pixel(x, y, Self::TARGET_COLOR);
                }
            }
        }
        frame
    }
}

impl Default for SimulatedVehicle {
    fn default() -> Self { Self::new(SimSettings::default()) }
}

#[async_trait]
impl VehicleTransport for SimulatedVehicle {
    async fn connect(&self) -> Result<(), TransportError> {
        let mut state = self.lock_state();
        if state.faults.contains(&SimFault::Connect) {
            return Err(TransportError::Link("no response from vehicle".to_string()));
        }
        state.connected = true;
        Ok(())
    }

    async fn takeoff(&self) -> Result<(), TransportError> { self.run_command(VehicleCommand::Takeoff).await }

    async fn land(&self) -> Result<(), TransportError> { self.run_command(VehicleCommand::Land).await }

    async fn emergency(&self) -> Result<(), TransportError> {
        let mut state = self.lock_state();
        state.emergency_stops += 1;
        state.flying = false;
        state.height = 0;
        state.airborne_since = None;
        Ok(())
    }

    async fn move_by(&self, direction: MoveDirection, cm: u16) -> Result<(), TransportError> {
        self.run_command(VehicleCommand::Move(direction, cm)).await
    }

    async fn rotate(&self, rotation: Rotation, degrees: u16) -> Result<(), TransportError> {
        self.run_command(VehicleCommand::Rotate(rotation, degrees)).await
    }

    async fn flip(&self, direction: FlipDirection) -> Result<(), TransportError> {
        self.run_command(VehicleCommand::Flip(direction)).await
    }

    async fn send_rc(&self, rc: RcCommand) -> Result<(), TransportError> {
        self.run_command(VehicleCommand::Rc(rc)).await
    }

    async fn stream_on(&self) -> Result<(), TransportError> { self.run_command(VehicleCommand::StreamOn).await }

    async fn stream_off(&self) -> Result<(), TransportError> {
        self.run_command(VehicleCommand::StreamOff).await
    }

    fn battery(&self) -> Result<u8, TransportError> { self.telemetry(|s| s.battery) }

    fn height(&self) -> Result<u16, TransportError> { self.telemetry(|s| s.height) }

    fn temperature(&self) -> Result<i16, TransportError> { self.telemetry(|_| 42) }

    #[allow(clippy::cast_possible_truncation)]
    fn flight_time(&self) -> Result<u32, TransportError> {
        self.telemetry(|s| s.airborne_since.map_or(0, |t| t.elapsed().as_secs() as u32))
    }

    fn read_frame(&self) -> Result<Option<RgbImage>, TransportError> {
        let state = self.lock_state();
        if !state.connected {
            return Err(TransportError::NotConnected);
        }
        if !state.streaming || state.faults.contains(&SimFault::NoFrames) {
            return Ok(None);
        }
        Ok(Some(self.render(&state)))
    }
}

impl SimulatedVehicle {
    fn telemetry<T>(&self, read: impl FnOnce(&SimState) -> T) -> Result<T, TransportError> {
        let state = self.lock_state();
        if !state.connected {
            return Err(TransportError::NotConnected);
        }
        if state.faults.contains(&SimFault::Telemetry) {
            return Err(TransportError::Timeout);
        }
        Ok(read(&state))
    }
}
