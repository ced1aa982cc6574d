use async_trait::async_trait;
use image::RgbImage;
use strum_macros::Display;

/// Failures reported by the low-level vehicle link.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum TransportError {
    NotConnected,
    Timeout,
    /// The vehicle answered with an error message.
    Rejected(String),
    /// The link itself failed (socket closed, decode error, ...).
    Link(String),
}

impl std::error::Error for TransportError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum MoveDirection {
    Up,
    Down,
    Left,
    Right,
    Forward,
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Rotation {
    Clockwise,
    CounterClockwise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum FlipDirection {
    Left,
    Right,
    Forward,
    Back,
}

impl TryFrom<char> for FlipDirection {
    type Error = char;

    fn try_from(value: char) -> Result<Self, Self::Error> {
        match value.to_ascii_lowercase() {
            'l' => Ok(FlipDirection::Left),
            'r' => Ok(FlipDirection::Right),
            'f' => Ok(FlipDirection::Forward),
            'b' => Ok(FlipDirection::Back),
            other => Err(other),
        }
    }
}

/// Continuous four-axis stick command, every axis in `[-100, 100]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RcCommand {
    pub left_right: i8,
    pub forward_back: i8,
    pub up_down: i8,
    pub yaw: i8,
}

impl RcCommand {
    pub const HOVER: RcCommand = RcCommand { left_right: 0, forward_back: 0, up_down: 0, yaw: 0 };

    /// Builds a command, clamping every axis into `[-100, 100]`.
    #[allow(clippy::cast_possible_truncation)]
    pub fn clamped(left_right: i32, forward_back: i32, up_down: i32, yaw: i32) -> Self {
        let c = |v: i32| v.clamp(-100, 100) as i8;
        Self { left_right: c(left_right), forward_back: c(forward_back), up_down: c(up_down), yaw: c(yaw) }
    }

    pub fn is_hover(&self) -> bool { *self == Self::HOVER }
}

impl std::fmt::Display for RcCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "rc(lr={}, fb={}, ud={}, yaw={})",
            self.left_right, self.forward_back, self.up_down, self.yaw
        )
    }
}

/// The vehicle link as seen by the actuator.
///
/// Command methods may take a while to be acknowledged. Telemetry getters
/// read the most recent state report and return immediately.
#[async_trait]
pub trait VehicleTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    async fn takeoff(&self) -> Result<(), TransportError>;
    async fn land(&self) -> Result<(), TransportError>;
    /// Cuts all motors immediately.
    async fn emergency(&self) -> Result<(), TransportError>;
    async fn move_by(&self, direction: MoveDirection, cm: u16) -> Result<(), TransportError>;
    async fn rotate(&self, rotation: Rotation, degrees: u16) -> Result<(), TransportError>;
    async fn flip(&self, direction: FlipDirection) -> Result<(), TransportError>;
    async fn send_rc(&self, rc: RcCommand) -> Result<(), TransportError>;
    async fn stream_on(&self) -> Result<(), TransportError>;
    async fn stream_off(&self) -> Result<(), TransportError>;

    /// Battery charge in percent.
    fn battery(&self) -> Result<u8, TransportError>;
    /// Height above take-off point in cm.
    fn height(&self) -> Result<u16, TransportError>;
    /// Temperature in °C.
    fn temperature(&self) -> Result<i16, TransportError>;
    /// Motor-on time in seconds.
    fn flight_time(&self) -> Result<u32, TransportError>;
    /// Latest decoded video frame, `None` until the stream delivers one.
    fn read_frame(&self) -> Result<Option<RgbImage>, TransportError>;
}
