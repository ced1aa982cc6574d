use super::transport::{FlipDirection, MoveDirection, RcCommand, Rotation, TransportError, VehicleTransport};
use strum_macros::{Display, EnumDiscriminants};

/// A single queued vehicle operation and its arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumDiscriminants)]
#[strum_discriminants(name(CommandKind), derive(Hash, Display))]
pub enum VehicleCommand {
    Takeoff,
    Land,
    Move(MoveDirection, u16),
    Rotate(Rotation, u16),
    Flip(FlipDirection),
    Rc(RcCommand),
    StreamOn,
    StreamOff,
}

impl VehicleCommand {
    /// Executes the command on the link.
    pub async fn apply(self, transport: &dyn VehicleTransport) -> Result<(), TransportError> {
        match self {
            VehicleCommand::Takeoff => transport.takeoff().await,
            VehicleCommand::Land => transport.land().await,
            VehicleCommand::Move(dir, cm) => transport.move_by(dir, cm).await,
            VehicleCommand::Rotate(rot, deg) => transport.rotate(rot, deg).await,
            VehicleCommand::Flip(dir) => transport.flip(dir).await,
            VehicleCommand::Rc(rc) => transport.send_rc(rc).await,
            VehicleCommand::StreamOn => transport.stream_on().await,
            VehicleCommand::StreamOff => transport.stream_off().await,
        }
    }

    pub fn kind(&self) -> CommandKind { CommandKind::from(self) }
}
