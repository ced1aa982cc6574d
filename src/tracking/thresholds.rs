use serde::Serialize;
use std::fmt;

/// Apparent target sizes (px) delimiting the comfortable follow distance.
///
/// Below `forward_px` the vehicle closes in, above `backward_px` it backs
/// off. Both values are kept within fixed bounds with a minimum gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ThresholdPair {
    forward_px: i32,
    backward_px: i32,
}

/// Reason a threshold update was refused. The current pair stays untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdError {
    ForwardOutOfRange { forward: i32 },
    BackwardOutOfRange { backward: i32 },
    NotOrdered { forward: i32, backward: i32 },
    GapTooSmall { gap: i32 },
}

impl fmt::Display for ThresholdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ForwardOutOfRange { forward } => write!(
                f,
                "forward threshold {forward}px outside [{}, {}]px",
                ThresholdPair::FORWARD_RANGE.0,
                ThresholdPair::FORWARD_RANGE.1
            ),
            Self::BackwardOutOfRange { backward } => write!(
                f,
                "backward threshold {backward}px outside [{}, {}]px",
                ThresholdPair::BACKWARD_RANGE.0,
                ThresholdPair::BACKWARD_RANGE.1
            ),
            Self::NotOrdered { forward, backward } => write!(
                f,
                "backward threshold {backward}px must be larger than forward threshold {forward}px"
            ),
            Self::GapTooSmall { gap } => write!(
                f,
                "gap of {gap}px between thresholds is below the minimum of {}px",
                ThresholdPair::MIN_GAP
            ),
        }
    }
}

impl std::error::Error for ThresholdError {}

impl ThresholdPair {
    pub const FORWARD_RANGE: (i32, i32) = (50, 200);
    pub const BACKWARD_RANGE: (i32, i32) = (75, 250);
    pub const MIN_GAP: i32 = 15;
    /// Step used by [`ThresholdPair::closer`] and [`ThresholdPair::farther`].
    pub const NUDGE_PX: i32 = 15;

    /// Creates a validated pair.
    ///
    /// # Errors
    /// Returns the first violated constraint.
    pub fn new(forward_px: i32, backward_px: i32) -> Result<Self, ThresholdError> {
        Self::validate(forward_px, backward_px)?;
        Ok(Self { forward_px, backward_px })
    }

    pub fn validate(forward: i32, backward: i32) -> Result<(), ThresholdError> {
        let (f_min, f_max) = Self::FORWARD_RANGE;
        let (b_min, b_max) = Self::BACKWARD_RANGE;
        if !(f_min..=f_max).contains(&forward) {
            return Err(ThresholdError::ForwardOutOfRange { forward });
        }
        if !(b_min..=b_max).contains(&backward) {
            return Err(ThresholdError::BackwardOutOfRange { backward });
        }
        if backward <= forward {
            return Err(ThresholdError::NotOrdered { forward, backward });
        }
        if backward - forward < Self::MIN_GAP {
            return Err(ThresholdError::GapTooSmall { gap: backward - forward });
        }
        Ok(())
    }

    pub fn forward_px(&self) -> i32 { self.forward_px }
    pub fn backward_px(&self) -> i32 { self.backward_px }

    /// Target size the vehicle settles at, halfway between both thresholds.
    #[allow(clippy::cast_precision_loss)]
    pub fn optimal_size(&self) -> f32 { (self.forward_px + self.backward_px) as f32 / 2.0 }

    /// Shifts both thresholds by `delta` pixels, keeping their gap.
    pub fn shifted(&self, delta: i32) -> Result<Self, ThresholdError> {
        Self::new(self.forward_px + delta, self.backward_px + delta)
    }

    /// Tuner vocabulary: "closer" lowers, "farther" raises both thresholds.
    pub fn closer(&self) -> Result<Self, ThresholdError> { self.shifted(-Self::NUDGE_PX) }

    pub fn farther(&self) -> Result<Self, ThresholdError> { self.shifted(Self::NUDGE_PX) }
}

impl fmt::Display for ThresholdPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "forward={}px backward={}px optimal={:.0}px",
            self.forward_px,
            self.backward_px,
            self.optimal_size()
        )
    }
}
