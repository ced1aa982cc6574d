use serde::Serialize;
use strum_macros::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Horizontal {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Vertical {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Depth {
    Forward,
    Backward,
}

/// Where the target sits relative to the deadzone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lateral {
    /// Inside the deadzone, no lateral or vertical correction.
    Centered,
    /// Outside the deadzone, with at most one correction per axis.
    Offset { horizontal: Option<Horizontal>, vertical: Option<Vertical> },
}

/// Directional intent derived from a single processed frame.
///
/// At most one horizontal, one vertical and one depth variant can be active,
/// and a centered target carries no horizontal or vertical component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DirectionIntent {
    lateral: Lateral,
    depth: Option<Depth>,
}

impl DirectionIntent {
    pub fn centered(depth: Option<Depth>) -> Self { Self { lateral: Lateral::Centered, depth } }

    pub fn offset(
        horizontal: Option<Horizontal>,
        vertical: Option<Vertical>,
        depth: Option<Depth>,
    ) -> Self {
        Self { lateral: Lateral::Offset { horizontal, vertical }, depth }
    }

    pub fn lateral(&self) -> Lateral { self.lateral }
    pub fn depth(&self) -> Option<Depth> { self.depth }
    pub fn is_centered(&self) -> bool { matches!(self.lateral, Lateral::Centered) }

    pub fn horizontal(&self) -> Option<Horizontal> {
        match self.lateral {
            Lateral::Centered => None,
            Lateral::Offset { horizontal, .. } => horizontal,
        }
    }

    pub fn vertical(&self) -> Option<Vertical> {
        match self.lateral {
            Lateral::Centered => None,
            Lateral::Offset { vertical, .. } => vertical,
        }
    }
}

impl std::fmt::Display for DirectionIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts: Vec<String> = Vec::with_capacity(3);
        match self.lateral {
            Lateral::Centered => parts.push("Centered".into()),
            Lateral::Offset { horizontal, vertical } => {
                parts.extend(horizontal.map(|h| h.to_string()));
                parts.extend(vertical.map(|v| v.to_string()));
            }
        }
        parts.extend(self.depth.map(|d| d.to_string()));
        if parts.is_empty() {
            write!(f, "Hold")
        } else {
            write!(f, "{}", parts.join("+"))
        }
    }
}

/// Flat boolean view of a [`DirectionIntent`] for status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DirectionFlags {
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
    pub center: bool,
}

impl From<Option<DirectionIntent>> for DirectionFlags {
    fn from(intent: Option<DirectionIntent>) -> Self {
        let Some(intent) = intent else { return Self::default() };
        Self {
            forward: intent.depth == Some(Depth::Forward),
            backward: intent.depth == Some(Depth::Backward),
            left: intent.horizontal() == Some(Horizontal::Left),
            right: intent.horizontal() == Some(Horizontal::Right),
            up: intent.vertical() == Some(Vertical::Up),
            down: intent.vertical() == Some(Vertical::Down),
            center: intent.is_centered(),
        }
    }
}
