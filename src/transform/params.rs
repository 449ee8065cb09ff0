use crate::commands::CommandSet;
use std::fmt;
use std::str::FromStr;

/// Upper bound for requested output dimensions.
pub const MAX_DIMENSION: u32 = 8192;

/// How a resize fits the source into the requested box
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum ResizeMode {
    /// Fill the box exactly, cropping the overflow (center anchored).
    #[default]
    Crop,
    /// Fit within the box, preserving aspect ratio.
    Max,
    /// Fill the box exactly, ignoring aspect ratio.
    Stretch,
}

impl fmt::Display for ResizeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResizeMode::Crop => write!(f, "crop"),
            ResizeMode::Max => write!(f, "max"),
            ResizeMode::Stretch => write!(f, "stretch"),
        }
    }
}

impl FromStr for ResizeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "crop" => Ok(ResizeMode::Crop),
            "max" => Ok(ResizeMode::Max),
            "stretch" => Ok(ResizeMode::Stretch),
            _ => Err(format!("Invalid resize mode: {}", s)),
        }
    }
}

/// Resize parameters read from `width`, `height` and `rmode` commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResizeParams {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub mode: ResizeMode,
}

impl ResizeParams {
    /// Zero, negative and non-numeric dimensions are treated as absent;
    /// oversized ones are clamped to [`MAX_DIMENSION`].
    pub fn from_commands(commands: &CommandSet) -> Self {
        let dim = |name| {
            commands
                .parse::<u32>(name)
                .filter(|v| *v > 0)
                .map(|v| v.min(MAX_DIMENSION))
        };
        Self {
            width: dim("width"),
            height: dim("height"),
            mode: commands.parse("rmode").unwrap_or_default(),
        }
    }
}
