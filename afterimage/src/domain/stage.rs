//! Display filter stages

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Filter phase of the display pipeline
///
/// `Start` and `End` are sentinels around the three filter stages. Degrading
/// walks forward through [`DisplayStage::next`], restoring walks back through
/// [`DisplayStage::previous`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisplayStage {
    #[default]
    Start,
    BlackWhite,
    Blurry,
    Lightness,
    End,
}

impl DisplayStage {
    /// Stages in degrade order
    pub const ORDER: [DisplayStage; 5] = [
        DisplayStage::Start,
        DisplayStage::BlackWhite,
        DisplayStage::Blurry,
        DisplayStage::Lightness,
        DisplayStage::End,
    ];

    /// Next stage when degrading; `End` stays at `End`
    pub fn next(self) -> Self {
        match self {
            Self::Start => Self::BlackWhite,
            Self::BlackWhite => Self::Blurry,
            Self::Blurry => Self::Lightness,
            Self::Lightness | Self::End => Self::End,
        }
    }

    /// Previous stage when restoring; `Start` stays at `Start`
    pub fn previous(self) -> Self {
        match self {
            Self::Start | Self::BlackWhite => Self::Start,
            Self::Blurry => Self::BlackWhite,
            Self::Lightness => Self::Blurry,
            Self::End => Self::Lightness,
        }
    }

    /// True for the three stages that carry a filter
    pub fn is_filter(self) -> bool {
        matches!(self, Self::BlackWhite | Self::Blurry | Self::Lightness)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "START",
            Self::BlackWhite => "BLACK_WHITE",
            Self::Blurry => "BLURRY",
            Self::Lightness => "LIGHTNESS",
            Self::End => "END",
        }
    }
}

impl fmt::Display for DisplayStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DisplayStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ORDER
            .into_iter()
            .find(|stage| stage.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown display stage '{}'", s))
    }
}
