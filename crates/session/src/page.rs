//! Application pages and track types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// One of the seven workspace modes of the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Page {
    Media,
    Cut,
    Edit,
    Fusion,
    Color,
    Fairlight,
    Deliver,
}

impl Page {
    pub const ALL: [Page; 7] = [
        Page::Media,
        Page::Cut,
        Page::Edit,
        Page::Fusion,
        Page::Color,
        Page::Fairlight,
        Page::Deliver,
    ];

    /// Canonical lowercase name, as the scripting API expects it.
    pub fn as_str(self) -> &'static str {
        match self {
            Page::Media => "media",
            Page::Cut => "cut",
            Page::Edit => "edit",
            Page::Fusion => "fusion",
            Page::Color => "color",
            Page::Fairlight => "fairlight",
            Page::Deliver => "deliver",
        }
    }
}

impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Page {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        Page::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(needle))
            .ok_or_else(|| ParseEnumError::new(s, &Page::ALL.map(Page::as_str)))
    }
}

/// Kind of timeline track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackType {
    Video,
    Audio,
    Subtitle,
}

impl TrackType {
    pub const ALL: [TrackType; 3] = [TrackType::Video, TrackType::Audio, TrackType::Subtitle];

    pub fn as_str(self) -> &'static str {
        match self {
            TrackType::Video => "video",
            TrackType::Audio => "audio",
            TrackType::Subtitle => "subtitle",
        }
    }
}

impl fmt::Display for TrackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrackType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        TrackType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(needle))
            .ok_or_else(|| ParseEnumError::new(s, &TrackType::ALL.map(TrackType::as_str)))
    }
}

/// A string did not name a member of a fixed enum.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("'{value}' is not one of: {}", .expected.join(", "))]
pub struct ParseEnumError {
    pub value: String,
    pub expected: Vec<&'static str>,
}

impl ParseEnumError {
    fn new(value: &str, expected: &[&'static str]) -> Self {
        Self {
            value: value.to_string(),
            expected: expected.to_vec(),
        }
    }
}
