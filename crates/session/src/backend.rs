//! Backend abstraction over the application's scripting binding.

use crate::{Page, Result, TrackType};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;

/// Product identity reported by the application on connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductInfo {
    pub product: String,
    pub version: String,
}

/// A single operation against the scripting API.
///
/// Serialized as `{"method": ..., "params": {...}}`, which is also the
/// script host's request shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
pub enum Call {
    CurrentPage,
    SwitchPage { page: Page },
    CurrentProject,
    ProjectSettings { key: Option<String> },
    ListTimelines,
    CurrentTimeline,
    SetCurrentTimeline { name: String },
    CreateTimeline { name: String },
    TrackCount { track_type: TrackType },
    TrackItems { track_type: TrackType, track_index: u32 },
    MediaPool,
}

impl Call {
    /// Method name used on the wire and in logs.
    pub fn method(&self) -> &'static str {
        match self {
            Call::CurrentPage => "current_page",
            Call::SwitchPage { .. } => "switch_page",
            Call::CurrentProject => "current_project",
            Call::ProjectSettings { .. } => "project_settings",
            Call::ListTimelines => "list_timelines",
            Call::CurrentTimeline => "current_timeline",
            Call::SetCurrentTimeline { .. } => "set_current_timeline",
            Call::CreateTimeline { .. } => "create_timeline",
            Call::TrackCount { .. } => "track_count",
            Call::TrackItems { .. } => "track_items",
            Call::MediaPool => "media_pool",
        }
    }

    /// Whether the call changes application state.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Call::SwitchPage { .. } | Call::SetCurrentTimeline { .. } | Call::CreateTimeline { .. }
        )
    }
}

/// Trait for scripting backends.
///
/// Implementations own the actual binding mechanism (subprocess, in-process,
/// IPC). The [`Session`](crate::Session) owns exactly one backend.
pub trait Backend: Send + Sync + 'static {
    /// Establish (or re-establish) the connection to the application.
    fn connect(&self) -> impl Future<Output = Result<ProductInfo>> + Send;

    /// Perform one call against the connected application.
    fn execute(&self, call: &Call) -> impl Future<Output = Result<Value>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_wire_shape() {
        let json = serde_json::to_value(Call::SwitchPage { page: Page::Color }).unwrap();
        assert_eq!(json["method"], "switch_page");
        assert_eq!(json["params"]["page"], "color");

        let json = serde_json::to_value(Call::MediaPool).unwrap();
        assert_eq!(json["method"], "media_pool");
    }

    #[test]
    fn method_matches_serialized_tag() {
        let calls = [
            Call::CurrentPage,
            Call::ProjectSettings { key: None },
            Call::TrackItems {
                track_type: TrackType::Audio,
                track_index: 2,
            },
        ];
        for call in calls {
            let json = serde_json::to_value(&call).unwrap();
            assert_eq!(json["method"], call.method());
        }
    }

    #[test]
    fn only_state_changes_are_mutating() {
        assert!(Call::SwitchPage { page: Page::Edit }.is_mutating());
        assert!(Call::CreateTimeline { name: "a".into() }.is_mutating());
        assert!(!Call::CurrentTimeline.is_mutating());
    }
}
