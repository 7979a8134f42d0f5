//! The fixed tool catalog.

use serde_json::Value;
use std::collections::HashSet;
use thiserror::Error;

use crate::schema::{self, Arguments, Param, ParamKind};
use crate::ToolError;

const PAGES: &[&str] = &[
    "media",
    "cut",
    "edit",
    "fusion",
    "color",
    "fairlight",
    "deliver",
];

const TRACK_TYPES: &[&str] = &["video", "audio", "subtitle"];

/// Identity of each tool the bridge knows how to route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    GetResolveInfo,
    Reconnect,
    GetCurrentPage,
    SwitchPage,
    GetCurrentProject,
    GetProjectSettings,
    ListTimelines,
    GetCurrentTimeline,
    SetCurrentTimeline,
    CreateTimeline,
    GetTrackCount,
    ListTrackItems,
    ListMediaPool,
}

impl ToolKind {
    /// Every tool, in catalog order.
    pub const ALL: [ToolKind; 13] = [
        ToolKind::GetResolveInfo,
        ToolKind::Reconnect,
        ToolKind::GetCurrentPage,
        ToolKind::SwitchPage,
        ToolKind::GetCurrentProject,
        ToolKind::GetProjectSettings,
        ToolKind::ListTimelines,
        ToolKind::GetCurrentTimeline,
        ToolKind::SetCurrentTimeline,
        ToolKind::CreateTimeline,
        ToolKind::GetTrackCount,
        ToolKind::ListTrackItems,
        ToolKind::ListMediaPool,
    ];

    pub fn spec(self) -> ToolSpec {
        let track_type = Param::required(
            "track_type",
            ParamKind::Enum(TRACK_TYPES),
            "Track type: video, audio or subtitle",
        );

        let (name, description, params, mutating) = match self {
            ToolKind::GetResolveInfo => (
                "get_resolve_info",
                "Get the product name and version of the connected DaVinci Resolve",
                vec![],
                false,
            ),
            ToolKind::Reconnect => (
                "reconnect",
                "Re-establish the connection to DaVinci Resolve",
                vec![],
                false,
            ),
            ToolKind::GetCurrentPage => (
                "get_current_page",
                "Get the page DaVinci Resolve is showing",
                vec![],
                false,
            ),
            ToolKind::SwitchPage => (
                "switch_page",
                "Switch DaVinci Resolve to a page",
                vec![Param::required(
                    "page",
                    ParamKind::Enum(PAGES),
                    "Target page: media, cut, edit, fusion, color, fairlight or deliver",
                )],
                true,
            ),
            ToolKind::GetCurrentProject => (
                "get_current_project",
                "Get the name of the open project",
                vec![],
                false,
            ),
            ToolKind::GetProjectSettings => (
                "get_project_settings",
                "Get all project settings, or a single setting by key",
                vec![Param::optional(
                    "key",
                    ParamKind::String,
                    "Setting name, e.g. timelineFrameRate",
                )],
                false,
            ),
            ToolKind::ListTimelines => (
                "list_timelines",
                "List the timelines in the open project",
                vec![],
                false,
            ),
            ToolKind::GetCurrentTimeline => (
                "get_current_timeline",
                "Get the name and frame range of the current timeline",
                vec![],
                false,
            ),
            ToolKind::SetCurrentTimeline => (
                "set_current_timeline",
                "Make the named timeline current",
                vec![Param::required("name", ParamKind::String, "Timeline name")],
                true,
            ),
            ToolKind::CreateTimeline => (
                "create_timeline",
                "Create an empty timeline in the open project",
                vec![Param::required("name", ParamKind::String, "Timeline name")],
                true,
            ),
            ToolKind::GetTrackCount => (
                "get_track_count",
                "Count the tracks of a type in the current timeline",
                vec![track_type],
                false,
            ),
            ToolKind::ListTrackItems => (
                "list_track_items",
                "List the items on one track of the current timeline",
                vec![
                    track_type,
                    Param::required(
                        "track_index",
                        ParamKind::Integer { minimum: Some(1) },
                        "Track number, starting at 1",
                    ),
                ],
                false,
            ),
            ToolKind::ListMediaPool => (
                "list_media_pool",
                "List clips and subfolders in the media pool root folder",
                vec![],
                false,
            ),
        };

        ToolSpec {
            name,
            description,
            params,
            mutating,
            kind: self,
        }
    }
}

/// One invocable operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub params: Vec<Param>,
    /// Whether the tool changes application state.
    pub mutating: bool,
    pub kind: ToolKind,
}

impl ToolSpec {
    /// JSON Schema for the tool's arguments.
    pub fn input_schema(&self) -> Value {
        schema::input_schema(&self.params)
    }

    pub fn validate(&self, args: Option<&Value>) -> Result<Arguments, ToolError> {
        schema::validate(&self.params, args)
    }
}

/// Errors building the catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("cannot disable unknown tool: {0}")]
    UnknownDisabled(String),

    #[error("duplicate tool name: {0}")]
    Duplicate(&'static str),
}

/// The immutable set of tools exposed to callers.
#[derive(Debug, Clone)]
pub struct Catalog {
    tools: Vec<ToolSpec>,
}

impl Catalog {
    /// Every tool.
    pub fn full() -> Result<Self, CatalogError> {
        Self::without(std::iter::empty::<&str>())
    }

    /// Every tool except the named ones.
    pub fn without<I, S>(disabled: I) -> Result<Self, CatalogError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let specs: Vec<ToolSpec> = ToolKind::ALL.into_iter().map(ToolKind::spec).collect();

        let mut seen = HashSet::new();
        for spec in &specs {
            if !seen.insert(spec.name) {
                return Err(CatalogError::Duplicate(spec.name));
            }
        }

        let mut skip = HashSet::new();
        for name in disabled {
            let name = name.as_ref();
            if !seen.contains(name) {
                return Err(CatalogError::UnknownDisabled(name.to_string()));
            }
            skip.insert(name.to_string());
        }

        Ok(Self {
            tools: specs
                .into_iter()
                .filter(|s| !skip.contains(s.name))
                .collect(),
        })
    }

    pub fn tools(&self) -> &[ToolSpec] {
        &self.tools
    }

    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.iter().find(|s| s.name == name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use session::{Page, TrackType};

    #[test]
    fn full_catalog_has_every_tool_in_order() {
        let catalog = Catalog::full().unwrap();
        assert_eq!(catalog.len(), ToolKind::ALL.len());
        assert_eq!(catalog.tools()[0].name, "get_resolve_info");
        assert!(catalog.get("switch_page").is_some());
        assert!(catalog.get("render").is_none());
    }

    #[test]
    fn disabled_tools_are_absent() {
        let catalog = Catalog::without(["create_timeline"]).unwrap();
        assert_eq!(catalog.len(), ToolKind::ALL.len() - 1);
        assert!(catalog.get("create_timeline").is_none());
    }

    #[test]
    fn disabling_unknown_tool_fails() {
        let err = Catalog::without(["render_everything"]).unwrap_err();
        assert!(matches!(err, CatalogError::UnknownDisabled(name) if name == "render_everything"));
    }

    #[test]
    fn enum_members_match_session_types() {
        let pages: Vec<&str> = Page::ALL.iter().map(|p| p.as_str()).collect();
        assert_eq!(pages, PAGES);
        let tracks: Vec<&str> = TrackType::ALL.iter().map(|t| t.as_str()).collect();
        assert_eq!(tracks, TRACK_TYPES);
    }

    #[test]
    fn only_state_changing_tools_are_mutating() {
        let mutating: Vec<&str> = Catalog::full()
            .unwrap()
            .tools()
            .iter()
            .filter(|s| s.mutating)
            .map(|s| s.name)
            .collect();
        assert_eq!(
            mutating,
            ["switch_page", "set_current_timeline", "create_timeline"]
        );
    }

    #[test]
    fn switch_page_schema() {
        let spec = ToolKind::SwitchPage.spec();
        let schema = spec.input_schema();
        assert_eq!(schema["required"], serde_json::json!(["page"]));
        assert_eq!(schema["properties"]["page"]["enum"][4], "color");
    }
}
