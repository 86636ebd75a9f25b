//! View-only canvas state: current view, filter set, selection, focus, and
//! the slash-commands that mutate them. Holds no graph data itself — it
//! reads through a `GraphStore` at render time.

use crate::render::{render, RenderData, RenderFilter, RenderOptions, View};
use format_e::NodeType;
use graph_core::GraphStore;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CanvasError>;

#[derive(Debug, Error)]
pub enum CanvasError {
    #[error("unknown slash command: {0}")]
    UnknownCommand(String),

    #[error("unknown view: {0}")]
    UnknownView(String),

    #[error("unknown node type: {0}")]
    UnknownNodeType(String),

    #[error("invalid argument for {command}: {value}")]
    InvalidArgument { command: &'static str, value: String },
}

/// Holds `currentView`, the filter set, selection set, and focus node ID.
/// Mutated only by its own slash-command handlers.
pub struct CanvasController {
    store: Arc<GraphStore>,
    view: View,
    filter: RenderFilter,
    selection: HashSet<String>,
    focus: Option<String>,
}

impl CanvasController {
    pub fn new(store: Arc<GraphStore>) -> Self {
        Self { store, view: View::All, filter: RenderFilter::default(), selection: HashSet::new(), focus: None }
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn filter(&self) -> &RenderFilter {
        &self.filter
    }

    pub fn selection(&self) -> &HashSet<String> {
        &self.selection
    }

    pub fn focus(&self) -> Option<&str> {
        self.focus.as_deref()
    }

    /// Dispatch one slash-command line (leading `/` stripped or not, either
    /// accepted) against the controller's state. Returns the re-rendered
    /// canvas for convenience; callers that only care about the state
    /// change may discard the result.
    pub fn handle_command(&mut self, line: &str) -> Result<RenderData> {
        let line = line.strip_prefix('/').unwrap_or(line);
        let mut parts = line.split_whitespace();
        let command = parts.next().unwrap_or("");
        let rest: Vec<&str> = parts.collect();

        match command {
            "view" => self.set_view(rest.first().copied().unwrap_or(""))?,
            "filter" => self.apply_filter(&rest)?,
            "select" => self.select(&rest),
            "focus" => self.focus(rest.first().copied()),
            "clear-filter" => self.filter = RenderFilter::default(),
            "clear-selection" => self.selection.clear(),
            other => return Err(CanvasError::UnknownCommand(other.to_string())),
        }

        Ok(self.render())
    }

    fn set_view(&mut self, name: &str) -> Result<()> {
        self.view = View::parse(name).ok_or_else(|| CanvasError::UnknownView(name.to_string()))?;
        Ok(())
    }

    /// `/filter type=FUNC,SYS phase=2 search=payment deleted`. Each
    /// whitespace-separated token is either a bare flag (`deleted`) or a
    /// `key=value` pair; unrecognized keys are ignored rather than
    /// rejected, since new attribute-based filters may be added later.
    fn apply_filter(&mut self, tokens: &[&str]) -> Result<()> {
        for token in tokens {
            if *token == "deleted" {
                self.filter.show_deleted = true;
                continue;
            }
            let Some((key, value)) = token.split_once('=') else { continue };
            match key {
                "type" => {
                    let mut types = HashSet::new();
                    for abbr in value.split(',') {
                        let node_type = NodeType::from_abbr(abbr)
                            .ok_or_else(|| CanvasError::UnknownNodeType(abbr.to_string()))?;
                        types.insert(node_type);
                    }
                    self.filter.node_types = Some(types);
                }
                "phase" => {
                    let phase = value
                        .parse::<i64>()
                        .map_err(|_| CanvasError::InvalidArgument { command: "filter", value: token.to_string() })?;
                    self.filter.phase = Some(phase);
                }
                "search" => self.filter.search_term = Some(value.to_string()),
                _ => {}
            }
        }
        Ok(())
    }

    fn select(&mut self, ids: &[&str]) {
        for id in ids {
            self.selection.insert(id.to_string());
        }
    }

    fn focus(&mut self, id: Option<&str>) {
        self.focus = id.map(str::to_string);
    }

    /// Render the current view against the live graph. Pure w.r.t. the
    /// controller's own state; only reads the store.
    pub fn render(&self) -> RenderData {
        let nodes = self.store.get_all_nodes();
        let edges = self.store.get_all_edges();
        let options = RenderOptions {
            view: self.view,
            filter: self.filter.clone(),
            selection: self.selection.clone(),
            focus: self.focus.clone(),
        };
        render(&nodes, &edges, &options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use format_e::EdgeType;
    use graph_core::{Edge, Node};
    use serde_json::Map;

    fn store_with_one_edge() -> Arc<GraphStore> {
        let store = Arc::new(GraphStore::new());
        store.set_node(Node::new("Sys.SYS.001", NodeType::Sys, "", Map::new()), false).unwrap();
        store.set_node(Node::new("Func.FUNC.001", NodeType::Func, "", Map::new()), false).unwrap();
        store.set_edge(Edge::new("Sys.SYS.001", EdgeType::Compose, "Func.FUNC.001"), false).unwrap();
        store
    }

    #[test]
    fn view_command_switches_the_active_view() {
        let mut controller = CanvasController::new(store_with_one_edge());
        controller.handle_command("/view dependency").unwrap();
        assert_eq!(controller.view(), View::Dependency);
    }

    #[test]
    fn unknown_view_is_rejected_without_mutating_state() {
        let mut controller = CanvasController::new(store_with_one_edge());
        let err = controller.handle_command("/view nonsense").unwrap_err();
        assert!(matches!(err, CanvasError::UnknownView(_)));
        assert_eq!(controller.view(), View::All);
    }

    #[test]
    fn filter_phase_and_clear_filter_round_trip() {
        let mut controller = CanvasController::new(store_with_one_edge());
        controller.handle_command("/filter phase=2").unwrap();
        assert_eq!(controller.filter().phase, Some(2));
        controller.handle_command("/clear-filter").unwrap();
        assert_eq!(controller.filter().phase, None);
    }

    #[test]
    fn select_and_clear_selection() {
        let mut controller = CanvasController::new(store_with_one_edge());
        controller.handle_command("/select Sys.SYS.001 Func.FUNC.001").unwrap();
        assert_eq!(controller.selection().len(), 2);
        controller.handle_command("/clear-selection").unwrap();
        assert!(controller.selection().is_empty());
    }

    #[test]
    fn focus_sets_and_the_render_decorates_it() {
        let mut controller = CanvasController::new(store_with_one_edge());
        let data = controller.handle_command("/focus Sys.SYS.001").unwrap();
        assert_eq!(controller.focus(), Some("Sys.SYS.001"));
        assert!(data.ascii.contains("<focus>"));
    }

    #[test]
    fn unknown_command_is_reported() {
        let mut controller = CanvasController::new(store_with_one_edge());
        let err = controller.handle_command("/bogus").unwrap_err();
        assert!(matches!(err, CanvasError::UnknownCommand(_)));
    }
}
