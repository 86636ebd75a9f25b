//! Canvas Controller: view-only state over the Graph Store plus the pure
//! `(nodes, edges, options) -> renderData` transform that turns it into an
//! ASCII indented tree.

pub mod controller;
pub mod render;

pub use controller::{CanvasController, CanvasError, Result};
pub use render::{render, RenderData, RenderFilter, RenderOptions, TreeNode, View};
