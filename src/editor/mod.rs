//! Editing layer on top of [`crate::model`].
//!
//! - **Operations**: every mutation of a diagram, with its validation rules
//! - **Selection**: hit-testing a pointer position and the current selection
//! - **State**: the gesture state machine that turns input events into operations
//! - **Catalog**: the component palette and template instantiation

pub mod catalog;
pub mod operations;
pub mod selection;
pub mod state;

pub use catalog::{CatalogEntry, Palette, Placed, TemplateRef, default_catalog};
pub use operations::{
    AttributeTarget, AttributeValue, add_boundary, add_connection, add_node, add_sample_flow,
    append_port, move_boundary, move_node, port_item_index, remove_boundary, remove_connection,
    remove_node, set_attribute,
};
pub use selection::{EditorSelection, HitMode, HitTarget, Selection, resolve};
pub use state::{EditorOutcome, EditorSession, GestureState, InputEvent};
