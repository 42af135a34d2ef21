//! Data-flow diagram engine for threat modeling.
//!
//! This crate provides the model behind an interactive threat-modeling
//! canvas: typed nodes with ports, connections between them, trust
//! boundaries, a hit-tester and gesture state machine for pointer input, a
//! lenient JSON document format, and the boundary to an external threat
//! analysis service.
//!
//! The binary `threatcanvas` creates, inspects and normalizes project files
//! and builds analysis requests from them.

pub mod analysis;
pub mod config;
pub mod document;
pub mod editor;
pub mod error;
pub mod geometry;
pub mod model;

pub use config::EditorConfig;
pub use document::{Document, LoadReport};
pub use error::{AnalysisError, ConfigError, DocumentError, EditError};
pub use model::Diagram;
