//! Error types for the diagram engine.
//!
//! Model mutations report [`EditError`]; document, configuration and analysis
//! boundaries have their own enums so callers can match on the failure kind.
//! The command-line binary wraps all of them in `anyhow`.

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::model::{BoundaryId, ConnectionId, NodeId, PortRole};

/// Errors raised by the mutation operations in [`crate::editor::operations`].
#[derive(Debug, Error, PartialEq)]
pub enum EditError {
    #[error("no node with id {0}")]
    UnknownNode(NodeId),

    #[error("node {node} has no port at index {index}")]
    UnknownPort { node: NodeId, index: usize },

    #[error("no connection with id {0}")]
    UnknownConnection(ConnectionId),

    #[error("no boundary with id {0}")]
    UnknownBoundary(BoundaryId),

    /// The source must be an `out` port and the target an `in` or
    /// `additional` port. Palette templates never take part in connections.
    #[error("invalid endpoint: {source_role:?} -> {target_role:?} ({reason})")]
    InvalidEndpoint {
        source_role: PortRole,
        target_role: PortRole,
        reason: &'static str,
    },

    /// Palette templates are read-only to every session operation.
    #[error("node {0} is a palette template")]
    TemplateNode(NodeId),

    #[error("boundary {0} is a palette template")]
    TemplateBoundary(BoundaryId),

    #[error("unknown attribute `{0}`")]
    UnknownAttribute(String),

    #[error("attribute `{key}` expects a {expected} value")]
    AttributeType { key: String, expected: &'static str },
}

/// Errors raised while reading or writing a [`crate::document::Document`].
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("malformed project document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while loading an [`crate::config::EditorConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    MissingFile(Utf8PathBuf),

    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Errors raised by the analysis boundary in [`crate::analysis`].
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("analysis backend failed: {0}")]
    Backend(String),

    #[error("could not decode analysis response: {0}")]
    Decode(#[from] serde_json::Error),
}
