//! Hit-testing and selection.
//!
//! [`resolve`] maps a pointer position to the entity it targets. It is pure:
//! the gesture machine decides what to do with the result and stores it in
//! an [`EditorSelection`].
//!
//! Precedence:
//!
//! 1. In connect mode (modifier held or a connection being drawn) only ports
//!    are candidates; the nearest port within `port_proximity` wins. Without
//!    one, connections are tried, then nothing.
//! 2. Otherwise nodes outrank boundaries, and among equals the most recently
//!    added (topmost) wins.
//! 3. Palette boundaries are hit on their whole interior; placed boundaries
//!    only within `boundary_border` of their edge, so clicks inside reach the
//!    nodes underneath.

use glam::Vec2;

use crate::config::EditorConfig;
use crate::geometry::{self, distance_to_segment};
use crate::model::{Boundary, BoundaryId, ConnectionId, Diagram, NodeId, Point};

/// What a pointer position resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitTarget {
    Port { node: NodeId, port: usize },
    Connection(ConnectionId),
    Node(NodeId),
    Boundary(BoundaryId),
    None,
}

impl HitTarget {
    /// Z-priority used to break overlaps: nodes over boundaries.
    pub fn z_priority(&self) -> u8 {
        match self {
            HitTarget::Port { .. } => 3,
            HitTarget::Connection(_) => 2,
            HitTarget::Node(_) => 1,
            HitTarget::Boundary(_) => 0,
            HitTarget::None => 0,
        }
    }
}

/// Which candidate set [`resolve`] considers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitMode {
    Plain,
    Connect,
}

/// Resolve the interaction target under `pos`.
pub fn resolve(diagram: &Diagram, pos: Point, mode: HitMode, config: &EditorConfig) -> HitTarget {
    match mode {
        HitMode::Connect => {
            if let Some((node, port, _)) = nearest_port(diagram, pos, config.port_proximity) {
                return HitTarget::Port { node, port };
            }
            connection_at(diagram, pos, config.connection_tolerance)
                .map_or(HitTarget::None, HitTarget::Connection)
        }
        HitMode::Plain => shape_at(diagram, pos, config.boundary_border),
    }
}

/// Nearest port strictly closer than `threshold`, searched on the nodes
/// whose body (grown by `threshold`) lies under the pointer.
///
/// Returns `(node, port_index, distance)`.
pub fn nearest_port(diagram: &Diagram, pos: Point, threshold: f32) -> Option<(NodeId, usize, f32)> {
    let p = pos.to_vec2();
    let mut best: Option<(NodeId, usize, f32)> = None;
    for node in diagram.nodes.values() {
        if !geometry::node_rect(node).expand(threshold).contains(p) {
            continue;
        }
        for index in 0..node.ports.len() {
            let Some(world) = geometry::try_world_position(node, index) else {
                continue;
            };
            let dist = world.to_vec2().distance(p);
            if dist < threshold && best.is_none_or(|b| dist < b.2) {
                best = Some((node.id, index, dist));
            }
        }
    }
    best
}

/// Topmost connection whose route passes within `tolerance` of `pos`.
pub fn connection_at(diagram: &Diagram, pos: Point, tolerance: f32) -> Option<ConnectionId> {
    let p = pos.to_vec2();
    diagram
        .connections
        .values()
        .rev()
        .find(|c| distance_to_segment(p, c.route.from.to_vec2(), c.route.to.to_vec2()) <= tolerance)
        .map(|c| c.id)
}

/// Whether `p` hits `boundary`, honoring template vs placed containment.
pub fn boundary_hit(boundary: &Boundary, p: Vec2, border: f32) -> bool {
    let rect = geometry::boundary_rect(boundary);
    if boundary.is_template {
        rect.contains(p)
    } else {
        rect.border_contains(p, border)
    }
}

fn shape_at(diagram: &Diagram, pos: Point, border: f32) -> HitTarget {
    let p = pos.to_vec2();
    let nodes = diagram
        .nodes
        .values()
        .enumerate()
        .filter(|(_, n)| geometry::node_rect(n).contains(p))
        .map(|(order, n)| (HitTarget::Node(n.id), order));
    let boundaries = diagram
        .boundaries
        .values()
        .enumerate()
        .filter(|(_, b)| boundary_hit(b, p, border))
        .map(|(order, b)| (HitTarget::Boundary(b.id), order));
    nodes
        .chain(boundaries)
        .max_by_key(|(target, order)| (target.z_priority(), *order))
        .map_or(HitTarget::None, |(target, _)| target)
}

// ────────────────────────────────────────────────────────────────────────────
// Selection
// ────────────────────────────────────────────────────────────────────────────

/// The entity the property panel is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Node(NodeId),
    Boundary(BoundaryId),
    Connection(ConnectionId),
}

/// Single-entity selection of an editing surface.
#[derive(Debug, Clone, Default)]
pub struct EditorSelection {
    current: Option<Selection>,
}

impl EditorSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<Selection> {
        self.current
    }

    /// Replace the selection.
    pub fn select(&mut self, selection: Selection) {
        self.current = Some(selection);
    }

    pub fn clear(&mut self) {
        self.current = None;
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_none()
    }

    pub fn is_selected(&self, selection: Selection) -> bool {
        self.current == Some(selection)
    }

    /// Drop the selection if it points at something that no longer exists.
    pub fn prune(&mut self, diagram: &Diagram) {
        let alive = match self.current {
            Some(Selection::Node(id)) => diagram.nodes.contains_key(&id),
            Some(Selection::Boundary(id)) => diagram.boundaries.contains_key(&id),
            Some(Selection::Connection(id)) => diagram.connections.contains_key(&id),
            None => true,
        };
        if !alive {
            self.current = None;
        }
    }
}
