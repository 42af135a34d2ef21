//! Gesture state machine.
//!
//! [`EditorSession`] is the per-surface context: it owns the working
//! [`Diagram`], the palette, the selection, the drag state and the
//! in-progress connection. Raw input goes through [`EditorSession::dispatch`],
//! which performs at most one model mutation per event and reports what
//! happened as an [`EditorOutcome`].
//!
//! Connection drawing is modal. With the modifier held, a click on an `out`
//! port enters [`GestureState::ConnectingFromPort`]; pointer moves stretch the
//! rubber band; a click on an `in`/`additional` port completes the edge.
//! Releasing the modifier or clicking anything else cancels and forgets the
//! source.

use glam::Vec2;
use tracing::debug;

use crate::config::EditorConfig;
use crate::document::{self, Document, LoadReport};
use crate::model::{BoundaryId, ConnectionId, Diagram, Endpoint, NodeId, Point};

use super::catalog::{Palette, Placed, TemplateRef};
use super::operations;
use super::selection::{self, EditorSelection, HitMode, HitTarget, Selection};

// ────────────────────────────────────────────────────────────────────────────
// Input
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Secondary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    /// The connect modifier (Ctrl).
    Modifier,
    Delete,
    Other,
}

/// One raw input event, in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    PointerDown { position: Point, button: PointerButton },
    PointerMove { position: Point },
    PointerUp { position: Point, button: PointerButton },
    KeyDown(Key),
    KeyUp(Key),
    /// Pointer pressed on the palette surface (palette coordinates).
    PalettePointerDown { position: Point },
}

// ────────────────────────────────────────────────────────────────────────────
// State
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum GestureState {
    #[default]
    Idle,
    ConnectingFromPort {
        source_node: NodeId,
        source_port: usize,
        /// Live pointer end of the rubber band.
        pending_end: Point,
    },
}

/// What the primary button is currently dragging.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum DragMode {
    #[default]
    None,
    /// `grab` is the pointer offset from the entity's top-left corner.
    Node { id: NodeId, grab: Vec2 },
    Boundary { id: BoundaryId, grab: Vec2 },
}

/// The temporary line shown while a connection is being drawn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RubberBand {
    pub from: Point,
    pub to: Point,
}

/// Result of dispatching one event.
#[derive(Debug, Clone, PartialEq)]
pub enum EditorOutcome {
    None,
    Selected(Selection),
    SelectionCleared,
    ConnectionStarted { node: NodeId, port: usize },
    RubberBandMoved,
    ConnectionCreated(ConnectionId),
    ConnectionCancelled,
    PortAppended { node: NodeId, index: usize },
    Moved,
    Deleted { target: Selection, cascaded: Vec<ConnectionId> },
    Placed(Placed),
}

// ────────────────────────────────────────────────────────────────────────────
// EditorSession
// ────────────────────────────────────────────────────────────────────────────

/// Editing context for one surface. There is exactly one live diagram per
/// session; every mutation happens synchronously inside [`Self::dispatch`]
/// or the explicit load/mutation helpers.
#[derive(Debug, Clone)]
pub struct EditorSession {
    config: EditorConfig,
    diagram: Diagram,
    palette: Palette,
    selection: EditorSelection,
    gesture: GestureState,
    drag: DragMode,
    modifier_held: bool,
}

impl EditorSession {
    pub fn new(config: EditorConfig, palette: Palette) -> Self {
        Self {
            config,
            diagram: Diagram::new(),
            palette,
            selection: EditorSelection::new(),
            gesture: GestureState::Idle,
            drag: DragMode::None,
            modifier_held: false,
        }
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn diagram(&self) -> &Diagram {
        &self.diagram
    }

    /// Direct access for property-panel edits and analysis results. The
    /// selection is pruned on the next dispatch.
    pub fn diagram_mut(&mut self) -> &mut Diagram {
        &mut self.diagram
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    pub fn selection(&self) -> Option<Selection> {
        self.selection.current()
    }

    pub fn gesture(&self) -> GestureState {
        self.gesture
    }

    pub fn drag(&self) -> DragMode {
        self.drag
    }

    pub fn modifier_held(&self) -> bool {
        self.modifier_held
    }

    /// The rubber band to draw, if a connection is in progress.
    pub fn rubber_band(&self) -> Option<RubberBand> {
        match self.gesture {
            GestureState::Idle => None,
            GestureState::ConnectingFromPort {
                source_node,
                source_port,
                pending_end,
            } => Some(RubberBand {
                from: operations::resolve_endpoint(
                    &self.diagram,
                    Endpoint {
                        node: source_node,
                        port: source_port,
                    },
                ),
                to: pending_end,
            }),
        }
    }

    /// Replace the working diagram with the content of `doc`.
    pub fn load(&mut self, doc: &Document) -> LoadReport {
        self.reset_interaction();
        document::load_into(&mut self.diagram, doc, &self.config)
    }

    /// Snapshot the working diagram.
    pub fn save(&self) -> Document {
        document::serialize(&self.diagram)
    }

    /// Forget selection, drag and any in-progress connection.
    pub fn reset_interaction(&mut self) {
        self.selection.clear();
        self.gesture = GestureState::Idle;
        self.drag = DragMode::None;
    }

    /// Process one input event.
    pub fn dispatch(&mut self, event: InputEvent) -> EditorOutcome {
        self.selection.prune(&self.diagram);
        let outcome = match event {
            InputEvent::PointerDown { position, button } => match button {
                PointerButton::Primary => self.primary_down(position),
                PointerButton::Secondary => self.secondary_down(position),
            },
            InputEvent::PointerMove { position } => self.pointer_move(position),
            InputEvent::PointerUp { .. } => {
                self.drag = DragMode::None;
                EditorOutcome::None
            }
            InputEvent::KeyDown(Key::Modifier) => {
                self.modifier_held = true;
                EditorOutcome::None
            }
            InputEvent::KeyUp(Key::Modifier) => {
                self.modifier_held = false;
                self.cancel_connection()
            }
            InputEvent::KeyDown(Key::Delete) => self.delete_selection(),
            InputEvent::KeyDown(_) | InputEvent::KeyUp(_) => EditorOutcome::None,
            InputEvent::PalettePointerDown { position } => self.palette_down(position),
        };
        debug!(?event, ?outcome, gesture = ?self.gesture, "dispatched");
        outcome
    }

    fn cancel_connection(&mut self) -> EditorOutcome {
        match self.gesture {
            GestureState::ConnectingFromPort { .. } => {
                self.gesture = GestureState::Idle;
                EditorOutcome::ConnectionCancelled
            }
            GestureState::Idle => EditorOutcome::None,
        }
    }

    fn primary_down(&mut self, position: Point) -> EditorOutcome {
        if let GestureState::ConnectingFromPort {
            source_node,
            source_port,
            ..
        } = self.gesture
        {
            return self.complete_connection(source_node, source_port, position);
        }

        if self.modifier_held {
            return match selection::resolve(&self.diagram, position, HitMode::Connect, &self.config) {
                HitTarget::Port { node, port } => self.start_connection(node, port, position),
                HitTarget::Connection(id) => self.select(Selection::Connection(id)),
                _ => self.clear_selection(),
            };
        }

        match selection::resolve(&self.diagram, position, HitMode::Plain, &self.config) {
            HitTarget::Node(id) => {
                if let Some(node) = self.diagram.node(id).filter(|n| !n.locked) {
                    let grab = position.to_vec2() - node.position.to_vec2();
                    self.drag = DragMode::Node { id, grab };
                }
                self.select(Selection::Node(id))
            }
            HitTarget::Boundary(id) => {
                if let Some(b) = self.diagram.boundary(id).filter(|b| !b.locked) {
                    let grab = position.to_vec2() - b.position.to_vec2();
                    self.drag = DragMode::Boundary { id, grab };
                }
                self.select(Selection::Boundary(id))
            }
            _ => self.clear_selection(),
        }
    }

    fn start_connection(&mut self, node: NodeId, port: usize, position: Point) -> EditorOutcome {
        let startable = self
            .diagram
            .node(node)
            .and_then(|n| n.port(port))
            .is_some_and(|p| p.role().can_start_connection());
        if !startable {
            // Only `out` ports begin a connection; anything else is a no-op.
            return EditorOutcome::None;
        }
        self.gesture = GestureState::ConnectingFromPort {
            source_node: node,
            source_port: port,
            pending_end: position,
        };
        EditorOutcome::ConnectionStarted { node, port }
    }

    fn complete_connection(
        &mut self,
        source_node: NodeId,
        source_port: usize,
        position: Point,
    ) -> EditorOutcome {
        self.gesture = GestureState::Idle;
        let HitTarget::Port { node, port } =
            selection::resolve(&self.diagram, position, HitMode::Connect, &self.config)
        else {
            return EditorOutcome::ConnectionCancelled;
        };
        if node == source_node && !self.config.allow_self_loops {
            return EditorOutcome::ConnectionCancelled;
        }
        match operations::add_connection(
            &mut self.diagram,
            source_node,
            source_port,
            node,
            port,
            &self.config.default_protocol,
        ) {
            Ok(id) => EditorOutcome::ConnectionCreated(id),
            Err(err) => {
                debug!(%err, "connection target rejected");
                EditorOutcome::ConnectionCancelled
            }
        }
    }

    fn secondary_down(&mut self, position: Point) -> EditorOutcome {
        if self.gesture != GestureState::Idle {
            return EditorOutcome::None;
        }
        match selection::resolve(&self.diagram, position, HitMode::Plain, &self.config) {
            HitTarget::Node(node) => {
                match operations::append_port(&mut self.diagram, node, self.config.port_spacing) {
                    Ok(index) => EditorOutcome::PortAppended { node, index },
                    Err(err) => {
                        debug!(%err, "port not appended");
                        EditorOutcome::None
                    }
                }
            }
            _ => EditorOutcome::None,
        }
    }

    fn pointer_move(&mut self, position: Point) -> EditorOutcome {
        if let GestureState::ConnectingFromPort { pending_end, .. } = &mut self.gesture {
            *pending_end = position;
            return EditorOutcome::RubberBandMoved;
        }
        let p = position.to_vec2();
        let moved = match self.drag {
            DragMode::None => return EditorOutcome::None,
            DragMode::Node { id, grab } => {
                operations::move_node(&mut self.diagram, id, Point::from_vec2(p - grab)).is_ok()
            }
            DragMode::Boundary { id, grab } => {
                operations::move_boundary(&mut self.diagram, id, Point::from_vec2(p - grab)).is_ok()
            }
        };
        if moved {
            EditorOutcome::Moved
        } else {
            self.drag = DragMode::None;
            EditorOutcome::None
        }
    }

    fn delete_selection(&mut self) -> EditorOutcome {
        if self.gesture != GestureState::Idle {
            return EditorOutcome::None;
        }
        let Some(target) = self.selection.current() else {
            return EditorOutcome::None;
        };
        let removed: Result<Vec<ConnectionId>, _> = match target {
            Selection::Node(id) => operations::remove_node(&mut self.diagram, id)
                .map(|(_, removed)| removed.into_iter().map(|c| c.id).collect()),
            Selection::Connection(id) => {
                operations::remove_connection(&mut self.diagram, id).map(|_| Vec::new())
            }
            Selection::Boundary(id) => {
                operations::remove_boundary(&mut self.diagram, id).map(|_| Vec::new())
            }
        };
        let cascaded = match removed {
            Ok(cascaded) => cascaded,
            Err(err) => {
                debug!(%err, "selection not deleted");
                return EditorOutcome::None;
            }
        };
        self.selection.clear();
        self.drag = DragMode::None;
        EditorOutcome::Deleted { target, cascaded }
    }

    fn palette_down(&mut self, position: Point) -> EditorOutcome {
        if self.gesture != GestureState::Idle {
            return self.cancel_connection();
        }
        let template = match selection::resolve(
            self.palette.surface(),
            position,
            HitMode::Plain,
            &self.config,
        ) {
            HitTarget::Node(id) => TemplateRef::Node(id),
            HitTarget::Boundary(id) => TemplateRef::Boundary(id),
            _ => return EditorOutcome::None,
        };
        self.palette
            .instantiate(template, &mut self.diagram, &self.config)
            .map_or(EditorOutcome::None, EditorOutcome::Placed)
    }

    fn select(&mut self, selection: Selection) -> EditorOutcome {
        self.selection.select(selection);
        EditorOutcome::Selected(selection)
    }

    fn clear_selection(&mut self) -> EditorOutcome {
        self.selection.clear();
        EditorOutcome::SelectionCleared
    }
}
