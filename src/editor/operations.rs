//! Mutation operations on a [`Diagram`].
//!
//! Every change to the graph goes through these functions so that the model
//! invariants hold after each call:
//!
//! - removing a node removes every connection that references it;
//! - connections run from an `out` port to an `in`/`additional` port;
//! - ports are only ever appended, so existing port indices stay valid;
//! - moving a node refreshes the cached route of each incident connection.
//!
//! Operations are plain functions over `&mut Diagram`, mirroring how the
//! gesture machine and the document loader drive them.

use tracing::{debug, warn};

use crate::config::EditorConfig;
use crate::error::EditError;
use crate::geometry;
use crate::model::{
    Boundary, BoundaryId, Connection, ConnectionId, Diagram, Endpoint, Node, NodeId, NodeKind,
    Point, Port, PortRole, Route, SecurityAttributes, Size,
};

/// Number of visual primitives (body, label, sublabel) that precede the port
/// circles in a rendered node's child list.
pub const PORT_ITEM_BASE: usize = 3;

/// Index of a port's circle among the rendered node's child primitives.
pub fn port_item_index(port_index: usize) -> usize {
    PORT_ITEM_BASE + port_index
}

// ────────────────────────────────────────────────────────────────────────────
// Construction helpers
// ────────────────────────────────────────────────────────────────────────────

/// Build a node with the default `in`/`out` port pair. The id is a
/// placeholder until [`add_node`] assigns one.
pub fn create_default_node(kind: NodeKind, label: &str, position: Point, size: Size) -> Node {
    Node {
        id: NodeId(0),
        kind,
        label: label.to_string(),
        sublabel: String::new(),
        position,
        size,
        ports: geometry::default_ports(size),
        security: SecurityAttributes::for_kind(kind),
        locked: false,
        is_template: false,
    }
}

/// Build a placed boundary. The id is assigned by [`add_boundary`].
pub fn create_default_boundary(label: &str, position: Point, size: Size) -> Boundary {
    Boundary {
        id: BoundaryId(0),
        position,
        size,
        label: label.to_string(),
        sublabel: String::new(),
        is_template: false,
        locked: false,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Nodes
// ────────────────────────────────────────────────────────────────────────────

fn editable_node(diagram: &mut Diagram, id: NodeId) -> Result<&mut Node, EditError> {
    let node = diagram.node_mut(id).ok_or(EditError::UnknownNode(id))?;
    if node.is_template {
        return Err(EditError::TemplateNode(id));
    }
    Ok(node)
}

fn editable_boundary(diagram: &mut Diagram, id: BoundaryId) -> Result<&mut Boundary, EditError> {
    let boundary = diagram
        .boundaries
        .get_mut(&id)
        .ok_or(EditError::UnknownBoundary(id))?;
    if boundary.is_template {
        return Err(EditError::TemplateBoundary(id));
    }
    Ok(boundary)
}

/// Insert a node, assigning it a fresh id.
///
/// A node arriving with fewer than two ports, or without an `in` and an `out`
/// port, gets the default pair back.
pub fn add_node(diagram: &mut Diagram, mut node: Node) -> NodeId {
    let has_in = node.first_port(PortRole::In).is_some();
    let has_out = node.first_port(PortRole::Out).is_some();
    if node.ports.len() < 2 || !has_in || !has_out {
        warn!(label = %node.label, ports = node.ports.len(), "node is missing its in/out ports; restoring defaults");
        node.ports = geometry::default_ports(node.size);
    }
    let id = NodeId(diagram.allocate_id());
    node.id = id;
    debug!(%id, label = %node.label, "node added");
    diagram.nodes.insert(id, node);
    id
}

/// Remove a node and every connection whose source or target references it.
///
/// Returns the removed node and the removed connections.
pub fn remove_node(
    diagram: &mut Diagram,
    id: NodeId,
) -> Result<(Node, Vec<Connection>), EditError> {
    editable_node(diagram, id)?;
    let node = diagram
        .nodes
        .shift_remove(&id)
        .ok_or(EditError::UnknownNode(id))?;
    let incident: Vec<ConnectionId> = diagram.incident_connections(id).map(|c| c.id).collect();
    let removed = incident
        .into_iter()
        .filter_map(|cid| diagram.connections.shift_remove(&cid))
        .collect::<Vec<_>>();
    debug!(%id, cascaded = removed.len(), "node removed");
    Ok((node, removed))
}

/// Move a node so its top-left corner sits at `to`, then re-resolve the
/// routes of all incident connections.
pub fn move_node(diagram: &mut Diagram, id: NodeId, to: Point) -> Result<(), EditError> {
    let node = editable_node(diagram, id)?;
    node.position = to;
    refresh_routes(diagram, id);
    Ok(())
}

/// Translate a node by `(dx, dy)`.
pub fn move_node_by(diagram: &mut Diagram, id: NodeId, dx: f32, dy: f32) -> Result<(), EditError> {
    let node = diagram.node(id).ok_or(EditError::UnknownNode(id))?;
    let to = Point::new(node.position.x + dx, node.position.y + dy);
    move_node(diagram, id, to)
}

/// Append an `additional` port at the next stacked slot.
///
/// Always succeeds for an existing, non-template node; the new port's index
/// is the port count before the call.
pub fn append_port(diagram: &mut Diagram, id: NodeId, spacing: f32) -> Result<usize, EditError> {
    let node = editable_node(diagram, id)?;
    let index = node.ports.len();
    let offset = geometry::slot_offset(PortRole::Additional, node.size, index, spacing);
    node.ports.push(Port::new(PortRole::Additional, offset));
    debug!(%id, index, item = port_item_index(index), "port appended");
    Ok(index)
}

// ────────────────────────────────────────────────────────────────────────────
// Connections
// ────────────────────────────────────────────────────────────────────────────

/// World position of an endpoint, warning when it had to fall back.
pub fn resolve_endpoint(diagram: &Diagram, endpoint: Endpoint) -> Point {
    let Some(node) = diagram.node(endpoint.node) else {
        warn!(node = %endpoint.node, "endpoint references a missing node");
        return geometry::FALLBACK_POSITION;
    };
    geometry::try_world_position(node, endpoint.port).unwrap_or_else(|| {
        warn!(node = %endpoint.node, port = endpoint.port, "port offset is malformed; using origin");
        geometry::FALLBACK_POSITION
    })
}

fn route_for(diagram: &Diagram, source: Endpoint, target: Endpoint) -> Route {
    Route {
        from: resolve_endpoint(diagram, source),
        to: resolve_endpoint(diagram, target),
    }
}

fn endpoint_role(diagram: &Diagram, endpoint: Endpoint) -> Result<(PortRole, bool), EditError> {
    let node = diagram
        .node(endpoint.node)
        .ok_or(EditError::UnknownNode(endpoint.node))?;
    let port = node.port(endpoint.port).ok_or(EditError::UnknownPort {
        node: endpoint.node,
        index: endpoint.port,
    })?;
    Ok((port.role(), node.is_template))
}

/// Connect `source_node.ports[source_port]` to `target_node.ports[target_port]`.
///
/// Fails with [`EditError::InvalidEndpoint`] unless the source is an `out`
/// port and the target an `in` or `additional` port on non-template nodes.
/// On failure the connection set is unchanged.
pub fn add_connection(
    diagram: &mut Diagram,
    source_node: NodeId,
    source_port: usize,
    target_node: NodeId,
    target_port: usize,
    protocol: &str,
) -> Result<ConnectionId, EditError> {
    let source = Endpoint { node: source_node, port: source_port };
    let target = Endpoint { node: target_node, port: target_port };
    let (source_role, source_template) = endpoint_role(diagram, source)?;
    let (target_role, target_template) = endpoint_role(diagram, target)?;

    let reason = if !source_role.can_start_connection() {
        Some("source must be an out port")
    } else if !target_role.can_end_connection() {
        Some("target must be an in or additional port")
    } else if source_template || target_template {
        Some("palette templates cannot be connected")
    } else {
        None
    };
    if let Some(reason) = reason {
        return Err(EditError::InvalidEndpoint {
            source_role,
            target_role,
            reason,
        });
    }

    let id = ConnectionId(diagram.allocate_id());
    let route = route_for(diagram, source, target);
    diagram.connections.insert(
        id,
        Connection {
            id,
            source,
            target,
            protocol: protocol.to_string(),
            is_encrypted: false,
            route,
        },
    );
    debug!(%id, %source_node, %target_node, protocol, "connection added");
    Ok(id)
}

pub fn remove_connection(diagram: &mut Diagram, id: ConnectionId) -> Result<Connection, EditError> {
    diagram
        .connections
        .shift_remove(&id)
        .ok_or(EditError::UnknownConnection(id))
}

/// Re-resolve the cached route of every connection incident to `node`.
pub fn refresh_routes(diagram: &mut Diagram, node: NodeId) {
    let updates: Vec<(ConnectionId, Route)> = diagram
        .incident_connections(node)
        .map(|c| (c.id, route_for(diagram, c.source, c.target)))
        .collect();
    for (id, route) in updates {
        if let Some(c) = diagram.connections.get_mut(&id) {
            c.route = route;
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Boundaries
// ────────────────────────────────────────────────────────────────────────────

pub fn add_boundary(diagram: &mut Diagram, mut boundary: Boundary) -> BoundaryId {
    let id = BoundaryId(diagram.allocate_id());
    boundary.id = id;
    diagram.boundaries.insert(id, boundary);
    id
}

/// Remove a boundary. Nodes drawn inside it are untouched.
pub fn remove_boundary(diagram: &mut Diagram, id: BoundaryId) -> Result<Boundary, EditError> {
    editable_boundary(diagram, id)?;
    diagram
        .boundaries
        .shift_remove(&id)
        .ok_or(EditError::UnknownBoundary(id))
}

pub fn move_boundary(diagram: &mut Diagram, id: BoundaryId, to: Point) -> Result<(), EditError> {
    let boundary = editable_boundary(diagram, id)?;
    boundary.position = to;
    Ok(())
}

// ────────────────────────────────────────────────────────────────────────────
// Attributes
// ────────────────────────────────────────────────────────────────────────────

/// What [`set_attribute`] writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeTarget {
    Node(NodeId),
    Port { node: NodeId, index: usize },
    Connection(ConnectionId),
    Boundary(BoundaryId),
}

/// A property-panel value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Bool(bool),
    Text(String),
    Number(f64),
}

impl AttributeValue {
    fn as_bool(&self, key: &str) -> Result<bool, EditError> {
        match self {
            AttributeValue::Bool(b) => Ok(*b),
            _ => Err(type_error(key, "boolean")),
        }
    }

    fn as_text(&self, key: &str) -> Result<String, EditError> {
        match self {
            AttributeValue::Text(s) => Ok(s.clone()),
            _ => Err(type_error(key, "text")),
        }
    }

    fn as_port_number(&self, key: &str) -> Result<u16, EditError> {
        match self {
            AttributeValue::Number(n) if n.fract() == 0.0 && (0.0..=65535.0).contains(n) => {
                Ok(*n as u16)
            }
            _ => Err(type_error(key, "port number")),
        }
    }
}

fn type_error(key: &str, expected: &'static str) -> EditError {
    EditError::AttributeType {
        key: key.to_string(),
        expected,
    }
}

fn unknown(key: &str) -> EditError {
    EditError::UnknownAttribute(key.to_string())
}

/// Set a security, protocol or text attribute by its wire name
/// (`isEncrypted`, `protocol`, `label`, ...). Only the value type is checked.
pub fn set_attribute(
    diagram: &mut Diagram,
    target: AttributeTarget,
    key: &str,
    value: AttributeValue,
) -> Result<(), EditError> {
    match target {
        AttributeTarget::Node(id) => {
            let node = editable_node(diagram, id)?;
            match key {
                "label" => node.label = value.as_text(key)?,
                "sublabel" => node.sublabel = value.as_text(key)?,
                "isEncrypted" => node.security.is_encrypted = value.as_bool(key)?,
                "implementsAuthenticationScheme" => {
                    node.security.implements_authentication_scheme = value.as_bool(key)?
                }
                "sanitizesInput" => node.security.sanitizes_input = value.as_bool(key)?,
                // Kinds without the flag do not grow one.
                "isPublic" if node.kind.has_public_flag() => {
                    node.security.is_public = Some(value.as_bool(key)?)
                }
                _ => return Err(unknown(key)),
            }
        }
        AttributeTarget::Port { node, index } => {
            let n = editable_node(diagram, node)?;
            let port = n
                .ports
                .get_mut(index)
                .ok_or(EditError::UnknownPort { node, index })?;
            match key {
                "protocol" => port.protocol = Some(value.as_text(key)?),
                "portNumber" => port.port_number = Some(value.as_port_number(key)?),
                "isEncrypted" => port.is_encrypted = value.as_bool(key)?,
                "requiresAuthentication" => port.requires_authentication = value.as_bool(key)?,
                _ => return Err(unknown(key)),
            }
        }
        AttributeTarget::Connection(id) => {
            let c = diagram
                .connections
                .get_mut(&id)
                .ok_or(EditError::UnknownConnection(id))?;
            match key {
                "protocol" => c.protocol = value.as_text(key)?,
                "isEncrypted" => c.is_encrypted = value.as_bool(key)?,
                _ => return Err(unknown(key)),
            }
        }
        AttributeTarget::Boundary(id) => {
            let b = editable_boundary(diagram, id)?;
            match key {
                "label" => b.label = value.as_text(key)?,
                "sublabel" => b.sublabel = value.as_text(key)?,
                _ => return Err(unknown(key)),
            }
        }
    }
    Ok(())
}

// ────────────────────────────────────────────────────────────────────────────
// Sample content
// ────────────────────────────────────────────────────────────────────────────

/// Seed a starter model: a web app talking HTTPS to an API.
///
/// Returns `(web_app, api, connection)`.
pub fn add_sample_flow(
    diagram: &mut Diagram,
    config: &EditorConfig,
) -> Result<(NodeId, NodeId, ConnectionId), EditError> {
    let web = add_node(
        diagram,
        create_default_node(NodeKind::WebApp, "Web App", Point::new(300.0, 100.0), config.node_size),
    );
    let api = add_node(
        diagram,
        create_default_node(NodeKind::Api, "API", Point::new(500.0, 100.0), config.node_size),
    );
    let out = diagram
        .node(web)
        .and_then(|n| n.first_port(PortRole::Out))
        .ok_or(EditError::UnknownPort { node: web, index: 1 })?;
    let inp = diagram
        .node(api)
        .and_then(|n| n.first_port(PortRole::In))
        .ok_or(EditError::UnknownPort { node: api, index: 0 })?;
    let link = add_connection(diagram, web, out, api, inp, "HTTPS")?;
    set_attribute(
        diagram,
        AttributeTarget::Connection(link),
        "isEncrypted",
        AttributeValue::Bool(true),
    )?;
    Ok((web, api, link))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_test_diagram() -> (Diagram, NodeId, NodeId, NodeId) {
        let mut d = Diagram::new();
        let size = Size::new(130.0, 40.0);
        let a = add_node(&mut d, create_default_node(NodeKind::WebApp, "WebApp", Point::new(0.0, 0.0), size));
        let b = add_node(&mut d, create_default_node(NodeKind::Api, "API", Point::new(300.0, 0.0), size));
        let c = add_node(&mut d, create_default_node(NodeKind::AwsRds, "DB", Point::new(600.0, 0.0), size));
        (d, a, b, c)
    }

    #[test]
    fn test_add_connection_resolves_route() {
        let (mut d, a, b, _) = make_test_diagram();
        let id = add_connection(&mut d, a, 1, b, 0, "HTTP").unwrap();
        let c = d.connection(id).unwrap();
        assert_eq!(c.route.from, Point::new(130.0, 20.0));
        assert_eq!(c.route.to, Point::new(300.0, 20.0));
        assert_eq!(c.protocol, "HTTP");
        assert!(!c.is_encrypted);
    }

    #[test]
    fn test_connection_from_in_port_is_rejected() {
        let (mut d, a, b, _) = make_test_diagram();
        let err = add_connection(&mut d, a, 0, b, 0, "HTTP").unwrap_err();
        assert!(matches!(err, EditError::InvalidEndpoint { source_role: PortRole::In, .. }));
        assert!(d.connections.is_empty());
    }

    #[test]
    fn test_connection_into_out_port_is_rejected() {
        let (mut d, a, b, _) = make_test_diagram();
        assert!(add_connection(&mut d, a, 1, b, 1, "HTTP").is_err());
        assert!(d.connections.is_empty());
    }

    #[test]
    fn test_connection_to_additional_port() {
        let (mut d, a, b, _) = make_test_diagram();
        let extra = append_port(&mut d, b, 15.0).unwrap();
        assert!(add_connection(&mut d, a, 1, b, extra, "gRPC").is_ok());
    }

    #[test]
    fn test_connection_to_missing_port() {
        let (mut d, a, b, _) = make_test_diagram();
        assert_eq!(
            add_connection(&mut d, a, 1, b, 7, "HTTP"),
            Err(EditError::UnknownPort { node: b, index: 7 })
        );
    }

    #[test]
    fn test_remove_node_cascades_only_incident() {
        let (mut d, a, b, c) = make_test_diagram();
        let ab = add_connection(&mut d, a, 1, b, 0, "HTTP").unwrap();
        let bc = add_connection(&mut d, b, 1, c, 0, "SQL").unwrap();
        let (_, removed) = remove_node(&mut d, a).unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id, ab);
        assert!(d.connection(bc).is_some());
        assert_eq!(d.nodes.len(), 2);
    }

    #[test]
    fn test_move_node_refreshes_routes() {
        let (mut d, a, b, _) = make_test_diagram();
        let id = add_connection(&mut d, a, 1, b, 0, "HTTP").unwrap();
        move_node_by(&mut d, b, 10.0, 50.0).unwrap();
        assert_eq!(d.connection(id).unwrap().route.to, Point::new(310.0, 70.0));
        assert_eq!(d.connection(id).unwrap().route.from, Point::new(130.0, 20.0));
    }

    #[test]
    fn test_append_port_keeps_existing_indices() {
        let (mut d, a, _, _) = make_test_diagram();
        let before = d.node(a).unwrap().ports.clone();
        let first = append_port(&mut d, a, 15.0).unwrap();
        let second = append_port(&mut d, a, 15.0).unwrap();
        assert_eq!((first, second), (2, 3));
        let node = d.node(a).unwrap();
        assert_eq!(&node.ports[..2], &before[..]);
        assert_eq!(node.ports[2].local_position, Point::new(65.0, 15.0));
        assert_eq!(node.ports[3].local_position, Point::new(65.0, 30.0));
        assert_eq!(port_item_index(second), 6);
    }

    #[test]
    fn test_add_node_repairs_missing_ports() {
        let mut d = Diagram::new();
        let mut n = create_default_node(NodeKind::Api, "API", Point::new(0.0, 0.0), Size::new(130.0, 40.0));
        n.ports.clear();
        let id = add_node(&mut d, n);
        let roles: Vec<_> = d.node(id).unwrap().ports.iter().map(|p| p.role()).collect();
        assert_eq!(roles, vec![PortRole::In, PortRole::Out]);
    }

    #[test]
    fn test_set_attribute_type_checks() {
        let (mut d, a, b, _) = make_test_diagram();
        let link = add_connection(&mut d, a, 1, b, 0, "HTTP").unwrap();
        set_attribute(&mut d, AttributeTarget::Connection(link), "protocol", AttributeValue::Text("HTTPS".into())).unwrap();
        assert_eq!(d.connection(link).unwrap().protocol, "HTTPS");

        let err = set_attribute(&mut d, AttributeTarget::Node(a), "isEncrypted", AttributeValue::Text("yes".into()));
        assert!(matches!(err, Err(EditError::AttributeType { .. })));

        let err = set_attribute(&mut d, AttributeTarget::Node(a), "colour", AttributeValue::Bool(true));
        assert_eq!(err, Err(EditError::UnknownAttribute("colour".into())));

        set_attribute(&mut d, AttributeTarget::Port { node: b, index: 0 }, "portNumber", AttributeValue::Number(443.0)).unwrap();
        assert_eq!(d.node(b).unwrap().ports[0].port_number, Some(443));
    }

    #[test]
    fn test_is_public_only_for_flagged_kinds() {
        let mut d = Diagram::new();
        let size = Size::new(130.0, 40.0);
        let bucket = add_node(&mut d, create_default_node(NodeKind::AwsS3, "Bucket", Point::new(0.0, 0.0), size));
        let web = add_node(&mut d, create_default_node(NodeKind::WebApp, "Web", Point::new(0.0, 0.0), size));
        set_attribute(&mut d, AttributeTarget::Node(bucket), "isPublic", AttributeValue::Bool(true)).unwrap();
        assert_eq!(d.node(bucket).unwrap().security.is_public, Some(true));
        assert!(set_attribute(&mut d, AttributeTarget::Node(web), "isPublic", AttributeValue::Bool(true)).is_err());
    }

    #[test]
    fn test_remove_boundary_leaves_nodes() {
        let (mut d, _, _, _) = make_test_diagram();
        let b = add_boundary(&mut d, create_default_boundary("VPC", Point::new(-10.0, -10.0), Size::new(500.0, 100.0)));
        remove_boundary(&mut d, b).unwrap();
        assert_eq!(d.nodes.len(), 3);
        assert!(d.boundaries.is_empty());
    }

    #[test]
    fn test_templates_are_read_only() {
        let mut d = Diagram::new();
        let size = Size::new(130.0, 40.0);
        let mut n = create_default_node(NodeKind::Api, "API", Point::new(0.0, 0.0), size);
        n.is_template = true;
        let tpl = add_node(&mut d, n);
        let mut b = create_default_boundary("Zone", Point::new(0.0, 0.0), size);
        b.is_template = true;
        let zone = add_boundary(&mut d, b);

        assert_eq!(append_port(&mut d, tpl, 15.0), Err(EditError::TemplateNode(tpl)));
        assert_eq!(move_node(&mut d, tpl, Point::new(5.0, 5.0)), Err(EditError::TemplateNode(tpl)));
        assert_eq!(
            set_attribute(&mut d, AttributeTarget::Node(tpl), "label", AttributeValue::Text("x".into())),
            Err(EditError::TemplateNode(tpl))
        );
        assert_eq!(
            set_attribute(&mut d, AttributeTarget::Port { node: tpl, index: 0 }, "isEncrypted", AttributeValue::Bool(true)),
            Err(EditError::TemplateNode(tpl))
        );
        assert_eq!(remove_node(&mut d, tpl).unwrap_err(), EditError::TemplateNode(tpl));
        assert_eq!(remove_boundary(&mut d, zone).unwrap_err(), EditError::TemplateBoundary(zone));
        assert_eq!(
            set_attribute(&mut d, AttributeTarget::Boundary(zone), "label", AttributeValue::Text("x".into())),
            Err(EditError::TemplateBoundary(zone))
        );

        let n = d.node(tpl).unwrap();
        assert_eq!((n.ports.len(), n.label.as_str(), n.position), (2, "API", Point::new(0.0, 0.0)));
        assert_eq!(d.boundaries.len(), 1);
    }

    #[test]
    fn test_sample_flow() {
        let mut d = Diagram::new();
        let (web, api, link) = add_sample_flow(&mut d, &EditorConfig::default()).unwrap();
        let c = d.connection(link).unwrap();
        assert_eq!(c.source.node, web);
        assert_eq!(c.target.node, api);
        assert_eq!(c.protocol, "HTTPS");
        assert!(c.is_encrypted);
    }
}
