use std::fmt;
use std::str::FromStr;

use glam::Vec2;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

// ────────────────────────────────────────────────────────────────────────────
// Identifiers
// ────────────────────────────────────────────────────────────────────────────

/// Opaque identifier of a [`Node`] inside one [`Diagram`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

/// Opaque identifier of a [`Connection`] inside one [`Diagram`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(pub u64);

/// Opaque identifier of a [`Boundary`] inside one [`Diagram`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BoundaryId(pub u64);

/// Identifier of a [`Finding`] attached after analysis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FindingId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

impl fmt::Display for BoundaryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", self.0)
    }
}

impl fmt::Display for FindingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Plain geometry values
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn from_vec2(v: Vec2) -> Self {
        Self { x: v.x, y: v.y }
    }

    pub fn to_vec2(self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn to_vec2(self) -> Vec2 {
        Vec2::new(self.width, self.height)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Ports
// ────────────────────────────────────────────────────────────────────────────

/// Role of a port. Fixed when the port is created.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortRole {
    In,
    Out,
    Additional,
}

impl PortRole {
    /// Only `out` ports start a connection.
    pub fn can_start_connection(self) -> bool {
        self == PortRole::Out
    }

    /// `in` and `additional` ports terminate a connection.
    pub fn can_end_connection(self) -> bool {
        matches!(self, PortRole::In | PortRole::Additional)
    }

    pub fn default_color(self) -> &'static str {
        match self {
            PortRole::In => "#ff0000",
            PortRole::Out => "#00ff00",
            PortRole::Additional => "#0000ff",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PortRole::In => "in",
            PortRole::Out => "out",
            PortRole::Additional => "additional",
        }
    }
}

impl FromStr for PortRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "in" => Ok(PortRole::In),
            "out" => Ok(PortRole::Out),
            "additional" => Ok(PortRole::Additional),
            other => Err(format!("unknown port role `{other}`")),
        }
    }
}

/// A connection point on a node.
///
/// `local_position` is an offset from the node center. The role is private so
/// it cannot change after construction.
#[derive(Clone, Debug, PartialEq)]
pub struct Port {
    role: PortRole,
    pub local_position: Point,
    pub color: String,
    pub protocol: Option<String>,
    pub port_number: Option<u16>,
    pub is_encrypted: bool,
    pub requires_authentication: bool,
}

impl Port {
    pub fn new(role: PortRole, local_position: Point) -> Self {
        Self {
            role,
            local_position,
            color: role.default_color().to_string(),
            protocol: None,
            port_number: None,
            is_encrypted: false,
            requires_authentication: false,
        }
    }

    pub fn role(&self) -> PortRole {
        self.role
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Node kinds
// ────────────────────────────────────────────────────────────────────────────

/// Closed catalog of component types a node can represent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    AwsEc2,
    AwsS3,
    AwsLambda,
    AwsRds,
    AwsDynamoDb,
    AwsEks,
    AwsEcs,
    AwsApiGateway,
    AwsSqs,
    AwsSns,
    AwsElasticBeanstalk,
    AwsCloudFront,
    AwsAlb,
    AwsNlb,
    AwsWaf,
    AwsVpc,
    AzureVm,
    AzureBlob,
    AzureFunction,
    AzureSql,
    AzureCosmosDb,
    AzureAks,
    AzureContainer,
    AzureAppService,
    AzureQueue,
    AzureEventHub,
    AzureLoadBalancer,
    AzureFirewall,
    AzureVnet,
    Firewall,
    LoadBalancer,
    WebApp,
    Api,
    /// Anything not in the catalog (kept so hand-edited documents still load).
    Generic,
}

const KIND_NAMES: &[(NodeKind, &str)] = &[
    (NodeKind::AwsEc2, "AWSEC2"),
    (NodeKind::AwsS3, "AWSS3"),
    (NodeKind::AwsLambda, "AWSLambda"),
    (NodeKind::AwsRds, "AWSRDS"),
    (NodeKind::AwsDynamoDb, "AWSDynamoDB"),
    (NodeKind::AwsEks, "AWSEKS"),
    (NodeKind::AwsEcs, "AWSECS"),
    (NodeKind::AwsApiGateway, "AWSAPIGateway"),
    (NodeKind::AwsSqs, "AWSSQS"),
    (NodeKind::AwsSns, "AWSSNS"),
    (NodeKind::AwsElasticBeanstalk, "AWSEB"),
    (NodeKind::AwsCloudFront, "AWSCloudFront"),
    (NodeKind::AwsAlb, "AWSALB"),
    (NodeKind::AwsNlb, "AWSNLB"),
    (NodeKind::AwsWaf, "AWSWAF"),
    (NodeKind::AwsVpc, "AWSVPC"),
    (NodeKind::AzureVm, "AzureVM"),
    (NodeKind::AzureBlob, "AzureBlob"),
    (NodeKind::AzureFunction, "AzureFunction"),
    (NodeKind::AzureSql, "AzureSQL"),
    (NodeKind::AzureCosmosDb, "AzureCosmosDB"),
    (NodeKind::AzureAks, "AzureAKS"),
    (NodeKind::AzureContainer, "AzureContainer"),
    (NodeKind::AzureAppService, "AzureAppService"),
    (NodeKind::AzureQueue, "AzureQueue"),
    (NodeKind::AzureEventHub, "AzureEventHub"),
    (NodeKind::AzureLoadBalancer, "AzureLoadBalancer"),
    (NodeKind::AzureFirewall, "AzureFirewall"),
    (NodeKind::AzureVnet, "AzureVNet"),
    (NodeKind::Firewall, "Firewall"),
    (NodeKind::LoadBalancer, "LoadBalancer"),
    (NodeKind::WebApp, "WebApp"),
    (NodeKind::Api, "API"),
    (NodeKind::Generic, "Generic"),
];

impl NodeKind {
    /// Wire name used in documents and analysis requests.
    pub fn as_str(self) -> &'static str {
        KIND_NAMES
            .iter()
            .find(|(k, _)| *k == self)
            .map_or("Generic", |(_, name)| name)
    }

    /// Storage and network-boundary kinds carry an `isPublic` flag.
    pub fn has_public_flag(self) -> bool {
        matches!(
            self,
            NodeKind::AwsS3 | NodeKind::AzureBlob | NodeKind::AwsVpc | NodeKind::AzureVnet
        )
    }
}

impl FromStr for NodeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KIND_NAMES
            .iter()
            .find(|(_, name)| *name == s)
            .map(|(k, _)| *k)
            .ok_or_else(|| format!("unknown component type `{s}`"))
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Node
// ────────────────────────────────────────────────────────────────────────────

/// Security flags edited from the element property panel.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SecurityAttributes {
    pub is_encrypted: bool,
    pub implements_authentication_scheme: bool,
    pub sanitizes_input: bool,
    /// Present only for kinds where [`NodeKind::has_public_flag`] is true.
    pub is_public: Option<bool>,
}

impl SecurityAttributes {
    pub fn for_kind(kind: NodeKind) -> Self {
        Self {
            is_public: kind.has_public_flag().then_some(false),
            ..Self::default()
        }
    }
}

/// A placed diagram element.
///
/// `position` is the top-left corner of the node body in world space; port
/// offsets are relative to the body center.
#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub label: String,
    pub sublabel: String,
    pub position: Point,
    pub size: Size,
    pub ports: Vec<Port>,
    pub security: SecurityAttributes,
    /// Locked nodes ignore drag gestures.
    pub locked: bool,
    /// True for read-only palette prototypes.
    pub is_template: bool,
}

impl Node {
    pub fn center(&self) -> Point {
        Point::new(
            self.position.x + self.size.width * 0.5,
            self.position.y + self.size.height * 0.5,
        )
    }

    pub fn port(&self, index: usize) -> Option<&Port> {
        self.ports.get(index)
    }

    /// Index of the first port with the given role.
    pub fn first_port(&self, role: PortRole) -> Option<usize> {
        self.ports.iter().position(|p| p.role() == role)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Connection
// ────────────────────────────────────────────────────────────────────────────

/// Weak reference to a port: node identity plus index into its port list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub node: NodeId,
    pub port: usize,
}

/// Cached world-space endpoints of a connection, refreshed whenever an
/// endpoint node moves.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Route {
    pub from: Point,
    pub to: Point,
}

/// Directed edge from an `out` port to an `in`/`additional` port.
#[derive(Clone, Debug, PartialEq)]
pub struct Connection {
    pub id: ConnectionId,
    pub source: Endpoint,
    pub target: Endpoint,
    pub protocol: String,
    pub is_encrypted: bool,
    pub route: Route,
}

impl Connection {
    pub fn touches(&self, node: NodeId) -> bool {
        self.source.node == node || self.target.node == node
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Boundary
// ────────────────────────────────────────────────────────────────────────────

/// A non-owning grouping rectangle. Containment is purely geometric.
#[derive(Clone, Debug, PartialEq)]
pub struct Boundary {
    pub id: BoundaryId,
    pub position: Point,
    pub size: Size,
    pub label: String,
    pub sublabel: String,
    /// Palette templates are hit-tested on their whole interior; placed
    /// boundaries only near their border.
    pub is_template: bool,
    pub locked: bool,
}

// ────────────────────────────────────────────────────────────────────────────
// Analysis results
// ────────────────────────────────────────────────────────────────────────────

/// Selects the external threat feed the backend should consult. Opaque to
/// the engine.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedConfig {
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub custom_url: Option<String>,
}

/// One threat reported by the analysis backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    /// Reassigned on load; ids in a document are not authoritative.
    #[serde(default)]
    pub id: FindingId,
    #[serde(default)]
    pub component: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub threat: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub best_practices: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub comment: String,
    /// Text added by the AI enhancement pass.
    #[serde(default)]
    pub enhancement: Option<String>,
    /// Set when `component` names nothing in the live diagram.
    #[serde(default)]
    pub orphaned: bool,
}

// ────────────────────────────────────────────────────────────────────────────
// Diagram
// ────────────────────────────────────────────────────────────────────────────

/// The aggregate owning every node, connection and boundary of one editing
/// session.
///
/// Ids come from a single counter that is never rewound, not even by
/// [`Diagram::clear`].
#[derive(Clone, Debug, Default)]
pub struct Diagram {
    pub nodes: IndexMap<NodeId, Node>,
    pub connections: IndexMap<ConnectionId, Connection>,
    pub boundaries: IndexMap<BoundaryId, Boundary>,
    pub feed_config: FeedConfig,
    pub findings: Vec<Finding>,
    /// Overview paragraph from the AI enhancement pass.
    pub overview: Option<String>,
    next_id: u64,
}

impl Diagram {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    pub fn connection(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    pub fn boundary(&self, id: BoundaryId) -> Option<&Boundary> {
        self.boundaries.get(&id)
    }

    /// First node (in insertion order) carrying `label`.
    pub fn node_by_label(&self, label: &str) -> Option<&Node> {
        self.nodes.values().find(|n| n.label == label)
    }

    /// Connections whose source or target is `node`.
    pub fn incident_connections(&self, node: NodeId) -> impl Iterator<Item = &Connection> {
        self.connections.values().filter(move |c| c.touches(node))
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.connections.is_empty() && self.boundaries.is_empty()
    }

    /// Drop all content, keeping the id counter.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.connections.clear();
        self.boundaries.clear();
        self.findings.clear();
        self.overview = None;
        self.feed_config = FeedConfig::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_round_trip() {
        for (kind, name) in KIND_NAMES {
            assert_eq!(kind.as_str(), *name);
            assert_eq!(name.parse::<NodeKind>().unwrap(), *kind);
        }
        assert!("Mainframe".parse::<NodeKind>().is_err());
    }

    #[test]
    fn test_public_flag_only_for_storage_and_network() {
        assert_eq!(SecurityAttributes::for_kind(NodeKind::AwsS3).is_public, Some(false));
        assert_eq!(SecurityAttributes::for_kind(NodeKind::AzureVnet).is_public, Some(false));
        assert_eq!(SecurityAttributes::for_kind(NodeKind::WebApp).is_public, None);
    }

    #[test]
    fn test_port_roles() {
        assert!(PortRole::Out.can_start_connection());
        assert!(!PortRole::In.can_start_connection());
        assert!(!PortRole::Additional.can_start_connection());
        assert!(PortRole::In.can_end_connection());
        assert!(PortRole::Additional.can_end_connection());
        assert!(!PortRole::Out.can_end_connection());
        assert_eq!(" OUT ".parse::<PortRole>(), Ok(PortRole::Out));
    }

    #[test]
    fn test_ids_are_never_reused() {
        let mut d = Diagram::new();
        let a = d.allocate_id();
        d.clear();
        let b = d.allocate_id();
        assert!(b > a);
    }
}
