//! Portable project document.
//!
//! A [`Document`] is the JSON form of a [`Diagram`]. Nodes carry no ids:
//! flows name their endpoints by node label, and are re-attached on load to
//! the first `out` port of the `from` node and the first `in` port of the
//! `to` node. Labels are therefore expected to be unique; when they are not,
//! the first node with the label wins and the collision is reported.
//!
//! Loading is two-phase: every element and boundary is instantiated before any
//! flow is resolved. Defects in the input are repaired or skipped, never
//! fatal:
//!
//! - a missing or malformed port array becomes the default `in`/`out` pair;
//! - a non-numeric position falls back to the configured drop position;
//! - a flow whose endpoints cannot be resolved is skipped.
//!
//! Everything repaired or skipped is listed in the returned [`LoadReport`].

use camino::Utf8Path;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::config::EditorConfig;
use crate::editor::operations::{
    add_boundary, add_connection, add_node, create_default_boundary, create_default_node,
};
use crate::error::DocumentError;
use crate::geometry;
use crate::model::{
    Diagram, FeedConfig, Finding, FindingId, NodeId, NodeKind, Point, Port, PortRole,
    SecurityAttributes, Size,
};

// ────────────────────────────────────────────────────────────────────────────
// Records
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    #[serde(default)]
    pub elements: Vec<ElementRecord>,
    #[serde(default)]
    pub boundaries: Vec<BoundaryRecord>,
    #[serde(default)]
    pub flows: Vec<FlowRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feed_config: Option<FeedConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub findings: Vec<Finding>,
}

/// One node. Geometry fields stay untyped so hand-edited values can be
/// repaired instead of rejecting the whole document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementRecord {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub sublabel: String,
    #[serde(default)]
    pub position: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub size: Value,
    #[serde(default)]
    pub ports: Value,
    #[serde(default)]
    pub is_encrypted: bool,
    #[serde(default)]
    pub implements_authentication_scheme: bool,
    #[serde(default)]
    pub sanitizes_input: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_public: Option<bool>,
    /// Palette template; loaded locked and excluded from flows.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_template_instance: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortRecord {
    pub role: PortRole,
    #[serde(default)]
    pub color: Option<String>,
    pub position: Point,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_number: Option<u16>,
    #[serde(default)]
    pub is_encrypted: bool,
    #[serde(default)]
    pub requires_authentication: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundaryRecord {
    #[serde(default)]
    pub position: Value,
    #[serde(default)]
    pub size: Value,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub sublabel: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_template_instance: bool,
}

/// A connection, naming its endpoint nodes by label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowRecord {
    /// Empty when missing; such flows are skipped on load.
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    /// Display label of the edge; mirrors the protocol.
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub is_encrypted: bool,
}

impl Document {
    pub fn from_json(text: &str) -> Result<Self, DocumentError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, DocumentError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Read a project file.
    pub fn load(path: &Utf8Path) -> Result<Self, DocumentError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Write a project file.
    pub fn save(&self, path: &Utf8Path) -> Result<(), DocumentError> {
        std::fs::write(path, self.to_json_pretty()?)?;
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Lenient value readers
// ────────────────────────────────────────────────────────────────────────────

fn lenient_number(v: &Value) -> Option<f32> {
    let n = match v {
        Value::Number(n) => n.as_f64()? as f32,
        Value::String(s) => s.trim().parse::<f32>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

fn lenient_pair(v: &Value, a: &str, b: &str) -> Option<(f32, f32)> {
    Some((lenient_number(v.get(a)?)?, lenient_number(v.get(b)?)?))
}

fn lenient_point(v: &Value) -> Option<Point> {
    lenient_pair(v, "x", "y").map(|(x, y)| Point::new(x, y))
}

fn lenient_size(v: &Value) -> Option<Size> {
    lenient_pair(v, "width", "height")
        .filter(|(w, h)| *w > 0.0 && *h > 0.0)
        .map(|(w, h)| Size::new(w, h))
}

/// Typed ports, or `None` when the array is missing, empty, has a malformed
/// entry, or lacks an `in` or `out` port.
fn parse_ports(v: &Value) -> Option<Vec<Port>> {
    let records: Vec<PortRecord> = serde_json::from_value(v.clone()).ok()?;
    let has = |role| records.iter().any(|r| r.role == role);
    if !has(PortRole::In) || !has(PortRole::Out) || !records.iter().all(|r| r.position.is_finite()) {
        return None;
    }
    Some(
        records
            .into_iter()
            .map(|r| {
                let mut p = Port::new(r.role, r.position);
                if let Some(color) = r.color {
                    p.color = color;
                }
                p.protocol = r.protocol;
                p.port_number = r.port_number;
                p.is_encrypted = r.is_encrypted;
                p.requires_authentication = r.requires_authentication;
                p
            })
            .collect(),
    )
}

fn port_record(p: &Port) -> PortRecord {
    PortRecord {
        role: p.role(),
        color: Some(p.color.clone()),
        position: p.local_position,
        protocol: p.protocol.clone(),
        port_number: p.port_number,
        is_encrypted: p.is_encrypted,
        requires_authentication: p.requires_authentication,
    }
}

fn to_value<T: Serialize>(v: &T) -> Value {
    // Plain structs of numbers and strings always serialize.
    serde_json::to_value(v).unwrap_or(Value::Null)
}

// ────────────────────────────────────────────────────────────────────────────
// Serialize
// ────────────────────────────────────────────────────────────────────────────

/// Snapshot `diagram` as a portable document.
pub fn serialize(diagram: &Diagram) -> Document {
    let elements = diagram
        .nodes
        .values()
        .map(|n| ElementRecord {
            kind: n.kind.as_str().to_string(),
            label: n.label.clone(),
            sublabel: n.sublabel.clone(),
            position: to_value(&n.position),
            size: to_value(&n.size),
            ports: to_value(&n.ports.iter().map(port_record).collect::<Vec<_>>()),
            is_encrypted: n.security.is_encrypted,
            implements_authentication_scheme: n.security.implements_authentication_scheme,
            sanitizes_input: n.security.sanitizes_input,
            is_public: n.security.is_public,
            is_template_instance: n.is_template,
        })
        .collect();

    let boundaries = diagram
        .boundaries
        .values()
        .map(|b| BoundaryRecord {
            position: to_value(&b.position),
            size: to_value(&b.size),
            label: b.label.clone(),
            sublabel: b.sublabel.clone(),
            is_template_instance: b.is_template,
        })
        .collect();

    let flows = diagram
        .connections
        .values()
        .filter_map(|c| {
            let from = diagram.node(c.source.node)?;
            let to = diagram.node(c.target.node)?;
            Some(FlowRecord {
                from: from.label.clone(),
                to: to.label.clone(),
                label: c.protocol.clone(),
                protocol: c.protocol.clone(),
                is_encrypted: c.is_encrypted,
            })
        })
        .collect();

    Document {
        elements,
        boundaries,
        flows,
        feed_config: (diagram.feed_config != FeedConfig::default())
            .then(|| diagram.feed_config.clone()),
        findings: diagram.findings.clone(),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Deserialize
// ────────────────────────────────────────────────────────────────────────────

/// A flow that could not be attached.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedFlow {
    /// Position in `Document::flows`.
    pub index: usize,
    pub from: String,
    pub to: String,
    pub reason: String,
}

/// What a load produced and what it had to repair.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    pub nodes: usize,
    pub boundaries: usize,
    pub connections: usize,
    /// One line per repaired defect.
    pub repairs: Vec<String>,
    pub skipped_flows: Vec<SkippedFlow>,
    /// Labels carried by more than one node.
    pub duplicate_labels: Vec<String>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.repairs.is_empty() && self.skipped_flows.is_empty() && self.duplicate_labels.is_empty()
    }
}

/// Build a fresh diagram from `doc` with default settings.
pub fn deserialize(doc: &Document) -> Diagram {
    let mut diagram = Diagram::new();
    load_into(&mut diagram, doc, &EditorConfig::default());
    diagram
}

/// Clear `diagram` and rebuild it from `doc`.
pub fn load_into(diagram: &mut Diagram, doc: &Document, config: &EditorConfig) -> LoadReport {
    let mut report = LoadReport::default();
    diagram.clear();

    // Phase 1: nodes and boundaries.
    let mut by_label: IndexMap<String, NodeId> = IndexMap::new();
    for (index, rec) in doc.elements.iter().enumerate() {
        let id = load_element(diagram, index, rec, config, &mut report);
        // Templates never connect, so flows must not bind to them.
        if rec.is_template_instance || rec.label.is_empty() {
            continue;
        }
        if by_label.contains_key(&rec.label) {
            warn!(label = %rec.label, "duplicate node label; flows attach to the first one");
            if !report.duplicate_labels.contains(&rec.label) {
                report.duplicate_labels.push(rec.label.clone());
            }
        } else {
            by_label.insert(rec.label.clone(), id);
        }
    }
    for (index, rec) in doc.boundaries.iter().enumerate() {
        let position = lenient_point(&rec.position).unwrap_or_else(|| {
            repair(&mut report, format!("boundary #{index} `{}`: invalid position", rec.label));
            config.drop_position
        });
        let size = lenient_size(&rec.size).unwrap_or_else(|| {
            repair(&mut report, format!("boundary #{index} `{}`: invalid size", rec.label));
            config.boundary_size
        });
        let mut b = create_default_boundary(&rec.label, position, size);
        b.sublabel = rec.sublabel.clone();
        b.is_template = rec.is_template_instance;
        b.locked = rec.is_template_instance;
        add_boundary(diagram, b);
        report.boundaries += 1;
    }

    // Phase 2: flows, now that every node exists.
    for (index, flow) in doc.flows.iter().enumerate() {
        match load_flow(diagram, &by_label, flow) {
            Ok(()) => report.connections += 1,
            Err(reason) => {
                warn!(index, from = %flow.from, to = %flow.to, %reason, "skipping flow");
                report.skipped_flows.push(SkippedFlow {
                    index,
                    from: flow.from.clone(),
                    to: flow.to.clone(),
                    reason,
                });
            }
        }
    }

    if let Some(feed) = &doc.feed_config {
        diagram.feed_config = feed.clone();
    }
    for finding in &doc.findings {
        let mut f = finding.clone();
        f.id = FindingId(diagram.allocate_id());
        diagram.findings.push(f);
    }

    info!(
        nodes = report.nodes,
        boundaries = report.boundaries,
        connections = report.connections,
        skipped = report.skipped_flows.len(),
        repairs = report.repairs.len(),
        "document loaded"
    );
    report
}

fn repair(report: &mut LoadReport, message: String) {
    warn!("{message}");
    report.repairs.push(message);
}

fn load_element(
    diagram: &mut Diagram,
    index: usize,
    rec: &ElementRecord,
    config: &EditorConfig,
    report: &mut LoadReport,
) -> NodeId {
    let kind = rec.kind.parse::<NodeKind>().unwrap_or_else(|err| {
        repair(report, format!("element #{index} `{}`: {err}; using Generic", rec.label));
        NodeKind::Generic
    });
    let position = lenient_point(&rec.position).unwrap_or_else(|| {
        repair(report, format!("element #{index} `{}`: invalid position", rec.label));
        config.drop_position
    });
    // Size is optional; absent means the default body.
    let size = if rec.size.is_null() {
        config.node_size
    } else {
        lenient_size(&rec.size).unwrap_or_else(|| {
            repair(report, format!("element #{index} `{}`: invalid size", rec.label));
            config.node_size
        })
    };

    let mut node = create_default_node(kind, &rec.label, position, size);
    node.sublabel = rec.sublabel.clone();
    node.ports = parse_ports(&rec.ports).unwrap_or_else(|| {
        repair(report, format!("element #{index} `{}`: malformed ports; using in/out pair", rec.label));
        geometry::default_ports(size)
    });
    node.security = SecurityAttributes {
        is_encrypted: rec.is_encrypted,
        implements_authentication_scheme: rec.implements_authentication_scheme,
        sanitizes_input: rec.sanitizes_input,
        is_public: if kind.has_public_flag() {
            Some(rec.is_public.unwrap_or(false))
        } else {
            None
        },
    };
    node.is_template = rec.is_template_instance;
    node.locked = rec.is_template_instance;
    report.nodes += 1;
    add_node(diagram, node)
}

fn load_flow(
    diagram: &mut Diagram,
    by_label: &IndexMap<String, NodeId>,
    flow: &FlowRecord,
) -> Result<(), String> {
    if flow.from.is_empty() || flow.to.is_empty() {
        return Err("flow is missing its `from` or `to` label".to_string());
    }
    let from = *by_label
        .get(&flow.from)
        .ok_or_else(|| format!("no element labelled `{}`", flow.from))?;
    let to = *by_label
        .get(&flow.to)
        .ok_or_else(|| format!("no element labelled `{}`", flow.to))?;
    let out = diagram
        .node(from)
        .and_then(|n| n.first_port(PortRole::Out))
        .ok_or_else(|| format!("`{}` has no out port", flow.from))?;
    let inp = diagram
        .node(to)
        .and_then(|n| n.first_port(PortRole::In))
        .ok_or_else(|| format!("`{}` has no in port", flow.to))?;
    let protocol = if flow.protocol.is_empty() { &flow.label } else { &flow.protocol };
    let id = add_connection(diagram, from, out, to, inp, protocol).map_err(|e| e.to_string())?;
    if let Some(c) = diagram.connections.get_mut(&id) {
        c.is_encrypted = flow.is_encrypted;
    }
    Ok(())
}
