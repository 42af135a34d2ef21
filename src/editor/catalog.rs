//! Palette of component templates.
//!
//! The catalog is static configuration: a list of `{type, label, isBoundary}`
//! entries. [`Palette`] turns it into a read-only template surface laid out
//! in a single column, and clones templates onto the working diagram.
//!
//! # Usage
//!
//! ```rust,ignore
//! use threatcanvas::editor::catalog::{default_catalog, Palette};
//!
//! let palette = Palette::from_catalog(default_catalog(), &config);
//! let placed = palette.instantiate(palette.templates()[0], &mut diagram, &config);
//! ```

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::EditorConfig;
use crate::model::{BoundaryId, Diagram, NodeId, NodeKind, Point};

use super::operations::{add_boundary, add_node, create_default_boundary, create_default_node};

/// Vertical distance between consecutive palette templates.
pub const PALETTE_ROW_HEIGHT: f32 = 60.0;
/// Left and top margin of the palette column.
pub const PALETTE_MARGIN: f32 = 10.0;

/// A single entry in the component catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    /// Component type wire name (e.g. `"AWSS3"`).
    #[serde(rename = "type")]
    pub kind: String,
    pub label: String,
    #[serde(default)]
    pub is_boundary: bool,
}

impl CatalogEntry {
    /// Case-insensitive substring match on type or label.
    pub fn matches_query(&self, query: &str) -> bool {
        if query.is_empty() {
            return true;
        }
        let q = query.to_lowercase();
        self.kind.to_lowercase().contains(&q) || self.label.to_lowercase().contains(&q)
    }
}

fn entry(kind: &str, label: &str) -> CatalogEntry {
    CatalogEntry {
        kind: kind.to_string(),
        label: label.to_string(),
        is_boundary: false,
    }
}

/// The built-in catalog: cloud and generic components plus a trust boundary.
pub fn default_catalog() -> &'static [CatalogEntry] {
    static CATALOG: Lazy<Vec<CatalogEntry>> = Lazy::new(build_catalog);
    &CATALOG
}

fn build_catalog() -> Vec<CatalogEntry> {
    let mut c = Vec::with_capacity(34);

    // ── AWS ──────────────────────────────────────────────────────────────
    c.push(entry("AWSEC2", "AWS EC2"));
    c.push(entry("AWSS3", "AWS S3"));
    c.push(entry("AWSLambda", "AWS Lambda"));
    c.push(entry("AWSRDS", "AWS RDS"));
    c.push(entry("AWSDynamoDB", "AWS DynamoDB"));
    c.push(entry("AWSEKS", "AWS EKS"));
    c.push(entry("AWSECS", "AWS ECS"));
    c.push(entry("AWSAPIGateway", "AWS API Gateway"));
    c.push(entry("AWSSQS", "AWS SQS"));
    c.push(entry("AWSSNS", "AWS SNS"));
    c.push(entry("AWSEB", "AWS Elastic Beanstalk"));
    c.push(entry("AWSCloudFront", "AWS CloudFront"));
    c.push(entry("AWSALB", "AWS ALB"));
    c.push(entry("AWSNLB", "AWS NLB"));
    c.push(entry("AWSWAF", "AWS WAF"));
    c.push(entry("AWSVPC", "AWS VPC"));

    // ── Azure ────────────────────────────────────────────────────────────
    c.push(entry("AzureVM", "Azure VM"));
    c.push(entry("AzureBlob", "Azure Blob"));
    c.push(entry("AzureFunction", "Azure Function"));
    c.push(entry("AzureSQL", "Azure SQL"));
    c.push(entry("AzureCosmosDB", "Azure Cosmos DB"));
    c.push(entry("AzureAKS", "Azure AKS"));
    c.push(entry("AzureContainer", "Azure Container"));
    c.push(entry("AzureAppService", "Azure App Service"));
    c.push(entry("AzureQueue", "Azure Queue"));
    c.push(entry("AzureEventHub", "Azure Event Hub"));
    c.push(entry("AzureLoadBalancer", "Azure LB"));
    c.push(entry("AzureFirewall", "Azure Firewall"));
    c.push(entry("AzureVNet", "Azure VNet"));

    // ── Generic ──────────────────────────────────────────────────────────
    c.push(entry("Firewall", "Firewall"));
    c.push(entry("LoadBalancer", "Load Balancer"));
    c.push(entry("WebApp", "Web App"));
    c.push(entry("API", "API"));

    c.push(CatalogEntry {
        kind: "Boundary".to_string(),
        label: "Trust Boundary".to_string(),
        is_boundary: true,
    });
    c
}

/// Reference to a template living on the palette surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateRef {
    Node(NodeId),
    Boundary(BoundaryId),
}

/// What [`Palette::instantiate`] placed on the working diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placed {
    Node(NodeId),
    Boundary(BoundaryId),
}

/// Read-only template surface.
///
/// Templates are locked, flagged `is_template`, and never handed out
/// mutably.
#[derive(Debug, Clone)]
pub struct Palette {
    surface: Diagram,
    templates: Vec<TemplateRef>,
}

impl Palette {
    pub fn from_catalog(entries: &[CatalogEntry], config: &EditorConfig) -> Self {
        let mut surface = Diagram::new();
        let mut templates = Vec::with_capacity(entries.len());
        for (index, e) in entries.iter().enumerate() {
            let position = Point::new(PALETTE_MARGIN, PALETTE_MARGIN + index as f32 * PALETTE_ROW_HEIGHT);
            if e.is_boundary {
                let mut b = create_default_boundary(&e.label, position, config.node_size);
                b.is_template = true;
                b.locked = true;
                templates.push(TemplateRef::Boundary(add_boundary(&mut surface, b)));
            } else {
                let kind = e.kind.parse::<NodeKind>().unwrap_or_else(|err| {
                    warn!(%err, "catalog entry has an unknown type; using Generic");
                    NodeKind::Generic
                });
                let mut n = create_default_node(kind, &e.label, position, config.node_size);
                n.is_template = true;
                n.locked = true;
                templates.push(TemplateRef::Node(add_node(&mut surface, n)));
            }
        }
        Self { surface, templates }
    }

    /// The palette surface, for hit-testing and rendering.
    pub fn surface(&self) -> &Diagram {
        &self.surface
    }

    /// Templates in catalog order.
    pub fn templates(&self) -> &[TemplateRef] {
        &self.templates
    }

    /// Clone a template onto `target` at the configured drop position.
    ///
    /// Node copies keep kind, label, sublabel, ports and security attributes;
    /// boundary copies keep label and sublabel and take the configured
    /// boundary size. The copy is unlocked. The template is left as is.
    pub fn instantiate(
        &self,
        template: TemplateRef,
        target: &mut Diagram,
        config: &EditorConfig,
    ) -> Option<Placed> {
        match template {
            TemplateRef::Node(id) => {
                let mut copy = self.surface.node(id)?.clone();
                copy.position = config.drop_position;
                copy.locked = false;
                copy.is_template = false;
                Some(Placed::Node(add_node(target, copy)))
            }
            TemplateRef::Boundary(id) => {
                let mut copy = self.surface.boundary(id)?.clone();
                copy.position = config.drop_position;
                copy.size = config.boundary_size;
                copy.locked = false;
                copy.is_template = false;
                Some(Placed::Boundary(add_boundary(target, copy)))
            }
        }
    }
}
