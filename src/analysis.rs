//! Threat analysis boundary.
//!
//! The engine does not analyze anything itself. It serializes the diagram
//! into an [`AnalysisRequest`], hands it to an [`AnalysisBackend`], and turns
//! the returned threats into [`Finding`]s attached to the live diagram.
//!
//! Findings are matched by component label against the diagram as it is when
//! the response is applied, not against the request snapshot, so edits made
//! while a request was outstanding are honored. A finding whose component no
//! longer exists is kept and flagged `orphaned`.
//!
//! The optional AI enhancement pass works the same way: [`enhancement_prompt`]
//! describes the diagram and its findings and asks for a JSON answer keyed by
//! finding id, which [`apply_enhancements`] applies by id.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::document::{self, BoundaryRecord, ElementRecord, FlowRecord};
use crate::error::AnalysisError;
use crate::model::{Diagram, FeedConfig, Finding, FindingId};

/// System name sent when the caller does not provide one.
pub const DEFAULT_SYSTEM_NAME: &str = "Custom System";

/// Feed source whose `customUrl` is forwarded.
const CUSTOM_FEED_SOURCE: &str = "custom";

// ────────────────────────────────────────────────────────────────────────────
// Wire types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    pub name: String,
    pub elements: Vec<ElementRecord>,
    pub flows: Vec<FlowRecord>,
    #[serde(default)]
    pub boundaries: Vec<BoundaryRecord>,
    pub feed_config: FeedConfig,
}

impl AnalysisRequest {
    /// Snapshot the working nodes, flows and boundaries of `diagram`.
    /// Palette templates are not part of the modelled system.
    pub fn from_diagram(name: &str, diagram: &Diagram) -> Self {
        let doc = document::serialize(diagram);
        Self {
            name: name.to_string(),
            elements: doc.elements.into_iter().filter(|e| !e.is_template_instance).collect(),
            flows: doc.flows,
            boundaries: doc.boundaries.into_iter().filter(|b| !b.is_template_instance).collect(),
            feed_config: sanitize_feed(&diagram.feed_config),
        }
    }

    pub fn to_json_pretty(&self) -> Result<String, AnalysisError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Drop `customUrl` unless the custom source is selected.
pub fn sanitize_feed(feed: &FeedConfig) -> FeedConfig {
    let mut out = feed.clone();
    if out.source != CUSTOM_FEED_SOURCE {
        out.custom_url = None;
    }
    out
}

/// One threat as reported by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatRecord {
    pub component: String,
    #[serde(default)]
    pub reason: String,
    pub threat: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub best_practices: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    /// Reference to the rendered report.
    pub report: String,
    #[serde(default)]
    pub csv: Option<String>,
    #[serde(default)]
    pub threats: Vec<ThreatRecord>,
}

impl AnalysisResponse {
    pub fn from_json(text: &str) -> Result<Self, AnalysisError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Report references for a model the backend generated on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoModelResponse {
    pub report: String,
    #[serde(default)]
    pub csv: Option<String>,
}

impl AutoModelResponse {
    pub fn from_json(text: &str) -> Result<Self, AnalysisError> {
        Ok(serde_json::from_str(text)?)
    }
}

impl From<AnalysisResponse> for AutoModelResponse {
    fn from(response: AnalysisResponse) -> Self {
        Self {
            report: response.report,
            csv: response.csv,
        }
    }
}

/// Anything that can turn a request into threats: an HTTP client, a local
/// rules engine, a test double.
pub trait AnalysisBackend {
    fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResponse, AnalysisError>;

    /// Ask the backend to build a cloud model from the account it is wired
    /// to. Backends without that capability keep the default.
    fn auto_model(&self) -> Result<AutoModelResponse, AnalysisError> {
        Err(AnalysisError::Backend("automatic modeling is not supported".to_string()))
    }
}

/// Request an auto-generated model. The diagram is not touched; only report
/// references come back.
pub fn run_auto_model(backend: &dyn AnalysisBackend) -> Result<AutoModelResponse, AnalysisError> {
    let response = backend.auto_model()?;
    info!(report = %response.report, csv = ?response.csv, "auto model generated");
    Ok(response)
}

// ────────────────────────────────────────────────────────────────────────────
// Findings
// ────────────────────────────────────────────────────────────────────────────

/// How a set of threats landed on the diagram.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindingsReport {
    pub attached: Vec<FindingId>,
    /// Findings whose component matches no live node label.
    pub orphaned: Vec<FindingId>,
}

/// Result of a successful [`run_analysis`].
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOutcome {
    pub report: String,
    pub csv: Option<String>,
    pub findings: FindingsReport,
}

/// Send `diagram` to `backend` and attach the returned threats.
///
/// On error the diagram is left unmodified.
pub fn run_analysis(
    diagram: &mut Diagram,
    backend: &dyn AnalysisBackend,
    name: &str,
) -> Result<AnalysisOutcome, AnalysisError> {
    let request = AnalysisRequest::from_diagram(name, diagram);
    debug!(
        elements = request.elements.len(),
        flows = request.flows.len(),
        "sending analysis request"
    );
    let response = backend.analyze(&request)?;
    let findings = apply_findings(diagram, &response.threats);
    info!(
        threats = response.threats.len(),
        orphaned = findings.orphaned.len(),
        report = %response.report,
        "analysis applied"
    );
    Ok(AnalysisOutcome {
        report: response.report,
        csv: response.csv,
        findings,
    })
}

/// Replace the diagram's findings with `threats`.
pub fn apply_findings(diagram: &mut Diagram, threats: &[ThreatRecord]) -> FindingsReport {
    let mut report = FindingsReport::default();
    diagram.findings.clear();
    diagram.overview = None;
    for t in threats {
        let id = FindingId(diagram.allocate_id());
        let orphaned = diagram.node_by_label(&t.component).is_none();
        if orphaned {
            warn!(component = %t.component, finding = %id, "finding names no live component");
            report.orphaned.push(id);
        }
        report.attached.push(id);
        diagram.findings.push(Finding {
            id,
            component: t.component.clone(),
            reason: t.reason.clone(),
            threat: t.threat.clone(),
            severity: t.severity.clone(),
            best_practices: t.best_practices.clone(),
            status: t.status.clone().unwrap_or_default(),
            comment: t.comment.clone().unwrap_or_default(),
            enhancement: None,
            orphaned,
        });
    }
    report
}

/// Recompute `orphaned` against the current node labels. Returns how many
/// findings are orphaned afterwards.
pub fn refresh_orphans(diagram: &mut Diagram) -> usize {
    let live: Vec<bool> = diagram
        .findings
        .iter()
        .map(|f| diagram.node_by_label(&f.component).is_some())
        .collect();
    for (f, alive) in diagram.findings.iter_mut().zip(live) {
        f.orphaned = !alive;
    }
    diagram.findings.iter().filter(|f| f.orphaned).count()
}

// ────────────────────────────────────────────────────────────────────────────
// AI enhancement
// ────────────────────────────────────────────────────────────────────────────

/// Natural-language prompt describing the system and its findings.
pub fn enhancement_prompt(diagram: &Diagram) -> String {
    let yes_no = |b: bool| if b { "yes" } else { "no" };
    let mut prompt = String::from(
        "You are reviewing the threat model of a cloud system.\n\nComponents:\n",
    );
    for n in diagram.nodes.values().filter(|n| !n.is_template) {
        let s = &n.security;
        prompt.push_str(&format!(
            "- {} ({}): encrypted: {}, authentication: {}, sanitizes input: {}",
            n.label,
            n.kind,
            yes_no(s.is_encrypted),
            yes_no(s.implements_authentication_scheme),
            yes_no(s.sanitizes_input),
        ));
        if let Some(public) = s.is_public {
            prompt.push_str(&format!(", public: {}", yes_no(public)));
        }
        prompt.push('\n');
    }

    prompt.push_str("\nData flows:\n");
    for c in diagram.connections.values() {
        let (Some(from), Some(to)) = (diagram.node(c.source.node), diagram.node(c.target.node)) else {
            continue;
        };
        prompt.push_str(&format!(
            "- {} -> {} over {} ({})\n",
            from.label,
            to.label,
            c.protocol,
            if c.is_encrypted { "encrypted" } else { "unencrypted" },
        ));
    }

    prompt.push_str("\nThreats:\n");
    for f in &diagram.findings {
        prompt.push_str(&format!(
            "- [{}] {}: {} (severity: {}). {}\n",
            f.id.0, f.component, f.threat, f.severity, f.reason
        ));
    }

    prompt.push_str(
        "\nAnswer with JSON only, in the form \
         {\"overview\": \"...\", \"enhancements\": [{\"findingId\": <number>, \"text\": \"...\"}]}. \
         Give an overview of the system's security posture and one enhancement per threat, \
         using the number in brackets as findingId.\n",
    );
    prompt
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enhancement {
    pub finding_id: FindingId,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhancementResponse {
    #[serde(default)]
    pub overview: String,
    #[serde(default)]
    pub enhancements: Vec<Enhancement>,
}

impl EnhancementResponse {
    pub fn from_json(text: &str) -> Result<Self, AnalysisError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Attach enhancements to findings by id. Returns the ids that matched no
/// finding.
pub fn apply_enhancements(diagram: &mut Diagram, response: &EnhancementResponse) -> Vec<FindingId> {
    if !response.overview.is_empty() {
        diagram.overview = Some(response.overview.clone());
    }
    let mut unknown = Vec::new();
    for e in &response.enhancements {
        match diagram.findings.iter_mut().find(|f| f.id == e.finding_id) {
            Some(f) => f.enhancement = Some(e.text.clone()),
            None => {
                warn!(finding = %e.finding_id, "enhancement for unknown finding");
                unknown.push(e.finding_id);
            }
        }
    }
    unknown
}
