use std::cell::RefCell;

use threatcanvas::analysis::{
    apply_findings, run_analysis, AnalysisBackend, AnalysisRequest, AnalysisResponse,
    ThreatRecord,
};
use threatcanvas::config::EditorConfig;
use threatcanvas::document::{self, Document};
use threatcanvas::editor::operations::{add_sample_flow, set_attribute, AttributeTarget, AttributeValue};
use threatcanvas::error::AnalysisError;
use threatcanvas::model::{Diagram, FeedConfig};

/// Records every request and answers with a canned response.
struct RecordingBackend {
    seen: RefCell<Vec<AnalysisRequest>>,
    response: String,
}

impl AnalysisBackend for RecordingBackend {
    fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResponse, AnalysisError> {
        self.seen.borrow_mut().push(request.clone());
        AnalysisResponse::from_json(&self.response)
    }
}

const RESPONSE: &str = r#"{
    "report": "report.pdf",
    "csv": "report.csv",
    "threats": [
        { "component": "API", "reason": "No input validation", "threat": "Injection",
          "severity": "High", "best_practices": "Validate input" },
        { "component": "Web App", "reason": "Session cookies", "threat": "Session hijacking",
          "severity": "Medium", "best_practices": "Secure cookies", "status": "Open" }
    ]
}"#;

fn sample() -> Diagram {
    let mut d = Diagram::new();
    add_sample_flow(&mut d, &EditorConfig::default()).expect("sample");
    d.feed_config = FeedConfig {
        source: "nvd".to_string(),
        api_key: Some("secret".to_string()),
        custom_url: Some("https://ignored.example".to_string()),
    };
    d
}

#[test]
fn run_analysis_sends_the_snapshot_and_attaches_findings() {
    let mut d = sample();
    let backend = RecordingBackend {
        seen: RefCell::new(Vec::new()),
        response: RESPONSE.to_string(),
    };
    let outcome = run_analysis(&mut d, &backend, "Shop").expect("analysis");

    let seen = backend.seen.borrow();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].name, "Shop");
    assert_eq!(seen[0].elements.len(), 2);
    assert_eq!(seen[0].flows[0].protocol, "HTTPS");
    assert_eq!(seen[0].feed_config.custom_url, None);
    assert_eq!(seen[0].feed_config.api_key.as_deref(), Some("secret"));

    assert_eq!(outcome.report, "report.pdf");
    assert_eq!(outcome.csv.as_deref(), Some("report.csv"));
    assert!(outcome.findings.orphaned.is_empty());
    assert_eq!(d.findings.len(), 2);
    assert_eq!(d.findings[1].status, "Open");
    assert_ne!(d.findings[0].id, d.findings[1].id);
}

#[test]
fn malformed_backend_answer_is_a_decode_error() {
    let mut d = sample();
    let backend = RecordingBackend {
        seen: RefCell::new(Vec::new()),
        response: "{ \"threats\": [] }".to_string(),
    };
    let err = run_analysis(&mut d, &backend, "Shop").unwrap_err();
    assert!(matches!(err, AnalysisError::Decode(_)));
    assert!(d.findings.is_empty());
}

#[test]
fn findings_follow_edits_made_while_a_request_was_outstanding() {
    let mut d = sample();
    let _request = AnalysisRequest::from_diagram("Shop", &d);

    // The user renames the API before the response arrives.
    let api = d.node_by_label("API").expect("api").id;
    set_attribute(
        &mut d,
        AttributeTarget::Node(api),
        "label",
        AttributeValue::Text("Orders API".to_string()),
    )
    .expect("rename");

    let response = AnalysisResponse::from_json(RESPONSE).expect("response");
    let report = apply_findings(&mut d, &response.threats);
    assert_eq!(report.orphaned, vec![d.findings[0].id]);
    assert!(d.findings[0].orphaned);
    assert!(!d.findings[1].orphaned);
}

#[test]
fn findings_and_feed_config_persist_in_the_document() {
    let mut d = sample();
    let threats = vec![ThreatRecord {
        component: "API".to_string(),
        reason: "r".to_string(),
        threat: "Injection".to_string(),
        severity: "High".to_string(),
        best_practices: String::new(),
        comment: Some("accepted risk".to_string()),
        status: None,
    }];
    apply_findings(&mut d, &threats);

    let text = document::serialize(&d).to_json_pretty().expect("json");
    let loaded = document::deserialize(&Document::from_json(&text).expect("parse"));
    assert_eq!(loaded.findings.len(), 1);
    assert_eq!(loaded.findings[0].comment, "accepted risk");
    assert_eq!(loaded.feed_config.source, "nvd");
}
