use camino::Utf8PathBuf;
use threatcanvas::config::EditorConfig;
use threatcanvas::document::{self, Document};
use threatcanvas::editor::operations::{
    add_boundary, add_connection, add_node, add_sample_flow, append_port, create_default_boundary,
    create_default_node, set_attribute, AttributeTarget, AttributeValue,
};
use threatcanvas::model::{Diagram, FeedConfig, NodeKind, Point, PortRole, Size};

fn build_model() -> Diagram {
    let mut d = Diagram::new();
    let size = Size::new(130.0, 40.0);
    add_boundary(
        &mut d,
        create_default_boundary("DMZ", Point::new(0.0, 0.0), Size::new(600.0, 300.0)),
    );
    let lb = add_node(&mut d, create_default_node(NodeKind::AwsAlb, "LB", Point::new(20.0, 50.0), size));
    let web = add_node(&mut d, create_default_node(NodeKind::WebApp, "Web", Point::new(220.0, 50.0), size));
    let bucket = add_node(&mut d, create_default_node(NodeKind::AwsS3, "Assets", Point::new(420.0, 50.0), size));
    let side = append_port(&mut d, bucket, 15.0).expect("append");
    add_connection(&mut d, lb, 1, web, 0, "HTTPS").expect("lb -> web");
    add_connection(&mut d, web, 1, bucket, side, "S3").expect("web -> bucket");
    set_attribute(&mut d, AttributeTarget::Node(bucket), "isPublic", AttributeValue::Bool(true))
        .expect("isPublic");
    d
}

#[test]
fn serialize_emits_one_record_per_entity() {
    let d = build_model();
    let doc = document::serialize(&d);
    assert_eq!(doc.elements.len(), 3);
    assert_eq!(doc.flows.len(), 2);
    assert_eq!(doc.boundaries.len(), 1);
    assert_eq!(doc.flows[0].from, "LB");
    assert_eq!(doc.flows[0].to, "Web");
    assert_eq!(doc.flows[0].label, "HTTPS");

    let json: serde_json::Value =
        serde_json::from_str(&doc.to_json_pretty().expect("json")).expect("parse");
    assert_eq!(json["elements"][2]["type"], "AWSS3");
    assert_eq!(json["elements"][2]["isPublic"], true);
    assert!(json["elements"][0].get("isPublic").is_none());
    assert_eq!(json["elements"][2]["ports"][2]["role"], "additional");
    assert_eq!(json["elements"][2]["ports"][2]["color"], "#0000ff");
}

#[test]
fn load_restores_counts_and_attributes() {
    let doc = document::serialize(&build_model());
    let mut d = Diagram::new();
    let report = document::load_into(&mut d, &doc, &EditorConfig::default());
    assert!(report.is_clean(), "{report:?}");
    assert_eq!((report.nodes, report.connections, report.boundaries), (3, 2, 1));
    assert_eq!(d.nodes.len(), 3);
    assert_eq!(d.connections.len(), 2);

    let bucket = d.node_by_label("Assets").expect("bucket");
    assert_eq!(bucket.security.is_public, Some(true));
    assert_eq!(bucket.ports.len(), 3);
    // Flows re-attach to the first in port, not the side port they were drawn to.
    let to_bucket = d
        .connections
        .values()
        .find(|c| c.target.node == bucket.id)
        .expect("flow into bucket");
    assert_eq!(to_bucket.target.port, bucket.first_port(PortRole::In).expect("in"));
}

#[test]
fn sample_flow_round_trips_as_encrypted_https() {
    let mut d = Diagram::new();
    add_sample_flow(&mut d, &EditorConfig::default()).expect("sample");
    let text = document::serialize(&d).to_json_pretty().expect("json");

    let loaded = document::deserialize(&Document::from_json(&text).expect("parse"));
    let c = loaded.connections.values().next().expect("one connection");
    assert_eq!(loaded.node(c.source.node).expect("src").label, "Web App");
    assert_eq!(loaded.node(c.target.node).expect("dst").label, "API");
    assert_eq!(c.protocol, "HTTPS");
    assert!(c.is_encrypted);
    assert_eq!(
        loaded.node_by_label("Web App").expect("web").position,
        Point::new(300.0, 100.0)
    );
}

#[test]
fn feed_config_survives_a_file_round_trip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = Utf8PathBuf::from_path_buf(dir.path().join("model.json")).expect("utf8 path");

    let mut d = build_model();
    d.feed_config = FeedConfig {
        source: "custom".to_string(),
        api_key: None,
        custom_url: Some("https://feeds.example/cve".to_string()),
    };
    document::serialize(&d).save(&path).expect("save");

    let loaded = document::deserialize(&Document::load(&path).expect("load"));
    assert_eq!(loaded.feed_config, d.feed_config);
    assert_eq!(loaded.nodes.len(), 3);
}

#[test]
fn malformed_input_is_repaired_not_rejected() {
    let text = r#"{
        "elements": [
            { "type": "WebApp", "label": "Web", "position": { "x": "40", "y": 60 }, "ports": "broken" },
            { "type": "API", "label": "API", "position": { "x": 300, "y": 60 },
              "ports": [ { "role": "in", "position": { "x": -65, "y": 0 } } ] }
        ],
        "flows": [ { "from": "Web", "to": "API", "label": "gRPC", "protocol": "gRPC" } ]
    }"#;
    let doc = Document::from_json(text).expect("parse");
    let mut d = Diagram::new();
    let report = document::load_into(&mut d, &doc, &EditorConfig::default());

    assert_eq!(report.repairs.len(), 2);
    assert!(report.skipped_flows.is_empty());
    assert_eq!(d.node_by_label("Web").expect("web").position, Point::new(40.0, 60.0));
    assert_eq!(d.node_by_label("API").expect("api").ports.len(), 2);
    assert_eq!(d.connections.values().next().expect("flow").protocol, "gRPC");
}

#[test]
fn flows_and_elements_with_missing_fields_do_not_sink_the_load() {
    let text = r#"{
        "elements": [
            { "type": "WebApp", "label": "Web" },
            { "type": "API", "label": "API" },
            { "position": { "x": 10, "y": 10 } }
        ],
        "flows": [
            { "from": "Web" },
            { "to": "API" },
            { "from": "Web", "to": "API", "protocol": "HTTPS" }
        ],
        "findings": [ { "severity": "Low" } ]
    }"#;
    let doc = Document::from_json(text).expect("missing fields parse as empty");
    let mut d = Diagram::new();
    let report = document::load_into(&mut d, &doc, &EditorConfig::default());

    assert_eq!(report.nodes, 3);
    assert_eq!(report.connections, 1);
    let skipped: Vec<usize> = report.skipped_flows.iter().map(|f| f.index).collect();
    assert_eq!(skipped, vec![0, 1]);
    assert_eq!(d.connections.values().next().expect("flow").protocol, "HTTPS");
    // The unlabelled element loads as a generic node and does not absorb flows.
    assert_eq!(d.nodes.values().nth(2).expect("third").kind, NodeKind::Generic);
    assert_eq!(d.findings.len(), 1);
}

#[test]
fn flows_bind_to_placed_copies_not_templates() {
    let text = r#"{
        "elements": [
            { "type": "API", "label": "API", "isTemplateInstance": true },
            { "type": "WebApp", "label": "Web" },
            { "type": "API", "label": "API", "position": { "x": 400, "y": 0 } }
        ],
        "flows": [ { "from": "Web", "to": "API", "protocol": "HTTP" } ]
    }"#;
    let doc = Document::from_json(text).expect("parse");
    let mut d = Diagram::new();
    let report = document::load_into(&mut d, &doc, &EditorConfig::default());

    assert!(report.skipped_flows.is_empty(), "{:?}", report.skipped_flows);
    assert!(report.duplicate_labels.is_empty());
    let target = d.connections.values().next().expect("flow").target.node;
    let node = d.node(target).expect("target");
    assert!(!node.is_template);
    assert_eq!(node.position, Point::new(400.0, 0.0));
}

#[test]
fn structurally_invalid_json_is_an_error() {
    assert!(Document::from_json("{ \"elements\": 3 }").is_err());
    assert!(Document::from_json("not json").is_err());
}
