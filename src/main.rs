use anyhow::{Context, Result, bail};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use walkdir::WalkDir;

use threatcanvas::analysis::{
    self, AnalysisRequest, AnalysisResponse, DEFAULT_SYSTEM_NAME, EnhancementResponse,
};
use threatcanvas::document::{self, Document, LoadReport};
use threatcanvas::editor::add_sample_flow;
use threatcanvas::{Diagram, EditorConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Create, check and analyze threat-model diagrams", long_about = None)]
struct Cli {
    /// Editor configuration (TOML); defaults apply when omitted
    #[arg(long, global = true, value_name = "CONFIG")]
    config: Option<Utf8PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a new project file
    New {
        output: Utf8PathBuf,
        /// Seed the project with a web app talking HTTPS to an API
        #[arg(long)]
        sample: bool,
    },
    /// Summarize a project file and list everything a load had to repair
    Inspect { project: Utf8PathBuf },
    /// Load a project, repair it, and write it back out
    Normalize {
        project: Utf8PathBuf,
        /// Output file; stdout when omitted
        #[arg(short, long)]
        output: Option<Utf8PathBuf>,
    },
    /// Print the analysis request for a project
    Request {
        project: Utf8PathBuf,
        #[arg(long, default_value = DEFAULT_SYSTEM_NAME)]
        name: String,
    },
    /// Attach the threats of an analysis response to a project
    ApplyResponse {
        project: Utf8PathBuf,
        response: Utf8PathBuf,
        /// Output file; overwrites the project when omitted
        #[arg(short, long)]
        output: Option<Utf8PathBuf>,
    },
    /// Print the AI enhancement prompt for a project's findings
    Prompt { project: Utf8PathBuf },
    /// Attach an AI enhancement answer to a project's findings
    Enhance {
        project: Utf8PathBuf,
        response: Utf8PathBuf,
        #[arg(short, long)]
        output: Option<Utf8PathBuf>,
    },
    /// Validate every *.json project below a directory
    Check { dir: Utf8PathBuf },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EditorConfig::load(path).with_context(|| format!("Load config {}", path))?,
        None => EditorConfig::default(),
    };

    match cli.command {
        Command::New { output, sample } => {
            let mut diagram = Diagram::new();
            if sample {
                add_sample_flow(&mut diagram, &config)?;
            }
            save(&document::serialize(&diagram), &output)?;
        }
        Command::Inspect { project } => {
            let (diagram, report) = open(&project, &config)?;
            print_summary(&project, &diagram, &report);
        }
        Command::Normalize { project, output } => {
            let (diagram, _) = open(&project, &config)?;
            let doc = document::serialize(&diagram);
            match output {
                Some(out) => save(&doc, &out)?,
                None => println!("{}", doc.to_json_pretty()?),
            }
        }
        Command::Request { project, name } => {
            let (diagram, _) = open(&project, &config)?;
            println!("{}", AnalysisRequest::from_diagram(&name, &diagram).to_json_pretty()?);
        }
        Command::ApplyResponse { project, response, output } => {
            let (mut diagram, _) = open(&project, &config)?;
            let text = std::fs::read_to_string(&response).with_context(|| format!("Open {}", response))?;
            let response = AnalysisResponse::from_json(&text)
                .with_context(|| format!("Failed to parse {}", response))?;
            let applied = analysis::apply_findings(&mut diagram, &response.threats);
            println!(
                "{} findings attached ({} orphaned); report: {}",
                applied.attached.len(),
                applied.orphaned.len(),
                response.report
            );
            if let Some(csv) = &response.csv {
                println!("csv: {}", csv);
            }
            save(&document::serialize(&diagram), output.as_deref().unwrap_or(&project))?;
        }
        Command::Prompt { project } => {
            let (diagram, _) = open(&project, &config)?;
            print!("{}", analysis::enhancement_prompt(&diagram));
        }
        Command::Enhance { project, response, output } => {
            let (mut diagram, _) = open(&project, &config)?;
            let text = std::fs::read_to_string(&response).with_context(|| format!("Open {}", response))?;
            let response = EnhancementResponse::from_json(&text)
                .with_context(|| format!("Failed to parse {}", response))?;
            let unknown = analysis::apply_enhancements(&mut diagram, &response);
            for id in &unknown {
                eprintln!("warning: no finding with id {}", id.0);
            }
            save(&document::serialize(&diagram), output.as_deref().unwrap_or(&project))?;
        }
        Command::Check { dir } => check_dir(&dir, &config)?,
    }
    Ok(())
}

fn open(path: &Utf8Path, config: &EditorConfig) -> Result<(Diagram, LoadReport)> {
    let doc = Document::load(path).with_context(|| format!("Failed to load {}", path))?;
    let mut diagram = Diagram::new();
    let report = document::load_into(&mut diagram, &doc, config);
    Ok((diagram, report))
}

fn save(doc: &Document, path: &Utf8Path) -> Result<()> {
    doc.save(path).with_context(|| format!("Write {}", path))
}

fn print_summary(path: &Utf8Path, diagram: &Diagram, report: &LoadReport) {
    println!("{}", path);
    println!(
        "  {} nodes, {} connections, {} boundaries, {} findings",
        report.nodes,
        report.connections,
        report.boundaries,
        diagram.findings.len()
    );
    for repair in &report.repairs {
        println!("  repaired: {}", repair);
    }
    for skipped in &report.skipped_flows {
        println!(
            "  skipped flow #{} {} -> {}: {}",
            skipped.index, skipped.from, skipped.to, skipped.reason
        );
    }
    for label in &report.duplicate_labels {
        println!("  duplicate label: {}", label);
    }
    for f in diagram.findings.iter().filter(|f| f.orphaned) {
        println!("  orphaned finding {}: {} ({})", f.id.0, f.threat, f.component);
    }
}

fn check_dir(dir: &Utf8Path, config: &EditorConfig) -> Result<()> {
    let files: Vec<Utf8PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| Utf8PathBuf::from_path_buf(e.into_path()).ok())
        .filter(|p| p.extension() == Some("json"))
        .collect();

    let results: Vec<(Utf8PathBuf, Result<LoadReport>)> = files
        .into_par_iter()
        .map(|path| {
            let result = open(&path, config).map(|(_, report)| report);
            (path, result)
        })
        .collect();

    let mut failed = 0;
    for (path, result) in &results {
        match result {
            Ok(report) if report.is_clean() => println!("ok      {}", path),
            Ok(report) => println!(
                "warn    {} ({} repairs, {} skipped flows, {} duplicate labels)",
                path,
                report.repairs.len(),
                report.skipped_flows.len(),
                report.duplicate_labels.len()
            ),
            Err(err) => {
                failed += 1;
                println!("error   {}: {:#}", path, err);
            }
        }
    }
    if failed > 0 {
        bail!("{} of {} projects failed to load", failed, results.len());
    }
    Ok(())
}
