//! Compliance Scan CLI

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use scap_core::{
    document_type_from_probe, eval_type_for_document, parse_truthy, ComplianceScanner,
    ScanBackend, ScanReport, ScanRequest, DEFAULT_REGISTRY_DRIVER,
};
use scap_fetch::UriFetcher;
use scap_tools::{Buildah, Oscap};

#[derive(Parser)]
#[command(name = "scap-scan")]
#[command(about = "OpenSCAP compliance and vulnerability scanning for container images")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a container image against an OpenSCAP definitions source
    Scan {
        /// Container image to scan
        #[arg(short, long)]
        image: String,

        /// Definitions URI (file://|http://|https://, .xml|.bz2)
        #[arg(short, long)]
        definitions: String,

        /// Registry driver prefix for the pull source
        #[arg(long, default_value = DEFAULT_REGISTRY_DRIVER)]
        registry_type: String,

        /// OpenSCAP profile to evaluate
        #[arg(short, long)]
        profile: Option<String>,

        /// Tailoring file URI (same restrictions as --definitions)
        #[arg(short, long)]
        tailoring: Option<String>,

        /// Fetch remote resources referenced by the definitions
        #[arg(long, default_value = "true")]
        fetch_remote_resources: String,

        /// Working directory for artifacts (a fresh temporary directory if unset)
        #[arg(short, long)]
        workdir: Option<PathBuf>,

        /// Emit the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the detected document type of a local definitions file
    DocType {
        /// Path to a definitions file
        #[arg(short, long)]
        file: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");

    match cli.command {
        Commands::Scan {
            image,
            definitions,
            registry_type,
            profile,
            tailoring,
            fetch_remote_resources,
            workdir,
            json,
        } => {
            cmd_scan(
                image,
                definitions,
                registry_type,
                profile,
                tailoring,
                fetch_remote_resources,
                workdir,
                json,
            );
        }
        Commands::DocType { file } => {
            cmd_doc_type(file);
        }
    }
}

fn cmd_scan(
    image: String,
    definitions: String,
    registry_type: String,
    profile: Option<String>,
    tailoring: Option<String>,
    fetch_remote_resources: String,
    workdir: Option<PathBuf>,
    json: bool,
) {
    let fetch_remote = match parse_truthy(&fetch_remote_resources) {
        Ok(value) => value,
        Err(e) => {
            error!("--fetch-remote-resources: {e}");
            std::process::exit(1);
        }
    };

    let mut request = ScanRequest::new(image, definitions);
    request.registry_driver = registry_type;
    request.profile = profile;
    request.tailoring_uri = tailoring;
    request.fetch_remote_resources = fetch_remote;

    let work_dir = match workdir {
        Some(dir) => dir,
        None => match tempfile::Builder::new().prefix("scap-scan-").tempdir() {
            Ok(dir) => dir.into_path(),
            Err(e) => {
                error!("Failed to create working directory: {e}");
                std::process::exit(1);
            }
        },
    };

    let buildah = match Buildah::new() {
        Ok(tool) => tool,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };
    let oscap = match Oscap::new() {
        Ok(tool) => tool,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    let scanner = ComplianceScanner::new(
        Box::new(buildah),
        Box::new(UriFetcher::new()),
        Box::new(oscap),
    );

    info!("Scanning image: {}", request.image_ref);
    let report = scanner.run(&request, &work_dir);

    if json {
        match serde_json::to_string_pretty(&report) {
            Ok(rendered) => println!("{rendered}"),
            Err(e) => {
                error!("Failed to render report: {e}");
                std::process::exit(1);
            }
        }
    } else {
        print_report(&report);
    }

    if !report.success {
        std::process::exit(1);
    }
}

fn print_report(report: &ScanReport) {
    println!("\nCompliance Scan Report\n{}", "=".repeat(50));
    println!("Image:   {}", report.image_ref);
    println!("Scan id: {}", report.id);
    println!(
        "Result:  {}",
        if report.success { "PASS" } else { "FAIL" }
    );
    if !report.message.is_empty() {
        println!("\n{}", report.message);
    }
    if !report.artifacts.is_empty() {
        println!("\nArtifacts:");
        for artifact in &report.artifacts {
            println!("  {}: {}", artifact.name, artifact.path.display());
        }
    }
    if !report.evidence.is_empty() {
        println!("\nEvidence:");
        for evidence in &report.evidence {
            println!("  {}: {}", evidence.name, evidence.value);
        }
    }
}

fn cmd_doc_type(file: PathBuf) {
    if !file.exists() {
        error!("File not found: {}", file.display());
        std::process::exit(1);
    }

    let oscap = match Oscap::new() {
        Ok(tool) => tool,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    match oscap
        .probe_info(&file)
        .and_then(|probe_output| document_type_from_probe(&probe_output))
    {
        Ok(document_type) => {
            println!("Document type: {document_type}");
            match eval_type_for_document(&document_type) {
                Ok(eval_type) => println!("Eval type: {eval_type}"),
                Err(_) => println!("Eval type: unsupported"),
            }
        }
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    }
}
