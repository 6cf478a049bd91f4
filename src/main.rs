use clap::{Arg, ArgAction, Command};
use hl7_dicom_bridge::artifacts::ConversionArtifacts;
use hl7_dicom_bridge::batch::process_files;
use hl7_dicom_bridge::config::PipelineConfig;
use hl7_dicom_bridge::extractor;
use hl7_dicom_bridge::payload;
use hl7_dicom_bridge::pipeline::{Pipeline, PipelineOutcome};
use hl7_dicom_bridge::reader::MessageReader;
use log::LevelFilter;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let matches = Command::new("hl7-dicom-bridge")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Convert HL7 ORU messages with embedded PDF reports into DICOM files")
        .long_about(
            "Reads an HL7 result message, decodes the base64 PDF carried in its OBX \
             segments, renders the first page to JPEG and wraps it into a DICOM file \
             with patient and order metadata.\n\
             The source message is moved to the archive directory on success or the \
             error directory on failure.",
        )
        .arg(
            Arg::new("files")
                .value_name("HL7_FILE")
                .help("HL7 message file(s) to convert")
                .num_args(1..)
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("/etc/hl7-dicom-bridge.yaml"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Generate a default configuration file")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("test-config")
                .long("test-config")
                .help("Validate the configuration and check that external tools are installed")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("parse-only")
                .long("parse-only")
                .value_name("FILE")
                .help("Show the fields extracted from a message without converting or moving it")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("jobs")
                .short('j')
                .long("jobs")
                .value_name("N")
                .help("Number of files converted concurrently")
                .value_parser(clap::value_parser!(usize))
                .default_value("1"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable debug logging")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    if let Some(generate_path) = matches.get_one::<String>("generate-config") {
        generate_default_config(generate_path);
        return;
    }

    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("/etc/hl7-dicom-bridge.yaml");

    let config_exists = Path::new(config_path).exists();
    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e:#}");
            process::exit(1);
        }
    };

    init_logging(&config, matches.get_flag("verbose"));
    if !config_exists {
        log::warn!("Configuration file '{config_path}' not found, using default configuration");
    }

    if matches.get_flag("test-config") {
        process::exit(test_config(&config));
    }

    if let Some(file) = matches.get_one::<String>("parse-only") {
        process::exit(parse_only(&config, Path::new(file)));
    }

    let files: Vec<PathBuf> = matches
        .get_many::<String>("files")
        .map(|values| values.map(PathBuf::from).collect())
        .unwrap_or_default();

    if files.is_empty() {
        log::error!("Usage: hl7-dicom-bridge <hl7_file_path>...");
        eprintln!("Usage: hl7-dicom-bridge <hl7_file_path>...");
        process::exit(1);
    }

    let pipeline = match Pipeline::new(config) {
        Ok(pipeline) => Arc::new(pipeline),
        Err(e) => {
            log::error!("Failed to initialize pipeline: {e:#}");
            eprintln!("Failed to initialize pipeline: {e:#}");
            process::exit(1);
        }
    };

    let jobs = matches.get_one::<usize>("jobs").copied().unwrap_or(1);
    for file in &files {
        log::info!("hl7-dicom-bridge started for: {}", file.display());
    }

    let summary = process_files(pipeline, files, jobs).await;

    for report in &summary.reports {
        log::info!(
            "hl7-dicom-bridge finished for {}: {}",
            report.source.display(),
            describe(&report.outcome)
        );
    }
    for file in &summary.crashed {
        log::error!("hl7-dicom-bridge finished: err ({}, worker crashed)", file.display());
    }

    if summary.all_succeeded() {
        process::exit(0);
    }
    process::exit(1);
}

fn load_config(path: &str) -> anyhow::Result<PipelineConfig> {
    if Path::new(path).exists() {
        PipelineConfig::from_file(path)
    } else {
        Ok(PipelineConfig::default())
    }
}

fn generate_default_config(path: &str) {
    let config = PipelineConfig::default();
    match config.to_file(path) {
        Ok(()) => {
            println!("Default configuration written to: {path}");
            println!("Please edit the configuration file to suit your needs.");
        }
        Err(e) => {
            eprintln!("Error writing configuration file: {e:#}");
            process::exit(1);
        }
    }
}

/// Log to stderr, or append to `logging.file` when one is configured.
fn init_logging(config: &PipelineConfig, verbose: bool) {
    let configured = config
        .logging
        .as_ref()
        .and_then(|l| l.level.parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::Info);
    let level = if verbose { LevelFilter::Debug } else { configured };

    let mut builder = env_logger::Builder::new();
    builder.filter_level(level).parse_default_env();

    if let Some(path) = config.logging.as_ref().and_then(|l| l.file.as_ref()) {
        match open_log_file(path) {
            Ok(file) => {
                builder
                    .target(env_logger::Target::Pipe(Box::new(file)))
                    .format(|buf, record| {
                        writeln!(
                            buf,
                            "{} [{}] {}",
                            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                            record.level(),
                            record.args()
                        )
                    });
            }
            Err(e) => eprintln!("Cannot open log file {}: {e}, logging to stderr", path.display()),
        }
    }

    builder.init();
}

/// Open `path` for appending, creating its parent directory first.
fn open_log_file(path: &Path) -> std::io::Result<std::fs::File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::OpenOptions::new().create(true).append(true).open(path)
}

fn find_program(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|path| path.is_file())
}

fn test_config(config: &PipelineConfig) -> i32 {
    println!("🔍 Testing configuration...");
    println!();

    let mut ok = true;
    if let Err(e) = config.validate() {
        println!("❌ Invalid configuration: {e:#}");
        ok = false;
    }

    println!("Directories:");
    for (name, dir) in config.directories.all() {
        let state = if dir.is_dir() { "exists" } else { "will be created" };
        println!("   {:<10} {} ({})", name, dir.display(), state);
    }
    println!("Diagnostics log: {}", config.diagnostics.path.display());
    println!();

    for (role, program) in [
        ("Rasterizer", &config.rasterizer.program),
        ("Encoder", &config.encoder.program),
    ] {
        match find_program(program) {
            Some(path) => println!("✅ {role}: {}", path.display()),
            None => {
                println!("❌ {role}: '{program}' not found on PATH");
                ok = false;
            }
        }
    }

    println!();
    if ok {
        println!("✅ Configuration is valid");
        0
    } else {
        println!("❌ Configuration has problems");
        1
    }
}

fn parse_only(config: &PipelineConfig, file: &Path) -> i32 {
    println!("🧪 Parsing HL7 file: {}", file.display());
    println!();

    let reader = MessageReader::new(config.stability.clone());
    let message = match reader.read(file) {
        Ok(message) => message,
        Err(e) => {
            eprintln!("❌ {e}");
            return 1;
        }
    };
    for warning in &message.warnings {
        println!("⚠️  {warning}");
    }

    let fields = extractor::extract(&message.text);
    let show = |value: &Option<String>| value.clone().unwrap_or_else(|| "<absent>".to_string());
    println!("📋 Fields:");
    println!("   PID-5  Patient Name:     {}", show(&fields.patient_name));
    println!("   PID-3  Patient ID:       {}", show(&fields.patient_id));
    println!("   PID-7  Patient DOB:      {}", show(&fields.patient_dob));
    println!("   OBR-3  Accession Number: {}", show(&fields.accession_number));
    println!("   OBR-4  Modality:         {}", show(&fields.modality_code));
    println!("   OBX-11 Observation:      {}", show(&fields.observation_code));
    println!("   OBX-5  Payload:          {} chars", fields.encoded_payload.len());
    println!();

    let report = match fields.complete() {
        Ok(report) => report,
        Err(e) => {
            println!("❌ {e}");
            return 1;
        }
    };

    let artifacts = ConversionArtifacts::for_fields(&report, &config.directories);
    println!("📁 Artifacts:");
    for path in artifacts.paths() {
        println!("   {}", path.display());
    }
    println!();

    match payload::decode(&fields.encoded_payload) {
        Ok(bytes) => {
            println!("✅ Payload decodes to {} bytes", bytes.len());
            0
        }
        Err(e) => {
            println!("❌ {e}");
            1
        }
    }
}

fn describe(outcome: &PipelineOutcome) -> String {
    match outcome {
        PipelineOutcome::Success { artifacts } => format!("ok ({})", artifacts.container.display()),
        PipelineOutcome::Failure { stage, error, .. } => format!("err at {stage}: {error}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_log_file_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("bridge.log");
        open_log_file(&path).unwrap();
        assert!(path.is_file());
    }

    #[test]
    fn test_open_log_file_reports_unusable_parent() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("logs");
        std::fs::write(&blocker, "not a directory").unwrap();
        assert!(open_log_file(&blocker.join("bridge.log")).is_err());
    }

    #[test]
    fn test_find_program_accepts_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("img2dcm");
        std::fs::write(&tool, "").unwrap();
        assert_eq!(find_program(tool.to_str().unwrap()), Some(tool));
        assert_eq!(find_program("no-such-tool-on-path"), None);
    }
}
