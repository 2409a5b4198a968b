//! PLC Change Logger CLI
//!
//! Command-line front end for the plc-log-core library. It adds:
//! - Command-line and TOML configuration
//! - Logging setup
//! - Sink construction (flat text, CSV, workbook, remote sheet)
//! - Ctrl+C handling for a clean stop

use anyhow::{Context, Result};
use clap::Parser;
use plc_log_core::{
    CsvSink, FailurePolicy, FlatSink, HttpSheetsClient, JsonFileSource, PollLoop, RemoteSheetSink,
    SheetRotationConfig, StopHandle, TokenFile, TrackedSink, WorkbookConfig, WorkbookSink,
};
use std::path::PathBuf;
use std::time::Duration;

mod config;

use config::{AppConfig, CsvConfig, FlatConfig, SheetConfig};

/// PLC Change Logger - log tag value changes to files and sheets
#[derive(Parser, Debug)]
#[command(name = "plc-log")]
#[command(about = "Poll PLC tags and log value changes", long_about = None)]
#[command(version)]
struct Args {
    /// Tag to log (can be repeated)
    #[arg(long, value_name = "TAG")]
    tag: Vec<String>,

    /// JSON snapshot of tag values, re-read on every poll
    #[arg(long, value_name = "FILE")]
    source_file: Option<PathBuf>,

    /// Seconds between polls [default: 0.5]
    #[arg(long, value_name = "SECONDS")]
    interval: Option<f64>,

    /// Flat text log ("name - value - timestamp" lines)
    #[arg(long, value_name = "FILE")]
    flat_ascii: Option<PathBuf>,

    /// CSV log ("name,value,timestamp" lines)
    #[arg(long, value_name = "FILE")]
    csv: Option<PathBuf>,

    /// Excel workbook log
    #[arg(long, value_name = "FILE")]
    excel: Option<PathBuf>,

    /// Rows kept in the workbook (0 = unlimited)
    #[arg(long, value_name = "COUNT")]
    excel_max_rows: Option<usize>,

    /// Google spreadsheet id
    #[arg(long, value_name = "ID")]
    gapi_ssheet_id: Option<String>,

    /// Sheet (tab) name inside the spreadsheet [default: PLCLOGPOC]
    #[arg(long, value_name = "NAME")]
    gapi_sheet_name: Option<String>,

    /// Numeric id of the sheet (tab) [default: 0]
    #[arg(long, value_name = "GID")]
    gapi_sheet_gid: Option<i64>,

    /// JSON file holding an OAuth access token [default: token.json]
    #[arg(long, value_name = "FILE")]
    gapi_token: Option<PathBuf>,

    /// Approximate row count before old rows are removed [default: 200]
    #[arg(long, value_name = "COUNT")]
    gapi_max_rows: Option<u32>,

    /// Path to configuration file (plc-log.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Stop on the first sink or read failure
    #[arg(long)]
    fail_fast: bool,

    /// Echo remote sheet payloads
    #[arg(long, env = "PLCLOG_DEBUG")]
    debug: bool,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet, args.debug);

    log::info!("PLC Change Logger v{}", env!("CARGO_PKG_VERSION"));
    log::debug!("Using plc-log-core v{}", plc_log_core::VERSION);

    let mut config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => AppConfig::default(),
    };
    apply_args(&mut config, &args)?;
    config.validate()?;

    let mut poll = prepare(&config)?;

    ctrlc_handler(poll.stop_handle());

    let stats = poll.run().context("Poll loop stopped with an error")?;
    log::info!(
        "Shutdown complete: {} cycle(s), {} record(s), {} sink failure(s), {} read failure(s)",
        stats.cycles,
        stats.records_written,
        stats.sink_failures,
        stats.source_failures
    );

    Ok(())
}

/// Build the source and every sink, then take the baseline read
fn prepare(config: &AppConfig) -> Result<PollLoop<JsonFileSource>> {
    let source_file = config
        .source
        .file
        .clone()
        .context("No tag source configured")?;
    let source = JsonFileSource::new(&source_file, config.tags.clone());
    let mut poll = PollLoop::new(source, config.poll.clone());

    for sink in build_sinks(config)? {
        poll.add_sink(sink);
    }

    poll.baseline().context("Initial tag read failed")?;
    Ok(poll)
}

/// Overlay command-line flags on the file configuration
fn apply_args(config: &mut AppConfig, args: &Args) -> Result<()> {
    if !args.tag.is_empty() {
        config.tags = args.tag.clone();
    }
    if let Some(file) = &args.source_file {
        config.source.file = Some(file.clone());
    }
    if let Some(secs) = args.interval {
        config.poll.interval = Duration::try_from_secs_f64(secs)
            .with_context(|| format!("Invalid interval: {}", secs))?;
    }
    if args.fail_fast {
        config.poll.failure_policy = FailurePolicy::FailFast;
    }

    if let Some(path) = &args.flat_ascii {
        let format = config.flat.as_ref().and_then(|f| f.format.clone());
        config.flat = Some(FlatConfig {
            path: path.clone(),
            format,
        });
    }
    if let Some(path) = &args.csv {
        config.csv = Some(CsvConfig { path: path.clone() });
    }

    if let Some(path) = &args.excel {
        let workbook = config
            .workbook
            .take()
            .map(|mut w| {
                w.path = path.clone();
                w
            })
            .unwrap_or_else(|| WorkbookConfig::new(path));
        config.workbook = Some(workbook);
    }
    if let (Some(rows), Some(workbook)) = (args.excel_max_rows, config.workbook.as_mut()) {
        workbook.max_rows = rows;
    }

    if let Some(id) = &args.gapi_ssheet_id {
        let sheet = config.sheet.get_or_insert_with(|| SheetConfig {
            rotation: SheetRotationConfig::new(id.clone()),
            token_file: config::default_token_file(),
        });
        sheet.rotation.spreadsheet_id = id.clone();
    }
    if let Some(sheet) = config.sheet.as_mut() {
        if let Some(name) = &args.gapi_sheet_name {
            sheet.rotation.sheet_name = name.clone();
        }
        if let Some(gid) = args.gapi_sheet_gid {
            sheet.rotation.sheet_id = gid;
        }
        if let Some(token) = &args.gapi_token {
            sheet.token_file = token.clone();
        }
        if let Some(rows) = args.gapi_max_rows {
            sheet.rotation.max_rows = rows;
        }
        sheet.rotation.debug |= args.debug;
    }

    Ok(())
}

/// Construct every configured sink, each with its own tracker
fn build_sinks(config: &AppConfig) -> Result<Vec<TrackedSink>> {
    let tag_count = config.tags.len();
    let mut sinks = Vec::new();

    if let Some(flat) = &config.flat {
        let sink = match &flat.format {
            Some(format) => FlatSink::with_format(&flat.path, unescape(format)),
            None => FlatSink::new(&flat.path),
        };
        sinks.push(TrackedSink::new(
            format!("flat text {:?}", flat.path),
            tag_count,
            Box::new(sink),
        ));
    }

    if let Some(csv) = &config.csv {
        sinks.push(TrackedSink::new(
            format!("CSV {:?}", csv.path),
            tag_count,
            Box::new(CsvSink::new(&csv.path)),
        ));
    }

    if let Some(workbook) = &config.workbook {
        sinks.push(TrackedSink::new(
            format!("workbook {:?}", workbook.path),
            tag_count,
            Box::new(WorkbookSink::new(workbook.clone())),
        ));
    }

    if let Some(sheet) = &config.sheet {
        let token = TokenFile::open(&sheet.token_file)
            .with_context(|| format!("Invalid credentials in {:?}", sheet.token_file))?;
        let client = HttpSheetsClient::new(Box::new(token)).context("Failed to create HTTP client")?;
        let sink = RemoteSheetSink::new(sheet.rotation.clone(), Box::new(client));
        sinks.push(TrackedSink::new(
            format!("sheet {}!{}", sheet.rotation.spreadsheet_id, sheet.rotation.sheet_name),
            tag_count,
            Box::new(sink),
        ));
    }

    Ok(sinks)
}

/// Turn `\n` and `\t` escapes from a config string into characters
fn unescape(format: &str) -> String {
    format.replace("\\n", "\n").replace("\\t", "\t")
}

/// Setup Ctrl+C handler
fn ctrlc_handler(stop_handle: StopHandle) {
    if let Err(e) = ctrlc::set_handler(move || {
        log::info!("Received Ctrl+C, shutting down...");
        stop_handle.stop();
    }) {
        log::warn!("Could not install Ctrl+C handler: {}", e);
    }
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool, debug: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 if debug => LevelFilter::Debug,
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
