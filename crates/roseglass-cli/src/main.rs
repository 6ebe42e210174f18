use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use roseglass_contracts::analysis::{
    extract_suggested_opener, AnalysisHistoryItem, AnalysisResult, CoCreateRequest, CoCreateResult,
};
use roseglass_contracts::events::EventWriter;
use roseglass_contracts::receipts::{build_receipt, write_receipt, RequestManifest};
use roseglass_engine::config::DEFAULT_HISTORY_LIMIT;
use roseglass_engine::{
    new_session_id, resolve_token, AnalysisClient, AnalysisRequestBuilder, AnalysisView,
    ClientConfig, DataUrlPreviews, ImageFile, ImageStager, PreviewSink, SelectionReport,
    ThumbnailPreviews, ViewState,
};
use serde_json::{json, Value};
use tracing::{debug, warn};

#[derive(Debug, Parser)]
#[command(name = "roseglass", version, about = "Rose Glass dating profile analysis client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Upload screenshots and print the analysis.
    Analyze(AnalyzeArgs),
    /// Show the remaining credit balance.
    Credits(ConnectionArgs),
    /// List recent analyses.
    History(HistoryArgs),
    /// Extract the suggested opener from a saved analysis.
    Opener(OpenerArgs),
    /// Draft a message from your own take on a finished analysis.
    CoCreate(CoCreateArgs),
}

#[derive(Debug, Args)]
struct ConnectionArgs {
    #[arg(long)]
    api_url: Option<String>,
    #[arg(long)]
    token: Option<String>,
}

#[derive(Debug, Parser)]
struct AnalyzeArgs {
    #[arg(long = "profile", required = true, num_args = 1..)]
    profile: Vec<PathBuf>,
    #[arg(long = "conversation", num_args = 1..)]
    conversation: Vec<PathBuf>,
    #[arg(long)]
    context: Option<String>,
    #[arg(long)]
    premium: bool,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long)]
    out: Option<PathBuf>,
    #[arg(long)]
    json: bool,
    #[command(flatten)]
    connection: ConnectionArgs,
}

#[derive(Debug, Parser)]
struct HistoryArgs {
    #[arg(long, default_value_t = DEFAULT_HISTORY_LIMIT)]
    limit: u32,
    #[command(flatten)]
    connection: ConnectionArgs,
}

#[derive(Debug, Parser)]
struct OpenerArgs {
    file: PathBuf,
}

#[derive(Debug, Parser)]
struct CoCreateArgs {
    #[arg(long)]
    analysis_id: String,
    /// What you noticed in their profile.
    #[arg(long)]
    observation: String,
    /// What resonates for you.
    #[arg(long)]
    resonance: String,
    /// What you want to share.
    #[arg(long)]
    intention: String,
    #[arg(long)]
    conversation_context: Option<String>,
    #[arg(long)]
    json: bool,
    #[command(flatten)]
    connection: ConnectionArgs,
}

fn main() {
    init_tracing();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("roseglass error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Analyze(args) => run_analyze(args),
        Command::Credits(args) => run_credits(args),
        Command::History(args) => run_history(args),
        Command::Opener(args) => run_opener(args),
        Command::CoCreate(args) => run_co_create(args),
    }
}

fn client_config(connection: &ConnectionArgs) -> ClientConfig {
    let config = ClientConfig::from_env();
    match connection.api_url.as_deref() {
        Some(url) => config.with_api_url(url),
        None => config,
    }
}

fn preview_sink() -> Box<dyn PreviewSink> {
    match ThumbnailPreviews::new() {
        Ok(previews) => Box::new(previews),
        Err(err) => {
            warn!("thumbnail previews unavailable, keeping previews in memory: {err:#}");
            Box::new(DataUrlPreviews::new())
        }
    }
}

fn run_analyze(args: AnalyzeArgs) -> Result<i32> {
    let config = client_config(&args.connection);
    let token = resolve_token(args.connection.token.as_deref());
    let session_id = new_session_id();
    let events = match args.events.as_ref() {
        Some(path) => EventWriter::new(path, session_id.clone()),
        None => EventWriter::disabled(session_id.clone()),
    };

    let mut view = AnalysisView::new(
        ImageStager::with_capacity("Profile Screenshots", config.max_images, preview_sink()),
        ImageStager::with_capacity("Conversation Screenshots", config.max_images, preview_sink()),
        AnalysisRequestBuilder::new(config.max_images),
        events,
    );
    let profile = read_images(&args.profile)?;
    let report = view.profile_mut().select(profile);
    report_selection(view.profile().label(), &report);
    let conversation = read_images(&args.conversation)?;
    if !conversation.is_empty() {
        let report = view.conversation_mut().select(conversation);
        report_selection(view.conversation().label(), &report);
    }
    for image in view.profile().staged().iter().chain(view.conversation().staged()) {
        debug!(name = image.file.name(), preview = %image.preview.location, "staged");
    }
    view.set_user_context(args.context.clone().unwrap_or_default());
    view.set_use_premium(args.premium);

    let tier = view.tier();
    eprintln!(
        "{} | {} | cost {} per analysis",
        view.submit_label(),
        tier.label(),
        tier.cost_hint()
    );

    let client = AnalysisClient::new(config);
    let pending = view.begin_submit()?;
    let manifest = pending.payload().manifest();
    let outcome = pending.run(&client, &token);
    view.finish(outcome);

    let result = match view.state() {
        ViewState::Success(result) => result.clone(),
        ViewState::Failed { message, .. } => bail!("{message}"),
        other => bail!("analysis ended in unexpected state '{}'", other.name()),
    };
    let opener = result.suggested_opener();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&json_report(&result, opener.as_deref()))?);
    } else {
        print!("{}", render_result(&result, opener.as_deref()));
    }
    if let Some(out_dir) = args.out.as_ref() {
        let receipt_path = save_outputs(out_dir, &manifest, &result, opener.as_deref())?;
        eprintln!("Saved receipt to {}", receipt_path.display());
    }
    Ok(0)
}

fn read_images(paths: &[PathBuf]) -> Result<Vec<ImageFile>> {
    paths.iter().map(|path| ImageFile::read(path)).collect()
}

fn report_selection(label: &str, report: &SelectionReport) {
    if report.refused {
        eprintln!("{label}: already full, selection ignored");
        return;
    }
    if !report.rejected.is_empty() {
        eprintln!(
            "{label}: skipped {} unsupported file(s): {}",
            report.rejected.len(),
            report.rejected.join(", ")
        );
    }
    if report.dropped > 0 {
        eprintln!("{label}: dropped {} file(s) over the limit", report.dropped);
    }
}

fn render_result(result: &AnalysisResult, opener: Option<&str>) -> String {
    let mut out = String::new();
    out.push_str(&result.summary_line());
    out.push_str("\n\n## Rose Glass Analysis\n\n");
    out.push_str(result.raw_analysis_text.trim_end());
    out.push('\n');
    if let Some(opener) = opener {
        out.push_str("\n## Suggested Opener\n\n");
        out.push_str(&format!("\"{opener}\"\n"));
    }
    out
}

fn json_report(result: &AnalysisResult, opener: Option<&str>) -> Value {
    json!({
        "analysis": result.raw_analysis_text,
        "analysis_id": result.analysis_id,
        "usage": result.usage,
        "remaining_credits": result.remaining_credits,
        "suggested_opener": opener,
    })
}

fn save_outputs(
    out_dir: &Path,
    manifest: &RequestManifest,
    result: &AnalysisResult,
    opener: Option<&str>,
) -> Result<PathBuf> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;
    let stem = result
        .analysis_id
        .as_deref()
        .and_then(file_stem)
        .unwrap_or_else(compact_timestamp);
    let markdown_path = out_dir.join(format!("analysis-{stem}.md"));
    fs::write(&markdown_path, &result.raw_analysis_text)
        .with_context(|| format!("failed to write {}", markdown_path.display()))?;
    let receipt_path = out_dir.join(format!("receipt-{stem}.json"));
    let receipt = build_receipt(manifest, result, opener, &markdown_path);
    write_receipt(&receipt_path, &receipt)?;
    Ok(receipt_path)
}

/// Server ids become file names; anything outside `[A-Za-z0-9_-]` is replaced.
fn file_stem(id: &str) -> Option<String> {
    let id = id.trim();
    if id.is_empty() {
        return None;
    }
    Some(
        id.chars()
            .map(|ch| {
                if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' {
                    ch
                } else {
                    '_'
                }
            })
            .collect(),
    )
}

fn compact_timestamp() -> String {
    chrono::Utc::now().format("%Y%m%dT%H%M%S").to_string()
}

fn run_credits(args: ConnectionArgs) -> Result<i32> {
    let token = resolve_token(args.token.as_deref());
    let client = AnalysisClient::new(client_config(&args));
    let credits = client.get_credits(&token)?;
    println!("Balance: ${credits:.2}");
    Ok(0)
}

fn run_history(args: HistoryArgs) -> Result<i32> {
    let token = resolve_token(args.connection.token.as_deref());
    let client = AnalysisClient::new(client_config(&args.connection));
    let items = client.history(&token, args.limit)?;
    if items.is_empty() {
        println!("No analyses yet.");
        return Ok(0);
    }
    for item in &items {
        println!("{}", format_history_line(item));
    }
    Ok(0)
}

fn format_history_line(item: &AnalysisHistoryItem) -> String {
    let mut line = format!(
        "{}  {}  {}  ${:.4}",
        item.created_at.format("%Y-%m-%d %H:%M"),
        item.id,
        item.model_used,
        item.charge_usd
    );
    if let Some(opener) = item.suggested_opener() {
        let first_line = opener.lines().next().unwrap_or_default();
        line.push_str(&format!("  \"{first_line}\""));
    }
    line
}

fn run_opener(args: OpenerArgs) -> Result<i32> {
    let text = fs::read_to_string(&args.file)
        .with_context(|| format!("failed reading {}", args.file.display()))?;
    match extract_suggested_opener(&text) {
        Some(opener) => println!("{opener}"),
        None => eprintln!("No suggested opener found in {}", args.file.display()),
    }
    Ok(0)
}

fn run_co_create(args: CoCreateArgs) -> Result<i32> {
    let token = resolve_token(args.connection.token.as_deref());
    let client = AnalysisClient::new(client_config(&args.connection));
    let request = CoCreateRequest {
        analysis_id: args.analysis_id,
        user_observation: args.observation,
        user_resonance: args.resonance,
        user_intention: args.intention,
        conversation_context: args.conversation_context,
    };
    let result = client.co_create(&request, &token)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{}", render_co_create(&result));
    }
    Ok(0)
}

fn render_co_create(result: &CoCreateResult) -> String {
    format!(
        "{}\n\n## Suggested Message\n\n{}\n",
        result.summary_line(),
        result.suggested_message.trim()
    )
}
