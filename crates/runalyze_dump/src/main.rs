use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use runalyze_client::http_client::ReqwestRunalyzeClient;
use runalyze_dump::dates::resolve_window;
use runalyze_dump::filesystem::OsFileSystem;
use runalyze_dump::presentation::ConsolePresenter;
use runalyze_dump::settings::{CliOverrides, FileSettings, Settings};
use runalyze_dump::Pipeline;

#[derive(Parser)]
#[command(
    name = "runalyze-dump",
    version,
    about = "Download your activity files from Runalyze"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Download FIT (or TCX) files week by week, newest first
    Download(DownloadArgs),
}

#[derive(Args)]
struct DownloadArgs {
    /// Runalyze username
    #[arg(long)]
    username: Option<String>,
    /// Runalyze password
    #[arg(long)]
    password: Option<String>,
    /// Where the session cookies are kept
    #[arg(long)]
    cookie_path: Option<String>,
    /// Last date to include: YYYY-MM-DD, YYYY-MM or YYYY (default: today)
    #[arg(long)]
    until: Option<String>,
    /// First date to include, or a duration before --until such as 30d, 2w, 6m, 1y (default: 4w)
    #[arg(long)]
    since: Option<String>,
    /// Directory for the downloaded files
    #[arg(long)]
    save_dir: Option<String>,
    /// Print structured JSON instead of text
    #[arg(long)]
    json: bool,
    /// Config file (default: ~/.runalyzedump/runalyzedump.toml)
    #[arg(long)]
    config: Option<PathBuf>,
    /// trace, debug, info, warn or error (RUST_LOG takes full directives)
    #[arg(long)]
    log_level: Option<String>,
}

impl DownloadArgs {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            username: self.username.clone(),
            password: self.password.clone(),
            cookie_path: self.cookie_path.clone(),
            save_dir: self.save_dir.clone(),
            log_level: self.log_level.clone(),
            until: self.until.clone(),
            since: self.since.clone(),
            json: self.json,
        }
    }
}

fn init_logging(filter: &str, json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_new(filter)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,reqwest=warn,hyper=warn"));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_writer(std::io::stdout)
            .with_target(false)
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .compact()
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .with_target(false)
            .with_env_filter(env_filter)
            .init();
    }
    tracing::debug!("runalyze-dump: log filter: {}", filter);
}

async fn download(args: DownloadArgs) -> anyhow::Result<()> {
    let file = FileSettings::load(args.config.as_deref()).context("loading config file")?;
    let settings = Settings::resolve_from_env(&file, args.overrides())?;
    init_logging(&settings.log_filter(std::env::var("RUST_LOG").ok()), settings.json);
    let window = resolve_window(
        settings.until.as_deref(),
        settings.since.as_deref(),
        Local::now().date_naive(),
    )?;
    tracing::info!(
        since = %window.since,
        until = %window.until,
        save_dir = %settings.save_dir.display(),
        "starting download"
    );

    let client = ReqwestRunalyzeClient::new(&settings.client).context("creating Runalyze client")?;
    let pipeline = Pipeline::new(
        Arc::new(client),
        Arc::new(OsFileSystem),
        Arc::new(ConsolePresenter::stdout(settings.json)),
    );
    pipeline.run(window, &settings.save_dir).await?;
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Download(args) => download(args).await,
    }
}
