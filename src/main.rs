//! mergelines: one aggregation run.
//! Collects headlines, matches them across sources against the local store
//! and prints the ranked list.
//!
//! Usage: `mergelines [--fixtures <dir>]`

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mergelines::ai::build_chat_client;
use mergelines::config::AppConfig;
use mergelines::headline::{MergedHeadline, Source};
use mergelines::ingest::collect_all;
use mergelines::ingest::providers::{HackerNewsProvider, NineToFiveMacProvider, TechmemeProvider};
use mergelines::ingest::types::SourceProvider;
use mergelines::pipeline::{build_matcher, build_summarizer, run_once, RunContext, RunReport, Settings};
use mergelines::store::{HeadlineStore, JsonFileStore};

/// Compact logs by default; `MERGELINES_LOG_JSON=1` switches to JSON lines.
fn init_tracing() {
    let json = std::env::var("MERGELINES_LOG_JSON")
        .ok()
        .is_some_and(|v| v == "1");

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mergelines=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json()))
        .with((!json).then(|| fmt::layer().compact()))
        .init();
}

struct Args {
    fixtures: Option<PathBuf>,
}

fn parse_args() -> Result<Args> {
    let mut fixtures = None;
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--fixtures" => {
                let dir = it.next().context("--fixtures needs a directory")?;
                fixtures = Some(PathBuf::from(dir));
            }
            "-h" | "--help" => {
                println!("usage: mergelines [--fixtures <dir>]");
                std::process::exit(0);
            }
            other => bail!("unknown argument: {other}"),
        }
    }
    Ok(Args { fixtures })
}

fn fixture_name(source: &Source) -> Option<&'static str> {
    match source {
        Source::Techmeme => Some("techmeme.html"),
        Source::HackerNews => Some("hackernews.json"),
        Source::NineToFiveMac => Some("9to5mac.xml"),
        Source::Other(_) => None,
    }
}

fn fixture_provider(source: &Source, dir: &Path) -> Result<Option<Box<dyn SourceProvider>>> {
    let Some(name) = fixture_name(source) else {
        return Ok(None);
    };
    let path = dir.join(name);
    if !path.exists() {
        tracing::warn!(target: "ingest", source = %source, path = %path.display(), "fixture missing, skipping source");
        return Ok(None);
    }
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("reading fixture {}", path.display()))?;
    let p: Box<dyn SourceProvider> = match source {
        Source::Techmeme => Box::new(TechmemeProvider::from_fixture(&content)),
        Source::HackerNews => Box::new(HackerNewsProvider::from_fixture(&content)),
        Source::NineToFiveMac => Box::new(NineToFiveMacProvider::from_fixture(&content)),
        Source::Other(_) => return Ok(None),
    };
    Ok(Some(p))
}

fn build_providers(sources: &[Source], fixtures: Option<&Path>) -> Result<Vec<Box<dyn SourceProvider>>> {
    let client = match fixtures {
        Some(_) => None,
        None => Some(mergelines::ingest::http_client()?),
    };

    let mut out: Vec<Box<dyn SourceProvider>> = Vec::with_capacity(sources.len());
    for source in sources {
        let provider: Option<Box<dyn SourceProvider>> = match (fixtures, &client) {
            (Some(dir), _) => fixture_provider(source, dir)?,
            (None, Some(c)) => match source {
                Source::Techmeme => Some(Box::new(TechmemeProvider::from_client(c.clone()))),
                Source::HackerNews => Some(Box::new(HackerNewsProvider::from_client(c.clone()))),
                Source::NineToFiveMac => Some(Box::new(NineToFiveMacProvider::from_client(c.clone()))),
                Source::Other(_) => None,
            },
            (None, None) => None,
        };
        match provider {
            Some(p) => out.push(p),
            None => tracing::warn!(target: "ingest", source = %source, "no collector for source"),
        }
    }
    Ok(out)
}

fn print_ranked(report: &RunReport) {
    if report.merged.is_empty() {
        println!("No headlines.");
        return;
    }
    for (rank, line) in report.merged.iter().enumerate() {
        print_line(rank + 1, line);
    }
    println!(
        "\n{} headlines, {} new cross-source matches.",
        report.merged.len(),
        report.new_matches
    );
}

fn print_line(rank: usize, line: &MergedHeadline) {
    let badge = if line.in_multiple_sources {
        format!(" [{} sources]", line.urls.len())
    } else {
        String::new()
    };
    println!("{rank:>3}.{badge} {}", line.title);
    for h in &line.headlines {
        let mut extra = String::new();
        if let (Some(points), Some(comments)) = (h.points, h.comment_count) {
            extra = format!(" ({points} points, {comments} comments)");
        } else if let Some(comments) = h.comment_count {
            extra = format!(" ({comments} comments)");
        }
        println!("       {}: {}{extra}", h.source.display_name(), h.url);
    }
}

async fn run(args: Args) -> Result<()> {
    let cfg = AppConfig::load_default()?;
    let settings = Settings::from_config(&cfg);
    let client = build_chat_client(&cfg.ai)?;
    let matcher = build_matcher(&cfg, &client);
    let summarizer = build_summarizer(&client);

    let providers = build_providers(&cfg.sources, args.fixtures.as_deref())?;
    let batches = collect_all(&providers).await;

    let mut store = JsonFileStore::open(&cfg.store_path)?;
    let now = Utc::now();
    let outcome = async {
        let mut ctx = RunContext {
            store: &mut store,
            matcher: &matcher,
            summarizer: summarizer.as_ref(),
            settings: &settings,
        };
        let report = run_once(&mut ctx, batches, now).await?;
        let removed = store.cleanup_old_headlines(now, cfg.retention_days)?;
        if removed > 0 {
            tracing::info!(target: "store", removed, days = cfg.retention_days, "old headlines removed");
        }
        Ok::<_, anyhow::Error>(report)
    }
    .await;
    let closed = store.close();

    let report = outcome?;
    closed?;
    print_ranked(&report);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    init_tracing();

    let args = match parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(2);
        }
    };

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = ?e, "run failed");
            ExitCode::FAILURE
        }
    }
}
