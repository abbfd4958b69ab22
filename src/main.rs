//! MedTranslate - medical term translation from the command line
//!
//! The CLI stands in for the desktop UI: it submits text to the router and
//! prints result events as they arrive.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn, Level};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use medtranslate::cli::{Args, Commands};
use medtranslate::config::Config;
use medtranslate::history::{HistorySink, JsonlHistorySink};
use medtranslate::request::{RequestedSource, ResultEvent, TranslationResult, TriggerKind};
use medtranslate::router::Router;
use medtranslate::translate::{KeyboardFixer, LocalDictionary, SourceSet};
use medtranslate::trigger::{run_trigger_feed, Trigger};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Setup logging to both console and file
    setup_logging(args.verbose)?;

    let config = load_config(args.config.as_deref())?;

    match args.command {
        Commands::Translate { text, source } => {
            let (router, _events) = build_router(&config);
            let requested = source.unwrap_or(config.translation.active_source);
            let result = router.translate(&text, requested).await;
            print_result(&result);
            if !result.is_success() {
                std::process::exit(1);
            }
        }
        Commands::Watch { hotkey, source } => {
            let kind = if hotkey {
                TriggerKind::Hotkey
            } else {
                TriggerKind::ClipboardChange
            };
            let (router, events) = build_router(&config);
            watch(router, events, kind, source, args.config).await?;
        }
        Commands::Lookup { query, limit } => {
            let dictionary = LocalDictionary::load(&config.dictionary.path)?;
            let matches = dictionary.search(&query, limit);
            if matches.is_empty() {
                match dictionary.lookup(&query, config.dictionary.fuzzy_cutoff) {
                    Some(found) => println!("{} -> {} ({:?})", found.term, found.translation, found.kind),
                    None => println!("No dictionary entry matches '{}'", query),
                }
            } else {
                println!("{:<40} {}", "Term", "Translation");
                println!("{}", "-".repeat(70));
                for (term, translation) in matches {
                    println!("{:<40} {}", term, translation);
                }
            }
        }
        Commands::Fix { text } => {
            match KeyboardFixer::new().correct(&text, config.keyboard.layout) {
                Some(correction) => println!("{}\n  ({})", correction.text, correction),
                None => println!("No keyboard layout error detected"),
            }
        }
        Commands::Stats => {
            let (router, _events) = build_router(&config);
            println!("{}", router.stats());
        }
        Commands::InitConfig { output, force } => {
            if output.exists() && !force {
                anyhow::bail!(
                    "{} already exists, pass --force to overwrite",
                    output.display()
                );
            }
            Config::default().save_to_file(&output)?;
            println!("Wrote default configuration to {}", output.display());
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            // Try to load config.toml from current directory first
            if Path::new("config.toml").exists() {
                info!("Found config.toml in current directory, loading...");
                Config::from_file("config.toml")?
            } else {
                Config::default()
            }
        }
    };
    Ok(config.sanitized())
}

fn build_router(config: &Config) -> (Router, mpsc::UnboundedReceiver<ResultEvent>) {
    let dictionary = Arc::new(LocalDictionary::load_or_empty(&config.dictionary.path));
    let history = config.history.enabled.then(|| {
        Arc::new(JsonlHistorySink::new(&config.history.path)) as Arc<dyn HistorySink>
    });
    Router::new(config.clone(), SourceSet::standard(dictionary), history)
}

/// Stdin lines become triggers; `:reload` and `:stats` are commands.
async fn watch(
    router: Router,
    mut events: mpsc::UnboundedReceiver<ResultEvent>,
    kind: TriggerKind,
    source: Option<RequestedSource>,
    config_path: Option<std::path::PathBuf>,
) -> Result<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut feed = tokio::spawn(run_trigger_feed(router.clone(), rx));

    let control = router.clone();
    let reader = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match line.trim() {
                "" => continue,
                ":reload" => match load_config(config_path.as_deref()) {
                    Ok(config) => control.reload(config),
                    Err(e) => warn!("Reload failed, keeping current configuration: {}", e),
                },
                ":stats" => println!("{}", control.stats()),
                _ => {
                    let trigger = Trigger {
                        text: line,
                        kind,
                        source_override: source,
                    };
                    if tx.send(trigger).is_err() {
                        break;
                    }
                }
            }
        }
    });

    println!("Watching stdin for {:?} triggers (Ctrl-D to stop)", kind);

    let submitted = loop {
        tokio::select! {
            Some(event) = events.recv() => print_event(&event),
            joined = &mut feed => break joined?,
        }
    };

    // the last request of a single stream is never superseded, so wait for it
    if let Some(&last) = submitted.last() {
        let config = router.config();
        let grace = config.debounce()
            + Duration::from_millis(config.libre.timeout_ms + config.openrouter.timeout_ms)
            + Duration::from_secs(1);
        while let Ok(Some(event)) = tokio::time::timeout(grace, events.recv()).await {
            print_event(&event);
            if event.request_id >= last {
                break;
            }
        }
    }

    reader.await?;
    Ok(())
}

fn print_event(event: &ResultEvent) {
    print!("{} ", event.request_id);
    print_result(&event.result);
}

fn print_result(result: &TranslationResult) {
    let source = result
        .resolved_source
        .map(|id| id.to_string())
        .unwrap_or_else(|| "-".to_string());

    match &result.error {
        Some(error) => println!("[{}] {}: {}", source, result.original_text, error),
        None => {
            let cached = if result.cached { ", cached" } else { "" };
            println!(
                "[{}] {} -> {} ({} ms{})",
                source, result.original_text, result.translated_text, result.latency_ms, cached
            );
            if let Some(explanation) = &result.explanation {
                println!("  {}", explanation);
            }
        }
    }
}

fn setup_logging(verbose: bool) -> Result<()> {
    // Create log directory
    let log_dir = std::env::current_dir()?.join(".medtranslate").join("log");
    std::fs::create_dir_all(&log_dir)?;

    // Set up file appender with daily rotation
    let file_appender = rolling::daily(&log_dir, "medtranslate.log");
    let (non_blocking_file, _guard) = non_blocking(file_appender);
    // Keep the guard alive for the duration of the program
    std::mem::forget(_guard);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    // Console output stays terse; results go to stdout
    let console_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Logging initialized - console: {}, file: {}",
          log_level, log_dir.join("medtranslate.log").display());

    Ok(())
}
