//! Lightning CLI - Instant file name search over an indexed snapshot

use clap::{Parser, Subcommand};
use colored::Colorize;
use lightning_core::query::sort_entries;
use lightning_core::session::{CONFIG_FILE, DATA_DIR_NAME, DB_FILE};
use lightning_core::{EntryRecord, IndexPhase, IndexReport, SearchSession, SearchState, SortMode};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Rows printed per settled state in the REPL
const REPL_ROWS: usize = 20;

#[derive(Parser)]
#[command(name = "lightning")]
#[command(about = "Instant file name search", long_about = None)]
struct Cli {
    /// Directory holding config.toml and index.db
    #[arg(long, global = true, env = "LIGHTNING_DATA_DIR", default_value = DATA_DIR_NAME)]
    data_dir: PathBuf,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the data directory, config.toml and an empty index
    Init,

    /// Index root directories (configured roots, or the current directory)
    Index {
        /// Root directories to index
        roots: Vec<PathBuf>,

        /// Only build the index if it is empty
        #[arg(long)]
        if_empty: bool,

        /// Add the roots to the existing index instead of rebuilding
        #[arg(long, conflicts_with = "if_empty")]
        append: bool,
    },

    /// Search entry names
    Search {
        /// Case-insensitive substring, or a glob with * and ?
        query: String,

        /// Sort mode: name-asc, name-desc, size-asc, size-desc, date-asc, date-desc
        #[arg(short, long, default_value = "name-asc")]
        sort: SortMode,

        /// Override the configured result limit
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show index stats and effective config
    Status,

    /// Delete a file or directory from disk and from the index
    Delete {
        /// Path to delete (directories are removed recursively)
        path: PathBuf,
    },

    /// Interactive search: one query per line, `:sort MODE` to re-sort
    Repl,
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let json = cli.json;

    let result = match cli.command {
        Commands::Init => cmd_init(&cli.data_dir, json),
        Commands::Index {
            roots,
            if_empty,
            append,
        } => cmd_index(&cli.data_dir, roots, if_empty, append, json).await,
        Commands::Search { query, sort, limit } => {
            cmd_search(&cli.data_dir, &query, sort, limit, json).await
        }
        Commands::Status => cmd_status(&cli.data_dir, json).await,
        Commands::Delete { path } => cmd_delete(&cli.data_dir, &path, json).await,
        Commands::Repl => cmd_repl(&cli.data_dir, json).await,
    };

    if let Err(e) = result {
        if json {
            eprintln!("{}", to_json(&e.envelope()));
        } else {
            eprintln!("{}: {}", "Error".red(), e);
        }
        std::process::exit(1);
    }
}

/// Logs go to stderr so stdout stays machine-readable
fn init_tracing() {
    let filter = EnvFilter::try_from_env("LIGHTNING_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_init(data_dir: &Path, json: bool) -> lightning_core::Result<()> {
    SearchSession::init(data_dir)?;

    if json {
        println!(
            "{}",
            to_json(&serde_json::json!({ "data_dir": data_dir, "created": true }))
        );
    } else {
        println!("{} {}", "Created".green(), data_dir.join(CONFIG_FILE).display());
        println!("{} {}", "Created".green(), data_dir.join(DB_FILE).display());
    }
    Ok(())
}

async fn cmd_index(
    data_dir: &Path,
    roots: Vec<PathBuf>,
    if_empty: bool,
    append: bool,
    json: bool,
) -> lightning_core::Result<()> {
    let session = SearchSession::open(data_dir)?;
    session.set_permission_granted(true);
    let roots = resolve_roots(&session, roots)?;
    debug!(?roots, if_empty, append, "index command");

    let indexer = session.indexer().clone();
    let cancel_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}: finishing current batch", "Cancelling".yellow());
            indexer.cancel();
        }
    });
    let progress_task = (!json).then(|| spawn_progress_printer(&session));

    let mut reports = Vec::new();
    if append {
        for root in roots {
            if let Some(handle) = session.index_additional_root(root) {
                let report = handle.await?;
                let cancelled = report.cancelled;
                reports.push(report);
                if cancelled {
                    break;
                }
            }
        }
    } else if if_empty {
        match session.check_and_start_indexing(roots).await {
            Some(handle) => reports.push(handle.await?),
            None => {
                let total = session.state().total_indexed;
                if json {
                    println!(
                        "{}",
                        to_json(&serde_json::json!({ "skipped": true, "total_indexed": total }))
                    );
                } else {
                    println!(
                        "{}: index already holds {} entries",
                        "Skipped".yellow(),
                        total
                    );
                }
            }
        }
    } else if let Some(handle) = session.start_indexing(roots) {
        reports.push(handle.await?);
    }

    cancel_task.abort();
    if let Some(task) = progress_task {
        task.abort();
    }

    for report in &reports {
        print_report(report, json);
    }
    Ok(())
}

/// Absolute roots from the arguments, the config, or the current directory
fn resolve_roots(session: &SearchSession, roots: Vec<PathBuf>) -> lightning_core::Result<Vec<String>> {
    let mut roots: Vec<String> = roots.iter().map(|p| absolute_path(p)).collect();
    if roots.is_empty() {
        roots = session.config().indexing.roots.clone();
    }
    if roots.is_empty() {
        roots.push(absolute_path(&std::env::current_dir()?));
    }
    Ok(roots)
}

fn absolute_path(path: &Path) -> String {
    std::fs::canonicalize(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .into_owned()
}

fn spawn_progress_printer(session: &SearchSession) -> JoinHandle<()> {
    let mut progress = session.subscribe_progress();
    tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let update = progress.borrow_and_update().clone();
            if update.phase == IndexPhase::Running && update.indexed > 0 {
                eprintln!(
                    "{} {} entries {}",
                    "Indexing".cyan(),
                    update.indexed,
                    update.current_path.dimmed()
                );
            }
        }
    })
}

fn print_report(report: &IndexReport, json: bool) {
    if json {
        println!("{}", to_json(report));
        return;
    }

    let label = if report.cancelled {
        "Cancelled".yellow()
    } else {
        "Indexed".green()
    };
    println!(
        "{}: {} entries in {} ms",
        label, report.indexed, report.elapsed_ms
    );
    println!("{}: {} entries", "Total".blue(), report.total_indexed);
    if report.failed_flushes > 0 {
        println!(
            "{}: {} batches failed to write ({} entries dropped)",
            "Warning".yellow(),
            report.failed_flushes,
            report.records_dropped
        );
    }
}

async fn cmd_search(
    data_dir: &Path,
    query: &str,
    sort: SortMode,
    limit: Option<usize>,
    json: bool,
) -> lightning_core::Result<()> {
    let mut config = SearchSession::load_config(data_dir)?;
    if let Some(limit) = limit {
        config.search.result_limit = limit;
    }
    let session = SearchSession::open_with_config(data_dir, config)?;

    let mut outcome = session.search(query).await;
    sort_entries(&mut outcome.results, sort);

    if json {
        println!("{}", to_json(&outcome));
    } else {
        for entry in &outcome.results {
            print_entry(entry);
        }
        println!(
            "({} results, {} ms)",
            outcome.results.len(),
            outcome.elapsed_ms
        );
    }
    Ok(())
}

fn print_entry(entry: &EntryRecord) {
    let size = if entry.is_directory {
        "dir".to_string()
    } else {
        format_size(entry.size)
    };
    let path = if entry.is_directory {
        format!("{}/", entry.path).blue().to_string()
    } else {
        entry.path.clone()
    };
    println!(
        "{:>9}  {}  {}",
        size,
        format_mtime(entry.modified_time).dimmed(),
        path
    );
}

async fn cmd_status(data_dir: &Path, json: bool) -> lightning_core::Result<()> {
    let session = SearchSession::open(data_dir)?;
    let total = session.refresh_total().await?;
    let config = session.config();
    let db_path = data_dir.join(DB_FILE);
    let db_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

    if json {
        println!(
            "{}",
            to_json(&serde_json::json!({
                "data_dir": data_dir,
                "total_indexed": total,
                "index_size_bytes": db_size,
                "config": config,
            }))
        );
    } else {
        println!(
            "{}: {} ({})",
            "Index".blue(),
            db_path.display(),
            format_size(db_size)
        );
        println!("{}: {} indexed", "Entries".blue(), total);
        if config.indexing.roots.is_empty() {
            println!("{}: (current directory)", "Roots".blue());
        } else {
            println!("{}: {}", "Roots".blue(), config.indexing.roots.join(", "));
        }
        println!(
            "{}: {} ms",
            "Debounce".blue(),
            config.debounce_duration().as_millis()
        );
        println!("{}: {}", "Result limit".blue(), config.search.result_limit);
        println!("{}: {}", "Batch size".blue(), config.batch_size());
    }
    Ok(())
}

async fn cmd_delete(data_dir: &Path, path: &Path, json: bool) -> lightning_core::Result<()> {
    let session = SearchSession::open(data_dir)?;
    let target = absolute_path(path);
    let deleted = session.delete(&target).await;

    if json {
        println!(
            "{}",
            to_json(&serde_json::json!({ "path": target, "deleted": deleted }))
        );
    } else if deleted {
        println!("{}: {}", "Deleted".green(), target);
    } else {
        println!("{}: {} (missing or not permitted)", "Not deleted".yellow(), target);
    }
    Ok(())
}

async fn cmd_repl(data_dir: &Path, json: bool) -> lightning_core::Result<()> {
    let session = SearchSession::open(data_dir)?;
    let total = session.refresh_total().await?;
    if !json {
        eprintln!(
            "{} entries indexed. Type to search, {} to re-sort, {} to exit.",
            total,
            ":sort MODE".cyan(),
            ":quit".cyan()
        );
    }

    let mut rx = session.subscribe();
    let render_task = tokio::spawn(async move {
        let mut last = render_key(&SearchState::default());
        while rx.changed().await.is_ok() {
            let state = rx.borrow_and_update().clone();
            let key = render_key(&state);
            if key.is_none() || key == last {
                continue;
            }
            last = key;
            render_state(&state, json);
        }
    });

    prompt(json);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim_end();
        if line == ":quit" || line == ":q" {
            break;
        }
        if let Some(mode) = line.strip_prefix(":sort") {
            debug!(mode = mode.trim(), "sort command");
            match mode.trim().parse::<SortMode>() {
                Ok(mode) => session.set_sort_mode(mode),
                Err(e) => eprintln!("{}: {}", "Error".red(), e),
            }
        } else {
            session.on_query_change(line);
        }
        prompt(json);
    }

    // Let the last query settle before exiting
    tokio::time::sleep(session.config().debounce_duration() + Duration::from_millis(250)).await;
    render_task.abort();
    Ok(())
}

/// What a REPL render shows; `None` while a lookup is still pending.
fn render_key(state: &SearchState) -> Option<(String, Vec<String>, SortMode)> {
    if state.is_searching {
        return None;
    }
    Some((
        state.query.clone(),
        state.results.iter().map(|r| r.path.clone()).collect(),
        state.sort_mode,
    ))
}

fn prompt(json: bool) {
    if !json {
        print!("{} ", ">".cyan());
        let _ = std::io::stdout().flush();
    }
}

fn render_state(state: &SearchState, json: bool) {
    if json {
        println!(
            "{}",
            serde_json::json!({
                "query": state.query,
                "sort_mode": state.sort_mode,
                "result_count": state.result_count,
                "search_time_ms": state.search_time_ms,
                "results": state.results,
            })
        );
        return;
    }

    println!();
    for entry in state.results.iter().take(REPL_ROWS) {
        print_entry(entry);
    }
    if state.result_count > REPL_ROWS {
        println!("... {} more", state.result_count - REPL_ROWS);
    }
    println!(
        "({} results, {} ms, {})",
        state.result_count, state.search_time_ms, state.sort_mode
    );
    prompt(json);
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!(r#"{{"code":"serialize","message":"{e}"}}"#))
}

/// Human-readable byte count
fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

/// Epoch milliseconds as RFC 3339, or `-` when out of range
fn format_mtime(millis: i64) -> String {
    OffsetDateTime::from_unix_timestamp_nanos(millis as i128 * 1_000_000)
        .ok()
        .and_then(|t| t.format(&Rfc3339).ok())
        .unwrap_or_else(|| "-".to_string())
}
