use anyhow::{bail, Context, Result};
use tracing::{info, warn};
use vmwatch::config::{load_config, VmwatchConfig};
use vmwatch::deadlock::{DeadlockParser, WaitGraph};

const USAGE: &str = "usage: vmwatch <dump-file> [config.toml]";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vmwatch=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let dump_path = args.next().context(USAGE)?;
    let config = match args.next() {
        Some(path) => load_config(&path)?,
        None => VmwatchConfig::default(),
    }
    .with_env_overrides();

    let size = tokio::fs::metadata(&dump_path)
        .await
        .with_context(|| format!("Failed to stat dump file {}", dump_path))?
        .len();
    if size > config.deadlock.max_dump_bytes {
        bail!(
            "dump file {} is {} bytes, limit is {}",
            dump_path,
            size,
            config.deadlock.max_dump_bytes
        );
    }

    let text = tokio::fs::read_to_string(&dump_path)
        .await
        .with_context(|| format!("Failed to read dump file {}", dump_path))?;

    let result = DeadlockParser::new()
        .parse_str(&text)
        .with_context(|| format!("Failed to parse dump file {}", dump_path))?;
    info!(threads = result.len(), path = %dump_path, "Parsed deadlock dump");

    let graph = WaitGraph::from_threads(&result.threads);
    for cycle in graph.find_cycles() {
        let names: Vec<&str> = cycle
            .iter()
            .filter_map(|id| result.thread(id).map(|t| t.name.as_str()))
            .collect();
        warn!(threads = %names.join(" -> "), "Deadlock cycle detected");
    }

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
