use std::env;
use std::path::PathBuf;

use indicatif::{ProgressBar, ProgressStyle};
use ragdb_core::config::Config;
use ragdb_core::source::SourceLoader;
use ragdb_core::{EngineConfig, IndexKind, MetadataFilter};
use ragdb_engine::RagEngine;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "Usage: ragdb [--index flat|clustered|graph] [--data-dir DIR] <command> [args...]

Commands:
  ingest <file|dir> [--source NAME] [--limit N]
  query \"<text>\" [--k N] [--filter JSON]
  update <id> \"<content>\"
  delete <id>
  doc <id>
  feedback <query_id> <yes|no> [comments]
  stats | rebuild | clear";

fn usage_exit() -> ! {
    eprintln!("{USAGE}");
    std::process::exit(1)
}

/// Global flags are consumed; the rest is `(command, args)`.
fn parse_args(config: &mut EngineConfig) -> anyhow::Result<(String, Vec<String>)> {
    let mut args: Vec<String> = env::args().skip(1).collect();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--index" if i + 1 < args.len() => { config.index.kind = args[i + 1].parse::<IndexKind>()?; args.drain(i..i + 2); }
            "--data-dir" if i + 1 < args.len() => { config.data_dir = PathBuf::from(&args[i + 1]); args.drain(i..i + 2); }
            "--index" | "--data-dir" => { eprintln!("Error: {} requires a value", args[i]); usage_exit() }
            _ => i += 1,
        }
    }
    if args.is_empty() { usage_exit() }
    let cmd = args.remove(0);
    Ok((cmd, args))
}

/// Value following `flag`, parsed.
fn flag<T: std::str::FromStr>(args: &[String], flag: &str) -> Option<T> {
    let pos = args.iter().position(|a| a == flag)?;
    match args.get(pos + 1).map(|v| v.parse::<T>()) {
        Some(Ok(v)) => Some(v),
        _ => { eprintln!("Error: {flag} requires a valid value"); std::process::exit(1) }
    }
}

/// First positional argument, skipping flags and their values.
fn positional(args: &[String], index: usize) -> Option<&String> {
    let mut skip = false;
    args.iter()
        .filter(|a| {
            if skip { skip = false; return false; }
            if a.starts_with("--") { skip = true; return false; }
            true
        })
        .nth(index)
}

async fn ingest(engine: &RagEngine, args: &[String]) -> anyhow::Result<()> {
    let Some(target) = positional(args, 0).map(PathBuf::from) else { usage_exit() };
    if target.is_file() {
        let text = ragdb_core::source::read_file_content(&target)?;
        let source = flag::<String>(args, "--source")
            .or_else(|| target.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "input".to_string());
        let n = engine.ingest(&text, &source).await?;
        println!("✅ Ingested {n} chunks from {}", target.display());
        return Ok(());
    }
    let mut loader = SourceLoader::new();
    if let Some(limit) = flag::<usize>(args, "--limit") { loader = loader.with_limit(limit); }
    let sources = loader.load_directory(&target)?;
    println!("Ingesting {} files from {}", sources.len(), target.display());
    let pb = ProgressBar::new(sources.len() as u64);
    pb.set_style(ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")?.progress_chars("##-"));
    let total = engine
        .ingest_sources(&sources, |source| {
            pb.set_message(source.source.clone());
            pb.inc(1);
        })
        .await?;
    pb.finish_and_clear();
    println!("✅ Ingest complete ({total} chunks, {} files)", sources.len());
    Ok(())
}

async fn query(engine: &RagEngine, args: &[String]) -> anyhow::Result<()> {
    let Some(text) = positional(args, 0) else { usage_exit() };
    let k = flag::<usize>(args, "--k").unwrap_or(engine.config().retrieval.default_k);
    let filter = flag::<String>(args, "--filter").map(|json| MetadataFilter::from_json(&json)).transpose()?;
    let result = engine.query(text, k, filter.as_ref()).await?;
    println!("🔍 {} results for \"{}\" (query id {})", result.documents.len(), text, result.query_id);
    for (i, hit) in result.documents.iter().enumerate() {
        let doc = &hit.document;
        println!("\n  {}. score={:.4}  distance={:.4}  id={}  category={}", i + 1, hit.score, hit.distance, doc.id, doc.category());
        println!("     📝 {}", doc.content);
    }
    if !result.context.is_empty() { println!("\n{}", result.context); }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::load().map_err(|e| { eprintln!("Error loading config: {e}"); e })?.engine()?;
    let (cmd, args) = parse_args(&mut config)?;
    if ragdb_embed::fake_embeddings_requested() { tracing::info!("APP_USE_FAKE_EMBEDDINGS set; using hash embeddings"); }
    let engine = RagEngine::open(config)?;

    match cmd.as_str() {
        "ingest" => ingest(&engine, &args).await?,
        "query" => query(&engine, &args).await?,
        "update" => {
            let (Some(id), Some(content)) = (positional(&args, 0), positional(&args, 1)) else { usage_exit() };
            engine.update(id, content).await?;
            println!("✅ Updated {id}");
        }
        "delete" => {
            let Some(id) = positional(&args, 0) else { usage_exit() };
            if engine.delete(id).await? { println!("✅ Deleted {id}"); } else { println!("⚠️  No document {id}"); }
        }
        "doc" => {
            let Some(id) = positional(&args, 0) else { usage_exit() };
            match engine.document(id) {
                Some(mut doc) => { doc.embedding = None; println!("{}", serde_json::to_string_pretty(&doc)?); }
                None => println!("⚠️  No document {id}"),
            }
        }
        "feedback" => {
            let (Some(query_id), Some(verdict)) = (positional(&args, 0), positional(&args, 1)) else { usage_exit() };
            let relevant = matches!(verdict.as_str(), "yes" | "y" | "true" | "1");
            let comments = (args.len() > 2).then(|| args[2..].join(" "));
            engine.feedback(query_id, relevant, comments.as_deref())?;
            println!("✅ Feedback recorded for {query_id}");
        }
        "stats" => {
            println!("{}", serde_json::to_string_pretty(&engine.stats())?);
            let cache = engine.cache_stats();
            println!("📊 Embedding cache: {}/{} entries, {} hits, {} misses", cache.entries, cache.capacity, cache.hits, cache.misses);
        }
        "rebuild" => { engine.rebuild().await?; println!("✅ Rebuilt index ({} documents)", engine.len()); }
        "clear" => { engine.clear().await?; println!("✅ Cleared corpus"); }
        _ => { eprintln!("Unknown command: {cmd}"); usage_exit() }
    }
    Ok(())
}
