//! Feedcache CLI - inspect and evict cached listing feeds.
//!
//! Operates on the same on-disk store the feed cache writes to, so cached
//! feeds can be examined or cleared without running the app.

mod args;

use std::io;
use std::sync::Arc;

use anyhow::{Context, Result};
use feedcache_core::{generate_cache_key, CachedFeed, Config, FeedCache, FileStore};
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use args::Command;

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    init_tracing();

    let argv: Vec<String> = std::env::args().skip(1).collect();
    let command = match args::parse(&argv) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("Error: {}\n\n{}", e, args::USAGE);
            std::process::exit(2);
        }
    };

    if command == Command::Help {
        println!("{}", args::USAGE);
        return Ok(());
    }
    if let Command::Key(ref key) = command {
        println!("{}", generate_cache_key(key));
        return Ok(());
    }

    let (cache, store) = open_cache()?;
    run(&cache, &store, command).await
}

fn open_cache() -> Result<(FeedCache, Arc<FileStore>)> {
    let config = Config::load().context("Failed to load config")?;
    let cache_dir = config.cache_dir()?;
    debug!(?cache_dir, "Cache directory configured");

    let store = FileStore::new(cache_dir.clone())
        .with_context(|| format!("Failed to open cache directory: {}", cache_dir.display()))?;
    let store = Arc::new(store);
    let cache = FeedCache::with_options(store.clone(), config.cache_options());
    Ok((cache, store))
}

async fn run(cache: &FeedCache, store: &FileStore, command: Command) -> Result<()> {
    match command {
        Command::Stats => {
            let stats = cache.get_cache_stats().await;
            let options = cache.options();
            println!("Location: {}", store.dir().display());
            println!(
                "Policy:   stale after {}m, expire after {}h",
                options.ttl.num_minutes(),
                options.max_age.num_hours()
            );
            println!("Entries:  {}", stats.total_entries);
            println!("Size:     {}", stats.size_display());
            match stats.oldest_entry {
                Some(oldest) => println!("Oldest:   {}", oldest.to_rfc3339()),
                None => println!("Oldest:   never"),
            }
        }
        Command::Show { key, json } => match cache.get_cached_feed(&key).await {
            Some(cached) if json => println!("{}", serde_json::to_string_pretty(&cached)?),
            Some(cached) => print_summary(cache, &cached),
            None => println!("Not cached: {}", generate_cache_key(&key)),
        },
        Command::Clear(key) => {
            cache.clear_feed_cache(&key).await?;
            info!(key = %generate_cache_key(&key), "Cleared cached feed");
            println!("Cleared {}", generate_cache_key(&key));
        }
        Command::ClearAll => {
            cache.clear_all_feed_caches().await?;
            println!("Cleared all cached feeds");
        }
        Command::Key(_) | Command::Help => {}
    }
    Ok(())
}

fn print_summary(cache: &FeedCache, cached: &CachedFeed) {
    println!(
        "{} of {} items, updated {}{}",
        cached.items.len(),
        cached.total,
        cached.age_display(),
        if cache.is_cache_stale(cached) { " (stale)" } else { "" }
    );
    match cached.next_cursor {
        Some(ref cursor) => println!("Next page: {}", cursor),
        None => println!("Next page: none"),
    }
    for item in &cached.items {
        println!(
            "  {:<12} {:>10.2} {:<4} {}{}",
            item.id,
            item.price,
            item.currency,
            item.title,
            if item.is_boosted { " *" } else { "" }
        );
    }
}
