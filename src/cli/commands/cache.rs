//! Cache Command
//!
//! Inspect or empty the explanation result cache.
//!
//! Usage:
//!   codexplain cache stats
//!   codexplain cache clear

use crate::cli::ui::Output;
use crate::config::ConfigLoader;
use crate::storage::ResultCache;
use crate::types::Result;

fn open() -> Result<ResultCache> {
    let config = ConfigLoader::load()?;
    Ok(ResultCache::from_config(&config.cache))
}

pub async fn stats() -> Result<()> {
    let cache = open()?;
    let stats = cache.stats().await?;
    let output = Output::new();

    output.section("Result Cache");
    println!("  Directory: {}", cache.dir().display());
    println!("  TTL:       {}s", cache.ttl().as_secs());
    println!("  Entries:   {}", stats.entry_count);
    println!("  Expired:   {}", stats.expired_count);
    if stats.corrupt_count > 0 {
        output.warning(&format!(
            "{} unreadable record(s); `codexplain cache clear` removes them",
            stats.corrupt_count
        ));
    }
    println!("  Size:      {} bytes", stats.total_size_bytes);
    if let (Some(oldest), Some(newest)) = (stats.oldest_entry, stats.newest_entry) {
        println!("  Oldest:    {}", oldest.format("%Y-%m-%d %H:%M:%S UTC"));
        println!("  Newest:    {}", newest.format("%Y-%m-%d %H:%M:%S UTC"));
    }

    Ok(())
}

pub async fn clear() -> Result<()> {
    let cache = open()?;
    let removed = cache.clear().await?;
    Output::new().success(&format!(
        "Removed {} cached explanation(s) from {}",
        removed,
        cache.dir().display()
    ));
    Ok(())
}
