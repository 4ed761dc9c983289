//! ambiance-cache: command-line front end for the ambiance audio cache.
//!
//! Syncs manifests into the cache, reads sounds through it the way the
//! player does, and inspects or clears what is stored.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{anyhow, Context};

use ambiance_cache::cli::{open_output_path, Cli, Command};
use ambiance_cache::config::CacheConfig;
use ambiance_cache::types::{Manifest, SoundId};
use ambiance_cache::{logging, pick_variant, AudioCache, SyncReport};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse_args();
    logging::init(cli.effective_log_level().as_deref());

    let mut config = CacheConfig::from_env();
    cli.apply_to(&mut config);
    let cache = AudioCache::open(&config)?;

    match cli.command {
        Command::Sync { manifest, no_retry } => run_sync(&cache, &manifest, no_retry).await,
        Command::List => run_list(&cache).await,
        Command::Show { id } => run_show(&cache, id).await,
        Command::Open {
            manifest,
            sound,
            variant,
            output,
        } => {
            let output = output.as_ref();
            run_open(&cache, &manifest, sound, variant, output).await
        }
        Command::Quota => run_quota(&cache).await,
        Command::Remove { id } => {
            cache.remove(id).await?;
            println!("Removed sound {}", id);
            Ok(())
        }
        Command::Clear => {
            cache.clear().await?;
            println!("Cache cleared");
            Ok(())
        }
    }
}

/// Syncs every sound in a manifest.
async fn run_sync(cache: &AudioCache, manifest_path: &Path, no_retry: bool) -> anyhow::Result<()> {
    let manifest = Manifest::load(manifest_path)?;

    if manifest.ambiance.is_none() {
        eprintln!("Warning: manifest has no ambiance, nothing will be stored.");
    }

    let report = if no_retry {
        cache.sync(&manifest.sounds, manifest.ambiance.as_ref()).await
    } else {
        cache
            .sync_with_retry(&manifest.sounds, manifest.ambiance.as_ref())
            .await
    };

    print_report(&report);

    if report.is_complete() {
        Ok(())
    } else {
        Err(anyhow!("{} sound(s) could not be cached", report.failed.len()))
    }
}

fn print_report(report: &SyncReport) {
    println!("Sync finished after {} attempt(s)", report.attempts);
    println!("  Added:          {}", format_ids(&report.added));
    println!("  Already cached: {}", format_ids(&report.already_cached));
    println!("  Not stored:     {}", format_ids(&report.skipped));
    println!("  Failed:         {}", format_ids(&report.failed));
}

fn format_ids(ids: &[SoundId]) -> String {
    if ids.is_empty() {
        return "-".to_string();
    }
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

async fn run_list(cache: &AudioCache) -> anyhow::Result<()> {
    let sounds = cache.list().await;
    if sounds.is_empty() {
        println!("Cache is empty");
        return Ok(());
    }

    println!("{:>8}  {:<28}  {:>8}  {:>12}  {:>6}", "ID", "NAME", "VARIANTS", "BYTES", "INDEX");
    for sound in &sounds {
        println!(
            "{:>8}  {:<28}  {:>8}  {:>12}  {:>6}",
            sound.id(),
            sound.metadata.sound_name,
            format!("{}/{}", sound.captured_variants(), sound.metadata.audio_paths.len()),
            sound.size_bytes(),
            sound.storage_index
        );
    }
    Ok(())
}

async fn run_show(cache: &AudioCache, id: SoundId) -> anyhow::Result<()> {
    let sound = cache
        .get(id)
        .await
        .ok_or_else(|| anyhow!("sound {} is not cached", id))?;

    let json = serde_json::to_string_pretty(&sound.metadata)?;
    println!("{}", json);
    Ok(())
}

/// Reads one variant through the cache and writes it to disk.
async fn run_open(
    cache: &AudioCache,
    manifest_path: &Path,
    sound_id: SoundId,
    variant: Option<usize>,
    output: Option<&std::path::PathBuf>,
) -> anyhow::Result<()> {
    let manifest = Manifest::load(manifest_path)?;
    let metadata = manifest
        .sound(sound_id)
        .ok_or_else(|| anyhow!("sound {} is not in {}", sound_id, manifest_path.display()))?;

    let variant = match variant {
        Some(v) => v,
        None => pick_variant(metadata, &mut rand::thread_rng())
            .ok_or_else(|| anyhow!("sound {} has no audio", sound_id))?,
    };

    let working_set = manifest
        .ambiance
        .as_ref()
        .map(|a| a.working_set())
        .unwrap_or_else(HashSet::new);

    let (bytes, capture) = cache.read_through(metadata, variant, &working_set).await?;

    let output_path = open_output_path(output, sound_id, variant);
    tokio::fs::write(&output_path, &bytes)
        .await
        .with_context(|| format!("failed to write {}", output_path.display()))?;

    println!(
        "Wrote {} bytes of sound {} variant {} to {} ({})",
        bytes.len(),
        sound_id,
        variant,
        output_path.display(),
        if capture.is_some() { "fetched" } else { "cached" }
    );

    if let Some(capture) = capture {
        capture.await.context("capture task panicked")?;
    }
    Ok(())
}

async fn run_quota(cache: &AudioCache) -> anyhow::Result<()> {
    let stats = cache.stats().await;

    println!("Quota:   {}", format_bytes(stats.quota.quota));
    println!("Usage:   {}", format_bytes(stats.quota.usage));
    println!("Allowed: {}", format_bytes(stats.quota.allowed_bytes));
    println!("Stored:  {} in {} sound(s)", format_bytes(stats.total_bytes), stats.entries);
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    const MIB: f64 = 1024.0 * 1024.0;
    format!("{} bytes ({:.1} MiB)", bytes, bytes as f64 / MIB)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_ids_lists_or_dashes() {
        assert_eq!(format_ids(&[]), "-");
        assert_eq!(format_ids(&[3, 1, 2]), "3, 1, 2");
    }

    #[test]
    fn format_bytes_shows_mib() {
        assert_eq!(format_bytes(50 * 1024 * 1024), "52428800 bytes (50.0 MiB)");
    }

    #[test]
    fn print_report_doesnt_panic() {
        print_report(&SyncReport::default());
    }
}
