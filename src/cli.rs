//! Command-line interface for inspecting and driving the cache.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::CacheConfig;
use crate::types::SoundId;

/// ambiance-cache: offline audio cache for ambiances
#[derive(Parser, Debug)]
#[command(name = "ambiance-cache")]
#[command(about = "Client-side audio cache for ambiance playback")]
#[command(version)]
pub struct Cli {
    /// Directory holding the cache database
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Base URL that relative audio paths are resolved against
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Cache every sound listed in a manifest
    Sync {
        /// Manifest JSON with the used sounds and the open ambiance
        manifest: PathBuf,

        /// Run a single pass without retrying failed sounds
        #[arg(long)]
        no_retry: bool,
    },

    /// List cached sounds
    List,

    /// Print a cached sound's metadata as JSON
    Show {
        id: SoundId,
    },

    /// Play one variant through the cache, writing its bytes out
    Open {
        /// Manifest JSON containing the sound
        manifest: PathBuf,

        /// Sound to open
        #[arg(long)]
        sound: SoundId,

        /// Variant index; picked at random if omitted
        #[arg(long)]
        variant: Option<usize>,

        /// File to write the audio to
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the storage quota and store totals
    Quota,

    /// Remove one sound from the cache
    Remove {
        id: SoundId,
    },

    /// Remove every sound from the cache
    Clear,
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Applies flag overrides on top of an environment-derived config.
    pub fn apply_to(&self, config: &mut CacheConfig) {
        if let Some(ref dir) = self.cache_dir {
            config.cache_path = Some(dir.clone());
        }
        if let Some(ref url) = self.base_url {
            config.base_url = Some(url.clone());
        }
    }

    /// Returns the log level from the flag or `AMBIANCE_CACHE_LOG`.
    pub fn effective_log_level(&self) -> Option<String> {
        self.log_level
            .clone()
            .or_else(|| std::env::var("AMBIANCE_CACHE_LOG").ok())
    }
}

/// Output path for `open`, defaulting to `sound-<id>-<variant>.mp3`.
pub fn open_output_path(output: Option<&PathBuf>, sound: SoundId, variant: usize) -> PathBuf {
    output
        .cloned()
        .unwrap_or_else(|| PathBuf::from(format!("sound-{}-{}.mp3", sound, variant)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn sync_command() {
        let cli = parse(&["ambiance-cache", "sync", "rain.json"]);
        assert_eq!(
            cli.command,
            Command::Sync {
                manifest: PathBuf::from("rain.json"),
                no_retry: false,
            }
        );

        let cli = parse(&["ambiance-cache", "sync", "rain.json", "--no-retry"]);
        assert!(matches!(cli.command, Command::Sync { no_retry: true, .. }));
    }

    #[test]
    fn open_command() {
        let cli = parse(&[
            "ambiance-cache",
            "open",
            "rain.json",
            "--sound",
            "12",
            "--variant",
            "1",
            "-o",
            "out.mp3",
        ]);
        assert_eq!(
            cli.command,
            Command::Open {
                manifest: PathBuf::from("rain.json"),
                sound: 12,
                variant: Some(1),
                output: Some(PathBuf::from("out.mp3")),
            }
        );
    }

    #[test]
    fn open_requires_sound() {
        assert!(Cli::try_parse_from(["ambiance-cache", "open", "rain.json"]).is_err());
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = parse(&[
            "ambiance-cache",
            "list",
            "--cache-dir",
            "/tmp/cache",
            "--log-level",
            "debug",
        ]);
        assert_eq!(cli.command, Command::List);
        assert_eq!(cli.cache_dir, Some(PathBuf::from("/tmp/cache")));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn flags_override_config() {
        let cli = parse(&[
            "ambiance-cache",
            "--cache-dir",
            "/tmp/cache",
            "--base-url",
            "https://cdn.example.com/",
            "quota",
        ]);
        let mut config = CacheConfig {
            base_url: Some("https://old.example.com/".to_string()),
            ..Default::default()
        };

        cli.apply_to(&mut config);

        assert_eq!(config.cache_path, Some(PathBuf::from("/tmp/cache")));
        assert_eq!(config.base_url.as_deref(), Some("https://cdn.example.com/"));
    }

    #[test]
    fn missing_flags_keep_config() {
        let cli = parse(&["ambiance-cache", "clear"]);
        let mut config = CacheConfig {
            cache_path: Some(PathBuf::from("/var/cache/ambiance")),
            ..Default::default()
        };

        cli.apply_to(&mut config);
        assert_eq!(config.cache_path, Some(PathBuf::from("/var/cache/ambiance")));
    }

    #[test]
    fn remove_and_show_take_ids() {
        assert_eq!(
            parse(&["ambiance-cache", "remove", "7"]).command,
            Command::Remove { id: 7 }
        );
        assert_eq!(
            parse(&["ambiance-cache", "show", "3"]).command,
            Command::Show { id: 3 }
        );
    }

    #[test]
    fn output_path_default() {
        assert_eq!(open_output_path(None, 4, 2), PathBuf::from("sound-4-2.mp3"));
        let custom = PathBuf::from("x.mp3");
        assert_eq!(open_output_path(Some(&custom), 4, 2), custom);
    }
}
