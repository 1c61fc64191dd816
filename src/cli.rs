//! Command-line interface.
//!
//! One command, no subcommands: the tool scans the given roots and
//! resolves what it finds. Flags are grouped by help heading.
//!
//! # Example
//!
//! ```bash
//! # Report duplicates under two trees
//! dupesweep ~/Downloads ~/Documents
//!
//! # Delete duplicates, keep the newest copy, byte-verify first
//! dupesweep --delete --keep-newest --verify ~/Downloads
//!
//! # Fast mode with hardlink resolution (byte verification is implied)
//! dupesweep --fast --hardlink --threads 8 /srv/media
//!
//! # Resume an interrupted run
//! dupesweep --resume --delete ~/Downloads
//! ```

use clap::Parser;
use std::path::PathBuf;

/// Scan directories for duplicate files and resolve each group while
/// keeping exactly one survivor.
#[derive(Debug, Parser)]
#[command(name = "dupesweep")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Root directories to scan
    #[arg(value_name = "PATH")]
    pub roots: Vec<PathBuf>,

    /// Additional root directory (repeatable)
    #[arg(long = "path", value_name = "PATH", help_heading = "Scanning")]
    pub extra_paths: Vec<PathBuf>,

    /// Exclude a path and everything beneath it (repeatable)
    #[arg(long, value_name = "PATH", help_heading = "Filtering")]
    pub exclude: Vec<PathBuf>,

    /// File of newline-separated exclude paths
    #[arg(long, value_name = "FILE", help_heading = "Filtering")]
    pub exclude_list: Option<PathBuf>,

    /// Minimum file size (accepts K, M, G, T suffixes, optional trailing B)
    #[arg(long, value_name = "SIZE", value_parser = parse_size, help_heading = "Filtering")]
    pub min_size: Option<u64>,

    /// Maximum file size (accepts K, M, G, T suffixes, optional trailing B)
    #[arg(long, value_name = "SIZE", value_parser = parse_size, help_heading = "Filtering")]
    pub max_size: Option<u64>,

    /// Basename glob filter (repeatable); files must match at least one
    #[arg(long = "pattern", value_name = "GLOB", help_heading = "Filtering")]
    pub patterns: Vec<String>,

    /// Maximum traversal depth below each root
    #[arg(long = "level", value_name = "N", help_heading = "Filtering")]
    pub level: Option<usize>,

    /// Follow symbolic links (with cycle detection)
    #[arg(long, help_heading = "Scanning")]
    pub follow_symlinks: bool,

    /// Include hidden files and directories
    #[arg(long = "all", help_heading = "Scanning")]
    pub all: bool,

    /// Include empty files
    #[arg(long = "empty", help_heading = "Scanning")]
    pub empty: bool,

    /// Fast fingerprints: size plus a 64 KiB prefix hash.
    /// Destructive actions then imply byte-level verification.
    #[arg(long, help_heading = "Fingerprinting")]
    pub fast: bool,

    /// Byte-verify survivor/target pairs before any destructive action
    #[arg(long, help_heading = "Fingerprinting")]
    pub verify: bool,

    /// Group by size proximity instead of exact digest (report only)
    #[arg(long, help_heading = "Fingerprinting")]
    pub fuzzy: bool,

    /// Size-proximity threshold in percent, used with --fuzzy
    #[arg(long, value_name = "PCT", help_heading = "Fingerprinting")]
    pub threshold: Option<f64>,

    /// Use SHA-256 for strong fingerprints
    #[arg(long, help_heading = "Fingerprinting")]
    pub sha256: bool,

    /// Use SHA-512 for strong fingerprints
    #[arg(long, conflicts_with = "sha256", help_heading = "Fingerprinting")]
    pub sha512: bool,

    /// Permanently delete non-survivors
    #[arg(long, help_heading = "Action")]
    pub delete: bool,

    /// Move non-survivors to the system trash
    #[arg(long, help_heading = "Action")]
    pub trash: bool,

    /// If trash is unavailable, fall through to permanent delete
    #[arg(long, requires = "trash", help_heading = "Action")]
    pub trash_fallback: bool,

    /// Replace non-survivors with hardlinks to the survivor
    #[arg(long, help_heading = "Action")]
    pub hardlink: bool,

    /// Move non-survivors into this quarantine directory
    #[arg(long, value_name = "DIR", help_heading = "Action")]
    pub quarantine: Option<PathBuf>,

    /// Ask before acting on each target
    #[arg(long, help_heading = "Action")]
    pub interactive: bool,

    /// Walk every branch but mutate nothing
    #[arg(long, help_heading = "Action")]
    pub dry_run: bool,

    /// Keep the newest copy in each group
    #[arg(long, help_heading = "Survivor selection")]
    pub keep_newest: bool,

    /// Keep the oldest copy in each group
    #[arg(long, conflicts_with = "keep_newest", help_heading = "Survivor selection")]
    pub keep_oldest: bool,

    /// Prefer the copy whose path starts with this prefix
    #[arg(long, value_name = "PATH", help_heading = "Survivor selection")]
    pub keep_path: Option<PathBuf>,

    /// Score copies by location priority (user data beats scratch dirs)
    #[arg(
        long,
        conflicts_with_all = ["keep_newest", "keep_oldest"],
        help_heading = "Survivor selection"
    )]
    pub smart_delete: bool,

    /// Worker threads for fingerprinting (default: logical cores)
    #[arg(long, value_name = "N", help_heading = "Performance")]
    pub threads: Option<usize>,

    /// Enable the persistent fingerprint cache
    #[arg(long, help_heading = "Performance")]
    pub cache: bool,

    /// Exclude configured system roots from the scan entirely
    #[arg(long, help_heading = "Safety")]
    pub skip_system: bool,

    /// Allow destructive actions inside system roots (interactive
    /// confirmation still required)
    #[arg(long, help_heading = "Safety")]
    pub force_system: bool,

    /// Copy each target under this directory before acting on it
    #[arg(long, value_name = "DIR", help_heading = "Safety")]
    pub backup: Option<PathBuf>,

    /// Directory for timestamped reports and the audit log
    #[arg(long, value_name = "DIR", help_heading = "Reporting")]
    pub output: Option<PathBuf>,

    /// Write a CSV report to this exact path
    #[arg(long, value_name = "FILE", help_heading = "Reporting")]
    pub csv: Option<PathBuf>,

    /// Write a JSON report to this exact path
    #[arg(long, value_name = "FILE", help_heading = "Reporting")]
    pub json: Option<PathBuf>,

    /// Write an HTML report to this exact path
    #[arg(long, value_name = "FILE", help_heading = "Reporting")]
    pub html: Option<PathBuf>,

    /// Email the run summary to this address
    #[arg(long, value_name = "ADDR", help_heading = "Reporting")]
    pub email: Option<String>,

    /// Audit log file (default: <output>/audit.log)
    #[arg(long = "log", value_name = "FILE", help_heading = "Reporting")]
    pub log_file: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only print fatal errors and the final summary
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Resume an interrupted run at the keep-select stage
    #[arg(long, help_heading = "State")]
    pub resume: bool,

    /// Configuration file (key=value lines)
    #[arg(long, value_name = "FILE", help_heading = "State")]
    pub config: Option<PathBuf>,
}

/// Parse a size with K/M/G/T suffixes (optional trailing B), powers of
/// 1024. Bare numbers are bytes.
///
/// # Examples
///
/// ```
/// use dupesweep::cli::parse_size;
///
/// assert_eq!(parse_size("4096").unwrap(), 4096);
/// assert_eq!(parse_size("1K").unwrap(), 1024);
/// assert_eq!(parse_size("1KB").unwrap(), 1024);
/// assert_eq!(parse_size("2M").unwrap(), 2 * 1024 * 1024);
/// assert_eq!(parse_size("1G").unwrap(), 1024 * 1024 * 1024);
/// ```
///
/// # Errors
///
/// Empty input, a bad number, or an unknown suffix.
pub fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("size cannot be empty".to_string());
    }

    let split = s
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(s.len());
    let (number, suffix) = s.split_at(split);
    let number: f64 = number
        .parse()
        .map_err(|_| format!("invalid number: '{number}'"))?;

    let multiplier: u64 = match suffix.trim().to_ascii_uppercase().as_str() {
        "" | "B" => 1,
        "K" | "KB" => 1 << 10,
        "M" | "MB" => 1 << 20,
        "G" | "GB" => 1 << 30,
        "T" | "TB" => 1u64 << 40,
        other => return Err(format!("unknown size suffix: '{other}'")),
    };

    Ok((number * multiplier as f64) as u64)
}
