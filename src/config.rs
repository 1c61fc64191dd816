//! Run configuration.
//!
//! [`RunConfig`] is built in three layers: defaults, then the optional
//! `key=value` config file, then CLI flags. [`RunConfig::validate`] is the
//! freeze point: after it passes, the configuration never changes for the
//! life of the run.
//!
//! Config-file rules: keys match the long flag names; unknown keys warn
//! and are ignored; values containing shell metacharacters are rejected
//! outright (the original operators fed these files from untrusted
//! places).

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::cli::{parse_size, Cli};
use crate::resolve::{ActionKind, KeepPolicy};
use crate::scanner::DigestAlgorithm;

/// Characters never allowed in config-file values.
const FORBIDDEN_VALUE_CHARS: &[char] = &['$', '`', ';', '|', '&', '<', '>', '(', ')'];

/// Configuration errors; all fatal before the scan begins.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No roots to scan.
    #[error("at least one root path is required")]
    NoRoots,

    /// More than one resolution action requested.
    #[error("actions are mutually exclusive: {0}")]
    ConflictingActions(String),

    /// Bad size window.
    #[error("min-size ({0}) exceeds max-size ({1})")]
    SizeWindow(u64, u64),

    /// Bad or inaccessible path.
    #[error("unusable {what} directory {path}: {detail}")]
    BadDirectory {
        /// Which directory (output, quarantine, backup).
        what: &'static str,
        /// The offending path.
        path: PathBuf,
        /// Why.
        detail: String,
    },

    /// A root does not exist or is not a directory.
    #[error("root is not a directory: {0}")]
    BadRoot(PathBuf),

    /// Config file problem.
    #[error("config file {path}: {detail}")]
    File {
        /// The config file.
        path: PathBuf,
        /// Why.
        detail: String,
    },

    /// Threshold without fuzzy, or out of range.
    #[error("threshold requires --fuzzy and must be between 0 and 100")]
    BadThreshold,
}

/// The effective configuration, frozen once validated.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Root directories to scan.
    pub roots: Vec<PathBuf>,
    /// Canonicalized exclusions.
    pub exclude: Vec<PathBuf>,
    /// Basename globs.
    pub patterns: Vec<String>,
    /// Inclusive size window.
    pub min_size: u64,
    /// Inclusive upper bound; `None` = unbounded.
    pub max_size: Option<u64>,
    /// Maximum traversal depth.
    pub max_depth: Option<usize>,
    /// Include hidden entries.
    pub include_hidden: bool,
    /// Follow symlinks.
    pub follow_symlinks: bool,
    /// Include empty files.
    pub include_empty: bool,

    /// Fast fingerprints.
    pub fast: bool,
    /// Byte-verify before destructive actions.
    pub verify: bool,
    /// Size-proximity grouping (report only).
    pub fuzzy: bool,
    /// Fuzzy threshold in percent.
    pub threshold: Option<f64>,
    /// Strong algorithm choice (ignored under `fast`).
    pub algorithm: DigestAlgorithm,

    /// The resolution action.
    pub action: ActionKind,
    /// Per-target prompting.
    pub interactive: bool,
    /// Mutate nothing.
    pub dry_run: bool,
    /// Trash may fall through to delete.
    pub trash_fallback: bool,
    /// Quarantine directory.
    pub quarantine_dir: Option<PathBuf>,

    /// Survivor policy.
    pub keep_policy: KeepPolicy,
    /// Keep-path prefix.
    pub keep_path: Option<PathBuf>,

    /// Fingerprint worker threads (0 = logical cores).
    pub threads: usize,
    /// Persistent cache enabled.
    pub use_cache: bool,
    /// Cache store location (defaulted when enabled).
    pub cache_path: Option<PathBuf>,

    /// Protected system roots for the safety gate.
    pub system_roots: Vec<PathBuf>,
    /// Exclude system roots from the walk entirely.
    pub skip_system: bool,
    /// Override the system gate (interactive confirmation still needed).
    pub force_system: bool,
    /// Backup root.
    pub backup_dir: Option<PathBuf>,

    /// Output directory for timestamped reports and the audit log.
    pub output_dir: Option<PathBuf>,
    /// Explicit CSV report path.
    pub csv_path: Option<PathBuf>,
    /// Explicit JSON report path.
    pub json_path: Option<PathBuf>,
    /// Explicit HTML report path.
    pub html_path: Option<PathBuf>,
    /// Email recipient for the summary.
    pub email: Option<String>,
    /// Audit log path override.
    pub log_path: Option<PathBuf>,

    /// Verbosity count.
    pub verbose: u8,
    /// Quiet mode.
    pub quiet: bool,
    /// Resume from a saved point.
    pub resume: bool,

    /// Per-file hashing deadline.
    pub hash_timeout: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            exclude: Vec::new(),
            patterns: Vec::new(),
            min_size: 1,
            max_size: None,
            max_depth: None,
            include_hidden: false,
            follow_symlinks: false,
            include_empty: false,
            fast: false,
            verify: false,
            fuzzy: false,
            threshold: None,
            algorithm: DigestAlgorithm::Md5,
            action: ActionKind::Report,
            interactive: false,
            dry_run: false,
            trash_fallback: false,
            quarantine_dir: None,
            keep_policy: KeepPolicy::First,
            keep_path: None,
            threads: 0,
            use_cache: false,
            cache_path: None,
            system_roots: crate::resolve::default_system_roots(),
            skip_system: false,
            force_system: false,
            backup_dir: None,
            output_dir: None,
            csv_path: None,
            json_path: None,
            html_path: None,
            email: None,
            log_path: None,
            verbose: 0,
            quiet: false,
            resume: false,
            hash_timeout: Duration::from_secs(30),
        }
    }
}

impl RunConfig {
    /// Build the effective configuration: defaults ← config file ← CLI.
    ///
    /// # Errors
    ///
    /// [`ConfigError`] for unreadable or malformed config files.
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(ref path) = cli.config {
            config.merge_file(path)?;
        }
        config.merge_cli(cli)?;
        Ok(config)
    }

    /// Apply a `key=value` config file.
    ///
    /// # Errors
    ///
    /// Unreadable file, or a value containing shell metacharacters.
    pub fn merge_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::File {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;

        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                log::warn!(
                    "{}:{}: not a key=value line, ignored",
                    path.display(),
                    lineno + 1
                );
                continue;
            };
            let key = key.trim();
            let value = value.trim();

            if value.contains(FORBIDDEN_VALUE_CHARS) {
                return Err(ConfigError::File {
                    path: path.to_path_buf(),
                    detail: format!(
                        "line {}: value for '{}' contains shell metacharacters",
                        lineno + 1,
                        key
                    ),
                });
            }

            if let Err(detail) = self.apply_key(key, value) {
                return Err(ConfigError::File {
                    path: path.to_path_buf(),
                    detail: format!("line {}: {}", lineno + 1, detail),
                });
            }
        }
        Ok(())
    }

    /// Apply one config-file entry. Unknown keys warn and succeed.
    fn apply_key(&mut self, key: &str, value: &str) -> Result<(), String> {
        match key {
            "path" => self.roots.push(PathBuf::from(value)),
            "exclude" => self.exclude.push(PathBuf::from(value)),
            "pattern" => self.patterns.push(value.to_string()),
            "min-size" => self.min_size = parse_size(value)?,
            "max-size" => self.max_size = Some(parse_size(value)?),
            "level" => {
                self.max_depth = Some(value.parse().map_err(|_| format!("bad level: {value}"))?);
            }
            "follow-symlinks" => self.follow_symlinks = parse_bool(value)?,
            "all" => self.include_hidden = parse_bool(value)?,
            "empty" => self.include_empty = parse_bool(value)?,
            "fast" => self.fast = parse_bool(value)?,
            "verify" => self.verify = parse_bool(value)?,
            "fuzzy" => self.fuzzy = parse_bool(value)?,
            "threshold" => {
                self.threshold =
                    Some(value.parse().map_err(|_| format!("bad threshold: {value}"))?);
            }
            "sha256" => {
                if parse_bool(value)? {
                    self.algorithm = DigestAlgorithm::Sha256;
                }
            }
            "sha512" => {
                if parse_bool(value)? {
                    self.algorithm = DigestAlgorithm::Sha512;
                }
            }
            "delete" => {
                if parse_bool(value)? {
                    self.action = ActionKind::Delete;
                }
            }
            "trash" => {
                if parse_bool(value)? {
                    self.action = ActionKind::Trash;
                }
            }
            "hardlink" => {
                if parse_bool(value)? {
                    self.action = ActionKind::Hardlink;
                }
            }
            "quarantine" => {
                self.action = ActionKind::Quarantine;
                self.quarantine_dir = Some(PathBuf::from(value));
            }
            "interactive" => self.interactive = parse_bool(value)?,
            "dry-run" => self.dry_run = parse_bool(value)?,
            "keep-newest" => {
                if parse_bool(value)? {
                    self.keep_policy = KeepPolicy::Newest;
                }
            }
            "keep-oldest" => {
                if parse_bool(value)? {
                    self.keep_policy = KeepPolicy::Oldest;
                }
            }
            "smart-delete" => {
                if parse_bool(value)? {
                    self.keep_policy = KeepPolicy::Smart;
                }
            }
            "keep-path" => self.keep_path = Some(PathBuf::from(value)),
            "threads" => {
                self.threads = value.parse().map_err(|_| format!("bad threads: {value}"))?;
            }
            "cache" => self.use_cache = parse_bool(value)?,
            "skip-system" => self.skip_system = parse_bool(value)?,
            "system-root" => self.system_roots.push(PathBuf::from(value)),
            "force-system" => self.force_system = parse_bool(value)?,
            "backup" => self.backup_dir = Some(PathBuf::from(value)),
            "output" => self.output_dir = Some(PathBuf::from(value)),
            "csv" => self.csv_path = Some(PathBuf::from(value)),
            "json" => self.json_path = Some(PathBuf::from(value)),
            "html" => self.html_path = Some(PathBuf::from(value)),
            "email" => self.email = Some(value.to_string()),
            "log" => self.log_path = Some(PathBuf::from(value)),
            "verbose" => self.verbose = value.parse().unwrap_or(1),
            "quiet" => self.quiet = parse_bool(value)?,
            unknown => log::warn!("unknown config key '{}', ignored", unknown),
        }
        Ok(())
    }

    /// Fold CLI flags over the file-derived configuration.
    fn merge_cli(&mut self, cli: &Cli) -> Result<(), ConfigError> {
        self.roots.extend(cli.roots.iter().cloned());
        self.roots.extend(cli.extra_paths.iter().cloned());
        self.exclude.extend(cli.exclude.iter().cloned());
        self.patterns.extend(cli.patterns.iter().cloned());

        if let Some(ref list) = cli.exclude_list {
            let content = std::fs::read_to_string(list).map_err(|e| ConfigError::File {
                path: list.clone(),
                detail: e.to_string(),
            })?;
            self.exclude.extend(
                content
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty() && !l.starts_with('#'))
                    .map(PathBuf::from),
            );
        }

        if let Some(size) = cli.min_size {
            self.min_size = size;
        }
        if cli.max_size.is_some() {
            self.max_size = cli.max_size;
        }
        if cli.level.is_some() {
            self.max_depth = cli.level;
        }
        self.include_hidden |= cli.all;
        self.follow_symlinks |= cli.follow_symlinks;
        self.include_empty |= cli.empty;

        self.fast |= cli.fast;
        self.verify |= cli.verify;
        self.fuzzy |= cli.fuzzy;
        if cli.threshold.is_some() {
            self.threshold = cli.threshold;
        }
        if cli.sha256 {
            self.algorithm = DigestAlgorithm::Sha256;
        }
        if cli.sha512 {
            self.algorithm = DigestAlgorithm::Sha512;
        }

        let mut actions: Vec<(&str, ActionKind)> = Vec::new();
        if cli.delete {
            actions.push(("delete", ActionKind::Delete));
        }
        if cli.trash {
            actions.push(("trash", ActionKind::Trash));
        }
        if cli.hardlink {
            actions.push(("hardlink", ActionKind::Hardlink));
        }
        if cli.quarantine.is_some() {
            actions.push(("quarantine", ActionKind::Quarantine));
        }
        match actions.len() {
            0 => {}
            1 => {
                self.action = actions[0].1;
                if let Some(ref dir) = cli.quarantine {
                    self.quarantine_dir = Some(dir.clone());
                }
            }
            _ => {
                let names: Vec<&str> = actions.iter().map(|(n, _)| *n).collect();
                return Err(ConfigError::ConflictingActions(names.join(", ")));
            }
        }

        self.interactive |= cli.interactive;
        self.dry_run |= cli.dry_run;
        self.trash_fallback |= cli.trash_fallback;

        if cli.keep_newest {
            self.keep_policy = KeepPolicy::Newest;
        }
        if cli.keep_oldest {
            self.keep_policy = KeepPolicy::Oldest;
        }
        if cli.smart_delete {
            self.keep_policy = KeepPolicy::Smart;
        }
        if cli.keep_path.is_some() {
            self.keep_path.clone_from(&cli.keep_path);
        }

        if let Some(threads) = cli.threads {
            self.threads = threads;
        }
        self.use_cache |= cli.cache;
        self.skip_system |= cli.skip_system;
        self.force_system |= cli.force_system;
        if cli.backup.is_some() {
            self.backup_dir.clone_from(&cli.backup);
        }

        if cli.output.is_some() {
            self.output_dir.clone_from(&cli.output);
        }
        if cli.csv.is_some() {
            self.csv_path.clone_from(&cli.csv);
        }
        if cli.json.is_some() {
            self.json_path.clone_from(&cli.json);
        }
        if cli.html.is_some() {
            self.html_path.clone_from(&cli.html);
        }
        if cli.email.is_some() {
            self.email.clone_from(&cli.email);
        }
        if cli.log_file.is_some() {
            self.log_path.clone_from(&cli.log_file);
        }

        self.verbose = self.verbose.max(cli.verbose);
        self.quiet |= cli.quiet;
        self.resume |= cli.resume;

        Ok(())
    }

    /// Validate and freeze the configuration.
    ///
    /// Checks roots, the size window, action/threshold coherence, and
    /// that the output / quarantine / backup directories are usable
    /// (created if absent). Canonicalizes roots and exclusions.
    ///
    /// # Errors
    ///
    /// [`ConfigError`]; the caller maps every variant to exit code 1.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        if self.roots.is_empty() && !self.resume {
            return Err(ConfigError::NoRoots);
        }

        let mut canonical_roots = Vec::with_capacity(self.roots.len());
        for root in &self.roots {
            let canonical = root
                .canonicalize()
                .map_err(|_| ConfigError::BadRoot(root.clone()))?;
            if !canonical.is_dir() {
                return Err(ConfigError::BadRoot(root.clone()));
            }
            if !canonical_roots.contains(&canonical) {
                canonical_roots.push(canonical);
            }
        }
        self.roots = canonical_roots;

        // Exclusions are canonicalized once here; missing ones are kept
        // verbatim so a not-yet-mounted path still excludes by prefix.
        self.exclude = self
            .exclude
            .iter()
            .map(|p| p.canonicalize().unwrap_or_else(|_| p.clone()))
            .collect();

        if let Some(max) = self.max_size {
            if self.min_size > max {
                return Err(ConfigError::SizeWindow(self.min_size, max));
            }
        }

        if self.threshold.is_some() {
            let t = self.threshold.unwrap();
            if !self.fuzzy || !(0.0..=100.0).contains(&t) {
                return Err(ConfigError::BadThreshold);
            }
        }

        if self.action == ActionKind::Quarantine && self.quarantine_dir.is_none() {
            return Err(ConfigError::BadDirectory {
                what: "quarantine",
                path: PathBuf::new(),
                detail: "quarantine action requires a directory".to_string(),
            });
        }

        for (what, dir) in [
            ("output", &self.output_dir),
            ("quarantine", &self.quarantine_dir),
            ("backup", &self.backup_dir),
        ] {
            if let Some(path) = dir {
                std::fs::create_dir_all(path).map_err(|e| ConfigError::BadDirectory {
                    what,
                    path: path.clone(),
                    detail: e.to_string(),
                })?;
            }
        }

        // Fast fingerprints plus any destructive action upgrade to byte
        // verification; the operator is told once.
        if self.fast && self.action.is_destructive() && !self.verify {
            log::warn!("fast fingerprints with a destructive action: byte verification enabled");
            self.verify = true;
        }

        if self.use_cache && self.cache_path.is_none() {
            self.cache_path = Some(default_cache_path());
        }

        Ok(())
    }

    /// The algorithm actually used for fingerprinting this run.
    #[must_use]
    pub fn effective_algorithm(&self) -> DigestAlgorithm {
        if self.fast {
            DigestAlgorithm::Fast64
        } else {
            self.algorithm
        }
    }
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(format!("expected a boolean, got '{other}'")),
    }
}

/// Default cache location under the user's data directory.
fn default_cache_path() -> PathBuf {
    directories::ProjectDirs::from("dev", "dupesweep", "dupesweep")
        .map(|dirs| dirs.cache_dir().join("fingerprints.db"))
        .unwrap_or_else(|| PathBuf::from(".dupesweep-fingerprints.db"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;
    use tempfile::TempDir;

    fn cli(args: &[&str]) -> Cli {
        let mut full = vec!["dupesweep"];
        full.extend(args);
        Cli::try_parse_from(full).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = RunConfig::default();
        assert_eq!(config.action, ActionKind::Report);
        assert_eq!(config.keep_policy, KeepPolicy::First);
        assert_eq!(config.algorithm, DigestAlgorithm::Md5);
        assert_eq!(config.min_size, 1);
        assert_eq!(config.hash_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_cli_merge() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().to_string_lossy().into_owned();
        let c = cli(&[&root, "--delete", "--keep-newest", "--fast", "--threads", "4"]);
        let mut config = RunConfig::from_cli(&c).unwrap();
        config.validate().unwrap();

        assert_eq!(config.action, ActionKind::Delete);
        assert_eq!(config.keep_policy, KeepPolicy::Newest);
        assert!(config.fast);
        assert_eq!(config.threads, 4);
        // Fast + destructive upgrades verify.
        assert!(config.verify);
        assert_eq!(config.effective_algorithm(), DigestAlgorithm::Fast64);
    }

    #[test]
    fn test_config_file_applies_and_cli_overrides() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("sweep.conf");
        let mut f = std::fs::File::create(&config_path).unwrap();
        writeln!(f, "# comment").unwrap();
        writeln!(f, "min-size = 1K").unwrap();
        writeln!(f, "keep-oldest = true").unwrap();
        writeln!(f, "threads = 2").unwrap();
        writeln!(f, "mystery-knob = 7").unwrap();

        let root = dir.path().to_string_lossy().into_owned();
        let c = cli(&[
            &root,
            "--config",
            config_path.to_str().unwrap(),
            "--threads",
            "8",
        ]);
        let mut config = RunConfig::from_cli(&c).unwrap();
        config.validate().unwrap();

        assert_eq!(config.min_size, 1024);
        assert_eq!(config.keep_policy, KeepPolicy::Oldest);
        // CLI wins over the file.
        assert_eq!(config.threads, 8);
    }

    #[test]
    fn test_config_file_rejects_metacharacters() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("sweep.conf");
        std::fs::write(&config_path, "backup = /tmp/$(rm -rf /)\n").unwrap();

        let c = cli(&["/d", "--config", config_path.to_str().unwrap()]);
        let result = RunConfig::from_cli(&c);
        assert!(matches!(result, Err(ConfigError::File { .. })));
    }

    #[test]
    fn test_validate_requires_roots() {
        let mut config = RunConfig::default();
        assert!(matches!(config.validate(), Err(ConfigError::NoRoots)));

        config.resume = true;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_root() {
        let mut config = RunConfig {
            roots: vec![PathBuf::from("/nonexistent/root/xyz")],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::BadRoot(_))));
    }

    #[test]
    fn test_validate_size_window() {
        let dir = TempDir::new().unwrap();
        let mut config = RunConfig {
            roots: vec![dir.path().to_path_buf()],
            min_size: 100,
            max_size: Some(10),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::SizeWindow(100, 10))
        ));
    }

    #[test]
    fn test_conflicting_actions_rejected() {
        let c = cli(&["/d", "--delete", "--trash"]);
        let result = RunConfig::from_cli(&c);
        assert!(matches!(result, Err(ConfigError::ConflictingActions(_))));
    }

    #[test]
    fn test_threshold_requires_fuzzy() {
        let dir = TempDir::new().unwrap();
        let mut config = RunConfig {
            roots: vec![dir.path().to_path_buf()],
            threshold: Some(5.0),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::BadThreshold)));

        config.fuzzy = true;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_quarantine_needs_dir() {
        let dir = TempDir::new().unwrap();
        let mut config = RunConfig {
            roots: vec![dir.path().to_path_buf()],
            action: ActionKind::Quarantine,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        config.quarantine_dir = Some(dir.path().join("q"));
        assert!(config.validate().is_ok());
        assert!(dir.path().join("q").is_dir());
    }

    #[test]
    fn test_duplicate_roots_deduplicated() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().to_string_lossy().into_owned();
        let c = cli(&[&root, "--path", &root]);
        let mut config = RunConfig::from_cli(&c).unwrap();
        config.validate().unwrap();
        assert_eq!(config.roots.len(), 1);
    }

    #[test]
    fn test_cache_path_defaulted_when_enabled() {
        let dir = TempDir::new().unwrap();
        let mut config = RunConfig {
            roots: vec![dir.path().to_path_buf()],
            use_cache: true,
            ..Default::default()
        };
        config.validate().unwrap();
        assert!(config.cache_path.is_some());
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("true").unwrap());
        assert!(parse_bool("YES").unwrap());
        assert!(!parse_bool("0").unwrap());
        assert!(parse_bool("maybe").is_err());
    }
}
