//! Logging setup on top of the `log` facade and `env_logger`.
//!
//! Level selection, in priority order:
//!
//! 1. `RUST_LOG` environment variable (if set)
//! 2. `--quiet` (errors only) or `--verbose` (debug, `-vv` for trace)
//! 3. Default: warn. Normal-mode progress goes through the progress
//!    reporter, not the logger, so info chatter stays off by default.

use env_logger::Builder;
use log::LevelFilter;
use std::env;
use std::io::Write;

/// Initialize the logging subsystem from CLI verbosity flags.
///
/// Call once, before the first `log` macro fires. In verbose mode every
/// skipped file is reported with its reason code; in quiet mode only fatal
/// errors reach the terminal.
///
/// # Arguments
///
/// * `verbose` - Verbosity count (0=warn, 1=debug, 2+=trace)
/// * `quiet` - Errors only (overridden by `RUST_LOG`)
pub fn init(verbose: u8, quiet: bool) {
    let mut builder = Builder::new();

    if env::var("RUST_LOG").is_ok() {
        builder.parse_default_env();
    } else {
        builder.filter_level(level_for(verbose, quiet));
    }

    builder.format(|buf, record| {
        let level = record.level();
        let style = buf.default_level_style(level);
        writeln!(buf, "{style}{:<5}{style:#} {}", level, record.args())
    });

    // init() panics on double-initialization; tests call this repeatedly.
    let _ = builder.try_init();
}

fn level_for(verbose: u8, quiet: bool) -> LevelFilter {
    if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}
