//! Run controller.
//!
//! Owns phase sequencing: validate config → open cache → walk →
//! fingerprint → group → (per group: select → gate → [prompt] → execute)
//! → reports → flush cache → audit summary. The controller thread is the
//! only writer of the audit log and the only thread that touches the
//! resolution phase, which keeps action ordering auditable and prompts
//! coherent.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::audit::{AuditError, AuditLog};
use crate::cache::{CacheError, FingerprintCache, DEFAULT_RETENTION};
use crate::config::RunConfig;
use crate::duplicates::{DigestGroup, ExactMatch, SimilarityProvider, SizeProximity};
use crate::error::{ExitCode, ReasonCode};
use crate::output::{
    self, summary_body, CsvReport, HtmlReport, JsonReport, Mailer, RunSummary, SendmailMailer,
};
use crate::progress::{Progress, ProgressCallback, SilentProgress};
use crate::resolve::{
    select_survivor, ActionOutcome, Executor, ExecutorOptions, GateOptions, GateVerdict,
    InteractivePrompt, LocationPriorities, PromptChoice, SafetyGate,
};
use crate::scanner::{
    fingerprint_files, PipelineCounters, PipelineOptions, WalkOptions, Walker,
};
use crate::session::{ResumePoint, SessionError};
use crate::signal::CancelToken;

/// Fatal run errors (everything else is recovered per item).
#[derive(Debug, Error)]
pub enum RunError {
    /// Cache problems; `Locked` means a concurrent run.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Audit log I/O.
    #[error(transparent)]
    Audit(#[from] AuditError),

    /// Resume file problems.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A required external collaborator is unavailable, or a destructive
    /// run was refused without an interactive terminal.
    #[error("{0}")]
    Refused(String),

    /// Other I/O.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RunError {
    /// Exit code this error maps to.
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Refused(_) => ExitCode::MissingDependency,
            _ => ExitCode::ConfigError,
        }
    }
}

/// Result of a completed (or cleanly interrupted) run.
#[derive(Debug)]
pub struct RunOutcomeReport {
    /// Final counters.
    pub summary: RunSummary,
    /// Exit code to report.
    pub exit: ExitCode,
}

/// The run controller.
pub struct RunController {
    config: RunConfig,
    cancel: CancelToken,
}

impl RunController {
    /// Create a controller over a validated, frozen configuration.
    #[must_use]
    pub fn new(config: RunConfig, cancel: CancelToken) -> Self {
        Self { config, cancel }
    }

    /// Execute the full pipeline.
    ///
    /// # Errors
    ///
    /// Only pre-scan conditions are fatal: a locked cache, an unusable
    /// audit log, corrupt resume files, or a destructive non-interactive
    /// refusal. Everything after the scan starts is recovered per item
    /// and still produces reports.
    pub fn run(&self) -> Result<RunOutcomeReport, RunError> {
        let config = &self.config;

        // A forced-system destructive run cannot confirm without a
        // terminal; refuse before touching anything.
        if config.force_system
            && config.action.is_destructive()
            && !config.dry_run
            && !(config.interactive && std::io::stdin().is_terminal())
        {
            return Err(RunError::Refused(
                "force-system with a destructive action requires an interactive terminal".into(),
            ));
        }

        let mut audit = self.open_audit()?;
        let algo = config.effective_algorithm();

        let cache = match (config.use_cache, config.cache_path.as_ref()) {
            (true, Some(path)) => Some(Arc::new(FingerprintCache::open(
                path,
                algo,
                DEFAULT_RETENTION,
            )?)),
            _ => None,
        };

        // Verbose runs log each file anyway; the bars would only fight
        // the log lines for the terminal.
        let progress: Box<dyn ProgressCallback> = if config.quiet || config.verbose > 0 {
            Box::new(SilentProgress)
        } else {
            Box::new(Progress::new(false))
        };

        let mut summary = RunSummary {
            roots: config.roots.clone(),
            algorithm: algo.tag().to_string(),
            system_protection: !config.force_system,
            ..Default::default()
        };

        // Phase: discover + fingerprint, or re-enter from a resume point.
        let groups = if config.resume && ResumePoint::exists(&self.resume_dir()) {
            let point = match ResumePoint::load(&self.resume_dir()) {
                Ok(point) => point,
                Err(e @ SessionError::Corrupt(_)) => {
                    if let Some(a) = audit.as_mut() {
                        let _ = a.reason(ReasonCode::ResumeCorrupt, &e.to_string());
                    }
                    return Err(e.into());
                }
                Err(e) => return Err(e.into()),
            };
            // Groups saved under other roots or another algorithm must
            // never be resolved against this run.
            if let Err(e) = resume_matches(&point, config, algo) {
                if let Some(a) = audit.as_mut() {
                    let _ = a.reason(ReasonCode::ResumeCorrupt, &e.to_string());
                }
                return Err(e.into());
            }
            log::info!(
                "resuming {} groups saved at {}",
                point.groups.len(),
                point.meta.saved_at
            );
            summary.groups_found = point.groups.len() as u64;
            summary.bytes_wasted = point.groups.iter().map(DigestGroup::wasted_space).sum();
            point.groups
        } else {
            let (records, counters) = self.scan(algo, cache.clone(), progress.as_ref());
            summary.files_discovered = PipelineCounters::get(&counters.discovered);
            summary.files_fingerprinted = PipelineCounters::get(&counters.fingerprinted);
            summary.walk_errors = PipelineCounters::get(&counters.walk_errors);
            summary.hash_errors = PipelineCounters::get(&counters.hash_errors);
            summary.cache_hits = PipelineCounters::get(&counters.cache_hits);

            let provider: Box<dyn SimilarityProvider> = if config.fuzzy {
                Box::new(SizeProximity {
                    threshold_pct: config.threshold.unwrap_or(0.0),
                })
            } else {
                Box::new(ExactMatch)
            };
            log::debug!("grouping with the {} provider", provider.name());
            let (groups, stats) = provider.group(records);
            summary.groups_found = stats.groups as u64;
            summary.group_collisions = stats.size_collisions as u64;
            summary.bytes_wasted = stats.wasted_bytes;
            groups
        };

        // Interrupted between grouping and resolution: offer a resume
        // point, then still emit reports for what was gathered.
        if self.cancel.is_cancelled() {
            summary.interrupted = true;
            self.offer_resume_point(algo.tag(), &groups);
            self.write_reports(&groups, &summary);
            self.finish_cache(cache.as_deref());
            self.write_audit_summary(audit.as_mut(), &summary);
            return Ok(RunOutcomeReport {
                summary,
                exit: ExitCode::Cancelled,
            });
        }

        // Phase: per-group resolution.
        let quit_early = self.resolve_groups(&groups, &mut summary, audit.as_mut());

        summary.interrupted = self.cancel.is_cancelled();
        if summary.interrupted && !quit_early {
            self.offer_resume_point(algo.tag(), &groups);
        }

        // Phase: reports and teardown.
        self.write_reports(&groups, &summary);

        // Resolution finished uncancelled: the resume point is spent.
        // Cleared before the mail hand-off, so a missing mailer cannot
        // leave a stale point whose targets are already resolved.
        if !summary.interrupted {
            ResumePoint::clear(&self.resume_dir());
        }

        if let Err(e) = self.send_email(&summary) {
            log::error!("{e}");
            self.finish_cache(cache.as_deref());
            self.write_audit_summary(audit.as_mut(), &summary);
            return Err(e);
        }
        self.finish_cache(cache.as_deref());
        self.write_audit_summary(audit.as_mut(), &summary);

        let exit = if summary.interrupted {
            ExitCode::Cancelled
        } else {
            ExitCode::Success
        };
        Ok(RunOutcomeReport { summary, exit })
    }

    /// Discovery + fingerprint phases.
    fn scan(
        &self,
        algo: crate::scanner::DigestAlgorithm,
        cache: Option<Arc<FingerprintCache>>,
        progress: &dyn ProgressCallback,
    ) -> (Vec<crate::scanner::FileRecord>, PipelineCounters) {
        let config = &self.config;

        let mut exclude = config.exclude.clone();
        if config.skip_system {
            exclude.extend(config.system_roots.iter().cloned());
        }

        let walk_options = WalkOptions {
            exclude,
            patterns: config.patterns.clone(),
            min_size: config.min_size,
            max_size: config.max_size,
            max_depth: config.max_depth,
            include_hidden: config.include_hidden,
            follow_symlinks: config.follow_symlinks,
            include_empty: config.include_empty,
        };
        let walker = Walker::new(config.roots.clone(), walk_options)
            .with_cancel(self.cancel.clone());

        let pipeline_options = PipelineOptions {
            algo,
            threads: config.threads,
            timeout: Some(config.hash_timeout),
            queue_depth: 1024,
        };
        fingerprint_files(walker, &pipeline_options, cache, &self.cancel, progress)
    }

    /// Sequential select → gate → [prompt] → execute over every group.
    ///
    /// Returns true when the operator quit the phase from the prompt.
    fn resolve_groups(
        &self,
        groups: &[DigestGroup],
        summary: &mut RunSummary,
        mut audit: Option<&mut AuditLog>,
    ) -> bool {
        let config = &self.config;

        let gate = SafetyGate::new(GateOptions {
            system_roots: config.system_roots.clone(),
            force_system: config.force_system,
            interactive: config.interactive,
            verify_bytes: config.verify,
            ..Default::default()
        });
        let executor = Executor::new(ExecutorOptions {
            dry_run: config.dry_run,
            backup_root: config.backup_dir.clone(),
            quarantine_dir: config.quarantine_dir.clone(),
            trash_fallback: config.trash_fallback,
            backup_stamp: chrono::Utc::now().format("%Y%m%d_%H%M%S").to_string(),
        });
        let priorities = LocationPriorities::default();

        let mut prompt = if config.interactive {
            Some(InteractivePrompt::new(
                std::io::stdin().lock(),
                std::io::stderr(),
            ))
        } else {
            None
        };

        for group in groups {
            if self.cancel.is_cancelled() {
                return false;
            }

            let decision = select_survivor(
                group,
                &config.keep_policy,
                config.keep_path.as_deref(),
                &priorities,
            );
            let mut survivor_idx = decision.index;
            log::debug!(
                "group {}: keeping {} ({})",
                group.id,
                group.files[survivor_idx].path.display(),
                decision.strategy.tag()
            );

            // A protected survivor means the whole group is off limits;
            // audit it so the operator sees every member was refused.
            if config.action.is_destructive() {
                if let GateVerdict::Reject { reason, detail } =
                    gate.check_protected(&group.files[survivor_idx].path)
                {
                    summary.gate_rejections += 1;
                    record_outcome(
                        &mut audit,
                        summary,
                        &ActionOutcome::skipped(
                            group.files[survivor_idx].path.clone(),
                            config.action,
                            reason,
                            detail,
                        ),
                    );
                }
            }

            // Targets in lexicographic path order; re-derived on swap.
            let mut processed: Vec<usize> = Vec::new();
            loop {
                let next = next_target(group, survivor_idx, &processed);
                let Some(idx) = next else { break };
                let target = &group.files[idx];
                let survivor = &group.files[survivor_idx];

                let verdict = gate.check(target, survivor, config.action);
                if let GateVerdict::Reject { reason, detail } = verdict {
                    // The in-use probe is overridable per file at the
                    // prompt; every other rejection is final.
                    let overridden = reason == ReasonCode::GateInUse
                        && prompt
                            .as_mut()
                            .is_some_and(|p| p.confirm_in_use(target));
                    if !overridden {
                        log::debug!("gate: {} {}", reason, detail);
                        summary.gate_rejections += 1;
                        record_outcome(
                            &mut audit,
                            summary,
                            &ActionOutcome::skipped(
                                target.path.clone(),
                                config.action,
                                reason,
                                detail,
                            ),
                        );
                        processed.push(idx);
                        continue;
                    }
                }

                let mut action = config.action;
                if let Some(ref mut prompt) = prompt {
                    match prompt.ask(target, survivor, config.action) {
                        PromptChoice::Apply(kind) | PromptChoice::ApplyToAll(kind) => {
                            action = kind;
                        }
                        PromptChoice::Skip => {
                            processed.push(idx);
                            continue;
                        }
                        PromptChoice::SwapKeep => {
                            log::info!(
                                "survivor swapped to {}",
                                group.files[idx].path.display()
                            );
                            survivor_idx = idx;
                            continue;
                        }
                        PromptChoice::Quit => {
                            log::info!("resolution phase stopped by operator");
                            return true;
                        }
                    }
                }

                if action.is_destructive() {
                    summary.actions_attempted += 1;
                }
                let outcome = executor.execute(target, survivor, action);
                record_outcome(&mut audit, summary, &outcome);
                processed.push(idx);
            }
        }
        false
    }

    /// Reports to explicit paths, plus timestamped files in the output
    /// directory when one is configured.
    fn write_reports(&self, groups: &[DigestGroup], summary: &RunSummary) {
        let config = &self.config;
        let system_roots = config.system_roots.clone();

        let csv_path = config
            .csv_path
            .clone()
            .or_else(|| config.output_dir.as_deref().map(|d| output::report_path(d, "csv")));
        if let Some(path) = csv_path {
            match std::fs::File::create(&path) {
                Ok(file) => {
                    if let Err(e) = CsvReport::new(groups, &system_roots).write_to(file) {
                        log::error!("CSV report failed: {e}");
                    } else {
                        log::info!("CSV report written to {}", path.display());
                    }
                }
                Err(e) => log::error!("cannot create {}: {e}", path.display()),
            }
        }

        let json_path = config
            .json_path
            .clone()
            .or_else(|| config.output_dir.as_deref().map(|d| output::report_path(d, "json")));
        if let Some(path) = json_path {
            match std::fs::File::create(&path) {
                Ok(mut file) => {
                    let report = JsonReport::new(groups, summary, &system_roots);
                    if let Err(e) = report.write_to(&mut file) {
                        log::error!("JSON report failed: {e}");
                    } else {
                        log::info!("JSON report written to {}", path.display());
                    }
                }
                Err(e) => log::error!("cannot create {}: {e}", path.display()),
            }
        }

        let html_path = config
            .html_path
            .clone()
            .or_else(|| config.output_dir.as_deref().map(|d| output::report_path(d, "html")));
        if let Some(path) = html_path {
            match std::fs::File::create(&path) {
                Ok(mut file) => {
                    let report = HtmlReport::new(groups, summary);
                    if let Err(e) = report.write_to(&mut file) {
                        log::error!("HTML report failed: {e}");
                    } else {
                        log::info!("HTML report written to {}", path.display());
                    }
                }
                Err(e) => log::error!("cannot create {}: {e}", path.display()),
            }
        }
    }

    fn send_email(&self, summary: &RunSummary) -> Result<(), RunError> {
        let Some(ref recipient) = self.config.email else {
            return Ok(());
        };
        let mailer = SendmailMailer;
        mailer
            .send(recipient, "Duplicate scan summary", &summary_body(summary))
            .map_err(|e| RunError::Refused(e.to_string()))?;
        log::info!("summary mailed to {recipient}");
        Ok(())
    }

    fn open_audit(&self) -> Result<Option<AuditLog>, RunError> {
        let path = self.config.log_path.clone().or_else(|| {
            self.config
                .output_dir
                .as_ref()
                .map(|dir| dir.join("audit.log"))
        });
        match path {
            Some(path) => Ok(Some(AuditLog::open(&path)?)),
            None => Ok(None),
        }
    }

    fn write_audit_summary(&self, audit: Option<&mut AuditLog>, summary: &RunSummary) {
        if let Some(audit) = audit {
            let line = format!(
                "discovered={} fingerprinted={} hash_errors={} groups={} wasted={} \
                 attempted={} succeeded={} reclaimed={} gate_rejections={} interrupted={}",
                summary.files_discovered,
                summary.files_fingerprinted,
                summary.hash_errors,
                summary.groups_found,
                summary.bytes_wasted,
                summary.actions_attempted,
                summary.actions_succeeded,
                summary.bytes_reclaimed,
                summary.gate_rejections,
                summary.interrupted,
            );
            if let Err(e) = audit.event("summary", &line) {
                log::error!("could not write audit summary: {e}");
            }
        }
        if !self.config.quiet {
            print_summary(summary);
        }
    }

    fn finish_cache(&self, cache: Option<&FingerprintCache>) {
        if let Some(cache) = cache {
            match cache.flush() {
                Ok(written) => {
                    let stats = cache.stats();
                    log::debug!(
                        "cache: {} hits, {} misses, {} rows written",
                        stats.hits,
                        stats.misses,
                        written
                    );
                }
                Err(e) => log::error!("cache flush failed: {e}"),
            }
        }
    }

    fn resume_dir(&self) -> PathBuf {
        self.config
            .output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Persist a resume point, but only with the operator's explicit nod.
    fn offer_resume_point(&self, algo_tag: &str, groups: &[DigestGroup]) {
        if groups.is_empty() {
            return;
        }
        if !std::io::stdin().is_terminal() {
            log::info!("interrupted; no terminal, resume point not saved");
            return;
        }
        use std::io::{BufRead, Write};
        eprint!("Save a resume point to continue later? [y/N]: ");
        let _ = std::io::stderr().flush();
        let mut line = String::new();
        if std::io::stdin().lock().read_line(&mut line).is_err() {
            return;
        }
        if line.trim().eq_ignore_ascii_case("y") {
            let point = ResumePoint::new(algo_tag, self.config.roots.clone(), groups.to_vec());
            if let Err(e) = point.save(&self.resume_dir()) {
                log::error!("could not save resume point: {e}");
            }
        }
    }
}

/// Verify a loaded resume point belongs to this run.
///
/// The algorithm must match (fast and strong digests are never
/// interchangeable), and when roots were given they must be the same set
/// the point was saved under. A rootless `--resume` invocation accepts
/// the saved roots as-is.
fn resume_matches(
    point: &ResumePoint,
    config: &RunConfig,
    algo: crate::scanner::DigestAlgorithm,
) -> Result<(), SessionError> {
    if point.meta.algorithm != algo.tag() {
        return Err(SessionError::Mismatch(format!(
            "saved with algorithm {}, this run uses {}",
            point.meta.algorithm,
            algo.tag()
        )));
    }

    if !config.roots.is_empty() {
        let mut saved = point.meta.roots.clone();
        saved.sort();
        let mut current = config.roots.clone();
        current.sort();
        if saved != current {
            return Err(SessionError::Mismatch(format!(
                "saved under {} root(s) that differ from this run's",
                saved.len()
            )));
        }
    }

    Ok(())
}

/// Smallest-path unprocessed non-survivor, or `None` when done.
fn next_target(group: &DigestGroup, survivor_idx: usize, processed: &[usize]) -> Option<usize> {
    group
        .files
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != survivor_idx && !processed.contains(i))
        .min_by(|(_, a), (_, b)| a.path.cmp(&b.path))
        .map(|(i, _)| i)
}

fn record_outcome(
    audit: &mut Option<&mut AuditLog>,
    summary: &mut RunSummary,
    outcome: &ActionOutcome,
) {
    if outcome.succeeded() {
        summary.actions_succeeded += 1;
        summary.bytes_reclaimed += outcome.bytes_reclaimed;
    }
    if let Some(audit) = audit.as_mut() {
        if let Err(e) = audit.outcome(outcome) {
            log::error!("audit write failed: {e}");
        }
    }
}

fn print_summary(summary: &RunSummary) {
    use bytesize::ByteSize;
    println!(
        "\n{} files scanned, {} duplicate groups, {} wasted",
        summary.files_discovered,
        summary.groups_found,
        ByteSize::b(summary.bytes_wasted)
    );
    if summary.actions_attempted > 0 {
        println!(
            "{} of {} actions succeeded, {} reclaimed",
            summary.actions_succeeded,
            summary.actions_attempted,
            ByteSize::b(summary.bytes_reclaimed)
        );
    }
    if summary.gate_rejections > 0 {
        println!("{} targets refused by the safety gate", summary.gate_rejections);
    }
    if summary.interrupted {
        println!("run interrupted");
    }
}
