//! Per-target interactive prompt.
//!
//! Inserted between the gate and the executor when `--interactive` is set.
//! The prompt is line-oriented: one character (plus Enter) per decision,
//! with `a` freezing the current choice for the rest of the run and `k`
//! swapping the survivor with the current target.

use std::io::{BufRead, Write};

use crate::scanner::FileRecord;

use super::ActionKind;

/// Operator decision for one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptChoice {
    /// Apply this action to the target.
    Apply(ActionKind),
    /// Leave the target alone.
    Skip,
    /// Exchange the survivor with this target and re-evaluate the group.
    SwapKeep,
    /// Apply the chosen action to every remaining target this run.
    ApplyToAll(ActionKind),
    /// Stop the resolution phase cleanly.
    Quit,
}

/// Line-oriented prompt over arbitrary reader/writer pairs.
///
/// Production wires this to stdin/stderr; tests feed it cursors.
pub struct InteractivePrompt<R, W> {
    input: R,
    output: W,
    /// Frozen choice after an `a` answer.
    frozen: Option<ActionKind>,
}

impl<R: BufRead, W: Write> InteractivePrompt<R, W> {
    /// Create a prompt over the given streams.
    #[must_use]
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            frozen: None,
        }
    }

    /// Ask about one target. `default_action` is what the run was
    /// configured to do and is applied on an empty answer.
    ///
    /// Unknown answers re-prompt; EOF quits the phase.
    pub fn ask(
        &mut self,
        target: &FileRecord,
        survivor: &FileRecord,
        default_action: ActionKind,
    ) -> PromptChoice {
        if let Some(frozen) = self.frozen {
            return PromptChoice::Apply(frozen);
        }

        loop {
            let _ = write!(
                self.output,
                "{} (keeping {})\n  [d]elete [h]ardlink [q]uarantine [s]kip [k]=swap-keep \
                 [v]iew [i]nfo [a]ll [x]=quit (default {}): ",
                target.path.display(),
                survivor.path.display(),
                default_action
            );
            let _ = self.output.flush();

            let mut line = String::new();
            match self.input.read_line(&mut line) {
                Ok(0) | Err(_) => return PromptChoice::Quit,
                Ok(_) => {}
            }

            match line.trim() {
                "" => return PromptChoice::Apply(default_action),
                "d" => return PromptChoice::Apply(ActionKind::Delete),
                "h" => return PromptChoice::Apply(ActionKind::Hardlink),
                "q" => return PromptChoice::Apply(ActionKind::Quarantine),
                "s" => return PromptChoice::Skip,
                "k" => return PromptChoice::SwapKeep,
                "x" => return PromptChoice::Quit,
                "a" => {
                    self.frozen = Some(default_action);
                    return PromptChoice::ApplyToAll(default_action);
                }
                "v" => {
                    self.show_view(target);
                }
                "i" => {
                    self.show_info(target, survivor);
                }
                other => {
                    let _ = writeln!(self.output, "unrecognized answer: {other:?}");
                }
            }
        }
    }

    /// Ask whether to act on a file the open-files probe flagged as in
    /// use. Defaults to no.
    pub fn confirm_in_use(&mut self, target: &FileRecord) -> bool {
        let _ = write!(
            self.output,
            "{} appears to be open in a running process. Act anyway? [y/N]: ",
            target.path.display()
        );
        let _ = self.output.flush();
        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) | Err(_) => false,
            Ok(_) => line.trim().eq_ignore_ascii_case("y"),
        }
    }

    /// Print the first lines of the target.
    fn show_view(&mut self, target: &FileRecord) {
        const VIEW_LINES: usize = 10;
        match std::fs::read(&target.path) {
            Ok(bytes) => {
                let text = String::from_utf8_lossy(&bytes);
                for line in text.lines().take(VIEW_LINES) {
                    let _ = writeln!(self.output, "  | {line}");
                }
            }
            Err(e) => {
                let _ = writeln!(self.output, "  cannot read {}: {e}", target.path.display());
            }
        }
    }

    /// Print metadata for both sides.
    fn show_info(&mut self, target: &FileRecord, survivor: &FileRecord) {
        for (label, record) in [("target", target), ("survivor", survivor)] {
            let _ = writeln!(
                self.output,
                "  {}: {} ({} bytes, mtime {}, dev {})",
                label,
                record.path.display(),
                record.size,
                record.mtime,
                record.dev
            );
        }
    }
}
