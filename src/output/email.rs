//! Email hand-off for run summaries.
//!
//! Delivery is a collaborator, not core: the run formats a plain-text
//! summary and hands it to a [`Mailer`]. The default implementation shells
//! out to `sendmail` (or `mail`) found on `PATH`; neither being present is
//! a missing-dependency condition the caller maps to exit code 2.

use std::io::Write;
use std::process::{Command, Stdio};

use thiserror::Error;

use super::RunSummary;

/// Errors from email delivery.
#[derive(Debug, Error)]
pub enum MailError {
    /// No usable mailer binary on PATH.
    #[error("no mailer found on PATH (looked for sendmail, mail)")]
    MissingMailer,

    /// The mailer ran but failed.
    #[error("mailer failed: {0}")]
    Delivery(String),

    /// I/O talking to the mailer.
    #[error("mailer I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Delivery interface.
pub trait Mailer {
    /// Send `body` to `recipient` with the given subject.
    ///
    /// # Errors
    ///
    /// [`MailError`] variants.
    fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), MailError>;
}

/// Mailer backed by the system `sendmail` (preferred) or `mail`.
#[derive(Debug, Default)]
pub struct SendmailMailer;

impl SendmailMailer {
    fn locate() -> Option<(&'static str, bool)> {
        // (binary, is_sendmail): sendmail takes headers on stdin, mail
        // takes the subject as an argument.
        for (bin, is_sendmail) in [("sendmail", true), ("mail", false)] {
            let found = Command::new("which")
                .arg(bin)
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .map(|s| s.success())
                .unwrap_or(false);
            if found {
                return Some((bin, is_sendmail));
            }
        }
        None
    }
}

impl Mailer for SendmailMailer {
    fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), MailError> {
        let (bin, is_sendmail) = Self::locate().ok_or(MailError::MissingMailer)?;

        let mut command = Command::new(bin);
        if is_sendmail {
            command.arg(recipient);
        } else {
            command.args(["-s", subject, recipient]);
        }
        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            if is_sendmail {
                writeln!(stdin, "To: {recipient}")?;
                writeln!(stdin, "Subject: {subject}")?;
                writeln!(stdin)?;
            }
            stdin.write_all(body.as_bytes())?;
        }

        let status = child.wait()?;
        if status.success() {
            Ok(())
        } else {
            Err(MailError::Delivery(format!("{bin} exited with {status}")))
        }
    }
}

/// Format the plain-text summary body.
#[must_use]
pub fn summary_body(summary: &RunSummary) -> String {
    let mut body = String::new();
    body.push_str("Duplicate scan summary\n");
    body.push_str("======================\n\n");
    for root in &summary.roots {
        body.push_str(&format!("root: {}\n", root.display()));
    }
    body.push_str(&format!(
        "\nfiles discovered:   {}\nfiles fingerprinted: {}\nduplicate groups:   {}\n\
         bytes wasted:       {}\nactions attempted:  {}\nactions succeeded:  {}\n\
         bytes reclaimed:    {}\n",
        summary.files_discovered,
        summary.files_fingerprinted,
        summary.groups_found,
        summary.bytes_wasted,
        summary.actions_attempted,
        summary.actions_succeeded,
        summary.bytes_reclaimed,
    ));
    if summary.interrupted {
        body.push_str("\nNOTE: the run was interrupted before completion.\n");
    }
    body
}
