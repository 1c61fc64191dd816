//! Resume point persistence.

use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest as _, Sha256};
use thiserror::Error;

use super::data::{ResumeMeta, ResumePoint, RESUME_VERSION};

const META_FILE: &str = "resume.meta";
const GROUPS_FILE: &str = "resume.groups";
const CHECKSUM_FILE: &str = "resume.sha256";

/// Errors loading or saving resume points.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No resume point exists in the directory.
    #[error("no resume point found in {0}")]
    NotFound(PathBuf),

    /// The checksum file does not match the groups file.
    #[error("resume files are corrupt (checksum mismatch) in {0}")]
    Corrupt(PathBuf),

    /// The resume files were written by an incompatible version.
    #[error("unsupported resume format version {0}")]
    Version(u32),

    /// The resume files belong to a different run (other roots or
    /// another digest algorithm).
    #[error("resume files do not match this run: {0}")]
    Mismatch(String),

    /// Serialization failure.
    #[error("resume serialization error: {0}")]
    Encoding(String),

    /// I/O failure.
    #[error("resume I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ResumePoint {
    /// Persist the resume point into `dir` (three files, 0600).
    ///
    /// # Errors
    ///
    /// [`SessionError`] on serialization or I/O failure.
    pub fn save(&self, dir: &Path) -> Result<(), SessionError> {
        fs::create_dir_all(dir)?;

        let groups_bytes = bincode::serialize(&self.groups)
            .map_err(|e| SessionError::Encoding(e.to_string()))?;
        let checksum = hex_sha256(&groups_bytes);

        let meta = format!(
            "version={}\nsaved_at={}\nalgorithm={}\nroots={}\n",
            self.meta.version,
            self.meta.saved_at,
            self.meta.algorithm,
            self.meta
                .roots
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join(":"),
        );

        write_private(&dir.join(META_FILE), meta.as_bytes())?;
        write_private(&dir.join(GROUPS_FILE), &groups_bytes)?;
        write_private(&dir.join(CHECKSUM_FILE), checksum.as_bytes())?;

        log::info!("resume point saved to {}", dir.display());
        Ok(())
    }

    /// Load a resume point from `dir`, verifying the checksum first.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotFound`] when the files are absent,
    /// [`SessionError::Corrupt`] on checksum mismatch.
    pub fn load(dir: &Path) -> Result<Self, SessionError> {
        let meta_path = dir.join(META_FILE);
        let groups_path = dir.join(GROUPS_FILE);
        let checksum_path = dir.join(CHECKSUM_FILE);
        if !meta_path.exists() || !groups_path.exists() || !checksum_path.exists() {
            return Err(SessionError::NotFound(dir.to_path_buf()));
        }

        let groups_bytes = fs::read(&groups_path)?;
        let stored = fs::read_to_string(&checksum_path)?;
        if stored.trim() != hex_sha256(&groups_bytes) {
            return Err(SessionError::Corrupt(dir.to_path_buf()));
        }

        let meta = parse_meta(&fs::read_to_string(&meta_path)?)?;
        if meta.version != RESUME_VERSION {
            return Err(SessionError::Version(meta.version));
        }

        let groups = bincode::deserialize(&groups_bytes)
            .map_err(|e| SessionError::Encoding(e.to_string()))?;

        Ok(Self { meta, groups })
    }

    /// Remove the resume files from `dir`. Missing files are fine.
    pub fn clear(dir: &Path) {
        for name in [META_FILE, GROUPS_FILE, CHECKSUM_FILE] {
            let path = dir.join(name);
            if path.exists() {
                if let Err(e) = fs::remove_file(&path) {
                    log::warn!("could not remove {}: {}", path.display(), e);
                }
            }
        }
    }

    /// Whether a resume point exists in `dir`.
    #[must_use]
    pub fn exists(dir: &Path) -> bool {
        dir.join(META_FILE).exists() && dir.join(GROUPS_FILE).exists()
    }
}

fn parse_meta(content: &str) -> Result<ResumeMeta, SessionError> {
    let mut version = None;
    let mut saved_at = 0i64;
    let mut algorithm = String::new();
    let mut roots = Vec::new();

    for line in content.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        match key {
            "version" => version = value.parse().ok(),
            "saved_at" => saved_at = value.parse().unwrap_or(0),
            "algorithm" => algorithm = value.to_string(),
            "roots" => {
                roots = value
                    .split(':')
                    .filter(|s| !s.is_empty())
                    .map(PathBuf::from)
                    .collect();
            }
            _ => {}
        }
    }

    let version = version.ok_or(SessionError::Version(0))?;
    Ok(ResumeMeta {
        version,
        saved_at,
        algorithm,
        roots,
    })
}

fn hex_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    use std::fmt::Write as _;
    for b in digest {
        let _ = write!(out, "{b:02x}");
    }
    out
}

fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    fs::write(path, bytes)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}
