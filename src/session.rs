// src/session.rs

//! Per-run output isolation and the stable `latest` pointer.
//!
//! Layout under the base directory:
//!
//! ```text
//! output/
//!   latest -> session_20260101_120000_1a2b3c4d
//!   usage_log.jsonl
//!   session_20260101_120000_1a2b3c4d/
//!     execution_log.jsonl
//!     <task-label>/...
//! ```

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::{OrchestratorError, Result};

/// Name of the pointer to the newest session, inside the base directory.
pub const LATEST_LINK_NAME: &str = "latest";

/// Fresh ids tried before giving up on a colliding session directory.
const MAX_ID_ATTEMPTS: usize = 8;

/// One isolated run and its output location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    id: String,
    output_root: PathBuf,
    created_at: DateTime<Utc>,
}

impl Session {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Directory exclusively owned by this run.
    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Allocates session directories below a base directory.
#[derive(Debug, Clone)]
pub struct SessionManager {
    base_dir: PathBuf,
}

impl SessionManager {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Path of the `latest` pointer.
    pub fn latest_path(&self) -> PathBuf {
        self.base_dir.join(LATEST_LINK_NAME)
    }

    /// Create a new, never-used session directory.
    ///
    /// The session directory itself is created non-recursively, so two runs
    /// can never end up sharing one: a collision just draws a new id.
    pub fn create_session(&self) -> Result<Session> {
        fs::create_dir_all(&self.base_dir).map_err(|e| {
            OrchestratorError::infrastructure(
                format!("creating output directory {}", self.base_dir.display()),
                e,
            )
        })?;

        for _ in 0..MAX_ID_ATTEMPTS {
            let created_at = Utc::now();
            let id = session_id(created_at);
            let output_root = self.base_dir.join(&id);

            match fs::create_dir(&output_root) {
                Ok(()) => {
                    info!(session = %id, path = %output_root.display(), "session directory created");
                    return Ok(Session {
                        id,
                        output_root,
                        created_at,
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    debug!(session = %id, "session id collision; drawing a new one");
                }
                Err(e) => {
                    return Err(OrchestratorError::infrastructure(
                        format!("creating session directory {}", output_root.display()),
                        e,
                    ));
                }
            }
        }

        Err(OrchestratorError::Infrastructure(format!(
            "could not allocate a unique session directory under {}",
            self.base_dir.display()
        )))
    }

    /// Point `latest` at `session`, atomically replacing any previous pointer.
    ///
    /// A temporary pointer is created next to the final one and renamed over
    /// it, so readers only ever observe the old or the new target.
    pub fn mark_latest(&self, session: &Session) -> Result<()> {
        let latest = self.latest_path();
        let staging = self
            .base_dir
            .join(format!(".{LATEST_LINK_NAME}-{}", Uuid::new_v4().simple()));

        write_pointer(&staging, session.id()).map_err(|e| {
            OrchestratorError::infrastructure(
                format!("creating pointer {}", staging.display()),
                e,
            )
        })?;

        if let Err(e) = fs::rename(&staging, &latest) {
            let _ = fs::remove_file(&staging);
            return Err(OrchestratorError::infrastructure(
                format!("replacing {}", latest.display()),
                e,
            ));
        }

        info!(session = %session.id(), latest = %latest.display(), "latest pointer updated");
        Ok(())
    }

    /// Session id the `latest` pointer currently refers to, if any.
    pub fn latest_session_id(&self) -> Option<String> {
        read_pointer(&self.latest_path())
    }
}

/// `session_<YYYYmmdd>_<HHMMSS>_<8 hex chars>`.
pub fn session_id(now: DateTime<Utc>) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("session_{}_{}", now.format("%Y%m%d_%H%M%S"), &random[..8])
}

#[cfg(unix)]
fn write_pointer(path: &Path, target: &str) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, path)
}

#[cfg(not(unix))]
fn write_pointer(path: &Path, target: &str) -> std::io::Result<()> {
    fs::write(path, target)
}

#[cfg(unix)]
fn read_pointer(path: &Path) -> Option<String> {
    let target = fs::read_link(path).ok()?;
    Some(target.to_string_lossy().into_owned())
}

#[cfg(not(unix))]
fn read_pointer(path: &Path) -> Option<String> {
    fs::read_to_string(path).ok().map(|s| s.trim().to_string())
}
