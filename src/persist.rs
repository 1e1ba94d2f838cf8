//! Cross-run session flag (`camera_should_run`).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize, Deserialize)]
struct SessionFile {
    camera_should_run: bool,
}

pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing or unreadable state means "don't auto-start".
    pub fn load(&self) -> bool {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return false,
            Err(e) => {
                log::warn!("failed to read session file {}: {}", self.path.display(), e);
                return false;
            }
        };
        match serde_json::from_str::<SessionFile>(&raw) {
            Ok(file) => file.camera_should_run,
            Err(e) => {
                log::warn!("ignoring corrupt session file {}: {}", self.path.display(), e);
                false
            }
        }
    }

    /// Whether to open the camera at startup. Without `resume` the camera
    /// always starts; with it, only if the last run left it streaming.
    pub fn should_start(&self, resume: bool) -> bool {
        !resume || self.load()
    }

    pub fn save(&self, camera_should_run: bool) -> Result<()> {
        let body = serde_json::to_vec(&SessionFile { camera_should_run })?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create session directory {}", parent.display()))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, body)
            .with_context(|| format!("write session file {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("move session file into {}", self.path.display()))?;
        Ok(())
    }
}
