//! Persisted identifier of the logged-in student.
//!
//! The slot holds at most one student id so the app can resume the session
//! on the next start without asking for the credential again.

use dirs_next as dirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct SlotFile {
    student_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SessionSlot {
    path: PathBuf,
}

impl SessionSlot {
    const FILE: &'static str = "student_workout_session.json";

    pub fn at<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Slot file inside the user's config directory.
    pub fn default_location() -> Option<Self> {
        dirs::config_dir().map(|p| Self::at(p.join(Self::FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The stored student id, if any. An unreadable slot counts as empty.
    pub fn load(&self) -> Option<String> {
        let data = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str::<SlotFile>(&data) {
            Ok(slot) => slot.student_id.filter(|id| !id.trim().is_empty()),
            Err(e) => {
                log::warn!("Ignoring corrupt session slot {}: {e}", self.path.display());
                None
            }
        }
    }

    pub fn store(&self, student_id: &str) {
        if let Some(parent) = self.path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let slot = SlotFile {
            student_id: Some(student_id.to_string()),
        };
        match serde_json::to_string_pretty(&slot) {
            Ok(data) => {
                if let Err(e) = std::fs::write(&self.path, data) {
                    log::error!("Failed to persist session: {e}");
                }
            }
            Err(e) => log::error!("Failed to serialize session: {e}"),
        }
    }

    pub fn clear(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::error!("Failed to clear session slot: {e}"),
        }
    }
}
