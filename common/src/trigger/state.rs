// Trigger state owned by the loop: last successful run and the seen-file set

use crate::errors::PersistenceError;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{debug, warn};

/// Where the loop stands relative to its cooldown window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerPhase {
    Idle,
    Cooldown { remaining: Duration },
}

/// Time of the last successful report run (`None` = never)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TriggerState {
    last_execution: Option<DateTime<Utc>>,
}

impl TriggerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_execution(&self) -> Option<DateTime<Utc>> {
        self.last_execution
    }

    /// Phase at `now`; the window is over once `cooldown` has fully elapsed
    pub fn phase(&self, now: DateTime<Utc>, cooldown: Duration) -> TriggerPhase {
        let Some(last) = self.last_execution else {
            return TriggerPhase::Idle;
        };

        let cooldown = chrono::Duration::from_std(cooldown).unwrap_or(chrono::Duration::MAX);
        let elapsed = now - last;
        if elapsed >= cooldown {
            TriggerPhase::Idle
        } else {
            let remaining = cooldown
                .checked_sub(&elapsed)
                .unwrap_or(cooldown)
                .min(cooldown);
            TriggerPhase::Cooldown {
                remaining: remaining.to_std().unwrap_or_default(),
            }
        }
    }

    pub fn record_success(&mut self, at: DateTime<Utc>) {
        self.last_execution = Some(at);
    }
}

/// Names of files already handed to the report job
///
/// Union-only: names are never removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeenFileSet {
    names: BTreeSet<String>,
}

impl SeenFileSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the on-disk format: one name per line
    pub fn from_text(text: &str) -> Self {
        Self {
            names: text
                .lines()
                .map(|line| line.trim_end_matches('\r'))
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    pub fn to_text(&self) -> String {
        let mut text = self
            .names
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n");
        if !text.is_empty() {
            text.push('\n');
        }
        text
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Names in `current` that are not in the set, sorted and deduplicated
    pub fn unseen<'a, I>(&self, current: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        current
            .into_iter()
            .filter(|name| !self.names.contains(*name))
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Fold names into the set; returns how many were new
    pub fn extend<I, S>(&mut self, names: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let before = self.names.len();
        self.names.extend(names.into_iter().map(Into::into));
        self.names.len() - before
    }
}

/// Flat-file persistence for [`SeenFileSet`]
#[derive(Debug, Clone)]
pub struct SeenFileStore {
    path: PathBuf,
}

impl SeenFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the set; a missing file is an empty set
    pub async fn load(&self) -> Result<SeenFileSet, PersistenceError> {
        match fs::read_to_string(&self.path).await {
            Ok(text) => Ok(SeenFileSet::from_text(&text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SeenFileSet::new()),
            Err(e) => Err(PersistenceError::ReadFailed {
                path: self.path.display().to_string(),
                reason: e.to_string(),
            }),
        }
    }

    /// Read the set, falling back to empty when the file is unreadable
    pub async fn load_or_empty(&self) -> SeenFileSet {
        match self.load().await {
            Ok(set) => {
                debug!(path = %self.path.display(), names = set.len(), "Loaded seen-file list");
                set
            }
            Err(e) => {
                warn!(
                    error = %e,
                    "Seen-file list unreadable, starting empty (present files will trigger once)"
                );
                SeenFileSet::new()
            }
        }
    }

    /// Rewrite the whole file (temp file + rename)
    pub async fn save(&self, set: &SeenFileSet) -> Result<(), PersistenceError> {
        let write_err = |e: std::io::Error| PersistenceError::WriteFailed {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(write_err)?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, set.to_text()).await.map_err(write_err)?;
        fs::rename(&tmp, &self.path).await.map_err(write_err)?;
        Ok(())
    }
}
