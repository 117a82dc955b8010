// Trigger strategies
// Each strategy answers one question per tick: given the folder listing and
// the current time, should the report job run, and for which files?

use crate::config::{TriggerStrategyKind, WatcherConfig};
use crate::errors::PersistenceError;
use crate::models::FileDescriptor;
use crate::trigger::state::{SeenFileSet, SeenFileStore, TriggerPhase, TriggerState};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;

/// Why a tick did not run the report job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Cooldown { remaining: Duration },
    ListingFailed,
    NoFiles,
    NothingNew,
    NothingRecent,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Cooldown { remaining } => {
                write!(f, "cooldown ({}s remaining)", remaining.as_secs())
            }
            SkipReason::ListingFailed => write!(f, "folder listing failed"),
            SkipReason::NoFiles => write!(f, "no files in folder"),
            SkipReason::NothingNew => write!(f, "no new files"),
            SkipReason::NothingRecent => write!(f, "no recently touched files"),
        }
    }
}

/// Verdict of a strategy for one listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    Skip(SkipReason),
    Fire { files: Vec<String> },
}

/// Decision policy plugged into the trigger loop
///
/// `gate` runs before the folder is listed so a strategy can skip the
/// network call entirely. `record_detection` is called with the files from
/// `Fire` before the report job starts; `record_success` only after the job
/// finished successfully.
#[async_trait]
pub trait TriggerStrategy: Send {
    fn kind(&self) -> TriggerStrategyKind;

    fn gate(&self, _now: DateTime<Utc>) -> Option<SkipReason> {
        None
    }

    fn evaluate(&self, files: &[FileDescriptor], now: DateTime<Utc>) -> Detection;

    async fn record_detection(
        &mut self,
        _detected: &[String],
        _now: DateTime<Utc>,
    ) -> Result<(), PersistenceError> {
        Ok(())
    }

    async fn record_success(
        &mut self,
        _fired: &[String],
        _now: DateTime<Utc>,
    ) -> Result<(), PersistenceError> {
        Ok(())
    }

    fn phase(&self, _now: DateTime<Utc>) -> TriggerPhase {
        TriggerPhase::Idle
    }
}

fn all_names(files: &[FileDescriptor]) -> Vec<String> {
    files.iter().map(|f| f.name.clone()).collect()
}

/// Run whenever files are present, at most once per cooldown window
#[derive(Debug, Clone)]
pub struct CooldownStrategy {
    cooldown: Duration,
    state: TriggerState,
}

impl CooldownStrategy {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            state: TriggerState::new(),
        }
    }

    pub fn state(&self) -> &TriggerState {
        &self.state
    }
}

#[async_trait]
impl TriggerStrategy for CooldownStrategy {
    fn kind(&self) -> TriggerStrategyKind {
        TriggerStrategyKind::Cooldown
    }

    fn gate(&self, now: DateTime<Utc>) -> Option<SkipReason> {
        match self.state.phase(now, self.cooldown) {
            TriggerPhase::Cooldown { remaining } => Some(SkipReason::Cooldown { remaining }),
            TriggerPhase::Idle => None,
        }
    }

    fn evaluate(&self, files: &[FileDescriptor], _now: DateTime<Utc>) -> Detection {
        if files.is_empty() {
            Detection::Skip(SkipReason::NoFiles)
        } else {
            Detection::Fire {
                files: all_names(files),
            }
        }
    }

    async fn record_success(
        &mut self,
        _fired: &[String],
        now: DateTime<Utc>,
    ) -> Result<(), PersistenceError> {
        self.state.record_success(now);
        Ok(())
    }

    fn phase(&self, now: DateTime<Utc>) -> TriggerPhase {
        self.state.phase(now, self.cooldown)
    }
}

/// Run when a file name shows up that has never been processed
#[derive(Debug)]
pub struct NameDiffStrategy {
    seen: SeenFileSet,
    persistence: Option<SeenFileStore>,
}

impl NameDiffStrategy {
    /// In-memory only; the set is lost on restart
    pub fn new(seen: SeenFileSet) -> Self {
        Self {
            seen,
            persistence: None,
        }
    }

    /// Load the set from `store` and write it back whenever new names are detected
    pub async fn persistent(store: SeenFileStore) -> Self {
        Self {
            seen: store.load_or_empty().await,
            persistence: Some(store),
        }
    }

    pub fn seen(&self) -> &SeenFileSet {
        &self.seen
    }
}

#[async_trait]
impl TriggerStrategy for NameDiffStrategy {
    fn kind(&self) -> TriggerStrategyKind {
        TriggerStrategyKind::NameDiff
    }

    fn evaluate(&self, files: &[FileDescriptor], _now: DateTime<Utc>) -> Detection {
        if files.is_empty() {
            return Detection::Skip(SkipReason::NoFiles);
        }
        let unseen = self.seen.unseen(files.iter().map(|f| f.name.as_str()));
        if unseen.is_empty() {
            Detection::Skip(SkipReason::NothingNew)
        } else {
            Detection::Fire { files: unseen }
        }
    }

    // Names are committed before the job runs, whatever its outcome
    async fn record_detection(
        &mut self,
        detected: &[String],
        _now: DateTime<Utc>,
    ) -> Result<(), PersistenceError> {
        self.seen.extend(detected.iter().cloned());
        match &self.persistence {
            Some(store) => store.save(&self.seen).await,
            None => Ok(()),
        }
    }
}

/// Run when some file was created or modified within the threshold
#[derive(Debug, Clone)]
pub struct RecencyStrategy {
    threshold: chrono::Duration,
}

impl RecencyStrategy {
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold: chrono::Duration::from_std(threshold).unwrap_or(chrono::Duration::MAX),
        }
    }
}

#[async_trait]
impl TriggerStrategy for RecencyStrategy {
    fn kind(&self) -> TriggerStrategyKind {
        TriggerStrategyKind::Recency
    }

    fn evaluate(&self, files: &[FileDescriptor], now: DateTime<Utc>) -> Detection {
        if files.is_empty() {
            return Detection::Skip(SkipReason::NoFiles);
        }
        let cutoff = now
            .checked_sub_signed(self.threshold)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let recent: Vec<String> = files
            .iter()
            .filter(|f| f.touched_since(cutoff))
            .map(|f| f.name.clone())
            .collect();

        if recent.is_empty() {
            Detection::Skip(SkipReason::NothingRecent)
        } else {
            Detection::Fire { files: recent }
        }
    }
}

/// Strategy selected by `watcher.strategy`
///
/// Run-once mode always uses a plain any-files check.
pub async fn build_strategy(config: &WatcherConfig) -> Box<dyn TriggerStrategy> {
    if config.run_once {
        return Box::new(CooldownStrategy::new(Duration::ZERO));
    }
    match config.strategy {
        TriggerStrategyKind::Cooldown => Box::new(CooldownStrategy::new(Duration::from_secs(
            config.cooldown_seconds,
        ))),
        TriggerStrategyKind::NameDiff => Box::new(
            NameDiffStrategy::persistent(SeenFileStore::new(&config.seen_file_list)).await,
        ),
        TriggerStrategyKind::Recency => Box::new(RecencyStrategy::new(Duration::from_secs(
            config.file_age_threshold_minutes.saturating_mul(60),
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, created_at: DateTime<Utc>, modified_at: DateTime<Utc>) -> FileDescriptor {
        FileDescriptor {
            name: name.to_string(),
            path: format!("/dump/{}", name),
            created_at,
            modified_at,
            size: 10,
        }
    }

    fn files(names: &[&str]) -> Vec<FileDescriptor> {
        let t = Utc::now() - chrono::Duration::days(1);
        names.iter().map(|n| file(n, t, t)).collect()
    }

    #[tokio::test]
    async fn test_cooldown_fires_on_any_file_then_waits() {
        let t0 = Utc::now();
        let mut strategy = CooldownStrategy::new(Duration::from_secs(300));

        assert_eq!(strategy.gate(t0), None);
        assert_eq!(
            strategy.evaluate(&files(&["a.xlsx"]), t0),
            Detection::Fire {
                files: vec!["a.xlsx".to_string()]
            }
        );

        strategy.record_detection(&[], t0).await.unwrap();
        assert_eq!(strategy.state().last_execution(), None);
        strategy.record_success(&[], t0).await.unwrap();
        assert_eq!(strategy.state().last_execution(), Some(t0));
        assert_eq!(
            strategy.gate(t0 + chrono::Duration::seconds(30)),
            Some(SkipReason::Cooldown {
                remaining: Duration::from_secs(270)
            })
        );
        assert_eq!(strategy.gate(t0 + chrono::Duration::seconds(300)), None);
    }

    #[test]
    fn test_cooldown_empty_folder_skips() {
        let strategy = CooldownStrategy::new(Duration::from_secs(300));
        assert_eq!(
            strategy.evaluate(&[], Utc::now()),
            Detection::Skip(SkipReason::NoFiles)
        );
    }

    #[tokio::test]
    async fn test_name_diff_fires_only_for_unseen_names() {
        let now = Utc::now();
        let mut strategy = NameDiffStrategy::new(SeenFileSet::from_text("a.xlsx\n"));

        assert_eq!(
            strategy.evaluate(&files(&["a.xlsx"]), now),
            Detection::Skip(SkipReason::NothingNew)
        );

        let detection = strategy.evaluate(&files(&["a.xlsx", "b.xlsx"]), now);
        assert_eq!(
            detection,
            Detection::Fire {
                files: vec!["b.xlsx".to_string()]
            }
        );

        assert!(!strategy.seen().contains("b.xlsx"));
        strategy
            .record_detection(&["b.xlsx".to_string()], now)
            .await
            .unwrap();
        assert!(strategy.seen().contains("b.xlsx"));
        assert_eq!(
            strategy.evaluate(&files(&["a.xlsx", "b.xlsx"]), now),
            Detection::Skip(SkipReason::NothingNew)
        );
    }

    #[tokio::test]
    async fn test_name_diff_persists_on_detection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saved_file_list.txt");
        std::fs::write(&path, "a.xlsx\n").unwrap();

        let mut strategy = NameDiffStrategy::persistent(SeenFileStore::new(&path)).await;
        assert!(strategy.seen().contains("a.xlsx"));

        strategy
            .record_detection(&["c.xlsx".to_string()], Utc::now())
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a.xlsx\nc.xlsx\n");

        let reloaded = NameDiffStrategy::persistent(SeenFileStore::new(&path)).await;
        assert_eq!(reloaded.seen().len(), 2);
    }

    #[test]
    fn test_recency_is_strict_on_both_timestamps() {
        let now = Utc::now();
        let threshold = Duration::from_secs(5 * 60);
        let strategy = RecencyStrategy::new(threshold);
        let cutoff = now - chrono::Duration::minutes(5);
        let old = now - chrono::Duration::hours(2);

        assert_eq!(
            strategy.evaluate(&[file("edge.xlsx", cutoff, cutoff)], now),
            Detection::Skip(SkipReason::NothingRecent)
        );

        let listing = vec![
            file("old.xlsx", old, old),
            file("edited.xlsx", old, now - chrono::Duration::minutes(1)),
            file("fresh.xlsx", now - chrono::Duration::seconds(10), old),
        ];
        assert_eq!(
            strategy.evaluate(&listing, now),
            Detection::Fire {
                files: vec!["edited.xlsx".to_string(), "fresh.xlsx".to_string()]
            }
        );
    }

    #[tokio::test]
    async fn test_build_strategy_follows_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = crate::config::Settings::default().watcher;
        assert_eq!(build_strategy(&config).await.kind(), TriggerStrategyKind::Cooldown);

        config.strategy = TriggerStrategyKind::NameDiff;
        config.seen_file_list = dir
            .path()
            .join("saved_file_list.txt")
            .display()
            .to_string();
        assert_eq!(build_strategy(&config).await.kind(), TriggerStrategyKind::NameDiff);

        config.strategy = TriggerStrategyKind::Recency;
        assert_eq!(build_strategy(&config).await.kind(), TriggerStrategyKind::Recency);

        config.run_once = true;
        assert_eq!(build_strategy(&config).await.kind(), TriggerStrategyKind::Cooldown);
    }

    #[tokio::test]
    async fn test_huge_recency_threshold_does_not_overflow() {
        let mut config = crate::config::Settings::default().watcher;
        config.strategy = TriggerStrategyKind::Recency;
        config.file_age_threshold_minutes = u64::MAX / 2;

        let strategy = build_strategy(&config).await;
        assert_eq!(strategy.kind(), TriggerStrategyKind::Recency);

        let old = Utc::now() - chrono::Duration::days(3650);
        assert!(matches!(
            strategy.evaluate(&[file("ancient.xlsx", old, old)], Utc::now()),
            Detection::Fire { .. }
        ));
    }

    #[test]
    fn test_skip_reason_display() {
        let reason = SkipReason::Cooldown {
            remaining: Duration::from_secs(42),
        };
        assert_eq!(reason.to_string(), "cooldown (42s remaining)");
    }
}
