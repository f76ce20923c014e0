// ABOUTME: Transient artifact manager owning the chat log directory and file lifecycle
// ABOUTME: Creates files atomically, schedules cancellable deletions, purges on shutdown

use crate::{
    artifact::{render_content, write_atomic, ArtifactHandle, ArtifactState, IncomingMessage},
    clock::{Clock, SystemClock},
    error::ArtifactError,
    policy::{ConversionPolicy, Decision},
};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Result of a single deletion attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionOutcome {
    /// File was removed by this attempt
    Deleted,
    /// File was already gone; treated as success
    AlreadyGone,
    /// Timer was cancelled before it fired
    Cancelled,
    /// Removal failed; logged and swallowed
    Failed,
}

impl DeletionOutcome {
    /// True when no file is left behind
    pub fn is_gone(self) -> bool {
        matches!(self, DeletionOutcome::Deleted | DeletionOutcome::AlreadyGone)
    }
}

/// Summary of a purge pass over the managed directory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub removed: usize,
    pub failed: usize,
    /// Subdirectories and other entries that are not plain files
    pub skipped: usize,
}

#[derive(Debug)]
struct PendingDeletion {
    id: u64,
    token: CancellationToken,
}

#[derive(Debug)]
struct Tracked {
    state: ArtifactState,
    pending: Option<PendingDeletion>,
}

type Registry = Arc<Mutex<HashMap<PathBuf, Tracked>>>;

fn lock(registry: &Registry) -> MutexGuard<'_, HashMap<PathBuf, Tracked>> {
    // The map stays consistent even if a holder panicked mid-update
    registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Handle to a scheduled deletion.
///
/// Dropping it leaves the timer running; call [`DeletionTask::cancel`] to
/// stop it without deleting the file.
#[derive(Debug)]
pub struct DeletionTask {
    path: PathBuf,
    token: CancellationToken,
    join: JoinHandle<DeletionOutcome>,
}

impl DeletionTask {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stop the timer. The file is left in place.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the timer to fire (or be cancelled) and report what happened
    pub async fn join(self) -> DeletionOutcome {
        match self.join.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Deletion task aborted");
                DeletionOutcome::Failed
            }
        }
    }
}

/// Owns one managed directory of chat log files.
///
/// Each instance is independent: the directory and policy are injected at
/// construction, so tests can run several side by side.
pub struct ArtifactManager {
    dir: PathBuf,
    policy: ConversionPolicy,
    clock: Arc<dyn Clock>,
    purge_on_shutdown: bool,
    registry: Registry,
    next_task_id: AtomicU64,
}

impl std::fmt::Debug for ArtifactManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactManager")
            .field("dir", &self.dir)
            .field("policy", &self.policy)
            .field("purge_on_shutdown", &self.purge_on_shutdown)
            .field("tracked", &lock(&self.registry).len())
            .finish()
    }
}

impl ArtifactManager {
    /// Validate the policy and create the managed directory if needed
    pub fn new(dir: impl AsRef<Path>, policy: ConversionPolicy) -> Result<Self, ArtifactError> {
        policy.validate()?;

        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|e| ArtifactError::io(dir, e))?;
        let dir = std::fs::canonicalize(dir).map_err(|e| ArtifactError::io(dir, e))?;

        tracing::debug!(dir = %dir.display(), "Artifact directory ready");

        Ok(Self {
            dir,
            policy,
            clock: Arc::new(SystemClock),
            purge_on_shutdown: true,
            registry: Arc::new(Mutex::new(HashMap::new())),
            next_task_id: AtomicU64::new(1),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Whether [`ArtifactManager::shutdown`] also sweeps untracked files
    pub fn purge_on_shutdown(mut self, enabled: bool) -> Self {
        self.purge_on_shutdown = enabled;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn policy(&self) -> &ConversionPolicy {
        &self.policy
    }

    pub fn evaluate(&self, text: &str) -> Decision {
        self.policy.evaluate(text)
    }

    pub fn should_convert(&self, text: &str) -> bool {
        self.policy.should_convert(text)
    }

    /// Write `text` with a header describing `message` to a new file.
    ///
    /// Does not consult the policy; callers decide with
    /// [`ArtifactManager::should_convert`] first. On error no file is left
    /// behind and nothing is tracked.
    pub fn create_artifact(
        &self,
        text: &str,
        message: &IncomingMessage,
    ) -> Result<ArtifactHandle, ArtifactError> {
        let created_at = self.clock.now();
        let content = render_content(&self.policy.banner, text, message, created_at);

        let path = write_atomic(
            &self.dir,
            &self.policy.filename_prefix,
            created_at,
            &content,
        )?;

        lock(&self.registry).insert(
            path.clone(),
            Tracked {
                state: ArtifactState::Created,
                pending: None,
            },
        );

        tracing::info!(
            path = %path.display(),
            sender = %message.sender_id,
            group = message.group_id.as_deref().unwrap_or("-"),
            chars = text.chars().count(),
            "Created chat log artifact"
        );

        Ok(ArtifactHandle { path, created_at })
    }

    /// Record that the host attached the artifact to a reply.
    /// Returns false if the artifact is not in the `Created` state.
    pub fn mark_served(&self, handle: &ArtifactHandle) -> bool {
        match lock(&self.registry).get_mut(&handle.path) {
            Some(tracked) if tracked.state == ArtifactState::Created => {
                tracked.state = ArtifactState::Served;
                true
            }
            _ => false,
        }
    }

    /// Current lifecycle state. Paths the manager does not track are `Deleted`.
    pub fn state(&self, handle: &ArtifactHandle) -> ArtifactState {
        lock(&self.registry)
            .get(&handle.path)
            .map(|t| t.state)
            .unwrap_or(ArtifactState::Deleted)
    }

    /// Number of deletion timers that have not fired or been cancelled yet
    pub fn pending_deletions(&self) -> usize {
        lock(&self.registry)
            .values()
            .filter(|t| t.pending.is_some())
            .count()
    }

    /// Stop tracking an artifact without deleting it.
    ///
    /// Used for files that are kept on purpose; a pending timer is
    /// cancelled. Returns false if the artifact was not tracked.
    pub fn release(&self, handle: &ArtifactHandle) -> bool {
        match lock(&self.registry).remove(&handle.path) {
            Some(tracked) => {
                if let Some(pending) = tracked.pending {
                    pending.token.cancel();
                }
                tracing::debug!(path = %handle.path.display(), "Released artifact");
                true
            }
            None => false,
        }
    }

    /// True if `path` names a file directly inside the managed directory
    fn owns_path(&self, path: &Path) -> bool {
        path.parent() == Some(self.dir.as_path())
            && path.file_name().is_some()
    }

    /// Delete the artifact after `retention` on a background task.
    ///
    /// Must be called from within a tokio runtime. Rescheduling a handle
    /// cancels its previous timer. Handles that are no longer tracked
    /// (deleted or released) are not rescheduled and report `AlreadyGone`.
    pub fn schedule_deletion(&self, handle: &ArtifactHandle, retention: Duration) -> DeletionTask {
        let id = self.next_task_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let path = handle.path.clone();

        let scheduled = {
            let mut registry = lock(&self.registry);
            match registry.get_mut(&path) {
                Some(tracked) => {
                    let previous = tracked.pending.replace(PendingDeletion {
                        id,
                        token: token.clone(),
                    });
                    if let Some(previous) = previous {
                        previous.token.cancel();
                    }
                    true
                }
                None => false,
            }
        };

        if !scheduled {
            tracing::debug!(path = %path.display(), "Artifact not tracked, nothing to schedule");
            let join = tokio::spawn(async { DeletionOutcome::AlreadyGone });
            return DeletionTask { path, token, join };
        }

        tracing::debug!(
            path = %path.display(),
            retention_secs = retention.as_secs(),
            "Scheduled artifact deletion"
        );

        let registry = Arc::clone(&self.registry);
        let task_path = path.clone();
        let task_token = token.clone();
        let join = tokio::spawn(async move {
            tokio::select! {
                _ = task_token.cancelled() => {
                    clear_pending(&registry, &task_path, id);
                    tracing::debug!(path = %task_path.display(), "Artifact deletion cancelled");
                    return DeletionOutcome::Cancelled;
                }
                _ = tokio::time::sleep(retention) => {}
            }

            let outcome = remove_artifact(&task_path);
            finish_deletion(&registry, &task_path, Some(id));
            outcome
        });

        DeletionTask { path, token, join }
    }

    /// Delete the artifact immediately, cancelling any pending timer.
    /// Safe to call repeatedly and on files that were removed externally.
    /// Paths outside the managed directory are refused with `Failed`.
    pub fn delete_now(&self, handle: &ArtifactHandle) -> DeletionOutcome {
        if !self.owns_path(&handle.path) {
            tracing::warn!(
                path = %handle.path.display(),
                dir = %self.dir.display(),
                "Refusing to delete file outside artifact directory"
            );
            return DeletionOutcome::Failed;
        }

        if let Some(tracked) = lock(&self.registry).get_mut(&handle.path) {
            if let Some(pending) = tracked.pending.take() {
                pending.token.cancel();
            }
        }

        let outcome = remove_artifact(&handle.path);
        finish_deletion(&self.registry, &handle.path, None);
        outcome
    }

    /// Delete every plain file in the managed directory.
    ///
    /// Best effort: failures on individual files are logged and counted.
    pub fn purge_all(&self) -> PurgeReport {
        self.purge_with(remove_artifact)
    }

    fn purge_with(&self, remove: impl Fn(&Path) -> DeletionOutcome) -> PurgeReport {
        let mut report = PurgeReport::default();

        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return report,
            Err(e) => {
                tracing::warn!(
                    dir = %self.dir.display(),
                    error = %e,
                    "Failed to list artifact directory"
                );
                return report;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if is_dir {
                tracing::debug!(path = %path.display(), "Skipping directory during purge");
                report.skipped += 1;
                continue;
            }

            if let Some(tracked) = lock(&self.registry).get_mut(&path) {
                if let Some(pending) = tracked.pending.take() {
                    pending.token.cancel();
                }
            }

            let outcome = remove(&path);
            finish_deletion(&self.registry, &path, None);
            match outcome {
                DeletionOutcome::Deleted => report.removed += 1,
                DeletionOutcome::Failed => report.failed += 1,
                DeletionOutcome::AlreadyGone | DeletionOutcome::Cancelled => {}
            }
        }

        tracing::info!(
            dir = %self.dir.display(),
            removed = report.removed,
            failed = report.failed,
            skipped = report.skipped,
            "Purged artifact directory"
        );

        report
    }

    /// Orderly teardown: cancel all timers and delete their files now.
    ///
    /// Tracked files without a timer are deleted too, and the directory is
    /// purged unless purging on shutdown was disabled. With `keep_files`
    /// set, only files that had a timer are removed and nothing is purged.
    pub fn shutdown(&self) -> PurgeReport {
        let drained: Vec<(PathBuf, Tracked)> = lock(&self.registry).drain().collect();
        let keep_files = self.policy.keep_files;
        let mut report = PurgeReport::default();

        tracing::info!(tracked = drained.len(), keep_files, "Shutting down artifact manager");

        for (path, tracked) in drained {
            match tracked.pending {
                Some(pending) => pending.token.cancel(),
                None if keep_files => continue,
                None => {}
            }
            match remove_artifact(&path) {
                DeletionOutcome::Deleted => report.removed += 1,
                DeletionOutcome::Failed => report.failed += 1,
                DeletionOutcome::AlreadyGone | DeletionOutcome::Cancelled => {}
            }
        }

        if self.purge_on_shutdown && !keep_files {
            let swept = self.purge_all();
            report.removed += swept.removed;
            report.failed += swept.failed;
            report.skipped += swept.skipped;
        }

        report
    }
}

/// Remove a file, treating "already gone" as success
fn remove_artifact(path: &Path) -> DeletionOutcome {
    match std::fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "Deleted artifact");
            DeletionOutcome::Deleted
        }
        Err(e) if e.kind() == ErrorKind::NotFound => DeletionOutcome::AlreadyGone,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to delete artifact");
            DeletionOutcome::Failed
        }
    }
}

fn clear_pending(registry: &Registry, path: &Path, id: u64) {
    if let Some(tracked) = lock(registry).get_mut(path) {
        if tracked.pending.as_ref().map(|p| p.id) == Some(id) {
            tracked.pending = None;
        }
    }
}

/// Forget an artifact after a deletion attempt, whatever its outcome.
///
/// A timer (`task_id = Some`) only touches the entry if it is still the
/// current timer for that path. Failures were already logged; a later purge
/// picks up anything left on disk.
fn finish_deletion(registry: &Registry, path: &Path, task_id: Option<u64>) {
    let mut registry = lock(registry);
    let owns_entry = match (task_id, registry.get(path)) {
        (_, None) => false,
        (None, Some(_)) => true,
        (Some(id), Some(tracked)) => tracked.pending.as_ref().map(|p| p.id) == Some(id),
    };
    if owns_entry {
        registry.remove(path);
    }
}
