//! Live reload manager.
//!
//! Coordinates file watching, build actions and reload broadcasting. Each
//! watch registration gets its own `notify` watcher and its own task that
//! debounces events, runs the build action and broadcasts the result.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, Instant};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use super::ShellAction;
use super::debouncer::{EventDebouncer, FsEvent, FsEventKind};
use crate::error::ServerError;
use crate::watch::WatchRegistration;

/// Event sent to connected WebSocket clients when files change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub(crate) enum ReloadEvent {
    /// Reload the whole page.
    Reload { paths: Vec<String> },
    /// Only stylesheets changed; refresh them in place.
    Css { paths: Vec<String> },
}

impl ReloadEvent {
    /// Build the event announcing a debounced batch.
    ///
    /// Only paths served under `root` are listed.
    pub(crate) fn from_batch(events: &[FsEvent], root: &Path) -> Self {
        let paths = events
            .iter()
            .filter_map(|e| url_path(&e.path, root))
            .collect();

        let css_only = events.iter().all(|e| {
            e.kind != FsEventKind::Removed
                && e.path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("css"))
        });

        if css_only {
            Self::Css { paths }
        } else {
            Self::Reload { paths }
        }
    }

    /// A full reload with no path information.
    pub(crate) fn full_reload() -> Self {
        Self::Reload { paths: Vec::new() }
    }
}

/// Capacity of the channel between the notify callback and the watch task.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Time given to the watcher to report a build action's own writes.
const ACTION_SETTLE: Duration = Duration::from_millis(100);

/// Manages file watchers and broadcasting reload events.
pub(crate) struct LiveReloadManager {
    root: PathBuf,
    broadcaster: broadcast::Sender<ReloadEvent>,
    watchers: Vec<RecommendedWatcher>,
    tasks: Vec<JoinHandle<()>>,
}

impl LiveReloadManager {
    /// Create a new live reload manager.
    ///
    /// # Arguments
    ///
    /// * `root` - Served root, used to turn changed paths into URL paths
    /// * `broadcaster` - Broadcast channel sender for reload events
    #[must_use]
    pub(crate) fn new(root: PathBuf, broadcaster: broadcast::Sender<ReloadEvent>) -> Self {
        Self {
            root,
            broadcaster,
            watchers: Vec::new(),
            tasks: Vec::new(),
        }
    }

    /// Start watching a registration.
    ///
    /// The registration path must already be canonical. Spawns a background
    /// task that debounces events and broadcasts reload events to connected
    /// WebSocket clients.
    ///
    /// # Errors
    ///
    /// Returns an error if an ignore pattern is invalid or the file watcher
    /// cannot be created.
    pub(crate) fn start(&mut self, registration: &WatchRegistration) -> Result<(), ServerError> {
        let ignore = registration
            .ignore
            .iter()
            .map(|p| {
                glob::Pattern::new(p).map_err(|source| ServerError::Pattern {
                    pattern: p.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let (tx, rx) = mpsc::channel::<Event>(EVENT_CHANNEL_CAPACITY);
        let watch_error = |source: notify::Error| ServerError::Watch {
            path: registration.path.clone(),
            source,
        };

        // Create watcher with callback that sends events to channel
        let mut watcher =
            notify::recommended_watcher(move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    // Use blocking_send since callback is sync
                    let _ = tx.blocking_send(event);
                }
                Err(e) => tracing::warn!(error = %e, "File watcher error"),
            })
            .map_err(watch_error)?;

        watcher
            .watch(&registration.path, RecursiveMode::Recursive)
            .map_err(watch_error)?;
        self.watchers.push(watcher);

        let task = WatchTask {
            watch_path: registration.path.clone(),
            ignore,
            action: registration.action.clone(),
            root: self.root.clone(),
            broadcaster: self.broadcaster.clone(),
            debouncer: EventDebouncer::new(registration.delay),
        };
        self.tasks.push(tokio::spawn(task.run(rx)));

        tracing::info!(
            path = %registration.path.display(),
            delay = ?registration.delay,
            action = registration.action.as_ref().map(ShellAction::command),
            "Watching for changes"
        );

        Ok(())
    }

    /// Get a receiver for reload events.
    #[must_use]
    pub(crate) fn subscribe(&self) -> broadcast::Receiver<ReloadEvent> {
        self.broadcaster.subscribe()
    }
}

impl Drop for LiveReloadManager {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Per-registration background task.
struct WatchTask {
    watch_path: PathBuf,
    ignore: Vec<glob::Pattern>,
    action: Option<ShellAction>,
    root: PathBuf,
    broadcaster: broadcast::Sender<ReloadEvent>,
    debouncer: EventDebouncer,
}

impl WatchTask {
    async fn run(mut self, mut rx: mpsc::Receiver<Event>) {
        loop {
            let deadline = self.debouncer.next_deadline();

            tokio::select! {
                event = rx.recv() => {
                    let Some(event) = event else { break };
                    self.record_event(&event);
                }
                () = sleep_until(deadline) => {
                    if let Some(batch) = self.debouncer.drain_ready() {
                        self.handle_batch(&batch, &mut rx).await;
                    }
                }
            }
        }
    }

    /// Record a raw filesystem event into the debouncer.
    fn record_event(&mut self, event: &Event) {
        let Some(kind) = fs_event_kind(event.kind) else {
            return;
        };

        for path in &event.paths {
            if is_ignored(path, &self.watch_path, &self.ignore) {
                continue;
            }

            self.debouncer.record(path.clone(), kind);
            tracing::debug!(path = %path.display(), ?kind, "Recorded filesystem event");
        }
    }

    /// Run the build action for a batch and notify browsers.
    async fn handle_batch(&mut self, batch: &[FsEvent], rx: &mut mpsc::Receiver<Event>) {
        let start = Instant::now();

        if let Some(action) = self.action.clone() {
            let sources = snapshot(batch).await;

            tracing::info!(command = action.command(), "Running build action");
            let result = action.run().await;

            tokio::time::sleep(ACTION_SETTLE).await;
            self.requeue_source_edits(rx, &sources).await;

            if let Err(e) = result {
                tracing::error!(
                    command = action.command(),
                    error = %e,
                    "Build action failed, skipping reload"
                );
                return;
            }
        }

        let event = ReloadEvent::from_batch(batch, &self.root);
        let clients = self.broadcaster.send(event.clone()).unwrap_or(0);

        tracing::info!(
            ?event,
            clients,
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Live reload event processed"
        );
    }

    /// Drain events that arrived while the build action ran.
    ///
    /// A path from the triggering batch whose content differs from
    /// `sources` was saved again and goes into the next batch. Every other
    /// event is the action's own output and is dropped.
    async fn requeue_source_edits(
        &mut self,
        rx: &mut mpsc::Receiver<Event>,
        sources: &Snapshot,
    ) {
        while let Ok(event) = rx.try_recv() {
            let Some(kind) = fs_event_kind(event.kind) else {
                continue;
            };

            for path in &event.paths {
                if is_ignored(path, &self.watch_path, &self.ignore) {
                    continue;
                }
                let Some(before) = sources.get(path) else {
                    tracing::debug!(path = %path.display(), "Dropped build output event");
                    continue;
                };
                if tokio::fs::read(path).await.ok() == *before {
                    continue;
                }

                self.debouncer.record(path.clone(), kind);
                tracing::debug!(
                    path = %path.display(),
                    ?kind,
                    "Source changed during build, requeued"
                );
            }
        }
    }
}

/// File contents keyed by path, `None` when unreadable.
type Snapshot = HashMap<PathBuf, Option<Vec<u8>>>;

/// Read the current contents of every path in a batch.
async fn snapshot(batch: &[FsEvent]) -> Snapshot {
    let mut contents = HashMap::with_capacity(batch.len());
    for event in batch {
        let content = tokio::fs::read(&event.path).await.ok();
        contents.insert(event.path.clone(), content);
    }
    contents
}

fn fs_event_kind(kind: EventKind) -> Option<FsEventKind> {
    match kind {
        EventKind::Create(_) => Some(FsEventKind::Created),
        EventKind::Modify(_) => Some(FsEventKind::Modified),
        EventKind::Remove(_) => Some(FsEventKind::Removed),
        _ => None,
    }
}

/// Sleep until `deadline`, or forever when there is none.
async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
        None => std::future::pending().await,
    }
}

/// Check if a path matches any ignore pattern, relative to the watched path.
fn is_ignored(path: &Path, watch_path: &Path, patterns: &[glob::Pattern]) -> bool {
    let Ok(relative) = path.strip_prefix(watch_path) else {
        return false;
    };
    if relative.as_os_str().is_empty() {
        return false;
    }

    let relative_str = relative.to_string_lossy();
    patterns.iter().any(|p| p.matches(&relative_str))
}

/// Convert a filesystem path to the URL path it is served under.
///
/// Returns `None` for paths outside the root.
fn url_path(path: &Path, root: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;

    let segments: Vec<_> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy()),
            _ => None,
        })
        .collect();

    Some(format!("/{}", segments.join("/")))
}
