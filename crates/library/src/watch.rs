use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use common::{is_hidden_name, is_info_name};
use metadata::MetadataCache;
use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

pub const DEFAULT_WATCH_DEPTH: usize = 3;
pub const DEFAULT_STABILITY: Duration = Duration::from_secs(2);

#[derive(Clone, Debug)]
pub struct WatchOptions {
    pub enabled: bool,
    /// Directories allowed between the root and a tracked sidecar.
    pub max_depth: usize,
    /// Quiet period before a changed file is considered fully written.
    pub stability: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            max_depth: DEFAULT_WATCH_DEPTH,
            stability: DEFAULT_STABILITY,
        }
    }
}

/// Settled sidecar change, delivered to the cache in arrival order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WatchEvent {
    Added(PathBuf),
    Changed(PathBuf),
    Removed(PathBuf),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RawKind {
    Created,
    Modified,
    Removed,
}

/// Keeps sidecar cache entries fresh for one library root at a time.
///
/// Only directories up to `max_depth` below the root are registered with the
/// OS, each non-recursively, so a deep tree costs no more than its top levels.
#[derive(Clone)]
pub struct FileWatcher {
    inner: Arc<WatcherInner>,
}

struct WatcherInner {
    cache: MetadataCache,
    options: WatchOptions,
    active: Mutex<Option<ActiveWatch>>,
}

struct ActiveWatch {
    root: PathBuf,
    registered: usize,
    consumer: JoinHandle<()>,
}

impl Drop for ActiveWatch {
    fn drop(&mut self) {
        // The consumer owns the notify watcher, so this releases every registration.
        self.consumer.abort();
    }
}

impl FileWatcher {
    pub fn new(cache: MetadataCache, options: WatchOptions) -> Self {
        Self {
            inner: Arc::new(WatcherInner {
                cache,
                options,
                active: Mutex::new(None),
            }),
        }
    }

    /// Points the watcher at `root`, closing any previous watch first.
    /// Returns whether `root` is being watched afterwards.
    pub async fn watch(&self, root: &Path) -> bool {
        if !self.inner.options.enabled {
            return false;
        }

        let mut active = self.inner.active.lock().await;
        if let Some(current) = active.as_ref() {
            if current.root == root {
                return true;
            }
        }
        if let Some(previous) = active.take() {
            info!("Stopping watch on {}", previous.root.display());
        }

        match start_watch(self.inner.cache.clone(), root, &self.inner.options).await {
            Ok(watch) => {
                info!(
                    "Watching {} for sidecar changes ({} directories, depth {}, settle {}ms)",
                    root.display(),
                    watch.registered,
                    self.inner.options.max_depth,
                    self.inner.options.stability.as_millis()
                );
                *active = Some(watch);
                true
            }
            Err(err) => {
                warn!("Failed to start watcher on {}: {}", root.display(), err);
                false
            }
        }
    }

    pub async fn watched_root(&self) -> Option<PathBuf> {
        self.inner.active.lock().await.as_ref().map(|a| a.root.clone())
    }

    pub async fn stop(&self) {
        if let Some(previous) = self.inner.active.lock().await.take() {
            info!("Stopping watch on {}", previous.root.display());
        }
    }

    #[cfg(test)]
    async fn registered_dirs(&self) -> usize {
        self.inner
            .active
            .lock()
            .await
            .as_ref()
            .map(|a| a.registered)
            .unwrap_or(0)
    }
}

async fn start_watch(
    cache: MetadataCache,
    root: &Path,
    options: &WatchOptions,
) -> Result<ActiveWatch, notify::Error> {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<Event>();
    let target = root.to_path_buf();
    let max_depth = options.max_depth;
    let (watcher, registered) =
        tokio::task::spawn_blocking(move || register_tree(tx, &target, max_depth))
            .await
            .map_err(|err| notify::Error::generic(&err.to_string()))??;

    let consumer = tokio::spawn(watch_loop(
        cache,
        root.to_path_buf(),
        watcher,
        rx,
        options.clone(),
    ));

    Ok(ActiveWatch {
        root: root.to_path_buf(),
        registered,
        consumer,
    })
}

/// Creates the OS watcher and registers `root` plus its shallow subdirectories.
fn register_tree(
    tx: UnboundedSender<Event>,
    root: &Path,
    max_depth: usize,
) -> Result<(RecommendedWatcher, usize), notify::Error> {
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| {
            if let Ok(event) = res {
                let _ = tx.send(event);
            }
        },
        NotifyConfig::default(),
    )?;
    watcher.watch(root, RecursiveMode::NonRecursive)?;

    let mut registered = 1;
    let (dirs, _) = walk_watch_tree(root, root, max_depth);
    for dir in dirs.iter().filter(|dir| dir.as_path() != root) {
        if add_dir(&mut watcher, dir) {
            registered += 1;
        }
    }
    Ok((watcher, registered))
}

fn add_dir(watcher: &mut RecommendedWatcher, dir: &Path) -> bool {
    match watcher.watch(dir, RecursiveMode::NonRecursive) {
        Ok(()) => true,
        Err(err) => {
            debug!("Failed to watch {}: {}", dir.display(), err);
            false
        }
    }
}

/// Directories under `start` that lie at most `max_depth` below `root`, plus
/// the sidecars directly inside them. Hidden entries and symlinks are skipped.
fn walk_watch_tree(root: &Path, start: &Path, max_depth: usize) -> (Vec<PathBuf>, Vec<PathBuf>) {
    let mut dirs = Vec::new();
    let mut sidecars = Vec::new();
    let start_depth = match relative_depth(root, start) {
        Some(depth) if depth <= max_depth => depth,
        _ => return (dirs, sidecars),
    };
    let remaining = max_depth - start_depth;

    let walker = WalkDir::new(start)
        .follow_links(false)
        .max_depth(remaining + 1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0 || !is_hidden_name(&entry.file_name().to_string_lossy())
        });
    for entry in walker.filter_map(Result::ok) {
        if entry.file_type().is_dir() {
            if entry.depth() <= remaining {
                dirs.push(entry.into_path());
            }
        } else if is_info_name(&entry.file_name().to_string_lossy()) {
            sidecars.push(entry.into_path());
        }
    }
    (dirs, sidecars)
}

async fn watch_loop(
    cache: MetadataCache,
    root: PathBuf,
    mut watcher: RecommendedWatcher,
    mut rx: UnboundedReceiver<Event>,
    options: WatchOptions,
) {
    let mut pending = PendingEvents::new(options.stability);
    loop {
        let deadline = pending.next_deadline();
        tokio::select! {
            maybe_event = rx.recv() => {
                let event = match maybe_event {
                    Some(event) => event,
                    None => break,
                };
                let now = Instant::now();
                for (path, kind) in classify(&event) {
                    if is_tracked_path(&root, &path, options.max_depth) {
                        pending.record(path, kind, now);
                    }
                }
                for dir in new_dir_candidates(&event) {
                    register_new_dir(&mut watcher, &root, dir, options.max_depth, &mut pending)
                        .await;
                }
            }
            _ = sleep_until(deadline) => {
                for (path, kind) in pending.drain_settled(Instant::now()) {
                    let exists = tokio::fs::try_exists(&path).await.unwrap_or(false);
                    apply_event(&cache, settle(path, kind, exists)).await;
                }
            }
        }
    }
    debug!("Watch loop for {} finished", root.display());
}

/// Registers a directory that appeared after the watch started, along with
/// its shallow subtree. Sidecars already inside are queued as additions.
async fn register_new_dir(
    watcher: &mut RecommendedWatcher,
    root: &Path,
    dir: PathBuf,
    max_depth: usize,
    pending: &mut PendingEvents,
) {
    match relative_depth(root, &dir) {
        Some(depth) if depth <= max_depth => {}
        _ => return,
    }
    let is_dir = tokio::fs::metadata(&dir)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false);
    if !is_dir {
        return;
    }

    let walk_root = root.to_path_buf();
    let found =
        tokio::task::spawn_blocking(move || walk_watch_tree(&walk_root, &dir, max_depth)).await;
    let (dirs, sidecars) = match found {
        Ok(found) => found,
        Err(err) => {
            debug!("New directory walk failed: {}", err);
            return;
        }
    };
    for dir in &dirs {
        if add_dir(watcher, dir) {
            debug!("Watching new directory {}", dir.display());
        }
    }
    let now = Instant::now();
    for sidecar in sidecars {
        pending.record(sidecar, RawKind::Created, now);
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

/// Applies one settled event to the cache.
pub async fn apply_event(cache: &MetadataCache, event: WatchEvent) {
    match event {
        WatchEvent::Added(path) | WatchEvent::Changed(path) => {
            debug!("Refreshing sidecar {}", path.display());
            cache.get(&path).await;
        }
        WatchEvent::Removed(path) => {
            debug!("Sidecar removed {}", path.display());
            cache.remove(&path);
        }
    }
}

fn classify(event: &Event) -> Vec<(PathBuf, RawKind)> {
    match event.kind {
        EventKind::Create(_) => tag(event, RawKind::Created),
        EventKind::Remove(_) => tag(event, RawKind::Removed),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => tag(event, RawKind::Removed),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => event
            .paths
            .iter()
            .enumerate()
            .map(|(idx, path)| {
                let kind = if idx == 0 {
                    RawKind::Removed
                } else {
                    RawKind::Modified
                };
                (path.clone(), kind)
            })
            .collect(),
        EventKind::Modify(_) => tag(event, RawKind::Modified),
        _ => Vec::new(),
    }
}

fn tag(event: &Event, kind: RawKind) -> Vec<(PathBuf, RawKind)> {
    event.paths.iter().map(|path| (path.clone(), kind)).collect()
}

/// Paths that may be directories appearing under the root.
fn new_dir_candidates(event: &Event) -> Vec<PathBuf> {
    match event.kind {
        EventKind::Create(CreateKind::Folder | CreateKind::Any | CreateKind::Other) => {
            event.paths.clone()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => event.paths.clone(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            event.paths.iter().skip(1).cloned().collect()
        }
        _ => Vec::new(),
    }
}

/// Components between `root` and `path`; `None` outside the root or through a
/// hidden entry.
fn relative_depth(root: &Path, path: &Path) -> Option<usize> {
    let relative = path.strip_prefix(root).ok()?;
    let mut depth = 0;
    for component in relative.components() {
        match component {
            Component::Normal(part) if !is_hidden_name(&part.to_string_lossy()) => depth += 1,
            _ => return None,
        }
    }
    Some(depth)
}

/// Sidecar under `root`, no hidden component, at most `max_depth` directories deep.
fn is_tracked_path(root: &Path, path: &Path, max_depth: usize) -> bool {
    let name = match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => name,
        None => return false,
    };
    if !is_info_name(name) {
        return false;
    }
    matches!(relative_depth(root, path), Some(depth) if depth >= 1 && depth - 1 <= max_depth)
}

fn settle(path: PathBuf, kind: RawKind, exists: bool) -> WatchEvent {
    if !exists {
        return WatchEvent::Removed(path);
    }
    match kind {
        RawKind::Created => WatchEvent::Added(path),
        RawKind::Modified | RawKind::Removed => WatchEvent::Changed(path),
    }
}

/// Per-path quiet-period tracking for in-progress writes.
struct PendingEvents {
    stability: Duration,
    pending: HashMap<PathBuf, (RawKind, Instant)>,
}

impl PendingEvents {
    fn new(stability: Duration) -> Self {
        Self {
            stability,
            pending: HashMap::new(),
        }
    }

    fn record(&mut self, path: PathBuf, kind: RawKind, now: Instant) {
        let merged = match self.pending.get(&path) {
            Some((RawKind::Created, _)) if kind == RawKind::Modified => RawKind::Created,
            Some((RawKind::Removed, _)) if kind == RawKind::Created => RawKind::Modified,
            _ => kind,
        };
        self.pending.insert(path, (merged, now));
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.pending
            .values()
            .map(|(_, seen)| *seen + self.stability)
            .min()
    }

    fn drain_settled(&mut self, now: Instant) -> Vec<(PathBuf, RawKind)> {
        let stability = self.stability;
        let mut settled: Vec<(PathBuf, RawKind)> = self
            .pending
            .iter()
            .filter(|(_, (_, seen))| *seen + stability <= now)
            .map(|(path, (kind, _))| (path.clone(), *kind))
            .collect();
        for (path, _) in &settled {
            self.pending.remove(path);
        }
        settled.sort_by(|a, b| a.0.cmp(&b.0));
        settled
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.pending.len()
    }
}
