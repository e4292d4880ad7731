use std::collections::{BTreeMap, HashSet};
use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use common::{
    bracket_id, description_name, find_image, has_bracket_id, info_name, info_stem,
    is_marker_info_name, is_marker_name, is_video_name, split_extension, MinifiedMetadata,
    Playlist, PlaylistVideos, VideoItem,
};
use futures_util::future::join_all;
use metadata::MetadataCache;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::gate::{IoGate, DEFAULT_CONCURRENCY};
use crate::search;
use crate::watch::{FileWatcher, WatchOptions};
use crate::IndexerError;

const UNKNOWN_UPLOADER: &str = "Unknown";

#[derive(Clone, Debug)]
pub struct IndexerOptions {
    /// Filesystem operations allowed in flight across all scans.
    pub concurrency: usize,
    pub watch: WatchOptions,
    /// Cap on entry depth for the tree-wide walk; `None` walks everything.
    pub max_walk_depth: Option<usize>,
    /// Log wall-clock timings for each scan.
    pub debug_perf: bool,
}

impl Default for IndexerOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            watch: WatchOptions::default(),
            max_walk_depth: None,
            debug_perf: false,
        }
    }
}

/// Scans library directories into playlists and videos.
///
/// Sidecars go through the shared [`MetadataCache`]; every scan re-targets the
/// [`FileWatcher`] at the scanned root so later scans stay cheap.
#[derive(Clone)]
pub struct Indexer {
    inner: Arc<IndexerInner>,
}

struct IndexerInner {
    cache: MetadataCache,
    watcher: FileWatcher,
    gate: IoGate,
    options: IndexerOptions,
}

/// A directory holding at least one video, as seen by the tree walk.
#[derive(Debug)]
struct VideoFolder {
    path: PathBuf,
    entries: Vec<String>,
    names: HashSet<String>,
    videos: Vec<String>,
}

impl VideoFolder {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            entries: Vec::new(),
            names: HashSet::new(),
            videos: Vec::new(),
        }
    }
}

impl Indexer {
    pub fn new(cache: MetadataCache, options: IndexerOptions) -> Self {
        let watcher = FileWatcher::new(cache.clone(), options.watch.clone());
        Self {
            inner: Arc::new(IndexerInner {
                gate: IoGate::new(options.concurrency),
                cache,
                watcher,
                options,
            }),
        }
    }

    pub fn cache(&self) -> &MetadataCache {
        &self.inner.cache
    }

    pub fn watcher(&self) -> &FileWatcher {
        &self.inner.watcher
    }

    /// Lists the playlists directly under `dir`.
    pub async fn scan_playlists(&self, dir: &Path) -> Result<Vec<Playlist>, IndexerError> {
        let started = Instant::now();
        self.ensure_root(dir).await?;
        self.inner.watcher.watch(dir).await;

        let children = self.list_names(dir).await?;
        let scans = children
            .iter()
            .map(|name| self.read_playlist(dir.join(name), name));
        let mut playlists: Vec<Playlist> = join_all(scans).await.into_iter().flatten().collect();
        playlists.sort_by(|a, b| a.name.cmp(&b.name));

        self.log_perf("scan_playlists", dir, started, playlists.len());
        Ok(playlists)
    }

    /// Videos of the playlist whose marker file carries `[playlist_id]`.
    /// `Ok(None)` means no such playlist exists under `dir`.
    pub async fn scan_playlist_videos(
        &self,
        dir: &Path,
        playlist_id: &str,
    ) -> Result<Option<PlaylistVideos>, IndexerError> {
        let started = Instant::now();
        self.ensure_root(dir).await?;
        self.inner.watcher.watch(dir).await;

        let (playlist_dir, files) = match self.find_playlist_dir(dir, playlist_id).await? {
            Some(found) => found,
            None => {
                debug!("Playlist {} not found under {}", playlist_id, dir.display());
                return Ok(None);
            }
        };

        let mut title = dir_name(&playlist_dir);
        if let Some(info) = files.iter().find(|f| is_marker_info_name(f)) {
            let data = self.load_metadata(&playlist_dir.join(info)).await;
            if let Some(value) = non_empty(data.title) {
                title = value;
            }
        }

        let names: HashSet<String> = files.iter().cloned().collect();
        let reads = files
            .iter()
            .filter(|f| is_video_name(f))
            .map(|file| self.read_playlist_video(&playlist_dir, file, &names));
        let videos = join_all(reads).await;

        self.log_perf("scan_playlist_videos", &playlist_dir, started, videos.len());
        Ok(Some(PlaylistVideos { videos, title }))
    }

    /// Every video below `dir`, newest upload first.
    pub async fn scan_all_videos(&self, dir: &Path) -> Result<Vec<VideoItem>, IndexerError> {
        let started = Instant::now();
        self.ensure_root(dir).await?;
        self.inner.watcher.watch(dir).await;

        let root = dir.to_path_buf();
        let max_depth = self.inner.options.max_walk_depth;
        let folders = self
            .inner
            .gate
            .run(async move {
                tokio::task::spawn_blocking(move || collect_video_folders(&root, max_depth)).await
            })
            .await
            .map_err(|err| IndexerError::Io(io::Error::other(err)))?;

        let reads = folders.iter().map(|folder| self.read_folder_videos(folder));
        let mut videos: Vec<VideoItem> = join_all(reads).await.into_iter().flatten().collect();
        sort_videos(&mut videos);

        self.log_perf("scan_all_videos", dir, started, videos.len());
        Ok(videos)
    }

    /// Scans the whole tree under `dir` and ranks it against `query`.
    pub async fn search(&self, dir: &Path, query: &str) -> Result<Vec<VideoItem>, IndexerError> {
        let videos = self.scan_all_videos(dir).await?;
        Ok(search::search(&videos, query))
    }

    /// Stops watching and writes any unsaved cache state.
    pub async fn shutdown(&self) {
        self.inner.watcher.stop().await;
        self.inner.cache.flush().await;
    }

    async fn read_playlist(&self, path: PathBuf, name: &str) -> Option<Playlist> {
        let stat = match self.stat(&path).await {
            Ok(stat) => stat,
            Err(err) => {
                debug!("Skipping {}: {}", path.display(), err);
                return None;
            }
        };
        if !stat.is_dir() {
            return None;
        }
        let files = match self.list_names(&path).await {
            Ok(files) => files,
            Err(err) => {
                debug!("Skipping unreadable folder {}: {}", path.display(), err);
                return None;
            }
        };
        let marker = files.iter().find(|f| is_marker_name(f))?;
        let names: HashSet<String> = files.iter().cloned().collect();

        let mut id = None;
        let mut title = name.to_string();
        let mut uploader = UNKNOWN_UPLOADER.to_string();
        let mut cover = None;
        if let Some(info) = files.iter().find(|f| is_marker_info_name(f)) {
            let data = self.load_metadata(&path.join(info)).await;
            id = non_empty(data.id);
            if let Some(value) = non_empty(data.title) {
                title = value;
            }
            if let Some(value) = non_empty(data.uploader) {
                uploader = value;
            }
            cover = find_image(info_stem(info), &names).map(|image| path.join(image));
        }
        if id.is_none() {
            id = bracket_id(marker);
        }

        let videos: Vec<&String> = files.iter().filter(|f| is_video_name(f)).collect();
        let names = &names;
        let folder = &path;
        let durations = videos.iter().map(|video| async move {
            let (stem, _) = split_extension(video);
            let info = info_name(stem);
            if names.contains(&info) {
                self.load_metadata(&folder.join(&info))
                    .await
                    .duration
                    .unwrap_or(0.0)
            } else {
                0.0
            }
        });
        let total_duration: f64 = join_all(durations).await.into_iter().sum();

        Some(Playlist {
            id,
            name: name.to_string(),
            title,
            cover,
            video_count: videos.len(),
            total_duration,
            uploader,
            updated_at: stat.modified().map(system_millis).unwrap_or(0),
        })
    }

    async fn find_playlist_dir(
        &self,
        dir: &Path,
        playlist_id: &str,
    ) -> Result<Option<(PathBuf, Vec<String>)>, IndexerError> {
        for name in self.list_names(dir).await? {
            let candidate = dir.join(&name);
            match self.stat(&candidate).await {
                Ok(stat) if stat.is_dir() => {}
                _ => continue,
            }
            let files = match self.list_names(&candidate).await {
                Ok(files) => files,
                Err(err) => {
                    debug!("Skipping unreadable folder {}: {}", candidate.display(), err);
                    continue;
                }
            };
            let matches = files
                .iter()
                .find(|f| is_marker_name(f))
                .map(|marker| has_bracket_id(marker, playlist_id))
                .unwrap_or(false);
            if matches {
                return Ok(Some((candidate, files)));
            }
        }
        Ok(None)
    }

    async fn read_playlist_video(
        &self,
        dir: &Path,
        filename: &str,
        names: &HashSet<String>,
    ) -> VideoItem {
        let (stem, _) = split_extension(filename);
        let info = info_name(stem);
        let metadata = async {
            if names.contains(&info) {
                self.load_metadata(&dir.join(&info)).await
            } else {
                MinifiedMetadata::default()
            }
        };
        let description = self.read_description(dir.join(description_name(stem)));
        let (metadata, description) = tokio::join!(metadata, description);

        let mut video = VideoItem::from_metadata(filename, dir.join(filename), metadata);
        video.description = Some(description);
        video.thumbnail = find_image(stem, names).map(|image| dir.join(image));
        video
    }

    async fn read_folder_videos(&self, folder: &VideoFolder) -> Vec<VideoItem> {
        let (playlist_id, playlist_name) = self.resolve_folder_playlist(folder).await;
        let playlist_id = &playlist_id;
        let playlist_name = &playlist_name;

        let reads = folder.videos.iter().map(|filename| async move {
            let path = folder.path.join(filename);
            let (stem, _) = split_extension(filename);
            let info = info_name(stem);
            let metadata = if folder.names.contains(&info) {
                self.load_metadata(&folder.path.join(&info)).await
            } else {
                MinifiedMetadata::default()
            };
            let ctime = match self.stat(&path).await {
                Ok(stat) => status_change_millis(&stat),
                Err(err) => {
                    debug!("Failed to stat {}: {}", path.display(), err);
                    0
                }
            };

            let mut video = VideoItem::from_metadata(filename, path, metadata);
            video.id = non_empty(video.id).or_else(|| bracket_id(filename));
            video.thumbnail = find_image(stem, &folder.names).map(|image| folder.path.join(image));
            video.playlist_id = playlist_id.clone();
            video.playlist_name = Some(playlist_name.clone());
            video.ctime = Some(ctime);
            video
        });
        join_all(reads).await
    }

    /// Resolved once per folder so every video in it shares the lookup.
    async fn resolve_folder_playlist(&self, folder: &VideoFolder) -> (Option<String>, String) {
        let fallback = dir_name(&folder.path);
        let marker = match folder.entries.iter().find(|f| is_marker_name(f)) {
            Some(marker) => marker,
            None => return (None, fallback),
        };

        let data = match folder.entries.iter().find(|f| is_marker_info_name(f)) {
            Some(info) => self.load_metadata(&folder.path.join(info)).await,
            None => MinifiedMetadata::default(),
        };
        let name = data
            .display_title()
            .map(str::to_string)
            .unwrap_or(fallback);
        let id = non_empty(data.id).or_else(|| bracket_id(marker));
        (id, name)
    }

    async fn ensure_root(&self, dir: &Path) -> Result<(), IndexerError> {
        match self.stat(dir).await {
            Ok(stat) if stat.is_dir() => Ok(()),
            Ok(_) => Err(IndexerError::DirectoryNotFound(dir.to_path_buf())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(IndexerError::DirectoryNotFound(dir.to_path_buf()))
            }
            Err(err) => Err(IndexerError::Io(err)),
        }
    }

    /// Entry names of `dir`, sorted so "first match" is stable across platforms.
    async fn list_names(&self, dir: &Path) -> io::Result<Vec<String>> {
        self.inner
            .gate
            .run(async {
                let mut read_dir = tokio::fs::read_dir(dir).await?;
                let mut names = Vec::new();
                while let Some(entry) = read_dir.next_entry().await? {
                    names.push(entry.file_name().to_string_lossy().into_owned());
                }
                names.sort();
                Ok(names)
            })
            .await
    }

    async fn stat(&self, path: &Path) -> io::Result<Metadata> {
        self.inner.gate.run(tokio::fs::metadata(path)).await
    }

    async fn load_metadata(&self, path: &Path) -> MinifiedMetadata {
        self.inner.gate.run(self.inner.cache.get(path)).await
    }

    async fn read_description(&self, path: PathBuf) -> String {
        match self.inner.gate.run(tokio::fs::read_to_string(&path)).await {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => String::new(),
            Err(err) => {
                debug!("Failed to read description {}: {}", path.display(), err);
                String::new()
            }
        }
    }

    fn log_perf(&self, label: &str, dir: &Path, started: Instant, count: usize) {
        if self.inner.options.debug_perf {
            info!(
                "[perf] {} {}: {} items in {:.2}ms",
                label,
                dir.display(),
                count,
                started.elapsed().as_secs_f64() * 1000.0
            );
        }
    }
}

/// Orders by `upload_date` descending, dated before undated, then by `ctime`
/// descending. The sort is stable.
pub fn sort_videos(videos: &mut [VideoItem]) {
    videos.sort_by(|a, b| {
        let date_a = a.upload_date.as_deref().filter(|d| !d.is_empty());
        let date_b = b.upload_date.as_deref().filter(|d| !d.is_empty());
        match (date_a, date_b) {
            (Some(date_a), Some(date_b)) => date_b.cmp(date_a),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => b.ctime.unwrap_or(0).cmp(&a.ctime.unwrap_or(0)),
        }
    });
}

/// Walks `root` without following symlinks, grouping entries by parent folder.
fn collect_video_folders(root: &Path, max_depth: Option<usize>) -> Vec<VideoFolder> {
    let mut walker = WalkDir::new(root).follow_links(false).sort_by_file_name();
    if let Some(depth) = max_depth {
        walker = walker.max_depth(depth);
    }

    let mut folders: BTreeMap<PathBuf, VideoFolder> = BTreeMap::new();
    for entry in walker.into_iter() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                debug!("Walk error under {}: {}", root.display(), err);
                continue;
            }
        };
        if entry.depth() == 0 {
            continue;
        }
        let parent = match entry.path().parent() {
            Some(parent) => parent,
            None => continue,
        };
        let name = entry.file_name().to_string_lossy().into_owned();
        let folder = folders
            .entry(parent.to_path_buf())
            .or_insert_with(|| VideoFolder::new(parent.to_path_buf()));
        if !entry.file_type().is_dir() && is_video_name(&name) {
            folder.videos.push(name.clone());
        }
        folder.names.insert(name.clone());
        folder.entries.push(name);
    }

    folders
        .into_values()
        .filter(|folder| !folder.videos.is_empty())
        .collect()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

fn system_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis().min(u128::from(u64::MAX)) as u64)
        .unwrap_or(0)
}

#[cfg(unix)]
fn status_change_millis(stat: &Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    let secs = stat.ctime();
    if secs < 0 {
        return 0;
    }
    (secs as u64)
        .saturating_mul(1000)
        .saturating_add(stat.ctime_nsec().max(0) as u64 / 1_000_000)
}

#[cfg(not(unix))]
fn status_change_millis(stat: &Metadata) -> u64 {
    stat.created()
        .or_else(|_| stat.modified())
        .map(system_millis)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn indexer() -> Indexer {
        Indexer::new(
            MetadataCache::in_memory(100),
            IndexerOptions {
                concurrency: 4,
                watch: WatchOptions {
                    enabled: false,
                    ..WatchOptions::default()
                },
                ..IndexerOptions::default()
            },
        )
    }

    fn touch(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        path
    }

    fn video(date: Option<&str>, ctime: u64) -> VideoItem {
        VideoItem {
            filename: format!("{:?}-{}.mp4", date, ctime),
            title: format!("{:?}-{}", date, ctime),
            upload_date: date.map(str::to_string),
            ctime: Some(ctime),
            ..VideoItem::default()
        }
    }

    #[tokio::test]
    async fn playlist_from_marker_sidecar() {
        let lib = tempfile::tempdir().unwrap();
        let course = lib.path().join("Course [abc123]");
        fs::create_dir(&course).unwrap();
        touch(
            &course,
            "000 - Course [abc123].info.json",
            r#"{"title":"Full Title","uploader":"X"}"#,
        );
        touch(&course, "001 - One.mp4", "");
        touch(&course, "002 - Two.mp4", "");

        let playlists = indexer().scan_playlists(lib.path()).await.unwrap();
        assert_eq!(playlists.len(), 1);
        let playlist = &playlists[0];
        assert_eq!(playlist.id.as_deref(), Some("abc123"));
        assert_eq!(playlist.name, "Course [abc123]");
        assert_eq!(playlist.title, "Full Title");
        assert_eq!(playlist.uploader, "X");
        assert_eq!(playlist.video_count, 2);
        assert_eq!(playlist.total_duration, 0.0);
        assert_eq!(playlist.cover, None);
    }

    #[tokio::test]
    async fn folders_without_marker_are_not_playlists() {
        let lib = tempfile::tempdir().unwrap();
        let loose = lib.path().join("Loose videos");
        fs::create_dir(&loose).unwrap();
        touch(&loose, "a.mp4", "");
        touch(&loose, "a.info.json", r#"{"id":"a"}"#);
        touch(lib.path(), "000 - stray.txt", "");

        let playlists = indexer().scan_playlists(lib.path()).await.unwrap();
        assert!(playlists.is_empty());
    }

    #[tokio::test]
    async fn playlist_cover_durations_and_fallbacks() {
        let lib = tempfile::tempdir().unwrap();
        let course = lib.path().join("Knitting");
        fs::create_dir(&course).unwrap();
        touch(&course, "000 - meta [k1].info.json", "{broken");
        touch(&course, "000 - meta [k1].png", "");
        touch(&course, "000 - meta [k1].jpg", "");
        touch(&course, "001.mp4", "");
        touch(&course, "001.info.json", r#"{"duration": 90.5}"#);
        touch(&course, "002.MKV", "");
        touch(&course, "002.info.json", r#"{"title":"no duration"}"#);
        touch(&course, "notes.txt", "");

        let playlists = indexer().scan_playlists(lib.path()).await.unwrap();
        let playlist = &playlists[0];
        assert_eq!(playlist.id.as_deref(), Some("k1"));
        assert_eq!(playlist.title, "Knitting");
        assert_eq!(playlist.uploader, "Unknown");
        assert_eq!(playlist.video_count, 2);
        assert_eq!(playlist.total_duration, 90.5);
        assert_eq!(
            playlist.cover.as_deref(),
            Some(course.join("000 - meta [k1].jpg").as_path())
        );
        assert!(playlist.updated_at > 0);
    }

    #[tokio::test]
    async fn sidecar_id_wins_over_marker_token() {
        let lib = tempfile::tempdir().unwrap();
        let course = lib.path().join("B");
        fs::create_dir(&course).unwrap();
        touch(&course, "000 - B [fromname].info.json", r#"{"id":"PLreal"}"#);

        let playlists = indexer().scan_playlists(lib.path()).await.unwrap();
        assert_eq!(playlists[0].id.as_deref(), Some("PLreal"));
        assert_eq!(playlists[0].video_count, 0);
    }

    #[tokio::test]
    async fn missing_root_is_an_error() {
        let lib = tempfile::tempdir().unwrap();
        let missing = lib.path().join("nope");
        let indexer = indexer();

        assert!(matches!(
            indexer.scan_playlists(&missing).await,
            Err(IndexerError::DirectoryNotFound(_))
        ));
        assert!(matches!(
            indexer.scan_all_videos(&missing).await,
            Err(IndexerError::DirectoryNotFound(_))
        ));
        assert!(matches!(
            indexer.scan_playlist_videos(&missing, "x").await,
            Err(IndexerError::DirectoryNotFound(_))
        ));
        assert!(indexer.scan_playlists(lib.path()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn scans_retarget_the_watcher() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let indexer = Indexer::new(MetadataCache::in_memory(10), IndexerOptions::default());
        assert_eq!(indexer.watcher().watched_root().await, None);

        indexer.scan_playlists(first.path()).await.unwrap();
        assert_eq!(
            indexer.watcher().watched_root().await.as_deref(),
            Some(first.path())
        );

        indexer.scan_all_videos(second.path()).await.unwrap();
        assert_eq!(
            indexer.watcher().watched_root().await.as_deref(),
            Some(second.path())
        );

        indexer.scan_playlist_videos(first.path(), "x").await.unwrap();
        assert_eq!(
            indexer.watcher().watched_root().await.as_deref(),
            Some(first.path())
        );

        indexer.shutdown().await;
        assert_eq!(indexer.watcher().watched_root().await, None);
    }

    #[tokio::test]
    async fn playlist_videos_by_id() {
        let lib = tempfile::tempdir().unwrap();
        let course = lib.path().join("Course");
        fs::create_dir(&course).unwrap();
        touch(&course, "000 - Course [abc].info.json", r#"{"title":"Course Title"}"#);
        touch(&course, "01 - Intro [v1].mp4", "");
        touch(
            &course,
            "01 - Intro [v1].info.json",
            r#"{"id":"v1","title":"T","fulltitle":"Intro Full","chapters":[{"start_time":0,"end_time":5,"title":"c"}]}"#,
        );
        touch(&course, "01 - Intro [v1].description", "About intro");
        touch(&course, "01 - Intro [v1].webp", "");
        touch(&course, "02 - Bare [v2].mp4", "");
        let other = lib.path().join("Other");
        fs::create_dir(&other).unwrap();
        touch(&other, "000 - Other [zzz].info.json", "{}");

        let indexer = indexer();
        let result = indexer
            .scan_playlist_videos(lib.path(), "abc")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.title, "Course Title");
        assert_eq!(result.videos.len(), 2);

        let first = &result.videos[0];
        assert_eq!(first.id.as_deref(), Some("v1"));
        assert_eq!(first.title, "Intro Full");
        assert_eq!(first.description.as_deref(), Some("About intro"));
        assert_eq!(
            first.thumbnail.as_deref(),
            Some(course.join("01 - Intro [v1].webp").as_path())
        );
        assert_eq!(first.chapters.as_ref().map(Vec::len), Some(1));
        assert_eq!(first.path, course.join("01 - Intro [v1].mp4"));

        let second = &result.videos[1];
        assert_eq!(second.id, None);
        assert_eq!(second.title, "02 - Bare [v2].mp4");
        assert_eq!(second.description.as_deref(), Some(""));
        assert_eq!(second.thumbnail, None);

        assert!(indexer
            .scan_playlist_videos(lib.path(), "missing")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn all_videos_walk_nested_tree() {
        let lib = tempfile::tempdir().unwrap();
        let course = lib.path().join("a").join("b").join("Course");
        fs::create_dir_all(&course).unwrap();
        touch(&course, "000 - Course [pl1].info.json", r#"{"fulltitle":"Deep Course"}"#);
        touch(&course, "x [id9].mp4", "");
        touch(&course, "x [id9].jpeg", "");
        touch(&course, "y.webm", "");
        touch(&course, "y.info.json", r#"{"id":"yy","upload_date":"20240101"}"#);
        touch(lib.path(), "root clip [r1].mkv", "");
        touch(lib.path(), "root clip [r1].info.json", "not json at all");

        let videos = indexer().scan_all_videos(lib.path()).await.unwrap();
        assert_eq!(videos.len(), 3);

        let y = videos.iter().find(|v| v.filename == "y.webm").unwrap();
        assert_eq!(y.id.as_deref(), Some("yy"));
        assert_eq!(y.playlist_id.as_deref(), Some("pl1"));
        assert_eq!(y.playlist_name.as_deref(), Some("Deep Course"));
        assert_eq!(videos[0].filename, "y.webm");

        let x = videos.iter().find(|v| v.filename == "x [id9].mp4").unwrap();
        assert_eq!(x.id.as_deref(), Some("id9"));
        assert_eq!(x.thumbnail.as_deref(), Some(course.join("x [id9].jpeg").as_path()));
        assert!(x.ctime.unwrap() > 0);

        let root_clip = videos
            .iter()
            .find(|v| v.filename == "root clip [r1].mkv")
            .unwrap();
        assert_eq!(root_clip.id.as_deref(), Some("r1"));
        assert_eq!(root_clip.title, "root clip [r1].mkv");
        assert_eq!(root_clip.playlist_id, None);
        assert!(root_clip.playlist_name.is_some());
    }

    #[tokio::test]
    async fn walk_depth_cap_limits_tree() {
        let lib = tempfile::tempdir().unwrap();
        let deep = lib.path().join("one").join("two");
        fs::create_dir_all(&deep).unwrap();
        touch(lib.path(), "top.mp4", "");
        touch(&deep, "deep.mp4", "");

        let capped = Indexer::new(
            MetadataCache::in_memory(10),
            IndexerOptions {
                max_walk_depth: Some(1),
                watch: WatchOptions {
                    enabled: false,
                    ..WatchOptions::default()
                },
                ..IndexerOptions::default()
            },
        );
        let videos = capped.scan_all_videos(lib.path()).await.unwrap();
        assert_eq!(videos.len(), 1);
        assert_eq!(videos[0].filename, "top.mp4");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlink_cycles_are_not_followed() {
        let lib = tempfile::tempdir().unwrap();
        let sub = lib.path().join("sub");
        fs::create_dir(&sub).unwrap();
        touch(&sub, "v.mp4", "");
        std::os::unix::fs::symlink(lib.path(), sub.join("loop")).unwrap();

        let videos = indexer().scan_all_videos(lib.path()).await.unwrap();
        assert_eq!(videos.len(), 1);
    }

    #[tokio::test]
    async fn scans_reuse_cached_sidecars() {
        let lib = tempfile::tempdir().unwrap();
        touch(lib.path(), "v.mp4", "");
        touch(lib.path(), "v.info.json", r#"{"title":"Cached"}"#);
        let indexer = indexer();

        indexer.scan_all_videos(lib.path()).await.unwrap();
        let videos = indexer.scan_all_videos(lib.path()).await.unwrap();
        assert_eq!(videos[0].title, "Cached");
        assert_eq!(indexer.cache().stats().reads, 1);
    }

    #[tokio::test]
    async fn search_over_scanned_tree() {
        let lib = tempfile::tempdir().unwrap();
        touch(lib.path(), "a.mp4", "");
        touch(lib.path(), "a.info.json", r#"{"title":"Rust Ownership"}"#);
        touch(lib.path(), "b.mp4", "");
        touch(lib.path(), "b.info.json", r#"{"title":"Go Channels"}"#);

        let results = indexer().search(lib.path(), "+rust").await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "Rust Ownership");
    }

    #[test]
    fn sorts_dated_before_undated() {
        let mut videos = vec![
            video(Some("20230101"), 1),
            video(None, 500),
            video(Some("20240101"), 2),
            video(None, 900),
            video(Some(""), 700),
        ];
        sort_videos(&mut videos);
        let order: Vec<(Option<&str>, u64)> = videos
            .iter()
            .map(|v| (v.upload_date.as_deref(), v.ctime.unwrap()))
            .collect();
        assert_eq!(
            order,
            vec![
                (Some("20240101"), 2),
                (Some("20230101"), 1),
                (None, 900),
                (Some(""), 700),
                (None, 500),
            ]
        );
    }
}
