use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;

/// A file whose name starts with this prefix turns its directory into a playlist.
pub const PLAYLIST_MARKER_PREFIX: &str = "000 - ";
pub const INFO_SUFFIX: &str = ".info.json";
pub const DESCRIPTION_SUFFIX: &str = ".description";
/// Probe order matters: the first existing image wins.
pub const IMAGE_EXTENSIONS: &[&str] = &[".webp", ".jpg", ".jpeg", ".png"];
pub const VIDEO_EXTENSIONS: &[&str] = &[".mp4", ".mkv", ".webm"];

static BRACKET_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([a-zA-Z0-9_-]+)\]").expect("bracket id pattern"));

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub start_time: f64,
    pub end_time: f64,
    pub title: String,
}

/// Allow-listed projection of an `.info.json` sidecar.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MinifiedMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fulltitle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploader: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploader_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chapters: Option<Vec<Chapter>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl MinifiedMetadata {
    pub fn is_empty(&self) -> bool {
        *self == MinifiedMetadata::default()
    }

    /// `fulltitle`, then `title`, skipping empty strings.
    pub fn display_title(&self) -> Option<&str> {
        self.fulltitle
            .as_deref()
            .filter(|value| !value.is_empty())
            .or_else(|| self.title.as_deref().filter(|value| !value.is_empty()))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Playlist {
    pub id: Option<String>,
    pub name: String,
    pub title: String,
    pub cover: Option<PathBuf>,
    pub video_count: usize,
    pub total_duration: f64,
    pub uploader: String,
    pub updated_at: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub filename: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploader: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploader_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapters: Option<Vec<Chapter>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub thumbnail: Option<PathBuf>,
    pub path: PathBuf,
    #[serde(
        rename = "playlistId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub playlist_id: Option<String>,
    #[serde(
        rename = "playlistName",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub playlist_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ctime: Option<u64>,
}

/// Contents of a single playlist directory.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlaylistVideos {
    pub videos: Vec<VideoItem>,
    pub title: String,
}

impl VideoItem {
    /// Builds an item from a video file name and its (possibly empty) sidecar.
    pub fn from_metadata(filename: &str, path: PathBuf, metadata: MinifiedMetadata) -> Self {
        let title = metadata
            .display_title()
            .map(str::to_string)
            .unwrap_or_else(|| filename.to_string());
        Self {
            id: metadata.id,
            filename: filename.to_string(),
            title,
            uploader: metadata.uploader,
            uploader_url: metadata.uploader_url,
            channel_url: metadata.channel_url,
            upload_date: metadata.upload_date,
            timestamp: metadata.timestamp,
            duration: metadata.duration,
            chapters: metadata.chapters,
            path,
            ..Self::default()
        }
    }
}

pub fn is_marker_name(name: &str) -> bool {
    name.starts_with(PLAYLIST_MARKER_PREFIX)
}

pub fn is_marker_info_name(name: &str) -> bool {
    is_marker_name(name) && name.ends_with(INFO_SUFFIX)
}

pub fn is_info_name(name: &str) -> bool {
    name.ends_with(INFO_SUFFIX)
}

pub fn is_hidden_name(name: &str) -> bool {
    name.starts_with('.')
}

/// First `[token]` of alphanumerics, `_` or `-` in a file name.
pub fn bracket_id(name: &str) -> Option<String> {
    BRACKET_ID
        .captures(name)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

pub fn has_bracket_id(name: &str, id: &str) -> bool {
    name.contains(&format!("[{}]", id))
}

/// Splits `name` at its last dot; a leading dot does not start an extension.
pub fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => (&name[..idx], &name[idx..]),
        _ => (name, ""),
    }
}

pub fn is_video_name(name: &str) -> bool {
    let (_, ext) = split_extension(name);
    let ext = ext.to_ascii_lowercase();
    VIDEO_EXTENSIONS.contains(&ext.as_str())
}

pub fn info_name(stem: &str) -> String {
    format!("{}{}", stem, INFO_SUFFIX)
}

pub fn description_name(stem: &str) -> String {
    format!("{}{}", stem, DESCRIPTION_SUFFIX)
}

pub fn info_stem(name: &str) -> &str {
    name.strip_suffix(INFO_SUFFIX).unwrap_or(name)
}

/// Probes `stem` + each image extension against a directory listing.
pub fn find_image(stem: &str, names: &HashSet<String>) -> Option<String> {
    IMAGE_EXTENSIONS
        .iter()
        .map(|ext| format!("{}{}", stem, ext))
        .find(|candidate| names.contains(candidate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bracket_id_takes_first_token() {
        assert_eq!(
            bracket_id("Lecture 1 [aB3-xyz].mp4").as_deref(),
            Some("aB3-xyz")
        );
        assert_eq!(
            bracket_id("000 - Course [abc123] [other].info.json").as_deref(),
            Some("abc123")
        );
        assert_eq!(bracket_id("no id [with space].mp4"), None);
        assert_eq!(bracket_id("plain.mp4"), None);
    }

    #[test]
    fn marker_names() {
        assert!(is_marker_name("000 - Course [abc].info.json"));
        assert!(is_marker_info_name("000 - Course [abc].info.json"));
        assert!(!is_marker_info_name("000 - Course [abc].jpg"));
        assert!(!is_marker_name("000- Course.info.json"));
        assert!(!is_marker_name("001 - Intro.mp4"));
    }

    #[test]
    fn video_extensions_are_case_insensitive() {
        assert!(is_video_name("a.mp4"));
        assert!(is_video_name("b.MKV"));
        assert!(is_video_name("c.d.webm"));
        assert!(!is_video_name("a.info.json"));
        assert!(!is_video_name(".mp4"));
    }

    #[test]
    fn split_extension_keeps_inner_dots() {
        assert_eq!(split_extension("a.b.mp4"), ("a.b", ".mp4"));
        assert_eq!(split_extension(".hidden"), (".hidden", ""));
        assert_eq!(split_extension("noext"), ("noext", ""));
    }

    #[test]
    fn image_probe_follows_extension_order() {
        let names: HashSet<String> = ["v.png", "v.jpg", "other.webp"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(find_image("v", &names).as_deref(), Some("v.jpg"));
        assert_eq!(find_image("missing", &names), None);
    }

    #[test]
    fn video_item_prefers_fulltitle() {
        let metadata = MinifiedMetadata {
            title: Some("Short".to_string()),
            fulltitle: Some("Full".to_string()),
            ..MinifiedMetadata::default()
        };
        let item = VideoItem::from_metadata("v.mp4", PathBuf::from("/x/v.mp4"), metadata);
        assert_eq!(item.title, "Full");

        let item = VideoItem::from_metadata(
            "v.mp4",
            PathBuf::from("/x/v.mp4"),
            MinifiedMetadata::default(),
        );
        assert_eq!(item.title, "v.mp4");
    }
}
