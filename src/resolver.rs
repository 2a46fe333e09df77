//! Video resolution: identifier/URL to metadata plus the rendition list.
//!
//! Resolution is delegated to yt-dlp's `--dump-single-json` mode, the same
//! payload the channel tooling consumes. Only the fields the backend needs
//! are deserialized and everything is optional, because older or partially
//! blocked videos routinely lack metadata. Renditions are produced fresh
//! per call; nothing is cached across requests.

use std::{io, path::PathBuf, process::Stdio};

use serde::Deserialize;
use thiserror::Error;
use tokio::process::Command;
use url::Url;

/// Hosts a video URL may point at. Anything else is rejected before the
/// resolver is invoked.
const VIDEO_HOSTS: &[&str] = &[
    "youtube.com",
    "www.youtube.com",
    "m.youtube.com",
    "music.youtube.com",
    "youtu.be",
];

/// One encoded variant of a video, as reported by the resolver.
#[derive(Debug, Clone, PartialEq)]
pub struct Rendition {
    /// Opaque resolver token naming this variant.
    pub format_id: String,
    /// Free-form quality label, e.g. "720p". Absent for audio-only streams.
    pub quality_label: Option<String>,
    /// Container extension, e.g. "mp4" or "webm".
    pub container: Option<String>,
    /// Approximate size in bytes when the resolver knows it.
    pub size: Option<i64>,
    pub has_video: bool,
    pub has_audio: bool,
}

/// Metadata for one resolved video.
#[derive(Debug, Clone)]
pub struct VideoMetadata {
    pub id: String,
    pub title: String,
    pub thumbnail: Option<String>,
    pub duration: Option<i64>,
    pub author: Option<String>,
    pub view_count: Option<i64>,
    pub renditions: Vec<Rendition>,
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("invalid video URL")]
    InvalidUrl,
    #[error("failed to run {bin}: {source}")]
    Spawn {
        bin: String,
        #[source]
        source: io::Error,
    },
    #[error("resolver exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
    #[error("unreadable resolver output: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ResolveError {
    /// True when the failure means the video itself is gone or blocked
    /// rather than the resolver misbehaving. Callers map this to 404.
    pub fn is_unavailable(&self) -> bool {
        match self {
            ResolveError::Failed { stderr, .. } => {
                let stderr = stderr.to_ascii_lowercase();
                stderr.contains("video unavailable")
                    || stderr.contains("private video")
                    || stderr.contains("has been removed")
            }
            _ => false,
        }
    }
}

/// Subset of yt-dlp's `--dump-single-json` payload.
#[derive(Debug, Deserialize)]
struct VideoInfo {
    id: String,
    title: Option<String>,
    fulltitle: Option<String>,
    thumbnail: Option<String>,
    thumbnails: Option<Vec<ThumbnailInfo>>,
    duration: Option<i64>,
    uploader: Option<String>,
    channel: Option<String>,
    view_count: Option<i64>,
    #[serde(default)]
    formats: Vec<FormatInfo>,
}

#[derive(Debug, Deserialize)]
struct ThumbnailInfo {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FormatInfo {
    #[serde(rename = "format_id")]
    format_id: Option<String>,
    format_note: Option<String>,
    height: Option<i64>,
    ext: Option<String>,
    vcodec: Option<String>,
    acodec: Option<String>,
    filesize: Option<i64>,
    #[serde(rename = "filesize_approx")]
    filesize_approx: Option<i64>,
}

/// Checks that a caller-supplied URL names a video we can hand to the
/// resolver: http(s), a known host, and a path shape that identifies a
/// single video.
pub fn is_valid_video_url(raw: &str) -> bool {
    let Ok(url) = Url::parse(raw) else {
        return false;
    };
    if !matches!(url.scheme(), "http" | "https") {
        return false;
    }
    let Some(host) = url.host_str() else {
        return false;
    };
    if !VIDEO_HOSTS.contains(&host) {
        return false;
    }

    if host == "youtu.be" {
        return url.path_segments().is_some_and(|mut segments| {
            segments.next().is_some_and(|id| !id.is_empty())
        });
    }

    let path = url.path();
    if path == "/watch" {
        return url
            .query_pairs()
            .any(|(key, value)| key == "v" && !value.is_empty());
    }
    path.starts_with("/shorts/") || path.starts_with("/embed/") || path.starts_with("/live/")
}

/// Talks to the external resolver binary. Cloneable so each request handler
/// can own a handle without shared state.
#[derive(Debug, Clone)]
pub struct VideoResolver {
    bin: PathBuf,
}

impl VideoResolver {
    pub fn new(bin: PathBuf) -> Self {
        Self { bin }
    }

    /// Runs `yt-dlp --dump-single-json` for `url` and converts the payload
    /// into typed metadata plus the rendition list.
    pub async fn resolve(&self, url: &str) -> Result<VideoMetadata, ResolveError> {
        if !is_valid_video_url(url) {
            return Err(ResolveError::InvalidUrl);
        }

        let output = Command::new(&self.bin)
            .arg("--dump-single-json")
            .arg("--skip-download")
            .arg("--no-warnings")
            .arg("--no-progress")
            .arg(url)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| ResolveError::Spawn {
                bin: self.bin.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(ResolveError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        let info: VideoInfo = serde_json::from_slice(&output.stdout)?;
        Ok(metadata_from_info(info))
    }
}

fn metadata_from_info(info: VideoInfo) -> VideoMetadata {
    let title = info
        .fulltitle
        .as_deref()
        .or(info.title.as_deref())
        .filter(|t| !t.is_empty())
        .unwrap_or(&info.id)
        .to_owned();

    let thumbnail = info.thumbnail.or_else(|| {
        info.thumbnails
            .as_ref()
            .and_then(|list| list.iter().rev().find_map(|t| t.url.clone()))
    });

    let renditions = info.formats.into_iter().filter_map(rendition_from_format).collect();

    VideoMetadata {
        title,
        thumbnail,
        duration: info.duration,
        author: info.uploader.or(info.channel),
        view_count: info.view_count,
        renditions,
        id: info.id,
    }
}

fn rendition_from_format(format: FormatInfo) -> Option<Rendition> {
    let format_id = format.format_id?;
    let has_video = codec_present(format.vcodec.as_deref());
    let has_audio = codec_present(format.acodec.as_deref());

    let quality_label = format
        .format_note
        .filter(|note| note.chars().next().is_some_and(|c| c.is_ascii_digit()))
        .or_else(|| format.height.map(|h| format!("{h}p")));

    Some(Rendition {
        format_id,
        quality_label,
        container: format.ext,
        size: format.filesize.or(format.filesize_approx),
        has_video,
        has_audio,
    })
}

fn codec_present(codec: Option<&str>) -> bool {
    codec.is_some_and(|c| !c.is_empty() && c != "none")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_watch_shorts_and_short_link_urls() {
        assert!(is_valid_video_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ"));
        assert!(is_valid_video_url("https://youtube.com/shorts/abc123"));
        assert!(is_valid_video_url("https://m.youtube.com/watch?v=abc"));
        assert!(is_valid_video_url("https://youtu.be/dQw4w9WgXcQ"));
        assert!(is_valid_video_url("http://www.youtube.com/embed/abc"));
    }

    #[test]
    fn rejects_non_video_urls() {
        assert!(!is_valid_video_url("not a url"));
        assert!(!is_valid_video_url("ftp://youtube.com/watch?v=abc"));
        assert!(!is_valid_video_url("https://example.com/watch?v=abc"));
        assert!(!is_valid_video_url("https://www.youtube.com/watch"));
        assert!(!is_valid_video_url("https://www.youtube.com/feed/subscriptions"));
        assert!(!is_valid_video_url(""));
    }

    #[test]
    fn renditions_classify_audio_and_video_presence() {
        let payload = serde_json::json!({
            "id": "abc",
            "fulltitle": "Sample",
            "duration": 120,
            "formats": [
                {"format_id": "18", "format_note": "360p", "height": 360,
                 "ext": "mp4", "vcodec": "avc1", "acodec": "mp4a", "filesize": 1024},
                {"format_id": "251", "ext": "webm", "vcodec": "none",
                 "acodec": "opus", "filesize_approx": 512},
                {"format_id": "299", "format_note": "1080p60", "height": 1080,
                 "ext": "mp4", "vcodec": "avc1", "acodec": "none"}
            ]
        });
        let info: VideoInfo = serde_json::from_value(payload).unwrap();
        let metadata = metadata_from_info(info);

        assert_eq!(metadata.renditions.len(), 3);
        let muxed = &metadata.renditions[0];
        assert!(muxed.has_video && muxed.has_audio);
        assert_eq!(muxed.quality_label.as_deref(), Some("360p"));
        assert_eq!(muxed.size, Some(1024));

        let audio_only = &metadata.renditions[1];
        assert!(audio_only.has_audio && !audio_only.has_video);
        assert_eq!(audio_only.quality_label, None);
        assert_eq!(audio_only.size, Some(512));

        let video_only = &metadata.renditions[2];
        assert!(video_only.has_video && !video_only.has_audio);
    }

    #[test]
    fn title_falls_back_to_id_and_label_to_height() {
        let payload = serde_json::json!({
            "id": "xyz",
            "title": "",
            "formats": [
                {"format_id": "22", "height": 720, "ext": "mp4",
                 "vcodec": "avc1", "acodec": "mp4a"}
            ]
        });
        let info: VideoInfo = serde_json::from_value(payload).unwrap();
        let metadata = metadata_from_info(info);
        assert_eq!(metadata.title, "xyz");
        assert_eq!(metadata.renditions[0].quality_label.as_deref(), Some("720p"));
    }

    #[test]
    fn thumbnail_prefers_top_level_then_last_entry() {
        let payload = serde_json::json!({
            "id": "t",
            "title": "t",
            "thumbnails": [
                {"url": "https://img/low.jpg"},
                {"url": "https://img/high.jpg"}
            ]
        });
        let info: VideoInfo = serde_json::from_value(payload).unwrap();
        let metadata = metadata_from_info(info);
        assert_eq!(metadata.thumbnail.as_deref(), Some("https://img/high.jpg"));
    }

    #[test]
    fn unavailable_detection_reads_resolver_stderr() {
        let gone = ResolveError::Failed {
            status: "exit status: 1".into(),
            stderr: "ERROR: [youtube] abc: Video unavailable".into(),
        };
        assert!(gone.is_unavailable());

        let other = ResolveError::Failed {
            status: "exit status: 1".into(),
            stderr: "ERROR: network timed out".into(),
        };
        assert!(!other.is_unavailable());
        assert!(!ResolveError::InvalidUrl.is_unavailable());
    }
}
