//! Catalog search: free-text query to a ranked list of videos.
//!
//! Ranking itself is delegated to yt-dlp's `ytsearchN:` pseudo-URL in
//! flat-playlist mode, which emits one JSON object per result line. The
//! module owns the typed view of those rows (absent fields become
//! documented defaults, never implicit nulls) and the pure suggestion
//! derivation used by the autocomplete endpoint.

use std::{path::PathBuf, process::Stdio};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tokio::process::Command;

/// Suggestions are capped so the autocomplete dropdown stays scannable.
pub const MAX_SUGGESTIONS: usize = 8;
/// Titles longer than this are cut and ellipsized in suggestions.
const SUGGESTION_TITLE_LEN: usize = 50;

/// One search result row as served to clients.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SearchHit {
    pub id: String,
    pub title: String,
    pub channel: String,
    /// Human-readable duration ("3:41"); "Unknown" when the catalog does
    /// not report one.
    pub duration: String,
    #[serde(rename = "viewCount")]
    pub view_count: i64,
    /// Always empty in flat extraction; kept so the response shape is
    /// stable for clients that read it.
    #[serde(rename = "publishedAt")]
    pub published_at: String,
    pub thumbnail: String,
    pub url: String,
}

/// One line of yt-dlp's flat-playlist dump-json output.
#[derive(Debug, Deserialize)]
struct FlatEntry {
    id: String,
    title: Option<String>,
    uploader: Option<String>,
    channel: Option<String>,
    duration: Option<f64>,
    view_count: Option<i64>,
    url: Option<String>,
    #[serde(default)]
    thumbnails: Vec<FlatThumbnail>,
}

#[derive(Debug, Deserialize)]
struct FlatThumbnail {
    url: Option<String>,
}

/// Talks to the external catalog via the configured yt-dlp binary.
#[derive(Debug, Clone)]
pub struct SearchClient {
    bin: PathBuf,
}

impl SearchClient {
    pub fn new(bin: PathBuf) -> Self {
        Self { bin }
    }

    /// Runs a catalog search and returns up to `max_results` hits.
    pub async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        let output = Command::new(&self.bin)
            .arg("--flat-playlist")
            .arg("--dump-json")
            .arg("--no-warnings")
            .arg(format!("ytsearch{max_results}:{query}"))
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| format!("running catalog search via {}", self.bin.display()))?;

        if !output.status.success() {
            bail!(
                "catalog search failed (status {}): {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut hits = Vec::new();
        for line in stdout.lines().filter(|line| !line.trim().is_empty()) {
            let entry: FlatEntry =
                serde_json::from_str(line).context("parsing catalog search row")?;
            hits.push(hit_from_entry(entry));
        }
        Ok(hits)
    }
}

fn hit_from_entry(entry: FlatEntry) -> SearchHit {
    let url = entry
        .url
        .clone()
        .unwrap_or_else(|| format!("https://www.youtube.com/watch?v={}", entry.id));
    let thumbnail = entry
        .thumbnails
        .iter()
        .rev()
        .find_map(|t| t.url.clone())
        .unwrap_or_default();

    SearchHit {
        title: entry.title.unwrap_or_default(),
        channel: entry.channel.or(entry.uploader).unwrap_or_default(),
        duration: entry
            .duration
            .map(|secs| format_duration(secs as i64))
            .unwrap_or_else(|| "Unknown".to_owned()),
        view_count: entry.view_count.unwrap_or(0),
        published_at: String::new(),
        thumbnail,
        url,
        id: entry.id,
    }
}

/// Formats a duration in seconds as `M:SS` or `H:MM:SS`.
pub fn format_duration(total_seconds: i64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}

/// Derives autocomplete suggestions from result titles: brackets and
/// braces stripped, whitespace collapsed, overlong titles ellipsized,
/// duplicates dropped, at most [`MAX_SUGGESTIONS`] entries. An empty
/// outcome degrades to the original query so the client always has
/// something to show.
pub fn suggestion_titles<'a, I>(query: &str, titles: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut suggestions: Vec<String> = Vec::new();
    for title in titles {
        if suggestions.len() >= MAX_SUGGESTIONS {
            break;
        }
        if title.is_empty() {
            continue;
        }
        let cleaned = clean_suggestion(title);
        if !suggestions.contains(&cleaned) {
            suggestions.push(cleaned);
        }
    }
    if suggestions.is_empty() {
        suggestions.push(query.to_owned());
    }
    suggestions
}

fn clean_suggestion(title: &str) -> String {
    let stripped: String = title
        .chars()
        .filter(|c| !matches!(c, '[' | ']' | '(' | ')' | '{' | '}'))
        .collect();

    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() > SUGGESTION_TITLE_LEN {
        let cut: String = collapsed.chars().take(SUGGESTION_TITLE_LEN).collect();
        format!("{cut}...")
    } else {
        collapsed
    }
}
