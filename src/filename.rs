//! Attachment filename sanitization for download responses.
//!
//! The rules are compatibility-sensitive: clients that resume or re-request
//! downloads expect the same title to always map to the same filename, so
//! the pipeline (strip forbidden characters, then collapse whitespace runs
//! into single underscores, then truncate) must not be reordered.

/// Characters that are unsafe in filenames on at least one supported
/// platform and are therefore always removed.
const FORBIDDEN: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

pub const DEFAULT_MAX_LEN: usize = 100;
pub const STRICT_MAX_LEN: usize = 50;

/// Which media container the download was asked for. Drives both the
/// filename extension and the response content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    pub fn extension(self) -> &'static str {
        match self {
            MediaKind::Audio => "mp3",
            MediaKind::Video => "mp4",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            MediaKind::Audio => "audio/mpeg",
            MediaKind::Video => "video/mp4",
        }
    }
}

/// Sanitization policy. Two policies exist in the wild: the default keeps
/// any non-forbidden character and truncates at 100, the strict variant
/// keeps only alphanumerics/whitespace/hyphen/underscore and truncates at
/// 50. Both are expressible here so the choice is configuration, not code.
#[derive(Debug, Clone)]
pub struct FilenamePolicy {
    pub max_len: usize,
    pub strict: bool,
}

impl Default for FilenamePolicy {
    fn default() -> Self {
        Self {
            max_len: DEFAULT_MAX_LEN,
            strict: false,
        }
    }
}

impl FilenamePolicy {
    pub fn strict() -> Self {
        Self {
            max_len: STRICT_MAX_LEN,
            strict: true,
        }
    }
}

/// Reduces a video title to a filesystem-safe stem. Forbidden characters
/// are removed first, then every whitespace run (leading and trailing runs
/// included) becomes exactly one underscore, then the result is truncated
/// to the policy maximum. The function is idempotent: a sanitized name
/// passes through unchanged.
pub fn sanitize_title(title: &str, policy: &FilenamePolicy) -> String {
    let kept = title.chars().filter(|c| !FORBIDDEN.contains(c)).filter(|c| {
        !policy.strict
            || c.is_alphanumeric()
            || c.is_whitespace()
            || matches!(c, '-' | '_')
    });

    let mut stem = String::new();
    let mut pending_ws = false;
    for c in kept {
        if c.is_whitespace() {
            pending_ws = true;
            continue;
        }
        if pending_ws {
            stem.push('_');
            pending_ws = false;
        }
        stem.push(c);
    }
    if pending_ws {
        stem.push('_');
    }

    stem.chars().take(policy.max_len).collect()
}

/// Full attachment filename for a download of the given media kind.
pub fn attachment_filename(title: &str, kind: MediaKind, policy: &FilenamePolicy) -> String {
    format!("{}.{}", sanitize_title(title, policy), kind.extension())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_forbidden_characters_then_collapses_whitespace() {
        let policy = FilenamePolicy::default();
        assert_eq!(sanitize_title("Test: Video/Name", &policy), "Test_VideoName");
        assert_eq!(
            attachment_filename("Test: Video/Name", MediaKind::Audio, &policy),
            "Test_VideoName.mp3"
        );
    }

    #[test]
    fn collapses_whitespace_runs_to_single_underscore() {
        let policy = FilenamePolicy::default();
        assert_eq!(sanitize_title("a  b\t\nc", &policy), "a_b_c");
        assert_eq!(sanitize_title("  padded  ", &policy), "_padded_");
    }

    #[test]
    fn never_emits_forbidden_characters() {
        let policy = FilenamePolicy::default();
        let sanitized = sanitize_title("a<b>c:d\"e/f\\g|h?i*j", &policy);
        assert_eq!(sanitized, "abcdefghij");
        assert!(sanitized.chars().all(|c| !FORBIDDEN.contains(&c)));
    }

    #[test]
    fn sanitization_is_idempotent() {
        let policy = FilenamePolicy::default();
        let once = sanitize_title("Some  \"Weird\"  Title: Part 2/3", &policy);
        let twice = sanitize_title(&once, &policy);
        assert_eq!(once, twice);
    }

    #[test]
    fn truncates_to_policy_maximum() {
        let policy = FilenamePolicy::default();
        let long_title = "x".repeat(500);
        assert_eq!(sanitize_title(&long_title, &policy).chars().count(), DEFAULT_MAX_LEN);

        let short = FilenamePolicy { max_len: 10, strict: false };
        assert_eq!(sanitize_title(&long_title, &short), "x".repeat(10));
    }

    #[test]
    fn strict_policy_drops_punctuation_and_truncates_shorter() {
        let policy = FilenamePolicy::strict();
        assert_eq!(sanitize_title("Hello, World! (live)", &policy), "Hello_World_live");
        let long_title = "y".repeat(200);
        assert_eq!(sanitize_title(&long_title, &policy).chars().count(), STRICT_MAX_LEN);
    }

    #[test]
    fn non_ascii_titles_survive_the_default_policy() {
        let policy = FilenamePolicy::default();
        assert_eq!(sanitize_title("Müzik Видео 動画", &policy), "Müzik_Видео_動画");
    }

    #[test]
    fn media_kind_maps_extension_and_content_type() {
        assert_eq!(MediaKind::Audio.extension(), "mp3");
        assert_eq!(MediaKind::Audio.content_type(), "audio/mpeg");
        assert_eq!(MediaKind::Video.extension(), "mp4");
        assert_eq!(MediaKind::Video.content_type(), "video/mp4");
    }
}
