//! Download-format negotiation.
//!
//! Pure functions from (rendition list, requested quality) to a download
//! plan. The ordering rules are compatibility-sensitive: quality labels are
//! compared by their leading integer run (no digits sorts as 0) and ties
//! keep the resolver's original order, so the same rendition list always
//! yields the same pick.

use thiserror::Error;

use crate::resolver::Rendition;

/// Container renditions must use before they qualify for direct selection
/// under the "highest" policy. Anything else goes through the capability
/// fallback so the extractor can remux.
const TARGET_CONTAINER: &str = "mp4";

/// Caller-requested quality tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QualitySelector {
    /// The sentinel "highest": best muxed rendition in the target container.
    Highest,
    /// A literal quality label ("720p") or opaque format token.
    Literal(String),
}

impl QualitySelector {
    pub fn parse(raw: &str) -> Self {
        if raw == "highest" {
            QualitySelector::Highest
        } else {
            QualitySelector::Literal(raw.to_owned())
        }
    }
}

/// Result of negotiation: either one concrete rendition or one capability
/// instruction for the extractor. Never both.
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadPlan {
    /// Stream exactly this rendition.
    Rendition(Rendition),
    /// No concrete match; ask the extractor for the best variant that
    /// carries both audio and video, remuxed if needed.
    BestMuxed,
    /// Audio downloads skip negotiation and always ask for the best audio.
    BestAudio,
}

impl DownloadPlan {
    /// The yt-dlp format specification that realizes this plan.
    pub fn format_spec(&self) -> String {
        match self {
            DownloadPlan::Rendition(rendition) => rendition.format_id.clone(),
            DownloadPlan::BestMuxed => "b".to_owned(),
            DownloadPlan::BestAudio => "ba/b".to_owned(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("no rendition matches the requested quality")]
    NoMatchingRendition,
}

/// Parses the leading integer run of a quality label; absence of leading
/// digits means 0. "1080p60" compares as 1080, "medium" as 0.
pub fn parse_quality_number(label: Option<&str>) -> u64 {
    let Some(label) = label else { return 0 };
    let digits: String = label.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(0)
}

/// Picks the video download plan for the requested quality.
///
/// "highest" restricts to muxed renditions in the target container, sorts
/// them by parsed quality descending (stable, so resolver order breaks
/// ties) and takes the first; an empty restricted set falls back to the
/// best-muxed capability plan. A literal selector requires an exact label
/// or format-token match among muxed renditions and fails otherwise,
/// leaving the fallback decision to the caller.
pub fn select_video(
    renditions: &[Rendition],
    selector: &QualitySelector,
) -> Result<DownloadPlan, SelectionError> {
    match selector {
        QualitySelector::Highest => {
            let mut candidates: Vec<&Rendition> = renditions
                .iter()
                .filter(|r| {
                    r.has_video
                        && r.has_audio
                        && r.container.as_deref() == Some(TARGET_CONTAINER)
                })
                .collect();
            candidates.sort_by_key(|r| {
                std::cmp::Reverse(parse_quality_number(r.quality_label.as_deref()))
            });

            Ok(match candidates.first() {
                Some(best) => DownloadPlan::Rendition((*best).clone()),
                None => DownloadPlan::BestMuxed,
            })
        }
        QualitySelector::Literal(wanted) => renditions
            .iter()
            .find(|r| {
                r.has_video
                    && r.has_audio
                    && (r.quality_label.as_deref() == Some(wanted) || r.format_id == *wanted)
            })
            .map(|r| DownloadPlan::Rendition(r.clone()))
            .ok_or(SelectionError::NoMatchingRendition),
    }
}

/// Audio requests have no quality negotiation; the extractor is always
/// asked for the best available audio.
pub fn select_audio() -> DownloadPlan {
    DownloadPlan::BestAudio
}
