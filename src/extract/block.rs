//! Block-page detection
//!
//! An empty result page is either the end of pagination or an anti-bot
//! interstitial. The difference is decided by a predicate over the page
//! text, which is swappable because the markers change often.

/// Decides whether a page is an anti-bot block page
pub trait BlockCheck: Send + Sync {
    /// Returns the marker that identified the page as blocked, if any
    fn blocked_marker(&self, page_text: &str) -> Option<String>;

    fn is_blocked(&self, page_text: &str) -> bool {
        self.blocked_marker(page_text).is_some()
    }
}

impl<F> BlockCheck for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn blocked_marker(&self, page_text: &str) -> Option<String> {
        self(page_text).then(|| "custom predicate".to_string())
    }
}

/// Marker-list block detector (case-insensitive substring match)
#[derive(Debug, Clone)]
pub struct BlockDetector {
    markers: Vec<String>,
}

impl BlockDetector {
    pub const DEFAULT_MARKERS: &'static [&'static str] = &[
        "Incapsula",
        "Access Denied",
        "Request unsuccessful",
        "bot protection",
        "captcha",
    ];

    pub fn new<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            markers: markers
                .into_iter()
                .map(|m| m.as_ref().to_lowercase())
                .filter(|m| !m.is_empty())
                .collect(),
        }
    }
}

impl Default for BlockDetector {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MARKERS)
    }
}

impl BlockCheck for BlockDetector {
    fn blocked_marker(&self, page_text: &str) -> Option<String> {
        let lower = page_text.to_lowercase();
        self.markers
            .iter()
            .find(|marker| lower.contains(marker.as_str()))
            .cloned()
    }
}
