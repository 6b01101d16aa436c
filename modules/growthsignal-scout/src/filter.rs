// Content filter: low-value rejection and keyword relevance.
// Pure functions over text. No I/O, no clock except what callers pass in.

use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use growthsignal_common::{ListenerResult, RawCandidate};

/// Trimmed text shorter than this is never worth storing.
pub const MIN_CONTENT_CHARS: usize = 20;

/// Posts with more hashtags than this read as promotional spam.
pub const MAX_HASHTAGS: usize = 6;

/// Extra occurrences of one phrase stop counting toward relevance past this.
const MAX_COUNTED_OCCURRENCES: usize = 10;

const JOB_MARKERS: &[&str] = &[
    "we're hiring",
    "we are hiring",
    "is hiring",
    "hiring a",
    "job opening",
    "job opportunity",
    "apply now",
    "#hiring",
    "salary range",
    "full-time position",
    "remote position",
    "join our team",
];

const SPAM_MARKERS: &[&str] = &[
    "dm me",
    "dm for",
    "click the link",
    "link in bio",
    "giveaway",
    "airdrop",
    "100x",
    "promo code",
    "use my code",
    "limited time offer",
    "follow for follow",
];

static HASHTAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"#\w+").expect("valid regex"));

/// True when the text is boilerplate (job ads, spam) or too short to act on.
pub fn is_low_value(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.chars().count() < MIN_CONTENT_CHARS {
        return true;
    }
    let lower = trimmed.to_lowercase();
    if JOB_MARKERS.iter().any(|m| lower.contains(m)) {
        return true;
    }
    if SPAM_MARKERS.iter().any(|m| lower.contains(m)) {
        return true;
    }
    HASHTAG_RE.find_iter(trimmed).count() > MAX_HASHTAGS
}

/// Keywords that occur in `text`, case-insensitively, in keyword-list order.
/// Blank phrases are ignored and a phrase repeated in the list is reported once.
pub fn matched_keywords<S: AsRef<str>>(text: &str, keywords: &[S]) -> Vec<String> {
    let lower = text.to_lowercase();
    let mut seen = HashSet::new();
    keywords
        .iter()
        .map(|k| k.as_ref().trim())
        .filter(|k| !k.is_empty())
        .filter(|k| lower.contains(&k.to_lowercase()))
        .filter(|k| seen.insert(k.to_lowercase()))
        .map(str::to_string)
        .collect()
}

/// Relevance of `text` to the keyword set. Zero iff nothing matched.
///
/// Each matched phrase contributes its word count (longer phrases are more
/// specific) plus one per extra occurrence, capped.
pub fn relevance_score<S: AsRef<str>>(text: &str, keywords: &[S]) -> f64 {
    let lower = text.to_lowercase();
    matched_keywords(text, keywords)
        .iter()
        .map(|phrase| {
            let needle = phrase.to_lowercase();
            let words = needle.split_whitespace().count().max(1);
            let occurrences = lower.matches(needle.as_str()).count();
            let extra = occurrences.saturating_sub(1).min(MAX_COUNTED_OCCURRENCES);
            (words + extra) as f64
        })
        .sum()
}

/// Flatten HTML (HN story and comment bodies) to whitespace-collapsed plain text.
pub fn strip_html(html: &str) -> String {
    let rendered = html2text::from_read(html.as_bytes(), 4096).unwrap_or_default();
    rendered.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Applies the filter contract every fetcher relies on: low-value text and
/// text without a single keyword match never become a [`ListenerResult`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentFilter;

impl ContentFilter {
    pub fn evaluate<S: AsRef<str>>(
        &self,
        candidate: RawCandidate,
        keywords: &[S],
        discovered_at: DateTime<Utc>,
    ) -> Option<ListenerResult> {
        if is_low_value(&candidate.content) {
            return None;
        }
        let matched = matched_keywords(&candidate.content, keywords);
        ListenerResult::new(candidate, matched, discovered_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use growthsignal_common::Platform;

    fn candidate(text: &str) -> RawCandidate {
        RawCandidate {
            platform: Platform::Reddit,
            external_id: "t3_abc".into(),
            external_url: "https://www.reddit.com/r/algotrading/comments/abc".into(),
            author_name: "someone".into(),
            author_handle: "someone".into(),
            content: text.into(),
            thread_context: None,
            posted_at: None,
        }
    }

    #[test]
    fn trading_bot_scenario_produces_one_result() {
        let keywords = ["trading bot", "LLM"];
        let text = "Looking for a trading bot recommendation";

        assert_eq!(matched_keywords(text, &keywords), vec!["trading bot"]);
        assert!(!is_low_value(text));

        let result = ContentFilter
            .evaluate(candidate(text), &keywords, Utc::now())
            .unwrap();
        assert_eq!(result.matched_keywords(), ["trading bot".to_string()]);
    }

    #[test]
    fn match_is_case_insensitive_and_in_keyword_order() {
        let keywords = ["llm", "Trading Bot", "rust"];
        let text = "My TRADING BOT now calls an LLM for signals";
        assert_eq!(matched_keywords(text, &keywords), vec!["llm", "Trading Bot"]);
    }

    #[test]
    fn blank_and_repeated_phrases_are_ignored() {
        let keywords = ["", "  ", "LLM", "llm"];
        assert_eq!(matched_keywords("which LLM is best", &keywords), vec!["LLM"]);
    }

    #[test]
    fn no_match_never_becomes_a_result() {
        let keywords = ["trading bot"];
        let text = "What is everyone's favourite mechanical keyboard?";
        assert!(matched_keywords(text, &keywords).is_empty());
        assert_eq!(relevance_score(text, &keywords), 0.0);
        assert!(ContentFilter
            .evaluate(candidate(text), &keywords, Utc::now())
            .is_none());
    }

    #[test]
    fn job_posts_and_spam_are_low_value() {
        assert!(is_low_value("We're hiring a senior engineer to build our trading bot"));
        assert!(is_low_value("Apply now for our remote position working on LLM tooling"));
        assert!(is_low_value("Huge giveaway for anyone who tries my trading bot today"));
        assert!(is_low_value("too short"));
        assert!(is_low_value(
            "trading bot #a #b #c #d #e #f #g for everyone out there"
        ));
    }

    #[test]
    fn low_value_text_is_dropped_even_with_a_keyword_match() {
        let text = "We are hiring! Build an LLM trading bot with us";
        assert!(ContentFilter
            .evaluate(candidate(text), &["LLM"], Utc::now())
            .is_none());
    }

    #[test]
    fn relevance_prefers_specific_phrases_and_repeats() {
        let keywords = ["bot", "trading bot"];
        let single = relevance_score("a bot is just a bot here", &["bot"]);
        let phrase = relevance_score("a trading bot for crypto markets", &["trading bot"]);
        assert_eq!(single, 2.0);
        assert_eq!(phrase, 2.0);
        assert_eq!(relevance_score("my trading bot", &keywords), 3.0);
    }

    #[test]
    fn filter_is_deterministic() {
        let keywords = ["LLM", "agents"];
        let text = "Which LLM works best for coding agents these days?";
        let a = matched_keywords(text, &keywords);
        let b = matched_keywords(text, &keywords);
        assert_eq!(a, b);
        assert_eq!(relevance_score(text, &keywords), relevance_score(text, &keywords));
    }

    #[test]
    fn strip_html_flattens_markup() {
        let html = "<p>Anyone tried an <i>LLM</i> trading bot?</p><p>Curious &amp; skeptical</p>";
        let text = strip_html(html);
        assert!(text.contains("Anyone tried an"));
        assert!(text.contains("LLM"));
        assert!(text.contains("Curious & skeptical"));
        assert!(!text.contains('<'));
        assert!(!text.contains('\n'));
    }
}
