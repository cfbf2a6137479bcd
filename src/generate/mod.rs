//! Contextual sentence generation around an anchor link.
//!
//! Two tiers: an AI completion produces the candidate sentence, but its
//! output is an untrusted input channel — the expected anchor is located by
//! regex keyed on the validated href, the visible text is matched exactly,
//! and the final snippet is rebuilt from HTML-escaped parts. Anything that
//! fails validation falls through to a fixed set of deterministic templates,
//! so generation as a whole never fails and never emits foreign markup.

pub mod ai;

pub use ai::{AiError, ChatCompletionClient, MockSentenceModel, SentenceModel};

use crate::domain::TargetUrl;
use regex::Regex;
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tracing::warn;

/// Hard cap applied to anchor text before either generation path runs.
pub const MAX_ANCHOR_CHARS: usize = 80;

/// Everything the generator needs to produce one snippet.
#[derive(Debug, Clone)]
pub struct SentenceRequest {
    pub anchor_text: String,
    pub target_url: TargetUrl,
    pub niche: Option<String>,
    pub keywords: Vec<String>,
    pub page_title: Option<String>,
    pub page_excerpt: Option<String>,
    /// rel attribute for the anchor, empty for none.
    pub rel: String,
    pub max_chars: usize,
}

/// Why a model response was rejected. Recovered locally, never surfaced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SentenceRejection {
    #[error("no anchor tag found")]
    NoAnchor,
    #[error("more than one anchor tag")]
    MultipleAnchors,
    #[error("anchor href {0:?} does not match the target URL")]
    WrongHref(String),
    #[error("anchor text {0:?} does not match")]
    WrongAnchorText(String),
    #[error("markup outside the anchor tag")]
    StrayMarkup,
    #[error("contains an exclamation mark")]
    ContainsExclamation,
    #[error("more than one sentence")]
    TooManySentences,
    #[error("longer than {0} characters")]
    TooLong(usize),
}

fn anchor_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<a\s[^>]*>(.*?)</a>").expect("anchor regex"))
}

fn href_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"href\s*=\s*["']([^"']*)["']"#).expect("href regex"))
}

/// Strip newlines and angle brackets, collapse whitespace runs, cap length.
/// Runs before either generation path.
pub fn sanitize_anchor(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .filter(|c| !matches!(c, '<' | '>'))
        .collect();
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(MAX_ANCHOR_CHARS).collect()
}

/// Minimal HTML entity escaping for text nodes and attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Build the one trusted anchor tag from already-validated parts.
pub fn anchor_html(url: &TargetUrl, anchor: &str, rel: &str) -> String {
    if rel.is_empty() {
        format!("<a href=\"{}\">{}</a>", url.as_str(), escape_html(anchor))
    } else {
        format!(
            "<a href=\"{}\" rel=\"{}\">{}</a>",
            url.as_str(),
            escape_html(rel),
            escape_html(anchor)
        )
    }
}

/// Validate a model response and rebuild the snippet from sanitized parts.
///
/// The response is never trusted as HTML: only the expected anchor survives,
/// and only when its href and visible text match exactly; all surrounding
/// text is entity-escaped in the rebuilt snippet.
///
/// # Errors
/// Returns the reason the response was rejected; callers fall back to the
/// deterministic templates.
pub fn validate_model_sentence(
    raw: &str,
    url: &TargetUrl,
    anchor: &str,
    rel: &str,
    max_chars: usize,
) -> Result<String, SentenceRejection> {
    let trimmed = raw.trim();

    let mut captures_iter = anchor_re().captures_iter(trimmed);
    let captures = captures_iter.next().ok_or(SentenceRejection::NoAnchor)?;
    if captures_iter.next().is_some() {
        return Err(SentenceRejection::MultipleAnchors);
    }

    let full = captures.get(0).expect("match 0 always present");
    let visible = captures.get(1).map(|m| m.as_str()).unwrap_or_default();

    let href = href_re()
        .captures(full.as_str())
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or_default();
    if href != url.as_str() {
        return Err(SentenceRejection::WrongHref(href.to_string()));
    }
    if visible.trim() != anchor {
        return Err(SentenceRejection::WrongAnchorText(visible.to_string()));
    }

    let before = &trimmed[..full.start()];
    let after = &trimmed[full.end()..];
    if before.contains(['<', '>']) || after.contains(['<', '>']) {
        return Err(SentenceRejection::StrayMarkup);
    }

    let visible_text = format!("{}{}{}", before, visible, after);
    if visible_text.contains('!') {
        return Err(SentenceRejection::ContainsExclamation);
    }
    if visible_text.matches(['.', '?']).count() > 1 {
        return Err(SentenceRejection::TooManySentences);
    }

    let rebuilt = format!(
        "{}{}{}",
        escape_html(before),
        anchor_html(url, anchor, rel),
        escape_html(after)
    );
    if rebuilt.chars().count() > max_chars {
        return Err(SentenceRejection::TooLong(max_chars));
    }

    Ok(rebuilt)
}

const FALLBACK_TEMPLATES: &[&str] = &[
    "For a closer look at {topic}, {anchor} is a solid starting point.",
    "Readers who care about {topic} will find {anchor} worth their time.",
    "More practical guidance on {topic} can be found in {anchor}.",
    "When {topic} comes up, {anchor} covers the details.",
];

fn sanitize_topic(request: &SentenceRequest) -> String {
    let raw = request
        .keywords
        .first()
        .cloned()
        .or_else(|| request.niche.clone())
        .unwrap_or_else(|| "this topic".to_string());
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | '!' | '.' | '?'))
        .collect();
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        "this topic".to_string()
    } else {
        escape_html(&collapsed)
    }
}

/// Deterministic template sentence. Template choice keys off the anchor
/// length so repeated runs for the same opportunity produce the same text.
pub fn fallback_sentence(request: &SentenceRequest, anchor: &str) -> String {
    let link = anchor_html(&request.target_url, anchor, &request.rel);
    let topic = sanitize_topic(request);

    let template = FALLBACK_TEMPLATES[anchor.len() % FALLBACK_TEMPLATES.len()];
    let sentence = template.replace("{topic}", &topic).replace("{anchor}", &link);
    if sentence.chars().count() <= request.max_chars {
        return sentence;
    }

    let short = format!("See {} for more on {}.", link, topic);
    if short.chars().count() <= request.max_chars {
        return short;
    }
    link
}

/// Two-tier sentence generator. With no model configured it is
/// fallback-only and fully deterministic.
#[derive(Debug, Clone)]
pub struct SentenceGenerator {
    model: Option<Arc<dyn SentenceModel>>,
}

impl SentenceGenerator {
    pub fn new(model: Option<Arc<dyn SentenceModel>>) -> Self {
        Self { model }
    }

    pub fn disabled() -> Self {
        Self { model: None }
    }

    /// Produce one snippet satisfying the anchor-integrity contract:
    /// exactly one anchor tag, href equal to the validated URL, visible text
    /// equal to the sanitized anchor, no `!`, at most one sentence, under
    /// the length cap.
    pub async fn generate(&self, request: &SentenceRequest) -> String {
        let anchor = sanitize_anchor(&request.anchor_text);

        if let Some(model) = &self.model {
            let system = system_prompt(request.max_chars);
            let user = user_prompt(request, &anchor);
            match model.complete(&system, &user).await {
                Ok(raw) => match validate_model_sentence(
                    &raw,
                    &request.target_url,
                    &anchor,
                    &request.rel,
                    request.max_chars,
                ) {
                    Ok(snippet) => return snippet,
                    Err(rejection) => {
                        warn!(%rejection, "model sentence rejected, using template");
                    }
                },
                Err(e) => {
                    warn!(error = %e, "sentence model unavailable, using template");
                }
            }
        }

        fallback_sentence(request, &anchor)
    }
}

fn system_prompt(max_chars: usize) -> String {
    format!(
        "You write a single natural English sentence that recommends a linked \
         resource in passing. Respond with the sentence only, no preamble. The \
         sentence must contain exactly one HTML anchor tag whose href is the \
         given URL and whose text is the given anchor text, must be shorter \
         than {} characters, must contain no exclamation marks, and must be \
         one sentence.",
        max_chars
    )
}

fn user_prompt(request: &SentenceRequest, anchor: &str) -> String {
    let mut lines = vec![
        format!("Anchor text: {}", anchor),
        format!("URL: {}", request.target_url),
    ];
    if let Some(niche) = &request.niche {
        lines.push(format!("Site niche: {}", niche));
    }
    if !request.keywords.is_empty() {
        lines.push(format!("Keywords: {}", request.keywords.join(", ")));
    }
    if let Some(title) = &request.page_title {
        lines.push(format!("Surrounding page title: {}", title));
    }
    if let Some(excerpt) = &request.page_excerpt {
        lines.push(format!("Surrounding paragraph: {}", excerpt));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(url: &str, anchor: &str) -> SentenceRequest {
        SentenceRequest {
            anchor_text: anchor.to_string(),
            target_url: TargetUrl::parse(url).unwrap(),
            niche: Some("digital marketing".to_string()),
            keywords: vec!["seo".to_string(), "backlinks".to_string()],
            page_title: None,
            page_excerpt: None,
            rel: String::new(),
            max_chars: 300,
        }
    }

    /// Anchor-integrity contract checked across every test below.
    fn assert_anchor_integrity(snippet: &str, url: &str, anchor: &str) {
        let captures: Vec<_> = anchor_re().captures_iter(snippet).collect();
        assert_eq!(captures.len(), 1, "exactly one anchor in {:?}", snippet);
        let full = captures[0].get(0).unwrap().as_str();
        let href = href_re().captures(full).unwrap().get(1).unwrap().as_str();
        assert_eq!(href, url);
        assert_eq!(captures[0].get(1).unwrap().as_str(), escape_html(anchor));
        assert!(!snippet.contains('!'), "no exclamation in {:?}", snippet);
        assert!(snippet.chars().count() <= 300);
    }

    #[test]
    fn test_sanitize_anchor_strips_markup_and_newlines() {
        assert_eq!(sanitize_anchor("SEO\nguide"), "SEO guide");
        assert_eq!(sanitize_anchor("a <b>bold</b> claim"), "a bbold/b claim");
        assert_eq!(sanitize_anchor("  spaced   out  "), "spaced out");
    }

    #[test]
    fn test_sanitize_anchor_caps_length() {
        let long = "x".repeat(500);
        assert_eq!(sanitize_anchor(&long).len(), MAX_ANCHOR_CHARS);
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">&'"#),
            "&lt;a href=&quot;x&quot;&gt;&amp;&#39;"
        );
    }

    #[test]
    fn test_accepts_well_formed_model_sentence() {
        let url = TargetUrl::parse("https://good.com/page").unwrap();
        let raw = r#"Anyone starting out should read <a href="https://good.com/page">SEO guide</a> before building links."#;
        let snippet = validate_model_sentence(raw, &url, "SEO guide", "", 300).unwrap();
        assert_anchor_integrity(&snippet, "https://good.com/page", "SEO guide");
        assert!(snippet.starts_with("Anyone starting out"));
    }

    #[test]
    fn test_rejects_wrong_href() {
        let url = TargetUrl::parse("https://good.com/page").unwrap();
        let raw = r#"<a href='https://evil.com'>SEO guide</a> now"#;
        assert!(matches!(
            validate_model_sentence(raw, &url, "SEO guide", "", 300),
            Err(SentenceRejection::WrongHref(_))
        ));
    }

    #[test]
    fn test_rejects_wrong_anchor_text() {
        let url = TargetUrl::parse("https://good.com/page").unwrap();
        let raw = r#"<a href="https://good.com/page">click here</a>"#;
        assert!(matches!(
            validate_model_sentence(raw, &url, "SEO guide", "", 300),
            Err(SentenceRejection::WrongAnchorText(_))
        ));
    }

    #[test]
    fn test_rejects_multiple_anchors() {
        let url = TargetUrl::parse("https://good.com/page").unwrap();
        let raw = r#"<a href="https://good.com/page">SEO guide</a> and <a href="https://good.com/page">again</a>"#;
        assert_eq!(
            validate_model_sentence(raw, &url, "SEO guide", "", 300),
            Err(SentenceRejection::MultipleAnchors)
        );
    }

    #[test]
    fn test_rejects_stray_markup() {
        let url = TargetUrl::parse("https://good.com/page").unwrap();
        let raw = r#"<script>x</script> <a href="https://good.com/page">SEO guide</a>"#;
        assert_eq!(
            validate_model_sentence(raw, &url, "SEO guide", "", 300),
            Err(SentenceRejection::StrayMarkup)
        );
    }

    #[test]
    fn test_rejects_exclamation_and_multi_sentence() {
        let url = TargetUrl::parse("https://good.com/page").unwrap();
        assert_eq!(
            validate_model_sentence(
                r#"Read <a href="https://good.com/page">SEO guide</a> today!"#,
                &url,
                "SEO guide",
                "",
                300
            ),
            Err(SentenceRejection::ContainsExclamation)
        );
        assert_eq!(
            validate_model_sentence(
                r#"Read <a href="https://good.com/page">SEO guide</a>. It is great. Really."#,
                &url,
                "SEO guide",
                "",
                300
            ),
            Err(SentenceRejection::TooManySentences)
        );
    }

    #[test]
    fn test_rejects_overlong() {
        let url = TargetUrl::parse("https://good.com/page").unwrap();
        let padding = "very ".repeat(80);
        let raw = format!(
            r#"{}<a href="https://good.com/page">SEO guide</a>"#,
            padding
        );
        assert_eq!(
            validate_model_sentence(&raw, &url, "SEO guide", "", 300),
            Err(SentenceRejection::TooLong(300))
        );
    }

    #[test]
    fn test_fallback_satisfies_anchor_integrity() {
        let s = request("https://good.com/page", "SEO guide");
        let snippet = fallback_sentence(&s, "SEO guide");
        assert_anchor_integrity(&snippet, "https://good.com/page", "SEO guide");
    }

    #[test]
    fn test_fallback_is_deterministic() {
        let s = request("https://good.com/page", "SEO guide");
        assert_eq!(
            fallback_sentence(&s, "SEO guide"),
            fallback_sentence(&s, "SEO guide")
        );
    }

    #[test]
    fn test_fallback_respects_rel() {
        let mut s = request("https://good.com/page", "SEO guide");
        s.rel = "nofollow".to_string();
        let snippet = fallback_sentence(&s, "SEO guide");
        assert!(snippet.contains(r#"rel="nofollow""#));
    }

    #[tokio::test]
    async fn test_generator_uses_valid_model_output() {
        let model = MockSentenceModel::returning(
            r#"Start with <a href="https://good.com/page">SEO guide</a> before anything else."#,
        );
        let generator = SentenceGenerator::new(Some(Arc::new(model)));
        let s = request("https://good.com/page", "SEO guide");

        let snippet = generator.generate(&s).await;
        assert!(snippet.starts_with("Start with"));
        assert_anchor_integrity(&snippet, "https://good.com/page", "SEO guide");
    }

    #[tokio::test]
    async fn test_generator_scenario_hostile_model_output() {
        // Wrong href, wrong text, exclamation mark: every check trips.
        let model = MockSentenceModel::returning("<a href='evil.com'>click</a> now!");
        let generator = SentenceGenerator::new(Some(Arc::new(model)));
        let s = request("https://good.com/page", "SEO guide");

        let snippet = generator.generate(&s).await;
        assert_anchor_integrity(&snippet, "https://good.com/page", "SEO guide");
    }

    #[tokio::test]
    async fn test_generator_survives_model_failure() {
        let model = MockSentenceModel::failing("connection refused");
        let generator = SentenceGenerator::new(Some(Arc::new(model)));
        let s = request("https://good.com/page", "SEO guide");

        let snippet = generator.generate(&s).await;
        assert_anchor_integrity(&snippet, "https://good.com/page", "SEO guide");
    }

    #[tokio::test]
    async fn test_generator_fuzzes_malformed_model_output() {
        // None of these survive validation; all must land on the fallback.
        let malformed = [
            "",
            "no anchor at all",
            "<a>missing href</a>",
            "<a href=\"https://good.com/page\">SEO guide</a><script>alert(1)</script>",
            "<a href=\"https://good.com/page\">SEO guide",
            "plain text with <b>markup</b>",
            "<a href=\"javascript:alert(1)\">SEO guide</a>",
            "<A HREF=\"https://other.com\">SEO guide</A>",
        ];
        let s = request("https://good.com/page", "SEO guide");
        for raw in malformed {
            let generator =
                SentenceGenerator::new(Some(Arc::new(MockSentenceModel::returning(raw))));
            let snippet = generator.generate(&s).await;
            assert_anchor_integrity(&snippet, "https://good.com/page", "SEO guide");
        }
    }

    #[tokio::test]
    async fn test_disabled_generator_is_fallback_only() {
        let generator = SentenceGenerator::disabled();
        let s = request("https://good.com/page", "SEO guide");
        let snippet = generator.generate(&s).await;
        assert_eq!(snippet, fallback_sentence(&s, "SEO guide"));
    }

    #[tokio::test]
    async fn test_generator_sanitizes_anchor_before_both_paths() {
        let generator = SentenceGenerator::disabled();
        let mut s = request("https://good.com/page", "SEO guide");
        s.anchor_text = "SEO\n<b>guide</b>".to_string();
        let snippet = generator.generate(&s).await;
        assert_anchor_integrity(&snippet, "https://good.com/page", "SEO bguide/b");
    }
}
