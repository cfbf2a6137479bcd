//! Content-API placement: edit a post on the target's WordPress site
//! through its REST surface and verify the link went live.

use crate::domain::{Opportunity, PlacementMethod, TargetUrl, WpCredentials};
use crate::generate::{SentenceGenerator, SentenceRequest};
use crate::strategy::PlacementResult;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Error type for content API operations.
#[derive(Debug, Clone, Error)]
pub enum ContentApiError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },
    #[error("Parse error: {0}")]
    Parse(String),
}

/// A published post as returned by the content API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WpPost {
    pub id: i64,
    pub link: String,
    pub title: String,
    pub content_html: String,
}

/// The target site's content-management REST surface.
///
/// One call per operation, no retries; failures are terminal for the
/// attempt in this run.
#[async_trait]
pub trait ContentApi: Send + Sync + fmt::Debug {
    /// Most recent published posts, newest first.
    async fn list_recent_posts(
        &self,
        site_url: &str,
        creds: &WpCredentials,
        per_page: u32,
    ) -> Result<Vec<WpPost>, ContentApiError>;

    /// Replace a post's body content through an authenticated update.
    async fn update_post_content(
        &self,
        site_url: &str,
        creds: &WpCredentials,
        post_id: i64,
        content_html: &str,
    ) -> Result<(), ContentApiError>;

    /// Fetch the rendered public page, used for live verification.
    async fn fetch_rendered(&self, url: &str) -> Result<String, ContentApiError>;
}

/// Production client over reqwest with basic-auth application passwords.
#[derive(Debug, Clone)]
pub struct WpRestClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl WpRestClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WpPostDto {
    id: i64,
    link: String,
    title: WpRendered,
    content: WpRendered,
}

#[derive(Debug, Deserialize)]
struct WpRendered {
    rendered: String,
}

#[async_trait]
impl ContentApi for WpRestClient {
    async fn list_recent_posts(
        &self,
        site_url: &str,
        creds: &WpCredentials,
        per_page: u32,
    ) -> Result<Vec<WpPost>, ContentApiError> {
        let url = format!(
            "{}/wp-json/wp/v2/posts?status=publish&per_page={}",
            site_url.trim_end_matches('/'),
            per_page
        );
        debug!(%url, "listing recent posts");

        let response = self
            .client
            .get(&url)
            .basic_auth(&creds.username, Some(&creds.app_password))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ContentApiError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ContentApiError::Http {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let dtos: Vec<WpPostDto> = response
            .json()
            .await
            .map_err(|e| ContentApiError::Parse(e.to_string()))?;

        Ok(dtos
            .into_iter()
            .map(|dto| WpPost {
                id: dto.id,
                link: dto.link,
                title: dto.title.rendered,
                content_html: dto.content.rendered,
            })
            .collect())
    }

    async fn update_post_content(
        &self,
        site_url: &str,
        creds: &WpCredentials,
        post_id: i64,
        content_html: &str,
    ) -> Result<(), ContentApiError> {
        let url = format!(
            "{}/wp-json/wp/v2/posts/{}",
            site_url.trim_end_matches('/'),
            post_id
        );

        let response = self
            .client
            .post(&url)
            .basic_auth(&creds.username, Some(&creds.app_password))
            .timeout(self.timeout)
            .json(&serde_json::json!({ "content": content_html }))
            .send()
            .await
            .map_err(|e| ContentApiError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ContentApiError::Http {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }

    async fn fetch_rendered(&self, url: &str) -> Result<String, ContentApiError> {
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ContentApiError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ContentApiError::Http {
                status: status.as_u16(),
                message: String::new(),
            });
        }
        response
            .text()
            .await
            .map_err(|e| ContentApiError::Network(e.to_string()))
    }
}

/// Mock content API with canned posts and programmable failures.
#[derive(Debug, Default)]
pub struct MockContentApi {
    posts: Vec<WpPost>,
    list_error: Option<String>,
    update_error: Option<String>,
    render_error: Option<String>,
    rendered: HashMap<String, String>,
    serve_updates: bool,
    updates: Mutex<Vec<(i64, String)>>,
}

impl MockContentApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_posts(mut self, posts: Vec<WpPost>) -> Self {
        self.posts = posts;
        self
    }

    /// Listing fails with the given message.
    pub fn failing_list(mut self, message: &str) -> Self {
        self.list_error = Some(message.to_string());
        self
    }

    /// Updates fail with the given message.
    pub fn failing_update(mut self, message: &str) -> Self {
        self.update_error = Some(message.to_string());
        self
    }

    /// Verification fetches fail with the given message.
    pub fn failing_render(mut self, message: &str) -> Self {
        self.render_error = Some(message.to_string());
        self
    }

    /// Serve a fixed rendered page for a URL.
    pub fn with_rendered(mut self, url: &str, html: &str) -> Self {
        self.rendered.insert(url.to_string(), html.to_string());
        self
    }

    /// Verification fetches reflect the most recent update for the post.
    pub fn serving_updates(mut self) -> Self {
        self.serve_updates = true;
        self
    }

    /// Updates recorded so far, in order.
    pub fn updates(&self) -> Vec<(i64, String)> {
        self.updates.lock().expect("mock lock").clone()
    }
}

#[async_trait]
impl ContentApi for MockContentApi {
    async fn list_recent_posts(
        &self,
        _site_url: &str,
        _creds: &WpCredentials,
        per_page: u32,
    ) -> Result<Vec<WpPost>, ContentApiError> {
        if let Some(message) = &self.list_error {
            return Err(ContentApiError::Network(message.clone()));
        }
        Ok(self.posts.iter().take(per_page as usize).cloned().collect())
    }

    async fn update_post_content(
        &self,
        _site_url: &str,
        _creds: &WpCredentials,
        post_id: i64,
        content_html: &str,
    ) -> Result<(), ContentApiError> {
        if let Some(message) = &self.update_error {
            return Err(ContentApiError::Http {
                status: 500,
                message: message.clone(),
            });
        }
        self.updates
            .lock()
            .expect("mock lock")
            .push((post_id, content_html.to_string()));
        Ok(())
    }

    async fn fetch_rendered(&self, url: &str) -> Result<String, ContentApiError> {
        if let Some(message) = &self.render_error {
            return Err(ContentApiError::Http {
                status: 500,
                message: message.clone(),
            });
        }
        if self.serve_updates {
            if let Some(post) = self.posts.iter().find(|p| p.link == url) {
                let updates = self.updates.lock().expect("mock lock");
                if let Some((_, content)) = updates.iter().rev().find(|(id, _)| *id == post.id) {
                    return Ok(content.clone());
                }
            }
        }
        self.rendered
            .get(url)
            .cloned()
            .ok_or(ContentApiError::Http {
                status: 404,
                message: String::new(),
            })
    }
}

// ---- content scoring ----

/// Replace tags with spaces so word counts stay meaningful.
pub fn strip_tags(html: &str) -> String {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("tag regex"));
    re.replace_all(html, " ").to_string()
}

/// Split post body into paragraph segments. HTML bodies split on `</p>`
/// (keeping the close tag with its paragraph); plain bodies on blank lines.
pub fn split_paragraphs(content: &str) -> Vec<String> {
    let parts: Vec<String> = if content.contains("</p>") {
        content
            .split_inclusive("</p>")
            .map(|p| p.to_string())
            .collect()
    } else {
        content.split("\n\n").map(|p| p.to_string()).collect()
    };
    parts
        .into_iter()
        .filter(|p| !strip_tags(p).trim().is_empty())
        .collect()
}

/// Score one paragraph as an insertion point: +2 per keyword hit, +1 when
/// the word count sits in the 20-100 sweet spot, -2 when it already carries
/// a hyperlink.
pub fn paragraph_score(paragraph: &str, keywords: &[String]) -> i32 {
    let text = strip_tags(paragraph).to_lowercase();
    let mut score = 0;

    for keyword in keywords {
        if text.contains(keyword.as_str()) {
            score += 2;
        }
    }

    let words = text.split_whitespace().count();
    if (20..=100).contains(&words) {
        score += 1;
    }

    if paragraph.to_lowercase().contains("<a ") {
        score -= 2;
    }

    score
}

fn keyword_hits(content: &str, keywords: &[String]) -> usize {
    let text = strip_tags(content).to_lowercase();
    keywords.iter().filter(|k| text.contains(k.as_str())).count()
}

/// Chosen insertion point: post index plus paragraph index within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertionPoint {
    pub post_index: usize,
    pub paragraph_index: usize,
}

/// Pick the best post and the best non-first, non-last paragraph in it.
///
/// Posts need at least three paragraphs to be insertable (intros and
/// conclusions are never touched). With no keyword overlap anywhere the
/// most recent insertable post wins.
pub fn choose_insertion(posts: &[WpPost], keywords: &[String]) -> Option<InsertionPoint> {
    let mut best: Option<(i32, usize)> = None;
    let mut any_keyword_hit = false;

    for (post_index, post) in posts.iter().enumerate() {
        let paragraphs = split_paragraphs(&post.content_html);
        if paragraphs.len() < 3 {
            continue;
        }
        if keyword_hits(&post.content_html, keywords) > 0 {
            any_keyword_hit = true;
        }
        let post_score: i32 = paragraphs
            .iter()
            .map(|p| paragraph_score(p, keywords))
            .sum();
        let better = match best {
            Some((score, _)) => post_score > score,
            None => true,
        };
        if better {
            best = Some((post_score, post_index));
        }
    }

    let (_, mut post_index) = best?;
    if !any_keyword_hit {
        // No overlap anywhere: default to the most recent insertable post.
        post_index = posts
            .iter()
            .position(|p| split_paragraphs(&p.content_html).len() >= 3)?;
    }

    let paragraphs = split_paragraphs(&posts[post_index].content_html);
    let paragraph_index = (1..paragraphs.len() - 1)
        .max_by_key(|&i| (paragraph_score(&paragraphs[i], keywords), usize::MAX - i))?;

    Some(InsertionPoint {
        post_index,
        paragraph_index,
    })
}

/// Append the sentence to the chosen paragraph and reassemble the body.
pub fn insert_sentence(content: &str, paragraph_index: usize, sentence: &str) -> String {
    let paragraphs = split_paragraphs(content);
    let mut out = Vec::with_capacity(paragraphs.len());
    for (i, paragraph) in paragraphs.iter().enumerate() {
        if i == paragraph_index {
            if paragraph.ends_with("</p>") {
                let body = &paragraph[..paragraph.len() - "</p>".len()];
                out.push(format!("{} {}</p>", body.trim_end(), sentence));
            } else {
                out.push(format!("{} {}", paragraph.trim_end(), sentence));
            }
        } else {
            out.push(paragraph.clone());
        }
    }
    if content.contains("</p>") {
        out.concat()
    } else {
        out.join("\n\n")
    }
}

// ---- the strategy itself ----

/// Places a link by editing the target's own content through its API.
#[derive(Debug)]
pub struct WordPressStrategy {
    api: std::sync::Arc<dyn ContentApi>,
    generator: SentenceGenerator,
    recent_posts: u32,
    verification_delay: Duration,
    max_sentence_chars: usize,
}

impl WordPressStrategy {
    pub fn new(
        api: std::sync::Arc<dyn ContentApi>,
        generator: SentenceGenerator,
        recent_posts: u32,
        verification_delay: Duration,
        max_sentence_chars: usize,
    ) -> Self {
        Self {
            api,
            generator,
            recent_posts,
            verification_delay,
            max_sentence_chars,
        }
    }

    /// Run the full fetch-score-insert-update-verify pipeline.
    ///
    /// An update that lands but cannot be verified is still a success;
    /// `verification_success` carries the difference.
    pub async fn place(
        &self,
        opportunity: &Opportunity,
        site_url: &str,
        creds: &WpCredentials,
    ) -> PlacementResult {
        let started = Instant::now();
        let elapsed = |s: Instant| s.elapsed().as_millis() as i64;

        let target_url = match TargetUrl::parse(&opportunity.suggested_target_url) {
            Ok(url) => url,
            Err(e) => {
                return PlacementResult::failed(
                    PlacementMethod::ContentApi,
                    elapsed(started),
                    format!("invalid target URL: {}", e),
                )
            }
        };

        let posts = match self
            .api
            .list_recent_posts(site_url, creds, self.recent_posts)
            .await
        {
            Ok(posts) => posts,
            Err(e) => {
                return PlacementResult::failed(
                    PlacementMethod::ContentApi,
                    elapsed(started),
                    e.to_string(),
                )
            }
        };
        if posts.is_empty() {
            return PlacementResult::failed(
                PlacementMethod::ContentApi,
                elapsed(started),
                "no published posts on target site".to_string(),
            );
        }

        let keywords = opportunity.keywords();
        let Some(point) = choose_insertion(&posts, &keywords) else {
            return PlacementResult::failed(
                PlacementMethod::ContentApi,
                elapsed(started),
                "no insertable post found".to_string(),
            );
        };
        let post = &posts[point.post_index];
        let paragraphs = split_paragraphs(&post.content_html);

        let request = SentenceRequest {
            anchor_text: opportunity.suggested_anchor_text.clone(),
            target_url: target_url.clone(),
            niche: None,
            keywords,
            page_title: Some(strip_tags(&post.title).trim().to_string()),
            page_excerpt: Some(
                strip_tags(&paragraphs[point.paragraph_index])
                    .trim()
                    .to_string(),
            ),
            rel: String::new(),
            max_chars: self.max_sentence_chars,
        };
        let sentence = self.generator.generate(&request).await;

        let updated_body = insert_sentence(&post.content_html, point.paragraph_index, &sentence);
        if let Err(e) = self
            .api
            .update_post_content(site_url, creds, post.id, &updated_body)
            .await
        {
            return PlacementResult::failed(
                PlacementMethod::ContentApi,
                elapsed(started),
                e.to_string(),
            );
        }
        info!(
            opportunity_id = opportunity.id.as_i64(),
            post_id = post.id,
            "content updated, verifying"
        );

        // Let upstream caches settle before checking visibility.
        tokio::time::sleep(self.verification_delay).await;
        let verified = self.verify_link(&post.link, &target_url).await;

        PlacementResult::succeeded(
            PlacementMethod::ContentApi,
            post.link.clone(),
            verified,
            elapsed(started),
        )
    }

    async fn verify_link(&self, page_url: &str, target_url: &TargetUrl) -> bool {
        match self.api.fetch_rendered(page_url).await {
            Ok(html) => {
                let pattern = format!(r#"href=["']{}["']"#, regex::escape(target_url.as_str()));
                match Regex::new(&pattern) {
                    Ok(re) => re.is_match(&html),
                    Err(_) => false,
                }
            }
            Err(e) => {
                warn!(%page_url, error = %e, "verification fetch failed");
                false
            }
        }
    }
}
