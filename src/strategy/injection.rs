//! Injection placement: persist a durable instruction that the target
//! site's own tracking script executes later, out-of-process.

use crate::db::Repository;
use crate::domain::{Opportunity, PlacementInstruction, PlacementMethod, TargetUrl};
use crate::generate::{sanitize_anchor, SentenceGenerator, SentenceRequest};
use crate::strategy::PlacementResult;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Places a link by writing a PlacementInstruction for the client-side
/// executor. Success means the instruction is durably written; actual
/// placement happens later, so verification is always reported false.
#[derive(Debug)]
pub struct JsInjectionStrategy {
    repo: Arc<Repository>,
    generator: SentenceGenerator,
    max_sentence_chars: usize,
}

impl JsInjectionStrategy {
    pub fn new(
        repo: Arc<Repository>,
        generator: SentenceGenerator,
        max_sentence_chars: usize,
    ) -> Self {
        Self {
            repo,
            generator,
            max_sentence_chars,
        }
    }

    /// Upsert the instruction for this opportunity. Re-running never creates
    /// a duplicate row; the payload is refreshed in place.
    pub async fn place(
        &self,
        opportunity: &Opportunity,
        target_site_url: Option<&str>,
    ) -> PlacementResult {
        let started = Instant::now();
        let elapsed = |s: Instant| s.elapsed().as_millis() as i64;

        let target_url = match TargetUrl::parse(&opportunity.suggested_target_url) {
            Ok(url) => url,
            Err(e) => {
                return PlacementResult::failed(
                    PlacementMethod::JsInjection,
                    elapsed(started),
                    format!("invalid target URL: {}", e),
                )
            }
        };

        let anchor = sanitize_anchor(&opportunity.suggested_anchor_text);
        let request = SentenceRequest {
            anchor_text: opportunity.suggested_anchor_text.clone(),
            target_url: target_url.clone(),
            niche: None,
            keywords: opportunity.keywords(),
            page_title: None,
            page_excerpt: None,
            // Injected links are marked nofollow; the page owner never
            // editorially endorsed them.
            rel: "nofollow".to_string(),
            max_chars: self.max_sentence_chars,
        };
        let sentence = self.generator.generate(&request).await;

        let instruction = PlacementInstruction::new(
            opportunity.id,
            target_url.as_str().to_string(),
            anchor,
            sentence,
            opportunity.target_content_id,
        );

        if let Err(e) = self.repo.upsert_instruction(&instruction).await {
            return PlacementResult::failed(
                PlacementMethod::JsInjection,
                elapsed(started),
                format!("failed to persist instruction: {}", e),
            );
        }
        info!(
            opportunity_id = opportunity.id.as_i64(),
            token = %instruction.token,
            "placement instruction queued"
        );

        PlacementResult {
            success: true,
            method: PlacementMethod::JsInjection,
            placement_url: target_site_url.map(String::from),
            verification_success: false,
            response_time_ms: elapsed(started),
            error: None,
        }
    }
}
