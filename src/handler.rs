use tracing::info;

use crate::core::{Decision, ImageReview};
use crate::decision;
use crate::engine::Engine;
use crate::scanner::Scanner;

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("Failed to unmarshal JSON: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Turns a review request into a decision. Holds no per-request state, so one
/// instance can serve any number of requests and be called without a listener.
pub struct ReviewHandler<S> {
    engine: Engine<S>,
}

impl<S: Scanner> ReviewHandler<S> {
    pub fn new(engine: Engine<S>) -> Self {
        Self { engine }
    }

    pub fn handle(&self, body: &[u8]) -> Result<Decision, HandlerError> {
        let review = parse_review(body)?;
        Ok(self.handle_review(&review))
    }

    pub fn handle_review(&self, review: &ImageReview) -> Decision {
        let images = review.images();
        info!(
            namespace = %review.spec.namespace,
            images = images.len(),
            threshold = %self.engine.threshold(),
            "レビュー要求を受け付けました"
        );

        let result = self.engine.aggregate(&images);
        let decision = decision::render(&result);

        info!(
            allowed = decision.is_allowed(),
            reason = decision.reason().unwrap_or(""),
            "判定を返します"
        );
        decision
    }
}

pub fn parse_review(body: &[u8]) -> Result<ImageReview, HandlerError> {
    Ok(serde_json::from_slice(body)?)
}
