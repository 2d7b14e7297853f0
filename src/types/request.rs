//! Generation Request
//!
//! The immutable description of one generation run: who is asking, which
//! model, the prompt, and any refinement context from a previous round.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Inline image attachment forwarded to multimodal providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageAttachment {
    /// Media type, e.g. "image/png"
    pub media_type: String,
    /// Base64-encoded image data
    pub data: String,
}

/// A single UI-generation request. Immutable once submitted; the request
/// owns its token stream for its lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Unique request id, carried through logs, events, and errors
    pub request_id: Uuid,
    /// Resolved user identifier (supplied by the session collaborator)
    pub user_id: String,
    /// Target model identifier, resolved through the provider router
    pub model: String,
    /// Natural-language description of the desired UI
    pub prompt: String,
    /// Markup from a previous round, present when iterating on a draft
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prior_markup: Option<String>,
    /// User annotations on the prior markup ("make the header sticky", ...)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<String>,
    /// Optional image attachments (screenshots, sketches)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageAttachment>,
}

impl GenerationRequest {
    /// Create a fresh request with a new id
    pub fn new(
        user_id: impl Into<String>,
        model: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            user_id: user_id.into(),
            model: model.into(),
            prompt: prompt.into(),
            prior_markup: None,
            annotations: Vec::new(),
            images: Vec::new(),
        }
    }

    /// Attach prior markup for an iterative refinement round
    pub fn with_prior_markup(mut self, markup: impl Into<String>) -> Self {
        self.prior_markup = Some(markup.into());
        self
    }

    /// Add a refinement annotation
    pub fn with_annotation(mut self, note: impl Into<String>) -> Self {
        self.annotations.push(note.into());
        self
    }

    /// Attach a base64-encoded image (screenshot, sketch)
    pub fn with_image(mut self, media_type: impl Into<String>, data: impl Into<String>) -> Self {
        self.images.push(ImageAttachment {
            media_type: media_type.into(),
            data: data.into(),
        });
        self
    }

    /// Full prompt text sent to the provider, folding in refinement context.
    pub fn composed_prompt(&self) -> String {
        let mut prompt = String::new();
        if let Some(prior) = &self.prior_markup {
            prompt.push_str("Current markup:\n");
            prompt.push_str(prior);
            prompt.push_str("\n\n");
        }
        if !self.annotations.is_empty() {
            prompt.push_str("Requested changes:\n");
            for note in &self.annotations {
                prompt.push_str("- ");
                prompt.push_str(note);
                prompt.push('\n');
            }
            prompt.push('\n');
        }
        prompt.push_str(&self.prompt);
        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_request_has_unique_id() {
        let a = GenerationRequest::new("u1", "gpt-4o", "a login form");
        let b = GenerationRequest::new("u1", "gpt-4o", "a login form");
        assert_ne!(a.request_id, b.request_id);
    }

    #[test]
    fn test_composed_prompt_plain() {
        let req = GenerationRequest::new("u1", "gpt-4o", "a login form");
        assert_eq!(req.composed_prompt(), "a login form");
    }

    #[test]
    fn test_composed_prompt_with_refinement_context() {
        let req = GenerationRequest::new("u1", "gpt-4o", "a login form")
            .with_prior_markup("<div>draft</div>")
            .with_annotation("center the button");

        let prompt = req.composed_prompt();
        assert!(prompt.contains("<div>draft</div>"));
        assert!(prompt.contains("- center the button"));
        assert!(prompt.ends_with("a login form"));
    }
}
