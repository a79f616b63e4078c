//! Prompt composition
//!
//! Turns a retrieval decision into a behavior/user prompt pair. The trust
//! level is encoded as behavioral constraints in the system-level prompt,
//! not just as content: strict mode forbids anything beyond the supplied
//! passages, hybrid mode requires supplementation to be flagged, and
//! generation-only answers from general knowledge.
//!
//! The composer is pure and total. `Strategy` is a closed enum and every
//! variant maps to a defined template; the exhaustive `match` has no
//! default arm, so an unhandled strategy cannot compile.

use serde::{Deserialize, Serialize};

use crate::policy::{Decision, Strategy};
use crate::providers::Candidate;

/// Exact refusal phrase required in strict mode when the passages do not
/// contain the answer
pub const REFUSAL_PHRASE: &str = "The reference material does not contain this information.";

/// Tag hybrid answers must attach to general-knowledge supplementation
pub const SUPPLEMENT_TAG: &str = "[supplemented from general knowledge]";

/// Placeholder rendered instead of an empty context block, so the
/// generation provider always receives a well-formed instruction
pub const EMPTY_CONTEXT_PLACEHOLDER: &str = "(no matching reference material)";

const BEHAVIOR_BASE: &str = "You are a professional, honest assistant that follows \
instructions exactly. Answers must be extremely concise and contain only the essentials.";

/// A composed behavior/user prompt pair, consumed once by the generation
/// provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposedPrompt {
    /// System-level response constraints
    pub behavior: String,
    /// Question, optionally prefixed with the formatted candidate context
    pub user: String,
}

/// Renders decision + question + candidates into a prompt pair
#[derive(Debug, Clone, Default)]
pub struct PromptComposer;

impl PromptComposer {
    pub fn new() -> Self {
        Self
    }

    /// Compose the prompt pair for one question
    pub fn compose(
        &self,
        decision: &Decision,
        question: &str,
        candidates: &[Candidate],
    ) -> ComposedPrompt {
        ComposedPrompt {
            behavior: behavior_prompt(decision.strategy),
            user: user_prompt(decision.strategy, question, candidates),
        }
    }
}

/// Render candidates in ranked order, each with its 1-based position and
/// similarity score
pub fn format_context(candidates: &[Candidate]) -> String {
    if candidates.is_empty() {
        return EMPTY_CONTEXT_PLACEHOLDER.to_string();
    }

    candidates
        .iter()
        .enumerate()
        .map(|(i, candidate)| {
            format!(
                "Passage {} (similarity {:.4}): {}",
                i + 1,
                candidate.score,
                candidate.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn behavior_prompt(strategy: Strategy) -> String {
    match strategy {
        Strategy::StrictRetrieval => format!(
            "{BEHAVIOR_BASE}\n\
            [Strict mode]\n\
            1. Use only content that appears verbatim in the provided reference passages\n\
            2. No guessing, inference, general-knowledge supplementation, paraphrase, or expansion\n\
            3. If the passages do not fully contain the answer, reply with exactly: \
            '{REFUSAL_PHRASE}'\n\
            4. Answer in a single sentence with no explanation, preamble, or filler"
        ),
        Strategy::HybridRetrieval => format!(
            "{BEHAVIOR_BASE}\n\
            [Cautious hybrid mode]\n\
            1. Prefer the exact wording of the reference passages\n\
            2. Where the passages are incomplete, you may supplement with general knowledge, \
            but the supplemented part must be marked with {SUPPLEMENT_TAG}\n\
            3. If no passage is relevant, begin with: 'Not covered by the material; \
            answering from general knowledge:'\n\
            4. Keep the whole answer to one sentence where possible"
        ),
        Strategy::GenerationOnly => format!(
            "{BEHAVIOR_BASE}\n\
            Answer the question directly in one concise, accurate sentence with no extra text."
        ),
    }
}

fn user_prompt(strategy: Strategy, question: &str, candidates: &[Candidate]) -> String {
    match strategy {
        Strategy::StrictRetrieval | Strategy::HybridRetrieval => {
            let top_score = candidates.first().map(|c| c.score).unwrap_or(0.0);
            let context = format_context(candidates);
            let lead = match strategy {
                Strategy::StrictRetrieval => {
                    "Using only the material above, answer the following question:"
                }
                _ => "Answer the following question:",
            };
            format!(
                "Top match similarity: {:.3} (out of 1.0)\n\n\
                Reference material:\n{}\n\n\
                {}\n{}",
                top_score, context, lead, question
            )
        }
        // No context block; the question goes through bare
        Strategy::GenerationOnly => question.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates() -> Vec<Candidate> {
        vec![
            Candidate {
                content: "The capital of France is Paris.".to_string(),
                score: 0.95,
            },
            Candidate {
                content: "France borders Germany.".to_string(),
                score: 0.60,
            },
        ]
    }

    fn decision(strategy: Strategy, confidence: f32) -> Decision {
        Decision {
            strategy,
            confidence,
        }
    }

    #[test]
    fn test_strict_prompt_contains_refusal_phrase_and_context() {
        let composed = PromptComposer::new().compose(
            &decision(Strategy::StrictRetrieval, 0.95),
            "What is the capital of France?",
            &candidates(),
        );
        assert!(composed.behavior.contains(REFUSAL_PHRASE));
        assert!(composed.behavior.contains("single sentence"));
        assert!(composed.user.contains("Top match similarity: 0.950"));
        assert!(composed.user.contains("Passage 1 (similarity 0.9500)"));
        assert!(composed.user.contains("Passage 2 (similarity 0.6000)"));
        assert!(composed.user.contains("Using only the material above"));
        assert!(composed.user.ends_with("What is the capital of France?"));
    }

    #[test]
    fn test_hybrid_prompt_requires_supplement_tag() {
        let composed = PromptComposer::new().compose(
            &decision(Strategy::HybridRetrieval, 0.87),
            "Where is Paris?",
            &candidates(),
        );
        assert!(composed.behavior.contains(SUPPLEMENT_TAG));
        assert!(composed.user.contains("Reference material:"));
        assert!(!composed.user.contains("Using only the material above"));
    }

    #[test]
    fn test_generation_only_prompt_is_bare_question() {
        let composed = PromptComposer::new().compose(
            &decision(Strategy::GenerationOnly, 0.3),
            "Where is Paris?",
            &candidates(),
        );
        assert_eq!(composed.user, "Where is Paris?");
        assert!(!composed.behavior.contains(REFUSAL_PHRASE));
    }

    #[test]
    fn test_empty_context_renders_placeholder() {
        assert_eq!(format_context(&[]), EMPTY_CONTEXT_PLACEHOLDER);

        let composed = PromptComposer::new().compose(
            &decision(Strategy::StrictRetrieval, 0.0),
            "Anything?",
            &[],
        );
        assert!(composed.user.contains(EMPTY_CONTEXT_PLACEHOLDER));
    }

    #[test]
    fn test_context_preserves_ranked_order() {
        let context = format_context(&candidates());
        let first = context.find("Passage 1").unwrap();
        let second = context.find("Passage 2").unwrap();
        assert!(first < second);
    }
}
