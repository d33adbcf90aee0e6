// src/retrieval/context.rs
// Renders fused results as an LLM-ready context block

use super::hybrid::HybridResult;
use super::scoring::ResultSource;

pub const EMPTY_CONTEXT: &str = "No relevant knowledge found.";

const INTERNAL_HEADER: &str = "--- INTERNAL MEMORIES (From Your Knowledge Base) ---";
const EXTERNAL_HEADER: &str = "--- EXTERNAL KNOWLEDGE (From Web Search) ---";

/// Two labeled sections, internal first, each keeping the fused order.
pub fn format_fused_context(results: &[HybridResult]) -> String {
    let internal: Vec<&HybridResult> = results
        .iter()
        .filter(|r| r.source == ResultSource::Internal)
        .collect();
    let external: Vec<&HybridResult> = results
        .iter()
        .filter(|r| r.source == ResultSource::External)
        .collect();

    let mut parts: Vec<String> = Vec::new();

    if !internal.is_empty() {
        parts.push(INTERNAL_HEADER.to_string());
        for (i, r) in internal.iter().enumerate() {
            parts.push(format!(
                "[INTERNAL MEMORY {}] ({:.0}% relevance, fused score: {:.3})\n{}",
                i + 1,
                r.confidence * 100.0,
                r.fused_score,
                r.content
            ));
        }
    }

    if !external.is_empty() {
        parts.push(EXTERNAL_HEADER.to_string());
        for (i, r) in external.iter().enumerate() {
            parts.push(format!(
                "[EXTERNAL KNOWLEDGE {}] ({:.0}% confidence, fused score: {:.3})\nTitle: {}\nSource: {}\n{}",
                i + 1,
                r.confidence * 100.0,
                r.fused_score,
                r.title.as_deref().unwrap_or("Untitled"),
                r.url.as_deref().unwrap_or("unknown"),
                r.content
            ));
        }
    }

    if parts.is_empty() {
        EMPTY_CONTEXT.to_string()
    } else {
        parts.join("\n\n")
    }
}
