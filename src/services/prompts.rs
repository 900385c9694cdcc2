//! Prompt templates for the generation and normalization calls.
//!
//! Downstream parsing depends on the constraints stated here, so they are kept
//! in one place and covered by tests.

use crate::models::{CatalogueEntry, MAX_RECOMMENDATIONS, NOT_RATED};

const GENERATION_TEMPLATE: &str = r#"Recommend up to {max} different titles for me to watch next, based on my recent watch history:

{recently_viewed}

These titles from my library are the closest matches to that history:

{similar}

Only recommend titles that exist in the following library catalogue, and take each title's summary and content rating from it:

{catalogue}

Rules:
- Recommend no more than {max} titles.
- Every recommended title must appear in the library catalogue above.
- Do not recommend any title whose content rating is higher than the highest content rating in my recent watch history.
- If a title has no content rating, use "{not_rated}" (not rated).
- Respond with a JSON array of objects, each with exactly this shape:
  {"title": "<title>", "summary": "<summary>", "content_rating": "<content rating>"}
- Make sure the response is valid JSON."#;

const NORMALIZATION_TEMPLATE: &str = r#"Rewrite the following text as valid JSON and nothing else.
Remove any markdown, code fences, backticks, surrounding prose, new lines and extra whitespace.
The output must be a JSON array of objects shaped like {"title": "<title>", "summary": "<summary>", "content_rating": "<content rating>"}.

{candidate}

Output only the JSON."#;

/// Fills `{name}` placeholders in one pass over the template.
///
/// Substituted values are never scanned, so braces inside catalogue data stay literal.
fn render(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start + 1..];
        let placeholder = values
            .iter()
            .find(|(name, _)| tail.starts_with(name) && tail[name.len()..].starts_with('}'));

        match placeholder {
            Some((name, value)) => {
                out.push_str(value);
                rest = &tail[name.len() + 1..];
            }
            None => {
                out.push('{');
                rest = tail;
            }
        }
    }

    out.push_str(rest);
    out
}

/// Renders entries as blank-line separated text blocks
pub fn text_blocks(entries: &[CatalogueEntry]) -> String {
    if entries.is_empty() {
        return "(none)".to_string();
    }

    entries
        .iter()
        .map(CatalogueEntry::describe)
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Grounding prompt for the first generation call
pub fn generation_prompt(
    recently_viewed: &[CatalogueEntry],
    similar: &[CatalogueEntry],
    catalogue: &[CatalogueEntry],
) -> String {
    render(
        GENERATION_TEMPLATE,
        &[
            ("max", &MAX_RECOMMENDATIONS.to_string()),
            ("not_rated", NOT_RATED),
            ("recently_viewed", &text_blocks(recently_viewed)),
            ("similar", &text_blocks(similar)),
            ("catalogue", &text_blocks(catalogue)),
        ],
    )
}

/// Prompt asking the model to turn its earlier output into bare JSON
pub fn normalization_prompt(candidate: &str) -> String {
    render(NORMALIZATION_TEMPLATE, &[("candidate", candidate)])
}
