//! Programmatic repair of generated text into strictly valid JSON.

use crate::models::RecommendationResult;

/// Strips a surrounding markdown code fence, with or without a language tag
pub fn strip_fencing(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // Drop the info string (```json) up to the first newline
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };

    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

/// Slice from the first opening bracket to its matching last closing bracket.
///
/// Picks the array or object form depending on which opens first.
pub fn extract_json(text: &str) -> Option<&str> {
    let open = text.find(['[', '{'])?;
    let close_char = if text[open..].starts_with('[') { ']' } else { '}' };
    let close = text.rfind(close_char)?;
    (close > open).then(|| &text[open..=close])
}

/// Tries progressively looser readings of the text and returns the first that
/// parses, along with the exact JSON text that parsed.
pub fn repair(raw: &str) -> Option<(RecommendationResult, String)> {
    let mut candidates = vec![raw.trim(), strip_fencing(raw)];
    if let Some(extracted) = extract_json(strip_fencing(raw)) {
        candidates.push(extracted);
    }

    candidates.into_iter().find_map(|candidate| {
        RecommendationResult::from_json(candidate)
            .ok()
            .map(|result| (result, candidate.to_string()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAIN: &str = r#"[{"title": "Ponyo", "summary": "A fish.", "content_rating": "G"}]"#;

    #[test]
    fn test_strip_fencing_with_language_tag() {
        let fenced = format!("```json\n{}\n```", PLAIN);
        assert_eq!(strip_fencing(&fenced), PLAIN);
    }

    #[test]
    fn test_strip_fencing_without_language_tag() {
        let fenced = format!("```\n{}\n```\n", PLAIN);
        assert_eq!(strip_fencing(&fenced), PLAIN);
    }

    #[test]
    fn test_strip_fencing_single_line() {
        assert_eq!(strip_fencing("```json[]```"), "[]");
    }

    #[test]
    fn test_strip_fencing_leaves_plain_text() {
        assert_eq!(strip_fencing(&format!("  {}  ", PLAIN)), PLAIN);
    }

    #[test]
    fn test_extract_json_from_prose() {
        let text = format!("Sure! Here are my picks:\n{}\nEnjoy!", PLAIN);
        assert_eq!(extract_json(&text), Some(PLAIN));
    }

    #[test]
    fn test_extract_json_object() {
        let text = r#"Result: {"videos": [], "justification": "none"} done"#;
        assert_eq!(
            extract_json(text),
            Some(r#"{"videos": [], "justification": "none"}"#)
        );
    }

    #[test]
    fn test_extract_json_none() {
        assert_eq!(extract_json("no json here"), None);
        assert_eq!(extract_json("] backwards ["), None);
    }

    #[test]
    fn test_fenced_and_plain_parse_identically() {
        let fenced = format!("```json\n{}\n```", PLAIN);
        let (from_fenced, _) = repair(&fenced).unwrap();
        let (from_plain, _) = repair(PLAIN).unwrap();

        assert_eq!(from_fenced, from_plain);
        assert_eq!(from_plain, RecommendationResult::from_json(PLAIN).unwrap());
    }

    #[test]
    fn test_repair_prose_wrapped_fence() {
        let text = format!("Here you go:\n```json\n{}\n```\nHope that helps", PLAIN);
        let (result, json) = repair(&text).unwrap();

        assert_eq!(result.titles(), vec!["Ponyo"]);
        assert_eq!(json, PLAIN);
    }

    #[test]
    fn test_repair_gives_up_on_garbage() {
        assert!(repair("I recommend Ponyo.").is_none());
        assert!(repair(r#"[{"title": "Ponyo""#).is_none());
    }
}
