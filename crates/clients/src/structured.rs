//! Tolerant parsing of structured model output.
//!
//! Language models wrap JSON in markdown fences, prepend chatter, or return
//! something else entirely. Anything that does not parse as the expected
//! shape yields an empty result.

use stampline_core::generation::CharacterProposal;

/// Strip a surrounding markdown code fence, if any.
pub fn strip_fences(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        // Drop the language tag line (`json`, `JSON`, or nothing).
        text = match rest.find('\n') {
            Some(nl) => &rest[nl + 1..],
            None => rest,
        };
        if let Some(body) = text.trim_end().strip_suffix("```") {
            text = body;
        }
    }
    text.trim()
}

/// Locate the outermost JSON array in `raw`.
fn array_slice(raw: &str) -> Option<&str> {
    let text = strip_fences(raw);
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    (end > start).then(|| &text[start..=end])
}

/// Parse a list of character proposals.
pub fn parse_proposals(raw: &str) -> Vec<CharacterProposal> {
    let Some(slice) = array_slice(raw) else {
        tracing::warn!("Proposal output contained no JSON array");
        return Vec::new();
    };
    match serde_json::from_str::<Vec<CharacterProposal>>(slice) {
        Ok(proposals) => proposals
            .into_iter()
            .filter(|p| !p.description.trim().is_empty())
            .collect(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to parse proposal output");
            Vec::new()
        }
    }
}

/// Parse a list of phrases, dropping blanks and duplicates.
pub fn parse_phrases(raw: &str) -> Vec<String> {
    let Some(slice) = array_slice(raw) else {
        tracing::warn!("Phrase output contained no JSON array");
        return Vec::new();
    };
    match serde_json::from_str::<Vec<String>>(slice) {
        Ok(phrases) => {
            let mut seen = std::collections::HashSet::new();
            phrases
                .into_iter()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty() && seen.insert(p.clone()))
                .collect()
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to parse phrase output");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fenced_json_is_unwrapped() {
        let raw = "```json\n[\"おはよう\", \"ありがとう\"]\n```";
        assert_eq!(parse_phrases(raw), vec!["おはよう", "ありがとう"]);
    }

    #[test]
    fn chatter_around_the_array_is_ignored() {
        let raw = "Sure! Here you go:\n[\"yes\", \"no\"]\nHope that helps.";
        assert_eq!(parse_phrases(raw), vec!["yes", "no"]);
    }

    #[test]
    fn blanks_and_duplicates_are_dropped() {
        let raw = r#"["ok", " ", "ok", "thanks "]"#;
        assert_eq!(parse_phrases(raw), vec!["ok", "thanks"]);
    }

    #[test]
    fn malformed_output_is_empty() {
        assert!(parse_phrases("I cannot help with that.").is_empty());
        assert!(parse_phrases("[1, 2, 3]").is_empty());
        assert!(parse_proposals("{\"name\": \"solo\"}").is_empty());
        assert!(parse_proposals("[{\"name\": ").is_empty());
    }

    #[test]
    fn proposals_parse_with_service_field_names() {
        let raw = r#"```json
[
  {"name": "Mochi", "genre": "animal", "description": "A round cat",
   "sd_base_prompt": "round white cat", "character_consistency": true},
  {"name": "Empty", "genre": "animal", "description": ""}
]
```"#;
        let proposals = parse_proposals(raw);
        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].name, "Mochi");
        assert_eq!(proposals[0].base_prompt, "round white cat");
    }

    #[test]
    fn strip_fences_leaves_plain_text() {
        assert_eq!(strip_fences("  plain  "), "plain");
        assert_eq!(strip_fences("```\nbody\n```"), "body");
    }
}
