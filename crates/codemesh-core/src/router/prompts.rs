//! Prompt templates for the escalation tiers.

/// System prompt for Tier-2 disambiguation.
pub const DISAMBIGUATION_SYSTEM_PROMPT: &str = r#"You are a code analysis verifier. You are shown one extracted code element and the source context it came from. Decide whether the extraction is correct.

Respond with valid JSON matching this exact structure:
{
  "status": "verified" | "corrected" | "rejected",
  "name": "the correct element name",
  "kind": "the correct element kind (function, method, class, interface, import, ...)",
  "confidence": 0.0,
  "reasoning": "one or two sentences explaining the decision"
}

Use "verified" when the extraction is correct as-is, "corrected" when name or kind must change (and return the corrected values), "rejected" when the matched text is not actually a code element of any kind.

Only output the JSON, no additional text."#;

/// System prompt for Tier-3 discovery.
pub const DISCOVERY_SYSTEM_PROMPT: &str = r#"You are a code structure analyst. You are shown a complete source file that no extraction schema recognized. Extract its structure.

Respond with valid JSON matching this exact structure:
{
  "framework": "detected framework name or null",
  "confidence": 0.0,
  "nodes": [
    {"kind": "function", "name": "...", "start_line": 1, "end_line": 10}
  ],
  "edges": [
    {"kind": "CALLS", "from": "caller name", "to": "callee name"}
  ],
  "suggestions": [
    {"pattern": "a short snake_case pattern name", "regex": "a multiline regex that would have matched", "detail": "what the pattern recognizes"}
  ]
}

Node kinds: file, module, class, interface, function, method, variable, import, decorator, endpoint. Edge kinds: CONTAINS, IMPORTS, EXPORTS, INHERITS, IMPLEMENTS, CALLS, USES, DECORATES, EXPOSES.

Only report elements you can see in the file. Only output the JSON, no additional text."#;

/// Build the Tier-2 user prompt for one candidate.
pub fn build_disambiguation_prompt(
    kind: &str,
    name: &str,
    file_path: &str,
    context: &str,
) -> String {
    format!(
        "Extracted element:\n  kind: {kind}\n  name: {name}\n  file: {file_path}\n\nSource context:\n```\n{context}\n```"
    )
}

/// Build the Tier-3 user prompt for a whole file.
pub fn build_discovery_prompt(file_path: &str, language_hint: &str, content: &str) -> String {
    format!(
        "File: {file_path}\nLanguage hint: {language_hint}\n\nContent:\n```\n{content}\n```"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disambiguation_prompt_contains_candidate() {
        let prompt = build_disambiguation_prompt("function", "handle_request", "src/api.rs", "fn handle_request() {}");
        assert!(prompt.contains("handle_request"));
        assert!(prompt.contains("src/api.rs"));
    }
}
