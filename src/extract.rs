//! Pull artifact payloads out of tagged LM responses.
use regex::Regex;

/// Text between `<tag>` and `</tag>`, trimmed. `None` when the tag pair is
/// absent or encloses nothing.
pub fn extract_tagged(response: &str, tag: &str) -> Option<String> {
    let tag = regex::escape(tag);
    let pattern = Regex::new(&format!(r"(?is)<{tag}>(.*?)</{tag}>")).ok()?;
    let text = pattern.captures(response)?.get(1)?.as_str().trim();
    if text.is_empty() {
        return None;
    }
    Some(text.to_string())
}

/// Tagged payload, or the whole trimmed response when the tag is missing.
/// The flag reports whether the fallback was used.
pub fn extract_or_full(response: &str, tag: &str) -> (String, bool) {
    match extract_tagged(response, tag) {
        Some(text) => (text, false),
        None => (response.trim().to_string(), true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_multiline_payload() {
        let response = "Here you go.\n<translation>\nLigne un.\nLigne deux.\n</translation>\nDone.";
        assert_eq!(
            extract_tagged(response, "translation").as_deref(),
            Some("Ligne un.\nLigne deux.")
        );
    }

    #[test]
    fn critique_and_translation_are_separate() {
        let response = "<critique>Too literal.</critique>\n<translation>Mieux.</translation>";
        assert_eq!(extract_tagged(response, "critique").as_deref(), Some("Too literal."));
        assert_eq!(extract_tagged(response, "translation").as_deref(), Some("Mieux."));
    }

    #[test]
    fn tags_match_case_insensitively() {
        assert_eq!(
            extract_tagged("<Review>ok</Review>", "review").as_deref(),
            Some("ok")
        );
    }

    #[test]
    fn missing_or_empty_tag_falls_back_to_full_response() {
        assert_eq!(extract_tagged("no tags", "translation"), None);
        assert_eq!(extract_tagged("<translation>  </translation>", "translation"), None);
        let (text, fallback) = extract_or_full("  Just the text.  ", "translation");
        assert_eq!(text, "Just the text.");
        assert!(fallback);
    }
}
