// The moderation instruction sent to every backend.
//
// The model is asked to echo safe messages verbatim, rewrite unsafe ones into
// a single civil sentence that keeps the original intent, and answer with the
// block token when a message can't be salvaged. `Decision::from_reply` relies
// on exactly these three shapes.

const TEMPLATE: &str = r#"You are a content moderation and rewriting assistant.

Your task is to analyze the USER MESSAGE and output ONE final message string.

Rules (STRICT):
1. If the message is SAFE (no toxicity, insults, hate, threats, or sexual explicit language),
   return the ORIGINAL message EXACTLY as written.
2. If the message is UNSAFE but can be rewritten:
   - Remove insults, threats, or abusive tone
   - Preserve the ORIGINAL INTENT and CONFRONTATIONAL MEANING
   - Do NOT water it down into vague disagreement
   - Keep it natural and conversational
   - Limit to ONE short sentence (max 20 words)
3. If the message is an explicit violent threat or cannot be rewritten safely,
   return exactly:
   <<BLOCK>>

Output rules:
- Output ONLY the final message text
- No explanations
- No JSON
- No markdown

USER MESSAGE:
"""
{{MESSAGE}}
""""#;

/// Render the moderation prompt around `message`.
pub fn moderation_prompt(message: &str) -> String {
    TEMPLATE.replace("{{MESSAGE}}", message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_is_embedded_once() {
        let prompt = moderation_prompt("see you tomorrow");
        assert_eq!(prompt.matches("see you tomorrow").count(), 1);
        assert!(!prompt.contains("{{MESSAGE}}"));
        assert!(prompt.ends_with("\"\"\"\nsee you tomorrow\n\"\"\""));
    }
}
