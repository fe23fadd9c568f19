use regex::Regex;
use std::sync::OnceLock;

const SYSTEM_INSTRUCTION: &str = "You are a prompt engineer who specializes in image generation.";

const REQUIRED_PREFIX: &str = "A flat 2D illustration of";

const STYLE_RULES: &[&str] = &[
    "Never use hyperrealism, photorealism or 3D rendering styles.",
    "Always include the phrases 'flat 2D style', 'minimal shading' and 'no lighting effects'.",
    "Keep the background simple and flat, with almost no shadows.",
    "Use soft, clear lines, warm colors and a simple composition, like a children's picture book or animation.",
    "Nothing frightening, grotesque or bizarre. Children must be comfortable looking at the picture.",
];

const REGENERATION_PREAMBLE: &str = "A flat 2D illustration of the following scene, suitable for elementary school students. \
Avoid any surreal or scary imagery. Use a soft, friendly, and simple style with pastel colors.";

/// Safety rules applied to every picture: how descriptions are rewritten
/// and how the teacher's regeneration prompt is framed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModerationProfile {
    pub system_instruction: String,
    pub required_prefix: String,
    pub style_rules: Vec<String>,
    pub regeneration_preamble: String,
}

impl ModerationProfile {
    /// Flat, shadowless, child-friendly pictures for elementary classrooms.
    pub fn elementary() -> Self {
        Self {
            system_instruction: SYSTEM_INSTRUCTION.to_string(),
            required_prefix: REQUIRED_PREFIX.to_string(),
            style_rules: STYLE_RULES.iter().map(|r| r.to_string()).collect(),
            regeneration_preamble: REGENERATION_PREAMBLE.to_string(),
        }
    }

    /// User message for the rewrite step. The whole history is included so
    /// later requests read as refinements of earlier ones.
    pub fn rewrite_instruction(&self, history: &[String]) -> String {
        let context = history
            .iter()
            .map(|entry| format!("- {entry}"))
            .collect::<Vec<_>>()
            .join("\n");
        let rules = self
            .style_rules
            .iter()
            .map(|rule| format!("- {rule}"))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "You are a world-class image prompt writer.\n\
             Turn the learner's description into a vivid, visually rich English prompt \
             that an image generation model can follow.\n\n\
             The description is the accumulated conversation so far:\n\
             {context}\n\n\
             Follow these rules:\n\
             {rules}\n\n\
             Answer in English and begin with:\n\
             \"{prefix}...\"",
            prefix = self.required_prefix,
        )
    }

    /// Prompt used when a teacher regenerates a picture. Only the literal
    /// description is used, never the earlier rewritten prompt.
    pub fn regeneration_prompt(&self, description: &str) -> String {
        format!("{}\n\n{}", self.regeneration_preamble, description)
    }
}

impl Default for ModerationProfile {
    fn default() -> Self {
        Self::elementary()
    }
}

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)^```[A-Za-z]*\s*(.*?)\s*```$").expect("valid fence regex"))
}

fn quote_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?s)^["“](.*)["”]$"#).expect("valid quote regex"))
}

/// Cleans a completion into a usable prompt. Any non-empty text is
/// accepted; `None` means the model returned nothing.
pub fn normalize_rewrite(raw: &str) -> Option<String> {
    let mut text = raw.trim().to_string();
    if let Some(inner) = fence_re().captures(&text).and_then(|c| c.get(1)) {
        text = inner.as_str().trim().to_string();
    }
    if let Some(inner) = quote_re().captures(&text).and_then(|c| c.get(1)) {
        text = inner.as_str().trim().to_string();
    }
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}
