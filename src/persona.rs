//! Persona definition
//!
//! A persona is the character the bot plays: a display name used in chat
//! replies, the system prompt that opens every session, and the logical TTS
//! voice it speaks with. Persona files are TOML:
//!
//! ```toml
//! name = "Pajama Sam"
//! voice = "Pointboat"
//! prompt = "You are Pajama Sam..."
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const BUILTIN: &str = include_str!("../personas/pajama_sam.toml");

/// The character the bot plays
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Persona {
    /// Display name shown in chat replies
    pub name: String,

    /// System prompt placed at the start of every session
    pub prompt: String,

    /// Logical TTS voice name (resolved per provider)
    #[serde(default = "default_voice")]
    pub voice: String,
}

fn default_voice() -> String {
    "default".to_string()
}

impl Persona {
    /// The persona compiled into the binary
    ///
    /// # Panics
    ///
    /// If the embedded persona file does not parse
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn builtin() -> Self {
        Self::from_toml(BUILTIN).expect("embedded persona is valid TOML")
    }

    /// Parse a persona from TOML text
    ///
    /// # Errors
    ///
    /// Returns error if the text is not a valid persona
    pub fn from_toml(content: &str) -> Result<Self> {
        let persona: Self = toml::from_str(content)?;
        if persona.prompt.trim().is_empty() {
            return Err(Error::Config(format!(
                "persona '{}' has an empty prompt",
                persona.name
            )));
        }
        Ok(persona)
    }

    /// Load a persona file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let persona = Self::from_toml(&content)?;
        tracing::info!(path = %path.display(), name = %persona.name, "loaded persona");
        Ok(persona)
    }

    /// Format a chat reply attributed to this persona
    #[must_use]
    pub fn format_reply(&self, text: &str) -> String {
        format!("🎭 **{}:** {text}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_parses() {
        let persona = Persona::builtin();
        assert_eq!(persona.name, "Pajama Sam");
        assert_eq!(persona.voice, "Pointboat");
        assert!(persona.prompt.contains("Babaga-BOOSH"));
    }

    #[test]
    fn voice_defaults() {
        let persona = Persona::from_toml("name = \"Jack\"\nprompt = \"Arr\"").unwrap();
        assert_eq!(persona.voice, "default");
    }

    #[test]
    fn empty_prompt_rejected() {
        let result = Persona::from_toml("name = \"Nobody\"\nprompt = \"  \"");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn format_reply_attributes_name() {
        let persona = Persona::from_toml("name = \"Jack\"\nprompt = \"Arr\"").unwrap();
        assert_eq!(persona.format_reply("Ahoy"), "🎭 **Jack:** Ahoy");
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jack.toml");
        std::fs::write(&path, "name = \"Jack\"\nvoice = \"Doug VO Only\"\nprompt = \"Arr\"").unwrap();

        let persona = Persona::load(&path).unwrap();
        assert_eq!(persona.voice, "Doug VO Only");
    }
}
