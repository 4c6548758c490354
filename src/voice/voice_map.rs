//! Logical voice names
//!
//! Personas and config refer to voices by a logical name (the ElevenLabs
//! voice name). Providers that can't use that name directly resolve it
//! through a [`VoiceMap`]; unknown names fall back to the `default` entry.

use std::collections::HashMap;

/// Logical name that every map resolves
pub const DEFAULT_VOICE: &str = "default";

/// Lookup from logical voice names to provider voice identifiers
#[derive(Debug, Clone)]
pub struct VoiceMap {
    voices: HashMap<String, String>,
}

impl VoiceMap {
    /// Map with only a default voice
    #[must_use]
    pub fn new(default_voice: impl Into<String>) -> Self {
        let mut voices = HashMap::new();
        voices.insert(DEFAULT_VOICE.to_string(), default_voice.into());
        Self { voices }
    }

    /// The built-in logical names mapped to espeak voices
    #[must_use]
    pub fn espeak() -> Self {
        Self::new("en")
            .with("Doug VO Only", "en+m3")
            .with("Doug Melina", "en+f3")
            .with("Pointboat", "en+m4")
    }

    /// Add or replace a mapping
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, voice: impl Into<String>) -> Self {
        self.insert(name, voice);
        self
    }

    /// Add or replace a mapping in place
    pub fn insert(&mut self, name: impl Into<String>, voice: impl Into<String>) {
        self.voices.insert(name.into(), voice.into());
    }

    /// Add every entry of `extra`, overriding existing names
    pub fn extend(&mut self, extra: &HashMap<String, String>) {
        for (name, voice) in extra {
            self.insert(name.clone(), voice.clone());
        }
    }

    /// Provider voice for a logical name
    #[must_use]
    pub fn resolve(&self, name: &str) -> &str {
        self.voices
            .get(name)
            .or_else(|| self.voices.get(DEFAULT_VOICE))
            .map_or("", String::as_str)
    }

    /// Whether the name has its own entry
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.voices.contains_key(name)
    }
}
