//! Chat command parsing

/// A bot command typed in a guild text channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Join (or move to) the author's voice channel
    Join,
    /// Leave the voice channel
    Leave,
    /// Chat by text; empty when no message followed the command
    Talk(String),
    /// Start recording the author's voice
    Listen,
    /// Stop recording and answer what was said
    Stop,
    /// Explain the voice conversation flow
    Voice,
    /// Forget this guild's conversation
    Reset,
    /// List commands
    Help,
}

impl Command {
    /// Parse a message, `None` for anything that isn't a known command
    #[must_use]
    pub fn parse(prefix: &str, content: &str) -> Option<Self> {
        let rest = content.trim_start().strip_prefix(prefix)?;
        let (name, args) = rest
            .split_once(char::is_whitespace)
            .map_or((rest, ""), |(name, args)| (name, args.trim()));

        let command = match name.to_lowercase().as_str() {
            "join" => Self::Join,
            "leave" => Self::Leave,
            "talk" => Self::Talk(args.to_string()),
            "listen" => Self::Listen,
            "stop" => Self::Stop,
            "voice" => Self::Voice,
            "reset" => Self::Reset,
            "help" => Self::Help,
            _ => return None,
        };
        Some(command)
    }
}

/// One line per command, shown by `help` and logged at startup
#[must_use]
pub fn help_lines(prefix: &str) -> Vec<String> {
    [
        ("join", "Join your voice channel"),
        ("talk <message>", "Talk to me via text"),
        ("listen", "Start listening to your voice"),
        ("stop", "Stop listening and answer"),
        ("voice", "How voice conversation works"),
        ("reset", "Start a fresh conversation"),
        ("leave", "Leave voice channel"),
    ]
    .iter()
    .map(|(name, about)| format!("{prefix}{name} - {about}"))
    .collect()
}

/// Usage text for the voice conversation flow
#[must_use]
pub fn voice_help(prefix: &str, persona: &str) -> String {
    format!(
        "🎤 **Voice conversation with {persona}!**\n\n\
         **How to use:**\n\
         1. Type `{prefix}listen` and start talking in the voice channel\n\
         2. When you're done speaking, type `{prefix}stop` to get {persona}'s response\n\
         3. Use `{prefix}leave` to end the voice conversation"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_commands() {
        assert_eq!(Command::parse("!", "!join"), Some(Command::Join));
        assert_eq!(Command::parse("!", "!leave"), Some(Command::Leave));
        assert_eq!(Command::parse("!", "!listen"), Some(Command::Listen));
        assert_eq!(Command::parse("!", "!stop"), Some(Command::Stop));
        assert_eq!(Command::parse("!", "!voice"), Some(Command::Voice));
        assert_eq!(Command::parse("!", "!reset"), Some(Command::Reset));
        assert_eq!(Command::parse("!", "!HELP"), Some(Command::Help));
    }

    #[test]
    fn talk_keeps_message() {
        assert_eq!(
            Command::parse("!", "!talk  where is my   flashlight? "),
            Some(Command::Talk("where is my   flashlight?".to_string()))
        );
        assert_eq!(
            Command::parse("!", "!talk"),
            Some(Command::Talk(String::new()))
        );
    }

    #[test]
    fn ignores_other_messages() {
        assert_eq!(Command::parse("!", "hello there"), None);
        assert_eq!(Command::parse("!", "!dance"), None);
        assert_eq!(Command::parse("!", "?join"), None);
        assert_eq!(Command::parse("!", ""), None);
    }

    #[test]
    fn custom_prefix() {
        assert_eq!(Command::parse("sam ", "sam join"), Some(Command::Join));
        assert_eq!(Command::parse("sam ", "!join"), None);
    }

    #[test]
    fn help_lists_commands_with_prefix() {
        let lines = help_lines("!");
        assert!(lines.iter().any(|l| l.starts_with("!join")));
        assert!(lines.iter().any(|l| l.starts_with("!talk <message>")));
        assert!(lines.iter().all(|l| l.starts_with('!')));
    }
}
