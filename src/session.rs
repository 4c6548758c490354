//! Chat session: one transcript and the backend that extends it
//!
//! Every conversation (a Discord guild, a terminal chat) owns its own
//! [`Session`]. Nothing is shared between sessions.

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::conversation::{ConversationBuffer, Role, TokenBudget, Turn};
use crate::llm::ChatCompletion;
use crate::{Error, Result};

/// A conversation with the chat backend
pub struct Session {
    buffer: ConversationBuffer,
    completion: Arc<dyn ChatCompletion>,
    backup_path: Option<PathBuf>,
}

impl Session {
    /// Create a session whose transcript starts with the persona prompt
    #[must_use]
    pub fn new(
        persona_prompt: &str,
        budget: TokenBudget,
        completion: Arc<dyn ChatCompletion>,
    ) -> Self {
        Self {
            buffer: ConversationBuffer::with_system_prompt(budget, persona_prompt),
            completion,
            backup_path: None,
        }
    }

    /// Session for the configured persona, budget and backup file
    #[must_use]
    pub fn from_config(config: &Config, completion: Arc<dyn ChatCompletion>) -> Self {
        Self::new(&config.persona.prompt, config.budget, completion)
            .with_backup(config.backup_file.clone())
    }

    /// Overwrite this file with a transcript dump after every turn
    #[must_use]
    pub fn with_backup(mut self, path: PathBuf) -> Self {
        self.backup_path = Some(path);
        self
    }

    /// Current transcript
    #[must_use]
    pub const fn buffer(&self) -> &ConversationBuffer {
        &self.buffer
    }

    /// Ask a question in the context of the whole conversation
    ///
    /// On success the user and assistant turns are both kept. On failure the
    /// transcript is left as it was before the call.
    ///
    /// # Errors
    ///
    /// Returns error if the prompt is empty or the completion fails
    pub async fn chat_with_history(&mut self, prompt: &str) -> Result<String> {
        if prompt.trim().is_empty() {
            return Err(Error::EmptyPrompt);
        }

        let mut pending = self.buffer.clone();
        pending.append(Turn::user(prompt));

        tracing::debug!(tokens = pending.estimate_tokens(), "transcript size before trim");
        let evicted = pending.enforce_budget();
        if evicted > 0 {
            tracing::info!(
                evicted,
                tokens = pending.estimate_tokens(),
                "trimmed transcript to fit budget"
            );
        }

        let reply = self.completion.complete(&pending.snapshot()).await?;
        if reply.role != Role::Assistant {
            tracing::debug!(role = reply.role.as_str(), "storing completion as assistant turn");
        }

        pending.append(Turn::assistant(reply.content.clone()));
        self.buffer = pending;
        self.write_backup().await;
        Ok(reply.content)
    }

    /// Ask a single question with no conversation history
    ///
    /// # Errors
    ///
    /// Returns error if the prompt is empty, too large on its own, or the
    /// completion fails
    pub async fn chat_once(&self, prompt: &str) -> Result<String> {
        if prompt.trim().is_empty() {
            return Err(Error::EmptyPrompt);
        }

        let question = [Turn::user(prompt)];
        let budget = self.buffer.budget();
        let estimated = budget.estimate(&question);
        if estimated > budget.max_tokens {
            return Err(Error::PromptTooLarge {
                estimated,
                max: budget.max_tokens,
            });
        }

        let reply = self.completion.complete(&question).await?;
        Ok(reply.content)
    }

    /// Overwrite the backup file with the current transcript
    ///
    /// Failures are logged, the session carries on.
    pub async fn write_backup(&self) {
        let Some(path) = &self.backup_path else {
            return;
        };

        if let Err(e) = tokio::fs::write(path, self.buffer.dump()).await {
            tracing::warn!(path = %path.display(), error = %e, "failed to write chat backup");
        }
    }
}
