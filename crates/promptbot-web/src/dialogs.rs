//! Prompt dialogs hosted by the web binary.
//!
//! A `PromptDialog` asks a fixed list of questions, one per turn, keeps the
//! answers in its dialog-stack entry and replies with a summary after the
//! last one.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use promptbot_core::dialog::{Dialog, DialogInstance, DialogStateAccessor};
use promptbot_core::turn::TurnContext;
use promptbot_core::{BotError, Result};

#[derive(Debug, Clone)]
pub struct PromptStep {
    pub key: String,
    pub prompt: String,
}

impl PromptStep {
    pub fn new(key: &str, prompt: &str) -> Self {
        Self {
            key: key.to_string(),
            prompt: prompt.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PromptProgress {
    step: usize,
    #[serde(default)]
    answers: BTreeMap<String, String>,
}

pub struct PromptDialog {
    id: String,
    steps: Vec<PromptStep>,
    summary_title: String,
}

impl PromptDialog {
    pub fn new(id: &str, summary_title: &str, steps: Vec<PromptStep>) -> Self {
        Self {
            id: id.to_string(),
            steps,
            summary_title: summary_title.to_string(),
        }
    }

    /// Transport, name and age, then a recap.
    pub fn profile() -> Self {
        Self::new(
            "profile",
            "Here is what I have for your profile:",
            vec![
                PromptStep::new("transport", "How do you usually get around? (car, bus, bicycle)"),
                PromptStep::new("name", "Please enter your name."),
                PromptStep::new("age", "Please enter your age."),
            ],
        )
    }

    pub fn feedback() -> Self {
        Self::new(
            "feedback",
            "Thanks for the feedback! You said:",
            vec![
                PromptStep::new("rating", "On a scale of 1 to 5, how was your visit?"),
                PromptStep::new("comment", "Anything we could do better?"),
            ],
        )
    }

    fn summary(&self, progress: &PromptProgress) -> String {
        let lines: Vec<String> = self
            .steps
            .iter()
            .map(|s| {
                let answer = progress.answers.get(&s.key).map(String::as_str).unwrap_or("-");
                format!("- {}: {}", s.key, answer)
            })
            .collect();
        format!("{}\n{}", self.summary_title, lines.join("\n"))
    }
}

#[async_trait]
impl Dialog for PromptDialog {
    fn id(&self) -> &str {
        &self.id
    }

    async fn run(
        &self,
        ctx: &mut TurnContext,
        state: &DialogStateAccessor,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(BotError::Cancelled);
        }
        let Some(first) = self.steps.first() else {
            return Err(BotError::Dialog(format!("dialog '{}' has no steps", self.id)));
        };

        let mut dialog_state = state.get_or_default(ctx).await?;
        let position = dialog_state.dialog_stack.iter().position(|d| d.id == self.id);

        let Some(index) = position else {
            // Not started yet: ask the first question.
            let progress = PromptProgress::default();
            dialog_state.dialog_stack.push(DialogInstance {
                id: self.id.clone(),
                state: serde_json::to_value(&progress)?,
            });
            state.set(ctx, &dialog_state).await?;
            return ctx.send_text(&first.prompt).await;
        };

        let mut progress: PromptProgress =
            serde_json::from_value(dialog_state.dialog_stack[index].state.clone())?;
        let answer = ctx
            .activity()
            .text
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .to_string();
        if let Some(step) = self.steps.get(progress.step) {
            progress.answers.insert(step.key.clone(), answer);
        }
        progress.step += 1;

        match self.steps.get(progress.step) {
            Some(next) => {
                dialog_state.dialog_stack[index].state = serde_json::to_value(&progress)?;
                state.set(ctx, &dialog_state).await?;
                ctx.send_text(&next.prompt).await
            }
            None => {
                dialog_state.dialog_stack.remove(index);
                state.set(ctx, &dialog_state).await?;
                ctx.send_text(&self.summary(&progress)).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use promptbot_core::activity::{Activity, ChannelAccount};
    use promptbot_core::dialog::{DialogState, DIALOG_STATE_PROPERTY};
    use promptbot_core::state::BotState;
    use promptbot_core::storage::{MemoryStorage, Storage};
    use promptbot_core::turn::BufferedSender;

    async fn say(
        dialog: &PromptDialog,
        state: &Arc<BotState>,
        text: &str,
    ) -> Vec<String> {
        let accessor = state.create_property::<DialogState>(DIALOG_STATE_PROPERTY);
        let sender = Arc::new(BufferedSender::new());
        let activity = Activity::message(
            "test",
            "c1",
            ChannelAccount::new("user"),
            ChannelAccount::new("bot"),
            text,
        );
        let mut ctx = TurnContext::new(activity, sender.clone());
        let cancel = CancellationToken::new();
        dialog.run(&mut ctx, &accessor, &cancel).await.unwrap();
        state.save_changes(&mut ctx, false, &cancel).await.unwrap();
        sender
            .drain()
            .await
            .into_iter()
            .filter_map(|a| a.text)
            .collect()
    }

    #[tokio::test]
    async fn test_profile_dialog_walks_all_steps() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let state = Arc::new(BotState::conversation(storage));
        let dialog = PromptDialog::profile();

        assert_eq!(say(&dialog, &state, "hi").await[0], dialog.steps[0].prompt);
        assert_eq!(say(&dialog, &state, "bicycle").await[0], dialog.steps[1].prompt);
        assert_eq!(say(&dialog, &state, " Ada ").await[0], dialog.steps[2].prompt);

        let summary = say(&dialog, &state, "36").await;
        assert!(summary[0].contains("- transport: bicycle"));
        assert!(summary[0].contains("- name: Ada"));
        assert!(summary[0].contains("- age: 36"));

        // Finished dialogs start over on the next message.
        assert_eq!(say(&dialog, &state, "again").await[0], dialog.steps[0].prompt);
    }

    #[tokio::test]
    async fn test_cancelled_run_is_rejected() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let state = Arc::new(BotState::conversation(storage));
        let accessor = state.create_property::<DialogState>(DIALOG_STATE_PROPERTY);
        let activity = Activity::message(
            "test",
            "c1",
            ChannelAccount::new("user"),
            ChannelAccount::new("bot"),
            "hi",
        );
        let mut ctx = TurnContext::new(activity, Arc::new(BufferedSender::new()));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = PromptDialog::feedback()
            .run(&mut ctx, &accessor, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, BotError::Cancelled));
    }
}
