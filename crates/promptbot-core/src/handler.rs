//! Turn handling — activity routing plus the timeout-aware dialog bot.
//!
//! [`ActivityHandler`] is the routing base: its provided `on_turn` dispatches by
//! activity type to per-type hooks. A conversationUpdate goes to
//! `on_conversation_update`, which splits it into members added and removed;
//! the leaf hooks default to no-ops. [`TurnHandler`]
//! overrides `on_turn` to wrap routing with the idle-timeout check up front and
//! the state saves at the end.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::activity::{ActivityType, ChannelAccount};
use crate::config::Config;
use crate::dialog::{Dialog, DialogState, DialogStateAccessor, DIALOG_STATE_PROPERTY};
use crate::error::Result;
use crate::events::{BotEvent, GreetingData, ResetData, TurnData};
use crate::state::BotState;
use crate::tracker::{ConversationTracker, TimeoutStatus};
use crate::turn::TurnContext;

#[async_trait]
pub trait ActivityHandler: Send + Sync {
    async fn on_turn(&self, ctx: &mut TurnContext, cancel: &CancellationToken) -> Result<()> {
        route_activity(self, ctx, cancel).await
    }

    async fn on_message_activity(
        &self,
        _ctx: &mut TurnContext,
        _cancel: &CancellationToken,
    ) -> Result<()> {
        Ok(())
    }

    async fn on_conversation_update(
        &self,
        ctx: &mut TurnContext,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let added = ctx.activity().members_added.clone();
        let removed = ctx.activity().members_removed.clone();
        if !added.is_empty() {
            self.on_members_added(&added, ctx, cancel).await?;
        }
        if !removed.is_empty() {
            self.on_members_removed(&removed, ctx, cancel).await?;
        }
        Ok(())
    }

    async fn on_members_added(
        &self,
        _members: &[ChannelAccount],
        _ctx: &mut TurnContext,
        _cancel: &CancellationToken,
    ) -> Result<()> {
        Ok(())
    }

    async fn on_members_removed(
        &self,
        _members: &[ChannelAccount],
        _ctx: &mut TurnContext,
        _cancel: &CancellationToken,
    ) -> Result<()> {
        Ok(())
    }

    async fn on_unrecognized_activity(
        &self,
        _ctx: &mut TurnContext,
        _cancel: &CancellationToken,
    ) -> Result<()> {
        Ok(())
    }
}

/// Base routing: send the turn to the hook matching its activity type.
pub async fn route_activity<H>(
    handler: &H,
    ctx: &mut TurnContext,
    cancel: &CancellationToken,
) -> Result<()>
where
    H: ActivityHandler + ?Sized,
{
    match ctx.activity().activity_type {
        ActivityType::Message => handler.on_message_activity(ctx, cancel).await,
        ActivityType::ConversationUpdate => handler.on_conversation_update(ctx, cancel).await,
        ActivityType::Other => {
            debug!("Unrecognized activity in {}", ctx.conversation_id());
            handler.on_unrecognized_activity(ctx, cancel).await
        }
    }
}

/// Runs one injected dialog, resetting it when the conversation went idle.
///
/// Several handlers (one per endpoint, each with its own dialog) can share a
/// single tracker and state partitions.
pub struct TurnHandler {
    tracker: Arc<ConversationTracker>,
    dialog: Arc<dyn Dialog>,
    conversation_state: Arc<BotState>,
    user_state: Arc<BotState>,
    dialog_state: DialogStateAccessor,
    welcome_back_message: String,
    greeting_message: String,
    events: Option<broadcast::Sender<BotEvent>>,
}

impl TurnHandler {
    pub fn new(
        config: &Config,
        tracker: Arc<ConversationTracker>,
        conversation_state: Arc<BotState>,
        user_state: Arc<BotState>,
        dialog: Arc<dyn Dialog>,
    ) -> Self {
        let dialog_state = conversation_state.create_property::<DialogState>(DIALOG_STATE_PROPERTY);
        Self {
            tracker,
            dialog,
            conversation_state,
            user_state,
            dialog_state,
            welcome_back_message: config.welcome_back_message.clone(),
            greeting_message: config.greeting_message.clone(),
            events: None,
        }
    }

    /// Publish turn/reset/greeting events on `tx`.
    pub fn with_events(mut self, tx: broadcast::Sender<BotEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn dialog_id(&self) -> &str {
        self.dialog.id()
    }

    fn broadcast(&self, event: BotEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    /// Touch the tracker; on a stale hit notify the user and drop the dialog state.
    async fn check_conversation_timeout(&self, ctx: &mut TurnContext) -> Result<TimeoutStatus> {
        let conversation_id = ctx.conversation_id().to_string();
        let status = self
            .tracker
            .touch(&conversation_id, || ctx.activity().conversation_reference());

        self.broadcast(BotEvent::Turn(TurnData {
            conversation_id: conversation_id.clone(),
            activity_type: ctx.activity().activity_type.to_string(),
            status,
        }));

        if status == TimeoutStatus::Stale {
            info!(
                conversation = %conversation_id,
                timeout_seconds = self.tracker.timeout_seconds(),
                "Conversation idle past timeout, starting over"
            );
            ctx.send_text(&self.welcome_back_message).await?;
            self.dialog_state.delete(ctx).await?;
            self.broadcast(BotEvent::Reset(ResetData {
                conversation_id,
                timeout_seconds: self.tracker.timeout_seconds(),
            }));
        }

        Ok(status)
    }
}

#[async_trait]
impl ActivityHandler for TurnHandler {
    async fn on_turn(&self, ctx: &mut TurnContext, cancel: &CancellationToken) -> Result<()> {
        self.check_conversation_timeout(ctx).await?;

        route_activity(self, ctx, cancel).await?;

        // Save any state changes that might have occurred during the turn.
        self.conversation_state.save_changes(ctx, false, cancel).await?;
        self.user_state.save_changes(ctx, false, cancel).await?;
        Ok(())
    }

    async fn on_message_activity(
        &self,
        ctx: &mut TurnContext,
        cancel: &CancellationToken,
    ) -> Result<()> {
        info!(dialog = self.dialog.id(), "Running dialog with message activity");
        self.dialog.run(ctx, &self.dialog_state, cancel).await
    }

    async fn on_members_added(
        &self,
        members: &[ChannelAccount],
        ctx: &mut TurnContext,
        _cancel: &CancellationToken,
    ) -> Result<()> {
        let recipient_id = ctx.activity().recipient.id.clone();
        for member in members {
            // Greet anyone that was not the target (recipient) of this activity.
            if member.id != recipient_id {
                ctx.send_text(&self.greeting_message).await?;
                self.broadcast(BotEvent::Greeting(GreetingData {
                    conversation_id: ctx.conversation_id().to_string(),
                    member_id: member.id.clone(),
                }));
            }
        }
        Ok(())
    }
}
