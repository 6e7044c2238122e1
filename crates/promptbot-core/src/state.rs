//! State partitions (conversation / user) cached per turn, saved at turn end.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::activity::{Activity, ConversationReference};
use crate::error::{BotError, Result};
use crate::storage::Storage;
use crate::turn::TurnContext;

/// A loaded partition plus the snapshot it was loaded from.
#[derive(Debug, Clone, Default)]
pub(crate) struct CachedBotState {
    state: Map<String, Value>,
    snapshot: Map<String, Value>,
}

impl CachedBotState {
    fn new(state: Map<String, Value>) -> Self {
        Self {
            snapshot: state.clone(),
            state,
        }
    }

    fn is_changed(&self) -> bool {
        self.state != self.snapshot
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateScope {
    Conversation,
    User,
}

impl StateScope {
    pub fn name(&self) -> &'static str {
        match self {
            StateScope::Conversation => "ConversationState",
            StateScope::User => "UserState",
        }
    }
}

/// One state partition over an injected [`Storage`].
pub struct BotState {
    scope: StateScope,
    storage: Arc<dyn Storage>,
}

impl BotState {
    pub fn new(scope: StateScope, storage: Arc<dyn Storage>) -> Self {
        Self { scope, storage }
    }

    pub fn conversation(storage: Arc<dyn Storage>) -> Self {
        Self::new(StateScope::Conversation, storage)
    }

    pub fn user(storage: Arc<dyn Storage>) -> Self {
        Self::new(StateScope::User, storage)
    }

    /// Storage key for this partition, derived from the inbound activity.
    pub fn storage_key(&self, activity: &Activity) -> Result<String> {
        if activity.channel_id.is_empty() {
            return Err(BotError::MissingField("channelId"));
        }
        match self.scope {
            StateScope::Conversation => {
                if activity.conversation.id.is_empty() {
                    return Err(BotError::MissingField("conversation.id"));
                }
                Ok(conversation_key(&activity.channel_id, &activity.conversation.id))
            }
            StateScope::User => {
                if activity.from.id.is_empty() {
                    return Err(BotError::MissingField("from.id"));
                }
                Ok(format!("{}/users/{}", activity.channel_id, activity.from.id))
            }
        }
    }

    /// Read the partition into the turn cache. A cached copy is kept unless `force`.
    pub async fn load(&self, ctx: &mut TurnContext, force: bool) -> Result<()> {
        let name = self.scope.name();
        if !force && ctx.turn_state.contains_key(name) {
            return Ok(());
        }

        let key = self.storage_key(ctx.activity())?;
        let state = match self.storage.read(&key).await? {
            Some(Value::Object(map)) => map,
            Some(other) => {
                return Err(BotError::Storage(format!(
                    "{} at {} is not an object: {}",
                    name, key, other
                )))
            }
            None => Map::new(),
        };
        ctx.turn_state
            .insert(name.to_string(), CachedBotState::new(state));
        Ok(())
    }

    /// Write the cached partition if it changed (or unconditionally with `force`).
    pub async fn save_changes(
        &self,
        ctx: &mut TurnContext,
        force: bool,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(BotError::Cancelled);
        }

        match ctx.turn_state.get(self.scope.name()) {
            Some(cached) if force || cached.is_changed() => {}
            _ => return Ok(()),
        }

        let key = self.storage_key(ctx.activity())?;
        let Some(cached) = ctx.turn_state.get_mut(self.scope.name()) else {
            return Ok(());
        };
        self.storage
            .write(&key, Value::Object(cached.state.clone()))
            .await?;
        cached.snapshot = cached.state.clone();
        debug!("Saved {} at {}", self.scope.name(), key);
        Ok(())
    }

    /// Remove a conversation's partition outside of any turn.
    ///
    /// Only the value read here is removed. If a turn saves the partition in
    /// between, the newer value is kept and `false` is returned.
    pub async fn delete_for_reference(&self, reference: &ConversationReference) -> Result<bool> {
        if self.scope != StateScope::Conversation {
            return Err(BotError::Storage(format!(
                "{} cannot be addressed by conversation reference",
                self.scope.name()
            )));
        }
        if reference.conversation.id.is_empty() {
            return Err(BotError::MissingField("conversation.id"));
        }
        let key = conversation_key(&reference.channel_id, &reference.conversation.id);
        match self.storage.read(&key).await? {
            Some(current) => self.storage.delete_if_unchanged(&key, &current).await,
            None => Ok(false),
        }
    }

    /// Typed accessor for one named property of this partition.
    pub fn create_property<T>(self: &Arc<Self>, name: &str) -> StatePropertyAccessor<T> {
        StatePropertyAccessor {
            state: Arc::clone(self),
            name: name.to_string(),
            _marker: PhantomData,
        }
    }

    async fn cached_mut<'a>(&self, ctx: &'a mut TurnContext) -> Result<&'a mut CachedBotState> {
        self.load(ctx, false).await?;
        ctx.turn_state
            .get_mut(self.scope.name())
            .ok_or_else(|| BotError::Storage(format!("{} not loaded", self.scope.name())))
    }
}

fn conversation_key(channel_id: &str, conversation_id: &str) -> String {
    format!("{}/conversations/{}", channel_id, conversation_id)
}

/// Reads and writes one JSON property inside a [`BotState`] partition.
pub struct StatePropertyAccessor<T> {
    state: Arc<BotState>,
    name: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for StatePropertyAccessor<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            name: self.name.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> StatePropertyAccessor<T>
where
    T: Serialize + DeserializeOwned,
{
    pub async fn get(&self, ctx: &mut TurnContext) -> Result<Option<T>> {
        let cached = self.state.cached_mut(ctx).await?;
        match cached.state.get(&self.name) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    pub async fn get_or_default(&self, ctx: &mut TurnContext) -> Result<T>
    where
        T: Default,
    {
        Ok(self.get(ctx).await?.unwrap_or_default())
    }

    pub async fn set(&self, ctx: &mut TurnContext, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        let cached = self.state.cached_mut(ctx).await?;
        cached.state.insert(self.name.clone(), value);
        Ok(())
    }

    pub async fn delete(&self, ctx: &mut TurnContext) -> Result<()> {
        let cached = self.state.cached_mut(ctx).await?;
        cached.state.remove(&self.name);
        Ok(())
    }
}
