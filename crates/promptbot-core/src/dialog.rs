//! Dialog seam — the multi-turn engine the handler delegates message turns to.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::state::StatePropertyAccessor;
use crate::turn::TurnContext;

/// Property name of the dialog state inside conversation state.
pub const DIALOG_STATE_PROPERTY: &str = "DialogState";

/// Where a multi-turn exchange currently is. Opaque to the turn handler.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogState {
    #[serde(default)]
    pub dialog_stack: Vec<DialogInstance>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogInstance {
    pub id: String,
    #[serde(default)]
    pub state: serde_json::Value,
}

pub type DialogStateAccessor = StatePropertyAccessor<DialogState>;

/// A multi-step conversational state machine.
#[async_trait]
pub trait Dialog: Send + Sync {
    fn id(&self) -> &str;

    /// Advance the dialog by one inbound message.
    async fn run(
        &self,
        ctx: &mut TurnContext,
        state: &DialogStateAccessor,
        cancel: &CancellationToken,
    ) -> Result<()>;
}
