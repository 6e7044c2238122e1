//! Error type shared by the turn pipeline and its collaborators.

/// Errors raised by delivery, state and dialog collaborators.
///
/// The handler never recovers from these; they travel to the host's
/// turn-failure policy unchanged.
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("Activity is missing {0}")]
    MissingField(&'static str),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Dialog error: {0}")]
    Dialog(String),

    #[error("Operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, BotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BotError::MissingField("conversation.id");
        assert_eq!(err.to_string(), "Activity is missing conversation.id");

        let err = BotError::Delivery("connector closed".to_string());
        assert_eq!(err.to_string(), "Delivery failed: connector closed");
    }

    #[test]
    fn test_serde_error_converts() {
        let parse = serde_json::from_str::<serde_json::Value>("{not json");
        let err: BotError = parse.unwrap_err().into();
        assert!(matches!(err, BotError::Serialization(_)));
    }
}
