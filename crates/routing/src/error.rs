#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("handler slot \"{slot}\" is already registered")]
    DuplicateSlot { slot: String },

    #[error(transparent)]
    Channel(#[from] synebot_channels::Error),

    #[error(transparent)]
    Join(#[from] tokio::task::JoinError),
}

impl Error {
    #[must_use]
    pub fn duplicate_slot(slot: impl Into<String>) -> Self {
        Self::DuplicateSlot { slot: slot.into() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
