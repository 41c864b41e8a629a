use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Fatal store errors. The operation that produced one had no effect.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("expects string as the type, but found {found}")]
    InvalidType { found: &'static str },

    #[error("cannot register the root module by using register_module")]
    RootRegistration,

    #[error("module path not found: \"{path}\"")]
    PathNotFound { path: String },

    #[error(transparent)]
    Action(#[from] ActionError),

    #[error("store has been dropped")]
    StoreDropped,
}

/// Rejection value of an action handler.
///
/// Cheap to clone so the same rejection can be handed to the devtools bridge
/// and to the dispatching caller.
#[derive(Clone)]
pub struct ActionError(Arc<anyhow::Error>);

impl ActionError {
    pub fn new(err: impl Into<anyhow::Error>) -> Self {
        Self(Arc::new(err.into()))
    }

    pub fn msg(message: impl fmt::Display + fmt::Debug + Send + Sync + 'static) -> Self {
        Self(Arc::new(anyhow::Error::msg(message)))
    }

    pub fn inner(&self) -> &anyhow::Error {
        &self.0
    }
}

impl fmt::Debug for ActionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for ActionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl std::error::Error for ActionError {}

impl From<anyhow::Error> for ActionError {
    fn from(err: anyhow::Error) -> Self {
        Self(Arc::new(err))
    }
}

// Lets action handlers `?` on nested commit/dispatch calls.
impl From<StoreError> for ActionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Action(inner) => inner,
            other => Self::new(other),
        }
    }
}

/// Errors raised while loading a [`StoreConfig`](crate::config::StoreConfig).
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid store config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid value {value:?} for {var}")]
    Env { var: &'static str, value: String },
}
