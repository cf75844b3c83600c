use thiserror::Error;

/// Unified error type for polyglot-core
///
/// This enum encompasses all error cases that can occur in the library:
/// - Request validation (missing text, no resolvable default model)
/// - Model resolution (unknown logical model name)
/// - Authentication (missing or rejected tokens under strict auth)
/// - Adapter construction and translation failures
/// - Configuration loading and validation
/// - Adapter registration
///
/// The enum is `Clone` (all payloads are strings) so that a single build
/// failure can be observed by every caller waiting on the same shared
/// construction future in the registry.
#[derive(Error, Debug, Clone)]
pub enum Error {
    // ==========================================================================
    // Request Errors
    // ==========================================================================
    /// The request is malformed (empty text, no default model configured, ...)
    #[error("{0}")]
    BadRequest(String),

    /// The logical model name is not present in the configuration
    #[error("unknown model '{0}'")]
    NotFound(String),

    // ==========================================================================
    // Adapter Errors
    // ==========================================================================
    /// Authentication failed or a required token could not be resolved
    #[error("[{model}] {reason}")]
    Auth { model: String, reason: String },

    /// Adapter construction failed (resource unavailable, bad parameters, ...)
    #[error("[{model}] {reason}")]
    Setup { model: String, reason: String },

    /// Translation failed on an already-set-up adapter
    #[error("[{model}] {reason}")]
    Translate { model: String, reason: String },

    /// The adapter kind referenced by a model entry has no registered constructor
    #[error("unknown adapter kind '{kind}' for model '{model}'")]
    UnknownAdapter { model: String, kind: String },

    /// An adapter kind was registered twice
    #[error("adapter kind '{0}' is already registered")]
    DuplicateRegistration(String),

    // ==========================================================================
    // Configuration Errors
    // ==========================================================================
    /// Failed to read or parse a configuration file
    #[error("failed to load config: {0}")]
    ConfigLoad(String),

    /// Invalid configuration value
    #[error("invalid config value for '{field}': {reason}")]
    ConfigInvalid { field: String, reason: String },
}

impl Error {
    /// Whether this error already carries a user-facing classification.
    ///
    /// The dispatcher re-raises classified errors as-is and wraps everything
    /// else into [`Error::Translate`] annotated with the logical model name.
    pub const fn is_classified(&self) -> bool {
        matches!(
            self,
            Self::BadRequest(_)
                | Self::NotFound(_)
                | Self::Auth { .. }
                | Self::Setup { .. }
                | Self::Translate { .. }
        )
    }

    /// Construct a setup error for the given logical model name.
    pub fn setup(model: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Setup {
            model: model.into(),
            reason: reason.into(),
        }
    }

    /// Construct an authentication error for the given logical model name.
    pub fn auth(model: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Auth {
            model: model.into(),
            reason: reason.into(),
        }
    }

    /// Construct a translation error for the given logical model name.
    pub fn translate(model: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Translate {
            model: model.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
