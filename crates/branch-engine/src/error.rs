use thiserror::Error;

/// Error types for branch operations
///
/// Every rejected mutation or selection surfaces as one of these variants.
/// Validation failures are resolved locally to `NotFound`, `Conflict` or
/// `Forbidden`; failures coming out of injected collaborators (script
/// evaluator, rule decision service) are wrapped into `System` so that a
/// scripting bug never reaches the caller as an opaque low-level fault.
///
/// # Examples
///
/// ```
/// use qflow_branch_engine::{BranchError, Result};
///
/// fn occupy() -> Result<()> {
///     Err(BranchError::conflict("service point sp-1 already serves visit v-7"))
/// }
///
/// match occupy() {
///     Err(BranchError::Conflict(msg)) => println!("conflict: {}", msg),
///     Err(e) => println!("other error: {}", e),
///     Ok(()) => {}
/// }
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BranchError {
    /// A branch, queue, service point, user, work profile, service or visit
    /// could not be located.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The operation collides with the current state: an occupied
    /// current-visit slot, an insertion index out of range, closing an
    /// already closed point, or an illegal visit state transition.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A call-rule invocation from a service point without a bound user, or
    /// whose user works under a profile the branch does not know.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Unexpected failure inside a collaborator (script evaluator, external
    /// rule decision service).
    #[error("System error: {0}")]
    System(String),

    /// Engine configuration could not be parsed or failed validation.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Caller supplied arguments that cannot be acted upon.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Coarse classification of a [`BranchError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Forbidden,
    System,
    Configuration,
    InvalidInput,
}

impl From<anyhow::Error> for BranchError {
    fn from(err: anyhow::Error) -> Self {
        // Collaborators report through anyhow; anything they raise is a
        // system-level failure from the engine's point of view.
        Self::System(format!("{:#}", err))
    }
}

impl BranchError {
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict<S: Into<String>>(msg: S) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn forbidden<S: Into<String>>(msg: S) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn system<S: Into<String>>(msg: S) -> Self {
        Self::System(msg.into())
    }

    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Classification of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::System(_) => ErrorKind::System,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
        }
    }

    /// HTTP status an outer transport layer would report for this error
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::Forbidden => 403,
            ErrorKind::InvalidInput => 400,
            ErrorKind::System | ErrorKind::Configuration => 500,
        }
    }

    /// The bare message without the kind prefix
    pub fn message(&self) -> &str {
        match self {
            Self::NotFound(m)
            | Self::Conflict(m)
            | Self::Forbidden(m)
            | Self::System(m)
            | Self::Configuration(m)
            | Self::InvalidInput(m) => m,
        }
    }
}

/// Result type for branch engine operations
pub type Result<T> = std::result::Result<T, BranchError>;
