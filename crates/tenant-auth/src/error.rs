//! Authentication error types.

use thiserror::Error;

/// Closed error taxonomy returned to callers of the public API.
///
/// Provider wording never leaks past this type, so call sites can match on
/// variants instead of message text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Wrong email or password
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// Account exists but the email address has not been confirmed
    #[error("Email address has not been confirmed")]
    UnconfirmedEmail,

    /// Sign-up for an email that already has an account
    #[error("An account with this email already exists")]
    AlreadyRegistered,

    /// Input rejected by the provider (weak password, malformed email, ...)
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// Transport failure or provider-side error
    #[error("Network or provider error: {0}")]
    NetworkOrProvider(String),

    /// Authenticated user has no tenant profile yet
    #[error("User profile has not been provisioned")]
    ProfileNotProvisioned,

    /// Anything the classifier does not recognise
    #[error("Authentication failed: {0}")]
    Unknown(String),
}

impl AuthError {
    /// Returns true if this error is transient and the operation can be retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, AuthError::NetworkOrProvider(_))
    }
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;

/// Raw failure reported by an identity provider, before classification.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ProviderError {
    /// HTTP status, when the provider answered.
    pub status: Option<u16>,
    /// Machine-readable error code, when the provider sends one.
    pub code: Option<String>,
    /// Human-readable message from the provider.
    pub message: String,
    /// The request never got a usable answer (connect, timeout, decode).
    pub transport: bool,
}

impl ProviderError {
    /// An error answered by the provider.
    pub fn rejected(status: Option<u16>, code: Option<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            transport: false,
        }
    }

    /// A transport-level failure.
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            code: None,
            message: message.into(),
            transport: true,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(error: reqwest::Error) -> Self {
        ProviderError::transport(error.to_string())
    }
}

const CODE_TABLE: &[(&str, ErrorKind)] = &[
    // `invalid_grant` covers several failures and is left to the message table
    ("invalid_credentials", ErrorKind::InvalidCredentials),
    ("email_not_confirmed", ErrorKind::UnconfirmedEmail),
    ("user_already_exists", ErrorKind::AlreadyRegistered),
    ("email_exists", ErrorKind::AlreadyRegistered),
    ("weak_password", ErrorKind::Validation),
    ("validation_failed", ErrorKind::Validation),
    ("email_address_invalid", ErrorKind::Validation),
];

const MESSAGE_TABLE: &[(&str, ErrorKind)] = &[
    ("invalid login credentials", ErrorKind::InvalidCredentials),
    ("email not confirmed", ErrorKind::UnconfirmedEmail),
    ("already registered", ErrorKind::AlreadyRegistered),
    ("already exists", ErrorKind::AlreadyRegistered),
    ("password should be", ErrorKind::Validation),
    ("invalid format", ErrorKind::Validation),
    ("valid email", ErrorKind::Validation),
    ("valid password", ErrorKind::Validation),
];

#[derive(Clone, Copy)]
enum ErrorKind {
    InvalidCredentials,
    UnconfirmedEmail,
    AlreadyRegistered,
    Validation,
}

impl From<ProviderError> for AuthError {
    fn from(error: ProviderError) -> Self {
        if error.transport {
            return AuthError::NetworkOrProvider(error.message);
        }

        let by_code = error.code.as_deref().and_then(|code| {
            let code = code.to_ascii_lowercase();
            CODE_TABLE
                .iter()
                .find(|(known, _)| *known == code)
                .map(|(_, kind)| *kind)
        });

        let kind = by_code.or_else(|| {
            let message = error.message.to_ascii_lowercase();
            MESSAGE_TABLE
                .iter()
                .find(|(fragment, _)| message.contains(fragment))
                .map(|(_, kind)| *kind)
        });

        match kind {
            Some(ErrorKind::InvalidCredentials) => AuthError::InvalidCredentials,
            Some(ErrorKind::UnconfirmedEmail) => AuthError::UnconfirmedEmail,
            Some(ErrorKind::AlreadyRegistered) => AuthError::AlreadyRegistered,
            Some(ErrorKind::Validation) => AuthError::ValidationFailed(error.message),
            None if error.status.is_some_and(|s| s >= 500 || s == 429) => {
                AuthError::NetworkOrProvider(error.message)
            }
            None => AuthError::Unknown(error.message),
        }
    }
}

/// Failure of a single tenant data store read.
#[derive(Error, Debug)]
pub enum DirectoryError {
    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success response from the data store
    #[error("Data store returned {status} ({body_summary})")]
    Status { status: u16, body_summary: String },

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Backend unavailable for another reason
    #[error("Data store unavailable: {0}")]
    Unavailable(String),
}

/// Which read of a resolution failed.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("profile lookup failed: {0}")]
    Profile(#[source] DirectoryError),

    #[error("organization lookup failed: {0}")]
    Organization(#[source] DirectoryError),

    #[error("role lookup failed: {0}")]
    Roles(#[source] DirectoryError),
}
