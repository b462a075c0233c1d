use thiserror::Error;

use crate::structs::Tier;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The backend answered with a non-success status code.
    /// `message` is the server-provided message, or a generic fallback if the body carried none.
    #[error("{message}")]
    Api { status: u16, message: String },

    /// Failed to send a request to the backend.
    #[error("Failed to send a request to the backend.")]
    RequestFailed,

    /// Failed to decode a backend response.
    #[error("Failed to decode backend response.")]
    FailedToDecode,

    /// The platform store rejected or aborted a purchase request.
    #[error(transparent)]
    Purchase(#[from] PurchaseError),

    /// The backend refused a purchase receipt.
    #[error("Purchase verification failed: {0}")]
    Verification(String),

    /// No store product is configured for this tier and duration.
    #[error("Invalid subscription type or duration: {tier} for {months} month(s).")]
    UnknownSku { tier: Tier, months: u8 },

    /// Custom packages are sold through the contact flow, never through the store.
    #[error("This package is not sold in-app. Please contact us.")]
    ContactOnly,

    /// The user typed something that is not a usable stream URL.
    #[error("Please enter a valid URL.")]
    InvalidUrl(String),

    /// An operation needs a signed in user.
    #[error("You are not signed in.")]
    NotAuthenticated,

    /// Reading or writing local device storage failed.
    #[error("Local storage error: {0}")]
    Storage(String),

    /// The realtime channel failed or sent something we could not parse.
    #[error("Realtime channel error: {0}")]
    Realtime(String),

    /// A session operation was given a draft, which has no backend task yet.
    #[error("This session has not been started.")]
    MissingTaskId,

    /// A configuration value is missing or malformed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Purchase errors, categorised from the platform store's error codes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PurchaseError {
    /// The user dismissed the store sheet.
    #[error("Purchase cancelled.")]
    Cancelled,

    /// A purchase for this product is already pending.
    #[error("A purchase is already in progress.")]
    AlreadyInProgress,

    /// The store, billing service or network is unavailable.
    #[error("The store is unavailable.")]
    Unavailable,

    /// Anything the store reports without a known code.
    #[error("Purchase failed: {0}")]
    Generic(String),
}

impl PurchaseError {
    /// Maps a platform error code onto a category.
    pub fn from_code(code: &str, message: &str) -> Self {
        match code {
            "E_USER_CANCELLED" => PurchaseError::Cancelled,
            "E_ALREADY_OWNED" | "E_DEFERRED_PAYMENT" | "E_ALREADY_PREPARED" => {
                PurchaseError::AlreadyInProgress
            }
            "E_IAP_NOT_AVAILABLE" | "E_SERVICE_ERROR" | "E_NETWORK_ERROR" | "E_NOT_PREPARED"
            | "E_BILLING_RESPONSE_JSON_PARSE_ERROR" => PurchaseError::Unavailable,
            _ => PurchaseError::Generic(message.to_string()),
        }
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self, PurchaseError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
