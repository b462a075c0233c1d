use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Profile returned by `GET /users/profile`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(rename = "_id")]
    pub id: String,
    pub email: String,
    /// Avatar of the user. This can either be an image URL or null.
    #[serde(default)]
    pub avatar: Option<String>,

    #[serde(default)]
    pub subscription: Option<UserSubscription>,
}

/// Subscription summary embedded in the profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSubscription {
    pub package_id: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: SubscriptionStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Expired,
    Cancelled,
}
