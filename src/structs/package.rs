use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Subscription package level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Basic,
    Standard,
    Premium,
    /// Negotiated package. Has no store product and is sold through the contact flow.
    Custom,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Basic => "basic",
            Tier::Standard => "standard",
            Tier::Premium => "premium",
            Tier::Custom => "custom",
        }
    }

    /// Whether this tier can be bought through the platform store.
    pub fn is_store_tier(&self) -> bool {
        matches!(self, Tier::Basic | Tier::Standard | Tier::Premium)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for Tier {
    fn default() -> Self {
        Tier::Free
    }
}

/// Maximum length of a single monitored stream. The backend sends `-1` for unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum StreamLimit {
    Unlimited,
    Minutes(u32),
}

impl From<i64> for StreamLimit {
    fn from(value: i64) -> Self {
        if value < 0 {
            StreamLimit::Unlimited
        } else {
            StreamLimit::Minutes(value.min(u32::MAX as i64) as u32)
        }
    }
}

impl From<StreamLimit> for i64 {
    fn from(value: StreamLimit) -> Self {
        match value {
            StreamLimit::Unlimited => -1,
            StreamLimit::Minutes(minutes) => minutes as i64,
        }
    }
}

impl Default for StreamLimit {
    fn default() -> Self {
        StreamLimit::Minutes(0)
    }
}

/// A store offer for one duration of a package, attached from the platform catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub months: u8,
    pub sku: String,
    /// Numeric price as reported by the store, if it could be parsed.
    pub price: Option<f64>,
    /// Price string localized by the store, e.g. "$4.99".
    pub formatted_price: String,
    /// Android only: the offer token to send with the purchase request.
    pub offer_token: Option<String>,
}

/// A purchasable tier as listed by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Package {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub tier: Tier,
    /// `None` for custom packages.
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub formatted_price: Option<String>,
    pub max_duration: StreamLimit,
    pub max_concurrent_streams: u32,
    #[serde(default)]
    pub features: Vec<String>,
    /// Filled from the store catalog, never sent by the backend.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub offers: Vec<Offer>,
}

impl Package {
    /// Free packages need no purchase and custom ones route to the contact flow.
    pub fn is_purchasable(&self) -> bool {
        self.tier.is_store_tier()
    }

    pub fn offer(&self, months: u8) -> Option<&Offer> {
        self.offers.iter().find(|offer| offer.months == months)
    }
}

/// The user's current entitlement.
/// Expiry is decided by the backend; an expired subscription comes back as the free tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    #[serde(rename = "type")]
    pub tier: Tier,
    pub max_duration: StreamLimit,
    pub max_concurrent_streams: u32,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    /// Absent for the free tier.
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
}

impl Subscription {
    pub fn is_free(&self) -> bool {
        self.tier == Tier::Free
    }
}

/// One row of the user's purchase history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub tier: Tier,
    #[serde(default)]
    pub price: Option<f64>,
    pub duration_months: u8,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: String,
}
