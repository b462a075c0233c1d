use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::config::Platform;
use crate::errors::PurchaseError;

/// A purchase delivered by the store's update listener.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Purchase {
    pub product_id: String,
    /// Store transaction id (`GPA.xxxx` on Android). Some stores omit it for restored purchases.
    pub transaction_id: Option<String>,
    /// Opaque proof of purchase forwarded to the backend.
    pub transaction_receipt: String,
    /// Android only.
    #[serde(default)]
    pub purchase_token: Option<String>,
}

impl Purchase {
    /// Key used to recognise repeated deliveries of the same transaction.
    pub fn dedup_key(&self) -> String {
        match &self.transaction_id {
            Some(id) if !id.is_empty() => id.clone(),
            _ => serde_json::to_string(self).unwrap_or_else(|_| self.transaction_receipt.clone()),
        }
    }
}

/// An error delivered by the store's error listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseFailure {
    pub code: String,
    pub message: String,
    pub product_id: Option<String>,
}

impl PurchaseFailure {
    pub fn category(&self) -> PurchaseError {
        PurchaseError::from_code(&self.code, &self.message)
    }
}

/// Android subscription offer (base plan) with its own price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreOffer {
    pub offer_token: String,
    pub formatted_price: String,
    pub price_amount_micros: Option<i64>,
}

/// Catalog entry as reported by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreProduct {
    pub product_id: String,
    pub title: String,
    /// Decimal price string, e.g. "4.99".
    pub price: String,
    pub localized_price: String,
    #[serde(default)]
    pub offers: Vec<StoreOffer>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseRequest {
    pub sku: String,
    pub offer_token: Option<String>,
}

/// The platform in-app purchase SDK.
///
/// Purchase results never come back from `request_purchase`; they arrive on the
/// receivers handed out by `purchase_updates` and `purchase_errors`.
#[async_trait]
pub trait PurchaseGateway: Send + Sync {
    fn platform(&self) -> Platform;

    /// Opens the connection to the store's billing service.
    async fn init_connection(&self) -> Result<(), PurchaseError>;

    async fn end_connection(&self) -> Result<(), PurchaseError>;

    /// Registers a purchase-update listener.
    fn purchase_updates(&self) -> UnboundedReceiver<Purchase>;

    /// Registers a purchase-error listener.
    fn purchase_errors(&self) -> UnboundedReceiver<PurchaseFailure>;

    async fn get_products(&self, skus: &[String]) -> Result<Vec<StoreProduct>, PurchaseError>;

    async fn request_purchase(&self, request: PurchaseRequest) -> Result<(), PurchaseError>;

    /// Acknowledges a transaction so the store stops delivering it.
    async fn finish_transaction(
        &self,
        purchase: &Purchase,
        consumable: bool,
    ) -> Result<(), PurchaseError>;

    async fn available_purchases(&self) -> Result<Vec<Purchase>, PurchaseError>;
}
