use std::sync::{Arc, Mutex as StdMutex, MutexGuard};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::dedup::{Delivery, ProcessedSet};
use super::gateway::{Purchase, PurchaseFailure, PurchaseGateway, PurchaseRequest, StoreProduct};
use super::sku;
use crate::config::{Platform, CONTACT_URL};
use crate::errors::{ClientError, PurchaseError, Result};
use crate::links;
use crate::stores::SubscriptionStore;
use crate::structs::{ApiClient, Package, Tier};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VerifyPurchaseBody<'a> {
    product_id: &'a str,
    transaction_id: Option<&'a str>,
    transaction_receipt: &'a str,
    platform: Platform,
}

struct Listeners {
    updates: JoinHandle<()>,
    errors: JoinHandle<()>,
}

/// A transaction marked as processed while its delivery is handled.
/// Dropping it uncommitted unmarks the transaction, so the store's next
/// delivery of it is handled again.
struct Claim<'a> {
    processed: &'a StdMutex<ProcessedSet>,
    key: String,
    committed: bool,
}

impl Claim<'_> {
    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        if !self.committed {
            debug!("Transaction {} left unprocessed", self.key);
            lock(self.processed).forget(&self.key);
        }
    }
}

fn lock(processed: &StdMutex<ProcessedSet>) -> MutexGuard<'_, ProcessedSet> {
    processed.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct Shared {
    gateway: Arc<dyn PurchaseGateway>,
    api: Arc<ApiClient>,
    subscriptions: Arc<SubscriptionStore>,
    processed: StdMutex<ProcessedSet>,
    catalog: RwLock<Vec<StoreProduct>>,
}

/// Bridges the platform store and the backend's subscription ledger.
///
/// `purchase` only opens the store sheet. The outcome arrives later on the update
/// listener, which verifies the receipt with the backend and then finishes the
/// transaction with the store.
pub struct PaymentService {
    shared: Arc<Shared>,
    /// `Some` while connected. Also serialises concurrent `initialize` calls.
    listeners: Mutex<Option<Listeners>>,
}

impl PaymentService {
    pub fn new(
        gateway: Arc<dyn PurchaseGateway>,
        api: Arc<ApiClient>,
        subscriptions: Arc<SubscriptionStore>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                gateway,
                api,
                subscriptions,
                processed: StdMutex::new(ProcessedSet::default()),
                catalog: RwLock::new(Vec::new()),
            }),
            listeners: Mutex::new(None),
        }
    }

    pub fn platform(&self) -> Platform {
        self.shared.gateway.platform()
    }

    pub async fn is_initialized(&self) -> bool {
        self.listeners.lock().await.is_some()
    }

    /// Connects to the store and registers the purchase listeners.
    /// Returns `true` when connected, including when it already was.
    pub async fn initialize(&self) -> bool {
        let mut listeners = self.listeners.lock().await;
        if listeners.is_some() {
            return true;
        }

        if let Err(err) = self.shared.gateway.init_connection().await {
            error!("Failed to initialize IAP: {}", err);
            return false;
        }

        let mut updates = self.shared.gateway.purchase_updates();
        let mut errors = self.shared.gateway.purchase_errors();

        let shared = self.shared.clone();
        let updates = tokio::spawn(async move {
            while let Some(purchase) = updates.recv().await {
                shared.handle_purchase_update(purchase).await;
            }
            debug!("Purchase update listener closed");
        });

        let shared = self.shared.clone();
        let errors = tokio::spawn(async move {
            while let Some(failure) = errors.recv().await {
                shared.handle_purchase_error(failure).await;
            }
            debug!("Purchase error listener closed");
        });

        *listeners = Some(Listeners { updates, errors });
        info!("IAP connected ({})", self.platform());
        true
    }

    /// Queries the store for every configured SKU and caches the result.
    /// Failures and empty catalogs both yield an empty list.
    pub async fn list_available_offers(&self) -> Vec<StoreProduct> {
        if !self.is_initialized().await {
            debug!("Initializing IAP...");
            self.initialize().await;
        }

        let skus = sku::all_skus(self.platform());
        match self.shared.gateway.get_products(&skus).await {
            Ok(products) => {
                if products.is_empty() {
                    warn!(
                        "No products returned for {}. Check that the products exist in the store console and that the account is a licensed tester.",
                        self.platform()
                    );
                } else {
                    debug!("Received {} products", products.len());
                }
                *self.shared.catalog.write().await = products.clone();
                products
            }
            Err(err) => {
                error!("Failed to get products: {}", err);
                Vec::new()
            }
        }
    }

    /// Loads the backend packages and decorates them with the store's offers.
    pub async fn fetch_packages(&self) -> Result<Vec<Package>> {
        self.shared.subscriptions.fetch_packages().await?;

        let products = self.list_available_offers().await;
        self.shared
            .subscriptions
            .attach_offers(&products, self.platform())
            .await;

        Ok(self.shared.subscriptions.snapshot().await.packages)
    }

    /// Opens the store purchase flow for `tier` over `months` months.
    ///
    /// Returning `Ok` only means the store accepted the request.
    pub async fn purchase(&self, tier: Tier, months: u8) -> Result<()> {
        if tier == Tier::Custom {
            return Err(ClientError::ContactOnly);
        }

        let sku = sku::resolve_sku(self.platform(), tier, months)?;

        if !self.initialize().await {
            return Err(PurchaseError::Unavailable.into());
        }

        let offer_token = match self.platform() {
            Platform::Android => self.offer_token(sku).await,
            Platform::Ios => None,
        };

        info!("Attempting to purchase SKU: {}", sku);
        self.shared.subscriptions.set_purchasing(true).await;

        let request = PurchaseRequest {
            sku: sku.to_string(),
            offer_token,
        };

        if let Err(err) = self.shared.gateway.request_purchase(request).await {
            error!("Failed to purchase subscription: {}", err);
            self.shared.subscriptions.set_purchasing(false).await;
            return Err(err.into());
        }

        Ok(())
    }

    /// Re-verifies everything the store still holds for this account.
    pub async fn restore_purchases(&self) -> Vec<Purchase> {
        if !self.initialize().await {
            return Vec::new();
        }

        let purchases = match self.shared.gateway.available_purchases().await {
            Ok(purchases) => purchases,
            Err(err) => {
                error!("Failed to restore purchases: {}", err);
                return Vec::new();
            }
        };

        for purchase in &purchases {
            let claim = self.shared.claim(purchase.dedup_key());

            if let Err(err) = self.shared.verify(purchase).await {
                error!("Failed to restore purchases: {}", err);
                return Vec::new();
            }

            if let Some(claim) = claim {
                claim.commit();
            }
        }

        if !purchases.is_empty() {
            self.shared.refresh_subscription().await;
        }

        purchases
    }

    /// Body of the purchase-update listener.
    pub async fn handle_purchase_update(&self, purchase: Purchase) {
        self.shared.handle_purchase_update(purchase).await;
    }

    /// Body of the purchase-error listener.
    pub async fn handle_purchase_error(&self, failure: PurchaseFailure) {
        self.shared.handle_purchase_error(failure).await;
    }

    /// Drops both listeners and closes the store connection. Safe when not initialized.
    pub async fn cleanup(&self) {
        let Some(listeners) = self.listeners.lock().await.take() else {
            return;
        };

        listeners.updates.abort();
        listeners.errors.abort();

        if let Err(err) = self.shared.gateway.end_connection().await {
            warn!("Failed to end IAP connection: {}", err);
        }

        info!("IAP disconnected");
    }

    /// Reconnects after a sign in so listeners run for the new account.
    pub async fn reinitialize(&self) -> bool {
        self.cleanup().await;
        self.initialize().await
    }

    /// Disconnects and forgets processed transactions on sign out.
    pub async fn reset(&self) {
        self.cleanup().await;
        lock(&self.shared.processed).clear();
        self.shared.catalog.write().await.clear();
    }

    /// Custom packages are negotiated; sends the user to the contact page.
    pub fn open_contact(&self) -> bool {
        links::open_external(CONTACT_URL)
    }

    async fn offer_token(&self, sku: &str) -> Option<String> {
        if let Some(token) = self.cached_offer_token(sku).await {
            return Some(token);
        }

        self.list_available_offers().await;

        let token = self.cached_offer_token(sku).await;
        if token.is_none() {
            warn!("No offer token found for {}", sku);
        }
        token
    }

    async fn cached_offer_token(&self, sku: &str) -> Option<String> {
        self.shared
            .catalog
            .read()
            .await
            .iter()
            .find(|product| product.product_id == sku)
            .and_then(|product| product.offers.first())
            .map(|offer| offer.offer_token.clone())
    }
}

impl Shared {
    async fn handle_purchase_update(&self, purchase: Purchase) {
        if purchase.transaction_receipt.is_empty() {
            warn!("Ignoring purchase of {} without receipt", purchase.product_id);
            self.subscriptions.set_purchasing(false).await;
            return;
        }

        let Some(claim) = self.claim(purchase.dedup_key()) else {
            return;
        };

        match self.verify(&purchase).await {
            Ok(_) => {
                info!("Purchase of {} verified", purchase.product_id);
                self.refresh_subscription().await;
            }
            Err(err) => error!("Error verifying purchase with backend: {}", err),
        }

        match self.gateway.finish_transaction(&purchase, true).await {
            Ok(()) => claim.commit(),
            Err(err) => error!("Failed to finish transaction {}: {}", claim.key, err),
        }

        self.subscriptions.set_purchasing(false).await;
    }

    /// Marks `key` as processed. `None` when it already is.
    fn claim(&self, key: String) -> Option<Claim<'_>> {
        if let Delivery::Repeat(count) = lock(&self.processed).observe(&key) {
            debug!("Skipping delivery #{} of transaction {}", count, key);
            return None;
        }

        Some(Claim {
            processed: &self.processed,
            key,
            committed: false,
        })
    }

    async fn handle_purchase_error(&self, failure: PurchaseFailure) {
        let category = failure.category();

        if category.is_cancellation() {
            info!("Purchase cancelled by user");
        } else {
            error!(
                "Purchase error {} ({}): {}",
                failure.code,
                failure.product_id.as_deref().unwrap_or("-"),
                failure.message
            );
            self.subscriptions.set_error(Some(category.to_string())).await;
        }

        self.subscriptions.set_purchasing(false).await;
    }

    async fn verify(&self, purchase: &Purchase) -> Result<Value> {
        let body = VerifyPurchaseBody {
            product_id: &purchase.product_id,
            transaction_id: purchase.transaction_id.as_deref(),
            transaction_receipt: &purchase.transaction_receipt,
            platform: self.gateway.platform(),
        };

        self.api
            .post::<Value, _>("/subscriptions/verify-purchase", &body)
            .await
            .map_err(|err| match err {
                ClientError::Api { message, .. } => ClientError::Verification(message),
                other => other,
            })
    }

    async fn refresh_subscription(&self) {
        if let Err(err) = self.subscriptions.fetch_current_subscription().await {
            warn!("Subscription refresh after purchase failed: {}", err);
        }
    }
}
