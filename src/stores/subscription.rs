use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, error};

use crate::config::Platform;
use crate::errors::Result;
use crate::purchase::{sku, StoreProduct};
use crate::structs::{ApiClient, Offer, Package, Subscription, SubscriptionRecord};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubscriptionState {
    pub current_subscription: Option<Subscription>,
    pub packages: Vec<Package>,
    pub loading: bool,
    /// A store purchase is in flight. Buy buttons stay disabled until it clears.
    pub purchasing: bool,
    pub error: Option<String>,
}

/// Current entitlement and the package catalog.
pub struct SubscriptionStore {
    api: Arc<ApiClient>,
    state: RwLock<SubscriptionState>,
}

impl SubscriptionStore {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self {
            api,
            state: RwLock::new(SubscriptionState::default()),
        }
    }

    pub async fn snapshot(&self) -> SubscriptionState {
        self.state.read().await.clone()
    }

    pub async fn current(&self) -> Option<Subscription> {
        self.state.read().await.current_subscription.clone()
    }

    pub async fn is_purchasing(&self) -> bool {
        self.state.read().await.purchasing
    }

    pub async fn set_purchasing(&self, purchasing: bool) {
        self.state.write().await.purchasing = purchasing;
    }

    pub async fn set_error(&self, message: Option<String>) {
        self.state.write().await.error = message;
    }

    pub async fn fetch_current_subscription(&self) -> Result<Subscription> {
        self.begin_loading().await;

        let result = self.api.get::<Subscription>("/subscriptions/current").await;

        let mut state = self.state.write().await;
        state.loading = false;
        match &result {
            Ok(subscription) => {
                debug!("Current subscription: {}", subscription.tier);
                state.current_subscription = Some(subscription.clone());
            }
            Err(err) => {
                error!("Failed to fetch current subscription: {}", err);
                state.error = Some(err.to_string());
            }
        }

        result
    }

    pub async fn fetch_packages(&self) -> Result<Vec<Package>> {
        self.begin_loading().await;

        let result = self.api.get::<Vec<Package>>("/packages").await;

        let mut state = self.state.write().await;
        state.loading = false;
        match &result {
            Ok(packages) => {
                debug!("Fetched {} packages", packages.len());
                state.packages = packages.clone();
            }
            Err(err) => {
                error!("Failed to fetch active packages: {}", err);
                state.error = Some(err.to_string());
            }
        }

        result
    }

    pub async fn fetch_history(&self) -> Result<Vec<SubscriptionRecord>> {
        self.api.get("/subscriptions/history").await
    }

    /// Attaches the store catalog's per-duration offers to the matching packages.
    pub async fn attach_offers(&self, products: &[StoreProduct], platform: Platform) {
        let mut state = self.state.write().await;

        for package in state.packages.iter_mut() {
            let mut offers: Vec<Offer> = products
                .iter()
                .filter_map(|product| {
                    let (tier, months) = sku::lookup(platform, &product.product_id)?;
                    (tier == package.tier).then(|| Offer {
                        months,
                        sku: product.product_id.clone(),
                        price: product.price.parse().ok(),
                        formatted_price: product.localized_price.clone(),
                        offer_token: product.offers.first().map(|o| o.offer_token.clone()),
                    })
                })
                .collect();

            offers.sort_by_key(|offer| offer.months);
            package.offers = offers;
        }
    }

    async fn begin_loading(&self) {
        let mut state = self.state.write().await;
        state.loading = true;
        state.error = None;
    }
}
