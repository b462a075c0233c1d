use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::{Config, Preferences};
use crate::errors::{ClientError, Result};
use crate::notify::{Notifier, TracingNotifier};
use crate::purchase::{PaymentService, PurchaseGateway};
use crate::realtime::{Dispatcher, RealtimeChannel};
use crate::storage::{self, FileStore, KeyValueStore};
use crate::stores::{CommentStore, SessionStore, SubscriptionStore, UserStore};
use crate::structs::ApiClient;
use crate::tts::{SilentEngine, SpeechEngine, TtsController};

/// Builds an [`App`]. The purchase gateway is the only required platform piece.
pub struct AppBuilder {
    config: Config,
    gateway: Arc<dyn PurchaseGateway>,
    storage: Option<Arc<dyn KeyValueStore>>,
    speech: Option<Arc<dyn SpeechEngine>>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl AppBuilder {
    pub fn storage(mut self, storage: Arc<dyn KeyValueStore>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn speech(mut self, speech: Arc<dyn SpeechEngine>) -> Self {
        self.speech = Some(speech);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub async fn build(self) -> Result<App> {
        let storage: Arc<dyn KeyValueStore> = match self.storage {
            Some(storage) => storage,
            None => Arc::new(FileStore::open(&self.config.data_dir).await?),
        };
        let notifier = self.notifier.unwrap_or_else(|| Arc::new(TracingNotifier));
        let speech = self.speech.unwrap_or_else(|| Arc::new(SilentEngine));

        let prefs = storage::load_preferences(storage.as_ref()).await?;

        let api = Arc::new(ApiClient::new(&self.config, storage.clone()));
        let user = Arc::new(UserStore::new(api.clone()));
        let subscriptions = Arc::new(SubscriptionStore::new(api.clone()));
        let sessions = Arc::new(SessionStore::new(api.clone(), notifier.clone()));
        let comments = Arc::new(CommentStore::new(prefs.max_comments));
        let tts = Arc::new(TtsController::new(speech, prefs.tts_language, prefs.auto_read));
        let payments = Arc::new(PaymentService::new(
            self.gateway,
            api.clone(),
            subscriptions.clone(),
        ));

        Ok(App {
            config: self.config,
            storage,
            notifier,
            api,
            user,
            subscriptions,
            sessions,
            comments,
            tts,
            payments,
            realtime: Mutex::new(None),
        })
    }
}

/// Every store and service of the client, wired together.
pub struct App {
    pub config: Config,
    pub storage: Arc<dyn KeyValueStore>,
    pub notifier: Arc<dyn Notifier>,
    pub api: Arc<ApiClient>,
    pub user: Arc<UserStore>,
    pub subscriptions: Arc<SubscriptionStore>,
    pub sessions: Arc<SessionStore>,
    pub comments: Arc<CommentStore>,
    pub tts: Arc<TtsController>,
    pub payments: Arc<PaymentService>,
    realtime: Mutex<Option<RealtimeChannel>>,
}

impl App {
    pub fn builder(config: Config, gateway: Arc<dyn PurchaseGateway>) -> AppBuilder {
        AppBuilder {
            config,
            gateway,
            storage: None,
            speech: None,
            notifier: None,
        }
    }

    /// Restores the previous session. Returns whether a user is signed in.
    pub async fn start(&self) -> Result<bool> {
        info!("Starting client v{}", env!("CARGO_PKG_VERSION"));

        if !self.user.validate_token().await? {
            info!("No valid session, sign in required");
            return Ok(false);
        }

        self.after_sign_in().await;
        Ok(true)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<()> {
        self.user.sign_in(email, password).await?;
        self.after_sign_in().await;
        Ok(())
    }

    pub async fn sign_in_google(&self, id_token: &str) -> Result<bool> {
        let signed_in = self.user.sign_in_google(id_token).await?;
        if signed_in {
            self.after_sign_in().await;
        }
        Ok(signed_in)
    }

    /// Handles an incoming deep link; auth callbacks sign the user in.
    pub async fn handle_deep_link(&self, url: &str) -> Result<bool> {
        let signed_in = self.user.handle_deep_link(url).await?;
        if signed_in {
            self.after_sign_in().await;
        }
        Ok(signed_in)
    }

    pub async fn sign_out(&self) -> Result<()> {
        self.disconnect_realtime().await;
        self.payments.reset().await;
        self.sessions.clear().await;
        self.comments.clear();
        self.tts.stop();
        self.user.sign_out().await
    }

    /// Joins the signed in user's realtime room.
    pub async fn connect_realtime(&self) -> Result<()> {
        let user_id = self.user.user_id().await.ok_or(ClientError::NotAuthenticated)?;

        let mut realtime = self.realtime.lock().await;
        if realtime.as_ref().is_some_and(RealtimeChannel::is_open) {
            return Ok(());
        }

        let url = self.config.socket_url()?;
        let channel = RealtimeChannel::connect(url.as_str(), &user_id, self.dispatcher()).await?;
        *realtime = Some(channel);
        Ok(())
    }

    pub async fn disconnect_realtime(&self) {
        if let Some(channel) = self.realtime.lock().await.take() {
            channel.disconnect().await;
        }
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(
            self.comments.clone(),
            self.sessions.clone(),
            self.tts.clone(),
            self.notifier.clone(),
        )
    }

    pub fn preferences(&self) -> Preferences {
        let tts = self.tts.snapshot();
        Preferences {
            max_comments: self.comments.max(),
            tts_language: tts.language,
            auto_read: tts.auto_read,
        }
    }

    /// Changes the comment buffer bound and persists it. Returns the bound applied.
    pub async fn set_max_comments(&self, max: usize) -> Result<usize> {
        let max = self.comments.set_max(max);
        self.save_preferences().await?;
        Ok(max)
    }

    pub async fn set_tts_language(&self, language: &str) -> Result<()> {
        self.tts.set_language(language);
        self.save_preferences().await
    }

    pub async fn toggle_auto_read(&self) -> Result<bool> {
        let enabled = self.tts.toggle_auto_read();
        self.save_preferences().await?;
        Ok(enabled)
    }

    /// Disconnects everything that holds platform resources.
    pub async fn shutdown(&self) {
        self.disconnect_realtime().await;
        self.payments.cleanup().await;
        info!("Client shut down");
    }

    async fn save_preferences(&self) -> Result<()> {
        storage::save_preferences(self.storage.as_ref(), &self.preferences()).await
    }

    async fn after_sign_in(&self) {
        if !self.payments.reinitialize().await {
            warn!("In-app purchases unavailable");
        }

        if let Err(err) = self.subscriptions.fetch_current_subscription().await {
            warn!("Could not load current subscription: {}", err);
        }

        if let Err(err) = self.payments.fetch_packages().await {
            warn!("Could not load packages: {}", err);
        }

        if let Err(err) = self.sessions.fetch_active_urls().await {
            warn!("Could not load active sessions: {}", err);
        }
    }
}
