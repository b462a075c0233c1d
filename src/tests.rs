use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::config::{Config, Platform, MIN_COMMENTS};
use crate::errors::{ClientError, PurchaseError};
use crate::notify::{Notice, NoticeKind, Notifier};
use crate::purchase::{
    PaymentService, Purchase, PurchaseFailure, PurchaseGateway, PurchaseRequest, StoreOffer,
    StoreProduct,
};
use crate::realtime::{parse_event, Dispatcher, RealtimeChannel, RealtimeEvent};
use crate::storage::{self, KeyValueStore, MemoryStore, TOKEN_KEY};
use crate::stores::{CommentStore, SessionStore, SubscriptionStore};
use crate::structs::{ApiClient, SessionStatus, Tier, UrlItem};
use crate::tts::{SpeechEngine, TtsController};
use crate::App;

#[derive(Default)]
struct FakeGateway {
    platform: Option<Platform>,
    products: Vec<StoreProduct>,
    owned: Vec<Purchase>,
    fail_init: bool,
    fail_request: Option<PurchaseError>,
    inits: AtomicUsize,
    ends: AtomicUsize,
    requests: Mutex<Vec<PurchaseRequest>>,
    /// How many upcoming `finish_transaction` calls fail.
    finish_failures: AtomicUsize,
    finish_attempts: AtomicUsize,
    finished: Mutex<Vec<String>>,
    updates: Mutex<Option<UnboundedSender<Purchase>>>,
    errors: Mutex<Option<UnboundedSender<PurchaseFailure>>>,
}

impl FakeGateway {
    fn android() -> Self {
        Self {
            platform: Some(Platform::Android),
            products: vec![StoreProduct {
                product_id: "standard_six_months".into(),
                title: "Standard (6 months)".into(),
                price: "49.99".into(),
                localized_price: "$49.99".into(),
                offers: vec![StoreOffer {
                    offer_token: "tok-standard-6".into(),
                    formatted_price: "$49.99".into(),
                    price_amount_micros: Some(49_990_000),
                }],
            }],
            ..Default::default()
        }
    }

    fn ios() -> Self {
        Self {
            platform: Some(Platform::Ios),
            ..Default::default()
        }
    }

    fn requests(&self) -> Vec<PurchaseRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn finished(&self) -> usize {
        self.finished.lock().unwrap().len()
    }

    fn deliver(&self, purchase: Purchase) {
        let updates = self.updates.lock().unwrap();
        updates.as_ref().unwrap().send(purchase).unwrap();
    }

    fn fail(&self, failure: PurchaseFailure) {
        let errors = self.errors.lock().unwrap();
        errors.as_ref().unwrap().send(failure).unwrap();
    }
}

#[async_trait]
impl PurchaseGateway for FakeGateway {
    fn platform(&self) -> Platform {
        self.platform.unwrap_or(Platform::Android)
    }

    async fn init_connection(&self) -> Result<(), PurchaseError> {
        self.inits.fetch_add(1, Ordering::SeqCst);
        if self.fail_init {
            return Err(PurchaseError::Unavailable);
        }
        Ok(())
    }

    async fn end_connection(&self) -> Result<(), PurchaseError> {
        self.ends.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn purchase_updates(&self) -> UnboundedReceiver<Purchase> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.updates.lock().unwrap() = Some(tx);
        rx
    }

    fn purchase_errors(&self) -> UnboundedReceiver<PurchaseFailure> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.errors.lock().unwrap() = Some(tx);
        rx
    }

    async fn get_products(&self, _skus: &[String]) -> Result<Vec<StoreProduct>, PurchaseError> {
        Ok(self.products.clone())
    }

    async fn request_purchase(&self, request: PurchaseRequest) -> Result<(), PurchaseError> {
        self.requests.lock().unwrap().push(request);
        match &self.fail_request {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    async fn finish_transaction(
        &self,
        purchase: &Purchase,
        _consumable: bool,
    ) -> Result<(), PurchaseError> {
        self.finish_attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .finish_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(PurchaseError::Unavailable);
        }
        self.finished.lock().unwrap().push(purchase.dedup_key());
        Ok(())
    }

    async fn available_purchases(&self) -> Result<Vec<Purchase>, PurchaseError> {
        Ok(self.owned.clone())
    }
}

#[derive(Default)]
struct RecordingEngine {
    spoken: Mutex<Vec<String>>,
}

impl SpeechEngine for RecordingEngine {
    fn speak(&self, text: &str, _language: &str) {
        self.spoken.lock().unwrap().push(text.to_string());
    }

    fn stop(&self) {}
}

#[derive(Default)]
struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }
}

fn purchase(transaction_id: &str) -> Purchase {
    Purchase {
        product_id: "standard_monthly".into(),
        transaction_id: Some(transaction_id.into()),
        transaction_receipt: format!("receipt-{transaction_id}"),
        purchase_token: Some(format!("token-{transaction_id}")),
    }
}

fn api_for(server: &MockServer) -> Arc<ApiClient> {
    let config = Config::default().with_backend(server.uri());
    Arc::new(ApiClient::new(&config, Arc::new(MemoryStore::new())))
}

fn service_for(
    server: &MockServer,
    gateway: Arc<FakeGateway>,
) -> (PaymentService, Arc<SubscriptionStore>) {
    let api = api_for(server);
    let subscriptions = Arc::new(SubscriptionStore::new(api.clone()));
    (
        PaymentService::new(gateway, api, subscriptions.clone()),
        subscriptions,
    )
}

async fn mock_current_subscription(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/v1/subscriptions/current"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": {
            "type": "standard",
            "maxDuration": 240,
            "maxConcurrentStreams": 3,
            "startDate": "2024-05-01T00:00:00Z",
            "endDate": "2024-06-01T00:00:00Z"
        }})))
        .mount(server)
        .await;
}

async fn eventually(check: impl Fn() -> bool) {
    for _ in 0..100 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn duplicate_delivery_is_verified_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/subscriptions/verify-purchase"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": { "success": true } })))
        .expect(1)
        .mount(&server)
        .await;
    mock_current_subscription(&server).await;

    let gateway = Arc::new(FakeGateway::android());
    let (service, subscriptions) = service_for(&server, gateway.clone());
    subscriptions.set_purchasing(true).await;

    service.handle_purchase_update(purchase("GPA.1")).await;
    service.handle_purchase_update(purchase("GPA.1")).await;

    assert_eq!(gateway.finished(), 1);
    assert!(!subscriptions.is_purchasing().await);
    assert_eq!(
        subscriptions.current().await.map(|s| s.tier),
        Some(Tier::Standard)
    );
}

#[tokio::test]
async fn listener_processes_store_deliveries() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/subscriptions/verify-purchase"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": { "success": true } })))
        .expect(2)
        .mount(&server)
        .await;
    mock_current_subscription(&server).await;

    let gateway = Arc::new(FakeGateway::android());
    let (service, _) = service_for(&server, gateway.clone());
    assert!(service.initialize().await);

    gateway.deliver(purchase("GPA.1"));
    gateway.deliver(purchase("GPA.1"));
    gateway.deliver(purchase("GPA.2"));

    eventually(|| gateway.finished() == 2).await;
    service.cleanup().await;
}

#[tokio::test]
async fn rejected_receipt_still_finishes_transaction() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/subscriptions/verify-purchase"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({ "message": "Invalid receipt" })))
        .mount(&server)
        .await;

    let gateway = Arc::new(FakeGateway::android());
    let (service, subscriptions) = service_for(&server, gateway.clone());
    subscriptions.set_purchasing(true).await;

    service.handle_purchase_update(purchase("GPA.9")).await;

    assert_eq!(gateway.finished(), 1);
    assert!(!subscriptions.is_purchasing().await);
    assert!(subscriptions.current().await.is_none());
}

#[tokio::test]
async fn purchase_without_receipt_is_ignored() {
    let server = MockServer::start().await;
    let gateway = Arc::new(FakeGateway::android());
    let (service, subscriptions) = service_for(&server, gateway.clone());
    subscriptions.set_purchasing(true).await;

    let mut empty = purchase("GPA.3");
    empty.transaction_receipt.clear();
    service.handle_purchase_update(empty).await;

    assert_eq!(gateway.finished(), 0);
    assert!(!subscriptions.is_purchasing().await);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_finish_is_retried_on_redelivery() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/subscriptions/verify-purchase"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": { "success": true } })))
        .expect(2)
        .mount(&server)
        .await;
    mock_current_subscription(&server).await;

    let gateway = Arc::new(FakeGateway {
        finish_failures: AtomicUsize::new(1),
        ..FakeGateway::android()
    });
    let (service, subscriptions) = service_for(&server, gateway.clone());
    subscriptions.set_purchasing(true).await;

    service.handle_purchase_update(purchase("GPA.77")).await;
    assert_eq!(gateway.finished(), 0);
    assert!(!subscriptions.is_purchasing().await);

    service.handle_purchase_update(purchase("GPA.77")).await;
    service.handle_purchase_update(purchase("GPA.77")).await;

    assert_eq!(gateway.finish_attempts.load(Ordering::SeqCst), 2);
    assert_eq!(gateway.finished(), 1);
}

#[tokio::test]
async fn reconnect_during_verification_keeps_transaction_pending() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/subscriptions/verify-purchase"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "data": { "success": true } }))
                .set_delay(Duration::from_secs(10)),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/subscriptions/verify-purchase"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": { "success": true } })))
        .mount(&server)
        .await;
    mock_current_subscription(&server).await;

    let gateway = Arc::new(FakeGateway::android());
    let (service, _) = service_for(&server, gateway.clone());
    assert!(service.initialize().await);

    gateway.deliver(purchase("GPA.5"));
    for _ in 0..100 {
        if !server.received_requests().await.unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert!(service.reinitialize().await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(gateway.finished(), 0);

    gateway.deliver(purchase("GPA.5"));
    eventually(|| gateway.finished() == 1).await;
    service.cleanup().await;
}

#[tokio::test]
async fn initialize_is_idempotent() {
    let server = MockServer::start().await;
    let gateway = Arc::new(FakeGateway::android());
    let (service, _) = service_for(&server, gateway.clone());

    let (first, second) = tokio::join!(service.initialize(), service.initialize());
    assert!(first && second);
    assert!(service.initialize().await);

    assert_eq!(gateway.inits.load(Ordering::SeqCst), 1);
    assert!(service.is_initialized().await);
}

#[tokio::test]
async fn failed_connection_makes_purchases_unavailable() {
    let server = MockServer::start().await;
    let gateway = Arc::new(FakeGateway {
        fail_init: true,
        ..FakeGateway::android()
    });
    let (service, _) = service_for(&server, gateway.clone());

    let err = service.purchase(Tier::Basic, 1).await.unwrap_err();
    assert!(matches!(err, ClientError::Purchase(PurchaseError::Unavailable)));
    assert!(!service.is_initialized().await);
    assert!(gateway.requests().is_empty());
}

#[tokio::test]
async fn android_purchase_carries_offer_token() {
    let server = MockServer::start().await;
    let gateway = Arc::new(FakeGateway::android());
    let (service, subscriptions) = service_for(&server, gateway.clone());

    service.purchase(Tier::Standard, 6).await.unwrap();

    assert_eq!(
        gateway.requests(),
        vec![PurchaseRequest {
            sku: "standard_six_months".into(),
            offer_token: Some("tok-standard-6".into()),
        }]
    );
    assert!(subscriptions.is_purchasing().await);
}

#[tokio::test]
async fn ios_purchase_uses_sku_only() {
    let server = MockServer::start().await;
    let gateway = Arc::new(FakeGateway::ios());
    let (service, _) = service_for(&server, gateway.clone());

    service.purchase(Tier::Premium, 12).await.unwrap();

    assert_eq!(
        gateway.requests(),
        vec![PurchaseRequest {
            sku: "com.hiepnvna.tlivevoice.premium.yearly".into(),
            offer_token: None,
        }]
    );
}

#[tokio::test]
async fn purchase_rejects_tiers_without_store_product() {
    let server = MockServer::start().await;
    let gateway = Arc::new(FakeGateway::android());
    let (service, _) = service_for(&server, gateway.clone());

    assert!(matches!(
        service.purchase(Tier::Custom, 1).await,
        Err(ClientError::ContactOnly)
    ));
    assert!(matches!(
        service.purchase(Tier::Free, 1).await,
        Err(ClientError::UnknownSku { tier: Tier::Free, months: 1 })
    ));
    assert!(matches!(
        service.purchase(Tier::Basic, 3).await,
        Err(ClientError::UnknownSku { tier: Tier::Basic, months: 3 })
    ));

    assert!(gateway.requests().is_empty());
    assert_eq!(gateway.inits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn store_rejection_clears_purchasing() {
    let server = MockServer::start().await;
    let gateway = Arc::new(FakeGateway {
        fail_request: Some(PurchaseError::AlreadyInProgress),
        ..FakeGateway::android()
    });
    let (service, subscriptions) = service_for(&server, gateway.clone());

    let err = service.purchase(Tier::Basic, 1).await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Purchase(PurchaseError::AlreadyInProgress)
    ));
    assert!(!subscriptions.is_purchasing().await);
}

#[tokio::test]
async fn cancellation_is_not_an_error() {
    let server = MockServer::start().await;
    let gateway = Arc::new(FakeGateway::android());
    let (service, subscriptions) = service_for(&server, gateway.clone());

    subscriptions.set_purchasing(true).await;
    service
        .handle_purchase_error(PurchaseFailure {
            code: "E_USER_CANCELLED".into(),
            message: "User cancelled".into(),
            product_id: Some("basic_monthly".into()),
        })
        .await;

    let state = subscriptions.snapshot().await;
    assert!(!state.purchasing);
    assert!(state.error.is_none());
}

#[tokio::test]
async fn error_listener_records_store_failures() {
    let server = MockServer::start().await;
    let gateway = Arc::new(FakeGateway::android());
    let (service, subscriptions) = service_for(&server, gateway.clone());
    assert!(service.initialize().await);

    subscriptions.set_purchasing(true).await;
    gateway.fail(PurchaseFailure {
        code: "E_SERVICE_ERROR".into(),
        message: "Billing unavailable".into(),
        product_id: None,
    });

    for _ in 0..100 {
        if !subscriptions.is_purchasing().await {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let state = subscriptions.snapshot().await;
    assert!(!state.purchasing);
    assert!(state.error.is_some());
}

#[tokio::test]
async fn cleanup_only_disconnects_when_connected() {
    let server = MockServer::start().await;
    let gateway = Arc::new(FakeGateway::android());
    let (service, _) = service_for(&server, gateway.clone());

    service.cleanup().await;
    assert_eq!(gateway.ends.load(Ordering::SeqCst), 0);

    service.initialize().await;
    service.cleanup().await;
    service.cleanup().await;
    assert_eq!(gateway.ends.load(Ordering::SeqCst), 1);
    assert!(!service.is_initialized().await);

    assert!(service.reinitialize().await);
    assert_eq!(gateway.inits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn restored_purchases_are_not_processed_again() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/subscriptions/verify-purchase"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": { "success": true } })))
        .expect(2)
        .mount(&server)
        .await;
    mock_current_subscription(&server).await;

    let gateway = Arc::new(FakeGateway {
        owned: vec![purchase("GPA.10"), purchase("GPA.11")],
        ..FakeGateway::android()
    });
    let (service, subscriptions) = service_for(&server, gateway.clone());

    let restored = service.restore_purchases().await;
    assert_eq!(restored.len(), 2);
    assert!(subscriptions.current().await.is_some());

    service.handle_purchase_update(purchase("GPA.10")).await;
    assert_eq!(gateway.finished(), 0);
}

#[tokio::test]
async fn fetch_packages_attaches_store_offers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/packages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [
            { "_id": "p2", "name": "Standard", "type": "standard", "price": 9.99, "maxDuration": 240, "maxConcurrentStreams": 3 },
            { "_id": "p3", "name": "Custom", "type": "custom", "price": null, "maxDuration": -1, "maxConcurrentStreams": 20 }
        ]})))
        .mount(&server)
        .await;

    let gateway = Arc::new(FakeGateway::android());
    let (service, _) = service_for(&server, gateway.clone());

    let packages = service.fetch_packages().await.unwrap();
    let standard = packages.iter().find(|p| p.tier == Tier::Standard).unwrap();
    let offer = standard.offer(6).unwrap();
    assert_eq!(offer.offer_token.as_deref(), Some("tok-standard-6"));
    assert_eq!(offer.formatted_price, "$49.99");

    let custom = packages.iter().find(|p| p.tier == Tier::Custom).unwrap();
    assert!(custom.offers.is_empty());
}

struct Feed {
    comments: Arc<CommentStore>,
    sessions: Arc<SessionStore>,
    engine: Arc<RecordingEngine>,
    notifier: Arc<RecordingNotifier>,
    dispatcher: Dispatcher,
}

fn feed() -> Feed {
    let api = Arc::new(ApiClient::new(&Config::default(), Arc::new(MemoryStore::new())));
    let notifier = Arc::new(RecordingNotifier::default());
    let engine = Arc::new(RecordingEngine::default());
    let comments = Arc::new(CommentStore::new(MIN_COMMENTS));
    let sessions = Arc::new(SessionStore::new(api, notifier.clone()));
    let tts = Arc::new(TtsController::new(engine.clone(), "vi-VN", true));
    let dispatcher = Dispatcher::new(comments.clone(), sessions.clone(), tts, notifier.clone());

    Feed {
        comments,
        sessions,
        engine,
        notifier,
        dispatcher,
    }
}

fn running(task_id: &str, seq: u64) -> UrlItem {
    UrlItem {
        task_id: task_id.into(),
        url: format!("https://www.tiktok.com/@{task_id}/live"),
        status: SessionStatus::Running,
        created_at: Utc::now(),
        metadata: None,
        seq,
    }
}

fn comment_message(id: &str, text: &str) -> serde_json::Value {
    json!({
        "action": "update",
        "name": "comment",
        "taskId": "t-1",
        "data": {
            "id": id,
            "text": text,
            "author": { "id": "a-1", "name": "Lan" },
            "timestamp": 1714557600000i64
        }
    })
}

#[tokio::test]
async fn dispatcher_buffers_and_reads_comments() {
    let feed = feed();

    feed.dispatcher
        .dispatch(parse_event("message-task", comment_message("c-1", "xin chao")))
        .await;

    assert_eq!(feed.comments.len(), 1);
    assert_eq!(
        *feed.engine.spoken.lock().unwrap(),
        vec!["Lan: xin chao".to_string()]
    );
}

#[tokio::test]
async fn dispatcher_drops_stale_status() {
    let feed = feed();
    feed.sessions.set_urls(vec![running("t-1", 5)]).await;

    feed.dispatcher
        .dispatch(RealtimeEvent::Status {
            task_id: "t-1".into(),
            status: SessionStatus::Stopped,
            seq: Some(4),
        })
        .await;
    assert_eq!(
        feed.sessions.get("t-1").await.unwrap().status,
        SessionStatus::Running
    );

    feed.dispatcher
        .dispatch(RealtimeEvent::Status {
            task_id: "t-1".into(),
            status: SessionStatus::Stopped,
            seq: Some(6),
        })
        .await;
    let item = feed.sessions.get("t-1").await.unwrap();
    assert_eq!(item.status, SessionStatus::Stopped);
    assert_eq!(item.seq, 6);
}

#[tokio::test]
async fn dispatcher_surfaces_realtime_errors() {
    let feed = feed();

    feed.dispatcher
        .dispatch(RealtimeEvent::Error {
            message: "Live ended".into(),
        })
        .await;

    let notices = feed.notifier.notices.lock().unwrap();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].kind, NoticeKind::Failure);
    assert_eq!(notices[0].message, "Live ended");
}

async fn next_text(ws: &mut WebSocketStream<TcpStream>) -> String {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return text,
            Some(Ok(_)) => continue,
            other => panic!("socket closed early: {other:?}"),
        }
    }
}

#[tokio::test]
async fn realtime_channel_joins_room_and_applies_events() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let mut seen = Vec::new();

        ws.send(Message::Text(
            r#"0{"sid":"e1","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#.into(),
        ))
        .await
        .unwrap();
        seen.push(next_text(&mut ws).await);

        ws.send(Message::Text(r#"40{"sid":"s1"}"#.into())).await.unwrap();
        seen.push(next_text(&mut ws).await);

        ws.send(Message::Text("2".into())).await.unwrap();
        seen.push(next_text(&mut ws).await);

        let event = json!(["message-task", comment_message("c-7", "hello")]);
        ws.send(Message::Text(format!("42{event}"))).await.unwrap();
        seen.push(next_text(&mut ws).await);

        seen
    });

    let feed = feed();
    let url = format!("ws://{addr}/socket.io/?EIO=4&transport=websocket");
    let channel = RealtimeChannel::connect(&url, "u-1", feed.dispatcher.clone())
        .await
        .unwrap();
    assert!(channel.is_open());

    eventually(|| feed.comments.len() == 1).await;
    assert_eq!(feed.comments.snapshot()[0].text, "hello");

    channel.disconnect().await;

    let seen = server.await.unwrap();
    assert_eq!(
        seen,
        vec![
            "40".to_string(),
            r#"42["join-room",{"userId":"u-1"}]"#.to_string(),
            "3".to_string(),
            "41".to_string(),
        ]
    );
}

async fn mock_signed_in_backend(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/v1/users/profile"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": {
            "_id": "u-1",
            "email": "streamer@example.com",
            "avatar": null
        }})))
        .mount(server)
        .await;
    mock_current_subscription(server).await;
    Mock::given(method("GET"))
        .and(path("/api/v1/packages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/comments/active"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [{
            "_id": "t-1",
            "source": "https://www.tiktok.com/@lan/live",
            "status": "running",
            "createdAt": "2024-05-01T10:00:00Z",
            "seq": 3
        }]})))
        .mount(server)
        .await;
}

#[tokio::test]
async fn app_restores_signed_in_session() {
    let server = MockServer::start().await;
    mock_signed_in_backend(&server).await;

    let store = Arc::new(MemoryStore::new());
    store.set(TOKEN_KEY, "jwt-1").await.unwrap();

    let gateway = Arc::new(FakeGateway::android());
    let app = App::builder(Config::default().with_backend(server.uri()), gateway.clone())
        .storage(store.clone())
        .speech(Arc::new(RecordingEngine::default()))
        .notifier(Arc::new(RecordingNotifier::default()))
        .build()
        .await
        .unwrap();

    assert!(app.start().await.unwrap());
    assert_eq!(app.user.user_id().await.as_deref(), Some("u-1"));
    assert!(app.payments.is_initialized().await);
    assert_eq!(gateway.inits.load(Ordering::SeqCst), 1);
    assert!(app.subscriptions.current().await.is_some());
    assert_eq!(app.sessions.urls().await.len(), 1);

    assert_eq!(app.set_max_comments(5).await.unwrap(), MIN_COMMENTS);
    let prefs = storage::load_preferences(store.as_ref()).await.unwrap();
    assert_eq!(prefs.max_comments, MIN_COMMENTS);

    app.shutdown().await;
    assert_eq!(gateway.ends.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn app_without_token_stays_signed_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/users/profile"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let gateway = Arc::new(FakeGateway::android());
    let app = App::builder(Config::default().with_backend(server.uri()), gateway.clone())
        .storage(Arc::new(MemoryStore::new()))
        .build()
        .await
        .unwrap();

    assert!(!app.start().await.unwrap());
    assert!(!app.payments.is_initialized().await);
    assert!(matches!(
        app.connect_realtime().await,
        Err(ClientError::NotAuthenticated)
    ));
}
