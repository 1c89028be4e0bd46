use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request},
    Router,
};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use serde_json::Value;
use sha2::Sha256;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

use sellx_api::{
    auth::{AuthConfig, AuthService},
    config::AppConfig,
    db,
    entities::{order, product},
    errors::ServiceError,
    events::{self, EventSender},
    gateway::{CreateIntentRequest, PaymentGateway, PaymentIntent},
    handlers::AppServices,
    AppState,
};

pub const TEST_GATEWAY_SECRET: &str = "rzp_test_secret_for_integration";

/// Gateway stand-in: mints deterministic intents locally and accepts the
/// same HMAC-SHA256 confirmation signatures production would.
pub struct FakeGateway {
    key_secret: String,
    minted: AtomicU64,
}

impl FakeGateway {
    pub fn new(key_secret: &str) -> Self {
        Self {
            key_secret: key_secret.to_string(),
            minted: AtomicU64::new(0),
        }
    }

    /// How many intents have been minted so far.
    #[allow(dead_code)]
    pub fn minted(&self) -> u64 {
        self.minted.load(Ordering::SeqCst)
    }

    /// The confirmation signature the gateway would send for this pair.
    pub fn sign(&self, intent_id: &str, payment_id: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.key_secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(format!("{}|{}", intent_id, payment_id).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

#[async_trait::async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_intent(
        &self,
        request: CreateIntentRequest,
    ) -> Result<PaymentIntent, ServiceError> {
        let n = self.minted.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(PaymentIntent {
            id: format!("order_fake{:08}", n),
            amount_minor: request.amount_minor,
            currency: request.currency,
            receipt: request.receipt,
            status: "created".to_string(),
        })
    }

    fn verify_signature(&self, intent_id: &str, payment_id: &str, signature: &str) -> bool {
        self.sign(intent_id, payment_id) == signature
    }
}

/// Helper harness for spinning up an application state backed by a
/// throwaway SQLite database, with the fake gateway wired in.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub gateway: Arc<FakeGateway>,
    user_id: Uuid,
    token: String,
    _db_dir: tempfile::TempDir,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        let db_dir = tempfile::tempdir().expect("create temp dir for test database");
        let db_path = db_dir.path().join("sellx_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            "test_secret_key_for_testing_purposes_only_32chars".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.auto_migrate = true;
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let gateway = Arc::new(FakeGateway::new(TEST_GATEWAY_SECRET));
        let gateway_dyn: Arc<dyn PaymentGateway> = gateway.clone();
        let services = AppServices::new(
            db_arc.clone(),
            gateway_dyn,
            Arc::new(event_sender.clone()),
            Arc::new(cfg.clone()),
        );

        let auth_service = AuthService::new(AuthConfig::from(&cfg));
        let user_id = Uuid::new_v4();
        let token = auth_service
            .issue_token(user_id)
            .expect("issue bearer token for tests");

        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
            auth_service,
        };

        let router = Router::new()
            .nest("/api/v1", sellx_api::api_v1_routes())
            .with_state(state.clone());

        Self {
            router,
            state,
            gateway,
            user_id,
            token,
            _db_dir: db_dir,
            _event_task: event_task,
        }
    }

    /// Buyer id the default token authenticates as.
    #[allow(dead_code)]
    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    /// Access the bearer token for the default buyer.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Mint a bearer token for a different buyer.
    #[allow(dead_code)]
    pub fn token_for(&self, user_id: Uuid) -> String {
        self.state
            .auth_service
            .issue_token(user_id)
            .expect("issue bearer token for tests")
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Convenience helper for authenticated JSON requests.
    pub async fn request_authenticated(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        self.request(method, uri, body, Some(self.token())).await
    }

    /// Insert a live listing owned by a random seller.
    pub async fn seed_product(&self, title: &str, price: Decimal, stock: i32) -> product::Model {
        self.seed_product_for_seller(Uuid::new_v4(), title, price, stock)
            .await
    }

    /// Insert a live listing owned by the given seller.
    pub async fn seed_product_for_seller(
        &self,
        seller_id: Uuid,
        title: &str,
        price: Decimal,
        stock: i32,
    ) -> product::Model {
        let now = Utc::now();
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            seller_id: Set(seller_id),
            title: Set(title.to_string()),
            price: Set(price),
            stock: Set(stock),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed product for tests")
    }

    /// Flip a listing's active flag.
    #[allow(dead_code)]
    pub async fn set_product_active(&self, product_id: Uuid, is_active: bool) {
        let found = product::Entity::find_by_id(product_id)
            .one(&*self.state.db)
            .await
            .expect("load product")
            .expect("product exists");
        let mut active: product::ActiveModel = found.into();
        active.is_active = Set(is_active);
        active.updated_at = Set(Utc::now());
        active.update(&*self.state.db).await.expect("update product");
    }

    /// Set a listing's remaining stock.
    #[allow(dead_code)]
    pub async fn set_product_stock(&self, product_id: Uuid, stock: i32) {
        let found = product::Entity::find_by_id(product_id)
            .one(&*self.state.db)
            .await
            .expect("load product")
            .expect("product exists");
        let mut active: product::ActiveModel = found.into();
        active.stock = Set(stock);
        active.updated_at = Set(Utc::now());
        active.update(&*self.state.db).await.expect("update product");
    }

    /// Rewind an order's creation time, e.g. to push it out of the
    /// checkout dedup window.
    #[allow(dead_code)]
    pub async fn backdate_order(&self, order_id: Uuid, created_at: DateTime<Utc>) {
        let found = order::Entity::find_by_id(order_id)
            .one(&*self.state.db)
            .await
            .expect("load order")
            .expect("order exists");
        let mut active: order::ActiveModel = found.into();
        active.created_at = Set(created_at);
        active.update(&*self.state.db).await.expect("backdate order");
    }

    /// Fetch an order row directly from the database.
    #[allow(dead_code)]
    pub async fn find_order(&self, order_id: Uuid) -> Option<order::Model> {
        order::Entity::find_by_id(order_id)
            .one(&*self.state.db)
            .await
            .expect("load order")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}
