// Shared harness for integration tests. Not every test binary uses every
// helper, so dead_code is allowed module-wide.
#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request},
    middleware,
    response::Response,
    Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

use storefront_api::{
    auth::{
        inject_auth_service, AuthConfig, AuthRateLimitConfig, AuthRateLimiter, AuthService, Role,
    },
    config::AppConfig,
    db,
    entities::{user, user_role},
    errors::ServiceError,
    events::{self, EventSender},
    handlers::AppServices,
    notifications::{EmailMessage, Mailer},
    services::{
        accounts::{RegisterInput, RegistrationOutcome},
        catalog::{CreateCategoryInput, CreateProductInput, ProductView, UpdateProductInput},
        images::ImageStore,
    },
    AppState,
};

/// Mailer that records outbound messages so tests can inspect reset links.
#[derive(Default)]
pub struct RecordingMailer {
    messages: Mutex<Vec<EmailMessage>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: EmailMessage) -> Result<(), ServiceError> {
        self.messages
            .lock()
            .expect("mailer mutex poisoned")
            .push(message);
        Ok(())
    }
}

impl RecordingMailer {
    pub fn messages(&self) -> Vec<EmailMessage> {
        self.messages.lock().expect("mailer mutex poisoned").clone()
    }
}

/// Helper harness for spinning up an application backed by a throwaway
/// SQLite database under a temp directory.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub mailer: Arc<RecordingMailer>,
    admin_token: String,
    _tmp: TempDir,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        let tmp = TempDir::new().expect("temp dir for test database");
        let db_path = tmp.path().join("storefront_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            "integration-test-secret-0123456789abcdef-0123456789abcdef-0123456789".to_string(),
            3600,
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.media_dir = tmp.path().join("media").display().to_string();
        cfg.frontend_base_url = "http://shop.test".to_string();

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = Arc::new(EventSender::new(event_tx));
        let event_task = tokio::spawn(events::process_events(event_rx));

        let auth_service = Arc::new(AuthService::new(AuthConfig::from_app_config(&cfg)));
        let rate_limiter = Arc::new(AuthRateLimiter::new(AuthRateLimitConfig::from_app_config(
            &cfg,
        )));
        let mailer = Arc::new(RecordingMailer::default());
        let image_store = ImageStore::from_config(&cfg).expect("image store for tests");

        let services = AppServices::new(
            db_arc.clone(),
            event_sender.clone(),
            auth_service.clone(),
            mailer.clone(),
            rate_limiter,
            image_store,
            &cfg,
        );

        let state = AppState {
            db: db_arc.clone(),
            config: Arc::new(cfg),
            event_sender,
            services,
        };

        let admin_token = seed_admin(db_arc.as_ref(), &auth_service).await;

        let router = Router::new()
            .nest("/api/v1", storefront_api::api_v1_routes())
            .nest("/auth", storefront_api::handlers::auth::auth_routes())
            .layer(middleware::from_fn_with_state(
                auth_service.clone(),
                inject_auth_service,
            ))
            .with_state(state.clone());

        Self {
            router,
            state,
            mailer,
            admin_token,
            _tmp: tmp,
            _event_task: event_task,
        }
    }

    /// Bearer token for the seeded admin account.
    pub fn admin_token(&self) -> &str {
        &self.admin_token
    }

    /// Directory product images are stored under for this app instance.
    pub fn media_root(&self) -> PathBuf {
        PathBuf::from(&self.state.config.media_dir)
    }

    /// Registers a shopper through the account service and logs them in.
    /// Returns the user id and a bearer token.
    pub async fn register_user(&self, email: &str, password: &str) -> (Uuid, String) {
        let outcome = self
            .state
            .services
            .accounts
            .register(RegisterInput {
                first_name: "Test".to_string(),
                last_name: "Shopper".to_string(),
                email: email.to_string(),
                password: password.to_string(),
            })
            .await
            .expect("register test user");

        let user_id = match outcome {
            RegistrationOutcome::Registered(user) => user.id,
            RegistrationOutcome::Rejected(problems) => {
                panic!("test registration rejected: {:?}", problems)
            }
        };

        let login = self
            .state
            .services
            .accounts
            .login(email, password)
            .await
            .expect("login test user");

        (user_id, login.token.token)
    }

    /// Creates a category through the catalog service.
    pub async fn seed_category(&self, name: &str) -> Uuid {
        self.state
            .services
            .catalog
            .create_category(CreateCategoryInput {
                name: name.to_string(),
            })
            .await
            .expect("seed category")
            .id
    }

    /// Creates a product (no image) through the catalog service.
    pub async fn seed_product(&self, category_id: Uuid, name: &str, price: Decimal) -> ProductView {
        self.state
            .services
            .catalog
            .create_product(
                CreateProductInput {
                    name: name.to_string(),
                    description: format!("{} seeded for integration tests", name),
                    price,
                    weight: Decimal::new(5, 1),
                    category_id,
                },
                None,
            )
            .await
            .expect("seed product")
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
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

    /// Convenience helper for requests issued with the admin token.
    pub async fn request_as_admin(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> Response {
        let token = self.admin_token.clone();
        self.request(method, uri, body, Some(&token)).await
    }

    /// Send a multipart/form-data request with plain text fields.
    pub async fn request_multipart(
        &self,
        method: Method,
        uri: &str,
        fields: &[(&str, &str)],
        token: Option<&str>,
    ) -> Response {
        let boundary = "test-boundary-7MA4YWxkTrZu0gW";
        let mut body = String::new();
        for (name, value) in fields {
            body.push_str(&format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            ));
        }
        body.push_str(&format!("--{boundary}--\r\n"));

        let mut builder = Request::builder().method(method).uri(uri).header(
            "content-type",
            format!("multipart/form-data; boundary={boundary}"),
        );
        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let request = builder
            .body(Body::from(body))
            .expect("failed to build multipart request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Waits until at least `count` emails have been handed to the mailer.
    /// Delivery is detached from the request path, so tests poll briefly.
    pub async fn wait_for_mail(&self, count: usize) -> Vec<EmailMessage> {
        for _ in 0..200 {
            let messages = self.mailer.messages();
            if messages.len() >= count {
                return messages;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!(
            "expected {} outbound emails, got {}",
            count,
            self.mailer.messages().len()
        );
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

async fn seed_admin(db: &DatabaseConnection, auth: &AuthService) -> String {
    let now = Utc::now();
    let admin = user::ActiveModel {
        id: Set(Uuid::new_v4()),
        first_name: Set("Admin".to_string()),
        last_name: Set("User".to_string()),
        email: Set("admin@storefront.test".to_string()),
        password_hash: Set(auth
            .hash_password("AdminPass123!")
            .expect("hash admin password")),
        active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .expect("insert admin user");

    let roles = vec![
        Role::User.as_ref().to_string(),
        Role::Admin.as_ref().to_string(),
    ];
    for role in &roles {
        user_role::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(admin.id),
            role_name: Set(role.clone()),
            created_at: Set(now),
        }
        .insert(db)
        .await
        .expect("insert admin role");
    }

    auth.issue_token(&admin, &roles)
        .expect("issue admin token")
        .token
}

/// A plain product creation input for service-level tests.
pub fn product_input(category_id: Uuid, name: &str, price: Decimal) -> CreateProductInput {
    CreateProductInput {
        name: name.to_string(),
        description: format!("{} seeded for integration tests", name),
        price,
        weight: Decimal::new(5, 1),
        category_id,
    }
}

/// A product update input mirroring [`product_input`], for reprice tests.
pub fn update_input(category_id: Uuid, name: &str, price: Decimal) -> UpdateProductInput {
    UpdateProductInput {
        name: name.to_string(),
        description: format!("{} seeded for integration tests", name),
        price,
        weight: Decimal::new(5, 1),
        category_id,
    }
}

/// Reads a response body as JSON. Empty bodies come back as `Null`.
pub async fn response_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("response body should be JSON")
    }
}
