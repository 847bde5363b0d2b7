#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use auth::Authenticator;
use auth::TokenLifetimes;
use session_service::errors::EmailDeliveryError;
use session_service::inbound::http::router::create_router;
use session_service::outbound::repositories::InMemorySessionRepository;
use session_service::outbound::repositories::InMemoryUserRepository;
use session_service::session::models::EmailMessage;
use session_service::session::models::SessionPolicy;
use session_service::session::ports::EmailSender;
use session_service::session::service::SessionService;
use session_service::user::models::Role;
use session_service::user::models::UserId;

pub const JWT_SECRET: &[u8] = b"test-secret-key-for-jwt-signing-at-least-32-bytes";
pub const PASSWORD: &str = "correct horse battery";

/// Email sender that keeps every message for inspection.
#[derive(Default)]
pub struct CapturingEmailSender {
    messages: Mutex<Vec<EmailMessage>>,
}

impl CapturingEmailSender {
    pub fn messages(&self) -> Vec<EmailMessage> {
        self.messages.lock().unwrap().clone()
    }

    /// Plaintext reset secret from the most recent reset email.
    pub fn last_reset_token(&self) -> Option<String> {
        self.messages()
            .iter()
            .rev()
            .find_map(|message| message.body.split("?token=").nth(1))
            .and_then(|rest| rest.split_whitespace().next())
            .map(str::to_string)
    }
}

#[async_trait]
impl EmailSender for CapturingEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailDeliveryError> {
        self.messages.lock().unwrap().push(message.clone());
        Ok(())
    }
}

pub type TestService =
    SessionService<InMemoryUserRepository, InMemorySessionRepository, CapturingEmailSender>;

/// Service wired to in-memory adapters.
pub struct TestContext {
    pub users: Arc<InMemoryUserRepository>,
    pub sessions: Arc<InMemorySessionRepository>,
    pub emails: Arc<CapturingEmailSender>,
    pub authenticator: Arc<Authenticator>,
    pub service: Arc<TestService>,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_policy(test_policy())
    }

    pub fn with_policy(policy: SessionPolicy) -> Self {
        let users = Arc::new(InMemoryUserRepository::new());
        let sessions = Arc::new(InMemorySessionRepository::new());
        let emails = Arc::new(CapturingEmailSender::default());
        let authenticator = Arc::new(Authenticator::new(
            JWT_SECRET,
            "session-service",
            "platform",
            TokenLifetimes::default(),
        ));

        let service = Arc::new(SessionService::new(
            Arc::clone(&users),
            Arc::clone(&sessions),
            Arc::clone(&emails),
            Arc::clone(&authenticator),
            policy,
        ));

        Self {
            users,
            sessions,
            emails,
            authenticator,
            service,
        }
    }

    pub async fn seed_user(&self, email: &str, role: Role) -> UserId {
        let hash = self
            .authenticator
            .hash_password(PASSWORD)
            .expect("Failed to hash password");

        self.users
            .insert_user(email, &hash, role, true)
            .await
            .expect("Failed to seed user")
    }
}

/// Policy with a short reset floor so tests stay fast.
pub fn test_policy() -> SessionPolicy {
    SessionPolicy {
        reset_response_floor: std::time::Duration::from_millis(50),
        ..SessionPolicy::default()
    }
}

/// Test application that spawns a real server
pub struct TestApp {
    pub address: String,
    pub context: TestContext,
    pub api_client: reqwest::Client,
}

impl TestApp {
    /// Spawn the application in a background task and return TestApp
    pub async fn spawn() -> Self {
        let context = TestContext::new();

        // Use random port (0 = OS assigns)
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind random port");
        let port = listener.local_addr().unwrap().port();
        let address = format!("http://127.0.0.1:{}", port);

        let application = create_router(context.service.clone());
        tokio::spawn(async move {
            axum::serve(
                listener,
                application.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .expect("Server failed");
        });

        Self {
            address,
            context,
            api_client: reqwest::Client::new(),
        }
    }

    pub fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.api_client.post(format!("{}{}", self.address, path))
    }

    pub fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.api_client.get(format!("{}{}", self.address, path))
    }

    pub fn delete(&self, path: &str) -> reqwest::RequestBuilder {
        self.api_client.delete(format!("{}{}", self.address, path))
    }

    /// Log in through the API and return the response `data` object.
    pub async fn login(&self, email: &str, password: &str) -> serde_json::Value {
        let response = self
            .post("/api/auth/login")
            .header("User-Agent", "api-tests")
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await
            .expect("Failed to execute request");
        assert_eq!(response.status(), reqwest::StatusCode::OK);

        let body: serde_json::Value = response.json().await.expect("Failed to parse response");
        body["data"].clone()
    }
}
