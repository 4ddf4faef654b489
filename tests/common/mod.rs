#![allow(dead_code)]

use std::net::TcpListener;
use std::sync::Arc;

use campus_auth::auth::PasswordHasher;
use campus_auth::configuration::{get_configuration, StoreBackend};
use campus_auth::domain::{NewUser, Role};
use campus_auth::startup::{run, Services};
use campus_auth::store::{MemoryStore, UserStore};
use serde_json::{json, Value};
use wiremock::MockServer;

pub struct TestApp {
    pub address: String,
    pub store: Arc<MemoryStore>,
    pub email_server: MockServer,
    pub client: reqwest::Client,
}

/// Start the full server on a random port, backed by the in-memory store
/// and a mock email API.
pub async fn spawn_app() -> TestApp {
    let email_server = MockServer::start().await;

    let mut configuration = get_configuration().expect("Failed to read configuration.");
    configuration.application.store = StoreBackend::Memory;
    configuration.password.hash_cost = 4;
    configuration.email_client.base_url = email_server.uri();

    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    let store = Arc::new(MemoryStore::new());
    let services = Services::new(&configuration, store.clone(), store.clone())
        .expect("Failed to build services");

    let server = run(listener, services, configuration.jwt.clone()).expect("Failed to bind address");
    let _ = tokio::spawn(server);

    TestApp {
        address,
        store,
        email_server,
        client: reqwest::Client::new(),
    }
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub async fn post_json(&self, path: &str, body: &Value) -> reqwest::Response {
        self.client
            .post(&self.url(path))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn get_with_token(&self, path: &str, token: &str) -> reqwest::Response {
        self.client
            .get(&self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn register(&self, email: &str, password: &str) -> reqwest::Response {
        self.post_json(
            "/auth/register",
            &json!({ "email": email, "password": password }),
        )
        .await
    }

    pub async fn login(&self, email: &str, password: &str) -> reqwest::Response {
        self.post_json("/auth/login", &json!({ "email": email, "password": password }))
            .await
    }

    /// Log in and return the parsed `AuthResponse`
    pub async fn login_json(&self, email: &str, password: &str) -> Value {
        let response = self.login(email, password).await;
        assert_eq!(200, response.status().as_u16());
        response.json().await.expect("Failed to parse response")
    }

    /// Admins cannot register themselves; they are seeded directly
    pub async fn seed_user(&self, email: &str, password: &str, role: Role) {
        let password_hash = PasswordHasher::new(4)
            .unwrap()
            .hash(password)
            .await
            .unwrap();
        UserStore::create(
            self.store.as_ref(),
            NewUser {
                email: email.to_string(),
                password_hash,
                role,
            },
        )
        .await
        .expect("Failed to seed user");
    }
}
