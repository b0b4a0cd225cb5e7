#![allow(dead_code)]

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::{Sha256, Sha512};
use taskmarket_core::PinCost;
use taskmarket_server::config::BankDirectoryEntry;
use taskmarket_server::{router, AppState, Config};
use tower::ServiceExt;

pub const YOUVERIFY_SECRET: &str = "yv_test_secret";
pub const PAYSTACK_SECRET: &str = "sk_test_paystack";
pub const ADMIN_KEY: &str = "test-admin-key-0123456789";

pub fn test_config() -> Config {
    let env = |key: &str| match key {
        "TASKMARKET_YOUVERIFY_SECRET" => Some(YOUVERIFY_SECRET.to_string()),
        "TASKMARKET_PAYSTACK_SECRET" => Some(PAYSTACK_SECRET.to_string()),
        "TASKMARKET_ADMIN_KEY" => Some(ADMIN_KEY.to_string()),
        "TASKMARKET_AUTO_RELEASE_DAYS" => Some("7".to_string()),
        _ => None,
    };
    let mut config = Config::resolve(None, &env).unwrap();
    config.market.pin_cost = PinCost::minimal();
    config.bank_directory.push(BankDirectoryEntry {
        bank_code: "058".to_string(),
        account_number: "0123456789".to_string(),
        account_name: "Ada Obi Nwosu".to_string(),
    });
    config
}

pub fn app() -> Router {
    router(AppState::new(test_config()).unwrap())
}

pub struct Call<'a> {
    method: &'a str,
    uri: String,
    token: Option<String>,
    headers: Vec<(String, String)>,
    body: Option<Vec<u8>>,
    content_type: &'static str,
}

impl<'a> Call<'a> {
    pub fn new(method: &'a str, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            token: None,
            headers: Vec::new(),
            body: None,
            content_type: "application/json",
        }
    }

    pub fn get(uri: impl Into<String>) -> Self {
        Self::new("GET", uri)
    }

    pub fn post(uri: impl Into<String>) -> Self {
        Self::new("POST", uri)
    }

    pub fn token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn admin(self) -> Self {
        self.header("x-admin-key", ADMIN_KEY)
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body.to_string().into_bytes());
        self
    }

    pub fn raw(mut self, body: &str) -> Self {
        self.body = Some(body.as_bytes().to_vec());
        self
    }

    pub fn content_type(mut self, content_type: &'static str) -> Self {
        self.content_type = content_type;
        self
    }

    pub async fn send(self, app: &Router) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(self.method).uri(&self.uri);
        if let Some(token) = &self.token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        if self.body.is_some() {
            builder = builder.header("content-type", self.content_type);
        }
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let request = builder
            .body(self.body.map(Body::from).unwrap_or_else(Body::empty))
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::String(
                String::from_utf8_lossy(&bytes).into_owned(),
            ))
        };
        (status, value)
    }
}

pub fn sign_youverify(body: &str) -> String {
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(YOUVERIFY_SECRET.as_bytes()).unwrap();
    mac.update(body.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

pub fn sign_paystack(body: &str) -> String {
    let mut mac = <Hmac<Sha512> as Mac>::new_from_slice(PAYSTACK_SECRET.as_bytes()).unwrap();
    mac.update(body.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Sign up and return `(user_id, token)`.
pub async fn signup(app: &Router, email: &str, user_type: &str) -> (String, String) {
    let (status, body) = Call::post("/api/auth/signup")
        .json(serde_json::json!({ "email": email, "user_type": user_type }))
        .send(app)
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    (
        body["user"]["id"].as_str().unwrap().to_string(),
        body["token"].as_str().unwrap().to_string(),
    )
}

pub async fn verify(app: &Router, user_id: &str) {
    let (status, body) = Call::post(format!("/api/admin/users/{user_id}/verification"))
        .admin()
        .json(serde_json::json!({ "kyc_status": "verified" }))
        .send(app)
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
}

/// A client and a verified freelancer hired on one task.
pub struct Hired {
    pub client: String,
    pub freelancer: String,
    pub task_id: String,
}

/// Sign up both parties, post a task and hire the freelancer.
pub async fn hire(app: &Router) -> Hired {
    let (client_id, client) = signup(app, "client@example.com", "client").await;
    let (freelancer_id, freelancer) = signup(app, "ada@example.com", "freelancer").await;
    verify(app, &client_id).await;
    verify(app, &freelancer_id).await;

    let (status, task) = Call::post("/api/tasks")
        .token(&client)
        .json(serde_json::json!({
            "title": "Brand identity",
            "budget_min": 5000000,
            "budget_max": 15000000,
            "publish": true
        }))
        .send(app)
        .await;
    assert_eq!(status, StatusCode::CREATED, "{task}");
    let task_id = task["id"].as_str().unwrap().to_string();

    let (_, application) = Call::post(format!("/api/tasks/{task_id}/applications"))
        .token(&freelancer)
        .json(serde_json::json!({ "proposed_budget": 10000000 }))
        .send(app)
        .await;
    let (status, _) = Call::post(format!(
        "/api/applications/{}/accept",
        application["id"].as_str().unwrap()
    ))
    .token(&client)
    .send(app)
    .await;
    assert_eq!(status, StatusCode::OK);

    Hired {
        client,
        freelancer,
        task_id,
    }
}

/// Open a pending ₦100,000 escrow with two milestones; returns the escrow view.
pub async fn open_escrow(app: &Router, hired: &Hired) -> Value {
    let (status, escrow) = Call::post(format!("/api/tasks/{}/escrow", hired.task_id))
        .token(&hired.client)
        .json(serde_json::json!({ "milestones": [
            { "title": "Concepts", "amount": 4000000 },
            { "title": "Final assets", "amount": 6000000 }
        ]}))
        .send(app)
        .await;
    assert_eq!(status, StatusCode::CREATED, "{escrow}");
    escrow
}

/// Deliver a signed Paystack event; returns the response status and body.
pub async fn paystack(app: &Router, event: Value) -> (StatusCode, Value) {
    let body = event.to_string();
    Call::post("/api/webhooks/paystack")
        .header("x-paystack-signature", &sign_paystack(&body))
        .raw(&body)
        .send(app)
        .await
}

pub async fn escrow(app: &Router, hired: &Hired) -> Value {
    let (status, escrow) = Call::get(format!("/api/tasks/{}/escrow", hired.task_id))
        .token(&hired.client)
        .send(app)
        .await;
    assert_eq!(status, StatusCode::OK, "{escrow}");
    escrow
}
