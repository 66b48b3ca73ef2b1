use chrono::{Duration, Utc};
use reqwest::header::COOKIE;
use reseller_auth::auth::{hash_password, ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME};
use reseller_auth::clock::ManualClock;
use reseller_auth::configuration::{
    ApplicationSettings, DatabaseSettings, Environment, JwtSettings, RateLimitSettings, Settings,
};
use reseller_auth::startup::run;
use reseller_auth::state::{AppState, InMemoryBackends};
use reseller_auth::storage::User;
use serde_json::{json, Value};
use std::net::TcpListener;
use std::sync::Arc;
use uuid::Uuid;

pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
    pub backends: InMemoryBackends,
    pub clock: ManualClock,
}

fn test_settings() -> Settings {
    Settings {
        database: DatabaseSettings {
            username: "postgres".to_string(),
            password: "password".to_string(),
            port: 5432,
            host: "localhost".to_string(),
            database_name: "unused".to_string(),
            migrate_on_startup: false,
        },
        application: ApplicationSettings {
            host: "127.0.0.1".to_string(),
            port: 0,
            environment: Environment::Local,
        },
        jwt: JwtSettings {
            secret: "integration-secret-key-at-least-32-chars".to_string(),
            issuer: "integration".to_string(),
        },
        rate_limit: RateLimitSettings::default(),
    }
}

fn cookie_client() -> reqwest::Client {
    reqwest::Client::builder()
        .cookie_store(true)
        .build()
        .expect("Failed to build client")
}

async fn spawn_app() -> TestApp {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    let clock = ManualClock::default();
    let (state, backends) = AppState::in_memory(&test_settings(), Arc::new(clock.clone()))
        .expect("Failed to build application state");

    let server = run(listener, state).expect("Failed to bind address");
    let _ = tokio::spawn(server);

    TestApp {
        address,
        client: cookie_client(),
        backends,
        clock,
    }
}

impl TestApp {
    async fn post_json(&self, path: &str, body: &Value) -> reqwest::Response {
        self.client
            .post(&format!("{}{}", self.address, path))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    async fn post(&self, path: &str) -> reqwest::Response {
        self.client
            .post(&format!("{}{}", self.address, path))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(&format!("{}{}", self.address, path))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    async fn register(&self, email: &str, password: &str) -> reqwest::Response {
        self.post_json(
            "/auth/register",
            &json!({ "full_name": "John Doe", "email": email, "password": password }),
        )
        .await
    }

    async fn login(&self, email: &str, password: &str) -> reqwest::Response {
        self.post_json("/auth/login", &json!({ "email": email, "password": password }))
            .await
    }

    fn seed_user(&self, email: &str, password: &str, is_admin: bool, email_verified: bool) -> User {
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            full_name: "Seeded User".to_string(),
            email_verified,
            is_admin,
            credential: hash_password(password).expect("Failed to hash password"),
            created_at: Utc::now(),
        };
        self.backends.users.seed(user.clone()).expect("Failed to seed user");
        user
    }
}

fn cookie_value(response: &reqwest::Response, name: &str) -> Option<String> {
    response
        .cookies()
        .find(|c| c.name() == name)
        .map(|c| c.value().to_string())
}

// --- Registration ---

#[tokio::test]
async fn register_returns_201_and_does_not_sign_in() {
    let app = spawn_app().await;

    let response = app.register("john@example.com", "SecurePass123").await;

    assert_eq!(201, response.status().as_u16());
    assert!(cookie_value(&response, ACCESS_COOKIE_NAME).is_none());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["email"], "john@example.com");
    assert_eq!(body["email_verified"], false);
    assert!(body.get("credential").is_none());
}

#[tokio::test]
async fn register_rejects_duplicate_email_with_409() {
    let app = spawn_app().await;
    app.register("john@example.com", "SecurePass123").await;

    let response = app.register("JOHN@example.com", "SecurePass123").await;

    assert_eq!(409, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "DUPLICATE_ENTRY");
}

#[tokio::test]
async fn register_rejects_weak_password_with_400() {
    let app = spawn_app().await;

    let response = app.register("john@example.com", "password").await;

    assert_eq!(400, response.status().as_u16());
}

#[tokio::test]
async fn register_accepts_emails_with_underscores_and_dashes() {
    let app = spawn_app().await;

    for email in ["wasp_fan@example.com", "jo--ann@example.com", "xp_user@example.com"] {
        let response = app.register(email, "SecurePass123").await;
        assert_eq!(201, response.status().as_u16(), "rejected {}", email);
    }
}

// --- Login and cookies ---

#[tokio::test]
async fn login_sets_strict_http_only_cookies() {
    let app = spawn_app().await;
    app.register("john@example.com", "SecurePass123").await;

    let response = app.login("john@example.com", "SecurePass123").await;

    assert_eq!(200, response.status().as_u16());
    let cookies: Vec<_> = response.cookies().collect();
    assert_eq!(cookies.len(), 2);
    for cookie in &cookies {
        assert!(cookie.http_only());
        assert!(cookie.same_site_strict());
        assert_eq!(cookie.path(), Some("/"));
        assert!(!cookie.secure());
    }
    let access = cookies.iter().find(|c| c.name() == ACCESS_COOKIE_NAME).unwrap();
    let refresh = cookies.iter().find(|c| c.name() == REFRESH_COOKIE_NAME).unwrap();
    assert_eq!(access.max_age(), Some(std::time::Duration::from_secs(900)));
    assert_eq!(refresh.max_age(), Some(std::time::Duration::from_secs(604_800)));
}

#[tokio::test]
async fn login_then_me_returns_the_user() {
    let app = spawn_app().await;
    app.register("john@example.com", "SecurePass123").await;
    app.login("john@example.com", "SecurePass123").await;

    let response = app.get("/api/me").await;

    assert_eq!(200, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["email"], "john@example.com");
}

#[tokio::test]
async fn wrong_password_and_unknown_email_look_the_same() {
    let app = spawn_app().await;
    app.register("john@example.com", "SecurePass123").await;

    let wrong = app.login("john@example.com", "WrongPass123").await;
    let unknown = app.login("nobody@example.com", "SecurePass123").await;

    assert_eq!(401, wrong.status().as_u16());
    assert_eq!(401, unknown.status().as_u16());
    let wrong: Value = wrong.json().await.unwrap();
    let unknown: Value = unknown.json().await.unwrap();
    assert_eq!(wrong["message"], unknown["message"]);
    assert_eq!(wrong["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn failed_login_reports_the_request_id_as_error_id() {
    let app = spawn_app().await;

    let response = app.login("nobody@example.com", "SecurePass123").await;

    assert_eq!(401, response.status().as_u16());
    let request_id = response
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .expect("Missing x-request-id header");
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error_id"], request_id.as_str());
}

#[tokio::test]
async fn me_without_cookie_is_401() {
    let app = spawn_app().await;

    let response = app.get("/api/me").await;

    assert_eq!(401, response.status().as_u16());
}

#[tokio::test]
async fn sixth_login_attempt_is_rate_limited() {
    let app = spawn_app().await;
    app.register("john@example.com", "SecurePass123").await;

    for _ in 0..5 {
        let response = app.login("john@example.com", "WrongPass123").await;
        assert_eq!(401, response.status().as_u16());
    }

    let response = app.login("John@Example.com", "SecurePass123").await;
    assert_eq!(429, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "RATE_LIMITED");

    app.clock.advance(Duration::seconds(60));
    let response = app.login("john@example.com", "SecurePass123").await;
    assert_eq!(200, response.status().as_u16());
}

// --- Refresh rotation ---

#[tokio::test]
async fn refresh_rotates_and_rejects_the_old_token() {
    let app = spawn_app().await;
    app.register("john@example.com", "SecurePass123").await;
    let login = app.login("john@example.com", "SecurePass123").await;
    let old_refresh = cookie_value(&login, REFRESH_COOKIE_NAME).unwrap();

    let rotated = app.post("/auth/refresh").await;
    assert_eq!(200, rotated.status().as_u16());
    let new_refresh = cookie_value(&rotated, REFRESH_COOKIE_NAME).unwrap();
    assert_ne!(old_refresh, new_refresh);

    let replay = reqwest::Client::new()
        .post(&format!("{}/auth/refresh", app.address))
        .header(COOKIE, format!("{}={}", REFRESH_COOKIE_NAME, old_refresh))
        .send()
        .await
        .unwrap();
    assert_eq!(401, replay.status().as_u16());

    // The rotated session still works
    let again = app.post("/auth/refresh").await;
    assert_eq!(200, again.status().as_u16());
}

#[tokio::test]
async fn refresh_without_cookie_is_401() {
    let app = spawn_app().await;

    let response = app.post("/auth/refresh").await;

    assert_eq!(401, response.status().as_u16());
}

#[tokio::test]
async fn expired_access_token_recovers_through_refresh() {
    let app = spawn_app().await;
    app.register("john@example.com", "SecurePass123").await;
    app.login("john@example.com", "SecurePass123").await;

    app.clock.advance(Duration::minutes(16));
    // Only the server clock moved; the cookie is still sent
    let expired = app.get("/api/me").await;
    assert_eq!(401, expired.status().as_u16());

    let refreshed = app.post("/auth/refresh").await;
    assert_eq!(200, refreshed.status().as_u16());

    let me = app.get("/api/me").await;
    assert_eq!(200, me.status().as_u16());
}

// --- Logout ---

#[tokio::test]
async fn logout_clears_cookies_and_kills_the_session() {
    let app = spawn_app().await;
    app.register("john@example.com", "SecurePass123").await;
    let login = app.login("john@example.com", "SecurePass123").await;
    let refresh = cookie_value(&login, REFRESH_COOKIE_NAME).unwrap();

    let response = app.post("/auth/logout").await;
    assert_eq!(204, response.status().as_u16());
    assert_eq!(cookie_value(&response, ACCESS_COOKIE_NAME).as_deref(), Some(""));

    let me = app.get("/api/me").await;
    assert_eq!(401, me.status().as_u16());

    let replay = reqwest::Client::new()
        .post(&format!("{}/auth/refresh", app.address))
        .header(COOKIE, format!("{}={}", REFRESH_COOKIE_NAME, refresh))
        .send()
        .await
        .unwrap();
    assert_eq!(401, replay.status().as_u16());

    // Logging out again is fine
    let again = app.post("/auth/logout").await;
    assert_eq!(204, again.status().as_u16());
}

#[tokio::test]
async fn logout_all_revokes_every_session() {
    let app = spawn_app().await;
    app.register("john@example.com", "SecurePass123").await;
    let other_device = cookie_client();
    other_device
        .post(&format!("{}/auth/login", app.address))
        .json(&json!({ "email": "john@example.com", "password": "SecurePass123" }))
        .send()
        .await
        .unwrap();
    app.login("john@example.com", "SecurePass123").await;

    let response = app.post("/api/me/logout-all").await;
    assert_eq!(200, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["revoked_sessions"], 2);

    let other_refresh = other_device
        .post(&format!("{}/auth/refresh", app.address))
        .send()
        .await
        .unwrap();
    assert_eq!(401, other_refresh.status().as_u16());
}

// --- Password change ---

#[tokio::test]
async fn password_change_revokes_sessions_and_accepts_new_password() {
    let app = spawn_app().await;
    app.register("john@example.com", "SecurePass123").await;
    app.login("john@example.com", "SecurePass123").await;

    let response = app
        .post_json(
            "/api/me/password",
            &json!({ "current_password": "SecurePass123", "new_password": "BrandNewPass456" }),
        )
        .await;
    assert_eq!(204, response.status().as_u16());

    let refresh = app.post("/auth/refresh").await;
    assert_eq!(401, refresh.status().as_u16());

    let old = app.login("john@example.com", "SecurePass123").await;
    assert_eq!(401, old.status().as_u16());
    let new = app.login("john@example.com", "BrandNewPass456").await;
    assert_eq!(200, new.status().as_u16());
}

// --- Administrator routes ---

#[tokio::test]
async fn admin_audit_is_forbidden_for_regular_users() {
    let app = spawn_app().await;
    app.seed_user("user@example.com", "SecurePass123", false, true);
    app.login("user@example.com", "SecurePass123").await;

    let response = app.get("/api/admin/audit").await;

    assert_eq!(403, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "FORBIDDEN");
}

#[tokio::test]
async fn admin_audit_lists_recent_events_for_administrators() {
    let app = spawn_app().await;
    app.seed_user("admin@example.com", "SecurePass123", true, true);
    app.login("admin@example.com", "WrongPass123").await;
    app.login("admin@example.com", "SecurePass123").await;

    let response = app.get("/api/admin/audit?limit=10").await;

    assert_eq!(200, response.status().as_u16());
    let entries: Vec<Value> = response.json().await.unwrap();
    assert_eq!(entries[0]["event_type"], "login_succeeded");
    assert_eq!(entries[1]["event_type"], "login_failed");
}

#[tokio::test]
async fn unverified_administrator_signs_in_but_is_forbidden() {
    let app = spawn_app().await;
    app.seed_user("admin@example.com", "SecurePass123", true, false);

    let login = app.login("admin@example.com", "SecurePass123").await;
    assert_eq!(200, login.status().as_u16());
    assert_eq!(app.backends.sessions.len(), 1);

    let me = app.get("/api/me").await;
    assert_eq!(200, me.status().as_u16());

    let audit = app.get("/api/admin/audit").await;
    assert_eq!(403, audit.status().as_u16());
}
