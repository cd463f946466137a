use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, Response, StatusCode, header},
};
use chrono::{Duration, Utc};
use guardia::api::AppState;
use guardia::config::Config;
use guardia::db::NewAccount;
use guardia::models::{AccountStatus, Role};
use guardia::services::LockoutPolicy;
use http_body_util::BodyExt;
use tower::ServiceExt;

/// Default password seeded for the reserved superuser by the migration.
const ADMIN_PASSWORD: &str = "Admin12345*";

async fn spawn_app() -> (Router, Arc<AppState>) {
    let mut config = Config::default();
    config.general.database_path = "sqlite::memory:".to_string();

    let state = guardia::api::create_app_state_from_config(config, None)
        .await
        .expect("Failed to create app state");
    let app = guardia::api::router(state.clone()).await;
    (app, state)
}

async fn create_user(state: &Arc<AppState>, username: &str, password: &str) -> i32 {
    state
        .store()
        .create_account(
            NewAccount {
                username: username.to_string(),
                email: format!("{username}@example.com"),
                password: password.to_string(),
                role: Role::User,
            },
            None,
        )
        .await
        .expect("Failed to create account")
        .id
}

async fn login(app: &Router, identifier: &str, password: &str) -> Response<axum::body::Body> {
    let payload = serde_json::json!({
        "identifier": identifier,
        "password": password,
    });

    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/login")
                .header("Content-Type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
}

fn session_cookie(response: &Response<axum::body::Body>) -> String {
    response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .expect("Response should carry a session cookie")
        .to_string()
}

async fn body_json(response: Response<axum::body::Body>) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

async fn get_with_cookie(app: &Router, uri: &str, cookie: &str) -> Response<axum::body::Body> {
    app.clone()
        .oneshot(
            Request::builder()
                .uri(uri)
                .header(header::COOKIE, cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn post_json_with_cookie(
    app: &Router,
    method: &str,
    uri: &str,
    cookie: &str,
    payload: &serde_json::Value,
) -> Response<axum::body::Body> {
    app.clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .header(header::COOKIE, cookie)
                .header("Content-Type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn login_grants_session_and_user_scope() {
    let (app, state) = spawn_app().await;
    create_user(&state, "carla", "Secret123!").await;

    let response = login(&app, "carla", "Secret123!").await;
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = session_cookie(&response);

    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["username"], "carla");
    assert_eq!(body["data"]["role"], "user");
    assert_eq!(body["data"]["failed_attempts"], 0);

    let response = get_with_cookie(&app, "/api/dashboard", &cookie).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = get_with_cookie(&app, "/api/auth/me", &cookie).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn protected_routes_require_a_session() {
    let (app, _state) = spawn_app().await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/dashboard")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_identifier_and_wrong_password_return_identical_errors() {
    let (app, state) = spawn_app().await;
    create_user(&state, "carla", "Secret123!").await;

    let unknown = login(&app, "nobody", "whatever").await;
    assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
    let unknown_body = body_json(unknown).await;

    let mismatch = login(&app, "carla", "wrong-password").await;
    assert_eq!(mismatch.status(), StatusCode::UNAUTHORIZED);
    let mismatch_body = body_json(mismatch).await;

    assert_eq!(unknown_body, mismatch_body);
    assert_eq!(unknown_body["error"], "Credenciales inválidas");
}

#[tokio::test]
async fn fifth_failure_locks_and_lock_reports_remaining_seconds() {
    let (app, state) = spawn_app().await;
    let account_id = create_user(&state, "carla", "Secret123!").await;

    for _ in 0..5 {
        let response = login(&app, "carla", "wrong-password").await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    let account = state
        .store()
        .get_account_by_id(account_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(account.failed_attempts, 5);
    assert!(matches!(account.status, AccountStatus::TempBlocked { .. }));

    // The correct password now earns the lock response, not the generic one.
    let response = login(&app, "carla", "Secret123!").await;
    assert_eq!(response.status(), StatusCode::LOCKED);

    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    let remaining = body["remaining_seconds"].as_u64().unwrap();
    assert!(remaining > 0 && remaining <= 3600);
}

#[tokio::test]
async fn wrong_password_against_locked_account_stays_generic() {
    let (app, state) = spawn_app().await;
    let account_id = create_user(&state, "carla", "Secret123!").await;

    for _ in 0..5 {
        let _ = login(&app, "carla", "wrong-password").await;
    }

    let response = login(&app, "carla", "still-wrong").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Counting stops once the account is no longer active.
    let account = state
        .store()
        .get_account_by_id(account_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(account.failed_attempts, 5);
}

#[tokio::test]
async fn expired_lock_is_released_on_next_attempt() {
    let (app, state) = spawn_app().await;
    let account_id = create_user(&state, "carla", "Secret123!").await;

    // Drive the account into a lock that expired an hour ago.
    let past = Utc::now() - Duration::hours(2);
    let policy = LockoutPolicy::default();
    let mut account = state
        .store()
        .get_account_by_id(account_id)
        .await
        .unwrap()
        .unwrap();
    for _ in 0..5 {
        account = state
            .store()
            .record_failure(&account, &policy, past)
            .await
            .unwrap()
            .unwrap();
    }
    assert!(matches!(account.status, AccountStatus::TempBlocked { .. }));

    let response = login(&app, "carla", "Secret123!").await;
    assert_eq!(response.status(), StatusCode::OK);

    let account = state
        .store()
        .get_account_by_id(account_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(account.status, AccountStatus::Active);
    assert_eq!(account.failed_attempts, 0);
}

#[tokio::test]
async fn inactive_account_is_gated_only_with_the_correct_password() {
    let (app, state) = spawn_app().await;
    let account_id = create_user(&state, "carla", "Secret123!").await;

    let account = state
        .store()
        .get_account_by_id(account_id)
        .await
        .unwrap()
        .unwrap();
    state
        .store()
        .set_account_inactive(&account, Utc::now())
        .await
        .unwrap()
        .expect("no concurrent writers");

    let response = login(&app, "carla", "Secret123!").await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Cuenta desactivada. Contacte al administrador.");

    let response = login(&app, "carla", "wrong-password").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Credenciales inválidas");
}

#[tokio::test]
async fn login_is_case_and_whitespace_insensitive() {
    let (app, state) = spawn_app().await;
    create_user(&state, "carla", "Secret123!").await;

    let response = login(&app, "  CARLA ", "Secret123!").await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = login(&app, "Carla@Example.com", "Secret123!").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn logout_invalidates_the_session() {
    let (app, state) = spawn_app().await;
    create_user(&state, "carla", "Secret123!").await;

    let response = login(&app, "carla", "Secret123!").await;
    let cookie = session_cookie(&response);

    let response = post_json_with_cookie(
        &app,
        "POST",
        "/api/auth/logout",
        &cookie,
        &serde_json::json!({}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = get_with_cookie(&app, "/api/auth/me", &cookie).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn roles_are_disjoint_scopes() {
    let (app, state) = spawn_app().await;
    create_user(&state, "carla", "Secret123!").await;

    // User on an admin route.
    let response = login(&app, "carla", "Secret123!").await;
    let user_cookie = session_cookie(&response);

    let response = post_json_with_cookie(
        &app,
        "POST",
        "/api/admin/accounts/unlock",
        &user_cookie,
        &serde_json::json!({"identifier": "carla"}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Admin on a user route; admin is not a superset of user.
    let response = login(&app, "admin", ADMIN_PASSWORD).await;
    assert_eq!(response.status(), StatusCode::OK);
    let admin_cookie = session_cookie(&response);

    let response = get_with_cookie(&app, "/api/dashboard", &admin_cookie).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_unlocks_a_locked_account() {
    let (app, state) = spawn_app().await;
    let account_id = create_user(&state, "carla", "Secret123!").await;

    for _ in 0..5 {
        let _ = login(&app, "carla", "wrong-password").await;
    }

    let response = login(&app, "admin", ADMIN_PASSWORD).await;
    let admin_cookie = session_cookie(&response);

    let response = post_json_with_cookie(
        &app,
        "POST",
        "/api/admin/accounts/unlock",
        &admin_cookie,
        &serde_json::json!({"identifier": "carla"}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["released"], 1);

    let account = state
        .store()
        .get_account_by_id(account_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(account.status, AccountStatus::Active);
    assert_eq!(account.failed_attempts, 0);

    let response = login(&app, "carla", "Secret123!").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn admin_deactivates_and_reactivates_an_account() {
    let (app, state) = spawn_app().await;
    let account_id = create_user(&state, "carla", "Secret123!").await;

    let response = login(&app, "admin", ADMIN_PASSWORD).await;
    let admin_cookie = session_cookie(&response);

    let response = post_json_with_cookie(
        &app,
        "POST",
        &format!("/api/admin/accounts/{account_id}/deactivate"),
        &admin_cookie,
        &serde_json::json!({}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["status"], "inactive");

    let response = login(&app, "carla", "Secret123!").await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = post_json_with_cookie(
        &app,
        "POST",
        &format!("/api/admin/accounts/{account_id}/activate"),
        &admin_cookie,
        &serde_json::json!({}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = login(&app, "carla", "Secret123!").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn the_superuser_cannot_be_deactivated() {
    let (app, state) = spawn_app().await;

    let superuser = state
        .store()
        .get_account_by_identifier("admin")
        .await
        .unwrap()
        .expect("seeded superuser");

    let response = login(&app, "admin", ADMIN_PASSWORD).await;
    let admin_cookie = session_cookie(&response);

    let response = post_json_with_cookie(
        &app,
        "POST",
        &format!("/api/admin/accounts/{}/deactivate", superuser.id),
        &admin_cookie,
        &serde_json::json!({}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let stored = state
        .store()
        .get_account_by_id(superuser.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, AccountStatus::Active);
}

#[tokio::test]
async fn change_password_requires_the_current_one() {
    let (app, state) = spawn_app().await;
    create_user(&state, "carla", "Secret123!").await;

    let response = login(&app, "carla", "Secret123!").await;
    let cookie = session_cookie(&response);

    let response = post_json_with_cookie(
        &app,
        "PUT",
        "/api/auth/password",
        &cookie,
        &serde_json::json!({
            "current_password": "wrong",
            "new_password": "NewSecret456!",
            "new_password_confirmation": "NewSecret456!",
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = post_json_with_cookie(
        &app,
        "PUT",
        "/api/auth/password",
        &cookie,
        &serde_json::json!({
            "current_password": "Secret123!",
            "new_password": "NewSecret456!",
            "new_password_confirmation": "NewSecret456!",
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = login(&app, "carla", "Secret123!").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = login(&app, "carla", "NewSecret456!").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn change_password_enforces_confirmation_and_complexity() {
    let (app, state) = spawn_app().await;
    create_user(&state, "carla", "Secret123!").await;

    let response = login(&app, "carla", "Secret123!").await;
    let cookie = session_cookie(&response);

    let response = post_json_with_cookie(
        &app,
        "PUT",
        "/api/auth/password",
        &cookie,
        &serde_json::json!({
            "current_password": "Secret123!",
            "new_password": "NewSecret456!",
            "new_password_confirmation": "Different456!",
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "La confirmación de la contraseña no coincide");

    // All lowercase and digits, no uppercase or symbol.
    let response = post_json_with_cookie(
        &app,
        "PUT",
        "/api/auth/password",
        &cookie,
        &serde_json::json!({
            "current_password": "Secret123!",
            "new_password": "weaksecret123",
            "new_password_confirmation": "weaksecret123",
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // The original password still works after the rejected attempts.
    let response = login(&app, "carla", "Secret123!").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn login_accepts_username_and_email_payload_keys() {
    let (app, state) = spawn_app().await;
    create_user(&state, "carla", "Secret123!").await;

    for payload in [
        serde_json::json!({"username": "carla", "password": "Secret123!"}),
        serde_json::json!({"email": "carla@example.com", "password": "Secret123!"}),
    ] {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/auth/login")
                    .header("Content-Type", "application/json")
                    .body(Body::from(payload.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn deactivation_cuts_existing_sessions() {
    let (app, state) = spawn_app().await;
    let account_id = create_user(&state, "carla", "Secret123!").await;

    let response = login(&app, "carla", "Secret123!").await;
    let user_cookie = session_cookie(&response);

    let response = login(&app, "admin", ADMIN_PASSWORD).await;
    let admin_cookie = session_cookie(&response);

    let response = post_json_with_cookie(
        &app,
        "POST",
        &format!("/api/admin/accounts/{account_id}/deactivate"),
        &admin_cookie,
        &serde_json::json!({}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = get_with_cookie(&app, "/api/dashboard", &user_cookie).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
