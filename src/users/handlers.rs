use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post, MethodRouter},
    Json, Router,
};
use serde_json::{json, Value};
use tracing::{instrument, warn};

use crate::{
    config::{AccountPolicy, StatusTiers},
    state::AppState,
    users::{
        dto::{reset_body, user_body},
        repo_types::SafeUser,
        services::{AccountError, Operation},
    },
};

const INVALID_BODY: &str = "Invalid user body";

pub fn user_routes(policy: &AccountPolicy) -> Router<AppState> {
    let router = Router::new()
        .route("/user", post(create_user))
        .route("/user/login", named_user("login").post(login))
        .route("/user/reset", named_user("reset").patch(reset_password))
        .route("/user/", get(get_user).delete(delete_user))
        .route("/user/:username", get(get_user).delete(delete_user));

    if !policy.legacy_routes {
        return router;
    }
    router
        .route("/user/register", named_user("register").post(create_user))
        .route("/user/getUser/:username", get(get_user))
        .route("/user/deleteUser/:username", delete(delete_user))
        .route(
            "/user/reset-password",
            named_user("reset-password").patch(reset_password),
        )
}

/// Fetch/delete for a username that equals a static path segment, so such
/// accounts stay reachable through `GET|DELETE /user/{username}`.
fn named_user(username: &'static str) -> MethodRouter<AppState> {
    get(move |State(state): State<AppState>| async move {
        fetch_user(&state, username).await
    })
    .delete(move |State(state): State<AppState>| async move {
            remove_user(&state, username).await
        })
}

/// JSON error body `{ "error": ... }` with its status.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn invalid_body() -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: INVALID_BODY.into(),
        }
    }

    fn from_account(err: AccountError, tiers: StatusTiers) -> Self {
        Self {
            status: status_for(&err, tiers),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

pub fn status_for(err: &AccountError, tiers: StatusTiers) -> StatusCode {
    match err {
        AccountError::DuplicateUsername => match tiers {
            StatusTiers::Split => StatusCode::CONFLICT,
            StatusTiers::Collapsed => StatusCode::BAD_REQUEST,
        },
        AccountError::InvalidCredentials => StatusCode::UNAUTHORIZED,
        AccountError::NotFound => StatusCode::NOT_FOUND,
        AccountError::Persistence(op) => match tiers {
            StatusTiers::Split => StatusCode::INTERNAL_SERVER_ERROR,
            StatusTiers::Collapsed => match op {
                Operation::Create => StatusCode::BAD_REQUEST,
                Operation::Login => StatusCode::UNAUTHORIZED,
                Operation::Fetch | Operation::Delete | Operation::Reset => StatusCode::NOT_FOUND,
            },
        },
    }
}

fn json_body(payload: Result<Json<Value>, JsonRejection>) -> Result<Value, ApiError> {
    match payload {
        Ok(Json(body)) => Ok(body),
        Err(e) => {
            warn!(error = %e, "unreadable request body");
            Err(ApiError::invalid_body())
        }
    }
}

#[instrument(skip(state, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<SafeUser>), ApiError> {
    let body = json_body(payload)?;
    let Some(creds) = user_body(&body) else {
        warn!("invalid create body");
        return Err(ApiError::invalid_body());
    };

    let tiers = state.config.policy.status_tiers;
    let user = state
        .accounts
        .create(creds)
        .await
        .map_err(|e| ApiError::from_account(e, tiers))?;
    Ok((StatusCode::CREATED, Json(user)))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<SafeUser>, ApiError> {
    let body = json_body(payload)?;
    let Some(creds) = user_body(&body) else {
        warn!("invalid login body");
        return Err(ApiError::invalid_body());
    };

    let tiers = state.config.policy.status_tiers;
    let user = state
        .accounts
        .login(creds)
        .await
        .map_err(|e| ApiError::from_account(e, tiers))?;
    Ok(Json(user))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    username: Option<Path<String>>,
) -> Result<Json<SafeUser>, ApiError> {
    let username = username.map(|Path(u)| u).unwrap_or_default();
    fetch_user(&state, &username).await
}

#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    username: Option<Path<String>>,
) -> Result<Json<SafeUser>, ApiError> {
    let username = username.map(|Path(u)| u).unwrap_or_default();
    remove_user(&state, &username).await
}

async fn fetch_user(state: &AppState, username: &str) -> Result<Json<SafeUser>, ApiError> {
    let tiers = state.config.policy.status_tiers;
    let user = state
        .accounts
        .get(username)
        .await
        .map_err(|e| ApiError::from_account(e, tiers))?;
    Ok(Json(user))
}

async fn remove_user(state: &AppState, username: &str) -> Result<Json<SafeUser>, ApiError> {
    let tiers = state.config.policy.status_tiers;
    let user = state
        .accounts
        .delete(username)
        .await
        .map_err(|e| ApiError::from_account(e, tiers))?;
    Ok(Json(user))
}

#[instrument(skip(state, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<SafeUser>, ApiError> {
    let body = json_body(payload)?;
    let policy = &state.config.policy;
    let Some(creds) = reset_body(&body, policy.reset_require_non_empty) else {
        warn!("invalid reset body");
        return Err(ApiError::invalid_body());
    };

    let tiers = policy.status_tiers;
    let user = state
        .accounts
        .reset_password(creds)
        .await
        .map_err(|e| ApiError::from_account(e, tiers))?;
    Ok(Json(user))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{app::build_app, users::services::tests::BrokenStore};
    use axum::{
        body::{to_bytes, Body},
        http::{header::CONTENT_TYPE, Method, Request},
    };
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let req = Request::builder().method(method).uri(uri);
        let req = match body {
            Some(b) => req
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(b.to_string())),
            None => req.body(Body::empty()),
        }
        .unwrap();

        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    fn memory_app(policy: AccountPolicy) -> Router {
        build_app(AppState::fake(policy))
    }

    fn broken_app(policy: AccountPolicy) -> Router {
        build_app(AppState::with_store(Arc::new(BrokenStore), policy))
    }

    fn alice(password: &str) -> Option<Value> {
        Some(json!({ "username": "alice", "password": password }))
    }

    fn assert_safe_view(body: &Value, username: &str) {
        assert_eq!(body["username"], username);
        assert!(body["id"].is_string());
        assert!(body["dateJoined"].is_string());
        assert!(body.get("password").is_none());
    }

    #[tokio::test]
    async fn account_lifecycle() {
        let app = memory_app(AccountPolicy::default());

        let (status, created) = send(&app, Method::POST, "/user", alice("p1")).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_safe_view(&created, "alice");

        let (status, body) = send(&app, Method::POST, "/user", alice("p1")).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body, json!({ "error": "Username already exists" }));

        let (status, body) = send(&app, Method::POST, "/user/login", alice("wrong")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({ "error": "Invalid username or password" }));

        let (status, body) = send(&app, Method::PATCH, "/user/reset", alice("p2")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, created);

        let (status, body) = send(&app, Method::POST, "/user/login", alice("p2")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, created);

        let (status, _) = send(&app, Method::POST, "/user/login", alice("p1")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = send(&app, Method::GET, "/user/alice", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, created);

        let (status, body) = send(&app, Method::DELETE, "/user/alice", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, created);

        let (status, body) = send(&app, Method::DELETE, "/user/alice", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({ "error": "User not found" }));

        let (status, body) = send(&app, Method::GET, "/user/alice", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({ "error": "User not found" }));
    }

    #[tokio::test]
    async fn unknown_user_and_wrong_password_look_the_same() {
        let app = memory_app(AccountPolicy::default());
        send(&app, Method::POST, "/user", alice("p1")).await;

        let ghost = send(
            &app,
            Method::POST,
            "/user/login",
            Some(json!({ "username": "ghost", "password": "p1" })),
        )
        .await;
        let wrong = send(&app, Method::POST, "/user/login", alice("nope")).await;
        assert_eq!(ghost, wrong);
    }

    #[tokio::test]
    async fn create_ignores_client_date_joined() {
        let app = memory_app(AccountPolicy::default());
        let (status, body) = send(
            &app,
            Method::POST,
            "/user",
            Some(json!({
                "username": "bob",
                "password": "pw",
                "dateJoined": "1999-01-01T00:00:00Z"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_ne!(body["dateJoined"], "1999-01-01T00:00:00Z");
    }

    #[tokio::test]
    async fn invalid_bodies_never_reach_the_store() {
        let app = broken_app(AccountPolicy::default());
        let bodies = [
            json!({ "password": "p1" }),
            json!({ "username": "alice" }),
            json!({ "username": "  ", "password": "p1" }),
            json!({ "username": "alice", "password": "" }),
            json!({ "username": 1, "password": "p1" }),
        ];

        for body in bodies {
            for uri in ["/user", "/user/login"] {
                let (status, json) = send(&app, Method::POST, uri, Some(body.clone())).await;
                assert_eq!(status, StatusCode::BAD_REQUEST, "{uri} {body}");
                assert_eq!(json, json!({ "error": "Invalid user body" }));
            }
        }

        let (status, _) = send(
            &app,
            Method::PATCH,
            "/user/reset",
            Some(json!({ "username": "alice" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_json_is_invalid_body() {
        let app = broken_app(AccountPolicy::default());
        let req = Request::builder()
            .method(Method::POST)
            .uri("/user")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, json!({ "error": "Invalid user body" }));
    }

    #[tokio::test]
    async fn store_failures_get_their_own_tier() {
        let app = broken_app(AccountPolicy::default());
        let cases = [
            (Method::POST, "/user", alice("p1"), "Could not save user"),
            (Method::POST, "/user/login", alice("p1"), "Login failed"),
            (Method::GET, "/user/alice", None, "Failed to retrieve user"),
            (Method::DELETE, "/user/alice", None, "Failed to delete user"),
            (Method::PATCH, "/user/reset", alice("p2"), "Failed to update user"),
        ];
        for (method, uri, body, message) in cases {
            let (status, json) = send(&app, method, uri, body).await;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "{uri}");
            assert_eq!(json, json!({ "error": message }));
        }
    }

    #[tokio::test]
    async fn collapsed_tiers_reuse_domain_status() {
        let policy = AccountPolicy {
            status_tiers: StatusTiers::Collapsed,
            ..AccountPolicy::default()
        };
        let app = broken_app(policy);
        let cases = [
            (Method::POST, "/user", alice("p1"), StatusCode::BAD_REQUEST),
            (Method::POST, "/user/login", alice("p1"), StatusCode::UNAUTHORIZED),
            (Method::GET, "/user/alice", None, StatusCode::NOT_FOUND),
            (Method::DELETE, "/user/alice", None, StatusCode::NOT_FOUND),
            (Method::PATCH, "/user/reset", alice("p2"), StatusCode::NOT_FOUND),
        ];
        for (method, uri, body, expected) in cases {
            let (status, _) = send(&app, method, uri, body).await;
            assert_eq!(status, expected, "{uri}");
        }
    }

    #[tokio::test]
    async fn collapsed_tiers_report_duplicate_as_bad_request() {
        let app = memory_app(AccountPolicy {
            status_tiers: StatusTiers::Collapsed,
            ..AccountPolicy::default()
        });
        send(&app, Method::POST, "/user", alice("p1")).await;

        let (status, body) = send(&app, Method::POST, "/user", alice("p1")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "error": "Username already exists" }));
    }

    #[tokio::test]
    async fn usernames_matching_static_segments_stay_reachable() {
        let app = memory_app(AccountPolicy {
            legacy_routes: true,
            ..AccountPolicy::default()
        });

        for name in ["login", "reset", "register", "reset-password"] {
            let uri = format!("/user/{name}");
            let creds = Some(json!({ "username": name, "password": "pw" }));

            let (status, created) = send(&app, Method::POST, "/user", creds).await;
            assert_eq!(status, StatusCode::CREATED, "{name}");
            assert_safe_view(&created, name);

            let (status, body) = send(&app, Method::GET, &uri, None).await;
            assert_eq!(status, StatusCode::OK, "{name}");
            assert_eq!(body, created);

            let (status, body) = send(&app, Method::DELETE, &uri, None).await;
            assert_eq!(status, StatusCode::OK, "{name}");
            assert_eq!(body, created);

            let (status, body) = send(&app, Method::GET, &uri, None).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{name}");
            assert_eq!(body, json!({ "error": "User not found" }));
        }

        let (status, _) = send(&app, Method::POST, "/user/login", alice("p1")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn reset_accepts_empty_password_unless_configured() {
        let app = memory_app(AccountPolicy::default());
        send(&app, Method::POST, "/user", alice("p1")).await;
        let (status, _) = send(&app, Method::PATCH, "/user/reset", alice("")).await;
        assert_eq!(status, StatusCode::OK);

        let strict = memory_app(AccountPolicy {
            reset_require_non_empty: true,
            ..AccountPolicy::default()
        });
        send(&strict, Method::POST, "/user", alice("p1")).await;
        let (status, body) = send(&strict, Method::PATCH, "/user/reset", alice(" ")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "error": "Invalid user body" }));
    }

    #[tokio::test]
    async fn reset_unknown_user_is_not_found() {
        let app = memory_app(AccountPolicy::default());
        let (status, body) = send(&app, Method::PATCH, "/user/reset", alice("p2")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({ "error": "User not found" }));
    }

    #[tokio::test]
    async fn empty_username_segment_is_not_found() {
        let app = broken_app(AccountPolicy::default());
        let (status, body) = send(&app, Method::GET, "/user/", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({ "error": "User not found" }));

        let (status, _) = send(&app, Method::DELETE, "/user/", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn legacy_routes_only_when_enabled() {
        let app = memory_app(AccountPolicy::default());
        let (status, _) = send(&app, Method::POST, "/user/register", alice("p1")).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

        let app = memory_app(AccountPolicy {
            legacy_routes: true,
            ..AccountPolicy::default()
        });
        let (status, created) = send(&app, Method::POST, "/user/register", alice("p1")).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = send(&app, Method::GET, "/user/getUser/alice", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, created);

        let (status, _) = send(&app, Method::PATCH, "/user/reset-password", alice("p2")).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&app, Method::DELETE, "/user/deleteUser/alice", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, created);
    }

    #[tokio::test]
    async fn health_check() {
        let app = memory_app(AccountPolicy::default());
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"ok");
    }
}
