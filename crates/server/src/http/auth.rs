use axum::{
    Json,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use services::services::config::Config;
use utils::response::ApiResponse;

use crate::{AppState, error::ApiError};

/// Header carrying the authenticated user id, set by the gateway that
/// validated the caller's token.
pub const USER_ID_HEADER: &str = "x-user-id";

pub trait PermissionChecker {
    fn has_permission(&self, user_id: i64, permission: &str) -> bool;
}

impl PermissionChecker for Config {
    fn has_permission(&self, user_id: i64, permission: &str) -> bool {
        Config::has_permission(self, user_id, permission)
    }
}

/// The user a request acts on behalf of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: i64,
}

impl Caller {
    pub fn can(&self, checker: &impl PermissionChecker, permission: &str) -> bool {
        checker.has_permission(self.user_id, permission)
    }

    pub async fn ensure(&self, state: &AppState, permission: &str) -> Result<(), ApiError> {
        let config = state.config().read().await;
        if self.can(&*config, permission) {
            return Ok(());
        }
        tracing::debug!(user_id = self.user_id, permission, "Permission denied");
        Err(ApiError::Forbidden(format!("Missing permission {permission}")))
    }

    /// Like [`Caller::ensure`], but holding `any` is enough.
    pub async fn ensure_any(&self, state: &AppState, any: &[&str]) -> Result<(), ApiError> {
        let config = state.config().read().await;
        if any.iter().any(|permission| self.can(&*config, permission)) {
            return Ok(());
        }
        tracing::debug!(user_id = self.user_id, ?any, "Permission denied");
        Err(ApiError::Forbidden(format!(
            "Missing permission {}",
            any.join(" or ")
        )))
    }

    pub async fn holds(&self, state: &AppState, permission: &str) -> bool {
        let config = state.config().read().await;
        self.can(&*config, permission)
    }
}

fn parse_user_id(req: &Request) -> Option<i64> {
    req.headers()
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .and_then(|value| value.parse::<i64>().ok())
        .filter(|id| *id > 0)
}

pub async fn require_caller(
    State(_state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(user_id) = parse_user_id(&req) else {
        tracing::warn!(
            path = %req.uri().path(),
            method = %req.method(),
            "Unauthorized API request"
        );
        let response = ApiResponse::<()>::error("Unauthorized").with_code(401);
        return (StatusCode::UNAUTHORIZED, Json(response)).into_response();
    };

    req.extensions_mut().insert(Caller { user_id });
    next.run(req).await
}
