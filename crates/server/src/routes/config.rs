use axum::{
    Extension, Json, Router,
    extract::State,
    response::Json as ResponseJson,
    routing::get,
};
use services::services::config::{Config, save_config_to_file};
use utils::{assets::config_path, response::ApiResponse};

use crate::{AppState, error::ApiError, http::auth::Caller};

const CONFIG_PERMISSION: &str = "config.update";

pub fn router() -> Router<AppState> {
    Router::new().route("/config", get(get_config).put(update_config))
}

async fn get_config(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<ResponseJson<ApiResponse<Config>>, ApiError> {
    caller.ensure(&state, CONFIG_PERMISSION).await?;

    let config = state.config().read().await.clone();
    Ok(ResponseJson(ApiResponse::success(config)))
}

/// Every role a user or the default points at must be defined.
fn validate_roles(config: &Config) -> Result<(), ApiError> {
    let unknown = std::iter::once(&config.default_role)
        .chain(config.users.values())
        .find(|role| !config.permissions.contains_key(role.as_str()));
    match unknown {
        Some(role) => Err(ApiError::BadRequest(format!("Unknown role {role:?}"))),
        None => Ok(()),
    }
}

/// Persists and applies the new settings. Permission changes take effect on
/// the next request; appraise timings are read when the sweep starts.
async fn update_config(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(new_config): Json<Config>,
) -> Result<ResponseJson<ApiResponse<Config>>, ApiError> {
    caller.ensure(&state, CONFIG_PERMISSION).await?;

    let new_config = new_config.normalized();
    validate_roles(&new_config)?;
    if !new_config.has_permission(caller.user_id, CONFIG_PERMISSION) {
        return Err(ApiError::BadRequest(
            "The new config would revoke your own config.update permission".to_string(),
        ));
    }

    save_config_to_file(&new_config, &config_path()).await?;

    let mut config = state.config().write().await;
    *config = new_config.clone();
    drop(config);

    tracing::info!(user_id = caller.user_id, "Config updated");
    Ok(ResponseJson(ApiResponse::success(new_config)))
}
