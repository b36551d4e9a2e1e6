use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    response::Json as ResponseJson,
    routing::{delete, get},
};
use db::models::tag::{CreateTag, Tag, TagError};
use serde::Deserialize;
use utils::response::ApiResponse;

use crate::{AppState, error::ApiError, http::auth::Caller, routes::parse_id_list};

#[derive(Debug, Deserialize)]
pub struct TagQuery {
    /// Comma separated tag ids.
    pub ids: Option<String>,
    pub sort: Option<String>,
}

pub async fn get_tags(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<TagQuery>,
) -> Result<ResponseJson<ApiResponse<Vec<Tag>>>, ApiError> {
    caller.ensure(&state, "tag.view").await?;

    let pool = &state.db().pool;
    let tags = match (query.ids.as_deref(), query.sort.as_deref().map(str::trim)) {
        (Some(raw), _) => Tag::find_by_ids(pool, &parse_id_list(raw, "ids")?).await?,
        (None, Some(sort)) if !sort.is_empty() => Tag::find_by_sort(pool, sort).await?,
        _ => {
            return Err(ApiError::BadRequest(
                "Either ids or sort is required".to_string(),
            ));
        }
    };
    Ok(ResponseJson(ApiResponse::success(tags)))
}

pub async fn get_tag_sorts(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<ResponseJson<ApiResponse<Vec<String>>>, ApiError> {
    caller.ensure(&state, "tag.view").await?;

    let sorts = Tag::find_all_sorts(&state.db().pool).await?;
    Ok(ResponseJson(ApiResponse::success(sorts)))
}

pub async fn create_tag(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(payload): Json<CreateTag>,
) -> Result<ResponseJson<ApiResponse<Tag>>, ApiError> {
    caller.ensure(&state, "tag.create").await?;

    let tag = Tag::create(&state.db().pool, &payload, caller.user_id).await?;
    Ok(ResponseJson(ApiResponse::success(tag)))
}

/// Removing a tag also unlinks it from every order.
pub async fn delete_tag(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(tag_id): Path<i64>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    caller.ensure(&state, "tag.delete").await?;

    let rows_affected = Tag::delete(&state.db().pool, tag_id).await?;
    if rows_affected == 0 {
        return Err(TagError::NotFound.into());
    }
    Ok(ResponseJson(ApiResponse::success(())))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tags", get(get_tags).post(create_tag))
        .route("/tags/sorts", get(get_tag_sorts))
        .route("/tags/{tag_id}", delete(delete_tag))
}
