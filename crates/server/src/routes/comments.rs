use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    response::Json as ResponseJson,
    routing::{delete, get},
};
use db::models::{
    comment::{Comment, CommentError, CreateComment},
    order::Order,
};
use utils::response::ApiResponse;

use crate::{
    AppState,
    error::ApiError,
    http::auth::Caller,
    routes::{Pagination, orders::ensure_can_view},
};

/// `comment.view` and `comment.create` cover orders the caller may read;
/// the `*all` variants cover every order.
pub async fn get_comments(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Extension(order): Extension<Order>,
    Query(page): Query<Pagination>,
) -> Result<ResponseJson<ApiResponse<Vec<Comment>>>, ApiError> {
    if !caller.holds(&state, "comment.viewall").await {
        caller.ensure(&state, "comment.view").await?;
        ensure_can_view(&state, caller, &order).await?;
    }

    let comments =
        Comment::find_by_order_id(&state.db().pool, order.id, page.offset, page.limit).await?;
    Ok(ResponseJson(ApiResponse::success(comments)))
}

pub async fn create_comment(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Extension(order): Extension<Order>,
    Json(payload): Json<CreateComment>,
) -> Result<ResponseJson<ApiResponse<Comment>>, ApiError> {
    if !caller.holds(&state, "comment.createall").await {
        caller.ensure(&state, "comment.create").await?;
        ensure_can_view(&state, caller, &order).await?;
    }

    let comment = Comment::create(&state.db().pool, order.id, caller.user_id, &payload).await?;
    Ok(ResponseJson(ApiResponse::success(comment)))
}

/// Authors delete their own comments with `comment.delete`; anyone else's
/// need `comment.deleteall`.
pub async fn delete_comment(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(comment_id): Path<i64>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    if !caller.holds(&state, "comment.deleteall").await {
        caller.ensure(&state, "comment.delete").await?;
        let comment = Comment::find_by_id(&state.db().pool, comment_id)
            .await?
            .ok_or(CommentError::NotFound)?;
        if comment.user_id != caller.user_id {
            return Err(ApiError::Forbidden(format!(
                "Comment {comment_id} belongs to another user"
            )));
        }
    }

    Comment::delete(&state.db().pool, comment_id).await?;
    tracing::info!(comment_id, user_id = caller.user_id, "Comment deleted");
    Ok(ResponseJson(ApiResponse::success(())))
}

/// Mounted under `/orders/{order_id}`, behind the order loader.
pub fn order_router() -> Router<AppState> {
    Router::new().route("/comments", get(get_comments).post(create_comment))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/comments/{comment_id}", delete(delete_comment))
}
