use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    response::Json as ResponseJson,
    routing::{get, post},
};
use db::models::{
    item::{ConsumedItem, CreateItem, Item},
    order::Order,
};
use serde::Deserialize;
use ts_rs::TS;
use utils::response::ApiResponse;

use crate::{AppState, error::ApiError, http::auth::Caller, routes::orders::ensure_can_view};

#[derive(Debug, Deserialize, TS)]
pub struct RestockItem {
    pub count: i32,
}

#[derive(Debug, Deserialize, TS)]
pub struct ConsumeItem {
    pub item_id: i64,
    pub count: i32,
}

pub async fn get_items(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<ResponseJson<ApiResponse<Vec<Item>>>, ApiError> {
    caller.ensure(&state, "item.viewall").await?;

    let items = Item::find_all(&state.db().pool).await?;
    Ok(ResponseJson(ApiResponse::success(items)))
}

pub async fn create_item(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(payload): Json<CreateItem>,
) -> Result<ResponseJson<ApiResponse<Item>>, ApiError> {
    caller.ensure(&state, "item.create").await?;

    let item = Item::create(&state.db().pool, &payload).await?;
    tracing::info!(item_id = item.id, name = %item.name, "Item created");
    Ok(ResponseJson(ApiResponse::success(item)))
}

pub async fn restock_item(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(item_id): Path<i64>,
    Json(payload): Json<RestockItem>,
) -> Result<ResponseJson<ApiResponse<Item>>, ApiError> {
    caller.ensure(&state, "item.update").await?;

    let item = Item::restock(&state.db().pool, item_id, payload.count, caller.user_id).await?;
    Ok(ResponseJson(ApiResponse::success(item)))
}

pub async fn get_consumed_items(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Extension(order): Extension<Order>,
) -> Result<ResponseJson<ApiResponse<Vec<ConsumedItem>>>, ApiError> {
    ensure_can_view(&state, caller, &order).await?;

    let consumed = Item::consumed_by_order(&state.db().pool, order.id).await?;
    Ok(ResponseJson(ApiResponse::success(consumed)))
}

/// Only the repairer currently holding the order may draw parts for it.
pub async fn consume_item(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Extension(order): Extension<Order>,
    Json(payload): Json<ConsumeItem>,
) -> Result<ResponseJson<ApiResponse<Item>>, ApiError> {
    caller.ensure(&state, "item.consume").await?;
    if order.repairer_id != caller.user_id && !caller.holds(&state, "order.updateall").await {
        return Err(ApiError::Forbidden(format!(
            "Order {} is not assigned to you",
            order.id
        )));
    }

    let item = Item::consume(
        &state.db().pool,
        order.id,
        payload.item_id,
        payload.count,
        caller.user_id,
    )
    .await?;
    Ok(ResponseJson(ApiResponse::success(item)))
}

/// Mounted under `/orders/{order_id}`, behind the order loader.
pub fn order_router() -> Router<AppState> {
    Router::new().route("/items", get(get_consumed_items).post(consume_item))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/items", get(get_items).post(create_item))
        .route("/items/{item_id}/restock", post(restock_item))
}
