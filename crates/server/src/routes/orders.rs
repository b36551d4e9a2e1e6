use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    middleware::from_fn_with_state,
    response::Json as ResponseJson,
    routing::{get, post, put},
};
use db::{
    models::{
        order::{CreateOrder, Order, OrderFilter, OrderSort, UpdateOrder},
        order_status::StatusRecord,
    },
    types::OrderStatus,
};
use serde::Deserialize;
use services::services::order_lifecycle;
use ts_rs::TS;
use utils::response::ApiResponse;

use crate::{
    AppState,
    error::ApiError,
    http::auth::Caller,
    middleware::load_order_middleware,
    routes::{Pagination, comments, items, parse_id_list},
};

/// Lets dispatchers act on orders they neither own nor repair.
const UPDATE_ANY: &str = "order.updateall";

#[derive(Debug, Default, Deserialize)]
pub struct OrderListQuery {
    #[serde(default)]
    pub sort: OrderSort,
    pub user_id: Option<i64>,
    pub status: Option<OrderStatus>,
    pub title: Option<String>,
    /// Comma separated tag ids.
    pub tags: Option<String>,
    #[serde(default)]
    pub conjunctive: bool,
}

#[derive(Debug, Deserialize)]
pub struct RepairerOrdersQuery {
    #[serde(default = "default_current")]
    pub current: bool,
}

fn default_current() -> bool {
    true
}

#[derive(Debug, Deserialize, TS)]
pub struct AssignOrder {
    pub repairer_id: i64,
}

#[derive(Debug, Deserialize, TS)]
pub struct AppraiseOrder {
    pub score: i32,
}

#[derive(Debug, Deserialize, TS)]
pub struct AllowComment {
    pub allow: bool,
}

/// Owners see their orders with `order.view`, repairers the orders assigned to
/// them with `order.viewfix`; everything else needs `order.viewall`.
pub(crate) async fn ensure_can_view(
    state: &AppState,
    caller: Caller,
    order: &Order,
) -> Result<(), ApiError> {
    if order.user_id == caller.user_id && caller.holds(state, "order.view").await {
        return Ok(());
    }
    if order.repairer_id == caller.user_id && caller.holds(state, "order.viewfix").await {
        return Ok(());
    }
    caller.ensure(state, "order.viewall").await
}

async fn ensure_owner(state: &AppState, caller: Caller, order: &Order) -> Result<(), ApiError> {
    if order.user_id == caller.user_id || caller.holds(state, UPDATE_ANY).await {
        return Ok(());
    }
    Err(ApiError::Forbidden(format!(
        "Order {} belongs to another user",
        order.id
    )))
}

async fn ensure_repairer(state: &AppState, caller: Caller, order: &Order) -> Result<(), ApiError> {
    if order.repairer_id == caller.user_id || caller.holds(state, UPDATE_ANY).await {
        return Ok(());
    }
    Err(ApiError::Forbidden(format!(
        "Order {} is not assigned to you",
        order.id
    )))
}

pub async fn get_orders(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<OrderListQuery>,
    Query(page): Query<Pagination>,
) -> Result<ResponseJson<ApiResponse<Vec<Order>>>, ApiError> {
    caller.ensure(&state, "order.view").await?;

    let user_id = if caller.holds(&state, "order.viewall").await {
        query.user_id
    } else {
        Some(caller.user_id)
    };
    let tags = match query.tags.as_deref() {
        Some(raw) => parse_id_list(raw, "tags")?,
        None => Vec::new(),
    };
    let filter = OrderFilter {
        sort: query.sort,
        offset: page.offset,
        limit: page.limit,
        user_id,
        status: query.status,
        title: query.title,
        tags,
        conjunctive: query.conjunctive,
    };

    let orders = Order::list(&state.db().pool, &filter).await?;
    Ok(ResponseJson(ApiResponse::success(orders)))
}

pub async fn get_repairer_orders(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(repairer_id): Path<i64>,
    Query(query): Query<RepairerOrdersQuery>,
    Query(page): Query<Pagination>,
) -> Result<ResponseJson<ApiResponse<Vec<Order>>>, ApiError> {
    if repairer_id == caller.user_id {
        caller
            .ensure_any(&state, &["order.viewfix", "order.viewall"])
            .await?;
    } else {
        caller.ensure(&state, "order.viewall").await?;
    }

    let orders = Order::list_by_repairer(
        &state.db().pool,
        repairer_id,
        query.current,
        page.offset,
        page.limit,
    )
    .await?;
    Ok(ResponseJson(ApiResponse::success(orders)))
}

pub async fn create_order(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(payload): Json<CreateOrder>,
) -> Result<ResponseJson<ApiResponse<Order>>, ApiError> {
    caller.ensure(&state, "order.create").await?;

    let order = Order::create(&state.db().pool, &payload, caller.user_id).await?;
    tracing::info!(order_id = order.id, user_id = caller.user_id, "Order created");
    Ok(ResponseJson(ApiResponse::success(order)))
}

pub async fn get_order(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Extension(order): Extension<Order>,
) -> Result<ResponseJson<ApiResponse<Order>>, ApiError> {
    ensure_can_view(&state, caller, &order).await?;
    Ok(ResponseJson(ApiResponse::success(order)))
}

pub async fn get_order_history(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Extension(order): Extension<Order>,
) -> Result<ResponseJson<ApiResponse<Vec<StatusRecord>>>, ApiError> {
    ensure_can_view(&state, caller, &order).await?;
    let history = Order::history(&state.db().pool, order.id).await?;
    Ok(ResponseJson(ApiResponse::success(history)))
}

pub async fn update_order(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Extension(order): Extension<Order>,
    Json(payload): Json<UpdateOrder>,
) -> Result<ResponseJson<ApiResponse<Order>>, ApiError> {
    caller.ensure(&state, "order.update").await?;
    ensure_owner(&state, caller, &order).await?;

    let order = Order::update(&state.db().pool, order.id, &payload, caller.user_id).await?;
    Ok(ResponseJson(ApiResponse::success(order)))
}

pub async fn delete_order(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Extension(order): Extension<Order>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    caller.ensure(&state, "order.delete").await?;

    Order::delete(&state.db().pool, order.id).await?;
    tracing::info!(order_id = order.id, user_id = caller.user_id, "Order deleted");
    Ok(ResponseJson(ApiResponse::success(())))
}

pub async fn set_allow_comment(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Extension(order): Extension<Order>,
    Json(payload): Json<AllowComment>,
) -> Result<ResponseJson<ApiResponse<Order>>, ApiError> {
    caller.ensure(&state, "order.update").await?;
    ensure_owner(&state, caller, &order).await?;

    let order =
        Order::set_allow_comment(&state.db().pool, order.id, payload.allow, caller.user_id)
            .await?;
    Ok(ResponseJson(ApiResponse::success(order)))
}

pub async fn release_order(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Extension(order): Extension<Order>,
) -> Result<ResponseJson<ApiResponse<Order>>, ApiError> {
    caller.ensure(&state, "order.release").await?;
    ensure_repairer(&state, caller, &order).await?;

    let order = order_lifecycle::release(&state.db().pool, order.id, caller.user_id).await?;
    Ok(ResponseJson(ApiResponse::success(order)))
}

pub async fn assign_order(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Extension(order): Extension<Order>,
    Json(payload): Json<AssignOrder>,
) -> Result<ResponseJson<ApiResponse<Order>>, ApiError> {
    caller.ensure(&state, "order.assign").await?;

    let order = order_lifecycle::assign(
        &state.db().pool,
        order.id,
        payload.repairer_id,
        caller.user_id,
    )
    .await?;
    Ok(ResponseJson(ApiResponse::success(order)))
}

pub async fn self_assign_order(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Extension(order): Extension<Order>,
) -> Result<ResponseJson<ApiResponse<Order>>, ApiError> {
    caller.ensure(&state, "order.selfassign").await?;

    let order = order_lifecycle::self_assign(&state.db().pool, order.id, caller.user_id).await?;
    Ok(ResponseJson(ApiResponse::success(order)))
}

pub async fn complete_order(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Extension(order): Extension<Order>,
) -> Result<ResponseJson<ApiResponse<Order>>, ApiError> {
    caller.ensure(&state, "order.complete").await?;
    ensure_repairer(&state, caller, &order).await?;

    let order = order_lifecycle::complete(&state.db().pool, order.id, caller.user_id).await?;
    Ok(ResponseJson(ApiResponse::success(order)))
}

pub async fn cancel_order(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Extension(order): Extension<Order>,
) -> Result<ResponseJson<ApiResponse<Order>>, ApiError> {
    caller.ensure(&state, "order.cancel").await?;
    ensure_owner(&state, caller, &order).await?;

    let order = order_lifecycle::cancel(&state.db().pool, order.id, caller.user_id).await?;
    Ok(ResponseJson(ApiResponse::success(order)))
}

pub async fn reject_order(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Extension(order): Extension<Order>,
) -> Result<ResponseJson<ApiResponse<Order>>, ApiError> {
    caller.ensure(&state, "order.reject").await?;

    let order = order_lifecycle::reject(&state.db().pool, order.id, caller.user_id).await?;
    Ok(ResponseJson(ApiResponse::success(order)))
}

pub async fn report_order(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Extension(order): Extension<Order>,
) -> Result<ResponseJson<ApiResponse<Order>>, ApiError> {
    caller.ensure(&state, "order.report").await?;
    ensure_repairer(&state, caller, &order).await?;

    let order = order_lifecycle::report(&state.db().pool, order.id, caller.user_id).await?;
    Ok(ResponseJson(ApiResponse::success(order)))
}

pub async fn hold_order(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Extension(order): Extension<Order>,
) -> Result<ResponseJson<ApiResponse<Order>>, ApiError> {
    caller.ensure(&state, "order.hold").await?;
    ensure_repairer(&state, caller, &order).await?;

    let order = order_lifecycle::hold(&state.db().pool, order.id, caller.user_id).await?;
    Ok(ResponseJson(ApiResponse::success(order)))
}

pub async fn appraise_order(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Extension(order): Extension<Order>,
    Json(payload): Json<AppraiseOrder>,
) -> Result<ResponseJson<ApiResponse<Order>>, ApiError> {
    caller.ensure(&state, "order.appraise").await?;
    ensure_owner(&state, caller, &order).await?;

    let order =
        order_lifecycle::appraise(&state.db().pool, order.id, payload.score, caller.user_id)
            .await?;
    Ok(ResponseJson(ApiResponse::success(order)))
}

pub fn router(state: &AppState) -> Router<AppState> {
    let transitions_router = Router::new()
        .route("/release", post(release_order))
        .route("/assign", post(assign_order))
        .route("/self-assign", post(self_assign_order))
        .route("/complete", post(complete_order))
        .route("/cancel", post(cancel_order))
        .route("/reject", post(reject_order))
        .route("/report", post(report_order))
        .route("/hold", post(hold_order))
        .route("/appraise", post(appraise_order));

    let order_id_router = Router::new()
        .route("/", get(get_order).put(update_order).delete(delete_order))
        .route("/history", get(get_order_history))
        .route("/allow-comment", put(set_allow_comment))
        .merge(transitions_router)
        .merge(comments::order_router())
        .merge(items::order_router())
        .layer(from_fn_with_state(state.clone(), load_order_middleware));

    let inner = Router::new()
        .route("/", get(get_orders).post(create_order))
        .route("/repairer/{repairer_id}", get(get_repairer_orders))
        .nest("/{order_id}", order_id_router);

    Router::new().nest("/orders", inner)
}
