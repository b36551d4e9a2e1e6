//! Named lifecycle operations on orders.
//!
//! Each operation is one atomic transition: the order row is locked, the
//! move is checked against the state graph, the order fields are updated and
//! the status ledger is appended before anything commits.

use db::{
    ConnectionTrait, TransactionTrait,
    models::order::{Order, OrderError, StatusChange},
};

/// Operator id recorded for transitions made by background jobs.
pub const SYSTEM_OPERATOR_ID: i64 = 0;

async fn transition<C: ConnectionTrait + TransactionTrait>(
    db: &C,
    order_id: i64,
    change: StatusChange,
    operator_id: i64,
) -> Result<Order, OrderError> {
    match Order::change_status(db, order_id, change, operator_id).await {
        Ok(order) => {
            tracing::info!(
                order_id,
                operator_id,
                status = %order.status,
                repairer_id = order.repairer_id,
                "Order transitioned"
            );
            Ok(order)
        }
        Err(OrderError::TransactionFailed(err)) => {
            tracing::error!(order_id, operator_id, ?change, error = %err, "Order transition rolled back");
            Err(OrderError::TransactionFailed(err))
        }
        Err(err) => {
            tracing::debug!(order_id, operator_id, ?change, error = %err, "Order transition refused");
            Err(err)
        }
    }
}

/// Hands the order back to the pool and clears its repairer.
pub async fn release<C: ConnectionTrait + TransactionTrait>(
    db: &C,
    order_id: i64,
    operator_id: i64,
) -> Result<Order, OrderError> {
    transition(db, order_id, StatusChange::Release, operator_id).await
}

pub async fn assign<C: ConnectionTrait + TransactionTrait>(
    db: &C,
    order_id: i64,
    repairer_id: i64,
    operator_id: i64,
) -> Result<Order, OrderError> {
    transition(db, order_id, StatusChange::Assign { repairer_id }, operator_id).await
}

pub async fn self_assign<C: ConnectionTrait + TransactionTrait>(
    db: &C,
    order_id: i64,
    operator_id: i64,
) -> Result<Order, OrderError> {
    assign(db, order_id, operator_id, operator_id).await
}

pub async fn complete<C: ConnectionTrait + TransactionTrait>(
    db: &C,
    order_id: i64,
    operator_id: i64,
) -> Result<Order, OrderError> {
    transition(db, order_id, StatusChange::Complete, operator_id).await
}

pub async fn cancel<C: ConnectionTrait + TransactionTrait>(
    db: &C,
    order_id: i64,
    operator_id: i64,
) -> Result<Order, OrderError> {
    transition(db, order_id, StatusChange::Cancel, operator_id).await
}

pub async fn reject<C: ConnectionTrait + TransactionTrait>(
    db: &C,
    order_id: i64,
    operator_id: i64,
) -> Result<Order, OrderError> {
    transition(db, order_id, StatusChange::Reject, operator_id).await
}

pub async fn report<C: ConnectionTrait + TransactionTrait>(
    db: &C,
    order_id: i64,
    operator_id: i64,
) -> Result<Order, OrderError> {
    transition(db, order_id, StatusChange::Report, operator_id).await
}

pub async fn hold<C: ConnectionTrait + TransactionTrait>(
    db: &C,
    order_id: i64,
    operator_id: i64,
) -> Result<Order, OrderError> {
    transition(db, order_id, StatusChange::Hold, operator_id).await
}

/// Scores the finished work. The score is checked before any transaction opens.
pub async fn appraise<C: ConnectionTrait + TransactionTrait>(
    db: &C,
    order_id: i64,
    score: i32,
    operator_id: i64,
) -> Result<Order, OrderError> {
    let change = StatusChange::Appraise { score };
    change.validate()?;
    transition(db, order_id, change, operator_id).await
}
