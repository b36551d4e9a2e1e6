//! Append-only status history of an order.
//!
//! Every order owns a gapless sequence of records starting at 1. Exactly one
//! record per order carries `is_current`, and it is always the one with the
//! highest sequence number. Writes go through [`StatusRecord::seed`] (creation)
//! and [`StatusRecord::append`] (every later transition); both must run inside
//! the caller's transaction together with the matching `orders.status` update.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    Set,
};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::{entities::order_status, types::OrderStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct StatusRecord {
    pub id: i64,
    pub order_id: i64,
    pub status: OrderStatus,
    pub sequence_num: i32,
    pub repairer_id: i64,
    pub current: bool,
    pub created_by: i64,
    pub updated_by: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StatusRecord {
    fn from_model(model: order_status::Model) -> Self {
        Self {
            id: model.id,
            order_id: model.order_id,
            status: model.status,
            sequence_num: model.sequence_num,
            repairer_id: model.repairer_id,
            current: model.is_current,
            created_by: model.created_by,
            updated_by: model.updated_by,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }

    pub async fn find_current<C: ConnectionTrait>(
        db: &C,
        order_id: i64,
    ) -> Result<Option<Self>, DbErr> {
        let record = order_status::Entity::find()
            .filter(order_status::Column::OrderId.eq(order_id))
            .filter(order_status::Column::IsCurrent.eq(true))
            .one(db)
            .await?;
        Ok(record.map(Self::from_model))
    }

    /// Full history in ascending sequence order.
    pub async fn history<C: ConnectionTrait>(db: &C, order_id: i64) -> Result<Vec<Self>, DbErr> {
        let records = order_status::Entity::find()
            .filter(order_status::Column::OrderId.eq(order_id))
            .order_by_asc(order_status::Column::SequenceNum)
            .all(db)
            .await?;
        Ok(records.into_iter().map(Self::from_model).collect())
    }

    /// Writes the first record of a freshly inserted order. Fails if the order
    /// already has history; use [`StatusRecord::append`] for transitions.
    pub async fn seed<C: ConnectionTrait>(
        db: &C,
        order_id: i64,
        operator_id: i64,
    ) -> Result<Self, DbErr> {
        let existing = order_status::Entity::find()
            .filter(order_status::Column::OrderId.eq(order_id))
            .one(db)
            .await?;
        if existing.is_some() {
            return Err(DbErr::Custom(format!(
                "Order {order_id} already has status history"
            )));
        }

        Self::insert(db, order_id, OrderStatus::Waiting, 0, 1, operator_id).await
    }

    /// Retires the current record and appends its successor.
    ///
    /// An order without a current record is an orphan (creation always seeds
    /// one) and fails with `RecordNotFound`.
    pub async fn append<C: ConnectionTrait>(
        db: &C,
        order_id: i64,
        status: OrderStatus,
        repairer_id: i64,
        operator_id: i64,
    ) -> Result<Self, DbErr> {
        let current = order_status::Entity::find()
            .filter(order_status::Column::OrderId.eq(order_id))
            .filter(order_status::Column::IsCurrent.eq(true))
            .one(db)
            .await?
            .ok_or(DbErr::RecordNotFound(format!(
                "Current status of order {order_id} not found"
            )))?;

        let next_sequence = current.sequence_num + 1;
        let mut retired: order_status::ActiveModel = current.into();
        retired.is_current = Set(false);
        retired.updated_by = Set(operator_id);
        retired.updated_at = Set(Utc::now());
        retired.update(db).await?;

        Self::insert(db, order_id, status, repairer_id, next_sequence, operator_id).await
    }

    async fn insert<C: ConnectionTrait>(
        db: &C,
        order_id: i64,
        status: OrderStatus,
        repairer_id: i64,
        sequence_num: i32,
        operator_id: i64,
    ) -> Result<Self, DbErr> {
        let now = Utc::now();
        let active = order_status::ActiveModel {
            order_id: Set(order_id),
            status: Set(status),
            sequence_num: Set(sequence_num),
            repairer_id: Set(repairer_id),
            is_current: Set(true),
            created_by: Set(operator_id),
            updated_by: Set(operator_id),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        let model = active.insert(db).await?;
        Ok(Self::from_model(model))
    }
}
