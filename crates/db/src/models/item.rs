//! Spare parts inventory and the per-order consumption log.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionSession, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

use crate::{
    entities::{item, item_log, order},
    types::OrderStatus,
};

#[derive(Debug, Error)]
pub enum ItemError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("Item not found")]
    NotFound,
    #[error("Order not found")]
    OrderNotFound,
    #[error("Parts can only be consumed while the order is assigned (currently {0})")]
    OrderNotAssigned(OrderStatus),
    #[error("Insufficient stock: {available} available, {requested} requested")]
    InsufficientStock { available: i32, requested: i32 },
    #[error("Item {0} already exists")]
    AlreadyExists(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct Item {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub price_cents: i64,
    pub count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, TS)]
pub struct CreateItem {
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i64,
    #[serde(default)]
    pub count: i32,
}

impl CreateItem {
    pub fn validate(&self) -> Result<(), ItemError> {
        if self.name.trim().is_empty() {
            return Err(ItemError::ValidationError(
                "Item name must not be empty".to_string(),
            ));
        }
        if self.price_cents < 0 || self.count < 0 {
            return Err(ItemError::ValidationError(
                "Item price and count must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Quantity of one item used up by an order, with its total cost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct ConsumedItem {
    pub item_id: i64,
    pub name: String,
    pub count: i32,
    pub price_cents: i64,
}

fn positive_count(count: i32) -> Result<(), ItemError> {
    if count <= 0 {
        return Err(ItemError::ValidationError(
            "Count must be positive".to_string(),
        ));
    }
    Ok(())
}

fn line_price(unit_price_cents: i64, count: i32) -> Result<i64, ItemError> {
    unit_price_cents
        .checked_mul(i64::from(count))
        .ok_or_else(|| ItemError::ValidationError("Item price overflows".to_string()))
}

impl Item {
    fn from_model(model: item::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            description: model.description,
            price_cents: model.price_cents,
            count: model.count,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }

    pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: i64) -> Result<Option<Self>, DbErr> {
        let record = item::Entity::find_by_id(id).one(db).await?;
        Ok(record.map(Self::from_model))
    }

    pub async fn find_all<C: ConnectionTrait>(db: &C) -> Result<Vec<Self>, DbErr> {
        let records = item::Entity::find()
            .order_by_asc(item::Column::Name)
            .all(db)
            .await?;
        Ok(records.into_iter().map(Self::from_model).collect())
    }

    pub async fn create<C: ConnectionTrait>(db: &C, data: &CreateItem) -> Result<Self, ItemError> {
        data.validate()?;
        let name = data.name.trim().to_string();

        let existing = item::Entity::find()
            .filter(item::Column::Name.eq(name.as_str()))
            .one(db)
            .await?;
        if existing.is_some() {
            return Err(ItemError::AlreadyExists(name));
        }

        let now = Utc::now();
        let active = item::ActiveModel {
            name: Set(name),
            description: Set(data.description.clone().unwrap_or_default()),
            price_cents: Set(data.price_cents),
            count: Set(data.count),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        let model = active.insert(db).await?;
        Ok(Self::from_model(model))
    }

    pub async fn restock<C: ConnectionTrait + TransactionTrait>(
        db: &C,
        id: i64,
        count: i32,
        operator_id: i64,
    ) -> Result<Self, ItemError> {
        positive_count(count)?;

        let tx = db.begin().await?;
        let model = item::Entity::find_by_id(id)
            .lock_exclusive()
            .one(&tx)
            .await?
            .ok_or(ItemError::NotFound)?;

        let price_cents = line_price(model.price_cents, count)?;
        let stock = model.count.checked_add(count).ok_or_else(|| {
            ItemError::ValidationError("Item stock would exceed the maximum count".to_string())
        })?;

        let now = Utc::now();
        let mut active: item::ActiveModel = model.clone().into();
        active.count = Set(stock);
        active.updated_at = Set(now);
        let model = active.update(&tx).await?;

        item_log::ActiveModel {
            item_id: Set(id),
            order_id: Set(None),
            change: Set(count),
            price_cents: Set(price_cents),
            created_by: Set(operator_id),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&tx)
        .await?;

        tx.commit().await?;
        Ok(Self::from_model(model))
    }

    /// Takes `count` units out of stock for an assigned order and logs the
    /// consumption against it, in one transaction.
    pub async fn consume<C: ConnectionTrait + TransactionTrait>(
        db: &C,
        order_id: i64,
        item_id: i64,
        count: i32,
        operator_id: i64,
    ) -> Result<Self, ItemError> {
        positive_count(count)?;

        let tx = db.begin().await?;
        let order = order::Entity::find_by_id(order_id)
            .filter(order::Column::DeletedAt.is_null())
            .lock_shared()
            .one(&tx)
            .await?
            .ok_or(ItemError::OrderNotFound)?;
        if order.status != OrderStatus::Assigned {
            return Err(ItemError::OrderNotAssigned(order.status));
        }

        let model = item::Entity::find_by_id(item_id)
            .lock_exclusive()
            .one(&tx)
            .await?
            .ok_or(ItemError::NotFound)?;
        if model.count < count {
            return Err(ItemError::InsufficientStock {
                available: model.count,
                requested: count,
            });
        }

        let price_cents = line_price(model.price_cents, count)?;

        let now = Utc::now();
        let mut active: item::ActiveModel = model.clone().into();
        active.count = Set(model.count - count);
        active.updated_at = Set(now);
        let model = active.update(&tx).await?;

        item_log::ActiveModel {
            item_id: Set(item_id),
            order_id: Set(Some(order_id)),
            change: Set(-count),
            price_cents: Set(price_cents),
            created_by: Set(operator_id),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&tx)
        .await?;

        tx.commit().await?;
        tracing::debug!(order_id, item_id, count, "Consumed item for order");
        Ok(Self::from_model(model))
    }

    /// Parts used by the order, one entry per item, ordered by item id.
    pub async fn consumed_by_order<C: ConnectionTrait>(
        db: &C,
        order_id: i64,
    ) -> Result<Vec<ConsumedItem>, DbErr> {
        let logs = item_log::Entity::find()
            .filter(item_log::Column::OrderId.eq(order_id))
            .all(db)
            .await?;
        if logs.is_empty() {
            return Ok(Vec::new());
        }

        let mut totals: BTreeMap<i64, (i32, i64)> = BTreeMap::new();
        for log in logs {
            let entry = totals.entry(log.item_id).or_default();
            entry.0 = entry.0.saturating_sub(log.change);
            entry.1 = entry.1.saturating_add(log.price_cents);
        }

        let item_ids: Vec<i64> = totals.keys().copied().collect();
        let names: BTreeMap<i64, String> = item::Entity::find()
            .select_only()
            .column(item::Column::Id)
            .column(item::Column::Name)
            .filter(item::Column::Id.is_in(item_ids))
            .into_tuple::<(i64, String)>()
            .all(db)
            .await?
            .into_iter()
            .collect();

        Ok(totals
            .into_iter()
            .map(|(item_id, (count, price_cents))| ConsumedItem {
                item_id,
                name: names.get(&item_id).cloned().unwrap_or_default(),
                count,
                price_cents,
            })
            .collect())
    }
}
