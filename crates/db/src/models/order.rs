use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Select, Set, TransactionSession, TransactionTrait,
};
use sea_orm::sea_query::{Expr, ExprTrait, LikeExpr, Query};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

use super::{order_status::StatusRecord, paginate, tag::Tag};
use crate::{
    entities::{comment, item_log, order, order_status, order_tag},
    types::{MAX_APPRAISAL, OrderStatus},
};

const MAX_TITLE_CHARS: usize = 191;

#[derive(Debug, Error)]
pub enum OrderError {
    #[error("Order not found")]
    NotFound,
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
    #[error("Illegal transition from {from} to {to}")]
    IllegalTransition { from: OrderStatus, to: OrderStatus },
    #[error("Transaction failed: {0}")]
    TransactionFailed(#[from] DbErr),
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct Order {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub user_id: i64,
    pub status: OrderStatus,
    pub repairer_id: i64,
    pub appraisal: i32,
    pub allow_comment: bool,
    pub created_by: i64,
    pub updated_by: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct CreateOrder {
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<i64>,
}

impl CreateOrder {
    pub fn validate(&self) -> Result<(), OrderError> {
        validate_title(&self.title)
    }
}

/// Fields an owner may change after creation. Status, repairer and appraisal
/// only move through [`Order::change_status`].
#[derive(Debug, Clone, Default, Deserialize, TS)]
pub struct UpdateOrder {
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub add_tags: Vec<i64>,
    #[serde(default)]
    pub del_tags: Vec<i64>,
}

impl UpdateOrder {
    pub fn validate(&self) -> Result<(), OrderError> {
        match &self.title {
            Some(title) => validate_title(title),
            None => Ok(()),
        }
    }
}

fn validate_title(title: &str) -> Result<(), OrderError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(OrderError::ValidationFailed(
            "Title must not be empty".to_string(),
        ));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(OrderError::ValidationFailed(format!(
            "Title must be at most {MAX_TITLE_CHARS} characters"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    Release,
    Assign { repairer_id: i64 },
    Complete,
    Cancel,
    Reject,
    Report,
    Hold,
    Appraise { score: i32 },
}

impl StatusChange {
    pub fn target(self) -> OrderStatus {
        match self {
            StatusChange::Release => OrderStatus::Waiting,
            StatusChange::Assign { .. } => OrderStatus::Assigned,
            StatusChange::Complete => OrderStatus::Completed,
            StatusChange::Cancel => OrderStatus::Canceled,
            StatusChange::Reject => OrderStatus::Rejected,
            StatusChange::Report => OrderStatus::Reported,
            StatusChange::Hold => OrderStatus::Hold,
            StatusChange::Appraise { .. } => OrderStatus::Appraised,
        }
    }

    pub fn validate(self) -> Result<(), OrderError> {
        match self {
            StatusChange::Assign { repairer_id } if repairer_id <= 0 => Err(
                OrderError::ValidationFailed("Repairer id must be positive".to_string()),
            ),
            StatusChange::Appraise { score } if !(1..=MAX_APPRAISAL).contains(&score) => {
                Err(OrderError::ValidationFailed(format!(
                    "Appraisal score must be between 1 and {MAX_APPRAISAL}"
                )))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
pub enum OrderSort {
    #[default]
    Newest,
    Oldest,
    RecentlyUpdated,
}

impl OrderSort {
    fn apply(self, query: Select<order::Entity>) -> Select<order::Entity> {
        match self {
            OrderSort::Newest => query
                .order_by_desc(order::Column::CreatedAt)
                .order_by_desc(order::Column::Id),
            OrderSort::Oldest => query
                .order_by_asc(order::Column::CreatedAt)
                .order_by_asc(order::Column::Id),
            OrderSort::RecentlyUpdated => query
                .order_by_desc(order::Column::UpdatedAt)
                .order_by_desc(order::Column::Id),
        }
    }
}

/// Compound filter for [`Order::list`]. Every present criterion narrows the
/// result; `limit == 0` means unbounded.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub sort: OrderSort,
    pub offset: u64,
    pub limit: u64,
    pub user_id: Option<i64>,
    pub status: Option<OrderStatus>,
    pub title: Option<String>,
    pub tags: Vec<i64>,
    /// Require every tag instead of any of them.
    pub conjunctive: bool,
}

/// Substring match on the title; `%`, `_` and `\` in the input match literally.
fn title_pattern(title: &str) -> LikeExpr {
    let mut pattern = String::with_capacity(title.len() + 2);
    pattern.push('%');
    for ch in title.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    LikeExpr::new(pattern).escape('\\')
}

fn tag_filter(query: Select<order::Entity>, tags: &[i64], conjunctive: bool) -> Select<order::Entity> {
    if tags.is_empty() {
        return query;
    }

    if conjunctive {
        tags.iter().fold(query, |query, tag_id| {
            query.filter(Expr::exists(
                Query::select()
                    .expr(Expr::val(1))
                    .from(order_tag::Entity)
                    .and_where(
                        Expr::col((order_tag::Entity, order_tag::Column::OrderId))
                            .equals((order::Entity, order::Column::Id)),
                    )
                    .and_where(
                        Expr::col((order_tag::Entity, order_tag::Column::TagId)).eq(*tag_id),
                    )
                    .to_owned(),
            ))
        })
    } else {
        query.filter(
            order::Column::Id.in_subquery(
                Query::select()
                    .column(order_tag::Column::OrderId)
                    .from(order_tag::Entity)
                    .and_where(order_tag::Column::TagId.is_in(tags.to_vec()))
                    .to_owned(),
            ),
        )
    }
}

impl Order {
    fn from_model(model: order::Model, tags: Vec<Tag>) -> Self {
        Self {
            id: model.id,
            title: model.title,
            description: model.description,
            user_id: model.user_id,
            status: model.status,
            repairer_id: model.repairer_id,
            appraisal: model.appraisal,
            allow_comment: model.allow_comment,
            created_by: model.created_by,
            updated_by: model.updated_by,
            created_at: model.created_at,
            updated_at: model.updated_at,
            tags,
        }
    }

    async fn with_tags<C: ConnectionTrait>(
        db: &C,
        models: Vec<order::Model>,
    ) -> Result<Vec<Self>, DbErr> {
        let ids: Vec<i64> = models.iter().map(|model| model.id).collect();
        let mut tags = Tag::find_by_order_ids(db, &ids).await?;
        Ok(models
            .into_iter()
            .map(|model| {
                let order_tags = tags.remove(&model.id).unwrap_or_default();
                Self::from_model(model, order_tags)
            })
            .collect())
    }

    async fn find_live_model<C: ConnectionTrait>(
        db: &C,
        id: i64,
    ) -> Result<Option<order::Model>, DbErr> {
        order::Entity::find_by_id(id)
            .filter(order::Column::DeletedAt.is_null())
            .one(db)
            .await
    }

    pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: i64) -> Result<Option<Self>, DbErr> {
        let Some(model) = Self::find_live_model(db, id).await? else {
            return Ok(None);
        };
        Ok(Self::with_tags(db, vec![model]).await?.pop())
    }

    pub async fn current_status<C: ConnectionTrait>(
        db: &C,
        id: i64,
    ) -> Result<StatusRecord, OrderError> {
        StatusRecord::find_current(db, id)
            .await?
            .ok_or(OrderError::NotFound)
    }

    pub async fn history<C: ConnectionTrait>(
        db: &C,
        id: i64,
    ) -> Result<Vec<StatusRecord>, OrderError> {
        if Self::find_live_model(db, id).await?.is_none() {
            return Err(OrderError::NotFound);
        }
        Ok(StatusRecord::history(db, id).await?)
    }

    pub async fn list<C: ConnectionTrait>(db: &C, filter: &OrderFilter) -> Result<Vec<Self>, DbErr> {
        let mut query = order::Entity::find().filter(order::Column::DeletedAt.is_null());

        if let Some(user_id) = filter.user_id.filter(|id| *id != 0) {
            query = query.filter(order::Column::UserId.eq(user_id));
        }
        if let Some(status) = filter.status {
            query = query.filter(order::Column::Status.eq(status));
        }
        if let Some(title) = filter
            .title
            .as_deref()
            .map(str::trim)
            .filter(|title| !title.is_empty())
        {
            query = query.filter(order::Column::Title.like(title_pattern(title)));
        }
        query = tag_filter(query, &filter.tags, filter.conjunctive);
        query = paginate(filter.sort.apply(query), filter.offset, filter.limit);

        let models = query.all(db).await?;
        Self::with_tags(db, models).await
    }

    /// Orders whose ledger names the repairer on a record with the given
    /// `current` flag: live assignments when true, past ones otherwise.
    pub async fn list_by_repairer<C: ConnectionTrait>(
        db: &C,
        repairer_id: i64,
        current: bool,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Self>, DbErr> {
        let query = order::Entity::find()
            .filter(order::Column::DeletedAt.is_null())
            .filter(
                order::Column::Id.in_subquery(
                    Query::select()
                        .column(order_status::Column::OrderId)
                        .from(order_status::Entity)
                        .and_where(order_status::Column::RepairerId.eq(repairer_id))
                        .and_where(order_status::Column::IsCurrent.eq(current))
                        .to_owned(),
                ),
            );
        let query = paginate(OrderSort::Newest.apply(query), offset, limit);

        let models = query.all(db).await?;
        Self::with_tags(db, models).await
    }

    /// Ids of orders that have sat in `Completed` since at least `cutoff`.
    pub async fn find_ids_completed_before<C: ConnectionTrait>(
        db: &C,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<i64>, DbErr> {
        order::Entity::find()
            .select_only()
            .column(order::Column::Id)
            .filter(order::Column::DeletedAt.is_null())
            .filter(order::Column::Status.eq(OrderStatus::Completed))
            .filter(
                order::Column::Id.in_subquery(
                    Query::select()
                        .column(order_status::Column::OrderId)
                        .from(order_status::Entity)
                        .and_where(order_status::Column::IsCurrent.eq(true))
                        .and_where(order_status::Column::Status.eq(OrderStatus::Completed))
                        .and_where(order_status::Column::CreatedAt.lte(cutoff))
                        .to_owned(),
                ),
            )
            .order_by_asc(order::Column::Id)
            .into_tuple()
            .all(db)
            .await
    }

    async fn attach_tags<C: ConnectionTrait>(
        db: &C,
        order_id: i64,
        tag_ids: &[i64],
    ) -> Result<(), DbErr> {
        let resolved = Tag::find_by_ids(db, tag_ids).await?;
        if resolved.is_empty() {
            return Ok(());
        }

        let linked: Vec<i64> = order_tag::Entity::find()
            .select_only()
            .column(order_tag::Column::TagId)
            .filter(order_tag::Column::OrderId.eq(order_id))
            .into_tuple()
            .all(db)
            .await?;

        let now = Utc::now();
        let links: Vec<order_tag::ActiveModel> = resolved
            .into_iter()
            .filter(|tag| !linked.contains(&tag.id))
            .map(|tag| order_tag::ActiveModel {
                order_id: Set(order_id),
                tag_id: Set(tag.id),
                created_at: Set(now),
            })
            .collect();
        if links.is_empty() {
            return Ok(());
        }

        order_tag::Entity::insert_many(links)
            .exec_without_returning(db)
            .await?;
        Ok(())
    }

    async fn detach_tags<C: ConnectionTrait>(
        db: &C,
        order_id: i64,
        tag_ids: &[i64],
    ) -> Result<u64, DbErr> {
        if tag_ids.is_empty() {
            return Ok(0);
        }
        let result = order_tag::Entity::delete_many()
            .filter(order_tag::Column::OrderId.eq(order_id))
            .filter(order_tag::Column::TagId.is_in(tag_ids.to_vec()))
            .exec(db)
            .await?;
        Ok(result.rows_affected)
    }

    /// Inserts the order, links the known tags and seeds the ledger in one
    /// transaction. Unknown tag ids are ignored.
    pub async fn create<C: ConnectionTrait + TransactionTrait>(
        db: &C,
        data: &CreateOrder,
        owner_id: i64,
    ) -> Result<Self, OrderError> {
        data.validate()?;

        let tx = db.begin().await?;
        let now = Utc::now();
        let active = order::ActiveModel {
            title: Set(data.title.trim().to_string()),
            description: Set(data.description.clone().unwrap_or_default()),
            user_id: Set(owner_id),
            status: Set(OrderStatus::Waiting),
            repairer_id: Set(0),
            appraisal: Set(0),
            allow_comment: Set(true),
            created_by: Set(owner_id),
            updated_by: Set(owner_id),
            created_at: Set(now),
            updated_at: Set(now),
            deleted_at: Set(None),
            ..Default::default()
        };
        let model = active.insert(&tx).await?;
        Self::attach_tags(&tx, model.id, &data.tags).await?;
        StatusRecord::seed(&tx, model.id, owner_id).await?;
        let created = Self::with_tags(&tx, vec![model])
            .await?
            .pop()
            .ok_or(OrderError::NotFound)?;
        tx.commit().await?;

        Ok(created)
    }

    /// Applies the explicit field updates, then adds and removes tags. An id
    /// present in both tag sets ends up removed.
    pub async fn update<C: ConnectionTrait + TransactionTrait>(
        db: &C,
        id: i64,
        data: &UpdateOrder,
        operator_id: i64,
    ) -> Result<Self, OrderError> {
        data.validate()?;

        let tx = db.begin().await?;
        let model = Self::find_live_model(&tx, id)
            .await?
            .ok_or(OrderError::NotFound)?;

        let mut active: order::ActiveModel = model.into();
        if let Some(title) = &data.title {
            active.title = Set(title.trim().to_string());
        }
        if let Some(description) = &data.description {
            active.description = Set(description.clone());
        }
        active.updated_by = Set(operator_id);
        active.updated_at = Set(Utc::now());
        let model = active.update(&tx).await?;

        Self::attach_tags(&tx, id, &data.add_tags).await?;
        Self::detach_tags(&tx, id, &data.del_tags).await?;

        let updated = Self::with_tags(&tx, vec![model])
            .await?
            .pop()
            .ok_or(OrderError::NotFound)?;
        tx.commit().await?;

        Ok(updated)
    }

    /// Moves the order along one edge of the state graph. The order row is
    /// locked, its fields updated and the ledger appended in one transaction.
    pub async fn change_status<C: ConnectionTrait + TransactionTrait>(
        db: &C,
        id: i64,
        change: StatusChange,
        operator_id: i64,
    ) -> Result<Self, OrderError> {
        change.validate()?;

        let tx = db.begin().await?;
        let model = order::Entity::find_by_id(id)
            .filter(order::Column::DeletedAt.is_null())
            .lock_exclusive()
            .one(&tx)
            .await?
            .ok_or(OrderError::NotFound)?;

        let from = model.status;
        let to = change.target();
        if !from.can_transition_to(to) {
            return Err(OrderError::IllegalTransition { from, to });
        }

        let repairer_id = match change {
            StatusChange::Release => 0,
            StatusChange::Assign { repairer_id } => repairer_id,
            _ => model.repairer_id,
        };

        let mut active: order::ActiveModel = model.into();
        active.status = Set(to);
        active.repairer_id = Set(repairer_id);
        if let StatusChange::Appraise { score } = change {
            active.appraisal = Set(score);
        }
        active.updated_by = Set(operator_id);
        active.updated_at = Set(Utc::now());
        let model = active.update(&tx).await?;

        let ledger_repairer = if to == OrderStatus::Assigned {
            repairer_id
        } else {
            0
        };
        StatusRecord::append(&tx, id, to, ledger_repairer, operator_id).await?;

        let changed = Self::with_tags(&tx, vec![model])
            .await?
            .pop()
            .ok_or(OrderError::NotFound)?;
        tx.commit().await?;

        Ok(changed)
    }

    pub async fn set_allow_comment<C: ConnectionTrait>(
        db: &C,
        id: i64,
        allow: bool,
        operator_id: i64,
    ) -> Result<Self, OrderError> {
        let model = Self::find_live_model(db, id)
            .await?
            .ok_or(OrderError::NotFound)?;

        let mut active: order::ActiveModel = model.into();
        active.allow_comment = Set(allow);
        active.updated_by = Set(operator_id);
        active.updated_at = Set(Utc::now());
        let model = active.update(db).await?;

        Self::with_tags(db, vec![model])
            .await?
            .pop()
            .ok_or(OrderError::NotFound)
    }

    /// Removes the order with its ledger, tag links, comments and consumption
    /// log. Stock consumed by the order is not returned.
    pub async fn delete<C: ConnectionTrait + TransactionTrait>(
        db: &C,
        id: i64,
    ) -> Result<(), OrderError> {
        let tx = db.begin().await?;
        if order::Entity::find_by_id(id).one(&tx).await?.is_none() {
            return Err(OrderError::NotFound);
        }

        item_log::Entity::delete_many()
            .filter(item_log::Column::OrderId.eq(id))
            .exec(&tx)
            .await?;
        comment::Entity::delete_many()
            .filter(comment::Column::OrderId.eq(id))
            .exec(&tx)
            .await?;
        order_tag::Entity::delete_many()
            .filter(order_tag::Column::OrderId.eq(id))
            .exec(&tx)
            .await?;
        order_status::Entity::delete_many()
            .filter(order_status::Column::OrderId.eq(id))
            .exec(&tx)
            .await?;
        order::Entity::delete_by_id(id).exec(&tx).await?;

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use sea_orm::{Database, DatabaseConnection};
    use sea_orm_migration::MigratorTrait;

    use super::*;
    use crate::models::tag::CreateTag;

    async fn setup_db() -> DatabaseConnection {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db_migration::Migrator::up(&db, None).await.unwrap();
        db
    }

    async fn create_tag(db: &DatabaseConnection, name: &str) -> Tag {
        Tag::create(
            db,
            &CreateTag {
                sort: "area".to_string(),
                name: name.to_string(),
                level: 0,
            },
            1,
        )
        .await
        .unwrap()
    }

    async fn create_order(db: &DatabaseConnection, title: &str, owner: i64, tags: Vec<i64>) -> Order {
        Order::create(
            db,
            &CreateOrder {
                title: title.to_string(),
                description: None,
                tags,
            },
            owner,
        )
        .await
        .unwrap()
    }

    fn tag_ids(order: &Order) -> Vec<i64> {
        order.tags.iter().map(|tag| tag.id).collect()
    }

    fn ids(orders: &[Order]) -> Vec<i64> {
        let mut ids: Vec<i64> = orders.iter().map(|order| order.id).collect();
        ids.sort_unstable();
        ids
    }

    #[tokio::test]
    async fn create_seeds_waiting_record_and_drops_unknown_tags() {
        let db = setup_db().await;
        let tag = create_tag(&db, "dorm").await;

        let created = create_order(&db, "Broken window", 3, vec![tag.id, 404]).await;
        assert_eq!(tag_ids(&created), vec![tag.id]);

        let fetched = Order::find_by_id(&db, created.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, OrderStatus::Waiting);
        assert_eq!(fetched.user_id, 3);
        assert_eq!(fetched.repairer_id, 0);
        assert!(fetched.allow_comment);

        let history = Order::history(&db, created.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].sequence_num, 1);
        assert!(history[0].current);
    }

    #[tokio::test]
    async fn create_rejects_blank_title() {
        let db = setup_db().await;
        let err = Order::create(
            &db,
            &CreateOrder {
                title: "   ".to_string(),
                description: None,
                tags: vec![],
            },
            1,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, OrderError::ValidationFailed(_)));
        assert!(Order::list(&db, &OrderFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn assign_complete_appraise_records_full_history() {
        let db = setup_db().await;
        let order = create_order(&db, "No hot water", 1, vec![]).await;

        Order::change_status(&db, order.id, StatusChange::Assign { repairer_id: 7 }, 2)
            .await
            .unwrap();
        Order::change_status(&db, order.id, StatusChange::Complete, 7)
            .await
            .unwrap();
        let appraised = Order::change_status(&db, order.id, StatusChange::Appraise { score: 5 }, 1)
            .await
            .unwrap();

        assert_eq!(appraised.status, OrderStatus::Appraised);
        assert_eq!(appraised.appraisal, 5);
        assert_eq!(appraised.repairer_id, 7);

        let history = Order::history(&db, order.id).await.unwrap();
        let statuses: Vec<OrderStatus> = history.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![
                OrderStatus::Waiting,
                OrderStatus::Assigned,
                OrderStatus::Completed,
                OrderStatus::Appraised,
            ]
        );
        let sequences: Vec<i32> = history.iter().map(|r| r.sequence_num).collect();
        assert_eq!(sequences, vec![1, 2, 3, 4]);
        assert_eq!(history[1].repairer_id, 7);

        let current = Order::current_status(&db, order.id).await.unwrap();
        assert_eq!(current.status, appraised.status);
        assert_eq!(current.sequence_num, 4);
    }

    #[tokio::test]
    async fn release_clears_repairer() {
        let db = setup_db().await;
        let order = create_order(&db, "Door stuck", 1, vec![]).await;

        Order::change_status(&db, order.id, StatusChange::Assign { repairer_id: 9 }, 2)
            .await
            .unwrap();
        let released = Order::change_status(&db, order.id, StatusChange::Release, 9)
            .await
            .unwrap();
        assert_eq!(released.status, OrderStatus::Waiting);
        assert_eq!(released.repairer_id, 0);
    }

    #[tokio::test]
    async fn terminal_states_reject_further_transitions() {
        let db = setup_db().await;
        let order = create_order(&db, "Flickering light", 1, vec![]).await;
        Order::change_status(&db, order.id, StatusChange::Cancel, 1)
            .await
            .unwrap();

        let err = Order::change_status(&db, order.id, StatusChange::Assign { repairer_id: 7 }, 2)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrderError::IllegalTransition {
                from: OrderStatus::Canceled,
                to: OrderStatus::Assigned,
            }
        ));
        assert_eq!(Order::history(&db, order.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn complete_requires_assignment_and_score_is_validated() {
        let db = setup_db().await;
        let order = create_order(&db, "Clogged drain", 1, vec![]).await;

        let err = Order::change_status(&db, order.id, StatusChange::Complete, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::IllegalTransition { .. }));

        let err = Order::change_status(&db, order.id, StatusChange::Appraise { score: 6 }, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::ValidationFailed(_)));

        let err = Order::change_status(&db, 999, StatusChange::Hold, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::NotFound));
    }

    #[tokio::test]
    async fn update_applies_fields_and_tag_delta_with_removal_winning() {
        let db = setup_db().await;
        let a = create_tag(&db, "a").await;
        let b = create_tag(&db, "b").await;
        let c = create_tag(&db, "c").await;
        let order = create_order(&db, "Old title", 1, vec![a.id]).await;

        let updated = Order::update(
            &db,
            order.id,
            &UpdateOrder {
                title: Some("New title".to_string()),
                description: None,
                add_tags: vec![b.id, c.id, 404],
                del_tags: vec![a.id, c.id],
            },
            5,
        )
        .await
        .unwrap();

        assert_eq!(updated.title, "New title");
        assert_eq!(updated.description, "");
        assert_eq!(updated.updated_by, 5);
        assert_eq!(tag_ids(&updated), vec![b.id]);
        // Field updates never touch the lifecycle.
        assert_eq!(updated.status, OrderStatus::Waiting);
        assert_eq!(Order::history(&db, order.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn update_missing_order_is_not_found() {
        let db = setup_db().await;
        let err = Order::update(&db, 42, &UpdateOrder::default(), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::NotFound));
    }

    #[tokio::test]
    async fn tag_filters_are_conjunctive_or_disjunctive() {
        let db = setup_db().await;
        let a = create_tag(&db, "a").await;
        let b = create_tag(&db, "b").await;
        let other = create_tag(&db, "other").await;

        let both = create_order(&db, "both", 1, vec![a.id, b.id]).await;
        let only_a = create_order(&db, "only a", 1, vec![a.id]).await;
        let only_b = create_order(&db, "only b", 1, vec![b.id]).await;
        let neither = create_order(&db, "neither", 1, vec![other.id]).await;

        let conjunctive = Order::list(
            &db,
            &OrderFilter {
                tags: vec![a.id, b.id],
                conjunctive: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(ids(&conjunctive), vec![both.id]);

        let disjunctive = Order::list(
            &db,
            &OrderFilter {
                tags: vec![a.id, b.id],
                conjunctive: false,
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(ids(&disjunctive), vec![both.id, only_a.id, only_b.id]);
        assert!(!ids(&disjunctive).contains(&neither.id));

        // Tags come back preloaded.
        let listed_both = disjunctive.iter().find(|o| o.id == both.id).unwrap();
        assert_eq!(tag_ids(listed_both), vec![a.id, b.id]);
    }

    #[tokio::test]
    async fn list_composes_owner_status_and_title_filters() {
        let db = setup_db().await;
        let mine = create_order(&db, "Leaking roof", 1, vec![]).await;
        let mine_held = create_order(&db, "Leaking pipe", 1, vec![]).await;
        let theirs = create_order(&db, "Leaking tap", 2, vec![]).await;
        create_order(&db, "Broken chair", 1, vec![]).await;
        Order::change_status(&db, mine_held.id, StatusChange::Hold, 1)
            .await
            .unwrap();

        let leaking = Order::list(
            &db,
            &OrderFilter {
                title: Some("Leaking".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(ids(&leaking), vec![mine.id, mine_held.id, theirs.id]);

        let mine_waiting = Order::list(
            &db,
            &OrderFilter {
                user_id: Some(1),
                status: Some(OrderStatus::Waiting),
                title: Some("Leak".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(ids(&mine_waiting), vec![mine.id]);

        // Owner id 0 means "any owner".
        let all = Order::list(
            &db,
            &OrderFilter {
                user_id: Some(0),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(all.len(), 4);
    }

    #[tokio::test]
    async fn title_filter_treats_wildcards_literally() {
        let db = setup_db().await;
        let percent = create_order(&db, "Heating at 100%", 1, vec![]).await;
        let underscore = create_order(&db, "fan_coil rattles", 1, vec![]).await;
        let slash = create_order(&db, "Label says C:\\temp", 1, vec![]).await;
        create_order(&db, "Plain door", 1, vec![]).await;

        for (needle, expected) in [
            ("%", percent.id),
            ("_", underscore.id),
            ("\\", slash.id),
            ("n_coil", underscore.id),
        ] {
            let found = Order::list(
                &db,
                &OrderFilter {
                    title: Some(needle.to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
            assert_eq!(ids(&found), vec![expected], "title filter {needle:?}");
        }
    }

    #[tokio::test]
    async fn list_paginates_in_requested_order() {
        let db = setup_db().await;
        let first = create_order(&db, "first", 1, vec![]).await;
        let second = create_order(&db, "second", 1, vec![]).await;
        let third = create_order(&db, "third", 1, vec![]).await;

        let page = Order::list(
            &db,
            &OrderFilter {
                sort: OrderSort::Oldest,
                offset: 1,
                limit: 1,
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(page.iter().map(|o| o.id).collect::<Vec<_>>(), vec![second.id]);

        let rest = Order::list(
            &db,
            &OrderFilter {
                sort: OrderSort::Oldest,
                offset: 1,
                limit: 0,
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(
            rest.iter().map(|o| o.id).collect::<Vec<_>>(),
            vec![second.id, third.id]
        );

        let newest = Order::list(&db, &OrderFilter::default()).await.unwrap();
        assert_eq!(newest.first().map(|o| o.id), Some(third.id));
        assert_eq!(newest.last().map(|o| o.id), Some(first.id));
    }

    #[tokio::test]
    async fn oversized_pagination_is_clamped() {
        let db = setup_db().await;
        let order = create_order(&db, "only", 1, vec![]).await;

        let all = Order::list(
            &db,
            &OrderFilter {
                limit: u64::MAX,
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(ids(&all), vec![order.id]);

        let none = Order::list(
            &db,
            &OrderFilter {
                offset: u64::MAX,
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(none.is_empty());

        let by_repairer = Order::list_by_repairer(&db, 7, true, u64::MAX, u64::MAX)
            .await
            .unwrap();
        assert!(by_repairer.is_empty());
    }

    #[tokio::test]
    async fn failed_ledger_append_rolls_back_order_update() {
        let db = setup_db().await;
        let order = create_order(&db, "Heater", 1, vec![]).await;
        Order::change_status(&db, order.id, StatusChange::Assign { repairer_id: 7 }, 2)
            .await
            .unwrap();

        // Orphan the order so the ledger append inside the transition fails.
        order_status::Entity::delete_many()
            .filter(order_status::Column::OrderId.eq(order.id))
            .exec(&db)
            .await
            .unwrap();

        let err = Order::change_status(&db, order.id, StatusChange::Complete, 7)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrderError::TransactionFailed(DbErr::RecordNotFound(_))
        ));

        let after = Order::find_by_id(&db, order.id).await.unwrap().unwrap();
        assert_eq!(after.status, OrderStatus::Assigned);
        assert_eq!(after.updated_by, 2);
    }

    #[tokio::test]
    async fn concurrent_assign_never_yields_two_current_records() {
        let db = setup_db().await;
        let order = create_order(&db, "Elevator", 1, vec![]).await;
        let other = db.clone();

        let (first, second) = tokio::join!(
            Order::change_status(&db, order.id, StatusChange::Assign { repairer_id: 7 }, 2),
            Order::change_status(&other, order.id, StatusChange::Assign { repairer_id: 8 }, 3),
        );
        let committed = [first.is_ok(), second.is_ok()]
            .iter()
            .filter(|ok| **ok)
            .count();
        assert!(committed >= 1);

        let history = Order::history(&db, order.id).await.unwrap();
        assert_eq!(history.len(), committed + 1);
        assert_eq!(history.iter().filter(|r| r.current).count(), 1);
        let sequences: Vec<i32> = history.iter().map(|r| r.sequence_num).collect();
        let expected: Vec<i32> = (1..=history.len() as i32).collect();
        assert_eq!(sequences, expected);

        let current = Order::current_status(&db, order.id).await.unwrap();
        let stored = Order::find_by_id(&db, order.id).await.unwrap().unwrap();
        assert_eq!(current.status, stored.status);
        assert_eq!(current.repairer_id, stored.repairer_id);
    }

    #[tokio::test]
    async fn list_by_repairer_splits_current_and_past_assignments() {
        let db = setup_db().await;
        let active = create_order(&db, "active", 1, vec![]).await;
        let handed_over = create_order(&db, "handed over", 1, vec![]).await;

        Order::change_status(&db, active.id, StatusChange::Assign { repairer_id: 7 }, 2)
            .await
            .unwrap();
        Order::change_status(&db, handed_over.id, StatusChange::Assign { repairer_id: 7 }, 2)
            .await
            .unwrap();
        Order::change_status(&db, handed_over.id, StatusChange::Assign { repairer_id: 8 }, 2)
            .await
            .unwrap();

        let current = Order::list_by_repairer(&db, 7, true, 0, 0).await.unwrap();
        assert_eq!(ids(&current), vec![active.id]);
        let past = Order::list_by_repairer(&db, 7, false, 0, 0).await.unwrap();
        assert_eq!(ids(&past), vec![handed_over.id]);
    }

    #[tokio::test]
    async fn set_allow_comment_toggles_flag() {
        let db = setup_db().await;
        let order = create_order(&db, "Fan", 1, vec![]).await;

        let updated = Order::set_allow_comment(&db, order.id, false, 4).await.unwrap();
        assert!(!updated.allow_comment);
        assert_eq!(updated.updated_by, 4);
    }

    #[tokio::test]
    async fn delete_cascades_to_ledger_and_links() {
        let db = setup_db().await;
        let tag = create_tag(&db, "a").await;
        let order = create_order(&db, "To delete", 1, vec![tag.id]).await;
        Order::change_status(&db, order.id, StatusChange::Hold, 1)
            .await
            .unwrap();

        Order::delete(&db, order.id).await.unwrap();

        assert!(Order::find_by_id(&db, order.id).await.unwrap().is_none());
        assert!(StatusRecord::history(&db, order.id).await.unwrap().is_empty());
        assert!(Tag::find_by_order_ids(&db, &[order.id]).await.unwrap().is_empty());
        // Tags themselves survive.
        assert!(Tag::find_by_id(&db, tag.id).await.unwrap().is_some());

        let err = Order::delete(&db, order.id).await.unwrap_err();
        assert!(matches!(err, OrderError::NotFound));
    }

    #[tokio::test]
    async fn completed_orders_are_found_by_age() {
        let db = setup_db().await;
        let done = create_order(&db, "done", 1, vec![]).await;
        let pending = create_order(&db, "pending", 1, vec![]).await;
        Order::change_status(&db, done.id, StatusChange::Assign { repairer_id: 7 }, 2)
            .await
            .unwrap();
        Order::change_status(&db, done.id, StatusChange::Complete, 7)
            .await
            .unwrap();
        Order::change_status(&db, pending.id, StatusChange::Assign { repairer_id: 7 }, 2)
            .await
            .unwrap();

        let later = Utc::now() + chrono::Duration::seconds(5);
        assert_eq!(
            Order::find_ids_completed_before(&db, later).await.unwrap(),
            vec![done.id]
        );

        let earlier = Utc::now() - chrono::Duration::hours(1);
        assert!(Order::find_ids_completed_before(&db, earlier)
            .await
            .unwrap()
            .is_empty());
    }
}
