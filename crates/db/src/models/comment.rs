use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    Set,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

use super::paginate;
use crate::entities::{comment, order};

const MAX_CONTENT_CHARS: usize = 2000;

#[derive(Debug, Error)]
pub enum CommentError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("Comment not found")]
    NotFound,
    #[error("Order not found")]
    OrderNotFound,
    #[error("Comments are disabled for this order")]
    CommentsDisabled,
    #[error("Validation error: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct Comment {
    pub id: i64,
    pub order_id: i64,
    pub user_id: i64,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, TS)]
pub struct CreateComment {
    pub content: String,
}

impl CreateComment {
    pub fn validate(&self) -> Result<(), CommentError> {
        let content = self.content.trim();
        if content.is_empty() {
            return Err(CommentError::ValidationError(
                "Comment must not be empty".to_string(),
            ));
        }
        if content.chars().count() > MAX_CONTENT_CHARS {
            return Err(CommentError::ValidationError(format!(
                "Comment must be at most {MAX_CONTENT_CHARS} characters"
            )));
        }
        Ok(())
    }
}

impl Comment {
    fn from_model(model: comment::Model) -> Self {
        Self {
            id: model.id,
            order_id: model.order_id,
            user_id: model.user_id,
            content: model.content,
            created_at: model.created_at,
        }
    }

    pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: i64) -> Result<Option<Self>, DbErr> {
        let record = comment::Entity::find_by_id(id).one(db).await?;
        Ok(record.map(Self::from_model))
    }

    /// Oldest first. `limit == 0` returns everything after `offset`.
    pub async fn find_by_order_id<C: ConnectionTrait>(
        db: &C,
        order_id: i64,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Self>, DbErr> {
        let query = comment::Entity::find()
            .filter(comment::Column::OrderId.eq(order_id))
            .order_by_asc(comment::Column::CreatedAt)
            .order_by_asc(comment::Column::Id);
        let records = paginate(query, offset, limit).all(db).await?;
        Ok(records.into_iter().map(Self::from_model).collect())
    }

    pub async fn create<C: ConnectionTrait>(
        db: &C,
        order_id: i64,
        user_id: i64,
        data: &CreateComment,
    ) -> Result<Self, CommentError> {
        data.validate()?;

        let order = order::Entity::find_by_id(order_id)
            .filter(order::Column::DeletedAt.is_null())
            .one(db)
            .await?
            .ok_or(CommentError::OrderNotFound)?;
        if !order.allow_comment {
            return Err(CommentError::CommentsDisabled);
        }

        let active = comment::ActiveModel {
            order_id: Set(order_id),
            user_id: Set(user_id),
            content: Set(data.content.trim().to_string()),
            created_at: Set(Utc::now()),
            ..Default::default()
        };
        let model = active.insert(db).await?;
        Ok(Self::from_model(model))
    }

    pub async fn delete<C: ConnectionTrait>(db: &C, id: i64) -> Result<(), CommentError> {
        let result = comment::Entity::delete_by_id(id).exec(db).await?;
        if result.rows_affected == 0 {
            return Err(CommentError::NotFound);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use sea_orm::Database;
    use sea_orm_migration::MigratorTrait;

    use super::*;
    use crate::models::order::{CreateOrder, Order};

    async fn setup_db() -> sea_orm::DatabaseConnection {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db_migration::Migrator::up(&db, None).await.unwrap();
        db
    }

    async fn create_order(db: &sea_orm::DatabaseConnection) -> Order {
        Order::create(
            db,
            &CreateOrder {
                title: "Noisy radiator".to_string(),
                description: None,
                tags: vec![],
            },
            1,
        )
        .await
        .unwrap()
    }

    fn comment(content: &str) -> CreateComment {
        CreateComment {
            content: content.to_string(),
        }
    }

    #[tokio::test]
    async fn comments_are_listed_oldest_first() {
        let db = setup_db().await;
        let order = create_order(&db).await;

        Comment::create(&db, order.id, 1, &comment("first")).await.unwrap();
        Comment::create(&db, order.id, 7, &comment(" second ")).await.unwrap();

        let all = Comment::find_by_order_id(&db, order.id, 0, 0).await.unwrap();
        let contents: Vec<&str> = all.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second"]);

        let tail = Comment::find_by_order_id(&db, order.id, 1, 0).await.unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].user_id, 7);
    }

    #[tokio::test]
    async fn disabled_or_blank_comments_are_rejected() {
        let db = setup_db().await;
        let order = create_order(&db).await;

        let err = Comment::create(&db, order.id, 1, &comment("  "))
            .await
            .unwrap_err();
        assert!(matches!(err, CommentError::ValidationError(_)));

        Order::set_allow_comment(&db, order.id, false, 1).await.unwrap();
        let err = Comment::create(&db, order.id, 1, &comment("hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, CommentError::CommentsDisabled));

        let err = Comment::create(&db, 999, 1, &comment("hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, CommentError::OrderNotFound));
    }

    #[tokio::test]
    async fn delete_reports_missing_comment() {
        let db = setup_db().await;
        let order = create_order(&db).await;
        let created = Comment::create(&db, order.id, 1, &comment("bye")).await.unwrap();

        Comment::delete(&db, created.id).await.unwrap();
        assert!(Comment::find_by_id(&db, created.id).await.unwrap().is_none());
        assert!(matches!(
            Comment::delete(&db, created.id).await.unwrap_err(),
            CommentError::NotFound
        ));
    }
}
