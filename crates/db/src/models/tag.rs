use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

use crate::entities::{order_tag, tag};

#[derive(Debug, Error)]
pub enum TagError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("Tag not found")]
    NotFound,
    #[error("Tag {sort}:{name} already exists")]
    AlreadyExists { sort: String, name: String },
    #[error("Validation error: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct Tag {
    pub id: i64,
    pub sort: String,
    pub name: String,
    pub level: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, TS)]
pub struct CreateTag {
    pub sort: String,
    pub name: String,
    #[serde(default)]
    pub level: i32,
}

impl CreateTag {
    pub fn validate(&self) -> Result<(), TagError> {
        if self.sort.trim().is_empty() || self.name.trim().is_empty() {
            return Err(TagError::ValidationError(
                "Tag sort and name must not be empty".to_string(),
            ));
        }
        if self.sort.chars().count() > 191 || self.name.chars().count() > 191 {
            return Err(TagError::ValidationError(
                "Tag sort and name must be at most 191 characters".to_string(),
            ));
        }
        if self.level < 0 {
            return Err(TagError::ValidationError(
                "Tag level must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

impl Tag {
    fn from_model(model: tag::Model) -> Self {
        Self {
            id: model.id,
            sort: model.sort,
            name: model.name,
            level: model.level,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }

    pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: i64) -> Result<Option<Self>, DbErr> {
        let record = tag::Entity::find_by_id(id).one(db).await?;
        Ok(record.map(Self::from_model))
    }

    /// Resolves ids to existing tags. Unknown ids are dropped, not reported.
    pub async fn find_by_ids<C: ConnectionTrait>(db: &C, ids: &[i64]) -> Result<Vec<Self>, DbErr> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let records = tag::Entity::find()
            .filter(tag::Column::Id.is_in(ids.to_vec()))
            .order_by_asc(tag::Column::Id)
            .all(db)
            .await?;
        Ok(records.into_iter().map(Self::from_model).collect())
    }

    pub async fn find_by_sort<C: ConnectionTrait>(db: &C, sort: &str) -> Result<Vec<Self>, DbErr> {
        let records = tag::Entity::find()
            .filter(tag::Column::Sort.eq(sort))
            .order_by_asc(tag::Column::Level)
            .order_by_asc(tag::Column::Name)
            .all(db)
            .await?;
        Ok(records.into_iter().map(Self::from_model).collect())
    }

    pub async fn find_all_sorts<C: ConnectionTrait>(db: &C) -> Result<Vec<String>, DbErr> {
        tag::Entity::find()
            .select_only()
            .column(tag::Column::Sort)
            .distinct()
            .order_by_asc(tag::Column::Sort)
            .into_tuple()
            .all(db)
            .await
    }

    /// Tags attached to each of the given orders, keyed by order id.
    pub async fn find_by_order_ids<C: ConnectionTrait>(
        db: &C,
        order_ids: &[i64],
    ) -> Result<HashMap<i64, Vec<Self>>, DbErr> {
        let mut by_order: HashMap<i64, Vec<Self>> = HashMap::new();
        if order_ids.is_empty() {
            return Ok(by_order);
        }

        let links = order_tag::Entity::find()
            .filter(order_tag::Column::OrderId.is_in(order_ids.to_vec()))
            .all(db)
            .await?;
        if links.is_empty() {
            return Ok(by_order);
        }

        let mut tag_ids: Vec<i64> = links.iter().map(|link| link.tag_id).collect();
        tag_ids.sort_unstable();
        tag_ids.dedup();
        let tags: HashMap<i64, Self> = Self::find_by_ids(db, &tag_ids)
            .await?
            .into_iter()
            .map(|tag| (tag.id, tag))
            .collect();

        for link in links {
            if let Some(tag) = tags.get(&link.tag_id) {
                by_order.entry(link.order_id).or_default().push(tag.clone());
            }
        }
        for tags in by_order.values_mut() {
            tags.sort_by_key(|tag| tag.id);
        }
        Ok(by_order)
    }

    pub async fn create<C: ConnectionTrait>(
        db: &C,
        data: &CreateTag,
        operator_id: i64,
    ) -> Result<Self, TagError> {
        data.validate()?;
        let sort = data.sort.trim().to_string();
        let name = data.name.trim().to_string();

        let existing = tag::Entity::find()
            .filter(tag::Column::Sort.eq(sort.as_str()))
            .filter(tag::Column::Name.eq(name.as_str()))
            .one(db)
            .await?;
        if existing.is_some() {
            return Err(TagError::AlreadyExists { sort, name });
        }

        let now = Utc::now();
        let active = tag::ActiveModel {
            sort: Set(sort),
            name: Set(name),
            level: Set(data.level),
            created_by: Set(operator_id),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        let model = active.insert(db).await?;
        Ok(Self::from_model(model))
    }

    pub async fn delete<C: ConnectionTrait>(db: &C, id: i64) -> Result<u64, DbErr> {
        let result = tag::Entity::delete_many()
            .filter(tag::Column::Id.eq(id))
            .exec(db)
            .await?;
        Ok(result.rows_affected)
    }
}

#[cfg(test)]
mod tests {
    use sea_orm::Database;
    use sea_orm_migration::MigratorTrait;

    use super::*;

    async fn setup_db() -> sea_orm::DatabaseConnection {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db_migration::Migrator::up(&db, None).await.unwrap();
        db
    }

    fn create_tag(sort: &str, name: &str, level: i32) -> CreateTag {
        CreateTag {
            sort: sort.to_string(),
            name: name.to_string(),
            level,
        }
    }

    #[tokio::test]
    async fn create_rejects_duplicate_sort_and_name() {
        let db = setup_db().await;

        Tag::create(&db, &create_tag("area", "dorm", 0), 1)
            .await
            .unwrap();
        let err = Tag::create(&db, &create_tag("area", " dorm ", 0), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, TagError::AlreadyExists { .. }));

        // Same name under another sort is a different tag.
        Tag::create(&db, &create_tag("kind", "dorm", 0), 1)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn create_validates_input() {
        let db = setup_db().await;
        let err = Tag::create(&db, &create_tag("", "x", 0), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, TagError::ValidationError(_)));
    }

    #[tokio::test]
    async fn find_by_ids_drops_unknown_ids() {
        let db = setup_db().await;
        let a = Tag::create(&db, &create_tag("area", "a", 0), 1)
            .await
            .unwrap();
        let b = Tag::create(&db, &create_tag("area", "b", 1), 1)
            .await
            .unwrap();

        let found = Tag::find_by_ids(&db, &[b.id, 999, a.id]).await.unwrap();
        let ids: Vec<i64> = found.iter().map(|tag| tag.id).collect();
        assert_eq!(ids, vec![a.id, b.id]);

        assert!(Tag::find_by_ids(&db, &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sorts_and_tags_by_sort() {
        let db = setup_db().await;
        Tag::create(&db, &create_tag("kind", "water", 1), 1)
            .await
            .unwrap();
        Tag::create(&db, &create_tag("kind", "power", 0), 1)
            .await
            .unwrap();
        Tag::create(&db, &create_tag("area", "lab", 0), 1)
            .await
            .unwrap();

        assert_eq!(
            Tag::find_all_sorts(&db).await.unwrap(),
            vec!["area".to_string(), "kind".to_string()]
        );
        let names: Vec<String> = Tag::find_by_sort(&db, "kind")
            .await
            .unwrap()
            .into_iter()
            .map(|tag| tag.name)
            .collect();
        assert_eq!(names, vec!["power".to_string(), "water".to_string()]);
    }
}
