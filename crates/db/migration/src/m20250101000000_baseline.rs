use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::DatabaseBackend;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create().if_not_exists()
                    .table(Orders::Table)
                    .col(pk_id_col(manager, Orders::Id))
                    .col(ColumnDef::new(Orders::Title).string_len(191).not_null())
                    .col(
                        ColumnDef::new(Orders::Description)
                            .text()
                            .not_null()
                            .default(Expr::val("")),
                    )
                    .col(fk_id_col(manager, Orders::UserId))
                    .col(
                        ColumnDef::new(Orders::Status)
                            .integer()
                            .not_null()
                            .default(Expr::val(1)),
                    )
                    .col(user_ref_col(manager, Orders::RepairerId))
                    .col(
                        ColumnDef::new(Orders::Appraisal)
                            .integer()
                            .not_null()
                            .default(Expr::val(0)),
                    )
                    .col(
                        ColumnDef::new(Orders::AllowComment)
                            .boolean()
                            .not_null()
                            .default(Expr::val(true)),
                    )
                    .col(user_ref_col(manager, Orders::CreatedBy))
                    .col(user_ref_col(manager, Orders::UpdatedBy))
                    .col(timestamp_col(Orders::CreatedAt))
                    .col(timestamp_col(Orders::UpdatedAt))
                    .col(ColumnDef::new(Orders::DeletedAt).timestamp())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_orders_user_id")
                    .table(Orders::Table)
                    .col(Orders::UserId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_orders_status")
                    .table(Orders::Table)
                    .col(Orders::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create().if_not_exists()
                    .table(OrderStatuses::Table)
                    .col(pk_id_col(manager, OrderStatuses::Id))
                    .col(fk_id_col(manager, OrderStatuses::OrderId))
                    .col(ColumnDef::new(OrderStatuses::Status).integer().not_null())
                    .col(
                        ColumnDef::new(OrderStatuses::SequenceNum)
                            .integer()
                            .not_null(),
                    )
                    .col(user_ref_col(manager, OrderStatuses::RepairerId))
                    .col(
                        ColumnDef::new(OrderStatuses::IsCurrent)
                            .boolean()
                            .not_null()
                            .default(Expr::val(false)),
                    )
                    .col(user_ref_col(manager, OrderStatuses::CreatedBy))
                    .col(user_ref_col(manager, OrderStatuses::UpdatedBy))
                    .col(timestamp_col(OrderStatuses::CreatedAt))
                    .col(timestamp_col(OrderStatuses::UpdatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_order_statuses_order_id")
                            .from(OrderStatuses::Table, OrderStatuses::OrderId)
                            .to(Orders::Table, Orders::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_order_statuses_order_sequence")
                    .table(OrderStatuses::Table)
                    .col(OrderStatuses::OrderId)
                    .col(OrderStatuses::SequenceNum)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_order_statuses_order_current")
                    .table(OrderStatuses::Table)
                    .col(OrderStatuses::OrderId)
                    .col(OrderStatuses::IsCurrent)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_order_statuses_repairer_current")
                    .table(OrderStatuses::Table)
                    .col(OrderStatuses::RepairerId)
                    .col(OrderStatuses::IsCurrent)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create().if_not_exists()
                    .table(Tags::Table)
                    .col(pk_id_col(manager, Tags::Id))
                    .col(ColumnDef::new(Tags::Sort).string_len(191).not_null())
                    .col(ColumnDef::new(Tags::Name).string_len(191).not_null())
                    .col(
                        ColumnDef::new(Tags::Level)
                            .integer()
                            .not_null()
                            .default(Expr::val(0)),
                    )
                    .col(user_ref_col(manager, Tags::CreatedBy))
                    .col(timestamp_col(Tags::CreatedAt))
                    .col(timestamp_col(Tags::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_tags_sort_name")
                    .table(Tags::Table)
                    .col(Tags::Sort)
                    .col(Tags::Name)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_tags_sort_level")
                    .table(Tags::Table)
                    .col(Tags::Sort)
                    .col(Tags::Level)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create().if_not_exists()
                    .table(OrderTags::Table)
                    .col(fk_id_col(manager, OrderTags::OrderId))
                    .col(fk_id_col(manager, OrderTags::TagId))
                    .col(timestamp_col(OrderTags::CreatedAt))
                    .primary_key(
                        Index::create()
                            .col(OrderTags::OrderId)
                            .col(OrderTags::TagId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_order_tags_order_id")
                            .from(OrderTags::Table, OrderTags::OrderId)
                            .to(Orders::Table, Orders::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_order_tags_tag_id")
                            .from(OrderTags::Table, OrderTags::TagId)
                            .to(Tags::Table, Tags::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_order_tags_tag_id")
                    .table(OrderTags::Table)
                    .col(OrderTags::TagId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create().if_not_exists()
                    .table(Comments::Table)
                    .col(pk_id_col(manager, Comments::Id))
                    .col(fk_id_col(manager, Comments::OrderId))
                    .col(fk_id_col(manager, Comments::UserId))
                    .col(ColumnDef::new(Comments::Content).text().not_null())
                    .col(timestamp_col(Comments::CreatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_comments_order_id")
                            .from(Comments::Table, Comments::OrderId)
                            .to(Orders::Table, Orders::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_comments_order_id")
                    .table(Comments::Table)
                    .col(Comments::OrderId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create().if_not_exists()
                    .table(Items::Table)
                    .col(pk_id_col(manager, Items::Id))
                    .col(ColumnDef::new(Items::Name).string_len(191).not_null())
                    .col(
                        ColumnDef::new(Items::Description)
                            .text()
                            .not_null()
                            .default(Expr::val("")),
                    )
                    .col(
                        ColumnDef::new(Items::PriceCents)
                            .big_integer()
                            .not_null()
                            .default(Expr::val(0)),
                    )
                    .col(
                        ColumnDef::new(Items::Count)
                            .integer()
                            .not_null()
                            .default(Expr::val(0)),
                    )
                    .col(timestamp_col(Items::CreatedAt))
                    .col(timestamp_col(Items::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_items_name")
                    .table(Items::Table)
                    .col(Items::Name)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create().if_not_exists()
                    .table(ItemLogs::Table)
                    .col(pk_id_col(manager, ItemLogs::Id))
                    .col(fk_id_col(manager, ItemLogs::ItemId))
                    .col(fk_id_nullable_col(manager, ItemLogs::OrderId))
                    .col(ColumnDef::new(ItemLogs::Change).integer().not_null())
                    .col(
                        ColumnDef::new(ItemLogs::PriceCents)
                            .big_integer()
                            .not_null()
                            .default(Expr::val(0)),
                    )
                    .col(user_ref_col(manager, ItemLogs::CreatedBy))
                    .col(timestamp_col(ItemLogs::CreatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_item_logs_item_id")
                            .from(ItemLogs::Table, ItemLogs::ItemId)
                            .to(Items::Table, Items::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_item_logs_order_id")
                            .from(ItemLogs::Table, ItemLogs::OrderId)
                            .to(Orders::Table, Orders::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create().if_not_exists()
                    .name("idx_item_logs_order_id")
                    .table(ItemLogs::Table)
                    .col(ItemLogs::OrderId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ItemLogs::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Items::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Comments::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(OrderTags::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Tags::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(OrderStatuses::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Orders::Table).to_owned())
            .await?;
        Ok(())
    }
}

fn pk_id_col<T: Iden>(manager: &SchemaManager, col: T) -> ColumnDef {
    let mut col = ColumnDef::new(col);
    match manager.get_database_backend() {
        DatabaseBackend::Sqlite => {
            col.integer();
        }
        _ => {
            col.big_integer();
        }
    }
    col.not_null().auto_increment().primary_key().to_owned()
}

fn fk_id_col<T: Iden>(manager: &SchemaManager, col: T) -> ColumnDef {
    let mut col = ColumnDef::new(col);
    match manager.get_database_backend() {
        DatabaseBackend::Sqlite => {
            col.integer();
        }
        _ => {
            col.big_integer();
        }
    }
    col.not_null().to_owned()
}

fn fk_id_nullable_col<T: Iden>(manager: &SchemaManager, col: T) -> ColumnDef {
    let mut col = ColumnDef::new(col);
    match manager.get_database_backend() {
        DatabaseBackend::Sqlite => {
            col.integer();
        }
        _ => {
            col.big_integer();
        }
    }
    col.to_owned()
}

/// User ids live outside this schema; 0 means "nobody".
fn user_ref_col<T: Iden>(manager: &SchemaManager, col: T) -> ColumnDef {
    let mut col = fk_id_col(manager, col);
    col.default(Expr::val(0)).to_owned()
}

fn timestamp_col<T: Iden>(col: T) -> ColumnDef {
    ColumnDef::new(col)
        .timestamp()
        .not_null()
        .default(Expr::current_timestamp())
        .to_owned()
}

#[derive(Iden)]
enum Orders {
    Table,
    Id,
    Title,
    Description,
    UserId,
    Status,
    RepairerId,
    Appraisal,
    AllowComment,
    CreatedBy,
    UpdatedBy,
    CreatedAt,
    UpdatedAt,
    DeletedAt,
}

#[derive(Iden)]
enum OrderStatuses {
    Table,
    Id,
    OrderId,
    Status,
    SequenceNum,
    RepairerId,
    IsCurrent,
    CreatedBy,
    UpdatedBy,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum Tags {
    Table,
    Id,
    Sort,
    Name,
    Level,
    CreatedBy,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum OrderTags {
    Table,
    OrderId,
    TagId,
    CreatedAt,
}

#[derive(Iden)]
enum Comments {
    Table,
    Id,
    OrderId,
    UserId,
    Content,
    CreatedAt,
}

#[derive(Iden)]
enum Items {
    Table,
    Id,
    Name,
    Description,
    PriceCents,
    Count,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum ItemLogs {
    Table,
    Id,
    ItemId,
    OrderId,
    Change,
    PriceCents,
    CreatedBy,
    CreatedAt,
}
