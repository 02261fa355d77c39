use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Tokens::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Tokens::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Tokens::UserId).integer().not_null())
                    .col(
                        ColumnDef::new(Tokens::Key)
                            .string_len(48)
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(Tokens::Status)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(ColumnDef::new(Tokens::Name).string_len(64).not_null())
                    .col(
                        ColumnDef::new(Tokens::CreatedTime)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Tokens::AccessedTime)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Tokens::ExpiredTime)
                            .big_integer()
                            .not_null()
                            .default(-1),
                    )
                    .col(
                        ColumnDef::new(Tokens::RemainQuota)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Tokens::UsedQuota)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Tokens::UnlimitedQuota)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Tokens::ModelLimitsEnabled)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Tokens::ModelLimits)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(ColumnDef::new(Tokens::AllowIps).text())
                    .col(
                        ColumnDef::new(Tokens::Group)
                            .string_len(64)
                            .not_null()
                            .default(""),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_tokens_user_id")
                            .from(Tokens::Table, Tokens::UserId)
                            .to(Users::Table, Users::Id)
                            .on_update(ForeignKeyAction::Cascade)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // 创建索引
        manager
            .create_index(
                Index::create()
                    .name("idx_tokens_user_id")
                    .table(Tokens::Table)
                    .col(Tokens::UserId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_tokens_name")
                    .table(Tokens::Table)
                    .col(Tokens::Name)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Tokens::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Tokens {
    Table,
    Id,
    UserId,
    Key,
    Status,
    Name,
    CreatedTime,
    AccessedTime,
    ExpiredTime,
    RemainQuota,
    UsedQuota,
    UnlimitedQuota,
    ModelLimitsEnabled,
    ModelLimits,
    AllowIps,
    Group,
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
}
