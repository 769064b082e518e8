use sea_orm_migration::prelude::*;

use super::m20250301_000001_create_access_tokens::AccessTokens;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(AccessTokenUses::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AccessTokenUses::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(AccessTokenUses::TokenId).integer().not_null())
                    .col(ColumnDef::new(AccessTokenUses::UserEmail).string().not_null())
                    .col(ColumnDef::new(AccessTokenUses::UserName).string().not_null())
                    .col(ColumnDef::new(AccessTokenUses::ClientIp).string().not_null())
                    .col(
                        ColumnDef::new(AccessTokenUses::ClientUserAgent)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AccessTokenUses::Timestamp)
                            .timestamp()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_access_token_uses_token_id")
                            .from(AccessTokenUses::Table, AccessTokenUses::TokenId)
                            .to(AccessTokens::Table, AccessTokens::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_access_token_uses_token_id")
                    .table(AccessTokenUses::Table)
                    .col(AccessTokenUses::TokenId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AccessTokenUses::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum AccessTokenUses {
    Table,
    Id,
    TokenId,
    UserEmail,
    UserName,
    ClientIp,
    ClientUserAgent,
    Timestamp,
}
