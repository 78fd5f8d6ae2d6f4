use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(GenerationHistory::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(GenerationHistory::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(GenerationHistory::VideoId).string().not_null())
                    .col(
                        ColumnDef::new(GenerationHistory::AppBundleId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(GenerationHistory::ApphudUserId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(GenerationHistory::Description)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(GenerationHistory::CreatedAt)
                            .date_time()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_generation_history_video_id")
                    .table(GenerationHistory::Table)
                    .col(GenerationHistory::VideoId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(GenerationHistory::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum GenerationHistory {
    Table,
    Id,
    VideoId,
    AppBundleId,
    ApphudUserId,
    Description,
    CreatedAt,
}
