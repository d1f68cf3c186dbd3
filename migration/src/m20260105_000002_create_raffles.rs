use sea_orm_migration::prelude::*;

use crate::m20260105_000001_create_organizations::Organizations;

/// 抽奖活动
#[derive(DeriveIden)]
pub(crate) enum Raffles {
    Table,
    Id,
    OrganizationId,
    Title,
    Slug,
    Description,
    Status,
    TicketPriceCents,
    TotalTickets,
    Currency,
    DrawDate,
    PrizeName,
    PrizeValueCents,
    PrizeMetadata,
    Numbering,
    ReservationMinutes,
    MaxTicketsPerOrder,
    PublishedAt,
    WinnerTicketIndex,
    WinnerTicketNumber,
    WinnerOrderId,
    WinnerData,
    DrawnAt,
    CreatedAt,
    UpdatedAt,
}

/// 物化票号（大额活动由后台任务分批生成）
#[derive(DeriveIden)]
enum Tickets {
    Table,
    Id,
    RaffleId,
    TicketIndex,
    TicketNumber,
    CreatedAt,
}

/// 票号批量生成任务
#[derive(DeriveIden)]
enum TicketGenerationJobs {
    Table,
    Id,
    RaffleId,
    TotalTickets,
    GeneratedCount,
    BatchSize,
    TotalBatches,
    CurrentBatch,
    Status,
    ErrorMessage,
    StartedAt,
    CompletedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Raffles::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Raffles::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Raffles::OrganizationId).big_integer().not_null())
                    .col(ColumnDef::new(Raffles::Title).string_len(255).not_null())
                    .col(
                        ColumnDef::new(Raffles::Slug)
                            .string_len(160)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Raffles::Description).text().null())
                    .col(
                        ColumnDef::new(Raffles::Status)
                            .string_len(32)
                            .not_null()
                            .default("draft"),
                    )
                    .col(ColumnDef::new(Raffles::TicketPriceCents).big_integer().not_null())
                    .col(ColumnDef::new(Raffles::TotalTickets).big_integer().not_null())
                    .col(
                        ColumnDef::new(Raffles::Currency)
                            .string_len(8)
                            .not_null()
                            .default("MXN"),
                    )
                    .col(ColumnDef::new(Raffles::DrawDate).timestamp_with_time_zone().null())
                    .col(ColumnDef::new(Raffles::PrizeName).string_len(255).not_null())
                    .col(ColumnDef::new(Raffles::PrizeValueCents).big_integer().null())
                    .col(ColumnDef::new(Raffles::PrizeMetadata).json_binary().null())
                    .col(ColumnDef::new(Raffles::Numbering).json_binary().not_null())
                    .col(
                        ColumnDef::new(Raffles::ReservationMinutes)
                            .integer()
                            .not_null()
                            .default(15),
                    )
                    .col(
                        ColumnDef::new(Raffles::MaxTicketsPerOrder)
                            .integer()
                            .not_null()
                            .default(100),
                    )
                    .col(ColumnDef::new(Raffles::PublishedAt).timestamp_with_time_zone().null())
                    .col(ColumnDef::new(Raffles::WinnerTicketIndex).big_integer().null())
                    .col(ColumnDef::new(Raffles::WinnerTicketNumber).string_len(128).null())
                    .col(ColumnDef::new(Raffles::WinnerOrderId).big_integer().null())
                    .col(ColumnDef::new(Raffles::WinnerData).json_binary().null())
                    .col(ColumnDef::new(Raffles::DrawnAt).timestamp_with_time_zone().null())
                    .col(
                        ColumnDef::new(Raffles::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("NOW()")),
                    )
                    .col(
                        ColumnDef::new(Raffles::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("NOW()")),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_raffles_organization")
                            .from(Raffles::Table, Raffles::OrganizationId)
                            .to(Organizations::Table, Organizations::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // auto-draw 扫描: status + draw_date
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_raffles_status_draw_date")
                    .table(Raffles::Table)
                    .col(Raffles::Status)
                    .col(Raffles::DrawDate)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_raffles_organization")
                    .table(Raffles::Table)
                    .col(Raffles::OrganizationId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Tickets::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Tickets::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Tickets::RaffleId).big_integer().not_null())
                    .col(ColumnDef::new(Tickets::TicketIndex).big_integer().not_null())
                    .col(ColumnDef::new(Tickets::TicketNumber).string_len(128).not_null())
                    .col(
                        ColumnDef::new(Tickets::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("NOW()")),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_tickets_raffle")
                            .from(Tickets::Table, Tickets::RaffleId)
                            .to(Raffles::Table, Raffles::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // 批量插入依赖此唯一索引做 ON CONFLICT DO NOTHING
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_tickets_raffle_index_unique")
                    .table(Tickets::Table)
                    .col(Tickets::RaffleId)
                    .col(Tickets::TicketIndex)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_tickets_raffle_number")
                    .table(Tickets::Table)
                    .col(Tickets::RaffleId)
                    .col(Tickets::TicketNumber)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(TicketGenerationJobs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TicketGenerationJobs::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(TicketGenerationJobs::RaffleId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TicketGenerationJobs::TotalTickets)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TicketGenerationJobs::GeneratedCount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(TicketGenerationJobs::BatchSize)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TicketGenerationJobs::TotalBatches)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TicketGenerationJobs::CurrentBatch)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(TicketGenerationJobs::Status)
                            .string_len(32)
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(TicketGenerationJobs::ErrorMessage).text().null())
                    .col(
                        ColumnDef::new(TicketGenerationJobs::StartedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TicketGenerationJobs::CompletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TicketGenerationJobs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("NOW()")),
                    )
                    .col(
                        ColumnDef::new(TicketGenerationJobs::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("NOW()")),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ticket_jobs_raffle")
                            .from(TicketGenerationJobs::Table, TicketGenerationJobs::RaffleId)
                            .to(Raffles::Table, Raffles::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_ticket_jobs_raffle")
                    .table(TicketGenerationJobs::Table)
                    .col(TicketGenerationJobs::RaffleId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .if_exists()
                    .table(TicketGenerationJobs::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().if_exists().table(Tickets::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().if_exists().table(Raffles::Table).to_owned())
            .await?;
        Ok(())
    }
}
