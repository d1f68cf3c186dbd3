use sea_orm_migration::prelude::*;

use crate::m20260105_000001_create_organizations::Organizations;
use crate::m20260105_000002_create_raffles::Raffles;

/// 优惠券
#[derive(DeriveIden)]
enum Coupons {
    Table,
    Id,
    OrganizationId,
    RaffleId,
    Code,
    DiscountType,
    DiscountValue,
    MaxUses,
    CurrentUses,
    MinPurchaseCents,
    ValidFrom,
    ValidUntil,
    IsActive,
    CreatedAt,
    UpdatedAt,
}

/// 订单：ticket_ranges 以 [{s,e}] 区间压缩存储，lucky_indices 存单独挑选的号码
#[derive(DeriveIden)]
enum Orders {
    Table,
    Id,
    RaffleId,
    OrganizationId,
    BuyerName,
    BuyerEmail,
    BuyerPhone,
    BuyerCity,
    TicketRanges,
    LuckyIndices,
    TicketCount,
    ReferenceCode,
    Status,
    ReservedUntil,
    OrderTotalCents,
    DiscountCents,
    CouponId,
    PaymentProofUrl,
    ApprovedAt,
    CanceledAt,
    CancelReason,
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
                    .table(Coupons::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Coupons::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Coupons::OrganizationId).big_integer().not_null())
                    .col(ColumnDef::new(Coupons::RaffleId).big_integer().null())
                    .col(ColumnDef::new(Coupons::Code).string_len(32).not_null())
                    .col(ColumnDef::new(Coupons::DiscountType).string_len(32).not_null())
                    .col(ColumnDef::new(Coupons::DiscountValue).big_integer().not_null())
                    .col(ColumnDef::new(Coupons::MaxUses).integer().null())
                    .col(
                        ColumnDef::new(Coupons::CurrentUses)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Coupons::MinPurchaseCents).big_integer().null())
                    .col(ColumnDef::new(Coupons::ValidFrom).timestamp_with_time_zone().null())
                    .col(ColumnDef::new(Coupons::ValidUntil).timestamp_with_time_zone().null())
                    .col(
                        ColumnDef::new(Coupons::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Coupons::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("NOW()")),
                    )
                    .col(
                        ColumnDef::new(Coupons::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("NOW()")),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_coupons_organization")
                            .from(Coupons::Table, Coupons::OrganizationId)
                            .to(Organizations::Table, Organizations::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_coupons_raffle")
                            .from(Coupons::Table, Coupons::RaffleId)
                            .to(Raffles::Table, Raffles::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // 同一组织内优惠码唯一
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_coupons_org_code_unique")
                    .table(Coupons::Table)
                    .col(Coupons::OrganizationId)
                    .col(Coupons::Code)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Orders::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Orders::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Orders::RaffleId).big_integer().not_null())
                    .col(ColumnDef::new(Orders::OrganizationId).big_integer().not_null())
                    .col(ColumnDef::new(Orders::BuyerName).string_len(255).not_null())
                    .col(ColumnDef::new(Orders::BuyerEmail).string_len(255).not_null())
                    .col(ColumnDef::new(Orders::BuyerPhone).string_len(64).null())
                    .col(ColumnDef::new(Orders::BuyerCity).string_len(128).null())
                    .col(ColumnDef::new(Orders::TicketRanges).json_binary().not_null())
                    .col(ColumnDef::new(Orders::LuckyIndices).json_binary().not_null())
                    .col(ColumnDef::new(Orders::TicketCount).big_integer().not_null())
                    .col(
                        ColumnDef::new(Orders::ReferenceCode)
                            .string_len(16)
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(Orders::Status)
                            .string_len(32)
                            .not_null()
                            .default("reserved"),
                    )
                    .col(ColumnDef::new(Orders::ReservedUntil).timestamp_with_time_zone().null())
                    .col(ColumnDef::new(Orders::OrderTotalCents).big_integer().not_null())
                    .col(
                        ColumnDef::new(Orders::DiscountCents)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Orders::CouponId).big_integer().null())
                    .col(ColumnDef::new(Orders::PaymentProofUrl).text().null())
                    .col(ColumnDef::new(Orders::ApprovedAt).timestamp_with_time_zone().null())
                    .col(ColumnDef::new(Orders::CanceledAt).timestamp_with_time_zone().null())
                    .col(ColumnDef::new(Orders::CancelReason).text().null())
                    .col(
                        ColumnDef::new(Orders::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("NOW()")),
                    )
                    .col(
                        ColumnDef::new(Orders::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("NOW()")),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_orders_raffle")
                            .from(Orders::Table, Orders::RaffleId)
                            .to(Raffles::Table, Raffles::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_orders_coupon")
                            .from(Orders::Table, Orders::CouponId)
                            .to(Coupons::Table, Coupons::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        // 可用性检查按 raffle_id + status 读取
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_orders_raffle_status")
                    .table(Orders::Table)
                    .col(Orders::RaffleId)
                    .col(Orders::Status)
                    .to_owned(),
            )
            .await?;

        // 过期扫描
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_orders_status_reserved_until")
                    .table(Orders::Table)
                    .col(Orders::Status)
                    .col(Orders::ReservedUntil)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().if_exists().table(Orders::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().if_exists().table(Coupons::Table).to_owned())
            .await?;
        Ok(())
    }
}
