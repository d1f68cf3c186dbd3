use crate::utils::{TicketRange, TicketSet};
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{DeriveActiveEnum, EnumIter, FromJsonQueryResult};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema, DeriveActiveEnum, EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "String(Some(32))")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// 已预留，等待付款凭证
    #[sea_orm(string_value = "reserved")]
    Reserved,
    /// 已上传凭证，等待审批
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "sold")]
    Sold,
    #[sea_orm(string_value = "canceled")]
    Canceled,
}

impl OrderStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "reserved" => Some(OrderStatus::Reserved),
            "pending" => Some(OrderStatus::Pending),
            "sold" => Some(OrderStatus::Sold),
            "canceled" => Some(OrderStatus::Canceled),
            _ => None,
        }
    }
}

/// 压缩存储的票号区间
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize, FromJsonQueryResult)]
pub struct TicketRanges(pub Vec<TicketRange>);

/// 买家单独挑选的幸运号（不连续）
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize, FromJsonQueryResult)]
pub struct LuckyIndices(pub Vec<i64>);

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub raffle_id: i64,
    pub organization_id: i64,
    pub buyer_name: String,
    pub buyer_email: String,
    pub buyer_phone: Option<String>,
    pub buyer_city: Option<String>,
    #[sea_orm(column_type = "JsonBinary")]
    pub ticket_ranges: TicketRanges,
    #[sea_orm(column_type = "JsonBinary")]
    pub lucky_indices: LuckyIndices,
    pub ticket_count: i64,
    #[sea_orm(unique)]
    pub reference_code: String,
    pub status: OrderStatus,
    pub reserved_until: Option<DateTime<Utc>>,
    pub order_total_cents: i64,
    pub discount_cents: i64,
    pub coupon_id: Option<i64>,
    pub payment_proof_url: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    /// 订单当前是否占用票号：已售、待审批，或预留未过期
    pub fn holds_tickets(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            OrderStatus::Sold | OrderStatus::Pending => true,
            OrderStatus::Reserved => self.reserved_until.is_some_and(|t| t > now),
            OrderStatus::Canceled => false,
        }
    }

    /// 预留已过期（仍为 reserved 状态）
    pub fn reservation_elapsed(&self, now: DateTime<Utc>) -> bool {
        self.status == OrderStatus::Reserved && self.reserved_until.is_none_or(|t| t <= now)
    }

    /// 区间与幸运号（单点区间）
    pub fn all_ranges(&self) -> impl Iterator<Item = TicketRange> + '_ {
        self.ticket_ranges
            .0
            .iter()
            .copied()
            .chain(self.lucky_indices.0.iter().map(|&i| TicketRange::single(i)))
    }

    /// 订单的全部票号（区间 + 幸运号）
    pub fn ticket_set(&self) -> TicketSet {
        TicketSet::from_ranges(self.all_ranges())
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn order(status: OrderStatus, reserved_until: Option<DateTime<Utc>>) -> Model {
        let now = Utc::now();
        Model {
            id: 1,
            raffle_id: 1,
            organization_id: 1,
            buyer_name: "Ana".into(),
            buyer_email: "ana@example.com".into(),
            buyer_phone: None,
            buyer_city: None,
            ticket_ranges: TicketRanges(vec![TicketRange::new(5, 7)]),
            lucky_indices: LuckyIndices(vec![42]),
            ticket_count: 4,
            reference_code: "ABCD2345".into(),
            status,
            reserved_until,
            order_total_cents: 400,
            discount_cents: 0,
            coupon_id: None,
            payment_proof_url: None,
            approved_at: None,
            canceled_at: None,
            cancel_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_holds_tickets() {
        let now = Utc::now();
        assert!(order(OrderStatus::Sold, None).holds_tickets(now));
        assert!(order(OrderStatus::Pending, None).holds_tickets(now));
        assert!(order(OrderStatus::Reserved, Some(now + Duration::minutes(5))).holds_tickets(now));
        assert!(!order(OrderStatus::Reserved, Some(now - Duration::seconds(1))).holds_tickets(now));
        assert!(!order(OrderStatus::Canceled, None).holds_tickets(now));
    }

    #[test]
    fn test_status_column_is_short_string() {
        assert!(matches!(
            OrderStatus::db_type().get_column_type(),
            ColumnType::String(Some(32))
        ));
        assert_eq!(OrderStatus::Pending.to_value(), "pending");
        assert_eq!(
            OrderStatus::try_from_value(&"canceled".to_string()).unwrap(),
            OrderStatus::Canceled
        );
        assert!(OrderStatus::try_from_value(&"expired".to_string()).is_err());
    }

    #[test]
    fn test_ticket_set_merges_ranges_and_lucky() {
        let set = order(OrderStatus::Sold, None).ticket_set();
        assert_eq!(set.len(), 4);
        assert!(set.contains(6));
        assert!(set.contains(42));
        assert!(!set.contains(8));
    }
}
