use crate::utils::NumberingConfig;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema, DeriveActiveEnum, EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "String(Some(32))")]
#[serde(rename_all = "snake_case")]
pub enum RaffleStatus {
    #[sea_orm(string_value = "draft")]
    Draft,
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "paused")]
    Paused,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "canceled")]
    Canceled,
}

impl RaffleStatus {
    /// 状态流转:
    /// draft -> active (发布) / canceled
    /// active <-> paused
    /// active -> completed (开奖)
    /// active / paused -> canceled
    pub fn can_transition_to(&self, next: RaffleStatus) -> bool {
        use RaffleStatus::*;
        matches!(
            (self, next),
            (Draft, Active)
                | (Draft, Canceled)
                | (Active, Paused)
                | (Active, Completed)
                | (Active, Canceled)
                | (Paused, Active)
                | (Paused, Canceled)
        )
    }

    /// 公开页面可见
    pub fn is_public(&self) -> bool {
        matches!(
            self,
            RaffleStatus::Active | RaffleStatus::Paused | RaffleStatus::Completed
        )
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(RaffleStatus::Draft),
            "active" => Some(RaffleStatus::Active),
            "paused" => Some(RaffleStatus::Paused),
            "completed" => Some(RaffleStatus::Completed),
            "canceled" => Some(RaffleStatus::Canceled),
            _ => None,
        }
    }
}

/// 抽奖活动
/// - 金额字段均为分 (cents)
/// - numbering: 票号格式配置 (JSON)
/// - winner_*: 开奖后的中奖快照
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "raffles")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub organization_id: i64,
    pub title: String,
    #[sea_orm(unique)]
    pub slug: String,
    pub description: Option<String>,
    pub status: RaffleStatus,
    pub ticket_price_cents: i64,
    pub total_tickets: i64,
    pub currency: String,
    pub draw_date: Option<DateTime<Utc>>,
    pub prize_name: String,
    pub prize_value_cents: Option<i64>,
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub prize_metadata: Option<Json>,
    #[sea_orm(column_type = "JsonBinary")]
    pub numbering: NumberingConfig,
    pub reservation_minutes: i32,
    pub max_tickets_per_order: i32,
    pub published_at: Option<DateTime<Utc>>,
    pub winner_ticket_index: Option<i64>,
    pub winner_ticket_number: Option<String>,
    pub winner_order_id: Option<i64>,
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub winner_data: Option<Json>,
    pub drawn_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::RaffleStatus::*;

    #[test]
    fn test_status_transitions() {
        assert!(Draft.can_transition_to(Active));
        assert!(Active.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Active));
        assert!(Active.can_transition_to(Completed));
        assert!(Paused.can_transition_to(Canceled));

        assert!(!Draft.can_transition_to(Completed));
        assert!(!Paused.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Active));
        assert!(!Canceled.can_transition_to(Active));
        assert!(!Completed.can_transition_to(Canceled));
    }

    #[test]
    fn test_public_visibility() {
        assert!(!Draft.is_public());
        assert!(Active.is_public());
        assert!(Completed.is_public());
        assert!(!Canceled.is_public());
    }
}
