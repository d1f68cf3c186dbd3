use crate::entities::notification_entity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct NotificationResponse {
    pub id: i64,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub link: Option<String>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl From<notification_entity::Model> for NotificationResponse {
    fn from(m: notification_entity::Model) -> Self {
        Self {
            id: m.id,
            kind: m.kind,
            title: m.title,
            message: m.message,
            link: m.link,
            read: m.read,
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct NotificationQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// 批处理中单项失败
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ItemError {
    pub id: i64,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DrawOutcome {
    pub raffle_id: i64,
    /// 无已售票时为空
    pub winner_ticket_number: Option<String>,
    pub winner_order_id: Option<i64>,
    pub sold_tickets: i64,
}

/// 自动开奖汇总：部分失败不影响其余活动
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct AutoDrawSummary {
    pub processed: usize,
    pub drawn: Vec<DrawOutcome>,
    pub errors: Vec<ItemError>,
}

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct DigestSummary {
    pub organizations_notified: usize,
    pub pending_orders: usize,
    pub emails_sent: usize,
    pub telegram_sent: usize,
    pub errors: Vec<ItemError>,
}

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct ExpirySummary {
    pub expired_orders: usize,
    pub released_tickets: i64,
}
