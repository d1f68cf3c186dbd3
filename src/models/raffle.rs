use crate::entities::{RaffleStatus, raffle_entity};
use crate::utils::NumberingConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::GenerationStart;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateRaffleRequest {
    #[schema(example = "Gran Sorteo Navideño")]
    pub title: String,
    pub description: Option<String>,
    /// 单张票价（分）
    #[schema(example = 5000)]
    pub ticket_price_cents: i64,
    #[schema(example = 1000)]
    pub total_tickets: i64,
    #[schema(example = "MXN")]
    pub currency: Option<String>,
    pub draw_date: Option<DateTime<Utc>>,
    #[schema(example = "Camioneta 2026")]
    pub prize_name: String,
    pub prize_value_cents: Option<i64>,
    #[schema(value_type = Option<Object>)]
    pub prize_metadata: Option<serde_json::Value>,
    /// 不传则按总票数补零
    pub numbering: Option<NumberingConfig>,
    pub reservation_minutes: Option<i32>,
    pub max_tickets_per_order: Option<i32>,
}

/// 仅 draft / paused 可修改；total_tickets 与 numbering 仅 draft 可改
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateRaffleRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub ticket_price_cents: Option<i64>,
    pub total_tickets: Option<i64>,
    pub currency: Option<String>,
    pub draw_date: Option<DateTime<Utc>>,
    pub prize_name: Option<String>,
    pub prize_value_cents: Option<i64>,
    #[schema(value_type = Option<Object>)]
    pub prize_metadata: Option<serde_json::Value>,
    pub numbering: Option<NumberingConfig>,
    pub reservation_minutes: Option<i32>,
    pub max_tickets_per_order: Option<i32>,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct RaffleQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub status: Option<RaffleStatus>,
}

/// 中奖快照
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WinnerSnapshot {
    pub ticket_index: i64,
    pub ticket_number: String,
    pub order_id: i64,
    pub buyer_name: String,
    pub buyer_email: String,
    pub buyer_city: Option<String>,
    pub reference_code: String,
    pub sold_tickets: i64,
    pub drawn_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RaffleResponse {
    pub id: i64,
    pub organization_id: i64,
    pub title: String,
    pub slug: String,
    pub description: Option<String>,
    pub status: RaffleStatus,
    pub ticket_price_cents: i64,
    pub total_tickets: i64,
    pub currency: String,
    pub draw_date: Option<DateTime<Utc>>,
    pub prize_name: String,
    pub prize_value_cents: Option<i64>,
    #[schema(value_type = Option<Object>)]
    pub prize_metadata: Option<serde_json::Value>,
    pub numbering: NumberingConfig,
    pub reservation_minutes: i32,
    pub max_tickets_per_order: i32,
    pub published_at: Option<DateTime<Utc>>,
    pub winner_ticket_number: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub winner: Option<serde_json::Value>,
    pub drawn_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<raffle_entity::Model> for RaffleResponse {
    fn from(m: raffle_entity::Model) -> Self {
        Self {
            id: m.id,
            organization_id: m.organization_id,
            title: m.title,
            slug: m.slug,
            description: m.description,
            status: m.status,
            ticket_price_cents: m.ticket_price_cents,
            total_tickets: m.total_tickets,
            currency: m.currency,
            draw_date: m.draw_date,
            prize_name: m.prize_name,
            prize_value_cents: m.prize_value_cents,
            prize_metadata: m.prize_metadata,
            numbering: m.numbering,
            reservation_minutes: m.reservation_minutes,
            max_tickets_per_order: m.max_tickets_per_order,
            published_at: m.published_at,
            winner_ticket_number: m.winner_ticket_number,
            winner: m.winner_data,
            drawn_at: m.drawn_at,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

/// 公开页面视图，不含买家信息
#[derive(Debug, Serialize, ToSchema)]
pub struct PublicRaffleResponse {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub description: Option<String>,
    pub status: RaffleStatus,
    pub ticket_price_cents: i64,
    pub total_tickets: i64,
    pub currency: String,
    pub draw_date: Option<DateTime<Utc>>,
    pub prize_name: String,
    pub prize_value_cents: Option<i64>,
    #[schema(value_type = Option<Object>)]
    pub prize_metadata: Option<serde_json::Value>,
    pub numbering: NumberingConfig,
    pub reservation_minutes: i32,
    pub max_tickets_per_order: i32,
    pub winner_ticket_number: Option<String>,
    pub drawn_at: Option<DateTime<Utc>>,
}

impl From<raffle_entity::Model> for PublicRaffleResponse {
    fn from(m: raffle_entity::Model) -> Self {
        Self {
            id: m.id,
            title: m.title,
            slug: m.slug,
            description: m.description,
            status: m.status,
            ticket_price_cents: m.ticket_price_cents,
            total_tickets: m.total_tickets,
            currency: m.currency,
            draw_date: m.draw_date,
            prize_name: m.prize_name,
            prize_value_cents: m.prize_value_cents,
            prize_metadata: m.prize_metadata,
            numbering: m.numbering,
            reservation_minutes: m.reservation_minutes,
            max_tickets_per_order: m.max_tickets_per_order,
            winner_ticket_number: m.winner_ticket_number,
            drawn_at: m.drawn_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PublishRaffleResponse {
    pub raffle: RaffleResponse,
    /// 启动失败时为空，可通过 generate-tickets 重试
    pub generation: Option<GenerationStart>,
}
