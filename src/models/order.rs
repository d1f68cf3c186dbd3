use crate::entities::{OrderStatus, order_entity};
use crate::error::{AppError, AppResult};
use crate::utils::{ReservationCountdown, TicketRange};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::OnceLock;
use utoipa::ToSchema;

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex")
    })
}

pub fn is_valid_email(email: &str) -> bool {
    email.len() <= 255 && email_regex().is_match(email)
}

/// 预留票号请求
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ReserveTicketsRequest {
    /// 票号索引（从 0 开始）
    #[schema(example = json!([5, 6, 7]))]
    pub ticket_indices: Vec<i64>,
    #[schema(example = "Ana López")]
    pub buyer_name: String,
    #[schema(example = "ana@example.com")]
    pub buyer_email: String,
    pub buyer_phone: Option<String>,
    pub buyer_city: Option<String>,
    /// 预留分钟数，不传使用活动配置
    pub reservation_minutes: Option<i64>,
    /// 客户端计算的总价（分），与服务端不一致时拒绝
    pub order_total_cents: Option<i64>,
    /// 幸运号模式：逐个保存，不做区间压缩
    #[serde(default)]
    pub is_lucky_numbers: bool,
    pub coupon_code: Option<String>,
}

impl ReserveTicketsRequest {
    /// 不访问数据库的校验
    pub fn validate(&self, max_tickets: i64) -> AppResult<()> {
        if self.ticket_indices.is_empty() {
            return Err(AppError::ValidationError(
                "At least one ticket must be selected".into(),
            ));
        }
        if self.ticket_indices.len() as i64 > max_tickets {
            return Err(AppError::ValidationError(format!(
                "At most {max_tickets} tickets can be reserved per order"
            )));
        }
        if self.ticket_indices.iter().any(|i| *i < 0) {
            return Err(AppError::ValidationError(
                "Ticket indices must be non-negative".into(),
            ));
        }
        let mut seen = HashSet::with_capacity(self.ticket_indices.len());
        if !self.ticket_indices.iter().all(|i| seen.insert(*i)) {
            return Err(AppError::ValidationError(
                "Duplicate ticket indices in request".into(),
            ));
        }
        let name = self.buyer_name.trim();
        if name.is_empty() || name.chars().count() > 255 {
            return Err(AppError::ValidationError("Buyer name is required".into()));
        }
        if !is_valid_email(self.buyer_email.trim()) {
            return Err(AppError::ValidationError("Invalid buyer email".into()));
        }
        if let Some(minutes) = self.reservation_minutes
            && minutes < 1
        {
            return Err(AppError::ValidationError(
                "Reservation minutes must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// 预留结果：成功或整单拒绝（不存在部分预留）
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReservationResult {
    Reserved {
        order_id: i64,
        reference_code: String,
        reserved_until: DateTime<Utc>,
        ticket_count: i64,
        ticket_ranges: Vec<TicketRange>,
        lucky_indices: Vec<i64>,
        order_total_cents: i64,
        discount_cents: i64,
    },
    Rejected {
        error_message: String,
        /// 已被占用或越界的索引
        unavailable_indices: Vec<i64>,
    },
}

impl ReservationResult {
    pub fn rejected(error_message: impl Into<String>, unavailable_indices: Vec<i64>) -> Self {
        ReservationResult::Rejected {
            error_message: error_message.into(),
            unavailable_indices,
        }
    }
}

/// 审批 / 驳回结果
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ApprovalResult {
    Applied {
        order_id: i64,
        status: OrderStatus,
        ticket_count: i64,
        /// 订单此前已处于目标状态
        already_applied: bool,
    },
    Refused {
        error_message: String,
    },
}

impl ApprovalResult {
    pub fn refused(error_message: impl Into<String>) -> Self {
        ApprovalResult::Refused {
            error_message: error_message.into(),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RejectOrderRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PaymentProofRequest {
    #[schema(example = "https://storage.example.com/proofs/abc.jpg")]
    pub payment_proof_url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct OrderQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub status: Option<OrderStatus>,
}

/// 后台订单视图
#[derive(Debug, Serialize, ToSchema)]
pub struct OrderResponse {
    pub id: i64,
    pub raffle_id: i64,
    pub buyer_name: String,
    pub buyer_email: String,
    pub buyer_phone: Option<String>,
    pub buyer_city: Option<String>,
    pub ticket_ranges: Vec<TicketRange>,
    pub lucky_indices: Vec<i64>,
    pub ticket_count: i64,
    pub reference_code: String,
    pub status: OrderStatus,
    pub reserved_until: Option<DateTime<Utc>>,
    pub order_total_cents: i64,
    pub discount_cents: i64,
    pub payment_proof_url: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<order_entity::Model> for OrderResponse {
    fn from(m: order_entity::Model) -> Self {
        Self {
            id: m.id,
            raffle_id: m.raffle_id,
            buyer_name: m.buyer_name,
            buyer_email: m.buyer_email,
            buyer_phone: m.buyer_phone,
            buyer_city: m.buyer_city,
            ticket_ranges: m.ticket_ranges.0,
            lucky_indices: m.lucky_indices.0,
            ticket_count: m.ticket_count,
            reference_code: m.reference_code,
            status: m.status,
            reserved_until: m.reserved_until,
            order_total_cents: m.order_total_cents,
            discount_cents: m.discount_cents,
            payment_proof_url: m.payment_proof_url,
            approved_at: m.approved_at,
            canceled_at: m.canceled_at,
            cancel_reason: m.cancel_reason,
            created_at: m.created_at,
        }
    }
}

/// 预留倒计时信息
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HoldInfo {
    pub reserved_until: DateTime<Utc>,
    pub seconds_remaining: i64,
    pub expired: bool,
}

impl HoldInfo {
    pub fn for_order(order: &order_entity::Model, now: DateTime<Utc>) -> Option<Self> {
        if order.status != OrderStatus::Reserved {
            return None;
        }
        let countdown = ReservationCountdown::new(order.reserved_until?);
        Some(Self {
            reserved_until: countdown.reserved_until(),
            seconds_remaining: countdown.remaining(now).num_seconds(),
            expired: countdown.is_expired(now),
        })
    }
}

/// 买家通过参考码查看的订单
#[derive(Debug, Serialize, ToSchema)]
pub struct PublicOrderResponse {
    pub reference_code: String,
    pub raffle_id: i64,
    pub raffle_title: String,
    pub status: OrderStatus,
    pub buyer_name: String,
    pub ticket_count: i64,
    /// 格式化票号（超过上限时截断）
    pub ticket_numbers: Vec<String>,
    pub ticket_numbers_truncated: bool,
    pub order_total_cents: i64,
    pub discount_cents: i64,
    pub currency: String,
    pub hold: Option<HoldInfo>,
    pub payment_proof_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(indices: Vec<i64>) -> ReserveTicketsRequest {
        ReserveTicketsRequest {
            ticket_indices: indices,
            buyer_name: "Ana".into(),
            buyer_email: "ana@example.com".into(),
            buyer_phone: None,
            buyer_city: None,
            reservation_minutes: None,
            order_total_cents: None,
            is_lucky_numbers: false,
            coupon_code: None,
        }
    }

    #[test]
    fn test_validate_accepts_well_formed_request() {
        assert!(request(vec![5, 6, 7]).validate(100).is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_requests() {
        assert!(request(vec![]).validate(100).is_err());
        assert!(request(vec![1, 2, 2]).validate(100).is_err());
        assert!(request(vec![-1]).validate(100).is_err());
        assert!(request(vec![1, 2, 3]).validate(2).is_err());

        let mut r = request(vec![1]);
        r.buyer_email = "not-an-email".into();
        assert!(r.validate(100).is_err());

        let mut r = request(vec![1]);
        r.buyer_name = "   ".into();
        assert!(r.validate(100).is_err());

        let mut r = request(vec![1]);
        r.reservation_minutes = Some(0);
        assert!(r.validate(100).is_err());
    }

    #[test]
    fn test_reservation_result_is_tagged() {
        let v = serde_json::to_value(ReservationResult::rejected("Tickets no longer available", vec![7]))
            .unwrap();
        assert_eq!(v["outcome"], "rejected");
        assert_eq!(v["unavailable_indices"], serde_json::json!([7]));
    }
}
