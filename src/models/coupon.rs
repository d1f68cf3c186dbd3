use crate::entities::{DiscountType, coupon_entity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateCouponRequest {
    #[schema(example = "NAVIDAD25")]
    pub code: String,
    /// 为空表示组织内所有活动可用
    pub raffle_id: Option<i64>,
    pub discount_type: DiscountType,
    /// 百分比 (1-100) 或固定金额（分）
    #[schema(example = 25)]
    pub discount_value: i64,
    pub max_uses: Option<i32>,
    pub min_purchase_cents: Option<i64>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CouponResponse {
    pub id: i64,
    pub code: String,
    pub raffle_id: Option<i64>,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    pub max_uses: Option<i32>,
    pub current_uses: i32,
    pub min_purchase_cents: Option<i64>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<coupon_entity::Model> for CouponResponse {
    fn from(m: coupon_entity::Model) -> Self {
        Self {
            id: m.id,
            code: m.code,
            raffle_id: m.raffle_id,
            discount_type: m.discount_type,
            discount_value: m.discount_value,
            max_uses: m.max_uses,
            current_uses: m.current_uses,
            min_purchase_cents: m.min_purchase_cents,
            valid_from: m.valid_from,
            valid_until: m.valid_until,
            is_active: m.is_active,
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ValidateCouponRequest {
    pub raffle_id: i64,
    #[schema(example = "NAVIDAD25")]
    pub code: String,
    pub ticket_count: i64,
}

/// 优惠报价
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct CouponQuote {
    pub coupon_id: i64,
    pub code: String,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub total_cents: i64,
}
