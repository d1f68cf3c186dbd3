use crate::entities::{DiscountType, coupon_entity as coupons, raffle_entity as raffles};
use crate::error::{AppError, AppResult};
use crate::models::{
    AuthContext, CouponQuote, CouponResponse, CreateCouponRequest, MAX_AMOUNT_CENTS,
    ValidateCouponRequest,
};
use chrono::{DateTime, Utc};
use regex::Regex;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use std::sync::OnceLock;

fn code_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Z0-9_-]{3,32}$").expect("valid coupon regex"))
}

/// 优惠码统一大写存储
pub fn normalize_coupon_code(code: &str) -> AppResult<String> {
    let code = code.trim().to_uppercase();
    if !code_regex().is_match(&code) {
        return Err(AppError::ValidationError(
            "Coupon code must be 3-32 characters of A-Z, 0-9, '-' or '_'".into(),
        ));
    }
    Ok(code)
}

/// 小计 = 票价 × 张数，溢出视为非法请求
pub fn order_subtotal(price_cents: i64, ticket_count: i64) -> AppResult<i64> {
    price_cents
        .checked_mul(ticket_count)
        .filter(|s| *s >= 0)
        .ok_or_else(|| AppError::ValidationError("Order total is out of range".into()))
}

/// 折扣金额（分），不超过小计
pub fn compute_discount(discount_type: DiscountType, value: i64, subtotal_cents: i64) -> i64 {
    if subtotal_cents <= 0 || value <= 0 {
        return 0;
    }
    match discount_type {
        // i128 中间值；结果不超过小计
        DiscountType::Percentage => {
            (i128::from(subtotal_cents) * i128::from(value.min(100)) / 100) as i64
        }
        DiscountType::Fixed => value.min(subtotal_cents),
    }
}

/// 校验优惠码能否用于该活动与小计
pub fn check_applicable(
    coupon: &coupons::Model,
    raffle_id: i64,
    subtotal_cents: i64,
    now: DateTime<Utc>,
) -> AppResult<()> {
    if !coupon.is_active {
        return Err(AppError::ValidationError("Coupon is not active".into()));
    }
    if coupon.raffle_id.is_some_and(|id| id != raffle_id) {
        return Err(AppError::ValidationError(
            "Coupon is not valid for this raffle".into(),
        ));
    }
    if !coupon.is_within_window(now) {
        return Err(AppError::ValidationError(
            "Coupon is outside its validity window".into(),
        ));
    }
    if coupon.is_exhausted() {
        return Err(AppError::ValidationError(
            "Coupon has reached its usage limit".into(),
        ));
    }
    if let Some(min) = coupon.min_purchase_cents
        && subtotal_cents < min
    {
        return Err(AppError::ValidationError(format!(
            "Coupon requires a minimum purchase of {min} cents"
        )));
    }
    Ok(())
}

/// 查找组织下的优惠码并报价（不占用次数）
pub async fn quote_in<C: ConnectionTrait>(
    conn: &C,
    raffle: &raffles::Model,
    code: &str,
    ticket_count: i64,
    now: DateTime<Utc>,
) -> AppResult<CouponQuote> {
    let code = normalize_coupon_code(code)?;
    let coupon = coupons::Entity::find()
        .filter(coupons::Column::OrganizationId.eq(raffle.organization_id))
        .filter(coupons::Column::Code.eq(code.as_str()))
        .one(conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Coupon not found".into()))?;

    let subtotal = order_subtotal(raffle.ticket_price_cents, ticket_count)?;
    check_applicable(&coupon, raffle.id, subtotal, now)?;
    let discount = compute_discount(coupon.discount_type, coupon.discount_value, subtotal);
    Ok(CouponQuote {
        coupon_id: coupon.id,
        code: coupon.code,
        subtotal_cents: subtotal,
        discount_cents: discount,
        total_cents: subtotal - discount,
    })
}

/// 占用一次使用次数；并发下超过上限时失败
pub async fn claim_use<C: ConnectionTrait>(conn: &C, coupon_id: i64) -> AppResult<()> {
    let res = coupons::Entity::update_many()
        .col_expr(
            coupons::Column::CurrentUses,
            Expr::col(coupons::Column::CurrentUses).add(1),
        )
        .col_expr(coupons::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(coupons::Column::Id.eq(coupon_id))
        .filter(coupons::Column::IsActive.eq(true))
        .filter(
            coupons::Column::MaxUses
                .is_null()
                .or(Expr::col(coupons::Column::CurrentUses).lt(Expr::col(coupons::Column::MaxUses))),
        )
        .exec(conn)
        .await?;
    if res.rows_affected == 0 {
        return Err(AppError::ValidationError(
            "Coupon has reached its usage limit".into(),
        ));
    }
    Ok(())
}

/// 订单取消/过期时归还使用次数
pub async fn release_use<C: ConnectionTrait>(conn: &C, coupon_id: i64) -> AppResult<()> {
    coupons::Entity::update_many()
        .col_expr(
            coupons::Column::CurrentUses,
            Expr::col(coupons::Column::CurrentUses).sub(1),
        )
        .col_expr(coupons::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(coupons::Column::Id.eq(coupon_id))
        .filter(coupons::Column::CurrentUses.gt(0))
        .exec(conn)
        .await?;
    Ok(())
}

#[derive(Clone)]
pub struct CouponService {
    pool: DatabaseConnection,
}

impl CouponService {
    pub fn new(pool: DatabaseConnection) -> Self {
        Self { pool }
    }

    pub async fn create_coupon(
        &self,
        ctx: &AuthContext,
        req: CreateCouponRequest,
    ) -> AppResult<CouponResponse> {
        ctx.require_manager()?;
        let code = normalize_coupon_code(&req.code)?;
        match req.discount_type {
            DiscountType::Percentage if !(1..=100).contains(&req.discount_value) => {
                return Err(AppError::ValidationError(
                    "Percentage discount must be between 1 and 100".into(),
                ));
            }
            DiscountType::Fixed if !(1..=MAX_AMOUNT_CENTS).contains(&req.discount_value) => {
                return Err(AppError::ValidationError(format!(
                    "Fixed discount must be between 1 and {MAX_AMOUNT_CENTS} cents"
                )));
            }
            _ => {}
        }
        if req
            .min_purchase_cents
            .is_some_and(|m| !(0..=MAX_AMOUNT_CENTS).contains(&m))
        {
            return Err(AppError::ValidationError(format!(
                "min_purchase_cents must be between 0 and {MAX_AMOUNT_CENTS}"
            )));
        }
        if req.max_uses.is_some_and(|m| m < 1) {
            return Err(AppError::ValidationError("max_uses must be positive".into()));
        }
        if let (Some(from), Some(until)) = (req.valid_from, req.valid_until)
            && from >= until
        {
            return Err(AppError::ValidationError(
                "valid_from must be before valid_until".into(),
            ));
        }
        if let Some(raffle_id) = req.raffle_id {
            let raffle = raffles::Entity::find_by_id(raffle_id)
                .one(&self.pool)
                .await?
                .ok_or_else(|| AppError::NotFound("Raffle not found".into()))?;
            ctx.ensure_same_org(raffle.organization_id, "Raffle")?;
        }

        let exists = coupons::Entity::find()
            .filter(coupons::Column::OrganizationId.eq(ctx.organization_id))
            .filter(coupons::Column::Code.eq(code.as_str()))
            .one(&self.pool)
            .await?;
        if exists.is_some() {
            return Err(AppError::Conflict(format!("Coupon {code} already exists")));
        }

        let model = coupons::ActiveModel {
            organization_id: Set(ctx.organization_id),
            raffle_id: Set(req.raffle_id),
            code: Set(code),
            discount_type: Set(req.discount_type),
            discount_value: Set(req.discount_value),
            max_uses: Set(req.max_uses),
            current_uses: Set(0),
            min_purchase_cents: Set(req.min_purchase_cents),
            valid_from: Set(req.valid_from),
            valid_until: Set(req.valid_until),
            is_active: Set(true),
            ..Default::default()
        }
        .insert(&self.pool)
        .await?;

        log::info!(
            "Coupon {} created for organization {}",
            model.code,
            model.organization_id
        );
        Ok(model.into())
    }

    pub async fn list_coupons(&self, ctx: &AuthContext) -> AppResult<Vec<CouponResponse>> {
        let list = coupons::Entity::find()
            .filter(coupons::Column::OrganizationId.eq(ctx.organization_id))
            .order_by_desc(coupons::Column::CreatedAt)
            .all(&self.pool)
            .await?;
        Ok(list.into_iter().map(CouponResponse::from).collect())
    }

    pub async fn deactivate_coupon(&self, ctx: &AuthContext, id: i64) -> AppResult<CouponResponse> {
        ctx.require_manager()?;
        let coupon = coupons::Entity::find_by_id(id)
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Coupon not found".into()))?;
        ctx.ensure_same_org(coupon.organization_id, "Coupon")?;

        let mut am: coupons::ActiveModel = coupon.into();
        am.is_active = Set(false);
        am.updated_at = Set(Utc::now());
        let updated = am.update(&self.pool).await?;
        Ok(updated.into())
    }

    /// 公开报价接口
    pub async fn validate_coupon(&self, req: ValidateCouponRequest) -> AppResult<CouponQuote> {
        if req.ticket_count < 1 {
            return Err(AppError::ValidationError(
                "ticket_count must be positive".into(),
            ));
        }
        let raffle = raffles::Entity::find_by_id(req.raffle_id)
            .one(&self.pool)
            .await?
            .filter(|r| r.status.is_public())
            .ok_or_else(|| AppError::NotFound("Raffle not found".into()))?;
        quote_in(&self.pool, &raffle, &req.code, req.ticket_count, Utc::now()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn coupon() -> coupons::Model {
        let now = Utc::now();
        coupons::Model {
            id: 1,
            organization_id: 1,
            raffle_id: None,
            code: "PROMO10".into(),
            discount_type: DiscountType::Percentage,
            discount_value: 10,
            max_uses: Some(5),
            current_uses: 0,
            min_purchase_cents: None,
            valid_from: None,
            valid_until: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_normalize_coupon_code() {
        assert_eq!(normalize_coupon_code(" navidad-25 ").unwrap(), "NAVIDAD-25");
        assert!(normalize_coupon_code("ab").is_err());
        assert!(normalize_coupon_code("with space").is_err());
        assert!(normalize_coupon_code(&"X".repeat(33)).is_err());
    }

    #[test]
    fn test_compute_discount() {
        assert_eq!(compute_discount(DiscountType::Percentage, 10, 5_000), 500);
        // 向下取整
        assert_eq!(compute_discount(DiscountType::Percentage, 15, 999), 149);
        assert_eq!(compute_discount(DiscountType::Percentage, 150, 1_000), 1_000);
        assert_eq!(compute_discount(DiscountType::Fixed, 300, 5_000), 300);
        assert_eq!(compute_discount(DiscountType::Fixed, 9_000, 5_000), 5_000);
        assert_eq!(compute_discount(DiscountType::Fixed, 300, 0), 0);
        // 大额小计不溢出
        assert_eq!(
            compute_discount(DiscountType::Percentage, 50, i64::MAX / 10),
            i64::MAX / 20
        );
        assert_eq!(
            compute_discount(DiscountType::Percentage, 100, i64::MAX),
            i64::MAX
        );
    }

    #[test]
    fn test_order_subtotal_rejects_overflow() {
        assert_eq!(order_subtotal(1_500, 4).unwrap(), 6_000);
        assert_eq!(order_subtotal(MAX_AMOUNT_CENTS, 10_000_000).unwrap(), 1_000_000_000_000_000_000);
        assert!(matches!(
            order_subtotal(200_000_000_000_000_000, 100),
            Err(AppError::ValidationError(_))
        ));
        assert!(order_subtotal(i64::MAX, 2).is_err());
    }

    #[test]
    fn test_check_applicable() {
        let now = Utc::now();
        let c = coupon();
        assert!(check_applicable(&c, 3, 1_000, now).is_ok());

        let mut scoped = coupon();
        scoped.raffle_id = Some(2);
        assert!(check_applicable(&scoped, 3, 1_000, now).is_err());
        assert!(check_applicable(&scoped, 2, 1_000, now).is_ok());

        let mut used_up = coupon();
        used_up.current_uses = 5;
        assert!(check_applicable(&used_up, 3, 1_000, now).is_err());

        let mut expired = coupon();
        expired.valid_until = Some(now - Duration::hours(1));
        assert!(check_applicable(&expired, 3, 1_000, now).is_err());

        let mut minimum = coupon();
        minimum.min_purchase_cents = Some(2_000);
        assert!(check_applicable(&minimum, 3, 1_000, now).is_err());
        assert!(check_applicable(&minimum, 3, 2_000, now).is_ok());

        let mut inactive = coupon();
        inactive.is_active = false;
        assert!(check_applicable(&inactive, 3, 1_000, now).is_err());
    }
}
