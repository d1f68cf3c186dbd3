use crate::config::ReservationConfig;
use crate::entities::{
    LuckyIndices, OrderStatus, RaffleStatus, TicketRanges, order_entity as orders,
    raffle_entity as raffles,
};
use crate::error::{AppError, AppResult};
use crate::external::EmailService;
use crate::models::{
    ApprovalResult, AuthContext, ExpirySummary, HoldInfo, MAX_PAGE_SIZE, OrderQuery,
    OrderResponse, PaginatedResponse, PaginationParams, PaymentProofRequest, PublicOrderResponse,
    RejectOrderRequest, ReservationResult, ReserveTicketsRequest,
};
use crate::services::coupon_service::{claim_use, order_subtotal, quote_in, release_use};
use crate::services::notification_service::record_event;
use crate::services::ticket_service::{TicketService, load_held_tickets};
use crate::utils::{
    ExpiryTracker, TicketRange, TicketSet, compress_indices, format_ticket_number,
    generate_reference_code,
};
use chrono::{DateTime, Duration, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// 公开订单页最多展示的票号数
pub const MAX_PUBLIC_TICKET_NUMBERS: usize = 1000;

const REFERENCE_CODE_ATTEMPTS: usize = 5;

/// 通过校验的预留内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationPlan {
    pub ticket_ranges: Vec<TicketRange>,
    pub lucky_indices: Vec<i64>,
    pub ticket_count: i64,
}

/// 在已占用集合上检查请求：越界或冲突时整单拒绝
pub fn plan_reservation(
    held: &TicketSet,
    total_tickets: i64,
    indices: &[i64],
    lucky: bool,
) -> Result<ReservationPlan, ReservationResult> {
    let mut out_of_range: Vec<i64> = indices
        .iter()
        .copied()
        .filter(|&i| i < 0 || i >= total_tickets)
        .collect();
    if !out_of_range.is_empty() {
        out_of_range.sort_unstable();
        return Err(ReservationResult::rejected(
            format!("Ticket indices must be between 0 and {}", total_tickets - 1),
            out_of_range,
        ));
    }

    let taken = held.conflicts(indices);
    if !taken.is_empty() {
        return Err(ReservationResult::rejected(
            "Some tickets are no longer available",
            taken,
        ));
    }

    Ok(if lucky {
        ReservationPlan {
            ticket_ranges: Vec::new(),
            lucky_indices: indices.to_vec(),
            ticket_count: indices.len() as i64,
        }
    } else {
        ReservationPlan {
            ticket_ranges: compress_indices(indices),
            lucky_indices: Vec::new(),
            ticket_count: indices.len() as i64,
        }
    })
}

/// 预留时长（分钟）：请求值 > 活动配置 > 全局默认，限制在 [1, max]
pub fn resolve_hold_minutes(
    requested: Option<i64>,
    raffle_minutes: i32,
    config: &ReservationConfig,
) -> i64 {
    let fallback = if raffle_minutes > 0 {
        raffle_minutes as i64
    } else {
        config.default_minutes
    };
    requested
        .unwrap_or(fallback)
        .clamp(1, config.max_minutes.max(1))
}

/// 取消仍占用票号的订单（reserved / pending），并归还优惠码次数
pub async fn cancel_order_in_txn<C: ConnectionTrait>(
    conn: &C,
    order: &orders::Model,
    reason: &str,
    now: DateTime<Utc>,
) -> AppResult<bool> {
    let res = orders::Entity::update_many()
        .col_expr(orders::Column::Status, Expr::value(OrderStatus::Canceled))
        .col_expr(orders::Column::CanceledAt, Expr::value(now))
        .col_expr(orders::Column::CancelReason, Expr::value(reason.to_string()))
        .col_expr(orders::Column::UpdatedAt, Expr::value(now))
        .filter(orders::Column::Id.eq(order.id))
        .filter(orders::Column::Status.is_in([OrderStatus::Reserved, OrderStatus::Pending]))
        .exec(conn)
        .await?;
    if res.rows_affected == 0 {
        return Ok(false);
    }
    if let Some(coupon_id) = order.coupon_id {
        release_use(conn, coupon_id).await?;
    }
    Ok(true)
}

/// 预留已过期的订单置为取消；条件更新保证每个订单只处理一次
async fn expire_one<C: ConnectionTrait>(
    conn: &C,
    order: &orders::Model,
    now: DateTime<Utc>,
) -> AppResult<bool> {
    let res = orders::Entity::update_many()
        .col_expr(orders::Column::Status, Expr::value(OrderStatus::Canceled))
        .col_expr(orders::Column::CanceledAt, Expr::value(now))
        .col_expr(
            orders::Column::CancelReason,
            Expr::value("Reservation expired".to_string()),
        )
        .col_expr(orders::Column::UpdatedAt, Expr::value(now))
        .filter(orders::Column::Id.eq(order.id))
        .filter(orders::Column::Status.eq(OrderStatus::Reserved))
        .filter(orders::Column::ReservedUntil.lte(now))
        .exec(conn)
        .await?;
    if res.rows_affected == 0 {
        return Ok(false);
    }
    if let Some(coupon_id) = order.coupon_id {
        release_use(conn, coupon_id).await?;
    }
    record_event(
        conn,
        order.organization_id,
        Some(order.raffle_id),
        "reservation_expired",
        json!({
            "order_id": order.id,
            "reference_code": order.reference_code,
            "ticket_count": order.ticket_count,
        }),
    )
    .await?;
    Ok(true)
}

/// 活动取消时取消全部未结订单
pub async fn cancel_open_orders_for_raffle<C: ConnectionTrait>(
    conn: &C,
    raffle_id: i64,
    reason: &str,
    now: DateTime<Utc>,
) -> AppResult<usize> {
    let open = orders::Entity::find()
        .filter(orders::Column::RaffleId.eq(raffle_id))
        .filter(orders::Column::Status.is_in([OrderStatus::Reserved, OrderStatus::Pending]))
        .all(conn)
        .await?;
    let mut canceled = 0;
    for o in &open {
        if cancel_order_in_txn(conn, o, reason, now).await? {
            canceled += 1;
        }
    }
    Ok(canceled)
}

async fn lock_raffle(txn: &DatabaseTransaction, raffle_id: i64) -> AppResult<raffles::Model> {
    raffles::Entity::find_by_id(raffle_id)
        .lock_exclusive()
        .one(txn)
        .await?
        .ok_or_else(|| AppError::NotFound("Raffle not found".into()))
}

#[derive(Clone)]
pub struct OrderService {
    pool: DatabaseConnection,
    config: ReservationConfig,
    tickets: TicketService,
    email: EmailService,
    public_base_url: String,
    expiry: Arc<Mutex<ExpiryTracker>>,
}

impl OrderService {
    pub fn new(
        pool: DatabaseConnection,
        config: ReservationConfig,
        tickets: TicketService,
        email: EmailService,
        public_base_url: String,
    ) -> Self {
        Self {
            pool,
            config,
            tickets,
            email,
            public_base_url,
            expiry: Arc::new(Mutex::new(ExpiryTracker::new())),
        }
    }

    async fn unique_reference_code(&self, txn: &DatabaseTransaction) -> AppResult<String> {
        for _ in 0..REFERENCE_CODE_ATTEMPTS {
            let code = generate_reference_code();
            let exists = orders::Entity::find()
                .filter(orders::Column::ReferenceCode.eq(code.as_str()))
                .count(txn)
                .await?;
            if exists == 0 {
                return Ok(code);
            }
        }
        Err(AppError::InternalError(
            "Unable to allocate a unique reference code".into(),
        ))
    }

    /// 预留票号（整单成功或整单拒绝）
    ///
    /// 同一活动的预留、审批、过期都在活动行锁 (`SELECT ... FOR UPDATE`) 下串行执行，
    /// 可用性检查与写入处于同一事务。
    pub async fn reserve_tickets(
        &self,
        raffle_id: i64,
        req: ReserveTicketsRequest,
    ) -> AppResult<ReservationResult> {
        req.validate(self.config.max_tickets_per_order)?;
        let now = Utc::now();

        let txn = self.pool.begin().await?;
        let raffle = lock_raffle(&txn, raffle_id).await?;

        if raffle.status != RaffleStatus::Active {
            log::warn!(
                "Reservation refused for raffle {raffle_id}: status {:?}",
                raffle.status
            );
            return Ok(ReservationResult::rejected(
                "Raffle is not accepting reservations",
                Vec::new(),
            ));
        }
        let per_order = raffle.max_tickets_per_order as i64;
        if per_order > 0 && req.ticket_indices.len() as i64 > per_order {
            return Err(AppError::ValidationError(format!(
                "At most {per_order} tickets can be reserved per order"
            )));
        }

        let expired = self.expire_elapsed_in_txn(&txn, raffle.id, now).await?;
        let held = load_held_tickets(&txn, raffle.id, now, None).await?;

        let plan = match plan_reservation(
            &held.all(),
            raffle.total_tickets,
            &req.ticket_indices,
            req.is_lucky_numbers,
        ) {
            Ok(plan) => plan,
            Err(rejected) => {
                // 保留顺带完成的过期处理
                txn.commit().await?;
                if expired > 0 {
                    self.tickets.invalidate(raffle.id).await;
                }
                log::warn!(
                    "Reservation refused for raffle {raffle_id}: {} requested tickets unavailable",
                    req.ticket_indices.len()
                );
                return Ok(rejected);
            }
        };

        let subtotal = order_subtotal(raffle.ticket_price_cents, plan.ticket_count)?;
        let (coupon_id, discount) = match req.coupon_code.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() => {
                let quote = quote_in(&txn, &raffle, code, plan.ticket_count, now).await?;
                claim_use(&txn, quote.coupon_id).await?;
                (Some(quote.coupon_id), quote.discount_cents)
            }
            _ => (None, 0),
        };
        let total = subtotal - discount;
        if let Some(expected) = req.order_total_cents
            && expected != total
        {
            return Err(AppError::ValidationError(format!(
                "Order total mismatch: expected {total} cents, got {expected}"
            )));
        }

        let minutes = resolve_hold_minutes(
            req.reservation_minutes,
            raffle.reservation_minutes,
            &self.config,
        );
        let reserved_until = now + Duration::minutes(minutes);
        let reference_code = self.unique_reference_code(&txn).await?;

        let order = orders::ActiveModel {
            raffle_id: Set(raffle.id),
            organization_id: Set(raffle.organization_id),
            buyer_name: Set(req.buyer_name.trim().to_string()),
            buyer_email: Set(req.buyer_email.trim().to_lowercase()),
            buyer_phone: Set(req.buyer_phone.clone()),
            buyer_city: Set(req.buyer_city.clone()),
            ticket_ranges: Set(TicketRanges(plan.ticket_ranges.clone())),
            lucky_indices: Set(LuckyIndices(plan.lucky_indices.clone())),
            ticket_count: Set(plan.ticket_count),
            reference_code: Set(reference_code),
            status: Set(OrderStatus::Reserved),
            reserved_until: Set(Some(reserved_until)),
            order_total_cents: Set(total),
            discount_cents: Set(discount),
            coupon_id: Set(coupon_id),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        record_event(
            &txn,
            raffle.organization_id,
            Some(raffle.id),
            "tickets_reserved",
            json!({
                "order_id": order.id,
                "ticket_count": order.ticket_count,
                "lucky": req.is_lucky_numbers,
            }),
        )
        .await?;
        txn.commit().await?;

        self.tickets.invalidate(raffle.id).await;
        self.expiry.lock().await.track(order.id, reserved_until);
        log::info!(
            "Order {} reserved {} tickets on raffle {} until {}",
            order.reference_code,
            order.ticket_count,
            raffle.id,
            reserved_until
        );

        Ok(ReservationResult::Reserved {
            order_id: order.id,
            reference_code: order.reference_code,
            reserved_until,
            ticket_count: order.ticket_count,
            ticket_ranges: plan.ticket_ranges,
            lucky_indices: plan.lucky_indices,
            order_total_cents: total,
            discount_cents: discount,
        })
    }

    /// 在已持有活动锁的事务中取消过期预留
    async fn expire_elapsed_in_txn(
        &self,
        txn: &DatabaseTransaction,
        raffle_id: i64,
        now: DateTime<Utc>,
    ) -> AppResult<usize> {
        let elapsed = orders::Entity::find()
            .filter(orders::Column::RaffleId.eq(raffle_id))
            .filter(orders::Column::Status.eq(OrderStatus::Reserved))
            .filter(orders::Column::ReservedUntil.lte(now))
            .all(txn)
            .await?;
        let mut count = 0;
        for o in &elapsed {
            if expire_one(txn, o, now).await? {
                count += 1;
            }
        }
        if count > 0 {
            log::info!("Expired {count} elapsed reservations on raffle {raffle_id}");
        }
        Ok(count)
    }

    async fn find_order_for(&self, ctx: &AuthContext, order_id: i64) -> AppResult<orders::Model> {
        let order = orders::Entity::find_by_id(order_id)
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Order not found".into()))?;
        ctx.ensure_same_org(order.organization_id, "Order")?;
        Ok(order)
    }

    async fn find_by_reference(&self, reference: &str) -> AppResult<orders::Model> {
        let reference = reference.trim().to_uppercase();
        orders::Entity::find()
            .filter(orders::Column::ReferenceCode.eq(reference))
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Order not found".into()))
    }

    /// 买家上传付款凭证：reserved（未过期）→ pending；pending 时替换凭证
    pub async fn submit_payment_proof(
        &self,
        reference: &str,
        req: PaymentProofRequest,
    ) -> AppResult<PublicOrderResponse> {
        let url = req.payment_proof_url.trim();
        if !(url.starts_with("https://") || url.starts_with("http://")) || url.len() > 2048 {
            return Err(AppError::ValidationError(
                "payment_proof_url must be an http(s) URL".into(),
            ));
        }
        let order = self.find_by_reference(reference).await?;
        let now = Utc::now();

        let res = orders::Entity::update_many()
            .col_expr(orders::Column::Status, Expr::value(OrderStatus::Pending))
            .col_expr(orders::Column::PaymentProofUrl, Expr::value(url.to_string()))
            .col_expr(orders::Column::UpdatedAt, Expr::value(now))
            .filter(orders::Column::Id.eq(order.id))
            .filter(
                orders::Column::Status.eq(OrderStatus::Pending).or(orders::Column::Status
                    .eq(OrderStatus::Reserved)
                    .and(orders::Column::ReservedUntil.gt(now))),
            )
            .exec(&self.pool)
            .await?;

        if res.rows_affected == 0 {
            let msg = match order.status {
                OrderStatus::Reserved => "Reservation has expired",
                OrderStatus::Sold => "Order is already paid",
                _ => "Order was canceled",
            };
            return Err(AppError::Conflict(msg.into()));
        }

        self.expiry.lock().await.untrack(order.id);
        self.tickets.invalidate(order.raffle_id).await;
        log::info!("Payment proof submitted for order {}", order.reference_code);
        self.get_order_by_reference(&order.reference_code).await
    }

    /// 审批：reserved / pending → sold，已售订单幂等成功
    pub async fn approve_order(&self, ctx: &AuthContext, order_id: i64) -> AppResult<ApprovalResult> {
        ctx.require_manager()?;
        let order = self.find_order_for(ctx, order_id).await?;
        let now = Utc::now();

        let txn = self.pool.begin().await?;
        let raffle = lock_raffle(&txn, order.raffle_id).await?;
        // 持锁后重新读取
        let order = orders::Entity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::NotFound("Order not found".into()))?;

        match order.status {
            OrderStatus::Sold => {
                return Ok(ApprovalResult::Applied {
                    order_id,
                    status: OrderStatus::Sold,
                    ticket_count: order.ticket_count,
                    already_applied: true,
                });
            }
            OrderStatus::Canceled => {
                log::warn!("Approval refused for canceled order {order_id}");
                return Ok(ApprovalResult::refused(
                    "Order was canceled and cannot be approved",
                ));
            }
            OrderStatus::Reserved if order.reservation_elapsed(now) => {
                let held = load_held_tickets(&txn, raffle.id, now, Some(order.id)).await?;
                let wanted: Vec<i64> = order.ticket_set().iter_indices().collect();
                let taken = held.all().conflicts(&wanted);
                if !taken.is_empty() {
                    log::warn!(
                        "Approval refused for order {order_id}: {} tickets taken after hold expired",
                        taken.len()
                    );
                    return Ok(ApprovalResult::refused(
                        "Reservation expired and some tickets now belong to another order",
                    ));
                }
            }
            OrderStatus::Reserved | OrderStatus::Pending => {}
        }

        let mut am: orders::ActiveModel = order.clone().into();
        am.status = Set(OrderStatus::Sold);
        am.approved_at = Set(Some(now));
        am.updated_at = Set(now);
        let approved = am.update(&txn).await?;

        record_event(
            &txn,
            approved.organization_id,
            Some(approved.raffle_id),
            "order_approved",
            json!({
                "order_id": approved.id,
                "ticket_count": approved.ticket_count,
                "approved_by": ctx.user_id,
            }),
        )
        .await?;
        txn.commit().await?;

        self.tickets.invalidate(raffle.id).await;
        self.expiry.lock().await.untrack(approved.id);
        log::info!(
            "Order {} approved ({} tickets) by user {}",
            approved.reference_code,
            approved.ticket_count,
            ctx.user_id
        );

        if let Err(e) = self.send_approval_email(&raffle, &approved).await {
            log::warn!(
                "Approval email for order {} failed: {e}",
                approved.reference_code
            );
        }

        Ok(ApprovalResult::Applied {
            order_id,
            status: OrderStatus::Sold,
            ticket_count: approved.ticket_count,
            already_applied: false,
        })
    }

    async fn send_approval_email(&self, raffle: &raffles::Model, order: &orders::Model) -> AppResult<()> {
        if !self.email.is_enabled() {
            return Ok(());
        }
        let numbers: Vec<String> = order
            .ticket_set()
            .iter_indices()
            .take(50)
            .map(|i| format_ticket_number(&raffle.numbering, i))
            .collect();
        let link = format!("{}/orders/{}", self.public_base_url, order.reference_code);
        let html = format!(
            "<p>Hola {},</p><p>Your payment for <b>{}</b> was approved.</p>\
             <p>Tickets ({}): {}</p><p><a href=\"{link}\">View order</a></p>",
            order.buyer_name,
            raffle.title,
            order.ticket_count,
            numbers.join(", ")
        );
        self.email
            .send(
                &order.buyer_email,
                &format!("Payment approved: {}", raffle.title),
                &html,
            )
            .await
    }

    /// 驳回：reserved / pending → canceled（释放票号），已取消幂等成功
    pub async fn reject_order(
        &self,
        ctx: &AuthContext,
        order_id: i64,
        req: RejectOrderRequest,
    ) -> AppResult<ApprovalResult> {
        ctx.require_manager()?;
        let order = self.find_order_for(ctx, order_id).await?;
        let now = Utc::now();

        let txn = self.pool.begin().await?;
        let raffle = lock_raffle(&txn, order.raffle_id).await?;
        let order = orders::Entity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::NotFound("Order not found".into()))?;

        match order.status {
            OrderStatus::Canceled => {
                return Ok(ApprovalResult::Applied {
                    order_id,
                    status: OrderStatus::Canceled,
                    ticket_count: order.ticket_count,
                    already_applied: true,
                });
            }
            OrderStatus::Sold => {
                log::warn!("Rejection refused for sold order {order_id}");
                return Ok(ApprovalResult::refused("Sold orders cannot be rejected"));
            }
            OrderStatus::Reserved | OrderStatus::Pending => {}
        }

        let reason = req
            .reason
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or("Rejected by organizer");
        cancel_order_in_txn(&txn, &order, reason, now).await?;
        record_event(
            &txn,
            order.organization_id,
            Some(order.raffle_id),
            "order_rejected",
            json!({ "order_id": order.id, "reason": reason, "rejected_by": ctx.user_id }),
        )
        .await?;
        txn.commit().await?;

        self.tickets.invalidate(raffle.id).await;
        self.expiry.lock().await.untrack(order.id);
        log::info!(
            "Order {} rejected, {} tickets released",
            order.reference_code,
            order.ticket_count
        );

        Ok(ApprovalResult::Applied {
            order_id,
            status: OrderStatus::Canceled,
            ticket_count: order.ticket_count,
            already_applied: false,
        })
    }

    pub async fn get_order_by_reference(&self, reference: &str) -> AppResult<PublicOrderResponse> {
        let order = self.find_by_reference(reference).await?;
        let raffle = raffles::Entity::find_by_id(order.raffle_id)
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Raffle not found".into()))?;

        let ticket_numbers: Vec<String> = order
            .ticket_set()
            .iter_indices()
            .take(MAX_PUBLIC_TICKET_NUMBERS)
            .map(|i| format_ticket_number(&raffle.numbering, i))
            .collect();

        Ok(PublicOrderResponse {
            hold: HoldInfo::for_order(&order, Utc::now()),
            ticket_numbers_truncated: order.ticket_count > ticket_numbers.len() as i64,
            ticket_numbers,
            reference_code: order.reference_code,
            raffle_id: raffle.id,
            raffle_title: raffle.title,
            status: order.status,
            buyer_name: order.buyer_name,
            ticket_count: order.ticket_count,
            order_total_cents: order.order_total_cents,
            discount_cents: order.discount_cents,
            currency: raffle.currency,
            payment_proof_url: order.payment_proof_url,
            created_at: order.created_at,
        })
    }

    pub async fn list_orders(
        &self,
        ctx: &AuthContext,
        raffle_id: i64,
        query: &OrderQuery,
    ) -> AppResult<PaginatedResponse<OrderResponse>> {
        let raffle = raffles::Entity::find_by_id(raffle_id)
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Raffle not found".into()))?;
        ctx.ensure_same_org(raffle.organization_id, "Raffle")?;

        let params = PaginationParams::new(query.page, query.per_page, MAX_PAGE_SIZE);
        let mut q = orders::Entity::find().filter(orders::Column::RaffleId.eq(raffle_id));
        if let Some(status) = query.status {
            q = q.filter(orders::Column::Status.eq(status));
        }
        let total = q.clone().count(&self.pool).await? as i64;
        let list = q
            .order_by_desc(orders::Column::CreatedAt)
            .offset(params.get_offset() as u64)
            .limit(params.get_limit() as u64)
            .all(&self.pool)
            .await?;
        Ok(PaginatedResponse::new(
            list.into_iter().map(OrderResponse::from).collect(),
            params,
            total,
        ))
    }

    /// 取消所有已过期的预留（管理接口）
    pub async fn expire_reservations(&self, now: DateTime<Utc>) -> AppResult<ExpirySummary> {
        let elapsed = orders::Entity::find()
            .filter(orders::Column::Status.eq(OrderStatus::Reserved))
            .filter(orders::Column::ReservedUntil.lte(now))
            .all(&self.pool)
            .await?;
        self.expire_candidates(elapsed, now).await
    }

    /// 取消指定订单中已过期的预留
    pub async fn expire_orders(&self, ids: &[i64], now: DateTime<Utc>) -> AppResult<ExpirySummary> {
        if ids.is_empty() {
            return Ok(ExpirySummary {
                expired_orders: 0,
                released_tickets: 0,
            });
        }
        let candidates = orders::Entity::find()
            .filter(orders::Column::Id.is_in(ids.to_vec()))
            .filter(orders::Column::Status.eq(OrderStatus::Reserved))
            .filter(orders::Column::ReservedUntil.lte(now))
            .all(&self.pool)
            .await?;
        self.expire_candidates(candidates, now).await
    }

    async fn expire_candidates(
        &self,
        candidates: Vec<orders::Model>,
        now: DateTime<Utc>,
    ) -> AppResult<ExpirySummary> {
        let mut by_raffle: BTreeMap<i64, Vec<orders::Model>> = BTreeMap::new();
        for o in candidates {
            by_raffle.entry(o.raffle_id).or_default().push(o);
        }

        let mut summary = ExpirySummary {
            expired_orders: 0,
            released_tickets: 0,
        };
        for (raffle_id, list) in by_raffle {
            let txn = self.pool.begin().await?;
            lock_raffle(&txn, raffle_id).await?;
            let mut expired = Vec::new();
            for o in &list {
                if expire_one(&txn, o, now).await? {
                    summary.expired_orders += 1;
                    summary.released_tickets += o.ticket_count;
                    expired.push(o.id);
                }
            }
            txn.commit().await?;

            if !expired.is_empty() {
                self.tickets.invalidate(raffle_id).await;
                let mut tracker = self.expiry.lock().await;
                for id in expired {
                    tracker.untrack(id);
                }
            }
        }
        if summary.expired_orders > 0 {
            log::info!(
                "Expired {} reservations, released {} tickets",
                summary.expired_orders,
                summary.released_tickets
            );
        }
        Ok(summary)
    }

    /// 后台扫描：同步跟踪表后处理到期订单
    pub async fn sweep_expired(&self) -> AppResult<ExpirySummary> {
        let reserved = orders::Entity::find()
            .filter(orders::Column::Status.eq(OrderStatus::Reserved))
            .filter(orders::Column::ReservedUntil.is_not_null())
            .all(&self.pool)
            .await?;
        let now = Utc::now();
        let due = {
            let mut tracker = self.expiry.lock().await;
            let live: std::collections::HashSet<i64> = reserved.iter().map(|o| o.id).collect();
            tracker.retain(|id| live.contains(&id));
            for o in &reserved {
                if let Some(until) = o.reserved_until {
                    tracker.track(o.id, until);
                }
            }
            tracker.due(now)
        };
        self.expire_orders(&due, now).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_then_overlapping_request_is_rejected() {
        let mut held = TicketSet::new();
        let plan = plan_reservation(&held, 100, &[5, 6, 7], false).unwrap();
        assert_eq!(plan.ticket_ranges, vec![TicketRange::new(5, 7)]);
        assert_eq!(plan.ticket_count, 3);
        held.extend(plan.ticket_ranges);

        match plan_reservation(&held, 100, &[7, 8], false) {
            Err(ReservationResult::Rejected {
                unavailable_indices,
                ..
            }) => assert_eq!(unavailable_indices, vec![7]),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn test_out_of_range_indices_are_rejected() {
        let held = TicketSet::new();
        match plan_reservation(&held, 100, &[99, 100, 250], false) {
            Err(ReservationResult::Rejected {
                unavailable_indices,
                ..
            }) => assert_eq!(unavailable_indices, vec![100, 250]),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn test_lucky_numbers_kept_verbatim() {
        let held = TicketSet::from_indices(&[1, 2]);
        let plan = plan_reservation(&held, 1000, &[777, 13, 500], true).unwrap();
        assert!(plan.ticket_ranges.is_empty());
        assert_eq!(plan.lucky_indices, vec![777, 13, 500]);
        assert_eq!(plan.ticket_count, 3);

        assert!(plan_reservation(&held, 1000, &[2, 900], true).is_err());
    }

    #[test]
    fn test_unsorted_request_is_compressed() {
        let plan = plan_reservation(&TicketSet::new(), 100, &[12, 10, 11, 40], false).unwrap();
        assert_eq!(
            plan.ticket_ranges,
            vec![TicketRange::new(10, 12), TicketRange::single(40)]
        );
    }

    #[test]
    fn test_resolve_hold_minutes() {
        let cfg = ReservationConfig::default();
        assert_eq!(resolve_hold_minutes(None, 30, &cfg), 30);
        assert_eq!(resolve_hold_minutes(None, 0, &cfg), cfg.default_minutes);
        assert_eq!(resolve_hold_minutes(Some(5), 30, &cfg), 5);
        assert_eq!(resolve_hold_minutes(Some(100_000), 30, &cfg), cfg.max_minutes);
    }
}
