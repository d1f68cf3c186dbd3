use crate::entities::{RaffleStatus, raffle_entity as raffles};
use crate::error::{AppError, AppResult};
use crate::models::{
    AuthContext, CreateRaffleRequest, GenerationStart, MAX_AMOUNT_CENTS, MAX_PAGE_SIZE, PaginatedResponse, PaginationParams,
    PublicRaffleResponse, PublishRaffleResponse, RaffleQuery, RaffleResponse, SubscriptionLimits,
    UpdateRaffleRequest,
};
use crate::services::order_service::cancel_open_orders_for_raffle;
use crate::services::organization_service::load_limits;
use crate::services::ticket_job_service::TicketJobService;
use crate::services::ticket_service::TicketService;
use crate::utils::{NumberingConfig, generate_slug};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};

const MAX_RESERVATION_MINUTES: i32 = 24 * 60;
const SLUG_ATTEMPTS: usize = 5;

fn check_title(title: &str) -> AppResult<()> {
    let len = title.trim().chars().count();
    if len == 0 || len > 200 {
        return Err(AppError::ValidationError(
            "Title must be between 1 and 200 characters".into(),
        ));
    }
    Ok(())
}

fn check_price(cents: i64) -> AppResult<()> {
    if cents < 0 {
        return Err(AppError::ValidationError(
            "Ticket price cannot be negative".into(),
        ));
    }
    if cents > MAX_AMOUNT_CENTS {
        return Err(AppError::ValidationError(format!(
            "Ticket price cannot exceed {MAX_AMOUNT_CENTS} cents"
        )));
    }
    Ok(())
}

/// 只有 draft / paused 可编辑；票数与编号格式只能在 draft 修改
fn check_editable(status: RaffleStatus, changes_tickets: bool) -> AppResult<()> {
    if !matches!(status, RaffleStatus::Draft | RaffleStatus::Paused) {
        return Err(AppError::Conflict(
            "Only draft or paused raffles can be edited".into(),
        ));
    }
    if changes_tickets && status != RaffleStatus::Draft {
        return Err(AppError::Conflict(
            "Ticket count and numbering can only change while in draft".into(),
        ));
    }
    Ok(())
}

/// 总票数需在 [1, 套餐上限]
pub fn check_total_tickets(total: i64, limits: &SubscriptionLimits) -> AppResult<()> {
    if total < 1 {
        return Err(AppError::ValidationError(
            "A raffle needs at least one ticket".into(),
        ));
    }
    if total > limits.max_tickets_per_raffle {
        return Err(AppError::LimitExceeded(format!(
            "Your plan allows at most {} tickets per raffle",
            limits.max_tickets_per_raffle
        )));
    }
    Ok(())
}

/// 活动数上限：只统计 active
pub fn check_active_limit(active: i64, limits: &SubscriptionLimits) -> AppResult<()> {
    if active >= limits.max_active_raffles {
        return Err(AppError::LimitExceeded(format!(
            "Your plan allows at most {} active raffles",
            limits.max_active_raffles
        )));
    }
    Ok(())
}

fn check_hold_settings(reservation_minutes: i32, max_per_order: i32) -> AppResult<()> {
    if !(1..=MAX_RESERVATION_MINUTES).contains(&reservation_minutes) {
        return Err(AppError::ValidationError(format!(
            "reservation_minutes must be between 1 and {MAX_RESERVATION_MINUTES}"
        )));
    }
    if max_per_order < 1 {
        return Err(AppError::ValidationError(
            "max_tickets_per_order must be positive".into(),
        ));
    }
    Ok(())
}

fn check_currency(currency: &str) -> AppResult<String> {
    let c = currency.trim().to_uppercase();
    if c.len() != 3 || !c.chars().all(|ch| ch.is_ascii_alphabetic()) {
        return Err(AppError::ValidationError(
            "Currency must be a 3-letter ISO code".into(),
        ));
    }
    Ok(c)
}

#[derive(Clone)]
pub struct RaffleService {
    pool: DatabaseConnection,
    jobs: TicketJobService,
    tickets: TicketService,
}

impl RaffleService {
    pub fn new(pool: DatabaseConnection, jobs: TicketJobService, tickets: TicketService) -> Self {
        Self {
            pool,
            jobs,
            tickets,
        }
    }

    pub async fn find_raffle_for(&self, ctx: &AuthContext, id: i64) -> AppResult<raffles::Model> {
        let raffle = raffles::Entity::find_by_id(id)
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Raffle not found".into()))?;
        ctx.ensure_same_org(raffle.organization_id, "Raffle")?;
        Ok(raffle)
    }

    async fn count_active<C: ConnectionTrait>(&self, conn: &C, organization_id: i64) -> AppResult<i64> {
        Ok(raffles::Entity::find()
            .filter(raffles::Column::OrganizationId.eq(organization_id))
            .filter(raffles::Column::Status.eq(RaffleStatus::Active))
            .count(conn)
            .await? as i64)
    }

    async fn unique_slug(&self, title: &str) -> AppResult<String> {
        for _ in 0..SLUG_ATTEMPTS {
            let slug = generate_slug(title);
            let taken = raffles::Entity::find()
                .filter(raffles::Column::Slug.eq(slug.as_str()))
                .count(&self.pool)
                .await?;
            if taken == 0 {
                return Ok(slug);
            }
        }
        Err(AppError::InternalError("Unable to allocate a unique slug".into()))
    }

    pub async fn create_raffle(
        &self,
        ctx: &AuthContext,
        req: CreateRaffleRequest,
    ) -> AppResult<RaffleResponse> {
        ctx.require_manager()?;
        check_title(&req.title)?;
        check_price(req.ticket_price_cents)?;
        if req.prize_name.trim().is_empty() {
            return Err(AppError::ValidationError("Prize name is required".into()));
        }
        let (_, limits) = load_limits(&self.pool, ctx.organization_id).await?;
        check_total_tickets(req.total_tickets, &limits)?;

        let numbering = req
            .numbering
            .unwrap_or_else(|| NumberingConfig::default_for(req.total_tickets));
        numbering.validate()?;
        let reservation_minutes = req.reservation_minutes.unwrap_or(15);
        let max_per_order = req.max_tickets_per_order.unwrap_or(100);
        check_hold_settings(reservation_minutes, max_per_order)?;
        let currency = check_currency(req.currency.as_deref().unwrap_or("MXN"))?;

        let slug = self.unique_slug(&req.title).await?;
        let model = raffles::ActiveModel {
            organization_id: Set(ctx.organization_id),
            title: Set(req.title.trim().to_string()),
            slug: Set(slug),
            description: Set(req.description),
            status: Set(RaffleStatus::Draft),
            ticket_price_cents: Set(req.ticket_price_cents),
            total_tickets: Set(req.total_tickets),
            currency: Set(currency),
            draw_date: Set(req.draw_date),
            prize_name: Set(req.prize_name.trim().to_string()),
            prize_value_cents: Set(req.prize_value_cents),
            prize_metadata: Set(req.prize_metadata),
            numbering: Set(numbering),
            reservation_minutes: Set(reservation_minutes),
            max_tickets_per_order: Set(max_per_order),
            ..Default::default()
        }
        .insert(&self.pool)
        .await?;

        log::info!(
            "Raffle {} ({}) created by user {} with {} tickets",
            model.id,
            model.slug,
            ctx.user_id,
            model.total_tickets
        );
        Ok(model.into())
    }

    pub async fn update_raffle(
        &self,
        ctx: &AuthContext,
        id: i64,
        req: UpdateRaffleRequest,
    ) -> AppResult<RaffleResponse> {
        ctx.require_manager()?;
        let changes_tickets = req.total_tickets.is_some() || req.numbering.is_some();
        let raffle = self.find_raffle_for(ctx, id).await?;
        check_editable(raffle.status, changes_tickets)?;

        // 与 publish 串行：锁内重新检查状态
        let txn = self.pool.begin().await?;
        let raffle = raffles::Entity::find_by_id(id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::NotFound("Raffle not found".into()))?;
        check_editable(raffle.status, changes_tickets)?;

        let mut am: raffles::ActiveModel = raffle.clone().into();
        if let Some(title) = req.title {
            check_title(&title)?;
            am.title = Set(title.trim().to_string());
        }
        if let Some(description) = req.description {
            am.description = Set(Some(description));
        }
        if let Some(price) = req.ticket_price_cents {
            check_price(price)?;
            am.ticket_price_cents = Set(price);
        }
        let mut total = raffle.total_tickets;
        if let Some(t) = req.total_tickets {
            let (_, limits) = load_limits(&txn, ctx.organization_id).await?;
            check_total_tickets(t, &limits)?;
            total = t;
            am.total_tickets = Set(t);
        }
        if let Some(numbering) = req.numbering {
            numbering.validate()?;
            am.numbering = Set(numbering);
        } else if req.total_tickets.is_some() && raffle.numbering == NumberingConfig::default_for(raffle.total_tickets) {
            // 默认格式随票数调整位数
            am.numbering = Set(NumberingConfig::default_for(total));
        }
        if let Some(currency) = req.currency {
            am.currency = Set(check_currency(&currency)?);
        }
        if let Some(draw_date) = req.draw_date {
            am.draw_date = Set(Some(draw_date));
        }
        if let Some(prize_name) = req.prize_name {
            if prize_name.trim().is_empty() {
                return Err(AppError::ValidationError("Prize name is required".into()));
            }
            am.prize_name = Set(prize_name.trim().to_string());
        }
        if let Some(v) = req.prize_value_cents {
            am.prize_value_cents = Set(Some(v));
        }
        if let Some(meta) = req.prize_metadata {
            am.prize_metadata = Set(Some(meta));
        }
        let minutes = req.reservation_minutes.unwrap_or(raffle.reservation_minutes);
        let per_order = req.max_tickets_per_order.unwrap_or(raffle.max_tickets_per_order);
        check_hold_settings(minutes, per_order)?;
        am.reservation_minutes = Set(minutes);
        am.max_tickets_per_order = Set(per_order);
        am.updated_at = Set(Utc::now());

        let updated = am.update(&txn).await?;
        txn.commit().await?;
        Ok(updated.into())
    }

    pub async fn list_raffles(
        &self,
        ctx: &AuthContext,
        query: &RaffleQuery,
    ) -> AppResult<PaginatedResponse<RaffleResponse>> {
        let params = PaginationParams::new(query.page, query.per_page, MAX_PAGE_SIZE);
        let mut q = raffles::Entity::find()
            .filter(raffles::Column::OrganizationId.eq(ctx.organization_id));
        if let Some(status) = query.status {
            q = q.filter(raffles::Column::Status.eq(status));
        }
        let total = q.clone().count(&self.pool).await? as i64;
        let list = q
            .order_by_desc(raffles::Column::CreatedAt)
            .offset(params.get_offset() as u64)
            .limit(params.get_limit() as u64)
            .all(&self.pool)
            .await?;
        Ok(PaginatedResponse::new(
            list.into_iter().map(RaffleResponse::from).collect(),
            params,
            total,
        ))
    }

    pub async fn get_raffle(&self, ctx: &AuthContext, id: i64) -> AppResult<RaffleResponse> {
        Ok(self.find_raffle_for(ctx, id).await?.into())
    }

    pub async fn get_public_raffle(&self, slug: &str) -> AppResult<PublicRaffleResponse> {
        let raffle = raffles::Entity::find()
            .filter(raffles::Column::Slug.eq(slug.trim().to_lowercase()))
            .one(&self.pool)
            .await?
            .filter(|r| r.status.is_public())
            .ok_or_else(|| AppError::NotFound("Raffle not found".into()))?;
        Ok(raffle.into())
    }

    /// 发布：draft → active，检查活动数上限并开始生成票号
    pub async fn publish_raffle(&self, ctx: &AuthContext, id: i64) -> AppResult<PublishRaffleResponse> {
        ctx.require_manager()?;
        let raffle = self.find_raffle_for(ctx, id).await?;
        if raffle.status != RaffleStatus::Draft {
            return Err(AppError::Conflict(format!(
                "Raffle in status {:?} cannot be published",
                raffle.status
            )));
        }
        let (_, limits) = load_limits(&self.pool, ctx.organization_id).await?;
        check_total_tickets(raffle.total_tickets, &limits)?;

        let txn = self.pool.begin().await?;
        let raffle = raffles::Entity::find_by_id(id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::NotFound("Raffle not found".into()))?;
        if raffle.status != RaffleStatus::Draft {
            return Err(AppError::Conflict("Raffle was already published".into()));
        }
        check_active_limit(self.count_active(&txn, ctx.organization_id).await?, &limits)?;

        let now = Utc::now();
        let mut am: raffles::ActiveModel = raffle.into();
        am.status = Set(RaffleStatus::Active);
        am.published_at = Set(Some(now));
        am.updated_at = Set(now);
        let published = am.update(&txn).await?;
        txn.commit().await?;

        log::info!("Raffle {} published by user {}", published.id, ctx.user_id);
        // 发布已提交；生成失败只记录，可手动重试
        let generation = match self.jobs.start_generation(&published).await {
            Ok(g) => Some(g),
            Err(e) => {
                log::error!(
                    "Failed to start ticket generation for raffle {}: {e:?}",
                    published.id
                );
                None
            }
        };
        Ok(PublishRaffleResponse {
            raffle: published.into(),
            generation,
        })
    }

    /// 手动（重新）生成票号：active 或 paused 活动
    pub async fn generate_tickets(&self, ctx: &AuthContext, id: i64) -> AppResult<GenerationStart> {
        ctx.require_manager()?;
        let raffle = self.find_raffle_for(ctx, id).await?;
        if !matches!(raffle.status, RaffleStatus::Active | RaffleStatus::Paused) {
            return Err(AppError::Conflict(format!(
                "Tickets cannot be generated for a raffle in status {:?}",
                raffle.status
            )));
        }
        let start = self.jobs.start_generation(&raffle).await?;
        log::info!("Ticket generation requested for raffle {id} by user {}", ctx.user_id);
        Ok(start)
    }

    async fn transition(
        &self,
        ctx: &AuthContext,
        id: i64,
        next: RaffleStatus,
    ) -> AppResult<raffles::Model> {
        ctx.require_manager()?;
        let raffle = self.find_raffle_for(ctx, id).await?;
        if raffle.status == next {
            return Ok(raffle);
        }
        if !raffle.status.can_transition_to(next) {
            return Err(AppError::Conflict(format!(
                "Cannot change raffle from {:?} to {:?}",
                raffle.status, next
            )));
        }

        let txn = self.pool.begin().await?;
        let locked = raffles::Entity::find_by_id(id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::NotFound("Raffle not found".into()))?;
        if !locked.status.can_transition_to(next) {
            return Err(AppError::Conflict("Raffle status changed concurrently".into()));
        }
        if next == RaffleStatus::Active {
            let (_, limits) = load_limits(&txn, ctx.organization_id).await?;
            check_active_limit(self.count_active(&txn, ctx.organization_id).await?, &limits)?;
        }

        let now = Utc::now();
        if next == RaffleStatus::Canceled {
            let canceled =
                cancel_open_orders_for_raffle(&txn, id, "Raffle canceled", now).await?;
            let jobs = self.jobs.cancel_jobs_for_raffle(&txn, id).await?;
            log::info!("Raffle {id} canceled: {canceled} open orders canceled, {jobs} jobs stopped");
        }

        let mut am: raffles::ActiveModel = locked.into();
        am.status = Set(next);
        am.updated_at = Set(now);
        let updated = am.update(&txn).await?;
        txn.commit().await?;

        self.tickets.invalidate(id).await;
        log::info!(
            "Raffle {id} moved to {:?} by user {}",
            updated.status,
            ctx.user_id
        );
        Ok(updated)
    }

    pub async fn pause_raffle(&self, ctx: &AuthContext, id: i64) -> AppResult<RaffleResponse> {
        Ok(self.transition(ctx, id, RaffleStatus::Paused).await?.into())
    }

    /// 恢复同样受活动数上限约束
    pub async fn resume_raffle(&self, ctx: &AuthContext, id: i64) -> AppResult<RaffleResponse> {
        let raffle = self.find_raffle_for(ctx, id).await?;
        if raffle.status != RaffleStatus::Paused {
            return Err(AppError::Conflict("Only paused raffles can be resumed".into()));
        }
        Ok(self.transition(ctx, id, RaffleStatus::Active).await?.into())
    }

    pub async fn cancel_raffle(&self, ctx: &AuthContext, id: i64) -> AppResult<RaffleResponse> {
        Ok(self.transition(ctx, id, RaffleStatus::Canceled).await?.into())
    }

    /// 活动最近一次的票号生成任务
    pub async fn latest_generation(
        &self,
        ctx: &AuthContext,
        id: i64,
    ) -> AppResult<Option<crate::models::TicketJobResponse>> {
        self.find_raffle_for(ctx, id).await?;
        self.jobs.latest_job_for_raffle(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SubscriptionTier, get_subscription_limits};

    #[test]
    fn test_ticket_limit_by_tier() {
        let basic = get_subscription_limits(Some(SubscriptionTier::Basic));
        assert!(check_total_tickets(2_000, &basic).is_ok());
        assert!(matches!(
            check_total_tickets(2_001, &basic),
            Err(AppError::LimitExceeded(_))
        ));
        assert!(matches!(
            check_total_tickets(0, &basic),
            Err(AppError::ValidationError(_))
        ));
        let premium = get_subscription_limits(Some(SubscriptionTier::Premium));
        assert!(check_total_tickets(1_000_000, &premium).is_ok());
    }

    #[test]
    fn test_active_limit_counts_only_reaching_max() {
        let basic = get_subscription_limits(None);
        assert!(check_active_limit(1, &basic).is_ok());
        assert!(check_active_limit(2, &basic).is_err());
    }

    #[test]
    fn test_editable_states() {
        assert!(check_editable(RaffleStatus::Draft, true).is_ok());
        assert!(check_editable(RaffleStatus::Paused, false).is_ok());
        assert!(matches!(
            check_editable(RaffleStatus::Paused, true),
            Err(AppError::Conflict(_))
        ));
        // 已被并发发布的活动：锁内复查会拒绝
        assert!(check_editable(RaffleStatus::Active, false).is_err());
        assert!(check_editable(RaffleStatus::Active, true).is_err());
        assert!(check_editable(RaffleStatus::Completed, false).is_err());
    }

    #[test]
    fn test_field_checks() {
        assert!(check_title("  ").is_err());
        assert!(check_title("Rifa").is_ok());
        assert!(check_price(-1).is_err());
        assert!(check_price(MAX_AMOUNT_CENTS).is_ok());
        assert!(check_price(MAX_AMOUNT_CENTS + 1).is_err());
        assert_eq!(check_currency(" mxn ").unwrap(), "MXN");
        assert!(check_currency("PESOS").is_err());
        assert!(check_hold_settings(0, 10).is_err());
        assert!(check_hold_settings(15, 0).is_err());
        assert!(check_hold_settings(1440, 1).is_ok());
    }
}
