use crate::entities::{
    RaffleStatus, analytics_event_entity as events, coupon_entity as coupons,
    custom_domain_entity as domains, notification_entity as notifications,
    order_entity as orders, organization_entity as organizations, raffle_entity as raffles,
    ticket_entity as tickets, ticket_job_entity as jobs, user_entity as users,
};
use crate::error::{AppError, AppResult};
use crate::external::DomainRegistrar;
use crate::models::{
    AuthContext, DeleteOrganizationSummary, OrganizationLimitsResponse, OrganizationResponse,
    SubscriptionLimits, SubscriptionTier, UpdateOrganizationRequest, get_subscription_limits,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, Set, TransactionTrait,
};
use std::sync::Arc;

/// 读取组织及其套餐限制
pub async fn load_limits<C: ConnectionTrait>(
    conn: &C,
    organization_id: i64,
) -> AppResult<(organizations::Model, SubscriptionLimits)> {
    let org = organizations::Entity::find_by_id(organization_id)
        .one(conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Organization not found".into()))?;
    let limits = get_subscription_limits(SubscriptionTier::from_column(
        org.subscription_tier.as_deref(),
    ));
    Ok((org, limits))
}

#[derive(Clone)]
pub struct OrganizationService {
    pool: DatabaseConnection,
    registrar: Arc<dyn DomainRegistrar>,
}

impl OrganizationService {
    pub fn new(pool: DatabaseConnection, registrar: Arc<dyn DomainRegistrar>) -> Self {
        Self { pool, registrar }
    }

    pub async fn get_organization(&self, ctx: &AuthContext) -> AppResult<OrganizationResponse> {
        let (org, _) = load_limits(&self.pool, ctx.organization_id).await?;
        Ok(org.into())
    }

    pub async fn update_organization(
        &self,
        ctx: &AuthContext,
        req: UpdateOrganizationRequest,
    ) -> AppResult<OrganizationResponse> {
        ctx.require_manager()?;
        let (org, _) = load_limits(&self.pool, ctx.organization_id).await?;
        let mut am: organizations::ActiveModel = org.into();

        if let Some(name) = req.name {
            let name = name.trim();
            if name.is_empty() || name.chars().count() > 120 {
                return Err(AppError::ValidationError(
                    "Organization name must be between 1 and 120 characters".into(),
                ));
            }
            am.name = Set(name.to_string());
        }
        if let Some(chat_id) = req.telegram_chat_id {
            let chat_id = chat_id.trim();
            am.telegram_chat_id = Set(if chat_id.is_empty() {
                None
            } else {
                Some(chat_id.to_string())
            });
        }
        am.updated_at = Set(Utc::now());
        Ok(am.update(&self.pool).await?.into())
    }

    pub async fn get_limits(&self, ctx: &AuthContext) -> AppResult<OrganizationLimitsResponse> {
        let (org, limits) = load_limits(&self.pool, ctx.organization_id).await?;
        let active_raffles = raffles::Entity::find()
            .filter(raffles::Column::OrganizationId.eq(org.id))
            .filter(raffles::Column::Status.eq(RaffleStatus::Active))
            .count(&self.pool)
            .await? as i64;
        let custom_domains = domains::Entity::find()
            .filter(domains::Column::OrganizationId.eq(org.id))
            .count(&self.pool)
            .await? as i64;
        Ok(OrganizationLimitsResponse {
            tier: SubscriptionTier::from_column(org.subscription_tier.as_deref())
                .unwrap_or(SubscriptionTier::Basic),
            limits,
            active_raffles,
            custom_domains,
        })
    }

    /// 删除组织：先从域名服务商移除自定义域名（失败记录但不阻断），再级联删除数据
    pub async fn delete_organization(&self, ctx: &AuthContext) -> AppResult<DeleteOrganizationSummary> {
        ctx.require_owner()?;
        let org_id = ctx.organization_id;
        let (org, _) = load_limits(&self.pool, org_id).await?;

        let org_domains = domains::Entity::find()
            .filter(domains::Column::OrganizationId.eq(org_id))
            .all(&self.pool)
            .await?;
        let mut summary = DeleteOrganizationSummary {
            organization_id: org_id,
            domains_removed: Vec::new(),
            errors: Vec::new(),
        };
        for d in org_domains {
            match self.registrar.remove_domain(&d.domain).await {
                Ok(()) => summary.domains_removed.push(d.domain),
                Err(e) => {
                    log::warn!("Failed to remove domain {} for organization {org_id}: {e}", d.domain);
                    summary.errors.push(format!("{}: {e}", d.domain));
                }
            }
        }

        let raffle_ids: Vec<i64> = raffles::Entity::find()
            .filter(raffles::Column::OrganizationId.eq(org_id))
            .all(&self.pool)
            .await?
            .into_iter()
            .map(|r| r.id)
            .collect();

        let txn = self.pool.begin().await?;
        events::Entity::delete_many()
            .filter(events::Column::OrganizationId.eq(org_id))
            .exec(&txn)
            .await?;
        notifications::Entity::delete_many()
            .filter(notifications::Column::OrganizationId.eq(org_id))
            .exec(&txn)
            .await?;
        domains::Entity::delete_many()
            .filter(domains::Column::OrganizationId.eq(org_id))
            .exec(&txn)
            .await?;
        if !raffle_ids.is_empty() {
            tickets::Entity::delete_many()
                .filter(tickets::Column::RaffleId.is_in(raffle_ids.clone()))
                .exec(&txn)
                .await?;
            jobs::Entity::delete_many()
                .filter(jobs::Column::RaffleId.is_in(raffle_ids))
                .exec(&txn)
                .await?;
        }
        orders::Entity::delete_many()
            .filter(orders::Column::OrganizationId.eq(org_id))
            .exec(&txn)
            .await?;
        coupons::Entity::delete_many()
            .filter(coupons::Column::OrganizationId.eq(org_id))
            .exec(&txn)
            .await?;
        raffles::Entity::delete_many()
            .filter(raffles::Column::OrganizationId.eq(org_id))
            .exec(&txn)
            .await?;
        users::Entity::delete_many()
            .filter(users::Column::OrganizationId.eq(org_id))
            .exec(&txn)
            .await?;
        organizations::Entity::delete_by_id(org.id).exec(&txn).await?;
        txn.commit().await?;

        log::info!(
            "Organization {org_id} deleted by user {} ({} domains removed, {} errors)",
            ctx.user_id,
            summary.domains_removed.len(),
            summary.errors.len()
        );
        Ok(summary)
    }
}
