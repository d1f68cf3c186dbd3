use crate::entities::{
    OrderStatus, analytics_event_entity as events, notification_entity as notifications,
    order_entity as orders, organization_entity as organizations, raffle_entity as raffles,
};
use crate::error::{AppError, AppResult};
use crate::external::{EmailService, TelegramService};
use crate::models::{
    AuthContext, DigestSummary, ItemError, NotificationResponse, PaginatedResponse,
    PaginationParams, SubscriptionTier, get_subscription_limits, MAX_PAGE_SIZE,
};
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use std::collections::BTreeMap;

pub mod kinds {
    pub const PENDING_APPROVALS: &str = "pending_approvals";
    pub const RAFFLE_DRAWN: &str = "raffle_drawn";
    pub const DOMAIN_VERIFIED: &str = "domain_verified";
}

pub async fn create_notification<C: ConnectionTrait>(
    conn: &C,
    organization_id: i64,
    kind: &str,
    title: impl Into<String>,
    message: impl Into<String>,
    link: Option<String>,
) -> AppResult<notifications::Model> {
    let model = notifications::ActiveModel {
        organization_id: Set(organization_id),
        kind: Set(kind.to_string()),
        title: Set(title.into()),
        message: Set(message.into()),
        link: Set(link),
        read: Set(false),
        ..Default::default()
    }
    .insert(conn)
    .await?;
    Ok(model)
}

/// 记录分析事件
pub async fn record_event<C: ConnectionTrait>(
    conn: &C,
    organization_id: i64,
    raffle_id: Option<i64>,
    event_type: &str,
    payload: serde_json::Value,
) -> AppResult<()> {
    events::ActiveModel {
        id: Set(uuid::Uuid::new_v4()),
        organization_id: Set(organization_id),
        raffle_id: Set(raffle_id),
        event_type: Set(event_type.to_string()),
        payload: Set(payload),
        created_at: Set(Utc::now()),
    }
    .insert(conn)
    .await?;
    Ok(())
}

/// 某组织待审批订单汇总
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingGroup {
    pub organization_id: i64,
    pub order_count: usize,
    pub ticket_count: i64,
    /// (活动标题, 订单数)
    pub per_raffle: Vec<(String, usize)>,
}

/// 按组织分组待审批订单
pub fn group_pending(
    pending: &[orders::Model],
    raffle_titles: &BTreeMap<i64, String>,
) -> Vec<PendingGroup> {
    let mut by_org: BTreeMap<i64, BTreeMap<i64, (usize, i64)>> = BTreeMap::new();
    for o in pending {
        let entry = by_org
            .entry(o.organization_id)
            .or_default()
            .entry(o.raffle_id)
            .or_default();
        entry.0 += 1;
        entry.1 += o.ticket_count;
    }
    by_org
        .into_iter()
        .map(|(organization_id, raffles)| PendingGroup {
            organization_id,
            order_count: raffles.values().map(|(n, _)| n).sum(),
            ticket_count: raffles.values().map(|(_, t)| t).sum(),
            per_raffle: raffles
                .iter()
                .map(|(raffle_id, (n, _))| {
                    let title = raffle_titles
                        .get(raffle_id)
                        .cloned()
                        .unwrap_or_else(|| format!("Raffle #{raffle_id}"));
                    (title, *n)
                })
                .collect(),
        })
        .collect()
}

fn digest_text(group: &PendingGroup) -> String {
    let mut lines = vec![format!(
        "{} orders ({} tickets) are waiting for payment approval.",
        group.order_count, group.ticket_count
    )];
    for (title, n) in &group.per_raffle {
        lines.push(format!("- {title}: {n}"));
    }
    lines.join("\n")
}

#[derive(Clone)]
pub struct NotificationService {
    pool: DatabaseConnection,
    email: EmailService,
    telegram: TelegramService,
    public_base_url: String,
}

impl NotificationService {
    pub fn new(
        pool: DatabaseConnection,
        email: EmailService,
        telegram: TelegramService,
        public_base_url: String,
    ) -> Self {
        Self {
            pool,
            email,
            telegram,
            public_base_url,
        }
    }

    pub async fn list_notifications(
        &self,
        ctx: &AuthContext,
        page: Option<u32>,
        per_page: Option<u32>,
    ) -> AppResult<PaginatedResponse<NotificationResponse>> {
        let params = PaginationParams::new(page, per_page, MAX_PAGE_SIZE);
        let query = notifications::Entity::find()
            .filter(notifications::Column::OrganizationId.eq(ctx.organization_id));
        let total = query.clone().count(&self.pool).await? as i64;
        let items = query
            .order_by_desc(notifications::Column::CreatedAt)
            .offset(params.get_offset() as u64)
            .limit(params.get_limit() as u64)
            .all(&self.pool)
            .await?;
        Ok(PaginatedResponse::new(
            items.into_iter().map(NotificationResponse::from).collect(),
            params,
            total,
        ))
    }

    pub async fn mark_read(&self, ctx: &AuthContext, id: i64) -> AppResult<NotificationResponse> {
        let n = notifications::Entity::find_by_id(id)
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Notification not found".into()))?;
        ctx.ensure_same_org(n.organization_id, "Notification")?;
        if n.read {
            return Ok(n.into());
        }
        let mut am: notifications::ActiveModel = n.into();
        am.read = Set(true);
        Ok(am.update(&self.pool).await?.into())
    }

    pub async fn mark_all_read(&self, ctx: &AuthContext) -> AppResult<u64> {
        let res = notifications::Entity::update_many()
            .col_expr(notifications::Column::Read, Expr::value(true))
            .filter(notifications::Column::OrganizationId.eq(ctx.organization_id))
            .filter(notifications::Column::Read.eq(false))
            .exec(&self.pool)
            .await?;
        Ok(res.rows_affected)
    }

    /// 待审批订单提醒：站内通知 + 邮件，套餐允许时发 Telegram
    pub async fn notify_pending_approvals(&self) -> AppResult<DigestSummary> {
        let pending = orders::Entity::find()
            .filter(orders::Column::Status.eq(OrderStatus::Pending))
            .all(&self.pool)
            .await?;

        let mut summary = DigestSummary {
            organizations_notified: 0,
            pending_orders: pending.len(),
            emails_sent: 0,
            telegram_sent: 0,
            errors: Vec::new(),
        };
        if pending.is_empty() {
            return Ok(summary);
        }

        let raffle_ids: Vec<i64> = pending.iter().map(|o| o.raffle_id).collect();
        let raffle_titles: BTreeMap<i64, String> = raffles::Entity::find()
            .filter(raffles::Column::Id.is_in(raffle_ids))
            .all(&self.pool)
            .await?
            .into_iter()
            .map(|r| (r.id, r.title))
            .collect();

        for group in group_pending(&pending, &raffle_titles) {
            match self.deliver_digest(&group, &mut summary).await {
                Ok(()) => summary.organizations_notified += 1,
                Err(e) => {
                    log::warn!(
                        "Pending digest failed for organization {}: {e}",
                        group.organization_id
                    );
                    summary.errors.push(ItemError {
                        id: group.organization_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        log::info!(
            "Pending approval digest: {} orders across {} organizations, {} emails, {} telegram",
            summary.pending_orders,
            summary.organizations_notified,
            summary.emails_sent,
            summary.telegram_sent
        );
        Ok(summary)
    }

    async fn deliver_digest(&self, group: &PendingGroup, summary: &mut DigestSummary) -> AppResult<()> {
        let org = organizations::Entity::find_by_id(group.organization_id)
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Organization not found".into()))?;

        let title = format!("{} orders pending approval", group.order_count);
        let body = digest_text(group);
        let link = format!("{}/dashboard/orders?status=pending", self.public_base_url);
        create_notification(
            &self.pool,
            org.id,
            kinds::PENDING_APPROVALS,
            title.clone(),
            body.clone(),
            Some(link.clone()),
        )
        .await?;

        if self.email.is_enabled() {
            let html = format!(
                "<p>{}</p><p><a href=\"{link}\">Review orders</a></p>",
                body.replace('\n', "<br>")
            );
            match self.email.send(&org.email, &title, &html).await {
                Ok(()) => summary.emails_sent += 1,
                Err(e) => summary.errors.push(ItemError {
                    id: org.id,
                    error: format!("email: {e}"),
                }),
            }
        }

        let limits = get_subscription_limits(SubscriptionTier::from_column(
            org.subscription_tier.as_deref(),
        ));
        if limits.can_use_telegram
            && self.telegram.is_enabled()
            && let Some(chat_id) = org.telegram_chat_id.as_deref()
        {
            match self.telegram.send_message(chat_id, &format!("{title}\n{body}")).await {
                Ok(()) => summary.telegram_sent += 1,
                Err(e) => summary.errors.push(ItemError {
                    id: org.id,
                    error: format!("telegram: {e}"),
                }),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{LuckyIndices, TicketRanges};

    fn pending(id: i64, org: i64, raffle: i64, count: i64) -> orders::Model {
        let now = Utc::now();
        orders::Model {
            id,
            raffle_id: raffle,
            organization_id: org,
            buyer_name: "Ana".into(),
            buyer_email: "ana@example.com".into(),
            buyer_phone: None,
            buyer_city: None,
            ticket_ranges: TicketRanges::default(),
            lucky_indices: LuckyIndices::default(),
            ticket_count: count,
            reference_code: format!("REF{id}"),
            status: OrderStatus::Pending,
            reserved_until: None,
            order_total_cents: 0,
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
    fn test_group_pending_by_organization() {
        let titles = BTreeMap::from([(10, "Moto".to_string()), (11, "TV".to_string())]);
        let orders = vec![
            pending(1, 1, 10, 3),
            pending(2, 1, 10, 2),
            pending(3, 1, 11, 1),
            pending(4, 2, 12, 5),
        ];
        let groups = group_pending(&orders, &titles);
        assert_eq!(groups.len(), 2);

        assert_eq!(groups[0].organization_id, 1);
        assert_eq!(groups[0].order_count, 3);
        assert_eq!(groups[0].ticket_count, 6);
        assert_eq!(
            groups[0].per_raffle,
            vec![("Moto".to_string(), 2), ("TV".to_string(), 1)]
        );

        assert_eq!(groups[1].per_raffle, vec![("Raffle #12".to_string(), 1)]);
        let text = digest_text(&groups[1]);
        assert!(text.starts_with("1 orders (5 tickets)"));
        assert!(text.contains("- Raffle #12: 1"));
    }
}
