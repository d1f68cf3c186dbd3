use crate::entities::organization_entity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{SubscriptionLimits, SubscriptionTier};

#[derive(Debug, Serialize, ToSchema)]
pub struct OrganizationResponse {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub email: String,
    /// 未设置时按 basic 处理
    pub subscription_tier: Option<SubscriptionTier>,
    pub telegram_chat_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<organization_entity::Model> for OrganizationResponse {
    fn from(m: organization_entity::Model) -> Self {
        Self {
            id: m.id,
            name: m.name,
            slug: m.slug,
            email: m.email,
            subscription_tier: SubscriptionTier::from_column(m.subscription_tier.as_deref()),
            telegram_chat_id: m.telegram_chat_id,
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateOrganizationRequest {
    pub name: Option<String>,
    /// 空字符串表示解除 Telegram 绑定
    pub telegram_chat_id: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrganizationLimitsResponse {
    pub tier: SubscriptionTier,
    pub limits: SubscriptionLimits,
    pub active_raffles: i64,
    pub custom_domains: i64,
}

/// 删除组织的结果；外部域名移除失败不阻断删除
#[derive(Debug, Serialize, ToSchema)]
pub struct DeleteOrganizationSummary {
    pub organization_id: i64,
    pub domains_removed: Vec<String>,
    pub errors: Vec<String>,
}
