use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// 订阅套餐
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionTier {
    Basic,
    Pro,
    Premium,
}

impl SubscriptionTier {
    /// 未知字符串返回 None（按 basic 处理）
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "basic" => Some(SubscriptionTier::Basic),
            "pro" => Some(SubscriptionTier::Pro),
            "premium" => Some(SubscriptionTier::Premium),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionTier::Basic => "basic",
            SubscriptionTier::Pro => "pro",
            SubscriptionTier::Premium => "premium",
        }
    }

    /// 组织记录中的可空字段
    pub fn from_column(value: Option<&str>) -> Option<Self> {
        value.and_then(Self::parse)
    }
}

/// 套餐限制
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct SubscriptionLimits {
    pub max_active_raffles: i64,
    pub max_tickets_per_raffle: i64,
    pub templates_available: i32,
    pub can_have_custom_domain: bool,
    pub can_use_advanced_analytics: bool,
    pub can_use_telegram: bool,
}

const BASIC_LIMITS: SubscriptionLimits = SubscriptionLimits {
    max_active_raffles: 2,
    max_tickets_per_raffle: 2_000,
    templates_available: 1,
    can_have_custom_domain: false,
    can_use_advanced_analytics: false,
    can_use_telegram: false,
};

const PRO_LIMITS: SubscriptionLimits = SubscriptionLimits {
    max_active_raffles: 15,
    max_tickets_per_raffle: 30_000,
    templates_available: 3,
    can_have_custom_domain: true,
    can_use_advanced_analytics: false,
    can_use_telegram: true,
};

const PREMIUM_LIMITS: SubscriptionLimits = SubscriptionLimits {
    max_active_raffles: 999,
    max_tickets_per_raffle: 10_000_000,
    templates_available: 6,
    can_have_custom_domain: true,
    can_use_advanced_analytics: true,
    can_use_telegram: true,
};

/// 套餐 -> 限制。None 视为 basic。
pub fn get_subscription_limits(tier: Option<SubscriptionTier>) -> SubscriptionLimits {
    match tier {
        Some(SubscriptionTier::Premium) => PREMIUM_LIMITS,
        Some(SubscriptionTier::Pro) => PRO_LIMITS,
        Some(SubscriptionTier::Basic) | None => BASIC_LIMITS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_limits_per_tier() {
        let basic = get_subscription_limits(Some(SubscriptionTier::Basic));
        assert_eq!(basic.max_active_raffles, 2);
        assert_eq!(basic.max_tickets_per_raffle, 2_000);

        let pro = get_subscription_limits(Some(SubscriptionTier::Pro));
        assert_eq!(pro.max_active_raffles, 15);
        assert_eq!(pro.max_tickets_per_raffle, 30_000);
        assert!(pro.can_have_custom_domain);
        assert!(!pro.can_use_advanced_analytics);

        let premium = get_subscription_limits(Some(SubscriptionTier::Premium));
        assert_eq!(premium.max_active_raffles, 999);
        assert_eq!(premium.max_tickets_per_raffle, 10_000_000);
        assert!(premium.can_use_advanced_analytics);
    }

    #[test]
    fn test_missing_or_unknown_tier_defaults_to_basic() {
        assert_eq!(get_subscription_limits(None), BASIC_LIMITS);
        assert_eq!(
            get_subscription_limits(SubscriptionTier::from_column(Some("enterprise"))),
            BASIC_LIMITS
        );
        assert_eq!(
            get_subscription_limits(SubscriptionTier::from_column(None)),
            BASIC_LIMITS
        );
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(SubscriptionTier::parse(" PRO "), Some(SubscriptionTier::Pro));
        assert_eq!(SubscriptionTier::parse("Premium"), Some(SubscriptionTier::Premium));
        assert_eq!(SubscriptionTier::parse(""), None);
    }

    #[test]
    fn test_limits_grow_with_tier() {
        let tiers = [
            SubscriptionTier::Basic,
            SubscriptionTier::Pro,
            SubscriptionTier::Premium,
        ];
        for pair in tiers.windows(2) {
            let lo = get_subscription_limits(Some(pair[0]));
            let hi = get_subscription_limits(Some(pair[1]));
            assert!(hi.max_active_raffles > lo.max_active_raffles);
            assert!(hi.max_tickets_per_raffle > lo.max_tickets_per_raffle);
            assert!(hi.templates_available > lo.templates_available);
        }
    }
}
