use crate::entities::custom_domain_entity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddDomainRequest {
    #[schema(example = "sorteos.mi-negocio.mx")]
    pub domain: String,
}

/// DNS 诊断结果（前端用于展示诊断弹窗）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DnsDiagnostics {
    pub domain: String,
    pub a_records: Vec<String>,
    pub cname_records: Vec<String>,
    pub expected_a: String,
    pub expected_cname: String,
    pub points_to_expected_a: bool,
    pub points_to_expected_cname: bool,
    /// 全部 A 记录都已指向目标 IP
    pub propagated: bool,
    pub verified: bool,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CustomDomainResponse {
    pub id: i64,
    pub domain: String,
    pub verified: bool,
    pub verified_at: Option<DateTime<Utc>>,
    pub last_checked_at: Option<DateTime<Utc>>,
    #[schema(value_type = Option<Object>)]
    pub last_diagnostics: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl From<custom_domain_entity::Model> for CustomDomainResponse {
    fn from(m: custom_domain_entity::Model) -> Self {
        Self {
            id: m.id,
            domain: m.domain,
            verified: m.verified,
            verified_at: m.verified_at,
            last_checked_at: m.last_checked_at,
            last_diagnostics: m.last_diagnostics,
            created_at: m.created_at,
        }
    }
}

/// 域名服务商访问自检
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProviderDiagnostics {
    pub token_configured: bool,
    pub project_configured: bool,
    pub project_reachable: bool,
    pub project_name: Option<String>,
    pub error: Option<String>,
}
