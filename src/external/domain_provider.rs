use crate::config::DomainProviderConfig;
use crate::error::{AppError, AppResult};
use crate::models::ProviderDiagnostics;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

/// 外部托管平台上的域名绑定
#[async_trait]
pub trait DomainRegistrar: Send + Sync {
    async fn add_domain(&self, domain: &str) -> AppResult<()>;

    /// 域名不存在时视为成功
    async fn remove_domain(&self, domain: &str) -> AppResult<()>;

    async fn diagnose_access(&self) -> ProviderDiagnostics;
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    error: Option<ProviderError>,
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProjectBody {
    name: Option<String>,
}

/// Vercel 风格的项目域名 API
#[derive(Clone)]
pub struct HttpDomainProvider {
    http: Client,
    cfg: DomainProviderConfig,
}

impl HttpDomainProvider {
    pub fn new(cfg: DomainProviderConfig) -> Self {
        let http = Client::builder()
            .user_agent("sorteos-backend/domains")
            .timeout(Duration::from_secs(20))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { http, cfg }
    }

    pub fn is_enabled(&self) -> bool {
        !self.cfg.api_token.is_empty() && !self.cfg.project_id.is_empty()
    }

    fn url(&self, path: &str) -> String {
        let base = self.cfg.api_base.trim_end_matches('/');
        match &self.cfg.team_id {
            Some(team) if !team.is_empty() => format!("{base}{path}?teamId={team}"),
            _ => format!("{base}{path}"),
        }
    }

    fn ensure_enabled(&self) -> AppResult<()> {
        if self.is_enabled() {
            Ok(())
        } else {
            Err(AppError::ConfigError(
                "Domain provider token or project id not configured".into(),
            ))
        }
    }

    async fn error_from(resp: reqwest::Response, action: &str) -> AppError {
        let status = resp.status().as_u16();
        let detail = match resp.json::<ProviderErrorBody>().await {
            Ok(ProviderErrorBody {
                error: Some(ProviderError { code, message }),
            }) => format!(
                "{}: {}",
                code.unwrap_or_default(),
                message.unwrap_or_default()
            ),
            _ => "unknown error".to_string(),
        };
        AppError::ExternalApiError(format!("Domain provider {action} failed: HTTP {status}: {detail}"))
    }
}

#[async_trait]
impl DomainRegistrar for HttpDomainProvider {
    async fn add_domain(&self, domain: &str) -> AppResult<()> {
        self.ensure_enabled()?;
        let url = self.url(&format!("/v10/projects/{}/domains", self.cfg.project_id));
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.cfg.api_token)
            .json(&serde_json::json!({ "name": domain }))
            .send()
            .await?;

        if resp.status().is_success() {
            log::info!("Domain {domain} registered with provider");
            return Ok(());
        }
        Err(Self::error_from(resp, "add domain").await)
    }

    async fn remove_domain(&self, domain: &str) -> AppResult<()> {
        self.ensure_enabled()?;
        let url = self.url(&format!(
            "/v9/projects/{}/domains/{domain}",
            self.cfg.project_id
        ));
        let resp = self
            .http
            .delete(&url)
            .bearer_auth(&self.cfg.api_token)
            .send()
            .await?;

        if resp.status().is_success() || resp.status() == StatusCode::NOT_FOUND {
            log::info!("Domain {domain} removed from provider");
            return Ok(());
        }
        Err(Self::error_from(resp, "remove domain").await)
    }

    async fn diagnose_access(&self) -> ProviderDiagnostics {
        let mut diag = ProviderDiagnostics {
            token_configured: !self.cfg.api_token.is_empty(),
            project_configured: !self.cfg.project_id.is_empty(),
            project_reachable: false,
            project_name: None,
            error: None,
        };
        if !self.is_enabled() {
            diag.error = Some("Provider token or project id missing".into());
            return diag;
        }

        let url = self.url(&format!("/v9/projects/{}", self.cfg.project_id));
        let resp = match self
            .http
            .get(&url)
            .bearer_auth(&self.cfg.api_token)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                diag.error = Some(format!("Request failed: {e}"));
                return diag;
            }
        };

        if resp.status().is_success() {
            diag.project_reachable = true;
            diag.project_name = resp.json::<ProjectBody>().await.ok().and_then(|p| p.name);
        } else {
            diag.error = Some(Self::error_from(resp, "project lookup").await.to_string());
        }
        diag
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(team: Option<&str>) -> HttpDomainProvider {
        HttpDomainProvider::new(DomainProviderConfig {
            api_base: "https://api.example.com/".into(),
            api_token: "tok".into(),
            project_id: "prj_1".into(),
            team_id: team.map(str::to_string),
            ..DomainProviderConfig::default()
        })
    }

    #[test]
    fn test_url_includes_team_when_set() {
        assert_eq!(
            provider(None).url("/v9/projects/prj_1"),
            "https://api.example.com/v9/projects/prj_1"
        );
        assert_eq!(
            provider(Some("team_9")).url("/v9/projects/prj_1"),
            "https://api.example.com/v9/projects/prj_1?teamId=team_9"
        );
    }

    #[tokio::test]
    async fn test_unconfigured_provider_reports_missing_settings() {
        let p = HttpDomainProvider::new(DomainProviderConfig::default());
        assert!(!p.is_enabled());
        let diag = p.diagnose_access().await;
        assert!(!diag.token_configured);
        assert!(!diag.project_reachable);
        assert!(diag.error.is_some());
        assert!(p.add_domain("example.com").await.is_err());
    }
}
