use crate::config::DomainProviderConfig;
use crate::entities::custom_domain_entity as domains;
use crate::error::{AppError, AppResult};
use crate::external::{DohResolver, DomainRegistrar, RecordType};
use crate::models::{
    AddDomainRequest, AuthContext, CustomDomainResponse, DnsDiagnostics, ProviderDiagnostics,
};
use crate::services::notification_service::{create_notification, kinds};
use crate::services::organization_service::load_limits;
use crate::utils::{normalize_domain, validate_domain};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use std::future::Future;
use std::sync::Arc;

/// 添加域名流程的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SagaState {
    Started,
    /// 已在服务商处登记
    Registered,
    /// 本地记录已写入
    Committed,
    /// 服务商登记失败，未做任何变更
    Aborted,
    /// 本地写入失败，已从服务商撤销
    Compensated,
    /// 撤销也失败，服务商处残留域名需人工处理
    CompensationFailed,
}

pub struct SagaRun<T> {
    pub trail: Vec<SagaState>,
    pub outcome: AppResult<T>,
}

impl<T> SagaRun<T> {
    pub fn final_state(&self) -> Option<SagaState> {
        self.trail.last().copied()
    }
}

/// 服务商登记 → 本地持久化；持久化失败时撤销登记
pub async fn run_add_domain_saga<T, F, Fut>(
    registrar: &dyn DomainRegistrar,
    domain: &str,
    persist: F,
) -> SagaRun<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let mut trail = vec![SagaState::Started];

    if let Err(e) = registrar.add_domain(domain).await {
        trail.push(SagaState::Aborted);
        return SagaRun {
            trail,
            outcome: Err(e),
        };
    }
    trail.push(SagaState::Registered);

    match persist().await {
        Ok(value) => {
            trail.push(SagaState::Committed);
            SagaRun {
                trail,
                outcome: Ok(value),
            }
        }
        Err(e) => {
            match registrar.remove_domain(domain).await {
                Ok(()) => trail.push(SagaState::Compensated),
                Err(comp_err) => {
                    log::error!(
                        "Compensation failed for domain {domain}, manual cleanup required: {comp_err}"
                    );
                    trail.push(SagaState::CompensationFailed);
                }
            }
            SagaRun {
                trail,
                outcome: Err(e),
            }
        }
    }
}

/// 根据解析结果生成诊断
pub fn diagnose(
    domain: &str,
    a_records: Vec<String>,
    cname_records: Vec<String>,
    expected_a: &str,
    expected_cname: &str,
    now: DateTime<Utc>,
) -> DnsDiagnostics {
    let expected_cname = expected_cname.trim_end_matches('.').to_ascii_lowercase();
    let points_to_expected_a = a_records.iter().any(|r| r == expected_a);
    let points_to_expected_cname = cname_records.iter().any(|r| *r == expected_cname);
    let verified = points_to_expected_a || points_to_expected_cname;
    let propagated = verified && a_records.iter().all(|r| r == expected_a);
    DnsDiagnostics {
        domain: domain.to_string(),
        a_records,
        cname_records,
        expected_a: expected_a.to_string(),
        expected_cname,
        points_to_expected_a,
        points_to_expected_cname,
        propagated,
        verified,
        checked_at: now,
    }
}

#[derive(Clone)]
pub struct DomainService {
    pool: DatabaseConnection,
    registrar: Arc<dyn DomainRegistrar>,
    resolver: DohResolver,
    expected_a: String,
    expected_cname: String,
}

impl DomainService {
    pub fn new(
        pool: DatabaseConnection,
        registrar: Arc<dyn DomainRegistrar>,
        resolver: DohResolver,
        cfg: &DomainProviderConfig,
    ) -> Self {
        Self {
            pool,
            registrar,
            resolver,
            expected_a: cfg.expected_a_record.clone(),
            expected_cname: cfg.expected_cname.clone(),
        }
    }

    async fn find_domain_for(&self, ctx: &AuthContext, id: i64) -> AppResult<domains::Model> {
        let d = domains::Entity::find_by_id(id)
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Domain not found".into()))?;
        ctx.ensure_same_org(d.organization_id, "Domain")?;
        Ok(d)
    }

    pub async fn list_domains(&self, ctx: &AuthContext) -> AppResult<Vec<CustomDomainResponse>> {
        let list = domains::Entity::find()
            .filter(domains::Column::OrganizationId.eq(ctx.organization_id))
            .order_by_asc(domains::Column::CreatedAt)
            .all(&self.pool)
            .await?;
        Ok(list.into_iter().map(CustomDomainResponse::from).collect())
    }

    pub async fn add_domain(
        &self,
        ctx: &AuthContext,
        req: AddDomainRequest,
    ) -> AppResult<CustomDomainResponse> {
        ctx.require_manager()?;
        let domain = normalize_domain(&req.domain);
        validate_domain(&domain)?;

        let (_, limits) = load_limits(&self.pool, ctx.organization_id).await?;
        if !limits.can_have_custom_domain {
            return Err(AppError::LimitExceeded(
                "Custom domains are not available on your plan".into(),
            ));
        }
        let taken = domains::Entity::find()
            .filter(domains::Column::Domain.eq(domain.as_str()))
            .count(&self.pool)
            .await?;
        if taken > 0 {
            return Err(AppError::Conflict(format!("Domain {domain} is already in use")));
        }

        let org_id = ctx.organization_id;
        let run = run_add_domain_saga(self.registrar.as_ref(), &domain, || async {
            let model = domains::ActiveModel {
                organization_id: Set(org_id),
                domain: Set(domain.clone()),
                verified: Set(false),
                ..Default::default()
            }
            .insert(&self.pool)
            .await?;
            Ok::<_, AppError>(model)
        })
        .await;

        log::info!(
            "Add domain {domain} for organization {org_id}: {:?}",
            run.trail
        );
        Ok(run.outcome?.into())
    }

    /// 先在事务中删除记录，服务商移除成功后才提交
    pub async fn remove_domain(&self, ctx: &AuthContext, id: i64) -> AppResult<()> {
        ctx.require_manager()?;
        let d = self.find_domain_for(ctx, id).await?;

        let txn = self.pool.begin().await?;
        domains::Entity::delete_by_id(d.id).exec(&txn).await?;
        self.registrar.remove_domain(&d.domain).await?;
        txn.commit().await?;

        log::info!(
            "Domain {} removed from organization {}",
            d.domain,
            d.organization_id
        );
        Ok(())
    }

    pub async fn verify_domain(&self, ctx: &AuthContext, id: i64) -> AppResult<DnsDiagnostics> {
        let d = self.find_domain_for(ctx, id).await?;
        let a_records = self.resolver.resolve(&d.domain, RecordType::A).await?;
        let cname_records = self.resolver.resolve(&d.domain, RecordType::Cname).await?;
        let now = Utc::now();
        let diag = diagnose(
            &d.domain,
            a_records,
            cname_records,
            &self.expected_a,
            &self.expected_cname,
            now,
        );

        let newly_verified = diag.verified && !d.verified;
        let mut am: domains::ActiveModel = d.clone().into();
        am.verified = Set(diag.verified);
        if newly_verified {
            am.verified_at = Set(Some(now));
        }
        am.last_checked_at = Set(Some(now));
        am.last_diagnostics = Set(Some(serde_json::to_value(&diag)?));
        am.updated_at = Set(now);
        am.update(&self.pool).await?;

        if newly_verified {
            log::info!("Domain {} verified", d.domain);
            if let Err(e) = create_notification(
                &self.pool,
                d.organization_id,
                kinds::DOMAIN_VERIFIED,
                format!("{} is ready", d.domain),
                format!("DNS for {} now points to your raffle pages.", d.domain),
                None,
            )
            .await
            {
                log::warn!("Failed to create domain notification: {e}");
            }
        }
        Ok(diag)
    }

    pub async fn diagnose_provider_access(&self, ctx: &AuthContext) -> AppResult<ProviderDiagnostics> {
        ctx.require_manager()?;
        Ok(self.registrar.diagnose_access().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeRegistrar {
        fail_add: bool,
        fail_remove: bool,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl DomainRegistrar for FakeRegistrar {
        async fn add_domain(&self, domain: &str) -> AppResult<()> {
            self.calls.lock().unwrap().push(format!("add {domain}"));
            if self.fail_add {
                return Err(AppError::ExternalApiError("add failed".into()));
            }
            Ok(())
        }

        async fn remove_domain(&self, domain: &str) -> AppResult<()> {
            self.calls.lock().unwrap().push(format!("remove {domain}"));
            if self.fail_remove {
                return Err(AppError::ExternalApiError("remove failed".into()));
            }
            Ok(())
        }

        async fn diagnose_access(&self) -> ProviderDiagnostics {
            ProviderDiagnostics {
                token_configured: true,
                project_configured: true,
                project_reachable: true,
                project_name: Some("fake".into()),
                error: None,
            }
        }
    }

    #[tokio::test]
    async fn test_saga_commits_when_persist_succeeds() {
        let reg = FakeRegistrar::default();
        let run = run_add_domain_saga(&reg, "rifas.example.com", || async { Ok(42) }).await;
        assert_eq!(run.outcome.unwrap(), 42);
        assert_eq!(
            run.trail,
            vec![SagaState::Started, SagaState::Registered, SagaState::Committed]
        );
        assert_eq!(*reg.calls.lock().unwrap(), vec!["add rifas.example.com"]);
    }

    #[tokio::test]
    async fn test_saga_compensates_on_persist_failure() {
        let reg = FakeRegistrar::default();
        let run = run_add_domain_saga(&reg, "rifas.example.com", || async {
            Err::<(), _>(AppError::InternalError("insert failed".into()))
        })
        .await;
        assert!(run.outcome.is_err());
        assert_eq!(run.final_state(), Some(SagaState::Compensated));
        assert_eq!(
            *reg.calls.lock().unwrap(),
            vec!["add rifas.example.com", "remove rifas.example.com"]
        );
    }

    #[tokio::test]
    async fn test_saga_reports_failed_compensation() {
        let reg = FakeRegistrar {
            fail_remove: true,
            ..Default::default()
        };
        let run = run_add_domain_saga(&reg, "rifas.example.com", || async {
            Err::<(), _>(AppError::InternalError("insert failed".into()))
        })
        .await;
        assert!(matches!(run.outcome, Err(AppError::InternalError(_))));
        assert_eq!(run.final_state(), Some(SagaState::CompensationFailed));
    }

    #[tokio::test]
    async fn test_saga_aborts_without_persist_when_registration_fails() {
        let reg = FakeRegistrar {
            fail_add: true,
            ..Default::default()
        };
        let mut persisted = false;
        let run = run_add_domain_saga(&reg, "rifas.example.com", || {
            persisted = true;
            async { Ok(()) }
        })
        .await;
        assert!(run.outcome.is_err());
        assert!(!persisted);
        assert_eq!(run.trail, vec![SagaState::Started, SagaState::Aborted]);
    }

    #[test]
    fn test_diagnose_records() {
        let now = Utc::now();
        let ok = diagnose(
            "rifas.example.com",
            vec!["76.76.21.21".into()],
            vec![],
            "76.76.21.21",
            "cname.vercel-dns.com",
            now,
        );
        assert!(ok.verified && ok.propagated && ok.points_to_expected_a);

        let partial = diagnose(
            "rifas.example.com",
            vec!["76.76.21.21".into(), "10.0.0.1".into()],
            vec![],
            "76.76.21.21",
            "cname.vercel-dns.com",
            now,
        );
        assert!(partial.verified);
        assert!(!partial.propagated);

        let cname = diagnose(
            "www.example.com",
            vec![],
            vec!["cname.vercel-dns.com".into()],
            "76.76.21.21",
            "CNAME.vercel-dns.com.",
            now,
        );
        assert!(cname.points_to_expected_cname && cname.verified);

        let none = diagnose("x.example.com", vec![], vec![], "76.76.21.21", "cname.vercel-dns.com", now);
        assert!(!none.verified && !none.propagated);
    }
}
