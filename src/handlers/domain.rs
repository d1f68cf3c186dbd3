use actix_web::{web, HttpRequest, HttpResponse, Result, ResponseError};
use crate::middlewares::auth_context;
use crate::models::*;
use crate::services::DomainService;

#[utoipa::path(
    get,
    path = "/domains",
    tag = "domain",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "自定义域名列表"))
)]
pub async fn list_domains(
    domain_service: web::Data<DomainService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let ctx = auth_context(&req)?;
    match domain_service.list_domains(&ctx).await {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/domains",
    tag = "domain",
    request_body = AddDomainRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "已在服务商登记并保存", body = CustomDomainResponse),
        (status = 400, description = "域名格式错误"),
        (status = 402, description = "超出套餐域名数量"),
        (status = 502, description = "域名服务商调用失败")
    )
)]
pub async fn add_domain(
    domain_service: web::Data<DomainService>,
    req: HttpRequest,
    request: web::Json<AddDomainRequest>,
) -> Result<HttpResponse> {
    let ctx = auth_context(&req)?;
    match domain_service.add_domain(&ctx, request.into_inner()).await {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    delete,
    path = "/domains/{id}",
    tag = "domain",
    params(("id" = i64, Path, description = "域名ID")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "已删除"),
        (status = 502, description = "域名服务商调用失败，记录保留")
    )
)]
pub async fn remove_domain(
    domain_service: web::Data<DomainService>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let ctx = auth_context(&req)?;
    match domain_service.remove_domain(&ctx, path.into_inner()).await {
        Ok(()) => Ok(HttpResponse::Ok().json(ApiResponse::message("Domain removed"))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/domains/{id}/verify",
    tag = "domain",
    params(("id" = i64, Path, description = "域名ID")),
    security(("bearer_auth" = [])),
    responses((status = 200, description = "DNS 诊断结果", body = DnsDiagnostics))
)]
pub async fn verify_domain(
    domain_service: web::Data<DomainService>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let ctx = auth_context(&req)?;
    match domain_service.verify_domain(&ctx, path.into_inner()).await {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/domains/provider/diagnose",
    tag = "domain",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "域名服务商访问诊断", body = ProviderDiagnostics))
)]
pub async fn diagnose_provider(
    domain_service: web::Data<DomainService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let ctx = auth_context(&req)?;
    match domain_service.diagnose_provider_access(&ctx).await {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn domain_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/domains")
            .route("", web::get().to(list_domains))
            .route("", web::post().to(add_domain))
            .route("/provider/diagnose", web::get().to(diagnose_provider))
            .route("/{id}", web::delete().to(remove_domain))
            .route("/{id}/verify", web::post().to(verify_domain)),
    );
}
