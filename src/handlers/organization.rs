use actix_web::{web, HttpRequest, HttpResponse, Result, ResponseError};
use crate::middlewares::auth_context;
use crate::models::*;
use crate::services::OrganizationService;

#[utoipa::path(
    get,
    path = "/organization",
    tag = "organization",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "当前组织", body = OrganizationResponse))
)]
pub async fn get_organization(
    organization_service: web::Data<OrganizationService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let ctx = auth_context(&req)?;
    match organization_service.get_organization(&ctx).await {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    put,
    path = "/organization",
    tag = "organization",
    request_body = UpdateOrganizationRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "更新成功", body = OrganizationResponse),
        (status = 403, description = "无权限")
    )
)]
pub async fn update_organization(
    organization_service: web::Data<OrganizationService>,
    req: HttpRequest,
    request: web::Json<UpdateOrganizationRequest>,
) -> Result<HttpResponse> {
    let ctx = auth_context(&req)?;
    match organization_service
        .update_organization(&ctx, request.into_inner())
        .await
    {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/organization/limits",
    tag = "organization",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "套餐限制与当前用量", body = OrganizationLimitsResponse))
)]
pub async fn get_limits(
    organization_service: web::Data<OrganizationService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let ctx = auth_context(&req)?;
    match organization_service.get_limits(&ctx).await {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    delete,
    path = "/organization",
    tag = "organization",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "组织及其数据已删除", body = DeleteOrganizationSummary),
        (status = 403, description = "仅 owner 可删除")
    )
)]
pub async fn delete_organization(
    organization_service: web::Data<OrganizationService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let ctx = auth_context(&req)?;
    match organization_service.delete_organization(&ctx).await {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn organization_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/organization")
            .route("", web::get().to(get_organization))
            .route("", web::put().to(update_organization))
            .route("", web::delete().to(delete_organization))
            .route("/limits", web::get().to(get_limits)),
    );
}
