use actix_web::{web, HttpRequest, HttpResponse, Result, ResponseError};
use chrono::Utc;
use crate::middlewares::auth_context;
use crate::models::*;
use crate::services::{DrawService, NotificationService, OrderService};

// 手动触发后台任务；任务本身幂等，与定时循环并发执行也安全

#[utoipa::path(
    post,
    path = "/admin/auto-draw",
    tag = "admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "开奖日期已到的活动处理结果", body = AutoDrawSummary),
        (status = 403, description = "仅 owner 可触发")
    )
)]
pub async fn run_auto_draw(
    draw_service: web::Data<DrawService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let ctx = auth_context(&req)?;
    ctx.require_owner()?;
    match draw_service.run_auto_draw(Utc::now()).await {
        Ok(summary) => Ok(HttpResponse::Ok().json(ApiResponse::success(summary))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/admin/pending-digest",
    tag = "admin",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "待审批订单摘要发送结果", body = DigestSummary))
)]
pub async fn run_pending_digest(
    notification_service: web::Data<NotificationService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let ctx = auth_context(&req)?;
    ctx.require_owner()?;
    match notification_service.notify_pending_approvals().await {
        Ok(summary) => Ok(HttpResponse::Ok().json(ApiResponse::success(summary))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/admin/expire-reservations",
    tag = "admin",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "过期预留释放结果", body = ExpirySummary))
)]
pub async fn expire_reservations(
    order_service: web::Data<OrderService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let ctx = auth_context(&req)?;
    ctx.require_owner()?;
    match order_service.expire_reservations(Utc::now()).await {
        Ok(summary) => Ok(HttpResponse::Ok().json(ApiResponse::success(summary))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn admin_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/admin")
            .route("/auto-draw", web::post().to(run_auto_draw))
            .route("/pending-digest", web::post().to(run_pending_digest))
            .route("/expire-reservations", web::post().to(expire_reservations)),
    );
}
