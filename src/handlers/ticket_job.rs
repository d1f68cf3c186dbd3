use actix_web::{web, HttpRequest, HttpResponse, Result, ResponseError};
use crate::middlewares::auth_context;
use crate::models::*;
use crate::services::TicketJobService;

#[utoipa::path(
    get,
    path = "/ticket-jobs/{id}",
    tag = "ticket_job",
    params(("id" = i64, Path, description = "任务ID")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "任务状态与进度", body = TicketJobResponse),
        (status = 404, description = "任务不存在")
    )
)]
pub async fn get_job(
    job_service: web::Data<TicketJobService>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let ctx = auth_context(&req)?;
    match job_service.get_job_status(&ctx, path.into_inner()).await {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/ticket-jobs/{id}/watch",
    tag = "ticket_job",
    params(
        ("id" = i64, Path, description = "任务ID"),
        ("last_status" = Option<String>, Query, description = "上次看到的状态"),
        ("last_count" = Option<i64>, Query, description = "上次看到的已生成数量"),
        ("timeout_secs" = Option<u64>, Query, description = "最长等待秒数")
    ),
    security(("bearer_auth" = [])),
    responses((status = 200, description = "状态变化或超时", body = WatchJobResponse))
)]
pub async fn watch_job(
    job_service: web::Data<TicketJobService>,
    req: HttpRequest,
    path: web::Path<i64>,
    query: web::Query<WatchJobQuery>,
) -> Result<HttpResponse> {
    let ctx = auth_context(&req)?;
    match job_service.watch_job(&ctx, path.into_inner(), &query).await {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/ticket-jobs/{id}/cancel",
    tag = "ticket_job",
    params(("id" = i64, Path, description = "任务ID")),
    security(("bearer_auth" = [])),
    responses((status = 200, description = "已取消（已结束的任务原样返回）", body = TicketJobResponse))
)]
pub async fn cancel_job(
    job_service: web::Data<TicketJobService>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let ctx = auth_context(&req)?;
    match job_service.cancel_job(&ctx, path.into_inner()).await {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn ticket_job_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/ticket-jobs")
            .route("/{id}", web::get().to(get_job))
            .route("/{id}/watch", web::get().to(watch_job))
            .route("/{id}/cancel", web::post().to(cancel_job)),
    );
}
