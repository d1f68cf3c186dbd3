use actix_web::{web, HttpRequest, HttpResponse, Result, ResponseError};
use serde_json::json;
use crate::middlewares::auth_context;
use crate::models::*;
use crate::services::NotificationService;

#[utoipa::path(
    get,
    path = "/notifications",
    tag = "notification",
    params(
        ("page" = Option<u32>, Query, description = "页码"),
        ("per_page" = Option<u32>, Query, description = "每页数量")
    ),
    security(("bearer_auth" = [])),
    responses((status = 200, description = "站内通知列表"))
)]
pub async fn list_notifications(
    notification_service: web::Data<NotificationService>,
    req: HttpRequest,
    query: web::Query<NotificationQuery>,
) -> Result<HttpResponse> {
    let ctx = auth_context(&req)?;
    match notification_service
        .list_notifications(&ctx, query.page, query.per_page)
        .await
    {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/notifications/{id}/read",
    tag = "notification",
    params(("id" = i64, Path, description = "通知ID")),
    security(("bearer_auth" = [])),
    responses((status = 200, description = "已标记为已读", body = NotificationResponse))
)]
pub async fn mark_read(
    notification_service: web::Data<NotificationService>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let ctx = auth_context(&req)?;
    match notification_service.mark_read(&ctx, path.into_inner()).await {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/notifications/read-all",
    tag = "notification",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "全部标记为已读"))
)]
pub async fn mark_all_read(
    notification_service: web::Data<NotificationService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let ctx = auth_context(&req)?;
    match notification_service.mark_all_read(&ctx).await {
        Ok(updated) => Ok(HttpResponse::Ok().json(ApiResponse::success(json!({
            "updated": updated
        })))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn notification_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/notifications")
            .route("", web::get().to(list_notifications))
            .route("/read-all", web::post().to(mark_all_read))
            .route("/{id}/read", web::post().to(mark_read)),
    );
}
