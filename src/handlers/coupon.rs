use actix_web::{web, HttpRequest, HttpResponse, Result, ResponseError};
use crate::middlewares::auth_context;
use crate::models::*;
use crate::services::CouponService;

#[utoipa::path(
    get,
    path = "/coupons",
    tag = "coupon",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "组织优惠码列表"))
)]
pub async fn list_coupons(
    coupon_service: web::Data<CouponService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let ctx = auth_context(&req)?;
    match coupon_service.list_coupons(&ctx).await {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/coupons",
    tag = "coupon",
    request_body = CreateCouponRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "创建成功", body = CouponResponse),
        (status = 400, description = "请求参数错误"),
        (status = 402, description = "当前套餐不支持优惠码"),
        (status = 409, description = "优惠码已存在")
    )
)]
pub async fn create_coupon(
    coupon_service: web::Data<CouponService>,
    req: HttpRequest,
    request: web::Json<CreateCouponRequest>,
) -> Result<HttpResponse> {
    let ctx = auth_context(&req)?;
    match coupon_service.create_coupon(&ctx, request.into_inner()).await {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/coupons/{id}/deactivate",
    tag = "coupon",
    params(("id" = i64, Path, description = "优惠码ID")),
    security(("bearer_auth" = [])),
    responses((status = 200, description = "已停用", body = CouponResponse))
)]
pub async fn deactivate_coupon(
    coupon_service: web::Data<CouponService>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let ctx = auth_context(&req)?;
    match coupon_service.deactivate_coupon(&ctx, path.into_inner()).await {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn coupon_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/coupons")
            .route("", web::get().to(list_coupons))
            .route("", web::post().to(create_coupon))
            .route("/{id}/deactivate", web::post().to(deactivate_coupon)),
    );
}
