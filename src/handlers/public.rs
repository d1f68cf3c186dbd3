use actix_web::{web, HttpResponse, Result, ResponseError};
use crate::models::*;
use crate::services::{CouponService, OrderService, RaffleService, TicketService};

/// 整单拒绝时返回 409，data 中带上不可用的索引
fn reservation_response(result: ReservationResult) -> HttpResponse {
    match result {
        ReservationResult::Rejected { ref error_message, .. } => {
            let message = error_message.clone();
            HttpResponse::Conflict().json(ApiResponse::rejected("CONFLICT", message, result))
        }
        reserved => HttpResponse::Ok().json(ApiResponse::success(reserved)),
    }
}

#[utoipa::path(
    get,
    path = "/public/raffles/by-slug/{slug}",
    tag = "public",
    params(("slug" = String, Path, description = "活动 slug")),
    responses(
        (status = 200, description = "活动公开信息", body = PublicRaffleResponse),
        (status = 404, description = "活动不存在或未公开")
    )
)]
pub async fn get_raffle_by_slug(
    raffle_service: web::Data<RaffleService>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    match raffle_service.get_public_raffle(&path.into_inner()).await {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/public/raffles/{id}/tickets",
    tag = "public",
    params(
        ("id" = i64, Path, description = "活动ID"),
        ("page" = Option<u32>, Query, description = "页码"),
        ("page_size" = Option<u32>, Query, description = "每页数量（最多 500）")
    ),
    responses(
        (status = 200, description = "虚拟票号分页"),
        (status = 404, description = "活动不存在或未公开")
    )
)]
pub async fn list_tickets(
    ticket_service: web::Data<TicketService>,
    path: web::Path<i64>,
    query: web::Query<VirtualTicketQuery>,
) -> Result<HttpResponse> {
    match ticket_service.get_virtual_tickets(path.into_inner(), &query).await {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/public/raffles/{id}/ticket-counts",
    tag = "public",
    params(("id" = i64, Path, description = "活动ID")),
    responses(
        (status = 200, description = "票号统计", body = VirtualTicketCounts),
        (status = 404, description = "活动不存在或未公开")
    )
)]
pub async fn ticket_counts(
    ticket_service: web::Data<TicketService>,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    match ticket_service.get_virtual_ticket_counts(path.into_inner()).await {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/public/raffles/{id}/tickets/search",
    tag = "public",
    params(
        ("id" = i64, Path, description = "活动ID"),
        ("number" = String, Query, description = "格式化后的票号")
    ),
    responses(
        (status = 200, description = "查询结果", body = TicketSearchResult)
    )
)]
pub async fn search_ticket(
    ticket_service: web::Data<TicketService>,
    path: web::Path<i64>,
    query: web::Query<TicketSearchQuery>,
) -> Result<HttpResponse> {
    match ticket_service.search_ticket(path.into_inner(), &query.number).await {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/public/raffles/{id}/reserve",
    tag = "public",
    params(("id" = i64, Path, description = "活动ID")),
    request_body = ReserveTicketsRequest,
    responses(
        (status = 200, description = "预留成功", body = ReservationResult),
        (status = 400, description = "请求参数错误"),
        (status = 409, description = "票号不可用，整单拒绝")
    )
)]
pub async fn reserve_tickets(
    order_service: web::Data<OrderService>,
    path: web::Path<i64>,
    request: web::Json<ReserveTicketsRequest>,
) -> Result<HttpResponse> {
    match order_service
        .reserve_tickets(path.into_inner(), request.into_inner())
        .await
    {
        Ok(result) => Ok(reservation_response(result)),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/public/coupons/validate",
    tag = "public",
    request_body = ValidateCouponRequest,
    responses(
        (status = 200, description = "优惠报价", body = CouponQuote),
        (status = 400, description = "优惠码不可用")
    )
)]
pub async fn validate_coupon(
    coupon_service: web::Data<CouponService>,
    request: web::Json<ValidateCouponRequest>,
) -> Result<HttpResponse> {
    match coupon_service.validate_coupon(request.into_inner()).await {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/public/orders/{reference}",
    tag = "public",
    params(("reference" = String, Path, description = "订单参考码")),
    responses(
        (status = 200, description = "订单详情", body = PublicOrderResponse),
        (status = 404, description = "订单不存在")
    )
)]
pub async fn get_order(
    order_service: web::Data<OrderService>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    match order_service.get_order_by_reference(&path.into_inner()).await {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/public/orders/{reference}/payment-proof",
    tag = "public",
    params(("reference" = String, Path, description = "订单参考码")),
    request_body = PaymentProofRequest,
    responses(
        (status = 200, description = "已提交付款凭证，等待审批", body = PublicOrderResponse),
        (status = 409, description = "预留已过期或订单已处理")
    )
)]
pub async fn submit_payment_proof(
    order_service: web::Data<OrderService>,
    path: web::Path<String>,
    request: web::Json<PaymentProofRequest>,
) -> Result<HttpResponse> {
    match order_service
        .submit_payment_proof(&path.into_inner(), request.into_inner())
        .await
    {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn public_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/public")
            .route("/raffles/by-slug/{slug}", web::get().to(get_raffle_by_slug))
            .route("/raffles/{id}/tickets", web::get().to(list_tickets))
            .route("/raffles/{id}/tickets/search", web::get().to(search_ticket))
            .route("/raffles/{id}/ticket-counts", web::get().to(ticket_counts))
            .route("/raffles/{id}/reserve", web::post().to(reserve_tickets))
            .route("/coupons/validate", web::post().to(validate_coupon))
            .route("/orders/{reference}", web::get().to(get_order))
            .route(
                "/orders/{reference}/payment-proof",
                web::post().to(submit_payment_proof),
            ),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;

    #[test]
    fn test_rejected_reservation_maps_to_conflict() {
        let resp = reservation_response(ReservationResult::rejected(
            "Tickets no longer available",
            vec![7],
        ));
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }
}
