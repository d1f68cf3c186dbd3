use actix_web::{web, HttpRequest, HttpResponse, Result, ResponseError};
use crate::middlewares::auth_context;
use crate::models::*;
use crate::services::OrderService;

/// 审批被拒绝（如订单已取消、票号已被占用）时返回 409
fn approval_response(result: ApprovalResult) -> HttpResponse {
    match result {
        ApprovalResult::Refused { ref error_message } => {
            let message = error_message.clone();
            HttpResponse::Conflict().json(ApiResponse::rejected("CONFLICT", message, result))
        }
        applied => HttpResponse::Ok().json(ApiResponse::success(applied)),
    }
}

#[utoipa::path(
    post,
    path = "/orders/{id}/approve",
    tag = "order",
    params(("id" = i64, Path, description = "订单ID")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "已确认收款，票号售出", body = ApprovalResult),
        (status = 403, description = "无权限"),
        (status = 409, description = "订单状态不允许审批")
    )
)]
pub async fn approve_order(
    order_service: web::Data<OrderService>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let ctx = auth_context(&req)?;
    match order_service.approve_order(&ctx, path.into_inner()).await {
        Ok(result) => Ok(approval_response(result)),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/orders/{id}/reject",
    tag = "order",
    params(("id" = i64, Path, description = "订单ID")),
    request_body = RejectOrderRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "已驳回，票号释放", body = ApprovalResult),
        (status = 409, description = "已售订单不可驳回")
    )
)]
pub async fn reject_order(
    order_service: web::Data<OrderService>,
    req: HttpRequest,
    path: web::Path<i64>,
    request: web::Json<RejectOrderRequest>,
) -> Result<HttpResponse> {
    let ctx = auth_context(&req)?;
    match order_service
        .reject_order(&ctx, path.into_inner(), request.into_inner())
        .await
    {
        Ok(result) => Ok(approval_response(result)),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn order_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/orders")
            .route("/{id}/approve", web::post().to(approve_order))
            .route("/{id}/reject", web::post().to(reject_order)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::OrderStatus;
    use actix_web::http::StatusCode;

    #[test]
    fn test_refused_approval_maps_to_conflict() {
        let resp = approval_response(ApprovalResult::refused("Order was canceled"));
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_idempotent_approval_is_ok() {
        let resp = approval_response(ApprovalResult::Applied {
            order_id: 1,
            status: OrderStatus::Sold,
            ticket_count: 3,
            already_applied: true,
        });
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
