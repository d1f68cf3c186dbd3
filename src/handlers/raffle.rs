use actix_web::{web, HttpRequest, HttpResponse, Result, ResponseError};
use crate::middlewares::auth_context;
use crate::models::*;
use crate::services::{DrawService, OrderService, RaffleService, TicketService};

#[utoipa::path(
    get,
    path = "/raffles",
    tag = "raffle",
    params(
        ("page" = Option<u32>, Query, description = "页码"),
        ("per_page" = Option<u32>, Query, description = "每页数量"),
        ("status" = Option<String>, Query, description = "活动状态")
    ),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "活动列表"),
        (status = 401, description = "未授权")
    )
)]
pub async fn list_raffles(
    raffle_service: web::Data<RaffleService>,
    req: HttpRequest,
    query: web::Query<RaffleQuery>,
) -> Result<HttpResponse> {
    let ctx = auth_context(&req)?;
    match raffle_service.list_raffles(&ctx, &query).await {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/raffles",
    tag = "raffle",
    request_body = CreateRaffleRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "已创建草稿活动", body = RaffleResponse),
        (status = 400, description = "请求参数错误"),
        (status = 402, description = "超出套餐限制")
    )
)]
pub async fn create_raffle(
    raffle_service: web::Data<RaffleService>,
    req: HttpRequest,
    request: web::Json<CreateRaffleRequest>,
) -> Result<HttpResponse> {
    let ctx = auth_context(&req)?;
    match raffle_service.create_raffle(&ctx, request.into_inner()).await {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/raffles/{id}",
    tag = "raffle",
    params(("id" = i64, Path, description = "活动ID")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "活动详情", body = RaffleResponse),
        (status = 404, description = "活动不存在")
    )
)]
pub async fn get_raffle(
    raffle_service: web::Data<RaffleService>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let ctx = auth_context(&req)?;
    match raffle_service.get_raffle(&ctx, path.into_inner()).await {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    put,
    path = "/raffles/{id}",
    tag = "raffle",
    params(("id" = i64, Path, description = "活动ID")),
    request_body = UpdateRaffleRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "更新成功", body = RaffleResponse),
        (status = 409, description = "活动状态不允许修改")
    )
)]
pub async fn update_raffle(
    raffle_service: web::Data<RaffleService>,
    req: HttpRequest,
    path: web::Path<i64>,
    request: web::Json<UpdateRaffleRequest>,
) -> Result<HttpResponse> {
    let ctx = auth_context(&req)?;
    match raffle_service
        .update_raffle(&ctx, path.into_inner(), request.into_inner())
        .await
    {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/raffles/{id}/publish",
    tag = "raffle",
    params(("id" = i64, Path, description = "活动ID")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "已发布，票号生成已开始", body = PublishRaffleResponse),
        (status = 402, description = "活动数超出套餐限制"),
        (status = 409, description = "只有草稿可以发布")
    )
)]
pub async fn publish_raffle(
    raffle_service: web::Data<RaffleService>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let ctx = auth_context(&req)?;
    match raffle_service.publish_raffle(&ctx, path.into_inner()).await {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/raffles/{id}/pause",
    tag = "raffle",
    params(("id" = i64, Path, description = "活动ID")),
    security(("bearer_auth" = [])),
    responses((status = 200, description = "已暂停", body = RaffleResponse))
)]
pub async fn pause_raffle(
    raffle_service: web::Data<RaffleService>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let ctx = auth_context(&req)?;
    match raffle_service.pause_raffle(&ctx, path.into_inner()).await {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/raffles/{id}/resume",
    tag = "raffle",
    params(("id" = i64, Path, description = "活动ID")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "已恢复", body = RaffleResponse),
        (status = 402, description = "活动数超出套餐限制")
    )
)]
pub async fn resume_raffle(
    raffle_service: web::Data<RaffleService>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let ctx = auth_context(&req)?;
    match raffle_service.resume_raffle(&ctx, path.into_inner()).await {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/raffles/{id}/cancel",
    tag = "raffle",
    params(("id" = i64, Path, description = "活动ID")),
    security(("bearer_auth" = [])),
    responses((status = 200, description = "已取消，未完成订单一并取消", body = RaffleResponse))
)]
pub async fn cancel_raffle(
    raffle_service: web::Data<RaffleService>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let ctx = auth_context(&req)?;
    match raffle_service.cancel_raffle(&ctx, path.into_inner()).await {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/raffles/{id}/draw",
    tag = "raffle",
    params(("id" = i64, Path, description = "活动ID")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "开奖结果", body = DrawOutcome),
        (status = 409, description = "只有进行中的活动可以开奖")
    )
)]
pub async fn draw_raffle(
    draw_service: web::Data<DrawService>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let ctx = auth_context(&req)?;
    match draw_service.draw_raffle(&ctx, path.into_inner()).await {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/raffles/{id}/generate-tickets",
    tag = "raffle",
    params(("id" = i64, Path, description = "活动ID")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "已完成或已排队", body = GenerationStart),
        (status = 409, description = "活动不是 active / paused")
    )
)]
pub async fn generate_tickets(
    raffle_service: web::Data<RaffleService>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let ctx = auth_context(&req)?;
    match raffle_service.generate_tickets(&ctx, path.into_inner()).await {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/raffles/{id}/generation",
    tag = "raffle",
    params(("id" = i64, Path, description = "活动ID")),
    security(("bearer_auth" = [])),
    responses((status = 200, description = "最近一次票号生成任务（可能为空）"))
)]
pub async fn latest_generation(
    raffle_service: web::Data<RaffleService>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let ctx = auth_context(&req)?;
    match raffle_service.latest_generation(&ctx, path.into_inner()).await {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/raffles/{id}/order-counts",
    tag = "raffle",
    params(("id" = i64, Path, description = "活动ID")),
    security(("bearer_auth" = [])),
    responses((status = 200, description = "按状态统计订单与票数", body = OrderTicketCounts))
)]
pub async fn order_counts(
    raffle_service: web::Data<RaffleService>,
    ticket_service: web::Data<TicketService>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let ctx = auth_context(&req)?;
    let raffle = match raffle_service.find_raffle_for(&ctx, path.into_inner()).await {
        Ok(raffle) => raffle,
        Err(e) => return Ok(e.error_response()),
    };
    match ticket_service.get_order_ticket_counts(raffle.id).await {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/raffles/{id}/orders",
    tag = "raffle",
    params(
        ("id" = i64, Path, description = "活动ID"),
        ("page" = Option<u32>, Query, description = "页码"),
        ("per_page" = Option<u32>, Query, description = "每页数量"),
        ("status" = Option<String>, Query, description = "订单状态")
    ),
    security(("bearer_auth" = [])),
    responses((status = 200, description = "活动订单列表"))
)]
pub async fn list_orders(
    order_service: web::Data<OrderService>,
    req: HttpRequest,
    path: web::Path<i64>,
    query: web::Query<OrderQuery>,
) -> Result<HttpResponse> {
    let ctx = auth_context(&req)?;
    match order_service
        .list_orders(&ctx, path.into_inner(), &query)
        .await
    {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn raffle_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/raffles")
            .route("", web::get().to(list_raffles))
            .route("", web::post().to(create_raffle))
            .route("/{id}", web::get().to(get_raffle))
            .route("/{id}", web::put().to(update_raffle))
            .route("/{id}/publish", web::post().to(publish_raffle))
            .route("/{id}/pause", web::post().to(pause_raffle))
            .route("/{id}/resume", web::post().to(resume_raffle))
            .route("/{id}/cancel", web::post().to(cancel_raffle))
            .route("/{id}/draw", web::post().to(draw_raffle))
            .route("/{id}/generate-tickets", web::post().to(generate_tickets))
            .route("/{id}/generation", web::get().to(latest_generation))
            .route("/{id}/order-counts", web::get().to(order_counts))
            .route("/{id}/orders", web::get().to(list_orders)),
    );
}
