use actix_web::web;
use utoipa::OpenApi;
use utoipa::{
    Modify,
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use crate::entities::{DiscountType, JobStatus, OrderStatus, RaffleStatus, UserRole};
use crate::handlers;
use crate::models::*;
use crate::utils::{NumberingConfig, TicketRange};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            )
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::auth::register,
        handlers::auth::login,
        handlers::auth::refresh,
        handlers::public::get_raffle_by_slug,
        handlers::public::list_tickets,
        handlers::public::ticket_counts,
        handlers::public::search_ticket,
        handlers::public::reserve_tickets,
        handlers::public::validate_coupon,
        handlers::public::get_order,
        handlers::public::submit_payment_proof,
        handlers::raffle::list_raffles,
        handlers::raffle::create_raffle,
        handlers::raffle::get_raffle,
        handlers::raffle::update_raffle,
        handlers::raffle::publish_raffle,
        handlers::raffle::pause_raffle,
        handlers::raffle::resume_raffle,
        handlers::raffle::cancel_raffle,
        handlers::raffle::draw_raffle,
        handlers::raffle::generate_tickets,
        handlers::raffle::latest_generation,
        handlers::raffle::order_counts,
        handlers::raffle::list_orders,
        handlers::order::approve_order,
        handlers::order::reject_order,
        handlers::ticket_job::get_job,
        handlers::ticket_job::watch_job,
        handlers::ticket_job::cancel_job,
        handlers::coupon::list_coupons,
        handlers::coupon::create_coupon,
        handlers::coupon::deactivate_coupon,
        handlers::domain::list_domains,
        handlers::domain::add_domain,
        handlers::domain::remove_domain,
        handlers::domain::verify_domain,
        handlers::domain::diagnose_provider,
        handlers::notification::list_notifications,
        handlers::notification::mark_read,
        handlers::notification::mark_all_read,
        handlers::organization::get_organization,
        handlers::organization::update_organization,
        handlers::organization::get_limits,
        handlers::organization::delete_organization,
        handlers::admin::run_auto_draw,
        handlers::admin::run_pending_digest,
        handlers::admin::expire_reservations,
    ),
    components(
        schemas(
            ApiError,
            RegisterRequest,
            LoginRequest,
            RefreshTokenRequest,
            UserResponse,
            AuthResponse,
            UserRole,
            OrganizationResponse,
            UpdateOrganizationRequest,
            OrganizationLimitsResponse,
            DeleteOrganizationSummary,
            SubscriptionTier,
            SubscriptionLimits,
            CreateRaffleRequest,
            UpdateRaffleRequest,
            RaffleQuery,
            RaffleResponse,
            PublicRaffleResponse,
            PublishRaffleResponse,
            RaffleStatus,
            WinnerSnapshot,
            NumberingConfig,
            TicketRange,
            ReserveTicketsRequest,
            ReservationResult,
            ApprovalResult,
            RejectOrderRequest,
            PaymentProofRequest,
            OrderQuery,
            OrderResponse,
            OrderStatus,
            HoldInfo,
            PublicOrderResponse,
            TicketStatus,
            VirtualTicket,
            VirtualTicketCounts,
            StatusCount,
            OrderTicketCounts,
            VirtualTicketQuery,
            TicketSearchQuery,
            TicketSearchResult,
            TicketJobResponse,
            JobStatus,
            GenerationStart,
            WatchJobQuery,
            WatchJobResponse,
            CreateCouponRequest,
            CouponResponse,
            ValidateCouponRequest,
            CouponQuote,
            DiscountType,
            AddDomainRequest,
            CustomDomainResponse,
            DnsDiagnostics,
            ProviderDiagnostics,
            NotificationResponse,
            NotificationQuery,
            ItemError,
            DrawOutcome,
            AutoDrawSummary,
            DigestSummary,
            ExpirySummary,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Registration and tokens"),
        (name = "public", description = "Buyer-facing raffle pages, reservations and orders"),
        (name = "raffle", description = "Raffle management and draws"),
        (name = "order", description = "Payment approval"),
        (name = "ticket_job", description = "Ticket generation jobs"),
        (name = "coupon", description = "Discount coupons"),
        (name = "domain", description = "Custom domains"),
        (name = "notification", description = "In-app notifications"),
        (name = "organization", description = "Organization settings and plan limits"),
        (name = "admin", description = "Manual triggers for scheduled tasks"),
    ),
    info(
        title = "Sorteos Backend API",
        version = "1.0.0",
        description = "Multi-tenant raffle platform REST API"
    ),
    servers(
        (url = "/api/v1", description = "Local server")
    )
)]
pub struct ApiDoc;

pub fn swagger_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()),
    )
    .route(
        "/swagger-ui",
        web::get().to(|| async {
            actix_web::HttpResponse::Found()
                .append_header(("Location", "/swagger-ui/"))
                .finish()
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_reservation_and_bearer_scheme() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/public/raffles/{id}/reserve"));
        assert!(doc.paths.paths.contains_key("/admin/auto-draw"));
        assert!(doc.paths.paths.contains_key("/raffles/{id}/generate-tickets"));
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}
