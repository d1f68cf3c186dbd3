pub mod auth_service;
pub mod coupon_service;
pub mod domain_service;
pub mod draw_service;
pub mod notification_service;
pub mod order_service;
pub mod organization_service;
pub mod raffle_service;
pub mod ticket_job_service;
pub mod ticket_service;

pub use auth_service::AuthService;
pub use coupon_service::CouponService;
pub use domain_service::DomainService;
pub use draw_service::DrawService;
pub use notification_service::NotificationService;
pub use order_service::OrderService;
pub use organization_service::OrganizationService;
pub use raffle_service::RaffleService;
pub use ticket_job_service::TicketJobService;
pub use ticket_service::TicketService;
