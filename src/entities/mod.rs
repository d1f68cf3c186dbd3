pub mod analytics_events;
pub mod coupons;
pub mod custom_domains;
pub mod notifications;
pub mod orders;
pub mod organizations;
pub mod raffles;
pub mod ticket_generation_jobs;
pub mod tickets;
pub mod users;

pub use analytics_events as analytics_event_entity;
pub use coupons as coupon_entity;
pub use custom_domains as custom_domain_entity;
pub use notifications as notification_entity;
pub use orders as order_entity;
pub use organizations as organization_entity;
pub use raffles as raffle_entity;
pub use ticket_generation_jobs as ticket_job_entity;
pub use tickets as ticket_entity;
pub use users as user_entity;

pub use coupons::DiscountType;
pub use orders::{LuckyIndices, OrderStatus, TicketRanges};
pub use raffles::RaffleStatus;
pub use ticket_generation_jobs::JobStatus;
pub use users::UserRole;
