pub mod admin;
pub mod auth;
pub mod coupon;
pub mod domain;
pub mod notification;
pub mod order;
pub mod organization;
pub mod public;
pub mod raffle;
pub mod ticket_job;

pub use admin::admin_config;
pub use auth::auth_config;
pub use coupon::coupon_config;
pub use domain::domain_config;
pub use notification::notification_config;
pub use order::order_config;
pub use organization::organization_config;
pub use public::public_config;
pub use raffle::raffle_config;
pub use ticket_job::ticket_job_config;
