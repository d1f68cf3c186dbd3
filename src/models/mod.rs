pub mod auth;
pub mod common;
pub mod coupon;
pub mod domain;
pub mod notification;
pub mod order;
pub mod organization;
pub mod pagination;
pub mod raffle;
pub mod subscription;
pub mod ticket;
pub mod ticket_job;

pub use auth::*;
pub use common::*;
pub use coupon::*;
pub use domain::*;
pub use notification::*;
pub use order::*;
pub use organization::*;
pub use pagination::*;
pub use raffle::*;
pub use subscription::*;
pub use ticket::*;
pub use ticket_job::*;
