//! Background scheduled tasks for the application.
//!
//! Recurring jobs: reservation expiry sweep, auto-draw of raffles whose draw date
//! has passed, and the pending-approval digest for organizers.
//! Call `spawn_all` once during startup to launch them.

use crate::config::{ReservationConfig, SchedulerConfig};
use crate::services::{DrawService, NotificationService, OrderService};
use chrono::Utc;
use std::time::Duration;

/// Spawn all background tasks.
///
/// Notes
/// - Each task is idempotent as implemented in its service; the admin trigger
///   endpoints may run the same work concurrently.
/// - This function detaches tasks via `tokio::spawn`; it does not block.
pub fn spawn_all(
    order_service: OrderService,
    draw_service: DrawService,
    notification_service: NotificationService,
    reservation: &ReservationConfig,
    scheduler: &SchedulerConfig,
) {
    // 过期预留释放
    {
        let svc = order_service;
        let every = Duration::from_secs(reservation.sweep_interval_secs.max(1));
        tokio::spawn(async move {
            loop {
                match svc.sweep_expired().await {
                    Ok(s) if s.expired_orders > 0 => log::info!(
                        "Expired reservations released: {} orders, {} tickets",
                        s.expired_orders,
                        s.released_tickets
                    ),
                    Ok(_) => {}
                    Err(e) => log::error!("Failed to sweep expired reservations: {e:?}"),
                }
                tokio::time::sleep(every).await;
            }
        });
    }

    // 自动开奖
    {
        let svc = draw_service;
        let every = Duration::from_secs(scheduler.auto_draw_interval_secs.max(1));
        tokio::spawn(async move {
            loop {
                match svc.run_auto_draw(Utc::now()).await {
                    Ok(s) if !s.errors.is_empty() => {
                        log::warn!("Auto draw finished with {} errors", s.errors.len())
                    }
                    Ok(_) => {}
                    Err(e) => log::error!("Failed to run auto draw: {e:?}"),
                }
                tokio::time::sleep(every).await;
            }
        });
    }

    // 待审批订单摘要
    {
        let svc = notification_service;
        let every = Duration::from_secs(scheduler.pending_digest_interval_secs.max(60));
        tokio::spawn(async move {
            loop {
                // 启动后先等一个周期，避免重启时重复推送
                tokio::time::sleep(every).await;
                match svc.notify_pending_approvals().await {
                    Ok(s) if s.organizations_notified > 0 => log::info!(
                        "Pending approval digest sent to {} organizations",
                        s.organizations_notified
                    ),
                    Ok(_) => {}
                    Err(e) => log::error!("Failed to send pending approval digest: {e:?}"),
                }
            }
        });
    }
}
