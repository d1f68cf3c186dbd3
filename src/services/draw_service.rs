use crate::entities::{
    OrderStatus, RaffleStatus, order_entity as orders, raffle_entity as raffles,
};
use crate::error::{AppError, AppResult};
use crate::external::EmailService;
use crate::models::{AuthContext, AutoDrawSummary, DrawOutcome, ItemError, WinnerSnapshot};
use crate::services::notification_service::{create_notification, kinds, record_event};
use crate::utils::{TicketSet, format_ticket_number};
use chrono::{DateTime, Utc};
use rand::Rng;
use rand::rngs::OsRng;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use serde_json::json;

/// 在已售票中等概率抽取一张；无已售票时返回 None
pub fn pick_winner<R: Rng + ?Sized>(sold: &TicketSet, rng: &mut R) -> Option<i64> {
    let len = sold.len();
    if len <= 0 {
        return None;
    }
    sold.nth(rng.gen_range(0..len))
}

/// 一次性排序合并
fn sold_set(sold_orders: &[orders::Model]) -> TicketSet {
    TicketSet::from_ranges(sold_orders.iter().flat_map(|o| o.all_ranges()))
}

#[derive(Clone)]
pub struct DrawService {
    pool: DatabaseConnection,
    email: EmailService,
}

impl DrawService {
    pub fn new(pool: DatabaseConnection, email: EmailService) -> Self {
        Self { pool, email }
    }

    /// 定时开奖：draw_date 已到的 active 活动，单个失败不影响其余
    pub async fn run_auto_draw(&self, now: DateTime<Utc>) -> AppResult<AutoDrawSummary> {
        let due = raffles::Entity::find()
            .filter(raffles::Column::Status.eq(RaffleStatus::Active))
            .filter(raffles::Column::DrawDate.lte(now))
            .order_by_asc(raffles::Column::DrawDate)
            .all(&self.pool)
            .await?;

        let mut summary = AutoDrawSummary {
            processed: due.len(),
            drawn: Vec::new(),
            errors: Vec::new(),
        };
        for raffle in due {
            match self.draw_locked(raffle.id, now).await {
                Ok(Some(outcome)) => summary.drawn.push(outcome),
                Ok(None) => {
                    log::info!("Raffle {} no longer active, skipped", raffle.id);
                }
                Err(e) => {
                    log::error!("Auto draw failed for raffle {}: {e}", raffle.id);
                    summary.errors.push(ItemError {
                        id: raffle.id,
                        error: e.to_string(),
                    });
                }
            }
        }

        if summary.processed > 0 {
            log::info!(
                "Auto draw: {} due, {} drawn, {} errors",
                summary.processed,
                summary.drawn.len(),
                summary.errors.len()
            );
        }
        Ok(summary)
    }

    /// 手动开奖
    pub async fn draw_raffle(&self, ctx: &AuthContext, raffle_id: i64) -> AppResult<DrawOutcome> {
        ctx.require_manager()?;
        let raffle = raffles::Entity::find_by_id(raffle_id)
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Raffle not found".into()))?;
        ctx.ensure_same_org(raffle.organization_id, "Raffle")?;

        self.draw_locked(raffle_id, Utc::now())
            .await?
            .ok_or_else(|| AppError::Conflict("Only active raffles can be drawn".into()))
    }

    async fn draw_locked(&self, raffle_id: i64, now: DateTime<Utc>) -> AppResult<Option<DrawOutcome>> {
        let txn = self.pool.begin().await?;
        let raffle = raffles::Entity::find_by_id(raffle_id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::NotFound("Raffle not found".into()))?;
        if raffle.status != RaffleStatus::Active {
            return Ok(None);
        }

        let sold_orders = orders::Entity::find()
            .filter(orders::Column::RaffleId.eq(raffle_id))
            .filter(orders::Column::Status.eq(OrderStatus::Sold))
            .all(&txn)
            .await?;
        let sold = sold_set(&sold_orders);

        let mut am: raffles::ActiveModel = raffle.clone().into();
        am.status = Set(RaffleStatus::Completed);
        am.drawn_at = Set(Some(now));
        am.updated_at = Set(now);

        let Some(winner_index) = pick_winner(&sold, &mut OsRng) else {
            am.update(&txn).await?;
            record_event(
                &txn,
                raffle.organization_id,
                Some(raffle.id),
                "raffle_completed",
                json!({ "sold_tickets": 0, "winner": null }),
            )
            .await?;
            create_notification(
                &txn,
                raffle.organization_id,
                kinds::RAFFLE_DRAWN,
                format!("{} closed without winner", raffle.title),
                "The draw date passed with no sold tickets.",
                None,
            )
            .await?;
            txn.commit().await?;
            log::warn!("Raffle {raffle_id} completed without sold tickets");
            return Ok(Some(DrawOutcome {
                raffle_id,
                winner_ticket_number: None,
                winner_order_id: None,
                sold_tickets: 0,
            }));
        };

        let winner_order = sold_orders
            .iter()
            .find(|o| o.ticket_set().contains(winner_index))
            .ok_or_else(|| {
                AppError::InternalError(format!("No sold order holds winning index {winner_index}"))
            })?;
        let ticket_number = format_ticket_number(&raffle.numbering, winner_index);
        let snapshot = WinnerSnapshot {
            ticket_index: winner_index,
            ticket_number: ticket_number.clone(),
            order_id: winner_order.id,
            buyer_name: winner_order.buyer_name.clone(),
            buyer_email: winner_order.buyer_email.clone(),
            buyer_city: winner_order.buyer_city.clone(),
            reference_code: winner_order.reference_code.clone(),
            sold_tickets: sold.len(),
            drawn_at: now,
        };

        am.winner_ticket_index = Set(Some(winner_index));
        am.winner_ticket_number = Set(Some(ticket_number.clone()));
        am.winner_order_id = Set(Some(winner_order.id));
        am.winner_data = Set(Some(serde_json::to_value(&snapshot)?));
        am.update(&txn).await?;

        record_event(
            &txn,
            raffle.organization_id,
            Some(raffle.id),
            "raffle_drawn",
            json!({
                "winner_ticket_number": ticket_number,
                "winner_order_id": winner_order.id,
                "sold_tickets": sold.len(),
            }),
        )
        .await?;
        create_notification(
            &txn,
            raffle.organization_id,
            kinds::RAFFLE_DRAWN,
            format!("Winner drawn for {}", raffle.title),
            format!(
                "Ticket {ticket_number} ({}) won among {} sold tickets.",
                winner_order.buyer_name,
                sold.len()
            ),
            None,
        )
        .await?;
        txn.commit().await?;

        log::info!(
            "Raffle {raffle_id} drawn: ticket {ticket_number}, order {}",
            winner_order.id
        );

        if self.email.is_enabled() {
            let html = format!(
                "<p>Hola {},</p><p>Your ticket <b>{ticket_number}</b> won <b>{}</b> in {}!</p>\
                 <p>Reference: {}</p>",
                winner_order.buyer_name, raffle.prize_name, raffle.title, winner_order.reference_code
            );
            if let Err(e) = self
                .email
                .send(
                    &winner_order.buyer_email,
                    &format!("You won {}", raffle.title),
                    &html,
                )
                .await
            {
                log::warn!("Winner email for raffle {raffle_id} failed: {e}");
            }
        }

        Ok(Some(DrawOutcome {
            raffle_id,
            winner_ticket_number: Some(ticket_number),
            winner_order_id: Some(winner_order.id),
            sold_tickets: sold.len(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::TicketRange;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashMap;

    #[test]
    fn test_no_winner_without_sold_tickets() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(pick_winner(&TicketSet::new(), &mut rng), None);
    }

    #[test]
    fn test_winner_is_always_sold() {
        let sold = TicketSet::from_ranges([TicketRange::new(3, 5), TicketRange::new(90, 99)]);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1_000 {
            let w = pick_winner(&sold, &mut rng).unwrap();
            assert!(sold.contains(w));
        }
    }

    #[test]
    fn test_winner_selection_is_uniform() {
        let mut sold = TicketSet::from_ranges([TicketRange::new(0, 2), TicketRange::new(20, 21)]);
        sold.extend_indices(&[10]);
        let mut rng = StdRng::seed_from_u64(42);
        let draws = 60_000;
        let mut hits: HashMap<i64, usize> = HashMap::new();
        for _ in 0..draws {
            *hits.entry(pick_winner(&sold, &mut rng).unwrap()).or_default() += 1;
        }
        assert_eq!(hits.len(), 6);
        let expected = draws / 6;
        for (idx, n) in hits {
            assert!(
                n.abs_diff(expected) < expected / 10,
                "index {idx} drawn {n} times"
            );
        }
    }
}
