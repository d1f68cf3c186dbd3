use crate::entities::{OrderStatus, order_entity as orders, raffle_entity as raffles, ticket_entity as tickets};
use crate::error::{AppError, AppResult};
use crate::models::{
    MAX_VIRTUAL_PAGE_SIZE, OrderTicketCounts, PaginatedResponse, PaginationParams, StatusCount,
    TicketSearchResult, TicketStatus, VirtualTicket, VirtualTicketCounts, VirtualTicketQuery,
};
use crate::utils::{NumberingConfig, TicketSet, format_ticket_number};
use chrono::{DateTime, Utc};
use sea_orm::{ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// 计数缓存有效期
pub const COUNTS_TTL: Duration = Duration::from_secs(5);

/// 某活动当前被占用的票：sold 与 reserved（含 pending）
#[derive(Debug, Clone, Default)]
pub struct HeldTickets {
    pub sold: TicketSet,
    pub reserved: TicketSet,
}

impl HeldTickets {
    pub fn from_orders<'a, I>(orders: I, now: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = &'a orders::Model>,
    {
        // 先收集再统一规范化，避免每个订单都重新排序
        let mut sold = Vec::new();
        let mut reserved = Vec::new();
        for o in orders {
            if !o.holds_tickets(now) {
                continue;
            }
            let target = if o.status == OrderStatus::Sold {
                &mut sold
            } else {
                &mut reserved
            };
            target.extend(o.all_ranges());
        }
        HeldTickets {
            sold: TicketSet::from_ranges(sold),
            reserved: TicketSet::from_ranges(reserved),
        }
    }

    /// 全部占用（sold + reserved）
    pub fn all(&self) -> TicketSet {
        let mut set = self.sold.clone();
        set.extend(self.reserved.ranges().iter().copied());
        set
    }

    pub fn status_of(&self, index: i64) -> TicketStatus {
        if self.sold.contains(index) {
            TicketStatus::Sold
        } else if self.reserved.contains(index) {
            TicketStatus::Reserved
        } else {
            TicketStatus::Available
        }
    }

    pub fn counts(&self, total: i64) -> VirtualTicketCounts {
        let sold = self.sold.len();
        let reserved = self.reserved.len();
        VirtualTicketCounts {
            total,
            sold,
            reserved,
            available: (total - sold - reserved).max(0),
        }
    }
}

/// 读取活动中可能占用票号的订单；`exclude_order` 用于审批时排除自身
pub async fn load_holding_orders<C: ConnectionTrait>(
    conn: &C,
    raffle_id: i64,
    exclude_order: Option<i64>,
) -> AppResult<Vec<orders::Model>> {
    let mut q = orders::Entity::find()
        .filter(orders::Column::RaffleId.eq(raffle_id))
        .filter(orders::Column::Status.is_in([
            OrderStatus::Reserved,
            OrderStatus::Pending,
            OrderStatus::Sold,
        ]));
    if let Some(id) = exclude_order {
        q = q.filter(orders::Column::Id.ne(id));
    }
    Ok(q.all(conn).await?)
}

pub async fn load_held_tickets<C: ConnectionTrait>(
    conn: &C,
    raffle_id: i64,
    now: DateTime<Utc>,
    exclude_order: Option<i64>,
) -> AppResult<HeldTickets> {
    let list = load_holding_orders(conn, raffle_id, exclude_order).await?;
    Ok(HeldTickets::from_orders(&list, now))
}

/// 构造一页虚拟票号
pub fn build_virtual_page(
    numbering: &NumberingConfig,
    total_tickets: i64,
    held: &HeldTickets,
    params: PaginationParams,
) -> Vec<VirtualTicket> {
    let start = params.get_offset().min(total_tickets);
    let end = (start + params.get_limit()).min(total_tickets);
    (start..end)
        .map(|index| VirtualTicket {
            index,
            number: format_ticket_number(numbering, index),
            status: held.status_of(index),
        })
        .collect()
}

/// 按订单状态汇总
pub fn summarize_orders(list: &[orders::Model], now: DateTime<Utc>) -> OrderTicketCounts {
    let mut counts = OrderTicketCounts::default();
    for o in list {
        let bucket: &mut StatusCount = match o.status {
            OrderStatus::Reserved if o.reservation_elapsed(now) => &mut counts.expired_holds,
            OrderStatus::Reserved => &mut counts.reserved,
            OrderStatus::Pending => &mut counts.pending,
            OrderStatus::Sold => &mut counts.sold,
            OrderStatus::Canceled => &mut counts.canceled,
        };
        bucket.orders += 1;
        bucket.tickets += o.ticket_count;
    }
    counts
}

/// 每个活动的计数缓存
#[derive(Debug, Default)]
pub struct CountsCache {
    entries: HashMap<i64, (Instant, VirtualTicketCounts)>,
}

impl CountsCache {
    pub fn get(&self, raffle_id: i64, now: Instant) -> Option<VirtualTicketCounts> {
        self.entries
            .get(&raffle_id)
            .filter(|(at, _)| now.duration_since(*at) < COUNTS_TTL)
            .map(|(_, c)| *c)
    }

    pub fn put(&mut self, raffle_id: i64, counts: VirtualTicketCounts, now: Instant) {
        self.entries.insert(raffle_id, (now, counts));
    }

    pub fn invalidate(&mut self, raffle_id: i64) {
        self.entries.remove(&raffle_id);
    }

    /// 清理过期项
    pub fn prune(&mut self, now: Instant) {
        self.entries
            .retain(|_, (at, _)| now.duration_since(*at) < COUNTS_TTL);
    }
}

#[derive(Clone)]
pub struct TicketService {
    pool: DatabaseConnection,
    cache: Arc<RwLock<CountsCache>>,
}

impl TicketService {
    pub fn new(pool: DatabaseConnection) -> Self {
        Self {
            pool,
            cache: Arc::new(RwLock::new(CountsCache::default())),
        }
    }

    /// 预留 / 审批 / 驳回 / 过期后调用
    pub async fn invalidate(&self, raffle_id: i64) {
        self.cache.write().await.invalidate(raffle_id);
    }

    async fn find_raffle(&self, raffle_id: i64) -> AppResult<raffles::Model> {
        raffles::Entity::find_by_id(raffle_id)
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Raffle not found".into()))
    }

    /// 公开接口只暴露可见的活动
    async fn find_public_raffle(&self, raffle_id: i64) -> AppResult<raffles::Model> {
        let raffle = self.find_raffle(raffle_id).await?;
        if !raffle.status.is_public() {
            return Err(AppError::NotFound("Raffle not found".into()));
        }
        Ok(raffle)
    }

    pub async fn get_order_ticket_counts(&self, raffle_id: i64) -> AppResult<OrderTicketCounts> {
        let list = orders::Entity::find()
            .filter(orders::Column::RaffleId.eq(raffle_id))
            .all(&self.pool)
            .await?;
        Ok(summarize_orders(&list, Utc::now()))
    }

    pub async fn get_virtual_ticket_counts(&self, raffle_id: i64) -> AppResult<VirtualTicketCounts> {
        if let Some(hit) = self.cache.read().await.get(raffle_id, Instant::now()) {
            return Ok(hit);
        }

        let raffle = self.find_public_raffle(raffle_id).await?;
        let held = load_held_tickets(&self.pool, raffle_id, Utc::now(), None).await?;
        let counts = held.counts(raffle.total_tickets);

        let mut cache = self.cache.write().await;
        let now = Instant::now();
        cache.prune(now);
        cache.put(raffle_id, counts, now);
        Ok(counts)
    }

    pub async fn get_virtual_tickets(
        &self,
        raffle_id: i64,
        query: &VirtualTicketQuery,
    ) -> AppResult<PaginatedResponse<VirtualTicket>> {
        let raffle = self.find_public_raffle(raffle_id).await?;
        let params = PaginationParams::new(query.page, query.page_size, MAX_VIRTUAL_PAGE_SIZE);
        let held = load_held_tickets(&self.pool, raffle_id, Utc::now(), None).await?;
        let items = build_virtual_page(&raffle.numbering, raffle.total_tickets, &held, params);
        Ok(PaginatedResponse::new(items, params, raffle.total_tickets))
    }

    /// 按格式化票号查找（依赖已物化的 tickets 表）
    pub async fn search_ticket(&self, raffle_id: i64, number: &str) -> AppResult<TicketSearchResult> {
        let number = number.trim();
        if number.is_empty() || number.len() > 128 {
            return Err(AppError::ValidationError("Ticket number is required".into()));
        }
        self.find_public_raffle(raffle_id).await?;

        let found = tickets::Entity::find()
            .filter(tickets::Column::RaffleId.eq(raffle_id))
            .filter(tickets::Column::TicketNumber.eq(number))
            .one(&self.pool)
            .await?;

        let Some(ticket) = found else {
            return Ok(TicketSearchResult {
                found: false,
                ticket: None,
            });
        };

        let held = load_held_tickets(&self.pool, raffle_id, Utc::now(), None).await?;
        Ok(TicketSearchResult {
            found: true,
            ticket: Some(VirtualTicket {
                index: ticket.ticket_index,
                status: held.status_of(ticket.ticket_index),
                number: ticket.ticket_number,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{LuckyIndices, TicketRanges};
    use crate::utils::TicketRange;
    use chrono::Duration as ChronoDuration;

    fn order(id: i64, status: OrderStatus, ranges: Vec<TicketRange>, lucky: Vec<i64>) -> orders::Model {
        let now = Utc::now();
        let count = ranges.iter().map(|r| r.len()).sum::<i64>() + lucky.len() as i64;
        orders::Model {
            id,
            raffle_id: 1,
            organization_id: 1,
            buyer_name: "Buyer".into(),
            buyer_email: "buyer@example.com".into(),
            buyer_phone: None,
            buyer_city: None,
            ticket_ranges: TicketRanges(ranges),
            lucky_indices: LuckyIndices(lucky),
            ticket_count: count,
            reference_code: format!("REF{id:05}"),
            status,
            reserved_until: Some(now + ChronoDuration::minutes(10)),
            order_total_cents: 0,
            discount_cents: 0,
            coupon_id: None,
            payment_proof_url: None,
            approved_at: None,
            canceled_at: None,
            cancel_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_held_tickets_split_by_status() {
        let now = Utc::now();
        let mut expired = order(4, OrderStatus::Reserved, vec![TicketRange::new(50, 59)], vec![]);
        expired.reserved_until = Some(now - ChronoDuration::seconds(1));
        let list = vec![
            order(1, OrderStatus::Sold, vec![TicketRange::new(0, 4)], vec![]),
            order(2, OrderStatus::Pending, vec![], vec![10, 20]),
            order(3, OrderStatus::Reserved, vec![TicketRange::new(5, 7)], vec![]),
            expired,
            order(5, OrderStatus::Canceled, vec![TicketRange::new(80, 89)], vec![]),
        ];
        let held = HeldTickets::from_orders(&list, now);
        assert_eq!(held.sold.len(), 5);
        assert_eq!(held.reserved.len(), 5);
        assert_eq!(held.status_of(3), TicketStatus::Sold);
        assert_eq!(held.status_of(20), TicketStatus::Reserved);
        assert_eq!(held.status_of(55), TicketStatus::Available);
        assert_eq!(held.status_of(85), TicketStatus::Available);

        let counts = held.counts(100);
        assert_eq!(
            counts,
            VirtualTicketCounts {
                total: 100,
                sold: 5,
                reserved: 5,
                available: 90
            }
        );
        assert_eq!(held.all().len(), 10);
    }

    #[test]
    fn test_held_tickets_scale_with_many_orders() {
        let now = Utc::now();
        // 间隔下标，区间无法合并
        let list: Vec<orders::Model> = (0..20_000)
            .map(|i| order(i, OrderStatus::Sold, vec![], vec![i * 2]))
            .collect();
        let started = Instant::now();
        let held = HeldTickets::from_orders(&list, now);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(held.sold.len(), 20_000);
        assert_eq!(held.sold.ranges().len(), 20_000);
        assert!(held.sold.contains(39_998));
        assert!(!held.sold.contains(39_999));
        assert!(held.reserved.is_empty());
    }

    #[test]
    fn test_virtual_page_formats_and_clamps() {
        let numbering = NumberingConfig::default_for(1000);
        let held = HeldTickets {
            sold: TicketSet::from_indices(&[0]),
            reserved: TicketSet::from_indices(&[1]),
        };
        let page = build_virtual_page(
            &numbering,
            1000,
            &held,
            PaginationParams::new(Some(1), Some(3), MAX_VIRTUAL_PAGE_SIZE),
        );
        assert_eq!(page.len(), 3);
        assert_eq!(page[0].number, "0001");
        assert_eq!(page[0].status, TicketStatus::Sold);
        assert_eq!(page[1].status, TicketStatus::Reserved);
        assert_eq!(page[2].status, TicketStatus::Available);

        let last = build_virtual_page(
            &numbering,
            1000,
            &held,
            PaginationParams::new(Some(2), Some(600), MAX_VIRTUAL_PAGE_SIZE),
        );
        assert_eq!(last.len(), 500);
        assert_eq!(last[0].index, 500);

        let beyond = build_virtual_page(
            &numbering,
            1000,
            &held,
            PaginationParams::new(Some(9), Some(500), MAX_VIRTUAL_PAGE_SIZE),
        );
        assert!(beyond.is_empty());
    }

    #[test]
    fn test_summarize_orders_separates_elapsed_holds() {
        let now = Utc::now();
        let mut elapsed = order(2, OrderStatus::Reserved, vec![TicketRange::new(0, 1)], vec![]);
        elapsed.reserved_until = Some(now - ChronoDuration::minutes(1));
        let list = vec![
            order(1, OrderStatus::Reserved, vec![TicketRange::new(5, 7)], vec![]),
            elapsed,
            order(3, OrderStatus::Sold, vec![], vec![9]),
            order(4, OrderStatus::Sold, vec![TicketRange::new(10, 19)], vec![]),
        ];
        let c = summarize_orders(&list, now);
        assert_eq!(c.reserved, StatusCount { orders: 1, tickets: 3 });
        assert_eq!(c.expired_holds, StatusCount { orders: 1, tickets: 2 });
        assert_eq!(c.sold, StatusCount { orders: 2, tickets: 11 });
        assert_eq!(c.pending, StatusCount::default());
    }

    #[test]
    fn test_counts_cache_ttl_and_invalidation() {
        let mut cache = CountsCache::default();
        let t0 = Instant::now();
        let counts = VirtualTicketCounts {
            total: 10,
            sold: 1,
            reserved: 2,
            available: 7,
        };
        cache.put(1, counts, t0);
        assert_eq!(cache.get(1, t0 + Duration::from_secs(4)), Some(counts));
        assert_eq!(cache.get(1, t0 + COUNTS_TTL), None);

        cache.put(1, counts, t0);
        cache.invalidate(1);
        assert_eq!(cache.get(1, t0), None);

        cache.put(2, counts, t0);
        cache.prune(t0 + Duration::from_secs(6));
        assert_eq!(cache.get(2, t0), None);
    }
}
