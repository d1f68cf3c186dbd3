use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// 预留倒计时。到期后 `poll` 只触发一次。
#[derive(Debug, Clone)]
pub struct ReservationCountdown {
    reserved_until: DateTime<Utc>,
    fired: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownEvent {
    Expired,
}

impl ReservationCountdown {
    pub fn new(reserved_until: DateTime<Utc>) -> Self {
        Self {
            reserved_until,
            fired: false,
        }
    }

    pub fn reserved_until(&self) -> DateTime<Utc> {
        self.reserved_until
    }

    /// 剩余时间，已到期为 0
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.reserved_until - now).max(Duration::zero())
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.reserved_until
    }

    pub fn poll(&mut self, now: DateTime<Utc>) -> Option<CountdownEvent> {
        if self.fired || !self.is_expired(now) {
            return None;
        }
        self.fired = true;
        Some(CountdownEvent::Expired)
    }
}

/// 按订单跟踪多个预留倒计时，`due` 对每个到期订单只返回一次
#[derive(Debug, Default)]
pub struct ExpiryTracker {
    holds: HashMap<i64, ReservationCountdown>,
}

impl ExpiryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 开始跟踪；预留时间变化时（例如续期）重置倒计时
    pub fn track(&mut self, order_id: i64, reserved_until: DateTime<Utc>) {
        match self.holds.get(&order_id) {
            Some(existing) if existing.reserved_until() == reserved_until => {}
            _ => {
                self.holds
                    .insert(order_id, ReservationCountdown::new(reserved_until));
            }
        }
    }

    pub fn untrack(&mut self, order_id: i64) {
        self.holds.remove(&order_id);
    }

    /// 只保留仍处于预留状态的订单
    pub fn retain(&mut self, mut keep: impl FnMut(i64) -> bool) {
        self.holds.retain(|id, _| keep(*id));
    }

    pub fn len(&self) -> usize {
        self.holds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.holds.is_empty()
    }

    pub fn due(&mut self, now: DateTime<Utc>) -> Vec<i64> {
        let mut fired: Vec<i64> = self
            .holds
            .iter_mut()
            .filter_map(|(id, cd)| cd.poll(now).map(|_| *id))
            .collect();
        for id in &fired {
            self.holds.remove(id);
        }
        fired.sort_unstable();
        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_fires_exactly_once() {
        let mut cd = ReservationCountdown::new(t(60));
        assert_eq!(cd.poll(t(0)), None);
        assert_eq!(cd.poll(t(59)), None);
        assert_eq!(cd.poll(t(60)), Some(CountdownEvent::Expired));
        assert_eq!(cd.poll(t(61)), None);
        assert_eq!(cd.poll(t(3600)), None);
    }

    #[test]
    fn test_remaining_never_negative() {
        let cd = ReservationCountdown::new(t(30));
        assert_eq!(cd.remaining(t(10)), Duration::seconds(20));
        assert_eq!(cd.remaining(t(45)), Duration::zero());
        assert!(cd.is_expired(t(30)));
        assert!(!cd.is_expired(t(29)));
    }

    #[test]
    fn test_tracker_reports_each_order_once() {
        let mut tracker = ExpiryTracker::new();
        tracker.track(1, t(10));
        tracker.track(2, t(20));
        tracker.track(3, t(100));

        assert!(tracker.due(t(5)).is_empty());
        assert_eq!(tracker.due(t(25)), vec![1, 2]);
        assert!(tracker.due(t(30)).is_empty());
        assert_eq!(tracker.len(), 1);

        // 重复 track 同一时间不会重置
        tracker.track(3, t(100));
        assert_eq!(tracker.due(t(100)), vec![3]);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_tracker_extension_resets_countdown() {
        let mut tracker = ExpiryTracker::new();
        tracker.track(7, t(10));
        tracker.track(7, t(50));
        assert!(tracker.due(t(20)).is_empty());
        assert_eq!(tracker.due(t(50)), vec![7]);
    }

    #[test]
    fn test_tracker_retain_drops_settled_orders() {
        let mut tracker = ExpiryTracker::new();
        tracker.track(1, t(10));
        tracker.track(2, t(10));
        tracker.retain(|id| id != 1);
        assert_eq!(tracker.due(t(10)), vec![2]);
    }
}
