use chrono::{DateTime, Utc};

/// 新样本权重
const EMA_ALPHA: f64 = 0.3;

/// 生成进度跟踪：百分比、指数平滑速度 (0.3 新 / 0.7 旧)、剩余时间
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    last_sample: Option<(i64, DateTime<Utc>)>,
    speed: Option<f64>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一次 (count, time) 采样。时间不前进或数量回退的样本不参与速度计算。
    pub fn record(&mut self, count: i64, at: DateTime<Utc>) {
        if let Some((prev_count, prev_at)) = self.last_sample {
            let dt = (at - prev_at).num_milliseconds() as f64 / 1000.0;
            if dt <= 0.0 || count < prev_count {
                return;
            }
            let instant = (count - prev_count) as f64 / dt;
            self.speed = Some(match self.speed {
                None => instant,
                Some(old) => EMA_ALPHA * instant + (1.0 - EMA_ALPHA) * old,
            });
        }
        self.last_sample = Some((count, at));
    }

    /// 每秒生成数
    pub fn speed(&self) -> Option<f64> {
        self.speed
    }

    pub fn last_count(&self) -> Option<i64> {
        self.last_sample.map(|(c, _)| c)
    }

    pub fn percentage(count: i64, total: i64) -> f64 {
        if total <= 0 {
            return 0.0;
        }
        (count as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
    }

    /// 预计剩余秒数；速度未知或为 0 时返回 None
    pub fn eta_seconds(&self, total: i64) -> Option<f64> {
        let speed = self.speed.filter(|s| *s > 0.0)?;
        let count = self.last_count()?;
        let remaining = (total - count).max(0);
        Some(remaining as f64 / speed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_first_interval_sets_speed() {
        let mut p = ProgressTracker::new();
        p.record(0, t0());
        assert_eq!(p.speed(), None);
        p.record(500, t0() + Duration::seconds(2));
        assert_eq!(p.speed(), Some(250.0));
    }

    #[test]
    fn test_ema_weighting() {
        let mut p = ProgressTracker::new();
        p.record(0, t0());
        p.record(100, t0() + Duration::seconds(1)); // 100/s
        p.record(400, t0() + Duration::seconds(2)); // 300/s
        let s = p.speed().unwrap();
        assert!((s - (0.3 * 300.0 + 0.7 * 100.0)).abs() < 1e-9);
    }

    #[test]
    fn test_converges_to_true_rate() {
        let mut p = ProgressTracker::new();
        // 第一段异常快，之后稳定 100/s
        p.record(0, t0());
        p.record(500, t0() + Duration::seconds(1));
        let mut count = 500;
        let mut prev_err = f64::MAX;
        for i in 2..40 {
            count += 100;
            p.record(count, t0() + Duration::seconds(i));
            let err = (p.speed().unwrap() - 100.0).abs();
            assert!(err <= prev_err);
            prev_err = err;
        }
        assert!(prev_err < 1.0);
    }

    #[test]
    fn test_ignores_non_monotonic_samples() {
        let mut p = ProgressTracker::new();
        p.record(0, t0());
        p.record(100, t0() + Duration::seconds(1));
        p.record(50, t0() + Duration::seconds(2));
        p.record(200, t0() + Duration::seconds(1));
        assert_eq!(p.speed(), Some(100.0));
        assert_eq!(p.last_count(), Some(100));
    }

    #[test]
    fn test_percentage_and_eta() {
        assert_eq!(ProgressTracker::percentage(250, 1000), 25.0);
        assert_eq!(ProgressTracker::percentage(10, 0), 0.0);

        let mut p = ProgressTracker::new();
        assert_eq!(p.eta_seconds(1000), None);
        p.record(0, t0());
        p.record(200, t0() + Duration::seconds(2));
        assert_eq!(p.eta_seconds(1000), Some(8.0));
    }
}
