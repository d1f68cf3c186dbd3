use crate::entities::{JobStatus, ticket_job_entity};
use crate::utils::ProgressTracker;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// 生成任务快照 + 派生指标
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TicketJobResponse {
    pub id: i64,
    pub raffle_id: i64,
    pub status: JobStatus,
    pub total_tickets: i64,
    pub generated_count: i64,
    pub current_batch: i32,
    pub total_batches: i32,
    pub percentage: f64,
    /// 平滑后的每秒生成数
    pub tickets_per_second: Option<f64>,
    pub eta_seconds: Option<f64>,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TicketJobResponse {
    pub fn from_model(m: ticket_job_entity::Model, progress: Option<&ProgressTracker>) -> Self {
        let eta = if m.status.is_terminal() {
            None
        } else {
            progress.and_then(|p| p.eta_seconds(m.total_tickets))
        };
        Self {
            id: m.id,
            raffle_id: m.raffle_id,
            status: m.status,
            total_tickets: m.total_tickets,
            generated_count: m.generated_count,
            current_batch: m.current_batch,
            total_batches: m.total_batches,
            percentage: ProgressTracker::percentage(m.generated_count, m.total_tickets),
            tickets_per_second: progress.and_then(|p| p.speed()),
            eta_seconds: eta,
            error_message: m.error_message,
            started_at: m.started_at,
            completed_at: m.completed_at,
        }
    }
}

/// 生成启动结果：小活动同步完成，大活动排队
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum GenerationStart {
    Completed { total_tickets: i64 },
    Queued { job: TicketJobResponse },
}

/// 广播给观察者的任务变化
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobUpdate {
    pub job_id: i64,
    pub status: JobStatus,
    pub generated_count: i64,
}

/// 观察者上次看到的状态；不同于它的快照才返回
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObservedState {
    pub status: Option<JobStatus>,
    pub generated_count: Option<i64>,
}

impl ObservedState {
    pub fn differs_from(&self, status: JobStatus, generated_count: i64) -> bool {
        self.status != Some(status) || self.generated_count != Some(generated_count)
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct WatchJobQuery {
    pub last_status: Option<JobStatus>,
    pub last_count: Option<i64>,
    /// 最长等待秒数（受配置上限约束）
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WatchJobResponse {
    /// false 表示超时内状态未变化
    pub changed: bool,
    pub job: TicketJobResponse,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observed_state_dedupes_by_state() {
        let seen = ObservedState {
            status: Some(JobStatus::Running),
            generated_count: Some(500),
        };
        assert!(!seen.differs_from(JobStatus::Running, 500));
        assert!(seen.differs_from(JobStatus::Running, 1000));
        assert!(seen.differs_from(JobStatus::Completed, 500));

        let fresh = ObservedState {
            status: None,
            generated_count: None,
        };
        assert!(fresh.differs_from(JobStatus::Pending, 0));
    }
}
