use crate::config::TicketJobConfig;
use crate::entities::{
    JobStatus, raffle_entity as raffles, ticket_entity as tickets, ticket_job_entity as jobs,
};
use crate::error::{AppError, AppResult};
use crate::models::{
    AuthContext, GenerationStart, JobUpdate, ObservedState, TicketJobResponse, WatchJobQuery,
    WatchJobResponse,
};
use crate::utils::{NumberingConfig, ProgressTracker, format_ticket_number};
use chrono::Utc;
use sea_orm::sea_query::{Expr, OnConflict, PostgresQueryBuilder, Query};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, broadcast};
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep_until};

const UPDATE_CHANNEL_CAPACITY: usize = 256;

/// 生成入口的决策
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationPlan {
    AlreadyComplete,
    /// 已有 pending/running 任务
    AttachToActive,
    Inline,
    Spawn,
}

/// failed / cancelled 的任务不算进行中，再次调用会新建任务；
/// 已写入的行由 ON CONFLICT 跳过
pub fn plan_generation(
    materialized: i64,
    total_tickets: i64,
    has_active_job: bool,
    sync_threshold: i64,
) -> GenerationPlan {
    if materialized >= total_tickets {
        GenerationPlan::AlreadyComplete
    } else if has_active_job {
        GenerationPlan::AttachToActive
    } else if total_tickets <= sync_threshold {
        GenerationPlan::Inline
    } else {
        GenerationPlan::Spawn
    }
}

/// 写入 [start, end) 区间的票号，已存在的行跳过
pub async fn insert_ticket_batch<C: ConnectionTrait>(
    conn: &C,
    raffle_id: i64,
    numbering: &NumberingConfig,
    start: i64,
    end: i64,
) -> AppResult<()> {
    if start >= end {
        return Ok(());
    }
    let mut insert = Query::insert();
    insert.into_table(tickets::Entity).columns([
        tickets::Column::RaffleId,
        tickets::Column::TicketIndex,
        tickets::Column::TicketNumber,
    ]);
    for index in start..end {
        insert.values_panic([
            raffle_id.into(),
            index.into(),
            format_ticket_number(numbering, index).into(),
        ]);
    }
    insert.on_conflict(
        OnConflict::columns([tickets::Column::RaffleId, tickets::Column::TicketIndex])
            .do_nothing()
            .to_owned(),
    );
    let (sql, values) = insert.build(PostgresQueryBuilder);
    let stmt =
        sea_orm::Statement::from_sql_and_values(sea_orm::DatabaseBackend::Postgres, sql, values);
    conn.execute(stmt).await?;
    Ok(())
}

/// 等待任务状态相对 `last` 发生变化。
///
/// 同时监听广播推送与定时轮询，任一通道先送达变化即返回；
/// 推送只作为触发信号，返回值总是 `poll` 读到的最新快照，
/// 因此按状态（而非来源）去重。超时返回 `None`。
pub async fn observe_next<F, Fut>(
    rx: &mut broadcast::Receiver<JobUpdate>,
    job_id: i64,
    last: ObservedState,
    poll_every: Duration,
    timeout: Duration,
    mut poll: F,
) -> AppResult<Option<jobs::Model>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<jobs::Model>>,
{
    let deadline = Instant::now() + timeout;

    let current = poll().await?;
    if last.differs_from(current.status, current.generated_count) {
        return Ok(Some(current));
    }

    // 轮询计时器只创建一次，无关推送不会重置它
    let poll_every = poll_every.max(Duration::from_millis(1));
    let mut ticker = interval_at(Instant::now() + poll_every, poll_every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut push_open = true;
    loop {
        tokio::select! {
            _ = sleep_until(deadline) => return Ok(None),
            msg = rx.recv(), if push_open => {
                match msg {
                    Ok(update) if update.job_id != job_id => continue,
                    Ok(update) if !last.differs_from(update.status, update.generated_count) => continue,
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => {
                        push_open = false;
                        continue;
                    }
                }
            }
            _ = ticker.tick() => {}
        }

        let current = poll().await?;
        if last.differs_from(current.status, current.generated_count) {
            return Ok(Some(current));
        }
    }
}

#[derive(Clone)]
pub struct TicketJobService {
    pool: DatabaseConnection,
    config: TicketJobConfig,
    updates: broadcast::Sender<JobUpdate>,
    progress: Arc<RwLock<HashMap<i64, ProgressTracker>>>,
}

impl TicketJobService {
    pub fn new(pool: DatabaseConnection, config: TicketJobConfig) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            pool,
            config,
            updates,
            progress: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn batch_size(&self) -> i64 {
        self.config.batch_size.max(1)
    }

    /// 发布后或手动重试时开始生成票号
    pub async fn start_generation(&self, raffle: &raffles::Model) -> AppResult<GenerationStart> {
        let materialized = tickets::Entity::find()
            .filter(tickets::Column::RaffleId.eq(raffle.id))
            .count(&self.pool)
            .await? as i64;
        let active = jobs::Entity::find()
            .filter(jobs::Column::RaffleId.eq(raffle.id))
            .filter(jobs::Column::Status.is_in([JobStatus::Pending, JobStatus::Running]))
            .one(&self.pool)
            .await?;

        let plan = plan_generation(
            materialized,
            raffle.total_tickets,
            active.is_some(),
            self.config.sync_threshold,
        );
        if plan == GenerationPlan::AlreadyComplete {
            return Ok(GenerationStart::Completed {
                total_tickets: raffle.total_tickets,
            });
        }
        if let Some(active) = active {
            return Ok(GenerationStart::Queued {
                job: self.to_response(active).await,
            });
        }

        if plan == GenerationPlan::Inline {
            let batch = self.batch_size();
            let mut start = 0;
            while start < raffle.total_tickets {
                let end = (start + batch).min(raffle.total_tickets);
                insert_ticket_batch(&self.pool, raffle.id, &raffle.numbering, start, end).await?;
                start = end;
            }
            log::info!(
                "Generated {} tickets inline for raffle {}",
                raffle.total_tickets,
                raffle.id
            );
            return Ok(GenerationStart::Completed {
                total_tickets: raffle.total_tickets,
            });
        }

        let batch = self.batch_size();
        let total_batches = ((raffle.total_tickets + batch - 1) / batch) as i32;
        let job = jobs::ActiveModel {
            raffle_id: Set(raffle.id),
            total_tickets: Set(raffle.total_tickets),
            generated_count: Set(0),
            batch_size: Set(batch as i32),
            total_batches: Set(total_batches),
            current_batch: Set(0),
            status: Set(JobStatus::Pending),
            ..Default::default()
        }
        .insert(&self.pool)
        .await?;

        log::info!(
            "Queued ticket generation job {} for raffle {} ({} tickets, {} batches, {} already present)",
            job.id,
            raffle.id,
            raffle.total_tickets,
            total_batches,
            materialized
        );
        self.spawn_worker(job.id);
        Ok(GenerationStart::Queued {
            job: self.to_response(job).await,
        })
    }

    /// 启动时恢复未完成的任务
    pub async fn resume_unfinished(&self) -> AppResult<usize> {
        let list = jobs::Entity::find()
            .filter(jobs::Column::Status.is_in([JobStatus::Pending, JobStatus::Running]))
            .order_by_asc(jobs::Column::Id)
            .all(&self.pool)
            .await?;
        for job in &list {
            log::info!(
                "Resuming ticket generation job {} at {}/{}",
                job.id,
                job.generated_count,
                job.total_tickets
            );
            self.spawn_worker(job.id);
        }
        Ok(list.len())
    }

    fn spawn_worker(&self, job_id: i64) {
        let svc = self.clone();
        tokio::spawn(async move {
            if let Err(e) = svc.run_job(job_id).await {
                log::error!("Ticket generation job {job_id} failed: {e}");
                if let Err(mark_err) = svc.mark_failed(job_id, &e.to_string()).await {
                    log::error!("Failed to mark job {job_id} as failed: {mark_err}");
                }
            }
            svc.progress.write().await.remove(&job_id);
        });
    }

    async fn run_job(&self, job_id: i64) -> AppResult<()> {
        let job = self.find_job(job_id).await?;
        let raffle = raffles::Entity::find_by_id(job.raffle_id)
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Raffle not found".into()))?;

        // pending -> running（已取消的任务不会被改写）
        jobs::Entity::update_many()
            .col_expr(jobs::Column::Status, Expr::value(JobStatus::Running))
            .col_expr(
                jobs::Column::StartedAt,
                Expr::value(job.started_at.unwrap_or_else(Utc::now)),
            )
            .col_expr(jobs::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(jobs::Column::Id.eq(job_id))
            .filter(jobs::Column::Status.is_in([JobStatus::Pending, JobStatus::Running]))
            .exec(&self.pool)
            .await?;

        {
            let mut progress = self.progress.write().await;
            progress
                .entry(job_id)
                .or_default()
                .record(job.generated_count, Utc::now());
        }

        loop {
            // 每批之前重新读取状态：取消是协作式的
            let job = self.find_job(job_id).await?;
            if job.status == JobStatus::Cancelled {
                log::info!(
                    "Ticket generation job {job_id} cancelled at {}/{}",
                    job.generated_count,
                    job.total_tickets
                );
                self.publish(&job);
                return Ok(());
            }
            if job.status.is_terminal() {
                return Ok(());
            }
            if job.generated_count >= job.total_tickets {
                break;
            }

            let start = job.generated_count;
            let end = (start + job.batch_size.max(1) as i64).min(job.total_tickets);
            insert_ticket_batch(&self.pool, raffle.id, &raffle.numbering, start, end).await?;

            let res = jobs::Entity::update_many()
                .col_expr(jobs::Column::GeneratedCount, Expr::value(end))
                .col_expr(jobs::Column::CurrentBatch, Expr::value(job.current_batch + 1))
                .col_expr(jobs::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(jobs::Column::Id.eq(job_id))
                .filter(jobs::Column::Status.eq(JobStatus::Running))
                .exec(&self.pool)
                .await?;
            if res.rows_affected == 0 {
                // 状态被外部修改，下一轮读取后处理
                continue;
            }

            self.progress
                .write()
                .await
                .entry(job_id)
                .or_default()
                .record(end, Utc::now());
            self.publish_state(job_id, JobStatus::Running, end);
        }

        jobs::Entity::update_many()
            .col_expr(jobs::Column::Status, Expr::value(JobStatus::Completed))
            .col_expr(jobs::Column::CompletedAt, Expr::value(Utc::now()))
            .col_expr(jobs::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(jobs::Column::Id.eq(job_id))
            .filter(jobs::Column::Status.eq(JobStatus::Running))
            .exec(&self.pool)
            .await?;

        let job = self.find_job(job_id).await?;
        log::info!(
            "Ticket generation job {job_id} finished with status {:?} ({} tickets)",
            job.status,
            job.generated_count
        );
        self.publish(&job);
        Ok(())
    }

    async fn mark_failed(&self, job_id: i64, message: &str) -> AppResult<()> {
        jobs::Entity::update_many()
            .col_expr(jobs::Column::Status, Expr::value(JobStatus::Failed))
            .col_expr(jobs::Column::ErrorMessage, Expr::value(message.to_string()))
            .col_expr(jobs::Column::CompletedAt, Expr::value(Utc::now()))
            .col_expr(jobs::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(jobs::Column::Id.eq(job_id))
            .filter(jobs::Column::Status.is_in([JobStatus::Pending, JobStatus::Running]))
            .exec(&self.pool)
            .await?;
        let job = self.find_job(job_id).await?;
        self.publish(&job);
        Ok(())
    }

    fn publish(&self, job: &jobs::Model) {
        self.publish_state(job.id, job.status, job.generated_count);
    }

    fn publish_state(&self, job_id: i64, status: JobStatus, generated_count: i64) {
        // 没有订阅者时 send 返回 Err，忽略即可
        let _ = self.updates.send(JobUpdate {
            job_id,
            status,
            generated_count,
        });
    }

    async fn find_job(&self, job_id: i64) -> AppResult<jobs::Model> {
        jobs::Entity::find_by_id(job_id)
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Ticket generation job not found".into()))
    }

    /// 任务须属于当前组织的活动
    async fn find_job_for(&self, ctx: &AuthContext, job_id: i64) -> AppResult<jobs::Model> {
        let job = self.find_job(job_id).await?;
        let raffle = raffles::Entity::find_by_id(job.raffle_id)
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Ticket generation job not found".into()))?;
        ctx.ensure_same_org(raffle.organization_id, "Ticket generation job")?;
        Ok(job)
    }

    async fn to_response(&self, job: jobs::Model) -> TicketJobResponse {
        let progress = self.progress.read().await;
        let tracker = progress.get(&job.id);
        TicketJobResponse::from_model(job, tracker)
    }

    pub async fn get_job_status(&self, ctx: &AuthContext, job_id: i64) -> AppResult<TicketJobResponse> {
        let job = self.find_job_for(ctx, job_id).await?;
        Ok(self.to_response(job).await)
    }

    /// 最近一次生成任务（活动详情页使用）
    pub async fn latest_job_for_raffle(&self, raffle_id: i64) -> AppResult<Option<TicketJobResponse>> {
        let job = jobs::Entity::find()
            .filter(jobs::Column::RaffleId.eq(raffle_id))
            .order_by_desc(jobs::Column::Id)
            .one(&self.pool)
            .await?;
        Ok(match job {
            Some(j) => Some(self.to_response(j).await),
            None => None,
        })
    }

    /// 取消任务；已结束的任务原样返回
    pub async fn cancel_job(&self, ctx: &AuthContext, job_id: i64) -> AppResult<TicketJobResponse> {
        ctx.require_manager()?;
        let job = self.find_job_for(ctx, job_id).await?;
        if job.status.is_terminal() {
            log::info!("Job {job_id} already {:?}, nothing to cancel", job.status);
            return Ok(self.to_response(job).await);
        }
        self.cancel_jobs_for_raffle(&self.pool, job.raffle_id).await?;
        let job = self.find_job(job_id).await?;
        self.publish(&job);
        Ok(self.to_response(job).await)
    }

    /// 取消活动下所有未结束的任务（活动取消时也会调用）
    pub async fn cancel_jobs_for_raffle<C: ConnectionTrait>(
        &self,
        conn: &C,
        raffle_id: i64,
    ) -> AppResult<u64> {
        let res = jobs::Entity::update_many()
            .col_expr(jobs::Column::Status, Expr::value(JobStatus::Cancelled))
            .col_expr(jobs::Column::CompletedAt, Expr::value(Utc::now()))
            .col_expr(jobs::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(jobs::Column::RaffleId.eq(raffle_id))
            .filter(jobs::Column::Status.is_in([JobStatus::Pending, JobStatus::Running]))
            .exec(conn)
            .await?;
        Ok(res.rows_affected)
    }

    pub async fn watch_job(
        &self,
        ctx: &AuthContext,
        job_id: i64,
        query: &WatchJobQuery,
    ) -> AppResult<WatchJobResponse> {
        // 先订阅再读取，避免错过两者之间的推送
        let mut rx = self.updates.subscribe();
        self.find_job_for(ctx, job_id).await?;

        let last = ObservedState {
            status: query.last_status,
            generated_count: query.last_count,
        };
        let timeout = Duration::from_secs(
            query
                .timeout_secs
                .unwrap_or(self.config.max_watch_secs)
                .min(self.config.max_watch_secs),
        );
        let poll_every = Duration::from_millis(self.config.poll_interval_ms.max(100));

        let changed = observe_next(&mut rx, job_id, last, poll_every, timeout, || {
            self.find_job(job_id)
        })
        .await?;

        Ok(match changed {
            Some(job) => WatchJobResponse {
                changed: true,
                job: self.to_response(job).await,
            },
            None => WatchJobResponse {
                changed: false,
                job: self.to_response(self.find_job(job_id).await?).await,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::sleep;

    #[test]
    fn test_plan_generation_restarts_after_failed_job() {
        // 完整生成后不再重复
        assert_eq!(plan_generation(50_000, 50_000, false, 10_000), GenerationPlan::AlreadyComplete);
        // 进行中的任务直接复用
        assert_eq!(plan_generation(5_000, 50_000, true, 10_000), GenerationPlan::AttachToActive);
        // 上次任务失败或被取消，只写了一部分：重新排队
        assert_eq!(plan_generation(5_000, 50_000, false, 10_000), GenerationPlan::Spawn);
        assert_eq!(plan_generation(0, 8_000, false, 10_000), GenerationPlan::Inline);
        assert_eq!(plan_generation(7_999, 8_000, false, 10_000), GenerationPlan::Inline);
    }

    fn job(status: JobStatus, generated_count: i64) -> jobs::Model {
        let now = Utc::now();
        jobs::Model {
            id: 7,
            raffle_id: 1,
            total_tickets: 100_000,
            generated_count,
            batch_size: 5_000,
            total_batches: 20,
            current_batch: (generated_count / 5_000) as i32,
            status,
            error_message: None,
            started_at: Some(now),
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn seen(status: JobStatus, count: i64) -> ObservedState {
        ObservedState {
            status: Some(status),
            generated_count: Some(count),
        }
    }

    #[tokio::test]
    async fn test_returns_immediately_when_state_already_differs() {
        let (_tx, mut rx) = broadcast::channel(8);
        let got = observe_next(
            &mut rx,
            7,
            seen(JobStatus::Running, 0),
            Duration::from_secs(60),
            Duration::from_secs(60),
            || async { Ok(job(JobStatus::Running, 5_000)) },
        )
        .await
        .unwrap();
        assert_eq!(got.map(|j| j.generated_count), Some(5_000));
    }

    #[tokio::test]
    async fn test_push_wins_over_slow_polling() {
        let (tx, mut rx) = broadcast::channel(8);
        let polls = Arc::new(AtomicUsize::new(0));
        let counter = polls.clone();

        tokio::spawn(async move {
            sleep(Duration::from_millis(20)).await;
            // 其他任务的推送会被忽略
            let _ = tx.send(JobUpdate {
                job_id: 99,
                status: JobStatus::Completed,
                generated_count: 1,
            });
            let _ = tx.send(JobUpdate {
                job_id: 7,
                status: JobStatus::Completed,
                generated_count: 100_000,
            });
        });

        let started = std::time::Instant::now();
        let got = observe_next(
            &mut rx,
            7,
            seen(JobStatus::Running, 95_000),
            Duration::from_secs(30),
            Duration::from_secs(30),
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    Ok(if n == 0 {
                        job(JobStatus::Running, 95_000)
                    } else {
                        job(JobStatus::Completed, 100_000)
                    })
                }
            },
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(got.status, JobStatus::Completed);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(polls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_polling_fallback_without_push() {
        let (tx, mut rx) = broadcast::channel::<JobUpdate>(8);
        drop(tx);
        let polls = Arc::new(AtomicUsize::new(0));
        let counter = polls.clone();

        let got = observe_next(
            &mut rx,
            7,
            seen(JobStatus::Running, 10_000),
            Duration::from_millis(10),
            Duration::from_secs(5),
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    Ok(if n < 3 {
                        job(JobStatus::Running, 10_000)
                    } else {
                        job(JobStatus::Running, 15_000)
                    })
                }
            },
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(got.generated_count, 15_000);
        assert_eq!(polls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_polling_continues_under_unrelated_pushes() {
        let (tx, mut rx) = broadcast::channel(1024);
        tokio::spawn(async move {
            for i in 0..500 {
                let update = JobUpdate {
                    job_id: 99,
                    status: JobStatus::Running,
                    generated_count: i,
                };
                if tx.send(update).is_err() {
                    break;
                }
                sleep(Duration::from_millis(2)).await;
            }
        });
        let polls = Arc::new(AtomicUsize::new(0));
        let counter = polls.clone();

        let started = std::time::Instant::now();
        let got = observe_next(
            &mut rx,
            7,
            seen(JobStatus::Running, 10_000),
            Duration::from_millis(20),
            Duration::from_secs(5),
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    Ok(if n == 0 {
                        job(JobStatus::Running, 10_000)
                    } else {
                        job(JobStatus::Running, 15_000)
                    })
                }
            },
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(got.generated_count, 15_000);
        assert_eq!(polls.load(Ordering::SeqCst), 2);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_duplicate_push_of_seen_state_is_ignored() {
        let (tx, mut rx) = broadcast::channel(8);
        let polls = Arc::new(AtomicUsize::new(0));
        let counter = polls.clone();

        tx.send(JobUpdate {
            job_id: 7,
            status: JobStatus::Running,
            generated_count: 20_000,
        })
        .unwrap();

        let got = observe_next(
            &mut rx,
            7,
            seen(JobStatus::Running, 20_000),
            Duration::from_secs(30),
            Duration::from_millis(50),
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok(job(JobStatus::Running, 20_000)) }
            },
        )
        .await
        .unwrap();

        assert!(got.is_none());
        // 只有初始读取，重复推送不触发轮询
        assert_eq!(polls.load(Ordering::SeqCst), 1);
    }
}
