// ==========================================
// 橱柜工坊偏差引擎 - 重算任务队列
// ==========================================
// 职责: 触发器入队，后台 worker 池异步执行重算
// 流程: enqueue → mpsc 通道 → worker → RiskOrchestrator::execute
// 记录: 每个任务一条 recalc_log（RUNNING → COMPLETED / FAILED）
// 红线: 入队不阻塞调用方，也不向调用方报错（队列关闭只记日志）
// ==========================================

use crate::config::RecalcConfig;
use crate::engine::events::{RecalcEventPublisher, RecalcStage, RecalcTrigger};
use crate::engine::orchestrator::RiskOrchestrator;
use crate::repository::recalc_log_repo::{
    RecalcLogEntity, RecalcLogRepository, STATUS_COMPLETED, STATUS_FAILED, STATUS_RUNNING,
};
use chrono::Utc;
use futures::future::join_all;
use std::error::Error;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// 重试间隔基数（第 n 次重试等待 n 倍）
const RETRY_BACKOFF: Duration = Duration::from_millis(20);

// ==========================================
// RecalcJob - 重算任务
// ==========================================
#[derive(Debug, Clone)]
pub struct RecalcJob {
    pub job_id: String,
    pub trigger: RecalcTrigger,
    /// 本任务涉及的阶段（由触发器决定）
    pub stages: Vec<RecalcStage>,
}

impl RecalcJob {
    pub fn new(trigger: RecalcTrigger) -> Self {
        Self {
            job_id: Uuid::new_v4().to_string(),
            stages: RecalcStage::for_trigger(&trigger),
            trigger,
        }
    }
}

// ==========================================
// QueueStats - 队列统计
// ==========================================
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub enqueued: u64,
    pub completed: u64,
    pub failed: u64,
    pub retries: u64,
    /// 队列关闭或无运行时导致丢弃的任务
    pub dropped: u64,
}

#[derive(Debug, Default)]
struct StatsCounters {
    enqueued: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    retries: AtomicU64,
    dropped: AtomicU64,
}

impl StatsCounters {
    fn snapshot(&self) -> QueueStats {
        QueueStats {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

// ==========================================
// Worker 上下文
// ==========================================
struct WorkerContext {
    orchestrator: Arc<RiskOrchestrator>,
    log_repo: Arc<RecalcLogRepository>,
    counters: Arc<StatsCounters>,
    max_retries: u32,
}

impl WorkerContext {
    async fn run_job(&self, worker_id: usize, job: RecalcJob) {
        let clock = Instant::now();
        let entity = RecalcLogEntity {
            job_id: job.job_id.clone(),
            project_id: job.trigger.project_id().map(str::to_string),
            trigger_type: job.trigger.as_str().to_string(),
            stages: RecalcStage::join(&job.stages),
            status: STATUS_RUNNING.to_string(),
            retry_count: 0,
            error_message: None,
            started_at: Utc::now().to_rfc3339(),
            completed_at: None,
            duration_ms: None,
        };
        if let Err(e) = self.log_repo.insert_running(&entity) {
            warn!(job_id = %job.job_id, error = %e, "写入重算日志失败");
        }

        let mut retries: u32 = 0;
        let outcome = loop {
            let attempt = match self.orchestrator.execute(&job.trigger).await {
                Ok(report) => match report.failure_summary() {
                    None => Ok(report.projects.len()),
                    Some(summary) => Err(summary),
                },
                Err(e) => Err(e.to_string()),
            };
            match attempt {
                Ok(projects) => break Ok(projects),
                Err(message) if retries < self.max_retries => {
                    retries += 1;
                    self.counters.retries.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        worker_id,
                        job_id = %job.job_id,
                        retry_count = retries,
                        error = %message,
                        "重算任务失败，准备重试"
                    );
                    tokio::time::sleep(RETRY_BACKOFF * retries).await;
                }
                Err(message) => break Err(message),
            }
        };

        let duration_ms = clock.elapsed().as_millis() as i64;
        let (status, error_message) = match &outcome {
            Ok(projects) => {
                self.counters.completed.fetch_add(1, Ordering::Relaxed);
                info!(
                    worker_id,
                    job_id = %job.job_id,
                    trigger = job.trigger.as_str(),
                    projects,
                    retry_count = retries,
                    duration_ms,
                    "重算任务完成"
                );
                (STATUS_COMPLETED, None)
            }
            Err(message) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                error!(
                    worker_id,
                    job_id = %job.job_id,
                    trigger = job.trigger.as_str(),
                    retry_count = retries,
                    error = %message,
                    "重算任务失败，达到最大重试次数"
                );
                (STATUS_FAILED, Some(message.as_str()))
            }
        };

        if let Err(e) = self.log_repo.finish(
            &job.job_id,
            status,
            i64::from(retries),
            error_message,
            &Utc::now().to_rfc3339(),
            duration_ms,
        ) {
            warn!(job_id = %job.job_id, error = %e, "更新重算日志失败");
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<RecalcJob>>>,
    ctx: Arc<WorkerContext>,
) {
    debug!(worker_id, "重算 worker 启动");
    loop {
        // 只在取任务时持锁，执行期间其他 worker 可继续取
        let job = {
            let mut guard = receiver.lock().await;
            guard.recv().await
        };
        let Some(job) = job else {
            break;
        };
        ctx.run_job(worker_id, job).await;
    }
    debug!(worker_id, "重算 worker 退出");
}

// ==========================================
// RecalcQueue - 重算任务队列
// ==========================================
pub struct RecalcQueue {
    sender: Mutex<Option<mpsc::Sender<RecalcJob>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    counters: Arc<StatsCounters>,
}

impl RecalcQueue {
    /// 启动队列与 worker 池
    ///
    /// 必须在 tokio 运行时内调用
    ///
    /// # 参数
    /// - orchestrator: 重算编排器
    /// - log_repo: 重算日志仓储
    /// - config: worker 数 / 通道容量 / 最大重试次数
    pub fn start(
        orchestrator: Arc<RiskOrchestrator>,
        log_repo: Arc<RecalcLogRepository>,
        config: RecalcConfig,
    ) -> Self {
        let worker_count = config.worker_count.max(1);
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let counters = Arc::new(StatsCounters::default());
        let ctx = Arc::new(WorkerContext {
            orchestrator,
            log_repo,
            counters: counters.clone(),
            max_retries: config.max_retries,
        });

        let workers = (0..worker_count)
            .map(|worker_id| tokio::spawn(worker_loop(worker_id, receiver.clone(), ctx.clone())))
            .collect();

        info!(
            worker_count,
            queue_capacity = config.queue_capacity,
            max_retries = config.max_retries,
            "重算队列已启动"
        );

        Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            counters,
        }
    }

    /// 入队
    ///
    /// # 返回
    /// - Some(job_id): 已入队（通道满时转后台等待发送）
    /// - None: 队列已关闭，任务丢弃
    pub fn enqueue(&self, trigger: RecalcTrigger) -> Option<String> {
        let sender = match self.sender.lock() {
            Ok(guard) => guard.clone(),
            Err(e) => {
                error!(error = %e, "重算队列锁获取失败");
                None
            }
        };
        let Some(sender) = sender else {
            return self.drop_job(&trigger, "队列已关闭");
        };

        let job = RecalcJob::new(trigger);
        let job_id = job.job_id.clone();
        match sender.try_send(job) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(job)) => {
                // 通道满: 交给运行时排队发送，调用方不等待
                let Ok(handle) = tokio::runtime::Handle::try_current() else {
                    return self.drop_job(&job.trigger, "通道已满且无运行时");
                };
                debug!(job_id = %job.job_id, "重算通道已满，转后台发送");
                let counters = self.counters.clone();
                handle.spawn(async move {
                    if let Err(e) = sender.send(job).await {
                        counters.dropped.fetch_add(1, Ordering::Relaxed);
                        warn!(trigger = e.0.trigger.as_str(), "队列已关闭，重算任务丢弃");
                    }
                });
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                return self.drop_job(&job.trigger, "队列已关闭");
            }
        }

        self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
        debug!(job_id = %job_id, "重算任务入队");
        Some(job_id)
    }

    fn drop_job(&self, trigger: &RecalcTrigger, reason: &str) -> Option<String> {
        self.counters.dropped.fetch_add(1, Ordering::Relaxed);
        warn!(trigger = trigger.as_str(), reason, "重算任务丢弃");
        None
    }

    /// 当前统计快照
    pub fn stats(&self) -> QueueStats {
        self.counters.snapshot()
    }

    /// 关闭队列并等待 worker 处理完剩余任务
    pub async fn shutdown(&self) {
        match self.sender.lock() {
            Ok(mut guard) => {
                guard.take();
            }
            Err(e) => error!(error = %e, "重算队列锁获取失败"),
        }

        let workers = match self.workers.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(e) => {
                error!(error = %e, "重算队列锁获取失败");
                Vec::new()
            }
        };
        for result in join_all(workers).await {
            if let Err(e) = result {
                error!(error = %e, "重算 worker 异常退出");
            }
        }

        let stats = self.stats();
        info!(
            enqueued = stats.enqueued,
            completed = stats.completed,
            failed = stats.failed,
            dropped = stats.dropped,
            "重算队列已关闭"
        );
    }
}

impl RecalcEventPublisher for RecalcQueue {
    fn publish(&self, trigger: RecalcTrigger) -> Result<String, Box<dyn Error + Send + Sync>> {
        self.enqueue(trigger)
            .ok_or_else(|| "recalc queue closed".into())
    }
}
