//! 串行 worker
//!
//! 引擎被移动到一个独立的 tokio 任务里，所有触发（推送报告、轮询）经 mpsc 队列串行执行。
//! 每次提交返回一个 `CycleHandle`，完成后得到 `Completed` / `Failed`；结果同时广播给订阅者。

use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Result, WalletSDKError};
use crate::notifications::engine::NotificationEngine;
use crate::notifications::model::Report;
use crate::notifications::{CycleResult, CycleSummary, CycleTrigger};

const RESULT_CHANNEL_CAPACITY: usize = 64;

struct Job {
    trigger: CycleTrigger,
    reply: Option<oneshot::Sender<CycleResult>>,
}

/// 等待一个周期终态的句柄
pub struct CycleHandle {
    rx: oneshot::Receiver<CycleResult>,
}

impl CycleHandle {
    pub async fn wait(self) -> CycleResult {
        self.rx.await.unwrap_or_else(|_| CycleResult::Failed {
            summary: CycleSummary::default(),
            reason: "worker 在周期完成前已退出".to_string(),
        })
    }
}

pub struct NotificationWorker {
    tx: mpsc::Sender<Job>,
    results: broadcast::Sender<CycleResult>,
    shutdown_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
    poll_task: Mutex<Option<JoinHandle<()>>>,
}

impl NotificationWorker {
    /// 启动 worker 任务（需要在 tokio 运行时内调用）
    pub fn spawn(mut engine: NotificationEngine, queue_size: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<Job>(queue_size.max(1));
        let (results, _) = broadcast::channel(RESULT_CHANNEL_CAPACITY);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let results_tx = results.clone();
        let task = tokio::spawn(async move {
            info!("通知 worker 已启动");
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        info!("通知 worker 收到关闭信号");
                        break;
                    }
                    job = rx.recv() => {
                        let Some(job) = job else {
                            break;
                        };
                        let result = engine.run_cycle(job.trigger).await;
                        if results_tx.send(result.clone()).is_err() {
                            debug!("周期结果没有订阅者");
                        }
                        if let Some(reply) = job.reply {
                            let _ = reply.send(result);
                        }
                    }
                }
            }
            info!("通知 worker 已退出");
        });

        Self {
            tx,
            results,
            shutdown_tx,
            task: Mutex::new(Some(task)),
            poll_task: Mutex::new(None),
        }
    }

    /// 提交一个触发；返回的句柄在周期结束时完成
    pub async fn submit(&self, trigger: CycleTrigger) -> Result<CycleHandle> {
        if *self.shutdown_tx.borrow() {
            return Err(WalletSDKError::ShuttingDown("通知 worker 已关闭".to_string()));
        }

        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Job {
                trigger,
                reply: Some(reply),
            })
            .await
            .map_err(|_| WalletSDKError::ShuttingDown("通知 worker 队列已关闭".to_string()))?;

        Ok(CycleHandle { rx })
    }

    /// 处理推送送达的报告
    pub async fn submit_report(&self, report: Report) -> Result<CycleHandle> {
        self.submit(CycleTrigger::Report(report)).await
    }

    /// 从当前游标拉取式重同步
    pub async fn poll(&self) -> Result<CycleHandle> {
        self.submit(CycleTrigger::Poll).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CycleResult> {
        self.results.subscribe()
    }

    /// 启动周期性轮询；队列满时跳过本次
    pub fn start_periodic_poll(&self, interval: Duration) {
        let tx = self.tx.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // 第一次 tick 立即返回，跳过
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {
                        match tx.try_send(Job { trigger: CycleTrigger::Poll, reply: None }) {
                            Ok(()) => debug!("周期轮询已入队"),
                            Err(mpsc::error::TrySendError::Full(_)) => {
                                debug!("通知队列已满，跳过本次轮询");
                            }
                            Err(mpsc::error::TrySendError::Closed(_)) => break,
                        }
                    }
                }
            }
        });

        if let Some(previous) = self.poll_task.lock().replace(handle) {
            previous.abort();
        }
        info!("周期轮询已启动: interval_secs={}", interval.as_secs_f64());
    }

    /// 关闭 worker：正在执行的周期会跑完，队列里剩余的触发被丢弃
    pub async fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);

        let poll_task = self.poll_task.lock().take();
        if let Some(poll_task) = poll_task {
            let _ = poll_task.await;
        }
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("通知 worker 任务异常退出: {}", e);
            }
        }
    }
}

impl Drop for NotificationWorker {
    fn drop(&mut self) {
        self.shutdown_tx.send_replace(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;

    use crate::notifications::handler::{HandlerContext, OperationActions};
    use crate::notifications::model::{NewOperation, Notification, OperationUpdate};
    use crate::notifications::retry::FetchRetryConfig;
    use crate::notifications::testing::{new_operation, noop, Fixture};

    /// 记录同时在执行的处理器数量
    #[derive(Default)]
    struct ConcurrencyProbe {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        order: parking_lot::Mutex<Vec<u64>>,
    }

    #[async_trait]
    impl OperationActions for ConcurrencyProbe {
        async fn received_new_operation(&self, new_operation: &NewOperation) -> crate::error::Result<()> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.order
                .lock()
                .push(new_operation.operation.id.unwrap_or_default() as u64);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }

        async fn operation_updated(&self, _update: &OperationUpdate) -> crate::error::Result<()> {
            Ok(())
        }
    }

    fn report(previous_id: u64, maximum_id: u64, preview: Vec<Notification>) -> Report {
        Report {
            previous_id,
            maximum_id,
            preview,
        }
    }

    #[tokio::test]
    async fn concurrent_triggers_are_serialized() {
        let fx = Fixture::new(0).await;
        let probe = Arc::new(ConcurrencyProbe::default());
        let ctx = HandlerContext::new(fx.actions.clone(), probe.clone(), fx.actions.clone(), fx.actions.clone());
        let engine = NotificationEngine::new(
            fx.cursor_store.clone(),
            fx.service.clone(),
            ctx,
            fx.device.clone(),
            FetchRetryConfig::immediate(1),
        );
        let worker = Arc::new(NotificationWorker::spawn(engine, 8));

        // 两个推送几乎同时到达，各自带着重叠的预览
        let first = report(0, 3, vec![new_operation(1, 0), new_operation(2, 1), new_operation(3, 2)]);
        let second = report(1, 4, vec![new_operation(2, 1), new_operation(3, 2), new_operation(4, 3)]);

        let (a, b) = tokio::join!(worker.submit_report(first), worker.submit_report(second));
        let (ra, rb) = tokio::join!(a.unwrap().wait(), b.unwrap().wait());

        assert!(ra.is_completed());
        assert!(rb.is_completed());
        assert_eq!(probe.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(*probe.order.lock(), vec![1, 2, 3, 4]);
        assert_eq!(fx.cursor().await, 4);

        worker.shutdown().await;
    }

    #[tokio::test]
    async fn results_are_broadcast_to_subscribers() {
        let fx = Fixture::new(0).await;
        let worker = NotificationWorker::spawn(fx.engine(), 4);
        let mut results = worker.subscribe();

        let handle = worker.submit_report(report(0, 1, vec![noop(1, 0)])).await.unwrap();
        let direct = handle.wait().await;
        let broadcast = results.recv().await.unwrap();

        assert_eq!(direct, broadcast);
        assert_eq!(direct.summary().end_cursor, 1);

        worker.shutdown().await;
    }

    #[tokio::test]
    async fn failed_cycle_is_reported_not_raised() {
        let fx = Fixture::new(0).await;
        let worker = NotificationWorker::spawn(fx.engine(), 4);

        // 没有脚本的拉取必然失败
        let result = worker.poll().await.unwrap().wait().await;
        assert!(!result.is_completed());

        // worker 仍然可用
        let result = worker
            .submit_report(report(0, 1, vec![noop(1, 0)]))
            .await
            .unwrap()
            .wait()
            .await;
        assert!(result.is_completed());

        worker.shutdown().await;
    }

    #[tokio::test]
    async fn submit_after_shutdown_is_rejected() {
        let fx = Fixture::new(0).await;
        let worker = NotificationWorker::spawn(fx.engine(), 4);
        worker.shutdown().await;

        match worker.poll().await {
            Err(WalletSDKError::ShuttingDown(_)) => {}
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("submit after shutdown should fail"),
        }
    }

    #[tokio::test]
    async fn periodic_poll_fetches_from_cursor() {
        let fx = Fixture::new(6).await;
        fx.service.push_ok(report(6, 6, vec![]));
        let worker = NotificationWorker::spawn(fx.engine(), 4);
        let mut results = worker.subscribe();

        worker.start_periodic_poll(Duration::from_millis(20));
        let first = tokio::time::timeout(Duration::from_secs(2), results.recv())
            .await
            .expect("poll within timeout")
            .unwrap();

        assert!(first.is_completed());
        assert_eq!(fx.service.fetches()[0], 6);
        worker.shutdown().await;
    }
}
