//! 在途会话任务计数。

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use tokio::sync::Notify;

#[derive(Debug, Default)]
pub(crate) struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    /// 登记一个任务；守卫释放时自动注销。
    pub(crate) fn enter(self: &Arc<Self>) -> InFlightGuard {
        self.count.fetch_add(1, Ordering::SeqCst);
        InFlightGuard {
            tracker: Arc::clone(self),
        }
    }

    pub(crate) fn current(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// 等待计数归零。
    pub(crate) async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            // 先登记唤醒再检查计数，避免错过检查与等待之间的最后一次释放。
            notified.as_mut().enable();
            if self.current() == 0 {
                return;
            }
            notified.await;
        }
    }
}

#[derive(Debug)]
pub(crate) struct InFlightGuard {
    tracker: Arc<InFlight>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.tracker.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.tracker.idle.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn idle_when_nothing_entered() {
        let tracker = Arc::new(InFlight::default());
        tokio::time::timeout(Duration::from_millis(100), tracker.wait_idle())
            .await
            .expect("idle");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn wait_idle_returns_after_last_guard() {
        let tracker = Arc::new(InFlight::default());
        let first = tracker.enter();
        let second = tracker.enter();
        assert_eq!(tracker.current(), 2);

        let waiter = {
            let tracker = Arc::clone(&tracker);
            tokio::spawn(async move { tracker.wait_idle().await })
        };
        drop(first);
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());
        drop(second);

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("drained")
            .expect("task");
        assert_eq!(tracker.current(), 0);
    }
}
