use std::sync::Arc;

use tokio::sync::watch;

/// 一次性广播的停止信号。
///
/// # 教案式说明
/// - **意图 (Why)**：接收循环与所有会话写阶段需要观察同一个停止事件，且事件只能发生一次。
/// - **契约 (What)**：
///   - `fire`：仅首次调用返回 `true`，之后的调用不产生任何效果；
///   - `fired`：信号已触发时立即完成，否则挂起直到触发；
///   - 克隆体共享同一状态。
/// - **How**：基于 `watch::Sender<bool>`，`send_if_modified` 保证 `false → true` 的翻转只发生一次。
#[derive(Clone, Debug)]
pub struct ShutdownSignal {
    state: Arc<watch::Sender<bool>>,
}

impl ShutdownSignal {
    /// 创建处于“待触发”状态的信号。
    pub fn new() -> Self {
        let (state, _) = watch::channel(false);
        Self {
            state: Arc::new(state),
        }
    }

    /// 触发信号；返回本次调用是否完成了触发。
    pub fn fire(&self) -> bool {
        self.state.send_if_modified(|fired| {
            if *fired {
                false
            } else {
                *fired = true;
                true
            }
        })
    }

    /// 信号是否已触发。
    pub fn is_fired(&self) -> bool {
        *self.state.borrow()
    }

    /// 等待信号触发。
    pub async fn fired(&self) {
        let mut observer = self.state.subscribe();
        // 发送端由 `self` 持有，等待不会因通道关闭而失败。
        let _ = observer.wait_for(|fired| *fired).await;
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}
