use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

/// 关闭信号，晚订阅的接收方也能看到已经触发的关闭
#[derive(Clone)]
pub struct ShutdownManager {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// 重复调用无效果
    pub fn shutdown(&self) {
        if !self.tx.send_replace(true) {
            info!("触发关闭，通知 {} 个订阅者", self.tx.receiver_count());
        }
    }

    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

/// 等待直到关闭被触发；发送方已经释放时同样返回
pub async fn stopped(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stopped| *stopped).await;
}
