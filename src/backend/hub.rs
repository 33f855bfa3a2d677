//! 推送事件分发

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;

/// 订阅端持有的事件流，drop 即取消订阅
pub type EventStream = mpsc::UnboundedReceiver<Value>;

/// 按事件名把 payload 分发给所有存活的订阅者
#[derive(Debug, Default)]
pub struct EventHub {
    subscribers: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<Value>>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, event: &str) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event.to_string())
            .or_default()
            .push(tx);
        rx
    }

    /// 发送事件，顺手清理已关闭的订阅者；返回送达数量
    pub fn emit(&self, event: &str, payload: Value) -> usize {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(senders) = subscribers.get_mut(event) else {
            return 0;
        };
        senders.retain(|tx| tx.send(payload.clone()).is_ok());
        senders.len()
    }

    #[cfg(test)]
    pub fn subscriber_count(&self, event: &str) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event)
            .map(|senders| senders.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }
}
