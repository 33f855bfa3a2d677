//! 安装活动日志：订阅后端的 install-progress 事件并按到达顺序记录

use crate::backend::{Backend, INSTALL_PROGRESS_EVENT};
use chrono::Local;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// 默认最多保留的日志行数
pub const DEFAULT_LOG_CAPACITY: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub message: String,
    /// 记录时间（RFC 3339），不是上游时间
    pub timestamp: String,
}

/// 有界、按插入顺序排列的日志；满了丢弃最旧的一条
#[derive(Clone)]
pub struct ActivityLog {
    entries: Arc<Mutex<VecDeque<LogEntry>>>,
    capacity: usize,
    tap: Option<mpsc::UnboundedSender<LogEntry>>,
}

impl ActivityLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::new())),
            capacity: capacity.max(1),
            tap: None,
        }
    }

    /// 每条新日志额外转发一份（用于实时输出）
    pub fn with_tap(mut self, tap: mpsc::UnboundedSender<LogEntry>) -> Self {
        self.tap = Some(tap);
        self
    }

    /// 开始订阅
    ///
    /// `LogSubscription::stop` 会先记完已到达的事件再退出；
    /// 直接 drop 句柄则立即中止并释放订阅。
    pub fn start(&self, backend: &dyn Backend) -> LogSubscription {
        let mut stream = backend.subscribe(INSTALL_PROGRESS_EVENT);
        let (shutdown, mut stopped) = oneshot::channel::<()>();
        let log = self.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    payload = stream.recv() => match payload {
                        Some(payload) => log.append(payload_message(payload)),
                        None => break,
                    },
                    _ = &mut stopped => {
                        // 不再接收新事件，排队中的仍然记录
                        stream.close();
                        while let Some(payload) = stream.recv().await {
                            log.append(payload_message(payload));
                        }
                        break;
                    }
                }
            }
        });
        LogSubscription {
            task: Some(task),
            shutdown: Some(shutdown),
        }
    }

    pub fn append(&self, message: String) {
        let entry = LogEntry {
            message,
            timestamp: Local::now().to_rfc3339(),
        };
        {
            let mut entries = self.lock();
            if entries.len() == self.capacity {
                entries.pop_front();
            }
            entries.push_back(entry.clone());
        }
        if let Some(tap) = &self.tap {
            let _ = tap.send(entry);
        }
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<LogEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// 字符串原样使用，其它结构序列化为 JSON 文本
fn payload_message(payload: Value) -> String {
    match payload {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

pub struct LogSubscription {
    task: Option<JoinHandle<()>>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl LogSubscription {
    /// 取消订阅，并等待已排队的事件全部写入日志
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for LogSubscription {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}
