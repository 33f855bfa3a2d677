//! 同步核心对外发出的事件

use super::classifier::ErrorDescriptor;
use super::installer::InstallRequest;
use tokio::sync::mpsc;

pub type EventSender = mpsc::UnboundedSender<SyncEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<SyncEvent>;

pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    // 非致命通知
    ManagersLoadFailed(String),
    ListingFailed {
        manager: String,
        message: String,
    },
    DiffLoadFailed(String),
    Error(String),
    // 安装生命周期
    InstallStarted {
        manager: String,
        total: usize,
    },
    InstallProgress {
        manager: String,
        current: usize,
        total: usize,
    },
    InstallSucceeded {
        manager: String,
        /// None 表示安装了该管理器的全部缺失包
        count: Option<usize>,
    },
    InstallFailed {
        manager: String,
        error: ErrorDescriptor,
        /// 可重试时携带原请求
        retry: Option<InstallRequest>,
    },
    // 批量同步
    SyncStarted {
        managers: Vec<String>,
    },
    SyncFinished {
        succeeded: usize,
        failed: usize,
    },
}
