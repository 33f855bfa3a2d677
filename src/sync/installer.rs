//! 安装编排：单个包管理器安装、批量同步与重试

use super::classifier::{classify_error, ErrorDescriptor};
use super::diff::DiffConsumer;
use super::events::{EventSender, SyncEvent};
use crate::backend::{Backend, BackendCommand};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// 一次安装意图；`packages` 为空表示"该管理器的全部缺失包"
///
/// 后端命令只接收管理器名，`packages` 仅用于进度展示。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRequest {
    pub manager: String,
    pub packages: Vec<String>,
}

impl InstallRequest {
    pub fn new(manager: impl Into<String>, packages: Vec<String>) -> Self {
        Self {
            manager: manager.into(),
            packages,
        }
    }

    pub fn all_missing(manager: impl Into<String>) -> Self {
        Self::new(manager, Vec::new())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InstallOutcome {
    Succeeded,
    Failed(ErrorDescriptor),
    /// 请求本身无效，没有调用后端
    Rejected(String),
}

impl InstallOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    pub fn error(&self) -> Option<&ErrorDescriptor> {
        match self {
            Self::Failed(error) => Some(error),
            _ => None,
        }
    }

    pub fn can_retry(&self) -> bool {
        self.error().map(|e| e.retryable).unwrap_or(false)
    }
}

/// 批量同步的逐个结果，顺序与执行顺序一致
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    pub results: Vec<(InstallRequest, InstallOutcome)>,
}

impl SyncReport {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|(_, o)| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstallState {
    pub installing: bool,
    /// 0..=100
    pub progress: u8,
}

/// 离开作用域时复位安装状态，覆盖所有返回路径
struct InstallingGuard<'a> {
    state: &'a Mutex<InstallState>,
}

impl<'a> InstallingGuard<'a> {
    fn enter(state: &'a Mutex<InstallState>) -> Self {
        *lock_state(state) = InstallState {
            installing: true,
            progress: 0,
        };
        Self { state }
    }

    fn complete(&self) {
        lock_state(self.state).progress = 100;
    }
}

impl Drop for InstallingGuard<'_> {
    fn drop(&mut self) {
        *lock_state(self.state) = InstallState::default();
    }
}

fn lock_state(state: &Mutex<InstallState>) -> MutexGuard<'_, InstallState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct InstallOrchestrator {
    backend: Arc<dyn Backend>,
    events: EventSender,
    state: Mutex<InstallState>,
}

impl InstallOrchestrator {
    pub fn new(backend: Arc<dyn Backend>, events: EventSender) -> Self {
        Self {
            backend,
            events,
            state: Mutex::new(InstallState::default()),
        }
    }

    pub fn state(&self) -> InstallState {
        *lock_state(&self.state)
    }

    pub fn is_installing(&self) -> bool {
        self.state().installing
    }

    /// 安装单个包管理器的缺失包；失败会被分类并通知，不会向上抛出
    pub async fn install(&self, request: &InstallRequest) -> InstallOutcome {
        if request.manager.trim().is_empty() {
            let reason = "Package manager not specified".to_string();
            log::error!("{}", reason);
            let _ = self.events.send(SyncEvent::Error(reason.clone()));
            return InstallOutcome::Rejected(reason);
        }

        let guard = InstallingGuard::enter(&self.state);
        let manager = request.manager.clone();
        let total = request.packages.len();

        log::info!("开始安装 {} ({} 个包)", manager, total);
        let _ = self.events.send(SyncEvent::InstallStarted {
            manager: manager.clone(),
            total,
        });
        let _ = self.events.send(SyncEvent::InstallProgress {
            manager: manager.clone(),
            current: 0,
            total,
        });

        let command = BackendCommand::InstallPackages {
            manager: manager.clone(),
        };
        match self.backend.call(command).await {
            Ok(_) => {
                guard.complete();
                log::info!("{} 安装完成", manager);
                let _ = self.events.send(SyncEvent::InstallProgress {
                    manager: manager.clone(),
                    current: total,
                    total,
                });
                let _ = self.events.send(SyncEvent::InstallSucceeded {
                    manager,
                    count: (total > 0).then_some(total),
                });
                InstallOutcome::Succeeded
            }
            Err(e) => {
                log::error!("{} 安装失败: {}", manager, e);
                let error = classify_error(&e);
                let _ = self.events.send(SyncEvent::InstallFailed {
                    manager,
                    error: error.clone(),
                    retry: error.retryable.then(|| request.clone()),
                });
                InstallOutcome::Failed(error)
            }
        }
    }

    /// 由调用方显式触发，原样重发同一个请求
    pub async fn retry(&self, request: &InstallRequest) -> InstallOutcome {
        log::info!("重试安装 {}", request.manager);
        self.install(request).await
    }

    /// 按顺序逐个安装有待安装包的管理器，单个失败不会中断；结束后重新加载一次差异
    pub async fn sync_all(&self, diffs: &DiffConsumer) -> SyncReport {
        let pending: Vec<InstallRequest> = diffs
            .snapshot()
            .into_iter()
            .filter(|d| !d.to_install.is_empty())
            .map(|d| InstallRequest::new(d.name, d.to_install))
            .collect();

        let _ = self.events.send(SyncEvent::SyncStarted {
            managers: pending.iter().map(|r| r.manager.clone()).collect(),
        });

        let mut report = SyncReport::default();
        for request in pending {
            let outcome = self.install(&request).await;
            report.results.push((request, outcome));
        }

        log::info!(
            "批量同步结束: 成功 {}, 失败 {}",
            report.succeeded(),
            report.failed()
        );
        let _ = self.events.send(SyncEvent::SyncFinished {
            succeeded: report.succeeded(),
            failed: report.failed(),
        });

        // 失败已经由 DiffConsumer 通知
        let _ = diffs.load().await;
        report
    }
}
