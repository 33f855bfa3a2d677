//! 组合根：持有缓存、加载器、差异、日志与安装编排，并串起安装后的刷新动作

use crate::backend::{Backend, BackendError};
use crate::config::Config;
use crate::sync::loader::missing;
use crate::sync::{
    ActivityLog, Clock, DiffConsumer, EventSender, InstallOrchestrator, InstallOutcome,
    InstallRequest, LogSubscription, ManagerDirectory, PackageLoader, ResultCache, SyncReport,
};
use std::sync::Arc;

/// 安装成功后要刷新的内容
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUp {
    /// 强制刷新该管理器的包列表
    RefreshListing,
    /// 重新加载全部差异
    ReloadDiffs,
}

pub struct App {
    backend: Arc<dyn Backend>,
    pub managers: ManagerDirectory,
    pub packages: PackageLoader,
    pub diffs: DiffConsumer,
    pub installer: InstallOrchestrator,
    pub log: ActivityLog,
}

impl App {
    pub fn new(
        backend: Arc<dyn Backend>,
        config: &Config,
        clock: Arc<dyn Clock>,
        log: ActivityLog,
        events: EventSender,
    ) -> Self {
        let cache = Arc::new(ResultCache::new(clock));
        Self {
            managers: ManagerDirectory::new(backend.clone(), events.clone()),
            packages: PackageLoader::new(
                backend.clone(),
                cache,
                config.cache_ttl(),
                events.clone(),
            ),
            diffs: DiffConsumer::new(backend.clone(), events.clone()),
            installer: InstallOrchestrator::new(backend.clone(), events),
            log,
            backend,
        }
    }

    /// 开始把后端进度事件记入活动日志
    pub fn start_log(&self) -> LogSubscription {
        self.log.start(self.backend.as_ref())
    }

    #[cfg(test)]
    pub fn cached_listing(&self, manager: &str) -> Option<Vec<crate::backend::Package>> {
        self.packages.cached(manager)
    }

    /// 安装某个管理器列表中所有未安装的包
    ///
    /// 列表加载失败返回 `Err`（通知已发出），没有缺失包返回 `Ok(None)`。
    pub async fn install_missing(
        &self,
        manager: &str,
    ) -> Result<Option<(InstallRequest, InstallOutcome)>, BackendError> {
        let packages = self.packages.load(manager, false).await?;
        let missing = missing(&packages);
        if missing.is_empty() {
            log::info!("{} 没有缺失的包", manager);
            return Ok(None);
        }

        let request = InstallRequest::new(manager, missing);
        let outcome = self.install(&request, FollowUp::RefreshListing).await;
        Ok(Some((request, outcome)))
    }

    /// 按差异卡片安装单个管理器；没有待安装包时返回 None
    pub async fn install_from_diff(
        &self,
        manager: &str,
    ) -> Option<(InstallRequest, InstallOutcome)> {
        let diff = self.diffs.get(manager)?;
        if diff.to_install.is_empty() {
            return None;
        }

        let request = InstallRequest::new(diff.name, diff.to_install);
        let outcome = self.install(&request, FollowUp::ReloadDiffs).await;
        Some((request, outcome))
    }

    /// 新一轮安装开始前清空活动日志，成功后执行刷新
    pub async fn install(&self, request: &InstallRequest, follow_up: FollowUp) -> InstallOutcome {
        if let Some(rejected) = self.reject_if_busy(&request.manager) {
            return rejected;
        }
        self.log.clear();
        let outcome = self.installer.install(request).await;
        if outcome.is_success() {
            self.after_success(&request.manager, follow_up).await;
        }
        outcome
    }

    pub async fn retry(&self, request: &InstallRequest, follow_up: FollowUp) -> InstallOutcome {
        if let Some(rejected) = self.reject_if_busy(&request.manager) {
            return rejected;
        }
        let outcome = self.installer.retry(request).await;
        if outcome.is_success() {
            self.after_success(&request.manager, follow_up).await;
        }
        outcome
    }

    /// 已有安装在进行时返回空报告
    pub async fn sync_all(&self) -> SyncReport {
        if self.reject_if_busy("sync-all").is_some() {
            return SyncReport::default();
        }
        self.installer.sync_all(&self.diffs).await
    }

    /// 同一时间只允许一个安装
    fn reject_if_busy(&self, target: &str) -> Option<InstallOutcome> {
        if !self.installer.is_installing() {
            return None;
        }
        let progress = self.installer.state().progress;
        log::warn!("已有安装在进行 ({}%)，忽略 {}", progress, target);
        Some(InstallOutcome::Rejected(
            "An installation is already in progress".to_string(),
        ))
    }

    async fn after_success(&self, manager: &str, follow_up: FollowUp) {
        // 失败已经以通知形式发出
        match follow_up {
            FollowUp::RefreshListing => {
                let _ = self.packages.load(manager, true).await;
            }
            FollowUp::ReloadDiffs => {
                let _ = self.diffs.load().await;
            }
        }
    }
}
