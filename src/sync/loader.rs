//! 包列表加载（先查缓存，再问后端）与列表过滤

use super::cache::ResultCache;
use super::events::{EventSender, SyncEvent};
use crate::backend::{fetch, Backend, BackendCommand, BackendError, Package};
use std::sync::Arc;
use std::time::Duration;

pub struct PackageLoader {
    backend: Arc<dyn Backend>,
    cache: Arc<ResultCache<Vec<Package>>>,
    ttl: Duration,
    events: EventSender,
}

impl PackageLoader {
    pub fn new(
        backend: Arc<dyn Backend>,
        cache: Arc<ResultCache<Vec<Package>>>,
        ttl: Duration,
        events: EventSender,
    ) -> Self {
        Self {
            backend,
            cache,
            ttl,
            events,
        }
    }

    /// 获取某个包管理器的包列表
    ///
    /// `force_refresh` 时先作废缓存条目再请求后端；成功后总会写入新条目。
    /// 失败时发出 `ListingFailed` 通知，缓存不受影响。
    pub async fn load(
        &self,
        manager: &str,
        force_refresh: bool,
    ) -> Result<Vec<Package>, BackendError> {
        if force_refresh {
            self.cache.invalidate(manager);
        } else if let Some(cached) = self.cache.get(manager) {
            log::debug!("package cache hit: {}", manager);
            return Ok(cached);
        }

        let command = BackendCommand::GetPackages {
            manager: manager.to_string(),
        };
        match fetch::<Vec<Package>>(self.backend.as_ref(), command).await {
            Ok(packages) => {
                log::debug!("cached {} packages for {}", packages.len(), manager);
                self.cache.set(manager, packages.clone(), self.ttl);
                Ok(packages)
            }
            Err(e) => {
                log::warn!("加载 {} 包列表失败: {}", manager, e);
                let _ = self.events.send(SyncEvent::ListingFailed {
                    manager: manager.to_string(),
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    #[cfg(test)]
    pub fn cached(&self, manager: &str) -> Option<Vec<Package>> {
        self.cache.get(manager)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FilterStatus {
    #[default]
    All,
    Installed,
    NotInstalled,
}

/// 按名称搜索与安装状态过滤
#[derive(Debug, Clone, Default)]
pub struct PackageFilter {
    pub query: String,
    pub status: FilterStatus,
}

impl PackageFilter {
    pub fn matches(&self, package: &Package) -> bool {
        let status_ok = match self.status {
            FilterStatus::All => true,
            FilterStatus::Installed => package.installed,
            FilterStatus::NotInstalled => !package.installed,
        };
        status_ok
            && (self.query.is_empty()
                || package
                    .name
                    .to_lowercase()
                    .contains(&self.query.to_lowercase()))
    }

    pub fn apply<'a>(&self, packages: &'a [Package]) -> Vec<&'a Package> {
        packages.iter().filter(|p| self.matches(p)).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackageCounts {
    pub total: usize,
    pub installed: usize,
    pub not_installed: usize,
}

impl PackageCounts {
    pub fn of(packages: &[Package]) -> Self {
        let installed = packages.iter().filter(|p| p.installed).count();
        Self {
            total: packages.len(),
            installed,
            not_installed: packages.len() - installed,
        }
    }
}

/// 尚未安装的包名，保持原顺序
pub fn missing(packages: &[Package]) -> Vec<String> {
    packages
        .iter()
        .filter(|p| !p.installed)
        .map(|p| p.name.clone())
        .collect()
}
