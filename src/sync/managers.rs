//! 包管理器总览

use super::events::{EventSender, SyncEvent};
use crate::backend::{fetch, Backend, BackendCommand, BackendError, PackageManagerStatus};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct Directory {
    managers: Vec<PackageManagerStatus>,
    selected: Option<String>,
}

pub struct ManagerDirectory {
    backend: Arc<dyn Backend>,
    events: EventSender,
    inner: Mutex<Directory>,
}

impl ManagerDirectory {
    pub fn new(backend: Arc<dyn Backend>, events: EventSender) -> Self {
        Self {
            backend,
            events,
            inner: Mutex::new(Directory::default()),
        }
    }

    /// 刷新全部管理器状态并整体替换；未选中时自动选中第一个
    pub async fn refresh(&self) -> Result<Vec<PackageManagerStatus>, BackendError> {
        match fetch::<Vec<PackageManagerStatus>>(
            self.backend.as_ref(),
            BackendCommand::GetManagersStatus,
        )
        .await
        {
            Ok(managers) => {
                let mut inner = self.lock();
                if inner.selected.is_none() {
                    inner.selected = managers.first().map(|m| m.name.clone());
                }
                inner.managers = managers.clone();
                Ok(managers)
            }
            Err(e) => {
                log::warn!("加载包管理器列表失败: {}", e);
                let _ = self
                    .events
                    .send(SyncEvent::ManagersLoadFailed(e.to_string()));
                Err(e)
            }
        }
    }

    pub fn managers(&self) -> Vec<PackageManagerStatus> {
        self.lock().managers.clone()
    }

    pub fn selected(&self) -> Option<String> {
        self.lock().selected.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Directory> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{package, MockBackend};
    use crate::sync::events;

    #[tokio::test]
    async fn test_refresh_auto_selects_first_manager() {
        let backend = Arc::new(MockBackend::new());
        backend.set_packages("brew", vec![package("git", "brew", true)]);
        backend.set_packages(
            "npm",
            vec![package("a", "npm", true), package("b", "npm", false)],
        );
        let (tx, _rx) = events::channel();
        let directory = ManagerDirectory::new(backend.clone(), tx);

        let managers = directory.refresh().await.unwrap();
        assert_eq!(managers.len(), 2);
        assert_eq!(managers[1].installed, 1);
        assert_eq!(directory.selected().as_deref(), Some("brew"));

        // 已有选中项时刷新不会改变它
        backend.set_packages("apt", vec![]);
        directory.refresh().await.unwrap();
        assert_eq!(directory.managers()[0].name, "apt");
        assert_eq!(directory.selected().as_deref(), Some("brew"));
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_previous_list() {
        let backend = Arc::new(MockBackend::new());
        backend.set_packages("cargo", vec![]);
        let (tx, mut rx) = events::channel();
        let directory = ManagerDirectory::new(backend.clone(), tx);
        directory.refresh().await.unwrap();

        backend.fail_status("connection refused");
        assert!(directory.refresh().await.is_err());
        assert_eq!(directory.managers().len(), 1);
        assert_eq!(
            rx.try_recv().unwrap(),
            SyncEvent::ManagersLoadFailed("connection refused".to_string())
        );
    }
}
