//! 各包管理器的安装/移除差异

use super::events::{EventSender, SyncEvent};
use crate::backend::{fetch, Backend, BackendCommand, BackendError, DiffResult};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

pub struct DiffConsumer {
    backend: Arc<dyn Backend>,
    events: EventSender,
    diffs: Mutex<Vec<DiffResult>>,
    expanded: Mutex<HashSet<String>>,
}

impl DiffConsumer {
    pub fn new(backend: Arc<dyn Backend>, events: EventSender) -> Self {
        Self {
            backend,
            events,
            diffs: Mutex::new(Vec::new()),
            expanded: Mutex::new(HashSet::new()),
        }
    }

    /// 重新获取全部差异并整体替换；失败时保留旧数据
    pub async fn load(&self) -> Result<Vec<DiffResult>, BackendError> {
        match fetch::<Vec<DiffResult>>(self.backend.as_ref(), BackendCommand::GetDiff).await {
            Ok(diffs) => {
                for diff in diffs.iter().filter(|d| !d.is_consistent()) {
                    log::warn!("{} 的安装与移除列表存在重叠", diff.name);
                }
                *self.lock_diffs() = diffs.clone();
                Ok(diffs)
            }
            Err(e) => {
                log::warn!("加载差异失败: {}", e);
                let _ = self.events.send(SyncEvent::DiffLoadFailed(e.to_string()));
                Err(e)
            }
        }
    }

    pub fn snapshot(&self) -> Vec<DiffResult> {
        self.lock_diffs().clone()
    }

    pub fn get(&self, manager: &str) -> Option<DiffResult> {
        self.lock_diffs().iter().find(|d| d.name == manager).cloned()
    }

    pub fn total_to_install(&self) -> usize {
        self.lock_diffs().iter().map(|d| d.to_install.len()).sum()
    }

    pub fn total_to_remove(&self) -> usize {
        self.lock_diffs().iter().map(|d| d.to_remove.len()).sum()
    }

    pub fn toggle(&self, manager: &str) {
        let mut expanded = self.expanded.lock().unwrap_or_else(PoisonError::into_inner);
        if !expanded.remove(manager) {
            expanded.insert(manager.to_string());
        }
    }

    /// 没有任何变化的卡片始终展开
    pub fn is_expanded(&self, manager: &str) -> bool {
        let no_changes = self.get(manager).map(|d| !d.has_changes()).unwrap_or(true);
        no_changes
            || self
                .expanded
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .contains(manager)
    }

    fn lock_diffs(&self) -> std::sync::MutexGuard<'_, Vec<DiffResult>> {
        self.diffs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
