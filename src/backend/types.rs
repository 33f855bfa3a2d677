//! 后端返回的数据类型定义

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// 单个包管理器的汇总状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageManagerStatus {
    pub name: String,
    pub total: usize,
    pub installed: usize,
    pub updates_available: usize,
}

/// 包管理器视角下的单个包
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    pub manager: String,
    pub installed: bool,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub is_local: bool,
}

/// 单个包管理器与清单的对账结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffResult {
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub to_install: Vec<String>,
    #[serde(default)]
    pub to_remove: Vec<String>,
}

impl DiffResult {
    pub fn has_changes(&self) -> bool {
        !self.to_install.is_empty() || !self.to_remove.is_empty()
    }

    /// 同一个包不应同时出现在安装和移除列表中
    pub fn is_consistent(&self) -> bool {
        let install: HashSet<&str> = self.to_install.iter().map(String::as_str).collect();
        self.to_remove.iter().all(|p| !install.contains(p.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diff(install: &[&str], remove: &[&str]) -> DiffResult {
        DiffResult {
            name: "npm".to_string(),
            display_name: "npm".to_string(),
            to_install: install.iter().map(|s| s.to_string()).collect(),
            to_remove: remove.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_overlapping_diff_is_inconsistent() {
        assert!(diff(&["a", "b"], &["c"]).is_consistent());
        assert!(!diff(&["a", "b"], &["b"]).is_consistent());
    }

    #[test]
    fn test_has_changes() {
        assert!(!diff(&[], &[]).has_changes());
        assert!(diff(&[], &["c"]).has_changes());
    }

    #[test]
    fn test_package_defaults_when_fields_missing() {
        let pkg: Package =
            serde_json::from_str(r#"{"name":"ripgrep","manager":"cargo","installed":false}"#)
                .unwrap();
        assert_eq!(pkg.version, None);
        assert!(!pkg.is_local);
    }
}
