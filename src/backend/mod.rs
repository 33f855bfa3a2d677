//! 后端边界：请求/响应调用与推送事件订阅

pub mod hub;
#[cfg(test)]
pub mod mock;
pub mod parser;
pub mod process;
pub mod types;

// 重新导出常用类型
pub use hub::EventStream;
pub use process::ProcessBackend;
pub use types::{DiffResult, Package, PackageManagerStatus};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use thiserror::Error;

/// 安装进度事件名
pub const INSTALL_PROGRESS_EVENT: &str = "install-progress";

/// 本客户端会发出的后端命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCommand {
    GetManagersStatus,
    GetPackages { manager: String },
    GetDiff,
    InstallPackages { manager: String },
}

impl BackendCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::GetManagersStatus => "get_managers_status",
            Self::GetPackages { .. } => "get_packages",
            Self::GetDiff => "get_diff",
            Self::InstallPackages { .. } => "install_packages",
        }
    }

    pub fn manager(&self) -> Option<&str> {
        match self {
            Self::GetPackages { manager } | Self::InstallPackages { manager } => Some(manager),
            Self::GetManagersStatus | Self::GetDiff => None,
        }
    }

    pub fn args(&self) -> Value {
        match self.manager() {
            Some(manager) => json!({ "manager": manager }),
            None => json!({}),
        }
    }
}

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("failed to start backend: {0}")]
    Spawn(#[from] std::io::Error),

    /// 后端报告的原始错误文本，分类器依赖这段文本
    #[error("{message}")]
    Failed { command: String, message: String },

    #[error("invalid response to {command}: {source}")]
    Decode {
        command: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("backend task aborted: {0}")]
    Join(String),
}

impl BackendError {
    pub fn failed(command: &BackendCommand, message: impl Into<String>) -> Self {
        Self::Failed {
            command: command.name().to_string(),
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait Backend: Send + Sync {
    /// 请求/响应调用
    async fn call(&self, command: BackendCommand) -> Result<Value, BackendError>;

    /// 订阅推送事件；丢弃返回的流即取消订阅
    fn subscribe(&self, event: &str) -> EventStream;
}

/// 调用后端并把响应解码为具体类型
pub async fn fetch<T: DeserializeOwned>(
    backend: &dyn Backend,
    command: BackendCommand,
) -> Result<T, BackendError> {
    let name = command.name();
    log::debug!("backend call: {} {}", name, command.args());
    let value = backend.call(command).await?;
    serde_json::from_value(value).map_err(|source| BackendError::Decode {
        command: name.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_names_and_args() {
        let cmd = BackendCommand::InstallPackages {
            manager: "brew".to_string(),
        };
        assert_eq!(cmd.name(), "install_packages");
        assert_eq!(cmd.args(), json!({ "manager": "brew" }));
        assert_eq!(BackendCommand::GetDiff.args(), json!({}));
    }

    #[test]
    fn test_failed_error_displays_raw_message() {
        let err = BackendError::failed(&BackendCommand::GetDiff, "EACCES: permission denied");
        assert_eq!(err.to_string(), "EACCES: permission denied");
    }
}
