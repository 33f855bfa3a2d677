//! 同步核心：列表缓存、差异汇总、安装编排、错误分类与活动日志

pub mod activity;
pub mod cache;
pub mod classifier;
pub mod diff;
pub mod events;
pub mod installer;
pub mod loader;
pub mod managers;

// 重新导出常用类型
pub use activity::{ActivityLog, LogEntry, LogSubscription};
pub use cache::{Clock, ResultCache, SystemClock};
pub use diff::DiffConsumer;
pub use events::{EventSender, SyncEvent};
pub use installer::{InstallOrchestrator, InstallOutcome, InstallRequest, SyncReport};
pub use loader::{FilterStatus, PackageCounts, PackageFilter, PackageLoader};
pub use managers::ManagerDirectory;
