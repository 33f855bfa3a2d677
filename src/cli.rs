//! 命令行前端：解析子命令，把核心事件与活动日志渲染为文本

use crate::app::{App, FollowUp};
use crate::backend::{Backend, ProcessBackend};
use crate::config::Config;
use crate::sync::{
    events, ActivityLog, FilterStatus, InstallOutcome, InstallRequest, LogEntry, PackageCounts,
    PackageFilter, SyncEvent, SystemClock,
};
use anyhow::Result;
use chrono::DateTime;
use clap::{Parser, Subcommand, ValueEnum};
use std::sync::Arc;
use tokio::sync::mpsc;

/// 失败时回显的日志行数
const LOG_TAIL_LINES: usize = 10;

#[derive(Parser)]
#[command(name = "pkgsync")]
#[command(about = "按清单核对各包管理器并安装缺失的包")]
#[command(version)]
pub struct Cli {
    /// 输出调试日志
    #[arg(long, global = true)]
    pub debug: bool,

    /// 实时输出安装日志
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// 后端程序（覆盖配置文件）
    #[arg(long, global = true)]
    pub backend: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 查看所有包管理器的安装情况
    Status,
    /// 列出某个包管理器清单中的包
    List {
        manager: String,
        /// 跳过缓存重新获取
        #[arg(long)]
        refresh: bool,
        /// 按名称搜索（不区分大小写）
        #[arg(long, short)]
        search: Option<String>,
        #[arg(long, value_enum, default_value_t = FilterArg::All)]
        filter: FilterArg,
    },
    /// 查看各包管理器待安装与可移除的包
    Diff {
        /// 展开这些包管理器的包列表（可重复）
        #[arg(long, short)]
        expand: Vec<String>,
    },
    /// 安装某个包管理器缺失的包
    Install {
        manager: String,
        /// 可重试的失败最多重试 N 次
        #[arg(long, default_value_t = 0)]
        retries: u32,
        /// 以差异中的待安装列表为准
        #[arg(long, conflicts_with = "all")]
        from_diff: bool,
        /// 不读取包列表，直接让后端补齐该管理器的全部缺失包
        #[arg(long)]
        all: bool,
    },
    /// 依次为所有包管理器安装缺失的包
    Sync {
        /// 每个可重试的失败最多重试 N 次
        #[arg(long, default_value_t = 0)]
        retries: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FilterArg {
    All,
    Installed,
    Missing,
}

impl From<FilterArg> for FilterStatus {
    fn from(arg: FilterArg) -> Self {
        match arg {
            FilterArg::All => FilterStatus::All,
            FilterArg::Installed => FilterStatus::Installed,
            FilterArg::Missing => FilterStatus::NotInstalled,
        }
    }
}

/// 执行子命令，返回是否全部成功
pub async fn run(command: Commands, config: Config, verbose: bool) -> Result<bool> {
    let process = ProcessBackend::new(config.backend.program.clone(), config.backend.args.clone());
    log::debug!("using backend program {}", process.program());
    let backend: Arc<dyn Backend> = Arc::new(process);

    let (tx, mut rx) = events::channel();
    let (log_tx, mut log_rx) = mpsc::unbounded_channel();
    let mut log = ActivityLog::new(config.log_capacity);
    if verbose {
        log = log.with_tap(log_tx);
    }
    let app = App::new(backend, &config, Arc::new(SystemClock), log, tx);
    let subscription = app.start_log();

    // 事件与实时日志统一在这里输出，直到所有发送端关闭
    let printer = tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(event) = rx.recv() => {
                    for line in describe_event(&event) {
                        eprintln!("{}", line);
                    }
                }
                Some(entry) = log_rx.recv() => println!("{}", format_log_entry(&entry)),
                else => break,
            }
        }
    });

    let ok = dispatch(&app, command).await;

    // 先把排队中的进度记完，再决定要不要回显
    subscription.stop().await;
    if !verbose && !app.log.is_empty() {
        if ok {
            println!("安装日志共 {} 行，使用 --verbose 实时查看", app.log.len());
        } else {
            let entries = app.log.entries();
            println!("最近的安装日志:");
            for entry in log_tail(&entries, LOG_TAIL_LINES) {
                println!("{}", format_log_entry(entry));
            }
        }
    }

    drop(app);
    let _ = printer.await;
    Ok(ok)
}

async fn dispatch(app: &App, command: Commands) -> bool {
    match command {
        Commands::Status => {
            if app.managers.refresh().await.is_err() {
                return false;
            }
            let managers = app.managers.managers();
            let selected = app.managers.selected();
            for m in &managers {
                let mark = if selected.as_deref() == Some(m.name.as_str()) {
                    "*"
                } else {
                    " "
                };
                println!(
                    "{} {:<12} 已安装 {:>4}/{:<4} 可更新 {}",
                    mark, m.name, m.installed, m.total, m.updates_available
                );
            }
            if managers.is_empty() {
                println!("没有找到任何包管理器清单");
            }
            true
        }
        Commands::List {
            manager,
            refresh,
            search,
            filter,
        } => match app.packages.load(&manager, refresh).await {
            Ok(packages) => {
                let filter = PackageFilter {
                    query: search.unwrap_or_default(),
                    status: filter.into(),
                };
                for p in filter.apply(&packages) {
                    let mark = if p.installed { "✓" } else { "✗" };
                    let local = if p.is_local { " (本地)" } else { "" };
                    match &p.version {
                        Some(v) => println!("{} {} {}{}", mark, p.name, v, local),
                        None => println!("{} {}{}", mark, p.name, local),
                    }
                }
                let counts = PackageCounts::of(&packages);
                println!(
                    "共 {} 个包: 已安装 {}, 未安装 {}",
                    counts.total, counts.installed, counts.not_installed
                );
                true
            }
            Err(_) => false,
        },
        Commands::Diff { expand } => match app.diffs.load().await {
            Ok(diffs) => {
                for manager in &expand {
                    app.diffs.toggle(manager);
                }
                for d in &diffs {
                    if !d.has_changes() {
                        println!("{}: 已同步", d.display_name);
                        continue;
                    }
                    if !app.diffs.is_expanded(&d.name) {
                        println!(
                            "{}: +{} -{}",
                            d.display_name,
                            d.to_install.len(),
                            d.to_remove.len()
                        );
                        continue;
                    }
                    println!("{}:", d.display_name);
                    for p in &d.to_install {
                        println!("  + {}", p);
                    }
                    for p in &d.to_remove {
                        println!("  - {}", p);
                    }
                }
                println!(
                    "待安装 {}, 可移除 {}, 共 {} 个包管理器",
                    app.diffs.total_to_install(),
                    app.diffs.total_to_remove(),
                    diffs.len()
                );
                true
            }
            Err(_) => false,
        },
        Commands::Install {
            manager,
            retries,
            from_diff,
            all,
        } => install(app, &manager, retries, from_diff, all).await,
        Commands::Sync { retries } => {
            if app.diffs.load().await.is_err() {
                return false;
            }
            if app.diffs.total_to_install() == 0 {
                println!("所有包管理器均已同步");
                return true;
            }
            let report = app.sync_all().await;
            let mut ok = true;
            for (request, outcome) in report.results {
                let outcome =
                    with_retries(app, &request, outcome, FollowUp::ReloadDiffs, retries).await;
                ok &= outcome.is_success();
            }
            ok
        }
    }
}

async fn install(app: &App, manager: &str, retries: u32, from_diff: bool, all: bool) -> bool {
    if all {
        let request = InstallRequest::all_missing(manager);
        let outcome = app.install(&request, FollowUp::RefreshListing).await;
        return with_retries(app, &request, outcome, FollowUp::RefreshListing, retries)
            .await
            .is_success();
    }

    if from_diff {
        if app.diffs.load().await.is_err() {
            return false;
        }
        return match app.install_from_diff(manager).await {
            Some((request, outcome)) => {
                with_retries(app, &request, outcome, FollowUp::ReloadDiffs, retries)
                    .await
                    .is_success()
            }
            None => {
                println!("{} 没有待安装的包", manager);
                true
            }
        };
    }

    match app.install_missing(manager).await {
        Ok(Some((request, outcome))) => {
            with_retries(app, &request, outcome, FollowUp::RefreshListing, retries)
                .await
                .is_success()
        }
        Ok(None) => {
            println!("{} 没有缺失的包", manager);
            true
        }
        // 列表加载失败时已经输出过通知
        Err(_) => false,
    }
}

/// 调用方驱动的重试：只对可重试的失败原样重发请求
async fn with_retries(
    app: &App,
    request: &InstallRequest,
    mut outcome: InstallOutcome,
    follow_up: FollowUp,
    retries: u32,
) -> InstallOutcome {
    let mut attempt = 0;
    while outcome.can_retry() && attempt < retries {
        attempt += 1;
        eprintln!("🔁 重试 {} ({}/{})", request.manager, attempt, retries);
        outcome = app.retry(request, follow_up).await;
    }
    outcome
}

fn log_tail(entries: &[LogEntry], lines: usize) -> &[LogEntry] {
    &entries[entries.len().saturating_sub(lines)..]
}

fn percentage(current: usize, total: usize) -> usize {
    if total == 0 {
        return 0;
    }
    (current * 100 + total / 2) / total
}

pub fn describe_event(event: &SyncEvent) -> Vec<String> {
    match event {
        SyncEvent::ManagersLoadFailed(message) => {
            vec![format!("✗ 加载包管理器失败: {}", message)]
        }
        SyncEvent::ListingFailed { manager, message } => {
            vec![format!("✗ 加载 {} 的包列表失败: {}", manager, message)]
        }
        SyncEvent::DiffLoadFailed(message) => vec![format!("✗ 加载差异失败: {}", message)],
        SyncEvent::Error(message) => vec![format!("✗ {}", message)],
        SyncEvent::InstallStarted { manager, total } => {
            if *total == 0 {
                vec![format!("📦 正在安装 · {} (全部缺失的包)", manager)]
            } else {
                vec![format!("📦 正在安装 · {} ({} 个包)", manager, total)]
            }
        }
        SyncEvent::InstallProgress {
            manager,
            current,
            total,
        } => vec![format!(
            "   {} {} / {} 个包 ({}%)",
            manager,
            current,
            total,
            percentage(*current, *total)
        )],
        SyncEvent::InstallSucceeded { manager, count } => {
            let detail = match count {
                Some(n) => format!("成功安装 {} 个包", n),
                None => "所有包已安装".to_string(),
            };
            vec![format!("✓ 安装完成 · {}: {}", manager, detail)]
        }
        SyncEvent::InstallFailed {
            manager,
            error,
            retry,
        } => {
            // 分类器给出的标题与说明保持原文
            let mut lines = vec![format!("✗ {} · {}", error.title, manager)];
            lines.extend(error.display_message().lines().map(|l| format!("  {}", l)));
            if retry.is_some() {
                lines.push("  (可重试: 使用 --retries N 再次尝试)".to_string());
            }
            lines
        }
        SyncEvent::SyncStarted { managers } => {
            vec![format!(
                "🔄 开始同步 {} 个包管理器: {}",
                managers.len(),
                managers.join(", ")
            )]
        }
        SyncEvent::SyncFinished { succeeded, failed } => {
            vec![format!("🔄 同步结束: 成功 {}, 失败 {}", succeeded, failed)]
        }
    }
}

/// `[HH:MM:SS] message`
pub fn format_log_entry(entry: &LogEntry) -> String {
    let time = DateTime::parse_from_rfc3339(&entry.timestamp)
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|_| entry.timestamp.clone());
    format!("[{}] {}", time, entry.message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::classifier::classify;

    #[test]
    fn test_cli_parses_install_with_retries() {
        let cli = Cli::parse_from(["pkgsync", "--debug", "install", "npm", "--retries", "2"]);
        assert!(cli.debug);
        match cli.command {
            Commands::Install {
                manager,
                retries,
                from_diff,
                all,
            } => {
                assert_eq!(manager, "npm");
                assert_eq!(retries, 2);
                assert!(!from_diff);
                assert!(!all);
            }
            _ => panic!("expected install"),
        }
    }

    #[test]
    fn test_install_modes_are_exclusive() {
        let both = Cli::try_parse_from(["pkgsync", "install", "npm", "--all", "--from-diff"]);
        assert!(both.is_err());
        let cli = Cli::parse_from(["pkgsync", "install", "npm", "--all", "-v"]);
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Install { all: true, .. }));
    }

    #[test]
    fn test_cli_parses_list_filter() {
        let cli = Cli::parse_from(["pkgsync", "list", "brew", "--filter", "missing", "-s", "jq"]);
        match cli.command {
            Commands::List { filter, search, .. } => {
                assert_eq!(FilterStatus::from(filter), FilterStatus::NotInstalled);
                assert_eq!(search.as_deref(), Some("jq"));
            }
            _ => panic!("expected list"),
        }
    }

    #[test]
    fn test_cli_parses_repeated_expand() {
        let cli = Cli::parse_from(["pkgsync", "diff", "-e", "npm", "--expand", "brew"]);
        match cli.command {
            Commands::Diff { expand } => assert_eq!(expand, vec!["npm", "brew"]),
            _ => panic!("expected diff"),
        }
    }

    #[test]
    fn test_percentage_rounds() {
        assert_eq!(percentage(0, 0), 0);
        assert_eq!(percentage(1, 3), 33);
        assert_eq!(percentage(2, 3), 67);
        assert_eq!(percentage(3, 3), 100);
    }

    #[test]
    fn test_failed_event_mentions_retry_only_when_retryable() {
        let retryable = SyncEvent::InstallFailed {
            manager: "npm".to_string(),
            error: classify("network unreachable"),
            retry: Some(InstallRequest::all_missing("npm")),
        };
        let lines = describe_event(&retryable);
        assert_eq!(lines[0], "✗ Network Error · npm");
        assert!(lines.last().unwrap().contains("--retries"));

        let fatal = SyncEvent::InstallFailed {
            manager: "npm".to_string(),
            error: classify("404"),
            retry: None,
        };
        assert!(!describe_event(&fatal).iter().any(|l| l.contains("--retries")));
    }

    #[test]
    fn test_success_wording() {
        let one = SyncEvent::InstallSucceeded {
            manager: "cargo".to_string(),
            count: Some(1),
        };
        assert_eq!(describe_event(&one), vec!["✓ 安装完成 · cargo: 成功安装 1 个包"]);

        let whole = SyncEvent::InstallSucceeded {
            manager: "brew".to_string(),
            count: None,
        };
        assert_eq!(describe_event(&whole), vec!["✓ 安装完成 · brew: 所有包已安装"]);
    }

    #[test]
    fn test_log_tail_keeps_last_lines() {
        let entries: Vec<LogEntry> = (0..15)
            .map(|i| LogEntry {
                message: format!("line {}", i),
                timestamp: String::new(),
            })
            .collect();
        let tail = log_tail(&entries, LOG_TAIL_LINES);
        assert_eq!(tail.len(), 10);
        assert_eq!(tail[0].message, "line 5");
        assert_eq!(log_tail(&entries[..3], LOG_TAIL_LINES).len(), 3);
    }

    #[test]
    fn test_log_entry_format() {
        let entry = LogEntry {
            message: "added 1 package".to_string(),
            timestamp: "2024-05-01T09:08:07+02:00".to_string(),
        };
        assert_eq!(format_log_entry(&entry), "[09:08:07] added 1 package");
    }
}
