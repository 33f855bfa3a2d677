//! 安装失败分类：把后端的原始错误转换为可操作的提示

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Permission,
    NotFound,
    DiskSpace,
    ManagerMissing,
    DependencyConflict,
    Timeout,
    Generic,
}

/// 分类后的错误描述
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDescriptor {
    pub category: ErrorCategory,
    pub title: String,
    pub message: String,
    pub suggestion: String,
    pub retryable: bool,
}

impl ErrorDescriptor {
    /// 说明文字 + 建议，用于直接展示
    pub fn display_message(&self) -> String {
        format!("{}\n\n💡 {}", self.message, self.suggestion)
    }
}

impl fmt::Display for ErrorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.title, self.message)
    }
}

struct Rule {
    needles: &'static [&'static str],
    category: ErrorCategory,
    title: &'static str,
    message: &'static str,
    suggestion: &'static str,
    retryable: bool,
}

/// 按优先级排列，命中第一条即返回
const RULES: &[Rule] = &[
    Rule {
        needles: &["network", "connection"],
        category: ErrorCategory::Network,
        title: "Network Error",
        message: "Unable to connect to package manager",
        suggestion: "Please check your internet connection and try again",
        retryable: true,
    },
    Rule {
        needles: &["permission", "eacces", "access denied"],
        category: ErrorCategory::Permission,
        title: "Permission Denied",
        message: "Insufficient permissions to install packages",
        suggestion: "Try running the application with administrator privileges or use sudo",
        retryable: true,
    },
    Rule {
        needles: &["not found", "404", "no such package"],
        category: ErrorCategory::NotFound,
        title: "Package Not Found",
        message: "The requested package does not exist",
        suggestion: "Check the package name and try again",
        retryable: false,
    },
    Rule {
        needles: &["no space", "disk full", "enospc"],
        category: ErrorCategory::DiskSpace,
        title: "Insufficient Disk Space",
        message: "Not enough disk space to install packages",
        suggestion: "Free up some disk space and try again",
        retryable: true,
    },
    Rule {
        needles: &["command not found", "not installed"],
        category: ErrorCategory::ManagerMissing,
        title: "Package Manager Not Found",
        message: "The required package manager is not installed",
        suggestion: "Please install the package manager first",
        retryable: false,
    },
    Rule {
        needles: &["conflict", "dependency"],
        category: ErrorCategory::DependencyConflict,
        title: "Dependency Conflict",
        message: "Package dependencies could not be resolved",
        suggestion: "Try updating your package manager or resolving conflicts manually",
        retryable: true,
    },
    Rule {
        needles: &["timeout", "timed out"],
        category: ErrorCategory::Timeout,
        title: "Operation Timed Out",
        message: "The operation took too long to complete",
        suggestion: "The server might be slow. Please try again later",
        retryable: true,
    },
];

pub fn classify(raw: &str) -> ErrorDescriptor {
    let lowered = raw.to_lowercase();

    RULES
        .iter()
        .find(|rule| rule.needles.iter().any(|needle| lowered.contains(needle)))
        .map(|rule| ErrorDescriptor {
            category: rule.category,
            title: rule.title.to_string(),
            message: rule.message.to_string(),
            suggestion: rule.suggestion.to_string(),
            retryable: rule.retryable,
        })
        .unwrap_or_else(|| ErrorDescriptor {
            category: ErrorCategory::Generic,
            title: "Installation Failed".to_string(),
            message: raw.to_string(),
            suggestion: "Please check the logs for more details".to_string(),
            retryable: true,
        })
}

/// 对任意可显示的错误分类
pub fn classify_error(error: &dyn fmt::Display) -> ErrorDescriptor {
    classify(&error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_wins_over_timeout() {
        let d = classify("Network timeout while connecting");
        assert_eq!(d.category, ErrorCategory::Network);
        assert_eq!(d.title, "Network Error");
        assert!(d.retryable);
    }

    #[test]
    fn test_unknown_error_falls_back_to_raw_message() {
        let d = classify("unexpected kaboom");
        assert_eq!(d.category, ErrorCategory::Generic);
        assert_eq!(d.title, "Installation Failed");
        assert_eq!(d.message, "unexpected kaboom");
        assert!(d.retryable);
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        assert_eq!(classify("EACCES: open '/usr/lib'").category, ErrorCategory::Permission);
        assert_eq!(classify("ENOSPC while writing").category, ErrorCategory::DiskSpace);
        assert_eq!(classify("Operation TIMED OUT").category, ErrorCategory::Timeout);
    }

    #[test]
    fn test_not_found_is_not_retryable() {
        let d = classify("npm ERR! 404 'left-pad-9' is not in this registry");
        assert_eq!(d.category, ErrorCategory::NotFound);
        assert!(!d.retryable);
    }

    #[test]
    fn test_command_not_found_matches_not_found_first() {
        // "command not found" 同时包含 "not found"，第 3 条优先
        assert_eq!(classify("brew: command not found").category, ErrorCategory::NotFound);
        assert_eq!(
            classify("cargo is not installed").category,
            ErrorCategory::ManagerMissing
        );
    }

    #[test]
    fn test_dependency_conflict() {
        let d = classify("ERESOLVE unable to resolve dependency tree");
        assert_eq!(d.category, ErrorCategory::DependencyConflict);
        assert!(d.retryable);
    }

    #[test]
    fn test_display_message_appends_suggestion() {
        let d = classify("disk full");
        assert_eq!(
            d.display_message(),
            "Not enough disk space to install packages\n\n💡 Free up some disk space and try again"
        );
    }
}
