use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// 应用程序错误类型
///
/// 分两类：
/// - 可恢复：在编排层被捕获，记入报告，继续处理下一个片段
/// - 致命：登录失败、浏览器会话不可达，提前结束整次运行（仍会输出报告）
#[derive(Debug, Error)]
pub enum AutomationError {
    /// 所有候选选择器都没有找到控件
    #[error("未找到控件: {control}")]
    ElementNotFound { control: String },

    /// 元素引用已失效（DOM 已被替换）
    #[error("元素引用已失效: {control}")]
    StaleReference { control: String },

    /// 原生点击被遮挡，且合成事件也失败
    #[error("操作被拦截: {control}")]
    ActionIntercepted { control: String },

    /// 等待超时
    #[error("等待超时 ({what}, {after:?})")]
    Timeout { what: String, after: Duration },

    /// 登录失败（致命）
    #[error("登录失败: {reason}")]
    AuthenticationFailure { reason: String },

    /// 浏览器会话不可达（致命）
    #[error("浏览器会话不可达: {0}")]
    SessionUnreachable(String),

    /// 状态机不允许的操作
    #[error("无效的会话状态转换: {0}")]
    InvalidTransition(String),

    /// 文件读写失败
    #[error("文件操作失败 ({path}): {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// CSV 无法读取
    #[error("CSV 读取失败 ({path}): {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// 配置错误
    #[error("配置错误:\n{}", .0.join("\n"))]
    Config(Vec<String>),

    /// 浏览器启动 / 连接失败
    #[error("浏览器错误: {0}")]
    Browser(String),

    /// 下载失败
    #[error("下载失败: {0}")]
    Download(String),

    /// 页面脚本执行失败
    #[error("脚本执行失败: {0}")]
    Script(String),
}

impl AutomationError {
    /// 是否应当中止整次运行
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AutomationError::AuthenticationFailure { .. } | AutomationError::SessionUnreachable(_)
        )
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AutomationError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn not_found(control: impl Into<String>) -> Self {
        AutomationError::ElementNotFound {
            control: control.into(),
        }
    }
}

/// 驱动层（页面文档）错误
///
/// 只描述"这一次对页面的调用发生了什么"，是否重试由上层决定。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    #[error("元素引用已失效")]
    Stale,
    #[error("点击位置被其他元素遮挡: {0}")]
    Intercepted(String),
    #[error("元素当前不可交互")]
    NotInteractable,
    #[error("脚本执行失败: {0}")]
    Script(String),
    #[error("浏览器连接已断开: {0}")]
    Unreachable(String),
}

impl DocumentError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, DocumentError::Unreachable(_))
    }
}

impl From<chromiumoxide::error::CdpError> for DocumentError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        let msg = err.to_string();
        let lowered = msg.to_lowercase();
        if lowered.contains("receiver is gone")
            || lowered.contains("channel closed")
            || lowered.contains("connection reset")
            || lowered.contains("broken pipe")
        {
            DocumentError::Unreachable(msg)
        } else {
            DocumentError::Script(msg)
        }
    }
}

impl From<DocumentError> for AutomationError {
    fn from(err: DocumentError) -> Self {
        match err {
            DocumentError::Unreachable(msg) => AutomationError::SessionUnreachable(msg),
            DocumentError::Stale => AutomationError::StaleReference {
                control: "未知".to_string(),
            },
            DocumentError::Intercepted(blocker) => AutomationError::ActionIntercepted { control: blocker },
            DocumentError::NotInteractable => AutomationError::Script("元素当前不可交互".to_string()),
            DocumentError::Script(msg) => AutomationError::Script(msg),
        }
    }
}

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AutomationError>;
