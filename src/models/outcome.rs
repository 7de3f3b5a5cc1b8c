use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

/// 单次交互的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionOutcome {
    Success,
    NotFound,
    StaleReference,
    Intercepted,
    Timeout,
}

impl ActionOutcome {
    pub fn is_success(self) -> bool {
        self == ActionOutcome::Success
    }
}

impl fmt::Display for ActionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ActionOutcome::Success => "成功",
            ActionOutcome::NotFound => "未找到控件",
            ActionOutcome::StaleReference => "元素引用失效",
            ActionOutcome::Intercepted => "操作被拦截",
            ActionOutcome::Timeout => "超时",
        };
        f.write_str(text)
    }
}

/// 页面状态确认的结论
///
/// `Unknown` 表示"无法判断"，与成功、失败都不同，由编排层按策略处理。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Confirmed,
    Unknown(String),
    Failed(String),
}

/// 片段处理进行到的步骤
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClipStage {
    Navigate,
    OpenControls,
    SetStart,
    SetEnd,
    Create,
    AwaitArtifact,
    Download,
}

impl fmt::Display for ClipStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ClipStage::Navigate => "加载视频",
            ClipStage::OpenControls => "打开 Controls 面板",
            ClipStage::SetStart => "设置开始时间",
            ClipStage::SetEnd => "设置结束时间",
            ClipStage::Create => "创建片段",
            ClipStage::AwaitArtifact => "等待新片段出现",
            ClipStage::Download => "下载",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClipStatus {
    Succeeded,
    Failed,
    Unknown,
    Skipped,
}

/// 单个片段（或单个产物）的最终结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClipOutcome {
    pub status: ClipStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<ClipStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,
}

impl ClipOutcome {
    pub fn succeeded(artifact: Option<PathBuf>) -> Self {
        Self {
            status: ClipStatus::Succeeded,
            stage: None,
            detail: None,
            artifact,
        }
    }

    pub fn failed(stage: ClipStage, detail: impl Into<String>) -> Self {
        Self {
            status: ClipStatus::Failed,
            stage: Some(stage),
            detail: Some(detail.into()),
            artifact: None,
        }
    }

    pub fn unknown(stage: ClipStage, detail: impl Into<String>) -> Self {
        Self {
            status: ClipStatus::Unknown,
            stage: Some(stage),
            detail: Some(detail.into()),
            artifact: None,
        }
    }

    pub fn skipped(detail: impl Into<String>) -> Self {
        Self {
            status: ClipStatus::Skipped,
            stage: None,
            detail: Some(detail.into()),
            artifact: None,
        }
    }

    /// 步骤不明的失败（例如文件系统错误）
    pub fn errored(detail: impl Into<String>) -> Self {
        Self {
            status: ClipStatus::Failed,
            stage: None,
            detail: Some(detail.into()),
            artifact: None,
        }
    }

    /// 交互失败 → 片段失败
    pub fn from_action(stage: ClipStage, outcome: ActionOutcome) -> Self {
        Self::failed(stage, format!("{}: {}", stage, outcome))
    }
}
