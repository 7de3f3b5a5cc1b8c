//! 运行报告
//!
//! 运行过程中逐项累加，结束时 `finalize` 一次后输出。

use std::path::PathBuf;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::models::clip::{ClipDescriptor, Timecode};
use crate::models::loaders::RejectedRow;
use crate::models::outcome::{ClipOutcome, ClipStage, ClipStatus};

/// 运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    /// 按 CSV 剪辑并下载
    #[default]
    Cut,
    /// 只下载片段列表页上已有的片段
    DownloadOnly,
}

/// 单项记录
#[derive(Debug, Clone, Serialize)]
pub struct ItemReport {
    /// CSV 行号；仅下载模式下为列表序号
    pub index: usize,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<Timecode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<Timecode>,
    #[serde(flatten)]
    pub outcome: ClipOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Local>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Local>>,
    pub mode: RunMode,
    pub total_descriptors: usize,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// 无法确认结果的项，既不算成功也不算失败
    pub unknown: usize,
    pub skipped: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
    pub downloads_dir: PathBuf,
    pub items: Vec<ItemReport>,
    /// CSV 里没能通过校验的行
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rejected_rows: Vec<RejectedRow>,
}

impl std::str::FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cut" => Ok(RunMode::Cut),
            "download-only" | "download_only" | "download" => Ok(RunMode::DownloadOnly),
            other => Err(format!("未知的运行模式: {}", other)),
        }
    }
}

impl RunReport {
    pub fn new(mode: RunMode, total_descriptors: usize, downloads_dir: impl Into<PathBuf>) -> Self {
        Self {
            started_at: Local::now(),
            finished_at: None,
            mode,
            total_descriptors,
            attempted: 0,
            succeeded: 0,
            failed: 0,
            unknown: 0,
            skipped: 0,
            aborted: None,
            downloads_dir: downloads_dir.into(),
            items: Vec::new(),
            rejected_rows: Vec::new(),
        }
    }

    /// 记录一个片段的结果
    pub fn record_descriptor(&mut self, clip: &ClipDescriptor, outcome: ClipOutcome) {
        self.push(ItemReport {
            index: clip.source_index(),
            label: clip.to_string(),
            target_url: Some(clip.target_url().to_string()),
            start: Some(clip.start()),
            end: Some(clip.end()),
            outcome,
        });
    }

    /// 记录一个仅下载项的结果
    pub fn record_artifact(&mut self, index: usize, label: impl Into<String>, outcome: ClipOutcome) {
        self.push(ItemReport {
            index,
            label: label.into(),
            target_url: None,
            start: None,
            end: None,
            outcome,
        });
    }

    fn push(&mut self, item: ItemReport) {
        match item.outcome.status {
            ClipStatus::Succeeded => self.succeeded += 1,
            ClipStatus::Failed => self.failed += 1,
            ClipStatus::Unknown => self.unknown += 1,
            ClipStatus::Skipped => self.skipped += 1,
        }
        if item.outcome.status != ClipStatus::Skipped {
            self.attempted += 1;
        }
        self.items.push(item);
    }

    /// 标记提前中止；未处理的片段按"跳过"记录
    pub fn abort(&mut self, reason: impl Into<String>, remaining: &[ClipDescriptor]) {
        let reason = reason.into();
        for clip in remaining {
            self.record_descriptor(clip, ClipOutcome::skipped(format!("运行中止: {}", reason)));
        }
        self.aborted = Some(reason);
    }

    pub fn finalize(&mut self) {
        if self.finished_at.is_none() {
            self.finished_at = Some(Local::now());
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.finished_at.is_some()
    }

    /// 成功率（百分比），没有尝试任何项时为 0
    pub fn success_rate(&self) -> f64 {
        if self.attempted == 0 {
            0.0
        } else {
            self.succeeded as f64 * 100.0 / self.attempted as f64
        }
    }

    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at.unwrap_or_else(Local::now) - self.started_at
    }

    /// 失败发生在哪一步
    pub fn failures(&self) -> impl Iterator<Item = (&ItemReport, Option<ClipStage>)> {
        self.items
            .iter()
            .filter(|i| i.outcome.status == ClipStatus::Failed)
            .map(|i| (i, i.outcome.stage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(row: usize) -> ClipDescriptor {
        ClipDescriptor::new(
            Timecode::from_secs(0),
            Timecode::from_secs(10),
            "https://video.example/a",
            row,
        )
        .unwrap()
    }

    #[test]
    fn counts_follow_recorded_outcomes() {
        let mut report = RunReport::new(RunMode::Cut, 4, "downloads");
        report.record_descriptor(&clip(1), ClipOutcome::succeeded(None));
        report.record_descriptor(&clip(2), ClipOutcome::failed(ClipStage::Create, "timeout"));
        report.record_descriptor(&clip(3), ClipOutcome::unknown(ClipStage::Download, "no file"));
        report.abort("登录失败", &[clip(4)]);
        report.finalize();

        assert_eq!(report.attempted, 3);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.unknown, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.items.len(), 4);
        assert!(report.is_finalized());
        assert_eq!(report.failures().count(), 1);
        assert!((report.success_rate() - 33.33).abs() < 0.1);
    }

    #[test]
    fn serializes_flat_items() {
        let mut report = RunReport::new(RunMode::DownloadOnly, 0, "downloads");
        report.record_artifact(1, "clip A", ClipOutcome::failed(ClipStage::Download, "http 500"));
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["mode"], "download-only");
        assert_eq!(json["items"][0]["status"], "failed");
        assert_eq!(json["items"][0]["stage"], "download");
        assert!(json["items"][0].get("start").is_none());
        assert!(json.get("aborted").is_none());
    }
}
