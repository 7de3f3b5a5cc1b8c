//! 报告写入服务 - 业务能力层
//!
//! 只负责把运行报告写到磁盘，不关心流程。写入失败只记日志，不影响运行结果。

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, error, info};

use crate::config::Config;
use crate::models::{ClipStatus, RunReport};

pub struct ReportWriter {
    report_path: PathBuf,
    failures_path: PathBuf,
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("无法创建目录: {}", parent.display()))?;
    }
    Ok(())
}

impl ReportWriter {
    pub fn new(report_path: impl Into<PathBuf>, failures_path: impl Into<PathBuf>) -> Self {
        Self {
            report_path: report_path.into(),
            failures_path: failures_path.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.paths.report_file, &config.paths.failures_file)
    }

    /// 写 JSON 报告（覆盖）
    pub fn write_report(&self, report: &RunReport) -> Result<()> {
        ensure_parent(&self.report_path)?;
        let json = serde_json::to_string_pretty(report)?;
        fs::write(&self.report_path, json)
            .with_context(|| format!("无法写入报告: {}", self.report_path.display()))?;
        Ok(())
    }

    /// 追加失败 / 未知 / 跳过的片段，每项一行
    pub fn append_failures(&self, report: &RunReport) -> Result<usize> {
        let lines: Vec<String> = report
            .items
            .iter()
            .filter(|item| item.outcome.status != ClipStatus::Succeeded)
            .map(|item| {
                format!(
                    "{} | 第 {} 行 | {} | {:?} | {}\n",
                    report.started_at.format("%Y-%m-%d %H:%M:%S"),
                    item.index,
                    item.label,
                    item.outcome.status,
                    item.outcome.detail.as_deref().unwrap_or("-")
                )
            })
            .collect();
        if lines.is_empty() {
            return Ok(0);
        }

        debug!("写入 {} 条失败记录: {}", lines.len(), self.failures_path.display());
        ensure_parent(&self.failures_path)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.failures_path)
            .with_context(|| format!("无法打开: {}", self.failures_path.display()))?;
        for line in &lines {
            file.write_all(line.as_bytes())?;
        }
        Ok(lines.len())
    }

    /// 写出全部产物；出错只记录日志
    pub fn persist(&self, report: &RunReport) {
        match self.write_report(report) {
            Ok(()) => info!("🧾 报告已保存: {}", self.report_path.display()),
            Err(e) => error!("❌ 报告写入失败: {:#}", e),
        }
        match self.append_failures(report) {
            Ok(0) => {}
            Ok(n) => info!("📝 {} 个未成功的片段已记录到 {}", n, self.failures_path.display()),
            Err(e) => error!("❌ 失败记录写入失败: {:#}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClipDescriptor, ClipOutcome, ClipStage, RunMode, Timecode};

    fn clip(row: usize) -> ClipDescriptor {
        ClipDescriptor::new(
            Timecode::from_secs(5),
            Timecode::from_secs(15),
            "https://www.youtube.com/watch?v=abc",
            row,
        )
        .unwrap()
    }

    #[test]
    fn writes_json_report_and_failure_lines() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ReportWriter::new(
            dir.path().join("out").join("report.json"),
            dir.path().join("failed.txt"),
        );

        let mut report = RunReport::new(RunMode::Cut, 3, dir.path());
        report.record_descriptor(&clip(1), ClipOutcome::succeeded(None));
        report.record_descriptor(&clip(2), ClipOutcome::failed(ClipStage::SetEnd, "超时"));
        report.record_descriptor(&clip(3), ClipOutcome::unknown(ClipStage::Download, "没有新文件"));
        report.finalize();
        writer.persist(&report);

        let json: serde_json::Value = serde_json::from_str(
            &fs::read_to_string(dir.path().join("out").join("report.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(json["succeeded"], 1);
        assert_eq!(json["items"].as_array().unwrap().len(), 3);

        let failures = fs::read_to_string(dir.path().join("failed.txt")).unwrap();
        assert_eq!(failures.lines().count(), 2);
        assert!(failures.contains("第 2 行"));
        assert!(failures.contains("Unknown"));
    }

    #[test]
    fn unwritable_report_does_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"x").unwrap();
        let writer = ReportWriter::new(blocker.join("report.json"), blocker.join("failed.txt"));

        let mut report = RunReport::new(RunMode::Cut, 1, dir.path());
        report.record_descriptor(&clip(1), ClipOutcome::failed(ClipStage::Create, "x"));
        writer.persist(&report);
        assert!(writer.write_report(&report).is_err());
    }
}
