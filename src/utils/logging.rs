//! 日志工具模块
//!
//! 提供订阅器初始化，以及日志格式化和输出的辅助函数

use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::models::RunReport;

/// 初始化 tracing 订阅器
///
/// `RUST_LOG` 优先；未设置时使用配置里的级别。
/// 同时输出到终端和日志文件（文件不带颜色）。重复调用是无害的。
pub fn init(level: &str, log_file: Option<&Path>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file_layer = log_file
        .and_then(|path| OpenOptions::new().create(true).append(true).open(path).ok())
        .map(|file| fmt::layer().with_ansi(false).with_writer(Mutex::new(file)));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .try_init();
}

/// 初始化日志文件（覆盖旧内容，写入表头）
pub fn init_log_file(log_file_path: &Path) -> Result<()> {
    if let Some(parent) = log_file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("无法创建日志目录: {}", parent.display()))?;
    }
    let log_header = format!(
        "{}\n片段剪辑日志 - {}\n{}\n\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    fs::write(log_file_path, log_header)
        .with_context(|| format!("无法写入日志文件: {}", log_file_path.display()))?;
    Ok(())
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 片段自动剪辑 ({:?})", config.mode);
    info!("🌐 环境: {:?} | 浏览器: {:?}", config.profile, config.browser.mode);
    info!("📂 下载目录: {}", config.paths.downloads_dir.display());
    info!("{}", "=".repeat(60));
}

/// 记录片段加载信息
pub fn log_clips_loaded(total: usize, groups: usize) {
    info!("✓ 找到 {} 个待处理的片段", total);
    info!("📋 共 {} 个视频，同一视频的片段只加载一次\n", groups);
}

/// 记录视频组开始
pub fn log_group_start(
    group_num: usize,
    total_groups: usize,
    url: &str,
    clip_count: usize,
    rows: Option<(usize, usize)>,
) {
    info!("\n{}", "=".repeat(60));
    info!("🎬 开始处理第 {}/{} 个视频", group_num, total_groups);
    info!("🔗 {}", truncate_text(url, 80));
    match rows {
        Some((first, last)) => info!("📄 本组片段: {} 个 (第 {}-{} 行)", clip_count, first, last),
        None => info!("📄 本组片段: {} 个", clip_count),
    }
    info!("{}", "=".repeat(60));
}

/// 记录视频组完成
pub fn log_group_complete(group_num: usize, success: usize, total: usize) {
    info!("\n{}", "─".repeat(60));
    info!("✓ 第 {} 个视频完成: 成功 {}/{}", group_num, success, total);
    info!("{}", "─".repeat(60));
}

/// 打印最终统计信息
pub fn print_final_stats(report: &RunReport, config: &Config) {
    let elapsed = report.elapsed();
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!(
        "总耗时: {}分{}秒",
        elapsed.num_minutes(),
        elapsed.num_seconds() % 60
    );
    info!("{}", "=".repeat(60));
    info!("✅ 成功: {}/{}", report.succeeded, report.attempted);
    info!("❌ 失败: {}", report.failed);
    if report.unknown > 0 {
        info!("❔ 结果未知: {}", report.unknown);
    }
    if report.skipped > 0 {
        info!("⏭️ 跳过: {}", report.skipped);
    }
    info!("📈 成功率: {:.1}%", report.success_rate());
    if let Some(reason) = &report.aborted {
        info!("🛑 提前中止: {}", reason);
    }
    info!("{}", "=".repeat(60));
    info!("📂 下载目录: {}", config.paths.downloads_dir.display());
    info!("🧾 报告文件: {}", config.paths.report_file.display());
    info!("\n日志已保存至: {}", config.paths.log_file.display());
}

/// 截断长文本用于日志显示
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_by_characters() {
        assert_eq!(truncate_text("片段剪辑日志", 2), "片段...");
        assert_eq!(truncate_text("short", 10), "short");
    }

    #[test]
    fn log_file_gets_a_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("run.txt");
        init_log_file(&path).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("片段剪辑日志"));
    }
}
