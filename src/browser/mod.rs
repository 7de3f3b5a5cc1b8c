//! 浏览器获取与设置
//!
//! 连接已打开的浏览器，或由程序启动一个；两种方式都在后台任务里消费 CDP 事件。

mod connection;
mod launch;

use std::path::Path;

use anyhow::{Context, Result};
use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::{Browser, Page};
use tracing::info;

use crate::config::{BrowserMode, BrowserSettings};

pub use connection::connect_to_browser_and_page;
pub use launch::launch_browser;

/// 按配置获取浏览器和页面
pub async fn open(settings: &BrowserSettings, prefer_host: Option<&str>) -> Result<(Browser, Page)> {
    match settings.mode {
        BrowserMode::Connect => connect_to_browser_and_page(settings.debug_port, prefer_host).await,
        BrowserMode::Launch => launch_browser(settings).await,
    }
}

/// 让浏览器把下载直接保存到 `dir`（不弹保存对话框）
pub async fn set_download_dir(browser: &Browser, dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("无法创建下载目录: {}", dir.display()))?;
    let absolute = dir
        .canonicalize()
        .with_context(|| format!("无法解析下载目录: {}", dir.display()))?;

    let params = SetDownloadBehaviorParams::builder()
        .behavior(SetDownloadBehaviorBehavior::Allow)
        .download_path(absolute.to_string_lossy().to_string())
        .build()
        .map_err(|e| anyhow::anyhow!("下载设置参数无效: {}", e))?;
    browser
        .execute(params)
        .await
        .context("设置下载目录失败")?;

    info!("📂 浏览器下载目录: {}", absolute.display());
    Ok(())
}
