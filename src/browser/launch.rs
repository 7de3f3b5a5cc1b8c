use anyhow::Result;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::config::BrowserSettings;

/// 启动浏览器并打开一个空白页
pub async fn launch_browser(settings: &BrowserSettings) -> Result<(Browser, Page)> {
    info!(
        "🚀 启动浏览器 ({})...",
        if settings.headless { "无头模式" } else { "有界面" }
    );

    let mut builder = BrowserConfig::builder()
        .window_size(settings.window_width, settings.window_height)
        .args(settings.args.clone());
    if !settings.headless {
        builder = builder.with_head();
    }
    if let Some(executable) = &settings.executable {
        debug!("浏览器路径: {}", executable.display());
        builder = builder.chrome_executable(executable);
    }
    let config = builder.build().map_err(|e| {
        error!("配置浏览器失败: {}", e);
        anyhow::anyhow!("配置浏览器失败: {}", e)
    })?;

    let (browser, mut handler) = Browser::launch(config).await.map_err(|e| {
        error!("启动浏览器失败: {}", e);
        anyhow::anyhow!("启动浏览器失败: {}", e)
    })?;
    debug!("浏览器启动成功");

    // 在后台处理浏览器事件
    tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
    });

    // 添加短暂延迟以等待浏览器状态同步
    sleep(tokio::time::Duration::from_millis(300)).await;

    let page = browser.new_page("about:blank").await.map_err(|e| {
        error!("创建页面失败: {}", e);
        anyhow::anyhow!("创建页面失败: {}", e)
    })?;

    Ok((browser, page))
}
