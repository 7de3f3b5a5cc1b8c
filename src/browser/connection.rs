use anyhow::{Context, Result};
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use tokio::time::sleep;
use tracing::{debug, error, info};

/// 连接到已打开的浏览器（调试端口）并获取页面
///
/// 优先复用 URL 里包含 `prefer_host` 的已有标签页（通常已经登录），
/// 否则新建空白页。
pub async fn connect_to_browser_and_page(
    port: u16,
    prefer_host: Option<&str>,
) -> Result<(Browser, Page)> {
    let browser_url = format!("http://localhost:{}", port);
    info!("正在连接到浏览器: {}", browser_url);

    let (browser, mut handler) = Browser::connect(&browser_url)
        .await
        .map_err(|e| {
            error!("连接浏览器失败: {}", e);
            e
        })
        .with_context(|| format!("无法连接 {}，请确认浏览器以 --remote-debugging-port={} 启动", browser_url, port))?;
    debug!("浏览器连接成功");

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

    let pages = browser.pages().await?;
    debug!("获取到 {} 个页面", pages.len());

    if let Some(host) = prefer_host {
        for p in pages.iter() {
            if let Ok(Some(url)) = p.url().await {
                debug!("检查页面: {}", url);
                if url.contains(host) {
                    info!("✓ 复用已有页面: {}", url);
                    return Ok((browser, p.clone()));
                }
            }
        }
        debug!("未找到匹配的页面，将创建新页面");
    }

    let page = browser.new_page("about:blank").await.map_err(|e| {
        error!("创建空白页面失败: {}", e);
        e
    })?;
    Ok((browser, page))
}
