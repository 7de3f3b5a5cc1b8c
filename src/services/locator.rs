//! 元素定位服务 - 业务能力层
//!
//! 按候选顺序逐个轮询，第一个出现可见匹配的候选胜出。
//! 找不到是正常结果（`None`），只有浏览器会话不可达才返回错误。

use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::config::Config;
use crate::error::{AppResult, DocumentError};
use crate::infrastructure::{ElementHandle, ElementScope, LiveDocument};
use crate::models::SelectorCandidate;

#[derive(Debug, Clone)]
pub struct Locator {
    poll_interval: Duration,
}

impl Locator {
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.timeouts.poll_interval())
    }

    /// 第一个可见匹配元素
    ///
    /// `timeout` 是每个候选的等待上限；每个候选至少检查一次。
    pub async fn locate(
        &self,
        doc: &dyn LiveDocument,
        candidates: &SelectorCandidate,
        scope: ElementScope,
        timeout: Duration,
    ) -> AppResult<Option<ElementHandle>> {
        let found = self.locate_all(doc, candidates, scope, timeout, 1).await?;
        Ok(found.and_then(|all| all.into_iter().next()))
    }

    /// 第一个至少有 `min_count` 个可见匹配的候选的全部匹配（文档顺序）
    pub async fn locate_all(
        &self,
        doc: &dyn LiveDocument,
        candidates: &SelectorCandidate,
        scope: ElementScope,
        timeout: Duration,
        min_count: usize,
    ) -> AppResult<Option<Vec<ElementHandle>>> {
        let min_count = min_count.max(1);

        for selector in candidates.iter() {
            let deadline = Instant::now() + timeout;
            loop {
                match doc.find_displayed(selector, scope).await {
                    Ok(found) if found.len() >= min_count => {
                        debug!("✓ 定位成功: {} ({} 个)", selector, found.len());
                        return Ok(Some(found));
                    }
                    Ok(_) => {}
                    Err(e) if e.is_fatal() => return Err(e.into()),
                    Err(DocumentError::Stale) => {
                        // 容器本身已失效，换哪个候选都不会有结果
                        debug!("查找范围已失效: {:?}", scope);
                        return Ok(None);
                    }
                    Err(e) => debug!("选择器 {} 查找出错: {}", selector, e),
                }

                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                sleep(self.poll_interval.min(deadline - now)).await;
            }
        }

        debug!("未找到控件: {}", candidates.describe());
        Ok(None)
    }

    /// 只检查一次，不等待
    pub async fn probe(
        &self,
        doc: &dyn LiveDocument,
        candidates: &SelectorCandidate,
        scope: ElementScope,
    ) -> AppResult<Option<ElementHandle>> {
        self.locate(doc, candidates, scope, Duration::ZERO).await
    }

    /// 等待 `document.readyState == "complete"`
    pub async fn wait_until_ready(
        &self,
        doc: &dyn LiveDocument,
        timeout: Duration,
    ) -> AppResult<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            match doc.is_ready().await {
                Ok(true) => return Ok(true),
                Ok(false) => {}
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => debug!("读取页面状态出错: {}", e),
            }
            let now = Instant::now();
            if now >= deadline {
                debug!("页面在 {:?} 内未加载完成", timeout);
                return Ok(false);
            }
            sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    /// 第一个有匹配的候选的匹配数量（不要求可见）
    pub async fn count(
        &self,
        doc: &dyn LiveDocument,
        candidates: &SelectorCandidate,
        scope: ElementScope,
    ) -> AppResult<usize> {
        for selector in candidates.iter() {
            match doc.count(selector, scope).await {
                Ok(n) if n > 0 => return Ok(n),
                Ok(_) => {}
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => debug!("选择器 {} 计数出错: {}", selector, e),
            }
        }
        Ok(0)
    }
}
