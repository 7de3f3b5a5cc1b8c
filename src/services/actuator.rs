//! 交互执行服务 - 业务能力层
//!
//! 每次尝试：滚动到视口中央 → 稳定等待 → 原生交互；
//! 被遮挡时在同一次尝试里改用 DOM 合成事件。文本输入总是先清空，
//! 写入后回读校验，键盘输入不生效时改为直接设置 value。

use std::time::Duration;

use tokio::time::sleep;
use tracing::debug;

use crate::config::{Config, Pacing};
use crate::error::{AppResult, DocumentError};
use crate::infrastructure::{DocResult, ElementHandle, ElementScope, LiveDocument};
use crate::models::{ActionOutcome, SelectorCandidate};
use crate::services::locator::Locator;

/// 交互类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Click,
    TypeText(String),
}

impl Action {
    pub fn type_text(text: impl Into<String>) -> Self {
        Action::TypeText(text.into())
    }
}

/// 回读值是否与期望一致（数字框会去掉前导零）
fn values_match(actual: &str, expected: &str) -> bool {
    let (actual, expected) = (actual.trim(), expected.trim());
    if actual == expected {
        return true;
    }
    match (actual.parse::<u64>(), expected.parse::<u64>()) {
        (Ok(a), Ok(e)) => a == e,
        _ => false,
    }
}

#[derive(Debug, Clone)]
pub struct Actuator {
    locator: Locator,
    settle: Duration,
    pacing: Pacing,
    max_attempts: u32,
    relocate_attempts: u32,
    element_wait: Duration,
}

impl Actuator {
    pub fn new(locator: Locator, config: &Config) -> Self {
        Self {
            locator,
            settle: config.pacing.settle(),
            pacing: config.pacing.clone(),
            max_attempts: config.retries.action_attempts,
            relocate_attempts: config.retries.relocate_attempts,
            element_wait: config.timeouts.element_wait(),
        }
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn relocate_attempts(&self) -> u32 {
        self.relocate_attempts
    }

    /// 对已定位的元素执行交互
    ///
    /// 任一次尝试成功即 `Success`；元素失效立即返回 `StaleReference` 交给调用方重新定位；
    /// 否则返回最后一次观察到的失败。
    pub async fn act(
        &self,
        doc: &dyn LiveDocument,
        element: ElementHandle,
        action: &Action,
        max_attempts: u32,
    ) -> AppResult<ActionOutcome> {
        let mut last = ActionOutcome::Timeout;

        for attempt in 1..=max_attempts.max(1) {
            if attempt > 1 {
                sleep(self.pacing.backoff(attempt - 1)).await;
            }

            match self.attempt(doc, element, action).await {
                Ok(()) => return Ok(ActionOutcome::Success),
                Err(DocumentError::Stale) => return Ok(ActionOutcome::StaleReference),
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(DocumentError::Intercepted(blocker)) => {
                    debug!("第 {} 次尝试被 {} 拦截", attempt, blocker);
                    last = ActionOutcome::Intercepted;
                }
                Err(e) => {
                    debug!("第 {} 次尝试失败: {}", attempt, e);
                    last = ActionOutcome::Timeout;
                }
            }
        }

        Ok(last)
    }

    async fn attempt(
        &self,
        doc: &dyn LiveDocument,
        element: ElementHandle,
        action: &Action,
    ) -> DocResult<()> {
        doc.scroll_into_view(element).await?;
        if !self.settle.is_zero() {
            sleep(self.settle).await;
        }

        match action {
            Action::Click => match doc.native_click(element).await {
                Err(DocumentError::Intercepted(blocker)) => {
                    debug!("点击被 {} 遮挡，改用合成点击", blocker);
                    doc.synthetic_click(element).await.map_err(|e| match e {
                        DocumentError::Stale | DocumentError::Unreachable(_) => e,
                        _ => DocumentError::Intercepted(blocker),
                    })
                }
                other => other,
            },
            Action::TypeText(text) => self.type_text(doc, element, text).await,
        }
    }

    async fn type_text(
        &self,
        doc: &dyn LiveDocument,
        element: ElementHandle,
        text: &str,
    ) -> DocResult<()> {
        match doc.native_type(element, text).await {
            Ok(()) => {
                if self.verify(doc, element, text).await? {
                    return Ok(());
                }
                debug!("键盘输入后回读不一致，改为直接设置 value");
            }
            Err(e @ (DocumentError::Stale | DocumentError::Unreachable(_))) => return Err(e),
            Err(e) => debug!("键盘输入失败 ({})，改为直接设置 value", e),
        }

        doc.synthetic_type(element, text).await?;
        if self.verify(doc, element, text).await? {
            Ok(())
        } else {
            Err(DocumentError::Script(format!("输入后回读不一致 (期望 '{}')", text)))
        }
    }

    /// 回读校验；读不到值（非输入控件或脚本出错）时视为通过
    async fn verify(
        &self,
        doc: &dyn LiveDocument,
        element: ElementHandle,
        expected: &str,
    ) -> DocResult<bool> {
        match doc.read_value(element).await {
            Ok(Some(actual)) => Ok(values_match(&actual, expected)),
            Ok(None) => Ok(true),
            Err(e @ (DocumentError::Stale | DocumentError::Unreachable(_))) => Err(e),
            Err(e) => {
                debug!("无法回读输入值: {}", e);
                Ok(true)
            }
        }
    }

    /// 定位 + 交互；元素失效时从头重新定位
    pub async fn act_on(
        &self,
        doc: &dyn LiveDocument,
        candidates: &SelectorCandidate,
        scope: ElementScope,
        action: &Action,
    ) -> AppResult<ActionOutcome> {
        for round in 0..=self.relocate_attempts {
            let Some(element) = self
                .locator
                .locate(doc, candidates, scope, self.element_wait)
                .await?
            else {
                return Ok(ActionOutcome::NotFound);
            };

            match self.act(doc, element, action, self.max_attempts).await? {
                ActionOutcome::StaleReference => {
                    debug!("元素已失效，重新定位 ({}/{})", round + 1, self.relocate_attempts);
                }
                outcome => return Ok(outcome),
            }
        }
        Ok(ActionOutcome::StaleReference)
    }
}
