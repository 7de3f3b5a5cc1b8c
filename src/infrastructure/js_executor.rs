//! JS 执行器 - 基础设施层
//!
//! 持有唯一的 page 资源，对上层只暴露 `LiveDocument` 能力

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, DispatchMouseEventParams,
    DispatchMouseEventType, InsertTextParams, MouseButton,
};
use chromiumoxide::Page;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::error::DocumentError;
use crate::infrastructure::document::{DocResult, ElementHandle, ElementScope, LiveDocument};
use crate::infrastructure::dom_scripts as scripts;
use crate::models::Selector;

/// 页面脚本的统一返回格式
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    ok: Option<JsonValue>,
    #[serde(default)]
    stale: bool,
    intercepted: Option<String>,
    #[serde(default)]
    not_interactable: bool,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClickPoint {
    x: f64,
    y: f64,
}

/// JS 执行器
///
/// 职责：
/// - 持有唯一的 Page 资源
/// - 把页面脚本和 CDP 输入事件包装成 `LiveDocument`
/// - 不认识片段 / 会话，不处理业务流程
pub struct JsExecutor {
    page: Page,
}

impl JsExecutor {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    /// 执行 JS 代码并返回 JSON 结果
    pub async fn eval(&self, js_code: impl Into<String>) -> DocResult<JsonValue> {
        let result = self.page.evaluate(js_code.into()).await?;
        let json_value: JsonValue = result
            .into_value()
            .map_err(|e| DocumentError::Script(e.to_string()))?;
        Ok(json_value)
    }

    /// 执行 JS 代码并反序列化为指定类型
    pub async fn eval_as<T: DeserializeOwned>(&self, js_code: impl Into<String>) -> DocResult<T> {
        let json_value = self.eval(js_code).await?;
        serde_json::from_value(json_value).map_err(|e| DocumentError::Script(e.to_string()))
    }

    /// 执行信封格式的脚本，把页面侧状态翻译成 `DocumentError`
    async fn run<T: DeserializeOwned>(&self, script: String) -> DocResult<T> {
        let envelope: Envelope = self.eval_as(script).await?;
        if envelope.stale {
            return Err(DocumentError::Stale);
        }
        if let Some(blocker) = envelope.intercepted {
            return Err(DocumentError::Intercepted(blocker));
        }
        if envelope.not_interactable {
            return Err(DocumentError::NotInteractable);
        }
        if let Some(message) = envelope.error {
            return Err(DocumentError::Script(message));
        }
        serde_json::from_value(envelope.ok.unwrap_or(JsonValue::Null))
            .map_err(|e| DocumentError::Script(e.to_string()))
    }

    async fn mouse_click_at(&self, x: f64, y: f64) -> DocResult<()> {
        let moved = DispatchMouseEventParams::builder()
            .r#type(DispatchMouseEventType::MouseMoved)
            .x(x)
            .y(y)
            .build()
            .map_err(DocumentError::Script)?;
        self.page.execute(moved).await?;

        for kind in [
            DispatchMouseEventType::MousePressed,
            DispatchMouseEventType::MouseReleased,
        ] {
            let cmd = DispatchMouseEventParams::builder()
                .r#type(kind)
                .button(MouseButton::Left)
                .x(x)
                .y(y)
                .click_count(1)
                .build()
                .map_err(DocumentError::Script)?;
            self.page.execute(cmd).await?;
        }
        Ok(())
    }

    async fn key_event(&self, kind: DispatchKeyEventType) -> DocResult<()> {
        let mut builder = DispatchKeyEventParams::builder()
            .r#type(kind.clone())
            .key("Enter")
            .code("Enter")
            .windows_virtual_key_code(13)
            .native_virtual_key_code(13);
        if kind == DispatchKeyEventType::KeyDown {
            builder = builder.text("\r");
        }
        let cmd = builder.build().map_err(DocumentError::Script)?;
        self.page.execute(cmd).await?;
        Ok(())
    }
}

#[async_trait]
impl LiveDocument for JsExecutor {
    async fn navigate(&self, url: &str) -> DocResult<()> {
        debug!("导航到: {}", url);
        self.page.goto(url).await?;
        Ok(())
    }

    async fn current_url(&self) -> DocResult<String> {
        Ok(self.page.url().await?.unwrap_or_default())
    }

    async fn is_ready(&self) -> DocResult<bool> {
        self.run(scripts::ready_state()).await
    }

    async fn find_displayed(
        &self,
        selector: &Selector,
        scope: ElementScope,
    ) -> DocResult<Vec<ElementHandle>> {
        let ids: Vec<u64> = self.run(scripts::find_displayed(selector, scope)).await?;
        Ok(ids.into_iter().map(ElementHandle::new).collect())
    }

    async fn count(&self, selector: &Selector, scope: ElementScope) -> DocResult<usize> {
        self.run(scripts::count(selector, scope)).await
    }

    async fn scroll_into_view(&self, element: ElementHandle) -> DocResult<()> {
        self.run::<bool>(scripts::scroll_into_view(element)).await?;
        Ok(())
    }

    async fn native_click(&self, element: ElementHandle) -> DocResult<()> {
        let point: ClickPoint = self.run(scripts::click_point(element)).await?;
        self.mouse_click_at(point.x, point.y).await
    }

    async fn synthetic_click(&self, element: ElementHandle) -> DocResult<()> {
        self.run::<bool>(scripts::synthetic_click(element)).await?;
        Ok(())
    }

    async fn native_type(&self, element: ElementHandle, text: &str) -> DocResult<()> {
        self.run::<bool>(scripts::focus_and_clear(element)).await?;
        if !text.is_empty() {
            self.page.execute(InsertTextParams::new(text)).await?;
        }
        Ok(())
    }

    async fn synthetic_type(&self, element: ElementHandle, text: &str) -> DocResult<()> {
        self.run::<bool>(scripts::set_value(element, text)).await?;
        Ok(())
    }

    async fn read_value(&self, element: ElementHandle) -> DocResult<Option<String>> {
        self.run(scripts::read_value(element)).await
    }

    async fn text(&self, element: ElementHandle) -> DocResult<String> {
        self.run(scripts::text(element)).await
    }

    async fn attribute(&self, element: ElementHandle, name: &str) -> DocResult<Option<String>> {
        self.run(scripts::attribute(element, name)).await
    }

    async fn press_enter(&self, element: ElementHandle) -> DocResult<()> {
        self.run::<bool>(scripts::focus(element)).await?;
        self.key_event(DispatchKeyEventType::KeyDown).await?;
        self.key_event(DispatchKeyEventType::KeyUp).await
    }

    async fn enable_inputs(&self, scope: ElementScope) -> DocResult<usize> {
        self.run(scripts::enable_inputs(scope)).await
    }

    async fn cookies(&self) -> DocResult<Vec<(String, String)>> {
        let cookies = self.page.get_cookies().await?;
        Ok(cookies.into_iter().map(|c| (c.name, c.value)).collect())
    }
}
