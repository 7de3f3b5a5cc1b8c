//! 页面文档抽象
//!
//! 引擎（定位器 / 执行器 / 会话）只依赖这个 trait，
//! 生产环境由 `JsExecutor` 实现，测试里由 `FakeDocument` 实现。

use async_trait::async_trait;

use crate::error::DocumentError;
use crate::models::Selector;

pub type DocResult<T> = Result<T, DocumentError>;

/// 页面元素句柄
///
/// 只是页面侧注册表里的编号；元素被移出 DOM 后，任何使用它的调用都会得到
/// `DocumentError::Stale`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementHandle(u64);

impl ElementHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(self) -> u64 {
        self.0
    }
}

/// 查找范围
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementScope {
    Document,
    Within(ElementHandle),
}

#[async_trait]
pub trait LiveDocument: Send + Sync {
    async fn navigate(&self, url: &str) -> DocResult<()>;

    async fn current_url(&self) -> DocResult<String>;

    /// `document.readyState == "complete"`
    async fn is_ready(&self) -> DocResult<bool>;

    /// 当前可见的匹配元素，按文档顺序
    async fn find_displayed(
        &self,
        selector: &Selector,
        scope: ElementScope,
    ) -> DocResult<Vec<ElementHandle>>;

    /// 匹配元素数量（不要求可见）
    async fn count(&self, selector: &Selector, scope: ElementScope) -> DocResult<usize>;

    async fn scroll_into_view(&self, element: ElementHandle) -> DocResult<()>;

    /// 真实鼠标事件点击；被遮挡时返回 `Intercepted`
    async fn native_click(&self, element: ElementHandle) -> DocResult<()>;

    /// DOM 层面的 `el.click()`
    async fn synthetic_click(&self, element: ElementHandle) -> DocResult<()>;

    /// 清空后用键盘输入
    async fn native_type(&self, element: ElementHandle, text: &str) -> DocResult<()>;

    /// 直接设置 value 并派发 input / change 事件
    async fn synthetic_type(&self, element: ElementHandle, text: &str) -> DocResult<()>;

    /// 控件当前的值；不是输入控件时为 `None`
    async fn read_value(&self, element: ElementHandle) -> DocResult<Option<String>>;

    async fn text(&self, element: ElementHandle) -> DocResult<String>;

    async fn attribute(&self, element: ElementHandle, name: &str) -> DocResult<Option<String>>;

    async fn press_enter(&self, element: ElementHandle) -> DocResult<()>;

    /// 去掉范围内输入框的 disabled / readonly，返回处理的数量
    async fn enable_inputs(&self, scope: ElementScope) -> DocResult<usize>;

    /// 当前页面的 cookie (name, value)
    async fn cookies(&self) -> DocResult<Vec<(String, String)>>;
}
