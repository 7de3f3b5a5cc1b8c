//! 内存中的脚本化页面
//!
//! 节点按选择器表达式原文匹配；点击 / 回车 / 导航可以挂钩子修改页面，
//! 失败可以按次数预先排好。

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::DocumentError;
use crate::infrastructure::{DocResult, ElementHandle, ElementScope, LiveDocument};
use crate::models::{Selector, SelectorCandidate};

pub type DomHook = Arc<dyn Fn(&mut FakeDom) + Send + Sync>;
pub type NavigateHook = Arc<dyn Fn(&mut FakeDom, &str) + Send + Sync>;

/// 候选列表里第一个表达式，方便按配置搭页面
pub fn first_expr(candidate: &SelectorCandidate) -> String {
    candidate
        .iter()
        .next()
        .map(|s| s.expression().to_string())
        .unwrap_or_default()
}

#[derive(Clone, Default)]
pub struct FakeNode {
    pub selectors: Vec<String>,
    pub parent: Option<ElementHandle>,
    pub visible: bool,
    /// 前 N 次查找时还不可见
    pub hidden_polls: u32,
    pub value: Option<String>,
    pub text: String,
    pub attrs: HashMap<String, String>,
    pub disabled: bool,
    pub native_click_failures: VecDeque<DocumentError>,
    pub synthetic_click_failures: VecDeque<DocumentError>,
    pub native_type_failures: VecDeque<DocumentError>,
    /// 键盘输入"成功"但值不变
    pub ignores_native_typing: bool,
    pub on_click: Option<DomHook>,
    pub on_enter: Option<DomHook>,
    order: i64,
    detached: bool,
}

impl FakeNode {
    pub fn new(selectors: &[&str]) -> Self {
        Self {
            selectors: selectors.iter().map(|s| s.to_string()).collect(),
            visible: true,
            ..Self::default()
        }
    }

    pub fn matching(expr: impl Into<String>) -> Self {
        Self {
            selectors: vec![expr.into()],
            visible: true,
            ..Self::default()
        }
    }

    pub fn also_matching(mut self, expr: impl Into<String>) -> Self {
        self.selectors.push(expr.into());
        self
    }

    pub fn under(mut self, parent: ElementHandle) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn appears_after(mut self, polls: u32) -> Self {
        self.hidden_polls = polls;
        self
    }

    pub fn input(mut self, value: &str) -> Self {
        self.value = Some(value.to_string());
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn with_attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.insert(name.to_string(), value.to_string());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    pub fn fail_native_click(mut self, err: DocumentError) -> Self {
        self.native_click_failures.push_back(err);
        self
    }

    pub fn fail_synthetic_click(mut self, err: DocumentError) -> Self {
        self.synthetic_click_failures.push_back(err);
        self
    }

    pub fn fail_native_type(mut self, err: DocumentError) -> Self {
        self.native_type_failures.push_back(err);
        self
    }

    pub fn ignore_native_typing(mut self) -> Self {
        self.ignores_native_typing = true;
        self
    }

    pub fn on_click(mut self, hook: impl Fn(&mut FakeDom) + Send + Sync + 'static) -> Self {
        self.on_click = Some(Arc::new(hook));
        self
    }

    pub fn on_enter(mut self, hook: impl Fn(&mut FakeDom) + Send + Sync + 'static) -> Self {
        self.on_enter = Some(Arc::new(hook));
        self
    }
}

pub struct FakeDom {
    nodes: Vec<FakeNode>,
    next_order: i64,
    pub url: String,
    pub ready: bool,
    pub cookies: Vec<(String, String)>,
    /// 交互记录，如 `click:3`、`type:5=abc`
    pub log: Vec<String>,
    pub on_navigate: Option<NavigateHook>,
    /// 连接已断开时所有调用都返回 `Unreachable`
    pub unreachable: bool,
}

impl Default for FakeDom {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            next_order: 0,
            url: "about:blank".to_string(),
            ready: true,
            cookies: Vec::new(),
            log: Vec::new(),
            on_navigate: None,
            unreachable: false,
        }
    }
}

impl FakeDom {
    /// 追加到文档末尾
    pub fn add(&mut self, mut node: FakeNode) -> ElementHandle {
        self.next_order += 1;
        node.order = self.next_order;
        self.nodes.push(node);
        ElementHandle::new(self.nodes.len() as u64)
    }

    /// 插入到文档开头
    pub fn prepend(&mut self, node: FakeNode) -> ElementHandle {
        let handle = self.add(node);
        if let Some(n) = self.node_mut(handle) {
            n.order = -n.order;
        }
        handle
    }

    fn index(handle: ElementHandle) -> usize {
        (handle.id() as usize).wrapping_sub(1)
    }

    pub fn node(&self, handle: ElementHandle) -> Option<&FakeNode> {
        self.nodes.get(Self::index(handle))
    }

    pub fn node_mut(&mut self, handle: ElementHandle) -> Option<&mut FakeNode> {
        self.nodes.get_mut(Self::index(handle))
    }

    fn is_attached(&self, handle: ElementHandle) -> bool {
        let mut current = Some(handle);
        while let Some(h) = current {
            match self.node(h) {
                Some(node) if !node.detached => current = node.parent,
                _ => return false,
            }
        }
        true
    }

    fn attached(&self, handle: ElementHandle) -> DocResult<&FakeNode> {
        if self.is_attached(handle) {
            self.node(handle).ok_or(DocumentError::Stale)
        } else {
            Err(DocumentError::Stale)
        }
    }

    fn attached_mut(&mut self, handle: ElementHandle) -> DocResult<&mut FakeNode> {
        if self.is_attached(handle) {
            self.node_mut(handle).ok_or(DocumentError::Stale)
        } else {
            Err(DocumentError::Stale)
        }
    }

    /// 从 DOM 移除（子节点随之失效）
    pub fn detach(&mut self, handle: ElementHandle) {
        if let Some(node) = self.node_mut(handle) {
            node.detached = true;
        }
    }

    /// 移除所有匹配某个表达式的节点
    pub fn remove_matching(&mut self, expr: &str) {
        for node in &mut self.nodes {
            if node.selectors.iter().any(|s| s == expr) {
                node.detached = true;
            }
        }
    }

    pub fn set_visible_matching(&mut self, expr: &str, visible: bool) {
        for node in &mut self.nodes {
            if !node.detached && node.selectors.iter().any(|s| s == expr) {
                node.visible = visible;
            }
        }
    }

    fn in_scope(&self, handle: ElementHandle, scope: ElementScope) -> bool {
        match scope {
            ElementScope::Document => true,
            ElementScope::Within(root) => {
                let mut current = self.node(handle).and_then(|n| n.parent);
                while let Some(h) = current {
                    if h == root {
                        return true;
                    }
                    current = self.node(h).and_then(|n| n.parent);
                }
                false
            }
        }
    }

    fn matches(&self, expr: &str, scope: ElementScope) -> Vec<ElementHandle> {
        let mut found: Vec<(i64, ElementHandle)> = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n, ElementHandle::new(i as u64 + 1)))
            .filter(|(n, h)| {
                n.selectors.iter().any(|s| s == expr)
                    && self.is_attached(*h)
                    && self.in_scope(*h, scope)
            })
            .map(|(n, h)| (n.order, h))
            .collect();
        found.sort_by_key(|(order, _)| *order);
        found.into_iter().map(|(_, h)| h).collect()
    }

    pub fn count_matching(&self, expr: &str) -> usize {
        self.matches(expr, ElementScope::Document).len()
    }

    pub fn value_of(&self, handle: ElementHandle) -> Option<String> {
        self.node(handle).and_then(|n| n.value.clone())
    }

    fn check_scope(&self, scope: ElementScope) -> DocResult<()> {
        match scope {
            ElementScope::Within(root) if !self.is_attached(root) => Err(DocumentError::Stale),
            _ => Ok(()),
        }
    }

    fn guard(&self) -> DocResult<()> {
        if self.unreachable {
            Err(DocumentError::Unreachable("channel closed".to_string()))
        } else {
            Ok(())
        }
    }
}

/// 测试用页面文档
#[derive(Default)]
pub struct FakeDocument {
    dom: Mutex<FakeDom>,
}

impl FakeDocument {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FakeDom> {
        self.dom.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 直接修改页面
    pub fn with<R>(&self, f: impl FnOnce(&mut FakeDom) -> R) -> R {
        f(&mut self.lock())
    }

    pub fn add(&self, node: FakeNode) -> ElementHandle {
        self.lock().add(node)
    }

    pub fn log(&self) -> Vec<String> {
        self.lock().log.clone()
    }

    pub fn value_of(&self, handle: ElementHandle) -> Option<String> {
        self.lock().value_of(handle)
    }

    pub fn url(&self) -> String {
        self.lock().url.clone()
    }

    fn run_hook(&self, hook: Option<DomHook>) {
        if let Some(hook) = hook {
            let mut dom = self.lock();
            hook(&mut dom);
        }
    }

    fn click(&self, element: ElementHandle, native: bool) -> DocResult<()> {
        let hook = {
            let mut dom = self.lock();
            dom.guard()?;
            let node = dom.attached_mut(element)?;
            if node.disabled {
                return Err(DocumentError::NotInteractable);
            }
            let queue = if native {
                &mut node.native_click_failures
            } else {
                &mut node.synthetic_click_failures
            };
            if let Some(err) = queue.pop_front() {
                return Err(err);
            }
            let hook = node.on_click.clone();
            let kind = if native { "click" } else { "js-click" };
            dom.log.push(format!("{}:{}", kind, element.id()));
            hook
        };
        self.run_hook(hook);
        Ok(())
    }
}

#[async_trait]
impl LiveDocument for FakeDocument {
    async fn navigate(&self, url: &str) -> DocResult<()> {
        let hook = {
            let mut dom = self.lock();
            dom.guard()?;
            dom.url = url.to_string();
            dom.log.push(format!("goto:{}", url));
            dom.on_navigate.clone()
        };
        if let Some(hook) = hook {
            let mut dom = self.lock();
            hook(&mut dom, url);
        }
        Ok(())
    }

    async fn current_url(&self) -> DocResult<String> {
        let dom = self.lock();
        dom.guard()?;
        Ok(dom.url.clone())
    }

    async fn is_ready(&self) -> DocResult<bool> {
        let dom = self.lock();
        dom.guard()?;
        Ok(dom.ready)
    }

    async fn find_displayed(
        &self,
        selector: &Selector,
        scope: ElementScope,
    ) -> DocResult<Vec<ElementHandle>> {
        let mut dom = self.lock();
        dom.guard()?;
        dom.check_scope(scope)?;
        let mut shown = Vec::new();
        for handle in dom.matches(selector.expression(), scope) {
            if let Some(node) = dom.node_mut(handle) {
                if !node.visible {
                    continue;
                }
                if node.hidden_polls > 0 {
                    node.hidden_polls -= 1;
                    continue;
                }
                shown.push(handle);
            }
        }
        Ok(shown)
    }

    async fn count(&self, selector: &Selector, scope: ElementScope) -> DocResult<usize> {
        let dom = self.lock();
        dom.guard()?;
        dom.check_scope(scope)?;
        Ok(dom.matches(selector.expression(), scope).len())
    }

    async fn scroll_into_view(&self, element: ElementHandle) -> DocResult<()> {
        let dom = self.lock();
        dom.guard()?;
        dom.attached(element).map(|_| ())
    }

    async fn native_click(&self, element: ElementHandle) -> DocResult<()> {
        self.click(element, true)
    }

    async fn synthetic_click(&self, element: ElementHandle) -> DocResult<()> {
        self.click(element, false)
    }

    async fn native_type(&self, element: ElementHandle, text: &str) -> DocResult<()> {
        let mut dom = self.lock();
        dom.guard()?;
        let node = dom.attached_mut(element)?;
        if node.disabled {
            return Err(DocumentError::NotInteractable);
        }
        if let Some(err) = node.native_type_failures.pop_front() {
            return Err(err);
        }
        if !node.ignores_native_typing {
            node.value = Some(text.to_string());
        }
        dom.log.push(format!("type:{}={}", element.id(), text));
        Ok(())
    }

    async fn synthetic_type(&self, element: ElementHandle, text: &str) -> DocResult<()> {
        let mut dom = self.lock();
        dom.guard()?;
        let node = dom.attached_mut(element)?;
        node.value = Some(text.to_string());
        dom.log.push(format!("js-type:{}={}", element.id(), text));
        Ok(())
    }

    async fn read_value(&self, element: ElementHandle) -> DocResult<Option<String>> {
        let dom = self.lock();
        dom.guard()?;
        Ok(dom.attached(element)?.value.clone())
    }

    async fn text(&self, element: ElementHandle) -> DocResult<String> {
        let dom = self.lock();
        dom.guard()?;
        Ok(dom.attached(element)?.text.clone())
    }

    async fn attribute(&self, element: ElementHandle, name: &str) -> DocResult<Option<String>> {
        let dom = self.lock();
        dom.guard()?;
        Ok(dom.attached(element)?.attrs.get(name).cloned())
    }

    async fn press_enter(&self, element: ElementHandle) -> DocResult<()> {
        let hook = {
            let mut dom = self.lock();
            dom.guard()?;
            let hook = dom.attached(element)?.on_enter.clone();
            dom.log.push(format!("enter:{}", element.id()));
            hook
        };
        self.run_hook(hook);
        Ok(())
    }

    async fn enable_inputs(&self, scope: ElementScope) -> DocResult<usize> {
        let mut dom = self.lock();
        dom.guard()?;
        dom.check_scope(scope)?;
        let targets: Vec<ElementHandle> = (1..=dom.nodes.len() as u64)
            .map(ElementHandle::new)
            .filter(|h| dom.is_attached(*h) && dom.in_scope(*h, scope))
            .filter(|h| {
                dom.node(*h)
                    .map(|n| n.disabled && n.value.is_some())
                    .unwrap_or(false)
            })
            .collect();
        for handle in &targets {
            if let Some(node) = dom.node_mut(*handle) {
                node.disabled = false;
            }
        }
        Ok(targets.len())
    }

    async fn cookies(&self) -> DocResult<Vec<(String, String)>> {
        let dom = self.lock();
        dom.guard()?;
        Ok(dom.cookies.clone())
    }
}
