//! 会话 / 导航状态机 - 流程层
//!
//! `LoggedOut → Authenticating → Home → Editor(url) → ControlsPanel(url)`
//!
//! 状态只由这里的导航操作修改；同一视频的连续片段直接复用 Editor，不重新加载。

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::config::{Config, Credentials, Pacing, SelectorTable, SiteSettings, Timeouts};
use crate::error::{AppResult, AutomationError};
use crate::infrastructure::{ElementHandle, ElementScope, LiveDocument};
use crate::models::{ActionOutcome, SelectorCandidate, Verdict};
use crate::services::{Action, Actuator, Locator};

/// 当前所在的页面
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UiContext {
    Home,
    Editor,
    ControlsPanel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionState {
    pub authenticated: bool,
    pub loaded_resource: Option<String>,
    pub ui_context: UiContext,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            authenticated: false,
            loaded_resource: None,
            ui_context: UiContext::Home,
        }
    }
}

/// 状态机所处阶段（由 `SessionState` 推出）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    LoggedOut,
    Authenticating,
    Home,
    Editor(String),
    ControlsPanel(String),
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionPhase::LoggedOut => f.write_str("未登录"),
            SessionPhase::Authenticating => f.write_str("登录中"),
            SessionPhase::Home => f.write_str("首页"),
            SessionPhase::Editor(url) => write!(f, "剪辑页({})", url),
            SessionPhase::ControlsPanel(url) => write!(f, "Controls 面板({})", url),
        }
    }
}

/// `ensure_resource` 的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceEntry {
    /// 视频已经加载，直接复用
    Reused,
    FreshlyLoaded,
    /// 加载失败，已回到首页
    Unavailable(String),
}

pub struct Session {
    state: SessionState,
    authenticating: bool,
    actuator: Actuator,
    selectors: SelectorTable,
    site: SiteSettings,
    credentials: Credentials,
    timeouts: Timeouts,
    pacing: Pacing,
    controls_checks: u32,
}

impl Session {
    pub fn new(config: &Config) -> Self {
        let actuator = Actuator::new(Locator::from_config(config), config);
        Self {
            state: SessionState::default(),
            authenticating: false,
            actuator,
            selectors: config.selectors.clone(),
            site: config.site.clone(),
            credentials: config.credentials.clone(),
            timeouts: config.timeouts.clone(),
            pacing: config.pacing.clone(),
            controls_checks: config.retries.controls_checks,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn actuator(&self) -> &Actuator {
        &self.actuator
    }

    fn locator(&self) -> &Locator {
        self.actuator.locator()
    }

    pub fn phase(&self) -> SessionPhase {
        if self.authenticating {
            return SessionPhase::Authenticating;
        }
        if !self.state.authenticated {
            return SessionPhase::LoggedOut;
        }
        match (&self.state.ui_context, &self.state.loaded_resource) {
            (UiContext::Editor, Some(url)) => SessionPhase::Editor(url.clone()),
            (UiContext::ControlsPanel, Some(url)) => SessionPhase::ControlsPanel(url.clone()),
            _ => SessionPhase::Home,
        }
    }

    // ========== 登录 ==========

    /// 提交凭据并确认登录结果
    ///
    /// 明确失败返回 `AuthenticationFailure`；无法判断时返回 `Verdict::Unknown`，
    /// 由调用方按策略决定是否继续。
    pub async fn authenticate(&mut self, doc: &dyn LiveDocument) -> AppResult<Verdict> {
        if !self.credentials.is_complete() {
            return Err(AutomationError::AuthenticationFailure {
                reason: "未设置登录邮箱或密码".to_string(),
            });
        }

        self.authenticating = true;
        let result = self.submit_credentials(doc).await;
        self.authenticating = false;

        match result? {
            Verdict::Confirmed => {
                info!("✓ 登录成功");
                self.assume_authenticated();
                Ok(Verdict::Confirmed)
            }
            Verdict::Failed(reason) => Err(AutomationError::AuthenticationFailure { reason }),
            Verdict::Unknown(reason) => {
                warn!("⚠️ 无法确认登录结果: {}", reason);
                Ok(Verdict::Unknown(reason))
            }
        }
    }

    async fn submit_credentials(&self, doc: &dyn LiveDocument) -> AppResult<Verdict> {
        info!("🔐 打开登录页: {}", self.site.login_url);
        doc.navigate(&self.site.login_url).await?;
        self.locator()
            .wait_until_ready(doc, self.timeouts.page_load())
            .await?;

        let email = Action::type_text(self.credentials.email.clone());
        let outcome = self
            .actuator
            .act_on(doc, &self.selectors.email_input, ElementScope::Document, &email)
            .await?;
        if !outcome.is_success() {
            return Ok(Verdict::Failed(format!("无法输入邮箱: {}", outcome)));
        }

        let password = Action::type_text(self.credentials.password.clone());
        let outcome = self
            .actuator
            .act_on(doc, &self.selectors.password_input, ElementScope::Document, &password)
            .await?;
        if !outcome.is_success() {
            return Ok(Verdict::Failed(format!("无法输入密码: {}", outcome)));
        }

        let outcome = self
            .actuator
            .act_on(doc, &self.selectors.login_submit, ElementScope::Document, &Action::Click)
            .await?;
        if !outcome.is_success() {
            debug!("登录按钮不可用 ({})，改为在密码框按回车", outcome);
            if !self.press_enter_on(doc, &self.selectors.password_input).await? {
                return Ok(Verdict::Failed("无法提交登录表单".to_string()));
            }
        }

        self.verify_login(doc).await
    }

    /// 成功标志 → 已离开登录页 → 错误提示，都没有则继续等待
    async fn verify_login(&self, doc: &dyn LiveDocument) -> AppResult<Verdict> {
        let deadline = Instant::now() + self.timeouts.login_verify();
        let poll = self.timeouts.poll_interval();

        loop {
            if self
                .locator()
                .probe(doc, &self.selectors.login_success, ElementScope::Document)
                .await?
                .is_some()
            {
                return Ok(Verdict::Confirmed);
            }

            let url = doc.current_url().await?.to_lowercase();
            if !self
                .site
                .login_url_markers
                .iter()
                .any(|m| url.contains(&m.to_lowercase()))
            {
                debug!("已离开登录页: {}", url);
                return Ok(Verdict::Confirmed);
            }

            if let Some(error) = self
                .locator()
                .probe(doc, &self.selectors.login_error, ElementScope::Document)
                .await?
            {
                let text = doc.text(error).await.unwrap_or_default();
                let text = text.trim();
                return Ok(Verdict::Failed(if text.is_empty() {
                    "页面显示登录错误".to_string()
                } else {
                    text.to_string()
                }));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(Verdict::Unknown(format!(
                    "{:?} 内既没有成功标志也没有错误提示",
                    self.timeouts.login_verify()
                )));
            }
            sleep(poll.min(deadline - now)).await;
        }
    }

    /// 跳过登录（浏览器已登录，或登录结果未知但策略为继续）
    pub fn assume_authenticated(&mut self) {
        self.state.authenticated = true;
        self.state.ui_context = UiContext::Home;
        self.state.loaded_resource = None;
    }

    // ========== 导航 ==========

    /// 任意状态 → Home
    pub async fn go_home(&mut self, doc: &dyn LiveDocument) -> AppResult<()> {
        debug!("🏠 返回首页");
        doc.navigate(&self.site.home_url).await?;
        self.state.ui_context = UiContext::Home;
        self.state.loaded_resource = None;
        self.locator()
            .wait_until_ready(doc, self.timeouts.page_load())
            .await?;
        Ok(())
    }

    /// Home → Editor(url)；失败时回到 Home
    pub async fn load_resource(&mut self, doc: &dyn LiveDocument, url: &str) -> AppResult<Verdict> {
        if !self.state.authenticated {
            return Err(AutomationError::InvalidTransition(format!(
                "{} 状态下不能加载视频",
                self.phase()
            )));
        }

        self.go_home(doc).await?;
        info!("📺 加载视频: {}", url);

        let verdict = self.submit_resource(doc, url).await?;
        match &verdict {
            Verdict::Confirmed => {
                self.state.loaded_resource = Some(url.to_string());
                self.state.ui_context = UiContext::Editor;
                self.select_quality(doc).await?;
            }
            Verdict::Failed(reason) | Verdict::Unknown(reason) => {
                warn!("⚠️ 视频加载失败: {}", reason);
                self.go_home(doc).await?;
            }
        }
        Ok(verdict)
    }

    async fn submit_resource(&self, doc: &dyn LiveDocument, url: &str) -> AppResult<Verdict> {
        let outcome = self
            .actuator
            .act_on(doc, &self.selectors.url_input, ElementScope::Document, &Action::type_text(url))
            .await?;
        if !outcome.is_success() {
            return Ok(Verdict::Failed(format!("无法输入视频链接: {}", outcome)));
        }
        sleep(self.pacing.after_url_input()).await;

        let outcome = self
            .actuator
            .act_on(doc, &self.selectors.url_submit, ElementScope::Document, &Action::Click)
            .await?;
        if !outcome.is_success() {
            debug!("提交按钮不可用 ({})，改为回车提交", outcome);
            if !self.press_enter_on(doc, &self.selectors.url_input).await? {
                return Ok(Verdict::Failed("无法提交视频链接".to_string()));
            }
        }

        if !self.wait_for_editor_url(doc).await? {
            return Ok(Verdict::Failed(format!(
                "{:?} 内没有进入剪辑页",
                self.timeouts.editor_load()
            )));
        }

        if self
            .locator()
            .locate(doc, &self.selectors.editor_ready, ElementScope::Document, self.timeouts.element_wait())
            .await?
            .is_none()
        {
            return Ok(Verdict::Failed("剪辑页控件没有出现".to_string()));
        }

        sleep(self.pacing.video_load()).await;
        Ok(Verdict::Confirmed)
    }

    async fn wait_for_editor_url(&self, doc: &dyn LiveDocument) -> AppResult<bool> {
        let deadline = Instant::now() + self.timeouts.editor_load();
        loop {
            let current = doc.current_url().await?;
            if current.contains(&self.site.editor_url_marker) {
                debug!("✓ 已进入剪辑页: {}", current);
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            sleep(self.timeouts.poll_interval().min(deadline - now)).await;
        }
    }

    /// 画质选择，失败不影响后续流程
    async fn select_quality(&self, doc: &dyn LiveDocument) -> AppResult<()> {
        let Some(quality) = &self.selectors.quality else {
            return Ok(());
        };
        let probe = self.timeouts.short_probe();

        if !self.click_optional(doc, &quality.dropdown, probe).await? {
            debug!("未找到画质下拉框，保持默认画质");
            return Ok(());
        }
        if self.click_optional(doc, &quality.option, probe).await? {
            info!("✓ 已选择画质");
        } else {
            debug!("画质选项不可用，保持默认画质");
        }
        Ok(())
    }

    async fn click_optional(
        &self,
        doc: &dyn LiveDocument,
        candidates: &SelectorCandidate,
        timeout: Duration,
    ) -> AppResult<bool> {
        let Some(element) = self
            .locator()
            .locate(doc, candidates, ElementScope::Document, timeout)
            .await?
        else {
            return Ok(false);
        };
        let outcome = self.actuator.act(doc, element, &Action::Click, 1).await?;
        Ok(outcome.is_success())
    }

    async fn press_enter_on(
        &self,
        doc: &dyn LiveDocument,
        candidates: &SelectorCandidate,
    ) -> AppResult<bool> {
        let Some(input) = self
            .locator()
            .locate(doc, candidates, ElementScope::Document, self.timeouts.short_probe())
            .await?
        else {
            return Ok(false);
        };
        match doc.press_enter(input).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_fatal() => Err(e.into()),
            Err(e) => {
                debug!("回车提交失败: {}", e);
                Ok(false)
            }
        }
    }

    /// 确保当前加载的是 `url`；同一视频直接复用
    pub async fn ensure_resource(&mut self, doc: &dyn LiveDocument, url: &str) -> AppResult<ResourceEntry> {
        let loaded = self.state.loaded_resource.as_deref() == Some(url)
            && self.state.ui_context != UiContext::Home;
        if loaded {
            info!("♻️ 视频已加载，直接复用");
            return Ok(ResourceEntry::Reused);
        }

        match self.load_resource(doc, url).await? {
            Verdict::Confirmed => Ok(ResourceEntry::FreshlyLoaded),
            Verdict::Failed(reason) | Verdict::Unknown(reason) => Ok(ResourceEntry::Unavailable(reason)),
        }
    }

    // ========== Controls 面板 ==========

    /// Editor(url) → ControlsPanel(url)，返回开始 / 结束时间容器
    pub async fn open_controls(&mut self, doc: &dyn LiveDocument) -> AppResult<Option<Vec<ElementHandle>>> {
        if self.state.ui_context == UiContext::Home || self.state.loaded_resource.is_none() {
            return Err(AutomationError::InvalidTransition(format!(
                "{} 状态下不能打开 Controls 面板",
                self.phase()
            )));
        }

        let containers = &self.selectors.range_container;
        for check in 1..=self.controls_checks.max(1) {
            if let Some(found) = self
                .locator()
                .locate_all(doc, containers, ElementScope::Document, Duration::ZERO, 2)
                .await?
            {
                self.state.ui_context = UiContext::ControlsPanel;
                return Ok(Some(found));
            }

            debug!("打开 Controls 面板 ({}/{})", check, self.controls_checks);
            let outcome = self
                .actuator
                .act_on(doc, &self.selectors.controls_tab, ElementScope::Document, &Action::Click)
                .await?;
            if outcome == ActionOutcome::NotFound {
                warn!("⚠️ 未找到 Controls 标签");
            }

            if let Some(found) = self
                .locator()
                .locate_all(doc, containers, ElementScope::Document, self.timeouts.element_wait(), 2)
                .await?
            {
                self.state.ui_context = UiContext::ControlsPanel;
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    /// 创建片段后面板可能已收起
    pub fn mark_panel_consumed(&mut self) {
        if self.state.ui_context == UiContext::ControlsPanel {
            self.state.ui_context = UiContext::Editor;
        }
    }

    /// 设置时间 / 创建前的检查：加载的必须是这个片段的视频
    pub fn require_resource(&self, url: &str) -> AppResult<()> {
        match (&self.state.loaded_resource, self.state.ui_context) {
            (Some(loaded), ctx) if loaded == url && ctx != UiContext::Home => Ok(()),
            _ => Err(AutomationError::InvalidTransition(format!(
                "当前为 {}，不能处理 {} 的片段",
                self.phase(),
                url
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    use crate::testing::{clip_site, fast_config, SiteOptions};

    #[tokio::test]
    async fn login_moves_to_home() {
        let dir = tempfile::tempdir().unwrap();
        let config = fast_config(dir.path());
        let (doc, _) = clip_site(&config, SiteOptions::new(dir.path()));
        let mut session = Session::new(&config);
        assert_eq!(session.phase(), SessionPhase::LoggedOut);

        let verdict = session.authenticate(&doc).await.unwrap();
        assert_eq!(verdict, Verdict::Confirmed);
        assert_eq!(session.phase(), SessionPhase::Home);
    }

    #[tokio::test]
    async fn rejected_login_is_fatal_with_page_message() {
        let dir = tempfile::tempdir().unwrap();
        let config = fast_config(dir.path());
        let mut options = SiteOptions::new(dir.path());
        options.accept_login = false;
        let (doc, _) = clip_site(&config, options);
        let mut session = Session::new(&config);

        let err = session.authenticate(&doc).await.unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("Invalid credentials"));
        assert_eq!(session.phase(), SessionPhase::LoggedOut);
    }

    #[tokio::test]
    async fn silent_login_page_is_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let config = fast_config(dir.path());
        let doc = crate::testing::FakeDocument::new();
        doc.add(crate::testing::FakeNode::matching(crate::testing::first_expr(
            &config.selectors.email_input,
        )).input(""));
        doc.add(crate::testing::FakeNode::matching(crate::testing::first_expr(
            &config.selectors.password_input,
        )).input(""));
        doc.add(crate::testing::FakeNode::matching(crate::testing::first_expr(
            &config.selectors.login_submit,
        )));

        let mut session = Session::new(&config);
        let verdict = session.authenticate(&doc).await.unwrap();
        assert!(matches!(verdict, Verdict::Unknown(_)));
        assert!(!session.state().authenticated);
    }

    #[tokio::test]
    async fn same_resource_is_reused_without_reloading() {
        let dir = tempfile::tempdir().unwrap();
        let config = fast_config(dir.path());
        let (doc, counters) = clip_site(&config, SiteOptions::new(dir.path()));
        let mut session = Session::new(&config);
        session.assume_authenticated();

        let url = "https://www.youtube.com/watch?v=a";
        assert_eq!(session.ensure_resource(&doc, url).await.unwrap(), ResourceEntry::FreshlyLoaded);
        assert_eq!(session.phase(), SessionPhase::Editor(url.to_string()));
        assert_eq!(session.ensure_resource(&doc, url).await.unwrap(), ResourceEntry::Reused);
        assert_eq!(counters.loads.load(Ordering::SeqCst), 1);

        let other = "https://www.youtube.com/watch?v=b";
        assert_eq!(session.ensure_resource(&doc, other).await.unwrap(), ResourceEntry::FreshlyLoaded);
        assert_eq!(counters.loads.load(Ordering::SeqCst), 2);
        assert!(session.require_resource(url).is_err());
        assert!(session.require_resource(other).is_ok());
    }

    #[tokio::test]
    async fn loading_requires_authentication() {
        let dir = tempfile::tempdir().unwrap();
        let config = fast_config(dir.path());
        let (doc, _) = clip_site(&config, SiteOptions::new(dir.path()));
        let mut session = Session::new(&config);

        let err = session.load_resource(&doc, "https://x").await.unwrap_err();
        assert!(matches!(err, AutomationError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn controls_panel_reopens_after_being_collapsed() {
        let dir = tempfile::tempdir().unwrap();
        let config = fast_config(dir.path());
        let (doc, _) = clip_site(&config, SiteOptions::new(dir.path()));
        let mut session = Session::new(&config);
        session.assume_authenticated();
        session
            .ensure_resource(&doc, "https://www.youtube.com/watch?v=a")
            .await
            .unwrap();

        let container = crate::testing::first_expr(&config.selectors.range_container);
        doc.with(|dom| dom.set_visible_matching(&container, false));
        session.mark_panel_consumed();

        let found = session.open_controls(&doc).await.unwrap();
        assert_eq!(found.map(|c| c.len()), Some(2));
        assert!(matches!(session.phase(), SessionPhase::ControlsPanel(_)));
    }

    #[tokio::test]
    async fn controls_cannot_open_from_home() {
        let dir = tempfile::tempdir().unwrap();
        let config = fast_config(dir.path());
        let (doc, _) = clip_site(&config, SiteOptions::new(dir.path()));
        let mut session = Session::new(&config);
        session.assume_authenticated();

        assert!(session.open_controls(&doc).await.is_err());
    }
}
