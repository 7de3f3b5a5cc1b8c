//! 程序配置
//!
//! 加载顺序：环境档位默认值 → TOML 文件（可选）→ `CLIPCUT_*` 环境变量。
//! 选择器表、超时、节奏都是数据，引擎里不写站点相关的分支。

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{AppResult, AutomationError};
use crate::models::selector::{candidates, SelectorCandidate};
use crate::models::RunMode;

const DEFAULT_CONFIG_FILE: &str = "clipcut.toml";

/// 运行环境档位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    #[default]
    Development,
    Production,
    Testing,
}

impl FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Profile::Development),
            "production" | "prod" => Ok(Profile::Production),
            "testing" | "test" => Ok(Profile::Testing),
            other => Err(format!("未知的环境: {}", other)),
        }
    }
}

/// 浏览器获取方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserMode {
    /// 连接已经打开的浏览器（调试端口）
    Connect,
    /// 由程序启动浏览器
    Launch,
}

impl FromStr for BrowserMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "connect" => Ok(BrowserMode::Connect),
            "launch" => Ok(BrowserMode::Launch),
            other => Err(format!("未知的浏览器模式: {}", other)),
        }
    }
}

/// 登录结果无法判断时怎么办
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UncertaintyPolicy {
    Continue,
    Abort,
}

impl FromStr for UncertaintyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "continue" => Ok(UncertaintyPolicy::Continue),
            "abort" => Ok(UncertaintyPolicy::Abort),
            other => Err(format!("未知的登录判定策略: {}", other)),
        }
    }
}

/// 片段下载方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadMode {
    /// 点击下载按钮，由浏览器保存到下载目录
    Click,
    /// 读取链接地址，带 cookie 直接请求
    Direct,
}

impl FromStr for DownloadMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "click" => Ok(DownloadMode::Click),
            "direct" => Ok(DownloadMode::Direct),
            other => Err(format!("未知的下载方式: {}", other)),
        }
    }
}

/// 片段列表里最新的一项在哪一端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactOrder {
    NewestFirst,
    NewestLast,
}

/// 开始 / 结束时间控件的布局
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RangeLayout {
    /// 每个时间点是时 / 分 / 秒三个数字框
    Split,
    /// 每个时间点是一个 `HH:MM:SS` 文本框
    Single,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub mode: BrowserMode,
    pub debug_port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executable: Option<PathBuf>,
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
    pub args: Vec<String>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            mode: BrowserMode::Launch,
            debug_port: 9222,
            executable: None,
            headless: false,
            window_width: 1920,
            window_height: 1080,
            args: vec![
                "--no-sandbox".to_string(),
                "--disable-dev-shm-usage".to_string(),
                "--disable-gpu".to_string(),
                "--disable-blink-features=AutomationControlled".to_string(),
                "--disable-popup-blocking".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteSettings {
    pub login_url: String,
    pub home_url: String,
    pub clips_url: String,
    /// 进入剪辑页后 URL 里会出现的片段
    pub editor_url_marker: String,
    /// 仍在登录页时 URL 里会出现的片段
    pub login_url_markers: Vec<String>,
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            login_url: "https://www.clipscutter.com/login".to_string(),
            home_url: "https://www.clipscutter.com".to_string(),
            clips_url: "https://www.clipscutter.com/clips".to_string(),
            editor_url_marker: "/cutter/".to_string(),
            login_url_markers: vec!["login".to_string(), "signin".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    pub csv_file: PathBuf,
    pub downloads_dir: PathBuf,
    pub report_file: PathBuf,
    pub failures_file: PathBuf,
    pub log_file: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            csv_file: PathBuf::from("clip_ranges.csv"),
            downloads_dir: PathBuf::from("downloads"),
            report_file: PathBuf::from("run_report.json"),
            failures_file: PathBuf::from("failed_clips.txt"),
            log_file: PathBuf::from("clipcut_log.txt"),
        }
    }
}

/// 登录凭据，只从环境变量读取
#[derive(Clone, Default)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn is_complete(&self) -> bool {
        !self.email.trim().is_empty() && !self.password.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"***")
            .finish()
    }
}

/// 各类等待上限（毫秒）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub page_load_ms: u64,
    pub element_wait_ms: u64,
    /// 可选控件的快速探测
    pub short_probe_ms: u64,
    pub login_verify_ms: u64,
    pub editor_load_ms: u64,
    pub clip_creation_ms: u64,
    pub download_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            page_load_ms: 15_000,
            element_wait_ms: 8_000,
            short_probe_ms: 2_000,
            login_verify_ms: 10_000,
            editor_load_ms: 30_000,
            clip_creation_ms: 60_000,
            download_ms: 300_000,
            poll_interval_ms: 250,
        }
    }
}

impl Timeouts {
    pub fn page_load(&self) -> Duration {
        Duration::from_millis(self.page_load_ms)
    }

    pub fn element_wait(&self) -> Duration {
        Duration::from_millis(self.element_wait_ms)
    }

    pub fn short_probe(&self) -> Duration {
        Duration::from_millis(self.short_probe_ms)
    }

    pub fn login_verify(&self) -> Duration {
        Duration::from_millis(self.login_verify_ms)
    }

    pub fn editor_load(&self) -> Duration {
        Duration::from_millis(self.editor_load_ms)
    }

    pub fn clip_creation(&self) -> Duration {
        Duration::from_millis(self.clip_creation_ms)
    }

    pub fn download(&self) -> Duration {
        Duration::from_millis(self.download_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// 操作之间的停顿（毫秒）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Pacing {
    /// 滚动后、交互前
    pub settle_ms: u64,
    pub after_url_input_ms: u64,
    pub video_load_ms: u64,
    pub after_clip_creation_ms: u64,
    pub between_clips_ms: u64,
    pub between_downloads_ms: u64,
    /// 重试退避：base + step * (第几次重试 - 1)
    pub backoff_base_ms: u64,
    pub backoff_step_ms: u64,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            settle_ms: 300,
            after_url_input_ms: 500,
            video_load_ms: 1_500,
            after_clip_creation_ms: 1_500,
            between_clips_ms: 1_000,
            between_downloads_ms: 500,
            backoff_base_ms: 500,
            backoff_step_ms: 500,
        }
    }
}

impl Pacing {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn after_url_input(&self) -> Duration {
        Duration::from_millis(self.after_url_input_ms)
    }

    pub fn video_load(&self) -> Duration {
        Duration::from_millis(self.video_load_ms)
    }

    pub fn after_clip_creation(&self) -> Duration {
        Duration::from_millis(self.after_clip_creation_ms)
    }

    pub fn between_clips(&self) -> Duration {
        Duration::from_millis(self.between_clips_ms)
    }

    pub fn between_downloads(&self) -> Duration {
        Duration::from_millis(self.between_downloads_ms)
    }

    /// 第 `retry` 次重试前的等待（从 1 开始）
    pub fn backoff(&self, retry: u32) -> Duration {
        let steps = u64::from(retry.saturating_sub(1));
        Duration::from_millis(self.backoff_base_ms + self.backoff_step_ms * steps)
    }
}

/// 重试预算
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryBudget {
    pub action_attempts: u32,
    /// 元素失效后重新定位的次数
    pub relocate_attempts: u32,
    /// 打开 Controls 面板后检查时间控件的次数
    pub controls_checks: u32,
    pub download_retries: u32,
}

impl Default for RetryBudget {
    fn default() -> Self {
        Self {
            action_attempts: 3,
            relocate_attempts: 2,
            controls_checks: 3,
            download_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadSettings {
    pub mode: DownloadMode,
    pub artifact_order: ArtifactOrder,
    /// 直接下载时的默认文件名（不含扩展名）
    pub file_stem: String,
    pub max_filename_len: usize,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            mode: DownloadMode::Click,
            artifact_order: ArtifactOrder::NewestFirst,
            file_stem: "clip".to_string(),
            max_filename_len: 200,
        }
    }
}

/// 画质选择（下拉框 + 目标选项）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualitySelectors {
    pub dropdown: SelectorCandidate,
    pub option: SelectorCandidate,
}

/// 选择器表
///
/// 每个控件一组候选，按偏好排序。`.//` 开头的表达式在容器内查找。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorTable {
    pub email_input: SelectorCandidate,
    pub password_input: SelectorCandidate,
    pub login_submit: SelectorCandidate,
    pub login_success: SelectorCandidate,
    pub login_error: SelectorCandidate,
    pub url_input: SelectorCandidate,
    pub url_submit: SelectorCandidate,
    pub editor_ready: SelectorCandidate,
    pub controls_tab: SelectorCandidate,
    pub range_layout: RangeLayout,
    /// 开始 / 结束时间各一个容器（按文档顺序）
    pub range_container: SelectorCandidate,
    /// Split 布局：容器内的时 / 分 / 秒输入框
    pub time_part_inputs: SelectorCandidate,
    /// Single 布局：容器内的文本框
    pub time_field: SelectorCandidate,
    pub range_error: SelectorCandidate,
    pub create_button: SelectorCandidate,
    pub artifact_item: SelectorCandidate,
    /// 在片段项内部查找
    pub download_button: SelectorCandidate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<QualitySelectors>,
}

impl Default for SelectorTable {
    fn default() -> Self {
        Self {
            email_input: candidates(&[
                "//input[@type='email']",
                "//input[contains(@placeholder, 'email')]",
                "//input[contains(@placeholder, 'Email')]",
                "//input[contains(@name, 'email')]",
                "//input[contains(@id, 'email')]",
            ]),
            password_input: candidates(&[
                "//input[@type='password']",
                "//input[contains(@placeholder, 'assword')]",
                "//input[contains(@name, 'password')]",
                "//input[contains(@id, 'password')]",
            ]),
            login_submit: candidates(&[
                "//button[@type='submit']",
                "//input[@type='submit']",
                "//button[contains(text(), 'Login')]",
                "//button[contains(text(), 'Sign In')]",
                "//button[contains(text(), 'Log In')]",
            ]),
            login_success: candidates(&[
                "//*[contains(text(), 'Dashboard')]",
                "//*[contains(text(), 'Logout')]",
                "//*[contains(text(), 'My Clips')]",
                "//*[contains(text(), 'Account')]",
                "//*[contains(@class, 'account')]",
            ]),
            login_error: candidates(&[
                "//*[contains(text(), 'Invalid')]",
                "//*[contains(text(), 'invalid')]",
                "//*[contains(text(), 'incorrect')]",
                "//*[contains(text(), 'failed')]",
                "//*[contains(@class, 'error')]",
            ]),
            url_input: candidates(&[
                "//input[@placeholder='Add link here']",
                "//input[contains(@placeholder, 'link')]",
                "//input[contains(@placeholder, 'youtube')]",
                "//input[contains(@placeholder, 'URL')]",
                "//input[@type='url']",
            ]),
            url_submit: candidates(&[
                "//button[text()='CLICK']",
                "//button[contains(text(), 'CLICK')]",
                "//button[contains(text(), 'Submit')]",
                "//button[contains(text(), 'Go')]",
            ]),
            editor_ready: candidates(&[
                "//div[contains(@class, 'durationPicker')]",
                "//input[@type='range']",
                "//*[contains(@class, 'timeSelection')]",
                "//input[@type='number']",
            ]),
            controls_tab: candidates(&[
                "//span[text()='Controls']",
                "//button[text()='Controls']",
                "//div[text()='Controls']",
                "//*[contains(text(), 'Controls')]",
            ]),
            range_layout: RangeLayout::Split,
            range_container: candidates(&["//div[contains(@class, 'durationPicker_container')]"]),
            time_part_inputs: candidates(&[".//input[@type='number']"]),
            time_field: candidates(&[".//input[@type='text']", ".//input"]),
            range_error: candidates(&[
                "//*[contains(text(), 'Must be less than')]",
                "//*[contains(@class, 'invalid')]",
            ]),
            create_button: candidates(&[
                "//button[contains(text(), 'Create')]",
                "//button[contains(text(), 'Cut')]",
                "//button[contains(text(), 'Generate')]",
                "//button[contains(text(), 'Make Clip')]",
                "//button[contains(@class, 'create')]",
            ]),
            artifact_item: candidates(&[
                "//*[contains(@class, 'cutterClipsListItem') and not(ancestor::*[contains(@class, 'cutterClipsListItem')])]",
                "//*[contains(@class, 'clipItem') and not(ancestor::*[contains(@class, 'clipItem')])]",
            ]),
            download_button: candidates(&[
                ".//button[contains(@class, 'cutterClipsListItem_downloadIcon')]",
                ".//button[@title='Download']",
                ".//button[contains(@class, 'downloadIcon')]",
                ".//a[contains(@href, 'download')]",
                ".//a[contains(text(), 'Download')]",
            ]),
            quality: Some(QualitySelectors {
                dropdown: candidates(&[
                    "//div[contains(@class, 'select_field')]",
                    "//select[contains(@class, 'quality')]",
                    "//select[contains(@name, 'quality')]",
                ]),
                option: candidates(&[
                    "//div[contains(text(), '1080p')]",
                    "//li[contains(text(), '1080p')]",
                    "//option[contains(text(), '1080p')]",
                    "//span[contains(text(), '1080p')]",
                ]),
            }),
        }
    }
}

impl SelectorTable {
    /// 必填控件（名称, 候选），用于校验
    fn required(&self) -> Vec<(&'static str, &SelectorCandidate)> {
        vec![
            ("email_input", &self.email_input),
            ("password_input", &self.password_input),
            ("login_submit", &self.login_submit),
            ("url_input", &self.url_input),
            ("url_submit", &self.url_submit),
            ("controls_tab", &self.controls_tab),
            ("range_container", &self.range_container),
            ("create_button", &self.create_button),
            ("artifact_item", &self.artifact_item),
            ("download_button", &self.download_button),
        ]
    }
}

/// 程序配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub profile: Profile,
    pub mode: RunMode,
    pub browser: BrowserSettings,
    pub site: SiteSettings,
    pub paths: PathSettings,
    #[serde(skip)]
    pub credentials: Credentials,
    /// 关闭时假定浏览器已登录（连接模式下常用）
    pub auto_login: bool,
    pub login_uncertainty: UncertaintyPolicy,
    /// 允许的视频站点，子域名也算
    pub allowed_hosts: Vec<String>,
    pub timeouts: Timeouts,
    pub pacing: Pacing,
    pub retries: RetryBudget,
    pub download: DownloadSettings,
    pub selectors: SelectorTable,
    /// 打开 Controls 面板后去掉时间输入框的 disabled / readonly
    pub force_enable_inputs: bool,
    pub log_level: String,
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            profile: Profile::Development,
            mode: RunMode::Cut,
            browser: BrowserSettings::default(),
            site: SiteSettings::default(),
            paths: PathSettings::default(),
            credentials: Credentials::default(),
            auto_login: true,
            login_uncertainty: UncertaintyPolicy::Continue,
            allowed_hosts: vec![
                "youtube.com".to_string(),
                "youtu.be".to_string(),
            ],
            timeouts: Timeouts::default(),
            pacing: Pacing::default(),
            retries: RetryBudget::default(),
            download: DownloadSettings::default(),
            selectors: SelectorTable::default(),
            force_enable_inputs: true,
            log_level: "info".to_string(),
            verbose_logging: false,
        }
    }
}

/// 读取 `CLIPCUT_*` 变量，记下无法解析的值
struct EnvReader<F> {
    lookup: F,
    errors: Vec<String>,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn new(lookup: F) -> Self {
        Self {
            lookup,
            errors: Vec::new(),
        }
    }

    fn text(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.trim().is_empty())
    }

    fn parse<T: FromStr>(&mut self, key: &str) -> Option<T> {
        let raw = self.text(key)?;
        let raw = raw.trim();
        match raw.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                self.errors.push(format!("{}: invalid value '{}'", key, raw));
                None
            }
        }
    }
}

fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// 把 `overlay` 递归合并进 `base`，表按键合并，其余值直接覆盖
fn merge_toml(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_toml(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

impl Config {
    /// 某个环境档位的默认配置
    pub fn for_profile(profile: Profile) -> Self {
        let mut config = Self {
            profile,
            ..Self::default()
        };
        match profile {
            Profile::Development => {
                config.browser.headless = false;
                config.log_level = "debug".to_string();
            }
            Profile::Production => {
                config.browser.headless = true;
                config.log_level = "info".to_string();
            }
            Profile::Testing => {
                config.browser.headless = true;
                config.log_level = "debug".to_string();
                config.retries.action_attempts = 1;
                config.pacing.between_clips_ms = 1_000;
                config.pacing.after_clip_creation_ms = 2_000;
            }
        }
        config
    }

    /// 档位默认值 + 环境变量；无法解析的变量只记警告
    pub fn from_env() -> Self {
        let mut env = EnvReader::new(process_env);
        let profile = env.parse("CLIPCUT_ENV").unwrap_or_default();
        let mut config = Self::for_profile(profile);
        config.apply_env(&mut env);
        for problem in &env.errors {
            warn!("⚠️ 忽略环境变量 {}", problem);
        }
        config
    }

    /// 档位默认值 + TOML 文件 + 环境变量，最后校验
    pub fn load() -> AppResult<Self> {
        Self::load_with(process_env)
    }

    fn load_with(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let mut env = EnvReader::new(lookup);
        let profile: Profile = env.parse("CLIPCUT_ENV").unwrap_or_default();
        let path = env
            .text("CLIPCUT_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        let mut config = if path.exists() {
            info!("📄 读取配置文件: {}", path.display());
            Self::from_toml_file(profile, &path)?
        } else {
            debug!("未找到配置文件 {}，使用默认配置", path.display());
            Self::for_profile(profile)
        };
        config.apply_env(&mut env);

        let mut errors = env.errors;
        errors.extend(config.problems());
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(AutomationError::Config(errors))
        }
    }

    /// 在档位默认值上合并 TOML 文件
    pub fn from_toml_file(profile: Profile, path: &Path) -> AppResult<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| AutomationError::io(path, e))?;
        Self::from_toml_str(profile, &content)
            .map_err(|e| AutomationError::Config(vec![format!("{}: {}", path.display(), e)]))
    }

    pub fn from_toml_str(profile: Profile, content: &str) -> Result<Self, String> {
        let base = Self::for_profile(profile);
        let mut merged = toml::Value::try_from(&base).map_err(|e| e.to_string())?;
        let overlay: toml::Value = toml::from_str(content).map_err(|e| e.to_string())?;
        merge_toml(&mut merged, overlay);
        let mut config: Config = merged.try_into().map_err(|e: toml::de::Error| e.to_string())?;
        config.profile = profile;
        Ok(config)
    }

    fn apply_env<F: Fn(&str) -> Option<String>>(&mut self, env: &mut EnvReader<F>) {
        if let Some(mode) = env.parse("CLIPCUT_MODE") {
            self.mode = mode;
        }
        if let Some(email) = env.text("CLIPCUT_EMAIL") {
            self.credentials.email = email;
        }
        if let Some(password) = env.text("CLIPCUT_PASSWORD") {
            self.credentials.password = password;
        }
        if let Some(v) = env.parse("CLIPCUT_AUTO_LOGIN") {
            self.auto_login = v;
        }
        if let Some(v) = env.parse("CLIPCUT_LOGIN_UNCERTAINTY") {
            self.login_uncertainty = v;
        }
        if let Some(v) = env.parse("CLIPCUT_BROWSER") {
            self.browser.mode = v;
        }
        if let Some(v) = env.parse("CLIPCUT_DEBUG_PORT") {
            self.browser.debug_port = v;
        }
        if let Some(v) = env.text("CLIPCUT_CHROME") {
            self.browser.executable = Some(PathBuf::from(v));
        }
        if let Some(v) = env.parse("CLIPCUT_HEADLESS") {
            self.browser.headless = v;
        }
        if let Some(v) = env.text("CLIPCUT_CSV") {
            self.paths.csv_file = PathBuf::from(v);
        }
        if let Some(v) = env.text("CLIPCUT_DOWNLOADS_DIR") {
            self.paths.downloads_dir = PathBuf::from(v);
        }
        if let Some(v) = env.text("CLIPCUT_REPORT") {
            self.paths.report_file = PathBuf::from(v);
        }
        if let Some(v) = env.text("CLIPCUT_LOG_FILE") {
            self.paths.log_file = PathBuf::from(v);
        }
        if let Some(v) = env.parse("CLIPCUT_DOWNLOAD_MODE") {
            self.download.mode = v;
        }
        if let Some(v) = env.text("CLIPCUT_LOG_LEVEL") {
            self.log_level = v.trim().to_ascii_lowercase();
        }
        if let Some(v) = env.parse("CLIPCUT_VERBOSE") {
            self.verbose_logging = v;
        }
    }

    /// 一次性收集所有配置问题
    pub fn validate(&self) -> AppResult<()> {
        let errors = self.problems();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(AutomationError::Config(errors))
        }
    }

    fn problems(&self) -> Vec<String> {
        let mut errors = Vec::new();

        let t = &self.timeouts;
        for (name, value) in [
            ("page_load_ms", t.page_load_ms),
            ("element_wait_ms", t.element_wait_ms),
            ("short_probe_ms", t.short_probe_ms),
            ("login_verify_ms", t.login_verify_ms),
            ("editor_load_ms", t.editor_load_ms),
            ("clip_creation_ms", t.clip_creation_ms),
            ("download_ms", t.download_ms),
            ("poll_interval_ms", t.poll_interval_ms),
        ] {
            if value == 0 {
                errors.push(format!("timeouts.{} 必须为正数", name));
            }
        }

        let r = &self.retries;
        for (name, value) in [
            ("action_attempts", r.action_attempts),
            ("controls_checks", r.controls_checks),
            ("download_retries", r.download_retries),
        ] {
            if value == 0 {
                errors.push(format!("retries.{} 至少为 1", name));
            }
        }

        for (name, candidate) in self.selectors.required() {
            if candidate.is_empty() {
                errors.push(format!("selectors.{} 不能为空", name));
            }
        }
        match self.selectors.range_layout {
            RangeLayout::Split if self.selectors.time_part_inputs.is_empty() => {
                errors.push("selectors.time_part_inputs 不能为空 (range_layout = split)".to_string())
            }
            RangeLayout::Single if self.selectors.time_field.is_empty() => {
                errors.push("selectors.time_field 不能为空 (range_layout = single)".to_string())
            }
            _ => {}
        }

        if !matches!(
            self.log_level.as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        ) {
            errors.push(format!(
                "log_level 必须是 trace / debug / info / warn / error 之一，当前: {}",
                self.log_level
            ));
        }

        if self.download.max_filename_len < 16 {
            errors.push("download.max_filename_len 至少为 16".to_string());
        }

        if self.mode == RunMode::Cut && self.auto_login && !self.credentials.is_complete() {
            errors.push("自动登录需要设置 CLIPCUT_EMAIL 和 CLIPCUT_PASSWORD".to_string());
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_credentials(mut config: Config) -> Config {
        config.credentials = Credentials {
            email: "user@example.com".to_string(),
            password: "secret".to_string(),
        };
        config
    }

    #[test]
    fn default_config_is_valid_once_credentials_exist() {
        assert!(Config::default().validate().is_err());
        assert!(with_credentials(Config::default()).validate().is_ok());
    }

    #[test]
    fn profiles_adjust_headless_and_retries() {
        let prod = Config::for_profile(Profile::Production);
        assert!(prod.browser.headless);
        assert_eq!(prod.log_level, "info");

        let testing = Config::for_profile(Profile::Testing);
        assert_eq!(testing.retries.action_attempts, 1);
        assert_eq!(testing.pacing.after_clip_creation_ms, 2_000);
    }

    #[test]
    fn validation_collects_every_problem() {
        let mut config = with_credentials(Config::default());
        config.timeouts.page_load_ms = 0;
        config.retries.download_retries = 0;
        config.selectors.create_button = SelectorCandidate::new(Vec::new());
        config.log_level = "loud".to_string();

        match config.validate() {
            Err(AutomationError::Config(errors)) => {
                assert_eq!(errors.len(), 4, "{:?}", errors);
            }
            other => panic!("应当校验失败: {:?}", other.map(|_| ())),
        }
    }

    fn env_of(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key: &str| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    const LOGIN_ENV: [(&str, &str); 3] = [
        ("CLIPCUT_CONFIG", "/nonexistent/clipcut.toml"),
        ("CLIPCUT_EMAIL", "user@example.com"),
        ("CLIPCUT_PASSWORD", "secret"),
    ];

    #[test]
    fn env_overrides_apply_on_load() {
        static ENV: [(&str, &str); 5] = [
            LOGIN_ENV[0],
            LOGIN_ENV[1],
            LOGIN_ENV[2],
            ("CLIPCUT_DOWNLOAD_MODE", "direct"),
            ("CLIPCUT_DEBUG_PORT", "9333"),
        ];
        let config = Config::load_with(env_of(&ENV)).unwrap();
        assert_eq!(config.download.mode, DownloadMode::Direct);
        assert_eq!(config.browser.debug_port, 9333);
    }

    #[test]
    fn unparsable_env_values_fail_loading() {
        static ENV: [(&str, &str); 6] = [
            LOGIN_ENV[0],
            LOGIN_ENV[1],
            LOGIN_ENV[2],
            ("CLIPCUT_DEBUG_PORT", "92x2"),
            ("CLIPCUT_HEADLESS", " maybe "),
            ("CLIPCUT_DOWNLOAD_MODE", "direct"),
        ];

        match Config::load_with(env_of(&ENV)) {
            Err(AutomationError::Config(errors)) => assert_eq!(
                errors,
                vec![
                    "CLIPCUT_DEBUG_PORT: invalid value '92x2'".to_string(),
                    "CLIPCUT_HEADLESS: invalid value 'maybe'".to_string(),
                ]
            ),
            other => panic!("应当加载失败: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn toml_overrides_merge_onto_profile_defaults() {
        let content = r#"
            mode = "download-only"
            allowed_hosts = ["video.example"]

            [timeouts]
            element_wait_ms = 1234

            [selectors]
            create_button = ["css:button.make", "//button[@id='go']"]
            range_layout = "single"
        "#;
        let config = Config::from_toml_str(Profile::Production, content).unwrap();

        assert_eq!(config.mode, RunMode::DownloadOnly);
        assert_eq!(config.allowed_hosts, vec!["video.example".to_string()]);
        assert_eq!(config.timeouts.element_wait_ms, 1234);
        assert_eq!(config.timeouts.page_load_ms, 15_000);
        assert_eq!(config.selectors.create_button.len(), 2);
        assert_eq!(config.selectors.range_layout, RangeLayout::Single);
        assert!(!config.selectors.url_input.is_empty());
        assert!(config.browser.headless);
    }

    #[test]
    fn malformed_toml_is_reported() {
        assert!(Config::from_toml_str(Profile::Development, "timeouts = [").is_err());
        assert!(Config::from_toml_str(Profile::Development, "[selectors]\nurl_input = [\"\"]").is_err());
    }

    #[test]
    fn backoff_grows_linearly() {
        let pacing = Pacing::default();
        assert_eq!(pacing.backoff(1), Duration::from_millis(500));
        assert_eq!(pacing.backoff(3), Duration::from_millis(1_500));
    }

    #[test]
    fn credentials_are_redacted_in_debug_output() {
        let config = with_credentials(Config::default());
        let printed = format!("{:?}", config.credentials);
        assert!(printed.contains("user@example.com"));
        assert!(!printed.contains("secret"));
    }
}
