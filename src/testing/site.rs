//! 模拟的剪辑站点
//!
//! 按配置里的选择器表搭出登录页、首页、剪辑页和片段列表：
//! - 提交登录：凭据正确则跳到首页，否则出现错误提示
//! - 提交视频链接：进入 `/cutter/N`，出现 Controls 面板
//! - 创建片段：片段列表新增一项，Controls 面板收起（需要重新打开）
//! - 创建按钮卡住：原生点击和脚本点击都报不可交互
//! - 点击下载：往下载目录写一个文件

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::config::{Config, Credentials, RangeLayout};
use crate::models::RunMode;
use crate::testing::fake_document::{first_expr, FakeDocument, FakeDom, FakeNode};

/// 站点行为开关
#[derive(Debug, Clone)]
pub struct SiteOptions {
    pub accept_login: bool,
    /// 第几次点击创建（从 1 开始）不产生片段
    pub failing_creations: HashSet<usize>,
    /// 第几次加载视频（从 1 开始）后创建按钮一直不可点击
    pub stuck_create_loads: HashSet<usize>,
    pub downloads_dir: PathBuf,
    /// 列表页上预先存在的片段
    pub existing_clips: usize,
}

impl SiteOptions {
    pub fn new(downloads_dir: &Path) -> Self {
        Self {
            accept_login: true,
            failing_creations: HashSet::new(),
            stuck_create_loads: HashSet::new(),
            downloads_dir: downloads_dir.to_path_buf(),
            existing_clips: 0,
        }
    }
}

/// 站点统计
#[derive(Debug, Default)]
pub struct SiteCounters {
    pub loads: AtomicUsize,
    pub creations: AtomicUsize,
    pub downloads: AtomicUsize,
}

#[derive(Clone)]
struct Exprs {
    email: String,
    password: String,
    login_submit: String,
    login_error: String,
    url_input: String,
    url_submit: String,
    editor_ready: String,
    controls_tab: String,
    range_container: String,
    time_part: String,
    time_field: String,
    create_button: String,
    artifact_item: String,
    download_button: String,
    layout: RangeLayout,
    home_url: String,
    editor_marker: String,
}

impl Exprs {
    fn from_config(config: &Config) -> Self {
        let s = &config.selectors;
        Self {
            email: first_expr(&s.email_input),
            password: first_expr(&s.password_input),
            login_submit: first_expr(&s.login_submit),
            login_error: first_expr(&s.login_error),
            url_input: first_expr(&s.url_input),
            url_submit: first_expr(&s.url_submit),
            editor_ready: first_expr(&s.editor_ready),
            controls_tab: first_expr(&s.controls_tab),
            range_container: first_expr(&s.range_container),
            time_part: first_expr(&s.time_part_inputs),
            time_field: first_expr(&s.time_field),
            create_button: first_expr(&s.create_button),
            artifact_item: first_expr(&s.artifact_item),
            download_button: first_expr(&s.download_button),
            layout: s.range_layout,
            home_url: config.site.home_url.clone(),
            editor_marker: config.site.editor_url_marker.clone(),
        }
    }

    fn editor_exprs(&self) -> [&str; 4] {
        [
            self.editor_ready.as_str(),
            self.controls_tab.as_str(),
            self.range_container.as_str(),
            self.create_button.as_str(),
        ]
    }
}

/// 适合测试的快速配置
pub fn fast_config(downloads_dir: &Path) -> Config {
    let mut config = Config::for_profile(crate::config::Profile::Testing);
    config.mode = RunMode::Cut;
    config.credentials = Credentials {
        email: "user@example.com".to_string(),
        password: "secret".to_string(),
    };
    config.allowed_hosts = Vec::new();
    config.browser.headless = true;

    let t = &mut config.timeouts;
    t.page_load_ms = 300;
    t.element_wait_ms = 150;
    t.short_probe_ms = 30;
    t.login_verify_ms = 200;
    t.editor_load_ms = 300;
    t.clip_creation_ms = 200;
    t.download_ms = 300;
    t.poll_interval_ms = 5;

    config.pacing = crate::config::Pacing {
        settle_ms: 0,
        after_url_input_ms: 0,
        video_load_ms: 0,
        after_clip_creation_ms: 0,
        between_clips_ms: 0,
        between_downloads_ms: 0,
        backoff_base_ms: 5,
        backoff_step_ms: 5,
    };
    config.retries.action_attempts = 2;
    config.retries.relocate_attempts = 2;
    config.retries.controls_checks = 2;
    config.retries.download_retries = 2;
    config.selectors.quality = None;

    config.paths.downloads_dir = downloads_dir.to_path_buf();
    config.paths.report_file = downloads_dir.join("run_report.json");
    config.paths.failures_file = downloads_dir.join("failed_clips.txt");
    config.paths.log_file = downloads_dir.join("run.log");
    config
}

fn add_artifact(dom: &mut FakeDom, exprs: &Exprs, index: usize, dir: &Path, counters: &Arc<SiteCounters>) {
    let item = dom.prepend(
        FakeNode::matching(exprs.artifact_item.clone()).with_text(&format!("Clip {}", index)),
    );
    let file = dir.join(format!("clip_{}.mp4", index));
    let counters = Arc::clone(counters);
    dom.add(
        FakeNode::matching(exprs.download_button.clone())
            .under(item)
            .with_attr("href", &format!("https://cdn.example/clip_{}.mp4", index))
            .on_click(move |_| {
                counters.downloads.fetch_add(1, Ordering::SeqCst);
                let _ = fs::write(&file, b"fake video");
            }),
    );
}

fn build_editor(
    dom: &mut FakeDom,
    load: usize,
    exprs: &Exprs,
    options: &Arc<SiteOptions>,
    counters: &Arc<SiteCounters>,
) {
    for expr in exprs.editor_exprs() {
        dom.remove_matching(expr);
    }
    dom.add(FakeNode::matching(exprs.editor_ready.clone()));

    for _ in 0..2 {
        let container = dom.add(FakeNode::matching(exprs.range_container.clone()));
        match exprs.layout {
            RangeLayout::Split => {
                for _ in 0..3 {
                    dom.add(
                        FakeNode::matching(exprs.time_part.clone())
                            .under(container)
                            .input("0")
                            .disabled(),
                    );
                }
            }
            RangeLayout::Single => {
                dom.add(
                    FakeNode::matching(exprs.time_field.clone())
                        .under(container)
                        .input("00:00:00"),
                );
            }
        }
    }

    let container_expr = exprs.range_container.clone();
    dom.add(
        FakeNode::matching(exprs.controls_tab.clone())
            .on_click(move |dom| dom.set_visible_matching(&container_expr, true)),
    );

    let exprs_for_create = exprs.clone();
    let options = Arc::clone(options);
    let counters_for_create = Arc::clone(counters);
    let stuck = options.stuck_create_loads.contains(&load);
    let create = FakeNode::matching(exprs.create_button.clone()).on_click(move |dom| {
        let n = counters_for_create.creations.fetch_add(1, Ordering::SeqCst) + 1;
        dom.set_visible_matching(&exprs_for_create.range_container, false);
        if !options.failing_creations.contains(&n) {
            let index = options.existing_clips + n;
            add_artifact(dom, &exprs_for_create, index, &options.downloads_dir, &counters_for_create);
        }
    });
    dom.add(if stuck { create.disabled() } else { create });
}

/// 搭建完整的模拟站点
pub fn clip_site(config: &Config, options: SiteOptions) -> (FakeDocument, Arc<SiteCounters>) {
    let exprs = Exprs::from_config(config);
    let options = Arc::new(options);
    let counters = Arc::new(SiteCounters::default());
    let doc = FakeDocument::new();

    doc.with(|dom| {
        // 登录表单
        dom.add(FakeNode::matching(exprs.email.clone()).input(""));
        let password = dom.add(FakeNode::matching(exprs.password.clone()).input(""));
        let accept = options.accept_login;
        let home = exprs.home_url.clone();
        let error_expr = exprs.login_error.clone();
        let submit_login = move |dom: &mut FakeDom| {
            if accept {
                dom.url = home.clone();
                dom.cookies = vec![("session".to_string(), "abc".to_string())];
            } else {
                dom.add(FakeNode::matching(error_expr.clone()).with_text("Invalid credentials"));
            }
        };
        let submit_login = Arc::new(submit_login);
        let on_click = Arc::clone(&submit_login);
        dom.add(FakeNode::matching(exprs.login_submit.clone()).on_click(move |dom| on_click(dom)));
        if let Some(node) = dom.node_mut(password) {
            let on_enter = Arc::clone(&submit_login);
            node.on_enter = Some(Arc::new(move |dom: &mut FakeDom| on_enter(dom)));
        }

        // 首页：链接输入框 + 提交按钮
        let url_input = dom.add(FakeNode::matching(exprs.url_input.clone()).input(""));
        let exprs_for_submit = exprs.clone();
        let options_for_submit = Arc::clone(&options);
        let counters_for_submit = Arc::clone(&counters);
        dom.add(FakeNode::matching(exprs.url_submit.clone()).on_click(move |dom| {
            let typed = dom.value_of(url_input).unwrap_or_default();
            if typed.is_empty() {
                return;
            }
            let n = counters_for_submit.loads.fetch_add(1, Ordering::SeqCst) + 1;
            dom.url = format!(
                "{}{}{}",
                exprs_for_submit.home_url.trim_end_matches('/'),
                exprs_for_submit.editor_marker,
                n
            );
            build_editor(dom, n, &exprs_for_submit, &options_for_submit, &counters_for_submit);
        }));

        // 列表页上已有的片段
        for i in 1..=options.existing_clips {
            add_artifact(dom, &exprs, i, &options.downloads_dir, &counters);
        }

        // 离开剪辑页时编辑器消失
        let exprs_for_nav = exprs.clone();
        dom.on_navigate = Some(Arc::new(move |dom: &mut FakeDom, url: &str| {
            if !url.contains(&exprs_for_nav.editor_marker) {
                for expr in exprs_for_nav.editor_exprs() {
                    dom.remove_matching(expr);
                }
            }
            if let Some(input) = dom.node_mut(url_input) {
                input.value = Some(String::new());
            }
        }));
    });

    (doc, counters)
}
