//! 应用入口 - 编排层
//!
//! ## 职责
//!
//! 1. **应用初始化**：启动日志、获取浏览器、设置下载目录、创建 JsExecutor
//! 2. **输入加载**：读取 CSV，按视频分组
//! 3. **登录**：按配置自动登录，结果未知时按策略继续或中止
//! 4. **调度**：剪辑模式交给 `BatchOrchestrator`，仅下载模式交给 `ArtifactDownloader`
//! 5. **收尾**：无论正常结束、致命错误还是 Ctrl-C，都输出报告
//!
//! `App` 是唯一持有 Browser 的模块；`run_with_document` 不认识浏览器，
//! 只依赖 `LiveDocument`，集成测试用它驱动整个流程。

use anyhow::{Context, Result};
use chromiumoxide::Browser;
use tracing::{error, info, warn};

use crate::browser;
use crate::config::{BrowserMode, Config, UncertaintyPolicy};
use crate::error::{AppResult, AutomationError};
use crate::infrastructure::{JsExecutor, LiveDocument};
use crate::models::{group_by_target, load_clips, ClipStatistics, DescriptorGroup, RunMode, RunReport, Verdict};
use crate::orchestrator::group_processor::{unrecorded_clips, BatchOrchestrator};
use crate::services::{ArtifactDownloader, ReportWriter};
use crate::utils::logging::{self, init_log_file, log_clips_loaded, log_startup, print_final_stats};
use crate::workflow::Session;

/// 应用主结构
pub struct App {
    config: Config,
    browser: Browser,
    executor: JsExecutor,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        // 初始化日志文件
        init_log_file(&config.paths.log_file)?;
        logging::init(&config.log_level, Some(&config.paths.log_file));

        log_startup(&config);

        // 获取浏览器
        let prefer_host = url::Url::parse(&config.site.home_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string));
        let (browser, page) = browser::open(&config.browser, prefer_host.as_deref())
            .await
            .context("无法获取浏览器")?;

        if let Err(e) = browser::set_download_dir(&browser, &config.paths.downloads_dir).await {
            warn!("⚠️ 设置下载目录失败，点击下载可能落在浏览器默认目录: {:#}", e);
        }

        // 创建 JsExecutor（持有 page）
        let executor = JsExecutor::new(page);

        Ok(Self {
            config,
            browser,
            executor,
        })
    }

    /// 运行应用主逻辑，返回已经写盘的报告
    pub async fn run(&self) -> Result<RunReport> {
        run_with_document(&self.config, &self.executor)
            .await
            .context("运行失败")
    }

    /// 释放浏览器；连接模式下浏览器属于用户，不关闭
    pub async fn shutdown(mut self) -> Result<()> {
        if self.config.browser.mode == BrowserMode::Launch {
            info!("🔒 关闭浏览器");
            self.browser.close().await.context("关闭浏览器失败")?;
            let _ = self.browser.wait().await;
        }
        Ok(())
    }
}

/// 在给定页面上完成一次完整运行
///
/// 只有输入文件无法读取时返回 `Err`；运行中的致命错误和中断都记在报告里
/// （`aborted`），报告总会写盘并打印统计。
pub async fn run_with_document(config: &Config, doc: &dyn LiveDocument) -> AppResult<RunReport> {
    let (groups, mut report) = prepare(config)?;

    let result = tokio::select! {
        r = drive(config, doc, &groups, &mut report) => Some(r),
        Ok(()) = tokio::signal::ctrl_c() => None,
    };

    match result {
        Some(Ok(())) => {}
        Some(Err(e)) => {
            error!("🛑 运行提前中止: {}", e);
            if report.aborted.is_none() {
                let remaining = unrecorded_clips(&groups, &report);
                report.abort(e.to_string(), &remaining);
            }
        }
        None => {
            warn!("🛑 收到中断信号，停止处理");
            let remaining = unrecorded_clips(&groups, &report);
            report.abort("用户中断", &remaining);
        }
    }

    report.finalize();
    ReportWriter::from_config(config).persist(&report);
    print_final_stats(&report, config);
    Ok(report)
}

/// 加载输入并建立空报告
fn prepare(config: &Config) -> AppResult<(Vec<DescriptorGroup>, RunReport)> {
    match config.mode {
        RunMode::Cut => {
            let loaded = load_clips(&config.paths.csv_file, &config.allowed_hosts)?;
            ClipStatistics::from_clips(&loaded.clips).log();

            let groups = group_by_target(&loaded.clips);
            log_clips_loaded(loaded.clips.len(), groups.len());

            let mut report = RunReport::new(RunMode::Cut, loaded.clips.len(), config.paths.downloads_dir.clone());
            report.rejected_rows = loaded.rejected;
            Ok((groups, report))
        }
        RunMode::DownloadOnly => Ok((
            Vec::new(),
            RunReport::new(RunMode::DownloadOnly, 0, config.paths.downloads_dir.clone()),
        )),
    }
}

async fn drive(
    config: &Config,
    doc: &dyn LiveDocument,
    groups: &[DescriptorGroup],
    report: &mut RunReport,
) -> AppResult<()> {
    if config.mode == RunMode::Cut && groups.is_empty() {
        warn!("⚠️ 没有有效的片段，程序结束");
        return Ok(());
    }

    let mut session = Session::new(config);
    login(config, doc, &mut session).await?;

    match config.mode {
        RunMode::Cut => {
            let orchestrator = BatchOrchestrator::new(config, &session);
            orchestrator.run(doc, &mut session, groups, report).await
        }
        RunMode::DownloadOnly => {
            let downloader = ArtifactDownloader::new(session.actuator().clone(), config);
            downloader.download_all(doc, report).await
        }
    }
}

/// 自动登录；结果未知时按 `login_uncertainty` 处理
async fn login(config: &Config, doc: &dyn LiveDocument, session: &mut Session) -> AppResult<()> {
    if !config.auto_login {
        info!("⏭️ 跳过自动登录，假定浏览器已登录");
        session.assume_authenticated();
        return Ok(());
    }

    match session.authenticate(doc).await? {
        Verdict::Confirmed => Ok(()),
        Verdict::Failed(reason) => Err(AutomationError::AuthenticationFailure { reason }),
        Verdict::Unknown(reason) => match config.login_uncertainty {
            UncertaintyPolicy::Continue => {
                warn!("⚠️ 登录结果未知，按配置继续: {}", reason);
                session.assume_authenticated();
                Ok(())
            }
            UncertaintyPolicy::Abort => Err(AutomationError::AuthenticationFailure {
                reason: format!("无法确认登录结果: {}", reason),
            }),
        },
    }
}
