//! 片段处理流程 - 流程层
//!
//! 核心职责：定义"一个片段"的完整处理流程
//!
//! 流程顺序：
//! 1. 确认加载的是这个片段的视频
//! 2. 打开 Controls 面板（新加载视频的第一个片段除外）
//! 3. 设置开始时间 → 设置结束时间 → 检查范围提示
//! 4. 记录片段数量 → 点击创建
//! 5. 等待新片段出现并下载

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::{Config, Pacing, RangeLayout, SelectorTable, Timeouts};
use crate::error::AppResult;
use crate::infrastructure::{ElementScope, LiveDocument};
use crate::models::{ActionOutcome, ClipDescriptor, ClipOutcome, ClipStage, ClipStatus, Timecode};
use crate::services::file_naming::default_stem;
use crate::services::{Action, Actuator, ArtifactDownloader};
use crate::workflow::clip_ctx::ClipCtx;
use crate::workflow::session::Session;

/// 开始 / 结束
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bound {
    Start,
    End,
}

impl Bound {
    fn container_index(self) -> usize {
        match self {
            Bound::Start => 0,
            Bound::End => 1,
        }
    }

    fn stage(self) -> ClipStage {
        match self {
            Bound::Start => ClipStage::SetStart,
            Bound::End => ClipStage::SetEnd,
        }
    }
}

/// 片段处理流程
///
/// - 编排单个片段的处理步骤
/// - 不持有页面，只依赖业务能力（services）和会话状态机
pub struct ClipFlow {
    actuator: Actuator,
    downloader: ArtifactDownloader,
    selectors: SelectorTable,
    timeouts: Timeouts,
    pacing: Pacing,
    file_stem: String,
    force_enable_inputs: bool,
    verbose_logging: bool,
}

impl ClipFlow {
    pub fn new(config: &Config, actuator: Actuator) -> Self {
        Self {
            downloader: ArtifactDownloader::new(actuator.clone(), config),
            actuator,
            selectors: config.selectors.clone(),
            timeouts: config.timeouts.clone(),
            pacing: config.pacing.clone(),
            file_stem: config.download.file_stem.clone(),
            force_enable_inputs: config.force_enable_inputs,
            verbose_logging: config.verbose_logging,
        }
    }

    /// 处理一个片段
    ///
    /// 片段级失败记在返回的 `ClipOutcome` 里；只有致命错误才返回 `Err`。
    pub async fn run(
        &self,
        doc: &dyn LiveDocument,
        session: &mut Session,
        clip: &ClipDescriptor,
        ctx: &ClipCtx,
    ) -> AppResult<ClipOutcome> {
        info!(
            "{} ✂️ {} → {} (第 {} 行, {}/{})",
            ctx,
            clip.start(),
            clip.end(),
            ctx.source_index,
            ctx.clip_index,
            ctx.group_size
        );

        if let Err(e) = session.require_resource(clip.target_url()) {
            warn!("{} ⚠️ {}", ctx, e);
            return Ok(ClipOutcome::failed(ClipStage::Navigate, e.to_string()));
        }

        // ========== 步骤 1: Controls 面板 ==========
        if !self.ensure_controls(doc, session, ctx).await? {
            return Ok(ClipOutcome::failed(
                ClipStage::OpenControls,
                "时间控件没有出现",
            ));
        }

        // ========== 步骤 2: 开始 / 结束时间 ==========
        for (bound, value) in [(Bound::Start, clip.start()), (Bound::End, clip.end())] {
            let outcome = self.set_bound(doc, bound, value).await?;
            if !outcome.is_success() {
                warn!("{} ❌ {}失败: {}", ctx, bound.stage(), outcome);
                return Ok(ClipOutcome::from_action(bound.stage(), outcome));
            }
            debug!("{} ✓ {}: {}", ctx, bound.stage(), value);
        }

        if let Some(message) = self.range_error(doc).await? {
            warn!("{} ❌ 页面提示时间范围无效: {}", ctx, message);
            return Ok(ClipOutcome::failed(
                ClipStage::SetEnd,
                format!("时间范围无效: {}", message),
            ));
        }

        // ========== 步骤 3: 创建片段 ==========
        let before = self.downloader.count_artifacts(doc).await?;
        if self.verbose_logging {
            debug!("{} 创建前片段数量: {}", ctx, before);
        }

        let outcome = self
            .actuator
            .act_on(doc, &self.selectors.create_button, ElementScope::Document, &Action::Click)
            .await?;
        if !outcome.is_success() {
            warn!("{} ❌ 点击创建失败: {}", ctx, outcome);
            return Ok(ClipOutcome::from_action(ClipStage::Create, outcome));
        }
        session.mark_panel_consumed();
        info!("{} ✓ 已提交创建", ctx);
        sleep(self.pacing.after_clip_creation()).await;

        // ========== 步骤 4: 下载 ==========
        let name = default_stem(&self.file_stem, ctx.source_index);
        let outcome = self.downloader.download_newest(doc, before, &name).await?;
        match outcome.status {
            ClipStatus::Succeeded => info!("{} ✅ 完成", ctx),
            _ => warn!(
                "{} ❌ {}: {}",
                ctx,
                outcome.stage.map(|s| s.to_string()).unwrap_or_default(),
                outcome.detail.as_deref().unwrap_or("-")
            ),
        }
        Ok(outcome)
    }

    /// 新加载视频的第一个片段直接查找时间控件，其余先打开面板
    async fn ensure_controls(
        &self,
        doc: &dyn LiveDocument,
        session: &mut Session,
        ctx: &ClipCtx,
    ) -> AppResult<bool> {
        if !ctx.needs_controls {
            let visible = self
                .actuator
                .locator()
                .locate_all(
                    doc,
                    &self.selectors.range_container,
                    ElementScope::Document,
                    self.timeouts.element_wait(),
                    2,
                )
                .await?;
            if visible.is_some() {
                return Ok(true);
            }
            debug!("{} 时间控件不可见，尝试打开 Controls 面板", ctx);
        }
        Ok(session.open_controls(doc).await?.is_some())
    }

    /// 设置一个时间点；容器或输入框失效时整体重新定位
    async fn set_bound(
        &self,
        doc: &dyn LiveDocument,
        bound: Bound,
        value: Timecode,
    ) -> AppResult<ActionOutcome> {
        let locator = self.actuator.locator();
        let rounds = self.actuator.relocate_attempts() + 1;
        let mut last = ActionOutcome::NotFound;

        for _ in 0..rounds {
            let Some(containers) = locator
                .locate_all(
                    doc,
                    &self.selectors.range_container,
                    ElementScope::Document,
                    self.timeouts.element_wait(),
                    2,
                )
                .await?
            else {
                return Ok(ActionOutcome::NotFound);
            };
            let container = containers[bound.container_index()];
            let scope = ElementScope::Within(container);

            if self.force_enable_inputs {
                match doc.enable_inputs(scope).await {
                    Ok(n) if n > 0 => debug!("已解除 {} 个输入框的禁用状态", n),
                    Ok(_) => {}
                    Err(e) if e.is_fatal() => return Err(e.into()),
                    Err(e) => debug!("解除禁用失败: {}", e),
                }
            }

            last = match self.selectors.range_layout {
                RangeLayout::Split => self.type_parts(doc, scope, value).await?,
                RangeLayout::Single => {
                    self.actuator
                        .act_on(
                            doc,
                            &self.selectors.time_field,
                            scope,
                            &Action::type_text(value.to_string()),
                        )
                        .await?
                }
            };
            if last != ActionOutcome::StaleReference {
                return Ok(last);
            }
            debug!("时间控件已失效，重新定位");
        }
        Ok(last)
    }

    /// 时 / 分 / 秒三个数字框
    async fn type_parts(
        &self,
        doc: &dyn LiveDocument,
        scope: ElementScope,
        value: Timecode,
    ) -> AppResult<ActionOutcome> {
        let Some(inputs) = self
            .actuator
            .locator()
            .locate_all(
                doc,
                &self.selectors.time_part_inputs,
                scope,
                self.timeouts.element_wait(),
                3,
            )
            .await?
        else {
            return Ok(ActionOutcome::NotFound);
        };

        let (h, m, s) = value.parts();
        for (input, part) in inputs.into_iter().zip([h, m, s]) {
            let outcome = self
                .actuator
                .act(doc, input, &Action::type_text(part.to_string()), self.actuator.max_attempts())
                .await?;
            if !outcome.is_success() {
                return Ok(outcome);
            }
        }
        Ok(ActionOutcome::Success)
    }

    /// 页面上的范围错误提示（如 "Must be less than ..."）
    async fn range_error(&self, doc: &dyn LiveDocument) -> AppResult<Option<String>> {
        let Some(element) = self
            .actuator
            .locator()
            .probe(doc, &self.selectors.range_error, ElementScope::Document)
            .await?
        else {
            return Ok(None);
        };
        let text = match doc.text(element).await {
            Ok(text) => text.trim().to_string(),
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(_) => String::new(),
        };
        Ok(Some(if text.is_empty() { "-".to_string() } else { text }))
    }
}
