//! 视频组处理器 - 编排层
//!
//! ## 职责
//!
//! 按组遍历全部片段：每组确保视频已加载（同一视频不重复加载），
//! 再把组内片段依次交给 `ClipFlow`。
//!
//! ## 失败策略
//!
//! - 单个片段失败：记入报告，继续下一个
//! - 视频加载失败：本组片段全部记为失败，继续下一组
//! - 致命错误（登录失效、浏览器断开）：剩余片段记为跳过，提前结束

use std::collections::HashSet;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{error, warn};

use crate::config::Config;
use crate::error::{AppResult, AutomationError};
use crate::infrastructure::LiveDocument;
use crate::models::{ClipDescriptor, ClipOutcome, ClipStage, ClipStatus, DescriptorGroup, RunReport};
use crate::utils::logging::{log_group_complete, log_group_start};
use crate::workflow::{ClipCtx, ClipFlow, ResourceEntry, Session};

pub struct BatchOrchestrator {
    flow: ClipFlow,
    between_clips: Duration,
}

impl BatchOrchestrator {
    pub fn new(config: &Config, session: &Session) -> Self {
        Self {
            flow: ClipFlow::new(config, session.actuator().clone()),
            between_clips: config.pacing.between_clips(),
        }
    }

    /// 处理全部视频组，结果逐项写入 `report`
    ///
    /// 返回 `Err` 时报告里已经记下了中止原因和被跳过的片段。
    pub async fn run(
        &self,
        doc: &dyn LiveDocument,
        session: &mut Session,
        groups: &[DescriptorGroup],
        report: &mut RunReport,
    ) -> AppResult<()> {
        let total_groups = groups.len();

        for (gi, group) in groups.iter().enumerate() {
            let group_num = gi + 1;
            log_group_start(group_num, total_groups, &group.target_url, group.len(), group.row_span());

            let entry = match session.ensure_resource(doc, &group.target_url).await {
                Ok(entry) => entry,
                Err(e) if e.is_fatal() => {
                    self.abort(report, &e, groups, gi, 0);
                    return Err(e);
                }
                Err(e) => ResourceEntry::Unavailable(e.to_string()),
            };

            if let ResourceEntry::Unavailable(reason) = &entry {
                error!("❌ 第 {} 个视频无法加载，本组 {} 个片段记为失败", group_num, group.len());
                for clip in &group.clips {
                    report.record_descriptor(clip, ClipOutcome::failed(ClipStage::Navigate, reason.clone()));
                }
                log_group_complete(group_num, 0, group.len());
                continue;
            }
            let freshly_loaded = entry == ResourceEntry::FreshlyLoaded;

            let mut succeeded = 0;
            for (ci, clip) in group.clips.iter().enumerate() {
                let ctx = ClipCtx::new(
                    group_num,
                    ci + 1,
                    group.len(),
                    clip.source_index(),
                    !(ci == 0 && freshly_loaded),
                );

                let outcome = match self.flow.run(doc, session, clip, &ctx).await {
                    Ok(outcome) => outcome,
                    Err(e) if e.is_fatal() => {
                        error!("{} 🛑 致命错误: {}", ctx, e);
                        report.record_descriptor(clip, ClipOutcome::errored(e.to_string()));
                        self.abort(report, &e, groups, gi, ci + 1);
                        return Err(e);
                    }
                    Err(e) => {
                        warn!("{} ❌ 处理出错: {}", ctx, e);
                        ClipOutcome::errored(e.to_string())
                    }
                };
                if outcome.status == ClipStatus::Succeeded {
                    succeeded += 1;
                }
                report.record_descriptor(clip, outcome);

                let is_last = gi + 1 == total_groups && ci + 1 == group.len();
                if !is_last {
                    sleep(self.between_clips).await;
                }
            }

            log_group_complete(group_num, succeeded, group.len());
        }

        Ok(())
    }

    /// 从第 `gi` 组第 `ci` 个片段开始全部记为跳过
    fn abort(&self, report: &mut RunReport, err: &AutomationError, groups: &[DescriptorGroup], gi: usize, ci: usize) {
        let mut remaining: Vec<ClipDescriptor> = Vec::new();
        if let Some(group) = groups.get(gi) {
            remaining.extend(group.clips.iter().skip(ci).cloned());
        }
        for group in groups.iter().skip(gi + 1) {
            remaining.extend(group.clips.iter().cloned());
        }
        report.abort(err.to_string(), &remaining);
    }
}

/// 报告里还没有出现的片段（运行被中断时使用）
pub fn unrecorded_clips(groups: &[DescriptorGroup], report: &RunReport) -> Vec<ClipDescriptor> {
    let recorded: HashSet<usize> = report.items.iter().map(|item| item.index).collect();
    groups
        .iter()
        .flat_map(|g| g.clips.iter())
        .filter(|clip| !recorded.contains(&clip.source_index()))
        .cloned()
        .collect()
}
