//! # Clipcut Automation
//!
//! 按 CSV 清单在剪辑网站上批量剪出视频片段并下载
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（Page），只暴露 `LiveDocument` 能力
//! - `JsExecutor` - 唯一的 page owner，元素句柄是页面侧注册表里的编号
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，不认识会话和片段流程
//! - `Locator` - 多候选选择器定位
//! - `Actuator` - 带重试和降级的点击 / 输入
//! - `ArtifactDownloader` - 等待新片段出现并下载
//! - `ReportWriter` - 写运行报告和失败清单
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个片段"的完整处理流程
//! - `Session` - 会话状态机（登录 → 首页 → 剪辑页 → Controls 面板）
//! - `ClipCtx` - 上下文封装（视频组序号 + 片段序号）
//! - `ClipFlow` - 流程编排（打开面板 → 设置时间 → 创建 → 下载）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_processor` - 应用入口，管理浏览器和报告
//! - `orchestrator/group_processor` - 按视频分组遍历片段
//!
//! ## 模块结构

pub mod browser;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

// 重新导出常用类型
pub use browser::{connect_to_browser_and_page, launch_browser};
pub use config::Config;
pub use error::{AppResult, AutomationError};
pub use infrastructure::{JsExecutor, LiveDocument};
pub use models::{ClipDescriptor, DescriptorGroup, RunReport};
pub use orchestrator::{run_with_document, App};
pub use workflow::{ClipCtx, ClipFlow, Session};
