//! 编排层（Orchestration Layer）
//!
//! ## 模块划分
//!
//! ### `batch_processor` - 应用入口
//! - 管理应用生命周期（初始化、运行、关闭浏览器）
//! - 加载 CSV、登录、按模式调度
//! - 无论如何结束都输出报告
//!
//! ### `group_processor` - 视频组处理器
//! - 按组遍历片段，同一视频只加载一次
//! - 单个片段失败继续，致命错误提前结束
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (一次运行)
//!     ↓
//! group_processor (Vec<DescriptorGroup>)
//!     ↓
//! workflow::ClipFlow (单个片段) + workflow::Session (会话状态)
//!     ↓
//! services (定位 / 交互 / 下载 / 报告)
//!     ↓
//! infrastructure (LiveDocument / JsExecutor)
//! ```

pub mod batch_processor;
pub mod group_processor;

// 重新导出主要类型
pub use batch_processor::{run_with_document, App};
pub use group_processor::{unrecorded_clips, BatchOrchestrator};
