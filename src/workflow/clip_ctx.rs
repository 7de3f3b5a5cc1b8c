//! 片段处理上下文
//!
//! 封装"我正在处理第几个视频的第几个片段"这一信息

use std::fmt::Display;

/// 片段处理上下文
#[derive(Debug, Clone)]
pub struct ClipCtx {
    /// 视频组序号（从1开始）
    pub group_index: usize,

    /// 片段在组内的序号（从1开始）
    pub clip_index: usize,

    /// 组内片段总数
    pub group_size: usize,

    /// CSV 行号
    pub source_index: usize,

    /// 是否需要先打开 Controls 面板（新加载视频的第一个片段不需要）
    pub needs_controls: bool,
}

impl ClipCtx {
    pub fn new(
        group_index: usize,
        clip_index: usize,
        group_size: usize,
        source_index: usize,
        needs_controls: bool,
    ) -> Self {
        Self {
            group_index,
            clip_index,
            group_size,
            source_index,
            needs_controls,
        }
    }
}

impl Display for ClipCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[片段 {}-{}]", self.group_index, self.clip_index)
    }
}
