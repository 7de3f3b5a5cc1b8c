use std::collections::HashMap;

use serde::Serialize;

use crate::models::clip::ClipDescriptor;

/// 同一个视频 URL 下的全部片段
///
/// 组内顺序 = CSV 原始顺序；各组互不重叠，合起来覆盖全部片段。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DescriptorGroup {
    pub target_url: String,
    pub clips: Vec<ClipDescriptor>,
}

impl DescriptorGroup {
    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    /// 首尾行号，用于日志
    pub fn row_span(&self) -> Option<(usize, usize)> {
        let first = self.clips.first()?.source_index();
        let last = self.clips.last()?.source_index();
        Some((first, last))
    }
}

/// 按目标 URL 分组
///
/// 组的顺序取 URL 第一次出现的位置，这样同一视频的片段只需加载一次。
pub fn group_by_target(clips: &[ClipDescriptor]) -> Vec<DescriptorGroup> {
    let mut groups: Vec<DescriptorGroup> = Vec::new();
    let mut index_of: HashMap<&str, usize> = HashMap::new();

    for clip in clips {
        match index_of.get(clip.target_url()) {
            Some(&i) => groups[i].clips.push(clip.clone()),
            None => {
                index_of.insert(clip.target_url(), groups.len());
                groups.push(DescriptorGroup {
                    target_url: clip.target_url().to_string(),
                    clips: vec![clip.clone()],
                });
            }
        }
    }

    for group in &mut groups {
        group.clips.sort_by_key(ClipDescriptor::source_index);
    }

    groups
}

/// 所有组的片段总数
pub fn total_clips(groups: &[DescriptorGroup]) -> usize {
    groups.iter().map(DescriptorGroup::len).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::clip::Timecode;

    fn clip(start: &str, end: &str, url: &str, row: usize) -> ClipDescriptor {
        ClipDescriptor::new(
            start.parse::<Timecode>().unwrap(),
            end.parse::<Timecode>().unwrap(),
            url,
            row,
        )
        .unwrap()
    }

    fn sample() -> Vec<ClipDescriptor> {
        vec![
            clip("00:00:10", "00:00:20", "https://video.example/a", 1),
            clip("00:05:00", "00:05:30", "https://video.example/a", 2),
            clip("00:00:00", "00:00:05", "https://video.example/b", 3),
        ]
    }

    #[test]
    fn groups_by_url_in_first_seen_order() {
        let groups = group_by_target(&sample());

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].target_url, "https://video.example/a");
        assert_eq!(groups[0].len(), 2);
        assert_eq!(groups[0].clips[0].start().as_secs(), 10);
        assert_eq!(groups[0].clips[1].start().as_secs(), 300);
        assert_eq!(groups[1].target_url, "https://video.example/b");
        assert_eq!(groups[1].len(), 1);
        assert_eq!(total_clips(&groups), 3);
    }

    #[test]
    fn grouping_is_idempotent() {
        let clips = sample();
        assert_eq!(group_by_target(&clips), group_by_target(&clips));
    }

    #[test]
    fn interleaved_urls_keep_row_order_within_group() {
        let clips = vec![
            clip("00:00:01", "00:00:02", "https://video.example/a", 1),
            clip("00:00:01", "00:00:02", "https://video.example/b", 2),
            clip("00:00:03", "00:00:04", "https://video.example/a", 3),
        ];
        let groups = group_by_target(&clips);
        assert_eq!(groups[0].row_span(), Some((1, 3)));
        assert_eq!(groups[1].row_span(), Some((2, 2)));
        assert!(groups
            .iter()
            .all(|g| g.clips.iter().all(|c| c.target_url() == g.target_url)));
    }

    #[test]
    fn empty_input_yields_no_groups() {
        assert!(group_by_target(&[]).is_empty());
    }
}
