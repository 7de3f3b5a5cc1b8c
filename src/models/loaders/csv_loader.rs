//! CSV 片段加载器
//!
//! 每行三列：`开始时间, 结束时间, 视频 URL`。坏行单独拒绝并记录原因，
//! 不影响前后的有效行。

use std::collections::HashSet;
use std::fmt;
use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim};
use serde::Serialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{AppResult, AutomationError};
use crate::models::clip::{format_seconds, ClipDescriptor, DescriptorError, Timecode};

/// 行被拒绝的原因
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    ColumnCount(usize),
    BadStartTime,
    BadEndTime,
    EndNotAfterStart,
    HostNotAllowed,
    Unreadable(String),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::ColumnCount(n) => write!(f, "列数应为 3，实际 {}", n),
            RejectReason::BadStartTime => f.write_str("开始时间格式无效"),
            RejectReason::BadEndTime => f.write_str("结束时间格式无效"),
            RejectReason::EndNotAfterStart => f.write_str("结束时间不晚于开始时间"),
            RejectReason::HostNotAllowed => f.write_str("URL 不是允许的视频站点"),
            RejectReason::Unreadable(e) => write!(f, "无法解析: {}", e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedRow {
    pub line: usize,
    pub reason: RejectReason,
    pub raw: Vec<String>,
}

/// 加载结果：有效片段 + 被拒绝的行
#[derive(Debug, Clone, Default)]
pub struct LoadedClips {
    pub clips: Vec<ClipDescriptor>,
    pub rejected: Vec<RejectedRow>,
}

/// URL 是否属于允许的站点（子域名也算）；列表为空时不做限制
pub fn host_allowed(raw_url: &str, allowed_hosts: &[String]) -> bool {
    let Ok(url) = Url::parse(raw_url) else {
        return false;
    };
    if !matches!(url.scheme(), "http" | "https") {
        return false;
    }
    let Some(host) = url.host_str() else {
        return false;
    };
    if allowed_hosts.is_empty() {
        return true;
    }
    let host = host.to_ascii_lowercase();
    allowed_hosts.iter().any(|allowed| {
        let allowed = allowed.trim().to_ascii_lowercase();
        host == allowed || host.ends_with(&format!(".{}", allowed))
    })
}

fn looks_like_header(line: usize, record: &StringRecord) -> bool {
    line == 1
        && record
            .get(0)
            .map(|f| !f.chars().any(|c| c.is_ascii_digit()))
            .unwrap_or(false)
}

fn validate_row(
    line: usize,
    record: &StringRecord,
    allowed_hosts: &[String],
) -> Result<ClipDescriptor, RejectReason> {
    // 行尾多余的空列（如末尾逗号）可以容忍
    let used = record.len() - record.iter().rev().take_while(|f| f.is_empty()).count();
    if used != 3 {
        return Err(RejectReason::ColumnCount(used));
    }

    let start: Timecode = record[0].parse().map_err(|_| RejectReason::BadStartTime)?;
    let end: Timecode = record[1].parse().map_err(|_| RejectReason::BadEndTime)?;
    let url = &record[2];
    if !host_allowed(url, allowed_hosts) {
        return Err(RejectReason::HostNotAllowed);
    }

    ClipDescriptor::new(start, end, url, line).map_err(|e| match e {
        DescriptorError::EndNotAfterStart { .. } => RejectReason::EndNotAfterStart,
        DescriptorError::EmptyUrl => RejectReason::HostNotAllowed,
    })
}

/// 从任意输入流解析片段
pub fn parse_clips<R: Read>(input: R, allowed_hosts: &[String]) -> LoadedClips {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(input);

    let mut loaded = LoadedClips::default();
    let mut fallback_line = 0usize;

    for result in reader.records() {
        fallback_line += 1;
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                let line = e
                    .position()
                    .map(|p| p.line() as usize)
                    .unwrap_or(fallback_line);
                loaded.rejected.push(RejectedRow {
                    line,
                    reason: RejectReason::Unreadable(e.to_string()),
                    raw: Vec::new(),
                });
                continue;
            }
        };
        let line = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(fallback_line);

        if looks_like_header(line, &record) {
            debug!("跳过表头: {:?}", record);
            continue;
        }

        match validate_row(line, &record, allowed_hosts) {
            Ok(clip) => {
                debug!("有效行 {}: {}", line, clip);
                loaded.clips.push(clip);
            }
            Err(reason) => loaded.rejected.push(RejectedRow {
                line,
                reason,
                raw: record.iter().map(str::to_string).collect(),
            }),
        }
    }

    loaded
}

/// 从文件加载片段
///
/// 文件本身打不开才返回错误；坏行只记录在 `rejected` 里。
pub fn load_clips(path: &Path, allowed_hosts: &[String]) -> AppResult<LoadedClips> {
    info!("📁 正在读取 CSV: {}", path.display());
    let file = std::fs::File::open(path).map_err(|e| AutomationError::io(path, e))?;
    let loaded = parse_clips(file, allowed_hosts);

    info!("✓ 成功加载 {} 个有效片段", loaded.clips.len());
    if !loaded.rejected.is_empty() {
        warn!("⚠️ 发现 {} 个无效行:", loaded.rejected.len());
        for row in &loaded.rejected {
            warn!("  第 {} 行: {} - {:?}", row.line, row.reason, row.raw);
        }
    }
    Ok(loaded)
}

/// 片段统计
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClipStatistics {
    pub total_clips: usize,
    pub unique_urls: usize,
    pub total_duration_secs: u64,
    pub average_duration_secs: f64,
}

impl ClipStatistics {
    pub fn from_clips(clips: &[ClipDescriptor]) -> Self {
        let unique_urls = clips
            .iter()
            .map(ClipDescriptor::target_url)
            .collect::<HashSet<_>>()
            .len();
        let total_duration_secs: u64 = clips.iter().map(ClipDescriptor::duration_secs).sum();
        let average_duration_secs = if clips.is_empty() {
            0.0
        } else {
            total_duration_secs as f64 / clips.len() as f64
        };
        Self {
            total_clips: clips.len(),
            unique_urls,
            total_duration_secs,
            average_duration_secs,
        }
    }

    pub fn log(&self) {
        info!("📊 片段统计:");
        info!("  片段总数: {}", self.total_clips);
        info!("  视频数量: {}", self.unique_urls);
        info!("  总时长: {}", format_seconds(self.total_duration_secs));
        info!("  平均时长: {:.1} 秒", self.average_duration_secs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn youtube() -> Vec<String> {
        vec!["youtube.com".to_string(), "youtu.be".to_string()]
    }

    #[test]
    fn bad_rows_are_rejected_individually() {
        let input = "\
00:00:10,00:00:20,https://www.youtube.com/watch?v=a
00:00:10,https://www.youtube.com/watch?v=a
0a:00:10,00:00:20,https://www.youtube.com/watch?v=a
00:00:10,00:61:00,https://www.youtube.com/watch?v=a
00:00:30,00:00:20,https://www.youtube.com/watch?v=a
00:00:10,00:00:20,https://vimeo.com/123
00:01:00,00:01:30,https://youtu.be/b
";
        let loaded = parse_clips(input.as_bytes(), &youtube());

        assert_eq!(loaded.clips.len(), 2);
        assert_eq!(loaded.clips[0].source_index(), 1);
        assert_eq!(loaded.clips[1].source_index(), 7);
        let reasons: Vec<_> = loaded.rejected.iter().map(|r| (r.line, r.reason.clone())).collect();
        assert_eq!(
            reasons,
            vec![
                (2, RejectReason::ColumnCount(2)),
                (3, RejectReason::BadStartTime),
                (4, RejectReason::BadEndTime),
                (5, RejectReason::EndNotAfterStart),
                (6, RejectReason::HostNotAllowed),
            ]
        );
    }

    #[test]
    fn header_row_and_trailing_comma_are_tolerated() {
        let input = "start,end,url\n 00:00:01 , 00:00:05 , https://m.youtube.com/watch?v=x ,\n";
        let loaded = parse_clips(input.as_bytes(), &youtube());
        assert!(loaded.rejected.is_empty());
        assert_eq!(loaded.clips.len(), 1);
        assert_eq!(loaded.clips[0].target_url(), "https://m.youtube.com/watch?v=x");
        assert_eq!(loaded.clips[0].source_index(), 2);
    }

    #[test]
    fn only_trailing_empty_columns_are_ignored_when_counting() {
        let input = "\
00:00:01,00:00:05,https://youtu.be/a,,,
00:00:01,00:00:05,https://youtu.be/a,extra
,00:00:05,https://youtu.be/a
,,,
";
        let loaded = parse_clips(input.as_bytes(), &youtube());
        assert_eq!(loaded.clips.len(), 1);
        let reasons: Vec<_> = loaded.rejected.iter().map(|r| (r.line, r.reason.clone())).collect();
        assert_eq!(
            reasons,
            vec![
                (2, RejectReason::ColumnCount(4)),
                (3, RejectReason::BadStartTime),
                (4, RejectReason::ColumnCount(0)),
            ]
        );
    }

    #[test]
    fn host_matching_accepts_subdomains_only() {
        let hosts = youtube();
        assert!(host_allowed("https://youtube.com/watch?v=1", &hosts));
        assert!(host_allowed("https://www.youtube.com/watch?v=1", &hosts));
        assert!(!host_allowed("https://notyoutube.com/watch?v=1", &hosts));
        assert!(!host_allowed("ftp://youtube.com/x", &hosts));
        assert!(!host_allowed("not a url", &hosts));
        assert!(host_allowed("https://anything.example/v", &[]));
    }

    #[test]
    fn load_from_file_and_compute_statistics() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "00:00:00,00:00:10,https://www.youtube.com/watch?v=a").unwrap();
        writeln!(file, "00:01:00,00:01:30,https://www.youtube.com/watch?v=a").unwrap();
        writeln!(file, "00:00:00,00:00:20,https://www.youtube.com/watch?v=b").unwrap();

        let loaded = load_clips(file.path(), &youtube()).unwrap();
        let stats = ClipStatistics::from_clips(&loaded.clips);
        assert_eq!(stats.total_clips, 3);
        assert_eq!(stats.unique_urls, 2);
        assert_eq!(stats.total_duration_secs, 60);
        assert!((stats.average_duration_secs - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = load_clips(Path::new("/definitely/not/here.csv"), &youtube()).unwrap_err();
        assert!(matches!(err, AutomationError::Io { .. }));
    }
}
