use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Serialize, Serializer};
use thiserror::Error;

/// 时间码解析错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimecodeError {
    #[error("时间格式应为 HH:MM:SS: '{0}'")]
    Malformed(String),
    #[error("分钟或秒超出范围 (0-59): '{0}'")]
    OutOfRange(String),
}

/// 片段描述错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    #[error("结束时间 {end} 必须晚于开始时间 {start}")]
    EndNotAfterStart { start: Timecode, end: Timecode },
    #[error("目标 URL 为空")]
    EmptyUrl,
}

fn timecode_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\d{1,3}):(\d{1,2}):(\d{1,2})$").expect("时间码正则无效"))
}

/// 整秒精度的时间点（视频内偏移）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timecode(u64);

impl Timecode {
    pub fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    pub fn as_secs(self) -> u64 {
        self.0
    }

    /// (时, 分, 秒)
    pub fn parts(self) -> (u64, u64, u64) {
        (self.0 / 3600, (self.0 % 3600) / 60, self.0 % 60)
    }
}

impl FromStr for Timecode {
    type Err = TimecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let caps = timecode_pattern()
            .captures(trimmed)
            .ok_or_else(|| TimecodeError::Malformed(trimmed.to_string()))?;

        let field = |i: usize| -> u64 { caps[i].parse().unwrap_or(0) };
        let (hours, minutes, seconds) = (field(1), field(2), field(3));
        if minutes >= 60 || seconds >= 60 {
            return Err(TimecodeError::OutOfRange(trimmed.to_string()));
        }
        Ok(Self(hours * 3600 + minutes * 60 + seconds))
    }
}

impl fmt::Display for Timecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (h, m, s) = self.parts();
        write!(f, "{:02}:{:02}:{:02}", h, m, s)
    }
}

impl Serialize for Timecode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

/// `HH:MM:SS` → 秒
pub fn convert_to_seconds(time: &str) -> Result<u64, TimecodeError> {
    time.parse::<Timecode>().map(Timecode::as_secs)
}

/// 秒 → `HH:MM:SS`
pub fn format_seconds(seconds: u64) -> String {
    Timecode::from_secs(seconds).to_string()
}

/// 一个待剪辑的片段
///
/// 创建后不可变，由 CSV 加载器产生，编排层只读使用。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClipDescriptor {
    start: Timecode,
    end: Timecode,
    target_url: String,
    /// CSV 中的行号（从 1 开始）
    source_index: usize,
}

impl ClipDescriptor {
    pub fn new(
        start: Timecode,
        end: Timecode,
        target_url: impl Into<String>,
        source_index: usize,
    ) -> Result<Self, DescriptorError> {
        let target_url = target_url.into();
        if target_url.trim().is_empty() {
            return Err(DescriptorError::EmptyUrl);
        }
        if end <= start {
            return Err(DescriptorError::EndNotAfterStart { start, end });
        }
        Ok(Self {
            start,
            end,
            target_url,
            source_index,
        })
    }

    pub fn start(&self) -> Timecode {
        self.start
    }

    pub fn end(&self) -> Timecode {
        self.end
    }

    pub fn target_url(&self) -> &str {
        &self.target_url
    }

    pub fn source_index(&self) -> usize {
        self.source_index
    }

    pub fn duration_secs(&self) -> u64 {
        self.end.as_secs() - self.start.as_secs()
    }
}

impl fmt::Display for ClipDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "片段 #{}: {}-{} ({})",
            self.source_index, self.start, self.end, self.target_url
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_timecodes() {
        assert_eq!(convert_to_seconds("00:00:10"), Ok(10));
        assert_eq!(convert_to_seconds("01:02:03"), Ok(3723));
        assert_eq!(convert_to_seconds(" 0:5:7 "), Ok(307));
        assert_eq!(convert_to_seconds("100:00:00"), Ok(360_000));
    }

    #[test]
    fn rejects_malformed_timecodes() {
        assert!(matches!(
            convert_to_seconds("10:00"),
            Err(TimecodeError::Malformed(_))
        ));
        assert!(matches!(
            convert_to_seconds("aa:bb:cc"),
            Err(TimecodeError::Malformed(_))
        ));
        assert!(matches!(
            convert_to_seconds("00:60:00"),
            Err(TimecodeError::OutOfRange(_))
        ));
        assert!(matches!(
            convert_to_seconds("00:00:75"),
            Err(TimecodeError::OutOfRange(_))
        ));
        assert!(convert_to_seconds("-1:00:00").is_err());
    }

    #[test]
    fn format_then_parse_is_stable() {
        for raw in ["00:00:00", "0:0:1", "12:34:56", "99:59:59", "5:07:09"] {
            let secs = convert_to_seconds(raw).unwrap();
            assert_eq!(convert_to_seconds(&format_seconds(secs)), Ok(secs), "{raw}");
        }
    }

    #[test]
    fn descriptor_requires_end_after_start() {
        let start = Timecode::from_secs(20);
        let end = Timecode::from_secs(10);
        assert!(matches!(
            ClipDescriptor::new(start, end, "https://video.example/a", 1),
            Err(DescriptorError::EndNotAfterStart { .. })
        ));
        assert!(ClipDescriptor::new(start, start, "https://video.example/a", 1).is_err());
        assert!(ClipDescriptor::new(end, start, " ", 1).is_err());

        let clip = ClipDescriptor::new(end, start, "https://video.example/a", 4).unwrap();
        assert_eq!(clip.duration_secs(), 10);
        assert_eq!(clip.to_string(), "片段 #4: 00:00:10-00:00:20 (https://video.example/a)");
    }
}
