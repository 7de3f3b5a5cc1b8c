//! 下载文件命名

use std::path::{Path, PathBuf};

fn is_forbidden(c: char) -> bool {
    matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*') || c.is_control()
}

/// 跨平台安全的文件名：非法字符替换为 `_`，按字符数截断
pub fn clean_filename(name: &str, max_len: usize) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if is_forbidden(c) { '_' } else { c })
        .take(max_len)
        .collect();
    let cleaned = cleaned.trim().trim_end_matches('.').to_string();
    if cleaned.is_empty() {
        "clip".to_string()
    } else {
        cleaned
    }
}

/// 片段列表第 `index` 项的默认文件名
pub fn default_stem(stem: &str, index: usize) -> String {
    format!("{}_{:03}", stem, index)
}

/// 根据 Content-Type 或链接路径推断扩展名（含点）
pub fn extension_for(content_type: Option<&str>, url_path: &str) -> String {
    let content_type = content_type.unwrap_or_default().to_ascii_lowercase();
    if content_type.contains("video/mp4") {
        return ".mp4".to_string();
    }
    if content_type.contains("video/webm") {
        return ".webm".to_string();
    }
    if content_type.contains("video/avi") || content_type.contains("video/x-msvideo") {
        return ".avi".to_string();
    }
    Path::new(url_path)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.len() <= 5)
        .map(|e| format!(".{}", e))
        .unwrap_or_else(|| ".mp4".to_string())
}

/// 目录里不冲突的路径：`name.ext`、`name_1.ext`、`name_2.ext` …
pub fn unique_path(dir: &Path, stem: &str, extension: &str) -> PathBuf {
    let candidate = dir.join(format!("{}{}", stem, extension));
    if !candidate.exists() {
        return candidate;
    }
    let mut counter = 1;
    loop {
        let candidate = dir.join(format!("{}_{}{}", stem, counter, extension));
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

/// 浏览器下载过程中的临时文件
pub fn is_partial_download(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("crdownload" | "tmp" | "part")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_reserved_characters() {
        assert_eq!(clean_filename("a<b>c:d\"e/f\\g|h?i*j", 200), "a_b_c_d_e_f_g_h_i_j");
        assert_eq!(clean_filename("  My Clip. ", 200), "My Clip");
        assert_eq!(clean_filename("tab\there", 200), "tab_here");
        assert_eq!(clean_filename("???", 200), "___");
        assert_eq!(clean_filename("   ", 200), "clip");
    }

    #[test]
    fn truncates_by_characters() {
        let long = "片".repeat(300);
        assert_eq!(clean_filename(&long, 200).chars().count(), 200);
    }

    #[test]
    fn picks_extension_from_content_type_then_path() {
        assert_eq!(extension_for(Some("video/webm; codecs=vp9"), "/a.mp4"), ".webm");
        assert_eq!(extension_for(None, "/files/clip.mov"), ".mov");
        assert_eq!(extension_for(Some("application/octet-stream"), "/download"), ".mp4");
    }

    #[test]
    fn unique_path_appends_counter() {
        let dir = tempfile::tempdir().unwrap();
        let first = unique_path(dir.path(), "clip_001", ".mp4");
        assert_eq!(first.file_name().unwrap(), "clip_001.mp4");

        std::fs::write(&first, b"x").unwrap();
        let second = unique_path(dir.path(), "clip_001", ".mp4");
        assert_eq!(second.file_name().unwrap(), "clip_001_1.mp4");

        std::fs::write(&second, b"x").unwrap();
        assert_eq!(
            unique_path(dir.path(), "clip_001", ".mp4").file_name().unwrap(),
            "clip_001_2.mp4"
        );
    }

    #[test]
    fn recognizes_partial_downloads() {
        assert!(is_partial_download(Path::new("a.mp4.crdownload")));
        assert!(!is_partial_download(Path::new("a.mp4")));
    }
}
