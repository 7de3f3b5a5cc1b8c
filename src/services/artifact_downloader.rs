//! 片段下载服务 - 业务能力层
//!
//! 两种方式：
//! - 点击下载按钮，等下载目录里出现新文件
//! - 读取链接地址，带上浏览器 cookie 直接请求

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, COOKIE};
use tokio::io::AsyncWriteExt;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{ArtifactOrder, Config, DownloadMode, Pacing};
use crate::error::{AppResult, AutomationError};
use crate::infrastructure::{ElementHandle, ElementScope, LiveDocument};
use crate::models::{ClipOutcome, ClipStage, ClipStatus, RunReport, SelectorCandidate};
use crate::services::actuator::{Action, Actuator};
use crate::services::file_naming::{
    clean_filename, default_stem, extension_for, is_partial_download, unique_path,
};

/// 列表项文字里取多少个字符做文件名
const TITLE_CHARS: usize = 50;

enum DownloadLink {
    Resolved(Url),
    NoHref,
    Unusable(String),
}

pub struct ArtifactDownloader {
    actuator: Actuator,
    artifact_item: SelectorCandidate,
    download_button: SelectorCandidate,
    mode: DownloadMode,
    order: ArtifactOrder,
    downloads_dir: PathBuf,
    clips_url: String,
    file_stem: String,
    max_filename_len: usize,
    retries: u32,
    creation_timeout: Duration,
    download_timeout: Duration,
    page_load: Duration,
    element_wait: Duration,
    poll_interval: Duration,
    pacing: Pacing,
}

impl ArtifactDownloader {
    pub fn new(actuator: Actuator, config: &Config) -> Self {
        Self {
            actuator,
            artifact_item: config.selectors.artifact_item.clone(),
            download_button: config.selectors.download_button.clone(),
            mode: config.download.mode,
            order: config.download.artifact_order,
            downloads_dir: config.paths.downloads_dir.clone(),
            clips_url: config.site.clips_url.clone(),
            file_stem: config.download.file_stem.clone(),
            max_filename_len: config.download.max_filename_len,
            retries: config.retries.download_retries,
            creation_timeout: config.timeouts.clip_creation(),
            download_timeout: config.timeouts.download(),
            page_load: config.timeouts.page_load(),
            element_wait: config.timeouts.element_wait(),
            poll_interval: config.timeouts.poll_interval(),
            pacing: config.pacing.clone(),
        }
    }

    /// 当前片段列表项数量
    pub async fn count_artifacts(&self, doc: &dyn LiveDocument) -> AppResult<usize> {
        self.actuator
            .locator()
            .count(doc, &self.artifact_item, ElementScope::Document)
            .await
    }

    /// 等待列表项数量超过 `before`，返回最新的一项
    pub async fn await_new_artifact(
        &self,
        doc: &dyn LiveDocument,
        before: usize,
    ) -> AppResult<Option<ElementHandle>> {
        let deadline = Instant::now() + self.creation_timeout;
        loop {
            let now_count = self.count_artifacts(doc).await?;
            if now_count > before {
                debug!("片段列表: {} → {}", before, now_count);
                let items = self
                    .actuator
                    .locator()
                    .locate_all(doc, &self.artifact_item, ElementScope::Document, self.element_wait, 1)
                    .await?;
                let newest = items.and_then(|all| match self.order {
                    ArtifactOrder::NewestFirst => all.first().copied(),
                    ArtifactOrder::NewestLast => all.last().copied(),
                });
                if newest.is_some() {
                    return Ok(newest);
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    /// 创建片段后：等新片段出现并下载
    pub async fn download_newest(
        &self,
        doc: &dyn LiveDocument,
        before: usize,
        name_hint: &str,
    ) -> AppResult<ClipOutcome> {
        let Some(item) = self.await_new_artifact(doc, before).await? else {
            return Ok(self.no_new_artifact());
        };
        match self.mode {
            DownloadMode::Click => self.click_download(doc, item).await,
            DownloadMode::Direct => self.direct_download(doc, item, Some(before), name_hint).await,
        }
    }

    /// 下载某个已知的列表项
    pub async fn download_item(
        &self,
        doc: &dyn LiveDocument,
        item: ElementHandle,
        name_hint: &str,
    ) -> AppResult<ClipOutcome> {
        match self.mode {
            DownloadMode::Click => self.click_download(doc, item).await,
            DownloadMode::Direct => self.direct_download(doc, item, None, name_hint).await,
        }
    }

    fn no_new_artifact(&self) -> ClipOutcome {
        ClipOutcome::failed(
            ClipStage::AwaitArtifact,
            format!("{:?} 内片段列表没有新增", self.creation_timeout),
        )
    }

    async fn click_download(&self, doc: &dyn LiveDocument, item: ElementHandle) -> AppResult<ClipOutcome> {
        tokio::fs::create_dir_all(&self.downloads_dir)
            .await
            .map_err(|e| AutomationError::io(&self.downloads_dir, e))?;
        let before = list_files(&self.downloads_dir);

        let outcome = self
            .actuator
            .act_on(doc, &self.download_button, ElementScope::Within(item), &Action::Click)
            .await?;
        if !outcome.is_success() {
            return Ok(ClipOutcome::from_action(ClipStage::Download, outcome));
        }
        debug!("已点击下载按钮，等待文件落盘...");

        match self.wait_for_new_file(&before).await {
            Some(path) => {
                info!("✓ 已下载: {}", path.display());
                Ok(ClipOutcome::succeeded(Some(path)))
            }
            None => Ok(ClipOutcome::unknown(
                ClipStage::Download,
                format!(
                    "已点击下载，但 {:?} 内 {} 没有出现新文件",
                    self.download_timeout,
                    self.downloads_dir.display()
                ),
            )),
        }
    }

    async fn wait_for_new_file(&self, before: &HashSet<PathBuf>) -> Option<PathBuf> {
        let deadline = Instant::now() + self.download_timeout;
        loop {
            let fresh = list_files(&self.downloads_dir)
                .into_iter()
                .find(|p| !before.contains(p) && !is_partial_download(p));
            if fresh.is_some() {
                return fresh;
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    /// 读取链接直接请求
    ///
    /// `recount` 为创建前的片段数量：每次重试前重新确认列表有新增，
    /// 并从当前最新的一项重新读取链接。
    async fn direct_download(
        &self,
        doc: &dyn LiveDocument,
        mut item: ElementHandle,
        recount: Option<usize>,
        name_hint: &str,
    ) -> AppResult<ClipOutcome> {
        let stem = clean_filename(name_hint, self.max_filename_len);
        let attempts = self.retries.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            if attempt > 1 {
                sleep(self.pacing.backoff(attempt - 1)).await;
                if let Some(before) = recount {
                    match self.await_new_artifact(doc, before).await? {
                        Some(newest) => item = newest,
                        None => return Ok(self.no_new_artifact()),
                    }
                }
            }

            let target = match self.resolve_link(doc, item).await? {
                DownloadLink::Resolved(url) => url,
                DownloadLink::NoHref => {
                    debug!("下载按钮没有链接地址，改为点击下载");
                    return self.click_download(doc, item).await;
                }
                DownloadLink::Unusable(reason) => {
                    return Ok(ClipOutcome::failed(ClipStage::Download, reason));
                }
            };

            let cookie_header = doc
                .cookies()
                .await?
                .into_iter()
                .map(|(name, value)| format!("{}={}", name, value))
                .collect::<Vec<_>>()
                .join("; ");

            match self.fetch_to_file(&target, &cookie_header, &stem).await {
                Ok(path) => {
                    info!("✓ 已下载: {}", path.display());
                    return Ok(ClipOutcome::succeeded(Some(path)));
                }
                Err(e) => {
                    warn!("下载失败 ({}/{}): {}", attempt, attempts, e);
                    last_error = e;
                }
            }
        }
        Ok(ClipOutcome::failed(ClipStage::Download, last_error))
    }

    /// 列表项里下载按钮的链接，按当前页面地址解析成绝对地址
    async fn resolve_link(&self, doc: &dyn LiveDocument, item: ElementHandle) -> AppResult<DownloadLink> {
        let Some(button) = self
            .actuator
            .locator()
            .locate(doc, &self.download_button, ElementScope::Within(item), self.element_wait)
            .await?
        else {
            return Ok(DownloadLink::Unusable("片段项里没有下载按钮".to_string()));
        };

        let href = match doc.attribute(button, "href").await {
            Ok(href) => href.filter(|h| !h.trim().is_empty()),
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                debug!("读取下载链接失败: {}", e);
                None
            }
        };
        let Some(href) = href else {
            return Ok(DownloadLink::NoHref);
        };

        let base = doc.current_url().await?;
        Ok(
            match Url::parse(&base).and_then(|b| b.join(&href)).or_else(|_| Url::parse(&href)) {
                Ok(url) => DownloadLink::Resolved(url),
                Err(e) => DownloadLink::Unusable(format!("无效的下载链接 {}: {}", href, e)),
            },
        )
    }

    async fn fetch_to_file(&self, url: &Url, cookies: &str, stem: &str) -> Result<PathBuf, String> {
        let client = reqwest::Client::builder()
            .timeout(self.download_timeout)
            .build()
            .map_err(|e| e.to_string())?;

        let mut request = client.get(url.clone());
        if !cookies.is_empty() {
            request = request.header(COOKIE, cookies);
        }
        let mut response = request.send().await.map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {}", status));
        }
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());

        tokio::fs::create_dir_all(&self.downloads_dir)
            .await
            .map_err(|e| e.to_string())?;
        let path = unique_path(
            &self.downloads_dir,
            stem,
            &extension_for(content_type.as_deref(), url.path()),
        );

        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| format!("{}: {}", path.display(), e))?;
        let written: Result<(), String> = async {
            while let Some(chunk) = response.chunk().await.map_err(|e| e.to_string())? {
                file.write_all(&chunk).await.map_err(|e| e.to_string())?;
            }
            file.flush().await.map_err(|e| e.to_string())
        }
        .await;

        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&path).await;
            return Err(e);
        }
        Ok(path)
    }

    /// 仅下载模式：下载片段列表页上的全部片段
    pub async fn download_all(&self, doc: &dyn LiveDocument, report: &mut RunReport) -> AppResult<()> {
        info!("📥 打开片段列表: {}", self.clips_url);
        doc.navigate(&self.clips_url).await?;
        self.actuator
            .locator()
            .wait_until_ready(doc, self.page_load)
            .await?;

        let Some(items) = self
            .actuator
            .locator()
            .locate_all(doc, &self.artifact_item, ElementScope::Document, self.element_wait, 1)
            .await?
        else {
            warn!("⚠️ 片段列表为空，没有可下载的片段");
            return Ok(());
        };
        report.total_descriptors = items.len();
        info!("✓ 找到 {} 个片段", items.len());

        for (i, item) in items.iter().enumerate() {
            let index = i + 1;
            let label = self.item_label(doc, *item, index).await?;
            info!("[{}/{}] 下载: {}", index, items.len(), label);

            let outcome = match self.download_item(doc, *item, &label).await {
                Ok(outcome) => outcome,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => ClipOutcome::failed(ClipStage::Download, e.to_string()),
            };
            if outcome.status != ClipStatus::Succeeded {
                warn!("❌ {} 下载失败: {}", label, outcome.detail.as_deref().unwrap_or("-"));
            }
            report.record_artifact(index, label, outcome);

            if index < items.len() {
                sleep(self.pacing.between_downloads()).await;
            }
        }
        Ok(())
    }

    async fn item_label(&self, doc: &dyn LiveDocument, item: ElementHandle, index: usize) -> AppResult<String> {
        let text = match doc.text(item).await {
            Ok(text) => text,
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(_) => String::new(),
        };
        let title: String = text
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or_default()
            .chars()
            .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
            .take(TITLE_CHARS)
            .collect();
        let title = title.trim();
        Ok(if title.is_empty() {
            default_stem(&self.file_stem, index)
        } else {
            title.to_string()
        })
    }
}

fn list_files(dir: &Path) -> HashSet<PathBuf> {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_file())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RunMode;
    use crate::services::locator::Locator;
    use crate::testing::{fast_config, first_expr, FakeDocument, FakeNode};
    use std::sync::{Arc, Mutex};
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    fn downloader(config: &Config) -> ArtifactDownloader {
        let actuator = Actuator::new(Locator::from_config(config), config);
        ArtifactDownloader::new(actuator, config)
    }

    fn add_item(doc: &FakeDocument, config: &Config, text: &str, href: &str, file: Option<PathBuf>) -> ElementHandle {
        let item = doc.with(|dom| {
            dom.prepend(FakeNode::matching(first_expr(&config.selectors.artifact_item)).with_text(text))
        });
        let mut button = FakeNode::matching(first_expr(&config.selectors.download_button))
            .under(item)
            .with_attr("href", href);
        if let Some(file) = file {
            button = button.on_click(move |_| {
                let _ = std::fs::write(&file, b"video");
            });
        }
        doc.add(button);
        item
    }

    #[tokio::test]
    async fn newest_item_depends_on_list_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = fast_config(dir.path());
        let doc = FakeDocument::new();
        let older = add_item(&doc, &config, "old", "/a", None);
        let newer = add_item(&doc, &config, "new", "/b", None);

        assert_eq!(downloader(&config).await_new_artifact(&doc, 1).await.unwrap(), Some(newer));

        config.download.artifact_order = ArtifactOrder::NewestLast;
        assert_eq!(downloader(&config).await_new_artifact(&doc, 1).await.unwrap(), Some(older));
        assert_eq!(downloader(&config).await_new_artifact(&doc, 2).await.unwrap(), None);
    }

    #[tokio::test]
    async fn missing_artifact_fails_at_await_stage() {
        let dir = tempfile::tempdir().unwrap();
        let config = fast_config(dir.path());
        let doc = FakeDocument::new();

        let outcome = downloader(&config).download_newest(&doc, 0, "x").await.unwrap();
        assert_eq!(outcome.status, ClipStatus::Failed);
        assert_eq!(outcome.stage, Some(ClipStage::AwaitArtifact));
    }

    #[tokio::test]
    async fn click_download_waits_for_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = fast_config(dir.path());
        let doc = FakeDocument::new();
        add_item(&doc, &config, "Clip", "/a", Some(dir.path().join("clip.mp4")));

        let outcome = downloader(&config).download_newest(&doc, 0, "Clip").await.unwrap();
        assert_eq!(outcome.status, ClipStatus::Succeeded);
        assert_eq!(outcome.artifact, Some(dir.path().join("clip.mp4")));
    }

    #[tokio::test]
    async fn click_without_a_new_file_is_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let config = fast_config(dir.path());
        let doc = FakeDocument::new();
        add_item(&doc, &config, "Clip", "/a", None);

        let outcome = downloader(&config).download_newest(&doc, 0, "Clip").await.unwrap();
        assert_eq!(outcome.status, ClipStatus::Unknown);
        assert_eq!(outcome.stage, Some(ClipStage::Download));
    }

    #[tokio::test]
    async fn direct_download_reports_unreachable_server() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = fast_config(dir.path());
        config.download.mode = DownloadMode::Direct;
        let doc = FakeDocument::new();
        doc.with(|dom| dom.url = "https://www.clipscutter.com/cutter/1".to_string());
        add_item(&doc, &config, "Clip", "http://127.0.0.1:1/clip.mp4", None);

        let outcome = downloader(&config).download_newest(&doc, 0, "Clip").await.unwrap();
        assert_eq!(outcome.status, ClipStatus::Failed);
        assert_eq!(outcome.stage, Some(ClipStage::Download));
    }

    type Responder = dyn Fn(&str) -> (&'static str, Vec<u8>) + Send + Sync;

    /// 本地 HTTP 服务：按请求路径给出 (状态行, body)，Content-Type 固定为 video/mp4
    async fn serve(respond: Box<Responder>) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let paths = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&paths);
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = vec![0u8; 8192];
                let mut read = 0;
                while read < buf.len() {
                    let n = socket.read(&mut buf[read..]).await.unwrap_or(0);
                    if n == 0 {
                        break;
                    }
                    read += n;
                    if buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                        break;
                    }
                }
                let request = String::from_utf8_lossy(&buf[..read]).to_string();
                let path = request.split_whitespace().nth(1).unwrap_or("/").to_string();
                seen.lock().unwrap().push(path.clone());

                let (status, body) = respond(&path);
                let head = format!(
                    "HTTP/1.1 {}\r\nContent-Type: video/mp4\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    status,
                    body.len()
                );
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.write_all(&body).await;
                let _ = socket.shutdown().await;
            }
        });
        (base, paths)
    }

    #[tokio::test]
    async fn direct_download_names_files_from_content_type_without_overwriting() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = fast_config(dir.path());
        config.download.mode = DownloadMode::Direct;
        let (base, paths) = serve(Box::new(|_: &str| ("200 OK", b"frames".repeat(4096)))).await;
        let doc = FakeDocument::new();
        doc.with(|dom| dom.url = format!("{}/cutter/1", base));
        let item = add_item(&doc, &config, "Clip", "/files/render", None);

        let first = downloader(&config).download_item(&doc, item, "clip_002").await.unwrap();
        let second = downloader(&config).download_item(&doc, item, "clip_002").await.unwrap();

        assert_eq!(first.status, ClipStatus::Succeeded);
        assert_eq!(first.artifact, Some(dir.path().join("clip_002.mp4")));
        assert_eq!(second.artifact, Some(dir.path().join("clip_002_1.mp4")));
        let body = std::fs::read(dir.path().join("clip_002_1.mp4")).unwrap();
        assert_eq!(body, b"frames".repeat(4096));
        assert_eq!(*paths.lock().unwrap(), vec!["/files/render", "/files/render"]);
    }

    #[tokio::test]
    async fn direct_download_retries_against_the_re_resolved_item() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = fast_config(dir.path());
        config.download.mode = DownloadMode::Direct;
        config.retries.download_retries = 2;

        let doc = Arc::new(FakeDocument::new());
        let stale = add_item(&doc, &config, "Clip", "/bad", None);
        let item_expr = first_expr(&config.selectors.artifact_item);
        let button_expr = first_expr(&config.selectors.download_button);

        let site = Arc::clone(&doc);
        let (base, paths) = serve(Box::new(move |path: &str| {
            if path == "/bad" {
                // 列表在第一次请求后重新渲染，最新一项换成了新的节点
                site.with(|dom| {
                    dom.detach(stale);
                    let fresh = dom.prepend(FakeNode::matching(item_expr.as_str()).with_text("Clip"));
                    dom.add(FakeNode::matching(button_expr.as_str()).under(fresh).with_attr("href", "/good"));
                });
                ("503 Service Unavailable", Vec::new())
            } else {
                ("200 OK", b"video".to_vec())
            }
        }))
        .await;
        doc.with(|dom| dom.url = format!("{}/cutter/1", base));

        let outcome = downloader(&config).download_newest(&*doc, 0, "clip_001").await.unwrap();

        assert_eq!(outcome.status, ClipStatus::Succeeded);
        assert_eq!(outcome.artifact, Some(dir.path().join("clip_001.mp4")));
        assert_eq!(std::fs::read(dir.path().join("clip_001.mp4")).unwrap(), b"video");
        assert_eq!(*paths.lock().unwrap(), vec!["/bad", "/good"]);
    }

    #[tokio::test]
    async fn download_all_records_every_listed_item() {
        let dir = tempfile::tempdir().unwrap();
        let config = fast_config(dir.path());
        let doc = FakeDocument::new();
        add_item(&doc, &config, "First clip", "/a", Some(dir.path().join("a.mp4")));
        add_item(&doc, &config, "", "/b", None);

        let mut report = RunReport::new(RunMode::DownloadOnly, 0, dir.path());
        downloader(&config).download_all(&doc, &mut report).await.unwrap();

        assert_eq!(report.total_descriptors, 2);
        assert_eq!(report.items.len(), 2);
        // prepend 让后加的排在前面
        assert_eq!(report.items[0].label, "clip_001");
        assert_eq!(report.items[0].outcome.status, ClipStatus::Unknown);
        assert_eq!(report.items[1].label, "First clip");
        assert_eq!(report.items[1].outcome.status, ClipStatus::Succeeded);
        assert!(doc.url().ends_with("/clips"));
    }
}
