//! Application state

use filedock_core::{
    CancellationToken, ChannelReporter, ClientSettings, ErrorContext, ErrorReporter, FileApi,
    FileListCoordinator, FileRecord, HttpFileClient, LogEntry, LogLevel, Notification,
    UploadCoordinator, UploadFile, UploadSession,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use url::Url;

/// 日志面板保留的最大条目数
const MAX_LOGS: usize = 500;

/// 后台任务发给界面的事件
#[derive(Debug)]
pub enum AppEvent {
    LogMessage { level: LogLevel, message: String },
    Downloaded(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AppMode {
    Browse,
    Search,
    PathInput,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tab {
    Files,
    Log,
}

pub struct App {
    pub mode: AppMode,
    pub tab: Tab,
    pub settings: ClientSettings,
    pub files: Vec<FileRecord>,
    pub selected: usize,
    pub search: String,
    pub input_buffer: String,
    pub upload: Option<UploadSession>,
    pub notification: Option<Notification>,
    pub status_message: String,
    pub logs: Vec<LogEntry>,
    pub log_level: LogLevel,
    pub event_tx: mpsc::Sender<AppEvent>,
    event_rx: mpsc::Receiver<AppEvent>,
    notifications: mpsc::Receiver<Notification>,
    api: Arc<dyn FileApi>,
    reporter: Arc<ChannelReporter>,
    list: FileListCoordinator,
    uploader: Arc<UploadCoordinator>,
}

impl App {
    /// 创建 App 并开始加载文件列表
    ///
    /// 必须在 tokio 运行时内调用。
    pub fn new(settings: ClientSettings) -> anyhow::Result<Self> {
        let api: Arc<dyn FileApi> = Arc::new(HttpFileClient::new(&settings)?);
        Ok(Self::with_api(settings, api))
    }

    pub fn with_api(settings: ClientSettings, api: Arc<dyn FileApi>) -> Self {
        let (event_tx, event_rx) = mpsc::channel(256);
        let (reporter, notifications) = ChannelReporter::new(16);
        let reporter = Arc::new(reporter);

        let list = FileListCoordinator::spawn(
            api.clone(),
            reporter.clone(),
            settings.search_debounce(),
        );
        let refresh = list.clone();
        let uploader = Arc::new(
            UploadCoordinator::new(api.clone(), reporter.clone())
                .with_refresh(move || refresh.refresh()),
        );

        Self {
            mode: AppMode::Browse,
            tab: Tab::Files,
            status_message: format!("后端: {}", settings.api.base_url),
            settings,
            files: vec![],
            selected: 0,
            search: String::new(),
            input_buffer: String::new(),
            upload: None,
            notification: None,
            logs: vec![LogEntry::new(
                LogLevel::Info,
                "Filedock TUI 启动，按 'u' 上传文件，或把文件拖放到终端",
            )],
            log_level: LogLevel::Info,
            event_tx,
            event_rx,
            notifications,
            api,
            reporter,
            list,
            uploader,
        }
    }

    pub fn add_log(&mut self, level: LogLevel, message: impl Into<String>) {
        self.logs.push(LogEntry::new(level, message));
        if self.logs.len() > MAX_LOGS {
            let excess = self.logs.len() - MAX_LOGS;
            self.logs.drain(..excess);
        }
    }

    /// 当前级别过滤后的日志
    pub fn visible_logs(&self) -> impl Iterator<Item = &LogEntry> {
        self.logs.iter().filter(|e| e.level <= self.log_level)
    }

    pub fn toggle_log_level(&mut self) {
        self.log_level = self.log_level.cycle();
        self.status_message = format!("日志级别: {}", self.log_level);
    }

    pub fn clear_logs(&mut self) {
        self.logs.clear();
    }

    pub fn next_tab(&mut self) {
        self.tab = match self.tab {
            Tab::Files => Tab::Log,
            Tab::Log => Tab::Files,
        };
    }

    pub fn next_file(&mut self) {
        if !self.files.is_empty() {
            self.selected = (self.selected + 1) % self.files.len();
        }
    }

    pub fn previous_file(&mut self) {
        if !self.files.is_empty() {
            self.selected = self
                .selected
                .checked_sub(1)
                .unwrap_or(self.files.len() - 1);
        }
    }

    pub fn selected_file(&self) -> Option<&FileRecord> {
        self.files.get(self.selected)
    }

    // ------------------------------------------------------------------
    // 搜索
    // ------------------------------------------------------------------

    pub fn push_search_char(&mut self, c: char) {
        self.search.push(c);
        self.list.set_search_term(self.search.clone());
    }

    pub fn pop_search_char(&mut self) {
        if self.search.pop().is_some() {
            self.list.set_search_term(self.search.clone());
        }
    }

    pub fn push_search_str(&mut self, text: &str) {
        self.search.push_str(text.trim());
        self.list.set_search_term(self.search.clone());
    }

    pub fn refresh(&mut self) {
        self.list.refresh();
        self.status_message = "正在刷新...".to_string();
    }

    // ------------------------------------------------------------------
    // 上传
    // ------------------------------------------------------------------

    pub fn is_uploading(&self) -> bool {
        self.upload.is_some()
    }

    /// 处理拖放到终端的内容（粘贴事件）
    pub fn handle_drop(&mut self, text: &str) {
        match parse_dropped_path(text) {
            Some(path) => self.start_upload(path),
            None => self.add_log(LogLevel::Warn, "拖放内容中没有文件路径"),
        }
    }

    pub fn submit_path_input(&mut self) {
        let input = std::mem::take(&mut self.input_buffer);
        self.mode = AppMode::Browse;
        match parse_dropped_path(&input) {
            Some(path) => self.start_upload(path),
            None => self.status_message = "未输入文件路径".to_string(),
        }
    }

    pub fn start_upload(&mut self, path: PathBuf) {
        self.add_log(LogLevel::Info, format!("准备上传: {}", path.display()));
        let uploader = self.uploader.clone();
        let reporter = self.reporter.clone();

        tokio::spawn(async move {
            match UploadFile::from_path(&path).await {
                // 失败已由协调器上报
                Ok(file) => {
                    let _ = uploader.start_upload(file).await;
                }
                Err(e) => reporter.report(&e, ErrorContext::Uploading),
            }
        });
    }

    pub fn cancel_upload(&mut self) {
        if self.uploader.cancel_upload() {
            self.upload = None;
            self.status_message = "已取消上传".to_string();
        } else if self.is_uploading() {
            self.status_message = "文件已发送，后端登记中，无法取消".to_string();
        }
    }

    // ------------------------------------------------------------------
    // 下载
    // ------------------------------------------------------------------

    pub fn show_download_url(&mut self) {
        let Some(url) = self
            .selected_file()
            .map(|file| self.api.download_url(&file.file_id))
        else {
            return;
        };
        self.add_log(LogLevel::Info, format!("下载地址: {}", url));
        self.status_message = url;
    }

    pub fn download_selected(&mut self) {
        let Some(file) = self.selected_file().cloned() else {
            return;
        };
        let dir = self.settings.download_dir.clone();
        let api = self.api.clone();
        let reporter = self.reporter.clone();
        let tx = self.event_tx.clone();

        self.status_message = format!("正在下载 {}...", file.original_name);
        tokio::spawn(async move {
            match api
                .download_to(
                    &file.file_id,
                    &file.original_name,
                    &dir,
                    &CancellationToken::new(),
                )
                .await
            {
                Ok(path) => {
                    let _ = tx.send(AppEvent::Downloaded(path)).await;
                }
                Err(e) => reporter.report(&e, ErrorContext::Downloading),
            }
        });
    }

    pub fn dismiss_notification(&mut self) {
        self.notification = None;
    }

    /// 同步后台状态
    pub fn tick(&mut self) {
        while let Ok(event) = self.event_rx.try_recv() {
            match event {
                AppEvent::LogMessage { level, message } => self.add_log(level, message),
                AppEvent::Downloaded(path) => {
                    self.status_message = format!("已保存: {}", path.display());
                }
            }
        }

        // 一次只显示一条通知，其余留在通道中
        if self.notification.is_none()
            && let Ok(notification) = self.notifications.try_recv()
        {
            self.notification = Some(notification);
        }

        self.files = self.list.files();
        if self.selected >= self.files.len() {
            self.selected = self.files.len().saturating_sub(1);
        }
        self.upload = self.uploader.session();
    }
}

/// 从粘贴的文本中提取第一个文件路径
///
/// 支持引号包裹、`file://` URI（百分号编码）和反斜杠转义的空格。
pub fn parse_dropped_path(text: &str) -> Option<PathBuf> {
    let line = text.lines().map(str::trim).find(|l| !l.is_empty())?;

    let unquoted = line
        .strip_prefix('\'')
        .and_then(|l| l.strip_suffix('\''))
        .or_else(|| line.strip_prefix('"').and_then(|l| l.strip_suffix('"')))
        .unwrap_or(line);
    if unquoted.starts_with("file://") {
        return Url::parse(unquoted).ok()?.to_file_path().ok();
    }

    let path = if unquoted.contains('\\') && !unquoted.contains(":\\") {
        unquoted.replace("\\ ", " ")
    } else {
        unquoted.to_string()
    };

    if path.is_empty() {
        None
    } else {
        Some(PathBuf::from(path))
    }
}
