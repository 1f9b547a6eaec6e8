//! 文件列表协调器
//!
//! 后台任务负责拉取文件列表，搜索词变化时做防抖：只有在防抖窗口内
//! 没有新的输入，才用最终的搜索词请求一次。被替换的计时不会触发。
//!
//! 拉取失败时交给错误上报器，已显示的列表保持不变。

use log::{debug, trace};

use crate::api::FileApi;
use crate::model::FileRecord;
use crate::report::{ErrorContext, ErrorReporter};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

/// 默认防抖时长
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

enum ListCommand {
    Search(String),
    Reload(Option<String>),
}

/// 文件列表协调器句柄
///
/// 可以克隆；最后一个句柄释放后后台任务退出。
#[derive(Clone)]
pub struct FileListCoordinator {
    commands: mpsc::UnboundedSender<ListCommand>,
    files: watch::Receiver<Vec<FileRecord>>,
    term: Arc<watch::Sender<String>>,
}

impl FileListCoordinator {
    /// 启动后台任务并立即拉取未过滤的列表
    ///
    /// 必须在 tokio 运行时内调用。
    pub fn spawn(
        api: Arc<dyn FileApi>,
        reporter: Arc<dyn ErrorReporter>,
        debounce: Duration,
    ) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let (files_tx, files) = watch::channel(Vec::new());
        let (term, _) = watch::channel(String::new());

        let worker = ListWorker {
            api,
            reporter,
            debounce,
            files: files_tx,
        };
        tokio::spawn(worker.run(rx));

        Self {
            commands,
            files,
            term: Arc::new(term),
        }
    }

    /// 当前显示的文件列表
    pub fn files(&self) -> Vec<FileRecord> {
        self.files.borrow().clone()
    }

    /// 订阅列表变化
    pub fn subscribe(&self) -> watch::Receiver<Vec<FileRecord>> {
        self.files.clone()
    }

    /// 当前搜索词
    pub fn search_term(&self) -> String {
        self.term.borrow().clone()
    }

    /// 更新搜索词并重新开始防抖计时
    pub fn set_search_term(&self, term: impl Into<String>) {
        let term = term.into();
        self.term.send_replace(term.clone());
        let _ = self.commands.send(ListCommand::Search(term));
    }

    /// 立即拉取，绕过防抖
    pub fn reload(&self, term: Option<String>) {
        let _ = self.commands.send(ListCommand::Reload(term));
    }

    /// 用当前搜索词立即刷新
    pub fn refresh(&self) {
        let term = self.search_term();
        self.reload(Some(term));
    }
}

struct ListWorker {
    api: Arc<dyn FileApi>,
    reporter: Arc<dyn ErrorReporter>,
    debounce: Duration,
    files: watch::Sender<Vec<FileRecord>>,
}

impl ListWorker {
    async fn run(self, mut commands: mpsc::UnboundedReceiver<ListCommand>) {
        self.fetch(None).await;

        // 同一时间只有一个待触发的截止时间
        let mut pending: Option<(Instant, String)> = None;

        loop {
            let deadline = pending.as_ref().map(|(at, _)| *at);
            tokio::select! {
                command = commands.recv() => match command {
                    Some(ListCommand::Search(term)) => {
                        trace!("Search term changed: {:?}", term);
                        pending = Some((Instant::now() + self.debounce, term));
                    }
                    Some(ListCommand::Reload(term)) => self.fetch(term.as_deref()).await,
                    None => break,
                },
                () = sleep_until(deadline), if deadline.is_some() => {
                    if let Some((_, term)) = pending.take() {
                        self.fetch(Some(&term)).await;
                    }
                }
            }
        }

        debug!("File list worker stopped");
    }

    async fn fetch(&self, term: Option<&str>) {
        match self.api.list_files(term).await {
            Ok(files) => {
                debug!("Loaded {} files (filter: {:?})", files.len(), term);
                self.files.send_replace(files);
            }
            Err(e) => self.reporter.report(&e, ErrorContext::LoadingFiles),
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
