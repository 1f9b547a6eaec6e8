//! 上传协调器
//!
//! 驱动一次完整的上传:
//! 1. 申请上传目标（预签名地址）
//! 2. 把文件 PUT 到目标地址，期间上报进度、响应取消
//! 3. 通知后端登记文件
//! 4. 触发文件列表刷新
//!
//! 同一时间最多只有一个上传会话，重叠的上传请求会被拒绝。
//! 所有结束路径（成功、失败、取消）最终都会清除会话。

use log::{debug, info, warn};

use crate::api::{ApiError, FileApi, ProgressSink};
use crate::model::UploadFile;
use crate::report::{ErrorContext, ErrorReporter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// 上传错误
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("An upload of {0} is already in progress")]
    Busy(String),

    #[error("Failed to obtain an upload destination")]
    Destination(#[source] ApiError),

    #[error("Failed to transfer {file_name}")]
    Transfer {
        file_name: String,
        #[source]
        source: ApiError,
    },

    /// 内容已写入目标地址，但后端没有收到通知
    #[error("Uploaded {file_name} ({file_id}) but the backend was not notified")]
    Orphaned {
        file_id: String,
        file_name: String,
        #[source]
        source: ApiError,
    },
}

/// 上传结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Completed { file_id: String },
    Cancelled,
}

/// 上传事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadEvent {
    Started { file_name: String },
    Progress { file_name: String, percent: u8 },
    Completed { file_id: String, file_name: String },
    Cancelled { file_name: String },
    Failed { file_name: String, message: String },
}

/// 当前上传会话
#[derive(Debug, Clone)]
pub struct UploadSession {
    pub file_name: String,
    /// 0..=100
    pub progress: u8,
    pub is_uploading: bool,
    /// 已开始通知后端，不能再取消
    pub notifying: bool,
    cancel: CancellationToken,
    id: u64,
}

/// 上传完成后的刷新回调
pub type RefreshHook = Box<dyn Fn() + Send + Sync>;

/// 计算百分比，四舍五入并限制在 0..=100
///
/// `total` 为 0 时视为未知。
pub fn progress_percent(sent: u64, total: u64) -> Option<u8> {
    if total == 0 {
        return None;
    }
    let sent = u128::from(sent.min(total));
    let total = u128::from(total);
    let percent = (sent * 200 + total) / (total * 2);
    u8::try_from(percent.min(100)).ok()
}

/// 上传协调器
pub struct UploadCoordinator {
    api: Arc<dyn FileApi>,
    reporter: Arc<dyn ErrorReporter>,
    session: Mutex<Option<UploadSession>>,
    next_id: AtomicU64,
    events: broadcast::Sender<UploadEvent>,
    on_complete: Option<RefreshHook>,
}

impl UploadCoordinator {
    pub fn new(api: Arc<dyn FileApi>, reporter: Arc<dyn ErrorReporter>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            api,
            reporter,
            session: Mutex::new(None),
            next_id: AtomicU64::new(1),
            events,
            on_complete: None,
        }
    }

    /// 设置上传成功后调用的刷新回调
    pub fn with_refresh(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_complete = Some(Box::new(hook));
        self
    }

    /// 订阅上传事件
    pub fn subscribe(&self) -> broadcast::Receiver<UploadEvent> {
        self.events.subscribe()
    }

    /// 当前会话快照
    pub fn session(&self) -> Option<UploadSession> {
        self.lock_session().clone()
    }

    pub fn is_uploading(&self) -> bool {
        self.lock_session().is_some()
    }

    /// 上传一个文件
    ///
    /// 失败会交给错误上报器，同时返回给调用方；取消不算失败。
    pub async fn start_upload(&self, file: UploadFile) -> Result<UploadOutcome, UploadError> {
        let (id, cancel) = match self.begin_session(&file.name) {
            Ok(started) => started,
            Err(e) => {
                warn!("Rejected upload of {}: {}", file.name, e);
                self.reporter.report(&e, ErrorContext::Uploading);
                return Err(e);
            }
        };

        match self.run(id, &file, &cancel).await {
            Ok(file_id) => {
                if let Some(hook) = &self.on_complete {
                    hook();
                }
                info!("Upload of {} completed as {}", file.name, file_id);
                self.emit(UploadEvent::Completed {
                    file_id: file_id.clone(),
                    file_name: file.name.clone(),
                });
                self.end_session(id);
                Ok(UploadOutcome::Completed { file_id })
            }
            Err(Step::Cancelled) => {
                debug!("Upload of {} ended by cancellation", file.name);
                // cancel_upload() 已清除会话并发出事件，这里只处理尚未清除的情况
                if self.end_session(id) {
                    self.emit(UploadEvent::Cancelled {
                        file_name: file.name.clone(),
                    });
                }
                Ok(UploadOutcome::Cancelled)
            }
            Err(Step::Failed(e)) => {
                if let UploadError::Orphaned { file_id, .. } = &e {
                    warn!(
                        "Orphaned upload: {} landed at its destination as {} without a backend record",
                        file.name, file_id
                    );
                }
                self.reporter.report(&e, ErrorContext::Uploading);
                self.emit(UploadEvent::Failed {
                    file_name: file.name.clone(),
                    message: e.to_string(),
                });
                self.end_session(id);
                Err(e)
            }
        }
    }

    /// 取消当前上传
    ///
    /// 立即清除会话，不等待网络层确认。返回是否有上传被取消。
    /// 内容写入完成、已开始通知后端时不能再取消。
    pub fn cancel_upload(&self) -> bool {
        let session = {
            let mut session = self.lock_session();
            if session.as_ref().is_some_and(|s| s.notifying) {
                debug!("Upload is being registered, cancel ignored");
                return false;
            }
            session.take()
        };
        match session {
            Some(session) => {
                info!("Cancelling upload of {}", session.file_name);
                session.cancel.cancel();
                self.emit(UploadEvent::Cancelled {
                    file_name: session.file_name,
                });
                true
            }
            None => false,
        }
    }

    async fn run(
        &self,
        id: u64,
        file: &UploadFile,
        cancel: &CancellationToken,
    ) -> Result<String, Step> {
        let destination = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Step::Cancelled),
            result = self.api.request_upload_destination() => {
                result.map_err(|e| Step::Failed(UploadError::Destination(e)))?
            }
        };

        let sink = SessionProgress {
            coordinator: self,
            id,
        };
        match self
            .api
            .upload_bytes(&destination.presigned_url, file, &sink, cancel)
            .await
        {
            Ok(()) => {}
            Err(ApiError::Cancelled) => return Err(Step::Cancelled),
            Err(source) => {
                return Err(Step::Failed(UploadError::Transfer {
                    file_name: file.name.clone(),
                    source,
                }));
            }
        }

        // 内容已经落地，进入通知阶段后不再响应取消
        if !self.begin_notify(id, cancel) {
            return Err(Step::Cancelled);
        }
        self.api
            .notify_upload_complete(&destination.file_id, &file.name)
            .await
            .map_err(|source| {
                Step::Failed(UploadError::Orphaned {
                    file_id: destination.file_id.clone(),
                    file_name: file.name.clone(),
                    source,
                })
            })?;

        Ok(destination.file_id)
    }

    fn begin_session(&self, file_name: &str) -> Result<(u64, CancellationToken), UploadError> {
        let mut session = self.lock_session();
        if let Some(active) = session.as_ref() {
            return Err(UploadError::Busy(active.file_name.clone()));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        *session = Some(UploadSession {
            file_name: file_name.to_string(),
            progress: 0,
            is_uploading: true,
            notifying: false,
            cancel: cancel.clone(),
            id,
        });
        drop(session);

        self.emit(UploadEvent::Started {
            file_name: file_name.to_string(),
        });
        Ok((id, cancel))
    }

    /// 标记会话进入通知阶段，会话已被取消时返回 false
    fn begin_notify(&self, id: u64, cancel: &CancellationToken) -> bool {
        let mut session = self.lock_session();
        match session.as_mut().filter(|s| s.id == id) {
            Some(active) if !cancel.is_cancelled() => {
                active.notifying = true;
                true
            }
            _ => false,
        }
    }

    /// 清除会话（仅当仍是 `id` 对应的会话），返回是否清除
    fn end_session(&self, id: u64) -> bool {
        let mut session = self.lock_session();
        if session.as_ref().is_some_and(|s| s.id == id) {
            *session = None;
            true
        } else {
            false
        }
    }

    fn update_progress(&self, id: u64, percent: u8) {
        let mut session = self.lock_session();
        let Some(active) = session.as_mut().filter(|s| s.id == id) else {
            return;
        };
        // 进度只增不减
        if percent <= active.progress {
            return;
        }
        active.progress = percent;
        let file_name = active.file_name.clone();
        drop(session);

        self.emit(UploadEvent::Progress { file_name, percent });
    }

    fn emit(&self, event: UploadEvent) {
        // 没有订阅者时发送失败，忽略
        let _ = self.events.send(event);
    }

    fn lock_session(&self) -> MutexGuard<'_, Option<UploadSession>> {
        // 锁内不会 panic，中毒时直接沿用内部数据
        self.session
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

enum Step {
    Cancelled,
    Failed(UploadError),
}

/// 把传输进度写回会话
struct SessionProgress<'a> {
    coordinator: &'a UploadCoordinator,
    id: u64,
}

impl ProgressSink for SessionProgress<'_> {
    fn on_progress(&self, sent: u64, total: Option<u64>) {
        if let Some(percent) = total.and_then(|total| progress_percent(sent, total)) {
            self.coordinator.update_progress(self.id, percent);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_percent_rounds() {
        assert_eq!(progress_percent(0, 1000), Some(0));
        assert_eq!(progress_percent(5, 1000), Some(1));
        assert_eq!(progress_percent(4, 1000), Some(0));
        assert_eq!(progress_percent(333, 1000), Some(33));
        assert_eq!(progress_percent(1000, 1000), Some(100));
    }

    #[test]
    fn test_progress_percent_bounds() {
        assert_eq!(progress_percent(10, 0), None);
        assert_eq!(progress_percent(2000, 1000), Some(100));
        assert_eq!(progress_percent(u64::MAX, u64::MAX), Some(100));
    }
}
