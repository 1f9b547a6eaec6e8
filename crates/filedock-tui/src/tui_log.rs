//! TUI 日志层
//!
//! 自定义 tracing Layer，把日志转发到 TUI 的日志面板。
//! HTTP 栈内部（hyper、reqwest 等）只转发警告及以上级别。

use crate::app::AppEvent;
use filedock_core::LogLevel;
use std::fmt::{self, Write as _};
use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_log::NormalizeEvent;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

const NOISY_TARGETS: [&str; 4] = ["hyper", "h2", "reqwest", "rustls"];

pub struct TuiLogLayer {
    tx: mpsc::Sender<AppEvent>,
}

impl TuiLogLayer {
    pub fn new(tx: mpsc::Sender<AppEvent>) -> Self {
        Self { tx }
    }
}

impl<S> Layer<S> for TuiLogLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        // log crate 转发的事件需要还原真实的 target
        let normalized = event.normalized_metadata();
        let metadata = normalized.as_ref().unwrap_or_else(|| event.metadata());
        let target = metadata.target();
        if *metadata.level() > Level::WARN && NOISY_TARGETS.iter().any(|t| target.starts_with(t)) {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        let mut message = visitor.finish();
        if message.is_empty() {
            message = target.to_string();
        } else if !target.starts_with("filedock") {
            message = format!("[{}] {}", target, message);
        }

        // 非阻塞，通道满时丢弃
        let _ = self.tx.try_send(AppEvent::LogMessage {
            level: to_log_level(*metadata.level()),
            message,
        });
    }
}

fn to_log_level(level: Level) -> LogLevel {
    match level {
        Level::ERROR => LogLevel::Error,
        Level::WARN => LogLevel::Warn,
        Level::INFO => LogLevel::Info,
        Level::DEBUG => LogLevel::Debug,
        Level::TRACE => LogLevel::Trace,
    }
}

/// 收集 message 字段，其余字段以 `key=value` 追加在后面
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(self) -> String {
        match (self.message.is_empty(), self.fields.is_empty()) {
            (_, true) => self.message,
            (true, false) => self.fields.trim_start().to_string(),
            (false, false) => format!("{}{}", self.message, self.fields),
        }
    }
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else if !field.name().starts_with("log.") {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else if !field.name().starts_with("log.") {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }
}
