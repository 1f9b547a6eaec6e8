//! Filedock TUI - 交互式终端界面
//!
//! 使用 ratatui 浏览、搜索、上传和下载后端文件。
//! 把文件拖放到终端窗口即可上传（终端以粘贴事件传入路径）。
//!
//! # 日志
//!
//! 日志默认显示在 TUI 的"日志"标签页中。
//! 如需输出到文件进行调试，设置 RUST_LOG 环境变量：
//!
//! ```bash
//! RUST_LOG=debug cargo run -p filedock-tui 2>> /tmp/filedock.log
//! ```

mod app;
mod tui_log;
mod ui;

use anyhow::Result;
use crossterm::{
    event::{
        self, DisableBracketedPaste, EnableBracketedPaste, Event, KeyCode, KeyEvent, KeyEventKind,
    },
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use filedock_core::{ClientSettings, LogLevel};
use ratatui::prelude::*;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use app::{App, AppMode, Tab};
use tui_log::TuiLogLayer;

#[tokio::main]
async fn main() -> Result<()> {
    // 创建 App（地址无效时在进入终端界面前退出）
    let mut app = App::new(ClientSettings::load())?;

    // 初始化日志系统，发送到 TUI 日志面板
    init_logging(app.event_tx.clone());

    // 可选参数：启动后立即上传的文件
    if let Some(path) = std::env::args_os().nth(1) {
        app.start_upload(PathBuf::from(path));
    }

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableBracketedPaste)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run app
    let res = run_app(&mut terminal, app).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableBracketedPaste
    )?;
    terminal.show_cursor()?;

    res
}

/// 初始化日志系统
///
/// - 总是将日志发送到 TUI 日志面板
/// - 如果设置了 RUST_LOG，同时输出到 stderr（用于调试）
fn init_logging(log_tx: tokio::sync::mpsc::Sender<app::AppEvent>) {
    // 桥接 log crate（filedock-core 使用）到 tracing
    let _ = tracing_log::LogTracer::init();

    let tui_layer = TuiLogLayer::new(log_tx);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,filedock_core=debug"));

    if std::env::var("RUST_LOG").is_ok() {
        use tracing_subscriber::fmt;

        let stderr_layer = fmt::layer()
            .with_writer(io::stderr)
            .with_target(true)
            .compact();

        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tui_layer)
            .with(stderr_layer)
            .try_init();
    } else {
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tui_layer)
            .try_init();
    }
}

async fn run_app<B: Backend>(terminal: &mut Terminal<B>, mut app: App) -> Result<()> {
    loop {
        terminal.draw(|f| ui::draw(f, &app))?;

        // 使用 poll 避免无限阻塞
        if event::poll(Duration::from_millis(100))? {
            match event::read()? {
                Event::Paste(text) => handle_paste(&mut app, &text),
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    if handle_key(&mut app, key) {
                        return Ok(());
                    }
                }
                _ => {}
            }
        }

        // Update app state (handle async events)
        app.tick();

        // 让出执行权，后台任务在同一运行时上推进
        tokio::task::yield_now().await;
    }
}

fn handle_paste(app: &mut App, text: &str) {
    match app.mode {
        AppMode::Browse => app.handle_drop(text),
        AppMode::Search => app.push_search_str(text),
        AppMode::PathInput => app.input_buffer.push_str(text.trim()),
    }
}

/// 处理按键，返回 true 表示退出
fn handle_key(app: &mut App, key: KeyEvent) -> bool {
    // 错误通知弹窗拦截所有按键
    if app.notification.is_some() {
        app.dismiss_notification();
        return false;
    }

    match app.mode {
        AppMode::Search => match key.code {
            KeyCode::Enter | KeyCode::Esc => app.mode = AppMode::Browse,
            KeyCode::Backspace => app.pop_search_char(),
            KeyCode::Char(c) => app.push_search_char(c),
            _ => {}
        },
        AppMode::PathInput => match key.code {
            KeyCode::Esc => {
                app.input_buffer.clear();
                app.mode = AppMode::Browse;
            }
            KeyCode::Enter => app.submit_path_input(),
            KeyCode::Backspace => {
                app.input_buffer.pop();
            }
            KeyCode::Char(c) => app.input_buffer.push(c),
            _ => {}
        },
        AppMode::Browse if app.is_uploading() => {
            if matches!(key.code, KeyCode::Char('c') | KeyCode::Esc) {
                app.cancel_upload();
            }
        }
        AppMode::Browse => match key.code {
            KeyCode::Char('q') | KeyCode::Esc => return true,
            KeyCode::Char('/') => {
                app.tab = Tab::Files;
                app.mode = AppMode::Search;
            }
            KeyCode::Char('u') => {
                app.input_buffer.clear();
                app.mode = AppMode::PathInput;
            }
            KeyCode::Char('r') => app.refresh(),
            KeyCode::Up | KeyCode::Char('k') => app.previous_file(),
            KeyCode::Down | KeyCode::Char('j') => app.next_file(),
            KeyCode::Enter => app.show_download_url(),
            KeyCode::Char('d') => app.download_selected(),
            KeyCode::Tab => app.next_tab(),
            KeyCode::Char('1') => app.tab = Tab::Files,
            KeyCode::Char('2') => app.tab = Tab::Log,
            KeyCode::Char('v') => app.toggle_log_level(),
            KeyCode::Char('c') if app.tab == Tab::Log => {
                app.clear_logs();
                app.add_log(LogLevel::Info, "日志已清空");
            }
            _ => {}
        },
    }
    false
}
