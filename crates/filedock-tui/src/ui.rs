//! UI rendering module

use filedock_core::format::{format_file_size, format_upload_date};
use filedock_core::{LogLevel, Notification, UploadSession};
use ratatui::{
    prelude::*,
    widgets::{
        Block, Borders, Cell, Clear, Gauge, List, ListItem, Paragraph, Row, Table, TableState,
        Tabs, Wrap,
    },
};

use crate::app::{App, AppMode, Tab};

pub fn draw(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Length(3), // Search
            Constraint::Min(6),    // Main content
            Constraint::Length(3), // Status bar
        ])
        .split(frame.area());

    draw_header(frame, app, chunks[0]);
    draw_search(frame, app, chunks[1]);
    match app.tab {
        Tab::Files => draw_files_tab(frame, app, chunks[2]),
        Tab::Log => draw_log_tab(frame, app, chunks[2]),
    }
    draw_status_bar(frame, app, chunks[3]);

    if app.mode == AppMode::PathInput {
        draw_path_prompt(frame, app);
    }
    if let Some(session) = &app.upload {
        draw_upload_overlay(frame, session);
    }
    if let Some(notification) = &app.notification {
        draw_notification(frame, notification);
    }
}

fn draw_header(frame: &mut Frame, app: &App, area: Rect) {
    let titles = vec!["文件 [1]", "日志 [2]"];
    let selected = match app.tab {
        Tab::Files => 0,
        Tab::Log => 1,
    };

    let tabs = Tabs::new(titles)
        .block(Block::default().borders(Borders::ALL).title(" 🗂️  Filedock "))
        .select(selected)
        .style(Style::default().fg(Color::White))
        .highlight_style(Style::default().fg(Color::Yellow).bold());

    frame.render_widget(tabs, area);
}

fn draw_search(frame: &mut Frame, app: &App, area: Rect) {
    let editing = app.mode == AppMode::Search;
    let (text, style) = if app.search.is_empty() && !editing {
        (
            "按 '/' 搜索文件名或内容".to_string(),
            Style::default().fg(Color::DarkGray),
        )
    } else if editing {
        (format!("{}▏", app.search), Style::default().fg(Color::Yellow))
    } else {
        (app.search.clone(), Style::default())
    };

    let search = Paragraph::new(text)
        .style(style)
        .block(Block::default().borders(Borders::ALL).title(" 🔍 搜索 "));

    frame.render_widget(search, area);
}

fn draw_files_tab(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" 📁 文件 ({}) ", app.files.len()));

    if app.files.is_empty() {
        let text = if app.search.is_empty() {
            "\n把文件拖放到这里上传\n或按 'u' 输入文件路径"
        } else {
            "\n没有匹配的文件"
        };
        let empty = Paragraph::new(text)
            .alignment(Alignment::Center)
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        frame.render_widget(empty, area);
        return;
    }

    let header = Row::new(vec!["文件名", "大小", "上传时间"])
        .style(Style::default().fg(Color::Cyan).bold());

    let rows: Vec<Row> = app
        .files
        .iter()
        .map(|file| {
            Row::new(vec![
                Cell::from(file.original_name.as_str()),
                Cell::from(format_file_size(file.size)),
                Cell::from(format_upload_date(&file.upload_date)),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Percentage(55),
            Constraint::Length(12),
            Constraint::Min(22),
        ],
    )
    .header(header)
    .block(block)
    .row_highlight_style(Style::default().bg(Color::DarkGray).fg(Color::White))
    .highlight_symbol("▶ ");

    let mut state = TableState::default().with_selected(Some(app.selected));
    frame.render_stateful_widget(table, area, &mut state);
}

fn draw_log_tab(frame: &mut Frame, app: &App, area: Rect) {
    let height = area.height.saturating_sub(2) as usize;
    let items: Vec<ListItem> = app
        .visible_logs()
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .take(height)
        .map(|entry| {
            let style = match entry.level {
                LogLevel::Error => Style::default().fg(Color::Red),
                LogLevel::Warn => Style::default().fg(Color::Yellow),
                LogLevel::Info => Style::default(),
                LogLevel::Debug | LogLevel::Trace => Style::default().fg(Color::DarkGray),
            };
            ListItem::new(entry.display_line()).style(style)
        })
        .collect();

    let title = format!(" 📋 日志 (≤ {}) ", app.log_level);
    let list = List::new(items).block(Block::default().borders(Borders::ALL).title(title));

    frame.render_widget(list, area);
}

fn draw_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let hints = match app.mode {
        AppMode::Search => "[Enter/Esc]完成",
        AppMode::PathInput => "[Enter]上传 [Esc]取消",
        AppMode::Browse if app.upload.as_ref().is_some_and(|s| s.notifying) => "后端登记中...",
        AppMode::Browse if app.is_uploading() => "[c/Esc]取消上传",
        AppMode::Browse => "[/]搜索 [u]上传 [Enter]链接 [d]下载 [r]刷新 [Tab]切换 [q]退出",
    };

    let status = Paragraph::new(format!(" {} │ {}", app.status_message, hints))
        .block(Block::default().borders(Borders::ALL));

    frame.render_widget(status, area);
}

fn draw_path_prompt(frame: &mut Frame, app: &App) {
    let area = centered_rect(70, 3, frame.area());
    let prompt = Paragraph::new(format!("{}▏", app.input_buffer)).block(
        Block::default()
            .borders(Borders::ALL)
            .title(" 📤 要上传的文件路径 "),
    );

    frame.render_widget(Clear, area);
    frame.render_widget(prompt, area);
}

fn draw_upload_overlay(frame: &mut Frame, session: &UploadSession) {
    let area = centered_rect(60, 9, frame.area());
    frame.render_widget(Clear, area);

    let block = Block::default()
        .borders(Borders::ALL)
        .title(" 📤 正在上传 ")
        .border_style(Style::default().fg(Color::Cyan));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // File name
            Constraint::Length(3), // Gauge
            Constraint::Length(2), // Status
        ])
        .split(inner);

    let name = Paragraph::new(format!("发送: {}", session.file_name));
    frame.render_widget(name, chunks[0]);

    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL))
        .gauge_style(Style::default().fg(Color::Green).bg(Color::Black))
        .percent(u16::from(session.progress))
        .label(format!("{}%", session.progress));
    frame.render_widget(gauge, chunks[1]);

    let status = if session.progress < 100 && !session.notifying {
        Line::from("● 正在发送文件... [c] 取消").style(Style::default().fg(Color::Yellow))
    } else {
        Line::from("● 发送完成，后端处理中...").style(Style::default().fg(Color::Green))
    };
    frame.render_widget(Paragraph::new(status), chunks[2]);
}

fn draw_notification(frame: &mut Frame, notification: &Notification) {
    let area = centered_rect(60, 7, frame.area());
    let text = format!("{}\n\n按任意键关闭", notification.message);
    let popup = Paragraph::new(text)
        .wrap(Wrap { trim: true })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" ❌ {} ", notification.title()))
                .border_style(Style::default().fg(Color::Red)),
        );

    frame.render_widget(Clear, area);
    frame.render_widget(popup, area);
}

/// 在 `area` 中居中的矩形，宽度为百分比，高度为行数
fn centered_rect(percent_x: u16, height: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Fill(1),
            Constraint::Length(height),
            Constraint::Fill(1),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}
