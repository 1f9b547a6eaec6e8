//! 子命令实现

use anyhow::{Context, Result};
use filedock_core::format::{format_file_size, format_upload_date};
use filedock_core::{
    CancellationToken, ClientSettings, ErrorContext, ErrorReporter, FileApi, HttpFileClient,
    LogReporter, UploadCoordinator, UploadEvent, UploadFile, UploadOutcome,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

fn client(settings: &ClientSettings) -> Result<HttpFileClient> {
    HttpFileClient::new(settings).context("无效的后端地址")
}

pub async fn list(settings: &ClientSettings, query: Option<&str>) -> Result<()> {
    let files = client(settings)?.list_files(query).await.map_err(|e| {
        LogReporter.report(&e, ErrorContext::LoadingFiles);
        e
    })?;

    if files.is_empty() {
        println!("   未找到文件");
        return Ok(());
    }

    let width = files
        .iter()
        .map(|f| f.original_name.chars().count())
        .max()
        .unwrap_or(0)
        .max(8);
    println!("{:<width$}  {:>10}  {:<22}  ID", "文件名", "大小", "上传时间");
    for file in &files {
        println!(
            "{:<width$}  {:>10}  {:<22}  {}",
            file.original_name,
            format_file_size(file.size),
            format_upload_date(&file.upload_date),
            file.file_id
        );
    }
    println!("共 {} 个文件", files.len());
    Ok(())
}

pub async fn upload(settings: &ClientSettings, path: &Path) -> Result<()> {
    let file = UploadFile::from_path(path)
        .await
        .with_context(|| format!("无法读取文件: {}", path.display()))?;

    let api: Arc<dyn FileApi> = Arc::new(client(settings)?);
    let coordinator = UploadCoordinator::new(api, Arc::new(LogReporter));

    let mut events = coordinator.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });

    let result = {
        let upload = coordinator.start_upload(file);
        tokio::pin!(upload);
        tokio::select! {
            result = &mut upload => result,
            _ = tokio::signal::ctrl_c() => {
                coordinator.cancel_upload();
                upload.await
            }
        }
    };

    drop(coordinator);
    let _ = printer.await;

    match result? {
        UploadOutcome::Completed { file_id } => println!("   文件 ID: {}", file_id),
        UploadOutcome::Cancelled => {}
    }
    Ok(())
}

fn print_event(event: &UploadEvent) {
    match event {
        UploadEvent::Started { file_name } => println!("📤 上传: {}", file_name),
        UploadEvent::Progress { percent, .. } => {
            print!("\r   进度: {:>3}%", percent);
            let _ = std::io::stdout().flush();
        }
        UploadEvent::Completed { .. } => println!("\n✅ 上传完成"),
        UploadEvent::Cancelled { .. } => println!("\n⏹️  已取消上传"),
        UploadEvent::Failed { message, .. } => eprintln!("\n❌ 上传失败: {}", message),
    }
}

pub fn url(settings: &ClientSettings, file_id: &str) -> Result<()> {
    println!("{}", client(settings)?.download_url(file_id));
    Ok(())
}

pub async fn download(
    settings: &ClientSettings,
    file_id: &str,
    name: Option<String>,
    output: Option<PathBuf>,
) -> Result<()> {
    let client = client(settings)?;

    // 未指定文件名时从列表中查找原始名称
    let name = match name {
        Some(name) => name,
        None => client
            .list_files(None)
            .await
            .ok()
            .and_then(|files| files.into_iter().find(|f| f.file_id == file_id))
            .map(|f| f.original_name)
            .unwrap_or_else(|| file_id.to_string()),
    };
    let dir = output.unwrap_or_else(|| settings.download_dir.clone());

    println!("📥 下载 {} -> {}", name, dir.display());
    let path = client
        .download_to(file_id, &name, &dir, &CancellationToken::new())
        .await
        .map_err(|e| {
            LogReporter.report(&e, ErrorContext::Downloading);
            e
        })?;
    println!("✅ 已保存: {}", path.display());
    Ok(())
}

pub async fn notify(settings: &ClientSettings, file_id: &str, file_name: &str) -> Result<()> {
    let ack = client(settings)?
        .notify_upload_complete(file_id, file_name)
        .await
        .map_err(|e| {
            LogReporter.report(&e, ErrorContext::Uploading);
            e
        })?;
    println!("✅ {} {}", ack.status, ack.message);
    Ok(())
}

pub fn show_config(settings: &ClientSettings) -> Result<()> {
    println!("# {}", ClientSettings::config_path().display());
    print!("{}", toml::to_string_pretty(settings)?);
    Ok(())
}
