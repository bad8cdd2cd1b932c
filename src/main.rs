//! Overlay Notifier CLI
//!
//! 向 Android TV 叠加层渲染端发送通知

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use overlay_notifier::cli::{
    handle_pipe, handle_send, handle_set, handle_settings, PipeArgs, SendArgs, SetArgs,
    SettingsArgs,
};

#[derive(Parser)]
#[command(name = "overlay-notify")]
#[command(about = "Overlay Notifier - 向 Android TV 叠加层发送通知")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 发送一条通知
    Send(SendArgs),
    /// 从 stdin 逐行读取 JSON 请求并发送
    Pipe(PipeArgs),
    /// 查看设置项
    Settings(SettingsArgs),
    /// 修改一个设置项
    Set(SetArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("overlay_notifier=info,overlay_notify=info"));

    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Send(args) => handle_send(args).await,
        Commands::Pipe(args) => handle_pipe(args).await,
        Commands::Settings(args) => handle_settings(args).await,
        Commands::Set(args) => handle_set(args).await,
    }
}
