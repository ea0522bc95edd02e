mod api;
mod config;
mod error;
mod join;
mod log_render;
mod models;
mod reconcile;
mod render;
mod session;
mod sync;
mod ui;
mod view;
mod view_model;

use anyhow::Result;
use api::HttpConsoleApi;
use clap::Parser;
use config::{Cli, Config, Mode};
use eframe::egui;
use join::JoinFlow;
use log_render::LogRenderer;
use session::{Command, Session};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use view::{ConsoleView, SharedView};

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("netgate_console=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();
    let config = Config::from_cli(&cli)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    match cli.mode.clone().unwrap_or(Mode::Console) {
        Mode::Console => run_console(&runtime, config),
        Mode::Watch => runtime.block_on(run_watch(config)),
        Mode::Join { device_id } => run_join(&runtime, config, device_id),
    }
}

fn run_console(runtime: &tokio::runtime::Runtime, config: Config) -> Result<()> {
    let api = Arc::new(HttpConsoleApi::new(&config)?);
    let view = SharedView::new(ConsoleView::new(config.network_name.clone()));
    let (session, handle) = Session::new(
        api,
        view.clone(),
        config.poll_interval,
        config.intruder_ttl,
    );
    runtime.spawn(session.run());
    info!(base_url = %config.base_url, network = config.network_id, "console started");

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1180.0, 720.0])
            .with_title("Network Access Console"),
        ..Default::default()
    };
    let poll_interval = config.poll_interval;

    eframe::run_native(
        "Network Access Console",
        options,
        Box::new(move |cc| {
            // Force light mode
            cc.egui_ctx.set_visuals(egui::Visuals::light());
            Box::new(ui::NetworkConsoleApp::new(cc, view, handle, poll_interval))
        }),
    )
    .map_err(|e| anyhow::anyhow!("Failed to run application: {}", e))
}

async fn run_watch(config: Config) -> Result<()> {
    let api = Arc::new(HttpConsoleApi::new(&config)?);
    let (session, handle) = Session::new(
        api,
        LogRenderer::default(),
        config.poll_interval,
        config.intruder_ttl,
    );
    let task = tokio::spawn(session.run());
    handle.send(Command::Start);
    info!(base_url = %config.base_url, network = config.network_id, "watching network status");

    tokio::signal::ctrl_c().await?;
    handle.send(Command::Shutdown);
    task.await?;
    Ok(())
}

fn run_join(runtime: &tokio::runtime::Runtime, config: Config, device_id: Option<u64>) -> Result<()> {
    let url = config.join_socket_url()?;
    let flow = Arc::new(Mutex::new(JoinFlow::new(config.network_id, device_id)));
    let (tx, rx) = mpsc::unbounded_channel();
    runtime.spawn(join::run_join_channel(url, Arc::clone(&flow), rx));

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([460.0, 260.0])
            .with_title("Join Network"),
        ..Default::default()
    };

    eframe::run_native(
        "Join Network",
        options,
        Box::new(move |cc| {
            cc.egui_ctx.set_visuals(egui::Visuals::light());
            Box::new(ui::JoinApp::new(cc, flow, tx))
        }),
    )
    .map_err(|e| anyhow::anyhow!("Failed to run application: {}", e))
}
