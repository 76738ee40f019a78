mod app;
mod backend;
mod config;
mod event;
mod theme;
mod ui;

use app::GraphdeckApp;
use backend::BackendClient;
use config::Config;
use eframe::egui;
use std::sync::mpsc;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_filter.clone())),
        )
        .init();

    let (tx, rx) = mpsc::channel();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("graphdeck-runtime")
        .build()?;

    let backend = {
        let _guard = runtime.enter();
        BackendClient::new(config, tx)?
    };
    backend.fetch_graph(None);

    let app = GraphdeckApp::new(rx, backend);
    let _runtime = runtime;

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 800.0])
            .with_min_inner_size([1024.0, 640.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Graphdeck",
        native_options,
        Box::new(move |_creation_context| Ok(Box::new(app))),
    )?;

    Ok(())
}
