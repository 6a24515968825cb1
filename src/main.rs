#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod config;
mod model_download;
mod pipeline;
mod types;
mod ui;

use anyhow::Result;
use gpui::Application;

use config::OverlayConfig;

fn main() -> Result<()> {
    env_logger::init();

    let config = OverlayConfig::from_env()?;
    log::info!(
        "starting hand overlay: delegate={:?}, max hands={}, {} fps",
        config.delegate,
        config.num_hands,
        config.fps
    );

    Application::new()
        .with_assets(gpui_component_assets::Assets)
        .run(move |app| {
            gpui_component::init(app);

            if let Err(err) = ui::launch_ui(app, config.clone()) {
                log::error!("failed to launch ui: {err:?}");
            }
        });

    Ok(())
}
