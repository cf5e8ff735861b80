#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod config;
mod labels;
mod model_download;
mod pipeline;
#[cfg(test)]
mod test_support;
mod types;
mod ui;
mod view;

use anyhow::Result;
use gpui::Application;

use config::AppConfig;

fn main() -> Result<()> {
    env_logger::init();

    let config = AppConfig::from_env();
    log::info!(
        "starting with cadence {}, {} Hz refresh",
        config.cadence, config.refresh_hz
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
