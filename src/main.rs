//! Output probe tool
//!
//! Opens the configured mode-setting device, runs topology detection on
//! both output slots, and prints what was found. Pass a JSON platform
//! config path as the first argument to override the defaults.

use std::sync::Arc;

use anyhow::Context;
use kms_output::{DrmCard, DumbBufferAllocator, OutputId, OutputManager, PlatformConfig};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    log::info!("kms-output probe v{}", env!("CARGO_PKG_VERSION"));

    let config = match std::env::args().nth(1) {
        Some(path) => {
            PlatformConfig::load(&path).with_context(|| format!("loading platform config {path}"))?
        }
        None => PlatformConfig::default(),
    };

    let card = DrmCard::open(&config.device_path)
        .with_context(|| format!("opening {}", config.device_path.display()))?;
    let allocator = Arc::new(DumbBufferAllocator::new(
        card.clone(),
        config.fb_depth,
        config.fb_bpp,
    ));

    let manager = OutputManager::new(config, allocator);
    manager.initialize_with(Box::new(card))?;

    for id in OutputId::ALL {
        if let Err(err) = manager.detect(id) {
            log::error!("detection failed on the {id} output: {err}");
            continue;
        }
        if !manager.is_connected(id) {
            println!("{id}: not connected");
            continue;
        }
        match manager.mode_info(id) {
            Some(mode) => println!("{id}: {mode}"),
            None => println!("{id}: connected, no valid mode"),
        }
        if let Some((width_mm, height_mm)) = manager.physical_size(id) {
            println!("{id}: physical size {width_mm}mm x {height_mm}mm");
        }
    }

    manager.deinitialize();
    Ok(())
}
