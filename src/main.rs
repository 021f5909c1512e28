mod average;
mod config;
mod cycle;
mod indicator;
mod models;
mod network;
mod publish;
mod sampler;
mod scheduler;
mod sensors;
mod utils;

#[cfg(test)]
mod testing;

use log::{error, info, warn};
use std::time::Duration;
use tokio::time::sleep;

use config::AgentConfig;
use cycle::{Capabilities, CycleController, CycleState, DueFlag, PollOutcome};
use indicator::{NoIndicator, StatusIndicator, SysfsLed};
use network::LinkMonitor;
use publish::HttpTransport;
use scheduler::CycleScheduler;
use sensors::{IioBme280, Sds011};
use utils::resolve_device_id;

async fn main_loop(
    mut controller: CycleController,
    poll_interval: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting air quality publishing service");

    loop {
        match controller.poll().await {
            PollOutcome::Completed(report) => {
                if report.averages.is_none() && report.climate.is_none() {
                    warn!("No data collected during this cycle!");
                }
            }
            PollOutcome::Reconnecting(_) | PollOutcome::NotDue => {}
        }
        debug_assert_eq!(controller.state(), CycleState::Idle);

        sleep(poll_interval).await;
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_timestamp_secs()
        .init();

    // Load configuration
    let config = match AgentConfig::new() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    let device_id = resolve_device_id(config.device_id.as_deref());
    info!("Device ID = {}", device_id);

    // Bring up the particulate sensor in query mode
    let mut sds = match Sds011::open(&config.sds011_port) {
        Ok(sds) => sds,
        Err(e) => {
            error!("Failed to open SDS011 on {}: {}", config.sds011_port, e);
            return Err(e.into());
        }
    };
    if let Err(e) = sds.init().await {
        warn!("SDS011 initialisation incomplete: {}", e);
    }

    let indicator: Box<dyn StatusIndicator> = match &config.status_led {
        Some(name) => Box::new(SysfsLed::new(name)),
        None => Box::new(NoIndicator::default()),
    };

    let capabilities = Capabilities {
        particulate: Box::new(sds),
        climate: Box::new(IioBme280::new(&config.bme280_path)),
        network: Box::new(LinkMonitor::new(
            &config.network_interface,
            config.wifi_connection.clone(),
        )),
        transport: Box::new(HttpTransport::new(config.http_timeout)?),
        indicator,
    };

    // First cycle runs as soon as the link is up
    let due = DueFlag::new(true);
    let controller = CycleController::new(&config, &device_id, due.clone(), capabilities)?;
    let scheduler = CycleScheduler::spawn(config.publish_interval, due);

    // Handle Ctrl+C gracefully
    let (tx, mut rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for Ctrl+C");
        let _ = tx.send(());
    });

    // Run main loop or wait for shutdown signal
    tokio::select! {
        result = main_loop(controller, config.poll_interval) => {
            match result {
                Ok(_) => info!("Program completed successfully"),
                Err(e) => error!("Fatal error: {}", e),
            }
        }
        _ = &mut rx => {
            info!("Program terminated by user. Exiting gracefully.");
        }
    }

    scheduler.stop();
    Ok(())
}
