use anyhow::Context;
use chrono::Local;
use tallinnavesi_water::{
    config::Config,
    diagnostics::Diagnostics,
    discovery::{discover_meters, select_meter, MeterCandidate},
    home_assistant::HomeAssistantAPI,
    sensor::sensor_states,
    tallinna_vesi::TallinnaVesiAPI,
    water_coordinator::{CoordinatorState, Phase, WaterDataCoordinator},
};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    info!("Starting Tallinna Vesi water bridge");
    let config = Config::from_env()?;

    // One transport for every request made by this process.
    let client = reqwest::Client::new();
    let api =
        TallinnaVesiAPI::with_base_url(client.clone(), &config.base_url, &config.api_key, Local);

    let meter = match &config.meter_number {
        Some(meter_number) => MeterCandidate {
            supply_point_id: None,
            meter_number: Some(meter_number.clone()),
            address: None,
        },
        None => {
            let candidates = discover_meters(&api).await?;
            select_meter(&candidates, None)
                .context("Set TALLINNAVESI_METER_NUMBER to pick the meter to poll")?
        }
    };
    let meter_number = meter
        .meter_number
        .clone()
        .context("Selected supply point has no meter number")?;
    info!(meter = %meter_number, name = %meter.display_name(), "Polling smart meter");

    let coordinator = WaterDataCoordinator::new(api, &meter_number)
        .with_update_interval(config.update_interval);
    let handle = coordinator
        .start()
        .await
        .context("Initial refresh of the water readings failed")?;
    tokio::spawn(log_diagnostics(handle.subscribe()));

    let home_assistant = HomeAssistantAPI::with_connection(
        client,
        config.home_assistant_url.as_deref().unwrap_or_default(),
        &config.home_assistant_token,
    );
    if home_assistant.is_configured() {
        tokio::spawn(publish_states(
            home_assistant,
            config.clone(),
            meter.clone(),
            handle.subscribe(),
        ));
    } else {
        warn!("HA_URL not set, sensor states are not published");
    }

    let mut updates = handle.subscribe();
    let worker_lost = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested");
            false
        }
        result = updates.wait_for(|state| state.reauth_required) => match result {
            Ok(_) => {
                error!("Tallinna Vesi rejected the API key, update TALLINNAVESI_API_KEY and restart");
                false
            }
            Err(_) => {
                error!("Coordinator stopped unexpectedly");
                true
            }
        },
    };

    let reauth_required = handle.state().reauth_required;
    handle.shutdown().await;
    if reauth_required {
        anyhow::bail!("Re-authentication required");
    }
    if worker_lost {
        anyhow::bail!("Coordinator task exited");
    }
    Ok(())
}

/// Logs diagnostics after every successful refresh.
async fn log_diagnostics(mut updates: watch::Receiver<CoordinatorState>) {
    loop {
        let diagnostics = Diagnostics::after_refresh(&updates.borrow_and_update());
        if let Some(diagnostics) = diagnostics {
            debug!(diagnostics = %diagnostics.to_json(), "Refresh complete");
        }
        if updates.changed().await.is_err() {
            break;
        }
    }
}

/// Pushes both sensors to Home Assistant every time the coordinator publishes.
async fn publish_states(
    home_assistant: HomeAssistantAPI,
    config: Config,
    meter: MeterCandidate,
    mut updates: watch::Receiver<CoordinatorState>,
) {
    loop {
        let state = updates.borrow_and_update().clone();
        if state.phase == Phase::Idle {
            for (key, sensor) in sensor_states(&meter, &state) {
                let entity_id = config.entity_id(key);
                match home_assistant.publish_state(&entity_id, &sensor).await {
                    Ok(()) => info!(entity_id = %entity_id, state = %sensor.state, "Published sensor"),
                    Err(e) => warn!(entity_id = %entity_id, "Failed to publish sensor: {e:?}"),
                }
            }
        }
        if updates.changed().await.is_err() {
            break;
        }
    }
}
