use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, TimeZone, Utc};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::consumption::build_consumption_data;
use crate::error::UpdateError;
use crate::models::ConsumptionData;
use crate::tallinna_vesi::{window_start, TallinnaVesiAPI};

pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(60 * 60);
/// Trailing window requested on every poll, so a baseline before local midnight is available.
pub const WINDOW_DAYS: i64 = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Fetching,
}

/// What readers of the coordinator see.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorState {
    /// Latest successfully derived snapshot; kept across failed updates.
    pub data: Arc<ConsumptionData>,
    pub phase: Phase,
    pub last_update_success: bool,
    /// Polling has stopped until the API key is replaced.
    pub reauth_required: bool,
}

/// Polls the readings of a single meter and derives consumption snapshots.
pub struct WaterDataCoordinator<Tz: TimeZone = Local> {
    api: TallinnaVesiAPI<Tz>,
    meter_number: String,
    update_interval: Duration,
}

impl<Tz> WaterDataCoordinator<Tz>
where
    Tz: TimeZone + Send + Sync + 'static,
    Tz::Offset: Send + Sync,
{
    pub fn new(api: TallinnaVesiAPI<Tz>, meter_number: &str) -> Self {
        Self {
            api,
            meter_number: meter_number.to_string(),
            update_interval: DEFAULT_UPDATE_INTERVAL,
        }
    }

    pub fn with_update_interval(mut self, update_interval: Duration) -> Self {
        self.update_interval = update_interval;
        self
    }

    pub fn meter_number(&self) -> &str {
        &self.meter_number
    }

    /// Runs one fetch-and-derive cycle.
    pub async fn refresh(&self) -> Result<ConsumptionData, UpdateError> {
        self.refresh_at(Utc::now()).await
    }

    pub async fn refresh_at(&self, now: DateTime<Utc>) -> Result<ConsumptionData, UpdateError> {
        let from = window_start(now, WINDOW_DAYS);
        let result = self
            .api
            .get_readings(&self.meter_number, Some(from))
            .await?;
        debug!(
            meter = %self.meter_number,
            n_readings = result.readings.len(),
            "Fetched smart meter readings"
        );
        Ok(build_consumption_data(
            result,
            &self.meter_number,
            self.api.timezone(),
        ))
    }

    /// Performs the first refresh and, if it succeeds, starts periodic polling.
    ///
    /// A failing first refresh is returned to the caller and nothing is spawned.
    pub async fn start(self) -> Result<CoordinatorHandle, UpdateError> {
        info!(
            meter = %self.meter_number,
            interval_secs = self.update_interval.as_secs(),
            "Starting water data coordinator"
        );
        let data = self.refresh().await?;
        info!(
            meter = %self.meter_number,
            latest_total = ?data.latest_total,
            daily_consumption = ?data.daily_consumption,
            "First refresh complete"
        );

        let (state_tx, state_rx) = watch::channel(CoordinatorState {
            data: Arc::new(data),
            phase: Phase::Idle,
            last_update_success: true,
            reauth_required: false,
        });
        // Capacity one: requests arriving while a fetch is running collapse into a single follow-up.
        let (refresh_tx, refresh_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let worker = tokio::spawn(self.run(state_tx, refresh_rx, shutdown_rx));

        Ok(CoordinatorHandle {
            state: state_rx,
            refresh: refresh_tx,
            shutdown: Some(shutdown_tx),
            worker,
        })
    }

    async fn run(
        self,
        state: watch::Sender<CoordinatorState>,
        mut refresh_requests: mpsc::Receiver<()>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        let mut ticker = interval_at(Instant::now() + self.update_interval, self.update_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!(meter = %self.meter_number, "Coordinator shutting down");
                    break;
                }
                _ = ticker.tick() => {}
                request = refresh_requests.recv() => {
                    if request.is_none() {
                        break;
                    }
                    debug!(meter = %self.meter_number, "Manual refresh requested");
                }
            }

            if !self.update(&state).await {
                break;
            }
        }
    }

    /// Runs one cycle and publishes its outcome. Returns `false` once polling must stop.
    async fn update(&self, state: &watch::Sender<CoordinatorState>) -> bool {
        state.send_modify(|current| current.phase = Phase::Fetching);

        match self.refresh().await {
            Ok(data) => {
                debug!(
                    meter = %self.meter_number,
                    latest_total = ?data.latest_total,
                    daily_consumption = ?data.daily_consumption,
                    "Published new consumption data"
                );
                state.send_replace(CoordinatorState {
                    data: Arc::new(data),
                    phase: Phase::Idle,
                    last_update_success: true,
                    reauth_required: false,
                });
                true
            }
            Err(err) if err.is_fatal() => {
                error!(meter = %self.meter_number, error = ?err, "Authentication rejected, polling stopped");
                state.send_modify(|current| {
                    current.phase = Phase::Idle;
                    current.last_update_success = false;
                    current.reauth_required = true;
                });
                false
            }
            Err(err) => {
                warn!(meter = %self.meter_number, error = ?err, "Update failed, retrying on next tick");
                state.send_modify(|current| {
                    current.phase = Phase::Idle;
                    current.last_update_success = false;
                });
                true
            }
        }
    }
}

/// Owner-side handle of a running coordinator.
pub struct CoordinatorHandle {
    state: watch::Receiver<CoordinatorState>,
    refresh: mpsc::Sender<()>,
    shutdown: Option<oneshot::Sender<()>>,
    worker: JoinHandle<()>,
}

impl CoordinatorHandle {
    pub fn data(&self) -> Arc<ConsumptionData> {
        Arc::clone(&self.state.borrow().data)
    }

    pub fn state(&self) -> CoordinatorState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CoordinatorState> {
        self.state.clone()
    }

    /// Asks for an out-of-schedule refresh. Returns `false` if the coordinator has stopped.
    pub fn request_refresh(&self) -> bool {
        match self.refresh.try_send(()) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(())) => true,
            Err(mpsc::error::TrySendError::Closed(())) => false,
        }
    }

    pub fn is_running(&self) -> bool {
        !self.worker.is_finished()
    }

    /// Stops polling, letting an in-flight request finish or time out first.
    pub async fn shutdown(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(err) = (&mut self.worker).await {
            error!("Coordinator task failed: {err}");
        }
    }
}
