//! The cycle scheduler: one recurring job per cadence.
//!
//! Each cycle kind runs in its own interval task, so a kind can never
//! overlap itself (`MissedTickBehavior::Delay` pushes late ticks back
//! instead of bursting), while different kinds overlap freely. A failed
//! cycle is logged; the next tick still fires.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use haystack_common::types::{CycleKind, RunKind};
use haystack_common::Config;

use crate::pipeline::Pipeline;

const DEEP_SCRAPE_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);

pub struct CycleScheduler {
    jobs: Vec<(CycleKind, JoinHandle<()>)>,
}

impl CycleScheduler {
    /// Spawn all configured cycle jobs. The social cycle only runs when
    /// content aggregation is enabled.
    pub fn start(pipeline: Arc<Pipeline>, config: &Config) -> Self {
        let minutes = |m: u64| Duration::from_secs(m * 60);
        let mut jobs = vec![
            (
                CycleKind::Main,
                spawn_cycle(
                    pipeline.clone(),
                    CycleKind::Main,
                    minutes(config.main_poll_interval_minutes),
                ),
            ),
            (
                CycleKind::Weather,
                spawn_cycle(
                    pipeline.clone(),
                    CycleKind::Weather,
                    minutes(config.weather_poll_interval_minutes),
                ),
            ),
            (
                CycleKind::DeepScrape,
                spawn_cycle(pipeline.clone(), CycleKind::DeepScrape, DEEP_SCRAPE_INTERVAL),
            ),
            (
                CycleKind::Tips,
                spawn_cycle(
                    pipeline.clone(),
                    CycleKind::Tips,
                    minutes(config.tip_poll_interval_minutes),
                ),
            ),
        ];

        if config.content_aggregation_enabled {
            jobs.push((
                CycleKind::Social,
                spawn_cycle(
                    pipeline,
                    CycleKind::Social,
                    minutes(config.social_poll_interval_minutes),
                ),
            ));
        }

        info!(
            jobs = jobs.len(),
            main_interval = format!("{}m", config.main_poll_interval_minutes),
            weather_interval = format!("{}m", config.weather_poll_interval_minutes),
            tips_interval = format!("{}m", config.tip_poll_interval_minutes),
            "scheduler started"
        );

        Self { jobs }
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    pub fn cycles(&self) -> Vec<CycleKind> {
        self.jobs.iter().map(|(kind, _)| *kind).collect()
    }

    /// Stop all jobs. In-flight cycles are aborted at their next await.
    pub fn stop(self) {
        for (kind, handle) in self.jobs {
            handle.abort();
            info!(cycle = %kind, "cycle job stopped");
        }
        info!("scheduler stopped");
    }
}

fn spawn_cycle(pipeline: Arc<Pipeline>, kind: CycleKind, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of a tokio interval completes immediately; skip
        // it so each cycle first fires one period after boot.
        interval.tick().await;

        loop {
            interval.tick().await;
            info!(cycle = %kind, "cycle start");
            match pipeline.run_cycle(RunKind::Scheduled, kind).await {
                Ok(state) => {
                    info!(
                        cycle = %kind,
                        articles = state.stats.raw_count,
                        field_notes = state.stats.field_notes_created,
                        "cycle complete"
                    );
                }
                Err(e) => {
                    error!(cycle = %kind, error = %e, "cycle failed");
                }
            }
        }
    })
}
