use std::{path::Path, sync::Arc, time::Duration};

use {
    anyhow::Result,
    cadence_batch::{BatchScheduler, BatchSupervisor, HttpBrokerClient, IngestionScheduler},
    cadence_config::CadenceConfig,
    cadence_metrics::{MetricsRecorderConfig, init_metrics},
    tokio::time::{Interval, MissedTickBehavior},
    tracing::{info, warn},
};

use crate::jobs;

/// Schedule every job in `jobs_path` and run until interrupted, printing a
/// JSON status report per job every `status.interval_secs`.
pub async fn run(config: CadenceConfig, jobs_path: &Path) -> Result<()> {
    let jobs = jobs::load_jobs(jobs_path)?;
    if jobs.is_empty() {
        warn!(path = %jobs_path.display(), "job list is empty");
    }

    let metrics = init_metrics(MetricsRecorderConfig {
        enabled: config.metrics.enabled,
        global_labels: config.metrics.labels.clone().into_iter().collect(),
    })?;

    let broker = HttpBrokerClient::new(&config.broker)?;
    info!(endpoint = broker.endpoint(), "using broker");
    let scheduler = BatchScheduler::new(Arc::new(broker), &config.scheduler);
    let shared: Arc<dyn IngestionScheduler> = Arc::new(scheduler.clone());

    let supervisors: Vec<BatchSupervisor> = jobs
        .iter()
        .map(|job| job.create_supervisor(Arc::clone(&shared)))
        .collect();
    for supervisor in &supervisors {
        supervisor.start().await;
    }
    info!(jobs = supervisors.len(), "batch runner started");

    let mut ticker = (config.status.interval_secs > 0).then(|| {
        let mut interval = tokio::time::interval(Duration::from_secs(config.status.interval_secs));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            res = &mut shutdown => {
                res?;
                info!("shutdown requested");
                break;
            },
            () = next_tick(&mut ticker) => report(&supervisors).await?,
        }
    }

    for supervisor in &supervisors {
        supervisor.stop(false).await;
    }
    scheduler.shutdown();

    let rendered = metrics.render();
    if !rendered.is_empty() {
        println!("{rendered}");
    }
    Ok(())
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        },
        None => std::future::pending().await,
    }
}

async fn report(supervisors: &[BatchSupervisor]) -> Result<()> {
    for supervisor in supervisors {
        let report = supervisor.status().await;
        println!("{}", serde_json::to_string(&report)?);
    }
    Ok(())
}
