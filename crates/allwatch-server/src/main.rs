//! allwatch server - runs the watch coordinator over an in-memory model.
//!
//! The model is seeded with machines, two related applications and their
//! units, then mutated on an interval. Demo watchers log every batch they
//! receive.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use allwatch_core::{
    kind, new_shared_registry, AnnotationInfo, ApplicationInfo, EntityId, Life, MachineInfo,
    MemoryBacking, RawChange, RelationInfo, SharedInfo, StatusInfo, UnitInfo,
};
use allwatch_server::{start_feed, Args, Coordinator, Error, FeedHandle, ServerConfig, Watcher};

const APPLICATIONS: [(&str, &str); 2] = [
    ("mysql", "ch:amd64/mysql-58"),
    ("wordpress", "ch:amd64/wordpress-12"),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "allwatch_server=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting allwatch server");

    let config = Args::parse().into_config();
    tracing::info!(
        machines = config.machines,
        units = config.units_per_application,
        watchers = config.watchers,
        churn_interval = ?config.churn_interval,
        "configuration loaded"
    );

    let backing = Arc::new(seed_model(&config));
    let metrics = new_shared_registry();
    let (coordinator, task) =
        Coordinator::start(backing.clone(), config.coordinator.clone(), metrics.clone()).await?;
    let feed = start_feed(
        backing.clone(),
        coordinator.clone(),
        config.coordinator.feed_buffer,
    );

    let mut watchers = Vec::with_capacity(config.watchers);
    for _ in 0..config.watchers {
        let watcher = Arc::new(coordinator.subscribe());
        tokio::spawn(log_batches(watcher.clone()));
        watchers.push(watcher);
    }

    let churn = config.churn_interval.map(|interval| {
        tokio::spawn(churn_model(
            backing.clone(),
            feed.clone(),
            interval,
            config.machines,
        ))
    });

    tracing::info!("server ready");
    let run_for = config.run_for;
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "failed to listen for ctrl+c");
            }
            tracing::info!("received shutdown signal");
        }
        _ = async {
            match run_for {
                Some(duration) => tokio::time::sleep(duration).await,
                None => std::future::pending::<()>().await,
            }
        } => {
            tracing::info!("run duration elapsed");
        }
    }

    if let Some(churn) = churn {
        churn.abort();
    }
    for watcher in &watchers {
        watcher.stop();
    }

    match coordinator.stats().await {
        Ok(stats) => tracing::info!(?stats, "final coordinator state"),
        Err(e) => tracing::warn!(error = %e, "coordinator unavailable at shutdown"),
    }
    println!("{}", metrics.to_prometheus());

    drop(watchers);
    drop(feed);
    drop(coordinator);
    match task.await? {
        Ok(()) => tracing::info!("server shutdown complete"),
        Err(e) => {
            tracing::error!(error = %e, "coordinator failed");
            return Err(e.into());
        }
    }

    Ok(())
}

/// Build the initial model.
fn seed_model(config: &ServerConfig) -> MemoryBacking {
    let backing = MemoryBacking::new();

    for n in 0..config.machines {
        let id = n.to_string();
        backing.put(Arc::new(
            MachineInfo::new(&id).with_instance_id(format!("i-{:04}", n)),
        ));
        backing.put(Arc::new(StatusInfo::new(format!("m#{}", id), "started", "")));
    }

    for (application, charm) in APPLICATIONS {
        backing.put(Arc::new(ApplicationInfo::new(application, charm)));
        for n in 0..config.units_per_application {
            let unit = UnitInfo::new(application, n as u32);
            let unit = match config.machines {
                0 => unit,
                machines => unit.on_machine((n % machines).to_string()),
            };
            backing.put(Arc::new(unit));
        }
    }

    backing.put(Arc::new(RelationInfo::new(
        0,
        vec!["wordpress:db".to_string(), "mysql:server".to_string()],
    )));
    backing.put(Arc::new(
        AnnotationInfo::new("machine-0").with("owner", "ops"),
    ));

    tracing::info!(entities = backing.len(), "model seeded");
    backing
}

/// Log every batch a watcher receives until it stops.
async fn log_batches(watcher: Arc<Watcher>) {
    loop {
        match watcher.next().await {
            Ok(batch) => {
                let revno = batch.last().map(|delta| delta.revno).unwrap_or_default();
                tracing::info!(
                    watcher_id = watcher.id(),
                    deltas = batch.len(),
                    revno,
                    "batch received"
                );
                tracing::debug!(
                    watcher_id = watcher.id(),
                    batch = %serde_json::to_string(&batch).unwrap_or_default(),
                    "batch contents"
                );
            }
            Err(Error::Stopped) => {
                tracing::debug!(watcher_id = watcher.id(), "watcher stopped");
                return;
            }
            Err(e) => {
                tracing::error!(watcher_id = watcher.id(), error = %e, "watcher failed");
                return;
            }
        }
    }
}

/// Mutate the model on an interval and report each mutation to the feed.
async fn churn_model(
    backing: Arc<MemoryBacking>,
    feed: FeedHandle,
    interval: Duration,
    machines: usize,
) {
    let mut rng = StdRng::from_entropy();
    let mut next_machine = machines;
    let mut ticker = tokio::time::interval(interval);

    loop {
        ticker.tick().await;

        let change = match rng.gen_range(0..4) {
            0 => {
                let id = next_machine.to_string();
                next_machine += 1;
                backing.put(Arc::new(MachineInfo::new(&id)));
                RawChange::new("machines", id)
            }
            1 => match pick(&backing, kind::MACHINE, &mut rng) {
                Some(id) => {
                    backing.remove(&id);
                    RawChange::new("machines", id.id)
                }
                None => continue,
            },
            2 => match pick(&backing, kind::MACHINE, &mut rng) {
                Some(id) => {
                    let life = if rng.gen_bool(0.5) { Life::Alive } else { Life::Dying };
                    let info: SharedInfo = Arc::new(
                        MachineInfo::new(&id.id)
                            .with_instance_id(format!("i-{:04}", rng.gen_range(0..10_000)))
                            .with_life(life),
                    );
                    backing.put(info);
                    RawChange::new("machines", id.id)
                }
                None => continue,
            },
            _ => match pick(&backing, kind::UNIT, &mut rng) {
                Some(id) => {
                    let status = if rng.gen_bool(0.8) { "active" } else { "error" };
                    let key = format!("u#{}", id.id);
                    backing.put(Arc::new(StatusInfo::new(&key, status, "")));
                    RawChange::new("statuses", key)
                }
                None => continue,
            },
        };

        if feed.send(change).await.is_err() {
            tracing::warn!("change feed closed, churn stopping");
            return;
        }
    }
}

fn pick(backing: &MemoryBacking, kind: &str, rng: &mut StdRng) -> Option<EntityId> {
    let ids = backing.ids_of_kind(kind);
    if ids.is_empty() {
        return None;
    }
    Some(ids[rng.gen_range(0..ids.len())].clone())
}
