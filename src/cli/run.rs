//! Handler for the `run` command.

use std::sync::Arc;
use std::time::Duration;

use tabled::{Table, Tabled};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::{output, RunArgs};
use crate::client::MemoryBroker;
use crate::config::{Config, LogFormat};
use crate::error::Result;
use crate::metrics::{MetricsCollector, Reporter, Snapshot};
use crate::pool::Pool;
use crate::worker::{ConsumerFactory, ProducerFactory};

#[derive(Tabled)]
struct SummaryRow {
    #[tabled(rename = "Metric")]
    metric: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

#[derive(Tabled)]
struct WorkerRow {
    #[tabled(rename = "Pool")]
    pool: &'static str,
    #[tabled(rename = "Worker")]
    id: usize,
    #[tabled(rename = "Rate")]
    rate: String,
}

/// Load configuration and apply command-line overrides.
///
/// # Errors
///
/// Returns an error if the file cannot be loaded or the merged result is
/// invalid.
pub fn resolve_config(args: &RunArgs) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    if let Some(producers) = args.producers {
        config.producer.workers = producers;
    }
    if let Some(consumers) = args.consumers {
        config.consumer.workers = consumers;
    }
    if let Some(duration) = args.duration {
        config.run.duration_secs = Some(duration);
    }
    if let Some(rate) = args.rate {
        config.producer.target_throughput = rate;
        config.producer.rate_limit = rate > 0;
    }
    if let Some(ref level) = args.log_level {
        config.logging.level = level.clone();
    }
    if args.json_logs {
        config.logging.format = LogFormat::Json;
    }

    config.validate()?;
    Ok(config)
}

/// Execute the run command and return the final snapshot.
///
/// # Errors
///
/// Returns an error if configuration is invalid or a pool cannot be built.
/// Shutdown problems are logged, not returned.
pub async fn execute(args: &RunArgs) -> Result<Snapshot> {
    let config = resolve_config(args)?;
    config.logging.init();

    info!(
        producers = config.producer.workers,
        consumers = config.consumer.workers,
        duration_secs = ?config.run.duration_secs,
        target_throughput = config.producer.target_throughput,
        "msgload starting"
    );

    let metrics = Arc::new(MetricsCollector::with_config(&config.metrics)?);
    let broker = MemoryBroker::new(config.broker.capacity);
    let connector = Arc::new(broker.clone());

    let producers = if config.producer.workers > 0 {
        let factory = ProducerFactory::new(connector.clone(), config.producer.clone());
        Some(Pool::build(config.producer_pool(), Arc::clone(&metrics), &factory).await?)
    } else {
        None
    };
    let consumers = if config.consumer.workers > 0 {
        let factory = ConsumerFactory::new(connector, config.consumer.clone());
        match Pool::build(config.consumer_pool(), Arc::clone(&metrics), &factory).await {
            Ok(pool) => Some(pool),
            Err(e) => {
                if let Some(producers) = &producers {
                    stop_pool("producer", producers).await;
                }
                return Err(e);
            }
        }
    } else {
        None
    };

    let shutdown = CancellationToken::new();
    // Consumers first so nothing published early is left waiting.
    for pool in consumers.iter().chain(producers.iter()) {
        pool.start(&shutdown)?;
    }

    let report_cancel = CancellationToken::new();
    let reporter = tokio::spawn(
        Reporter::from_config(Arc::clone(&metrics), &config.metrics).run(report_cancel.clone()),
    );

    match config.run.duration_secs {
        Some(secs) => {
            let budget = Duration::from_millis(config.run.warmup_ms) + Duration::from_secs(secs);
            tokio::select! {
                _ = tokio::time::sleep(budget) => info!("run duration elapsed"),
                _ = signal::ctrl_c() => info!("Shutdown signal received"),
            }
        }
        None => {
            if let Err(e) = signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for shutdown signal");
            }
            info!("Shutdown signal received");
        }
    }

    // Stop producers before consumers.
    let rates = worker_rows(producers.as_ref(), consumers.as_ref());
    if let Some(pool) = &producers {
        stop_pool("producer", pool).await;
    }
    if let Some(pool) = &consumers {
        stop_pool("consumer", pool).await;
    }
    shutdown.cancel();
    report_cancel.cancel();

    let snapshot = match reporter.await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            warn!(error = %e, "reporter task failed");
            metrics.snapshot()
        }
    };

    info!(
        sent = snapshot.messages_sent,
        received = snapshot.messages_received,
        failed = snapshot.messages_failed,
        backlog = broker.depth(),
        "msgload stopped"
    );
    print_summary(&snapshot, broker.depth(), rates);
    Ok(snapshot)
}

async fn stop_pool(name: &str, pool: &Pool) {
    if let Err(e) = pool.stop().await {
        warn!(pool = name, error = %e, "pool did not stop cleanly");
    }
}

fn worker_rows(producers: Option<&Pool>, consumers: Option<&Pool>) -> Vec<WorkerRow> {
    let mut rows = Vec::new();
    for (name, pool) in [("producer", producers), ("consumer", consumers)] {
        let Some(pool) = pool else { continue };
        rows.extend(pool.worker_rates().into_iter().map(|(id, rate)| WorkerRow {
            pool: name,
            id,
            // Workers without a live-adjustable rate show a dash.
            rate: rate.map_or_else(|| "-".into(), output::rate),
        }));
    }
    rows
}

fn print_summary(snapshot: &Snapshot, backlog: usize, workers: Vec<WorkerRow>) {
    let latency = &snapshot.latency;
    let rows = vec![
        SummaryRow {
            metric: "Elapsed",
            value: format!("{:.2} s", snapshot.elapsed.as_secs_f64()),
        },
        SummaryRow {
            metric: "Sent",
            value: snapshot.messages_sent.to_string(),
        },
        SummaryRow {
            metric: "Received",
            value: snapshot.messages_received.to_string(),
        },
        SummaryRow {
            metric: "Acked",
            value: snapshot.messages_acked.to_string(),
        },
        SummaryRow {
            metric: "Failed",
            value: snapshot.messages_failed.to_string(),
        },
        SummaryRow {
            metric: "Backlog",
            value: backlog.to_string(),
        },
        SummaryRow {
            metric: "Avg send rate",
            value: format!("{:.1} msg/s", snapshot.average_send_rate()),
        },
        SummaryRow {
            metric: "Avg receive rate",
            value: format!("{:.1} msg/s", snapshot.average_receive_rate()),
        },
        SummaryRow {
            metric: "Bytes sent",
            value: snapshot.bytes_sent.to_string(),
        },
        SummaryRow {
            metric: "Latency p50/p95/p99",
            value: format!(
                "{:.3} / {:.3} / {:.3} ms",
                latency.p50, latency.p95, latency.p99
            ),
        },
        SummaryRow {
            metric: "Latency min/max",
            value: format!("{:.3} / {:.3} ms", latency.min, latency.max),
        },
    ];

    output::section("Summary");
    println!("{}", Table::new(rows));
    if !workers.is_empty() {
        output::section("Workers");
        println!("{}", Table::new(workers));
    }
    if snapshot.messages_failed > 0 {
        output::warn(&format!("{} operations failed", snapshot.messages_failed));
    }
}
