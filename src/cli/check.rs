//! Configuration validation command.

use std::path::Path;

use crate::cli::output;
use crate::config::Config;
use crate::error::Result;

/// Load and validate a configuration file without running anything.
///
/// # Errors
///
/// Returns the load or validation error; the caller decides the exit code.
pub fn execute_config<P: AsRef<Path>>(config_path: P) -> Result<()> {
    let path = config_path.as_ref();
    println!("Checking configuration: {}", path.display());

    let config = match Config::load(path) {
        Ok(config) => config,
        Err(e) => {
            output::error(&format!("Configuration is invalid: {e}"));
            return Err(e);
        }
    };
    output::ok("Configuration is valid");

    output::section("Producers");
    output::key_value("Workers", config.producer.workers);
    output::key_value("Message size", format!("{} B", config.producer.message_size));
    output::key_value("Batch size", config.producer.batch_size);
    output::key_value("Payload", format!("{:?}", config.producer.payload));
    let pool = config.producer_pool();
    match pool.rate_share(pool.workers.max(1)) {
        Some(share) => output::key_value(
            "Target",
            format!("{} msg/s ({share:.1} per worker)", pool.target_throughput),
        ),
        None => output::key_value("Target", "unlimited"),
    }

    output::section("Consumers");
    output::key_value("Workers", config.consumer.workers);
    output::key_value(
        "Receive timeout",
        format!("{} ms", config.consumer.receive_timeout_ms),
    );
    output::key_value("Rate per worker", output::rate(config.consumer.rate_limit));

    output::section("Run");
    match config.run.duration_secs {
        Some(secs) => output::key_value("Duration", format!("{secs} s")),
        None => output::key_value("Duration", "until interrupted"),
    }
    output::key_value("Warm-up", format!("{} ms", config.run.warmup_ms));
    output::key_value("Histogram", format!("{:?}", config.metrics.histogram));
    output::key_value("Broker capacity", config.broker.capacity);

    if config.producer.workers == 0 || config.consumer.workers == 0 {
        println!();
        output::warn("Only one role is configured; the broker will fill or stay empty");
    }
    Ok(())
}
