use super::{types::Config, ConfigError};

fn invalid(message: &str) -> Result<(), ConfigError> {
    Err(ConfigError::ValidationError(message.to_string()))
}

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Worker concurrency, encode limit and shutdown timeout are not 0
/// - Retry attempt caps are not 0
/// - Lease outlives several poll intervals
/// - Webhook URL, when set, is http(s)
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return invalid("server.port cannot be 0");
    }

    if config.worker.concurrency == 0 {
        return invalid("worker.concurrency must be at least 1");
    }
    if config.worker.max_encode_secs == 0 {
        return invalid("worker.max_encode_secs cannot be 0");
    }
    if config.worker.shutdown_timeout_secs == 0 {
        return invalid("worker.shutdown_timeout_secs cannot be 0");
    }

    if config.retry.max_attempts == 0 {
        return invalid("retry.max_attempts must be at least 1");
    }
    if config.retry.output_write_max_attempts == 0 {
        return invalid("retry.output_write_max_attempts must be at least 1");
    }
    if config.retry.backoff_multiplier < 1.0 {
        return invalid("retry.backoff_multiplier must be at least 1.0");
    }

    if config.queue.visibility_timeout_secs == 0 {
        return invalid("queue.visibility_timeout_secs cannot be 0");
    }
    if config.queue.poll_interval_ms == 0 {
        return invalid("queue.poll_interval_ms cannot be 0");
    }
    // Heartbeats renew at a third of the lease
    if config.queue.visibility_timeout_secs * 1000 < config.queue.poll_interval_ms * 3 {
        return invalid("queue.visibility_timeout_secs must be at least 3x queue.poll_interval_ms");
    }

    if config.notifier.timeout_secs == 0 {
        return invalid("notifier.timeout_secs cannot be 0");
    }
    if let Some(url) = &config.notifier.webhook_url {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return invalid("notifier.webhook_url must be an http(s) URL");
        }
    }

    Ok(())
}
