//! Failure taxonomy and retry policy.
//!
//! Every failed attempt is classified into a [`FailureClass`]; the class and
//! the attempt number decide whether the queue message is requeued.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Why a job attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// Source is missing, unreadable, corrupt, or at an unsupported location.
    Input,
    /// Engine crashed, exited abnormally, ran out of resources, or timed out.
    TransientEngine,
    /// Destination could not be written.
    OutputWrite,
    /// Worker glue failed in a way a retry will not fix.
    Internal,
}

impl FailureClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::TransientEngine => "transient_engine",
            Self::OutputWrite => "output_write",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailureClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "input" => Ok(Self::Input),
            "transient_engine" => Ok(Self::TransientEngine),
            "output_write" => Ok(Self::OutputWrite),
            "internal" => Ok(Self::Internal),
            other => Err(format!("unknown failure class: {}", other)),
        }
    }
}

/// A classified failure with a human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub class: FailureClass,
    pub reason: String,
}

impl Failure {
    pub fn new(class: FailureClass, reason: impl Into<String>) -> Self {
        Self {
            class,
            reason: reason.into(),
        }
    }

    pub fn input(reason: impl Into<String>) -> Self {
        Self::new(FailureClass::Input, reason)
    }

    pub fn transient(reason: impl Into<String>) -> Self {
        Self::new(FailureClass::TransientEngine, reason)
    }

    pub fn output_write(reason: impl Into<String>) -> Self {
        Self::new(FailureClass::OutputWrite, reason)
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::new(FailureClass::Internal, reason)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.class, self.reason)
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum delivery attempts for transient engine failures.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Maximum delivery attempts for output write failures.
    #[serde(default = "default_output_write_max_attempts")]
    pub output_write_max_attempts: u32,

    /// Initial delay before a requeued job becomes available, in seconds.
    #[serde(default = "default_initial_delay")]
    pub initial_delay_secs: u64,

    /// Maximum delay between retries in seconds.
    #[serde(default = "default_max_delay")]
    pub max_delay_secs: u64,

    /// Exponential backoff multiplier.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_output_write_max_attempts() -> u32 {
    2
}

fn default_initial_delay() -> u64 {
    60
}

fn default_max_delay() -> u64 {
    3600 // 1 hour
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            output_write_max_attempts: default_output_write_max_attempts(),
            initial_delay_secs: default_initial_delay(),
            max_delay_secs: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetryConfig {
    /// Retries immediately, used by tests and local tooling.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay_secs: 0,
            max_delay_secs: 0,
            ..Self::default()
        }
    }

    /// Whether a failure on the given attempt should be requeued.
    pub fn should_retry(&self, class: FailureClass, attempt: u32) -> bool {
        match class {
            FailureClass::Input | FailureClass::Internal => false,
            FailureClass::TransientEngine => attempt < self.max_attempts,
            FailureClass::OutputWrite => {
                attempt < self.output_write_max_attempts.min(self.max_attempts)
            }
        }
    }

    /// Delay before a job that failed on `attempt` becomes available again.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let secs = self.initial_delay_secs as f64 * self.backoff_multiplier.powi(exponent);
        let capped = secs.min(self.max_delay_secs as f64).max(0.0);
        Duration::from_secs_f64(capped)
    }
}
