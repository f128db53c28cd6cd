//! Event system for the acquisition layer.
//!
//! Provides hooks for logging and custom reactions around attempts, strategy
//! exhaustion, proxy cooldowns, and validation sweeps.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

use crate::core::types::FetchAttempt;

#[derive(Debug, Clone)]
pub struct StrategyExhaustedEvent {
    pub target: String,
    pub strategy: &'static str,
    pub attempts: u32,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CooldownEvent {
    pub endpoint: String,
    pub failures: u64,
    pub cooldown: Duration,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ValidationEvent {
    pub total: usize,
    pub healthy: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CompletedEvent {
    pub target: String,
    pub strategy: &'static str,
    pub latency: Duration,
    pub challenge_detected: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum AcquisitionEvent {
    Attempt(FetchAttempt),
    StrategyExhausted(StrategyExhaustedEvent),
    Cooldown(CooldownEvent),
    Validation(ValidationEvent),
    Completed(CompletedEvent),
}

/// Trait implemented by event handlers.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &AcquisitionEvent);
}

/// Dispatcher that broadcasts events to registered handlers.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self { handlers: Vec::new() }
    }

    pub fn register_handler(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    pub fn dispatch(&self, event: AcquisitionEvent) {
        for handler in &self.handlers {
            handler.handle(&event);
        }
    }
}

/// Logs events using the `log` crate.
#[derive(Debug)]
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn handle(&self, event: &AcquisitionEvent) {
        match event {
            AcquisitionEvent::Attempt(attempt) => {
                log::debug!(
                    "{} attempt {} for {} via {} -> {} ({:.2}s)",
                    attempt.strategy,
                    attempt.attempt + 1,
                    attempt.target,
                    attempt.endpoint.as_deref().unwrap_or("direct"),
                    attempt.outcome,
                    attempt.elapsed.as_secs_f64()
                );
            }
            AcquisitionEvent::StrategyExhausted(exhausted) => {
                log::warn!(
                    "strategy {} exhausted for {} after {} attempt(s): {}",
                    exhausted.strategy,
                    exhausted.target,
                    exhausted.attempts,
                    exhausted.reason
                );
            }
            AcquisitionEvent::Cooldown(cooldown) => {
                log::warn!(
                    "proxy {} benched for {}s after {} failures",
                    cooldown.endpoint,
                    cooldown.cooldown.as_secs(),
                    cooldown.failures
                );
            }
            AcquisitionEvent::Validation(validation) => {
                log::info!(
                    "proxy validation: {}/{} healthy",
                    validation.healthy,
                    validation.total
                );
            }
            AcquisitionEvent::Completed(done) => {
                log::info!(
                    "fetched {} via {} in {:.2}s{}",
                    done.target,
                    done.strategy,
                    done.latency.as_secs_f64(),
                    if done.challenge_detected { " (challenge hints present)" } else { "" }
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingHandler(std::sync::Mutex<usize>);

    impl EventHandler for CountingHandler {
        fn handle(&self, _event: &AcquisitionEvent) {
            *self.0.lock().unwrap() += 1;
        }
    }

    #[test]
    fn dispatches_to_handlers() {
        let mut dispatcher = EventDispatcher::new();
        let counter = Arc::new(CountingHandler(std::sync::Mutex::new(0)));
        dispatcher.register_handler(counter.clone());
        dispatcher.register_handler(Arc::new(LoggingHandler));
        dispatcher.dispatch(AcquisitionEvent::Validation(ValidationEvent {
            total: 4,
            healthy: 2,
            timestamp: Utc::now(),
        }));
        assert_eq!(*counter.0.lock().unwrap(), 1);
    }
}
