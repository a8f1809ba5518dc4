//! Diagnostics for failures the tick loop survives.

use std::any::Any;
use std::backtrace::Backtrace;
use std::collections::HashMap;

use tracing::{error, warn};

use super::physics::ObjectId;
use crate::error::LocomotionError;

/// Logs a panic caught around one avatar's tick phase.
///
/// Besides string payloads, a panic raised with `std::panic::panic_any` carrying a
/// [`LocomotionError`] is reported through its message.
pub fn log_panic(avatar: ObjectId, phase: &str, payload: &(dyn Any + Send)) {
    let message = if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else if let Some(err) = payload.downcast_ref::<LocomotionError>() {
        err.to_string()
    } else {
        "opaque panic payload".to_string()
    };
    let backtrace = Backtrace::force_capture();
    error!(avatar = %avatar, phase, panic = %message, "avatar tick panicked; parking it\n{backtrace}");
}

/// Caps how often the same anomaly is reported for one avatar.
#[derive(Debug, Default)]
pub struct WarnLimiter {
    counts: HashMap<&'static str, u32>,
}

impl WarnLimiter {
    const MAX_REPORTS: u32 = 3;

    /// Logs `reason` unless it was already reported the maximum number of times.
    /// Returns whether it was logged.
    pub fn warn_once(&mut self, avatar: ObjectId, reason: &'static str) -> bool {
        let count = self.counts.entry(reason).or_insert(0);
        if *count < Self::MAX_REPORTS {
            *count += 1;
            warn!(avatar = %avatar, "{reason}");
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_panic_accepts_any_payload() {
        let payloads: Vec<Box<dyn Any + Send>> = vec![
            Box::new("boom"),
            Box::new(String::from("owned boom")),
            Box::new(LocomotionError::NoStrategyBound(ObjectId(3))),
            Box::new(42_u32),
        ];
        for payload in &payloads {
            log_panic(ObjectId(3), "pre-step", payload.as_ref());
        }
    }

    #[test]
    fn test_limiter_stops_after_three_reports() {
        let mut limiter = WarnLimiter::default();
        let logged = (0..10)
            .filter(|_| limiter.warn_once(ObjectId(1), "non-finite velocity"))
            .count();
        assert_eq!(logged, 3);
        assert!(limiter.warn_once(ObjectId(1), "missing subworld"));
    }
}
