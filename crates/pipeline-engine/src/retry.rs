//! Bounded retry loop
//!
//! Runs a body, asks a predicate whether the result is acceptable, and runs
//! the body again while the predicate says `retry` and attempts remain.
//! This is how validate-and-regenerate flows are expressed without a cycle
//! in the graph.

use std::future::Future;

use serde_json::Value;

use crate::error::{EngineError, Result};

/// Predicate verdict for one attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Ok,
    Retry,
    Fail,
}

impl RetryDecision {
    /// Read a verdict from a predicate result: `"ok"`, `"retry"`, `"fail"`,
    /// or an object carrying one of those under `status`
    pub fn from_value(value: &Value) -> Result<Self> {
        let status = match value {
            Value::String(s) => s.as_str(),
            Value::Object(map) => map
                .get("status")
                .and_then(Value::as_str)
                .ok_or_else(|| EngineError::failed("retry predicate result has no 'status'"))?,
            other => {
                return Err(EngineError::failed(format!(
                    "retry predicate returned {}, expected a status",
                    other
                )))
            }
        };

        match status.trim().to_ascii_lowercase().as_str() {
            "ok" => Ok(Self::Ok),
            "retry" => Ok(Self::Retry),
            "fail" => Ok(Self::Fail),
            other => Err(EngineError::failed(format!(
                "unknown retry status '{}'",
                other
            ))),
        }
    }
}

/// Accepted result of a retry loop
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOutcome<T> {
    pub value: T,
    /// Attempts used, including the accepted one
    pub attempts: u32,
}

/// Retry combinator with a fixed attempt budget
#[derive(Debug, Clone, Copy)]
pub struct RetryLoop {
    max_attempts: u32,
}

impl RetryLoop {
    /// Loop allowing `max_attempts` runs (at least one)
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    /// Loop allowing `requested` runs, but never more than `cap`
    pub fn capped(requested: u32, cap: u32) -> Self {
        if requested > cap {
            log::debug!("Retry budget {} capped to {}", requested, cap);
        }
        Self::new(requested.min(cap))
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run `body(attempt)` with 1-based attempts until `predicate` accepts.
    ///
    /// Errors from the body or the predicate end the loop immediately.
    pub async fn run<T, B, BFut, P, PFut>(&self, mut body: B, mut predicate: P) -> Result<RetryOutcome<T>>
    where
        T: Clone,
        B: FnMut(u32) -> BFut,
        BFut: Future<Output = Result<T>>,
        P: FnMut(T, u32) -> PFut,
        PFut: Future<Output = Result<RetryDecision>>,
    {
        for attempt in 1..=self.max_attempts {
            let value = body(attempt).await?;
            match predicate(value.clone(), attempt).await? {
                RetryDecision::Ok => {
                    return Ok(RetryOutcome {
                        value,
                        attempts: attempt,
                    })
                }
                RetryDecision::Fail => return Err(EngineError::RetryFailed { attempt }),
                RetryDecision::Retry => {
                    log::debug!("Attempt {}/{} rejected", attempt, self.max_attempts);
                }
            }
        }

        Err(EngineError::RetryExhausted {
            attempts: self.max_attempts,
        })
    }
}
