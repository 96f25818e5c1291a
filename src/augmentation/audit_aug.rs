//! Built-in audit log augmentation (spec §4.9: priority 90, around) — an
//! in-memory ring buffer of per-call records, bounded by count and age.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::Result;

use super::{Augmentation, Next, Operation, OperationContext, OperationOutcome, OperationSet, Timing};

pub const PRIORITY: i32 = 90;

#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub id: Uuid,
    pub recorded_at: Instant,
    pub operation: Operation,
    pub params_digest: String,
    /// `Ok(digest)` for a successful outcome, `Err(message)` otherwise.
    pub result: std::result::Result<String, String>,
    pub duration: Duration,
    pub session_id: Option<String>,
}

fn digest(value: &serde_json::Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

fn outcome_digest(outcome: &OperationOutcome) -> String {
    // `OperationOutcome` isn't `Serialize` (it carries domain types by
    // reference shape, not a wire format); digesting its `Debug` rendering
    // is sufficient for an audit trail whose job is "did this change".
    let mut hasher = Sha256::new();
    hasher.update(format!("{outcome:?}").as_bytes());
    hex::encode(hasher.finalize())
}

pub struct AuditLogAugmentation {
    max_memory_logs: usize,
    max_age: Duration,
    records: Mutex<VecDeque<AuditRecord>>,
}

impl AuditLogAugmentation {
    pub fn new(max_memory_logs: usize, max_age: Duration) -> Self {
        Self {
            max_memory_logs: max_memory_logs.max(1),
            max_age,
            records: Mutex::new(VecDeque::new()),
        }
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        let mut records = self.records.lock().unwrap();
        self.evict_stale(&mut records);
        records.iter().cloned().collect()
    }

    fn evict_stale(&self, records: &mut VecDeque<AuditRecord>) {
        while let Some(front) = records.front() {
            if front.recorded_at.elapsed() > self.max_age {
                records.pop_front();
            } else {
                break;
            }
        }
    }
}

#[async_trait]
impl Augmentation for AuditLogAugmentation {
    fn name(&self) -> &'static str {
        "audit-log"
    }

    fn priority(&self) -> i32 {
        PRIORITY
    }

    fn timing(&self) -> Timing {
        Timing::Around
    }

    fn operations(&self) -> OperationSet {
        OperationSet::All
    }

    async fn run_around(&self, ctx: &OperationContext, next: Next) -> Result<OperationOutcome> {
        let started = Instant::now();
        let result = next.call().await;
        let duration = started.elapsed();

        let result_field = match &result {
            Ok(outcome) => Ok(outcome_digest(outcome)),
            Err(e) => Err(e.to_string()),
        };

        let record = AuditRecord {
            id: Uuid::new_v4(),
            recorded_at: Instant::now(),
            operation: ctx.operation,
            params_digest: digest(&ctx.params),
            result: result_field,
            duration,
            session_id: ctx.session_id.clone(),
        };

        let mut records = self.records.lock().unwrap();
        self.evict_stale(&mut records);
        if records.len() >= self.max_memory_logs {
            records.pop_front();
        }
        records.push_back(record);
        drop(records);

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(op: Operation) -> OperationContext {
        OperationContext { operation: op, params: serde_json::json!({"k": 1}), session_id: Some("s1".into()) }
    }

    #[tokio::test]
    async fn successful_call_is_recorded() {
        let aug = AuditLogAugmentation::new(10, Duration::from_secs(60));
        let next = Next::new(Box::pin(async { Ok(OperationOutcome::Unit) }));
        aug.run_around(&ctx(Operation::Get), next).await.unwrap();

        let records = aug.records();
        assert_eq!(records.len(), 1);
        assert!(records[0].result.is_ok());
        assert_eq!(records[0].session_id.as_deref(), Some("s1"));
    }

    #[tokio::test]
    async fn failed_call_is_recorded_with_error_message() {
        let aug = AuditLogAugmentation::new(10, Duration::from_secs(60));
        let next = Next::new(Box::pin(async { Err(crate::error::BrainyError::DeadlineExceeded) }));
        let _ = aug.run_around(&ctx(Operation::Delete), next).await;

        let records = aug.records();
        assert_eq!(records.len(), 1);
        assert!(records[0].result.is_err());
    }

    #[tokio::test]
    async fn ring_buffer_drops_oldest_past_capacity() {
        let aug = AuditLogAugmentation::new(2, Duration::from_secs(60));
        for _ in 0..3 {
            let next = Next::new(Box::pin(async { Ok(OperationOutcome::Unit) }));
            aug.run_around(&ctx(Operation::Get), next).await.unwrap();
        }
        assert_eq!(aug.records().len(), 2);
    }
}
