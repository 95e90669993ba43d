use async_trait::async_trait;
use chrono::{DateTime, Utc};
use folio_data::Ctx;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use thiserror::Error;
use uuid::Uuid;

/// A queued request to simulate (or extend) one portfolio.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct SimulationRequest {
    pub user_id: SmolStr,
    pub portfolio_id: Uuid,
    pub request_time: DateTime<Utc>,
}

/// One received message plus the token needed to acknowledge it.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Delivery {
    pub request: SimulationRequest,
    pub ack_id: SmolStr,
}

/// All errors raised by a work queue.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum QueueError {
    #[error("queue receive: {0}")]
    Receive(String),

    #[error("queue ack: {0}")]
    Ack(String),

    #[error("{0}")]
    Ctx(#[from] folio_data::CtxError),
}

/// External collaborator: the background work queue feeding simulation
/// workers. Messages are acknowledged only after the worker's repository
/// transaction committed; an unacknowledged message redelivers.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Receive the next request, or `None` when the queue is empty.
    async fn receive(&self, ctx: &Ctx) -> Result<Option<Delivery>, QueueError>;

    /// Acknowledge a delivery after successful commit.
    async fn ack(&self, ctx: &Ctx, ack_id: &str) -> Result<(), QueueError>;
}

/// In-memory work queue for tests and fixtures. Received messages stay
/// in-flight until acknowledged; unacknowledged messages can be redelivered.
#[derive(Debug, Default)]
pub struct InMemoryWorkQueue {
    inner: parking_lot::Mutex<QueueInner>,
}

#[derive(Debug, Default)]
struct QueueInner {
    ready: std::collections::VecDeque<Delivery>,
    in_flight: fnv::FnvHashMap<SmolStr, Delivery>,
    next_ack: u64,
}

impl InMemoryWorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a request, assigning its acknowledgement token.
    pub fn push(&self, request: SimulationRequest) {
        let mut inner = self.inner.lock();
        inner.next_ack += 1;
        let ack_id = smol_str::format_smolstr!("ack-{}", inner.next_ack);
        inner.ready.push_back(Delivery { request, ack_id });
    }

    /// Move every unacknowledged in-flight message back to the ready queue.
    pub fn redeliver(&self) {
        let mut inner = self.inner.lock();
        let redelivered = std::mem::take(&mut inner.in_flight);
        inner.ready.extend(redelivered.into_values());
    }

    pub fn ready_len(&self) -> usize {
        self.inner.lock().ready.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.inner.lock().in_flight.len()
    }
}

#[async_trait]
impl WorkQueue for InMemoryWorkQueue {
    async fn receive(&self, ctx: &Ctx) -> Result<Option<Delivery>, QueueError> {
        ctx.check()?;
        let mut inner = self.inner.lock();
        let Some(delivery) = inner.ready.pop_front() else {
            return Ok(None);
        };
        inner
            .in_flight
            .insert(delivery.ack_id.clone(), delivery.clone());
        Ok(Some(delivery))
    }

    async fn ack(&self, ctx: &Ctx, ack_id: &str) -> Result<(), QueueError> {
        ctx.check()?;
        match self.inner.lock().in_flight.remove(ack_id) {
            Some(_) => Ok(()),
            None => Err(QueueError::Ack(format!("unknown delivery: {ack_id}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> SimulationRequest {
        SimulationRequest {
            user_id: SmolStr::new("alice"),
            portfolio_id: Uuid::new_v4(),
            request_time: "2021-06-16T12:00:00Z".parse().unwrap(),
        }
    }

    #[tokio::test]
    async fn test_in_memory_queue_ack_and_redeliver() {
        let queue = InMemoryWorkQueue::new();
        let ctx = Ctx::background();
        queue.push(request());
        queue.push(request());

        let first = queue.receive(&ctx).await.unwrap().unwrap();
        let second = queue.receive(&ctx).await.unwrap().unwrap();
        assert!(queue.receive(&ctx).await.unwrap().is_none());
        assert_eq!(queue.in_flight_len(), 2);

        // Acked messages are gone; the other survives redelivery.
        queue.ack(&ctx, &first.ack_id).await.unwrap();
        queue.redeliver();
        assert_eq!(queue.ready_len(), 1);
        assert_eq!(
            queue.receive(&ctx).await.unwrap().unwrap().ack_id,
            second.ack_id
        );

        // Double-ack is an error.
        assert!(queue.ack(&ctx, &first.ack_id).await.is_err());
    }

    #[test]
    fn test_simulation_request_round_trips() {
        let request = SimulationRequest {
            user_id: SmolStr::new("alice"),
            portfolio_id: Uuid::new_v4(),
            request_time: "2021-06-16T12:00:00Z".parse().unwrap(),
        };

        let json = serde_json::to_string(&request).unwrap();
        let parsed: SimulationRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, request);
    }
}
