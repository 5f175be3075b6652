//! Queue gateway: bounded polling over the job queue with backoff and
//! at-least-once ack/nack discipline.
//!
//! # Overview
//!
//! The gateway runs a tick loop. Each tick ensures the broker connection
//! is open (re-dialing and re-declaring the topology if not), honours the
//! backoff counter, and — while fewer than `concurrency` jobs are in
//! flight — pulls at most one job and spawns a handler task for it.
//!
//! Handlers decode the job, call the grader, and settle the delivery:
//! - verdict produced → publish the response, then ack
//! - system fault → nack with requeue so another worker retries
//! - undecodable body → reject without requeue (it can never grade)
//! - publish failure → nack with requeue
//!
//! An empty or failing fetch arms the backoff counter, so an idle queue is
//! polled once every `BACKOFF_AMOUNT + 1` ticks.

mod error;
mod transport;

pub use error::GatewayError;
pub use transport::{
    AmqpTransport, EXCHANGE_NAME, InboundJob, REQUEST_QUEUE_NAME, RESPONSE_QUEUE_NAME,
    ROUTING_KEY_REQUEST, ROUTING_KEY_RESPONSE, Result, Transport,
};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::interval;
use tracing::{debug, instrument, warn};

use crate::grading::{GradingError, GradingService, Request, Response};

/// Ticks skipped after an empty or failed queue fetch.
pub const BACKOFF_AMOUNT: u32 = 4;

/// The grading pipeline as the gateway sees it.
///
/// The response is always populated; the error is present only when the
/// job should be returned to the queue.
#[async_trait]
pub trait Grader: Send + Sync {
    /// Grades one decoded job.
    async fn grade(&self, request: &Request) -> (Response, Option<GradingError>);
}

#[async_trait]
impl Grader for GradingService {
    async fn grade(&self, request: &Request) -> (Response, Option<GradingError>) {
        GradingService::grade(self, request).await
    }
}

/// Poll-based worker gateway over the job queue.
pub struct Gateway {
    transport: Arc<dyn Transport>,
    grader: Arc<dyn Grader>,
    concurrency: usize,
    tick_period: Duration,
    in_flight: Arc<StdMutex<usize>>,
    backoff: u32,
    running: Arc<AtomicBool>,
}

impl Gateway {
    /// Creates a gateway polling `transport` and dispatching to `grader`,
    /// admitting at most `concurrency` concurrent jobs.
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        grader: Arc<dyn Grader>,
        concurrency: usize,
        tick_period: Duration,
    ) -> Self {
        Self {
            transport,
            grader,
            concurrency,
            tick_period,
            in_flight: Arc::new(StdMutex::new(0)),
            backoff: 0,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Number of jobs currently being graded.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        *lock_counter(&self.in_flight)
    }

    /// One gateway tick: reconnect, honour backoff, admit at most one job.
    ///
    /// # Errors
    ///
    /// Returns an error when the broker is unreachable or the fetch
    /// failed; the caller is expected to keep ticking.
    #[instrument(skip(self))]
    pub async fn tick(&mut self) -> Result<()> {
        self.transport.ensure_open().await?;

        if self.backoff > 0 {
            self.backoff -= 1;
            return Ok(());
        }

        // The counter can only decrease between this check and the
        // increment below (handlers finishing), so the cap holds without
        // keeping the lock across the fetch.
        if *lock_counter(&self.in_flight) >= self.concurrency {
            return Ok(());
        }

        let job = match self.transport.get().await {
            Ok(Some(job)) => job,
            Ok(None) => {
                self.backoff = BACKOFF_AMOUNT;
                return Ok(());
            }
            Err(error) => {
                self.backoff = BACKOFF_AMOUNT;
                return Err(error);
            }
        };

        {
            let mut in_flight = lock_counter(&self.in_flight);
            *in_flight += 1;
            debug!(in_flight = *in_flight, "job admitted");
        }

        let transport = Arc::clone(&self.transport);
        let grader = Arc::clone(&self.grader);
        let in_flight = Arc::clone(&self.in_flight);
        tokio::spawn(async move {
            handle_delivery(transport, grader, job).await;

            let mut in_flight = lock_counter(&in_flight);
            *in_flight = in_flight.saturating_sub(1);
            debug!(in_flight = *in_flight, "job finished");
        });

        Ok(())
    }

    /// Runs the tick loop until [`Gateway::stop`] is called. Tick errors
    /// are logged; the loop keeps going.
    pub async fn run(&mut self) {
        let mut ticker = interval(self.tick_period);
        while self.running.load(Ordering::SeqCst) {
            ticker.tick().await;
            if let Err(error) = self.tick().await {
                warn!(%error, "gateway tick failed");
            }
        }
    }

    /// Stops the tick loop after its current tick.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("concurrency", &self.concurrency)
            .field("tick_period", &self.tick_period)
            .field("in_flight", &self.in_flight())
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

/// Decodes, grades, and settles one delivery. Every path settles exactly
/// once; settlement failures are logged, never propagated.
async fn handle_delivery(
    transport: Arc<dyn Transport>,
    grader: Arc<dyn Grader>,
    job: Box<dyn InboundJob>,
) {
    let request: Request = match serde_json::from_slice(job.body()) {
        Ok(request) => request,
        Err(error) => {
            warn!(%error, "dropping undecodable job body");
            if let Err(error) = job.reject(false).await {
                warn!(%error, "failed to reject delivery");
            }
            return;
        }
    };

    let (response, grading_error) = grader.grade(&request).await;

    if let Some(error) = grading_error {
        warn!(%error, "returning job to the queue");
        if let Err(error) = job.reject(true).await {
            warn!(%error, "failed to nack delivery");
        }
        return;
    }

    let body = match serde_json::to_vec(&response) {
        Ok(body) => body,
        Err(error) => {
            warn!(%error, "failed to encode response");
            if let Err(error) = job.reject(true).await {
                warn!(%error, "failed to nack delivery");
            }
            return;
        }
    };

    match transport.publish(&body).await {
        Ok(()) => {
            if let Err(error) = job.ack().await {
                warn!(%error, "failed to ack delivery");
            }
        }
        Err(error) => {
            warn!(%error, "failed to publish response, returning job to the queue");
            if let Err(error) = job.reject(true).await {
                warn!(%error, "failed to nack delivery");
            }
        }
    }
}

fn lock_counter(counter: &StdMutex<usize>) -> MutexGuard<'_, usize> {
    match counter.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
