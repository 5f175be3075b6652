//! Slot-allocated sandbox pool.
//!
//! The pool owns a dense, growable table of slots. Each live slot holds one
//! sandbox instance whose host port and container name are derived from the
//! slot index (`basePort + slot`, `runner-<slot>`), so port assignments stay
//! dense and predictable and a crashed process can be swept by name prefix.
//!
//! A job handler acquires a sandbox through [`RunnerPool::create`] and
//! receives a [`SandboxLease`]: exclusive use of the instance for the
//! duration of one grading run, expressed as ownership of the per-instance
//! lock. Dropping the lease flags the instance for shutdown; the reaper
//! tick destroys flagged instances and frees their slots. The reaper uses a
//! non-blocking try-lock so it never stalls behind an active job.
//!
//! Slot state machine: `Empty → Starting → Live(in use) → Live(draining) →
//! Empty`. The table mutex is held only to mutate the table, never across
//! an engine or RPC call.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard, OwnedMutexGuard};
use tokio::time::{Instant, interval, timeout_at};
use tracing::{debug, info, instrument};

use crate::rpc::{SandboxClient, SandboxConnector};

use super::engine::{ContainerEngine, ContainerStartRequest};
use super::error::RunnerError;
use super::{ContainerTemplate, Result};

/// Default first external port; slot N is published on `base + N`.
pub const DEFAULT_BASE_PORT: u16 = 8888;

/// Interval between readiness pings.
const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Interval between reaper ticks.
const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Mutable half of a sandbox instance, guarded by the instance lock.
struct InstanceState {
    client: Box<dyn SandboxClient>,
    wait_for_shutdown: bool,
}

/// One live sandbox container attached to a slot.
pub struct SandboxInstance {
    container_id: String,
    slot: usize,
    port_external: u16,
    state: Arc<Mutex<InstanceState>>,
}

impl SandboxInstance {
    /// Engine-assigned container id.
    #[must_use]
    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    /// Slot index; stable for the lifetime of the instance.
    #[must_use]
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Host port the worker RPC is published on.
    #[must_use]
    pub fn port_external(&self) -> u16 {
        self.port_external
    }
}

impl std::fmt::Debug for SandboxInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxInstance")
            .field("container_id", &self.container_id)
            .field("slot", &self.slot)
            .field("port_external", &self.port_external)
            .finish_non_exhaustive()
    }
}

/// Exclusive use of one sandbox for the duration of one grading run.
///
/// Holds the instance lock, so the reaper skips the instance while the
/// lease is alive. Dropping the lease flags the instance for shutdown; the
/// next pool tick destroys it and frees the slot.
pub struct SandboxLease {
    instance: Arc<SandboxInstance>,
    state: OwnedMutexGuard<InstanceState>,
}

impl SandboxLease {
    /// The worker RPC client attached to this sandbox.
    #[must_use]
    pub fn client(&self) -> &dyn SandboxClient {
        self.state.client.as_ref()
    }

    /// Engine-assigned container id.
    #[must_use]
    pub fn container_id(&self) -> &str {
        self.instance.container_id()
    }

    /// Slot index of the leased sandbox.
    #[must_use]
    pub fn slot(&self) -> usize {
        self.instance.slot()
    }

    /// Host port of the leased sandbox.
    #[must_use]
    pub fn port_external(&self) -> u16 {
        self.instance.port_external()
    }
}

impl Drop for SandboxLease {
    fn drop(&mut self) {
        // Entering Draining; the reaper destroys the instance on its next
        // tick once this guard is released.
        self.state.wait_for_shutdown = true;
    }
}

impl std::fmt::Debug for SandboxLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxLease")
            .field("instance", &self.instance)
            .finish_non_exhaustive()
    }
}

/// One entry in the slot table.
enum Slot {
    /// No instance; lowest Empty slot is taken by the next create.
    Empty,
    /// Reserved by an in-flight create; not yet live.
    Starting,
    /// Holding a live instance.
    Live(Arc<SandboxInstance>),
}

/// Frees a Starting slot unless the create that reserved it completes.
///
/// `create` runs under the caller's deadline; if its future is dropped
/// mid-flight the reservation must not pin the slot forever. A container
/// that was already started by then is reclaimed by the stray sweep (or by
/// the name conflict failing the next create on the slot, which frees it
/// again).
struct SlotReservation<'a> {
    pool: &'a RunnerPool,
    slot: usize,
    armed: bool,
}

impl Drop for SlotReservation<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.pool.clear_slot(self.slot);
        }
    }
}

/// Slot-allocated pool of sandbox containers.
pub struct RunnerPool {
    engine: Arc<dyn ContainerEngine>,
    connector: Arc<dyn SandboxConnector>,
    slots: StdMutex<Vec<Slot>>,
    base_port: u16,
    running: AtomicBool,
}

impl RunnerPool {
    /// Creates a pool over the given engine and RPC connector with the
    /// default base port.
    #[must_use]
    pub fn new(engine: Arc<dyn ContainerEngine>, connector: Arc<dyn SandboxConnector>) -> Self {
        Self::with_base_port(engine, connector, DEFAULT_BASE_PORT)
    }

    /// Creates a pool with an explicit external base port.
    #[must_use]
    pub fn with_base_port(
        engine: Arc<dyn ContainerEngine>,
        connector: Arc<dyn SandboxConnector>,
        base_port: u16,
    ) -> Self {
        Self {
            engine,
            connector,
            slots: StdMutex::new(Vec::new()),
            base_port,
            running: AtomicBool::new(true),
        }
    }

    /// Sweeps stray `runner-` containers left behind by a previous process.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Engine`] if the engine cannot enumerate
    /// containers.
    pub async fn cleanup_stray(&self) -> Result<()> {
        self.engine.cleanup_stray().await
    }

    /// Allocates a slot, starts a sandbox from the template, attaches its
    /// RPC client, and returns the lease.
    ///
    /// The slot is released (and a started container stopped) if any step
    /// fails.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::InvalidBasePort`] on a zero base port,
    /// [`RunnerError::Engine`] if the container cannot be started, and
    /// [`RunnerError::Attach`] if the RPC client cannot be attached.
    #[instrument(skip(self, template), fields(image = %template.image))]
    pub async fn create(&self, template: &ContainerTemplate) -> Result<SandboxLease> {
        if self.base_port == 0 {
            return Err(RunnerError::InvalidBasePort);
        }

        let started_at = Instant::now();
        let slot = self.reserve_slot();
        let mut reservation = SlotReservation {
            pool: self,
            slot,
            armed: true,
        };
        let request = ContainerStartRequest {
            slot,
            image: template.image.clone(),
            port_internal: template.port_internal,
            port_external: self.external_port(slot),
        };

        let started = self.engine.start(&request).await?;

        let client = match self.connector.connect(request.port_external).await {
            Ok(client) => client,
            Err(error) => {
                self.engine.stop(&started.container_id).await;
                return Err(error.into());
            }
        };

        let instance = Arc::new(SandboxInstance {
            container_id: started.container_id,
            slot,
            port_external: request.port_external,
            state: Arc::new(Mutex::new(InstanceState {
                client,
                wait_for_shutdown: false,
            })),
        });

        // Uncontended: the instance is not published yet.
        let state = Arc::clone(&instance.state).lock_owned().await;
        self.publish_slot(slot, Arc::clone(&instance));
        reservation.armed = false;

        info!(
            container_id = %instance.container_id,
            slot,
            port = instance.port_external,
            elapsed_ms = started_at.elapsed().as_millis(),
            "sandbox started"
        );

        Ok(SandboxLease { instance, state })
    }

    /// Polls `Ping` every 100 ms until the worker answers or the timeout
    /// elapses.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::NotReady`] if the deadline passes first.
    pub async fn wait_ready(&self, lease: &SandboxLease, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;

        loop {
            match timeout_at(deadline, lease.client().ping()).await {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(error)) => {
                    debug!(container_id = %lease.container_id(), %error, "ping not answered yet");
                }
                Err(_) => return Err(RunnerError::NotReady { timeout }),
            }

            if timeout_at(deadline, tokio::time::sleep(READY_POLL_INTERVAL))
                .await
                .is_err()
            {
                return Err(RunnerError::NotReady { timeout });
            }
        }
    }

    /// Reaps every instance flagged for shutdown whose lock is free.
    pub async fn tick(&self) {
        for instance in self.live_instances() {
            let Ok(state) = instance.state.try_lock() else {
                // Held by a handler; skip, never block the reaper.
                continue;
            };

            if state.wait_for_shutdown {
                self.destroy_with_state(&instance, state).await;
            }
        }
    }

    /// Runs the reaper loop until [`RunnerPool::stop`] is called.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = interval(TICK_INTERVAL);
        while self.running.load(Ordering::SeqCst) {
            ticker.tick().await;
            self.tick().await;
        }
    }

    /// Stops the reaper loop after its current tick.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Destroys every live instance, waiting for in-flight leases to end.
    ///
    /// Afterwards the slot table holds no live entries.
    pub async fn shutdown(&self) {
        self.stop();
        for instance in self.live_instances() {
            let state = instance.state.lock().await;
            self.destroy_with_state(&instance, state).await;
        }
    }

    /// Number of live instances (in use or draining).
    #[must_use]
    pub fn count_running(&self) -> usize {
        self.slots
            .lock()
            .map(|slots| {
                slots
                    .iter()
                    .filter(|slot| matches!(slot, Slot::Live(_)))
                    .count()
            })
            .unwrap_or(0)
    }

    /// Best-effort worker shutdown, container removal, slot release.
    async fn destroy_with_state(
        &self,
        instance: &SandboxInstance,
        state: MutexGuard<'_, InstanceState>,
    ) {
        if let Err(error) = state.client.shutdown().await {
            debug!(container_id = %instance.container_id, %error, "shutdown rpc not delivered");
        }
        // Dropping the state guard (and later the instance) closes the RPC
        // channel.
        drop(state);

        self.engine.stop(&instance.container_id).await;
        self.clear_slot(instance.slot);

        info!(container_id = %instance.container_id, slot = instance.slot, "sandbox destroyed");
    }

    /// Marks the lowest Empty slot as Starting, growing the table if full.
    fn reserve_slot(&self) -> usize {
        let mut slots = match self.slots.lock() {
            Ok(slots) => slots,
            Err(poisoned) => poisoned.into_inner(),
        };

        for (index, slot) in slots.iter_mut().enumerate() {
            if matches!(slot, Slot::Empty) {
                *slot = Slot::Starting;
                return index;
            }
        }

        slots.push(Slot::Starting);
        slots.len() - 1
    }

    fn publish_slot(&self, slot: usize, instance: Arc<SandboxInstance>) {
        if let Ok(mut slots) = self.slots.lock() {
            slots[slot] = Slot::Live(instance);
        }
    }

    fn clear_slot(&self, slot: usize) {
        if let Ok(mut slots) = self.slots.lock() {
            slots[slot] = Slot::Empty;
        }
    }

    fn live_instances(&self) -> Vec<Arc<SandboxInstance>> {
        self.slots
            .lock()
            .map(|slots| {
                slots
                    .iter()
                    .filter_map(|slot| match slot {
                        Slot::Live(instance) => Some(Arc::clone(instance)),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// External port for a slot. Slots are bounded by the concurrency cap,
    /// far below the port range.
    #[allow(clippy::cast_possible_truncation)]
    fn external_port(&self, slot: usize) -> u16 {
        self.base_port.saturating_add(slot as u16)
    }
}

impl std::fmt::Debug for RunnerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunnerPool")
            .field("base_port", &self.base_port)
            .field("running", &self.running.load(Ordering::SeqCst))
            .field("count_running", &self.count_running())
            .finish_non_exhaustive()
    }
}
