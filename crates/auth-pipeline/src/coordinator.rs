//! Single-flight credential renewal
//!
//! When a credentialed request is answered with 401, exactly one request (the
//! driver) calls the renewal endpoint. Every other request failing while that
//! renewal is outstanding (a follower) is parked in the `RetryQueue` and
//! settled by the driver once the renewal resolves.
//!
//! Transitions:
//! - Idle → Refreshing (first 401 whose token is still current; caller drives)
//! - Refreshing → Idle (renewal succeeded: replay driver; queue replays in
//!   order on its own task)
//! - Refreshing → Idle (renewal failed: clear session, reject driver and queue)
//! - Refreshing → Idle (session ended by logout mid-renewal: reject driver and
//!   queue with `Cancelled`, no invalidation)
//! - Refreshing → Idle (driver dropped: reject queue with `Cancelled`)
//!
//! Once the renewal resolves, parked requests no longer depend on the driver:
//! the drain runs on a spawned task, so a driver whose own replay is dropped
//! or slow does not hold up or cancel its followers.
//!
//! The phase and the queue share one mutex. The driver decision, the enqueue
//! and the queue hand-off on settlement each happen inside a single critical
//! section, and the lock is never held across an `.await`.

use std::sync::Arc;

use parking_lot::Mutex;
use session::CredentialStore;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use transport::{ApiRequest, ApiResponse, Transport};

use crate::decorator;
use crate::error::{Error, Result};
use crate::events::SessionEvent;
use crate::metrics;
use crate::queue::{Drain, RetryQueue, Settled};

/// Renewal phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Refreshing,
}

/// Phase plus parked requests. The queue is empty whenever the phase is Idle.
#[derive(Debug)]
struct RefreshState {
    phase: Phase,
    queue: RetryQueue,
}

impl RefreshState {
    fn enqueue(&mut self, request: ApiRequest) -> Result<Settled> {
        if self.phase == Phase::Idle {
            return Err(Error::Contract(
                "request parked while no renewal is in progress".into(),
            ));
        }
        let (id, settled) = self.queue.enqueue(request);
        debug!(id, parked = self.queue.len(), "parked request behind renewal");
        Ok(settled)
    }

    /// Return to Idle, handing over everything parked so far.
    fn finish(&mut self) -> Drain {
        self.phase = Phase::Idle;
        self.queue.take()
    }
}

/// What a request that just received 401 should do.
enum Claim {
    /// Perform the renewal
    Driver(ApiRequest),
    /// Wait for the driver to settle this request
    Follower(Settled),
    /// Token was replaced since this request was sent; replay without renewing
    Stale(ApiRequest),
}

/// Re-sends requests once a renewal has installed a new token.
#[derive(Clone)]
struct Replayer {
    store: Arc<CredentialStore>,
    transport: Arc<dyn Transport>,
}

impl Replayer {
    /// Re-send with the store's current token. A 401 here is final.
    async fn replay(&self, request: ApiRequest) -> Result<ApiResponse> {
        let decorated = decorator::decorate(&self.store, request);
        let response = match self.transport.transmit(&decorated.request).await {
            Ok(response) => response,
            Err(e) => {
                metrics::record_replay("transport_error");
                return Err(e.into());
            }
        };

        if response.is_unauthorized() {
            metrics::record_replay("unauthorized");
            warn!(path = %decorated.request.path, "access token rejected again after renewal");
            return Err(Error::Unauthorized);
        }
        metrics::record_replay("ok");
        Ok(response)
    }

    /// Settle everything parked, in arrival order, on a task of its own.
    fn spawn_drain(&self, drained: Drain) {
        if drained.is_empty() {
            return;
        }
        let replayer = self.clone();
        tokio::spawn(async move {
            drained
                .succeed(move |parked| {
                    let replayer = replayer.clone();
                    async move { replayer.replay(parked).await }
                })
                .await;
        });
    }
}

/// Owner of the renewal protocol for one session.
pub struct RefreshCoordinator {
    state: Mutex<RefreshState>,
    store: Arc<CredentialStore>,
    transport: Arc<dyn Transport>,
    replayer: Replayer,
    events: broadcast::Sender<SessionEvent>,
}

impl RefreshCoordinator {
    pub fn new(
        store: Arc<CredentialStore>,
        transport: Arc<dyn Transport>,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            state: Mutex::new(RefreshState {
                phase: Phase::Idle,
                queue: RetryQueue::new(),
            }),
            replayer: Replayer {
                store: store.clone(),
                transport: transport.clone(),
            },
            store,
            transport,
            events,
        }
    }

    pub fn phase(&self) -> Phase {
        self.state.lock().phase
    }

    /// Number of requests waiting on the current renewal.
    pub fn parked(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Park `request` behind the renewal in progress.
    ///
    /// Fails with `Error::Contract` while Idle: the caller should drive a
    /// renewal instead.
    pub fn park(&self, request: ApiRequest) -> Result<Settled> {
        self.state.lock().enqueue(request)
    }

    /// Recover a credentialed request that was answered with 401.
    ///
    /// `sent_with` is the access token the failed attempt carried. The
    /// request is replayed at most once; a second 401 is final.
    pub async fn recover(&self, request: ApiRequest, sent_with: Option<String>) -> Result<ApiResponse> {
        match self.claim(request, sent_with.as_deref())? {
            Claim::Follower(settled) => {
                metrics::record_parked();
                settled.await.unwrap_or_else(|_| {
                    Err(Error::Cancelled(
                        "renewal ended before this request was settled".into(),
                    ))
                })
            }
            Claim::Stale(request) => {
                debug!(path = %request.path, "access token already renewed, replaying");
                self.replayer.replay(request).await
            }
            Claim::Driver(request) => self.drive(request).await,
        }
    }

    fn claim(&self, request: ApiRequest, sent_with: Option<&str>) -> Result<Claim> {
        let mut state = self.state.lock();
        if state.phase == Phase::Refreshing {
            return state.enqueue(request).map(Claim::Follower);
        }

        let current = self.store.access_token();
        if current.is_some() && current.as_deref() != sent_with {
            return Ok(Claim::Stale(request));
        }

        state.phase = Phase::Refreshing;
        Ok(Claim::Driver(request))
    }

    async fn drive(&self, request: ApiRequest) -> Result<ApiResponse> {
        let guard = DriverGuard {
            coordinator: self,
            armed: true,
        };
        info!(path = %request.path, "access token rejected, renewing");
        let had_session = self.store.is_authenticated();

        let outcome = match self.renew().await {
            Err(error) if had_session && !self.store.is_authenticated() => {
                debug!(error = %error, "renewal outcome discarded after logout");
                Err(Error::Cancelled("session ended during renewal".into()))
            }
            outcome => outcome,
        };

        match outcome {
            Ok(()) => {
                let drained = guard.release();
                metrics::record_renewal("success");
                info!(parked = drained.len(), "renewal succeeded, replaying requests");

                // On a current-thread runtime the driver still transmits first
                self.replayer.spawn_drain(drained);
                self.replayer.replay(request).await
            }
            Err(error @ Error::Cancelled(_)) => {
                metrics::record_renewal("cancelled");
                let drained = guard.release();
                info!(parked = drained.len(), "session ended during renewal, rejecting requests");
                drained.fail(&error);
                Err(error)
            }
            Err(error) => {
                metrics::record_renewal("failure");
                warn!(error = %error, "renewal failed, ending session");
                if let Err(e) = self.store.clear().await {
                    warn!(error = %e, "failed to persist cleared session");
                }

                let drained = guard.release();
                info!(parked = drained.len(), "rejecting parked requests");
                drained.fail(&error);

                // Err only means there are no subscribers
                let _ = self.events.send(SessionEvent::Invalidated {
                    reason: error.to_string(),
                });
                Err(error)
            }
        }
    }

    /// Call the renewal endpoint and install the new access token.
    async fn renew(&self) -> Result<()> {
        let Some(renewal) = self.store.renewal_token() else {
            return Err(Error::RenewalFailed("no renewal token in session".into()));
        };

        let response = session::renew(self.transport.as_ref(), &renewal)
            .await
            .map_err(|e| Error::RenewalFailed(e.to_string()))?;

        match self
            .store
            .apply_renewal(response.access_token, response.refresh_token)
            .await
        {
            Ok(()) => Ok(()),
            Err(session::Error::NotFound(_)) => {
                Err(Error::Cancelled("session ended during renewal".into()))
            }
            Err(e) => {
                // Memory already holds the new token; only the file is behind
                warn!(error = %e, "failed to persist renewed token");
                Ok(())
            }
        }
    }
}

/// Returns the coordinator to Idle if the driver is dropped mid-renewal.
struct DriverGuard<'a> {
    coordinator: &'a RefreshCoordinator,
    armed: bool,
}

impl DriverGuard<'_> {
    /// Leave Refreshing normally and take the parked requests.
    fn release(mut self) -> Drain {
        self.armed = false;
        self.coordinator.state.lock().finish()
    }
}

impl Drop for DriverGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let drained = self.coordinator.state.lock().finish();
        warn!(parked = drained.len(), "renewal abandoned by its driver");
        drained.fail(&Error::Cancelled("renewal was abandoned".into()));
    }
}
