use crate::config::OrgRegistry;
use crate::contract::{LedgerGateway, Session, TxOutcome, WriteOp};
use crate::error::{Error, Result};
use crate::state::{compute_leaderboard, OrgStanding, RoundState};
use crate::tracker::{ActiveOps, OpKind, TxRecord};
use log::{debug, info, warn};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Round mirror plus derived leaderboard, always replaced together.
#[derive(Debug, Clone, Default, PartialEq)]
struct ViewState {
    round: Option<RoundState>,
    board: Vec<OrgStanding>,
}

/// Cancellation handle for the periodic refresh task. Teardown is one
/// explicit call, not implicit cleanup.
pub struct PollerHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        let _ = self.task.await;
    }
}

/// Owns the session, the local round/leaderboard view and the in-flight
/// transaction records; the only component that issues writes.
pub struct SyncController<G> {
    gateway: Arc<G>,
    registry: OrgRegistry,
    poll_interval: Duration,
    session: Mutex<Option<Session>>,
    view: Arc<AsyncMutex<ViewState>>,
    active: Mutex<ActiveOps>,
    poller: Mutex<Option<PollerHandle>>,
}

impl<G: LedgerGateway + 'static> SyncController<G> {
    pub fn new(gateway: Arc<G>, registry: OrgRegistry, poll_interval: Duration) -> Self {
        Self {
            gateway,
            registry,
            poll_interval,
            session: Mutex::new(None),
            view: Arc::new(AsyncMutex::new(ViewState::default())),
            active: Mutex::new(ActiveOps::default()),
            poller: Mutex::new(None),
        }
    }

    /// Session bootstrap: connect, resolve the admin flag against the
    /// ledger-reported admin, then one synchronous full refresh. Connection
    /// failures are terminal; nothing is retried here.
    pub async fn bootstrap(&self) -> Result<Session> {
        let mut session = self.gateway.connect().await?;
        let admin = self.gateway.admin().await?;
        session.admin = session.account == admin;
        info!(
            "session bound: account {:?}, chain {}, admin {}",
            session.account, session.chain_id, session.admin
        );
        *self.session.lock().unwrap() = Some(session.clone());
        if let Err(e) = self.refresh().await {
            *self.session.lock().unwrap() = None;
            return Err(e);
        }
        Ok(session)
    }

    pub fn session(&self) -> Option<Session> {
        self.session.lock().unwrap().clone()
    }

    pub async fn round_state(&self) -> Option<RoundState> {
        self.view.lock().await.round.clone()
    }

    pub async fn leaderboard(&self) -> Vec<OrgStanding> {
        self.view.lock().await.board.clone()
    }

    pub fn record(&self, kind: OpKind) -> Option<TxRecord> {
        self.active.lock().unwrap().get(kind).cloned()
    }

    pub fn registry(&self) -> &OrgRegistry {
        &self.registry
    }

    pub async fn refresh(&self) -> Result<()> {
        refresh_view(self.gateway.as_ref(), &self.registry, &self.view).await
    }

    /// Uniform write path for all five operations: duplicate rejection,
    /// client-side gating, submit, confirmation wait, refresh on success.
    /// Gate rejections and duplicates are `Err` and never reach the gateway;
    /// a ledger-side failure comes back as a terminal failed record.
    pub async fn execute(&self, op: WriteOp) -> Result<TxRecord> {
        let kind = op.kind();
        let session = self.session().ok_or(Error::NotConnected)?;
        if kind.requires_admin() {
            if !session.admin {
                return Err(Error::NotAllowed(format!("{} is admin-only", kind)));
            }
            let can_end = self
                .view
                .lock()
                .await
                .round
                .as_ref()
                .map(|r| r.can_end)
                .unwrap_or(false);
            if !can_end {
                return Err(Error::NotAllowed(
                    "round minimum duration not met, wait before ending the round".to_owned(),
                ));
            }
        }

        let mut record = self.active.lock().unwrap().begin(kind)?;

        let handle = match self.gateway.submit(&op).await {
            Ok(handle) => {
                record.accepted(handle);
                self.store(&record);
                handle
            }
            Err(e) => {
                warn!("{} rejected at submission: {}", kind, e);
                record.fail(format!("rejected: {}", e));
                self.store(&record);
                return Ok(record);
            }
        };
        info!("{} submitted as {:?}, waiting for confirmation", kind, handle.0);

        let outcome = self.gateway.await_confirmation(handle).await;
        // The session may have been torn down while the wait was in flight;
        // a late result then updates nothing.
        if self.session().is_none() {
            debug!("{} result arrived after teardown, discarding", kind);
            return Ok(record);
        }
        match outcome {
            Ok(TxOutcome::Confirmed) => {
                record.confirm();
                self.store(&record);
                info!("{} confirmed", kind);
                if let Err(e) = self.refresh().await {
                    warn!("post-confirmation refresh failed, the next poll will catch up: {}", e);
                }
            }
            Ok(TxOutcome::Failed) => {
                warn!("{} reverted on the ledger", kind);
                record.fail("transaction reverted");
                self.store(&record);
            }
            Err(e) => {
                warn!("{} confirmation wait failed: {}", kind, e);
                record.fail(e.to_string());
                self.store(&record);
            }
        }
        Ok(record)
    }

    /// Starts the periodic refresh. Poll failures keep the previous view and
    /// never kill the task.
    pub fn start_poller(&self) {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let gateway = self.gateway.clone();
        let registry = self.registry.clone();
        let view = self.view.clone();
        let period = self.poll_interval;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The bootstrap refresh already populated the view; skip the
            // immediate first tick.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = refresh_view(gateway.as_ref(), &registry, &view).await {
                            warn!("periodic refresh failed, keeping the previous view: {}", e);
                        }
                    }
                }
            }
            debug!("poller stopped");
        });

        let previous = self
            .poller
            .lock()
            .unwrap()
            .replace(PollerHandle { stop: stop_tx, task });
        if let Some(previous) = previous {
            let _ = previous.stop.send(true);
        }
    }

    /// Stops the poller and drops the session. An in-flight confirmation wait
    /// is not cancelled, its result just no longer updates anything.
    pub async fn teardown(&self) {
        let handle = self.poller.lock().unwrap().take();
        if let Some(handle) = handle {
            handle.shutdown().await;
        }
        *self.session.lock().unwrap() = None;
        info!("controller torn down");
    }

    fn store(&self, record: &TxRecord) {
        self.active.lock().unwrap().store(record.clone());
    }
}

/// One atomic refresh: issue all reads concurrently and only replace the view
/// once every read has succeeded. Any failure leaves the previous round and
/// leaderboard untouched, so the view is never built from half-old reads.
async fn refresh_view<G: LedgerGateway>(
    gateway: &G,
    registry: &OrgRegistry,
    view: &AsyncMutex<ViewState>,
) -> Result<()> {
    let ids = registry.ids();
    let (snap, can_end, totals) = tokio::try_join!(
        gateway.round_info(),
        gateway.can_end_round(),
        gateway.org_totals(&ids),
    )?;
    let round = RoundState::from_reads(snap, can_end);
    let board = compute_leaderboard(registry, &totals);

    let mut view = view.lock().await;
    if let Some(prev) = &view.round {
        // Round ids never regress; a smaller id is a stale or reordered
        // answer and the held view wins.
        if round.round_id < prev.round_id {
            warn!(
                "ledger reported round {} behind held round {}, discarding refresh",
                round.round_id, prev.round_id
            );
            return Ok(());
        }
    }
    debug!(
        "view replaced: round {}, pool {}, {} orgs",
        round.round_id,
        round.pool_balance,
        board.len()
    );
    view.round = Some(round);
    view.board = board;
    Ok(())
}
