//! Listener supervisor: owns the listening socket and the relay configuration.
//!
//! This module is responsible for:
//!
//! 1. Binding the listener for the configured port (or idling while the relay
//!    is disabled).
//! 2. Accepting connections and spawning one worker task per connection.
//! 3. Applying a new configuration with a bounded drain of the old one.
//! 4. Stopping everything on request.
//!
//! # Generations
//!
//! Each applied configuration runs as one *generation*: a listener task (or
//! idle task) plus the workers it accepted, all watching the same
//! [`RunSignal`] channel.  Reconfiguring signals `Draining` to the current
//! generation, waits up to the drain timeout, and starts a new generation.
//! Authenticated sessions of the old generation keep running on the old
//! configuration; if they outlive the drain deadline a `TO` event is emitted
//! and they are kept aside until they finish or [`Supervisor::stop`] ends them.
//!
//! # Reconfiguration order
//!
//! The new configuration is validated before anything is touched.  When the
//! port changes, the new socket is bound *before* the old generation is
//! drained, so a port that cannot be bound leaves the relay running as it
//! was.  When the port stays the same, the old listener must close first; if
//! rebinding then fails the previous configuration is restored.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use relay_core::RelayConfig;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Mutex};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::{timeout, timeout_at, Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::application::{EventSink, LockoutLedger};
use crate::domain::{ListenerOptions, RelayEvent, SupervisorState};
use crate::error::RelayError;
use crate::infrastructure::downstream::DownstreamBridge;
use crate::infrastructure::worker::{serve_connection, RunSignal, WorkerContext};

pub struct Supervisor {
    options: ListenerOptions,
    events: Arc<dyn EventSink>,
    ledger: LockoutLedger,
    active: Arc<AtomicUsize>,
    state: watch::Sender<SupervisorState>,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    current: Option<Generation>,
    lingering: Vec<Lingering>,
}

struct Generation {
    config: Arc<RelayConfig>,
    local_addr: Option<SocketAddr>,
    control: watch::Sender<RunSignal>,
    task: JoinHandle<JoinSet<()>>,
}

/// Workers that outlived the drain of their generation.
struct Lingering {
    control: watch::Sender<RunSignal>,
    workers: JoinSet<()>,
}

impl Supervisor {
    pub fn new(options: ListenerOptions, events: Arc<dyn EventSink>) -> Self {
        let (state, _) = watch::channel(SupervisorState::Stopped);
        Self {
            options,
            events,
            ledger: LockoutLedger::new(),
            active: Arc::new(AtomicUsize::new(0)),
            state,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn state(&self) -> SupervisorState {
        *self.state.borrow()
    }

    /// Receiver that observes every state transition.
    pub fn watch_state(&self) -> watch::Receiver<SupervisorState> {
        self.state.subscribe()
    }

    /// Number of connection workers currently running, across generations.
    pub fn active_sessions(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn ledger(&self) -> &LockoutLedger {
        &self.ledger
    }

    /// Address the listener is bound to; `None` while stopped or disabled.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        let inner = self.inner.lock().await;
        inner.current.as_ref().and_then(|g| g.local_addr)
    }

    /// Configuration currently applied; `None` while stopped.
    pub async fn config(&self) -> Option<Arc<RelayConfig>> {
        let inner = self.inner.lock().await;
        inner.current.as_ref().map(|g| Arc::clone(&g.config))
    }

    /// Starts the relay with `config`.  Does nothing if it is already running.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] if `config` fails validation and
    /// [`RelayError::Bind`] if the port cannot be bound; the supervisor stays
    /// stopped in both cases.
    pub async fn start(&self, config: RelayConfig) -> Result<(), RelayError> {
        let mut inner = self.inner.lock().await;
        if inner.current.is_some() {
            debug!("start requested while already running; ignoring");
            return Ok(());
        }
        let config = config.validated()?;
        self.start_locked(&mut inner, Arc::new(config)).await
    }

    /// Replaces the running configuration.
    ///
    /// Starts the relay if it is stopped.  An identical configuration is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] for an invalid configuration and
    /// [`RelayError::Bind`] when the new port cannot be bound.  In both cases
    /// the relay keeps running with its previous configuration.
    pub async fn reconfigure(&self, config: RelayConfig) -> Result<(), RelayError> {
        let config = Arc::new(config.validated()?);
        let mut inner = self.inner.lock().await;
        reap_lingering(&mut inner);

        let Some(current) = inner.current.take() else {
            return self.start_locked(&mut inner, config).await;
        };
        if *current.config == *config {
            debug!("configuration unchanged; nothing to do");
            inner.current = Some(current);
            return Ok(());
        }

        self.events.notify(RelayEvent::Reconfiguring);
        info!(?config, "applying new relay configuration");

        let needs_new_socket = config.enabled
            && (config.port == 0 || !current.config.enabled || current.config.port != config.port);
        let prebound = if needs_new_socket {
            match self.bind(config.port).await {
                Ok(listener) => Some(listener),
                Err(e) => {
                    warn!("keeping current configuration: {e}");
                    inner.current = Some(current);
                    return Err(e);
                }
            }
        } else {
            None
        };

        let previous = Arc::clone(&current.config);
        self.state.send_replace(SupervisorState::Draining);
        let survivors = self.drain(current, RunSignal::Draining).await;
        if !survivors.workers.is_empty() {
            let count = survivors.workers.len();
            warn!(count, "sessions outlived the drain timeout; they keep the previous configuration");
            self.events.notify(RelayEvent::TimeoutWarning { lingering: count });
            inner.lingering.push(survivors);
        }

        self.state.send_replace(SupervisorState::Starting);
        match self.launch(config, prebound).await {
            Ok(generation) => {
                inner.current = Some(generation);
                self.state.send_replace(SupervisorState::Running);
                Ok(())
            }
            Err(e) => {
                warn!("restart failed, restoring previous configuration: {e}");
                match self.launch(previous, None).await {
                    Ok(generation) => {
                        inner.current = Some(generation);
                        self.state.send_replace(SupervisorState::Running);
                    }
                    Err(fallback) => {
                        error!("previous configuration could not be restored: {fallback}");
                        self.state.send_replace(SupervisorState::Stopped);
                    }
                }
                Err(e)
            }
        }
    }

    /// Closes the listener and ends every session, authenticated or not.
    ///
    /// Workers get the drain timeout to finish their current exchange and are
    /// aborted after that.
    pub async fn stop(&self) {
        let mut inner = self.inner.lock().await;
        let current = inner.current.take();
        if current.is_none() && inner.lingering.is_empty() {
            return;
        }
        self.state.send_replace(SupervisorState::Draining);

        for lingering in &inner.lingering {
            lingering.control.send_replace(RunSignal::Stopping);
        }
        let mut remaining: Vec<JoinSet<()>> = Vec::new();
        if let Some(current) = current {
            remaining.push(self.drain(current, RunSignal::Stopping).await.workers);
        }

        let deadline = Instant::now() + self.options.drain_timeout;
        for lingering in std::mem::take(&mut inner.lingering) {
            let mut workers = lingering.workers;
            join_until(&mut workers, deadline).await;
            remaining.push(workers);
        }
        for mut workers in remaining {
            if !workers.is_empty() {
                warn!(count = workers.len(), "aborting sessions that did not stop in time");
            }
            workers.shutdown().await;
        }

        self.state.send_replace(SupervisorState::Stopped);
        info!("relay stopped");
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    async fn start_locked(
        &self,
        inner: &mut Inner,
        config: Arc<RelayConfig>,
    ) -> Result<(), RelayError> {
        self.state.send_replace(SupervisorState::Starting);
        match self.launch(config, None).await {
            Ok(generation) => {
                inner.current = Some(generation);
                self.state.send_replace(SupervisorState::Running);
                Ok(())
            }
            Err(e) => {
                self.state.send_replace(SupervisorState::Stopped);
                Err(e)
            }
        }
    }

    async fn bind(&self, port: u16) -> Result<TcpListener, RelayError> {
        let addr = SocketAddr::new(self.options.bind_address, port);
        TcpListener::bind(addr)
            .await
            .map_err(|source| RelayError::Bind { addr, source })
    }

    async fn launch(
        &self,
        config: Arc<RelayConfig>,
        prebound: Option<TcpListener>,
    ) -> Result<Generation, RelayError> {
        let (control, control_rx) = watch::channel(RunSignal::Running);

        if !config.enabled {
            info!("relay disabled; waiting for configuration");
            let task = tokio::spawn(idle_loop(
                self.options.disabled_poll_interval,
                Arc::clone(&self.events),
                control_rx,
            ));
            return Ok(Generation {
                config,
                local_addr: None,
                control,
                task,
            });
        }

        let listener = match prebound {
            Some(listener) => listener,
            None => self.bind(config.port).await?,
        };
        let local_addr = listener.local_addr()?;
        info!(
            %local_addr,
            encryption = config.encryption_enabled,
            allow_list = config.allowed_addresses.len(),
            "relay listening"
        );
        self.events.notify(RelayEvent::Started { addr: local_addr });

        let accept = AcceptLoop {
            listener,
            config: Arc::clone(&config),
            options: self.options.clone(),
            ledger: self.ledger.clone(),
            events: Arc::clone(&self.events),
            active: Arc::clone(&self.active),
            control: control_rx,
        };
        Ok(Generation {
            config,
            local_addr: Some(local_addr),
            control,
            task: tokio::spawn(accept.run()),
        })
    }

    /// Signals `generation`, waits up to the drain timeout, and hands back
    /// whatever workers are still running.
    async fn drain(&self, mut generation: Generation, signal: RunSignal) -> Lingering {
        generation.control.send_replace(signal);
        let deadline = Instant::now() + self.options.drain_timeout;

        let mut workers = match timeout_at(deadline, &mut generation.task).await {
            Ok(Ok(workers)) => workers,
            Ok(Err(e)) => {
                error!("listener task failed: {e}");
                JoinSet::new()
            }
            Err(_) => {
                warn!("listener did not close in time; aborting it");
                generation.task.abort();
                JoinSet::new()
            }
        };
        join_until(&mut workers, deadline).await;

        Lingering {
            control: generation.control,
            workers,
        }
    }
}

// ── Accept loop ───────────────────────────────────────────────────────────────

struct AcceptLoop {
    listener: TcpListener,
    config: Arc<RelayConfig>,
    options: ListenerOptions,
    ledger: LockoutLedger,
    events: Arc<dyn EventSink>,
    active: Arc<AtomicUsize>,
    control: watch::Receiver<RunSignal>,
}

impl AcceptLoop {
    /// Accepts until the control signal leaves `Running`, then closes the
    /// listener and returns the workers it spawned.
    async fn run(mut self) -> JoinSet<()> {
        let mut workers = JoinSet::new();
        let idle = self.options.accept_idle_timeout;

        loop {
            while let Some(result) = workers.try_join_next() {
                log_worker_exit(result);
            }
            if *self.control.borrow_and_update() != RunSignal::Running {
                break;
            }

            tokio::select! {
                changed = self.control.changed() => {
                    if changed.is_err() {
                        debug!("supervisor dropped; closing listener");
                        break;
                    }
                }
                accepted = timeout(idle, self.listener.accept()) => match accepted {
                    Ok(Ok((stream, peer))) => self.spawn_worker(&mut workers, stream, peer),
                    Ok(Err(e)) => error!("accept error: {e}"),
                    // No connection within the idle window; re-check the signal.
                    Err(_) => {}
                },
            }
        }

        debug!(workers = workers.len(), "listener closed");
        workers
    }

    fn spawn_worker(&self, workers: &mut JoinSet<()>, stream: TcpStream, peer: SocketAddr) {
        debug!(%peer, "connection accepted");
        if let Err(e) = stream.set_nodelay(true) {
            debug!(%peer, "could not set TCP_NODELAY: {e}");
        }
        let ctx = WorkerContext {
            config: Arc::clone(&self.config),
            accept_delay: self.options.accept_delay,
            max_frame_bytes: self.options.max_frame_bytes,
            ledger: self.ledger.clone(),
            events: Arc::clone(&self.events),
            control: self.control.clone(),
        };
        let downstream =
            DownstreamBridge::new(self.options.downstream.clone(), self.options.max_frame_bytes);
        let guard = ActiveSession::enter(&self.active);
        workers.spawn(async move {
            let _guard = guard;
            serve_connection(stream, peer, downstream, ctx).await;
        });
    }
}

async fn idle_loop(
    poll: Duration,
    events: Arc<dyn EventSink>,
    mut control: watch::Receiver<RunSignal>,
) -> JoinSet<()> {
    loop {
        if *control.borrow_and_update() != RunSignal::Running {
            break;
        }
        events.notify(RelayEvent::IdleWait);
        tokio::select! {
            changed = control.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::time::sleep(poll) => {}
        }
    }
    JoinSet::new()
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Counts a running worker; decrements on drop, including on abort.
struct ActiveSession(Arc<AtomicUsize>);

impl ActiveSession {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn join_until(workers: &mut JoinSet<()>, deadline: Instant) {
    while let Ok(Some(result)) = timeout_at(deadline, workers.join_next()).await {
        log_worker_exit(result);
    }
}

fn log_worker_exit(result: Result<(), JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            error!("session worker panicked: {e}");
        }
    }
}

fn reap_lingering(inner: &mut Inner) {
    inner.lingering.retain_mut(|lingering| {
        while let Some(result) = lingering.workers.try_join_next() {
            log_worker_exit(result);
        }
        !lingering.workers.is_empty()
    });
}

// ── Tests ─────────────────────────────────────────────────────────────────────
