//! The synchronization core.
//!
//! [`SyncServer`] owns the log, the registry and the event stream, and
//! exposes the three callbacks a transport collaborator drives:
//! [`on_connect`](SyncServer::on_connect), [`on_frame`](SyncServer::on_frame)
//! and [`on_close`](SyncServer::on_close). It never opens sockets itself.

use crate::config::Config;
use crate::error::{ProtocolError, ServerError, SyncError, SyncErrorKind};
use crate::gc;
use crate::hooks::{AllowAll, AuthOutcome, Authenticator, Authorizer};
use crate::options::ServerOptions;
use crate::protocol::{Frame, SubprotocolRange, PROTOCOL_VERSION};
use crate::registry::{ClientRegistry, SubscriptionFilter};
use crate::reporter::{Event, Reporter};
use crate::session::{Session, SessionState};
use crate::store::{MemoryStore, MetaStore};
use dashmap::DashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use sync_types::{Action, ActionId, Meta};
use tokio::sync::mpsc::UnboundedReceiver;

type UnbindFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;
type UnbindTask = Box<dyn FnOnce() -> UnbindFuture + Send>;

/// The synchronization core.
///
/// Configure with the setters, wrap in an [`Arc`], then hand the `Arc` to
/// the transport. All runtime entry points take `&Arc<Self>` because
/// background timers (handshake deadline, zombie grace, periodic GC) keep
/// weak references back to the server.
pub struct SyncServer {
    options: ServerOptions,
    config: Config,
    supports: SubprotocolRange,
    reporter: Arc<dyn Reporter>,
    store: Arc<dyn MetaStore>,
    registry: ClientRegistry,
    sessions: DashMap<u64, Arc<Session>>,
    next_session: AtomicU64,
    authenticator: Option<Arc<dyn Authenticator>>,
    authorizer: Arc<dyn Authorizer>,
    subscription: Arc<SubscriptionFilter>,
    unbind: Mutex<Vec<UnbindTask>>,
    gc_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    destroyed: AtomicBool,
}

impl std::fmt::Debug for SyncServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncServer")
            .field("options", &self.options)
            .field("config", &self.config)
            .field("sessions", &self.sessions.len())
            .field("nodes", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl SyncServer {
    /// Create a server with the in-memory store and an allow-all
    /// authorization policy.
    ///
    /// Fails when the options' `supports` range does not parse.
    pub fn new(
        options: ServerOptions,
        config: Config,
        reporter: Arc<dyn Reporter>,
    ) -> Result<Self, ServerError> {
        let supports = SubprotocolRange::parse(&options.supports)?;
        Ok(Self {
            options,
            config,
            supports,
            reporter,
            store: Arc::new(MemoryStore::new()),
            registry: ClientRegistry::new(),
            sessions: DashMap::new(),
            next_session: AtomicU64::new(0),
            authenticator: None,
            authorizer: Arc::new(AllowAll),
            subscription: Arc::new(
                |_: &Action, _: &Meta, _: &crate::reporter::SessionInfo| true,
            ),
            unbind: Mutex::new(Vec::new()),
            gc_task: Mutex::new(None),
            destroyed: AtomicBool::new(false),
        })
    }

    /// Supply the mandatory authentication hook.
    pub fn set_authenticator(&mut self, authenticator: Arc<dyn Authenticator>) {
        self.authenticator = Some(authenticator);
    }

    /// Replace the authorization policy (default: allow everything).
    pub fn set_authorizer(&mut self, authorizer: Arc<dyn Authorizer>) {
        self.authorizer = authorizer;
    }

    /// Replace the subscription predicate used during fan-out (default:
    /// every session is interested in every action).
    pub fn set_subscription(&mut self, filter: Arc<SubscriptionFilter>) {
        self.subscription = filter;
    }

    /// Replace the log backend (default: [`MemoryStore`]).
    pub fn set_store(&mut self, store: Arc<dyn MetaStore>) {
        self.store = store;
    }

    /// The resolved server options.
    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    /// The log backend.
    pub fn store(&self) -> &Arc<dyn MetaStore> {
        &self.store
    }

    /// The node-to-session registry.
    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    /// Sessions currently known to the server, in any state.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Register an asynchronous cleanup task executed by
    /// [`destroy`](SyncServer::destroy).
    pub fn add_unbind<F, Fut>(&self, task: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.unbind
            .lock()
            .unwrap()
            .push(Box::new(move || Box::pin(task())));
    }

    /// Announce that the transport is bound and start the periodic GC.
    ///
    /// The transport binding itself happens outside the core; bind
    /// failures surface as [`ServerError::Bind`] from the embedding
    /// process and are fatal, never retried.
    pub fn listen(self: &Arc<Self>) -> Result<(), ServerError> {
        if self.authenticator.is_none() {
            return Err(ServerError::MissingAuthenticator);
        }
        self.reporter.report(Event::Listen {
            host: self.options.host.clone(),
            port: self.options.port,
            tls: self.options.tls(),
        });
        if self.config.gc.enabled {
            let handle = gc::spawn_gc_task(Arc::downgrade(self), self.config.gc.clone());
            *self.gc_task.lock().unwrap() = Some(handle);
        }
        Ok(())
    }

    /// Transport callback: a connection arrived.
    ///
    /// Returns the session id and the outbound frame channel the transport
    /// must drain. A handshake deadline starts immediately; connections
    /// that never send a handshake frame are closed.
    pub fn on_connect(self: &Arc<Self>) -> (u64, UnboundedReceiver<Frame>) {
        let id = self.next_session.fetch_add(1, Ordering::Relaxed) + 1;
        let (session, rx) = Session::new(id);
        let session = Arc::new(session);
        self.sessions.insert(id, session.clone());
        self.reporter.report(Event::Connect {
            session: session.info(),
        });

        let weak = Arc::downgrade(self);
        let deadline = self.config.limits.hello_timeout();
        tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            let Some(server) = weak.upgrade() else { return };
            let Some(session) = server.session(id) else { return };
            if session.state() == SessionState::Connected {
                let err = ProtocolError::Timeout { phase: "handshake" };
                server.client_protocol_error(&session, err);
            }
        });

        (id, rx)
    }

    /// Transport callback: an inbound frame for a session.
    ///
    /// Frames of one session are handled serially, preserving the order
    /// the originating node issued its sequence counters in.
    pub async fn on_frame(self: &Arc<Self>, session_id: u64, frame: Frame) {
        let Some(session) = self.session(session_id) else {
            return;
        };
        let _gate = session.frame_gate.lock().await;
        if session.is_closed() {
            // Terminal state: pending intake for the session is abandoned.
            return;
        }
        match frame {
            Frame::Hello {
                protocol,
                subprotocol,
                node_id,
                credentials,
            } => {
                self.handle_hello(&session, protocol, subprotocol, node_id, credentials)
                    .await
            }
            Frame::Action { action, meta } => self.ingest(&session, action, meta).await,
            Frame::Ack { id } => self.acknowledge(&session, id).await,
            Frame::Bye => self.finish_close(&session),
            other @ (Frame::Welcome { .. } | Frame::Error { .. }) => {
                let err = ProtocolError::UnexpectedFrame {
                    expected: session.expected_frames().to_string(),
                    actual: other.name().to_string(),
                };
                self.client_protocol_error(&session, err);
            }
        }
    }

    /// Transport callback: the connection went away.
    pub async fn on_close(self: &Arc<Self>, session_id: u64) {
        if let Some(session) = self.session(session_id) {
            self.finish_close(&session);
        }
    }

    /// Look up a session by id.
    pub fn session(&self, session_id: u64) -> Option<Arc<Session>> {
        self.sessions.get(&session_id).map(|entry| entry.value().clone())
    }

    async fn handle_hello(
        self: &Arc<Self>,
        session: &Arc<Session>,
        protocol: u32,
        subprotocol: String,
        node_id: String,
        credentials: serde_json::Value,
    ) {
        if session.state() != SessionState::Connected {
            let err = ProtocolError::UnexpectedFrame {
                expected: session.expected_frames().to_string(),
                actual: "hello".to_string(),
            };
            return self.client_protocol_error(session, err);
        }
        session.begin_handshake(subprotocol.clone(), protocol);

        if protocol != PROTOCOL_VERSION {
            let err = ProtocolError::MalformedHandshake {
                reason: format!(
                    "sync protocol {protocol} is not supported (server speaks {PROTOCOL_VERSION})"
                ),
            };
            return self.client_protocol_error(session, err);
        }
        if let Err(err) = self.supports.check(&subprotocol) {
            return self.client_protocol_error(session, err);
        }

        session.begin_authentication();
        let Some(authenticator) = self.authenticator.clone() else {
            self.reporter.report(Event::RuntimeError {
                error: "authentication hook missing".to_string(),
                action: None,
                meta: None,
            });
            self.reporter.report(Event::Unauthenticated {
                session: session.info(),
            });
            return self.finish_close(session);
        };

        let outcome = tokio::time::timeout(
            self.config.limits.auth_timeout(),
            authenticator.authenticate(&credentials, &node_id),
        )
        .await;

        if session.is_closed() {
            // The session closed while the hook was pending; the result is
            // discarded rather than applied to a dead session.
            return;
        }

        match outcome {
            Err(_elapsed) => {
                let err = ProtocolError::Timeout {
                    phase: "authentication",
                };
                session.send(Frame::Error {
                    message: err.to_string(),
                });
                self.reporter.report(Event::Unauthenticated {
                    session: session.info(),
                });
                self.finish_close(session);
            }
            Ok(Err(hook_error)) => {
                let err = SyncError::server(SyncErrorKind::Hook(hook_error.to_string()));
                self.report_sync_error(session, &err);
                self.reporter.report(Event::Unauthenticated {
                    session: session.info(),
                });
                self.finish_close(session);
            }
            Ok(Ok(AuthOutcome::Denied)) => {
                session.send(Frame::Error {
                    message: "authentication rejected".to_string(),
                });
                self.reporter.report(Event::Unauthenticated {
                    session: session.info(),
                });
                self.finish_close(session);
            }
            Ok(Ok(AuthOutcome::Granted { user })) => {
                if !session.synchronize(node_id.clone(), user) {
                    return;
                }
                if let Some(demoted) = self.registry.insert(&node_id, session.clone()) {
                    self.reporter.report(Event::Zombie {
                        session: demoted.info(),
                    });
                    self.schedule_zombie_close(demoted);
                }
                self.reporter.report(Event::Authenticated {
                    session: session.info(),
                });
                session.send(Frame::Welcome {
                    subprotocol: self.options.subprotocol.clone(),
                    node_id: self.options.node_id.clone(),
                });
            }
        }
    }

    async fn ingest(self: &Arc<Self>, session: &Arc<Session>, action: Action, mut meta: Meta) {
        if !session.is_live() && !session.is_zombie() {
            let err = ProtocolError::UnexpectedFrame {
                expected: session.expected_frames().to_string(),
                actual: "action".to_string(),
            };
            return self.client_protocol_error(session, err);
        }

        let started = Instant::now();
        let info = session.info();
        let decision = self.authorizer.authorize(&action, &meta, &info).await;

        if session.is_closed() {
            // Abandoned: the session closed while authorization was
            // pending, so the result is discarded.
            return;
        }

        match decision {
            Ok(true) => {
                // Retain the action until every recipient acknowledges it:
                // one reason tag per target node. The tagged set and the
                // delivered set must be the same sessions, so the fan-out
                // below is pinned to the ids collected here.
                let mut recipient_ids = std::collections::HashSet::new();
                for target in self.registry.live_sessions() {
                    if target.id() == session.id() {
                        continue;
                    }
                    if !(self.subscription)(&action, &meta, &target.info()) {
                        continue;
                    }
                    if let Some(node) = target.node_id() {
                        meta.reasons.insert(node_reason(&node));
                        recipient_ids.insert(target.id());
                    }
                }

                match self.store.add(action.clone(), meta.clone()).await {
                    Ok(applied) => {
                        self.reporter.report(Event::Add {
                            action: action.clone(),
                            meta: meta.clone(),
                        });
                        if applied {
                            self.registry.broadcast(
                                &action,
                                &meta,
                                Some(session.id()),
                                &move |_: &Action, _: &Meta, info: &crate::reporter::SessionInfo| {
                                    recipient_ids.contains(&info.session)
                                },
                            );
                        }
                        self.reporter.report(Event::Processed {
                            action,
                            meta,
                            duration_ms: started.elapsed().as_millis() as u64,
                        });
                        self.collect_garbage().await;
                    }
                    Err(store_error) => {
                        self.reporter.report(Event::RuntimeError {
                            error: store_error.to_string(),
                            action: Some(action),
                            meta: Some(meta),
                        });
                    }
                }
            }
            Ok(false) => {
                self.reporter.report(Event::Denied { action, meta });
            }
            Err(hook_error) => {
                // A failing hook is reported and treated as a denial; it
                // never crashes the process.
                self.reporter.report(Event::RuntimeError {
                    error: hook_error.to_string(),
                    action: Some(action),
                    meta: Some(meta),
                });
            }
        }
    }

    async fn acknowledge(self: &Arc<Self>, session: &Arc<Session>, id: ActionId) {
        let Some(node) = session.node_id() else {
            let err = ProtocolError::UnexpectedFrame {
                expected: session.expected_frames().to_string(),
                actual: "ack".to_string(),
            };
            return self.client_protocol_error(session, err);
        };
        match self
            .store
            .change_reasons(&id, &[], &[node_reason(&node)])
            .await
        {
            Ok(_known) => {
                self.collect_garbage().await;
            }
            Err(store_error) => {
                self.reporter.report(Event::RuntimeError {
                    error: store_error.to_string(),
                    action: None,
                    meta: None,
                });
            }
        }
    }

    /// Remove every entry whose reasons are all satisfied, reporting a
    /// `clean` event per removed action. Returns how many were removed.
    pub async fn collect_garbage(&self) -> usize {
        match self.store.collect().await {
            Ok(removed) => {
                let count = removed.len();
                for (action, meta) in removed {
                    self.reporter.report(Event::Clean { action, meta });
                }
                count
            }
            Err(store_error) => {
                self.reporter.report(Event::RuntimeError {
                    error: store_error.to_string(),
                    action: None,
                    meta: None,
                });
                0
            }
        }
    }

    /// Run all registered unbind tasks to completion, close every session
    /// and emit `destroy`.
    ///
    /// A failing unbind task is recorded as a `runtimeError` and never
    /// prevents the remaining tasks from running. Calling `destroy` twice
    /// is a no-op.
    pub async fn destroy(self: &Arc<Self>) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }

        let tasks: Vec<UnbindTask> = std::mem::take(&mut *self.unbind.lock().unwrap());
        for task in tasks {
            if let Err(error) = task().await {
                self.reporter.report(Event::RuntimeError {
                    error: error.to_string(),
                    action: None,
                    meta: None,
                });
            }
        }

        if let Some(handle) = self.gc_task.lock().unwrap().take() {
            handle.abort();
        }

        let sessions: Vec<Arc<Session>> = self
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        for session in sessions {
            session.send(Frame::Bye);
            self.finish_close(&session);
        }

        self.reporter.report(Event::Destroy);
    }

    fn schedule_zombie_close(self: &Arc<Self>, zombie: Arc<Session>) {
        let weak = Arc::downgrade(self);
        let grace = self.config.limits.zombie_grace();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if let Some(server) = weak.upgrade() {
                server.finish_close(&zombie);
            }
        });
    }

    /// Report a client-caused protocol violation, tell the client and
    /// close its session. Other sessions are unaffected.
    fn client_protocol_error(&self, session: &Arc<Session>, err: ProtocolError) {
        self.reporter.report(Event::ClientError {
            session: session.info(),
            error: err.to_string(),
        });
        session.send(Frame::Error {
            message: err.to_string(),
        });
        self.finish_close(session);
    }

    fn report_sync_error(&self, session: &Arc<Session>, err: &SyncError) {
        let event = if err.client_caused {
            Event::ClientError {
                session: session.info(),
                error: err.to_string(),
            }
        } else {
            Event::SyncError {
                session: session.info(),
                error: err.to_string(),
            }
        };
        self.reporter.report(event);
    }

    /// Move a session to `Closing`, drop its registry entry and report the
    /// disconnect. Exactly one racing close path wins.
    fn finish_close(&self, session: &Arc<Session>) {
        let info = session.info();
        let node_id = session.node_id();
        if !session.close() {
            return;
        }
        if let Some(node_id) = node_id {
            self.registry.remove(&node_id, session.id());
        }
        self.sessions.remove(&session.id());
        self.reporter.report(Event::Disconnect { session: info });
    }
}

fn node_reason(node_id: &str) -> String {
    format!("node:{node_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GcConfig, LimitsConfig};
    use crate::hooks::OpenAccess;
    use crate::options::{resolve, ExplicitOptions};
    use crate::reporter::testing::RecordingReporter;
    use crate::reporter::SessionInfo;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    struct RejectAll;

    #[async_trait]
    impl Authenticator for RejectAll {
        async fn authenticate(
            &self,
            _credentials: &serde_json::Value,
            _node_id: &str,
        ) -> anyhow::Result<AuthOutcome> {
            Ok(AuthOutcome::Denied)
        }
    }

    struct FailingAuth;

    #[async_trait]
    impl Authenticator for FailingAuth {
        async fn authenticate(
            &self,
            _credentials: &serde_json::Value,
            _node_id: &str,
        ) -> anyhow::Result<AuthOutcome> {
            anyhow::bail!("auth backend unreachable")
        }
    }

    struct DenyAll;

    #[async_trait]
    impl Authorizer for DenyAll {
        async fn authorize(
            &self,
            _action: &Action,
            _meta: &Meta,
            _session: &SessionInfo,
        ) -> anyhow::Result<bool> {
            Ok(false)
        }
    }

    struct FailingAuthz;

    #[async_trait]
    impl Authorizer for FailingAuthz {
        async fn authorize(
            &self,
            _action: &Action,
            _meta: &Meta,
            _session: &SessionInfo,
        ) -> anyhow::Result<bool> {
            anyhow::bail!("policy store down")
        }
    }

    fn test_options() -> ServerOptions {
        resolve(
            ExplicitOptions {
                subprotocol: Some("1.0.0".into()),
                supports: Some("2.x || 1.x".into()),
                node_id: Some("server:test".into()),
                ..ExplicitOptions::default()
            },
            &[],
            &HashMap::new(),
        )
        .unwrap()
    }

    fn test_config() -> Config {
        Config {
            limits: LimitsConfig {
                hello_timeout_secs: 5,
                auth_timeout_secs: 5,
                zombie_grace_ms: 20,
            },
            gc: GcConfig {
                interval_secs: 60,
                enabled: false,
            },
        }
    }

    fn test_server(reporter: Arc<RecordingReporter>) -> Arc<SyncServer> {
        let mut server = SyncServer::new(test_options(), test_config(), reporter).unwrap();
        server.set_authenticator(Arc::new(OpenAccess));
        Arc::new(server)
    }

    fn hello(node: &str) -> Frame {
        Frame::Hello {
            protocol: PROTOCOL_VERSION,
            subprotocol: "1.0.0".into(),
            node_id: node.into(),
            credentials: serde_json::Value::Null,
        }
    }

    async fn open(
        server: &Arc<SyncServer>,
        node: &str,
    ) -> (u64, UnboundedReceiver<Frame>) {
        let (id, mut rx) = server.on_connect();
        server.on_frame(id, hello(node)).await;
        let welcome = rx.try_recv().expect("welcome frame");
        assert!(matches!(welcome, Frame::Welcome { .. }));
        (id, rx)
    }

    fn action_frame(kind: &str, time: u64, node: &str, seq: u64) -> (Frame, ActionId) {
        let id = ActionId::new(time, node, seq);
        let frame = Frame::Action {
            action: Action::new(kind),
            meta: Meta::new(id.clone(), 0, "server:test"),
        };
        (frame, id)
    }

    #[tokio::test]
    async fn handshake_and_authentication_succeed() {
        let reporter = Arc::new(RecordingReporter::new());
        let server = test_server(reporter.clone());

        let (id, _rx) = open(&server, "client:a").await;

        assert_eq!(reporter.names(), vec!["connect", "authenticated"]);
        let session = server.session(id).unwrap();
        assert!(session.is_live());
        assert_eq!(session.remote_subprotocol().as_deref(), Some("1.0.0"));
        assert_eq!(server.registry().get("client:a").unwrap().id(), id);
    }

    #[tokio::test]
    async fn subprotocol_mismatch_closes_only_that_session() {
        let reporter = Arc::new(RecordingReporter::new());
        let server = test_server(reporter.clone());
        let (_ok, _rx_ok) = open(&server, "client:ok").await;

        let (id, mut rx) = server.on_connect();
        server
            .on_frame(
                id,
                Frame::Hello {
                    protocol: PROTOCOL_VERSION,
                    subprotocol: "3.0.0".into(),
                    node_id: "client:new".into(),
                    credentials: serde_json::Value::Null,
                },
            )
            .await;

        assert!(matches!(rx.try_recv(), Ok(Frame::Error { .. })));
        assert!(reporter.saw("clientError"));
        assert!(server.session(id).is_none(), "offender removed");
        assert!(server.registry().get("client:ok").is_some(), "others kept");
    }

    #[tokio::test]
    async fn rejected_credentials_emit_unauthenticated() {
        let reporter = Arc::new(RecordingReporter::new());
        let mut server = SyncServer::new(test_options(), test_config(), reporter.clone()).unwrap();
        server.set_authenticator(Arc::new(RejectAll));
        let server = Arc::new(server);

        let (id, mut rx) = server.on_connect();
        server.on_frame(id, hello("client:a")).await;

        assert!(matches!(rx.try_recv(), Ok(Frame::Error { .. })));
        assert_eq!(
            reporter.names(),
            vec!["connect", "unauthenticated", "disconnect"]
        );
        assert!(server.session(id).is_none());
    }

    #[tokio::test]
    async fn failing_auth_hook_is_reported_not_fatal() {
        let reporter = Arc::new(RecordingReporter::new());
        let mut server = SyncServer::new(test_options(), test_config(), reporter.clone()).unwrap();
        server.set_authenticator(Arc::new(FailingAuth));
        let server = Arc::new(server);

        let (id, _rx) = server.on_connect();
        server.on_frame(id, hello("client:a")).await;

        assert!(reporter.saw("syncError"));
        assert!(reporter.saw("unauthenticated"));
        assert!(server.session(id).is_none());
    }

    #[tokio::test]
    async fn second_authentication_demotes_the_first_session() {
        let reporter = Arc::new(RecordingReporter::new());
        let server = test_server(reporter.clone());

        let (first, mut first_rx) = open(&server, "client:a").await;
        let (second, mut second_rx) = open(&server, "client:a").await;
        let (_other, _other_rx) = open(&server, "client:b").await;

        assert!(reporter.saw("zombie"));
        assert!(server.session(first).unwrap().is_zombie());
        assert_eq!(server.registry().get("client:a").unwrap().id(), second);

        // A broadcast from client:b reaches the live session only.
        let (frame, _) = action_frame("x/add", 1, "client:b", 0);
        let from = server.registry().get("client:b").unwrap().id();
        server.on_frame(from, frame).await;

        assert!(matches!(second_rx.try_recv(), Ok(Frame::Action { .. })));
        assert!(first_rx.try_recv().is_err(), "zombie gets no broadcasts");

        // After the grace delay the zombie is force-closed.
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(server.session(first).is_none());
        assert!(server.session(second).is_some());
    }

    #[tokio::test]
    async fn approved_action_is_stored_broadcast_and_reported() {
        let reporter = Arc::new(RecordingReporter::new());
        let server = test_server(reporter.clone());

        let (sender, _sender_rx) = open(&server, "client:a").await;
        let (_receiver, mut receiver_rx) = open(&server, "client:b").await;

        let (frame, id) = action_frame("x/add", 1, "client:a", 0);
        server.on_frame(sender, frame).await;

        let (_, stored) = server.store().get(&id).await.unwrap().expect("stored");
        assert!(
            stored.reasons.contains("node:client:b"),
            "retained until the recipient acknowledges"
        );
        assert!(matches!(receiver_rx.try_recv(), Ok(Frame::Action { .. })));
        assert!(reporter.saw("add"));
        assert!(reporter.saw("processed"));
    }

    #[tokio::test]
    async fn duplicate_action_is_not_rebroadcast() {
        let reporter = Arc::new(RecordingReporter::new());
        let server = test_server(reporter.clone());

        let (sender, _sender_rx) = open(&server, "client:a").await;
        let (_receiver, mut receiver_rx) = open(&server, "client:b").await;

        let (frame, _) = action_frame("x/add", 1, "client:a", 0);
        server.on_frame(sender, frame.clone()).await;
        assert!(receiver_rx.try_recv().is_ok());

        server.on_frame(sender, frame).await;
        assert!(receiver_rx.try_recv().is_err(), "no duplicate delivery");
        assert_eq!(server.store().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn denied_action_is_absent_from_the_store() {
        let reporter = Arc::new(RecordingReporter::new());
        let mut server = SyncServer::new(test_options(), test_config(), reporter.clone()).unwrap();
        server.set_authenticator(Arc::new(OpenAccess));
        server.set_authorizer(Arc::new(DenyAll));
        let server = Arc::new(server);

        let (sender, _rx) = open(&server, "client:a").await;
        let (frame, id) = action_frame("x/add", 1, "client:a", 0);
        server.on_frame(sender, frame).await;

        assert!(reporter.saw("denied"));
        assert!(server.store().get(&id).await.unwrap().is_none());
        assert!(
            server.session(sender).is_some(),
            "denial does not close the session"
        );
    }

    #[tokio::test]
    async fn failing_authorizer_reports_runtime_error_and_denies() {
        let reporter = Arc::new(RecordingReporter::new());
        let mut server = SyncServer::new(test_options(), test_config(), reporter.clone()).unwrap();
        server.set_authenticator(Arc::new(OpenAccess));
        server.set_authorizer(Arc::new(FailingAuthz));
        let server = Arc::new(server);

        let (sender, _rx) = open(&server, "client:a").await;
        let (frame, id) = action_frame("x/add", 1, "client:a", 0);
        server.on_frame(sender, frame).await;

        assert!(reporter.saw("runtimeError"));
        assert!(!reporter.saw("denied"), "hook failure is its own event");
        assert!(server.store().get(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn acknowledgements_release_the_action_for_collection() {
        let reporter = Arc::new(RecordingReporter::new());
        let server = test_server(reporter.clone());

        let (sender, _sender_rx) = open(&server, "client:a").await;
        let (receiver, mut receiver_rx) = open(&server, "client:b").await;

        let (frame, id) = action_frame("x/add", 1, "client:a", 0);
        server.on_frame(sender, frame).await;
        assert!(receiver_rx.try_recv().is_ok());
        assert!(server.store().get(&id).await.unwrap().is_some());

        server.on_frame(receiver, Frame::Ack { id: id.clone() }).await;

        assert!(reporter.saw("clean"));
        assert!(server.store().get(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn action_before_handshake_is_a_protocol_error() {
        let reporter = Arc::new(RecordingReporter::new());
        let server = test_server(reporter.clone());

        let (id, mut rx) = server.on_connect();
        let (frame, _) = action_frame("x/add", 1, "client:a", 0);
        server.on_frame(id, frame).await;

        assert!(reporter.saw("clientError"));
        assert!(matches!(rx.try_recv(), Ok(Frame::Error { .. })));
        assert!(server.session(id).is_none());
    }

    #[tokio::test]
    async fn handshake_deadline_closes_idle_connections() {
        let reporter = Arc::new(RecordingReporter::new());
        let mut config = test_config();
        config.limits.hello_timeout_secs = 0;
        let mut server = SyncServer::new(test_options(), config, reporter.clone()).unwrap();
        server.set_authenticator(Arc::new(OpenAccess));
        let server = Arc::new(server);

        let (id, _rx) = server.on_connect();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(server.session(id).is_none());
        assert!(reporter.saw("clientError"));
        assert!(reporter.saw("disconnect"));
    }

    #[tokio::test]
    async fn listen_requires_an_authenticator() {
        let reporter = Arc::new(RecordingReporter::new());
        let server =
            Arc::new(SyncServer::new(test_options(), test_config(), reporter.clone()).unwrap());
        assert!(matches!(
            server.listen(),
            Err(ServerError::MissingAuthenticator)
        ));

        let server = test_server(reporter.clone());
        server.listen().unwrap();
        assert!(reporter.saw("listen"));
    }

    #[tokio::test]
    async fn destroy_runs_every_unbind_task_before_the_event() {
        let reporter = Arc::new(RecordingReporter::new());
        let server = test_server(reporter.clone());

        let slow_finished = Arc::new(AtomicBool::new(false));
        let flag = slow_finished.clone();
        server.add_unbind(move || async move {
            anyhow::bail!("first task fails")
        });
        server.add_unbind(move || async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });

        server.destroy().await;

        assert!(
            slow_finished.load(Ordering::SeqCst),
            "slow task ran to completion despite the earlier failure"
        );
        let names = reporter.names();
        let runtime_error = names.iter().position(|n| *n == "runtimeError").unwrap();
        let destroy = names.iter().position(|n| *n == "destroy").unwrap();
        assert!(runtime_error < destroy, "failures recorded before destroy");

        // Destroy is idempotent.
        server.destroy().await;
        assert_eq!(
            reporter.names().iter().filter(|n| **n == "destroy").count(),
            1
        );
    }

    #[tokio::test]
    async fn destroy_closes_open_sessions() {
        let reporter = Arc::new(RecordingReporter::new());
        let server = test_server(reporter.clone());
        let (id, mut rx) = open(&server, "client:a").await;

        server.destroy().await;

        assert!(matches!(rx.try_recv(), Ok(Frame::Bye)));
        assert!(server.session(id).is_none());
        assert!(reporter.saw("disconnect"));
        assert!(reporter.saw("destroy"));
    }

    #[tokio::test]
    async fn invalid_supports_range_is_fatal_at_construction() {
        let mut options = test_options();
        options.supports = "not a range".into();
        let err = SyncServer::new(options, test_config(), Arc::new(RecordingReporter::new()))
            .unwrap_err();
        assert!(matches!(err, ServerError::Supports(_)));
    }
}
