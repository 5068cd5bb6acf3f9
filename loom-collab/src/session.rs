//! Collaboration session: the glue between local edits, the wire and the
//! renderer.
//!
//! ```text
//! local edit (next snapshot)
//!     │
//!     ▼
//! diff(prev, next) ──► filter_syncable ──► Outbound::send_patch
//!     │                      │
//!     │                      └──► apply(prev, allowed) ──► commit ──► observer
//!     │
//! inbound patch ──► filter_syncable ──► apply ──► commit ──► observer
//! inbound presence ──► PresenceTracker ──► observer
//! ```
//!
//! [`CollabSession`] is plain state behind `&mut self`. [`spawn_session`]
//! moves it into one task together with the transport so local commands,
//! inbound events and presence timers are serialized through a single
//! `select!` loop.

use std::fmt;
use std::time::Instant;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use loom_core::model::{Point, PositioningMode};
use loom_core::pages::{self, PageError};
use loom_core::patch::{self, ApplyError, Operation};
use loom_core::scope::{filter_syncable, LocalOverrides};
use loom_core::{tree, Document};

use crate::client::{CollabClient, TransportError, TransportEvent, NORMAL_CLOSE};
use crate::presence::{LocalUser, PresenceConfig, PresenceRecord, PresenceThrottle, PresenceTracker};
use crate::protocol::{CollabMessage, PresenceUpdate};
use crate::storage::{ProjectStore, StoreError};

/// Connection status as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    Failed,
    MissingToken,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStatus::Disconnected => write!(f, "Disconnected"),
            SyncStatus::Connecting => write!(f, "Connecting..."),
            SyncStatus::Connected => write!(f, "Connected"),
            SyncStatus::Reconnecting { attempt } => {
                write!(f, "Connection lost. Reconnecting (attempt {attempt})...")
            }
            SyncStatus::Failed => write!(f, "Could not reconnect after several attempts."),
            SyncStatus::MissingToken => write!(f, "Authentication token is missing."),
        }
    }
}

/// Rendering side of the session. Every method defaults to a no-op.
pub trait SessionObserver: Send {
    /// Receives the view: the document with local overrides merged.
    fn document_changed(&mut self, _view: &Document) {}
    fn presence_changed(&mut self, _cursors: &[PresenceRecord]) {}
    fn status_changed(&mut self, _status: SyncStatus) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl SessionObserver for NoopObserver {}

/// Where outbound frames go.
pub trait Outbound {
    fn send_patch(&self, ops: &[Operation]) -> Result<(), TransportError>;
    fn send_presence(&self, update: &PresenceUpdate) -> Result<(), TransportError>;
}

impl Outbound for CollabClient {
    fn send_patch(&self, ops: &[Operation]) -> Result<(), TransportError> {
        CollabClient::send_patch(self, ops)
    }

    fn send_presence(&self, update: &PresenceUpdate) -> Result<(), TransportError> {
        CollabClient::send_presence(self, update)
    }
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Diff failed: {0}")]
    Diff(#[from] serde_json::Error),
    #[error("Patch rejected: {0}")]
    Apply(#[from] ApplyError),
    #[error(transparent)]
    Page(#[from] PageError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("Session task has stopped")]
    Closed,
}

// ─── Session state ──────────────────────────────────────────────

/// One user's editing session on one project.
pub struct CollabSession {
    user: LocalUser,
    document: Document,
    overrides: LocalOverrides,
    presence: PresenceTracker,
    throttle: PresenceThrottle,
    status: SyncStatus,
    observer: Box<dyn SessionObserver>,
}

impl CollabSession {
    pub fn new(user: LocalUser, document: Document, config: PresenceConfig) -> Self {
        Self {
            user,
            document,
            overrides: LocalOverrides::new(),
            presence: PresenceTracker::new(config.ttl),
            throttle: PresenceThrottle::new(config.throttle_interval),
            status: SyncStatus::Disconnected,
            observer: Box::new(NoopObserver),
        }
    }

    pub fn with_observer(mut self, observer: impl SessionObserver + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    pub fn user(&self) -> &LocalUser {
        &self.user
    }

    /// The synchronized snapshot.
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// The snapshot with local overrides merged, as rendered.
    pub fn view(&self) -> Document {
        self.overrides.apply_to(&self.document)
    }

    pub fn overrides(&self) -> &LocalOverrides {
        &self.overrides
    }

    pub fn status(&self) -> SyncStatus {
        self.status
    }

    pub fn cursors(&self) -> Vec<PresenceRecord> {
        self.presence.cursors()
    }

    /// Replace the document wholesale, e.g. after a load.
    pub fn load(&mut self, document: Document) {
        self.document = document;
        self.notify_document();
    }

    fn notify_document(&mut self) {
        let view = self.view();
        self.observer.document_changed(&view);
    }

    fn notify_presence(&mut self) {
        let cursors = self.presence.cursors();
        self.observer.presence_changed(&cursors);
    }

    fn set_status(&mut self, status: SyncStatus) {
        if self.status != status {
            log::debug!("Sync status: {status}");
            self.status = status;
            self.observer.status_changed(status);
        }
    }

    /// Commit a local edit and broadcast its synchronized part.
    ///
    /// Only operations inside the synchronized subtree are sent, and the
    /// committed document is `prev` with exactly those operations applied,
    /// so local state matches what peers receive. Send failures are logged;
    /// the edit commits regardless of connection state. Returns the
    /// operations that were committed.
    pub fn apply_local_change(
        &mut self,
        next: Document,
        out: &dyn Outbound,
    ) -> Result<Vec<Operation>, SessionError> {
        let ops = filter_syncable(patch::diff(&self.document, &next)?);
        if ops.is_empty() {
            log::trace!("Local change produced no syncable operations");
            return Ok(ops);
        }

        let committed = patch::apply(&self.document, &ops)?;
        match out.send_patch(&ops) {
            Ok(()) => log::trace!("Sent {} operations", ops.len()),
            Err(TransportError::NotConnected) => log::debug!("Offline, {} operations kept local", ops.len()),
            Err(e) => log::warn!("Patch not sent: {e}"),
        }
        self.document = committed;
        self.notify_document();
        Ok(ops)
    }

    /// Switch a page's positioning mode for this user only.
    ///
    /// The mode itself goes into the local overrides; the body rewrite it
    /// implies is an ordinary synchronized edit.
    pub fn change_positioning_mode(
        &mut self,
        page_index: usize,
        mode: PositioningMode,
        out: &dyn Outbound,
    ) -> Result<Vec<Operation>, SessionError> {
        let view = self.view();
        let page = view
            .page(page_index)
            .ok_or(PageError::IndexOutOfRange(page_index))?;
        if page.mode() == mode {
            return Ok(Vec::new());
        }
        let name = page.name.clone();

        let next = pages::update_page_body(&self.document, page_index, |body| {
            tree::adjust_for_mode_change(body, mode)
        })?;
        self.overrides.set_mode(name, mode);
        let ops = self.apply_local_change(next, out)?;
        if ops.is_empty() {
            // Nothing synced but the view still changed.
            self.notify_document();
        }
        Ok(ops)
    }

    /// Rename a page, keeping its local override attached.
    pub fn rename_page(
        &mut self,
        page_index: usize,
        new_name: &str,
        out: &dyn Outbound,
    ) -> Result<Vec<Operation>, SessionError> {
        let next = pages::rename_page(&self.document, page_index, new_name)?;
        let old = self.document.pages[page_index].name.clone();
        let new = next.pages[page_index].name.clone();
        self.overrides.rename(&old, new);
        self.apply_local_change(next, out)
    }

    /// Remove a page and drop its local override.
    pub fn remove_page(
        &mut self,
        page_index: usize,
        out: &dyn Outbound,
    ) -> Result<Vec<Operation>, SessionError> {
        let next = pages::remove_page(&self.document, page_index)?;
        let name = self.document.pages[page_index].name.clone();
        self.overrides.clear(&name);
        self.apply_local_change(next, out)
    }

    /// Apply an inbound frame.
    ///
    /// A patch that fails to apply is discarded and the document stays at
    /// the last good snapshot.
    pub fn handle_message(&mut self, msg: CollabMessage) -> Result<(), SessionError> {
        self.handle_message_at(msg, Instant::now())
    }

    pub fn handle_message_at(&mut self, msg: CollabMessage, now: Instant) -> Result<(), SessionError> {
        match msg {
            CollabMessage::Patch { ops } => {
                let received = ops.len();
                let ops = filter_syncable(ops);
                if ops.len() < received {
                    log::debug!("Dropped {} out-of-scope operations", received - ops.len());
                }
                if ops.is_empty() {
                    return Ok(());
                }
                match patch::apply(&self.document, &ops) {
                    Ok(next) => {
                        self.document = next;
                        self.notify_document();
                        Ok(())
                    }
                    Err(e) => {
                        log::error!("Discarding remote patch of {} operations: {e}", ops.len());
                        Err(e.into())
                    }
                }
            }
            CollabMessage::Presence(update) => {
                if update.user_id == self.user.user_id {
                    return Ok(());
                }
                self.presence.upsert_at(update, now);
                self.notify_presence();
                Ok(())
            }
        }
    }

    /// Fold a transport event into session state.
    pub fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Opened => self.set_status(SyncStatus::Connected),
            TransportEvent::Message(msg) => {
                // Failures are already logged; the connection carries on.
                let _ = self.handle_message(msg);
            }
            TransportEvent::Closed { code, reason } => {
                log::info!("Connection closed: {reason} (Code: {code})");
                if code == NORMAL_CLOSE {
                    self.set_status(SyncStatus::Disconnected);
                }
            }
            TransportEvent::Reconnecting { attempt, .. } => {
                self.set_status(SyncStatus::Reconnecting { attempt })
            }
            TransportEvent::Failed { .. } => self.set_status(SyncStatus::Failed),
            TransportEvent::MissingToken => self.set_status(SyncStatus::MissingToken),
        }
    }

    /// Offer a local pointer position; sent unless throttled.
    pub fn pointer_moved(&mut self, point: Point, now: Instant, out: &dyn Outbound) {
        if let Some(point) = self.throttle.offer(point, now) {
            self.send_pointer(point, out);
        }
    }

    /// Send the trailing throttled pointer position, if due.
    pub fn flush_pointer(&mut self, now: Instant, out: &dyn Outbound) {
        if let Some(point) = self.throttle.flush(now) {
            self.send_pointer(point, out);
        }
    }

    pub fn has_pending_pointer(&self) -> bool {
        self.throttle.has_pending()
    }

    fn send_pointer(&self, point: Point, out: &dyn Outbound) {
        if let Err(e) = out.send_presence(&self.user.presence_at(point)) {
            log::trace!("Presence not sent: {e}");
        }
    }

    /// Drop stale cursors; returns the removed user ids.
    pub fn sweep_presence(&mut self, now: Instant) -> Vec<String> {
        let removed = self.presence.sweep(now);
        if !removed.is_empty() {
            log::debug!("Swept {} idle cursors", removed.len());
            self.notify_presence();
        }
        removed
    }

    /// Persist the synchronized snapshot.
    pub fn save(&self, store: &dyn ProjectStore, project_id: &str) -> Result<(), SessionError> {
        store.update(project_id, &self.document)?;
        Ok(())
    }
}

// ─── Session task ───────────────────────────────────────────────

type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

enum Command {
    Connect { token: String, reply: Reply<()> },
    LocalChange { next: Document, reply: Reply<Vec<Operation>> },
    SetPositioningMode { page: usize, mode: PositioningMode, reply: Reply<Vec<Operation>> },
    RenamePage { page: usize, name: String, reply: Reply<Vec<Operation>> },
    PointerMoved(Point),
    Snapshot(oneshot::Sender<Document>),
    View(oneshot::Sender<Document>),
    Cursors(oneshot::Sender<Vec<PresenceRecord>>),
    Status(oneshot::Sender<SyncStatus>),
    Shutdown(oneshot::Sender<()>),
}

/// Handle to a running session task.
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    task: JoinHandle<()>,
}

/// Waits forever once the event stream is gone.
async fn next_event(events: &mut Option<mpsc::Receiver<TransportEvent>>) -> Option<TransportEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Move `session` and `client` into a task that owns them both.
///
/// Dropping every `SessionHandle` clone or calling
/// [`SessionHandle::shutdown`] disconnects the client with code 1000.
pub fn spawn_session(
    mut session: CollabSession,
    mut client: CollabClient,
    config: PresenceConfig,
) -> SessionHandle {
    let (commands, mut command_rx) = mpsc::channel(64);
    let mut events = client.take_event_rx();
    if events.is_none() {
        log::warn!("Transport events already taken, session will not see inbound frames");
    }

    let task = tokio::spawn(async move {
        let mut sweep = tokio::time::interval(config.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut flush = tokio::time::interval(config.throttle_interval);
        flush.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = command_rx.recv() => match command {
                    Some(Command::Shutdown(reply)) => {
                        client.disconnect().await;
                        session.set_status(SyncStatus::Disconnected);
                        let _ = reply.send(());
                        return;
                    }
                    Some(command) => run_command(&mut session, &mut client, command).await,
                    None => break,
                },

                event = next_event(&mut events) => match event {
                    Some(event) => session.handle_event(event),
                    None => events = None,
                },

                _ = sweep.tick() => {
                    session.sweep_presence(Instant::now());
                }

                _ = flush.tick(), if session.has_pending_pointer() => {
                    session.flush_pointer(Instant::now(), &client);
                }
            }
        }

        client.disconnect().await;
        log::info!("Session for project {} ended", client.project_id());
    });

    SessionHandle { commands, task }
}

async fn run_command(session: &mut CollabSession, client: &mut CollabClient, command: Command) {
    match command {
        Command::Connect { token, reply } => {
            let result = client.connect(&token).await.map_err(SessionError::from);
            if result.is_ok() {
                session.set_status(SyncStatus::Connecting);
            }
            let _ = reply.send(result);
        }
        Command::LocalChange { next, reply } => {
            let _ = reply.send(session.apply_local_change(next, &*client));
        }
        Command::SetPositioningMode { page, mode, reply } => {
            let _ = reply.send(session.change_positioning_mode(page, mode, &*client));
        }
        Command::RenamePage { page, name, reply } => {
            let _ = reply.send(session.rename_page(page, &name, &*client));
        }
        Command::PointerMoved(point) => session.pointer_moved(point, Instant::now(), &*client),
        Command::Snapshot(reply) => {
            let _ = reply.send(session.document().clone());
        }
        Command::View(reply) => {
            let _ = reply.send(session.view());
        }
        Command::Cursors(reply) => {
            let _ = reply.send(session.cursors());
        }
        Command::Status(reply) => {
            let _ = reply.send(session.status());
        }
        // Handled by the task loop.
        Command::Shutdown(reply) => {
            let _ = reply.send(());
        }
    }
}

impl SessionHandle {
    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.commands.send(make(tx)).await.map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    pub async fn connect(&self, token: impl Into<String>) -> Result<(), SessionError> {
        let token = token.into();
        self.request(|reply| Command::Connect { token, reply }).await?
    }

    pub async fn local_change(&self, next: Document) -> Result<Vec<Operation>, SessionError> {
        self.request(|reply| Command::LocalChange { next, reply }).await?
    }

    pub async fn set_positioning_mode(
        &self,
        page: usize,
        mode: PositioningMode,
    ) -> Result<Vec<Operation>, SessionError> {
        self.request(|reply| Command::SetPositioningMode { page, mode, reply })
            .await?
    }

    pub async fn rename_page(&self, page: usize, name: impl Into<String>) -> Result<Vec<Operation>, SessionError> {
        let name = name.into();
        self.request(|reply| Command::RenamePage { page, name, reply })
            .await?
    }

    pub async fn pointer_moved(&self, point: Point) -> Result<(), SessionError> {
        self.commands
            .send(Command::PointerMoved(point))
            .await
            .map_err(|_| SessionError::Closed)
    }

    pub async fn snapshot(&self) -> Result<Document, SessionError> {
        self.request(Command::Snapshot).await
    }

    pub async fn view(&self) -> Result<Document, SessionError> {
        self.request(Command::View).await
    }

    pub async fn cursors(&self) -> Result<Vec<PresenceRecord>, SessionError> {
        self.request(Command::Cursors).await
    }

    pub async fn status(&self) -> Result<SyncStatus, SessionError> {
        self.request(Command::Status).await
    }

    /// Disconnect with code 1000 and stop the task.
    pub async fn shutdown(self) -> Result<(), SessionError> {
        self.request(Command::Shutdown).await?;
        if let Err(e) = self.task.await {
            log::error!("Session task ended abnormally: {e}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use loom_core::model::{Widget, WidgetType};
    use loom_core::path::WidgetPath;
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        offline: bool,
        patches: Mutex<Vec<Vec<Operation>>>,
        presence: Mutex<Vec<PresenceUpdate>>,
    }

    impl Outbound for Recorder {
        fn send_patch(&self, ops: &[Operation]) -> Result<(), TransportError> {
            if self.offline {
                return Err(TransportError::NotConnected);
            }
            self.patches.lock().unwrap().push(ops.to_vec());
            Ok(())
        }

        fn send_presence(&self, update: &PresenceUpdate) -> Result<(), TransportError> {
            if self.offline {
                return Err(TransportError::NotConnected);
            }
            self.presence.lock().unwrap().push(update.clone());
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct Log(Arc<Mutex<Vec<String>>>);

    impl Log {
        fn entries(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    impl SessionObserver for Log {
        fn document_changed(&mut self, view: &Document) {
            self.0.lock().unwrap().push(format!("document:{}", view.pages.len()));
        }
        fn presence_changed(&mut self, cursors: &[PresenceRecord]) {
            self.0.lock().unwrap().push(format!("presence:{}", cursors.len()));
        }
        fn status_changed(&mut self, status: SyncStatus) {
            self.0.lock().unwrap().push(format!("status:{status}"));
        }
    }

    fn session() -> CollabSession {
        CollabSession::new(LocalUser::new("me"), Document::default(), PresenceConfig::default())
    }

    fn with_button(doc: &Document) -> Document {
        pages::update_page_body(doc, 0, |body| {
            tree::insert(
                body,
                &WidgetPath::Root,
                0,
                Widget::new(WidgetType::Button),
                Some(Point::new(10.0, 20.0)),
            )
        })
        .unwrap()
    }

    #[test]
    fn test_local_change_sends_only_synced_ops() {
        let mut s = session();
        let out = Recorder::default();

        let mut next = with_button(s.document());
        next.app_name = "Local Only".into();
        let ops = s.apply_local_change(next, &out).unwrap();

        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].path(), "/pages/0/body/0");
        assert_eq!(out.patches.lock().unwrap().as_slice(), &[ops.clone()]);
        // Committed state is what was sent.
        assert_eq!(s.document().app_name, "New Flutter App");
        assert_eq!(s.document().pages[0].body.len(), 1);
    }

    #[test]
    fn test_local_change_commits_offline() {
        let mut s = session();
        let out = Recorder {
            offline: true,
            ..Recorder::default()
        };
        let next = with_button(s.document());
        s.apply_local_change(next.clone(), &out).unwrap();
        assert_eq!(s.document(), &next);
    }

    #[test]
    fn test_noop_change_sends_nothing() {
        let mut s = session();
        let out = Recorder::default();
        let same = s.document().clone();
        assert!(s.apply_local_change(same, &out).unwrap().is_empty());
        assert!(out.patches.lock().unwrap().is_empty());
    }

    #[test]
    fn test_remote_patch_applies_and_notifies() {
        let log = Log::default();
        let mut s = session().with_observer(log.clone());
        let ops = vec![
            Operation::replace("/pages/0/title", json!("Start")),
            Operation::replace("/appName", json!("Hijacked")),
        ];
        s.handle_message(CollabMessage::patch(ops)).unwrap();

        assert_eq!(s.document().pages[0].title, "Start");
        assert_eq!(s.document().app_name, "New Flutter App");
        assert_eq!(log.entries(), vec!["document:1".to_string()]);
    }

    #[test]
    fn test_failed_remote_patch_keeps_last_good() {
        let mut s = session();
        let before = s.document().clone();
        let ops = vec![
            Operation::replace("/pages/0/title", json!("Start")),
            Operation::remove("/pages/0/body/3"),
        ];
        let result = s.handle_message(CollabMessage::patch(ops));
        assert!(matches!(result, Err(SessionError::Apply(_))));
        assert_eq!(s.document(), &before);
    }

    #[test]
    fn test_presence_ignores_self() {
        let log = Log::default();
        let mut s = session().with_observer(log.clone());
        let t0 = Instant::now();

        s.handle_message_at(CollabMessage::Presence(PresenceUpdate::new("me", 1.0, 1.0)), t0)
            .unwrap();
        assert!(s.cursors().is_empty());

        s.handle_message_at(CollabMessage::Presence(PresenceUpdate::new("bob", 3.0, 4.0)), t0)
            .unwrap();
        assert_eq!(s.cursors().len(), 1);
        assert_eq!(s.cursors()[0].username, "User-bob");

        assert_eq!(s.sweep_presence(t0 + Duration::from_secs(10)), vec!["bob".to_string()]);
        assert_eq!(log.entries(), vec!["presence:1".to_string(), "presence:0".to_string()]);
    }

    #[test]
    fn test_positioning_mode_stays_local() {
        let mut s = session();
        let out = Recorder::default();
        s.apply_local_change(with_button(s.document()), &out).unwrap();

        let ops = s.change_positioning_mode(0, PositioningMode::Flex, &out).unwrap();
        assert!(ops.iter().all(|op| op.path().starts_with("/pages/0/body/")));
        assert!(!ops.iter().any(|op| op.path().ends_with("positioningMode")));

        assert_eq!(s.view().pages[0].mode(), PositioningMode::Flex);
        assert_eq!(s.document().pages[0].mode(), PositioningMode::Absolute);
        assert!(s.document().pages[0].body[0].position().is_none());

        // Same mode again is a no-op.
        assert!(s.change_positioning_mode(0, PositioningMode::Flex, &out).unwrap().is_empty());
    }

    #[test]
    fn test_rename_page_carries_override() {
        let mut s = session();
        let out = Recorder::default();
        s.change_positioning_mode(0, PositioningMode::Flex, &out).unwrap();
        s.rename_page(0, "Start", &out).unwrap();
        assert_eq!(s.overrides().mode("start"), Some(PositioningMode::Flex));
        assert_eq!(s.view().pages[0].mode(), PositioningMode::Flex);
    }

    #[test]
    fn test_status_from_events() {
        let log = Log::default();
        let mut s = session().with_observer(log.clone());

        s.handle_event(TransportEvent::Opened);
        s.handle_event(TransportEvent::Closed { code: 1006, reason: String::new() });
        s.handle_event(TransportEvent::Reconnecting { attempt: 1, delay: Duration::from_secs(2) });
        s.handle_event(TransportEvent::Failed { attempts: 5 });
        assert_eq!(s.status(), SyncStatus::Failed);

        assert_eq!(
            log.entries(),
            vec![
                "status:Connected".to_string(),
                "status:Connection lost. Reconnecting (attempt 1)...".to_string(),
                "status:Could not reconnect after several attempts.".to_string(),
            ]
        );

        s.handle_event(TransportEvent::MissingToken);
        assert_eq!(s.status().to_string(), "Authentication token is missing.");
    }

    #[test]
    fn test_pointer_throttle() {
        let mut s = CollabSession::new(LocalUser::new("me"), Document::default(), PresenceConfig::default());
        let out = Recorder::default();
        let t0 = Instant::now();

        s.pointer_moved(Point::new(1.0, 1.0), t0, &out);
        s.pointer_moved(Point::new(2.0, 2.0), t0 + Duration::from_millis(10), &out);
        s.pointer_moved(Point::new(3.0, 3.0), t0 + Duration::from_millis(20), &out);
        assert!(s.has_pending_pointer());
        s.flush_pointer(t0 + Duration::from_millis(60), &out);

        let sent = out.presence.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!((sent[1].x, sent[1].y), (3.0, 3.0));
        assert_eq!(sent[0].user_id, "me");
        assert!(sent[0].color.is_some());
    }

    #[test]
    fn test_save_to_store() {
        let store = MemoryStore::new();
        let created = store.create("Demo", Document::default()).unwrap();
        let mut s = session();
        s.apply_local_change(with_button(s.document()), &Recorder::default())
            .unwrap();
        s.save(&store, &created.id).unwrap();
        assert_eq!(store.load(&created.id).unwrap(), *s.document());

        assert!(matches!(s.save(&store, "missing"), Err(SessionError::Store(_))));
    }
}
