//! Single event loop that owns a [`StateSync`] and serializes everything that
//! mutates it: poll ticks, fetch completions, intruder expiry and operator
//! commands. Network calls run in spawned tasks and report back through a
//! channel, so the loop never waits on I/O.

use crate::api::{ConsoleApi, Decision};
use crate::error::SyncError;
use crate::models::{EntityId, Snapshot};
use crate::render::{NodeRef, Renderer};
use crate::sync::{FetchOutcome, FetchTicket, StateSync};
use crate::view_model::ArmedExpiry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, warn};

/// Operator-side inputs accepted by a running session.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start,
    Stop,
    /// One out-of-band fetch, independent of the poll timer.
    Refresh,
    Decide(EntityId, Decision),
    AcknowledgeIntruders,
    Select(NodeRef),
    Shutdown,
}

#[derive(Debug)]
enum Event {
    Fetched(FetchTicket, Result<Snapshot, SyncError>),
    Expired(EntityId, u64),
    Decided(EntityId, Decision, Result<(), SyncError>),
}

#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl SessionHandle {
    /// Returns false once the session loop has exited.
    pub fn send(&self, command: Command) -> bool {
        self.tx.send(command).is_ok()
    }
}

pub struct Session<A: ConsoleApi, R: Renderer> {
    sync: StateSync<R>,
    api: Arc<A>,
    poll_interval: Duration,
    ticker: Option<Interval>,
    in_flight: Option<FetchTicket>,
    commands: mpsc::UnboundedReceiver<Command>,
    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: mpsc::UnboundedReceiver<Event>,
}

impl<A, R> Session<A, R>
where
    A: ConsoleApi,
    R: Renderer + Send + 'static,
{
    pub fn new(
        api: Arc<A>,
        renderer: R,
        poll_interval: Duration,
        intruder_ttl: Duration,
    ) -> (Self, SessionHandle) {
        let (tx, commands) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let session = Self {
            sync: StateSync::new(renderer, intruder_ttl),
            api,
            poll_interval,
            ticker: None,
            in_flight: None,
            commands,
            events_tx,
            events_rx,
        };
        (session, SessionHandle { tx })
    }

    /// Runs until [`Command::Shutdown`] or until every handle is dropped, then
    /// hands the core back.
    pub async fn run(mut self) -> StateSync<R> {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.on_command(command),
                },
                Some(event) = self.events_rx.recv() => self.on_event(event),
                _ = next_tick(&mut self.ticker) => self.fetch(),
            }
        }
        debug!("session loop exited");
        self.sync
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Start => {
                // one timer per session: a second start replaces it
                let mut ticker = time::interval(self.poll_interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                self.ticker = Some(ticker);
                self.sync.start();
            }
            Command::Stop => {
                self.ticker = None;
                self.sync.stop();
            }
            Command::Refresh => self.fetch(),
            Command::Decide(id, decision) => {
                let api = Arc::clone(&self.api);
                let tx = self.events_tx.clone();
                tokio::spawn(async move {
                    let result = api.decide(id, decision).await;
                    let _ = tx.send(Event::Decided(id, decision, result));
                });
            }
            Command::AcknowledgeIntruders => {
                self.sync.acknowledge_intruders();
                let api = Arc::clone(&self.api);
                tokio::spawn(async move {
                    if let Err(e) = api.mark_intruders_read().await {
                        debug!(error = %e, "mark-intruders-read not delivered");
                    }
                });
            }
            Command::Select(node) => {
                self.sync.select(node);
            }
            Command::Shutdown => {}
        }
    }

    fn on_event(&mut self, event: Event) {
        match event {
            Event::Fetched(ticket, result) => {
                if self.in_flight == Some(ticket) {
                    self.in_flight = None;
                }
                if let FetchOutcome::Applied(report) =
                    self.sync.complete_fetch(ticket, result, Instant::now())
                {
                    for armed in report.armed() {
                        self.arm_expiry(*armed);
                    }
                }
            }
            Event::Expired(id, token) => {
                self.sync.expire_intruder(id, token);
            }
            Event::Decided(id, decision, Ok(())) => {
                self.sync.decision_succeeded(id, decision);
            }
            Event::Decided(id, decision, Err(e)) => {
                self.sync.decision_failed(id, decision, &e);
            }
        }
    }

    fn fetch(&mut self) {
        if let Some(pending) = self.in_flight {
            if self.sync.is_current(pending) {
                debug!("previous status fetch still in flight, skipping tick");
                return;
            }
        }
        let ticket = self.sync.ticket();
        self.in_flight = Some(ticket);

        let api = Arc::clone(&self.api);
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let result = api.fetch_status().await;
            if tx.send(Event::Fetched(ticket, result)).is_err() {
                warn!("session closed before status fetch completed");
            }
        });
    }

    fn arm_expiry(&mut self, armed: ArmedExpiry) {
        let tx = self.events_tx.clone();
        let task = tokio::spawn(async move {
            time::sleep_until(armed.deadline).await;
            let _ = tx.send(Event::Expired(armed.id, armed.token));
        });
        self.sync.attach_expiry(armed, task.abort_handle());
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Device, DeviceStatus, IntruderAlert, NetworkSummary};
    use crate::render::testing::{Op, RecordingRenderer};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::Semaphore;
    use tokio::time::sleep;

    /// Replays snapshots in order and keeps repeating the last one.
    struct ScriptedApi {
        script: Mutex<VecDeque<Snapshot>>,
        last: Mutex<Snapshot>,
        gate: Option<Arc<Semaphore>>,
        fetches: AtomicUsize,
        approve_ok: bool,
    }

    impl ScriptedApi {
        fn new(script: Vec<Snapshot>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                last: Mutex::new(Snapshot::default()),
                gate: None,
                fetches: AtomicUsize::new(0),
                approve_ok: true,
            }
        }

        fn gated(mut self, gate: Arc<Semaphore>) -> Self {
            self.gate = Some(gate);
            self
        }
    }

    impl ConsoleApi for ScriptedApi {
        async fn fetch_status(&self) -> Result<Snapshot, SyncError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.acquire().await.unwrap().forget();
            }
            let next = self.script.lock().unwrap().pop_front();
            let mut last = self.last.lock().unwrap();
            if let Some(next) = next {
                *last = next;
            }
            Ok(last.clone())
        }

        async fn decide(&self, id: EntityId, decision: Decision) -> Result<(), SyncError> {
            if self.approve_ok {
                Ok(())
            } else {
                Err(SyncError::Action {
                    action: decision.as_str(),
                    id,
                    reason: "server answered 500 Internal Server Error".to_string(),
                })
            }
        }

        async fn mark_intruders_read(&self) -> Result<(), SyncError> {
            Ok(())
        }
    }

    fn with_intruders(ids: &[u64]) -> Snapshot {
        Snapshot {
            intruders: Some(
                ids.iter()
                    .map(|id| IntruderAlert {
                        id: EntityId(*id),
                        ip_address: Some(format!("10.0.0.{id}")),
                        mac_address: None,
                        note: None,
                        detected_at: chrono::Utc::now(),
                    })
                    .collect(),
            ),
            network: NetworkSummary::default(),
            ..Default::default()
        }
    }

    fn with_device(id: u64) -> Snapshot {
        Snapshot {
            devices: vec![Device {
                id: EntityId(id),
                name: Some("printer".to_string()),
                mac_address: "02:00:00:00:00:01".to_string(),
                ip_address: None,
                status: DeviceStatus::Online,
                user_email: None,
            }],
            ..Default::default()
        }
    }

    fn count(ops: &[Op], wanted: &Op) -> usize {
        ops.iter().filter(|op| *op == wanted).count()
    }

    #[tokio::test(start_paused = true)]
    async fn polls_immediately_then_every_interval() {
        let api = Arc::new(ScriptedApi::new(vec![with_device(1)]));
        let (session, handle) = Session::new(
            Arc::clone(&api),
            RecordingRenderer::default(),
            Duration::from_secs(5),
            Duration::from_secs(60),
        );
        let task = tokio::spawn(session.run());

        handle.send(Command::Start);
        sleep(Duration::from_millis(10)).await;
        assert_eq!(api.fetches.load(Ordering::SeqCst), 1);

        sleep(Duration::from_secs(10)).await;
        assert_eq!(api.fetches.load(Ordering::SeqCst), 3);

        // a second start resets the single timer instead of adding one
        handle.send(Command::Start);
        sleep(Duration::from_millis(10)).await;
        assert_eq!(api.fetches.load(Ordering::SeqCst), 4);
        sleep(Duration::from_secs(5)).await;
        assert_eq!(api.fetches.load(Ordering::SeqCst), 5);

        handle.send(Command::Stop);
        sleep(Duration::from_secs(30)).await;
        assert_eq!(api.fetches.load(Ordering::SeqCst), 5);

        handle.send(Command::Shutdown);
        let sync = task.await.unwrap();
        assert_eq!(count(&sync.renderer().ops, &Op::CreateDevice(EntityId(1), DeviceStatus::Online)), 1);
        assert!(!sync.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_during_fetch_discards_the_response() {
        let gate = Arc::new(Semaphore::new(0));
        let api = Arc::new(ScriptedApi::new(vec![with_device(1)]).gated(Arc::clone(&gate)));
        let (session, handle) = Session::new(
            Arc::clone(&api),
            RecordingRenderer::default(),
            Duration::from_secs(5),
            Duration::from_secs(60),
        );
        let task = tokio::spawn(session.run());

        handle.send(Command::Start);
        sleep(Duration::from_millis(10)).await;
        assert_eq!(api.fetches.load(Ordering::SeqCst), 1);

        handle.send(Command::Stop);
        sleep(Duration::from_millis(10)).await;
        gate.add_permits(1);
        sleep(Duration::from_millis(10)).await;

        handle.send(Command::Shutdown);
        let sync = task.await.unwrap();
        assert_eq!(sync.view_model().device_count(), 0);
        assert!(!sync
            .renderer()
            .ops
            .iter()
            .any(|op| matches!(op, Op::CreateDevice(..) | Op::Relayout)));
    }

    #[tokio::test(start_paused = true)]
    async fn intruder_vanishing_from_server_cancels_forced_removal() {
        let api = Arc::new(ScriptedApi::new(vec![
            with_intruders(&[9]),
            with_intruders(&[9]),
            with_intruders(&[]),
        ]));
        let (session, handle) = Session::new(
            Arc::clone(&api),
            RecordingRenderer::default(),
            Duration::from_secs(5),
            Duration::from_secs(60),
        );
        let task = tokio::spawn(session.run());

        handle.send(Command::Start);
        sleep(Duration::from_secs(11)).await;
        handle.send(Command::Stop);
        sleep(Duration::from_secs(120)).await;

        handle.send(Command::Shutdown);
        let sync = task.await.unwrap();
        let ops = &sync.renderer().ops;
        assert_eq!(count(ops, &Op::AppendAlert(EntityId(9))), 1);
        assert_eq!(count(ops, &Op::RemoveAlert(EntityId(9))), 1);
        assert!(sync.view_model().expiry(EntityId(9)).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_intruder_is_forced_out_after_ttl() {
        let api = Arc::new(ScriptedApi::new(vec![with_intruders(&[9])]));
        let (session, handle) = Session::new(
            Arc::clone(&api),
            RecordingRenderer::default(),
            Duration::from_secs(7),
            Duration::from_secs(60),
        );
        let task = tokio::spawn(session.run());

        // polls land at 0, 7, .., 56, 63; expiry at 60
        handle.send(Command::Start);
        sleep(Duration::from_secs(61)).await;
        handle.send(Command::Stop);
        sleep(Duration::from_millis(10)).await;

        handle.send(Command::Shutdown);
        let sync = task.await.unwrap();
        let ops = &sync.renderer().ops;
        assert_eq!(count(ops, &Op::AppendAlert(EntityId(9))), 1);
        assert_eq!(count(ops, &Op::RemoveAlert(EntityId(9))), 1);
        assert!(!sync.view_model().has_intruder(EntityId(9)));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_decision_keeps_request() {
        let mut api = ScriptedApi::new(vec![]);
        api.approve_ok = false;
        let api = Arc::new(api);
        let (session, handle) = Session::new(
            Arc::clone(&api),
            RecordingRenderer::default(),
            Duration::from_secs(5),
            Duration::from_secs(60),
        );
        let task = tokio::spawn(session.run());

        handle.send(Command::Decide(EntityId(7), Decision::Approve));
        sleep(Duration::from_millis(10)).await;
        handle.send(Command::Shutdown);
        let sync = task.await.unwrap();
        assert!(sync
            .renderer()
            .ops
            .iter()
            .any(|op| matches!(op, Op::Notify(title, _) if title == "Error")));
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_while_stopped_applies_the_snapshot() {
        let api = Arc::new(ScriptedApi::new(vec![with_device(1)]));
        let (session, handle) = Session::new(
            Arc::clone(&api),
            RecordingRenderer::default(),
            Duration::from_secs(5),
            Duration::from_secs(60),
        );
        let task = tokio::spawn(session.run());

        handle.send(Command::Refresh);
        sleep(Duration::from_millis(10)).await;
        // no timer was started
        sleep(Duration::from_secs(30)).await;
        assert_eq!(api.fetches.load(Ordering::SeqCst), 1);

        handle.send(Command::Shutdown);
        let sync = task.await.unwrap();
        assert_eq!(sync.view_model().device_count(), 1);
        assert!(!sync.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_discards_a_pending_refresh() {
        let gate = Arc::new(Semaphore::new(0));
        let api = Arc::new(ScriptedApi::new(vec![with_device(1)]).gated(Arc::clone(&gate)));
        let (session, handle) = Session::new(
            Arc::clone(&api),
            RecordingRenderer::default(),
            Duration::from_secs(5),
            Duration::from_secs(60),
        );
        let task = tokio::spawn(session.run());

        handle.send(Command::Refresh);
        sleep(Duration::from_millis(10)).await;
        assert_eq!(api.fetches.load(Ordering::SeqCst), 1);

        handle.send(Command::Stop);
        sleep(Duration::from_millis(10)).await;
        gate.add_permits(1);
        sleep(Duration::from_millis(10)).await;

        handle.send(Command::Shutdown);
        let sync = task.await.unwrap();
        assert_eq!(sync.view_model().device_count(), 0);
        assert_eq!(count(&sync.renderer().ops, &Op::Relayout), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_during_fetch_discards_the_first_result() {
        let gate = Arc::new(Semaphore::new(0));
        let api = Arc::new(ScriptedApi::new(vec![with_device(1)]).gated(Arc::clone(&gate)));
        let (session, handle) = Session::new(
            Arc::clone(&api),
            RecordingRenderer::default(),
            Duration::from_secs(5),
            Duration::from_secs(60),
        );
        let task = tokio::spawn(session.run());

        handle.send(Command::Start);
        sleep(Duration::from_millis(10)).await;
        handle.send(Command::Start);
        sleep(Duration::from_millis(10)).await;
        // the restart fetches right away even though the old fetch is pending
        assert_eq!(api.fetches.load(Ordering::SeqCst), 2);

        gate.add_permits(2);
        sleep(Duration::from_millis(10)).await;

        handle.send(Command::Shutdown);
        let sync = task.await.unwrap();
        let ops = &sync.renderer().ops;
        assert_eq!(count(ops, &Op::CreateDevice(EntityId(1), DeviceStatus::Online)), 1);
        assert_eq!(count(ops, &Op::Relayout), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_fetch_is_not_overlapped_by_ticks() {
        let gate = Arc::new(Semaphore::new(0));
        let api = Arc::new(ScriptedApi::new(vec![with_device(1)]).gated(Arc::clone(&gate)));
        let (session, handle) = Session::new(
            Arc::clone(&api),
            RecordingRenderer::default(),
            Duration::from_secs(5),
            Duration::from_secs(60),
        );
        let task = tokio::spawn(session.run());

        handle.send(Command::Start);
        sleep(Duration::from_secs(12)).await;
        // ticks at 5s and 10s found the first fetch still pending
        assert_eq!(api.fetches.load(Ordering::SeqCst), 1);

        gate.add_permits(1);
        sleep(Duration::from_millis(10)).await;
        sleep(Duration::from_secs(5)).await;
        assert_eq!(api.fetches.load(Ordering::SeqCst), 2);

        handle.send(Command::Shutdown);
        let sync = task.await.unwrap();
        assert_eq!(sync.view_model().device_count(), 1);
        assert_eq!(count(&sync.renderer().ops, &Op::Relayout), 1);
    }
}
