//! Change-log polling engine.
//!
//! The multi-instance event-sourcing strategy: instead of being told about
//! writes in-process, the engine reads the database's own change log on a
//! fixed interval and replays committed changes as canonical events. Every
//! application instance polls independently, so listeners see events for
//! writes made by any instance.
//!
//! Delivery is at-least-once. The cursor only advances after a fully
//! processed round; a round that fails mid-way is retried from the previous
//! cursor on the next tick, which can re-dispatch entries that were already
//! delivered. Rounds never overlap: the next interval starts counting only
//! after the previous round has settled.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use graphsub_core::engine::{
    open_subscription,
    SubscriptionEngine,
    SubscriptionHandle,
    SubscriptionRequest,
};
use graphsub_core::error::{Error, Result};
use graphsub_core::event::{EventClock, EventKind};
use graphsub_core::schema::SchemaModel;
use graphsub_core::subscription::{SubscriptionId, SubscriptionRegistry};

use crate::cursor::ChangeCursor;
use crate::driver::{ChangeLogSource, DriverError};
use crate::parser::EventParser;

/// Tuning for the poll loop.
#[derive(Debug, Clone)]
pub struct CdcConfig {
    /// Idle time between the end of one poll round and the start of the
    /// next.
    pub poll_interval: Duration,
}

impl Default for CdcConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1000),
        }
    }
}

struct PollTask {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Change-log polling engine.
///
/// `init` syncs the cursor baseline to the log's current tail (history
/// before `init` is never observed) and spawns the poll loop; `close` stops
/// the loop and clears the listener registry so in-flight rounds deliver to
/// nobody.
pub struct CdcEngine {
    source: Arc<dyn ChangeLogSource>,
    config: CdcConfig,
    registry: Arc<SubscriptionRegistry>,
    schema: RwLock<Option<Arc<dyn SchemaModel>>>,
    poll_task: Mutex<Option<PollTask>>,
    closed: AtomicBool,
}

impl CdcEngine {
    /// Create an engine over a change-log source. Polling starts at `init`.
    pub fn new(source: Arc<dyn ChangeLogSource>, config: CdcConfig) -> Self {
        Self {
            source,
            config,
            registry: Arc::new(SubscriptionRegistry::new()),
            schema: RwLock::new(None),
            poll_task: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// Number of live subscriptions for `kind` (diagnostics and tests).
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.registry.listener_count(kind)
    }
}

#[async_trait]
impl SubscriptionEngine for CdcEngine {
    async fn init(&self, schema: Arc<dyn SchemaModel>) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::EngineClosed);
        }
        if self.poll_task.lock().is_some() {
            debug!("Engine already initialized; ignoring repeat init");
            return Ok(());
        }

        let baseline = self
            .source
            .current_cursor()
            .await
            .map_err(|err| Error::CursorSync(err.to_string()))?;
        info!(cursor = %baseline, interval = ?self.config.poll_interval,
            "Change-log cursor baseline synced; starting poll loop");
        *self.schema.write() = Some(schema.clone());

        let (stop_tx, stop_rx) = watch::channel(false);
        let worker = PollWorker {
            source: self.source.clone(),
            registry: self.registry.clone(),
            parser: EventParser::new(schema),
            clock: EventClock::new(),
            interval: self.config.poll_interval,
        };
        let task = tokio::spawn(worker.run(baseline, stop_rx));
        *self.poll_task.lock() = Some(PollTask {
            stop: stop_tx,
            task,
        });
        Ok(())
    }

    fn subscribe(&self, request: SubscriptionRequest) -> Result<SubscriptionHandle> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::EngineClosed);
        }
        let schema = self.schema.read();
        let schema = schema.as_ref().ok_or(Error::SchemaUnavailable)?;
        open_subscription(&self.registry, schema.as_ref(), request)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.registry.remove(id)
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let task = self.poll_task.lock().take();
        if let Some(PollTask { stop, task }) = task {
            let _ = stop.send(true);
            if let Err(err) = task.await {
                error!(error = %err, "Poll loop terminated abnormally");
            }
        }
        self.registry.clear();
        info!("Change-log engine closed");
    }
}

struct PollWorker {
    source: Arc<dyn ChangeLogSource>,
    registry: Arc<SubscriptionRegistry>,
    parser: EventParser,
    clock: EventClock,
    interval: Duration,
}

impl PollWorker {
    async fn run(self, mut cursor: ChangeCursor, mut stop: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = sleep(self.interval) => {}
                res = stop.changed() => {
                    // A closed channel means the engine was dropped without
                    // close(); stop rather than spin on the dead receiver.
                    if res.is_err() {
                        break;
                    }
                }
            }
            if *stop.borrow() {
                break;
            }
            match self.poll_round(&cursor).await {
                Ok(next) => cursor = next,
                Err(err) => {
                    // Cursor untouched: the same range is re-read next tick.
                    warn!(error = %err, cursor = %cursor, "Poll round failed; retrying from the same cursor");
                }
            }
            if *stop.borrow() {
                break;
            }
        }
        debug!("Poll loop stopped");
    }

    async fn poll_round(&self, cursor: &ChangeCursor) -> std::result::Result<ChangeCursor, DriverError> {
        let page = self.source.query_change_log(cursor).await?;
        for entry in &page.entries {
            match self.parser.parse(entry, self.clock.now()) {
                Ok(Some(event)) => self.registry.dispatch(Arc::new(event)),
                Ok(None) => {}
                // A permanently malformed entry must not wedge the loop;
                // it is dropped and the cursor moves past it.
                Err(err) => {
                    warn!(entry = %entry.id, error = %err, "Skipping unparseable change-log entry");
                }
            }
        }
        Ok(page.cursor)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use serde_json::json;

    use graphsub_core::filter::{FilterNode, FilterOp};
    use graphsub_core::scalar::FieldKind;
    use graphsub_core::schema::StaticSchemaModel;

    use crate::log::{ChangeLogEntry, ChangeLogPage};

    use super::*;

    struct ScriptedSource {
        baseline: std::result::Result<ChangeCursor, DriverError>,
        pages: Mutex<VecDeque<std::result::Result<ChangeLogPage, DriverError>>>,
        queried: Mutex<Vec<ChangeCursor>>,
    }

    impl ScriptedSource {
        fn new(
            baseline: &str,
            pages: impl IntoIterator<Item = std::result::Result<ChangeLogPage, DriverError>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                baseline: Ok(ChangeCursor::new(baseline)),
                pages: Mutex::new(pages.into_iter().collect()),
                queried: Mutex::new(Vec::new()),
            })
        }

        fn queried(&self) -> Vec<ChangeCursor> {
            self.queried.lock().clone()
        }
    }

    #[async_trait]
    impl ChangeLogSource for ScriptedSource {
        async fn current_cursor(&self) -> std::result::Result<ChangeCursor, DriverError> {
            self.baseline.clone()
        }

        async fn query_change_log(
            &self,
            since: &ChangeCursor,
        ) -> std::result::Result<ChangeLogPage, DriverError> {
            self.queried.lock().push(since.clone());
            match self.pages.lock().pop_front() {
                Some(page) => page,
                // Script exhausted: the log is quiet.
                None => Ok(ChangeLogPage {
                    entries: Vec::new(),
                    cursor: since.clone(),
                }),
            }
        }
    }

    fn schema() -> Arc<dyn SchemaModel> {
        Arc::new(StaticSchemaModel::new().with_simple_type(
            "Movie",
            [("title", FieldKind::String)],
        ))
    }

    fn movie_entry(id: &str, title: &str) -> ChangeLogEntry {
        serde_json::from_value(json!({
            "id": id,
            "txId": 1,
            "event": {
                "elementType": "node",
                "elementId": "4:abc:1",
                "labels": ["Movie"],
                "operation": "create",
                "after": { "title": title }
            }
        }))
        .unwrap()
    }

    fn garbage_entry(id: &str) -> ChangeLogEntry {
        serde_json::from_value(json!({
            "id": id,
            "txId": 1,
            "event": { "elementType": "constraint" }
        }))
        .unwrap()
    }

    fn page(entries: Vec<ChangeLogEntry>, cursor: &str) -> ChangeLogPage {
        ChangeLogPage {
            entries,
            cursor: ChangeCursor::new(cursor),
        }
    }

    async fn tick(interval: Duration) {
        // Let the poll task register its sleep before the clock moves.
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        tokio::time::advance(interval + Duration::from_millis(1)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn parsed_entries_reach_listeners() {
        let source = ScriptedSource::new(
            "A0",
            [Ok(page(vec![movie_entry("A1", "movie1")], "A1"))],
        );
        let engine = CdcEngine::new(source, CdcConfig::default());
        engine.init(schema()).await.unwrap();
        let mut handle = engine
            .subscribe(SubscriptionRequest::new([EventKind::Create]))
            .unwrap();

        let event = handle.events.recv().await.unwrap().unwrap();
        assert_eq!(event.typename, "Movie");
        engine.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failed_round_retries_from_the_same_cursor() {
        let interval = CdcConfig::default().poll_interval;
        let source = ScriptedSource::new(
            "A0",
            [
                Err(DriverError::new("transient outage")),
                Ok(page(vec![movie_entry("A1", "movie1")], "A1")),
            ],
        );
        let engine = CdcEngine::new(source.clone(), CdcConfig::default());
        engine.init(schema()).await.unwrap();
        let mut handle = engine
            .subscribe(SubscriptionRequest::new([EventKind::Create]))
            .unwrap();

        tick(interval).await;
        tick(interval).await;

        assert_eq!(
            source.queried(),
            vec![ChangeCursor::new("A0"), ChangeCursor::new("A0")]
        );
        assert!(handle.events.try_recv().unwrap().is_ok());
        engine.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn empty_round_still_advances_the_cursor() {
        let interval = CdcConfig::default().poll_interval;
        let source = ScriptedSource::new("A0", [Ok(page(vec![], "A5"))]);
        let engine = CdcEngine::new(source.clone(), CdcConfig::default());
        engine.init(schema()).await.unwrap();

        tick(interval).await;
        tick(interval).await;

        assert_eq!(
            source.queried(),
            vec![ChangeCursor::new("A0"), ChangeCursor::new("A5")]
        );
        engine.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn unparseable_entry_is_skipped_without_wedging_the_loop() {
        let interval = CdcConfig::default().poll_interval;
        let source = ScriptedSource::new(
            "A0",
            [Ok(page(
                vec![garbage_entry("A1"), movie_entry("A2", "movie1")],
                "A2",
            ))],
        );
        let engine = CdcEngine::new(source.clone(), CdcConfig::default());
        engine.init(schema()).await.unwrap();
        let mut handle = engine
            .subscribe(SubscriptionRequest::new([EventKind::Create]))
            .unwrap();

        tick(interval).await;
        tick(interval).await;

        // The good entry was delivered and the cursor moved past the bad one.
        assert!(handle.events.try_recv().unwrap().is_ok());
        assert!(handle.events.try_recv().is_err());
        assert_eq!(
            source.queried(),
            vec![ChangeCursor::new("A0"), ChangeCursor::new("A2")]
        );
        engine.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn close_stops_polling_and_delivery() {
        let interval = CdcConfig::default().poll_interval;
        let source = ScriptedSource::new(
            "A0",
            [
                Ok(page(vec![movie_entry("A1", "movie1")], "A1")),
                Ok(page(vec![movie_entry("A2", "movie2")], "A2")),
            ],
        );
        let engine = CdcEngine::new(source.clone(), CdcConfig::default());
        engine.init(schema()).await.unwrap();
        let mut handle = engine
            .subscribe(SubscriptionRequest::new([EventKind::Create]))
            .unwrap();

        engine.close().await;
        engine.close().await;
        let rounds = source.queried().len();

        tick(interval).await;
        tick(interval).await;

        assert_eq!(source.queried().len(), rounds);
        assert!(handle.events.try_recv().is_err());
        assert!(matches!(
            engine.subscribe(SubscriptionRequest::new([EventKind::Create])),
            Err(Error::EngineClosed)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_engine_stops_the_poll_loop() {
        let interval = CdcConfig::default().poll_interval;
        let source = ScriptedSource::new(
            "A0",
            [Ok(page(vec![movie_entry("A1", "movie1")], "A1"))],
        );
        let engine = CdcEngine::new(source.clone(), CdcConfig::default());
        engine.init(schema()).await.unwrap();

        // No close(); the stop channel's sender side just goes away.
        drop(engine);

        tick(interval).await;
        tick(interval).await;

        // The detached task must exit, not keep querying the log.
        assert!(source.queried().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cursor_sync_failure_is_setup_fatal() {
        let source = Arc::new(ScriptedSource {
            baseline: Err(DriverError::new("store unreachable")),
            pages: Mutex::new(VecDeque::new()),
            queried: Mutex::new(Vec::new()),
        });
        let engine = CdcEngine::new(source, CdcConfig::default());
        assert!(matches!(
            engine.init(schema()).await,
            Err(Error::CursorSync(_))
        ));
        assert!(matches!(
            engine.subscribe(SubscriptionRequest::new([EventKind::Create])),
            Err(Error::SchemaUnavailable)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn filters_apply_to_polled_events() {
        let source = ScriptedSource::new(
            "A0",
            [Ok(page(
                vec![movie_entry("A1", "movie1"), movie_entry("A2", "movie2")],
                "A2",
            ))],
        );
        let engine = CdcEngine::new(source, CdcConfig::default());
        engine.init(schema()).await.unwrap();
        let mut handle = engine
            .subscribe(
                SubscriptionRequest::new([EventKind::Create])
                    .for_type("Movie")
                    .with_filter(FilterNode::field("title", FilterOp::Eq, "movie2")),
            )
            .unwrap();

        let event = handle.events.recv().await.unwrap().unwrap();
        assert_eq!(
            event.payload().unwrap()["title"],
            graphsub_core::scalar::ScalarValue::from("movie2")
        );
        assert!(handle.events.try_recv().is_err());
        engine.close().await;
    }
}
