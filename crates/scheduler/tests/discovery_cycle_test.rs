use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use linkd_core::{CollectionConfig, DiscoveryTarget, TaskTiming};
use linkd_events::{DiscoveryEvent, DiscoveryEventKind, EventSink};
use linkd_scheduler::{
    CollectionStrategy, ConfigSource, DiscoveryTask, ManualTimerQueue, QueueCall, TimerQueue,
};

const MINUTE: Duration = Duration::from_secs(60);

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<DiscoveryEvent>>,
}

impl RecordingSink {
    fn kinds(&self) -> Vec<DiscoveryEventKind> {
        self.events.lock().unwrap().iter().map(|e| e.kind).collect()
    }
}

impl EventSink for RecordingSink {
    fn send(&self, event: DiscoveryEvent) {
        self.events.lock().unwrap().push(event);
    }
    fn sink_name(&self) -> &str {
        "recording"
    }
}

#[derive(Default)]
struct CountingStrategy {
    calls: AtomicUsize,
}

impl CollectionStrategy for CountingStrategy {
    fn perform_discovery(&self, _: &DiscoveryTarget, _: &CollectionConfig) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
    fn info(&self) -> String {
        "LinkDiscovery".into()
    }
}

struct DefaultSource;

impl ConfigSource for DefaultSource {
    fn lookup_current_config(&self, address: IpAddr) -> CollectionConfig {
        CollectionConfig::for_address(address)
    }
}

struct Harness {
    queue: Arc<ManualTimerQueue>,
    sink: Arc<RecordingSink>,
    strategy: Arc<CountingStrategy>,
    task: Arc<DiscoveryTask>,
}

fn harness() -> Harness {
    let queue = Arc::new(ManualTimerQueue::new());
    let bound: Arc<dyn TimerQueue> = queue.clone();
    let sink = Arc::new(RecordingSink::default());
    let strategy = Arc::new(CountingStrategy::default());
    let target = DiscoveryTarget::parse(7, "10.0.0.1").unwrap();
    let task = DiscoveryTask::builder(target, CollectionConfig::for_address(target.address))
        .package("p")
        .timing(TaskTiming::new(5 * MINUTE, 30 * MINUTE))
        .timer_queue(&bound)
        .event_sink(sink.clone())
        .strategy(strategy.clone())
        .config_source(Arc::new(DefaultSource))
        .build()
        .unwrap();
    Harness { queue, sink, strategy, task }
}

#[test]
fn five_minute_start_then_thirty_minute_cycle() {
    let h = harness();
    h.task.schedule().unwrap();

    assert_eq!(h.queue.calls(), vec![QueueCall::Schedule { id: h.task.id(), delay: 5 * MINUTE }]);

    // Nothing before the initial delay elapses.
    assert_eq!(h.queue.advance(4 * MINUTE).unwrap(), 0);
    assert!(h.sink.kinds().is_empty());

    assert_eq!(h.queue.advance(MINUTE).unwrap(), 1);
    assert_eq!(
        h.sink.kinds(),
        vec![DiscoveryEventKind::Started, DiscoveryEventKind::Completed]
    );
    assert_eq!(h.queue.pending(), vec![(h.task.id(), 30 * MINUTE)]);

    // Two more hours: four more firings, all at the interval.
    assert_eq!(h.queue.advance(120 * MINUTE).unwrap(), 4);
    assert_eq!(h.strategy.calls.load(Ordering::SeqCst), 5);
    assert_eq!(
        h.queue.scheduled_delays(h.task.id()),
        vec![5 * MINUTE, 30 * MINUTE, 30 * MINUTE, 30 * MINUTE, 30 * MINUTE, 30 * MINUTE]
    );

    let events = h.sink.events.lock().unwrap();
    assert!(events.iter().all(|e| e.node_id == 7));
    assert!(events.iter().all(|e| e.address.to_string() == "10.0.0.1"));
}

#[test]
fn suspended_firing_then_resumed_firing() {
    let h = harness();
    h.task.schedule().unwrap();

    h.task.suspend();
    assert!(h.queue.fire_next().unwrap());
    assert_eq!(h.sink.kinds(), vec![DiscoveryEventKind::Suspended]);
    assert_eq!(h.strategy.calls.load(Ordering::SeqCst), 0);

    h.task.wake_up();
    assert!(h.queue.fire_next().unwrap());
    assert_eq!(
        h.sink.kinds(),
        vec![
            DiscoveryEventKind::Suspended,
            DiscoveryEventKind::Started,
            DiscoveryEventKind::Completed,
        ]
    );
    assert_eq!(h.strategy.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.queue.pending_count(), 1);
}

#[test]
fn unschedule_stops_the_cycle() {
    let h = harness();
    h.task.schedule().unwrap();
    h.queue.advance(5 * MINUTE).unwrap();

    assert!(h.task.unschedule().unwrap());
    assert_eq!(h.queue.advance(24 * 60 * MINUTE).unwrap(), 0);
    assert_eq!(h.strategy.calls.load(Ordering::SeqCst), 1);

    // A second unschedule finds nothing to remove.
    assert!(!h.task.unschedule().unwrap());
}

#[test]
fn unschedule_with_wrong_delay_key_is_a_noop() {
    let h = harness();
    h.task.schedule().unwrap();

    let bound: &dyn TimerQueue = h.queue.as_ref();
    assert!(!bound.unschedule(h.task.as_ref(), 30 * MINUTE).unwrap());
    assert_eq!(h.queue.pending_count(), 1);
}
