//! Item event detection: coalesced publishes, polling fallback, world drops.

use std::cell::RefCell;
use std::rc::Rc;

use item_core::{DirtyKind, EngineConfig, EventSourceConfig, PersistenceConfig};
use item_runtime::memory::{
    ItemRecord, MemoryAccessor, MemoryContainers, MemoryItem, MemoryPopulation,
};
use item_runtime::{Engine, EngineBuilder, Event, ManualClock, PublishKind, SourceMode, Topic};
use pretty_assertions::assert_eq;

type Log = Rc<RefCell<Vec<(Topic, u64)>>>;

fn config(events: EventSourceConfig) -> EngineConfig {
    EngineConfig {
        persistence: PersistenceConfig {
            explicit_only: false,
            ..Default::default()
        },
        events,
        ..Default::default()
    }
}

fn builder(events: EventSourceConfig, clock: &Rc<ManualClock>) -> EngineBuilder<MemoryAccessor> {
    Engine::builder(MemoryAccessor::new())
        .config(config(events))
        .clock(clock.clone())
}

fn record(engine: &mut Engine<MemoryAccessor>, topics: &[Topic]) -> Log {
    let log: Log = Rc::default();
    for topic in topics {
        let log = Rc::clone(&log);
        engine.subscribe(*topic, move |event: &Event<MemoryItem>| {
            log.borrow_mut()
                .push((event.topic(), event.item().instance_id()));
        });
    }
    log
}

fn potion(value: i32) -> MemoryItem {
    MemoryItem::new(ItemRecord::new("Potion", 12).with_quality(1).with_value(value))
}

#[test]
fn test_publishes_coalesce_into_one_event() {
    let clock = Rc::new(ManualClock::new(0.0));
    let mut engine = builder(EventSourceConfig::default(), &clock).build().unwrap();
    let log = record(&mut engine, &[Topic::ItemChanged, Topic::ItemAdded]);
    let item = potion(5);

    for at in [0.0, 0.01, 0.02] {
        clock.set(at);
        assert_eq!(engine.publish(PublishKind::Changed, &item), DirtyKind::ALL);
    }
    assert_eq!(engine.source_mode(), SourceMode::ExternalActive);

    clock.set(0.03);
    assert_eq!(engine.tick().events_fired, 0);

    clock.set(0.1);
    assert_eq!(engine.tick().events_fired, 1);
    assert_eq!(*log.borrow(), vec![(Topic::ItemChanged, item.instance_id())]);
    assert_eq!(engine.pending_count(), 1);
}

#[test]
fn test_latest_publish_kind_wins() {
    let clock = Rc::new(ManualClock::new(0.0));
    let mut engine = builder(EventSourceConfig::default(), &clock).build().unwrap();
    let log = record(&mut engine, &[Topic::ItemAdded, Topic::ItemRemoved]);
    let item = potion(5);

    assert_eq!(engine.publish(PublishKind::Added, &item), DirtyKind::ADDED);
    assert_eq!(engine.publish(PublishKind::Removed, &item), DirtyKind::empty());

    clock.set(1.0);
    engine.tick();
    assert_eq!(*log.borrow(), vec![(Topic::ItemRemoved, item.instance_id())]);
}

#[test]
fn test_subscriber_added_inside_window_receives_event() {
    let clock = Rc::new(ManualClock::new(0.0));
    let mut engine = builder(EventSourceConfig::default(), &clock).build().unwrap();
    let item = potion(5);

    assert_eq!(engine.publish(PublishKind::Moved, &item), DirtyKind::ALL);
    assert_eq!(engine.pending_count(), 1);

    clock.set(0.02);
    let log = record(&mut engine, &[Topic::ItemChanged]);
    clock.set(1.0);
    assert_eq!(engine.tick().events_fired, 1);
    assert_eq!(*log.borrow(), vec![(Topic::ItemChanged, item.instance_id())]);
}

#[test]
fn test_event_without_subscribers_is_dropped_when_due() {
    let clock = Rc::new(ManualClock::new(0.0));
    let mut engine = builder(EventSourceConfig::default(), &clock).build().unwrap();
    let log = record(&mut engine, &[Topic::ItemAdded]);
    let item = potion(5);

    engine.publish(PublishKind::Changed, &item);
    clock.set(1.0);
    assert_eq!(engine.tick().events_fired, 0);

    clock.set(2.0);
    assert_eq!(engine.tick().events_fired, 0);
    assert!(log.borrow().is_empty());
}

#[test]
fn test_polling_reports_removed_after_full_pass() {
    let clock = Rc::new(ManualClock::new(0.0));
    let population = MemoryPopulation::new();
    let items: Vec<MemoryItem> = (1..=3).map(potion).collect();
    for item in &items {
        population.insert(item);
    }

    let events = EventSourceConfig {
        budget_per_tick: 1,
        ..Default::default()
    };
    let mut engine = builder(events, &clock)
        .population(population.clone())
        .build()
        .unwrap();
    let log = record(
        &mut engine,
        &[Topic::ItemAdded, Topic::ItemRemoved, Topic::ItemChanged],
    );
    engine.hint_active_for(100.0);

    let mut now = 0.0;
    let mut step = |engine: &mut Engine<MemoryAccessor>| {
        clock.set(now);
        now += 0.5;
        engine.tick()
    };

    for _ in 0..3 {
        assert_eq!(step(&mut engine).items_scanned, 1);
    }
    let added: Vec<Topic> = log.borrow().iter().map(|(topic, _)| *topic).collect();
    assert_eq!(added, vec![Topic::ItemAdded; 3]);
    log.borrow_mut().clear();

    population.remove(&items[1]);
    items[0].update(|r| r.quality = 4);

    step(&mut engine);
    assert_eq!(*log.borrow(), vec![(Topic::ItemChanged, items[0].instance_id())]);

    step(&mut engine);
    assert_eq!(
        *log.borrow(),
        vec![
            (Topic::ItemChanged, items[0].instance_id()),
            (Topic::ItemRemoved, items[1].instance_id()),
        ]
    );
}

#[test]
fn test_polling_marks_found_items_dirty() {
    let clock = Rc::new(ManualClock::new(0.0));
    let population = MemoryPopulation::new();
    let item = potion(9);
    population.insert(&item);

    let mut engine = builder(EventSourceConfig::default(), &clock)
        .population(population)
        .build()
        .unwrap();
    let _log = record(&mut engine, &[Topic::ItemAdded]);
    engine.hint_active();

    engine.tick();
    let entry = engine.scheduler().entry(engine.stable_id(&item)).unwrap();
    assert_eq!(entry.kind, DirtyKind::ADDED);
}

#[test]
fn test_no_scan_without_subscribers_or_hint() {
    let clock = Rc::new(ManualClock::new(0.0));
    let population = MemoryPopulation::new();
    population.insert(&potion(1));

    let mut engine = builder(EventSourceConfig::default(), &clock)
        .population(population)
        .build()
        .unwrap();
    engine.hint_active();
    assert_eq!(engine.tick().items_scanned, 0);

    let _log = record(&mut engine, &[Topic::ItemRemoved]);
    clock.set(5.0);
    assert_eq!(engine.tick().items_scanned, 0, "hint expired");

    engine.hint_active();
    assert_eq!(engine.tick().items_scanned, 1);
}

#[test]
fn test_external_mode_suppresses_polling() {
    let clock = Rc::new(ManualClock::new(0.0));
    let population = MemoryPopulation::new();
    population.insert(&potion(1));

    let mut engine = builder(EventSourceConfig::default(), &clock)
        .population(population)
        .build()
        .unwrap();
    let _log = record(&mut engine, &[Topic::ItemAdded]);
    engine.hint_active_for(60.0);

    engine.begin_external_mode();
    assert_eq!(engine.source_mode(), SourceMode::ExternalActive);
    clock.set(10.0);
    assert_eq!(engine.tick().items_scanned, 0);

    engine.end_external_mode();
    clock.set(11.0);
    assert_eq!(engine.tick().items_scanned, 0, "still inside idle timeout");

    clock.set(12.5);
    assert_eq!(engine.source_mode(), SourceMode::Polling);
    assert_eq!(engine.tick().items_scanned, 1);
}

#[test]
fn test_broken_enumerator_reports_no_removals() {
    let clock = Rc::new(ManualClock::new(0.0));
    let population = MemoryPopulation::new();
    let items: Vec<MemoryItem> = (1..=2).map(potion).collect();
    for item in &items {
        population.insert(item);
    }

    let mut engine = builder(EventSourceConfig::default(), &clock)
        .population(population.clone())
        .build()
        .unwrap();
    let log = record(&mut engine, &[Topic::ItemAdded, Topic::ItemRemoved]);
    engine.hint_active_for(60.0);

    assert_eq!(engine.tick().events_fired, 2);

    population.set_broken(true);
    clock.set(1.0);
    let tick = engine.tick();
    assert_eq!(tick.items_scanned, 0);
    assert_eq!(tick.events_fired, 0);

    population.set_broken(false);
    clock.set(2.0);
    assert_eq!(engine.tick().items_scanned, 2);
    assert!(log.borrow().iter().all(|(topic, _)| *topic == Topic::ItemAdded));
}

#[test]
fn test_world_drop_dropped_and_left() {
    let clock = Rc::new(ManualClock::new(0.0));
    let world = MemoryPopulation::new();
    let containers = MemoryContainers::new();
    let lantern = potion(1);
    let rope = potion(2);
    world.insert(&lantern);
    world.insert(&rope);
    containers.put(&rope);

    let mut engine = builder(EventSourceConfig::default(), &clock)
        .world(world.clone(), containers.clone())
        .build()
        .unwrap();
    let log = record(&mut engine, &[Topic::WorldDropped, Topic::WorldLeft]);
    engine.hint_active_for(60.0);

    engine.tick();
    assert_eq!(*log.borrow(), vec![(Topic::WorldDropped, lantern.instance_id())]);
    log.borrow_mut().clear();

    containers.put(&lantern);
    containers.take(&rope);
    clock.set(2.0);
    engine.tick();
    assert_eq!(
        *log.borrow(),
        vec![
            (Topic::WorldLeft, lantern.instance_id()),
            (Topic::WorldDropped, rope.instance_id()),
        ]
    );
    log.borrow_mut().clear();

    world.remove(&rope);
    clock.set(4.0);
    engine.tick();
    assert_eq!(*log.borrow(), vec![(Topic::WorldLeft, rope.instance_id())]);
}
