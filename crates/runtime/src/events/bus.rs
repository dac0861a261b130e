//! Topic-based subscriber registry for item events.

use std::collections::HashMap;

/// Topics for event routing
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Topic {
    /// An item showed up in the tracked population
    ItemAdded,
    /// An item left the tracked population
    ItemRemoved,
    /// An item's content changed
    ItemChanged,
    /// An item appeared outside every container
    WorldDropped,
    /// A world item was picked up or vanished
    WorldLeft,
}

impl Topic {
    pub const ITEM: [Topic; 3] = [Topic::ItemAdded, Topic::ItemRemoved, Topic::ItemChanged];
    pub const WORLD: [Topic; 2] = [Topic::WorldDropped, Topic::WorldLeft];
}

/// Event carrying the affected item handle.
#[derive(Debug, Clone)]
pub enum Event<T> {
    Added(T),
    Removed(T),
    Changed(T),
    Dropped(T),
    Left(T),
}

impl<T> Event<T> {
    pub fn topic(&self) -> Topic {
        match self {
            Event::Added(_) => Topic::ItemAdded,
            Event::Removed(_) => Topic::ItemRemoved,
            Event::Changed(_) => Topic::ItemChanged,
            Event::Dropped(_) => Topic::WorldDropped,
            Event::Left(_) => Topic::WorldLeft,
        }
    }

    pub fn item(&self) -> &T {
        match self {
            Event::Added(item)
            | Event::Removed(item)
            | Event::Changed(item)
            | Event::Dropped(item)
            | Event::Left(item) => item,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler<T> = Box<dyn FnMut(&Event<T>)>;

/// Synchronous topic-based event bus.
///
/// Handlers run inline on the engine tick that fires the event.
pub struct EventBus<T> {
    handlers: HashMap<Topic, Vec<(SubscriptionId, Handler<T>)>>,
    next_id: u64,
}

impl<T> EventBus<T> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            next_id: 0,
        }
    }

    /// Subscribe to a specific topic
    pub fn subscribe(
        &mut self,
        topic: Topic,
        handler: impl FnMut(&Event<T>) + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.handlers
            .entry(topic)
            .or_default()
            .push((id, Box::new(handler)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let mut removed = false;
        for handlers in self.handlers.values_mut() {
            let before = handlers.len();
            handlers.retain(|(sub, _)| *sub != id);
            removed |= handlers.len() != before;
        }
        removed
    }

    /// Delivers `event` to every handler on its topic. Returns the count.
    pub fn publish(&mut self, event: &Event<T>) -> usize {
        let topic = event.topic();
        let Some(handlers) = self.handlers.get_mut(&topic) else {
            tracing::trace!("No subscribers for topic {}", topic);
            return 0;
        };
        for (_, handler) in handlers.iter_mut() {
            handler(event);
        }
        handlers.len()
    }

    pub fn has_subscribers(&self, topic: Topic) -> bool {
        self.handlers
            .get(&topic)
            .is_some_and(|handlers| !handlers.is_empty())
    }

    pub fn has_any(&self, topics: &[Topic]) -> bool {
        topics.iter().any(|topic| self.has_subscribers(*topic))
    }
}

impl<T> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_publish_routes_by_topic() {
        let mut bus = EventBus::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let sink = Rc::clone(&seen);
        bus.subscribe(Topic::ItemChanged, move |event: &Event<u32>| {
            sink.borrow_mut().push(*event.item())
        });

        assert_eq!(bus.publish(&Event::Changed(7)), 1);
        assert_eq!(bus.publish(&Event::Added(8)), 0);
        assert_eq!(*seen.borrow(), vec![7]);
    }

    #[test]
    fn test_unsubscribe() {
        let mut bus: EventBus<u32> = EventBus::new();
        let id = bus.subscribe(Topic::WorldLeft, |_| {});
        assert!(bus.has_any(&Topic::WORLD));
        assert!(!bus.has_any(&Topic::ITEM));

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        assert!(!bus.has_subscribers(Topic::WorldLeft));
    }
}
