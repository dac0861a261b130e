//! Scoped transaction wrapper.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use item_core::{EngineError, ItemAccessor, Result};
use tracing::warn;

use super::TxToken;
use crate::engine::Engine;

impl<A: ItemAccessor + 'static> Engine<A> {
    /// Runs `action` inside a transaction on `item`.
    ///
    /// Commits when the action returns `Ok`. On `Err` the item is rolled back
    /// and the action's error is returned. A panicking action is rolled back
    /// too and reported as `OperationFailed`.
    pub fn run_atomic<F>(&mut self, item: &A::Item, action: F) -> Result<()>
    where
        F: FnOnce(&A, &A::Item) -> Result<()>,
    {
        let token = self.begin(item)?;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| action(self.accessor(), item)));

        match outcome {
            Ok(Ok(())) => self.commit(item, token),
            Ok(Err(error)) => {
                self.rollback_quietly(item, token);
                Err(error)
            }
            Err(payload) => {
                self.rollback_quietly(item, token);
                Err(EngineError::OperationFailed(format!(
                    "atomic action panicked: {}",
                    panic_message(&*payload)
                )))
            }
        }
    }

    fn rollback_quietly(&mut self, item: &A::Item, token: TxToken) {
        if let Err(error) = self.rollback(item, token) {
            warn!(
                target: "item_runtime::transaction",
                id = %self.stable_id(item),
                error = %error,
                "Rollback after failed atomic action did not complete"
            );
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use item_core::{EngineError, ErrorCode, ItemAccessor};

    use crate::clock::ManualClock;
    use crate::engine::Engine;
    use crate::memory::{ItemRecord, MemoryAccessor, MemoryItem};
    use std::rc::Rc;

    fn engine() -> Engine<MemoryAccessor> {
        Engine::builder(MemoryAccessor::new())
            .clock(Rc::new(ManualClock::new(0.0)))
            .build()
            .unwrap()
    }

    #[test]
    fn test_atomic_commit_marks_dirty() {
        let mut engine = engine();
        let item = MemoryItem::new(ItemRecord::new("Lamp", 3).with_quality(2));

        engine
            .run_atomic(&item, |accessor, item| {
                accessor.set_quality(item, 4)?;
                Ok(())
            })
            .unwrap();

        assert_eq!(item.record().quality, 4);
        assert_eq!(engine.transactions().open_count(), 0);
        assert!(engine.scheduler().contains(engine.stable_id(&item)));
    }

    #[test]
    fn test_atomic_error_rolls_back() {
        let mut engine = engine();
        let item = MemoryItem::new(ItemRecord::new("Lamp", 3).with_quality(5));

        let err = engine
            .run_atomic(&item, |accessor, item| {
                accessor.set_quality(item, 1)?;
                Err(EngineError::Conflict("vetoed".into()))
            })
            .unwrap_err();

        assert_eq!(err.code(), ErrorCode::Conflict);
        assert_eq!(item.record().quality, 5);
        assert_eq!(engine.pending_count(), 0);
    }

    #[test]
    fn test_atomic_panic_rolls_back_into_error() {
        let mut engine = engine();
        let item = MemoryItem::new(ItemRecord::new("Lamp", 3).with_quality(5));

        let err = engine
            .run_atomic(&item, |accessor, item| {
                accessor.set_quality(item, 9).unwrap();
                panic!("action blew up");
            })
            .unwrap_err();

        assert_eq!(err.code(), ErrorCode::OperationFailed);
        assert!(err.to_string().contains("action blew up"));
        assert_eq!(item.record().quality, 5);
        assert_eq!(engine.transactions().open_count(), 0);
        assert_eq!(engine.pending_count(), 0);
    }
}
