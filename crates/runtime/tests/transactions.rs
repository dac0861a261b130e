//! Snapshot transactions, protected writes and owner locks.

use std::rc::Rc;

use item_core::{EngineConfig, ErrorCode, ItemAccessor, VarValue};
use item_runtime::memory::{AccessOp, ItemRecord, MemoryAccessor, MemoryItem};
use item_runtime::write::{self, CoreFieldChanges};
use item_runtime::{DirtyKind, Engine, ManualClock};
use pretty_assertions::assert_eq;

fn engine() -> Engine<MemoryAccessor> {
    Engine::builder(MemoryAccessor::new())
        .config(EngineConfig::default())
        .clock(Rc::new(ManualClock::new(0.0)))
        .build()
        .unwrap()
}

fn amulet() -> MemoryItem {
    MemoryItem::new(
        ItemRecord::new("Amulet", 55)
            .with_quality(5)
            .with_value(300)
            .with_tag("jewelry")
            .with_variable("charges", 3)
            .with_constant("origin", "crypt"),
    )
}

#[test]
fn test_rollback_restores_snapshot() {
    let mut engine = engine();
    let item = amulet();

    let token = engine.begin(&item).unwrap();
    let accessor = engine.accessor();
    accessor.set_quality(&item, 9).unwrap();
    accessor.set_name(&item, "Cursed Amulet").unwrap();
    accessor.set_variable(&item, "charges", &VarValue::Int(0)).unwrap();
    accessor
        .set_tags(&item, &["jewelry".to_string(), "cursed".to_string()])
        .unwrap();
    accessor
        .set_constant(&item, "origin", &"forge".into(), false)
        .unwrap();

    engine.rollback(&item, token).unwrap();

    let record = item.record();
    assert_eq!(record.quality, 5);
    assert_eq!(record.display_quality, 5);
    assert_eq!(record.name, "Amulet");
    assert_eq!(record.variable("charges"), Some(&VarValue::Int(3)));
    assert_eq!(record.tags, vec!["jewelry".to_string()]);
    assert_eq!(
        record.constants,
        vec![("origin".to_string(), VarValue::from("crypt"))]
    );
    assert_eq!(engine.transactions().open_count(), 0);
}

#[test]
fn test_unknown_token_not_found() {
    let mut engine = engine();
    let item = amulet();
    let other = amulet();

    let token = engine.begin(&item).unwrap();
    let err = engine.commit(&other, token).unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);

    engine.commit(&item, token).unwrap();
    assert_eq!(engine.commit(&item, token).unwrap_err().code(), ErrorCode::NotFound);
    assert_eq!(engine.rollback(&item, token).unwrap_err().code(), ErrorCode::NotFound);
}

#[test]
fn test_commit_marks_dirty_under_explicit_only() {
    let mut engine = engine();
    let item = amulet();
    assert!(!engine.mark_dirty(&item, DirtyKind::CORE));

    let token = engine.begin(&item).unwrap();
    engine.accessor().set_value(&item, 320).unwrap();
    engine.commit(&item, token).unwrap();

    let entry = engine.scheduler().entry(engine.stable_id(&item)).unwrap();
    assert_eq!(entry.kind, DirtyKind::ALL);
}

#[test]
fn test_transactions_keep_their_own_snapshots() {
    let mut engine = engine();
    let item = amulet();

    let outer = engine.begin(&item).unwrap();
    engine.accessor().set_quality(&item, 7).unwrap();
    let inner = engine.begin(&item).unwrap();
    engine.accessor().set_quality(&item, 8).unwrap();
    assert_eq!(engine.transactions().open_count(), 2);

    engine.rollback(&item, inner).unwrap();
    assert_eq!(item.record().quality, 7);
    engine.rollback(&item, outer).unwrap();
    assert_eq!(item.record().quality, 5);
}

#[test]
fn test_rollback_reports_failed_facets() {
    let mut engine = engine();
    let item = amulet();
    let token = engine.begin(&item).unwrap();
    engine.accessor().set_quality(&item, 1).unwrap();
    engine.accessor().inject_fault(AccessOp::SetTags);

    let err = engine.rollback(&item, token).unwrap_err();
    assert_eq!(err.code(), ErrorCode::OperationFailed);
    assert_eq!(item.record().quality, 5);
    assert_eq!(engine.transactions().open_count(), 0);
}

#[test]
fn test_core_write_undone_on_failure() {
    let accessor = MemoryAccessor::new();
    let item = amulet();
    accessor.inject_fault(AccessOp::SetValue);

    let changes = CoreFieldChanges {
        name: Some("Gilded Amulet".into()),
        quality: Some(8),
        value: Some(999),
        ..Default::default()
    };
    let err = write::write_core_fields(&accessor, &item, &changes).unwrap_err();

    assert_eq!(err.code(), ErrorCode::OperationFailed);
    let record = item.record();
    assert_eq!(record.name, "Amulet");
    assert_eq!(record.quality, 5);
    assert_eq!(record.value, 300);
}

#[test]
fn test_variable_write_undone_on_failure() {
    let accessor = MemoryAccessor::new();
    let item = amulet();
    let entries = vec![
        ("charges".to_string(), VarValue::Int(1)),
        ("bound".to_string(), VarValue::Bool(true)),
    ];

    write::write_variables(&accessor, &item, &entries, false).unwrap();
    assert_eq!(item.record().variable("charges"), Some(&VarValue::Int(3)));
    assert_eq!(item.record().variable("bound"), Some(&VarValue::Bool(true)));

    accessor.inject_fault(AccessOp::SetVariable);
    let err = write::write_variables(&accessor, &item, &entries, true).unwrap_err();
    assert_eq!(err.code(), ErrorCode::OperationFailed);
    assert_eq!(item.record().variable("charges"), Some(&VarValue::Int(3)));
}

#[test]
fn test_constants_and_tags_writes() {
    let accessor = MemoryAccessor::new();
    let item = amulet();

    let entries = vec![
        ("origin".to_string(), VarValue::from("tomb")),
        ("maker".to_string(), VarValue::from("unknown")),
    ];
    write::write_constants(&accessor, &item, &entries, false).unwrap();
    assert_eq!(item.record().constants.len(), 1);
    assert_eq!(accessor.constant(&item, "origin").unwrap(), Some("tomb".into()));

    write::write_constants(&accessor, &item, &entries, true).unwrap();
    assert_eq!(item.record().constants.len(), 2);

    let tags = vec!["magic".to_string(), "jewelry".to_string(), "magic".to_string()];
    write::write_tags(&accessor, &item, &tags, true).unwrap();
    assert_eq!(item.record().tags, vec!["jewelry", "magic"]);

    write::write_tags(&accessor, &item, &tags, false).unwrap();
    assert_eq!(item.record().tags, vec!["magic", "jewelry"]);
}

#[test]
fn test_owner_locks() {
    let mut engine = engine();
    let item = amulet();

    engine.try_lock(&item, "merchant").unwrap();
    engine.try_lock(&item, "merchant").unwrap();
    assert_eq!(engine.lock_holder(&item), Some("merchant"));

    let err = engine.try_lock(&item, "thief").unwrap_err();
    assert_eq!(err.code(), ErrorCode::Conflict);
    assert!(!engine.unlock(&item, "thief"));

    assert!(engine.unlock(&item, "merchant"));
    engine.try_lock(&item, "thief").unwrap();
    assert_eq!(engine.lock_holder(&item), Some("thief"));
}
