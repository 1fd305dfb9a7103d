use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use sqlvm::mem::Allocator;
use sqlvm::storage::{MemoryStorage, Storage};
use sqlvm::vdbe::{AuxDataCache, AuxDestructor, AuxPayload, Mem, ValueFlags};
use sqlvm::{
    ColumnType, ConnectionConfig, Encoding, ErrorCode, Opcode, ResultCode, SqliteConnection,
    SqliteValue, StepResult, Value, VdbeBuilder, P4,
};

fn counter() -> (Arc<AtomicUsize>, AuxDestructor) {
    let n = Arc::new(AtomicUsize::new(0));
    let n2 = Arc::clone(&n);
    let destructor: AuxDestructor = Box::new(move |_: AuxPayload| {
        n2.fetch_add(1, Ordering::SeqCst);
    });
    (n, destructor)
}

// ============================================================================
// Auxiliary-data cache
// ============================================================================

#[test]
fn aux_replace_keeps_single_entry() {
    let mut cache = AuxDataCache::new(Arc::new(Allocator::new()));
    for (op, arg) in [(0, 0), (4, 2), (5, -1), (9, 7)] {
        let (d1_calls, d1) = counter();
        let (d2_calls, d2) = counter();
        let before = cache.len();

        cache.set(op, arg, Box::new(1i64), Some(d1));
        cache.set(op, arg, Box::new(2i64), Some(d2));

        assert_eq!(cache.len(), before + 1, "key ({}, {})", op, arg);
        assert_eq!(d1_calls.load(Ordering::SeqCst), 1);
        assert_eq!(d2_calls.load(Ordering::SeqCst), 0);
        assert_eq!(cache.get_as::<i64>(op, arg), Some(&2));
    }
}

#[test]
fn aux_exact_store_does_not_replace_any_entry() {
    let mut cache = AuxDataCache::new(Arc::new(Allocator::new()));
    let (any_calls, any_d) = counter();
    cache.set(0x10, -1, Box::new(1u32), Some(any_d));
    cache.set(0x10, 3, Box::new(2u32), None);

    assert_eq!(cache.len(), 2);
    assert_eq!(any_calls.load(Ordering::SeqCst), 0);
    assert_eq!(cache.get_as::<u32>(0x10, 5), Some(&1));
    assert_eq!(cache.get_as::<u32>(0x10, 3), Some(&2));

    // another store under a negative index does replace it
    cache.set(0x10, -7, Box::new(3u32), None);
    assert_eq!(cache.len(), 2);
    assert_eq!(any_calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.get_as::<u32>(0x10, 5), Some(&3));
}

#[test]
fn aux_any_store_does_not_replace_exact_entry() {
    let mut cache = AuxDataCache::new(Arc::new(Allocator::new()));
    let (exact_calls, exact_d) = counter();
    cache.set(0x10, 3, Box::new(1u32), Some(exact_d));
    cache.set(0x10, -1, Box::new(2u32), None);

    assert_eq!(cache.len(), 2);
    assert_eq!(exact_calls.load(Ordering::SeqCst), 0);
    assert_eq!(cache.get_as::<u32>(0x10, 5), Some(&2));
    assert!(cache.get(0x11, 5).is_none());
}

#[test]
fn aux_allocation_failure_leaves_cache_unchanged() {
    let alloc = Arc::new(Allocator::new());
    let mut cache = AuxDataCache::new(Arc::clone(&alloc));
    cache.set(1, 0, Box::new("a"), None);
    cache.set(2, 0, Box::new("b"), None);
    let listing = format!("{:?}", cache);

    let (calls, d) = counter();
    alloc.fault_sim().arm(0, 1);
    cache.set(3, 0, Box::new("c"), Some(d));

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.len(), 2);
    assert_eq!(format!("{:?}", cache), listing);
    assert_eq!(cache.get_as::<&str>(1, 0), Some(&"a"));
    assert_eq!(cache.get_as::<&str>(2, 0), Some(&"b"));
    assert!(cache.get(3, 0).is_none());
}

#[test]
fn aux_clear_runs_every_destructor() {
    let mut cache = AuxDataCache::new(Arc::new(Allocator::new()));
    let (calls, d) = counter();
    let (calls2, d2) = counter();
    cache.set(1, 0, Box::new(()), Some(d));
    cache.set(2, 1, Box::new(()), Some(d2));
    cache.set(3, 1, Box::new(()), None);
    cache.clear_all();
    assert!(cache.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(calls2.load(Ordering::SeqCst), 1);
}

// ============================================================================
// Reset cleanliness
// ============================================================================

#[test]
fn reset_clears_registers_and_cursors() {
    let storage = MemoryStorage::new();
    storage.create_table(
        "t",
        vec![
            vec![Value::Integer(1), Value::from("x")],
            vec![Value::Integer(2), Value::from("y")],
        ],
    );
    let conn = SqliteConnection::open(ConnectionConfig::default(), Arc::new(storage.clone()));

    let mut b = VdbeBuilder::new();
    let r = b.alloc_reg(3);
    let c = b.alloc_cursor();
    let done = b.alloc_label();
    b.add_op4(Opcode::OpenRead, c, 0, 0, P4::Table("t".into()));
    b.add_op_label(Opcode::Rewind, c, done, 0);
    let top = b.current_addr();
    b.add_op(Opcode::Column, c, 0, r);
    b.add_op(Opcode::Column, c, 1, r + 1);
    b.add_op4(Opcode::Blob, 0, r + 2, 0, P4::Blob(vec![1, 2, 3]));
    b.add_op(Opcode::ResultRow, r, 3, 0);
    b.add_op(Opcode::Next, c, top, 0);
    b.resolve_label(done);
    b.add_op(Opcode::Halt, 0, 0, 0);
    let mut prog = conn.prepare(b.build().unwrap());

    // stop mid-scan, with a cursor open and registers populated
    assert_eq!(prog.step().unwrap(), StepResult::Row);
    assert_eq!(prog.cursors().open_count(), 1);
    assert!(!prog.registers().is_clean());
    prog.set_auxdata(0, 0, Box::new(5u8), None);

    prog.reset();
    assert!(prog.registers().is_clean());
    assert!(prog.cursors().all_closed());
    assert!(prog.aux_data().is_empty());
    assert_eq!(storage.open_cursor_count(), 0);
    assert_eq!(prog.pc(), None);

    // and the program runs again from the start
    assert_eq!(prog.step().unwrap(), StepResult::Row);
    assert_eq!(prog.column_value(1), Value::from("x"));
    assert_eq!(prog.step().unwrap(), StepResult::Row);
    assert_eq!(prog.column_value(1), Value::from("y"));
    assert_eq!(prog.step().unwrap(), StepResult::Done);
    prog.reset();
    assert!(prog.registers().is_clean());
    assert!(prog.cursors().all_closed());
}

// ============================================================================
// Halt error transfer
// ============================================================================

#[test]
fn halt_program_message_takes_precedence() {
    let conn = SqliteConnection::open_in_memory();
    conn.report(ErrorCode::Busy.into(), Some("stale busy".into()));

    let mut b = VdbeBuilder::new();
    b.add_op4(
        Opcode::Halt,
        ResultCode::CONSTRAINT_UNIQUE.raw(),
        0,
        0,
        P4::Text("UNIQUE constraint failed: t.a".into()),
    );
    let mut prog = conn.prepare(b.build().unwrap());

    assert!(prog.step().is_err());
    let st = conn.error_state();
    assert_eq!(st.message.as_deref(), Some("UNIQUE constraint failed: t.a"));
    assert_eq!(st.code, ResultCode::CONSTRAINT_UNIQUE);
    assert!(prog.error_message().is_none());
}

#[test]
fn halt_code_only_clears_pending_message() {
    let conn = SqliteConnection::open_in_memory();
    conn.report(ErrorCode::Busy.into(), Some("stale busy".into()));

    let mut b = VdbeBuilder::new();
    b.add_op(Opcode::Noop, 0, 0, 0);
    let mut prog = conn.prepare(b.build().unwrap());

    assert_eq!(prog.step().unwrap(), StepResult::Done);
    let st = conn.error_state();
    assert!(st.code.is_ok());
    assert!(st.message.is_none());
}

#[test]
fn halt_before_start_is_noop() {
    let conn = SqliteConnection::open_in_memory();
    conn.report(ErrorCode::Corrupt.into(), Some("prior failure".into()));
    let before = conn.error_state();

    let mut b = VdbeBuilder::new();
    b.add_op(Opcode::Halt, ErrorCode::Abort as i32, 0, 0);
    let mut prog = conn.prepare(b.build().unwrap());

    assert_eq!(prog.pc(), None);
    assert_eq!(prog.halt(), ResultCode::OK);
    assert_eq!(prog.reset(), ResultCode::OK);
    assert_eq!(conn.error_state(), before);
    drop(prog);
    assert_eq!(conn.error_state(), before);
}

// ============================================================================
// Bind dispatch
// ============================================================================

#[test]
fn bind_int_real_reads_back_as_double() {
    let alloc = Allocator::new();
    for i in [0i64, -1, 1, 42, i64::MIN, i64::MAX] {
        let mut cell = Mem::Null;
        SqliteValue::int_real(i)
            .copy_into(&mut cell, Encoding::Utf8, &alloc)
            .unwrap();
        assert_eq!(cell.column_type(), ColumnType::Float);
        assert_eq!(cell.to_real(), i as f64, "int-real {}", i);
    }
}

#[test]
fn bind_int_real_flag_checked_before_real() {
    // both REAL and INT_REAL set, with a misleading double alongside
    let v = SqliteValue::from_raw(
        ValueFlags::REAL | ValueFlags::INT_REAL,
        7,
        99.5,
        None,
        0,
        Encoding::Utf8,
    );
    let mut cell = Mem::Null;
    v.copy_into(&mut cell, Encoding::Utf8, &Allocator::new()).unwrap();
    assert_eq!(cell.to_real(), 7.0);
}

#[test]
fn bind_int_real_through_program() {
    let mut b = VdbeBuilder::new();
    let r = b.alloc_reg(1);
    let p = b.alloc_var();
    b.add_op(Opcode::Variable, p, r, 0);
    b.add_op(Opcode::ResultRow, r, 1, 0);
    let conn = SqliteConnection::open_in_memory();
    let mut prog = conn.prepare(b.build().unwrap());

    for i in [0i64, -1, i64::MIN, i64::MAX] {
        prog.reset();
        prog.bind_value(1, &SqliteValue::int_real(i)).unwrap();
        assert_eq!(prog.step().unwrap(), StepResult::Row);
        assert_eq!(prog.column_type(0), ColumnType::Float);
        assert_eq!(prog.column_double(0), i as f64);
    }
}

#[test]
fn bind_zero_blob_ignores_backing_bytes() {
    let junk = b"not zeros";
    for n in [0usize, 1, 16, 4096] {
        let v = SqliteValue::from_raw(
            ValueFlags::BLOB | ValueFlags::ZERO,
            0,
            0.0,
            Some(junk),
            n,
            Encoding::Utf8,
        );
        let mut cell = Mem::Null;
        v.copy_into(&mut cell, Encoding::Utf8, &Allocator::new()).unwrap();
        assert_eq!(cell.column_type(), ColumnType::Blob);
        assert_eq!(cell.len(), n);
        assert!(cell.to_blob().iter().all(|&b| b == 0));
    }
}

#[test]
fn bind_unknown_flags_bind_null() {
    let v = SqliteValue::from_raw(ValueFlags::empty(), 5, 5.0, Some(b"x"), 0, Encoding::Utf8);
    let mut cell = Mem::Integer(1);
    v.copy_into(&mut cell, Encoding::Utf8, &Allocator::new()).unwrap();
    assert!(cell.is_null());
}

#[test]
fn bind_copy_failure_leaves_null() {
    let conn = SqliteConnection::open_in_memory();
    let mut b = VdbeBuilder::new();
    b.alloc_var();
    let mut prog = conn.prepare(b.build().unwrap());

    prog.bind_value(1, &SqliteValue::integer(3)).unwrap();
    conn.allocator().fault_sim().arm(0, 1);
    let err = prog.bind_value(1, &SqliteValue::blob(b"payload")).unwrap_err();
    assert_eq!(err.code(), ErrorCode::NoMem);
    assert!(prog.parameter(1).map_or(false, Mem::is_null));
    assert_eq!(conn.error_state().code, ResultCode::from(ErrorCode::NoMem));
}
