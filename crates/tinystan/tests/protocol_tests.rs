//! Memory and error protocol tests against the in-memory library

mod common;

use common::{assert_eq, Entry, MockConfig, MockModule};
use rstest::rstest;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use tinystan::ffi::{Ptr, StanModule};
use tinystan::marshal::Allocations;
use tinystan::protocol::ErrorCell;
use tinystan::session::{with_model, ModelSession};
use tinystan::{PrintCallback, StanError, StanErrorKind};

/// Drive a failing `create_model` by hand and return the checked result
fn failing_create(module: &MockModule) -> tinystan::Result<()> {
    let mut allocs = Allocations::new(module);
    let data = allocs.encode_str("{}")?;
    let cell = ErrorCell::new(module)?;
    let model = unsafe { module.create_model(data, 7, cell.ptr()) };
    assert!(model.is_null());
    cell.check(1)
}

fn capture() -> (PrintCallback, Arc<Mutex<Vec<(String, bool)>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let cb = PrintCallback::new(move |msg, is_error| {
        sink.lock().unwrap().push((msg.to_string(), is_error));
    });
    (cb, seen)
}

// ============================================================================
// ErrorCell
// ============================================================================

#[test]
fn test_success_frees_only_the_cell() {
    let module = MockModule::default();
    let cell = ErrorCell::new(&module).unwrap();
    cell.check(0).unwrap();

    assert_eq!(module.calls(), vec!["malloc", "free"]);
    assert_eq!(module.count("read_addr"), 0);
    module.assert_balanced();
}

#[test]
fn test_failure_consumes_error_in_order() {
    let module = MockModule::failing_at(Entry::CreateModel);
    let err = failing_create(&module).unwrap_err();

    match &err {
        StanError::Stan { kind, message } => {
            assert_eq!(*kind, StanErrorKind::Generic);
            assert_eq!(message, "something went wrong");
        }
        other => panic!("expected Stan error, got {:?}", other),
    }
    assert_eq!(err.to_string(), "Exception from Stan:\nsomething went wrong");

    let calls = module.calls();
    let after_create: Vec<_> = calls
        .iter()
        .skip_while(|c| **c != "create_model")
        .copied()
        .collect();
    assert_eq!(
        after_create,
        vec![
            "create_model",
            "read_addr",
            "get_error_message",
            "get_error_type",
            "destroy_error",
            "free",
            // transient data buffer, dropped last
            "free",
        ]
    );
    assert_eq!(module.count("get_error_message"), 1);
    assert_eq!(module.count("destroy_error"), 1);
    module.assert_balanced();
}

#[test]
fn test_failure_without_error_object_is_unknown() {
    let module = MockModule::new(MockConfig {
        fail_at: Some(Entry::CreateModel),
        omit_error_object: true,
        ..Default::default()
    });
    let err = failing_create(&module).unwrap_err();

    assert!(matches!(err, StanError::Unknown { code: 1 }));
    assert_eq!(module.count("get_error_message"), 0);
    assert_eq!(module.count("destroy_error"), 0);
    module.assert_balanced();
}

#[rstest]
#[case(0, StanErrorKind::Generic)]
#[case(1, StanErrorKind::Config)]
#[case(2, StanErrorKind::Interrupt)]
fn test_error_type_is_reported(#[case] code: i32, #[case] kind: StanErrorKind) {
    let module = MockModule::new(MockConfig {
        fail_at: Some(Entry::CreateModel),
        error_type: code,
        ..Default::default()
    });
    let err = failing_create(&module).unwrap_err();
    assert_eq!(err.kind(), Some(kind));
}

#[test]
fn test_unchecked_cell_is_freed_unread() {
    let module = MockModule::default();
    {
        let cell = ErrorCell::new(&module).unwrap();
        assert!(!cell.ptr().is_null());
    }
    assert_eq!(module.count("read_addr"), 0);
    module.assert_balanced();
}

#[test]
fn test_cell_allocation_failure() {
    let module = MockModule::new(MockConfig {
        fail_malloc_at: Some(0),
        ..Default::default()
    });
    let result = ErrorCell::new(&module);
    assert!(matches!(result, Err(StanError::Allocation { bytes: 4 })));
    module.assert_balanced();
}

#[test]
fn test_failure_echoes_to_print_sink() {
    let module = MockModule::failing_at(Entry::CreateModel);
    let (cb, seen) = capture();

    let err = ModelSession::open(&module, "{}", 1, Some(&cb)).err().unwrap();
    let seen = seen.lock().unwrap();

    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, err.to_string());
    assert!(seen[0].1);
}

#[test]
fn test_panicking_sink_does_not_break_cleanup() {
    let module = MockModule::failing_at(Entry::CreateModel);
    let cb = PrintCallback::new(|_, _| panic!("sink failure"));

    let err = ModelSession::open(&module, "{}", 1, Some(&cb)).err().unwrap();
    assert!(matches!(err, StanError::Stan { .. }));
    module.assert_balanced();
}

// ============================================================================
// Allocations
// ============================================================================

#[test]
fn test_allocations_released_on_drop() {
    let module = MockModule::default();
    {
        let mut allocs = Allocations::new(&module);
        allocs.alloc(16).unwrap();
        allocs.alloc_f64s(4).unwrap();
        allocs.encode_str("hello").unwrap();
        assert_eq!(allocs.len(), 3);
    }
    assert_eq!(module.mallocs(), 3);
    module.assert_balanced();
}

#[test]
fn test_null_registration_ignored() {
    let module = MockModule::default();
    let mut allocs = Allocations::new(&module);
    allocs.register(Ptr::NULL);
    assert!(allocs.is_empty());
    drop(allocs);
    assert_eq!(module.count("free"), 0);
}

#[test]
fn test_alloc_null_is_an_error_and_keeps_earlier_buffers_owned() {
    let module = MockModule::new(MockConfig {
        fail_malloc_at: Some(1),
        ..Default::default()
    });
    let mut allocs = Allocations::new(&module);
    allocs.alloc(8).unwrap();
    let err = allocs.alloc(24).unwrap_err();
    assert!(matches!(err, StanError::Allocation { bytes: 24 }));
    drop(allocs);
    module.assert_balanced();
}

#[test]
fn test_encode_str_is_nul_terminated() {
    let module = MockModule::default();
    let mut allocs = Allocations::new(&module);
    let s = allocs.encode_str(r#"{"N": 2}"#).unwrap();
    let bytes = unsafe { module.read_bytes(s.into(), 9) };
    assert_eq!(bytes, b"{\"N\": 2}\0".to_vec());
    assert_eq!(unsafe { module.read_c_string(s) }, r#"{"N": 2}"#);
}

#[test]
fn test_encode_str_rejects_interior_nul() {
    let module = MockModule::default();
    let mut allocs = Allocations::new(&module);
    let err = allocs.encode_str("a\0b").unwrap_err();
    assert!(matches!(err, StanError::InvalidString));
    assert_eq!(module.mallocs(), 0);
}

#[test]
fn test_write_f64s_round_trips_through_module() {
    let module = MockModule::default();
    let mut allocs = Allocations::new(&module);
    let ptr = allocs.write_f64s(&[1.5, -2.0, 3.25]).unwrap();
    assert_eq!(unsafe { module.read_f64s(ptr, 3) }, vec![1.5, -2.0, 3.25]);
}

// ============================================================================
// ModelSession / with_model
// ============================================================================

#[test]
fn test_session_lifecycle_order() {
    let module = MockModule::default();
    let value = with_model(&module, r#"{"N": 1}"#, 42, None, |session| {
        session.deferred().alloc(32)?;
        session.deferred().alloc(8)?;
        Ok(session.num_free_params())
    })
    .unwrap();

    assert_eq!(value, 2);
    assert_eq!(module.last_data().as_deref(), Some(r#"{"N": 1}"#));
    assert_eq!(module.last_seed(), Some(42));

    let calls = module.calls();
    assert_eq!(calls.last(), Some(&"destroy_model"));
    let n = calls.len();
    // deferred buffers are released before the model is destroyed
    assert_eq!(&calls[n - 3..n - 1], &["free", "free"]);
    module.assert_balanced();
}

#[test]
fn test_data_buffer_freed_right_after_create() {
    let module = MockModule::default();
    with_model(&module, "{}", 1, None, |_| Ok(())).unwrap();
    let calls = module.calls();
    let create = calls.iter().position(|c| *c == "create_model").unwrap();
    assert_eq!(calls[create + 1], "free");
}

#[test]
fn test_body_error_propagates_after_cleanup() {
    let module = MockModule::default();
    let result: tinystan::Result<()> = with_model(&module, "{}", 1, None, |session| {
        session.deferred().alloc(64)?;
        Err(StanError::Validation("body failed".into()))
    });

    assert_eq!(result.unwrap_err().to_string(), "body failed");
    assert_eq!(module.count("destroy_model"), 1);
    module.assert_balanced();
}

#[test]
fn test_body_panic_still_cleans_up() {
    let module = MockModule::default();
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let _ = with_model(&module, "{}", 1, None, |session| -> tinystan::Result<()> {
            session.deferred().alloc(64)?;
            panic!("body exploded");
        });
    }));

    assert!(outcome.is_err());
    assert_eq!(module.count("destroy_model"), 1);
    module.assert_balanced();
}

#[test]
fn test_failed_create_never_destroys() {
    let module = MockModule::failing_at(Entry::CreateModel);
    let mut ran = false;
    let result = with_model(&module, "{}", 1, None, |_| {
        ran = true;
        Ok(())
    });

    assert!(result.is_err());
    assert!(!ran);
    assert_eq!(module.count("destroy_model"), 0);
    module.assert_balanced();
}

#[test]
fn test_empty_param_names() {
    let module = MockModule::new(MockConfig {
        param_names: String::new(),
        ..Default::default()
    });
    let names = with_model(&module, "", 1, None, |s| Ok(s.param_names())).unwrap();
    assert!(names.is_empty());
}
