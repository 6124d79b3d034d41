use std::cell::{Cell, RefCell};
use std::os::raw::c_int;
use std::sync::Once;

use blockgate_core::{
    create_bridge, item_bytes, item_bytes_mut, Block, BlockContext, BlockDescriptor, BlockHost,
    GatewayError, InputView, MessageSlot, NativeState, OutputView,
};
use log::{Level, Log, Metadata, Record};

thread_local! {
    static ERRORS: RefCell<Vec<String>> = RefCell::new(Vec::new());
    static HOOK_CALLS: Cell<usize> = Cell::new(0);
}

/// Records error-level lines per test thread
struct ErrorCounter;

impl Log for ErrorCounter {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Error
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            ERRORS.with(|errors| errors.borrow_mut().push(record.args().to_string()));
        }
    }

    fn flush(&self) {}
}

static LOGGER: ErrorCounter = ErrorCounter;
static INIT: Once = Once::new();

/// Runs before any error is built so block errors carry their own backtrace,
/// and counts every panic report that reaches the default hook.
fn take_errors() -> Vec<String> {
    INIT.call_once(|| {
        std::env::set_var("RUST_LIB_BACKTRACE", "1");
        let default_hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            HOOK_CALLS.with(|calls| calls.set(calls.get() + 1));
            default_hook(info);
        }));
        log::set_logger(&LOGGER).unwrap();
        log::set_max_level(log::LevelFilter::Info);
    });
    HOOK_CALLS.with(|calls| calls.set(0));
    ERRORS.with(|errors| std::mem::take(&mut *errors.borrow_mut()))
}

#[inline(never)]
fn reject_samples(count: usize) -> anyhow::Result<c_int> {
    anyhow::bail!("cannot process {count} items")
}

#[inline(never)]
fn explode_on_start() -> bool {
    let samples: Vec<f32> = Vec::new();
    samples[3] > 0.0
}

struct Faulty;

impl Block for Faulty {
    fn work(
        &mut self,
        _cx: &mut BlockContext<'_>,
        input_items: &[InputView<'_>],
        _output_items: &mut [OutputView<'_>],
    ) -> anyhow::Result<c_int> {
        reject_samples(input_items[0].len())
    }

    fn start(&mut self, _cx: &mut BlockContext<'_>) -> anyhow::Result<bool> {
        Ok(explode_on_start())
    }
}

fn faulty_descriptor() -> BlockDescriptor {
    BlockDescriptor::from_tags("faulty", Some(&["float32"]), Some(&["float32"])).unwrap()
}

fn faulty_host() -> BlockHost<blockgate_core::CallbackBridge> {
    let desc = faulty_descriptor();
    BlockHost::for_bridge(create_bridge(
        desc,
        Box::new(Faulty),
        Box::new(NativeState::default()),
    ))
}

#[test]
fn test_user_error_logged_once_and_reraised() {
    take_errors();
    let mut host = faulty_host();
    let input = [1.0f32; 4];
    let mut output = [0.0f32; 4];

    let err = host
        .work(&[item_bytes(&input)], &mut [item_bytes_mut(&mut output)])
        .unwrap_err();
    match &err {
        GatewayError::UserCallback(inner) => {
            assert_eq!(inner.to_string(), "cannot process 4 items")
        }
        other => panic!("unexpected error: {other}"),
    }

    let errors = take_errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("faulty"));
    assert!(errors[0].contains("WORK"));
    assert!(errors[0].contains("cannot process 4 items"));
    assert_eq!(host.handler().failure_count(), 1);
}

#[test]
fn test_failed_work_leaves_return_slot() {
    take_errors();
    let desc = faulty_descriptor();
    let mut bridge = create_bridge(desc, Box::new(Faulty), Box::new(NativeState::default()));

    let input = [1.0f32; 2];
    let mut output = [0.0f32; 2];
    let mut slot = MessageSlot::new();
    slot.load_work(
        &[(input.as_ptr().cast(), 2)],
        &[(output.as_mut_ptr().cast(), 2)],
    );
    slot.message_mut().work_return_value = -99;

    assert!(unsafe { bridge.eval(slot.message_mut()) }.is_err());
    assert_eq!(slot.message().work_return_value, -99);
    assert_eq!(take_errors().len(), 1);
}

#[test]
fn test_panic_is_caught_and_logged_once() {
    take_errors();
    let mut host = faulty_host();

    let err = host.start().unwrap_err();
    assert!(matches!(err, GatewayError::Panic { .. }));

    let errors = take_errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("START"));
    assert!(host.handler().last_error().unwrap().contains("panicked"));
}

#[test]
fn test_user_error_log_shows_raising_function() {
    take_errors();
    let mut host = faulty_host();
    let input = [1.0f32; 2];
    let mut output = [0.0f32; 2];
    assert!(host
        .work(&[item_bytes(&input)], &mut [item_bytes_mut(&mut output)])
        .is_err());

    let errors = take_errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("reject_samples"), "{}", errors[0]);
}

#[test]
fn test_panic_reported_once_with_panic_site() {
    take_errors();
    let mut host = faulty_host();
    assert!(host.start().is_err());

    let errors = take_errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("panicked at "));
    assert!(errors[0].contains("bridge_tests.rs"));
    assert!(errors[0].contains("explode_on_start"), "{}", errors[0]);
    assert_eq!(HOOK_CALLS.with(Cell::get), 0);
}

#[test]
fn test_panics_outside_bridge_reach_hook() {
    take_errors();
    assert!(std::panic::catch_unwind(explode_on_start).is_err());
    assert_eq!(HOOK_CALLS.with(Cell::get), 1);
    assert!(take_errors().is_empty());
}

#[test]
fn test_successful_calls_do_not_log_errors() {
    take_errors();
    let mut host = faulty_host();
    assert!(host.stop().unwrap());
    assert_eq!(host.forecast(8).unwrap(), vec![8]);
    assert!(take_errors().is_empty());
    assert_eq!(host.handler().failure_count(), 0);
    assert!(host.handler().last_error().is_none());
}

#[test]
fn test_each_failure_logged_separately() {
    take_errors();
    let mut host = faulty_host();
    let input = [1.0f32];
    let mut output = [0.0f32];
    for _ in 0..3 {
        assert!(host
            .work(&[item_bytes(&input)], &mut [item_bytes_mut(&mut output)])
            .is_err());
    }
    assert_eq!(take_errors().len(), 3);
    assert_eq!(host.handler().failure_count(), 3);
}
