use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::cell::{Cell, RefCell};
use std::ffi::CString;
use std::os::raw::{c_char, c_int, c_void};
use std::panic::{self, catch_unwind, AssertUnwindSafe};
use std::sync::Once;

use blockgate_abi::{BlockMessage, GatewayAction, GatewayHandlerVTable, GatewayStatus};

use crate::error::{GatewayError, Result};
use crate::gateway::Gateway;

thread_local! {
    static EVAL_DEPTH: Cell<u32> = const { Cell::new(0) };
    static PANIC_TRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// Chain a hook that keeps quiet for panics raised under [`CallbackBridge::eval`].
/// The panic site and its stack are stashed for the bridge to log instead.
fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if EVAL_DEPTH.with(Cell::get) == 0 {
                previous(info);
                return;
            }
            let location = info
                .location()
                .map_or_else(|| "<unknown>".to_string(), ToString::to_string);
            let trace = format!("panicked at {location}\n{}", Backtrace::force_capture());
            PANIC_TRACE.with(|slot| *slot.borrow_mut() = Some(trace));
        }));
    });
}

/// Entry point the native side calls for every action.
///
/// Runs the dispatch with panics caught, and on failure writes one
/// `log::error!` record (block, action, error and the stack where the failure
/// was raised) before handing the same error back. Callers must not log it
/// again.
pub struct CallbackBridge {
    gateway: Gateway,
    failures: u64,
    last_error: Option<CString>,
}

impl CallbackBridge {
    pub fn new(gateway: Gateway) -> Self {
        Self {
            gateway,
            failures: 0,
            last_error: None,
        }
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    pub fn gateway_mut(&mut self) -> &mut Gateway {
        &mut self.gateway
    }

    /// Number of dispatches that ended in an error
    pub fn failure_count(&self) -> u64 {
        self.failures
    }

    /// Message of the most recent failure
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_ref().and_then(|msg| msg.to_str().ok())
    }

    /// # Safety
    ///
    /// Same contract as [`Gateway::dispatch`].
    pub unsafe fn eval(&mut self, msg: &mut BlockMessage) -> Result<()> {
        install_panic_hook();
        PANIC_TRACE.with(|slot| slot.borrow_mut().take());

        let gateway = &mut self.gateway;
        EVAL_DEPTH.with(|depth| depth.set(depth.get() + 1));
        let outcome = catch_unwind(AssertUnwindSafe(|| gateway.dispatch(msg)));
        EVAL_DEPTH.with(|depth| depth.set(depth.get() - 1));

        let result = match outcome {
            Ok(result) => result,
            Err(payload) => Err(GatewayError::Panic {
                message: panic_message(payload.as_ref()),
                trace: PANIC_TRACE
                    .with(|slot| slot.borrow_mut().take())
                    .unwrap_or_default(),
            }),
        };

        if let Err(err) = &result {
            self.record_failure(msg.action, err);
        }
        result
    }

    fn record_failure(&mut self, action: u32, err: &GatewayError) {
        let action = GatewayAction::from_raw(action)
            .map(GatewayAction::as_str)
            .unwrap_or("UNKNOWN");
        log::error!(
            "Unhandled error in block '{}' during {}: {}\n{}",
            self.gateway.descriptor().name(),
            action,
            err,
            origin_trace(err)
        );

        self.failures += 1;
        let text = err.to_string().replace('\0', " ");
        self.last_error = CString::new(text).ok();
    }

    /// Leak into an opaque instance pointer for [`BRIDGE_VTABLE`]
    pub fn into_raw(self) -> *mut c_void {
        Box::into_raw(Box::new(self)) as *mut c_void
    }
}

/// Stack of the failure's origin. Falls back to the bridge's own stack when the
/// error carries none.
fn origin_trace(err: &GatewayError) -> String {
    match err {
        GatewayError::UserCallback(inner)
            if inner.backtrace().status() == BacktraceStatus::Captured =>
        {
            inner.backtrace().to_string()
        }
        GatewayError::Panic { trace, .. } if !trace.is_empty() => trace.clone(),
        _ => Backtrace::force_capture().to_string(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

unsafe extern "C" fn bridge_eval(instance: *mut c_void, msg: *mut BlockMessage) -> c_int {
    if instance.is_null() || msg.is_null() {
        return GatewayStatus::NullHandle as c_int;
    }
    let bridge = &mut *(instance as *mut CallbackBridge);
    match bridge.eval(&mut *msg) {
        Ok(()) => GatewayStatus::Ok as c_int,
        Err(err) => err.status() as c_int,
    }
}

unsafe extern "C" fn bridge_last_error(instance: *const c_void) -> *const c_char {
    if instance.is_null() {
        return std::ptr::null();
    }
    let bridge = &*(instance as *const CallbackBridge);
    bridge
        .last_error
        .as_ref()
        .map_or(std::ptr::null(), |msg| msg.as_ptr())
}

unsafe extern "C" fn bridge_destroy(instance: *mut c_void) {
    if !instance.is_null() {
        drop(Box::from_raw(instance as *mut CallbackBridge));
    }
}

/// C entry points over a [`CallbackBridge::into_raw`] instance
pub static BRIDGE_VTABLE: GatewayHandlerVTable = GatewayHandlerVTable {
    eval: bridge_eval,
    last_error: bridge_last_error,
    destroy: bridge_destroy,
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{Block, BlockContext};
    use crate::buffer::{InputView, OutputView};
    use crate::message::MessageSlot;
    use crate::native::NativeState;
    use blockgate_signals::BlockDescriptor;

    struct Panicky;

    impl Block for Panicky {
        fn start(&mut self, _cx: &mut BlockContext<'_>) -> anyhow::Result<bool> {
            panic!("device missing");
        }

        fn work(
            &mut self,
            _cx: &mut BlockContext<'_>,
            _input_items: &[InputView<'_>],
            _output_items: &mut [OutputView<'_>],
        ) -> anyhow::Result<c_int> {
            anyhow::bail!("bad samples")
        }
    }

    fn bridge() -> CallbackBridge {
        let desc = BlockDescriptor::from_tags::<&str>("panicky", None, None).unwrap();
        CallbackBridge::new(Gateway::new(
            desc,
            Box::new(Panicky),
            Box::new(NativeState::default()),
        ))
    }

    #[test]
    fn test_panic_becomes_error() {
        let mut bridge = bridge();
        let mut slot = MessageSlot::new();
        slot.load_start();

        let err = unsafe { bridge.eval(slot.message_mut()) }.unwrap_err();
        match err {
            GatewayError::Panic { message, trace } => {
                assert_eq!(message, "device missing");
                assert!(trace.starts_with("panicked at "));
                assert!(trace.contains("bridge.rs"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!slot.message().start_return_value);
        assert_eq!(bridge.failure_count(), 1);
        assert!(bridge.last_error().unwrap().contains("device missing"));
    }

    #[test]
    fn test_vtable_reports_status() {
        let instance = bridge().into_raw();
        let mut slot = MessageSlot::new();
        slot.load_work(&[], &[]);
        slot.message_mut().work_return_value = -99;

        unsafe {
            let status = (BRIDGE_VTABLE.eval)(instance, slot.message_mut());
            assert_eq!(GatewayStatus::from_raw(status), Some(GatewayStatus::UserCallback));
            assert_eq!(slot.message().work_return_value, -99);

            let text = std::ffi::CStr::from_ptr((BRIDGE_VTABLE.last_error)(instance));
            assert!(text.to_str().unwrap().contains("bad samples"));

            assert_eq!(
                (BRIDGE_VTABLE.eval)(std::ptr::null_mut(), slot.message_mut()),
                GatewayStatus::NullHandle as c_int
            );
            (BRIDGE_VTABLE.destroy)(instance);
        }
    }
}
