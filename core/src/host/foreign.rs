use std::ffi::CStr;
use std::os::raw::c_void;
use std::sync::Arc;

use blockgate_abi::{BlockMessage, GatewayHandlerVTable, GatewayStatus};

use crate::bridge::{CallbackBridge, BRIDGE_VTABLE};
use crate::error::{GatewayError, Result};

/// A handler instance reached only through its C vtable
pub struct ForeignHandler {
    instance: *mut c_void,
    vtable: &'static GatewayHandlerVTable,
    // Unloaded only after `destroy` has run in `drop`.
    library: Option<Arc<libloading::Library>>,
}

// Safety: the instance is only used through `&mut self`, one call at a time.
unsafe impl Send for ForeignHandler {}

impl ForeignHandler {
    /// Take ownership of `instance`; it is destroyed through `vtable` on drop.
    ///
    /// # Safety
    ///
    /// `instance` must have been created for `vtable` and not be owned elsewhere.
    pub unsafe fn new(
        instance: *mut c_void,
        vtable: &'static GatewayHandlerVTable,
    ) -> Result<Self> {
        if instance.is_null() {
            return Err(GatewayError::NullHandle);
        }
        Ok(Self {
            instance,
            vtable,
            library: None,
        })
    }

    /// Drive an in-process bridge through the C entry points
    pub fn from_bridge(bridge: CallbackBridge) -> Self {
        Self {
            instance: bridge.into_raw(),
            vtable: &BRIDGE_VTABLE,
            library: None,
        }
    }

    /// Keep the shared library that owns the vtable loaded while this lives
    pub(crate) fn keep_library(&mut self, library: Arc<libloading::Library>) {
        self.library = Some(library);
    }

    /// # Safety
    ///
    /// Same contract as [`crate::Gateway::dispatch`].
    pub unsafe fn eval(&mut self, msg: &mut BlockMessage) -> Result<()> {
        let raw = (self.vtable.eval)(self.instance, msg);
        if raw == GatewayStatus::Ok as i32 {
            return Ok(());
        }

        let status = GatewayStatus::from_raw(raw).unwrap_or(GatewayStatus::UserCallback);
        let text = (self.vtable.last_error)(self.instance);
        let message = if text.is_null() {
            format!("status {raw}")
        } else {
            CStr::from_ptr(text).to_string_lossy().into_owned()
        };
        Err(GatewayError::Foreign { status, message })
    }
}

impl Drop for ForeignHandler {
    fn drop(&mut self) {
        unsafe { (self.vtable.destroy)(self.instance) }
    }
}
