//! Native-side driver: fills the message record and calls the handler,
//! the way a scheduler would.

mod foreign;
mod library;

pub use foreign::ForeignHandler;
pub use library::{is_block_library, BlockLibrary};

use std::ffi::CStr;
use std::os::raw::{c_int, c_void};

use blockgate_abi::{
    BlockCreateFn, BlockGetVTableFn, BlockManifestFn, BlockMessage, GatewayStatus, IoSignatureAbi,
    ABI_VERSION,
};
use blockgate_signals::IoSignature;

use crate::bridge::CallbackBridge;
use crate::error::{GatewayError, Result};
use crate::message::MessageSlot;

/// Something that can evaluate a dispatch message
pub trait Handler {
    /// # Safety
    ///
    /// Same contract as [`crate::Gateway::dispatch`].
    unsafe fn eval(&mut self, msg: &mut BlockMessage) -> Result<()>;
}

impl Handler for CallbackBridge {
    unsafe fn eval(&mut self, msg: &mut BlockMessage) -> Result<()> {
        CallbackBridge::eval(self, msg)
    }
}

impl Handler for ForeignHandler {
    unsafe fn eval(&mut self, msg: &mut BlockMessage) -> Result<()> {
        ForeignHandler::eval(self, msg)
    }
}

/// One block as seen from the scheduler: its port widths, its message
/// record and its handler.
pub struct BlockHost<H> {
    name: String,
    input_signature: IoSignature,
    output_signature: IoSignature,
    slot: MessageSlot,
    handler: H,
}

impl<H: Handler> BlockHost<H> {
    pub fn new(
        name: impl Into<String>,
        input_signature: IoSignature,
        output_signature: IoSignature,
        handler: H,
    ) -> Self {
        Self {
            name: name.into(),
            input_signature,
            output_signature,
            slot: MessageSlot::new(),
            handler,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn input_signature(&self) -> &IoSignature {
        &self.input_signature
    }

    pub fn output_signature(&self) -> &IoSignature {
        &self.output_signature
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// Run WORK over whole-item byte buffers, one per port.
    /// Returns the block's produced count.
    pub fn work(&mut self, inputs: &[&[u8]], outputs: &mut [&mut [u8]]) -> Result<c_int> {
        let mut input_ports = Vec::with_capacity(inputs.len());
        for (port, buf) in inputs.iter().enumerate() {
            let nitems = item_count("input", &self.input_signature, port, buf.len())?;
            input_ports.push((buf.as_ptr() as *const c_void, nitems));
        }
        let mut output_ports = Vec::with_capacity(outputs.len());
        for (port, buf) in outputs.iter_mut().enumerate() {
            let nitems = item_count("output", &self.output_signature, port, buf.len())?;
            output_ports.push((buf.as_mut_ptr() as *mut c_void, nitems));
        }

        self.slot.load_work(&input_ports, &output_ports);
        // Safety: every address points into a live caller buffer of `nitems` items.
        unsafe { self.handler.eval(self.slot.message_mut())? };
        Ok(self.slot.message().work_return_value)
    }

    /// Run FORECAST and return the per-input requirements
    pub fn forecast(&mut self, noutput_items: c_int) -> Result<Vec<c_int>> {
        self.slot.load_forecast(noutput_items, self.input_signature.max_streams);
        unsafe { self.handler.eval(self.slot.message_mut())? };
        Ok(self.slot.ninput_items_required().to_vec())
    }

    pub fn start(&mut self) -> Result<bool> {
        self.slot.load_start();
        unsafe { self.handler.eval(self.slot.message_mut())? };
        Ok(self.slot.message().start_return_value)
    }

    pub fn stop(&mut self) -> Result<bool> {
        self.slot.load_stop();
        unsafe { self.handler.eval(self.slot.message_mut())? };
        Ok(self.slot.message().stop_return_value)
    }
}

impl BlockHost<CallbackBridge> {
    /// Host an in-process bridge, taking widths from its descriptor
    pub fn for_bridge(bridge: CallbackBridge) -> Self {
        let descriptor = bridge.gateway().descriptor();
        let name = descriptor.name().to_string();
        let input_signature = descriptor.input_signature();
        let output_signature = descriptor.output_signature();
        Self::new(name, input_signature, output_signature, bridge)
    }
}

impl BlockHost<ForeignHandler> {
    /// Register a block library from its exported entry points
    ///
    /// # Safety
    ///
    /// The three functions must come from the same block library and follow
    /// the `blockgate_abi` contract.
    pub unsafe fn from_manifest(
        manifest_fn: BlockManifestFn,
        create_fn: BlockCreateFn,
        vtable_fn: BlockGetVTableFn,
        history: c_int,
    ) -> Result<Self> {
        let manifest = manifest_fn();
        if manifest.abi_version != ABI_VERSION {
            return Err(GatewayError::Foreign {
                status: GatewayStatus::Configuration,
                message: format!(
                    "ABI version mismatch: block has {}, expected {}",
                    manifest.abi_version, ABI_VERSION
                ),
            });
        }

        let name = if manifest.name.is_null() {
            String::from("<unnamed>")
        } else {
            CStr::from_ptr(manifest.name).to_string_lossy().into_owned()
        };
        let input_signature = io_signature(&manifest.input_signature)?;
        let output_signature = io_signature(&manifest.output_signature)?;

        let vtable = vtable_fn();
        if vtable.is_null() {
            return Err(GatewayError::NullHandle);
        }
        let handler = ForeignHandler::new(create_fn(history), &*vtable)?;

        log::info!(
            "Registered block library '{}' (in {:?}, out {:?}, rate {})",
            name,
            input_signature.item_sizes,
            output_signature.item_sizes,
            manifest.relative_rate
        );
        Ok(Self::new(name, input_signature, output_signature, handler))
    }
}

fn item_count(side: &str, signature: &IoSignature, port: usize, len: usize) -> Result<c_int> {
    let size = signature.item_size(port).ok_or_else(|| {
        GatewayError::InvalidMessage(format!(
            "{side} port {port} not declared ({} ports)",
            signature.max_streams
        ))
    })?;
    if size == 0 || len % size != 0 {
        return Err(GatewayError::InvalidBuffer(format!(
            "{side} port {port}: {len} bytes is not a whole number of {size}-byte items"
        )));
    }
    c_int::try_from(len / size).map_err(|_| {
        GatewayError::InvalidBuffer(format!("{side} port {port}: too many items"))
    })
}

unsafe fn io_signature(raw: &IoSignatureAbi) -> Result<IoSignature> {
    let item_sizes = if raw.len == 0 {
        Vec::new()
    } else if raw.item_sizes.is_null() {
        return Err(GatewayError::NullHandle);
    } else {
        std::slice::from_raw_parts(raw.item_sizes, raw.len).to_vec()
    };
    let count = |n: c_int| {
        usize::try_from(n).map_err(|_| {
            GatewayError::InvalidMessage(format!("negative stream count {n} in manifest"))
        })
    };
    Ok(IoSignature {
        min_streams: count(raw.min_streams)?,
        max_streams: count(raw.max_streams)?,
        item_sizes,
    })
}
