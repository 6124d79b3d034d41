use std::os::raw::{c_int, c_void};

use blockgate_abi::{BlockMessage, GatewayAction};
use blockgate_signals::{BlockDescriptor, BlockKind, PortSignature};

use crate::block::{Block, BlockContext};
use crate::buffer::{InputView, OutputView};
use crate::error::{GatewayError, Result};
use crate::native::NativeControls;

/// Routes each native action to the block's lifecycle methods.
///
/// Owns the block, its descriptor and its native controls. The message
/// itself stays with the native side and is only borrowed per call.
pub struct Gateway {
    descriptor: BlockDescriptor,
    block: Box<dyn Block>,
    controls: Box<dyn NativeControls>,
}

impl Gateway {
    pub fn new(
        descriptor: BlockDescriptor,
        block: Box<dyn Block>,
        mut controls: Box<dyn NativeControls>,
    ) -> Self {
        let kind = descriptor.kind();
        controls.set_relative_rate(kind.relative_rate());
        controls.set_auto_consume(kind.auto_consume());

        log::info!(
            "Gateway: registered block '{}' (in {:?}, out {:?}, msg in: {}, msg out: {}, {:?})",
            descriptor.name(),
            descriptor.input_signature().item_sizes,
            descriptor.output_signature().item_sizes,
            descriptor.has_msg_input(),
            descriptor.num_msg_outputs(),
            kind
        );

        Self {
            descriptor,
            block,
            controls,
        }
    }

    pub fn descriptor(&self) -> &BlockDescriptor {
        &self.descriptor
    }

    pub fn controls(&self) -> &dyn NativeControls {
        self.controls.as_ref()
    }

    pub fn block(&self) -> &dyn Block {
        self.block.as_ref()
    }

    pub fn block_mut(&mut self) -> &mut dyn Block {
        self.block.as_mut()
    }

    /// Run the action named in `msg` and write its result back.
    ///
    /// Calls the lifecycle method exactly once. Errors from the block are
    /// returned as-is; nothing is written to the message on failure.
    ///
    /// # Safety
    ///
    /// Every pointer in the fields of the active action must be valid for the
    /// counts given, and the buffers must not be touched elsewhere until this
    /// returns.
    pub unsafe fn dispatch(&mut self, msg: &mut BlockMessage) -> Result<()> {
        let action = GatewayAction::from_raw(msg.action).ok_or_else(|| {
            GatewayError::InvalidMessage(format!("unknown action tag {}", msg.action))
        })?;
        log::debug!("Gateway: {} on '{}'", action.as_str(), self.descriptor.name());

        match action {
            GatewayAction::Work => {
                let produced = self.dispatch_work(msg)?;
                msg.work_return_value = produced;
            }
            GatewayAction::Forecast => self.dispatch_forecast(msg)?,
            GatewayAction::Start => {
                let mut cx = BlockContext::new(&self.descriptor, self.controls.as_mut());
                let started = self.block.start(&mut cx).map_err(GatewayError::from_callback)?;
                msg.start_return_value = started;
            }
            GatewayAction::Stop => {
                let mut cx = BlockContext::new(&self.descriptor, self.controls.as_mut());
                let stopped = self.block.stop(&mut cx).map_err(GatewayError::from_callback)?;
                msg.stop_return_value = stopped;
            }
        }
        Ok(())
    }

    unsafe fn dispatch_work(&mut self, msg: &BlockMessage) -> Result<c_int> {
        let inputs = input_views(
            self.descriptor.inputs(),
            msg.work_input_items,
            msg.work_ninput_items,
            msg.work_ninputs,
        )?;
        let mut outputs = output_views(
            self.descriptor.outputs(),
            msg.work_output_items,
            msg.work_noutput_items,
            msg.work_noutputs,
        )?;

        let mut cx = BlockContext::new(&self.descriptor, self.controls.as_mut());
        let result = match self.descriptor.kind() {
            BlockKind::Basic => self.block.general_work(&mut cx, &inputs, &mut outputs),
            BlockKind::Sync | BlockKind::Decim { .. } | BlockKind::Interp { .. } => {
                self.block.work(&mut cx, &inputs, &mut outputs)
            }
        };
        result.map_err(GatewayError::from_callback)
    }

    unsafe fn dispatch_forecast(&mut self, msg: &mut BlockMessage) -> Result<()> {
        let ninputs = self.descriptor.inputs().len();
        if msg.forecast_ninputs != ninputs {
            return Err(GatewayError::InvalidMessage(format!(
                "forecast carries {} input slots, block '{}' has {} inputs",
                msg.forecast_ninputs,
                self.descriptor.name(),
                ninputs
            )));
        }
        if msg.forecast_noutput_items < 0 {
            return Err(GatewayError::InvalidMessage(format!(
                "negative forecast output count {}",
                msg.forecast_noutput_items
            )));
        }

        let required: &mut [c_int] = if ninputs == 0 {
            &mut []
        } else if msg.forecast_ninput_items_required.is_null() {
            return Err(GatewayError::InvalidBuffer(
                "null forecast requirement array".to_string(),
            ));
        } else {
            std::slice::from_raw_parts_mut(msg.forecast_ninput_items_required, ninputs)
        };

        let mut cx = BlockContext::new(&self.descriptor, self.controls.as_mut());
        self.block
            .forecast(&mut cx, msg.forecast_noutput_items, required)
            .map_err(GatewayError::from_callback)
    }
}

fn check_port_count(side: &str, declared: usize, carried: usize) -> Result<()> {
    if declared != carried {
        return Err(GatewayError::InvalidMessage(format!(
            "work carries {carried} {side} buffers, block declares {declared}"
        )));
    }
    Ok(())
}

fn on_port(side: &'static str, port: usize) -> impl FnOnce(GatewayError) -> GatewayError {
    move |err| match err {
        GatewayError::InvalidBuffer(reason) => {
            GatewayError::InvalidBuffer(format!("{side} port {port}: {reason}"))
        }
        other => other,
    }
}

/// Build one read view per declared input port.
///
/// # Safety
///
/// `items` and `counts` must hold `n` entries describing valid buffers for `'v`.
unsafe fn input_views<'v>(
    signature: &PortSignature,
    items: *const *const c_void,
    counts: *const c_int,
    n: usize,
) -> Result<Vec<InputView<'v>>> {
    check_port_count("input", signature.len(), n)?;
    if n > 0 && (items.is_null() || counts.is_null()) {
        return Err(GatewayError::InvalidBuffer("null input pointer array".to_string()));
    }

    let mut views = Vec::with_capacity(n);
    for (port, element) in signature.iter().enumerate() {
        let view = InputView::from_raw(*items.add(port), *element, *counts.add(port))
            .map_err(on_port("input", port))?;
        views.push(view);
    }
    Ok(views)
}

/// Build one write view per declared output port.
///
/// # Safety
///
/// As [`input_views`], and the output buffers must not overlap each other or
/// any input buffer.
unsafe fn output_views<'v>(
    signature: &PortSignature,
    items: *const *mut c_void,
    counts: *const c_int,
    n: usize,
) -> Result<Vec<OutputView<'v>>> {
    check_port_count("output", signature.len(), n)?;
    if n > 0 && (items.is_null() || counts.is_null()) {
        return Err(GatewayError::InvalidBuffer("null output pointer array".to_string()));
    }

    let mut views = Vec::with_capacity(n);
    for (port, element) in signature.iter().enumerate() {
        let view = OutputView::from_raw(*items.add(port), *element, *counts.add(port))
            .map_err(on_port("output", port))?;
        views.push(view);
    }
    Ok(views)
}
