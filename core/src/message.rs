use std::os::raw::{c_int, c_void};

use blockgate_abi::{BlockMessage, GatewayAction};

/// Native-side owner of a block's [`BlockMessage`].
///
/// Holds the pointer and count arrays the message points into, so the record
/// stays valid while the slot is alive. Each `load_*` call fills the fields of
/// exactly one action.
#[derive(Debug, Default)]
pub struct MessageSlot {
    message: BlockMessage,
    input_items: Vec<*const c_void>,
    ninput_items: Vec<c_int>,
    output_items: Vec<*mut c_void>,
    noutput_items: Vec<c_int>,
    ninput_items_required: Vec<c_int>,
}

// The arrays only hold addresses; they are dereferenced by the gateway during
// a dispatch on whichever thread owns the slot.
unsafe impl Send for MessageSlot {}

impl MessageSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message(&self) -> &BlockMessage {
        &self.message
    }

    pub fn message_mut(&mut self) -> &mut BlockMessage {
        &mut self.message
    }

    /// Prepare a WORK call: one `(address, nitems)` pair per port
    pub fn load_work(
        &mut self,
        inputs: &[(*const c_void, c_int)],
        outputs: &[(*mut c_void, c_int)],
    ) {
        self.input_items.clear();
        self.ninput_items.clear();
        for &(addr, nitems) in inputs {
            self.input_items.push(addr);
            self.ninput_items.push(nitems);
        }
        self.output_items.clear();
        self.noutput_items.clear();
        for &(addr, nitems) in outputs {
            self.output_items.push(addr);
            self.noutput_items.push(nitems);
        }

        let msg = &mut self.message;
        msg.action = GatewayAction::Work as u32;
        msg.work_input_items = self.input_items.as_ptr();
        msg.work_ninput_items = self.ninput_items.as_ptr();
        msg.work_ninputs = self.input_items.len();
        msg.work_output_items = self.output_items.as_ptr();
        msg.work_noutput_items = self.noutput_items.as_ptr();
        msg.work_noutputs = self.output_items.len();
        msg.work_return_value = 0;
    }

    /// Prepare a FORECAST call with `ninputs` zeroed requirement slots
    pub fn load_forecast(&mut self, noutput_items: c_int, ninputs: usize) {
        self.ninput_items_required.clear();
        self.ninput_items_required.resize(ninputs, 0);

        let msg = &mut self.message;
        msg.action = GatewayAction::Forecast as u32;
        msg.forecast_noutput_items = noutput_items;
        msg.forecast_ninput_items_required = self.ninput_items_required.as_mut_ptr();
        msg.forecast_ninputs = ninputs;
    }

    pub fn load_start(&mut self) {
        self.message.action = GatewayAction::Start as u32;
        self.message.start_return_value = false;
    }

    pub fn load_stop(&mut self) {
        self.message.action = GatewayAction::Stop as u32;
        self.message.stop_return_value = false;
    }

    /// Requirement slots as left by the last FORECAST
    pub fn ninput_items_required(&self) -> &[c_int] {
        &self.ninput_items_required
    }
}
