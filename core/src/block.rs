use std::os::raw::c_int;

use blockgate_signals::BlockDescriptor;

use crate::buffer::{InputView, OutputView};
use crate::error::GatewayError;
use crate::native::{BlockMsg, NativeControls};

/// Returned from `work` to tell the scheduler this block is finished
pub const WORK_DONE: c_int = -1;

/// What a lifecycle method can see of its block while it runs
pub struct BlockContext<'a> {
    descriptor: &'a BlockDescriptor,
    controls: &'a mut dyn NativeControls,
}

impl<'a> BlockContext<'a> {
    pub fn new(descriptor: &'a BlockDescriptor, controls: &'a mut dyn NativeControls) -> Self {
        Self {
            descriptor,
            controls,
        }
    }

    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    pub fn descriptor(&self) -> &BlockDescriptor {
        self.descriptor
    }

    pub fn history(&self) -> usize {
        self.controls.history()
    }

    pub fn relative_rate(&self) -> f64 {
        self.controls.relative_rate()
    }

    pub fn set_relative_rate(&mut self, rate: f64) {
        self.controls.set_relative_rate(rate);
    }

    pub fn set_auto_consume(&mut self, enabled: bool) {
        self.controls.set_auto_consume(enabled);
    }

    /// Mark `nitems` of input `port` as consumed
    pub fn consume(&mut self, port: usize, nitems: usize) {
        self.controls.consume(port, nitems);
    }

    /// Mark `nitems` consumed on every input port
    pub fn consume_each(&mut self, nitems: usize) {
        for port in 0..self.descriptor.inputs().len() {
            self.controls.consume(port, nitems);
        }
    }

    /// Next pending inbound message. Always `None` without a message input.
    pub fn pop_msg_queue(&mut self) -> Option<BlockMsg> {
        if !self.descriptor.has_msg_input() {
            return None;
        }
        self.controls.pop_msg_queue()
    }

    pub fn post_msg(&mut self, port: usize, msg: BlockMsg) -> Result<(), GatewayError> {
        if port >= self.descriptor.num_msg_outputs() {
            return Err(GatewayError::InvalidMessage(format!(
                "block '{}' has no message output {}",
                self.descriptor.name(),
                port
            )));
        }
        self.controls.post_msg(port, msg);
        Ok(())
    }
}

/// Required input items per port for `noutput_items` outputs: `noutput_items + history - 1`,
/// written into every slot.
pub fn default_forecast(history: usize, noutput_items: c_int, ninput_items_required: &mut [c_int]) {
    let lookback = c_int::try_from(history.saturating_sub(1)).unwrap_or(c_int::MAX);
    let required = noutput_items.saturating_add(lookback);
    for slot in ninput_items_required.iter_mut() {
        *slot = required;
    }
}

/// Lifecycle of a block driven through the gateway.
///
/// `forecast`, `start` and `stop` have working defaults. `work` (or
/// `general_work` for basic blocks) must be provided; the defaults fail with
/// [`GatewayError::NotImplemented`].
pub trait Block: Send {
    /// Process items. Returns the number of output items produced.
    fn work(
        &mut self,
        _cx: &mut BlockContext<'_>,
        _input_items: &[InputView<'_>],
        _output_items: &mut [OutputView<'_>],
    ) -> anyhow::Result<c_int> {
        Err(GatewayError::NotImplemented("work").into())
    }

    /// Process items with explicit consumption (`BlockKind::Basic`)
    fn general_work(
        &mut self,
        _cx: &mut BlockContext<'_>,
        _input_items: &[InputView<'_>],
        _output_items: &mut [OutputView<'_>],
    ) -> anyhow::Result<c_int> {
        Err(GatewayError::NotImplemented("general_work").into())
    }

    fn forecast(
        &mut self,
        cx: &mut BlockContext<'_>,
        noutput_items: c_int,
        ninput_items_required: &mut [c_int],
    ) -> anyhow::Result<()> {
        default_forecast(cx.history(), noutput_items, ninput_items_required);
        Ok(())
    }

    fn start(&mut self, _cx: &mut BlockContext<'_>) -> anyhow::Result<bool> {
        Ok(true)
    }

    fn stop(&mut self, _cx: &mut BlockContext<'_>) -> anyhow::Result<bool> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::NativeState;
    use serde_json::json;

    struct Idle;
    impl Block for Idle {}

    fn descriptor() -> BlockDescriptor {
        BlockDescriptor::from_tags("idle", Some(&["f4", "f4"]), Some(&["f4"]))
            .unwrap()
            .with_msg_input(true)
            .with_msg_outputs(1)
    }

    #[test]
    fn test_default_forecast_writes_back() {
        let mut required = [0; 3];
        default_forecast(3, 10, &mut required);
        assert_eq!(required, [12, 12, 12]);
    }

    #[test]
    fn test_default_forecast_history_one() {
        let mut required = [-5; 2];
        default_forecast(1, 7, &mut required);
        assert_eq!(required, [7, 7]);
    }

    #[test]
    fn test_default_start_stop_succeed() {
        let desc = descriptor();
        let mut native = NativeState::default();
        let mut cx = BlockContext::new(&desc, &mut native);
        let mut block = Idle;
        assert!(block.start(&mut cx).unwrap());
        assert!(block.stop(&mut cx).unwrap());
    }

    #[test]
    fn test_default_work_not_implemented() {
        let desc = descriptor();
        let mut native = NativeState::default();
        let mut cx = BlockContext::new(&desc, &mut native);
        let mut block = Idle;

        let err = block.work(&mut cx, &[], &mut []).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GatewayError>(),
            Some(GatewayError::NotImplemented("work"))
        ));
        let err = block.general_work(&mut cx, &[], &mut []).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GatewayError>(),
            Some(GatewayError::NotImplemented("general_work"))
        ));
    }

    #[test]
    fn test_context_message_ports() {
        let desc = descriptor();
        let native = NativeState::default();
        native.push_msg(BlockMsg::new("gain", json!(2.0)));
        let mut controls = native.clone();
        let mut cx = BlockContext::new(&desc, &mut controls);

        assert_eq!(cx.pop_msg_queue().unwrap().value, json!(2.0));
        assert!(cx.pop_msg_queue().is_none());
        assert!(cx.post_msg(0, BlockMsg::new("ack", json!(null))).is_ok());
        assert!(cx.post_msg(1, BlockMsg::new("ack", json!(null))).is_err());
        cx.consume_each(4);

        assert_eq!(native.take_posted().len(), 1);
        assert_eq!(native.consumed(0), 4);
        assert_eq!(native.consumed(1), 4);
    }

    #[test]
    fn test_pop_without_message_input_is_none() {
        let desc = BlockDescriptor::from_tags::<&str>("src", None, Some(&["f4"])).unwrap();
        let native = NativeState::default();
        native.push_msg(BlockMsg::new("ignored", json!(1)));
        let mut controls = native.clone();
        let mut cx = BlockContext::new(&desc, &mut controls);
        assert!(cx.pop_msg_queue().is_none());
        assert_eq!(native.pending_msgs(), 1);
    }
}
