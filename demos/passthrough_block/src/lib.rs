use std::os::raw::c_int;

use blockgate_plugin_helper::blockgate_core::{BlockContext, InputView, OutputView};
use blockgate_plugin_helper::{export_block, Block, BlockDescriptor, ConfigurationError};

/// Copies its float32 input to its output unchanged
#[derive(Default)]
pub struct PassThrough {
    items_seen: u64,
}

impl Block for PassThrough {
    fn work(
        &mut self,
        _cx: &mut BlockContext<'_>,
        input_items: &[InputView<'_>],
        output_items: &mut [OutputView<'_>],
    ) -> anyhow::Result<c_int> {
        let copied = output_items[0].copy_from(&input_items[0])?;
        self.items_seen += copied as u64;
        Ok(copied as c_int)
    }

    fn stop(&mut self, cx: &mut BlockContext<'_>) -> anyhow::Result<bool> {
        log::debug!("{} passed {} items", cx.name(), self.items_seen);
        Ok(true)
    }
}

pub fn descriptor() -> Result<BlockDescriptor, ConfigurationError> {
    BlockDescriptor::from_tags("passthrough", Some(&["float32"]), Some(&["float32"]))
}

export_block!(PassThrough, descriptor);
