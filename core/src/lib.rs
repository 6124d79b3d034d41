pub use blockgate_abi;
pub use blockgate_signals;

pub mod error;
pub use error::{GatewayError, Result};

pub mod buffer;
pub use buffer::{item_bytes, item_bytes_mut, Complex, InputView, Item, OutputView};

pub mod native;
pub use native::{BlockMsg, NativeControls, NativeState};

pub mod message;
pub use message::MessageSlot;

pub mod block;
pub use block::{default_forecast, Block, BlockContext, WORK_DONE};

pub mod gateway;
pub use gateway::Gateway;

pub mod bridge;
pub use bridge::{CallbackBridge, BRIDGE_VTABLE};

pub mod host;
pub use host::{BlockHost, BlockLibrary, ForeignHandler, Handler};

pub use blockgate_signals::{
    BlockDescriptor, BlockKind, ConfigurationError, ElementType, IoSignature, ItemFormat,
    PortSignature,
};

/// Wrap a block in a gateway and bridge, ready for a host or the C ABI
pub fn create_bridge(
    descriptor: BlockDescriptor,
    block: Box<dyn Block>,
    controls: Box<dyn NativeControls>,
) -> CallbackBridge {
    CallbackBridge::new(Gateway::new(descriptor, block, controls))
}
