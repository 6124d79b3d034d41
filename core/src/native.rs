use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use blockgate_signals::ConfigurationError;
use serde::{Deserialize, Serialize};

/// A message travelling on a block's message ports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockMsg {
    pub key: String,
    pub value: serde_json::Value,
}

impl BlockMsg {
    pub fn new(key: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Rate, history and message-port controls that live on the native block.
///
/// The gateway only reads and sets these values; the scheduler decides what
/// they mean for buffer sizing and flow control.
pub trait NativeControls: Send {
    /// Look-back window in items, at least 1
    fn history(&self) -> usize;

    fn set_relative_rate(&mut self, rate: f64);

    fn relative_rate(&self) -> f64;

    fn set_auto_consume(&mut self, enabled: bool);

    fn auto_consume(&self) -> bool;

    /// Report `nitems` consumed on input `port` (blocks without auto-consume)
    fn consume(&mut self, port: usize, nitems: usize);

    /// Take the next inbound message, if any. Never blocks.
    fn pop_msg_queue(&mut self) -> Option<BlockMsg>;

    /// Send a message out of message output `port`
    fn post_msg(&mut self, port: usize, msg: BlockMsg);
}

#[derive(Debug)]
struct NativeInner {
    history: usize,
    relative_rate: f64,
    auto_consume: bool,
    consumed: Vec<u64>,
    inbox: VecDeque<BlockMsg>,
    outbox: Vec<(usize, BlockMsg)>,
}

/// In-process implementation of [`NativeControls`].
///
/// Cloning gives another handle to the same state, so the side driving the
/// block can queue messages and inspect rates after handing one clone to the
/// gateway.
#[derive(Debug, Clone)]
pub struct NativeState {
    inner: Arc<Mutex<NativeInner>>,
}

impl NativeState {
    pub fn new(history: usize) -> Result<Self, ConfigurationError> {
        if history == 0 {
            return Err(ConfigurationError::InvalidHistory(0));
        }
        Ok(Self::with_history(history))
    }

    fn with_history(history: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(NativeInner {
                history,
                relative_rate: 1.0,
                auto_consume: true,
                consumed: Vec::new(),
                inbox: VecDeque::new(),
                outbox: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, NativeInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver an inbound message (native side)
    pub fn push_msg(&self, msg: BlockMsg) {
        self.lock().inbox.push_back(msg);
    }

    pub fn pending_msgs(&self) -> usize {
        self.lock().inbox.len()
    }

    /// Items reported consumed on input `port` so far
    pub fn consumed(&self, port: usize) -> u64 {
        self.lock().consumed.get(port).copied().unwrap_or(0)
    }

    /// Drain messages the block posted
    pub fn take_posted(&self) -> Vec<(usize, BlockMsg)> {
        std::mem::take(&mut self.lock().outbox)
    }
}

impl Default for NativeState {
    fn default() -> Self {
        Self::with_history(1)
    }
}

impl NativeControls for NativeState {
    fn history(&self) -> usize {
        self.lock().history
    }

    fn set_relative_rate(&mut self, rate: f64) {
        self.lock().relative_rate = rate;
    }

    fn relative_rate(&self) -> f64 {
        self.lock().relative_rate
    }

    fn set_auto_consume(&mut self, enabled: bool) {
        self.lock().auto_consume = enabled;
    }

    fn auto_consume(&self) -> bool {
        self.lock().auto_consume
    }

    fn consume(&mut self, port: usize, nitems: usize) {
        let mut inner = self.lock();
        if inner.consumed.len() <= port {
            inner.consumed.resize(port + 1, 0);
        }
        inner.consumed[port] += nitems as u64;
    }

    fn pop_msg_queue(&mut self) -> Option<BlockMsg> {
        self.lock().inbox.pop_front()
    }

    fn post_msg(&mut self, port: usize, msg: BlockMsg) {
        self.lock().outbox.push((port, msg));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_history_must_be_positive() {
        assert_eq!(
            NativeState::new(0).unwrap_err(),
            ConfigurationError::InvalidHistory(0)
        );
        assert_eq!(NativeState::new(3).unwrap().history(), 3);
    }

    #[test]
    fn test_clones_share_state() {
        let native = NativeState::new(1).unwrap();
        let mut gateway_side = native.clone();

        native.push_msg(BlockMsg::new("freq", json!(100.0)));
        assert_eq!(gateway_side.pop_msg_queue().unwrap().key, "freq");
        assert!(gateway_side.pop_msg_queue().is_none());

        gateway_side.set_relative_rate(0.5);
        assert_eq!(native.relative_rate(), 0.5);

        gateway_side.consume(2, 10);
        gateway_side.consume(2, 5);
        assert_eq!(native.consumed(2), 15);
        assert_eq!(native.consumed(0), 0);
    }

    #[test]
    fn test_posted_messages_drain() {
        let mut native = NativeState::default();
        native.post_msg(1, BlockMsg::new("done", json!(true)));
        let posted = native.take_posted();
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].0, 1);
        assert!(native.take_posted().is_empty());
    }
}
