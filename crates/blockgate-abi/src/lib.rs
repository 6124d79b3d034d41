use std::os::raw::{c_char, c_int, c_void};

/// Current ABI version - increment when making breaking changes
pub const ABI_VERSION: u32 = 1;

/// Action tags carried by [`BlockMessage::action`]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayAction {
    Work = 0,
    Forecast = 1,
    Start = 2,
    Stop = 3,
}

impl GatewayAction {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Work),
            1 => Some(Self::Forecast),
            2 => Some(Self::Start),
            3 => Some(Self::Stop),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Work => "WORK",
            Self::Forecast => "FORECAST",
            Self::Start => "START",
            Self::Stop => "STOP",
        }
    }
}

/// Status returned to the native caller by [`GatewayHandlerVTable::eval`]
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayStatus {
    Ok = 0,
    InvalidBuffer = 1,
    NotImplemented = 2,
    UserCallback = 3,
    Panic = 4,
    InvalidMessage = 5,
    Configuration = 6,
    NullHandle = 7,
}

impl GatewayStatus {
    pub fn from_raw(raw: c_int) -> Option<Self> {
        match raw {
            0 => Some(Self::Ok),
            1 => Some(Self::InvalidBuffer),
            2 => Some(Self::NotImplemented),
            3 => Some(Self::UserCallback),
            4 => Some(Self::Panic),
            5 => Some(Self::InvalidMessage),
            6 => Some(Self::Configuration),
            7 => Some(Self::NullHandle),
            _ => None,
        }
    }
}

/// The per-block dispatch record.
///
/// Owned by the native side and reused for every call. Only the fields of the
/// action named by `action` are meaningful during a call; the pointers are
/// borrowed for that call only.
#[repr(C)]
#[derive(Debug)]
pub struct BlockMessage {
    pub action: u32,

    // WORK
    pub work_input_items: *const *const c_void,
    pub work_ninput_items: *const c_int,
    pub work_ninputs: usize,
    pub work_output_items: *const *mut c_void,
    pub work_noutput_items: *const c_int,
    pub work_noutputs: usize,
    pub work_return_value: c_int,

    // FORECAST
    pub forecast_noutput_items: c_int,
    pub forecast_ninput_items_required: *mut c_int,
    pub forecast_ninputs: usize,

    // START / STOP
    pub start_return_value: bool,
    pub stop_return_value: bool,
}

impl BlockMessage {
    pub fn new() -> Self {
        Self {
            action: GatewayAction::Stop as u32,
            work_input_items: std::ptr::null(),
            work_ninput_items: std::ptr::null(),
            work_ninputs: 0,
            work_output_items: std::ptr::null(),
            work_noutput_items: std::ptr::null(),
            work_noutputs: 0,
            work_return_value: 0,
            forecast_noutput_items: 0,
            forecast_ninput_items_required: std::ptr::null_mut(),
            forecast_ninputs: 0,
            start_return_value: false,
            stop_return_value: false,
        }
    }
}

impl Default for BlockMessage {
    fn default() -> Self {
        Self::new()
    }
}

/// Port-width descriptor handed to the native signature registry
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct IoSignatureAbi {
    pub min_streams: c_int,
    pub max_streams: c_int,
    /// One byte width per port, `len` entries (null when `len == 0`)
    pub item_sizes: *const usize,
    pub len: usize,
}

/// Block manifest - what the native side registers before the first call
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct BlockManifestAbi {
    pub abi_version: u32,
    pub name: *const c_char,
    pub input_signature: IoSignatureAbi,
    pub output_signature: IoSignatureAbi,
    pub has_msg_input: bool,
    pub num_msg_outputs: usize,
    pub relative_rate: f64,
}

/// VTable the native scheduler calls through.
/// This is the stable C ABI interface a block library must provide
#[repr(C)]
pub struct GatewayHandlerVTable {
    /// Run one action described by the message. Returns a [`GatewayStatus`] code.
    pub eval: unsafe extern "C" fn(*mut c_void, *mut BlockMessage) -> c_int,

    /// Message of the last failed eval, or null if none failed yet.
    /// Valid until the next eval on the same instance.
    pub last_error: unsafe extern "C" fn(*const c_void) -> *const c_char,

    /// Destroy the handler instance
    pub destroy: unsafe extern "C" fn(*mut c_void),
}

/// Block library entry points - these must be exported by the block .so/.dll

/// Get the block manifest
pub type BlockManifestFn = unsafe extern "C" fn() -> BlockManifestAbi;

/// Create a new handler instance for a block with the given history
pub type BlockCreateFn = unsafe extern "C" fn(c_int) -> *mut c_void;

/// Get the vtable for the handler instance
pub type BlockGetVTableFn = unsafe extern "C" fn() -> *const GatewayHandlerVTable;

/// Symbol names that block libraries must export
pub const BLOCK_MANIFEST_SYMBOL: &[u8] = b"blockgate_block_manifest\0";
pub const BLOCK_CREATE_SYMBOL: &[u8] = b"blockgate_block_create\0";
pub const BLOCK_VTABLE_SYMBOL: &[u8] = b"blockgate_block_get_vtable\0";
