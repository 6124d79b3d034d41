pub use blockgate_core;
pub use blockgate_core::blockgate_abi;
// Re-export common types for convenience
pub use blockgate_core::blockgate_abi::{
    BlockManifestAbi, GatewayHandlerVTable, IoSignatureAbi, ABI_VERSION,
};
pub use blockgate_core::{Block, BlockDescriptor, ConfigurationError};

use std::ffi::CString;
use std::os::raw::{c_int, c_void};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::OnceLock;

use blockgate_core::{create_bridge, IoSignature, NativeState};

/// Macro to export the C-ABI entry points of a block library.
///
/// `$descriptor_fn` is a `fn() -> Result<BlockDescriptor, ConfigurationError>`
/// evaluated once, on first use.
#[macro_export]
macro_rules! export_block {
    ($block_type:ty, $descriptor_fn:path) => {
        static BLOCKGATE_MANIFEST: std::sync::OnceLock<Option<$crate::ManifestStorage>> =
            std::sync::OnceLock::new();

        fn _blockgate_storage() -> Option<&'static $crate::ManifestStorage> {
            $crate::manifest_storage(&BLOCKGATE_MANIFEST, $descriptor_fn)
        }

        // --- MANIFEST ---
        #[no_mangle]
        pub unsafe extern "C" fn blockgate_block_manifest() -> $crate::BlockManifestAbi {
            match _blockgate_storage() {
                Some(storage) => storage.manifest(),
                None => $crate::ManifestStorage::invalid_manifest(),
            }
        }

        // --- CREATE ---
        #[no_mangle]
        pub unsafe extern "C" fn blockgate_block_create(
            history: std::os::raw::c_int,
        ) -> *mut std::os::raw::c_void {
            match _blockgate_storage() {
                Some(storage) => $crate::create_instance::<$block_type>(storage, history),
                None => std::ptr::null_mut(),
            }
        }

        // --- VTABLE ---
        #[no_mangle]
        pub unsafe extern "C" fn blockgate_block_get_vtable(
        ) -> *const $crate::GatewayHandlerVTable {
            &$crate::blockgate_core::BRIDGE_VTABLE as *const _
        }
    };
}

/// Manifest data kept alive for the lifetime of the library
pub struct ManifestStorage {
    descriptor: BlockDescriptor,
    name: CString,
    input: IoSignature,
    output: IoSignature,
}

impl ManifestStorage {
    pub fn new(descriptor: BlockDescriptor) -> Result<Self, ConfigurationError> {
        let name = CString::new(descriptor.name()).map_err(|_| ConfigurationError::EmptyName)?;
        Ok(Self {
            input: descriptor.input_signature(),
            output: descriptor.output_signature(),
            name,
            descriptor,
        })
    }

    pub fn descriptor(&self) -> &BlockDescriptor {
        &self.descriptor
    }

    pub fn manifest(&self) -> BlockManifestAbi {
        BlockManifestAbi {
            abi_version: ABI_VERSION,
            name: self.name.as_ptr(),
            input_signature: io_signature_abi(&self.input),
            output_signature: io_signature_abi(&self.output),
            has_msg_input: self.descriptor.has_msg_input(),
            num_msg_outputs: self.descriptor.num_msg_outputs(),
            relative_rate: self.descriptor.kind().relative_rate(),
        }
    }

    /// Returned when the descriptor failed; hosts reject it on the version check
    pub fn invalid_manifest() -> BlockManifestAbi {
        let empty = IoSignatureAbi {
            min_streams: 0,
            max_streams: 0,
            item_sizes: std::ptr::null(),
            len: 0,
        };
        BlockManifestAbi {
            abi_version: 0,
            name: std::ptr::null(),
            input_signature: empty,
            output_signature: empty,
            has_msg_input: false,
            num_msg_outputs: 0,
            relative_rate: 1.0,
        }
    }
}

fn io_signature_abi(sig: &IoSignature) -> IoSignatureAbi {
    IoSignatureAbi {
        min_streams: c_int::try_from(sig.min_streams).unwrap_or(c_int::MAX),
        max_streams: c_int::try_from(sig.max_streams).unwrap_or(c_int::MAX),
        item_sizes: sig.item_sizes.as_ptr(),
        len: sig.item_sizes.len(),
    }
}

/// Evaluate the descriptor once. A failure is logged and cached as `None`.
pub fn manifest_storage(
    cell: &'static OnceLock<Option<ManifestStorage>>,
    descriptor_fn: fn() -> Result<BlockDescriptor, ConfigurationError>,
) -> Option<&'static ManifestStorage> {
    cell.get_or_init(|| match descriptor_fn().and_then(ManifestStorage::new) {
        Ok(storage) => Some(storage),
        Err(e) => {
            log::error!("Block library descriptor is invalid: {e}");
            None
        }
    })
    .as_ref()
}

fn native_state(history: c_int) -> Result<NativeState, ConfigurationError> {
    usize::try_from(history)
        .map_err(|_| ConfigurationError::InvalidHistory(history.into()))
        .and_then(NativeState::new)
}

/// Build a bridged instance of `B` for the vtable. Null on any failure.
pub fn create_instance<B: Block + Default + 'static>(
    storage: &ManifestStorage,
    history: c_int,
) -> *mut c_void {
    let native = match native_state(history) {
        Ok(native) => native,
        Err(e) => {
            log::error!(
                "Cannot create block '{}' with history {history}: {e}",
                storage.descriptor.name()
            );
            return std::ptr::null_mut();
        }
    };

    let descriptor = storage.descriptor.clone();
    match catch_unwind(AssertUnwindSafe(|| {
        create_bridge(descriptor, Box::new(B::default()), Box::new(native))
    })) {
        Ok(bridge) => bridge.into_raw(),
        Err(_) => {
            log::error!("Block '{}' panicked during construction", storage.descriptor.name());
            std::ptr::null_mut()
        }
    }
}
