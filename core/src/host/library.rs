use std::os::raw::c_int;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use blockgate_abi::{
    BlockCreateFn, BlockGetVTableFn, BlockManifestFn, BLOCK_CREATE_SYMBOL, BLOCK_MANIFEST_SYMBOL,
    BLOCK_VTABLE_SYMBOL,
};
use libloading::Library;

use super::{BlockHost, ForeignHandler};

/// A block library loaded from a .so/.dll/.dylib
pub struct BlockLibrary {
    path: PathBuf,
    library: Arc<Library>,
    manifest_fn: BlockManifestFn,
    create_fn: BlockCreateFn,
    vtable_fn: BlockGetVTableFn,
}

impl BlockLibrary {
    /// Open a block library and resolve its entry points
    ///
    /// # Safety
    ///
    /// This loads arbitrary code from a shared library. Only load trusted blocks.
    pub unsafe fn load(path: &Path) -> Result<Self> {
        log::info!("Loading block library from: {}", path.display());

        let library = Library::new(path)
            .with_context(|| format!("Failed to load library: {}", path.display()))?;

        let manifest_fn = *library
            .get::<BlockManifestFn>(BLOCK_MANIFEST_SYMBOL)
            .context("Block library missing blockgate_block_manifest symbol")?;
        let create_fn = *library
            .get::<BlockCreateFn>(BLOCK_CREATE_SYMBOL)
            .context("Block library missing blockgate_block_create symbol")?;
        let vtable_fn = *library
            .get::<BlockGetVTableFn>(BLOCK_VTABLE_SYMBOL)
            .context("Block library missing blockgate_block_get_vtable symbol")?;

        Ok(Self {
            path: path.to_path_buf(),
            library: Arc::new(library),
            manifest_fn,
            create_fn,
            vtable_fn,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create one block instance. The library stays loaded while the host lives.
    pub fn instantiate(&self, history: c_int) -> Result<BlockHost<ForeignHandler>> {
        let mut host = unsafe {
            BlockHost::from_manifest(self.manifest_fn, self.create_fn, self.vtable_fn, history)
        }
        .with_context(|| format!("Failed to create block from {}", self.path.display()))?;
        host.handler_mut().keep_library(Arc::clone(&self.library));
        Ok(host)
    }
}

/// Whether `path` looks like a shared library on this platform
pub fn is_block_library(path: &Path) -> bool {
    let Some(ext) = path.extension() else {
        return false;
    };
    ext == std::env::consts::DLL_EXTENSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_library_fails() {
        let path = std::env::temp_dir().join("blockgate-no-such-block.so");
        let err = unsafe { BlockLibrary::load(&path) }.err().unwrap();
        assert!(err.to_string().contains("Failed to load library"));
    }

    #[test]
    fn test_library_extension() {
        let name = format!("libblock.{}", std::env::consts::DLL_EXTENSION);
        assert!(is_block_library(Path::new(&name)));
        assert!(!is_block_library(Path::new("block.toml")));
    }
}
