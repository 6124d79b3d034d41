use anyhow::Context;
use blockgate_core::NativeState;
use blockgate_signals::{BlockDescriptor, BlockKind, ConfigurationError};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// A block declared in a `[block]` TOML section
#[derive(Debug, Clone, PartialEq)]
pub struct BlockConfig {
    pub name: String,
    pub in_sig: Option<Vec<String>>,
    pub out_sig: Option<Vec<String>>,
    pub has_msg_input: bool,
    pub num_msg_outputs: usize,
    pub history: usize,
    pub kind: BlockKind,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct BlockToml {
    name: String,
    #[serde(default)]
    in_sig: Option<Vec<String>>,
    #[serde(default)]
    out_sig: Option<Vec<String>>,
    #[serde(default)]
    has_msg_input: bool,
    #[serde(default)]
    num_msg_outputs: usize,
    #[serde(default = "default_history")]
    history: usize,
    #[serde(default)]
    kind: BlockKind,
}

fn default_history() -> usize {
    1
}

#[derive(Debug, Clone, Deserialize)]
struct RootConfigToml {
    #[serde(default)]
    block: Option<BlockToml>,
}

impl BlockConfig {
    /// Parse and validate a block declaration
    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        let root: RootConfigToml =
            toml::from_str(text).map_err(|e| anyhow::anyhow!("Failed to parse block config: {e}"))?;
        let BlockToml {
            name,
            in_sig,
            out_sig,
            has_msg_input,
            num_msg_outputs,
            history,
            kind,
        } = root
            .block
            .ok_or_else(|| {
                anyhow::anyhow!("Missing [block] section (needs name, optional in_sig/out_sig)")
            })?;

        let config = Self {
            name,
            in_sig,
            out_sig,
            has_msg_input,
            num_msg_outputs,
            history,
            kind,
        };
        config
            .descriptor()
            .with_context(|| format!("Invalid declaration for block '{}'", config.name))?;
        config
            .native_state()
            .with_context(|| format!("Invalid history for block '{}'", config.name))?;
        Ok(config)
    }

    /// Build the static descriptor for this block
    pub fn descriptor(&self) -> Result<BlockDescriptor, ConfigurationError> {
        BlockDescriptor::from_tags(
            self.name.clone(),
            self.in_sig.as_deref(),
            self.out_sig.as_deref(),
        )?
        .with_msg_input(self.has_msg_input)
        .with_msg_outputs(self.num_msg_outputs)
        .with_kind(self.kind)
    }

    /// Fresh in-process native controls with the declared history
    pub fn native_state(&self) -> Result<NativeState, ConfigurationError> {
        NativeState::new(self.history)
    }
}

pub fn load_block_config(path: &Path) -> anyhow::Result<BlockConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Could not read block config {}", path.display()))?;
    BlockConfig::from_toml_str(&text).with_context(|| format!("In {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockgate_core::NativeControls;

    const PASSTHROUGH: &str = r#"
[block]
name = "passthrough"
in_sig = ["float32"]
out_sig = ["float32"]
"#;

    #[test]
    fn test_minimal_block() {
        let config = BlockConfig::from_toml_str(PASSTHROUGH).unwrap();
        assert_eq!(config.history, 1);
        assert_eq!(config.kind, BlockKind::Sync);

        let desc = config.descriptor().unwrap();
        assert_eq!(desc.name(), "passthrough");
        assert_eq!(desc.input_signature().item_sizes, vec![4]);
        assert_eq!(desc.output_signature().item_sizes, vec![4]);
        assert!(!desc.has_msg_input());
    }

    #[test]
    fn test_full_block() {
        let text = r#"
[block]
name = "fir_decim"
in_sig = ["complex64", "int16[4]"]
out_sig = ["complex64"]
has_msg_input = true
num_msg_outputs = 2
history = 8
kind = { type = "decim", decim = 4 }
"#;
        let config = BlockConfig::from_toml_str(text).unwrap();
        let desc = config.descriptor().unwrap();
        assert_eq!(desc.input_signature().item_sizes, vec![8, 8]);
        assert_eq!(desc.kind(), BlockKind::Decim { decim: 4 });
        assert!(desc.has_msg_input());
        assert_eq!(desc.num_msg_outputs(), 2);
        assert_eq!(config.native_state().unwrap().history(), 8);
    }

    #[test]
    fn test_message_only_block() {
        let text = r#"
[block]
name = "msg_debug"
has_msg_input = true
"#;
        let desc = BlockConfig::from_toml_str(text).unwrap().descriptor().unwrap();
        assert!(desc.inputs().is_empty());
        assert!(desc.outputs().is_empty());
    }

    #[test]
    fn test_missing_block_section() {
        let err = BlockConfig::from_toml_str("[other]\nname = \"x\"\n").unwrap_err();
        assert!(err.to_string().contains("Missing [block]"));
    }

    #[test]
    fn test_unknown_element_tag() {
        let text = r#"
[block]
name = "bad"
in_sig = ["float24"]
"#;
        let err = BlockConfig::from_toml_str(text).unwrap_err();
        assert!(err.to_string().contains("Invalid declaration for block 'bad'"));
        assert!(matches!(
            err.downcast_ref::<ConfigurationError>(),
            Some(ConfigurationError::UnknownElementType(_))
        ));
    }

    #[test]
    fn test_zero_history_rejected() {
        let text = "[block]\nname = \"h\"\nhistory = 0\n";
        let err = BlockConfig::from_toml_str(text).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigurationError>(),
            Some(ConfigurationError::InvalidHistory(0))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let file = format!("blockgate-config-{}.toml", std::process::id());
        let path = std::env::temp_dir().join(file);
        fs::write(&path, PASSTHROUGH).unwrap();
        let config = load_block_config(&path).unwrap();
        fs::remove_file(&path).unwrap();
        assert_eq!(config.name, "passthrough");

        assert!(load_block_config(&path).is_err());
    }
}
