use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod signature;
pub use signature::{IoSignature, PortSignature};

// ============================================================================
// ERRORS
// ============================================================================

/// Malformed block declaration. Raised at construction, never at dispatch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("unrecognized element type '{0}'")]
    UnknownElementType(String),
    #[error("invalid vector length in element type '{0}'")]
    InvalidVectorLength(String),
    #[error("block name must not be empty")]
    EmptyName,
    #[error("invalid {kind} factor {factor}: must be at least 1")]
    InvalidRate { kind: &'static str, factor: usize },
    #[error("history must be at least 1, got {0}")]
    InvalidHistory(i64),
}

// ============================================================================
// ELEMENT TYPES
// ============================================================================

/// Byte layout of one scalar in a stream item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ItemFormat {
    Float32,
    Float64,
    /// Interleaved f32 pair (fc32)
    Complex64,
    /// Interleaved f64 pair
    Complex128,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    /// Interleaved i8 pair (sc8)
    ComplexInt8,
    /// Interleaved i16 pair (sc16)
    ComplexInt16,
    /// Interleaved i32 pair (sc32)
    ComplexInt32,
    /// Opaque byte
    Byte,
}

impl ItemFormat {
    /// Size in bytes of one scalar of this format
    pub fn size(&self) -> usize {
        match self {
            ItemFormat::Int8 | ItemFormat::UInt8 | ItemFormat::Byte => 1,
            ItemFormat::Int16 | ItemFormat::UInt16 | ItemFormat::ComplexInt8 => 2,
            ItemFormat::Float32
            | ItemFormat::Int32
            | ItemFormat::UInt32
            | ItemFormat::ComplexInt16 => 4,
            ItemFormat::Float64
            | ItemFormat::Int64
            | ItemFormat::Complex64
            | ItemFormat::ComplexInt32 => 8,
            ItemFormat::Complex128 => 16,
        }
    }

    /// Canonical tag, as accepted by [`ElementType::parse`]
    pub fn name(&self) -> &'static str {
        match self {
            ItemFormat::Float32 => "float32",
            ItemFormat::Float64 => "float64",
            ItemFormat::Complex64 => "complex64",
            ItemFormat::Complex128 => "complex128",
            ItemFormat::Int8 => "int8",
            ItemFormat::Int16 => "int16",
            ItemFormat::Int32 => "int32",
            ItemFormat::Int64 => "int64",
            ItemFormat::UInt8 => "uint8",
            ItemFormat::UInt16 => "uint16",
            ItemFormat::UInt32 => "uint32",
            ItemFormat::ComplexInt8 => "sc8",
            ItemFormat::ComplexInt16 => "sc16",
            ItemFormat::ComplexInt32 => "sc32",
            ItemFormat::Byte => "byte",
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        // numpy-style type strings may carry a byte-order prefix
        let tag = tag
            .strip_prefix('<')
            .or_else(|| tag.strip_prefix('='))
            .or_else(|| tag.strip_prefix('|'))
            .unwrap_or(tag);

        let format = match tag {
            "float32" | "f4" | "f32" | "single" => ItemFormat::Float32,
            "float64" | "f8" | "f64" | "double" => ItemFormat::Float64,
            "complex64" | "c8" | "fc32" => ItemFormat::Complex64,
            "complex128" | "c16" | "fc64" => ItemFormat::Complex128,
            "int8" | "i1" | "s8" => ItemFormat::Int8,
            "int16" | "i2" | "s16" | "short" => ItemFormat::Int16,
            "int32" | "i4" | "s32" => ItemFormat::Int32,
            "int64" | "i8" | "s64" => ItemFormat::Int64,
            "uint8" | "u1" => ItemFormat::UInt8,
            "uint16" | "u2" => ItemFormat::UInt16,
            "uint32" | "u4" => ItemFormat::UInt32,
            "sc8" => ItemFormat::ComplexInt8,
            "sc16" => ItemFormat::ComplexInt16,
            "sc32" => ItemFormat::ComplexInt32,
            "byte" | "V1" | "b1" | "bool" => ItemFormat::Byte,
            _ => return None,
        };
        Some(format)
    }
}

/// Element type of one stream port: a scalar format, optionally a fixed-length vector of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ElementType {
    format: ItemFormat,
    vlen: usize,
}

impl ElementType {
    pub const fn scalar(format: ItemFormat) -> Self {
        Self { format, vlen: 1 }
    }

    pub fn vector(format: ItemFormat, vlen: usize) -> Result<Self, ConfigurationError> {
        if vlen == 0 {
            return Err(ConfigurationError::InvalidVectorLength(format!(
                "{}[0]",
                format.name()
            )));
        }
        Ok(Self { format, vlen })
    }

    /// Parse a type tag such as `float32`, `<f4`, `fc32`, `sc16` or `int16[4]`.
    pub fn parse(tag: &str) -> Result<Self, ConfigurationError> {
        let trimmed = tag.trim();
        let (base, vlen) = match trimmed.strip_suffix(']') {
            Some(head) => {
                let (base, count) = head
                    .split_once('[')
                    .ok_or_else(|| ConfigurationError::UnknownElementType(tag.to_string()))?;
                let vlen: usize = count
                    .trim()
                    .parse()
                    .map_err(|_| ConfigurationError::InvalidVectorLength(tag.to_string()))?;
                if vlen == 0 {
                    return Err(ConfigurationError::InvalidVectorLength(tag.to_string()));
                }
                (base.trim(), vlen)
            }
            None => (trimmed, 1),
        };

        let format = ItemFormat::from_tag(base)
            .ok_or_else(|| ConfigurationError::UnknownElementType(tag.to_string()))?;
        Ok(Self { format, vlen })
    }

    pub fn format(&self) -> ItemFormat {
        self.format
    }

    /// Scalars per item (1 for scalar ports)
    pub fn vlen(&self) -> usize {
        self.vlen
    }

    /// Size in bytes of one item
    pub fn size(&self) -> usize {
        self.format.size() * self.vlen
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.vlen == 1 {
            write!(f, "{}", self.format.name())
        } else {
            write!(f, "{}[{}]", self.format.name(), self.vlen)
        }
    }
}

impl TryFrom<String> for ElementType {
    type Error = ConfigurationError;

    fn try_from(tag: String) -> Result<Self, Self::Error> {
        Self::parse(&tag)
    }
}

impl From<ElementType> for String {
    fn from(element: ElementType) -> Self {
        element.to_string()
    }
}

impl JsonSchema for ElementType {
    fn schema_name() -> String {
        "ElementType".to_string()
    }

    fn json_schema(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        String::json_schema(gen)
    }
}

// ============================================================================
// BLOCK KIND
// ============================================================================

/// Convenience variants. Each only configures the native rate controls,
/// except `Basic`, which routes WORK to `general_work`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BlockKind {
    /// One output item per input item
    #[default]
    Sync,
    /// Arbitrary consumption; the block calls `consume` itself
    Basic,
    /// `decim` input items per output item
    Decim { decim: usize },
    /// `interp` output items per input item
    Interp { interp: usize },
}

impl BlockKind {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        match *self {
            BlockKind::Decim { decim: 0 } => Err(ConfigurationError::InvalidRate {
                kind: "decimation",
                factor: 0,
            }),
            BlockKind::Interp { interp: 0 } => Err(ConfigurationError::InvalidRate {
                kind: "interpolation",
                factor: 0,
            }),
            _ => Ok(()),
        }
    }

    /// Output items per input item
    pub fn relative_rate(&self) -> f64 {
        match *self {
            BlockKind::Sync | BlockKind::Basic => 1.0,
            BlockKind::Decim { decim } => 1.0 / decim as f64,
            BlockKind::Interp { interp } => interp as f64,
        }
    }

    /// Whether the native side consumes inputs automatically after WORK
    pub fn auto_consume(&self) -> bool {
        !matches!(self, BlockKind::Basic)
    }
}

// ============================================================================
// BLOCK DESCRIPTOR
// ============================================================================

/// Static description of a block. Set once at construction.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct BlockDescriptor {
    name: String,
    inputs: PortSignature,
    outputs: PortSignature,
    has_msg_input: bool,
    num_msg_outputs: usize,
    kind: BlockKind,
}

impl BlockDescriptor {
    pub fn new(
        name: impl Into<String>,
        inputs: PortSignature,
        outputs: PortSignature,
    ) -> Result<Self, ConfigurationError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ConfigurationError::EmptyName);
        }
        Ok(Self {
            name,
            inputs,
            outputs,
            has_msg_input: false,
            num_msg_outputs: 0,
            kind: BlockKind::Sync,
        })
    }

    /// Build from optional tag lists, e.g. `in_sig = None` for a source block.
    pub fn from_tags<S: AsRef<str>>(
        name: impl Into<String>,
        in_sig: Option<&[S]>,
        out_sig: Option<&[S]>,
    ) -> Result<Self, ConfigurationError> {
        Self::new(
            name,
            PortSignature::from_tags(in_sig)?,
            PortSignature::from_tags(out_sig)?,
        )
    }

    pub fn with_msg_input(mut self, has_msg_input: bool) -> Self {
        self.has_msg_input = has_msg_input;
        self
    }

    pub fn with_msg_outputs(mut self, num_msg_outputs: usize) -> Self {
        self.num_msg_outputs = num_msg_outputs;
        self
    }

    pub fn with_kind(mut self, kind: BlockKind) -> Result<Self, ConfigurationError> {
        kind.validate()?;
        self.kind = kind;
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inputs(&self) -> &PortSignature {
        &self.inputs
    }

    pub fn outputs(&self) -> &PortSignature {
        &self.outputs
    }

    pub fn has_msg_input(&self) -> bool {
        self.has_msg_input
    }

    pub fn num_msg_outputs(&self) -> usize {
        self.num_msg_outputs
    }

    pub fn kind(&self) -> BlockKind {
        self.kind
    }

    pub fn input_signature(&self) -> IoSignature {
        self.inputs.io_signature()
    }

    pub fn output_signature(&self) -> IoSignature {
        self.outputs.io_signature()
    }
}

/// JSON Schema describing [`BlockDescriptor`], for tools that emit block declarations
pub fn descriptor_schema() -> serde_json::Value {
    let schema = schemars::schema_for!(BlockDescriptor);
    serde_json::to_value(schema).unwrap_or(serde_json::Value::Null)
}
