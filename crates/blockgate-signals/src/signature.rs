use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{ConfigurationError, ElementType};

/// Ordered element types, one per stream port on one side of a block.
///
/// An empty signature is valid and means the side has no stream ports
/// (e.g. a source block's inputs, or a pure message-passing block).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct PortSignature(Vec<ElementType>);

impl PortSignature {
    pub fn new(ports: Vec<ElementType>) -> Self {
        Self(ports)
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Translate a possibly-absent tag list. `None` and `Some(&[])` both give zero ports.
    pub fn from_tags<S: AsRef<str>>(tags: Option<&[S]>) -> Result<Self, ConfigurationError> {
        let Some(tags) = tags else {
            return Ok(Self::empty());
        };
        tags.iter()
            .map(|tag| ElementType::parse(tag.as_ref()))
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, port: usize) -> Option<&ElementType> {
        self.0.get(port)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ElementType> {
        self.0.iter()
    }

    /// Native port-width descriptor for this side
    pub fn io_signature(&self) -> IoSignature {
        IoSignature {
            min_streams: self.0.len(),
            max_streams: self.0.len(),
            item_sizes: self.0.iter().map(ElementType::size).collect(),
        }
    }
}

impl<'a> IntoIterator for &'a PortSignature {
    type Item = &'a ElementType;
    type IntoIter = std::slice::Iter<'a, ElementType>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Port count and per-port byte widths, as registered with the native scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct IoSignature {
    pub min_streams: usize,
    pub max_streams: usize,
    pub item_sizes: Vec<usize>,
}

impl IoSignature {
    pub fn is_empty(&self) -> bool {
        self.max_streams == 0
    }

    /// Byte width of `port`. Ports past the last declared width reuse it.
    pub fn item_size(&self, port: usize) -> Option<usize> {
        if port >= self.max_streams {
            return None;
        }
        self.item_sizes
            .get(port)
            .or_else(|| self.item_sizes.last())
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_and_empty_give_zero_ports() {
        let absent = PortSignature::from_tags::<&str>(None).unwrap();
        let empty = PortSignature::from_tags::<&str>(Some(&[])).unwrap();
        for sig in [absent, empty] {
            let io = sig.io_signature();
            assert!(sig.is_empty());
            assert!(io.is_empty());
            assert_eq!(io.min_streams, 0);
            assert!(io.item_sizes.is_empty());
            assert_eq!(io.item_size(0), None);
        }
    }

    #[test]
    fn test_widths_follow_element_sizes() {
        let tags = ["float32", "complex64", "int16[3]", "u1"];
        let sig = PortSignature::from_tags(Some(&tags)).unwrap();
        let io = sig.io_signature();
        assert_eq!(io.min_streams, 4);
        assert_eq!(io.max_streams, 4);
        assert_eq!(io.item_sizes, vec![4, 8, 6, 1]);
        assert_eq!(io.item_size(2), Some(6));
        assert_eq!(io.item_size(4), None);
    }

    #[test]
    fn test_unknown_tag_fails_whole_signature() {
        let err = PortSignature::from_tags(Some(&["float32", "bogus"])).unwrap_err();
        assert_eq!(err, ConfigurationError::UnknownElementType("bogus".to_string()));
    }
}
