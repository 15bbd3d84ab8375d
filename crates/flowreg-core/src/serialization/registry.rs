//! Versioned serializer trait and registry.

use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, error};

use super::header::{read_header, write_header};
use crate::defaults::HEADER_MAGIC_LEN;
use crate::error::{Error, Result};

/// Encoder/decoder for exactly one data model version of `T`.
pub trait VersionedSerializer<T>: Send + Sync {
    /// The data model version this serializer reads and writes.
    fn data_model_version(&self) -> u32;

    /// Encode `value` into the body bytes of this version (no header).
    fn encode(&self, value: &T) -> Result<Vec<u8>>;

    /// Decode body bytes written under this version.
    fn decode(&self, bytes: &[u8]) -> Result<T>;
}

/// Maps stamped data model versions to serializers.
///
/// Writers always use the current version; readers dispatch on the version
/// stamped in the payload header. Registered serializers are never replaced
/// and the current version never moves backwards.
pub struct SerializerRegistry<T> {
    magic: [u8; HEADER_MAGIC_LEN],
    current_version: Option<u32>,
    serializers: BTreeMap<u32, Box<dyn VersionedSerializer<T>>>,
}

impl<T> SerializerRegistry<T> {
    /// Create an empty registry for payloads prefixed with `magic`.
    pub fn new(magic: &[u8; HEADER_MAGIC_LEN]) -> Self {
        Self {
            magic: *magic,
            current_version: None,
            serializers: BTreeMap::new(),
        }
    }

    /// Register a serializer under its data model version.
    pub fn register(&mut self, serializer: Box<dyn VersionedSerializer<T>>) -> Result<()> {
        let version = serializer.data_model_version();
        if version == 0 {
            return Err(Error::InvalidInput(
                "data model versions start at 1".to_string(),
            ));
        }
        if self.serializers.contains_key(&version) {
            return Err(Error::AlreadyExists(format!(
                "serializer for data model version {}",
                version
            )));
        }
        self.serializers.insert(version, serializer);
        Ok(())
    }

    /// Declare which registered version new payloads are written with.
    pub fn set_current_version(&mut self, version: u32) -> Result<()> {
        if !self.serializers.contains_key(&version) {
            return Err(Error::UnsupportedDataModelVersion {
                version,
                supported: self.supported_versions(),
            });
        }
        if let Some(current) = self.current_version {
            if version < current {
                return Err(Error::InvalidInput(format!(
                    "current data model version cannot move back from {} to {}",
                    current, version
                )));
            }
        }
        self.current_version = Some(version);
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, serializer: Box<dyn VersionedSerializer<T>>) -> Result<Self> {
        self.register(serializer)?;
        Ok(self)
    }

    /// Builder-style [`set_current_version`](Self::set_current_version).
    pub fn with_current_version(mut self, version: u32) -> Result<Self> {
        self.set_current_version(version)?;
        Ok(self)
    }

    /// The version new payloads are written with, if declared.
    pub fn current_version(&self) -> Option<u32> {
        self.current_version
    }

    /// Registered versions in ascending order.
    pub fn supported_versions(&self) -> Vec<u32> {
        self.serializers.keys().copied().collect()
    }

    /// Encode `value` with the current serializer and stamp its version.
    pub fn serialize(&self, value: &T) -> Result<Vec<u8>> {
        let version = self.current_version.ok_or_else(|| {
            Error::Internal("no current data model version declared".to_string())
        })?;
        let serializer = self.serializer_for(version)?;
        let body = serializer.encode(value)?;

        debug!(
            subsystem = "core",
            component = "serializer",
            op = "serialize",
            data_model_version = version,
            payload_len = body.len(),
            "Serialized payload"
        );
        Ok(write_header(&self.magic, version, &body))
    }

    /// Decode a payload with the serializer matching its stamped version.
    pub fn deserialize(&self, bytes: &[u8]) -> Result<T> {
        let (version, body) = read_header(&self.magic, bytes)?;
        let serializer = self.serializer_for(version).inspect_err(|_| {
            error!(
                subsystem = "core",
                component = "serializer",
                op = "deserialize",
                data_model_version = version,
                "Payload stamped with unsupported data model version"
            );
        })?;

        debug!(
            subsystem = "core",
            component = "serializer",
            op = "deserialize",
            data_model_version = version,
            payload_len = body.len(),
            "Dispatching payload"
        );
        serializer.decode(body)
    }

    /// Read only the stamped data model version of a payload.
    pub fn read_data_model_version(&self, bytes: &[u8]) -> Result<u32> {
        read_header(&self.magic, bytes).map(|(version, _)| version)
    }

    /// Serializer registered for `version`.
    pub fn serializer_for(&self, version: u32) -> Result<&dyn VersionedSerializer<T>> {
        self.serializers
            .get(&version)
            .map(|s| s.as_ref())
            .ok_or_else(|| Error::UnsupportedDataModelVersion {
                version,
                supported: self.supported_versions(),
            })
    }
}

impl<T> fmt::Debug for SerializerRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerializerRegistry")
            .field("magic", &String::from_utf8_lossy(&self.magic))
            .field("current_version", &self.current_version)
            .field("supported_versions", &self.supported_versions())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Encodes a string verbatim, optionally uppercased, under a fixed version.
    struct TextSerializer {
        version: u32,
        upper: bool,
    }

    impl VersionedSerializer<String> for TextSerializer {
        fn data_model_version(&self) -> u32 {
            self.version
        }

        fn encode(&self, value: &String) -> Result<Vec<u8>> {
            if value.is_empty() {
                return Err(Error::Serialization("empty value".into()));
            }
            let text = if self.upper {
                value.to_uppercase()
            } else {
                value.clone()
            };
            Ok(text.into_bytes())
        }

        fn decode(&self, bytes: &[u8]) -> Result<String> {
            String::from_utf8(bytes.to_vec()).map_err(|e| Error::Serialization(e.to_string()))
        }
    }

    fn text(version: u32, upper: bool) -> Box<dyn VersionedSerializer<String>> {
        Box::new(TextSerializer { version, upper })
    }

    #[test]
    fn test_serialize_without_current_version_fails() {
        let registry = SerializerRegistry::new(b"Texts").with(text(1, false)).unwrap();
        let err = registry.serialize(&"x".to_string()).unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }

    #[test]
    fn test_serialize_stamps_current_version() {
        let registry = SerializerRegistry::new(b"Texts")
            .with(text(1, false))
            .unwrap()
            .with(text(2, true))
            .unwrap()
            .with_current_version(2)
            .unwrap();

        let bytes = registry.serialize(&"abc".to_string()).unwrap();
        assert_eq!(registry.read_data_model_version(&bytes).unwrap(), 2);
        assert_eq!(registry.deserialize(&bytes).unwrap(), "ABC");
    }

    #[test]
    fn test_duplicate_version_is_rejected() {
        let mut registry = SerializerRegistry::new(b"Texts");
        registry.register(text(1, false)).unwrap();
        let err = registry.register(text(1, true)).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
    }

    #[test]
    fn test_version_zero_is_rejected() {
        let mut registry = SerializerRegistry::new(b"Texts");
        assert!(registry.register(text(0, false)).is_err());
    }

    #[test]
    fn test_current_version_must_be_registered() {
        let mut registry = SerializerRegistry::<String>::new(b"Texts");
        let err = registry.set_current_version(3).unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedDataModelVersion { version: 3, .. }
        ));
    }

    #[test]
    fn test_current_version_cannot_move_backwards() {
        let mut registry = SerializerRegistry::new(b"Texts")
            .with(text(1, false))
            .unwrap()
            .with(text(2, false))
            .unwrap()
            .with_current_version(2)
            .unwrap();
        assert!(registry.set_current_version(1).is_err());
        assert_eq!(registry.current_version(), Some(2));
    }

    #[test]
    fn test_unregistered_stamp_is_unsupported_not_parse_error() {
        let registry = SerializerRegistry::new(b"Texts")
            .with(text(1, false))
            .unwrap()
            .with_current_version(1)
            .unwrap();

        let future_payload = write_header(b"Texts", 9, b"valid utf8 body");
        let err = registry.deserialize(&future_payload).unwrap_err();
        assert_eq!(
            err,
            Error::UnsupportedDataModelVersion {
                version: 9,
                supported: vec![1]
            }
        );
    }

    #[test]
    fn test_encode_failure_is_serialization_error() {
        let registry = SerializerRegistry::new(b"Texts")
            .with(text(1, false))
            .unwrap()
            .with_current_version(1)
            .unwrap();
        let err = registry.serialize(&String::new()).unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn test_older_payload_still_decodes_after_upgrade() {
        let mut registry = SerializerRegistry::new(b"Texts")
            .with(text(1, false))
            .unwrap()
            .with_current_version(1)
            .unwrap();
        let old = registry.serialize(&"legacy".to_string()).unwrap();

        registry.register(text(2, true)).unwrap();
        registry.set_current_version(2).unwrap();

        assert_eq!(registry.deserialize(&old).unwrap(), "legacy");
        let new = registry.serialize(&"fresh".to_string()).unwrap();
        assert_eq!(registry.read_data_model_version(&new).unwrap(), 2);
    }

    #[test]
    fn test_debug_lists_versions() {
        let registry = SerializerRegistry::new(b"Texts")
            .with(text(1, false))
            .unwrap()
            .with_current_version(1)
            .unwrap();
        let dbg = format!("{:?}", registry);
        assert!(dbg.contains("Texts"));
        assert!(dbg.contains("[1]"));
    }
}
