use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::Result;

/// Pluggable structured-value serialization for the façade's
/// `*_with_encode` / `*_with_decode` operations.
///
/// The engine itself never looks inside values.
pub trait ValueCodec: Send + Sync {
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<String>;

    fn decode<T: DeserializeOwned>(
        &self,
        value: &str,
    ) -> Result<T>;
}

/// JSON values via `serde_json`
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl ValueCodec for JsonCodec {
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<String> {
        Ok(serde_json::to_string(value)?)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        value: &str,
    ) -> Result<T> {
        Ok(serde_json::from_str(value)?)
    }
}
