use serde::{Deserialize, Serialize};

/// Envelope for all WebSocket communication.
///
/// The `data` field uses `serde_json::value::RawValue` to defer
/// deserialization until the receiver knows which payload type to expect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub id: String,
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Box<serde_json::value::RawValue>>,
}

impl Envelope {
    /// Creates a new envelope with a fresh random id.
    pub fn new<T: Serialize>(
        event: impl Into<String>,
        data: Option<&T>,
    ) -> Result<Self, serde_json::Error> {
        Self::with_id(uuid::Uuid::new_v4().to_string(), event, data)
    }

    /// Creates a new envelope with the given id.
    pub fn with_id<T: Serialize>(
        id: impl Into<String>,
        event: impl Into<String>,
        data: Option<&T>,
    ) -> Result<Self, serde_json::Error> {
        let raw = match data {
            Some(d) => {
                let json = serde_json::to_string(d)?;
                Some(serde_json::value::RawValue::from_string(json)?)
            }
            None => None,
        };
        Ok(Self {
            id: id.into(),
            event: event.into(),
            data: raw,
        })
    }

    /// Deserializes the data into the given type.
    pub fn parse_data<T: for<'de> Deserialize<'de>>(&self) -> Result<Option<T>, serde_json::Error> {
        match &self.data {
            Some(raw) => Ok(Some(serde_json::from_str(raw.get())?)),
            None => Ok(None),
        }
    }

    /// Returns the data as a generic JSON value (`Null` when absent).
    pub fn data_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        Ok(self.parse_data::<serde_json::Value>()?.unwrap_or_default())
    }
}
