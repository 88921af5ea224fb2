use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::ops::Deref;
#[cfg(feature = "utoipa")]
use utoipa::ToSchema;

/// [`SecretString`] with serde support.
///
/// Used for registry passwords received in request bodies: the value stays
/// wrapped (and redacted in `Debug` output) until a caller explicitly calls
/// [`ExposeSecret::expose_secret`].
#[derive(Clone, Debug)]
#[cfg_attr(feature = "utoipa", derive(ToSchema), schema(value_type = String, example = "hunter2"))]
pub struct SerializableSecretString(SecretString);

impl SerializableSecretString {
    /// Returns `true` if the wrapped secret is the empty string.
    pub fn is_empty(&self) -> bool {
        self.0.expose_secret().is_empty()
    }
}

impl Deref for SerializableSecretString {
    type Target = SecretString;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<String> for SerializableSecretString {
    fn from(value: String) -> Self {
        Self(value.into())
    }
}

impl From<&str> for SerializableSecretString {
    fn from(value: &str) -> Self {
        Self(value.into())
    }
}

impl From<SerializableSecretString> for SecretString {
    fn from(value: SerializableSecretString) -> Self {
        value.0
    }
}

impl Serialize for SerializableSecretString {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.0.expose_secret())
    }
}

impl<'de> Deserialize<'de> for SerializableSecretString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let string = String::deserialize(deserializer)?;
        Ok(Self(string.into()))
    }
}
