//! Service identifiers

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

/// Logical name of a sensor or actuator
///
/// Always non-empty. The well-known services of the installation are
/// available as constants; anything else must go through [`ServiceId::new`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServiceId(Cow<'static, str>);

impl ServiceId {
    pub const FACE_RECOGNITION: ServiceId = ServiceId(Cow::Borrowed("face-recognition"));
    pub const ULTRASONIC: ServiceId = ServiceId(Cow::Borrowed("ultrasonic-sensor"));
    pub const TOUCH: ServiceId = ServiceId(Cow::Borrowed("touch-sensor"));
    pub const DISPLAY: ServiceId = ServiceId(Cow::Borrowed("image-display"));
    pub const VIBRATION_MOTOR: ServiceId = ServiceId(Cow::Borrowed("vibration-motor"));
    pub const LED: ServiceId = ServiceId(Cow::Borrowed("led"));

    /// Create an identifier, rejecting empty or whitespace-only names
    pub fn new(name: impl Into<String>) -> Result<Self, ServiceError> {
        let name = name.into();
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(ServiceError::InvalidMessage(
                "service identifier must be non-empty".to_string(),
            ));
        }
        Ok(Self(Cow::Owned(trimmed.to_string())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ServiceId {
    type Error = ServiceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ServiceId> for String {
    fn from(id: ServiceId) -> Self {
        id.0.into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_trims_and_validates() {
        let id = ServiceId::new("  led ").unwrap();
        assert_eq!(id, ServiceId::LED);

        assert!(ServiceId::new("").is_err());
        assert!(ServiceId::new("   ").is_err());
    }

    #[test]
    fn test_deserialize_rejects_empty() {
        let ok: ServiceId = serde_json::from_str("\"image-display\"").unwrap();
        assert_eq!(ok, ServiceId::DISPLAY);

        let err = serde_json::from_str::<ServiceId>("\"\"");
        assert!(err.is_err());
    }
}
