//! Message envelope exchanged between services

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::id::ServiceId;
use super::stage::DisplayStage;
use crate::error::ServiceError;

/// Metadata key carrying an explicit display stage
pub const STAGE_KEY: &str = "stage";

/// Free-form metadata attached to a message
pub type Metadata = HashMap<String, Value>;

/// Restoration signal produced by the adaptive sensors
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrengthSignal {
    /// Seconds the restoration should last
    pub duration: f64,
    /// Escalation rate handed to the display as its level step
    pub strength: f64,
}

/// Vibration pulse addressed to the motor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pulse {
    /// Seconds the motor stays on
    pub duration: f64,
    /// PWM duty cycle in [0, 1]
    pub intensity: f64,
}

/// Proximity reading forwarded to the LED
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LedSignal {
    pub distance: f64,
    pub threshold: f64,
    pub duration: f64,
}

/// Message body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "kebab-case")]
pub enum Payload {
    Strength(StrengthSignal),
    Pulse(Pulse),
    Led(LedSignal),
    /// Opaque data, passed through untouched
    Data(Value),
}

impl Payload {
    /// Short name used in log fields
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Strength(_) => "strength",
            Payload::Pulse(_) => "pulse",
            Payload::Led(_) => "led",
            Payload::Data(_) => "data",
        }
    }

    /// Whether this payload counts as a delivery for adaptive tuning
    pub fn is_strength_signal(&self) -> bool {
        matches!(self, Payload::Strength(_))
    }

    fn check(&self) -> Result<(), ServiceError> {
        let fields: Vec<(&str, f64)> = match self {
            Payload::Strength(s) => vec![("duration", s.duration), ("strength", s.strength)],
            Payload::Pulse(p) => vec![("duration", p.duration), ("intensity", p.intensity)],
            Payload::Led(l) => vec![
                ("distance", l.distance),
                ("threshold", l.threshold),
                ("duration", l.duration),
            ],
            Payload::Data(_) => Vec::new(),
        };
        for (name, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(ServiceError::InvalidMessage(format!(
                    "{} payload field '{}' must be a finite non-negative number, got {}",
                    self.kind(),
                    name,
                    value
                )));
            }
        }
        if let Payload::Pulse(p) = self
            && p.intensity > 1.0
        {
            return Err(ServiceError::InvalidMessage(format!(
                "pulse intensity must be within [0, 1], got {}",
                p.intensity
            )));
        }
        Ok(())
    }
}

/// Immutable envelope handed from a producer to its router and on to a target
///
/// Ownership moves with every send; nothing mutates a message in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    origin: ServiceId,
    payload: Payload,
    timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<Metadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target: Option<ServiceId>,
}

impl Message {
    /// Create a message stamped with the current time
    pub fn new(origin: ServiceId, payload: Payload) -> Result<Self, ServiceError> {
        let message = Self {
            origin,
            payload,
            timestamp: Utc::now(),
            metadata: None,
            target: None,
        };
        message.validate()?;
        Ok(message)
    }

    /// Address the message to a specific service instead of the display
    pub fn with_target(mut self, target: ServiceId) -> Self {
        self.target = Some(target);
        self
    }

    /// Attach metadata
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Attach an explicit display stage as metadata
    pub fn with_stage(mut self, stage: DisplayStage) -> Self {
        self.metadata
            .get_or_insert_with(Metadata::new)
            .insert(STAGE_KEY.to_string(), Value::String(stage.as_str().to_string()));
        self
    }

    /// Re-check an envelope, e.g. one that arrived through deserialization
    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.origin.as_str().trim().is_empty() {
            return Err(ServiceError::InvalidMessage("message origin is empty".to_string()));
        }
        self.payload.check()?;
        if let Some(value) = self.metadata.as_ref().and_then(|m| m.get(STAGE_KEY)) {
            let name = value
                .as_str()
                .ok_or_else(|| ServiceError::InvalidMessage(format!("stage metadata must be a string, got {}", value)))?;
            name.parse::<DisplayStage>().map_err(ServiceError::InvalidMessage)?;
        }
        Ok(())
    }

    /// Build the forwarded copy delivered to `target`
    ///
    /// Origin, payload, metadata and timestamp carry over unchanged.
    pub fn forward_to(self, target: ServiceId) -> Self {
        Self {
            target: Some(target),
            ..self
        }
    }

    pub fn origin(&self) -> &ServiceId {
        &self.origin
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }

    pub fn target(&self) -> Option<&ServiceId> {
        self.target.as_ref()
    }

    /// Explicit display stage carried in metadata, if any
    pub fn stage(&self) -> Option<DisplayStage> {
        self.metadata
            .as_ref()?
            .get(STAGE_KEY)?
            .as_str()
            .and_then(|name| name.parse().ok())
    }
}
