//! Client configuration.

use ctrlwire_engine::EngineConfig;
use ctrlwire_throttle::ThrottleConfig;
use serde::{Deserialize, Serialize};

use crate::CtrlwireError;

/// Everything a [`ControlClient`](crate::ControlClient) can be tuned with.
///
/// Loads from JSON; every field is optional:
///
/// ```json
/// {
///   "engine": { "request_timeout_ms": 3000, "signature": [186, 218] },
///   "throttle": { "interval_us": 50000 }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub engine: EngineConfig,
    /// Spacing between two writes of the same property.
    pub throttle: ThrottleConfig,
}

impl ClientConfig {
    pub fn from_json_str(json: &str) -> Result<Self, CtrlwireError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Clamps values the client cannot run with. See
    /// [`EngineConfig::validated`] and [`ThrottleConfig::validated`].
    pub fn validated(self) -> Self {
        Self {
            engine: self.engine.validated(),
            throttle: self.throttle.validated(),
        }
    }
}
