//! Model serialization and deserialization via bincode.

use std::path::Path;

use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, info, instrument};

use crate::{Cobra, CobraError};

/// Current binary format version.
pub const FORMAT_VERSION: u32 = 1;

/// Versioned envelope. The payload is decoded only after the version check.
#[derive(serde::Serialize, serde::Deserialize)]
struct ModelEnvelope {
    format_version: u32,
    payload: Vec<u8>,
}

impl<C> Cobra<C>
where
    C: Serialize + DeserializeOwned,
{
    /// Encode the whole ensemble: config, split, machines and cached tables.
    ///
    /// # Errors
    ///
    /// Returns [`CobraError::SerializeModel`] when bincode encoding fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CobraError> {
        let payload = bincode::serialize(self).map_err(|e| CobraError::SerializeModel { source: e })?;
        let envelope = ModelEnvelope {
            format_version: FORMAT_VERSION,
            payload,
        };
        bincode::serialize(&envelope).map_err(|e| CobraError::SerializeModel { source: e })
    }

    /// Decode an ensemble produced by [`Cobra::to_bytes`].
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`CobraError::DeserializeModel`] | bincode decoding failed |
    /// | [`CobraError::IncompatibleModelVersion`] | format version mismatch |
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CobraError> {
        let envelope: ModelEnvelope =
            bincode::deserialize(bytes).map_err(|e| CobraError::DeserializeModel { source: e })?;
        if envelope.format_version != FORMAT_VERSION {
            return Err(CobraError::IncompatibleModelVersion {
                expected: FORMAT_VERSION,
                found: envelope.format_version,
            });
        }
        bincode::deserialize(&envelope.payload).map_err(|e| CobraError::DeserializeModel { source: e })
    }

    /// Save the ensemble to a binary file.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`CobraError::SerializeModel`] | bincode encoding failed |
    /// | [`CobraError::WriteModel`] | file write failed |
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), CobraError> {
        let path = path.as_ref();
        let bytes = self.to_bytes()?;
        std::fs::write(path, &bytes).map_err(|e| CobraError::WriteModel {
            path: path.to_path_buf(),
            source: e,
        })?;
        info!(
            size_bytes = bytes.len(),
            n_machines = self.machines.len(),
            "model saved"
        );
        Ok(())
    }

    /// Load an ensemble from a binary file.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`CobraError::ReadModel`] | file read failed |
    /// | [`CobraError::DeserializeModel`] | bincode decoding failed |
    /// | [`CobraError::IncompatibleModelVersion`] | format version mismatch |
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CobraError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| CobraError::ReadModel {
            path: path.to_path_buf(),
            source: e,
        })?;
        let cobra = Self::from_bytes(&bytes)?;
        debug!(
            n_machines = cobra.machines.len(),
            has_agreement = cobra.agreement.is_some(),
            "model loaded"
        );
        Ok(cobra)
    }
}
