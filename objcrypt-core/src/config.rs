//! Pipeline configuration.

use serde::{Deserialize, Serialize};

use crate::consts::*;
use crate::error::Error;

/// Configures where the secondary metadata source, the instruction file, is looked up.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InstructionFileConfig {
    /// Never consult instruction files.
    pub disabled: bool,
}

/// Configures a [`Pipeline`][crate::pipeline::Pipeline].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PipelineConfig {
    /// Allow ranged gets and legacy (unauthenticated) algorithm suites.
    pub enable_legacy_unauthenticated_modes: bool,

    /// Release plaintext of authenticated objects before the tag has been checked.
    pub enable_delayed_authentication: bool,

    /// Largest object decrypted in buffered mode, defaults to [`DEFAULT_BUFFER_SIZE`].
    pub buffer_size: Option<u64>,

    /// Instruction file lookups.
    pub instruction_file: InstructionFileConfig,
}

impl PipelineConfig {
    /// Enable or disable legacy unauthenticated modes.
    pub fn with_legacy_unauthenticated_modes(mut self, enable: bool) -> Self {
        self.enable_legacy_unauthenticated_modes = enable;
        self
    }

    /// Enable or disable delayed authentication.
    pub fn with_delayed_authentication(mut self, enable: bool) -> Self {
        self.enable_delayed_authentication = enable;
        self
    }

    /// Set the buffered mode working buffer size.
    pub fn with_buffer_size(mut self, size: u64) -> Self {
        self.buffer_size = Some(size);
        self
    }

    /// Enable or disable instruction file lookups.
    pub fn with_instruction_file_disabled(mut self, disabled: bool) -> Self {
        self.instruction_file.disabled = disabled;
        self
    }

    /// The effective working buffer size.
    pub fn effective_buffer_size(&self) -> u64 {
        self.buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE)
    }

    /// Checks for conflicting or out of bounds settings.
    pub fn validate(&self) -> Result<(), Error> {
        if let Some(size) = self.buffer_size {
            if self.enable_delayed_authentication {
                return Err(Error::ConfigurationRejected(
                    "a buffer size cannot be set when delayed authentication is enabled".to_string(),
                ));
            }

            if !(MIN_BUFFER_SIZE..=MAX_BUFFER_SIZE).contains(&size) {
                return Err(Error::ConfigurationRejected(format!(
                    "invalid buffer size: {size}, must be between {MIN_BUFFER_SIZE} and {MAX_BUFFER_SIZE} bytes"
                )));
            }
        }

        Ok(())
    }
}
