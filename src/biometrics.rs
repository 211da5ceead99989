//! MediaVault - Biometric Authentication
//!
//! Contract for the platform biometric capability. The core consumes only
//! the outcome; prompt UI, hardware access and enrollment screens live on
//! the platform side.

use async_trait::async_trait;

/// Whether biometric unlock can be offered right now
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BiometricAvailability {
    /// Hardware present and at least one biometric enrolled
    Available,
    /// Device has no biometric hardware
    NoHardware,
    /// Hardware present but nothing enrolled
    NotEnrolled,
    /// Hardware present but currently unusable
    TemporarilyUnavailable(String),
}

/// Outcome of a biometric prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BiometricOutcome {
    Success,
    Cancelled,
    Error(String),
}

/// Prompt configuration passed through to the platform dialog
#[derive(Debug, Clone)]
pub struct PromptConfig {
    pub title: String,
    pub subtitle: Option<String>,
    pub negative_label: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            title: "Unlock vault".into(),
            subtitle: None,
            negative_label: "Use password".into(),
        }
    }
}

/// Platform biometric capability
#[async_trait]
pub trait BiometricAuthenticator: Send + Sync {
    fn check_availability(&self) -> BiometricAvailability;

    /// Show the platform prompt and resolve to a single outcome
    async fn authenticate(&self, prompt: &PromptConfig) -> BiometricOutcome;
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Scripted authenticator resolving to a fixed outcome
    pub struct ScriptedBiometric {
        pub availability: BiometricAvailability,
        pub outcome: BiometricOutcome,
    }

    impl ScriptedBiometric {
        pub fn approving() -> Self {
            Self {
                availability: BiometricAvailability::Available,
                outcome: BiometricOutcome::Success,
            }
        }

        pub fn cancelling() -> Self {
            Self {
                availability: BiometricAvailability::Available,
                outcome: BiometricOutcome::Cancelled,
            }
        }
    }

    #[async_trait]
    impl BiometricAuthenticator for ScriptedBiometric {
        fn check_availability(&self) -> BiometricAvailability {
            self.availability.clone()
        }

        async fn authenticate(&self, _prompt: &PromptConfig) -> BiometricOutcome {
            self.outcome.clone()
        }
    }
}
