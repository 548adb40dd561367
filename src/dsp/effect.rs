//! Effect trait definition
//!
//! Base trait for every processing node a graph owns.

use crate::engine::AudioBuffer;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// State common to all nodes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectParams {
    /// Unique identifier for this node instance
    pub id: String,
    /// Cleared once the owning graph tears the node down; a disconnected
    /// node passes audio through untouched
    pub connected: bool,
}

impl Default for EffectParams {
    fn default() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            connected: true,
        }
    }
}

/// Base trait for all processing nodes
///
/// Nodes process stereo blocks in place. A graph owns its nodes exclusively
/// and disconnects each of them on teardown.
pub trait Effect: Send {
    /// Process audio buffer in-place
    fn process(&mut self, buffer: &mut AudioBuffer);

    /// Prepare the node for processing
    ///
    /// Called when sample rate or block size changes.
    fn prepare(&mut self, sample_rate: u32, max_block_size: usize);

    /// Clear any internal history (filter state, delay lines, oscillators)
    fn reset(&mut self);

    /// Get the node type identifier
    fn effect_type(&self) -> &'static str;

    /// Get human-readable display name
    fn display_name(&self) -> &str;

    /// Get the unique instance ID
    fn id(&self) -> &str;

    /// Check whether the node is still wired into a graph
    fn is_connected(&self) -> bool;

    /// Detach the node and release its processing state
    ///
    /// Idempotent: disconnecting twice, or disconnecting a node that never
    /// processed audio, is not an error.
    fn disconnect(&mut self);

    /// Get all parameters as JSON (for logging/inspection)
    fn get_params(&self) -> Value;
}

/// Helper macro to implement common Effect trait methods
#[macro_export]
macro_rules! impl_effect_common {
    ($type:ty, $effect_type:expr, $display_name:expr) => {
        fn effect_type(&self) -> &'static str {
            $effect_type
        }

        fn display_name(&self) -> &str {
            $display_name
        }

        fn id(&self) -> &str {
            &self.params.id
        }

        fn is_connected(&self) -> bool {
            self.params.connected
        }

        fn disconnect(&mut self) {
            if self.params.connected {
                self.params.connected = false;
                self.reset();
            }
        }
    };
}
