//! Router Layer
//!
//! Responsibilities:
//! - Decide which layers replace a `NextLayer` marker
//! - NO IO operations
//! - NO async operations
//!
//! A router is a pure function of the context, the connection table and the
//! bytes buffered so far on both sides.

pub mod hosts;
pub mod next_layer;

pub use hosts::HostPatterns;
pub use next_layer::NextLayerRouter;

use thiserror::Error;

use crate::common::Connections;
use crate::proxy::{Context, LayerStack};

/// The decision must be retried once more bytes have arrived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("need more data to decide the next layer")]
pub struct NeedsMoreData;

/// Next-layer decision procedure
///
/// IMPORTANT: implementations must NOT perform any IO. Calling `next_layer`
/// twice with the same inputs must give the same answer.
pub trait Router: Send + Sync {
    fn next_layer(
        &self,
        cx: &Context,
        conns: &Connections,
        data_client: &[u8],
        data_server: &[u8],
    ) -> Result<LayerStack, NeedsMoreData>;
}

/// Router that always answers with the same stack
pub struct StaticRouter {
    stack: LayerStack,
}

impl StaticRouter {
    pub fn new(stack: impl Into<LayerStack>) -> Self {
        Self {
            stack: stack.into(),
        }
    }
}

impl Router for StaticRouter {
    fn next_layer(
        &self,
        _cx: &Context,
        _conns: &Connections,
        _data_client: &[u8],
        _data_server: &[u8],
    ) -> Result<LayerStack, NeedsMoreData> {
        Ok(self.stack.clone())
    }
}
