//! Proxy core
//!
//! Sans-I/O machinery shared by every protocol layer:
//!
//! ```text
//! driver ──Event──► Layer ──step──► Protocol ──Event──► child Layer …
//!        ◄─Command─       ◄─Command─          ◄─Command─
//! ```
//!
//! - [`Command`] / [`Event`]: the only vocabulary between layers and the driver
//! - [`Layer`]: pause/resume engine around a [`Protocol`] step function
//! - [`NextLayer`]: marker that defers to the router until a stack is chosen
//! - [`LayerStack`]: ordered plan of layers, built into a chained stack
//! - [`Context`]: connections and ancestry of a layer

mod commands;
mod context;
mod events;
mod layer;
mod mode;
mod next_layer;
mod tunnel;

pub use commands::{Blocking, Command, CommandId, CommandKind};
pub use context::{Context, HttpMode, LayerHandle, LayerId, LayerKind, Services};
pub use events::{CommandCompleted, Event, Reply};
pub use layer::{Layer, Protocol};
pub use mode::{ProxyMode, ReverseScheme};
pub use next_layer::NextLayer;
pub use tunnel::LayerStack;
