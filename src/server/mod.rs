//! Server side: the sans-I/O connection handler and the tokio runtime
//! driving it over real sockets.

mod handler;
mod runtime;

pub use handler::ConnectionHandler;
pub use runtime::{drive_connection, Runtime};
