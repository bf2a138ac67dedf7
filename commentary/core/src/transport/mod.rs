//! Transport Layer for Commentary Sockets
//!
//! Both commentary sockets speak text frames. The connection manager never
//! touches a socket directly; it asks a [`Connector`] for a [`Connection`],
//! which is a pair of channels fed by background reader and writer tasks.
//!
//! - `WebSocketConnector`: real `wss://` connections (feature `websocket`)
//! - `InProcessConnector`: channel pairs handed to the caller, used by tests
//!   and by embedders that proxy the service themselves

pub mod in_process;
pub mod traits;
#[cfg(feature = "websocket")]
pub mod websocket;

pub use in_process::{InProcessConnector, InProcessListener, ServerEnd};
pub use traits::{Connection, ConnectionSender, Connector, TransportError, TransportEvent};
#[cfg(feature = "websocket")]
pub use websocket::WebSocketConnector;
