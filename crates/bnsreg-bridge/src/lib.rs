pub mod config;
pub mod dispatcher;
pub mod transport;
pub mod errors;

pub use config::{BridgeArgs, BridgeConfig, CascadeCallback};
pub use dispatcher::{Callback, Dispatcher, Outcome};
pub use transport::{BridgeReply, BridgeTransport, HttpTransport};
pub use errors::{ConfigError, TransportError};
