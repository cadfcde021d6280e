pub mod action;
pub mod instance;
pub mod payload;
pub mod protocol;
pub mod response;
pub mod errors;

pub use action::{Action, HttpMethod, RequestOptions};
pub use instance::{InFlightKey, InstanceDescriptor, InstanceMeta, InstanceTags, PortInfo, PortKind, ProdPort};
pub use payload::{AppDetail, InstanceDetail, Payload, RegisterPayload, RmiPort};
pub use protocol::{Translator, validate, parse_prod_ports};
pub use response::{BridgeResponse, Verdict, classify};
pub use errors::ProtocolError;
