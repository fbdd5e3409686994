//! Command dispatch: typed requests in, typed responses out.

pub mod dispatcher;
pub mod request;
pub mod response;

pub use dispatcher::{DispatchError, Dispatcher, DispatcherConfig};
pub use request::Request;
pub use response::{Capabilities, IdentifyInfo, Response, Support, SystemSettings};
