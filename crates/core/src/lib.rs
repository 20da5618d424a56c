pub mod address;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod lease;
pub mod operation;
pub mod plan;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use address::{Address, AddressScheme, Options, Params, ServerTier};
pub use config::Config;
pub use dispatch::Dispatcher;
pub use engine::{Engine, EngineCall};
pub use error::{DispatchError, EngineError};
pub use operation::{Operation, operations};
