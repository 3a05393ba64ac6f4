// fix-broker: FIX 4.2 acceptor with an in-memory order authority.
// The binary in main.rs runs the acceptor; the admin surface is the
// in-process ExecutionDispatcher.

pub mod acceptor;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod fix;
pub mod model;
pub mod session;
pub mod store;

pub use acceptor::Acceptor;
pub use config::Settings;
pub use dispatch::ExecutionDispatcher;
pub use error::{AdminError, SessionError};
pub use model::{ClOrdId, ExecIdSource, SenderCompId};
pub use session::{SessionContext, SessionRegistry};
pub use store::OrderStore;
