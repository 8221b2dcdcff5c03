//! Alert state machine, suppression modifiers, persistence, deadman
//! detection, and handler dispatch (spec §4.7, §6.2, §6.3).

pub mod data;
pub mod deadman;
pub mod dispatch;
pub mod level;
pub mod node;
pub mod state;
pub mod store;

pub use data::{template_vars, AlertData};
pub use deadman::Deadman;
pub use dispatch::{AlertHandler, DispatchError, ExecHandler, LogHandler, PostHandler, TcpHandler};
pub use level::Level;
pub use node::{AlertNode, AlertSpec, StateChangesOnly};
pub use state::AlertState;
pub use store::{AlertStore, StoreError};
