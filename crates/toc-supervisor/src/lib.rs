pub mod bridge_link;
pub mod primary;
pub mod process;
pub mod server;
pub mod snapshot;
pub mod supervisor;
