//! On-disk campaign node: RocksDB storage, a tokio-driven clock, layered
//! configuration and logging setup.

pub mod config;
pub mod logging;
pub mod node;
pub mod storage;
pub mod timer;

pub use config::NodeConfig;
pub use logging::init_logging;
pub use node::AirdropNode;
pub use storage::RocksStore;
pub use timer::TokioTimer;
