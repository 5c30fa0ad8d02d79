pub mod traits;
pub mod source_node;
pub mod destination_node;

pub use destination_node::NodeWalletSubmitter;
pub use source_node::SourceNodeClient;
