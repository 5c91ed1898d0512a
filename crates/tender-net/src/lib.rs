// Remote collaborators of the synchronizer: ledger gateway, wallet, pinning.

pub mod config;
pub mod error;
pub mod ledger;
pub mod pinning;
pub mod rpc;
pub mod session;
pub mod traits;
pub mod wallet;

pub use config::NetConfig;
pub use error::NetError;
pub use ledger::RpcLedger;
pub use pinning::PinataPinner;
pub use rpc::JsonRpcClient;
pub use session::Session;
pub use traits::{
    ActionSubmitter, ContentPinner, Receipt, ReceiptStatus, RecordSource, TxHandle,
    WalletEvent, WalletProvider,
};
pub use wallet::RpcWallet;
