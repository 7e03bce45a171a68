//! Thin JSON-RPC facade over `bt2c-core`'s [`Chain`] (§6 External
//! Interfaces — the core exposes `add_transaction`/`get_balance`/etc. but
//! does not prescribe a transport). This is one concrete transport choice;
//! it stays a pass-through and holds no consensus logic of its own.

use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use jsonrpsee::core::RpcResult;
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::types::ErrorObjectOwned;

use bt2c_core::address::Address;
use bt2c_core::chain::Chain;
use bt2c_core::transaction::Transaction;

#[rpc(server, namespace = "bt2c")]
pub trait Bt2cApi {
    #[method(name = "submitTransaction")]
    fn submit_transaction(&self, tx: Transaction) -> RpcResult<String>;

    #[method(name = "getBalance")]
    fn get_balance(&self, address: String) -> RpcResult<String>;

    #[method(name = "getHeight")]
    fn get_height(&self) -> RpcResult<u64>;

    #[method(name = "getTransactionFinality")]
    fn get_transaction_finality(&self, hash: String) -> RpcResult<Option<String>>;
}

/// The `Chain` is single-writer per §5; callers on this process share one
/// handle behind a mutex rather than the core exposing any locking itself.
pub struct Bt2cRpc {
    chain: Arc<Mutex<Chain>>,
}

impl Bt2cRpc {
    pub fn new(chain: Arc<Mutex<Chain>>) -> Self {
        Self { chain }
    }
}

impl Bt2cApiServer for Bt2cRpc {
    fn submit_transaction(&self, tx: Transaction) -> RpcResult<String> {
        let hash = tx.hash().to_string();
        let now = now_secs();
        let mut chain = self.chain.lock().expect("chain mutex poisoned");
        chain.add_transaction(tx, now).map_err(core_error)?;
        tracing::info!(hash, "transaction_submitted");
        Ok(hash)
    }

    fn get_balance(&self, address: String) -> RpcResult<String> {
        let chain = self.chain.lock().expect("chain mutex poisoned");
        Ok(chain.get_balance(&Address::from(address)).to_string())
    }

    fn get_height(&self) -> RpcResult<u64> {
        let chain = self.chain.lock().expect("chain mutex poisoned");
        Ok(chain.height())
    }

    fn get_transaction_finality(&self, hash: String) -> RpcResult<Option<String>> {
        let chain = self.chain.lock().expect("chain mutex poisoned");
        Ok(chain
            .get_transaction_with_finality(&hash)
            .map(|lookup| format!("{lookup:?}")))
    }
}

fn core_error(e: bt2c_core::Error) -> ErrorObjectOwned {
    ErrorObjectOwned::owned(-32000, e.to_string(), None::<()>)
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs()
}

/// Binds a jsonrpsee server at `addr` serving [`Bt2cApi`] over the shared
/// chain handle. Runs until the returned handle is stopped or dropped.
pub async fn serve(
    chain: Arc<Mutex<Chain>>,
    addr: &str,
) -> Result<ServerHandle, Box<dyn std::error::Error + Send + Sync>> {
    let server = Server::builder().build(addr).await?;
    let handle = server.start(Bt2cRpc::new(chain).into_rpc());
    Ok(handle)
}
