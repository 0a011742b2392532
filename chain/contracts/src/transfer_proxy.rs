//! Token Transfer Proxy: moves fungible tokens for authorized callers
//!
//! Users approve this contract once per payment token. An authorized caller
//! (the exchange) then moves funds from a user by proving it holds a current
//! grant on that user's proxy. The move spends the allowance given to this
//! contract, never one given to the caller.

use tracing::debug;
use types::ids::Address;
use types::numeric::Amount;

use crate::errors::{CallError, RegistryError};
use crate::events::ContractEvent;
use crate::ledger::AssetLedger;
use crate::registry::ProxyRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenTransferProxy {
    address: Address,
}

impl TokenTransferProxy {
    pub fn new(address: Address) -> Self {
        Self { address }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Move `amount` of `token` from `from` to `to` on behalf of `caller`.
    #[allow(clippy::too_many_arguments)]
    pub fn transfer_tokens(
        &self,
        registry: &ProxyRegistry,
        ledger: &mut AssetLedger,
        now: i64,
        caller: Address,
        token: Address,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> Result<ContractEvent, CallError> {
        let proxy = registry
            .proxy_for(from)
            .ok_or(RegistryError::Unauthorized {
                caller,
                proxy: registry.proxy_address(from),
            })?;
        registry.check_authority(proxy, caller, now)?;
        debug!(
            caller = %caller,
            token = %token,
            from = %from,
            to = %to,
            amount = %amount,
            "Proxied token transfer"
        );
        Ok(ledger.transfer_from(self.address, token, from, to, amount)?)
    }
}
