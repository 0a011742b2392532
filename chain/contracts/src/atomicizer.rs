//! Atomicizer: runs a list of calls as one unit
//!
//! Invoked by delegate call from a proxy. The calldata packs every sub-call
//! back to back; `calldata_lengths` splits it. Each sub-call runs in order
//! with the proxy as caller. If any sub-call fails the environment is
//! reverted to the checkpoint taken before the first one.

use tracing::{debug, warn};
use types::ids::Address;

use crate::env::Env;
use crate::errors::CallError;

/// One sub-call of a bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubCall {
    pub target: Address,
    pub calldata: Vec<u8>,
}

/// Split packed calldata into sub-calls, validating the array shapes.
pub fn split_bundle(
    targets: &[Address],
    values: &[u128],
    calldata_lengths: &[u128],
    calldata: &[u8],
) -> Result<Vec<SubCall>, CallError> {
    if targets.len() != values.len() || targets.len() != calldata_lengths.len() {
        return Err(CallError::MalformedInput(format!(
            "array lengths differ: {} targets, {} values, {} calldata lengths",
            targets.len(),
            values.len(),
            calldata_lengths.len()
        )));
    }
    if let Some(i) = values.iter().position(|v| *v != 0) {
        return Err(CallError::MalformedInput(format!(
            "sub-call {} carries native value",
            i
        )));
    }
    let total = calldata_lengths
        .iter()
        .try_fold(0u128, |acc, len| acc.checked_add(*len));
    if total != Some(calldata.len() as u128) {
        return Err(CallError::MalformedInput(format!(
            "calldata lengths do not sum to {} bytes",
            calldata.len()
        )));
    }

    let mut offset = 0usize;
    let mut calls = Vec::with_capacity(targets.len());
    for (target, len) in targets.iter().zip(calldata_lengths) {
        // every length fits: the total equals calldata.len()
        let len = usize::try_from(*len)
            .map_err(|_| CallError::MalformedInput("calldata length overflow".to_string()))?;
        calls.push(SubCall {
            target: *target,
            calldata: calldata[offset..offset + len].to_vec(),
        });
        offset += len;
    }
    Ok(calls)
}

/// Run `calls` in the context of `proxy`, all or nothing.
pub fn execute(env: &mut Env, proxy: Address, calls: &[SubCall]) -> Result<(), CallError> {
    let checkpoint = env.checkpoint();
    for (index, call) in calls.iter().enumerate() {
        if let Err(source) = env.dispatch(proxy, call.target, &call.calldata) {
            env.revert_to(checkpoint);
            warn!(
                proxy = %proxy,
                index,
                target = %call.target,
                error = %source,
                "Atomicized sub-call failed, bundle reverted"
            );
            return Err(CallError::SubCallFailed {
                index,
                source: Box::new(source),
            });
        }
    }
    debug!(proxy = %proxy, calls = calls.len(), "Atomicized bundle executed");
    Ok(())
}
