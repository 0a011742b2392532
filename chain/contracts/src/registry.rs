//! Proxy Registry: per-user proxies and their authorized callers
//!
//! Each user owns at most one proxy, bound permanently on registration.
//! Callers (the exchange, the token transfer proxy) act through a proxy only
//! while they hold a current grant on it. Revoking a grant is two-phase: the
//! user starts the revocation and may finish it once `delay` has elapsed.
//! From the moment the delay elapses the grant no longer authorizes, whether
//! or not the revocation was finished.
//!
//! The registry owner maintains a set of default callers that every newly
//! registered proxy grants automatically. Adding a default caller is
//! timelocked by the same delay, except for a one-shot initial grant made
//! at deployment.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};
use types::ids::Address;

use crate::errors::RegistryError;
use crate::events::ContractEvent;
use crate::security::Ownable;

/// Address of a user's proxy.
pub type ProxyId = Address;

/// Default revocation and authentication delay: two weeks.
pub const DEFAULT_DELAY_SECONDS: i64 = 14 * 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyRecord {
    pub user: Address,
    pub proxy: ProxyId,
    pub created_at: i64,
}

/// Authorization of one caller on one proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub granted_at: i64,
    /// Set by `start_revoke`
    pub revoke_requested_at: Option<i64>,
}

impl Grant {
    /// Whether the grant still authorizes at `now` under `delay`.
    pub fn is_current(&self, now: i64, delay: i64) -> bool {
        match self.revoke_requested_at {
            None => true,
            Some(requested) => now < requested.saturating_add(delay),
        }
    }
}

#[derive(Debug)]
pub struct ProxyRegistry {
    address: Address,
    owner: Ownable,
    delay: i64,
    proxies: HashMap<Address, ProxyId>,
    records: HashMap<ProxyId, ProxyRecord>,
    grants: HashMap<(ProxyId, Address), Grant>,
    default_callers: BTreeSet<Address>,
    /// Default callers awaiting the delay: caller -> requested at
    pending_defaults: HashMap<Address, i64>,
    initial_authentication_done: bool,
}

impl ProxyRegistry {
    pub fn new(address: Address, owner: Address, delay: i64) -> Self {
        Self {
            address,
            owner: Ownable::new(owner),
            delay,
            proxies: HashMap::new(),
            records: HashMap::new(),
            grants: HashMap::new(),
            default_callers: BTreeSet::new(),
            pending_defaults: HashMap::new(),
            initial_authentication_done: false,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn owner(&self) -> Address {
        self.owner.owner()
    }

    pub fn delay(&self) -> i64 {
        self.delay
    }

    /// Address the proxy of `user` is (or will be) deployed at.
    pub fn proxy_address(&self, user: Address) -> ProxyId {
        let mut seed = Vec::with_capacity(2 * Address::LEN);
        seed.extend_from_slice(self.address.as_bytes());
        seed.extend_from_slice(user.as_bytes());
        Address::derive("proxy", &seed)
    }

    // ───────────────────────── User Operations ─────────────────────────

    /// Register a proxy for `user`. Idempotent: a second call returns the
    /// existing proxy and no events.
    pub fn register_proxy(
        &mut self,
        user: Address,
        now: i64,
    ) -> Result<(ProxyId, Vec<ContractEvent>), RegistryError> {
        if user.is_zero() {
            return Err(RegistryError::ZeroAddress);
        }
        if let Some(proxy) = self.proxies.get(&user) {
            return Ok((*proxy, Vec::new()));
        }
        let proxy = self.proxy_address(user);
        self.proxies.insert(user, proxy);
        self.records.insert(
            proxy,
            ProxyRecord {
                user,
                proxy,
                created_at: now,
            },
        );
        let mut events = vec![ContractEvent::ProxyRegistered { user, proxy }];
        for caller in &self.default_callers {
            self.grants.insert(
                (proxy, *caller),
                Grant {
                    granted_at: now,
                    revoke_requested_at: None,
                },
            );
            events.push(ContractEvent::AuthorityGranted {
                proxy,
                caller: *caller,
            });
        }
        info!(
            user = %user,
            proxy = %proxy,
            defaults = self.default_callers.len(),
            "Proxy registered"
        );
        Ok((proxy, events))
    }

    /// Grant `target` authority on the caller's proxy. Clears any pending revocation.
    pub fn grant_authority(
        &mut self,
        caller: Address,
        proxy: ProxyId,
        target: Address,
        now: i64,
    ) -> Result<ContractEvent, RegistryError> {
        self.require_proxy_user(caller, proxy)?;
        if target.is_zero() {
            return Err(RegistryError::ZeroAddress);
        }
        self.grants.insert(
            (proxy, target),
            Grant {
                granted_at: now,
                revoke_requested_at: None,
            },
        );
        debug!(proxy = %proxy, caller = %target, "Authority granted");
        Ok(ContractEvent::AuthorityGranted {
            proxy,
            caller: target,
        })
    }

    pub fn start_revoke(
        &mut self,
        caller: Address,
        proxy: ProxyId,
        target: Address,
        now: i64,
    ) -> Result<ContractEvent, RegistryError> {
        self.require_proxy_user(caller, proxy)?;
        let delay = self.delay;
        let grant = self
            .grants
            .get_mut(&(proxy, target))
            .ok_or(RegistryError::GrantNotFound {
                proxy,
                caller: target,
            })?;
        if let Some(requested) = grant.revoke_requested_at {
            return Err(RegistryError::RevokeAlreadyPending {
                available_at: requested.saturating_add(delay),
            });
        }
        grant.revoke_requested_at = Some(now);
        let available_at = now.saturating_add(delay);
        info!(proxy = %proxy, caller = %target, available_at, "Revocation started");
        Ok(ContractEvent::RevokeStarted {
            proxy,
            caller: target,
            available_at,
        })
    }

    pub fn end_revoke(
        &mut self,
        caller: Address,
        proxy: ProxyId,
        target: Address,
        now: i64,
    ) -> Result<ContractEvent, RegistryError> {
        self.require_proxy_user(caller, proxy)?;
        let grant = self
            .grants
            .get(&(proxy, target))
            .ok_or(RegistryError::GrantNotFound {
                proxy,
                caller: target,
            })?;
        let requested = grant
            .revoke_requested_at
            .ok_or(RegistryError::RevokeNotStarted {
                proxy,
                caller: target,
            })?;
        let available_at = requested.saturating_add(self.delay);
        if now < available_at {
            return Err(RegistryError::TooEarly { available_at });
        }
        self.grants.remove(&(proxy, target));
        info!(proxy = %proxy, caller = %target, "Authority revoked");
        Ok(ContractEvent::AuthorityRevoked {
            proxy,
            caller: target,
        })
    }

    // ───────────────────────── Views ─────────────────────────

    pub fn proxy_for(&self, user: Address) -> Option<ProxyId> {
        self.proxies.get(&user).copied()
    }

    pub fn user_of(&self, proxy: ProxyId) -> Option<Address> {
        self.records.get(&proxy).map(|r| r.user)
    }

    pub fn record(&self, proxy: ProxyId) -> Option<&ProxyRecord> {
        self.records.get(&proxy)
    }

    pub fn grant(&self, proxy: ProxyId, caller: Address) -> Option<&Grant> {
        self.grants.get(&(proxy, caller))
    }

    pub fn is_authorized(&self, proxy: ProxyId, caller: Address, now: i64) -> bool {
        self.check_authority(proxy, caller, now).is_ok()
    }

    /// The proxy's user is always authorized; anyone else needs a current grant.
    pub fn check_authority(
        &self,
        proxy: ProxyId,
        caller: Address,
        now: i64,
    ) -> Result<(), RegistryError> {
        let user = self
            .user_of(proxy)
            .ok_or(RegistryError::UnknownProxy { proxy })?;
        if caller == user {
            return Ok(());
        }
        match self.grants.get(&(proxy, caller)) {
            Some(grant) if grant.is_current(now, self.delay) => Ok(()),
            _ => Err(RegistryError::Unauthorized { caller, proxy }),
        }
    }

    pub fn default_callers(&self) -> impl Iterator<Item = &Address> {
        self.default_callers.iter()
    }

    // ───────────────────────── Owner Operations ─────────────────────────

    /// One-shot immediate addition of a default caller, used at deployment.
    pub fn grant_initial_authentication(
        &mut self,
        caller: Address,
        authority: Address,
    ) -> Result<ContractEvent, RegistryError> {
        self.require_owner(caller)?;
        if self.initial_authentication_done {
            return Err(RegistryError::InitialAuthenticationDone);
        }
        if authority.is_zero() {
            return Err(RegistryError::ZeroAddress);
        }
        self.initial_authentication_done = true;
        self.default_callers.insert(authority);
        info!(authority = %authority, "Initial authentication granted");
        Ok(ContractEvent::AuthenticationGranted { caller: authority })
    }

    pub fn start_grant_authentication(
        &mut self,
        caller: Address,
        authority: Address,
        now: i64,
    ) -> Result<ContractEvent, RegistryError> {
        self.require_owner(caller)?;
        if authority.is_zero() {
            return Err(RegistryError::ZeroAddress);
        }
        if let Some(requested) = self.pending_defaults.get(&authority) {
            return Err(RegistryError::RevokeAlreadyPending {
                available_at: requested.saturating_add(self.delay),
            });
        }
        self.pending_defaults.insert(authority, now);
        Ok(ContractEvent::AuthenticationPending {
            caller: authority,
            available_at: now.saturating_add(self.delay),
        })
    }

    pub fn end_grant_authentication(
        &mut self,
        caller: Address,
        authority: Address,
        now: i64,
    ) -> Result<ContractEvent, RegistryError> {
        self.require_owner(caller)?;
        let requested = *self
            .pending_defaults
            .get(&authority)
            .ok_or(RegistryError::AuthenticationNotStarted(authority))?;
        let available_at = requested.saturating_add(self.delay);
        if now < available_at {
            return Err(RegistryError::TooEarly { available_at });
        }
        self.pending_defaults.remove(&authority);
        self.default_callers.insert(authority);
        info!(authority = %authority, "Authentication granted");
        Ok(ContractEvent::AuthenticationGranted { caller: authority })
    }

    /// Remove a default caller. Existing grants on registered proxies stay.
    pub fn revoke_authentication(
        &mut self,
        caller: Address,
        authority: Address,
    ) -> Result<ContractEvent, RegistryError> {
        self.require_owner(caller)?;
        self.pending_defaults.remove(&authority);
        self.default_callers.remove(&authority);
        info!(authority = %authority, "Authentication revoked");
        Ok(ContractEvent::AuthenticationRevoked { caller: authority })
    }

    pub fn transfer_ownership(
        &mut self,
        caller: Address,
        new_owner: Address,
    ) -> Result<ContractEvent, RegistryError> {
        self.owner
            .transfer_ownership(caller, new_owner)
            .ok_or(RegistryError::NotOwner)
    }

    // ───────────────────────── Internal ─────────────────────────

    fn require_owner(&self, caller: Address) -> Result<(), RegistryError> {
        if !self.owner.is_owner(caller) {
            return Err(RegistryError::NotOwner);
        }
        Ok(())
    }

    fn require_proxy_user(&self, caller: Address, proxy: ProxyId) -> Result<(), RegistryError> {
        match self.user_of(proxy) {
            None => Err(RegistryError::UnknownProxy { proxy }),
            Some(user) if user != caller => Err(RegistryError::NotProxyOwner { caller, proxy }),
            Some(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELAY: i64 = 3_600;

    fn addr(seed: &[u8]) -> Address {
        Address::derive("user", seed)
    }

    fn setup() -> (ProxyRegistry, Address) {
        let owner = addr(b"owner");
        let mut registry =
            ProxyRegistry::new(Address::derive("contract", b"registry"), owner, DELAY);
        let exchange = Address::derive("contract", b"exchange");
        registry.grant_initial_authentication(owner, exchange).unwrap();
        (registry, exchange)
    }

    #[test]
    fn test_register_is_idempotent() {
        let (mut registry, exchange) = setup();
        let alice = addr(b"alice");
        let (proxy, events) = registry.register_proxy(alice, 100).unwrap();
        assert_eq!(events.len(), 2, "registration plus default grant");
        let (again, events) = registry.register_proxy(alice, 200).unwrap();
        assert_eq!(proxy, again);
        assert!(events.is_empty());
        assert_eq!(registry.proxy_for(alice), Some(proxy));
        assert_eq!(registry.user_of(proxy), Some(alice));
        assert!(registry.is_authorized(proxy, exchange, 200));
        assert_eq!(registry.record(proxy).unwrap().created_at, 100);
    }

    #[test]
    fn test_proxy_address_is_per_user() {
        let (registry, _) = setup();
        assert_ne!(registry.proxy_address(addr(b"a")), registry.proxy_address(addr(b"b")));
    }

    #[test]
    fn test_user_always_authorized_stranger_not() {
        let (mut registry, _) = setup();
        let alice = addr(b"alice");
        let (proxy, _) = registry.register_proxy(alice, 0).unwrap();
        assert!(registry.is_authorized(proxy, alice, 0));
        assert_eq!(
            registry.check_authority(proxy, addr(b"mallory"), 0),
            Err(RegistryError::Unauthorized {
                caller: addr(b"mallory"),
                proxy
            })
        );
    }

    #[test]
    fn test_only_user_manages_grants() {
        let (mut registry, exchange) = setup();
        let (proxy, _) = registry.register_proxy(addr(b"alice"), 0).unwrap();
        assert!(matches!(
            registry.start_revoke(addr(b"mallory"), proxy, exchange, 0),
            Err(RegistryError::NotProxyOwner { .. })
        ));
        assert!(matches!(
            registry.grant_authority(addr(b"mallory"), proxy, addr(b"mallory"), 0),
            Err(RegistryError::NotProxyOwner { .. })
        ));
    }

    #[test]
    fn test_revoke_timelock() {
        let (mut registry, exchange) = setup();
        let alice = addr(b"alice");
        let (proxy, _) = registry.register_proxy(alice, 0).unwrap();
        registry.start_revoke(alice, proxy, exchange, 1_000).unwrap();

        // still current inside the delay
        assert!(registry.is_authorized(proxy, exchange, 1_000 + DELAY - 1));
        assert_eq!(
            registry.end_revoke(alice, proxy, exchange, 1_000 + DELAY - 1),
            Err(RegistryError::TooEarly {
                available_at: 1_000 + DELAY
            })
        );
        // stale once the delay elapses, even before end_revoke
        assert!(!registry.is_authorized(proxy, exchange, 1_000 + DELAY));

        registry.end_revoke(alice, proxy, exchange, 1_000 + DELAY).unwrap();
        assert!(registry.grant(proxy, exchange).is_none());
        assert!(!registry.is_authorized(proxy, exchange, 1_000 + DELAY));
    }

    #[test]
    fn test_double_start_revoke_rejected() {
        let (mut registry, exchange) = setup();
        let alice = addr(b"alice");
        let (proxy, _) = registry.register_proxy(alice, 0).unwrap();
        registry.start_revoke(alice, proxy, exchange, 10).unwrap();
        assert_eq!(
            registry.start_revoke(alice, proxy, exchange, 20),
            Err(RegistryError::RevokeAlreadyPending {
                available_at: 10 + DELAY
            })
        );
    }

    #[test]
    fn test_end_revoke_without_start() {
        let (mut registry, exchange) = setup();
        let alice = addr(b"alice");
        let (proxy, _) = registry.register_proxy(alice, 0).unwrap();
        assert!(matches!(
            registry.end_revoke(alice, proxy, exchange, 10),
            Err(RegistryError::RevokeNotStarted { .. })
        ));
    }

    #[test]
    fn test_regrant_cancels_pending_revoke() {
        let (mut registry, exchange) = setup();
        let alice = addr(b"alice");
        let (proxy, _) = registry.register_proxy(alice, 0).unwrap();
        registry.start_revoke(alice, proxy, exchange, 0).unwrap();
        registry.grant_authority(alice, proxy, exchange, 5).unwrap();
        assert!(registry.is_authorized(proxy, exchange, 10 * DELAY));
    }

    #[test]
    fn test_initial_authentication_once() {
        let (mut registry, _) = setup();
        let owner = registry.owner();
        assert_eq!(
            registry.grant_initial_authentication(owner, addr(b"other")),
            Err(RegistryError::InitialAuthenticationDone)
        );
    }

    #[test]
    fn test_authentication_timelock_affects_new_proxies_only() {
        let (mut registry, _) = setup();
        let owner = registry.owner();
        let (early_proxy, _) = registry.register_proxy(addr(b"early"), 0).unwrap();

        let newcomer = addr(b"newcomer");
        assert_eq!(
            registry.start_grant_authentication(addr(b"mallory"), newcomer, 0),
            Err(RegistryError::NotOwner)
        );
        registry.start_grant_authentication(owner, newcomer, 0).unwrap();
        assert_eq!(
            registry.end_grant_authentication(owner, newcomer, DELAY - 1),
            Err(RegistryError::TooEarly { available_at: DELAY })
        );
        registry.end_grant_authentication(owner, newcomer, DELAY).unwrap();

        let (late_proxy, _) = registry.register_proxy(addr(b"late"), DELAY).unwrap();
        assert!(registry.is_authorized(late_proxy, newcomer, DELAY));
        assert!(!registry.is_authorized(early_proxy, newcomer, DELAY));

        registry.revoke_authentication(owner, newcomer).unwrap();
        let (last_proxy, _) = registry.register_proxy(addr(b"last"), DELAY).unwrap();
        assert!(!registry.is_authorized(last_proxy, newcomer, DELAY));
        assert!(registry.is_authorized(late_proxy, newcomer, DELAY));
    }
}
