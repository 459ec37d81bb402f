//! Strategy dispatch.

use crate::error::{KeeperError, Result};
use crate::params::{Algorithm, KeyParams};
use aid_core::IndexedSignature;
use std::collections::HashMap;
use std::sync::Arc;

/// Derives keys and signs for identifiers, whatever strategy they use.
pub trait KeyManager: Send + Sync {
    /// Current keys at rotation index `ridx`, in signing order.
    fn keys(&self, params: &KeyParams, ridx: u64) -> Result<Vec<String>>;

    /// Digests of the keys that will become current at `ridx + 1`.
    fn next_digests(&self, params: &KeyParams, ridx: u64) -> Result<Vec<String>>;

    /// Sign `message` with the keys current at `ridx`.
    fn sign(&self, message: &[u8], params: &KeyParams, ridx: u64)
    -> Result<Vec<IndexedSignature>>;
}

/// One key derivation strategy.
///
/// `manager` is the dispatcher the strategy is registered with, so a strategy
/// can sign through another one.
pub trait KeyStrategy: Send + Sync {
    fn algorithm(&self) -> Algorithm;

    fn keys(&self, params: &KeyParams, ridx: u64) -> Result<Vec<String>>;

    fn next_digests(&self, params: &KeyParams, ridx: u64) -> Result<Vec<String>>;

    fn sign(
        &self,
        manager: &dyn KeyManager,
        message: &[u8],
        params: &KeyParams,
        ridx: u64,
    ) -> Result<Vec<IndexedSignature>>;
}

/// A shared strategy, so the caller can keep a handle to it (for example to
/// export generated keys) after registering it.
impl<S: KeyStrategy + ?Sized> KeyStrategy for Arc<S> {
    fn algorithm(&self) -> Algorithm {
        (**self).algorithm()
    }

    fn keys(&self, params: &KeyParams, ridx: u64) -> Result<Vec<String>> {
        (**self).keys(params, ridx)
    }

    fn next_digests(&self, params: &KeyParams, ridx: u64) -> Result<Vec<String>> {
        (**self).next_digests(params, ridx)
    }

    fn sign(
        &self,
        manager: &dyn KeyManager,
        message: &[u8],
        params: &KeyParams,
        ridx: u64,
    ) -> Result<Vec<IndexedSignature>> {
        (**self).sign(manager, message, params, ridx)
    }
}

/// Dispatches to registered strategies by their algorithm tag.
#[derive(Default)]
pub struct Manager {
    strategies: HashMap<Algorithm, Box<dyn KeyStrategy>>,
}

impl Manager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a strategy, replacing any other with the same tag.
    pub fn register(&mut self, strategy: impl KeyStrategy + 'static) {
        self.strategies
            .insert(strategy.algorithm(), Box::new(strategy));
    }

    /// Builder form of [`Manager::register`].
    pub fn with(mut self, strategy: impl KeyStrategy + 'static) -> Self {
        self.register(strategy);
        self
    }

    pub fn strategy(&self, algorithm: Algorithm) -> Result<&dyn KeyStrategy> {
        self.strategies
            .get(&algorithm)
            .map(|s| s.as_ref())
            .ok_or_else(|| aid_core::Error::UnknownKeyStrategy(algorithm.to_string()).into())
    }
}

impl KeyManager for Manager {
    fn keys(&self, params: &KeyParams, ridx: u64) -> Result<Vec<String>> {
        self.strategy(params.algorithm())?.keys(params, ridx)
    }

    fn next_digests(&self, params: &KeyParams, ridx: u64) -> Result<Vec<String>> {
        self.strategy(params.algorithm())?.next_digests(params, ridx)
    }

    fn sign(
        &self,
        message: &[u8],
        params: &KeyParams,
        ridx: u64,
    ) -> Result<Vec<IndexedSignature>> {
        self.strategy(params.algorithm())?
            .sign(self, message, params, ridx)
    }
}

/// Error for a strategy handed another strategy's parameters.
pub(crate) fn mismatch(strategy: Algorithm, params: &KeyParams) -> KeeperError {
    KeeperError::ParamsMismatch {
        strategy,
        given: params.algorithm(),
    }
}
