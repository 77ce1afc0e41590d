use std::{collections::BTreeMap, fmt::Debug};

use log::*;

use crate::{
    crypto_watcher::CryptoWatcher,
    db_types::PaymentMethod,
    traits::{CatalogManagement, OrderManagement},
};

/// The crypto watchers configured for this shop, one per payment method.
#[derive(Clone)]
pub struct PaymentWatchers<B> {
    watchers: BTreeMap<PaymentMethod, CryptoWatcher<B>>,
}

impl<B> Debug for PaymentWatchers<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentWatchers ({} methods)", self.watchers.len())
    }
}

impl<B> Default for PaymentWatchers<B> {
    fn default() -> Self {
        Self { watchers: BTreeMap::new() }
    }
}

impl<B> PaymentWatchers<B>
where B: OrderManagement + CatalogManagement
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_watcher(mut self, watcher: CryptoWatcher<B>) -> Self {
        self.watchers.insert(watcher.method(), watcher);
        self
    }

    pub fn get(&self, method: PaymentMethod) -> Option<&CryptoWatcher<B>> {
        self.watchers.get(&method)
    }

    pub fn methods(&self) -> Vec<PaymentMethod> {
        self.watchers.keys().copied().collect()
    }

    /// Starts every watcher. A watcher that fails to start is logged and skipped.
    pub async fn start_all(&self) -> usize {
        let mut watched = 0;
        for (method, watcher) in &self.watchers {
            match watcher.start().await {
                Ok(n) => watched += n,
                Err(e) => error!("⛓️ The {method} watcher could not start. {e}"),
            }
        }
        watched
    }

    /// Cancels the order's monitor in whichever watcher holds it.
    pub fn cancel_monitor(&self, order_id: i64) -> bool {
        self.watchers.values().fold(false, |cancelled, w| w.cancel_monitor(order_id) || cancelled)
    }

    pub fn stop_all(&self) {
        self.watchers.values().for_each(CryptoWatcher::stop);
    }
}
