use std::{
    collections::HashMap,
    fmt::Debug,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use chrono::{DateTime, Utc};
use log::*;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::{
    crypto_watcher::AddressPool,
    currency::{CurrencyError, CurrencyService},
    db_types::{Money, Order, OrderStatusType, Payment, PaymentMethod},
    order_state::OrderTrigger,
    shop_api::transitions::OrderTransitions,
    traits::{
        CatalogManagement,
        ChainExplorer,
        InvoiceAssignment,
        OrderManagement,
        OrderStoreError,
        Settlement,
        TokenTransfer,
        TransitionChange,
    },
};

/// Transfers stamped up to this long before the invoice was issued still count. Explorer clocks drift.
const TRANSFER_SLACK_SECS: i64 = 120;
const MIN_CHECK_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Error)]
pub enum WatcherError {
    #[error("No receiving address is free for {0}")]
    NoFreeAddress(PaymentMethod),
    #[error("Order {0} does not exist")]
    OrderNotFound(i64),
    #[error("Order {order_id} is paid with {order_method}. This watcher handles {watcher_method}")]
    WrongPaymentMethod { order_id: i64, order_method: PaymentMethod, watcher_method: PaymentMethod },
    #[error("Order {order_id} is {status} and not awaiting payment")]
    NotAwaitingPayment { order_id: i64, status: OrderStatusType },
    #[error(transparent)]
    Currency(#[from] CurrencyError),
    #[error(transparent)]
    Store(#[from] OrderStoreError),
}

#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub method: PaymentMethod,
    pub addresses: Vec<String>,
    /// The token contract transfers must come from. `None` watches the chain's native coin.
    pub token_contract: Option<String>,
    /// Power-of-ten scale between one whole token and its on-chain integer unit
    pub token_decimals: u32,
    /// The currency the token is quoted in, e.g. `USD` for a dollar stablecoin
    pub payment_currency: String,
    pub check_interval: Duration,
    pub invoice_expiration: Duration,
    pub explorer_timeout: Duration,
}

impl WatcherConfig {
    pub fn new(method: PaymentMethod, addresses: Vec<String>) -> Self {
        let (token_decimals, payment_currency) = match method {
            PaymentMethod::Eth | PaymentMethod::EthTest => (18, "ETH"),
            _ => (6, "USD"),
        };
        Self {
            method,
            addresses,
            token_contract: None,
            token_decimals,
            payment_currency: payment_currency.to_string(),
            check_interval: Duration::from_secs(30),
            invoice_expiration: Duration::from_secs(60 * 60),
            explorer_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_token_contract<S: Into<String>>(mut self, contract: S) -> Self {
        self.token_contract = Some(contract.into());
        self
    }

    fn invoice_window(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.invoice_expiration).unwrap_or_else(|_| chrono::Duration::weeks(52))
    }
}

#[derive(Debug, Default)]
struct WatcherState {
    pool: AddressPool,
    monitors: HashMap<i64, CancellationToken>,
    last_hold: i64,
}

impl WatcherState {
    fn next_hold_key(&mut self) -> i64 {
        self.last_hold -= 1;
        self.last_hold
    }
}

fn lock(state: &Mutex<WatcherState>) -> MutexGuard<'_, WatcherState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A receiving address and the exact on-chain amount, set aside for an order that is about to be written.
///
/// The address is taken from the pool when the hold is created, so two buyers can never be promised the same one.
/// [`CryptoWatcher::bind_invoice`] hands it to the written order. Dropping an unbound hold frees the address again.
pub struct InvoiceHold {
    state: Arc<Mutex<WatcherState>>,
    key: i64,
    payee: String,
    amount: Money,
}

impl InvoiceHold {
    pub fn payee(&self) -> &str {
        &self.payee
    }

    pub fn amount(&self) -> Money {
        self.amount
    }
}

impl Debug for InvoiceHold {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "InvoiceHold({} for {} units)", self.payee, self.amount)
    }
}

impl Drop for InvoiceHold {
    fn drop(&mut self) {
        // a no-op once the hold has been rebound to its order
        lock(&self.state).pool.release(self.key);
    }
}

/// Pairs unpaid orders of one crypto payment method with receiving addresses and watches the chain for payment.
///
/// Every address in the pool serves at most one order at a time. Each bound order gets a monitor task that polls the
/// chain explorer until one of three things happens:
/// * a transfer of exactly the invoiced amount of the configured token reaches the address: the order is confirmed,
/// * the invoice deadline passes: the order is cancelled and its stock returned,
/// * the monitor is cancelled, e.g. because an admin cancelled the order.
///
/// In every case the address goes back to the pool. The binding between address and order lives on the payment row,
/// so [`CryptoWatcher::start`] rebuilds the pool and the monitors after a restart.
#[derive(Clone)]
pub struct CryptoWatcher<B> {
    config: Arc<WatcherConfig>,
    db: B,
    currency: CurrencyService,
    explorer: Arc<dyn ChainExplorer>,
    transitions: OrderTransitions<B>,
    state: Arc<Mutex<WatcherState>>,
    shutdown: CancellationToken,
}

impl<B> Debug for CryptoWatcher<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CryptoWatcher ({})", self.config.method)
    }
}

impl<B> CryptoWatcher<B>
where B: OrderManagement + CatalogManagement
{
    pub fn new(
        config: WatcherConfig,
        db: B,
        currency: CurrencyService,
        explorer: Arc<dyn ChainExplorer>,
        transitions: OrderTransitions<B>,
    ) -> Self {
        let state = WatcherState { pool: AddressPool::new(&config.addresses), ..Default::default() };
        Self {
            config: Arc::new(config),
            db,
            currency,
            explorer,
            transitions,
            state: Arc::new(Mutex::new(state)),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn method(&self) -> PaymentMethod {
        self.config.method
    }

    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    fn state(&self) -> MutexGuard<'_, WatcherState> {
        lock(&self.state)
    }

    /// Rebuilds the address pool and the monitors from the orders still awaiting payment with this method. Returns
    /// the number of orders being watched.
    pub async fn start(&self) -> Result<usize, WatcherError> {
        let payments = self.db.fetch_awaiting_payments(Some(self.config.method)).await?;
        let mut watched = 0;
        for payment in payments {
            let order_id = payment.order_id;
            match payment.payee.clone() {
                Some(payee) => {
                    if !self.state().pool.occupy(&payee, order_id) {
                        warn!("⛓️ Address {payee} of order {order_id} is not free in the pool. Watching it anyway");
                    }
                    self.spawn_monitor(payment);
                    watched += 1;
                },
                None => match self.acquire_invoice(order_id).await {
                    Ok(_) => watched += 1,
                    Err(e) => warn!("⛓️ Order {order_id} has no invoice and none could be issued. {e}"),
                },
            }
        }
        let (free, total) = {
            let state = self.state();
            (state.pool.free_count(), state.pool.len())
        };
        let method = self.config.method;
        info!("⛓️ {method} watcher started. {watched} orders watched. {free} of {total} addresses free");
        Ok(watched)
    }

    /// Returns the crypto invoice for the order, issuing one if necessary.
    ///
    /// * A settled payment is returned as is, with `expired_at` set to the settlement time.
    /// * A payment that already has a receiving address is returned with its deadline.
    /// * Otherwise a free address is bound to the order, the exact on-chain amount is computed and persisted, and a
    ///   monitor is started.
    pub async fn acquire_invoice(&self, order_id: i64) -> Result<Payment, WatcherError> {
        let order = self.db.fetch_order(order_id).await?.ok_or(WatcherError::OrderNotFound(order_id))?;
        let mut payment =
            self.db.fetch_payment_for_order(order_id).await?.ok_or(OrderStoreError::PaymentNotFound(order_id))?;
        if payment.payment_method != self.config.method {
            return Err(WatcherError::WrongPaymentMethod {
                order_id,
                order_method: payment.payment_method,
                watcher_method: self.config.method,
            });
        }
        if payment.is_transaction_done {
            payment.expired_at = Some(payment.modified_at);
            return Ok(payment);
        }
        if order.status != OrderStatusType::AwaitingPayment {
            return Err(WatcherError::NotAwaitingPayment { order_id, status: order.status });
        }
        if let Some(payee) = payment.payee.clone() {
            self.state().pool.occupy(&payee, order_id);
            payment.expired_at = Some(self.deadline(&payment));
            self.spawn_monitor(payment.clone());
            return Ok(payment);
        }
        let hold = self.hold_invoice(order.total_price).await?;
        self.bind_invoice(hold, &order).await
    }

    /// Prices `total` in the watched token and sets a free receiving address aside for it.
    ///
    /// The amount is computed first, so a missing exchange rate never takes an address out of the pool.
    pub async fn hold_invoice(&self, total: Money) -> Result<InvoiceHold, WatcherError> {
        let config = &self.config;
        let on_chain = self.currency.to_on_chain_amount(&config.payment_currency, total, config.token_decimals).await?;
        let amount = Money::from_u128(on_chain).ok_or_else(|| CurrencyError::AmountOverflow(on_chain.to_string()))?;
        let mut state = self.state();
        let key = state.next_hold_key();
        let payee = state.pool.acquire(key).ok_or(WatcherError::NoFreeAddress(config.method))?;
        trace!("⛓️ {payee} held for an order of {total}");
        Ok(InvoiceHold { state: Arc::clone(&self.state), key, payee, amount })
    }

    /// Binds a held address to the written order, persists the invoice and starts watching for the payment. If the
    /// invoice cannot be saved, the address goes back to the pool.
    pub async fn bind_invoice(&self, hold: InvoiceHold, order: &Order) -> Result<Payment, WatcherError> {
        if self.state().pool.rebind(hold.key, order.id).is_none() {
            return Err(WatcherError::NoFreeAddress(self.config.method));
        }
        let invoice = InvoiceAssignment {
            payee: hold.payee.clone(),
            transaction_amount: order.total_price,
            transaction_amount_payment_currency: hold.amount,
            expires_at: Utc::now() + self.config.invoice_window(),
        };
        match self.db.assign_crypto_invoice(order.id, invoice).await {
            Ok(payment) => {
                info!("⛓️ Order {} invoiced to {}. {} units expected", order.uuid, hold.payee, hold.amount);
                self.spawn_monitor(payment.clone());
                Ok(payment)
            },
            Err(e) => {
                self.state().pool.release(order.id);
                Err(e.into())
            },
        }
    }

    /// Stops the order's monitor without expiring the order, and frees its address. Calling it again is harmless.
    pub fn cancel_monitor(&self, order_id: i64) -> bool {
        let (token, freed) = {
            let mut state = self.state();
            (state.monitors.remove(&order_id), state.pool.release(order_id))
        };
        if let Some(token) = &token {
            token.cancel();
        }
        if let Some(address) = &freed {
            debug!("⛓️ Monitor for order {order_id} cancelled. {address} is free again");
        }
        token.is_some() || freed.is_some()
    }

    /// Stops every monitor. Bound addresses stay recorded on the payment rows for the next start.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    pub fn free_addresses(&self) -> usize {
        self.state().pool.free_count()
    }

    pub fn address_for(&self, order_id: i64) -> Option<String> {
        self.state().pool.address_for(order_id).map(String::from)
    }

    pub fn monitored_orders(&self) -> Vec<i64> {
        let mut orders = self.state().monitors.keys().copied().collect::<Vec<_>>();
        orders.sort_unstable();
        orders
    }

    fn deadline(&self, payment: &Payment) -> DateTime<Utc> {
        payment.expired_at.unwrap_or(payment.modified_at + self.config.invoice_window())
    }

    fn spawn_monitor(&self, payment: Payment) {
        let token = {
            let mut state = self.state();
            if state.monitors.contains_key(&payment.order_id) {
                return;
            }
            let token = self.shutdown.child_token();
            state.monitors.insert(payment.order_id, token.clone());
            token
        };
        let watcher = self.clone();
        tokio::spawn(async move { watcher.monitor(payment, token).await });
    }

    async fn monitor(self, payment: Payment, token: CancellationToken) {
        let order_id = payment.order_id;
        let (Some(payee), Some(expected)) =
            (payment.payee.clone(), payment.transaction_amount_payment_currency.to_u128())
        else {
            error!("⛓️ Payment for order {order_id} lacks a payee or an integer on-chain amount. Not watching it");
            self.forget(order_id);
            return;
        };
        let deadline = self.deadline(&payment);
        let since = payment.modified_at - chrono::Duration::seconds(TRANSFER_SLACK_SECS);
        let expiry = tokio::time::sleep((deadline - Utc::now()).to_std().unwrap_or_default());
        tokio::pin!(expiry);
        let mut timer = tokio::time::interval(self.config.check_interval.max(MIN_CHECK_INTERVAL));
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        debug!("⛓️ Watching {payee} for order {order_id}. Expecting {expected} units until {deadline}");
        // Set once the deadline has passed. From then on every tick retries closing the invoice until it sticks.
        let mut overdue = false;
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!("⛓️ Monitor for order {order_id} stopped");
                    break;
                }
                _ = &mut expiry, if !overdue => {
                    overdue = true;
                    if self.close_invoice(order_id, &payee, expected, since).await {
                        break;
                    }
                }
                _ = timer.tick() => {
                    if overdue {
                        if self.close_invoice(order_id, &payee, expected, since).await {
                            break;
                        }
                    } else if let Some(transfer) = self.find_payment(&payee, expected, since).await {
                        if self.settle(order_id, transfer).await {
                            break;
                        }
                    }
                }
            }
        }
        self.forget(order_id);
    }

    /// Takes one last look at the chain, in case the payment landed since the previous poll, then settles or expires
    /// the order. Returns true once the order no longer awaits payment.
    async fn close_invoice(&self, order_id: i64, payee: &str, expected: u128, since: DateTime<Utc>) -> bool {
        match self.find_payment(payee, expected, since).await {
            Some(transfer) => self.settle(order_id, transfer).await,
            None => self.expire(order_id).await.is_some() || !self.still_awaiting_payment(order_id).await,
        }
    }

    /// Closes an overdue invoice that no monitor is watching, e.g. one whose address could never be assigned.
    /// Orders with a live monitor are left to it. Returns the order if it was cancelled.
    pub async fn close_unwatched(&self, payment: &Payment) -> Option<Order> {
        let order_id = payment.order_id;
        if self.state().monitors.contains_key(&order_id) {
            return None;
        }
        let expected = payment.transaction_amount_payment_currency.to_u128();
        if let (Some(payee), Some(expected)) = (payment.payee.as_deref(), expected) {
            let since = payment.modified_at - chrono::Duration::seconds(TRANSFER_SLACK_SECS);
            if let Some(transfer) = self.find_payment(payee, expected, since).await {
                self.settle(order_id, transfer).await;
                self.forget(order_id);
                return None;
            }
        }
        let order = self.expire(order_id).await;
        if order.is_some() || !self.still_awaiting_payment(order_id).await {
            self.forget(order_id);
        }
        order
    }

    async fn find_payment(&self, payee: &str, expected: u128, since: DateTime<Utc>) -> Option<TokenTransfer> {
        let request = self.explorer.incoming_transfers(payee);
        let transfers = match tokio::time::timeout(self.config.explorer_timeout, request).await {
            Ok(Ok(transfers)) => transfers,
            Ok(Err(e)) => {
                warn!("⛓️ Could not fetch transfers to {payee}. {e}");
                return None;
            },
            Err(_) => {
                warn!("⛓️ Explorer did not answer within {:?} for {payee}", self.config.explorer_timeout);
                return None;
            },
        };
        trace!("⛓️ {} transfers to {payee}", transfers.len());
        transfers.into_iter().find(|t| is_exact_payment(t, &self.config, payee, expected, since))
    }

    /// Returns true once the order no longer awaits payment, whether or not this settlement is what moved it.
    async fn settle(&self, order_id: i64, transfer: TokenTransfer) -> bool {
        info!("⛓️ Transfer {} of {} units settles order {order_id}", transfer.tx_id, transfer.value);
        let settlement =
            Settlement { transaction_id: transfer.tx_id, payer: Some(transfer.from), payee: Some(transfer.to) };
        let change = TransitionChange::settle(settlement);
        match self.transitions.apply(order_id, OrderTrigger::PaymentSettled, change).await {
            Ok(outcome) => {
                info!("⛓️ Order {} is paid and confirmed", outcome.order.uuid);
                true
            },
            Err(e) => {
                error!("⛓️ Order {order_id} was paid but could not be confirmed. {e}");
                !self.still_awaiting_payment(order_id).await
            },
        }
    }

    /// Cancels the order. Returns it if this call moved it.
    async fn expire(&self, order_id: i64) -> Option<Order> {
        match self.transitions.apply(order_id, OrderTrigger::InvoiceExpired, TransitionChange::default()).await {
            Ok(outcome) => {
                info!("⛓️ Invoice for order {} expired. The order is cancelled", outcome.order.uuid);
                Some(outcome.order)
            },
            Err(e) => {
                warn!("⛓️ Could not expire the invoice for order {order_id}. {e}");
                None
            },
        }
    }

    /// A store error counts as still awaiting, so the caller keeps the address and tries again.
    async fn still_awaiting_payment(&self, order_id: i64) -> bool {
        match self.db.fetch_order(order_id).await {
            Ok(order) => order.is_some_and(|o| o.status == OrderStatusType::AwaitingPayment),
            Err(e) => {
                warn!("⛓️ Could not read order {order_id}. {e}");
                true
            },
        }
    }

    fn forget(&self, order_id: i64) {
        let mut state = self.state();
        state.monitors.remove(&order_id);
        if let Some(address) = state.pool.release(order_id) {
            debug!("⛓️ {address} is free again");
        }
    }
}

/// EVM addresses are hex and compare case-insensitively. Everything else (e.g. base58) is compared exactly.
fn same_address(a: &str, b: &str) -> bool {
    if a.starts_with("0x") || a.starts_with("0X") {
        a.eq_ignore_ascii_case(b)
    } else {
        a == b
    }
}

/// A transfer pays the invoice only if it is of the configured token, goes to the invoiced address, was made after the
/// invoice was issued, and carries exactly the invoiced amount. Under- and over-payments do not count.
fn is_exact_payment(
    transfer: &TokenTransfer,
    config: &WatcherConfig,
    payee: &str,
    expected: u128,
    since: DateTime<Utc>,
) -> bool {
    let token_matches = match (&config.token_contract, &transfer.token_contract) {
        (Some(wanted), Some(actual)) => same_address(wanted, actual),
        (None, None) => true,
        _ => false,
    };
    token_matches &&
        same_address(payee, &transfer.to) &&
        transfer.timestamp >= since &&
        transfer.value.trim().parse::<u128>().map(|v| v == expected).unwrap_or(false)
}

#[cfg(test)]
mod test {
    use super::*;

    const USDT: &str = "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t";

    fn config() -> WatcherConfig {
        WatcherConfig::new(PaymentMethod::UsdtTron, vec!["TPayee".into()]).with_token_contract(USDT)
    }

    fn transfer(value: &str) -> TokenTransfer {
        TokenTransfer {
            tx_id: "tx1".into(),
            from: "TPayer".into(),
            to: "TPayee".into(),
            value: value.into(),
            token_contract: Some(USDT.into()),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn only_exact_amounts_settle() {
        let config = config();
        let since = Utc::now() - chrono::Duration::minutes(1);
        assert!(is_exact_payment(&transfer("22000000"), &config, "TPayee", 22_000_000, since));
        assert!(!is_exact_payment(&transfer("21999999"), &config, "TPayee", 22_000_000, since));
        assert!(!is_exact_payment(&transfer("22000001"), &config, "TPayee", 22_000_000, since));
        assert!(!is_exact_payment(&transfer("22.0"), &config, "TPayee", 22_000_000, since));
    }

    #[test]
    fn token_address_and_time_must_match() {
        let config = config();
        let since = Utc::now() - chrono::Duration::minutes(1);
        let mut t = transfer("22000000");
        t.token_contract = Some("TSomethingElse".into());
        assert!(!is_exact_payment(&t, &config, "TPayee", 22_000_000, since));
        t.token_contract = None;
        assert!(!is_exact_payment(&t, &config, "TPayee", 22_000_000, since));
        let mut t = transfer("22000000");
        t.to = "tpayee".into();
        assert!(!is_exact_payment(&t, &config, "TPayee", 22_000_000, since));
        let mut t = transfer("22000000");
        t.timestamp = since - chrono::Duration::seconds(1);
        assert!(!is_exact_payment(&t, &config, "TPayee", 22_000_000, since));
    }

    #[test]
    fn native_coin_and_hex_addresses() {
        let config = WatcherConfig::new(PaymentMethod::Eth, vec![]);
        assert_eq!(config.token_decimals, 18);
        let since = Utc::now() - chrono::Duration::minutes(1);
        let mut t = transfer("1000");
        t.token_contract = None;
        t.to = "0xABCdef".into();
        assert!(is_exact_payment(&t, &config, "0xabcDEF", 1000, since));
    }
}
