//! # Stock reservations
//!
//! Soft, in-memory holds on `(product, size)` stock, scoped to a browsing session while the customer builds a cart
//! and to an order while its payment is outstanding.
//!
//! Reservations are advisory. They stop two checkouts from validating against the same units, but the order
//! submission transaction is what actually guarantees stock never goes negative.
//!
//! All indexes live in one index structure behind a single read-write lock. Queries take the read side, every
//! mutation takes the write side, and the lock is never held across I/O.
use std::{
    collections::{HashMap, HashSet},
    fmt::Display,
    sync::Arc,
    time::Duration,
};

use log::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::{sync::RwLock, task::JoinHandle, time::Instant};
use tokio_util::sync::CancellationToken;

const RATE_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReservationError {
    #[error("Reservation quantity must be positive")]
    QuantityNonPositive,
    #[error("Cannot reserve {requested} units of one item. The limit is {max}")]
    QuantityExceedsLimit { requested: i64, max: i64 },
    #[error("This session already holds the maximum of {0} items")]
    SessionItemCapReached(usize),
    #[error("The reservation service is at capacity. Try again shortly")]
    ServiceBusy,
    #[error("Too many reservation requests from this session")]
    RateLimited,
    #[error("Reservation {0} is already attached to an order")]
    AlreadyCommitted(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationLimits {
    /// Distinct `(product, size)` pairs one session may hold in its cart
    pub max_items_per_session: usize,
    /// Largest quantity a single reserve call may ask for
    pub max_qty_per_item: i64,
    /// Global cap on live reservations
    pub max_total_reservations: usize,
    /// How many times a cart reservation's expiry may be pushed back
    pub max_ttl_refreshes: u32,
    /// Reserve calls per session per minute
    pub reserve_rate_per_session: u32,
}

impl Default for ReservationLimits {
    fn default() -> Self {
        Self {
            max_items_per_session: 10,
            max_qty_per_item: 5,
            max_total_reservations: 10_000,
            max_ttl_refreshes: 3,
            reserve_rate_per_session: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservationConfig {
    pub cart_ttl: Duration,
    pub order_ttl: Duration,
    pub sweep_interval: Duration,
    pub limits: ReservationLimits,
}

impl Default for ReservationConfig {
    fn default() -> Self {
        Self {
            cart_ttl: Duration::from_secs(15 * 60),
            order_ttl: Duration::from_secs(60 * 60),
            sweep_interval: Duration::from_secs(60),
            limits: ReservationLimits::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReservationKey {
    pub product_id: i64,
    pub size_id: i64,
    pub session_id: String,
}

impl ReservationKey {
    pub fn new<S: Into<String>>(product_id: i64, size_id: i64, session_id: S) -> Self {
        Self { product_id, size_id, session_id: session_id.into() }
    }
}

impl Display for ReservationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}-{}", self.product_id, self.size_id, self.session_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub product_id: i64,
    pub size_id: i64,
    pub quantity: i64,
    pub session_id: String,
    pub order_uuid: Option<String>,
    pub created_at: Instant,
    pub expires_at: Instant,
    pub refresh_count: u32,
}

impl Reservation {
    pub fn key(&self) -> ReservationKey {
        ReservationKey::new(self.product_id, self.size_id, self.session_id.clone())
    }

    pub fn is_active(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReservationStats {
    pub total: usize,
    /// Reservations not yet attached to an order
    pub cart: usize,
    pub order: usize,
    pub active_sessions: usize,
    pub active_orders: usize,
    /// `total` as a percentage of the global cap
    pub capacity_pct: f64,
}

struct RateWindow {
    count: u32,
    expires_at: Instant,
}

/// The reservation graph. Every key in a secondary index refers to an entry in `reservations`, and every entry in
/// `reservations` appears in `by_session` and `by_product_size` (and `by_order` once committed).
#[derive(Default)]
struct ReservationIndex {
    reservations: HashMap<ReservationKey, Reservation>,
    by_session: HashMap<String, HashSet<ReservationKey>>,
    by_order: HashMap<String, HashSet<ReservationKey>>,
    by_product_size: HashMap<(i64, i64), HashSet<ReservationKey>>,
    session_rates: HashMap<String, RateWindow>,
}

impl ReservationIndex {
    fn insert(&mut self, reservation: Reservation) {
        let key = reservation.key();
        self.by_session.entry(reservation.session_id.clone()).or_default().insert(key.clone());
        self.by_product_size.entry((reservation.product_id, reservation.size_id)).or_default().insert(key.clone());
        if let Some(uuid) = &reservation.order_uuid {
            self.by_order.entry(uuid.clone()).or_default().insert(key.clone());
        }
        self.reservations.insert(key, reservation);
    }

    fn remove(&mut self, key: &ReservationKey) -> Option<Reservation> {
        let reservation = self.reservations.remove(key)?;
        if let Some(keys) = self.by_session.get_mut(&reservation.session_id) {
            keys.remove(key);
            if keys.is_empty() {
                self.by_session.remove(&reservation.session_id);
            }
        }
        let pair = (reservation.product_id, reservation.size_id);
        if let Some(keys) = self.by_product_size.get_mut(&pair) {
            keys.remove(key);
            if keys.is_empty() {
                self.by_product_size.remove(&pair);
            }
        }
        if let Some(uuid) = &reservation.order_uuid {
            if let Some(keys) = self.by_order.get_mut(uuid) {
                keys.remove(key);
                if keys.is_empty() {
                    self.by_order.remove(uuid);
                }
            }
        }
        Some(reservation)
    }

    fn cart_items_for_session(&self, session_id: &str, now: Instant) -> usize {
        self.by_session
            .get(session_id)
            .map(|keys| {
                keys.iter()
                    .filter_map(|k| self.reservations.get(k))
                    .filter(|r| r.order_uuid.is_none() && r.is_active(now))
                    .count()
            })
            .unwrap_or(0)
    }

    fn reserved_quantity(&self, product_id: i64, size_id: i64, exclude_session: &str, now: Instant) -> i64 {
        self.by_product_size
            .get(&(product_id, size_id))
            .map(|keys| {
                keys.iter()
                    .filter_map(|k| self.reservations.get(k))
                    .filter(|r| r.session_id != exclude_session && r.is_active(now))
                    .map(|r| r.quantity)
                    .sum()
            })
            .unwrap_or(0)
    }

    /// Counts this call against the session's per-minute budget.
    fn take_rate_slot(&mut self, session_id: &str, max: u32, now: Instant) -> bool {
        match self.session_rates.get_mut(session_id) {
            Some(window) if now < window.expires_at => {
                if window.count >= max {
                    return false;
                }
                window.count += 1;
                true
            },
            _ => {
                self.session_rates
                    .insert(session_id.to_string(), RateWindow { count: 1, expires_at: now + RATE_WINDOW });
                max > 0
            },
        }
    }

    #[cfg(test)]
    fn assert_consistent(&self, now: Instant) {
        let scanned = self.reservations.values().filter(|r| r.is_active(now)).fold(HashMap::new(), |mut acc, r| {
            *acc.entry((r.product_id, r.size_id)).or_insert(0i64) += r.quantity;
            acc
        });
        for ((pid, sid), qty) in &scanned {
            assert_eq!(self.reserved_quantity(*pid, *sid, "", now), *qty);
        }
        for (pair, keys) in &self.by_product_size {
            for key in keys {
                let r = self.reservations.get(key).expect("dangling product-size key");
                assert_eq!((r.product_id, r.size_id), *pair);
            }
        }
        for (session, keys) in &self.by_session {
            for key in keys {
                assert_eq!(&self.reservations.get(key).expect("dangling session key").session_id, session);
            }
        }
        for (uuid, keys) in &self.by_order {
            for key in keys {
                let r = self.reservations.get(key).expect("dangling order key");
                assert_eq!(r.order_uuid.as_ref(), Some(uuid));
            }
        }
        let indexed = self.by_session.values().map(|k| k.len()).sum::<usize>();
        assert_eq!(indexed, self.reservations.len());
        let indexed = self.by_product_size.values().map(|k| k.len()).sum::<usize>();
        assert_eq!(indexed, self.reservations.len());
    }
}

#[derive(Clone)]
pub struct ReservationManager {
    config: ReservationConfig,
    index: Arc<RwLock<ReservationIndex>>,
    shutdown: CancellationToken,
}

impl ReservationManager {
    pub fn new(config: ReservationConfig) -> Self {
        Self { config, index: Arc::new(RwLock::new(ReservationIndex::default())), shutdown: CancellationToken::new() }
    }

    pub fn config(&self) -> &ReservationConfig {
        &self.config
    }

    /// Creates or updates the reservation for `(product_id, size_id, session_id)`.
    ///
    /// A new reservation expires after the cart TTL. Updating an existing one sets the new quantity and renews the
    /// expiry, unless the key has already been renewed `max_ttl_refreshes` times, in which case the expiry is frozen.
    pub async fn reserve(
        &self,
        session_id: &str,
        product_id: i64,
        size_id: i64,
        quantity: i64,
    ) -> Result<Reservation, ReservationError> {
        let limits = &self.config.limits;
        if quantity <= 0 {
            return Err(ReservationError::QuantityNonPositive);
        }
        if quantity > limits.max_qty_per_item {
            return Err(ReservationError::QuantityExceedsLimit { requested: quantity, max: limits.max_qty_per_item });
        }
        let now = Instant::now();
        let key = ReservationKey::new(product_id, size_id, session_id);
        let mut index = self.index.write().await;
        if !index.take_rate_slot(session_id, limits.reserve_rate_per_session, now) {
            debug!("🛒️ Session {session_id} is reserving too quickly");
            return Err(ReservationError::RateLimited);
        }
        let stale = index.reservations.get(&key).map(|r| !r.is_active(now)).unwrap_or(false);
        if stale {
            index.remove(&key);
        }
        if let Some(existing) = index.reservations.get_mut(&key) {
            if existing.order_uuid.is_some() {
                return Err(ReservationError::AlreadyCommitted(key.to_string()));
            }
            existing.quantity = quantity;
            if existing.refresh_count < limits.max_ttl_refreshes {
                existing.expires_at = now + self.config.cart_ttl;
                existing.refresh_count += 1;
            }
            trace!("🛒️ Reservation {key} updated to {quantity} units. Refreshed {} times", existing.refresh_count);
            return Ok(existing.clone());
        }
        let held = index.cart_items_for_session(session_id, now);
        if held >= limits.max_items_per_session {
            return Err(ReservationError::SessionItemCapReached(limits.max_items_per_session));
        }
        if index.reservations.len() >= limits.max_total_reservations {
            warn!("🛒️ Reservation capacity of {} reached", limits.max_total_reservations);
            return Err(ReservationError::ServiceBusy);
        }
        let reservation = Reservation {
            product_id,
            size_id,
            quantity,
            session_id: session_id.to_string(),
            order_uuid: None,
            created_at: now,
            expires_at: now + self.config.cart_ttl,
            refresh_count: 0,
        };
        index.insert(reservation.clone());
        trace!("🛒️ Reserved {quantity} units as {key}");
        Ok(reservation)
    }

    /// Attaches every live cart reservation of `session_id` to `order_uuid` and extends it to the order TTL.
    /// Returns the number of reservations committed.
    pub async fn commit(&self, session_id: &str, order_uuid: &str) -> usize {
        let now = Instant::now();
        let mut index = self.index.write().await;
        let keys = index.by_session.get(session_id).cloned().unwrap_or_default();
        let mut committed = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(r) = index.reservations.get_mut(&key) {
                if r.order_uuid.is_none() && r.is_active(now) {
                    r.order_uuid = Some(order_uuid.to_string());
                    r.expires_at = now + self.config.order_ttl;
                    r.refresh_count = 0;
                    committed.push(key);
                }
            }
        }
        let count = committed.len();
        if count > 0 {
            index.by_order.entry(order_uuid.to_string()).or_default().extend(committed);
        }
        debug!("🛒️ {count} reservations from session {session_id} committed to order {order_uuid}");
        count
    }

    /// Drops every reservation attached to `order_uuid`. Releasing twice is harmless.
    pub async fn release(&self, order_uuid: &str) -> usize {
        let mut index = self.index.write().await;
        let keys = index.by_order.remove(order_uuid).unwrap_or_default();
        let count = keys.iter().filter(|k| index.remove(k).is_some()).count();
        if count > 0 {
            debug!("🛒️ Released {count} reservations held by order {order_uuid}");
        }
        count
    }

    /// Drops the session's cart reservations. Reservations already attached to an order are kept.
    pub async fn release_session(&self, session_id: &str) -> usize {
        let mut index = self.index.write().await;
        let keys = index
            .by_session
            .get(session_id)
            .map(|keys| {
                keys.iter()
                    .filter(|k| index.reservations.get(*k).map(|r| r.order_uuid.is_none()).unwrap_or(false))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        let count = keys.iter().filter(|k| index.remove(k).is_some()).count();
        trace!("🛒️ Released {count} cart reservations for session {session_id}");
        count
    }

    /// Units of `(product_id, size_id)` held by live reservations of every session except `exclude_session`.
    pub async fn reserved_quantity(&self, product_id: i64, size_id: i64, exclude_session: &str) -> i64 {
        let now = Instant::now();
        self.index.read().await.reserved_quantity(product_id, size_id, exclude_session, now)
    }

    /// `total_stock` less what other sessions hold, never below zero.
    pub async fn available_stock(
        &self,
        total_stock: i64,
        product_id: i64,
        size_id: i64,
        exclude_session: &str,
    ) -> i64 {
        let reserved = self.reserved_quantity(product_id, size_id, exclude_session).await;
        (total_stock - reserved).max(0)
    }

    pub async fn stats(&self) -> ReservationStats {
        let now = Instant::now();
        let index = self.index.read().await;
        let live = index.reservations.values().filter(|r| r.is_active(now));
        let (mut cart, mut order) = (0, 0);
        let mut sessions = HashSet::new();
        let mut orders = HashSet::new();
        for r in live {
            sessions.insert(r.session_id.as_str());
            match &r.order_uuid {
                Some(uuid) => {
                    order += 1;
                    orders.insert(uuid.as_str());
                },
                None => cart += 1,
            }
        }
        let total = cart + order;
        let cap = self.config.limits.max_total_reservations.max(1) as f64;
        ReservationStats {
            total,
            cart,
            order,
            active_sessions: sessions.len(),
            active_orders: orders.len(),
            capacity_pct: total as f64 * 100.0 / cap,
        }
    }

    /// Removes expired reservations and rate windows. Returns the number of reservations removed.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut index = self.index.write().await;
        let expired = index.reservations.values().filter(|r| !r.is_active(now)).map(|r| r.key()).collect::<Vec<_>>();
        for key in &expired {
            index.remove(key);
        }
        index.session_rates.retain(|_, w| now < w.expires_at);
        expired.len()
    }

    /// Spawns the background sweeper. It runs until [`Self::stop`] is called.
    pub fn start_sweeper(&self) -> JoinHandle<()> {
        let manager = self.clone();
        let interval = self.config.sweep_interval;
        tokio::spawn(async move {
            info!("🛒️ Reservation sweeper started");
            let mut timer = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = manager.shutdown.cancelled() => {
                        info!("🛒️ Reservation sweeper shutting down");
                        break;
                    }
                    _ = timer.tick() => {
                        let expired = manager.sweep().await;
                        debug!("🛒️ Swept {expired} expired reservations");
                    }
                }
            }
        })
    }

    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    #[cfg(test)]
    async fn assert_consistent(&self) {
        self.index.read().await.assert_consistent(Instant::now());
    }
}

#[cfg(test)]
mod test {
    use rand::{rngs::StdRng, Rng, SeedableRng};

    use super::*;

    fn manager() -> ReservationManager {
        ReservationManager::new(ReservationConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn reserve_and_query() {
        let m = manager();
        m.reserve("a", 1, 1, 3).await.unwrap();
        m.reserve("b", 1, 1, 1).await.unwrap();
        m.reserve("b", 1, 2, 2).await.unwrap();
        assert_eq!(m.reserved_quantity(1, 1, "").await, 4);
        assert_eq!(m.reserved_quantity(1, 1, "a").await, 1);
        assert_eq!(m.reserved_quantity(1, 1, "b").await, 3);
        assert_eq!(m.available_stock(5, 1, 1, "b").await, 2);
        assert_eq!(m.available_stock(2, 1, 1, "b").await, 0);
        assert_eq!(m.available_stock(5, 1, 1, "a").await, 4);
        m.assert_consistent().await;
    }

    #[tokio::test(start_paused = true)]
    async fn quantity_limits() {
        let m = manager();
        assert_eq!(m.reserve("a", 1, 1, 0).await.unwrap_err(), ReservationError::QuantityNonPositive);
        assert_eq!(m.reserve("a", 1, 1, -2).await.unwrap_err(), ReservationError::QuantityNonPositive);
        assert!(m.reserve("a", 1, 1, 5).await.is_ok());
        assert_eq!(
            m.reserve("a", 1, 1, 6).await.unwrap_err(),
            ReservationError::QuantityExceedsLimit { requested: 6, max: 5 }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn ttl_refreshes_are_capped() {
        let m = manager();
        let first = m.reserve("a", 1, 1, 1).await.unwrap();
        let mut last_expiry = first.expires_at;
        for i in 1..=3 {
            tokio::time::advance(Duration::from_secs(10)).await;
            let r = m.reserve("a", 1, 1, 1 + i).await.unwrap();
            assert!(r.expires_at > last_expiry);
            assert_eq!(r.refresh_count, i as u32);
            last_expiry = r.expires_at;
        }
        tokio::time::advance(Duration::from_secs(10)).await;
        let r = m.reserve("a", 1, 1, 2).await.unwrap();
        assert_eq!(r.quantity, 2);
        assert_eq!(r.expires_at, last_expiry);
        assert_eq!(r.refresh_count, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn session_item_cap() {
        let m = manager();
        for pid in 0..10 {
            m.reserve("a", pid, 1, 1).await.unwrap();
        }
        assert_eq!(m.reserve("a", 99, 1, 1).await.unwrap_err(), ReservationError::SessionItemCapReached(10));
        // Updating an existing item is still fine
        assert!(m.reserve("a", 3, 1, 2).await.is_ok());
        assert!(m.reserve("b", 99, 1, 1).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn global_cap() {
        let config = ReservationConfig {
            limits: ReservationLimits { max_total_reservations: 3, ..Default::default() },
            ..Default::default()
        };
        let m = ReservationManager::new(config);
        for s in ["a", "b", "c"] {
            m.reserve(s, 1, 1, 1).await.unwrap();
        }
        assert_eq!(m.reserve("d", 1, 1, 1).await.unwrap_err(), ReservationError::ServiceBusy);
        assert_eq!(m.stats().await.capacity_pct, 100.0);
    }

    #[tokio::test(start_paused = true)]
    async fn session_rate_limit() {
        let m = manager();
        for _ in 0..30 {
            m.reserve("a", 1, 1, 1).await.unwrap();
        }
        assert_eq!(m.reserve("a", 1, 1, 1).await.unwrap_err(), ReservationError::RateLimited);
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(m.reserve("a", 1, 1, 1).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn commit_release_cycle() {
        let m = manager();
        m.reserve("a", 1, 1, 2).await.unwrap();
        m.reserve("a", 2, 1, 1).await.unwrap();
        assert_eq!(m.commit("a", "order-1").await, 2);
        let stats = m.stats().await;
        assert_eq!((stats.cart, stats.order, stats.active_orders), (0, 2, 1));
        // Committed reservations outlive the cart TTL
        tokio::time::advance(Duration::from_secs(30 * 60)).await;
        assert_eq!(m.reserved_quantity(1, 1, "").await, 2);
        assert!(matches!(m.reserve("a", 1, 1, 1).await, Err(ReservationError::AlreadyCommitted(_))));
        // The session can keep shopping for other items
        m.reserve("a", 3, 1, 1).await.unwrap();
        assert_eq!(m.release_session("a").await, 1);
        assert_eq!(m.reserved_quantity(1, 1, "").await, 2);
        assert_eq!(m.release("order-1").await, 2);
        assert_eq!(m.release("order-1").await, 0);
        assert_eq!(m.stats().await.total, 0);
        m.assert_consistent().await;
    }

    #[tokio::test(start_paused = true)]
    async fn expired_reservations_stop_counting_and_are_swept() {
        let m = manager();
        m.reserve("a", 1, 1, 2).await.unwrap();
        m.reserve("b", 1, 1, 2).await.unwrap();
        m.commit("b", "order-b").await;
        tokio::time::advance(Duration::from_secs(15 * 60)).await;
        assert_eq!(m.reserved_quantity(1, 1, "").await, 2);
        assert_eq!(m.sweep().await, 1);
        tokio::time::advance(Duration::from_secs(45 * 60)).await;
        assert_eq!(m.sweep().await, 1);
        assert_eq!(m.stats().await.total, 0);
        m.assert_consistent().await;
    }

    #[tokio::test(start_paused = true)]
    async fn expired_key_is_reserved_afresh() {
        let m = manager();
        m.reserve("a", 1, 1, 2).await.unwrap();
        for _ in 0..3 {
            m.reserve("a", 1, 1, 2).await.unwrap();
        }
        tokio::time::advance(Duration::from_secs(16 * 60)).await;
        let r = m.reserve("a", 1, 1, 1).await.unwrap();
        assert_eq!(r.refresh_count, 0);
        assert_eq!(r.expires_at, Instant::now() + Duration::from_secs(15 * 60));
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_stops() {
        let m = manager();
        let handle = m.start_sweeper();
        m.reserve("a", 1, 1, 1).await.unwrap();
        tokio::time::sleep(Duration::from_secs(16 * 60)).await;
        assert_eq!(m.stats().await.total, 0);
        m.stop();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn random_operations_keep_indexes_consistent() {
        let config = ReservationConfig {
            limits: ReservationLimits { reserve_rate_per_session: 10_000, ..Default::default() },
            ..Default::default()
        };
        let m = ReservationManager::new(config);
        let mut rng = StdRng::seed_from_u64(42);
        let sessions = ["s1", "s2", "s3", "s4"];
        let mut orders = Vec::new();
        for step in 0..2_000 {
            let session = sessions[rng.gen_range(0..sessions.len())];
            match rng.gen_range(0..10) {
                0..=5 => {
                    let _ = m.reserve(session, rng.gen_range(1..6), rng.gen_range(1..4), rng.gen_range(-1..7)).await;
                },
                6 => {
                    let uuid = format!("order-{step}");
                    if m.commit(session, &uuid).await > 0 {
                        orders.push(uuid);
                    }
                },
                7 if !orders.is_empty() => {
                    let uuid = orders.swap_remove(rng.gen_range(0..orders.len()));
                    m.release(&uuid).await;
                },
                8 => {
                    m.release_session(session).await;
                    let index = m.index.read().await;
                    let leftover = index
                        .reservations
                        .values()
                        .filter(|r| r.session_id == session && r.order_uuid.is_none())
                        .count();
                    assert_eq!(leftover, 0);
                },
                _ => {
                    tokio::time::advance(Duration::from_secs(rng.gen_range(0..120))).await;
                    if rng.gen_bool(0.2) {
                        m.sweep().await;
                    }
                },
            }
            m.assert_consistent().await;
            for pid in 1..6 {
                for sid in 1..4 {
                    assert!(m.available_stock(3, pid, sid, session).await >= 0);
                }
            }
        }
    }
}
