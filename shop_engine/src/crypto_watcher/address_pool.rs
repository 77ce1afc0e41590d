use std::collections::{BTreeMap, HashMap};

/// A finite pool of receiving addresses. Each address is either free or bound to exactly one order.
#[derive(Debug, Default)]
pub struct AddressPool {
    /// address → order id. `0` marks a free address, a negative id a hold for an order that is not written yet.
    addresses: BTreeMap<String, i64>,
    by_order: HashMap<i64, String>,
}

impl AddressPool {
    pub fn new<S: AsRef<str>>(addresses: &[S]) -> Self {
        let addresses = addresses.iter().map(|a| (a.as_ref().trim().to_string(), 0)).filter(|(a, _)| !a.is_empty());
        Self { addresses: addresses.collect(), by_order: HashMap::new() }
    }

    /// Binds a free address to `order_id`. If the order already holds an address, that address is returned again.
    pub fn acquire(&mut self, order_id: i64) -> Option<String> {
        if let Some(address) = self.by_order.get(&order_id) {
            return Some(address.clone());
        }
        let (address, holder) = self.addresses.iter_mut().find(|(_, holder)| **holder == 0)?;
        *holder = order_id;
        self.by_order.insert(order_id, address.clone());
        Some(address.clone())
    }

    /// Marks `address` as held by `order_id`, as recorded on a persisted payment row. Returns false if the address is
    /// not part of the pool or is held by another order. Any other address the order held is freed.
    pub fn occupy(&mut self, address: &str, order_id: i64) -> bool {
        match self.addresses.get(address) {
            Some(holder) if *holder == 0 || *holder == order_id => {},
            _ => return false,
        }
        if self.address_for(order_id).is_some_and(|held| held != address) {
            self.release(order_id);
        }
        self.addresses.insert(address.to_string(), order_id);
        self.by_order.insert(order_id, address.to_string());
        true
    }

    /// Hands the address held by `from` over to `to`. Any other address `to` held is freed.
    pub fn rebind(&mut self, from: i64, to: i64) -> Option<String> {
        let address = self.release(from)?;
        self.occupy(&address, to).then_some(address)
    }

    /// Frees the address held by `order_id`, if any.
    pub fn release(&mut self, order_id: i64) -> Option<String> {
        let address = self.by_order.remove(&order_id)?;
        if let Some(holder) = self.addresses.get_mut(&address) {
            *holder = 0;
        }
        Some(address)
    }

    pub fn holder(&self, address: &str) -> Option<i64> {
        self.addresses.get(address).copied().filter(|id| *id != 0)
    }

    pub fn address_for(&self, order_id: i64) -> Option<&str> {
        self.by_order.get(&order_id).map(String::as_str)
    }

    pub fn free_count(&self) -> usize {
        self.addresses.values().filter(|id| **id == 0).count()
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}
