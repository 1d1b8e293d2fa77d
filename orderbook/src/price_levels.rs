use crate::types::{Order, OrderId, Side};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, VecDeque};

// Structured price levels, FIFO tracking with BTreeMap.
// Side determines which end of the map is the best:
// - Asks: lowest price is best (front of map)
// - Bids: highest price is best (back of map)
pub struct PriceLevels {
    side: Side,
    /// price -> orders resting at that price, in arrival order
    levels: BTreeMap<Decimal, VecDeque<Order>>,
}

impl PriceLevels {
    pub fn new(side: Side) -> Self {
        Self {
            side,
            levels: BTreeMap::new(),
        }
    }

    /// Appends an order to the back of its price level's queue, creating the
    /// level if needed. Used for fresh resting orders.
    pub fn push(&mut self, order: Order) {
        self.levels.entry(order.price_key()).or_default().push_back(order);
    }

    /// Re-inserts a partially-filled maker at the front of its level's queue
    /// so it keeps its time priority over orders that arrived later.
    pub fn push_front(&mut self, order: Order) {
        self.levels.entry(order.price_key()).or_default().push_front(order);
    }

    pub fn get_price_levels(&self) -> &BTreeMap<Decimal, VecDeque<Order>> {
        &self.levels
    }

    /// Best price for this side, or `None` if the side is empty.
    pub fn best_price(&self) -> Option<Decimal> {
        match self.side {
            Side::Sell => self.levels.first_key_value().map(|(px, _)| *px),
            Side::Buy => self.levels.last_key_value().map(|(px, _)| *px),
        }
    }

    /// Removes and returns the head order at the best price level, cleaning
    /// up the level if it becomes empty.
    pub fn pop_best(&mut self) -> Option<Order> {
        let px = self.best_price()?;
        let q = self.levels.get_mut(&px)?;
        let order = q.pop_front();
        if q.is_empty() {
            self.levels.remove(&px);
        }
        order
    }

    /// Removes a specific order from a known price level, preserving the
    /// relative order of the remaining orders at that level. No-op (returns
    /// `None`) if the order isn't there.
    pub fn remove(&mut self, id: OrderId, price: Decimal) -> Option<Order> {
        let q = self.levels.get_mut(&price)?;
        let pos = q.iter().position(|o| o.id == id)?;
        let removed = q.remove(pos);
        if q.is_empty() {
            self.levels.remove(&price);
        }
        removed
    }

    /// Iterates levels in priority order (best first), yielding `(price,
    /// total remaining quantity, order count)` per level. Used for snapshots
    /// and market depth.
    pub fn levels_best_first(&self) -> Box<dyn Iterator<Item = (Decimal, Decimal, usize)> + '_> {
        let agg = |(&px, q): (&Decimal, &VecDeque<Order>)| {
            let qty = q.iter().map(|o| o.remaining_quantity).sum();
            (px, qty, q.len())
        };
        match self.side {
            Side::Sell => Box::new(self.levels.iter().map(agg)),
            Side::Buy => Box::new(self.levels.iter().rev().map(agg)),
        }
    }

    pub fn total_len(&self) -> usize {
        self.levels.values().map(|q| q.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

impl Order {
    /// Market orders have no price; they never rest, so this is only called
    /// on orders already known to be resting-eligible (Limit).
    fn price_key(&self) -> Decimal {
        self.price.expect("price_key called on an order without a price")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OrderType;
    use chrono::Utc;

    fn order(side: Side, price: i64, qty: i64) -> Order {
        Order::new(
            "NVDA",
            side,
            OrderType::Limit,
            Decimal::from(qty),
            Some(Decimal::from(price)),
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn push_keeps_fifo_at_one_level() {
        let mut levels = PriceLevels::new(Side::Buy);
        let o1 = order(Side::Buy, 10100, 10);
        let o2 = order(Side::Buy, 10100, 20);
        let o3 = order(Side::Buy, 10100, 30);
        let ids = [o1.id, o2.id, o3.id];

        levels.push(o1);
        levels.push(o2);
        levels.push(o3);

        let q = levels.levels.get(&Decimal::from(10100)).expect("level exists");
        let got: Vec<OrderId> = q.iter().map(|o| o.id).collect();
        assert_eq!(got, ids, "FIFO must be preserved at a single price");
    }

    #[test]
    fn best_price_picks_correct_end_per_side() {
        let mut bids = PriceLevels::new(Side::Buy);
        bids.push(order(Side::Buy, 100, 1));
        bids.push(order(Side::Buy, 105, 1));
        assert_eq!(bids.best_price(), Some(Decimal::from(105)));

        let mut asks = PriceLevels::new(Side::Sell);
        asks.push(order(Side::Sell, 100, 1));
        asks.push(order(Side::Sell, 95, 1));
        assert_eq!(asks.best_price(), Some(Decimal::from(95)));
    }

    #[test]
    fn pop_best_removes_fifo_and_cleans_empty_levels() {
        let mut asks = PriceLevels::new(Side::Sell);
        let o1 = order(Side::Sell, 100, 10);
        let o2 = order(Side::Sell, 100, 20);
        let o3 = order(Side::Sell, 101, 30);
        let (id1, id2) = (o1.id, o2.id);
        asks.push(o1);
        asks.push(o2);
        asks.push(o3);

        let popped = asks.pop_best().unwrap();
        assert_eq!(popped.id, id1);
        assert_eq!(asks.best_price(), Some(Decimal::from(100)));

        let popped = asks.pop_best().unwrap();
        assert_eq!(popped.id, id2);
        assert_eq!(asks.best_price(), Some(Decimal::from(101)));
    }

    #[test]
    fn remove_preserves_order_of_remaining_entries() {
        let mut bids = PriceLevels::new(Side::Buy);
        let o1 = order(Side::Buy, 100, 10);
        let o2 = order(Side::Buy, 100, 20);
        let o3 = order(Side::Buy, 100, 30);
        let (id1, id2, id3) = (o1.id, o2.id, o3.id);
        bids.push(o1);
        bids.push(o2);
        bids.push(o3);

        let removed = bids.remove(id2, Decimal::from(100));
        assert!(removed.is_some());

        let first = bids.pop_best().unwrap();
        assert_eq!(first.id, id1);
        let second = bids.pop_best().unwrap();
        assert_eq!(second.id, id3);
        assert!(bids.pop_best().is_none());
    }

    #[test]
    fn remove_missing_order_is_noop() {
        let mut asks = PriceLevels::new(Side::Sell);
        assert!(asks.remove(OrderId::new(), Decimal::from(100)).is_none());
    }
}
