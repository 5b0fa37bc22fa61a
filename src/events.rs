//! Outbound grid notifications and the session-owned event bus.

use crate::geometry::GridCoord;
use crate::tile::TileId;
use std::fmt;

/// Unique (per session) grid identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridId(pub u32);

impl fmt::Display for GridId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "grid {}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeReason {
    Added,
    Matched,
    Dropped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GridEvent {
    PairActivated {
        grid: GridId,
        root: TileId,
        child: TileId,
    },
    TileArrivedAtCell {
        grid: GridId,
        coord: GridCoord,
        tile: TileId,
    },
    TilesChanged {
        grid: GridId,
        coords: Vec<GridCoord>,
        reason: ChangeReason,
    },
    TileVisualChanged {
        grid: GridId,
        tile: TileId,
    },
    ScoreDelta {
        grid: GridId,
        matched: usize,
        points: u32,
    },
    GridGameOver {
        grid: GridId,
    },
}

impl GridEvent {
    pub const fn grid(&self) -> GridId {
        match self {
            Self::PairActivated { grid, .. }
            | Self::TileArrivedAtCell { grid, .. }
            | Self::TilesChanged { grid, .. }
            | Self::TileVisualChanged { grid, .. }
            | Self::ScoreDelta { grid, .. }
            | Self::GridGameOver { grid } => *grid,
        }
    }
}

/// Which grids a subscriber hears about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridFilter {
    All,
    Only(GridId),
}

impl GridFilter {
    pub fn accepts(self, grid: GridId) -> bool {
        match self {
            Self::All => true,
            Self::Only(id) => id == grid,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

struct Subscriber {
    id: SubscriptionId,
    filter: GridFilter,
    handler: Box<dyn FnMut(&GridEvent)>,
}

/// Typed fan-out of grid events. Delivery order is subscription order.
#[derive(Default)]
pub struct EventBus {
    subscribers: Vec<Subscriber>,
    next_id: u64,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(
        &mut self,
        filter: GridFilter,
        handler: impl FnMut(&GridEvent) + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscribers.push(Subscriber {
            id,
            filter,
            handler: Box::new(handler),
        });
        id
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| s.id != id);
        self.subscribers.len() != before
    }

    pub fn publish(&mut self, event: &GridEvent) {
        let grid = event.grid();
        for sub in &mut self.subscribers {
            if sub.filter.accepts(grid) {
                (sub.handler)(event);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn filters_by_grid_and_unsubscribes() {
        let mut bus = EventBus::new();
        let all = Rc::new(RefCell::new(Vec::new()));
        let only_one = Rc::new(RefCell::new(Vec::new()));
        let a = Rc::clone(&all);
        let all_id = bus.subscribe(GridFilter::All, move |e| a.borrow_mut().push(e.grid()));
        let o = Rc::clone(&only_one);
        bus.subscribe(GridFilter::Only(GridId(1)), move |e| o.borrow_mut().push(e.grid()));

        bus.publish(&GridEvent::GridGameOver { grid: GridId(0) });
        bus.publish(&GridEvent::GridGameOver { grid: GridId(1) });
        assert_eq!(*all.borrow(), vec![GridId(0), GridId(1)]);
        assert_eq!(*only_one.borrow(), vec![GridId(1)]);

        assert!(bus.unsubscribe(all_id));
        assert!(!bus.unsubscribe(all_id));
        bus.publish(&GridEvent::GridGameOver { grid: GridId(1) });
        assert_eq!(all.borrow().len(), 2);
        assert_eq!(only_one.borrow().len(), 2);
        assert_eq!(bus.len(), 1);
    }
}
