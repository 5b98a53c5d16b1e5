use std::collections::HashMap;

use crate::mpc::{Branch, Bus, Gen};

/// Record of the conversion between external and internal numbering.
///
/// Produced by `ext_to_int` and consumed by `int_to_ext`. The external
/// data is saved so that out-of-service elements can be restored as they
/// were.
#[derive(Clone, Debug)]
pub struct Order {
    pub(crate) external: Saved,
    pub bus: BusOrder,
    pub gen: Status,
    pub branch: Status,
}

#[derive(Clone, Debug)]
pub(crate) struct Saved {
    pub(crate) bus: Vec<Bus>,
    pub(crate) gen: Vec<Gen>,
    pub(crate) branch: Vec<Branch>,
}

/// Positions of in-service (`on`) and out-of-service (`off`) elements
/// in the external data.
#[derive(Clone, Debug, Default)]
pub struct Status {
    pub on: Vec<usize>,
    pub off: Vec<usize>,
}

impl Status {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            on: Vec::with_capacity(capacity),
            off: Vec::default(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct BusOrder {
    pub index: BusIndex,
    pub status: Status,
}

/// Bijective map between external bus numbers and internal indexes.
#[derive(Clone, Debug, Default)]
pub struct BusIndex {
    e2i: HashMap<usize, usize>,
    i2e: Vec<usize>,
}

impl BusIndex {
    pub(crate) fn with_capacity(nb: usize) -> Self {
        Self {
            e2i: HashMap::with_capacity(nb),
            i2e: Vec::with_capacity(nb),
        }
    }

    /// Appends external bus number `e`, returning its internal index or
    /// `None` if it is already present.
    pub(crate) fn push(&mut self, e: usize) -> Option<usize> {
        if self.e2i.contains_key(&e) {
            return None;
        }
        let i = self.i2e.len();
        self.e2i.insert(e, i);
        self.i2e.push(e);
        Some(i)
    }

    pub fn to_internal(&self, e: usize) -> Option<usize> {
        self.e2i.get(&e).copied()
    }

    pub fn to_external(&self, i: usize) -> Option<usize> {
        self.i2e.get(i).copied()
    }

    pub fn len(&self) -> usize {
        self.i2e.len()
    }

    pub fn is_empty(&self) -> bool {
        self.i2e.is_empty()
    }
}

impl Order {
    pub(crate) fn new(bus: &[Bus], gen: &[Gen], branch: &[Branch]) -> Self {
        Self {
            external: Saved {
                bus: bus.to_vec(),
                gen: gen.to_vec(),
                branch: branch.to_vec(),
            },
            bus: BusOrder {
                index: BusIndex::with_capacity(bus.len()),
                status: Status::with_capacity(bus.len()),
            },
            gen: Status::with_capacity(gen.len()),
            branch: Status::with_capacity(branch.len()),
        }
    }
}
