//! Load-balancing policies: pick-first, round-robin and weighted selection
//! over a shared address list.

use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LbPolicyKind {
    PickFirst,
    RoundRobin,
    Weighted,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LbAddress {
    pub target: String,
    pub weight: u32,
    pub available: bool,
}

struct LbInner {
    addresses: Vec<LbAddress>,
    cursor: usize,
    rng: StdRng,
}

pub struct LbPolicy {
    kind: LbPolicyKind,
    inner: Mutex<LbInner>,
}

impl LbPolicy {
    pub fn new(kind: LbPolicyKind) -> LbPolicy {
        LbPolicy {
            kind,
            inner: Mutex::new(LbInner {
                addresses: Vec::new(),
                cursor: 0,
                // Seeded once per policy instance.
                rng: StdRng::from_entropy(),
            }),
        }
    }

    pub fn kind(&self) -> LbPolicyKind {
        self.kind
    }

    /// Append an address. Weights below 1 are clamped to 1; new addresses
    /// start available.
    pub fn add_address(&self, target: &str, weight: u32) {
        let mut inner = self.inner.lock().unwrap();
        inner.addresses.push(LbAddress {
            target: target.to_string(),
            weight: weight.max(1),
            available: true,
        });
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pick the next target per the policy, or `None` when no address is
    /// available.
    pub fn pick(&self) -> Option<String> {
        let mut inner = self.inner.lock().unwrap();
        if inner.addresses.is_empty() {
            return None;
        }
        match self.kind {
            LbPolicyKind::PickFirst => inner
                .addresses
                .iter()
                .find(|a| a.available)
                .map(|a| a.target.clone()),
            LbPolicyKind::RoundRobin => {
                let count = inner.addresses.len();
                let start = inner.cursor;
                for offset in 0..count {
                    let index = (start + offset) % count;
                    if inner.addresses[index].available {
                        inner.cursor = (index + 1) % count;
                        return Some(inner.addresses[index].target.clone());
                    }
                }
                None
            }
            LbPolicyKind::Weighted => {
                let total: u32 = inner
                    .addresses
                    .iter()
                    .filter(|a| a.available)
                    .map(|a| a.weight)
                    .sum();
                if total == 0 {
                    return None;
                }
                let draw = inner.rng.gen_range(0..total);
                let mut accumulated = 0;
                for address in inner.addresses.iter().filter(|a| a.available) {
                    accumulated += address.weight;
                    if accumulated > draw {
                        return Some(address.target.clone());
                    }
                }
                None
            }
        }
    }

    /// Flip the availability flag on the matching entry. Returns false when
    /// no entry matches.
    pub fn mark_unavailable(&self, target: &str) -> bool {
        self.set_available(target, false)
    }

    pub fn mark_available(&self, target: &str) -> bool {
        self.set_available(target, true)
    }

    fn set_available(&self, target: &str, available: bool) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.addresses.iter_mut().find(|a| a.target == target) {
            Some(address) => {
                address.available = available;
                true
            }
            None => false,
        }
    }

    /// Snapshot of the address list.
    pub fn addresses(&self) -> Vec<LbAddress> {
        self.inner.lock().unwrap().addresses.clone()
    }
}
