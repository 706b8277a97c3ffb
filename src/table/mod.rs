mod iterators;
mod query;

use std::net::IpAddr;

use inetnum::addr::Prefix;
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::stats::Counters;
use crate::trie::Node;
use crate::types::af::{AddressFamily, IPv4, IPv6};
use crate::types::errors::PrefixStoreError;
use crate::types::PrefixId;

//------------ Table ---------------------------------------------------------

/// A table of IP prefixes with associated values of type `V`, with
/// longest-prefix-match lookups.
///
/// One table holds IPv4 and IPv6 prefixes side by side, each family in its
/// own trie. Values are stored by value; mutating operations require
/// `V: Clone` because structure shared with clones or persistent snapshots
/// of the table is copied on write. Cheap-to-clone value types (ids,
/// `Arc`'d payloads) are the intended use.
///
/// The table is single-writer: `&mut self` methods assume exclusive
/// access, `&self` methods never mutate. A [`clone`](Clone::clone) or any
/// `*_persist` method produces an independent table that shares untouched
/// structure with the original, so snapshots are cheap and both sides can
/// be read concurrently.
#[derive(Clone, Debug)]
pub struct Table<V> {
    root4: Node<IPv4, V>,
    root6: Node<IPv6, V>,
    counters: Counters,
}

impl<V> Table<V> {
    pub fn new() -> Self {
        Table {
            root4: Node::new(),
            root6: Node::new(),
            counters: Counters::new(),
        }
    }

    /// The total number of prefixes in the table.
    pub fn size(&self) -> usize {
        self.size4() + self.size6()
    }

    /// The number of IPv4 prefixes in the table.
    pub fn size4(&self) -> usize {
        self.counters.v4_count()
    }

    /// The number of IPv6 prefixes in the table.
    pub fn size6(&self) -> usize {
        self.counters.v6_count()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// The number of IPv4 prefixes of exactly length `len`.
    pub fn size4_for_len(&self, len: u8) -> Result<usize, PrefixStoreError> {
        self.counters.v4_count_for_len(len)
    }

    /// The number of IPv6 prefixes of exactly length `len`.
    pub fn size6_for_len(&self, len: u8) -> Result<usize, PrefixStoreError> {
        self.counters.v6_count_for_len(len)
    }

    /// The number of interior trie nodes currently allocated. Compressed
    /// single-route children are not nodes, so this is a measure of how
    /// much structure the stored prefixes force into existence.
    pub fn nodes_count(&self) -> usize {
        self.root4.node_count() + self.root6.node_count()
    }

    /// The value stored for exactly this prefix, if any.
    pub fn get(&self, pfx: &Prefix) -> Option<&V> {
        match pfx.addr() {
            IpAddr::V4(addr) => self
                .root4
                .get_at(PrefixId::new(IPv4::from_ipaddr(addr), pfx.len()), 0),
            IpAddr::V6(addr) => self
                .root6
                .get_at(PrefixId::new(IPv6::from_ipaddr(addr), pfx.len()), 0),
        }
    }

    /// Exact-prefix retrieval; an alias for [`get`](Self::get) that exists
    /// next to [`lookup_prefix_lpm`](Self::lookup_prefix_lpm) for surface
    /// symmetry.
    pub fn lookup_prefix(&self, pfx: &Prefix) -> Option<&V> {
        self.get(pfx)
    }
}

impl<V: Clone> Table<V> {
    /// Insert a prefix with a value. Returns the previous value if the
    /// prefix was already present (in which case the size is unchanged).
    ///
    /// Host bits beyond the prefix length are masked off on entry; the
    /// canonical form is what is stored and later returned by lookups.
    pub fn insert(&mut self, pfx: &Prefix, value: V) -> Option<V> {
        match pfx.addr() {
            IpAddr::V4(addr) => {
                let id = PrefixId::new(IPv4::from_ipaddr(addr), pfx.len());
                let old = self.root4.insert_at(id, value, 0);
                if old.is_none() {
                    self.counters.inc_v4(pfx.len());
                }
                old
            }
            IpAddr::V6(addr) => {
                let id = PrefixId::new(IPv6::from_ipaddr(addr), pfx.len());
                let old = self.root6.insert_at(id, value, 0);
                if old.is_none() {
                    self.counters.inc_v6(pfx.len());
                }
                old
            }
        }
    }

    /// Insert or modify the value for a prefix with the supplied closure,
    /// which receives the current value if one is stored. Returns the new
    /// value.
    pub fn update<F>(&mut self, pfx: &Prefix, f: F) -> V
    where
        F: FnOnce(Option<V>) -> V,
    {
        match pfx.addr() {
            IpAddr::V4(addr) => {
                let id = PrefixId::new(IPv4::from_ipaddr(addr), pfx.len());
                let (value, existed) = self.root4.update_at(id, f, 0);
                if !existed {
                    self.counters.inc_v4(pfx.len());
                }
                value
            }
            IpAddr::V6(addr) => {
                let id = PrefixId::new(IPv6::from_ipaddr(addr), pfx.len());
                let (value, existed) = self.root6.update_at(id, f, 0);
                if !existed {
                    self.counters.inc_v6(pfx.len());
                }
                value
            }
        }
    }

    /// Remove a prefix from the table, returning its value. Removing a
    /// prefix that is not present is not an error and changes nothing.
    pub fn delete(&mut self, pfx: &Prefix) -> Option<V> {
        match pfx.addr() {
            IpAddr::V4(addr) => {
                let id = PrefixId::new(IPv4::from_ipaddr(addr), pfx.len());
                let old = self.root4.delete_at(id, 0);
                if old.is_some() {
                    self.counters.dec_v4(pfx.len());
                }
                old
            }
            IpAddr::V6(addr) => {
                let id = PrefixId::new(IPv6::from_ipaddr(addr), pfx.len());
                let old = self.root6.delete_at(id, 0);
                if old.is_some() {
                    self.counters.dec_v6(pfx.len());
                }
                old
            }
        }
    }

    /// Like [`insert`](Self::insert), but leaves `self` untouched and
    /// returns the modified table instead. The two tables share all
    /// structure that the insert did not touch.
    pub fn insert_persist(&self, pfx: &Prefix, value: V) -> Self {
        let mut new = self.clone();
        new.insert(pfx, value);
        new
    }

    /// Persistent variant of [`update`](Self::update).
    pub fn update_persist<F>(&self, pfx: &Prefix, f: F) -> Self
    where
        F: FnOnce(Option<V>) -> V,
    {
        let mut new = self.clone();
        new.update(pfx, f);
        new
    }

    /// Persistent variant of [`delete`](Self::delete).
    pub fn delete_persist(&self, pfx: &Prefix) -> Self {
        let mut new = self.clone();
        new.delete(pfx);
        new
    }

    /// Insert all prefixes of `other` into this table. On a conflict the
    /// value from `other` wins; use [`union_with`](Self::union_with) to
    /// pick a different policy.
    pub fn union(&mut self, other: &Table<V>) {
        self.union_with(other, |_ours, theirs| theirs.clone());
    }

    /// Insert all prefixes of `other` into this table, resolving
    /// conflicting values with the supplied closure. The closure receives
    /// this table's value first and `other`'s second.
    pub fn union_with<F>(&mut self, other: &Table<V>, mut resolve: F)
    where
        F: FnMut(&V, &V) -> V,
    {
        for (pfx, theirs) in other.all() {
            let merged = match self.get(&pfx) {
                Some(ours) => resolve(ours, theirs),
                None => theirs.clone(),
            };
            self.insert(&pfx, merged);
        }
    }
}

impl<V> Default for Table<V> {
    fn default() -> Self {
        Self::new()
    }
}

//------------ Serialization -------------------------------------------------

// A table serializes as a sequence of (address, length, value) entries,
// which keeps the wire shape independent of the trie internals.

impl<V: Serialize> Serialize for Table<V> {
    fn serialize<S: Serializer>(
        &self,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.size()))?;
        for (pfx, value) in self.all() {
            seq.serialize_element(&(pfx.addr(), pfx.len(), value))?;
        }
        seq.end()
    }
}

impl<'de, V: Deserialize<'de> + Clone> Deserialize<'de> for Table<V> {
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Self, D::Error> {
        let entries: Vec<(IpAddr, u8, V)> = Vec::deserialize(deserializer)?;
        let mut table = Table::new();
        for (addr, len, value) in entries {
            let pfx = Prefix::new_relaxed(addr, len)
                .map_err(serde::de::Error::custom)?;
            table.insert(&pfx, value);
        }
        Ok(table)
    }
}
