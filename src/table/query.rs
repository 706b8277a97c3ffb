use std::net::IpAddr;

use inetnum::addr::Prefix;

use crate::table::Table;
use crate::trie::base_index::{
    host_idx, host_range, idx_to_pfx, is_fringe, max_depth_last_bits,
    pfx_to_idx, IDX_SUBTREE,
};
use crate::trie::bitset256::BitSet256;
use crate::trie::{Child, Node};
use crate::types::af::{AddressFamily, IPv4, IPv6};
use crate::types::match_options::{MatchOptions, MatchType, QueryResult};
use crate::types::PrefixId;

//------------ Address queries -----------------------------------------------

impl<V> Table<V> {
    /// True if any stored prefix covers the address. This is the cheapest
    /// query on the table: one bitset intersection per stride, and an
    /// early return on the first hit.
    pub fn contains(&self, addr: IpAddr) -> bool {
        match addr {
            IpAddr::V4(addr) => {
                contains_in(&self.root4, IPv4::from_ipaddr(addr))
            }
            IpAddr::V6(addr) => {
                contains_in(&self.root6, IPv6::from_ipaddr(addr))
            }
        }
    }

    /// The longest stored prefix covering the address, with its value.
    pub fn lookup(&self, addr: IpAddr) -> Option<(Prefix, &V)> {
        match addr {
            IpAddr::V4(addr) => {
                lookup_in(&self.root4, IPv4::from_ipaddr(addr))
            }
            IpAddr::V6(addr) => {
                lookup_in(&self.root6, IPv6::from_ipaddr(addr))
            }
        }
    }

    /// The longest stored prefix covering (or equal to) the given prefix,
    /// with its value.
    pub fn lookup_prefix_lpm(&self, pfx: &Prefix) -> Option<(Prefix, &V)> {
        match pfx.addr() {
            IpAddr::V4(addr) => lookup_prefix_in(
                &self.root4,
                PrefixId::new(IPv4::from_ipaddr(addr), pfx.len()),
            ),
            IpAddr::V6(addr) => lookup_prefix_in(
                &self.root6,
                PrefixId::new(IPv6::from_ipaddr(addr), pfx.len()),
            ),
        }
    }

    /// True if any stored prefix equals, covers, or is covered by the
    /// given prefix.
    pub fn overlaps_prefix(&self, pfx: &Prefix) -> bool {
        match pfx.addr() {
            IpAddr::V4(addr) => self.root4.overlaps_prefix_at(
                PrefixId::new(IPv4::from_ipaddr(addr), pfx.len()),
                0,
            ),
            IpAddr::V6(addr) => self.root6.overlaps_prefix_at(
                PrefixId::new(IPv6::from_ipaddr(addr), pfx.len()),
                0,
            ),
        }
    }

    /// True if any prefix in this table overlaps any prefix in `other`,
    /// in either direction. Symmetric.
    pub fn overlaps(&self, other: &Table<V>) -> bool {
        overlaps_node(&self.root4, &other.root4, 0)
            || overlaps_node(&self.root6, &other.root6, 0)
    }
}

impl<V: Clone> Table<V> {
    /// Run a prefix query with the given options, optionally collecting
    /// the less- and more-specific prefixes of the requested one.
    pub fn match_prefix(
        &self,
        pfx: &Prefix,
        options: &MatchOptions,
    ) -> QueryResult<V> {
        let (prefix, value) = match options.match_type {
            MatchType::ExactMatch => match self.get(pfx) {
                Some(value) => (Some(*pfx), Some(value.clone())),
                None => (None, None),
            },
            MatchType::LongestMatch => match self.lookup_prefix_lpm(pfx) {
                Some((prefix, value)) => {
                    (Some(prefix), Some(value.clone()))
                }
                None => (None, None),
            },
            MatchType::EmptyMatch => (None, None),
        };
        let less_specifics = if options.include_less_specifics {
            self.supernets(pfx)
                .filter(|(p, _)| p != pfx)
                .map(|(p, v)| (p, v.clone()))
                .collect()
        } else {
            Vec::new()
        };
        let more_specifics = if options.include_more_specifics {
            self.subnets(pfx)
                .filter(|(p, _)| p != pfx)
                .map(|(p, v)| (p, v.clone()))
                .collect()
        } else {
            Vec::new()
        };
        QueryResult {
            prefix,
            value,
            less_specifics,
            more_specifics,
        }
    }
}

//------------ Walkers -------------------------------------------------------

fn contains_in<AF: AddressFamily, V>(root: &Node<AF, V>, addr: AF) -> bool {
    let mut node = root;
    for depth in 0..AF::STRIDES {
        let octet = addr.octet(depth);
        if !node.prefixes.is_empty() && node.lpm_test(host_idx(octet)) {
            return true;
        }
        match node.children.get(octet) {
            Some(Child::Node(n)) => node = n,
            Some(Child::Leaf(l)) => return l.prefix.covers_addr(addr),
            // A fringe matches every address that reaches its slot.
            Some(Child::Fringe(_)) => return true,
            None => return false,
        }
    }
    false
}

fn lookup_in<AF: AddressFamily, V>(
    root: &Node<AF, V>,
    addr: AF,
) -> Option<(Prefix, &V)> {
    let mut node = root;
    let mut best: Option<(usize, u8, &V)> = None;
    for depth in 0..AF::STRIDES {
        let octet = addr.octet(depth);
        // Anything found deeper down is longer than anything found so
        // far, so the running best is simply overwritten.
        if let Some((idx, value)) = node.lpm_get(host_idx(octet)) {
            best = Some((depth, idx, value));
        }
        match node.children.get(octet) {
            Some(Child::Node(n)) => node = n,
            Some(Child::Leaf(l)) => {
                if l.prefix.covers_addr(addr) {
                    return Some((l.prefix.into(), &l.value));
                }
                break;
            }
            Some(Child::Fringe(f)) => {
                let prefix =
                    PrefixId::new(addr, 8 * (depth as u8 + 1));
                return Some((prefix.into(), &f.value));
            }
            None => break,
        }
    }
    best.map(|(depth, idx, value)| {
        (reconstruct(addr, depth, idx).into(), value)
    })
}

fn lookup_prefix_in<AF: AddressFamily, V>(
    root: &Node<AF, V>,
    pfx: PrefixId<AF>,
) -> Option<(Prefix, &V)> {
    let (max_depth, last_bits) = max_depth_last_bits(pfx.len());
    let mut node = root;
    let mut best: Option<(usize, u8, &V)> = None;
    let mut depth = 0;
    loop {
        if depth == max_depth {
            // The last stride starts the walk at the prefix's own base
            // index instead of a host position, so an exact match is
            // included.
            let start = if last_bits == 0 {
                1
            } else {
                pfx_to_idx(pfx.octet(depth), last_bits)
            };
            if let Some((idx, value)) = node.lpm_get(start as u16) {
                best = Some((depth, idx, value));
            }
            break;
        }
        let octet = pfx.octet(depth);
        if let Some((idx, value)) = node.lpm_get(host_idx(octet)) {
            best = Some((depth, idx, value));
        }
        match node.children.get(octet) {
            Some(Child::Node(n)) => {
                node = n;
                depth += 1;
            }
            Some(Child::Leaf(l)) => {
                if l.prefix.covers(pfx) {
                    return Some((l.prefix.into(), &l.value));
                }
                break;
            }
            Some(Child::Fringe(f)) => {
                // Above the last stride a fringe always covers pfx.
                let prefix =
                    PrefixId::new(pfx.bits(), 8 * (depth as u8 + 1));
                return Some((prefix.into(), &f.value));
            }
            None => break,
        }
    }
    best.map(|(depth, idx, value)| {
        (reconstruct(pfx.bits(), depth, idx).into(), value)
    })
}

/// The absolute prefix described by an in-node base index hit at `depth`
/// on the walk for `bits`.
fn reconstruct<AF: AddressFamily>(
    bits: AF,
    depth: usize,
    idx: u8,
) -> PrefixId<AF> {
    let (octet, len) = idx_to_pfx(idx);
    PrefixId::new(bits.with_octet(depth, octet), 8 * depth as u8 + len)
}

//------------ Overlap walkers -----------------------------------------------

impl<AF: AddressFamily, V> Node<AF, V> {
    /// True if any prefix under this node equals, covers, or is covered
    /// by `pfx`, whose octets up to `depth` are the path to this node.
    pub(crate) fn overlaps_prefix_at(
        &self,
        pfx: PrefixId<AF>,
        start_depth: usize,
    ) -> bool {
        let (max_depth, last_bits) = max_depth_last_bits(pfx.len());
        let mut node = self;
        let mut depth = start_depth;
        loop {
            if depth == max_depth {
                let idx = if last_bits == 0 {
                    1
                } else {
                    pfx_to_idx(pfx.octet(depth), last_bits)
                };
                // a covering sub-prefix, a covered sub-prefix, or any
                // child inside pfx's octet span
                if node.lpm_test(idx as u16) {
                    return true;
                }
                if node
                    .prefixes
                    .bitset()
                    .intersects(&IDX_SUBTREE[idx as usize])
                {
                    return true;
                }
                let (lo, hi) = host_range(idx);
                return node
                    .children
                    .bitset()
                    .intersects(&BitSet256::range_mask(lo, hi));
            }
            let octet = pfx.octet(depth);
            if !node.prefixes.is_empty() && node.lpm_test(host_idx(octet)) {
                return true;
            }
            if is_fringe(depth, pfx.len()) {
                // pfx ends on the child boundary: any route in its slot
                // either equals it or sits below it.
                return node.children.is_set(octet);
            }
            match node.children.get(octet) {
                Some(Child::Node(n)) => {
                    node = n;
                    depth += 1;
                }
                Some(Child::Leaf(l)) => {
                    return l.prefix.covers(pfx) || pfx.covers(l.prefix)
                }
                Some(Child::Fringe(_)) => return true,
                None => return false,
            }
        }
    }
}

fn overlaps_node<AF: AddressFamily, V>(
    a: &Node<AF, V>,
    b: &Node<AF, V>,
    depth: usize,
) -> bool {
    if overlaps_routes(a, b) {
        return true;
    }
    // one side's routes against the other side's child subtrees
    if !a.prefixes.is_empty() {
        for (octet, _) in b.children.iter() {
            if a.lpm_test(host_idx(octet)) {
                return true;
            }
        }
    }
    if !b.prefixes.is_empty() {
        for (octet, _) in a.children.iter() {
            if b.lpm_test(host_idx(octet)) {
                return true;
            }
        }
    }
    // children occupying the same slot
    let common = a.children.bitset().and(b.children.bitset());
    for octet in common.iter() {
        if overlaps_children(
            a.children.must_get(octet),
            b.children.must_get(octet),
            depth,
        ) {
            return true;
        }
    }
    false
}

// Sub-prefix sets overlap iff one side holds an ancestor-or-equal of a
// sub-prefix that the other side holds. Checking both directions against
// the precomputed ancestor closures covers equality, covering and covered
// in O(popcount) intersections.
fn overlaps_routes<AF: AddressFamily, V>(
    a: &Node<AF, V>,
    b: &Node<AF, V>,
) -> bool {
    if a.prefixes.is_empty() || b.prefixes.is_empty() {
        return false;
    }
    for (idx, _) in a.prefixes.iter() {
        if b.lpm_test(idx as u16) {
            return true;
        }
    }
    for (idx, _) in b.prefixes.iter() {
        if a.lpm_test(idx as u16) {
            return true;
        }
    }
    false
}

fn overlaps_children<AF: AddressFamily, V>(
    x: &Child<AF, V>,
    y: &Child<AF, V>,
    depth: usize,
) -> bool {
    match (x, y) {
        (Child::Node(m), Child::Node(n)) => {
            overlaps_node(m, n, depth + 1)
        }
        (Child::Node(n), Child::Leaf(l))
        | (Child::Leaf(l), Child::Node(n)) => {
            n.overlaps_prefix_at(l.prefix, depth + 1)
        }
        (Child::Leaf(a), Child::Leaf(b)) => {
            a.prefix.covers(b.prefix) || b.prefix.covers(a.prefix)
        }
        // A fringe covers its whole slot, and whatever shares the slot
        // with it sits below its one-past boundary.
        (Child::Fringe(_), _) | (_, Child::Fringe(_)) => true,
    }
}
