use std::net::IpAddr;

use inetnum::addr::Prefix;

use crate::table::Table;
use crate::trie::base_index::{
    host_idx, host_range, idx_to_pfx, is_fringe, max_depth_last_bits,
    pfx_to_idx, IDX_SUBTREE, LPM_TABLE,
};
use crate::trie::bitset256::{BitSet256, BitSet256Iter};
use crate::trie::{Child, Node};
use crate::types::af::{AddressFamily, IPv4, IPv6};
use crate::types::PrefixId;

//------------ Iteration -----------------------------------------------------

impl<V> Table<V> {
    /// Iterate over all prefixes in the table and their values, IPv4
    /// first. No particular order within a family is guaranteed.
    pub fn all(&self) -> impl Iterator<Item = (Prefix, &V)> + '_ {
        self.all4().chain(self.all6())
    }

    /// Iterate over all IPv4 prefixes and their values.
    pub fn all4(&self) -> impl Iterator<Item = (Prefix, &V)> + '_ {
        PrefixIter::over(&self.root4)
    }

    /// Iterate over all IPv6 prefixes and their values.
    pub fn all6(&self) -> impl Iterator<Item = (Prefix, &V)> + '_ {
        PrefixIter::over(&self.root6)
    }

    /// Iterate over all stored prefixes that cover the given prefix,
    /// including the prefix itself if it is stored. Shortest first.
    pub fn supernets(
        &self,
        pfx: &Prefix,
    ) -> impl Iterator<Item = (Prefix, &V)> + '_ {
        match pfx.addr() {
            IpAddr::V4(addr) => supernets_in(
                &self.root4,
                PrefixId::new(IPv4::from_ipaddr(addr), pfx.len()),
            ),
            IpAddr::V6(addr) => supernets_in(
                &self.root6,
                PrefixId::new(IPv6::from_ipaddr(addr), pfx.len()),
            ),
        }
        .into_iter()
    }

    /// Iterate over all stored prefixes covered by the given prefix,
    /// including the prefix itself if it is stored.
    pub fn subnets(
        &self,
        pfx: &Prefix,
    ) -> impl Iterator<Item = (Prefix, &V)> + '_ {
        match pfx.addr() {
            IpAddr::V4(addr) => subnets_in(
                &self.root4,
                PrefixId::new(IPv4::from_ipaddr(addr), pfx.len()),
            ),
            IpAddr::V6(addr) => subnets_in(
                &self.root6,
                PrefixId::new(IPv6::from_ipaddr(addr), pfx.len()),
            ),
        }
        .into_iter()
    }
}

//------------ PrefixIter ----------------------------------------------------

// Depth-first walk over one family's trie. A frame per node on the current
// path holds cursors over the node's two bitsets; prefixes are
// reconstructed from the path octets and the bit position, so nothing in
// the trie needs to know its own name.

struct Frame<'a, AF: AddressFamily, V> {
    node: &'a Node<AF, V>,
    path: AF,
    depth: usize,
    prefixes: BitSet256Iter,
    children: BitSet256Iter,
}

impl<'a, AF: AddressFamily, V> Frame<'a, AF, V> {
    fn new(node: &'a Node<AF, V>, path: AF, depth: usize) -> Self {
        Frame {
            node,
            path,
            depth,
            prefixes: node.prefixes.bitset().iter(),
            children: node.children.bitset().iter(),
        }
    }
}

pub(crate) struct PrefixIter<'a, AF: AddressFamily, V> {
    stack: Vec<Frame<'a, AF, V>>,
}

impl<'a, AF: AddressFamily, V> PrefixIter<'a, AF, V> {
    pub(crate) fn over(root: &'a Node<AF, V>) -> Self {
        Self::from_node(root, AF::zero(), 0)
    }

    /// Walk the subtree under `node`, whose path octets up to `depth` are
    /// those of `path`.
    pub(crate) fn from_node(
        node: &'a Node<AF, V>,
        path: AF,
        depth: usize,
    ) -> Self {
        PrefixIter {
            stack: vec![Frame::new(node, path, depth)],
        }
    }
}

impl<'a, AF: AddressFamily, V> Iterator for PrefixIter<'a, AF, V> {
    type Item = (Prefix, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let frame = self.stack.last_mut()?;
            if let Some(idx) = frame.prefixes.next() {
                let value = frame.node.prefixes.must_get(idx);
                let (octet, len) = idx_to_pfx(idx);
                let prefix = PrefixId::new(
                    frame.path.with_octet(frame.depth, octet),
                    8 * frame.depth as u8 + len,
                );
                return Some((prefix.into(), value));
            }
            let (node, path, depth) = (frame.node, frame.path, frame.depth);
            match frame.children.next() {
                Some(octet) => match node.children.must_get(octet) {
                    Child::Leaf(l) => {
                        return Some((l.prefix.into(), &l.value))
                    }
                    Child::Fringe(f) => {
                        let prefix = PrefixId::new(
                            path.with_octet(depth, octet),
                            8 * (depth as u8 + 1),
                        );
                        return Some((prefix.into(), &f.value));
                    }
                    Child::Node(n) => {
                        self.stack.push(Frame::new(
                            n,
                            path.with_octet(depth, octet),
                            depth + 1,
                        ));
                    }
                },
                None => {
                    self.stack.pop();
                }
            }
        }
    }
}

//------------ Supernet / subnet collection ----------------------------------

fn supernets_in<'a, AF: AddressFamily, V>(
    root: &'a Node<AF, V>,
    pfx: PrefixId<AF>,
) -> Vec<(Prefix, &'a V)> {
    let (max_depth, last_bits) = max_depth_last_bits(pfx.len());
    let mut out = Vec::new();
    let mut node = root;
    let mut depth = 0;
    loop {
        let start: u16 = if depth == max_depth {
            let idx = if last_bits == 0 {
                1
            } else {
                pfx_to_idx(pfx.octet(depth), last_bits)
            };
            idx as u16
        } else {
            host_idx(pfx.octet(depth))
        };
        // every covering sub-prefix at this stride, shortest first
        let covering =
            node.prefixes.bitset().and(&LPM_TABLE[start as usize]);
        for idx in covering.iter() {
            let value = node.prefixes.must_get(idx);
            let (octet, len) = idx_to_pfx(idx);
            let prefix = PrefixId::new(
                pfx.bits().with_octet(depth, octet),
                8 * depth as u8 + len,
            );
            out.push((prefix.into(), value));
        }
        if depth == max_depth {
            break;
        }
        let octet = pfx.octet(depth);
        if is_fringe(depth, pfx.len()) {
            // pfx's own slot: stored either as a fringe or as the root
            // sub-prefix of an expanded node
            match node.children.get(octet) {
                Some(Child::Fringe(f)) => {
                    let prefix =
                        PrefixId::new(pfx.bits(), 8 * (depth as u8 + 1));
                    out.push((prefix.into(), &f.value));
                }
                Some(Child::Node(n)) => {
                    if let Some(value) = n.prefixes.get(1) {
                        let prefix = PrefixId::new(
                            pfx.bits(),
                            8 * (depth as u8 + 1),
                        );
                        out.push((prefix.into(), value));
                    }
                }
                _ => {}
            }
            break;
        }
        match node.children.get(octet) {
            Some(Child::Node(n)) => {
                node = n;
                depth += 1;
            }
            Some(Child::Leaf(l)) => {
                if l.prefix.covers(pfx) {
                    out.push((l.prefix.into(), &l.value));
                }
                break;
            }
            Some(Child::Fringe(f)) => {
                let prefix =
                    PrefixId::new(pfx.bits(), 8 * (depth as u8 + 1));
                out.push((prefix.into(), &f.value));
                break;
            }
            None => break,
        }
    }
    out
}

fn subnets_in<'a, AF: AddressFamily, V>(
    root: &'a Node<AF, V>,
    pfx: PrefixId<AF>,
) -> Vec<(Prefix, &'a V)> {
    let (max_depth, last_bits) = max_depth_last_bits(pfx.len());
    let mut out = Vec::new();
    let mut node = root;
    let mut depth = 0;
    loop {
        if depth == max_depth {
            let idx = if last_bits == 0 {
                1
            } else {
                pfx_to_idx(pfx.octet(depth), last_bits)
            };
            collect_covered(node, idx, pfx, depth, &mut out);
            return out;
        }
        let octet = pfx.octet(depth);
        if is_fringe(depth, pfx.len()) {
            match node.children.get(octet) {
                Some(Child::Fringe(f)) => {
                    let prefix =
                        PrefixId::new(pfx.bits(), 8 * (depth as u8 + 1));
                    out.push((prefix.into(), &f.value));
                }
                Some(Child::Leaf(l)) => {
                    if pfx.covers(l.prefix) {
                        out.push((l.prefix.into(), &l.value));
                    }
                }
                Some(Child::Node(n)) => {
                    // everything under this node is covered by pfx
                    out.extend(PrefixIter::from_node(
                        n,
                        pfx.bits(),
                        depth + 1,
                    ));
                }
                None => {}
            }
            return out;
        }
        match node.children.get(octet) {
            Some(Child::Node(n)) => {
                node = n;
                depth += 1;
            }
            Some(Child::Leaf(l)) => {
                if pfx.covers(l.prefix) {
                    out.push((l.prefix.into(), &l.value));
                }
                return out;
            }
            // a fringe here is shorter than pfx, so not covered by it
            Some(Child::Fringe(_)) => return out,
            None => return out,
        }
    }
}

// The part of `node` covered by the sub-prefix at `idx`: covered in-node
// sub-prefixes, plus every child whose octet falls into idx's span.
fn collect_covered<'a, AF: AddressFamily, V>(
    node: &'a Node<AF, V>,
    idx: u8,
    pfx: PrefixId<AF>,
    depth: usize,
    out: &mut Vec<(Prefix, &'a V)>,
) {
    let covered = node.prefixes.bitset().and(&IDX_SUBTREE[idx as usize]);
    for i in covered.iter() {
        let value = node.prefixes.must_get(i);
        let (octet, len) = idx_to_pfx(i);
        let prefix = PrefixId::new(
            pfx.bits().with_octet(depth, octet),
            8 * depth as u8 + len,
        );
        out.push((prefix.into(), value));
    }
    let (lo, hi) = host_range(idx);
    let span = node
        .children
        .bitset()
        .and(&BitSet256::range_mask(lo, hi));
    for octet in span.iter() {
        let path = pfx.bits().with_octet(depth, octet);
        match node.children.must_get(octet) {
            Child::Leaf(l) => out.push((l.prefix.into(), &l.value)),
            Child::Fringe(f) => {
                let prefix = PrefixId::new(path, 8 * (depth as u8 + 1));
                out.push((prefix.into(), &f.value));
            }
            Child::Node(n) => {
                out.extend(PrefixIter::from_node(n, path, depth + 1));
            }
        }
    }
}
