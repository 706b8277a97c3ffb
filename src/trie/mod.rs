pub(crate) mod base_index;
pub(crate) mod bitset256;
pub(crate) mod sparse256;

use std::sync::Arc;

use log::trace;

use crate::trie::base_index::{
    is_fringe, max_depth_last_bits, pfx_to_idx, LPM_TABLE,
};
use crate::trie::sparse256::Sparse256;
use crate::types::af::AddressFamily;
use crate::types::PrefixId;

//------------ Node ----------------------------------------------------------

// One stride of the trie. The node holds its own sub-prefixes keyed by base
// index (1..=255, see base_index.rs) and its children keyed by the next
// octet of the address. Both collections are popcount-compressed, so an
// almost-empty node costs almost nothing and a full one degrades into two
// plain arrays.
//
// Children are behind an `Arc` and every structural mutation goes through
// `Arc::make_mut`: as long as a node is not shared this is a plain mutable
// borrow, and the first mutation under a node shared with another table
// copies just that node (its two compressed arrays) while the pointers to
// everything below it are reused. That is the whole persistence protocol;
// there is no separate copy-on-write machinery.
#[derive(Clone, Debug)]
pub(crate) struct Node<AF: AddressFamily, V> {
    pub(crate) prefixes: Sparse256<V>,
    pub(crate) children: Sparse256<Child<AF, V>>,
}

//------------ Child ---------------------------------------------------------

// A child slot holds either a real node, or a single path-compressed
// route. A `Leaf` is a route that still has bits past the next stride
// boundary and carries its full prefix; a `Fringe` is a route that ends
// exactly on the boundary, so its prefix is implied by its position and
// only the value needs storing. Either one is expanded into a `Node` the
// moment a second route wants the same slot.
#[derive(Clone, Debug)]
pub(crate) enum Child<AF: AddressFamily, V> {
    Node(Arc<Node<AF, V>>),
    Leaf(LeafNode<AF, V>),
    Fringe(FringeNode<V>),
}

#[derive(Clone, Debug)]
pub(crate) struct LeafNode<AF: AddressFamily, V> {
    pub(crate) prefix: PrefixId<AF>,
    pub(crate) value: V,
}

#[derive(Clone, Debug)]
pub(crate) struct FringeNode<V> {
    pub(crate) value: V,
}

impl<AF: AddressFamily, V> Node<AF, V> {
    pub(crate) fn new() -> Self {
        Node {
            prefixes: Sparse256::new(),
            children: Sparse256::new(),
        }
    }

    /// True if any sub-prefix in this node covers position `i`.
    pub(crate) fn lpm_test(&self, i: u16) -> bool {
        self.prefixes.bitset().intersects(&LPM_TABLE[i as usize])
    }

    /// The longest sub-prefix in this node covering position `i`, as
    /// (base index, value).
    pub(crate) fn lpm_get(&self, i: u16) -> Option<(u8, &V)> {
        let top = self
            .prefixes
            .bitset()
            .intersection_top(&LPM_TABLE[i as usize])?;
        Some((top, self.prefixes.must_get(top)))
    }

    /// Exact-match retrieval of `pfx`, starting `depth` strides into its
    /// address.
    pub(crate) fn get_at(
        &self,
        pfx: PrefixId<AF>,
        mut depth: usize,
    ) -> Option<&V> {
        let (max_depth, last_bits) = max_depth_last_bits(pfx.len());
        let mut node = self;
        loop {
            if depth == max_depth {
                return node
                    .prefixes
                    .get(pfx_to_idx(pfx.octet(depth), last_bits));
            }
            let octet = pfx.octet(depth);
            if is_fringe(depth, pfx.len()) {
                return match node.children.get(octet) {
                    Some(Child::Fringe(f)) => Some(&f.value),
                    Some(Child::Node(n)) => n.prefixes.get(1),
                    _ => None,
                };
            }
            match node.children.get(octet) {
                Some(Child::Node(n)) => {
                    node = n;
                    depth += 1;
                }
                Some(Child::Leaf(l)) if l.prefix == pfx => {
                    return Some(&l.value)
                }
                _ => return None,
            }
        }
    }

    /// The number of nodes reachable from this one, this one included.
    /// Compressed (leaf and fringe) children are not nodes.
    pub(crate) fn node_count(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(|(_, child)| match child {
                Child::Node(n) => n.node_count(),
                _ => 0,
            })
            .sum::<usize>()
    }
}

impl<AF: AddressFamily, V: Clone> Node<AF, V> {
    /// Insert `pfx` with `value`, starting `depth` strides into its
    /// address. Returns the previous value if the prefix was present.
    pub(crate) fn insert_at(
        &mut self,
        pfx: PrefixId<AF>,
        value: V,
        depth: usize,
    ) -> Option<V> {
        let (max_depth, last_bits) = max_depth_last_bits(pfx.len());

        if depth == max_depth {
            return self
                .prefixes
                .insert(pfx_to_idx(pfx.octet(depth), last_bits), value);
        }

        let octet = pfx.octet(depth);

        if is_fringe(depth, pfx.len()) {
            if !self.children.is_set(octet) {
                self.children
                    .insert(octet, Child::Fringe(FringeNode { value }));
                return None;
            }
            return match self.children.must_get_mut(octet) {
                Child::Node(n) => Arc::make_mut(n).prefixes.insert(1, value),
                Child::Fringe(f) => {
                    Some(std::mem::replace(&mut f.value, value))
                }
                child => {
                    // A leaf occupies our slot. Expand it into a node one
                    // stride down; the fringe value becomes the node root.
                    trace!(
                        "expand leaf for fringe, depth {} octet {}",
                        depth,
                        octet
                    );
                    let old = std::mem::replace(
                        child,
                        Child::Node(Arc::new(Node::new())),
                    );
                    let Child::Node(n) = child else { unreachable!() };
                    let Child::Leaf(leaf) = old else { unreachable!() };
                    let node = Arc::make_mut(n);
                    node.insert_at(leaf.prefix, leaf.value, depth + 1);
                    node.prefixes.insert(1, value)
                }
            };
        }

        if !self.children.is_set(octet) {
            self.children.insert(
                octet,
                Child::Leaf(LeafNode { prefix: pfx, value }),
            );
            return None;
        }
        match self.children.must_get_mut(octet) {
            Child::Node(n) => {
                Arc::make_mut(n).insert_at(pfx, value, depth + 1)
            }
            Child::Leaf(l) if l.prefix == pfx => {
                Some(std::mem::replace(&mut l.value, value))
            }
            child => {
                // Conflict with a single compressed route: expand the slot
                // into a node and push both routes one stride down.
                trace!("expand child at depth {} octet {}", depth, octet);
                let old = std::mem::replace(
                    child,
                    Child::Node(Arc::new(Node::new())),
                );
                let Child::Node(n) = child else { unreachable!() };
                let node = Arc::make_mut(n);
                match old {
                    Child::Leaf(leaf) => {
                        node.insert_at(leaf.prefix, leaf.value, depth + 1);
                    }
                    Child::Fringe(f) => {
                        node.prefixes.insert(1, f.value);
                    }
                    Child::Node(_) => unreachable!(),
                }
                node.insert_at(pfx, value, depth + 1)
            }
        }
    }

    /// Transform the value stored for `pfx` with the supplied closure,
    /// inserting what it produces if the prefix is absent. The descent
    /// creates structure exactly like [insert_at](Self::insert_at) does.
    /// Returns the new value and whether the prefix existed before.
    pub(crate) fn update_at<F>(
        &mut self,
        pfx: PrefixId<AF>,
        f: F,
        depth: usize,
    ) -> (V, bool)
    where
        F: FnOnce(Option<V>) -> V,
    {
        let (max_depth, last_bits) = max_depth_last_bits(pfx.len());

        if depth == max_depth {
            return self
                .prefixes
                .update_at(pfx_to_idx(pfx.octet(depth), last_bits), f);
        }

        let octet = pfx.octet(depth);

        if is_fringe(depth, pfx.len()) {
            if !self.children.is_set(octet) {
                let value = f(None);
                self.children.insert(
                    octet,
                    Child::Fringe(FringeNode {
                        value: value.clone(),
                    }),
                );
                return (value, false);
            }
            return match self.children.must_get_mut(octet) {
                Child::Node(n) => {
                    Arc::make_mut(n).prefixes.update_at(1, f)
                }
                Child::Fringe(fringe) => {
                    let old = fringe.value.clone();
                    fringe.value = f(Some(old));
                    (fringe.value.clone(), true)
                }
                child => {
                    let old = std::mem::replace(
                        child,
                        Child::Node(Arc::new(Node::new())),
                    );
                    let Child::Node(n) = child else { unreachable!() };
                    let Child::Leaf(leaf) = old else { unreachable!() };
                    let node = Arc::make_mut(n);
                    node.insert_at(leaf.prefix, leaf.value, depth + 1);
                    node.prefixes.update_at(1, f)
                }
            };
        }

        if !self.children.is_set(octet) {
            let value = f(None);
            self.children.insert(
                octet,
                Child::Leaf(LeafNode {
                    prefix: pfx,
                    value: value.clone(),
                }),
            );
            return (value, false);
        }
        match self.children.must_get_mut(octet) {
            Child::Node(n) => {
                Arc::make_mut(n).update_at(pfx, f, depth + 1)
            }
            Child::Leaf(l) if l.prefix == pfx => {
                let old = l.value.clone();
                l.value = f(Some(old));
                (l.value.clone(), true)
            }
            child => {
                let old = std::mem::replace(
                    child,
                    Child::Node(Arc::new(Node::new())),
                );
                let Child::Node(n) = child else { unreachable!() };
                let node = Arc::make_mut(n);
                match old {
                    Child::Leaf(leaf) => {
                        node.insert_at(leaf.prefix, leaf.value, depth + 1);
                    }
                    Child::Fringe(fringe) => {
                        node.prefixes.insert(1, fringe.value);
                    }
                    Child::Node(_) => unreachable!(),
                }
                node.update_at(pfx, f, depth + 1)
            }
        }
    }

    /// Remove `pfx`, starting `depth` strides into its address. Empty and
    /// single-route nodes left behind on the path are compressed away on
    /// the way back up.
    pub(crate) fn delete_at(
        &mut self,
        pfx: PrefixId<AF>,
        depth: usize,
    ) -> Option<V> {
        let (max_depth, last_bits) = max_depth_last_bits(pfx.len());

        if depth == max_depth {
            return self
                .prefixes
                .remove(pfx_to_idx(pfx.octet(depth), last_bits));
        }

        let octet = pfx.octet(depth);

        if is_fringe(depth, pfx.len()) {
            return match self.children.get(octet) {
                Some(Child::Fringe(_)) => {
                    let Some(Child::Fringe(f)) = self.children.remove(octet)
                    else {
                        unreachable!()
                    };
                    Some(f.value)
                }
                Some(Child::Node(_)) => {
                    let Some(Child::Node(n)) = self.children.get_mut(octet)
                    else {
                        unreachable!()
                    };
                    let old = Arc::make_mut(n).prefixes.remove(1);
                    if old.is_some() {
                        self.compress_child(octet, pfx, depth);
                    }
                    old
                }
                _ => None,
            };
        }

        match self.children.get(octet) {
            Some(Child::Node(_)) => {
                let Some(Child::Node(n)) = self.children.get_mut(octet)
                else {
                    unreachable!()
                };
                let old = Arc::make_mut(n).delete_at(pfx, depth + 1);
                if old.is_some() {
                    self.compress_child(octet, pfx, depth);
                }
                old
            }
            Some(Child::Leaf(l)) if l.prefix == pfx => {
                let Some(Child::Leaf(leaf)) = self.children.remove(octet)
                else {
                    unreachable!()
                };
                Some(leaf.value)
            }
            _ => None,
        }
    }

    // After a delete below the node at `octet`, prune it if it went empty,
    // or pull a lone leaf or fringe child of it one level up. `pfx` is the
    // prefix that was just deleted; its octets through `depth + 1` are the
    // path to the node, which is what a lifted fringe needs to rebuild its
    // absolute prefix.
    fn compress_child(&mut self, octet: u8, pfx: PrefixId<AF>, depth: usize) {
        let Some(Child::Node(n)) = self.children.get(octet) else {
            return;
        };
        let (pfx_count, child_count) =
            (n.prefixes.len(), n.children.len());

        if pfx_count + child_count == 0 {
            trace!("prune empty node, depth {} octet {}", depth + 1, octet);
            self.children.remove(octet);
            return;
        }
        if pfx_count > 0 || child_count != 1 {
            return;
        }
        if let Some((_, Child::Node(_))) = n.children.iter().next() {
            // An interior node below stays put.
            return;
        }

        let Some(Child::Node(n)) = self.children.remove(octet) else {
            unreachable!()
        };
        let node = Arc::try_unwrap(n).unwrap_or_else(|n| (*n).clone());
        let Some((lifted_octet, child)) = node.children.into_iter().next()
        else {
            unreachable!()
        };
        trace!("collapse node at depth {} octet {}", depth + 1, octet);
        let lifted = match child {
            Child::Leaf(leaf) => Child::Leaf(leaf),
            Child::Fringe(f) => {
                let bits = pfx.bits().with_octet(depth + 1, lifted_octet);
                let prefix = PrefixId::new(bits, 8 * (depth as u8 + 2));
                Child::Leaf(LeafNode {
                    prefix,
                    value: f.value,
                })
            }
            Child::Node(_) => unreachable!(),
        };
        self.children.insert(octet, lifted);
    }
}

impl<AF: AddressFamily, V> Default for Node<AF, V> {
    fn default() -> Self {
        Self::new()
    }
}
