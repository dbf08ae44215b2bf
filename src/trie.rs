//! N-gram context trie stored as an arena of nodes.
//!
//! Each node records how often its symbol followed the context spelled by the
//! path from the root (`count`) and the total of its children's counts
//! (`usage`). Children are kept sorted by symbol so lookups are binary
//! searches. Deleted nodes go to a free list and are reused.

use crate::dictionary::{Symbol, SymbolRemap};

/// Index of a node inside its trie's arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Node {
    pub symbol: Symbol,
    pub count: u16,
    pub usage: u32,
    pub children: Vec<NodeId>,
}

/// Counters and shape of a subtree, as reported by `/treesize`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TreeSize {
    pub children: usize,
    pub nodes: usize,
    pub count: u16,
    pub usage: u32,
}

#[derive(Clone, Debug)]
pub struct Trie {
    nodes: Vec<Node>,
    free: Vec<NodeId>,
    root: NodeId,
}

impl Default for Trie {
    fn default() -> Self {
        Self::new()
    }
}

impl Trie {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::default()],
            free: Vec::new(),
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    /// Live nodes, root included.
    pub fn node_count(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    /// Number of distinct symbols directly under the root.
    pub fn branch_count(&self) -> usize {
        self.node(self.root).children.len()
    }

    fn allocate(&mut self, node: Node) -> NodeId {
        match self.free.pop() {
            Some(id) => {
                self.nodes[id.index()] = node;
                id
            }
            None => {
                self.nodes.push(node);
                NodeId((self.nodes.len() - 1) as u32)
            }
        }
    }

    /// Attach a fully formed child to `parent` (used by the brain loader, which
    /// reads children in ascending order).
    pub(crate) fn push_child(&mut self, parent: NodeId, node: Node) -> NodeId {
        let id = self.allocate(node);
        self.node_mut(parent).children.push(id);
        id
    }

    /// Overwrite the counters of the root (loader only).
    pub(crate) fn set_root(&mut self, symbol: Symbol, usage: u32, count: u16) {
        let root = self.root;
        let node = self.node_mut(root);
        node.symbol = symbol;
        node.usage = usage;
        node.count = count;
    }

    fn search(&self, parent: NodeId, symbol: Symbol) -> Result<usize, usize> {
        self.node(parent)
            .children
            .binary_search_by_key(&symbol, |&child| self.node(child).symbol)
    }

    /// Child of `parent` carrying `symbol`.
    pub fn find_child(&self, parent: NodeId, symbol: Symbol) -> Option<NodeId> {
        self.search(parent, symbol)
            .ok()
            .map(|pos| self.node(parent).children[pos])
    }

    /// Child of `parent` carrying `symbol`, created with zero counts if missing.
    fn find_or_add_child(&mut self, parent: NodeId, symbol: Symbol) -> NodeId {
        match self.search(parent, symbol) {
            Ok(pos) => self.node(parent).children[pos],
            Err(pos) => {
                let id = self.allocate(Node {
                    symbol,
                    ..Node::default()
                });
                self.node_mut(parent).children.insert(pos, id);
                id
            }
        }
    }

    /// Record one more occurrence of `symbol` under `parent`. Counters stop
    /// moving once the child's count saturates.
    pub fn add_symbol(&mut self, parent: NodeId, symbol: Symbol) -> NodeId {
        let child = self.find_or_add_child(parent, symbol);
        if self.node(child).count < u16::MAX {
            self.node_mut(child).count += 1;
            let usage = &mut self.node_mut(parent).usage;
            *usage = usage.saturating_add(1);
        }
        child
    }

    /// Undo one occurrence of `node` under `parent`, deleting the node (and
    /// its subtree) when its count drops below one. Callers retract the
    /// deepest context first.
    ///
    /// A saturated count no longer says how many occurrences it holds, so a
    /// node pinned at `u16::MAX` is left as it is.
    pub fn retract(&mut self, node: NodeId, parent: NodeId) {
        let Ok(position) = self.search(parent, self.node(node).symbol) else {
            return;
        };
        if self.node(parent).children[position] != node || self.node(node).count == u16::MAX {
            return;
        }
        {
            let usage = &mut self.node_mut(parent).usage;
            *usage = usage.saturating_sub(1);
        }
        let count = &mut self.node_mut(node).count;
        *count = count.saturating_sub(1);
        if *count < 1 {
            self.node_mut(parent).children.remove(position);
            self.release(node);
        }
    }

    fn release(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            let node = std::mem::take(self.node_mut(id));
            stack.extend(node.children);
            self.free.push(id);
        }
    }

    /// Ids of every live node reachable from the root, pre-order.
    pub fn preorder(&self) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.node_count());
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.node(id).children.iter().rev().copied());
        }
        out
    }

    /// Rewrite every node's symbol through `remap`. Nodes whose symbol was
    /// removed keep it unchanged; compaction only removes symbols no node uses.
    pub fn renumber(&mut self, remap: &SymbolRemap) {
        for id in self.preorder() {
            let node = self.node_mut(id);
            if let Some(symbol) = remap.apply(node.symbol) {
                node.symbol = symbol;
            }
        }
    }

    /// Largest symbol used anywhere below the root.
    pub fn max_symbol(&self) -> Option<Symbol> {
        self.preorder()
            .into_iter()
            .filter(|&id| id != self.root)
            .map(|id| self.node(id).symbol)
            .max()
    }

    /// Nodes in the subtree rooted at `id`, `id` included.
    pub fn subtree_size(&self, id: NodeId) -> usize {
        let mut size = 0;
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            size += 1;
            stack.extend(self.node(id).children.iter().copied());
        }
        size
    }

    /// Shape of the whole trie, or of the `branch`-th child of the root when it exists.
    pub fn tree_size(&self, branch: Option<usize>) -> TreeSize {
        let id = branch
            .and_then(|b| self.node(self.root).children.get(b).copied())
            .unwrap_or(self.root);
        let node = self.node(id);
        TreeSize {
            children: node.children.len(),
            nodes: self.subtree_size(id),
            count: node.count,
            usage: node.usage,
        }
    }

    /// True when every node without a saturated child has
    /// `usage == Σ children.count`.
    pub fn usage_consistent(&self) -> bool {
        self.preorder().into_iter().all(|id| {
            let node = self.node(id);
            let counts: Vec<u16> = node.children.iter().map(|&c| self.node(c).count).collect();
            counts.contains(&u16::MAX)
                || u64::from(node.usage) == counts.iter().map(|&c| u64::from(c)).sum::<u64>()
        })
    }

    /// Path of nodes spelling `symbols` from the root, as far as it exists.
    pub fn path(&self, symbols: &[Symbol]) -> Vec<NodeId> {
        let mut path = Vec::with_capacity(symbols.len());
        let mut at = self.root;
        for &symbol in symbols {
            match self.find_child(at, symbol) {
                Some(child) => {
                    path.push(child);
                    at = child;
                }
                None => break,
            }
        }
        path
    }
}

/// Active n-gram contexts: slot `k` is the node reached after the last `k`
/// symbols, slot 0 is the root.
///
/// One slot beyond `order` is maintained so that learning records windows of
/// `order + 1` symbols; generation reads slots `0..=order` only.
#[derive(Clone, Debug)]
pub struct Cursor {
    slots: Vec<Option<NodeId>>,
}

impl Cursor {
    /// A cursor positioned at `root`.
    pub fn new(order: usize, root: NodeId) -> Self {
        let mut slots = vec![None; order + 2];
        slots[0] = Some(root);
        Self { slots }
    }

    pub fn depth(&self, k: usize) -> Option<NodeId> {
        self.slots.get(k).copied().flatten()
    }

    /// Order the cursor was built for.
    fn order(&self) -> usize {
        self.slots.len() - 2
    }

    /// Deepest populated context among slots `0..=order`.
    pub fn longest(&self) -> Option<NodeId> {
        self.slots[..=self.order()].iter().rev().find_map(|slot| *slot)
    }

    /// Move every active context past `symbol`. With `create`, missing
    /// children are added and counted; without it, contexts whose child is
    /// missing become empty.
    pub fn advance(&mut self, trie: &mut Trie, symbol: Symbol, create: bool) {
        for i in (1..self.slots.len()).rev() {
            self.slots[i] = match self.slots[i - 1] {
                Some(parent) if create => Some(trie.add_symbol(parent, symbol)),
                Some(parent) => trie.find_child(parent, symbol),
                None => None,
            };
        }
    }

    /// Read-only form of [`Cursor::advance`] without creation.
    pub fn follow(&mut self, trie: &Trie, symbol: Symbol) {
        for i in (1..self.slots.len()).rev() {
            self.slots[i] = self.slots[i - 1].and_then(|parent| trie.find_child(parent, symbol));
        }
    }
}
