//! Expression arena, per-kind registry and value overrides.
//!
//! A [`Context`] owns every node of one expression tree. Nodes are created
//! through factory methods that wire parent links into their children, then
//! registered by kind with [`Context::add_expr`]. [`Context::resolve_expr`]
//! rewrites the tree by structural search and replace.

use std::fmt;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{error, trace, warn};

use crate::expr::{BinaryOp, Expr, ExprId, ExprKind, Leaf, UnaryOp, WordType, extend};
use crate::memory::Memory;
use crate::range::Range;

#[derive(Clone, Debug)]
struct Node {
    expr: Expr,
    parent: Option<ExprId>,
}

/// Owner of one expression tree.
pub struct Context<'m> {
    memory: &'m dyn Memory,
    nodes: Vec<Node>,
    registry: FxHashMap<ExprKind, FxHashSet<ExprId>>,
    values: FxHashMap<ExprId, i128>,
    root: Option<ExprId>,
}

impl fmt::Debug for Context<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("nodes", &self.nodes.len())
            .field("registered", &self.expr_count())
            .field("values", &self.values)
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl<'m> Context<'m> {
    /// Create an empty context reading load nodes through `memory`.
    pub fn new(memory: &'m dyn Memory) -> Self {
        Self {
            memory,
            nodes: Vec::new(),
            registry: FxHashMap::default(),
            values: FxHashMap::default(),
            root: None,
        }
    }

    fn alloc(&mut self, expr: Expr) -> ExprId {
        let id = ExprId::new(self.nodes.len());
        for &child in expr.children() {
            self.nodes[child.index()].parent = Some(id);
        }
        self.nodes.push(Node { expr, parent: None });
        id
    }

    // Factories

    /// Integer literal.
    pub fn constant(&mut self, value: i128) -> ExprId {
        self.alloc(Expr::Leaf(Leaf::Constant(value)))
    }

    /// Register reference by canonical name.
    pub fn register(&mut self, name: impl Into<String>) -> ExprId {
        self.alloc(Expr::Leaf(Leaf::Register(name.into())))
    }

    /// Sum of two subtrees.
    pub fn add(&mut self, lhs: ExprId, rhs: ExprId) -> ExprId {
        self.alloc(Expr::Binary {
            op: BinaryOp::Add,
            children: [lhs, rhs],
        })
    }

    /// Product of two subtrees.
    pub fn mul(&mut self, lhs: ExprId, rhs: ExprId) -> ExprId {
        self.alloc(Expr::Binary {
            op: BinaryOp::Mul,
            children: [lhs, rhs],
        })
    }

    /// `value` while it is at most `limit`.
    pub fn upper_bound(&mut self, value: ExprId, limit: ExprId) -> ExprId {
        self.alloc(Expr::Binary {
            op: BinaryOp::UpperBound,
            children: [value, limit],
        })
    }

    /// Crop `child` to `bits` and sign- or zero-extend it.
    pub fn extend(&mut self, signed: bool, bits: u32, child: ExprId) -> ExprId {
        self.alloc(Expr::Unary {
            op: UnaryOp::Extend { signed, bits },
            child,
        })
    }

    /// Sign extension from `bits`.
    pub fn sign_extend(&mut self, bits: u32, child: ExprId) -> ExprId {
        self.extend(true, bits, child)
    }

    /// Zero extension from `bits`.
    pub fn zero_extend(&mut self, bits: u32, child: ExprId) -> ExprId {
        self.extend(false, bits, child)
    }

    /// Load of `word` at `addr`, valid for addresses in `[1, 2^addr_bits - 1]`.
    pub fn memory(&mut self, addr_bits: u32, word: WordType, addr: ExprId) -> ExprId {
        self.alloc(Expr::Unary {
            op: UnaryOp::Memory { addr_bits, word },
            child: addr,
        })
    }

    /// Tree root over the jump target expression.
    pub fn root(&mut self, child: ExprId) -> ExprId {
        self.alloc(Expr::Unary {
            op: UnaryOp::Root,
            child,
        })
    }

    // Queries

    /// Node at `id`.
    pub fn get(&self, id: ExprId) -> &Expr {
        &self.nodes[id.index()].expr
    }

    /// Kind tag of the node at `id`.
    pub fn kind(&self, id: ExprId) -> ExprKind {
        self.get(id).kind()
    }

    /// Parent of `id`, if it is attached.
    pub fn parent(&self, id: ExprId) -> Option<ExprId> {
        self.nodes[id.index()].parent
    }

    /// Children of `id` in operand order.
    pub fn children(&self, id: ExprId) -> &[ExprId] {
        self.get(id).children()
    }

    /// The root node, once one has been added.
    pub const fn root_expr(&self) -> Option<ExprId> {
        self.root
    }

    /// Number of registered nodes.
    pub fn expr_count(&self) -> usize {
        self.registry.values().map(FxHashSet::len).sum()
    }

    /// Registered nodes of `kind`, in creation order.
    pub fn exprs(&self, kind: ExprKind) -> Vec<ExprId> {
        let mut ids: Vec<_> = self
            .registry
            .get(&kind)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        ids.sort_unstable();
        ids
    }

    /// Bind `value` to `id`, overriding its children during evaluation.
    pub fn set_value(&mut self, id: ExprId, value: i128) {
        self.values.insert(id, value);
    }

    /// Value bound to `id`, if any.
    pub fn value(&self, id: ExprId) -> Option<i128> {
        self.values.get(&id).copied()
    }

    /// Remove the binding of `id`, returning it.
    pub fn clear_value(&mut self, id: ExprId) -> Option<i128> {
        self.values.remove(&id)
    }

    // Registry

    /// Register `id` and its subtree.
    ///
    /// The first node added must be a root, and only one root may be added.
    /// Returns `false` without registering anything otherwise.
    pub fn add_expr(&mut self, id: ExprId) -> bool {
        if self.kind(id) == ExprKind::Root {
            if let Some(root) = self.root {
                error!(root = %root, expr = %id, "context already has a root");
                return false;
            }
            self.root = Some(id);
        } else if self.root.is_none() {
            error!(expr = %id, "cannot add an expression before the root");
            return false;
        }
        self.register_subtree(id);
        true
    }

    fn register_subtree(&mut self, id: ExprId) {
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            let kind = self.kind(id);
            self.registry.entry(kind).or_default().insert(id);
            stack.extend_from_slice(self.children(id));
        }
    }

    fn unregister_subtree(&mut self, id: ExprId) {
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            let kind = self.kind(id);
            if let Some(set) = self.registry.get_mut(&kind) {
                set.remove(&id);
            }
            stack.extend_from_slice(self.children(id));
        }
    }

    fn matches_of(&self, target: ExprId) -> Vec<ExprId> {
        let mut matches: Vec<_> = self
            .registry
            .get(&self.kind(target))
            .map(|set| {
                set.iter()
                    .copied()
                    .filter(|&id| self.equal_to(target, id))
                    .collect()
            })
            .unwrap_or_default();
        matches.sort_unstable();
        matches
    }

    /// Unregister every node structurally equal to `id`, then do the same for
    /// each of its children.
    pub fn remove_expr(&mut self, id: ExprId) {
        let kind = self.kind(id);
        let matches = self.matches_of(id);
        if let Some(set) = self.registry.get_mut(&kind) {
            for found in &matches {
                set.remove(found);
            }
        }
        for child in self.children(id).to_vec() {
            self.remove_expr(child);
        }
    }

    /// Replace every registered node structurally equal to `target`.
    ///
    /// The first match receives `replacement` itself, later matches a deep
    /// copy, so no subtree ends up with two parents. Returns the number of
    /// nodes rewritten.
    pub fn resolve_expr(&mut self, target: ExprId, replacement: ExprId) -> usize {
        let matches = self.matches_of(target);
        let mut rewritten = 0;
        for found in matches {
            let Some(parent) = self.parent(found) else {
                warn!(expr = %found, "cannot resolve an expression without a parent");
                continue;
            };
            self.unregister_subtree(found);
            let node = if rewritten == 0 {
                replacement
            } else {
                self.deep_copy(replacement)
            };
            if !self.replace_child(parent, found, node) {
                return rewritten;
            }
            self.register_subtree(node);
            rewritten += 1;
        }
        trace!(
            target = %self.get(target),
            matches = rewritten,
            registered = self.expr_count(),
            "resolved expression"
        );
        rewritten
    }

    /// Point the slot of `parent` that holds `old` at `new`.
    pub fn replace_child(&mut self, parent: ExprId, old: ExprId, new: ExprId) -> bool {
        let Some(slot) = self.nodes[parent.index()]
            .expr
            .children_mut()
            .iter_mut()
            .find(|slot| **slot == old)
        else {
            error!(parent = %parent, child = %old, "parent does not hold child");
            return false;
        };
        *slot = new;
        self.nodes[new.index()].parent = Some(parent);
        self.nodes[old.index()].parent = None;
        true
    }

    /// Copy the subtree at `id` into fresh nodes. The copy has no parent.
    pub fn deep_copy(&mut self, id: ExprId) -> ExprId {
        let mut expr = self.get(id).clone();
        for slot in expr.children_mut() {
            *slot = self.deep_copy(*slot);
        }
        self.alloc(expr)
    }

    /// Compare two subtrees by kind, payload and children.
    ///
    /// Two-child nodes also match with their children swapped, for every
    /// two-child kind including upper bounds.
    pub fn equal_to(&self, a: ExprId, b: ExprId) -> bool {
        if a == b {
            return true;
        }
        let (lhs, rhs) = (self.get(a), self.get(b));
        if !lhs.same_node(rhs) {
            return false;
        }
        match (lhs.children(), rhs.children()) {
            ([], []) => true,
            ([x], [y]) => self.equal_to(*x, *y),
            ([x1, x2], [y1, y2]) => {
                (self.equal_to(*x1, *y1) && self.equal_to(*x2, *y2))
                    || (self.equal_to(*x1, *y2) && self.equal_to(*x2, *y1))
            }
            _ => false,
        }
    }

    // Evaluation

    /// Evaluate `id`. An override bound to a node takes precedence over its
    /// children. Unbound registers and failed loads have no value.
    pub fn evaluate(&self, id: ExprId) -> Option<i128> {
        if let Some(value) = self.values.get(&id) {
            return Some(*value);
        }
        match self.get(id) {
            Expr::Leaf(Leaf::Constant(value)) => Some(*value),
            Expr::Leaf(Leaf::Register(_)) => None,
            Expr::Unary { op, child } => {
                let value = self.evaluate(*child)?;
                evaluate_unary(*op, value, self.memory)
            }
            Expr::Binary { op, children } => {
                let lhs = self.evaluate(children[0])?;
                let rhs = self.evaluate(children[1])?;
                evaluate_binary(*op, lhs, rhs)
            }
        }
    }

    /// Admissible values of `id` given the constraints of its ancestors.
    pub fn possible_values(&self, id: ExprId) -> Option<Range> {
        match self.parent(id) {
            Some(parent) => self.possible_values_for(parent, id),
            None => Some(Range::unbounded()),
        }
    }

    /// Admissible values of `child`, projected through the node `id`.
    ///
    /// Projecting through a two-child node needs the other child's value.
    pub fn possible_values_for(&self, id: ExprId, child: ExprId) -> Option<Range> {
        let incoming = match self.parent(id) {
            Some(parent) => self.possible_values_for(parent, id)?,
            None => return Some(Range::unbounded()),
        };
        match self.get(id) {
            Expr::Leaf(_) => Some(incoming),
            Expr::Unary { op, child: only } => {
                if *only != child {
                    error!(expr = %id, child = %child, "not a child of expression");
                    return None;
                }
                Some(project_unary(*op, incoming))
            }
            Expr::Binary { op, children } => {
                let Some(position) = children.iter().position(|&c| c == child) else {
                    error!(expr = %id, child = %child, "not a child of expression");
                    return None;
                };
                let other = self.evaluate(children[1 - position])?;
                Some(project_binary(*op, position, &incoming, other))
            }
        }
    }

    // Liveness

    fn has_upper_bound_ancestor(&self, id: ExprId) -> bool {
        let mut current = self.parent(id);
        while let Some(node) = current {
            if self.kind(node) == ExprKind::UpperBound {
                return true;
            }
            current = self.parent(node);
        }
        false
    }

    /// Registered registers with no upper bound between them and the root.
    pub fn unbounded_registers(&self) -> Vec<ExprId> {
        self.exprs(ExprKind::Register)
            .into_iter()
            .filter(|&id| !self.has_upper_bound_ancestor(id))
            .collect()
    }

    pub fn is_there_any_unbounded_register(&self) -> bool {
        self.registry
            .get(&ExprKind::Register)
            .is_some_and(|set| set.iter().any(|&id| !self.has_upper_bound_ancestor(id)))
    }

    /// Sorted names of every registered register.
    pub fn register_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .exprs(ExprKind::Register)
            .into_iter()
            .filter_map(|id| self.get(id).register_name().map(str::to_owned))
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    /// Render the subtree at `id`, one node per line.
    pub const fn display(&self, id: ExprId) -> TreeDisplay<'_, 'm> {
        TreeDisplay { context: self, id }
    }
}

fn evaluate_unary(op: UnaryOp, value: i128, memory: &dyn Memory) -> Option<i128> {
    match op {
        UnaryOp::Extend { signed, bits } => Some(extend(value, signed, bits)),
        UnaryOp::Memory { addr_bits, word } => {
            let limit = 1i128 << addr_bits.min(126);
            if value <= 0 || value >= limit {
                return None;
            }
            let addr = u64::try_from(value).ok()?;
            memory.read(word, addr)
        }
        UnaryOp::Root => Some(value),
    }
}

fn evaluate_binary(op: BinaryOp, lhs: i128, rhs: i128) -> Option<i128> {
    match op {
        BinaryOp::Add => lhs.checked_add(rhs),
        BinaryOp::Mul => lhs.checked_mul(rhs),
        BinaryOp::UpperBound => (lhs <= rhs).then_some(lhs),
    }
}

fn project_unary(op: UnaryOp, incoming: Range) -> Range {
    match op {
        UnaryOp::Extend { .. } => incoming,
        UnaryOp::Memory { .. } | UnaryOp::Root => Range::unbounded(),
    }
}

fn project_binary(op: BinaryOp, position: usize, incoming: &Range, other: i128) -> Range {
    match op {
        BinaryOp::Add => incoming.sub(other),
        BinaryOp::Mul => incoming.div(other),
        BinaryOp::UpperBound if position == 0 => incoming.intersection(&Range::at_most(other)),
        BinaryOp::UpperBound => Range::unbounded(),
    }
}

/// Indented rendering of a subtree.
pub struct TreeDisplay<'a, 'm> {
    context: &'a Context<'m>,
    id: ExprId,
}

impl TreeDisplay<'_, '_> {
    fn write_node(&self, f: &mut fmt::Formatter<'_>, id: ExprId, depth: usize) -> fmt::Result {
        write!(f, "{:indent$}{}", "", self.context.get(id), indent = depth * 2)?;
        if let Some(value) = self.context.value(id) {
            write!(f, " = {value:#x}")?;
        }
        writeln!(f)?;
        for &child in self.context.children(id) {
            self.write_node(f, child, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for TreeDisplay<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_node(f, self.id, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MapMemory;

    fn seeded<'m>(memory: &'m MapMemory, name: &str) -> (Context<'m>, ExprId, ExprId) {
        let mut ctx = Context::new(memory);
        let reg = ctx.register(name);
        let root = ctx.root(reg);
        assert!(ctx.add_expr(root));
        (ctx, root, reg)
    }

    #[test]
    fn test_factories_wire_parents() {
        let mem = MapMemory::new();
        let mut ctx = Context::new(&mem);
        let rax = ctx.register("rax");
        let four = ctx.constant(4);
        let mul = ctx.mul(rax, four);
        let root = ctx.root(mul);
        assert_eq!(ctx.parent(rax), Some(mul));
        assert_eq!(ctx.parent(four), Some(mul));
        assert_eq!(ctx.parent(mul), Some(root));
        assert_eq!(ctx.parent(root), None);
        assert_eq!(ctx.children(mul), &[rax, four]);
        assert_eq!(ctx.expr_count(), 0);
    }

    #[test]
    fn test_add_expr_requires_root_first() {
        let mem = MapMemory::new();
        let mut ctx = Context::new(&mem);
        let rax = ctx.register("rax");
        assert!(!ctx.add_expr(rax));
        assert_eq!(ctx.expr_count(), 0);

        let root = ctx.root(rax);
        assert!(ctx.add_expr(root));
        assert_eq!(ctx.root_expr(), Some(root));
        assert_eq!(ctx.expr_count(), 2);

        let rbx = ctx.register("rbx");
        let second = ctx.root(rbx);
        assert!(!ctx.add_expr(second));
        assert_eq!(ctx.root_expr(), Some(root));
    }

    #[test]
    fn test_equality() {
        let mem = MapMemory::new();
        let mut ctx = Context::new(&mem);
        let a = {
            let rax = ctx.register("rax");
            let c = ctx.constant(8);
            ctx.add(rax, c)
        };
        let swapped = {
            let c = ctx.constant(8);
            let rax = ctx.register("rax");
            ctx.add(c, rax)
        };
        let other_leaf = {
            let rax = ctx.register("rax");
            let c = ctx.constant(9);
            ctx.add(rax, c)
        };
        let other_kind = {
            let rax = ctx.register("rax");
            let c = ctx.constant(8);
            ctx.mul(rax, c)
        };
        assert!(ctx.equal_to(a, a));
        assert!(ctx.equal_to(a, swapped));
        assert!(ctx.equal_to(swapped, a));
        assert!(!ctx.equal_to(a, other_leaf));
        assert!(!ctx.equal_to(a, other_kind));
    }

    #[test]
    fn test_upper_bound_equality_ignores_order() {
        let mem = MapMemory::new();
        let mut ctx = Context::new(&mem);
        let (x1, l1) = (ctx.register("rdi"), ctx.constant(20));
        let ub = ctx.upper_bound(x1, l1);
        let (l2, x2) = (ctx.constant(20), ctx.register("rdi"));
        let reversed = ctx.upper_bound(l2, x2);
        assert!(ctx.equal_to(ub, reversed));
    }

    #[test]
    fn test_unary_payload_equality() {
        let mem = MapMemory::new();
        let mut ctx = Context::new(&mem);
        let r1 = ctx.register("rax");
        let r2 = ctx.register("rax");
        let r3 = ctx.register("rax");
        let m32 = ctx.memory(32, WordType::I32, r1);
        let m64 = ctx.memory(64, WordType::I32, r2);
        let m32u = ctx.memory(32, WordType::U32, r3);
        assert!(!ctx.equal_to(m32, m64));
        assert!(!ctx.equal_to(m32, m32u));
    }

    #[test]
    fn test_deep_copy() {
        let mem = MapMemory::new();
        let mut ctx = Context::new(&mem);
        let rax = ctx.register("rax");
        let c = ctx.constant(3);
        let add = ctx.add(rax, c);
        let root = ctx.root(add);
        let copy = ctx.deep_copy(add);
        assert_ne!(copy, add);
        assert!(ctx.equal_to(copy, add));
        assert_eq!(ctx.parent(copy), None);
        assert_eq!(ctx.parent(add), Some(root));
        for (&a, &b) in ctx.children(copy).iter().zip(ctx.children(add)) {
            assert_ne!(a, b);
            assert_eq!(ctx.parent(a), Some(copy));
        }
    }

    #[test]
    fn test_evaluate() {
        let mem = MapMemory::new();
        let mut ctx = Context::new(&mem);
        let a = ctx.constant(6);
        let b = ctx.constant(7);
        let mul = ctx.mul(a, b);
        let c = ctx.constant(-2);
        let add = ctx.add(mul, c);
        let root = ctx.root(add);
        assert_eq!(ctx.evaluate(root), Some(40));

        let rax = ctx.register("rax");
        assert_eq!(ctx.evaluate(rax), None);
        ctx.set_value(rax, 5);
        assert_eq!(ctx.evaluate(rax), Some(5));
        ctx.set_value(mul, 100);
        assert_eq!(ctx.evaluate(root), Some(98));
        assert_eq!(ctx.clear_value(mul), Some(100));
        assert_eq!(ctx.evaluate(root), Some(40));
    }

    #[test]
    fn test_evaluate_missing_child_propagates() {
        let mem = MapMemory::new();
        let mut ctx = Context::new(&mem);
        let rax = ctx.register("rax");
        let c = ctx.constant(1);
        let add = ctx.add(rax, c);
        let root = ctx.root(add);
        assert_eq!(ctx.evaluate(root), None);
    }

    #[test]
    fn test_evaluate_upper_bound() {
        let mem = MapMemory::new();
        let mut ctx = Context::new(&mem);
        let value = ctx.constant(4);
        let limit = ctx.constant(6);
        let ub = ctx.upper_bound(value, limit);
        assert_eq!(ctx.evaluate(ub), Some(4));
        ctx.set_value(value, 7);
        assert_eq!(ctx.evaluate(ub), None);
        ctx.set_value(value, 6);
        assert_eq!(ctx.evaluate(ub), Some(6));
    }

    #[test]
    fn test_evaluate_extend() {
        let mem = MapMemory::new();
        let mut ctx = Context::new(&mem);
        let c = ctx.constant(0xffff_fffe);
        let sext = ctx.sign_extend(32, c);
        let c = ctx.constant(0x1_ffff_fffe);
        let zext = ctx.zero_extend(32, c);
        assert_eq!(ctx.evaluate(sext), Some(-2));
        assert_eq!(ctx.evaluate(zext), Some(0xffff_fffe));
    }

    #[test]
    fn test_evaluate_memory() {
        let mem = MapMemory::new().with_table(WordType::I32, 0x1000, [-1, 2]);
        let mut ctx = Context::new(&mem);
        let addr = ctx.constant(0x1004);
        let load = ctx.memory(64, WordType::I32, addr);
        assert_eq!(ctx.evaluate(load), Some(2));

        let addr = ctx.constant(0x1000);
        let load = ctx.memory(64, WordType::I32, addr);
        assert_eq!(ctx.evaluate(load), Some(-1));

        let addr = ctx.constant(0x2000);
        let missing = ctx.memory(64, WordType::I32, addr);
        assert_eq!(ctx.evaluate(missing), None);
    }

    #[test]
    fn test_evaluate_memory_address_limits() {
        let mut mem = MapMemory::new();
        mem.insert(WordType::U8, 0, 1);
        mem.insert(WordType::U8, 0xffff_ffff, 2);
        mem.insert(WordType::U8, 0x1_0000_0000, 3);
        let mut ctx = Context::new(&mem);
        let zero = ctx.constant(0);
        let at_zero = ctx.memory(32, WordType::U8, zero);
        let top = ctx.constant(0xffff_ffff);
        let at_top = ctx.memory(32, WordType::U8, top);
        let past = ctx.constant(0x1_0000_0000);
        let past_top = ctx.memory(32, WordType::U8, past);
        let negative = ctx.constant(-8);
        let at_negative = ctx.memory(64, WordType::U8, negative);
        assert_eq!(ctx.evaluate(at_zero), None);
        assert_eq!(ctx.evaluate(at_top), Some(2));
        assert_eq!(ctx.evaluate(past_top), None);
        assert_eq!(ctx.evaluate(at_negative), None);
    }

    #[test]
    fn test_possible_values_projection() {
        let mem = MapMemory::new();
        let (mut ctx, root, rax) = seeded(&mem, "rax");
        assert_eq!(ctx.possible_values(root), Some(Range::unbounded()));
        assert_eq!(ctx.possible_values(rax), Some(Range::unbounded()));

        // root(add(mul(ub(rdi, 10), 4), 0x100))
        let rdi = ctx.register("rdi");
        let limit = ctx.constant(10);
        let ub = ctx.upper_bound(rdi, limit);
        let four = ctx.constant(4);
        let mul = ctx.mul(ub, four);
        let base = ctx.constant(0x100);
        let add = ctx.add(mul, base);
        assert_eq!(ctx.resolve_expr(rax, add), 1);

        assert_eq!(ctx.possible_values(mul), Some(Range::unbounded()));
        assert_eq!(ctx.possible_values(rdi), Some(Range::at_most(10)));
        assert_eq!(ctx.possible_values_for(ub, rdi), Some(Range::at_most(10)));
        assert_eq!(ctx.possible_values_for(ub, base), None);

        // The limit side is unconstrained, once the value side evaluates.
        assert_eq!(ctx.possible_values(limit), None);
        ctx.set_value(rdi, 3);
        assert_eq!(ctx.possible_values(limit), Some(Range::unbounded()));
    }

    #[test]
    fn test_possible_values_needs_evaluable_sibling() {
        let mem = MapMemory::new();
        let (mut ctx, _root, rax) = seeded(&mem, "rax");
        let rax2 = ctx.register("rax");
        let rdx = ctx.register("rdx");
        let add = ctx.add(rax2, rdx);
        assert_eq!(ctx.resolve_expr(rax, add), 1);
        assert_eq!(ctx.possible_values(rdx), None);
        assert_eq!(ctx.possible_values(add), Some(Range::unbounded()));
    }

    #[test]
    fn test_resolve_multiple_matches_get_distinct_copies() {
        let mem = MapMemory::new();
        let (mut ctx, _root, rax) = seeded(&mem, "rax");
        let rcx1 = ctx.register("rcx");
        let rcx2 = ctx.register("rcx");
        let add = ctx.add(rcx1, rcx2);
        assert_eq!(ctx.resolve_expr(rax, add), 1);
        assert_eq!(ctx.expr_count(), 4);

        let target = ctx.register("rcx");
        let a = ctx.constant(0xd11);
        let b = ctx.constant(2015);
        let sum = ctx.add(a, b);
        assert_eq!(ctx.resolve_expr(target, sum), 2);
        assert_eq!(ctx.expr_count(), 4 - 2 + 2 * 3);

        let [first, second] = [ctx.children(add)[0], ctx.children(add)[1]];
        assert_ne!(first, second);
        assert!(ctx.equal_to(first, second));
        assert_eq!(ctx.parent(first), Some(add));
        assert_eq!(ctx.parent(second), Some(add));
        assert!(ctx.children(first).iter().all(|c| !ctx.children(second).contains(c)));
        assert!(ctx.exprs(ExprKind::Register).is_empty());
        assert_eq!(ctx.evaluate(add), Some(2 * (0xd11 + 2015)));
    }

    #[test]
    fn test_resolve_without_match() {
        let mem = MapMemory::new();
        let (mut ctx, _root, _rax) = seeded(&mem, "rax");
        let rbx = ctx.register("rbx");
        let c = ctx.constant(1);
        assert_eq!(ctx.resolve_expr(rbx, c), 0);
        assert_eq!(ctx.expr_count(), 2);
    }

    #[test]
    fn test_remove_expr_is_structural() {
        let mem = MapMemory::new();
        let (mut ctx, _root, rax) = seeded(&mem, "rax");
        let a = ctx.register("rdx");
        let b = ctx.register("rdx");
        let add = ctx.add(a, b);
        assert_eq!(ctx.resolve_expr(rax, add), 1);
        assert_eq!(ctx.exprs(ExprKind::Register).len(), 2);

        let probe = ctx.register("rdx");
        ctx.remove_expr(probe);
        assert!(ctx.exprs(ExprKind::Register).is_empty());
        assert_eq!(ctx.exprs(ExprKind::Add), vec![add]);
    }

    #[test]
    fn test_liveness() {
        let mem = MapMemory::new();
        let (mut ctx, _root, rdi) = seeded(&mem, "rdi");
        assert!(ctx.is_there_any_unbounded_register());
        assert_eq!(ctx.unbounded_registers(), vec![rdi]);

        let value = ctx.register("rdi");
        let limit = ctx.constant(20);
        let ub = ctx.upper_bound(value, limit);
        assert_eq!(ctx.resolve_expr(rdi, ub), 1);
        assert!(!ctx.is_there_any_unbounded_register());
        assert!(ctx.unbounded_registers().is_empty());
        assert_eq!(ctx.register_names(), vec!["rdi".to_string()]);
    }

    #[test]
    fn test_liveness_checks_every_register() {
        let mem = MapMemory::new();
        let (mut ctx, _root, rax) = seeded(&mem, "rax");
        let value = ctx.register("rdi");
        let limit = ctx.constant(20);
        let ub = ctx.upper_bound(value, limit);
        let rsi = ctx.register("rsi");
        let add = ctx.add(ub, rsi);
        assert_eq!(ctx.resolve_expr(rax, add), 1);
        assert!(ctx.is_there_any_unbounded_register());
        assert_eq!(ctx.unbounded_registers(), vec![rsi]);
        assert_eq!(ctx.register_names(), vec!["rdi".to_string(), "rsi".to_string()]);
    }

    #[test]
    fn test_display_tree() {
        let mem = MapMemory::new();
        let (mut ctx, root, rax) = seeded(&mem, "rax");
        let rcx = ctx.register("rcx");
        let disp = ctx.constant(0x10);
        let add = ctx.add(rcx, disp);
        assert_eq!(ctx.resolve_expr(rax, add), 1);
        ctx.set_value(rcx, 1);
        let rendered = ctx.display(root).to_string();
        assert_eq!(rendered, "root\n  add\n    register(rcx) = 0x1\n    constant(0x10)\n");
    }
}
