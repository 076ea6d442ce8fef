//! Expression node kinds.
//!
//! Nodes live in the arena of a [`Context`](crate::Context) and refer to their
//! children by [`ExprId`]. Every kind has one of three arity shapes.

use std::fmt;

/// Handle to a node in a context arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprId(u32);

impl ExprId {
    #[allow(clippy::cast_possible_truncation)]
    pub(crate) const fn new(index: usize) -> Self {
        Self(index as u32)
    }

    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ExprId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Word type read by a memory node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WordType {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
}

impl WordType {
    /// Signed word type of the given width in bytes.
    pub const fn signed(bytes: u8) -> Option<Self> {
        match bytes {
            1 => Some(Self::I8),
            2 => Some(Self::I16),
            4 => Some(Self::I32),
            8 => Some(Self::I64),
            _ => None,
        }
    }

    /// Unsigned word type of the given width in bytes.
    pub const fn unsigned(bytes: u8) -> Option<Self> {
        match bytes {
            1 => Some(Self::U8),
            2 => Some(Self::U16),
            4 => Some(Self::U32),
            8 => Some(Self::U64),
            _ => None,
        }
    }

    pub const fn bits(self) -> u32 {
        match self {
            Self::U8 | Self::I8 => 8,
            Self::U16 | Self::I16 => 16,
            Self::U32 | Self::I32 => 32,
            Self::U64 | Self::I64 => 64,
        }
    }

    pub const fn is_signed(self) -> bool {
        matches!(self, Self::I8 | Self::I16 | Self::I32 | Self::I64)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::U64 => "u64",
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::I32 => "i32",
            Self::I64 => "i64",
        }
    }
}

/// Zero-child payloads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Leaf {
    Constant(i128),
    Register(String),
}

/// One-child operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    /// Crop to `bits` and extend back, sign- or zero-filling.
    Extend { signed: bool, bits: u32 },
    /// Bounded read of `word` at the child's value.
    Memory { addr_bits: u32, word: WordType },
    /// Identity marking the top of the tree.
    Root,
}

/// Two-child operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Mul,
    /// `children[0]` if it is at most `children[1]`, otherwise no value.
    UpperBound,
}

/// Expression node payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Expr {
    Leaf(Leaf),
    Unary { op: UnaryOp, child: ExprId },
    Binary { op: BinaryOp, children: [ExprId; 2] },
}

/// Flat kind tag of an expression node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExprKind {
    Constant,
    Register,
    Add,
    Mul,
    UpperBound,
    Extend,
    Memory,
    Root,
}

impl Expr {
    pub const fn kind(&self) -> ExprKind {
        match self {
            Self::Leaf(Leaf::Constant(_)) => ExprKind::Constant,
            Self::Leaf(Leaf::Register(_)) => ExprKind::Register,
            Self::Unary { op, .. } => match op {
                UnaryOp::Extend { .. } => ExprKind::Extend,
                UnaryOp::Memory { .. } => ExprKind::Memory,
                UnaryOp::Root => ExprKind::Root,
            },
            Self::Binary { op, .. } => match op {
                BinaryOp::Add => ExprKind::Add,
                BinaryOp::Mul => ExprKind::Mul,
                BinaryOp::UpperBound => ExprKind::UpperBound,
            },
        }
    }

    /// Children in order.
    pub const fn children(&self) -> &[ExprId] {
        match self {
            Self::Leaf(_) => &[],
            Self::Unary { child, .. } => std::slice::from_ref(child),
            Self::Binary { children, .. } => children,
        }
    }

    pub(crate) fn children_mut(&mut self) -> &mut [ExprId] {
        match self {
            Self::Leaf(_) => &mut [],
            Self::Unary { child, .. } => std::slice::from_mut(child),
            Self::Binary { children, .. } => children,
        }
    }

    /// Check kind and payload, ignoring children.
    pub fn same_node(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Leaf(a), Self::Leaf(b)) => a == b,
            (Self::Unary { op: a, .. }, Self::Unary { op: b, .. }) => a == b,
            (Self::Binary { op: a, .. }, Self::Binary { op: b, .. }) => a == b,
            _ => false,
        }
    }

    pub fn register_name(&self) -> Option<&str> {
        match self {
            Self::Leaf(Leaf::Register(name)) => Some(name.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Leaf(Leaf::Constant(v)) if *v < 0 => write!(f, "constant(-{:#x})", v.unsigned_abs()),
            Self::Leaf(Leaf::Constant(v)) => write!(f, "constant({v:#x})"),
            Self::Leaf(Leaf::Register(name)) => write!(f, "register({name})"),
            Self::Unary { op, .. } => match op {
                UnaryOp::Extend { signed: true, bits } => write!(f, "sext{bits}"),
                UnaryOp::Extend { signed: false, bits } => write!(f, "zext{bits}"),
                UnaryOp::Memory { addr_bits, word } => {
                    write!(f, "memory{addr_bits}<{}>", word.name())
                }
                UnaryOp::Root => write!(f, "root"),
            },
            Self::Binary { op, .. } => match op {
                BinaryOp::Add => write!(f, "add"),
                BinaryOp::Mul => write!(f, "mul"),
                BinaryOp::UpperBound => write!(f, "upper_bound"),
            },
        }
    }
}

/// Crop `value` to `bits` and extend it back to the working width.
pub fn extend(value: i128, signed: bool, bits: u32) -> i128 {
    if bits == 0 || bits >= i128::BITS {
        return value;
    }
    let shift = i128::BITS - bits;
    if signed {
        (value << shift) >> shift
    } else {
        #[allow(clippy::cast_sign_loss, clippy::cast_possible_wrap)]
        let cropped = (((value as u128) << shift) >> shift) as i128;
        cropped
    }
}
