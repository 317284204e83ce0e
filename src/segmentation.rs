//! Bit-packed triangle segmentation codec
//!
//! Both Bambu Studio and PrusaSlicer attach painted sub-triangle state to
//! a `<triangle>` element as a hexadecimal string encoding a subdivision
//! tree. The layout is shared between the two ecosystems (it predates the
//! fork), which is what makes attribute-level conversion possible at all:
//!
//! - The string is decoded from its **last** character to its first; each
//!   hex digit contributes four bits, least-significant bit first.
//! - Each node starts with 2 bits: the number of split sides (0..=3).
//!   - `0`: a leaf. The next 2 bits are the state; the escape value
//!     `0b11` means a further 4-bit nibble follows and the state is
//!     `3 + nibble` (making 16 the highest encodable filament state).
//!   - `1..=3`: a split. The next 2 bits name the special side, then
//!     `sides + 1` child nodes follow depth-first.
//! - Every field group is nibble-aligned, so a valid code is a whole
//!   number of hex digits; trailing digits beyond the tree must be zero.
//!
//! Anchor values: `"0"` is an explicit whole-triangle "unpainted", `"4"`
//! is state 1, `"8"` is state 2, `"0C"` is state 3, `"1C"` is state 4.
//!
//! Splits subdivide at side midpoints. Side `i` runs from vertex `i` to
//! vertex `(i + 1) % 3`; the child order below must not change, it is
//! what the slicers reconstruct:
//!
//! - one split side `s`: `(v_s, m_s, v_s+2)`, `(m_s, v_s+1, v_s+2)`
//! - two split sides, special side `s` kept whole:
//!   `(v_s, v_s+1, m_s+1)`, `(v_s, m_s+1, m_s+2)`, `(m_s+2, m_s+1, v_s+2)`
//! - three split sides: `(v_s, m_s, m_s+2)`, `(m_s, v_s+1, m_s+1)`,
//!   `(m_s+2, m_s+1, v_s+2)`, `(m_s, m_s+1, m_s+2)`
//!
//! This module is a pure codec; extraction and translation build on it.

use thiserror::Error;

/// Highest leaf state the escape nibble can legally carry.
///
/// States 1..=16 are filament indices; 0 is "unpainted". The wire format
/// could express 17 and 18 but the slicers reject them.
pub const STATE_MAX: u8 = 16;

/// Recursion ceiling when parsing untrusted codes.
///
/// Real paint trees stay in single digits of depth; the cap only guards
/// the parser's stack against crafted input.
pub const MAX_CODE_DEPTH: usize = 64;

/// Errors from parsing or encoding a segmentation code
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodeError {
    /// The attribute value was empty
    #[error("empty segmentation code")]
    Empty,

    /// A character was not a hexadecimal digit
    #[error("invalid character '{0}' in segmentation code")]
    InvalidDigit(char),

    /// The bit stream ended inside a node
    #[error("truncated segmentation code")]
    Truncated,

    /// Nonzero bits remained after the encoded tree
    #[error("trailing nonzero bits after segmentation tree")]
    TrailingBits,

    /// The tree nested deeper than [`MAX_CODE_DEPTH`]
    #[error("segmentation tree exceeds maximum depth {MAX_CODE_DEPTH}")]
    DepthExceeded,

    /// A leaf state was outside 0..=[`STATE_MAX`]
    #[error("segmentation state {0} out of range (max {STATE_MAX})")]
    StateOutOfRange(u8),

    /// A split node had an invalid shape (children count or side index)
    #[error("invalid split: {0}")]
    InvalidSplit(String),
}

/// A node of the segmentation tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegNode {
    /// Undivided region with one state: 0 = unpainted, 1..=16 = filament
    Leaf(u8),
    /// Subdivided region; `children.len() - 1` sides are split
    Split {
        /// Which side is special: the split side for a one-way split,
        /// the side kept whole for a two-way split, rotation otherwise
        special_side: u8,
        /// Child nodes in wire order (2..=4 of them)
        children: Vec<SegNode>,
    },
}

impl SegNode {
    /// Leaf constructor, for readability at call sites
    pub fn leaf(state: u8) -> Self {
        SegNode::Leaf(state)
    }

    /// Whether this node is a leaf with the given state
    pub fn is_leaf_with(&self, state: u8) -> bool {
        matches!(self, SegNode::Leaf(s) if *s == state)
    }

    /// Highest leaf state anywhere in the tree
    pub fn max_state(&self) -> u8 {
        match self {
            SegNode::Leaf(s) => *s,
            SegNode::Split { children, .. } => {
                children.iter().map(SegNode::max_state).max().unwrap_or(0)
            }
        }
    }
}

/// Parse a hexadecimal segmentation code into its tree.
///
/// Accepts upper- or lowercase hex digits; the canonical form written by
/// [`encode_code`] is uppercase. Trailing zero digits are tolerated,
/// trailing nonzero bits are rejected.
pub fn parse_code(raw: &str) -> Result<SegNode, CodeError> {
    if raw.is_empty() {
        return Err(CodeError::Empty);
    }

    // Last character first, each nibble LSB-first.
    let mut bits = Vec::with_capacity(raw.len() * 4);
    for ch in raw.chars().rev() {
        let nibble = ch.to_digit(16).ok_or(CodeError::InvalidDigit(ch))? as u8;
        for i in 0..4 {
            bits.push(nibble & (1 << i) != 0);
        }
    }

    let mut cursor = BitCursor { bits: &bits, pos: 0 };
    let root = parse_node(&mut cursor, 0)?;

    if cursor.rest().iter().any(|bit| *bit) {
        return Err(CodeError::TrailingBits);
    }
    Ok(root)
}

/// Encode a segmentation tree into its canonical hexadecimal form.
///
/// Fails if a leaf state exceeds [`STATE_MAX`] or a split node has an
/// impossible shape; both indicate a bug in the caller rather than bad
/// input data.
pub fn encode_code(node: &SegNode) -> Result<String, CodeError> {
    let mut nibbles = Vec::new();
    encode_node(node, &mut nibbles)?;

    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    let out = nibbles
        .iter()
        .rev()
        .map(|n| HEX[*n as usize] as char)
        .collect();
    Ok(out)
}

struct BitCursor<'a> {
    bits: &'a [bool],
    pos: usize,
}

impl BitCursor<'_> {
    fn take(&mut self, count: usize) -> Result<u8, CodeError> {
        if self.pos + count > self.bits.len() {
            return Err(CodeError::Truncated);
        }
        let mut value = 0u8;
        for i in 0..count {
            if self.bits[self.pos + i] {
                value |= 1 << i;
            }
        }
        self.pos += count;
        Ok(value)
    }

    fn rest(&self) -> &[bool] {
        &self.bits[self.pos..]
    }
}

fn parse_node(cursor: &mut BitCursor, depth: usize) -> Result<SegNode, CodeError> {
    if depth > MAX_CODE_DEPTH {
        return Err(CodeError::DepthExceeded);
    }

    let split_sides = cursor.take(2)?;
    if split_sides == 0 {
        let state = cursor.take(2)?;
        let state = if state == 0b11 {
            let extra = cursor.take(4)?;
            3 + extra
        } else {
            state
        };
        if state > STATE_MAX {
            return Err(CodeError::StateOutOfRange(state));
        }
        return Ok(SegNode::Leaf(state));
    }

    let special_side = cursor.take(2)?;
    if special_side > 2 {
        return Err(CodeError::InvalidSplit(format!(
            "special side {special_side} out of range"
        )));
    }
    let mut children = Vec::with_capacity(split_sides as usize + 1);
    for _ in 0..=split_sides {
        children.push(parse_node(cursor, depth + 1)?);
    }
    Ok(SegNode::Split {
        special_side,
        children,
    })
}

fn encode_node(node: &SegNode, nibbles: &mut Vec<u8>) -> Result<(), CodeError> {
    match node {
        SegNode::Leaf(state) => {
            if *state > STATE_MAX {
                return Err(CodeError::StateOutOfRange(*state));
            }
            if *state < 3 {
                nibbles.push(*state << 2);
            } else {
                nibbles.push(0b11 << 2);
                nibbles.push(*state - 3);
            }
        }
        SegNode::Split {
            special_side,
            children,
        } => {
            if !(2..=4).contains(&children.len()) {
                return Err(CodeError::InvalidSplit(format!(
                    "split with {} children",
                    children.len()
                )));
            }
            if *special_side > 2 {
                return Err(CodeError::InvalidSplit(format!(
                    "special side {special_side} out of range"
                )));
            }
            let split_sides = (children.len() - 1) as u8;
            nibbles.push(split_sides | (special_side << 2));
            for child in children {
                encode_node(child, nibbles)?;
            }
        }
    }
    Ok(())
}

/// A point in the barycentric plane of the triangle being decoded
pub type Point = [f64; 2];

/// Corner coordinates of a (sub-)triangle, counter-clockwise
pub type Corners = [Point; 3];

/// The root triangle in its canonical barycentric frame
pub const UNIT_TRIANGLE: Corners = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]];

fn midpoint(a: Point, b: Point) -> Point {
    [(a[0] + b[0]) / 2.0, (a[1] + b[1]) / 2.0]
}

/// Sub-triangle corners produced by splitting `sides` sides of `corners`
/// with the given special side, in wire child order.
pub fn split_corners(corners: &Corners, sides: u8, special_side: u8) -> Vec<Corners> {
    let s = special_side as usize;
    // Rotate so the special side runs from v[0] to v[1].
    let v = [corners[s % 3], corners[(s + 1) % 3], corners[(s + 2) % 3]];
    match sides {
        1 => {
            let m = midpoint(v[0], v[1]);
            vec![[v[0], m, v[2]], [m, v[1], v[2]]]
        }
        2 => {
            let m1 = midpoint(v[1], v[2]);
            let m2 = midpoint(v[2], v[0]);
            vec![[v[0], v[1], m1], [v[0], m1, m2], [m2, m1, v[2]]]
        }
        3 => {
            let m0 = midpoint(v[0], v[1]);
            let m1 = midpoint(v[1], v[2]);
            let m2 = midpoint(v[2], v[0]);
            vec![
                [v[0], m0, m2],
                [m0, v[1], m1],
                [m2, m1, v[2]],
                [m0, m1, m2],
            ]
        }
        _ => unreachable!("split_corners called with sides {sides}"),
    }
}

/// The four cells of a full midpoint subdivision, in wire child order.
///
/// The translator only ever emits this split shape.
pub fn quad_corners(corners: &Corners) -> [Corners; 4] {
    let children = split_corners(corners, 3, 0);
    [children[0], children[1], children[2], children[3]]
}

/// Twice the signed area of a triangle given by its corners
pub fn area2(c: &Corners) -> f64 {
    (c[1][0] - c[0][0]) * (c[2][1] - c[0][1]) - (c[2][0] - c[0][0]) * (c[1][1] - c[0][1])
}
