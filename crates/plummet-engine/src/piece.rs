use rand::{Rng, distr::StandardUniform, prelude::Distribution};

/// Enum representing the type of piece.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PieceKind {
    /// I-piece.
    I = 0,
    /// O-piece.
    O = 1,
    /// S-piece.
    S = 2,
    /// Z-piece.
    Z = 3,
    /// J-piece.
    J = 4,
    /// L-piece.
    L = 5,
    /// T-piece.
    T = 6,
}

impl Distribution<PieceKind> for StandardUniform {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> PieceKind {
        PieceKind::ALL[rng.random_range(0..PieceKind::LEN)]
    }
}

impl PieceKind {
    /// Number of piece types (7).
    pub const LEN: usize = 7;

    /// All piece types, in catalog order.
    pub const ALL: [PieceKind; PieceKind::LEN] = [
        PieceKind::I,
        PieceKind::O,
        PieceKind::S,
        PieceKind::Z,
        PieceKind::J,
        PieceKind::L,
        PieceKind::T,
    ];

    /// Returns the distinct orientations of this piece.
    ///
    /// Rotations that produce a cell pattern identical to an earlier one
    /// (the I, S, and Z pieces repeat after two rotations, the O piece after
    /// one) are omitted, so enumerating placements over this slice never
    /// visits the same orientation twice.
    #[must_use]
    pub(crate) fn variants(self) -> &'static [PieceVariant] {
        &PIECE_VARIANTS[self as usize][..DISTINCT_ROTATIONS[self as usize]]
    }

    /// Returns the single character representation of this piece kind.
    ///
    /// # Examples
    ///
    /// ```
    /// use plummet_engine::PieceKind;
    ///
    /// assert_eq!(PieceKind::I.as_char(), 'I');
    /// assert_eq!(PieceKind::T.as_char(), 'T');
    /// ```
    #[must_use]
    pub const fn as_char(self) -> char {
        match self {
            PieceKind::I => 'I',
            PieceKind::O => 'O',
            PieceKind::S => 'S',
            PieceKind::Z => 'Z',
            PieceKind::J => 'J',
            PieceKind::L => 'L',
            PieceKind::T => 'T',
        }
    }

    /// Parses a piece kind from a single character.
    #[must_use]
    pub const fn from_char(c: char) -> Option<Self> {
        match c {
            'I' => Some(PieceKind::I),
            'O' => Some(PieceKind::O),
            'S' => Some(PieceKind::S),
            'Z' => Some(PieceKind::Z),
            'J' => Some(PieceKind::J),
            'L' => Some(PieceKind::L),
            'T' => Some(PieceKind::T),
            _ => None,
        }
    }
}

/// One orientation of a piece, normalized to the top-left of its bounding box.
///
/// Rows are bitmasks with bit `x` representing column `x` of the box
/// (bit 0 is the leftmost column). Row 0 is the top row. Only the first
/// `height` rows contain cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PieceVariant {
    rows: [u16; 4],
    width: u8,
    height: u8,
}

impl PieceVariant {
    #[must_use]
    pub(crate) fn rows(&self) -> &[u16] {
        &self.rows[..usize::from(self.height)]
    }

    #[must_use]
    pub(crate) fn width(&self) -> usize {
        usize::from(self.width)
    }

    #[must_use]
    pub(crate) fn height(&self) -> usize {
        usize::from(self.height)
    }
}

/// Number of distinct orientations per piece kind, indexed by `PieceKind`.
const DISTINCT_ROTATIONS: [usize; PieceKind::LEN] = [2, 1, 2, 2, 4, 4, 4];

/// Rotates a piece mask 90° clockwise within its `size`×`size` box.
const fn rotate_cw(rows: [u16; 4], size: usize) -> [u16; 4] {
    let mut out = [0u16; 4];
    let mut y = 0;
    while y < size {
        let mut x = 0;
        while x < size {
            if rows[size - 1 - x] & (1 << y) != 0 {
                out[y] |= 1 << x;
            }
            x += 1;
        }
        y += 1;
    }
    out
}

/// Shifts a mask to the top-left of its box and records its extent.
const fn normalized(rows: [u16; 4]) -> PieceVariant {
    let mut rows = rows;
    while (rows[0] | rows[1] | rows[2] | rows[3]) & 1 == 0 {
        rows = [rows[0] >> 1, rows[1] >> 1, rows[2] >> 1, rows[3] >> 1];
    }
    while rows[0] == 0 {
        rows = [rows[1], rows[2], rows[3], 0];
    }
    let union = rows[0] | rows[1] | rows[2] | rows[3];
    #[expect(clippy::cast_possible_truncation)]
    let width = (16 - union.leading_zeros()) as u8;
    let mut height: u8 = 0;
    while (height as usize) < 4 && rows[height as usize] != 0 {
        height += 1;
    }
    PieceVariant {
        rows,
        width,
        height,
    }
}

/// Generates all 4 normalized orientations of a piece by rotating clockwise.
const fn variant_rotations(size: usize, base: [u16; 4]) -> [PieceVariant; 4] {
    let mut grids = [base; 4];
    let mut i = 1;
    while i < 4 {
        grids[i] = rotate_cw(grids[i - 1], size);
        i += 1;
    }
    [
        normalized(grids[0]),
        normalized(grids[1]),
        normalized(grids[2]),
        normalized(grids[3]),
    ]
}

static PIECE_VARIANTS: [[PieceVariant; 4]; PieceKind::LEN] = [
    // I-piece
    variant_rotations(4, [0b0000, 0b1111, 0b0000, 0b0000]),
    // O-piece
    variant_rotations(2, [0b011, 0b011, 0b000, 0b000]),
    // S-piece
    variant_rotations(3, [0b110, 0b011, 0b000, 0b000]),
    // Z-piece
    variant_rotations(3, [0b011, 0b110, 0b000, 0b000]),
    // J-piece
    variant_rotations(3, [0b001, 0b111, 0b000, 0b000]),
    // L-piece
    variant_rotations(3, [0b100, 0b111, 0b000, 0b000]),
    // T-piece
    variant_rotations(3, [0b010, 0b111, 0b000, 0b000]),
];
