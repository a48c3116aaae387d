//! Machine registers and compact register sets.
//!
//! Registers are identified by a single byte: `0..32` are the general purpose
//! registers, `32..64` the floating point registers, and the remaining indices
//! name the special registers written implicitly by some operations (`hi`/`lo`
//! for division, `fcc` for float comparisons).
//!
//! [`RegSet`] is a 128-bit set used everywhere the engine needs to talk about
//! "which registers": consumed sets on instructions, barriers while popping the
//! operand stack, and modified-register summaries of reconstructed nodes.

use std::fmt;

const GPR_NAMES: [&str; 32] = [
    "r0", "at", "v0", "v1", "a0", "a1", "a2", "a3", "t0", "t1", "t2", "t3", "t4", "t5", "t6",
    "t7", "s0", "s1", "s2", "s3", "s4", "s5", "s6", "s7", "t8", "t9", "k0", "k1", "gp", "sp",
    "fp", "ra",
];

const FPR_NAMES: [&str; 32] = [
    "f0", "f1", "f2", "f3", "f4", "f5", "f6", "f7", "f8", "f9", "f10", "f11", "f12", "f13", "f14",
    "f15", "f16", "f17", "f18", "f19", "f20", "f21", "f22", "f23", "f24", "f25", "f26", "f27",
    "f28", "f29", "f30", "f31",
];

const SPECIAL_NAMES: [&str; 3] = ["hi", "lo", "fcc"];

/// The class a [`Register`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegClass {
    /// General purpose integer register
    Gpr,
    /// Floating point register
    Fpr,
    /// Implicitly written special register (`hi`, `lo`, `fcc`)
    Special,
}

/// A single machine register.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Register(u8);

impl Register {
    /// Hard-wired zero register.
    pub const R0: Register = Register(0);
    /// Assembler temporary.
    pub const AT: Register = Register(1);
    /// First return value register.
    pub const V0: Register = Register(2);
    /// Second return value register.
    pub const V1: Register = Register(3);
    /// First argument register.
    pub const A0: Register = Register(4);
    /// Second argument register.
    pub const A1: Register = Register(5);
    /// Third argument register.
    pub const A2: Register = Register(6);
    /// Fourth argument register.
    pub const A3: Register = Register(7);
    /// Temporary `t0`.
    pub const T0: Register = Register(8);
    /// Temporary `t1`.
    pub const T1: Register = Register(9);
    /// Temporary `t2`.
    pub const T2: Register = Register(10);
    /// Temporary `t3`.
    pub const T3: Register = Register(11);
    /// Saved `s6`, holds the current process.
    pub const S6: Register = Register(22);
    /// Saved `s7`, holds the symbol table base.
    pub const S7: Register = Register(23);
    /// Function call target register.
    pub const T9: Register = Register(25);
    /// Global pointer, used as a plain saved register.
    pub const GP: Register = Register(28);
    /// Stack pointer.
    pub const SP: Register = Register(29);
    /// Function base pointer, used for label addressing.
    pub const FP: Register = Register(30);
    /// Return address.
    pub const RA: Register = Register(31);
    /// Division remainder.
    pub const HI: Register = Register(64);
    /// Division quotient.
    pub const LO: Register = Register(65);
    /// Float comparison condition flag.
    pub const FCC: Register = Register(66);

    /// Number of distinct register indices.
    pub const COUNT: usize = 67;

    /// Argument registers in calling-convention order.
    pub const ARGS: [Register; 8] = [
        Register(4),
        Register(5),
        Register(6),
        Register(7),
        Register(8),
        Register(9),
        Register(10),
        Register(11),
    ];

    /// Returns the general purpose register `n`, or `None` if out of range.
    #[must_use]
    pub const fn gpr(n: u8) -> Option<Register> {
        if n < 32 {
            Some(Register(n))
        } else {
            None
        }
    }

    /// Returns the floating point register `f<n>`, or `None` if out of range.
    #[must_use]
    pub const fn fpr(n: u8) -> Option<Register> {
        if n < 32 {
            Some(Register(32 + n))
        } else {
            None
        }
    }

    /// Creates a register from its raw index.
    #[must_use]
    pub const fn from_index(index: usize) -> Option<Register> {
        if index < Self::COUNT {
            Some(Register(index as u8))
        } else {
            None
        }
    }

    /// Returns the raw index of this register (`0..Register::COUNT`).
    #[must_use]
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Returns the class of this register.
    #[must_use]
    pub const fn class(self) -> RegClass {
        match self.0 {
            0..=31 => RegClass::Gpr,
            32..=63 => RegClass::Fpr,
            _ => RegClass::Special,
        }
    }

    /// Returns `true` for the floating point registers.
    #[must_use]
    pub const fn is_float(self) -> bool {
        matches!(self.class(), RegClass::Fpr)
    }

    /// Returns the position of this register in the argument order, if any.
    #[must_use]
    pub fn arg_index(self) -> Option<usize> {
        Self::ARGS.iter().position(|r| *r == self)
    }

    /// Returns the assembler name of this register.
    #[must_use]
    pub fn name(self) -> &'static str {
        let idx = self.0 as usize;
        match self.class() {
            RegClass::Gpr => GPR_NAMES[idx],
            RegClass::Fpr => FPR_NAMES[idx - 32],
            RegClass::Special => SPECIAL_NAMES.get(idx - 64).copied().unwrap_or("?"),
        }
    }
}

impl fmt::Debug for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A set of registers.
///
/// Stored as a single `u128`, so it is `Copy` and all set operations are
/// branch free.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RegSet(u128);

impl RegSet {
    /// Creates an empty set.
    #[must_use]
    pub const fn new() -> Self {
        RegSet(0)
    }

    /// Creates a set holding a single register.
    #[must_use]
    pub const fn of(reg: Register) -> Self {
        RegSet(1u128 << reg.0)
    }

    /// Adds `reg` to the set. Returns `true` if it was not present before.
    pub fn insert(&mut self, reg: Register) -> bool {
        let bit = 1u128 << reg.0;
        let added = self.0 & bit == 0;
        self.0 |= bit;
        added
    }

    /// Removes `reg` from the set. Returns `true` if it was present.
    pub fn remove(&mut self, reg: Register) -> bool {
        let bit = 1u128 << reg.0;
        let present = self.0 & bit != 0;
        self.0 &= !bit;
        present
    }

    /// Returns `true` if `reg` is in the set.
    #[must_use]
    #[inline]
    pub const fn contains(&self, reg: Register) -> bool {
        self.0 & (1u128 << reg.0) != 0
    }

    /// Returns `true` if the set is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Returns the number of registers in the set.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Returns the union of both sets.
    #[must_use]
    pub const fn union(self, other: RegSet) -> RegSet {
        RegSet(self.0 | other.0)
    }

    /// Returns the registers present in both sets.
    #[must_use]
    pub const fn intersection(self, other: RegSet) -> RegSet {
        RegSet(self.0 & other.0)
    }

    /// Returns the registers of `self` that are not in `other`.
    #[must_use]
    pub const fn difference(self, other: RegSet) -> RegSet {
        RegSet(self.0 & !other.0)
    }

    /// Returns `true` if both sets share at least one register.
    #[must_use]
    pub const fn intersects(&self, other: &RegSet) -> bool {
        self.0 & other.0 != 0
    }

    /// Adds every register of `other` to this set.
    pub fn union_with(&mut self, other: &RegSet) {
        self.0 |= other.0;
    }

    /// Removes every register of `other` from this set.
    pub fn difference_with(&mut self, other: &RegSet) {
        self.0 &= !other.0;
    }

    /// Iterates the registers in ascending index order.
    pub fn iter(&self) -> impl Iterator<Item = Register> + '_ {
        let bits = self.0;
        (0..Register::COUNT)
            .filter(move |i| bits & (1u128 << i) != 0)
            .filter_map(Register::from_index)
    }
}

impl fmt::Debug for RegSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl FromIterator<Register> for RegSet {
    fn from_iter<T: IntoIterator<Item = Register>>(iter: T) -> Self {
        let mut set = RegSet::new();
        for reg in iter {
            set.insert(reg);
        }
        set
    }
}

impl Extend<Register> for RegSet {
    fn extend<T: IntoIterator<Item = Register>>(&mut self, iter: T) {
        for reg in iter {
            self.insert(reg);
        }
    }
}

impl From<Register> for RegSet {
    fn from(reg: Register) -> Self {
        RegSet::of(reg)
    }
}
