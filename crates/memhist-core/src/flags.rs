//! Protection/tracking bit flags.
//!
//! The engine has no dependency on a `bitflags`-style crate; this follows
//! the newtype-over-primitive idiom used for small bit sets elsewhere in
//! this codebase (see `mos-6502::registers::Status`), extended with the
//! set-algebra a protection mask needs.

/// Writes to the region raise a violation.
pub const FORBID_WRITE: u8 = 1;
/// Reads from the region raise a violation.
pub const FORBID_READ: u8 = 2;
/// Fetches from the region raise a violation.
pub const FORBID_EXEC: u8 = 4;
/// Writes into the region are recorded into its history ring.
pub const TRACK_WRITES: u8 = 8;

/// A region's protection mask: a subset of
/// `{FORBID_WRITE, FORBID_READ, FORBID_EXEC, TRACK_WRITES}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProtFlags(u8);

impl ProtFlags {
    pub const EMPTY: Self = Self(0);
    pub const FORBID_WRITE: Self = Self(FORBID_WRITE);
    pub const FORBID_READ: Self = Self(FORBID_READ);
    pub const FORBID_EXEC: Self = Self(FORBID_EXEC);
    pub const TRACK_WRITES: Self = Self(TRACK_WRITES);

    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[must_use]
    pub const fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    /// `self` with every bit set in `other` cleared.
    #[must_use]
    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }
}

impl core::ops::BitOr for ProtFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

/// The globally-enabled access kinds, from `--enable-tracking`.
///
/// Always a subset of `{FORBID_WRITE, FORBID_READ, FORBID_EXEC}` bit
/// positions; never carries `TRACK_WRITES`. Kept as a distinct type so a
/// protection mask and an enabled-kind set can't be confused at a call
/// site even though they share a bit layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnabledKinds(u8);

impl EnabledKinds {
    #[must_use]
    pub const fn none() -> Self {
        Self(0)
    }

    #[must_use]
    pub const fn all() -> Self {
        Self(FORBID_WRITE | FORBID_READ | FORBID_EXEC)
    }

    #[must_use]
    pub const fn writes_enabled(self) -> bool {
        self.0 & FORBID_WRITE != 0
    }

    #[must_use]
    pub const fn reads_enabled(self) -> bool {
        self.0 & FORBID_READ != 0
    }

    #[must_use]
    pub const fn execs_enabled(self) -> bool {
        self.0 & FORBID_EXEC != 0
    }

    /// Intersect a requested `SET_PROTECTION`/`CLEAR_PROTECTION` mask
    /// against the enabled kinds. Callers never pass `TRACK_WRITES` here;
    /// registering a tracked region is gated separately, by
    /// `writes_enabled`.
    #[must_use]
    pub const fn filter(self, flags: ProtFlags) -> ProtFlags {
        ProtFlags(flags.bits() & self.0)
    }

    /// Parse a subset of the letters `R`, `W`, `X` (any order, any case).
    pub fn parse(s: &str) -> Result<Self, InvalidEnabledKinds> {
        let mut bits = 0u8;
        for c in s.chars() {
            bits |= match c.to_ascii_uppercase() {
                'R' => FORBID_READ,
                'W' => FORBID_WRITE,
                'X' => FORBID_EXEC,
                _ => return Err(InvalidEnabledKinds(c)),
            };
        }
        Ok(Self(bits))
    }
}

/// An unrecognised character in an `--enable-tracking` argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidEnabledKinds(pub char);

impl core::fmt::Display for InvalidEnabledKinds {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "invalid access-kind letter '{}' (expected one of R, W, X)", self.0)
    }
}

impl std::error::Error for InvalidEnabledKinds {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_and_contains() {
        let mask = ProtFlags::FORBID_WRITE | ProtFlags::FORBID_READ;
        assert!(mask.contains(ProtFlags::FORBID_WRITE));
        assert!(mask.contains(ProtFlags::FORBID_READ));
        assert!(!mask.contains(ProtFlags::FORBID_EXEC));
    }

    #[test]
    fn difference_clears_only_requested_bits() {
        let mask = ProtFlags::FORBID_WRITE | ProtFlags::FORBID_READ | ProtFlags::TRACK_WRITES;
        let cleared = mask.difference(ProtFlags::FORBID_READ);
        assert!(cleared.contains(ProtFlags::FORBID_WRITE));
        assert!(cleared.contains(ProtFlags::TRACK_WRITES));
        assert!(!cleared.contains(ProtFlags::FORBID_READ));
    }

    #[test]
    fn parse_enabled_kinds() {
        let rw = EnabledKinds::parse("RW").expect("valid");
        assert!(rw.reads_enabled());
        assert!(rw.writes_enabled());
        assert!(!rw.execs_enabled());
        assert!(EnabledKinds::parse("rwx").expect("valid").execs_enabled());
        assert!(EnabledKinds::parse("Q").is_err());
    }

    #[test]
    fn filter_drops_disabled_kinds() {
        let enabled = EnabledKinds::parse("R").expect("valid");
        let requested = ProtFlags::FORBID_WRITE | ProtFlags::FORBID_READ;
        let filtered = enabled.filter(requested);
        assert!(filtered.contains(ProtFlags::FORBID_READ));
        assert!(!filtered.contains(ProtFlags::FORBID_WRITE));
    }
}
