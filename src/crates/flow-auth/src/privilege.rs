//! Privilege bitmask (spec §6.4).
//!
//! Stringly-typed conventions diverged in the system this was distilled
//! from (`"none"/"read"/.../"all"` vs `"NO_PRIVILEGES"/.../"ALL_PRIVILEGES"`)
//! — an Open Question the spec leaves either way is fine so long as the
//! chosen strings are used consistently. This crate picks the lowercase
//! short form (see DESIGN.md).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Privilege(u8);

impl Privilege {
    pub const NONE: Privilege = Privilege(0);
    pub const READ: Privilege = Privilege(1);
    pub const WRITE: Privilege = Privilege(1 << 1);
    pub const DELETE: Privilege = Privilege(1 << 2);
    /// The union of every bit, plus treated as a standalone sentinel by
    /// `allows` per spec §6.4 step 5 ("allow if `(p & required) != 0` or
    /// `p == All`").
    pub const ALL: Privilege = Privilege(Self::READ.0 | Self::WRITE.0 | Self::DELETE.0);

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, other: Privilege) -> bool {
        self.0 & other.0 == other.0
    }

    /// Does this privilege authorize an action that `required` gates?
    pub fn allows(self, required: Privilege) -> bool {
        (self.0 & required.0) != 0 || self == Privilege::ALL
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Privilege::NONE => "none",
            Privilege::READ => "read",
            Privilege::WRITE => "write",
            Privilege::DELETE => "delete",
            Privilege::ALL => "all",
            _ => "mixed",
        }
    }
}

impl std::ops::BitOr for Privilege {
    type Output = Privilege;
    fn bitor(self, rhs: Privilege) -> Privilege {
        Privilege(self.0 | rhs.0)
    }
}

impl std::fmt::Display for Privilege {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_satisfies_any_single_requirement() {
        assert!(Privilege::ALL.allows(Privilege::READ));
        assert!(Privilege::ALL.allows(Privilege::DELETE));
    }

    #[test]
    fn none_satisfies_nothing() {
        assert!(!Privilege::NONE.allows(Privilege::READ));
    }

    #[test]
    fn write_does_not_satisfy_delete() {
        assert!(!Privilege::WRITE.allows(Privilege::DELETE));
    }

    #[test]
    fn display_uses_lowercase_convention() {
        assert_eq!(Privilege::ALL.to_string(), "all");
        assert_eq!(Privilege::NONE.to_string(), "none");
    }
}
