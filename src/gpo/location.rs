//! GPO Location
//! Core Principle: A session targets exactly one GPO and one registry section per call

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;

use super::sid::assert_valid_sid;

/// Registry root inside a GPO. The discriminants match the native `GPO_SECTION_*` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PolicySection {
    User = 1,
    Machine = 2,
}

impl PolicySection {
    pub fn is_machine(self) -> bool {
        matches!(self, PolicySection::Machine)
    }

    pub fn from_machine_flag(is_machine: bool) -> Self {
        if is_machine {
            PolicySection::Machine
        } else {
            PolicySection::User
        }
    }
}

impl fmt::Display for PolicySection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicySection::User => f.write_str("User"),
            PolicySection::Machine => f.write_str("Machine"),
        }
    }
}

/// Which GPO a session opens.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupPolicyLocation {
    ThisComputer,
    ThisComputersLocalUserOrGroup(String),
    RemoteComputer(String),
    DirectoryService(String),
}

impl GroupPolicyLocation {
    /// Local GPO for `sid`, or the computer's own GPO when no principal is given.
    /// Principals that cannot own a local GPO are rejected here, before any native call.
    pub fn for_principal(sid: Option<&str>) -> Result<Self> {
        match sid {
            None => Ok(GroupPolicyLocation::ThisComputer),
            Some(sid) => {
                assert_valid_sid(sid)?;
                Ok(GroupPolicyLocation::ThisComputersLocalUserOrGroup(sid.to_string()))
            }
        }
    }

    /// Location argument passed to the native open call.
    pub fn parameter(&self) -> Option<&str> {
        match self {
            GroupPolicyLocation::ThisComputer => None,
            GroupPolicyLocation::ThisComputersLocalUserOrGroup(p)
            | GroupPolicyLocation::RemoteComputer(p)
            | GroupPolicyLocation::DirectoryService(p) => Some(p),
        }
    }
}

impl fmt::Display for GroupPolicyLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupPolicyLocation::ThisComputer => f.write_str("this computer"),
            GroupPolicyLocation::ThisComputersLocalUserOrGroup(sid) => {
                write!(f, "local principal {}", sid)
            }
            GroupPolicyLocation::RemoteComputer(name) => write!(f, "remote computer {}", name),
            GroupPolicyLocation::DirectoryService(path) => write!(f, "directory service {}", path),
        }
    }
}

/// Flags for the native open calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpenFlags(u32);

impl OpenFlags {
    pub const LOAD_REGISTRY: OpenFlags = OpenFlags(0x0000_0001);
    pub const READ_ONLY: OpenFlags = OpenFlags(0x0000_0002);

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: OpenFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for OpenFlags {
    type Output = OpenFlags;

    fn bitor(self, rhs: OpenFlags) -> OpenFlags {
        OpenFlags(self.0 | rhs.0)
    }
}

impl Default for OpenFlags {
    fn default() -> Self {
        OpenFlags::LOAD_REGISTRY
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GroupPolicyError;

    #[test]
    fn principal_location_validates_sid() {
        assert_eq!(
            GroupPolicyLocation::for_principal(None).unwrap(),
            GroupPolicyLocation::ThisComputer
        );
        assert_eq!(
            GroupPolicyLocation::for_principal(Some("S-1-5-21-1-2-3-1001")).unwrap(),
            GroupPolicyLocation::ThisComputersLocalUserOrGroup("S-1-5-21-1-2-3-1001".into())
        );
        assert!(matches!(
            GroupPolicyLocation::for_principal(Some("S-1-5-18")),
            Err(GroupPolicyError::InvalidSid { .. })
        ));
    }

    #[test]
    fn open_flags_combine() {
        let flags = OpenFlags::LOAD_REGISTRY | OpenFlags::READ_ONLY;
        assert_eq!(flags.bits(), 3);
        assert!(flags.contains(OpenFlags::READ_ONLY));
        assert!(!OpenFlags::default().contains(OpenFlags::READ_ONLY));
    }
}
