//! Principal guard for local GPOs

use crate::error::{GroupPolicyError, Result};

/// Well-known SIDs that cannot own a per-principal local GPO.
const RESTRICTED_SIDS: &[&str] = &[
    "S-1-0-0",      // Null
    "S-1-1-0",      // World
    "S-1-2-0",      // Local
    "S-1-3-0",      // Creator Owner
    "S-1-3-1",      // Creator Group
    "S-1-3-2",      // Creator Owner Server
    "S-1-3-3",      // Creator Group Server
    "S-1-5",        // NT Authority
    "S-1-5-1",      // Dialup
    "S-1-5-2",      // Network
    "S-1-5-3",      // Batch
    "S-1-5-4",      // Interactive
    "S-1-5-6",      // Service
    "S-1-5-7",      // Anonymous
    "S-1-5-8",      // Proxy
    "S-1-5-9",      // Enterprise Controllers
    "S-1-5-10",     // Self
    "S-1-5-11",     // Authenticated Users
    "S-1-5-12",     // Restricted Code
    "S-1-5-13",     // Terminal Server
    "S-1-5-14",     // Remote Logon
    "S-1-5-18",     // Local System
    "S-1-5-19",     // Local Service
    "S-1-5-20",     // Network Service
    "S-1-5-32-544", // Administrators
    "S-1-5-32-545", // Users
    "S-1-5-32-546", // Guests
    "S-1-5-32-547", // Power Users
    "S-1-5-32-548", // Account Operators
    "S-1-5-32-549", // System Operators
    "S-1-5-32-550", // Print Operators
    "S-1-5-32-551", // Backup Operators
    "S-1-5-32-552", // Replicators
];

const LOGON_SESSION_PREFIX: &str = "S-1-5-5-";

/// Reject SIDs that `OpenLocalMachineGPOForPrincipal` does not accept.
pub fn assert_valid_sid(sid: &str) -> Result<&str> {
    if sid.starts_with(LOGON_SESSION_PREFIX) {
        return Err(GroupPolicyError::InvalidSid {
            sid: sid.to_string(),
            reason: "logon session IDs are not allowed",
        });
    }

    if RESTRICTED_SIDS.contains(&sid) {
        return Err(GroupPolicyError::InvalidSid {
            sid: sid.to_string(),
            reason: "well-known SIDs are not allowed",
        });
    }

    Ok(sid)
}
