//! Host environment checks
//! Core Principle: Fail fast before any policy work starts

#[cfg(windows)]
use tracing::info;

use crate::error::{GroupPolicyError, Result};

/// The current process token belongs to the Administrators group.
pub fn is_current_user_administrator() -> bool {
    #[cfg(windows)]
    {
        super::native::is_user_an_admin()
    }
    #[cfg(not(windows))]
    {
        false
    }
}

/// Ask Windows to reapply machine then user policy, with `RP_FORCE` when `force` is set.
pub fn refresh_policy(force: bool) -> Result<()> {
    #[cfg(windows)]
    {
        super::native::refresh_policy(true, force)?;
        super::native::refresh_policy(false, force)?;
        info!(force, "policy refresh requested");
        Ok(())
    }
    #[cfg(not(windows))]
    {
        let _ = force;
        Err(GroupPolicyError::PlatformUnsupported("policy refresh"))
    }
}

pub fn is_group_policy_service_running() -> Result<bool> {
    #[cfg(windows)]
    {
        super::native::gpsvc_running()
    }
    #[cfg(not(windows))]
    {
        Err(GroupPolicyError::PlatformUnsupported("service status query"))
    }
}

/// The Group Policy client service is not disabled.
pub fn is_group_policy_service_configured_correctly() -> Result<bool> {
    #[cfg(windows)]
    {
        let start_type = super::native::gpsvc_start_type()?;
        Ok(!super::native::is_service_disabled(start_type))
    }
    #[cfg(not(windows))]
    {
        Err(GroupPolicyError::PlatformUnsupported("service configuration query"))
    }
}

/// Running and not disabled, or a `ServiceUnavailable` error saying which check failed.
pub fn ensure_group_policy_service() -> Result<()> {
    if !is_group_policy_service_configured_correctly()? {
        return Err(GroupPolicyError::ServiceUnavailable("gpsvc is disabled".to_string()));
    }
    if !is_group_policy_service_running()? {
        return Err(GroupPolicyError::ServiceUnavailable("gpsvc is not running".to_string()));
    }
    Ok(())
}

#[cfg(all(test, not(windows)))]
mod tests {
    use super::*;

    #[test]
    fn non_windows_hosts_report_unsupported() {
        assert!(!is_current_user_administrator());
        assert!(matches!(refresh_policy(true), Err(GroupPolicyError::PlatformUnsupported(_))));
        assert!(matches!(
            is_group_policy_service_running(),
            Err(GroupPolicyError::PlatformUnsupported(_))
        ));
        assert!(matches!(
            ensure_group_policy_service(),
            Err(GroupPolicyError::PlatformUnsupported(_))
        ));
    }
}
