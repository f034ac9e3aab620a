//! Native Windows backend

mod native_methods;
mod object;

pub use object::{NativeGroupPolicyObject, NativeProvider};

use crate::error::{GroupPolicyError, Result};

use super::apartment::ApartmentState;
use native_methods as nm;

pub(crate) fn co_initialize(state: ApartmentState) -> i32 {
    let model = match state {
        ApartmentState::Sta => nm::COINIT_APARTMENTTHREADED,
        ApartmentState::Mta => nm::COINIT_MULTITHREADED,
    };
    unsafe { nm::CoInitializeEx(std::ptr::null(), model) }
}

pub(crate) fn co_uninitialize() {
    unsafe { nm::CoUninitialize() }
}

pub(crate) fn enter_critical_policy_section(machine: bool) -> Result<isize> {
    let handle = unsafe { nm::EnterCriticalPolicySection(machine as i32) };
    if handle == 0 {
        let code = unsafe { nm::GetLastError() } as i32;
        return Err(GroupPolicyError::native(
            "Cannot enter the critical policy section.",
            nm::hresult_from_win32(code),
        ));
    }
    Ok(handle)
}

pub(crate) fn leave_critical_policy_section(handle: isize) {
    unsafe {
        nm::LeaveCriticalPolicySection(handle);
    }
}

pub(crate) fn is_user_an_admin() -> bool {
    unsafe { nm::IsUserAnAdmin() != 0 }
}

pub(crate) fn refresh_policy(machine: bool, force: bool) -> Result<()> {
    let options = if force { nm::RP_FORCE } else { 0 };
    if unsafe { nm::RefreshPolicyEx(machine as i32, options) } == 0 {
        let code = unsafe { nm::GetLastError() } as i32;
        let context = if machine {
            "Cannot refresh the machine policy."
        } else {
            "Cannot refresh the user policy."
        };
        return Err(GroupPolicyError::native(context, nm::hresult_from_win32(code)));
    }
    Ok(())
}

/// Service handle closed on drop.
struct ServiceHandle(nm::SC_HANDLE);

impl Drop for ServiceHandle {
    fn drop(&mut self) {
        unsafe {
            nm::CloseServiceHandle(self.0);
        }
    }
}

fn open_gpsvc(access: u32) -> Result<(ServiceHandle, ServiceHandle)> {
    let access_manager = nm::SC_MANAGER_ENUMERATE_SERVICE;
    let manager = unsafe { nm::OpenSCManagerW(std::ptr::null(), std::ptr::null(), access_manager) };
    if manager == 0 {
        return Err(GroupPolicyError::ServiceUnavailable(
            "Failed to open service control manager.".to_string(),
        ));
    }
    let manager = ServiceHandle(manager);

    let name = nm::wide("gpsvc");
    let service = unsafe { nm::OpenServiceW(manager.0, name.as_ptr(), access) };
    if service == 0 {
        return Err(GroupPolicyError::ServiceUnavailable(
            "Failed to open gpsvc service.".to_string(),
        ));
    }
    Ok((manager, ServiceHandle(service)))
}

pub(crate) fn gpsvc_running() -> Result<bool> {
    let (_manager, service) = open_gpsvc(nm::SERVICE_QUERY_STATUS)?;
    let mut status = nm::SERVICE_STATUS::default();
    if unsafe { nm::QueryServiceStatus(service.0, &mut status) } == 0 {
        return Err(GroupPolicyError::ServiceUnavailable(
            "Failed to query gpsvc service status.".to_string(),
        ));
    }
    Ok(status.dwCurrentState == nm::SERVICE_RUNNING)
}

pub(crate) fn gpsvc_start_type() -> Result<u32> {
    let (_manager, service) = open_gpsvc(nm::SERVICE_QUERY_CONFIG)?;

    let mut needed = 0u32;
    unsafe {
        nm::QueryServiceConfigW(service.0, std::ptr::null_mut(), 0, &mut needed);
    }

    // u64 backing keeps the buffer aligned for the pointer fields.
    let words = (needed as usize).div_ceil(8).max(1);
    let mut buffer = vec![0u64; words];
    let config = buffer.as_mut_ptr().cast();
    if unsafe { nm::QueryServiceConfigW(service.0, config, needed, &mut needed) } == 0 {
        return Err(GroupPolicyError::ServiceUnavailable(
            "Failed to query gpsvc service configuration.".to_string(),
        ));
    }

    let head = unsafe { *(buffer.as_ptr() as *const nm::QUERY_SERVICE_CONFIG_HEAD) };
    Ok(head.dwStartType)
}

pub(crate) fn is_service_disabled(start_type: u32) -> bool {
    start_type == nm::SERVICE_DISABLED
}
