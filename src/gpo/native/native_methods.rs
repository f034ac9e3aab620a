//! Raw Win32 and COM signatures used by the native backend

#![allow(non_snake_case, non_camel_case_types, clippy::upper_case_acronyms)]

use core::ffi::c_void;

use windows_sys::core::GUID;
use windows_sys::Win32::Foundation::{BOOL, HANDLE};

pub type HKEY = isize;
pub type HRESULT = i32;
pub type SC_HANDLE = isize;

pub const S_OK: HRESULT = 0;
pub const ERROR_SUCCESS: i32 = 0;
pub const ERROR_FILE_NOT_FOUND: i32 = 2;

pub const KEY_QUERY_VALUE: u32 = 0x0001;
pub const KEY_SET_VALUE: u32 = 0x0002;
pub const KEY_WRITE: u32 = 0x0002_0006;
pub const REG_OPTION_NON_VOLATILE: u32 = 0;

pub const COINIT_APARTMENTTHREADED: u32 = 0x2;
pub const COINIT_MULTITHREADED: u32 = 0x0;
pub const CLSCTX_INPROC_SERVER: u32 = 0x1;

pub const RP_FORCE: u32 = 1;

pub const SC_MANAGER_ENUMERATE_SERVICE: u32 = 0x0004;
pub const SERVICE_QUERY_CONFIG: u32 = 0x0001;
pub const SERVICE_QUERY_STATUS: u32 = 0x0004;
pub const SERVICE_RUNNING: u32 = 4;
pub const SERVICE_DISABLED: u32 = 4;

/// `GroupPolicyObject` coclass.
pub const CLSID_GROUP_POLICY_OBJECT: GUID = GUID::from_u128(0xEA502722_A23D_11D1_A7D3_0000F87571E3);

/// `IGroupPolicyObject2`.
pub const IID_IGROUP_POLICY_OBJECT2: GUID = GUID::from_u128(0x7E37D5E7_263D_45CF_842B_96A95C63E46C);

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct SERVICE_STATUS {
    pub dwServiceType: u32,
    pub dwCurrentState: u32,
    pub dwControlsAccepted: u32,
    pub dwWin32ExitCode: u32,
    pub dwServiceSpecificExitCode: u32,
    pub dwCheckPoint: u32,
    pub dwWaitHint: u32,
}

/// Leading fields of `QUERY_SERVICE_CONFIGW`; the string pointers that follow are not read.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct QUERY_SERVICE_CONFIG_HEAD {
    pub dwServiceType: u32,
    pub dwStartType: u32,
    pub dwErrorControl: u32,
}

#[link(name = "advapi32")]
extern "system" {
    pub fn RegOpenKeyExW(
        hKey: HKEY,
        lpSubKey: *const u16,
        ulOptions: u32,
        samDesired: u32,
        phkResult: *mut HKEY,
    ) -> i32;

    pub fn RegCreateKeyExW(
        hKey: HKEY,
        lpSubKey: *const u16,
        Reserved: u32,
        lpClass: *const u16,
        dwOptions: u32,
        samDesired: u32,
        lpSecurityAttributes: *const c_void,
        phkResult: *mut HKEY,
        lpdwDisposition: *mut u32,
    ) -> i32;

    pub fn RegQueryValueExW(
        hKey: HKEY,
        lpValueName: *const u16,
        lpReserved: *const u32,
        lpType: *mut u32,
        lpData: *mut u8,
        lpcbData: *mut u32,
    ) -> i32;

    pub fn RegEnumValueW(
        hKey: HKEY,
        dwIndex: u32,
        lpValueName: *mut u16,
        lpcchValueName: *mut u32,
        lpReserved: *const u32,
        lpType: *mut u32,
        lpData: *mut u8,
        lpcbData: *mut u32,
    ) -> i32;

    pub fn RegSetValueExW(
        hKey: HKEY,
        lpValueName: *const u16,
        Reserved: u32,
        dwType: u32,
        lpData: *const u8,
        cbData: u32,
    ) -> i32;

    pub fn RegDeleteValueW(hKey: HKEY, lpValueName: *const u16) -> i32;

    pub fn RegCloseKey(hKey: HKEY) -> i32;

    pub fn OpenSCManagerW(
        lpMachineName: *const u16,
        lpDatabaseName: *const u16,
        dwDesiredAccess: u32,
    ) -> SC_HANDLE;

    pub fn OpenServiceW(
        hSCManager: SC_HANDLE,
        lpServiceName: *const u16,
        dwDesiredAccess: u32,
    ) -> SC_HANDLE;

    pub fn QueryServiceStatus(hService: SC_HANDLE, lpServiceStatus: *mut SERVICE_STATUS) -> BOOL;

    pub fn QueryServiceConfigW(
        hService: SC_HANDLE,
        lpServiceConfig: *mut c_void,
        cbBufSize: u32,
        pcbBytesNeeded: *mut u32,
    ) -> BOOL;

    pub fn CloseServiceHandle(hSCObject: SC_HANDLE) -> BOOL;
}

#[link(name = "ole32")]
extern "system" {
    pub fn CoInitializeEx(pvReserved: *const c_void, dwCoInit: u32) -> HRESULT;

    pub fn CoUninitialize();

    pub fn CoCreateInstance(
        rclsid: *const GUID,
        pUnkOuter: *mut c_void,
        dwClsContext: u32,
        riid: *const GUID,
        ppv: *mut *mut c_void,
    ) -> HRESULT;
}

#[link(name = "userenv")]
extern "system" {
    pub fn EnterCriticalPolicySection(bMachine: BOOL) -> HANDLE;

    pub fn LeaveCriticalPolicySection(hSection: HANDLE) -> BOOL;

    pub fn RefreshPolicyEx(bMachine: BOOL, dwOptions: u32) -> BOOL;
}

#[link(name = "shell32")]
extern "system" {
    pub fn IsUserAnAdmin() -> BOOL;
}

#[link(name = "kernel32")]
extern "system" {
    pub fn GetLastError() -> u32;
}

/// NUL-terminated UTF-16 copy of `s`.
pub fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(Some(0)).collect()
}

/// Map a Win32 error code into its HRESULT form.
pub fn hresult_from_win32(code: i32) -> HRESULT {
    if code <= 0 {
        code
    } else {
        ((code as u32 & 0x0000_FFFF) | 0x8007_0000) as i32
    }
}
