//! IGroupPolicyObject2 over a raw vtable
//! Core Principle: The COM pointer is released on the thread that created it

use core::ffi::c_void;
use std::ptr;

use tracing::{debug, trace};
use uuid::Uuid;
use windows_sys::core::GUID;
use windows_sys::Win32::Foundation::BOOL;

use crate::error::{GroupPolicyError, Result};
use crate::gpo::backend::{
    GroupPolicyBackend, GroupPolicyProvider, RegistryLookup, RegistryWriteError,
};
use crate::gpo::location::{GroupPolicyLocation, OpenFlags, PolicySection};
use crate::gpo::registry::{RegistryData, RegistryValueType};
use crate::gpo::{
    ERROR_MORE_DATA, ERROR_NO_MORE_ITEMS, MAX_REG_VALUE_NAME_SIZE, REGISTRY_EXTENSION_GUID,
};

use super::native_methods as nm;
use super::native_methods::{HKEY, HRESULT};

type Unused = usize;
type OpenNamed = unsafe extern "system" fn(*mut IGroupPolicyObject2, *const u16, u32) -> HRESULT;
type SaveFn = unsafe extern "system" fn(
    *mut IGroupPolicyObject2,
    BOOL,
    BOOL,
    *const GUID,
    *const GUID,
) -> HRESULT;

#[repr(C)]
#[allow(non_snake_case)]
struct IGroupPolicyObject2Vtbl {
    QueryInterface: Unused,
    AddRef: unsafe extern "system" fn(*mut IGroupPolicyObject2) -> u32,
    Release: unsafe extern "system" fn(*mut IGroupPolicyObject2) -> u32,
    New: Unused,
    OpenDSGPO: OpenNamed,
    OpenLocalMachineGPO: unsafe extern "system" fn(*mut IGroupPolicyObject2, u32) -> HRESULT,
    OpenRemoteMachineGPO: OpenNamed,
    Save: SaveFn,
    Delete: Unused,
    GetName: Unused,
    GetDisplayName: Unused,
    SetDisplayName: Unused,
    GetPath: Unused,
    GetDSPath: Unused,
    GetFileSysPath: Unused,
    GetRegistryKey: unsafe extern "system" fn(*mut IGroupPolicyObject2, u32, *mut HKEY) -> HRESULT,
    GetOptions: Unused,
    SetOptions: Unused,
    GetType: Unused,
    GetMachineName: Unused,
    GetPropertySheetPages: Unused,
    OpenLocalMachineGPOForPrincipal: OpenNamed,
    GetRegistryKeyPath: Unused,
}

#[repr(C)]
struct IGroupPolicyObject2 {
    vtbl: *const IGroupPolicyObject2Vtbl,
}

/// Registry key handle closed on drop.
struct KeyHandle(HKEY);

impl Drop for KeyHandle {
    fn drop(&mut self) {
        if self.0 != 0 {
            unsafe {
                nm::RegCloseKey(self.0);
            }
        }
    }
}

fn to_guid(id: &Uuid) -> GUID {
    GUID::from_u128(id.as_u128())
}

/// Creates one COM object per worker thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeProvider;

impl GroupPolicyProvider for NativeProvider {
    type Object = NativeGroupPolicyObject;

    fn create(&self) -> Result<NativeGroupPolicyObject> {
        NativeGroupPolicyObject::create()
    }
}

/// Owned `IGroupPolicyObject2` pointer.
pub struct NativeGroupPolicyObject {
    raw: *mut IGroupPolicyObject2,
    opened: bool,
}

impl NativeGroupPolicyObject {
    /// Create new COM instance. The calling thread must already be in an apartment.
    pub fn create() -> Result<Self> {
        let mut raw: *mut c_void = ptr::null_mut();
        let hr = unsafe {
            nm::CoCreateInstance(
                &nm::CLSID_GROUP_POLICY_OBJECT,
                ptr::null_mut(),
                nm::CLSCTX_INPROC_SERVER,
                &nm::IID_IGROUP_POLICY_OBJECT2,
                &mut raw,
            )
        };
        if hr < 0 || raw.is_null() {
            return Err(GroupPolicyError::native("Cannot create the group policy object.", hr));
        }
        trace!("created IGroupPolicyObject2");
        Ok(NativeGroupPolicyObject {
            raw: raw.cast(),
            opened: false,
        })
    }

    fn vtbl(&self) -> &IGroupPolicyObject2Vtbl {
        unsafe { &*(*self.raw).vtbl }
    }

    fn ensure_opened(&self) -> Result<()> {
        if self.opened {
            Ok(())
        } else {
            Err(GroupPolicyError::NotOpened)
        }
    }

    fn section_root(&self, section: PolicySection) -> Result<KeyHandle> {
        self.ensure_opened()?;
        let mut key: HKEY = 0;
        let hr = unsafe { (self.vtbl().GetRegistryKey)(self.raw, section as u32, &mut key) };
        if hr < 0 {
            return Err(GroupPolicyError::native(
                format!("Cannot open the {section} registry section."),
                hr,
            ));
        }
        Ok(KeyHandle(key))
    }

    fn open_sub_key(&self, section: PolicySection, key: &str) -> Result<Option<KeyHandle>> {
        let root = self.section_root(section)?;
        let name = nm::wide(key);
        let mut sub: HKEY = 0;
        let access = nm::KEY_QUERY_VALUE | nm::KEY_SET_VALUE;
        let code = unsafe {
            nm::RegOpenKeyExW(root.0, name.as_ptr(), nm::REG_OPTION_NON_VOLATILE, access, &mut sub)
        };
        if code != nm::ERROR_SUCCESS {
            return Ok(None);
        }
        Ok(Some(KeyHandle(sub)))
    }

    fn query(key: &KeyHandle, value_name: &str) -> Option<RegistryData> {
        let wide = nm::wide(value_name);
        let name = wide.as_ptr();
        let mut kind = 0u32;
        let mut size = 0u32;

        let code = unsafe {
            nm::RegQueryValueExW(key.0, name, ptr::null(), &mut kind, ptr::null_mut(), &mut size)
        };
        if code != nm::ERROR_SUCCESS && code != ERROR_MORE_DATA {
            return None;
        }

        let mut data = vec![0u8; size as usize];
        let code = unsafe {
            nm::RegQueryValueExW(key.0, name, ptr::null(), &mut kind, data.as_mut_ptr(), &mut size)
        };
        if code != nm::ERROR_SUCCESS {
            return None;
        }
        data.truncate(size as usize);
        Some(RegistryData::decode(RegistryValueType::from_raw(kind), &data))
    }
}

impl Drop for NativeGroupPolicyObject {
    fn drop(&mut self) {
        if !self.raw.is_null() {
            unsafe {
                (self.vtbl().Release)(self.raw);
            }
            debug!("released IGroupPolicyObject2");
        }
    }
}

impl GroupPolicyBackend for NativeGroupPolicyObject {
    fn is_administrator(&self) -> bool {
        super::is_user_an_admin()
    }

    fn open(&mut self, location: &GroupPolicyLocation, flags: OpenFlags) -> Result<()> {
        let vtbl = self.vtbl();
        let hr = match location {
            GroupPolicyLocation::ThisComputer => unsafe {
                (vtbl.OpenLocalMachineGPO)(self.raw, flags.bits())
            },
            GroupPolicyLocation::ThisComputersLocalUserOrGroup(sid) => {
                let sid = nm::wide(sid);
                let open = vtbl.OpenLocalMachineGPOForPrincipal;
                unsafe { open(self.raw, sid.as_ptr(), flags.bits()) }
            }
            GroupPolicyLocation::RemoteComputer(name) => {
                let name = nm::wide(name);
                unsafe { (vtbl.OpenRemoteMachineGPO)(self.raw, name.as_ptr(), flags.bits()) }
            }
            GroupPolicyLocation::DirectoryService(path) => {
                let path = nm::wide(path);
                unsafe { (vtbl.OpenDSGPO)(self.raw, path.as_ptr(), flags.bits()) }
            }
        };
        if hr != nm::S_OK {
            return Err(GroupPolicyError::native(format!("Cannot open the GPO of {location}."), hr));
        }
        self.opened = true;
        Ok(())
    }

    fn read_value(
        &self,
        section: PolicySection,
        key: &str,
        value_name: &str,
    ) -> Result<RegistryLookup> {
        let Some(handle) = self.open_sub_key(section, key)? else {
            return Ok(RegistryLookup::KeyMissing);
        };
        Ok(match Self::query(&handle, value_name) {
            Some(data) => RegistryLookup::Found(data),
            None => RegistryLookup::ValueMissing,
        })
    }

    fn enumerate_values(&self, section: PolicySection, key: &str) -> Result<Option<Vec<String>>> {
        let Some(handle) = self.open_sub_key(section, key)? else {
            return Ok(None);
        };

        let mut names = Vec::new();
        let mut buffer = vec![0u16; MAX_REG_VALUE_NAME_SIZE + 1];
        let mut index = 0u32;

        loop {
            let mut length = buffer.len() as u32;
            let code = unsafe {
                nm::RegEnumValueW(
                    handle.0,
                    index,
                    buffer.as_mut_ptr(),
                    &mut length,
                    ptr::null(),
                    ptr::null_mut(),
                    ptr::null_mut(),
                    ptr::null_mut(),
                )
            };
            match code {
                nm::ERROR_SUCCESS => {
                    names.push(String::from_utf16_lossy(&buffer[..length as usize]));
                    index += 1;
                }
                ERROR_NO_MORE_ITEMS => break,
                other => {
                    let context = format!("Cannot enumerate '{key}'.");
                    return Err(GroupPolicyError::native(context, other));
                }
            }
        }

        Ok(Some(names))
    }

    fn write_value(
        &mut self,
        section: PolicySection,
        key: &str,
        value_name: &str,
        data: &RegistryData,
    ) -> std::result::Result<(), RegistryWriteError> {
        let root = self
            .section_root(section)
            .map_err(|e| RegistryWriteError::CreateOrOpen(e.code().unwrap_or(-1)))?;

        let name = nm::wide(key);
        let mut sub: HKEY = 0;
        let mut disposition = 0u32;
        let code = unsafe {
            nm::RegCreateKeyExW(
                root.0,
                name.as_ptr(),
                0,
                ptr::null(),
                nm::REG_OPTION_NON_VOLATILE,
                nm::KEY_WRITE,
                ptr::null(),
                &mut sub,
                &mut disposition,
            )
        };
        if code != nm::ERROR_SUCCESS {
            return Err(RegistryWriteError::CreateOrOpen(code));
        }
        let sub = KeyHandle(sub);

        let value = nm::wide(value_name);
        let bytes = data.encode();
        let code = unsafe {
            nm::RegSetValueExW(
                sub.0,
                value.as_ptr(),
                0,
                data.value_type() as u32,
                bytes.as_ptr(),
                bytes.len() as u32,
            )
        };
        if code != nm::ERROR_SUCCESS {
            return Err(RegistryWriteError::Set(code));
        }
        Ok(())
    }

    fn delete_value(
        &mut self,
        section: PolicySection,
        key: &str,
        value_name: &str,
    ) -> Result<bool> {
        let Some(handle) = self.open_sub_key(section, key)? else {
            return Ok(false);
        };
        let name = nm::wide(value_name);
        match unsafe { nm::RegDeleteValueW(handle.0, name.as_ptr()) } {
            nm::ERROR_SUCCESS => Ok(true),
            nm::ERROR_FILE_NOT_FOUND => Ok(false),
            other => {
                let context = format!("Cannot delete '{key}\\{value_name}'.");
                Err(GroupPolicyError::native(context, other))
            }
        }
    }

    fn save(&mut self, section: PolicySection, is_add: bool, client: &Uuid) -> Result<()> {
        self.ensure_opened()?;
        let extension = to_guid(&REGISTRY_EXTENSION_GUID);
        let client = to_guid(client);
        let hr = unsafe {
            (self.vtbl().Save)(
                self.raw,
                section.is_machine() as BOOL,
                is_add as BOOL,
                &extension,
                &client,
            )
        };
        if hr < 0 {
            return Err(GroupPolicyError::native(format!("Cannot save the {section} section."), hr));
        }
        Ok(())
    }
}
