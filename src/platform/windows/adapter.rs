//! TAP adapter discovery through the network adapter class registry key.

use crate::error::{Result, TunError};
use windows::core::PCWSTR;
use windows::Win32::Foundation::ERROR_SUCCESS;
use windows::Win32::System::Registry::{
    RegCloseKey, RegEnumKeyExW, RegOpenKeyExW, RegQueryValueExW, HKEY, HKEY_LOCAL_MACHINE,
    KEY_READ,
};

const ADAPTER_CLASS: &str = "{4D36E972-E325-11CE-BFC1-08002BE10318}";
const TAP_COMPONENT_ID: &str = "tap0901";

/// One installed TAP adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TapAdapter {
    /// `NetCfgInstanceId`, a braced GUID
    pub guid: String,
    /// Connection name shown in the network control panel
    pub name: String,
}

impl TapAdapter {
    /// Path of the adapter's device object.
    pub fn device_path(&self) -> String {
        format!(r"\\.\Global\{}.tap", self.guid)
    }

    fn matches(&self, wanted: &str) -> bool {
        self.name.eq_ignore_ascii_case(wanted) || self.guid.eq_ignore_ascii_case(wanted)
    }
}

pub(crate) fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

fn from_wide(buf: &[u16]) -> String {
    let end = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
    String::from_utf16_lossy(&buf[..end])
}

/// Registry key closed on drop
struct Key(HKEY);

impl Key {
    fn open(parent: HKEY, path: &str) -> Option<Key> {
        let path = wide(path);
        let mut key = HKEY::default();
        let status =
            unsafe { RegOpenKeyExW(parent, PCWSTR(path.as_ptr()), 0, KEY_READ, &mut key) };
        (status == ERROR_SUCCESS).then_some(Key(key))
    }

    fn subkey(&self, index: u32) -> Option<String> {
        let mut buf = [0u16; 256];
        let mut len = buf.len() as u32;
        let status = unsafe {
            RegEnumKeyExW(
                self.0,
                index,
                windows::core::PWSTR(buf.as_mut_ptr()),
                &mut len,
                None,
                windows::core::PWSTR::null(),
                None,
                None,
            )
        };
        (status == ERROR_SUCCESS).then(|| from_wide(&buf[..len as usize]))
    }

    fn string(&self, value: &str) -> Option<String> {
        let value = wide(value);
        let mut buf = [0u16; 256];
        let mut size = (buf.len() * 2) as u32;
        let status = unsafe {
            RegQueryValueExW(
                self.0,
                PCWSTR(value.as_ptr()),
                None,
                None,
                Some(buf.as_mut_ptr() as *mut u8),
                Some(&mut size as *mut u32),
            )
        };
        (status == ERROR_SUCCESS).then(|| from_wide(&buf[..size as usize / 2]))
    }
}

impl Drop for Key {
    fn drop(&mut self) {
        let _ = unsafe { RegCloseKey(self.0) };
    }
}

/// All installed adapters whose driver is the TAP-Windows driver.
pub fn list_tap_adapters() -> Result<Vec<TapAdapter>> {
    let class_path = format!(r"SYSTEM\CurrentControlSet\Control\Class\{}", ADAPTER_CLASS);
    let class = Key::open(HKEY_LOCAL_MACHINE, &class_path)
        .ok_or_else(|| TunError::OpenFailed(format!("registry key {}", class_path)))?;

    let mut adapters = Vec::new();
    let mut index = 0;
    while let Some(sub) = class.subkey(index) {
        index += 1;
        let Some(entry) = Key::open(class.0, &sub) else { continue };
        if !entry
            .string("ComponentId")
            .is_some_and(|id| id.eq_ignore_ascii_case(TAP_COMPONENT_ID))
        {
            continue;
        }
        let Some(guid) = entry.string("NetCfgInstanceId") else { continue };

        let connection = format!(
            r"SYSTEM\CurrentControlSet\Control\Network\{}\{}\Connection",
            ADAPTER_CLASS, guid
        );
        let name = Key::open(HKEY_LOCAL_MACHINE, &connection)
            .and_then(|k| k.string("Name"))
            .unwrap_or_else(|| guid.clone());

        log::debug!("Found TAP adapter {} ({})", name, guid);
        adapters.push(TapAdapter { guid, name });
    }
    Ok(adapters)
}

/// The adapter named `wanted` (connection name or GUID), or the first one.
pub fn find_tap_adapter(wanted: Option<&str>) -> Result<TapAdapter> {
    let adapters = list_tap_adapters()?;
    let found = match wanted {
        Some(w) => adapters.into_iter().find(|a| a.matches(w)),
        None => adapters.into_iter().next(),
    };
    found.ok_or_else(|| {
        TunError::DeviceNotFound(wanted.unwrap_or(TAP_COMPONENT_ID).to_string()).into()
    })
}
