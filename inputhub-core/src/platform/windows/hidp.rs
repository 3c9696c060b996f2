// Copyright 2016-2018 Mateusz Sieczko and other GilRs Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! HID parser functions loaded from `hid.dll` at runtime.

use crate::hid::{ButtonCaps, HidData, ValueCaps};

use winapi::shared::hidpi::{
    HidP_Input, HIDP_BUTTON_CAPS, HIDP_CAPS, HIDP_DATA, HIDP_REPORT_TYPE, HIDP_VALUE_CAPS,
    PHIDP_BUTTON_CAPS, PHIDP_CAPS, PHIDP_DATA, PHIDP_PREPARSED_DATA, PHIDP_VALUE_CAPS,
};
use winapi::shared::minwindef::{FARPROC, HMODULE, PUSHORT, ULONG};
use winapi::shared::ntdef::{NTSTATUS, PCHAR, PULONG};
use winapi::um::libloaderapi::{GetProcAddress, LoadLibraryW};

use std::ffi::{CStr, OsStr};
use std::mem;
use std::os::windows::ffi::OsStrExt;
use std::sync::OnceLock;

const HIDP_STATUS_SUCCESS: NTSTATUS = 0x0011_0000;

type GetCaps = unsafe extern "system" fn(PHIDP_PREPARSED_DATA, PHIDP_CAPS) -> NTSTATUS;
type GetButtonCaps = unsafe extern "system" fn(
    HIDP_REPORT_TYPE,
    PHIDP_BUTTON_CAPS,
    PUSHORT,
    PHIDP_PREPARSED_DATA,
) -> NTSTATUS;
type GetValueCaps = unsafe extern "system" fn(
    HIDP_REPORT_TYPE,
    PHIDP_VALUE_CAPS,
    PUSHORT,
    PHIDP_PREPARSED_DATA,
) -> NTSTATUS;
type GetData = unsafe extern "system" fn(
    HIDP_REPORT_TYPE,
    PHIDP_DATA,
    PULONG,
    PHIDP_PREPARSED_DATA,
    PCHAR,
    ULONG,
) -> NTSTATUS;
type MaxDataListLength = unsafe extern "system" fn(HIDP_REPORT_TYPE, PHIDP_PREPARSED_DATA) -> ULONG;

/// Preparsed HID descriptor as returned by `GetRawInputDeviceInfo`.
pub struct PreparsedData(Vec<u64>);

impl PreparsedData {
    /// Buffer of at least `size` bytes, to be filled by the caller.
    pub fn with_size(size: usize) -> Self {
        PreparsedData(vec![0; size.div_ceil(mem::size_of::<u64>())])
    }

    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.0.as_mut_ptr() as *mut u8
    }

    fn as_raw(&self) -> PHIDP_PREPARSED_DATA {
        self.0.as_ptr() as PHIDP_PREPARSED_DATA
    }
}

/// Input capabilities of a device.
#[derive(Clone, Debug, Default)]
pub struct Description {
    pub usage_page: u16,
    pub usage: u16,
    pub buttons: Vec<ButtonCaps>,
    pub values: Vec<ValueCaps>,
}

pub struct HidParser {
    get_caps: GetCaps,
    get_button_caps: GetButtonCaps,
    get_value_caps: GetValueCaps,
    get_data: GetData,
    max_data_list_length: MaxDataListLength,
}

impl HidParser {
    /// Parser shared by all devices, or `None` if `hid.dll` can not be loaded.
    pub fn get() -> Option<&'static HidParser> {
        static PARSER: OnceLock<Option<HidParser>> = OnceLock::new();

        PARSER
            .get_or_init(|| {
                let parser = unsafe { HidParser::load() };
                if parser.is_none() {
                    warn!("Failed to load HID parser from hid.dll, HID devices are unavailable");
                }
                parser
            })
            .as_ref()
    }

    unsafe fn load() -> Option<Self> {
        let name: Vec<u16> = OsStr::new("hid.dll").encode_wide().chain(Some(0)).collect();
        let module = LoadLibraryW(name.as_ptr());

        if module.is_null() {
            return None;
        }

        Some(HidParser {
            get_caps: mem::transmute::<FARPROC, GetCaps>(symbol(module, c"HidP_GetCaps")?),
            get_button_caps: mem::transmute::<FARPROC, GetButtonCaps>(symbol(
                module,
                c"HidP_GetButtonCaps",
            )?),
            get_value_caps: mem::transmute::<FARPROC, GetValueCaps>(symbol(
                module,
                c"HidP_GetValueCaps",
            )?),
            get_data: mem::transmute::<FARPROC, GetData>(symbol(module, c"HidP_GetData")?),
            max_data_list_length: mem::transmute::<FARPROC, MaxDataListLength>(symbol(
                module,
                c"HidP_MaxDataListLength",
            )?),
        })
    }

    /// Reads input capabilities from preparsed descriptor.
    pub fn describe(&self, data: &PreparsedData) -> Option<Description> {
        let mut caps: HIDP_CAPS = unsafe { mem::zeroed() };
        if unsafe { (self.get_caps)(data.as_raw(), &mut caps) } != HIDP_STATUS_SUCCESS {
            return None;
        }

        let mut desc = Description {
            usage_page: caps.UsagePage,
            usage: caps.Usage,
            ..Default::default()
        };

        let mut len = caps.NumberInputButtonCaps;
        if len > 0 {
            let mut buttons: Vec<HIDP_BUTTON_CAPS> = vec![unsafe { mem::zeroed() }; len.into()];
            let status = unsafe {
                (self.get_button_caps)(HidP_Input, buttons.as_mut_ptr(), &mut len, data.as_raw())
            };
            if status != HIDP_STATUS_SUCCESS {
                return None;
            }
            buttons.truncate(len.into());
            desc.buttons = buttons.iter().map(button_caps).collect();
        }

        let mut len = caps.NumberInputValueCaps;
        if len > 0 {
            let mut values: Vec<HIDP_VALUE_CAPS> = vec![unsafe { mem::zeroed() }; len.into()];
            let status = unsafe {
                (self.get_value_caps)(HidP_Input, values.as_mut_ptr(), &mut len, data.as_raw())
            };
            if status != HIDP_STATUS_SUCCESS {
                return None;
            }
            values.truncate(len.into());
            desc.values = values.iter().map(value_caps).collect();
        }

        Some(desc)
    }

    /// Extracts active controls of one input report. Returns false if the report can not be
    /// parsed.
    pub fn report_data(&self, data: &PreparsedData, report: &[u8], out: &mut Vec<HidData>) -> bool {
        let max = unsafe { (self.max_data_list_length)(HidP_Input, data.as_raw()) };
        let mut list: Vec<HIDP_DATA> = vec![unsafe { mem::zeroed() }; max as usize];
        let mut len = max;

        let status = unsafe {
            (self.get_data)(
                HidP_Input,
                list.as_mut_ptr(),
                &mut len,
                data.as_raw(),
                report.as_ptr() as PCHAR,
                report.len() as ULONG,
            )
        };
        if status != HIDP_STATUS_SUCCESS {
            return false;
        }

        list.truncate(len as usize);
        out.extend(list.iter().map(|item| HidData {
            data_index: item.DataIndex,
            raw_value: unsafe { *item.u.RawValue() },
        }));
        true
    }
}

unsafe fn symbol(module: HMODULE, name: &CStr) -> Option<FARPROC> {
    let address = GetProcAddress(module, name.as_ptr());
    if address.is_null() {
        error!("hid.dll has no {:?}", name);
        None
    } else {
        Some(address)
    }
}

fn button_caps(caps: &HIDP_BUTTON_CAPS) -> ButtonCaps {
    let (usage_min, usage_max, data_index_min) = unsafe {
        if caps.IsRange != 0 {
            let range = caps.u.Range();
            (range.UsageMin, range.UsageMax, range.DataIndexMin)
        } else {
            let single = caps.u.NotRange();
            (single.Usage, single.Usage, single.DataIndex)
        }
    };

    ButtonCaps {
        report_id: caps.ReportID,
        usage_page: caps.UsagePage,
        usage_min,
        usage_max,
        data_index_min,
    }
}

fn value_caps(caps: &HIDP_VALUE_CAPS) -> ValueCaps {
    let (usage_min, usage_max, data_index_min) = unsafe {
        if caps.IsRange != 0 {
            let range = caps.u.Range();
            (range.UsageMin, range.UsageMax, range.DataIndexMin)
        } else {
            let single = caps.u.NotRange();
            (single.Usage, single.Usage, single.DataIndex)
        }
    };

    ValueCaps {
        report_id: caps.ReportID,
        usage_page: caps.UsagePage,
        usage_min,
        usage_max,
        data_index_min,
        logical_min: caps.LogicalMin,
        logical_max: caps.LogicalMax,
        bit_size: caps.BitSize,
    }
}
