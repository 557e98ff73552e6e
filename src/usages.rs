// SPDX-License-Identifier: MIT

//! Human-readable names for the usage pages and usages that commonly show up
//! in report descriptors. These names are used to key field values in the
//! [crate::ReportCodec] and [crate::ReportValues].
//!
//! Only a subset of the HID Usage Tables is covered, unknown usages fall
//! back to a hex representation:
//!
//! ```
//! # use hidcodec::usages::*;
//! # use hidcodec::types::*;
//! assert_eq!(usage_name(UsagePage(0x01), UsageId(0x30)), "X");
//! assert_eq!(usage_name(UsagePage(0x01), UsageId(0x39)), "Hat_Switch");
//! assert_eq!(usage_name(UsagePage(0x09), UsageId(0x02)), "Button_2");
//! assert_eq!(usage_name(UsagePage(0x01), UsageId(0x5f)), "Usage 0x5F");
//! assert_eq!(page_name(UsagePage(0xff42)), "Vendor Defined (0xFF42)");
//! ```

use crate::types::{UsageId, UsagePage};

pub const GENERIC_DESKTOP: UsagePage = UsagePage(0x01);
pub const KEYBOARD: UsagePage = UsagePage(0x07);
pub const LED: UsagePage = UsagePage(0x08);
pub const BUTTON: UsagePage = UsagePage(0x09);
pub const CONSUMER: UsagePage = UsagePage(0x0c);

/// The name given to fields with usage ID 0.
pub const PADDING_NAME: &str = "Padding / Reserved";

fn generic_desktop(usage: u16) -> Option<&'static str> {
    let name = match usage {
        0x01 => "Pointer",
        0x02 => "Mouse",
        0x04 => "Joystick",
        0x05 => "Gamepad",
        0x06 => "Keyboard",
        0x07 => "Keypad",
        0x08 => "Multi_Axis_Controller",
        0x30 => "X",
        0x31 => "Y",
        0x32 => "Z",
        0x33 => "Rx",
        0x34 => "Ry",
        0x35 => "Rz",
        0x36 => "Slider",
        0x37 => "Dial",
        0x38 => "Wheel",
        0x39 => "Hat_Switch",
        0x80 => "System_Control",
        0x81 => "System_Power_Down",
        0x82 => "System_Sleep",
        0x83 => "System_Wake_Up",
        0x84 => "System_Context_Menu",
        0x85 => "System_Main_Menu",
        0x86 => "System_App_Menu",
        0x87 => "System_Menu_Help",
        0x88 => "System_Menu_Exit",
        0x89 => "System_Menu_Select",
        0x8a => "System_Menu_Right",
        0x8b => "System_Menu_Left",
        0x8c => "System_Menu_Up",
        0x8d => "System_Menu_Down",
        _ => return None,
    };
    Some(name)
}

fn keyboard(usage: u16) -> Option<&'static str> {
    const LETTERS: [&str; 26] = [
        "A", "B", "C", "D", "E", "F", "G", "H", "I", "J", "K", "L", "M", "N", "O", "P", "Q", "R",
        "S", "T", "U", "V", "W", "X", "Y", "Z",
    ];
    const DIGITS: [&str; 10] = [
        "Key_1", "Key_2", "Key_3", "Key_4", "Key_5", "Key_6", "Key_7", "Key_8", "Key_9", "Key_0",
    ];
    let name = match usage {
        0x01 => "Error_Roll_Over",
        0x02 => "Post_Fail",
        0x03 => "Error_Undefined",
        0x04..=0x1d => LETTERS[(usage - 0x04) as usize],
        0x1e..=0x27 => DIGITS[(usage - 0x1e) as usize],
        0x28 => "Enter",
        0x29 => "Escape",
        0x2a => "Backspace",
        0x2b => "Tab",
        0x2c => "Space",
        0xe0 => "Left_Control",
        0xe1 => "Left_Shift",
        0xe2 => "Left_Alt",
        0xe3 => "Left_Gui",
        0xe4 => "Right_Control",
        0xe5 => "Right_Shift",
        0xe6 => "Right_Alt",
        0xe7 => "Right_Gui",
        _ => return None,
    };
    Some(name)
}

fn led(usage: u16) -> Option<&'static str> {
    let name = match usage {
        0x01 => "Num_Lock",
        0x02 => "Caps_Lock",
        0x03 => "Scroll_Lock",
        0x04 => "Compose",
        0x05 => "Kana",
        0x06 => "Power",
        0x07 => "Shift",
        0x08 => "Do_Not_Disturb",
        0x09 => "Mute",
        0x0a => "Tone_Enable",
        0x0b => "High_Cut_Filter",
        0x0c => "Low_Cut_Filter",
        0x0d => "Equalizer_Enable",
        0x0e => "Sound_Field_On",
        0x0f => "Surround_On",
        0x10 => "Repeat",
        0x11 => "Stereo",
        0x12 => "Sampling_Rate_Detect",
        _ => return None,
    };
    Some(name)
}

fn consumer(usage: u16) -> Option<&'static str> {
    let name = match usage {
        0x01 => "Consumer_Control",
        0x30 => "Power",
        0x31 => "Reset",
        0x32 => "Sleep",
        0xb0 => "Play",
        0xb1 => "Pause",
        0xb2 => "Record",
        0xb3 => "Fast_Forward",
        0xb4 => "Rewind",
        0xb5 => "Scan_Next_Track",
        0xb6 => "Scan_Prev_Track",
        0xb7 => "Stop",
        0xb8 => "Eject",
        0xb9 => "Random_Play",
        0xe0 => "Volume",
        0xe2 => "Mute",
        0xe3 => "Bass",
        0xe4 => "Treble",
        0xe5 => "Bass_Boost",
        0xe9 => "Volume_Increment",
        0xea => "Volume_Decrement",
        0x192 => "Al_Calculator",
        0x194 => "Al_Local_Browser",
        0x221 => "Ac_Search",
        0x223 => "Ac_Home",
        0x224 => "Ac_Back",
        0x225 => "Ac_Forward",
        0x226 => "Ac_Stop",
        0x227 => "Ac_Refresh",
        0x22a => "Ac_Bookmarks",
        _ => return None,
    };
    Some(name)
}

/// The name of a usage page, e.g. "Generic Desktop".
pub fn page_name(page: UsagePage) -> String {
    match page {
        GENERIC_DESKTOP => "Generic Desktop".into(),
        KEYBOARD => "Keyboard/Keypad".into(),
        LED => "LED".into(),
        BUTTON => "Button".into(),
        CONSUMER => "Consumer".into(),
        UsagePage(p @ 0xff00..=0xffff) => format!("Vendor Defined (0x{p:04X})"),
        UsagePage(p) => format!("Unknown Page {p:#x}"),
    }
}

/// The name of a single usage within its page.
///
/// Usage ID 0 is always [PADDING_NAME], buttons are numbered
/// `Button_1` to `Button_32`.
pub fn usage_name(page: UsagePage, usage: UsageId) -> String {
    if usage.is_reserved() {
        return PADDING_NAME.into();
    }

    let id = u16::from(usage);
    let name = match page {
        GENERIC_DESKTOP => generic_desktop(id).map(String::from),
        KEYBOARD => keyboard(id).map(String::from),
        LED => led(id).map(String::from),
        CONSUMER => consumer(id).map(String::from),
        BUTTON if id <= 32 => Some(format!("Button_{id}")),
        _ => None,
    };

    name.unwrap_or_else(|| format!("Usage 0x{id:02X}"))
}
