// SPDX-License-Identifier: MIT

//! A toolchain for HID Report Descriptors as defined in the
//! [HID Device Class Definition for HID 1.11](https://www.usb.org/document-library/device-class-definition-hid-111).
//!
//! - [compile] a declarative [schema] into a [ReportDescriptor]
//! - [parse] report descriptor bytes into a [ReportDescriptor]
//! - [analyze] a [ReportDescriptor] into the [DescriptorLayout] of its reports
//! - encode and decode reports with a [ReportCodec] into [ReportValues]
//!
//! ```
//! use hidcodec::*;
//! use hidcodec::schema::*;
//!
//! let mouse = Collection::new(usages::GENERIC_DESKTOP, 0x02, CollectionType::Application)
//!     .add(ReportItem::buttons(2, 1))
//!     .add(ReportItem::padding(6))
//!     .add(ReportItem::axis(0x30).relative());
//! let rdesc = compile(&mouse.into(), true);
//!
//! // the bytes survive a parse
//! let parsed = parse(rdesc.bytes()).unwrap();
//! assert_eq!(parsed, rdesc);
//!
//! let layout = analyze(&parsed).unwrap();
//! let codec = ReportCodec::new(&layout);
//! let mut report = codec.create_report(None, ReportType::Input).unwrap();
//! report.set("Button_1", true).unwrap();
//! report.set("X", -10).unwrap();
//! assert_eq!(report.encode(&codec).unwrap(), [0x01, 0xf6]);
//! ```

use std::collections::HashMap;
use thiserror::Error;

/// Return early with the given error if the condition does not hold.
macro_rules! ensure {
    ($cond:expr, $err:expr) => {
        if !$cond {
            return Err($err);
        }
    };
}
pub(crate) use ensure;

pub mod codec;
pub mod compiler;
pub mod hid;
pub mod layout;
pub mod report;
pub mod schema;
pub mod types;
pub mod usages;

pub use codec::ReportCodec;
pub use compiler::compile;
pub use hid::{parse, Item, ItemTag, ReportDescriptor};
pub use layout::{DescriptorLayout, FieldOp, ReportLayout, ReportLayoutGroup};
pub use report::{FieldValue, FieldValues, ReportValues};
pub use schema::ReportType;
pub use types::*;

use hid::{CollectionType, ItemError, MainDataItem};

/// The maximum length of a single report in bits.
const MAX_REPORT_BITS: usize = 0xffff * 8;

#[derive(Error, Debug)]
pub enum ParserError {
    #[error("Protocol error at offset {offset}: {message}")]
    Protocol { offset: usize, message: String },
    #[error("Unsupported feature at offset {offset}: {message}")]
    UnsupportedFeature { offset: usize, message: String },
    #[error("Invalid item at offset {offset}: {source}")]
    InvalidItem {
        offset: usize,
        #[source]
        source: ItemError,
    },
    #[error("{report_type} report {report_id} exceeds the maximum report length ({bits} bits)")]
    ReportTooLarge {
        report_id: ReportId,
        report_type: ReportType,
        bits: usize,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Unknown report type: {name}")]
    UnknownReportType { name: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReportError {
    #[error("Ambiguous: multiple Report IDs {ids:?} but none was specified")]
    AmbiguousReportId { ids: Vec<ReportId> },
    #[error("Report ID {id} not found in layout")]
    UnknownReportId { id: ReportId },
    #[error("Report is missing its Report ID byte")]
    MissingReportId,
    #[error("Payload size {actual} does not match expected size {expected}")]
    InvalidSize { expected: usize, actual: usize },
    #[error("Value {value} for field '{name}' out of range ({minimum} to {maximum})")]
    OutOfRange {
        name: String,
        value: i64,
        minimum: i32,
        maximum: i32,
    },
    #[error("Value {value} for field '{name}' does not fit into {bits} bits")]
    Overflow { name: String, value: i64, bits: usize },
    #[error("Field '{name}' missing in data")]
    MissingField { name: String },
    #[error("Extra field '{name}' found in data")]
    ExtraField { name: String },
    #[error("Field '{name}' not found in report layout")]
    UnknownField { name: String },
    #[error("Field '{name}' with {bits} bits does not fit into a 64 bit value")]
    UnsupportedFieldSize { name: String, bits: usize },
    #[error("Reports do not match: {expected:?} vs {actual:?}")]
    ReportMismatch {
        expected: (ReportId, ReportType),
        actual: (ReportId, ReportType),
    },
}

type Result<T> = std::result::Result<T, ParserError>;

impl TryFrom<&ReportDescriptor> for DescriptorLayout {
    type Error = ParserError;

    fn try_from(rdesc: &ReportDescriptor) -> Result<DescriptorLayout> {
        analyze(rdesc)
    }
}

impl TryFrom<&[u8]> for DescriptorLayout {
    type Error = ParserError;

    /// Parse and analyze the report descriptor bytes.
    fn try_from(bytes: &[u8]) -> Result<DescriptorLayout> {
        analyze(&parse(bytes)?)
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct Globals {
    usage_page: UsagePage,
    logical_minimum: LogicalMinimum,
    logical_maximum: LogicalMaximum,
    physical_minimum: Option<PhysicalMinimum>,
    physical_maximum: Option<PhysicalMaximum>,
    unit_exponent: Option<UnitExponent>,
    unit: Option<Unit>,
    report_size: ReportSize,
    report_id: ReportId,
    report_count: ReportCount,
}

/// A Usage, or a Usage Minimum/Maximum pair. Values above 0xFFFF are
/// extended usages with the Usage Page in the upper 16 bits.
#[derive(Clone, Copy, Debug)]
struct UsageRange {
    minimum: u32,
    maximum: u32,
}

impl UsageRange {
    fn len(&self) -> u64 {
        (self.maximum - self.minimum) as u64 + 1
    }
}

#[derive(Clone, Debug, Default)]
struct Locals {
    usages: Vec<UsageRange>,
    usage_minimum: Option<u32>,
}

impl Locals {
    /// The usage for the element at `index`. If there are fewer usages
    /// than elements, the last usage applies to all remaining elements.
    fn usage(&self, index: usize) -> Option<u32> {
        let mut index = index as u64;
        for range in &self.usages {
            if index < range.len() {
                return Some(range.minimum + index as u32);
            }
            index -= range.len();
        }
        self.usages.last().map(|r| r.maximum)
    }
}

struct Offsets {
    /// Bit offsets per report and report type
    bit_offsets: HashMap<(ReportId, ReportType), usize>,
}

impl Offsets {
    fn new() -> Self {
        Self {
            bit_offsets: HashMap::default(),
        }
    }

    fn get(&self, report_id: ReportId, report_type: ReportType) -> usize {
        self.bit_offsets
            .get(&(report_id, report_type))
            .copied()
            .unwrap_or(0)
    }

    fn advance(&mut self, report_id: ReportId, report_type: ReportType, bits: usize) {
        *self.bit_offsets.entry((report_id, report_type)).or_insert(0) += bits;
    }
}

#[derive(Debug)]
struct Stack {
    globals: Globals,
    saved: Vec<Globals>,
    locals: Locals,
    collections: Vec<CollectionType>,
}

impl Stack {
    fn new() -> Self {
        Stack {
            globals: Globals::default(),
            saved: vec![],
            locals: Locals::default(),
            collections: vec![],
        }
    }

    fn push(&mut self) {
        self.saved.push(self.globals);
    }

    fn pop(&mut self) {
        match self.saved.pop() {
            Some(globals) => self.globals = globals,
            None => log::debug!("Pop without Push, ignoring"),
        }
    }

    fn reset_locals(&mut self) {
        self.locals = Locals::default();
    }
}

/// Makes field names unique across the whole descriptor: the first
/// `X` stays `X`, the following ones become `X_2`, `X_3`, ...
#[derive(Default)]
struct NameTracker {
    seen: HashMap<String, usize>,
}

impl NameTracker {
    fn unique(&mut self, name: String) -> String {
        if name == usages::PADDING_NAME {
            return name;
        }
        let count = self.seen.entry(name.clone()).or_insert(0);
        *count += 1;
        match *count {
            1 => name,
            n => format!("{name}_{n}"),
        }
    }
}

fn handle_main_item(
    item: &Item,
    stack: &Stack,
    offsets: &mut Offsets,
    names: &mut NameTracker,
    layout: &mut DescriptorLayout,
) -> Result<()> {
    let report_type = match item.tag() {
        ItemTag::Input => ReportType::Input,
        ItemTag::Output => ReportType::Output,
        ItemTag::Feature => ReportType::Feature,
        _ => return Ok(()),
    };

    let flags = item.main_flags().unwrap_or_default();
    let globals = &stack.globals;
    let report_id = globals.report_id;
    let report_size = u32::from(globals.report_size) as usize;
    let report_count = u32::from(globals.report_count) as usize;
    let bit_offset = offsets.get(report_id, report_type);

    let end = report_size
        .checked_mul(report_count)
        .and_then(|bits| bits.checked_add(bit_offset))
        .filter(|end| *end <= MAX_REPORT_BITS && report_count <= MAX_REPORT_BITS);
    let Some(end) = end else {
        return Err(ParserError::ReportTooLarge {
            report_id,
            report_type,
            bits: bit_offset.saturating_add(report_size.saturating_mul(report_count)),
        });
    };

    let is_signed = i32::from(globals.logical_minimum) < 0;
    let is_array = flags.is_array();

    for index in 0..report_count {
        let usage = stack.locals.usage(index).unwrap_or(0);
        let (usage_page, usage_id) = match usage {
            0..=0xffff => (globals.usage_page, UsageId(usage as u16)),
            _ => (UsagePage((usage >> 16) as u16), UsageId((usage & 0xffff) as u16)),
        };

        // every element of an array is an index, including slots without a usage
        let name = if is_array {
            format!("{} Idx", usages::page_name(usage_page))
        } else {
            usages::usage_name(usage_page, usage_id)
        };

        layout.add_field(FieldOp {
            bit_offset: bit_offset + index * report_size,
            bit_size: report_size,
            usage_page,
            usage_id,
            name: names.unique(name),
            logical_minimum: globals.logical_minimum,
            logical_maximum: globals.logical_maximum,
            physical_minimum: globals.physical_minimum,
            physical_maximum: globals.physical_maximum,
            unit: globals.unit,
            unit_exponent: globals.unit_exponent,
            is_signed,
            is_array,
            report_id,
            report_type,
        });
    }

    offsets.advance(report_id, report_type, end - bit_offset);

    Ok(())
}

macro_rules! update_stack {
    ($stack:ident, $which:ident, $from:expr) => {
        $stack.globals.$which = $from;
    };
}

/// Walk the items of a report descriptor and compute the layout of every
/// report it describes.
///
/// Fields are named after their usage, see [usages::usage_name]. Every
/// element of an array field is named `"<Usage Page> Idx"`. Fields with
/// usage ID 0 are padding regardless of their name and are never decoded.
/// Names are unique across the whole descriptor.
pub fn analyze(rdesc: &ReportDescriptor) -> Result<DescriptorLayout> {
    let mut stack = Stack::new();
    let mut offsets = Offsets::new();
    let mut names = NameTracker::default();
    let mut layout = DescriptorLayout::new();

    for item in rdesc.iter() {
        let value = item.value().unwrap_or(0);
        match item.tag() {
            ItemTag::UsagePage => {
                update_stack!(stack, usage_page, UsagePage(value as u16));
            }
            ItemTag::LogicalMinimum => {
                update_stack!(stack, logical_minimum, LogicalMinimum(value as i32));
            }
            ItemTag::LogicalMaximum => {
                update_stack!(stack, logical_maximum, LogicalMaximum(value as i32));
            }
            ItemTag::PhysicalMinimum => {
                update_stack!(stack, physical_minimum, Some(PhysicalMinimum(value as i32)));
            }
            ItemTag::PhysicalMaximum => {
                update_stack!(stack, physical_maximum, Some(PhysicalMaximum(value as i32)));
            }
            ItemTag::UnitExponent => {
                update_stack!(stack, unit_exponent, Some(UnitExponent(value as i32)));
            }
            ItemTag::Unit => {
                update_stack!(stack, unit, Some(Unit(value as i32)));
            }
            ItemTag::ReportSize => {
                update_stack!(stack, report_size, ReportSize(value as u32));
            }
            ItemTag::ReportId => {
                update_stack!(stack, report_id, ReportId(value as u8));
            }
            ItemTag::ReportCount => {
                update_stack!(stack, report_count, ReportCount(value as u32));
            }
            ItemTag::Push => stack.push(),
            ItemTag::Pop => stack.pop(),
            ItemTag::Usage => {
                let usage = value as u32;
                stack.locals.usages.push(UsageRange {
                    minimum: usage,
                    maximum: usage,
                });
            }
            ItemTag::UsageMinimum => {
                stack.locals.usage_minimum = Some(value as u32);
            }
            ItemTag::UsageMaximum => {
                let maximum = value as u32;
                match stack.locals.usage_minimum.take() {
                    Some(minimum) if minimum <= maximum => {
                        stack.locals.usages.push(UsageRange { minimum, maximum })
                    }
                    Some(minimum) => {
                        log::warn!("Usage Maximum {maximum:#x} below Usage Minimum {minimum:#x}, ignoring")
                    }
                    None => log::warn!("Usage Maximum {maximum:#x} without Usage Minimum, ignoring"),
                }
            }
            ItemTag::Collection => {
                let collection = CollectionType::from(item.bits().unwrap_or(0) as u8);
                stack.collections.push(collection);
                stack.reset_locals();
            }
            ItemTag::EndCollection => {
                if stack.collections.pop().is_none() {
                    log::warn!("End Collection without Collection, ignoring");
                }
            }
            ItemTag::Input | ItemTag::Output | ItemTag::Feature => {
                handle_main_item(item, &stack, &mut offsets, &mut names, &mut layout)?;
                stack.reset_locals();
            }
            ItemTag::Other(_) => {}
        };
    }

    Ok(layout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hid::MainFlags;

    fn names(layout: &DescriptorLayout) -> Vec<String> {
        layout.fields().map(|f| f.name.clone()).collect()
    }

    #[test]
    fn mouse_layout() {
        let bytes = [
            0x05, 0x01, 0x09, 0x02, 0xa1, 0x01, // Mouse Application
            0x05, 0x09, 0x19, 0x01, 0x29, 0x03, // Buttons 1-3
            0x15, 0x00, 0x25, 0x01, 0x75, 0x01, 0x95, 0x03, 0x81, 0x02, // 3x1 bit
            0x75, 0x05, 0x95, 0x01, 0x81, 0x01, // 5 bit padding
            0x05, 0x01, 0x09, 0x30, 0x09, 0x31, // X, Y
            0x15, 0x81, 0x25, 0x7f, 0x75, 0x08, 0x95, 0x02, 0x81, 0x06, // 2x8 bit
            0xc0,
        ];
        let layout = DescriptorLayout::try_from(bytes.as_slice()).unwrap();
        assert_eq!(
            names(&layout),
            ["Button_1", "Button_2", "Button_3", "Button Idx", "X", "Y"]
        );
        let fields = layout.get_fields(None, ReportType::Input).unwrap();
        let offsets: Vec<usize> = fields.iter().map(|f| f.bit_offset).collect();
        assert_eq!(offsets, [0, 1, 2, 3, 8, 16]);
        assert!(!fields[0].is_signed);
        assert!(fields[4].is_signed);
        assert!(fields[3].is_padding());
        assert_eq!(layout.size(None, ReportType::Input).unwrap(), 3);
        assert!(!layout.has_multiple_report_ids());
    }

    #[test]
    fn name_collisions() {
        let rdesc: ReportDescriptor = [
            Item::usage_page(UsagePage(0x01)),
            Item::report_size(ReportSize(8)),
            Item::report_count(ReportCount(3)),
            Item::usage(0x30),
            Item::input(MainFlags::new().variable()),
            Item::report_count(ReportCount(2)),
            Item::input(MainFlags::new().constant()),
        ]
        .into_iter()
        .collect();
        let layout = analyze(&rdesc).unwrap();
        assert_eq!(
            names(&layout),
            ["X", "X_2", "X_3", "Generic Desktop Idx", "Generic Desktop Idx_2"]
        );
    }

    #[test]
    fn arrays() {
        let bytes = [
            0x05, 0x07, 0x19, 0x00, 0x29, 0x65, 0x15, 0x00, 0x25, 0x65, // Keys 0..101
            0x75, 0x08, 0x95, 0x03, 0x81, 0x00, // 3x8 bit array
        ];
        let layout = DescriptorLayout::try_from(bytes.as_slice()).unwrap();
        assert_eq!(
            names(&layout),
            ["Keyboard/Keypad Idx", "Keyboard/Keypad Idx_2", "Keyboard/Keypad Idx_3"]
        );
        assert!(layout.fields().all(|f| f.is_array));

        // the first slot resolves to usage 0 and is padding despite its name
        let fields: Vec<&FieldOp> = layout.fields().collect();
        assert!(fields[0].is_padding());
        assert!(!fields[1].is_padding());
        let group = layout.resolve_group(None, ReportType::Input).unwrap();
        let data: Vec<&str> = group.data_fields().map(|f| f.name.as_str()).collect();
        assert_eq!(data, ["Keyboard/Keypad Idx_2", "Keyboard/Keypad Idx_3"]);
    }

    #[test]
    fn repeat_last_usage() {
        let bytes = [
            0x05, 0x01, 0x09, 0x30, 0x09, 0x31, 0x75, 0x08, 0x95, 0x04, 0x81, 0x02,
        ];
        let layout = DescriptorLayout::try_from(bytes.as_slice()).unwrap();
        assert_eq!(names(&layout), ["X", "Y", "Y_2", "Y_3"]);
    }

    #[test]
    fn usages_are_consumed() {
        let bytes = [
            0x05, 0x01, 0x09, 0x30, 0x75, 0x08, 0x95, 0x01, 0x81, 0x02, // X
            0x81, 0x02, // no usage left
            0x09, 0x31, 0xa1, 0x00, // Usage cleared by the collection
            0x81, 0x02, 0xc0,
        ];
        let layout = DescriptorLayout::try_from(bytes.as_slice()).unwrap();
        assert_eq!(names(&layout), ["X", "Padding / Reserved", "Padding / Reserved"]);
    }

    #[test]
    fn report_ids() {
        let bytes = [
            0x05, 0x01, 0x75, 0x08, 0x95, 0x01, // 8 bit
            0x85, 0x01, 0x09, 0x30, 0x81, 0x02, // Report 1: X
            0x85, 0x02, 0x09, 0x31, 0x81, 0x02, // Report 2: Y
            0x09, 0x32, 0x91, 0x02, // Report 2: Z output
            0x85, 0x01, 0x09, 0x38, 0x81, 0x02, // Report 1: Wheel
        ];
        let layout = DescriptorLayout::try_from(bytes.as_slice()).unwrap();
        assert_eq!(layout.list_report_ids(), [ReportId(1), ReportId(2)]);
        assert!(layout.has_multiple_report_ids());

        let report1 = layout.get_fields(Some(ReportId(1)), ReportType::Input).unwrap();
        assert_eq!(report1.len(), 2);
        assert_eq!(report1[1].name, "Wheel");
        assert_eq!(report1[1].bit_offset, 8);

        let output = layout.get_fields(Some(ReportId(2)), ReportType::Output).unwrap();
        assert_eq!(output[0].name, "Z");
        assert_eq!(output[0].bit_offset, 0);
    }

    #[test]
    fn push_pop() {
        let bytes = [
            0x05, 0x01, 0x15, 0x81, 0x25, 0x7f, 0x75, 0x08, 0x95, 0x01, //
            0xa4, // Push
            0x05, 0x09, 0x15, 0x00, 0x25, 0x01, 0x75, 0x01, 0x09, 0x01, 0x81, 0x02, // Button
            0xb4, // Pop
            0x09, 0x30, 0x81, 0x02, // X with the pushed globals
            0xb4, // Pop on empty stack is ignored
            0x09, 0x31, 0x81, 0x02,
        ];
        let layout = DescriptorLayout::try_from(bytes.as_slice()).unwrap();
        let fields: Vec<&FieldOp> = layout.fields().collect();
        assert_eq!(fields[0].name, "Button_1");
        assert_eq!(fields[1].name, "X");
        assert_eq!(fields[1].usage_page, UsagePage(0x01));
        assert_eq!(fields[1].bit_size, 8);
        assert_eq!(fields[1].bit_offset, 1);
        assert!(fields[1].is_signed);
        assert_eq!(fields[2].name, "Y");
    }

    #[test]
    fn push_pop_report_id() {
        let bytes = [
            0x05, 0x01, 0x75, 0x08, 0x95, 0x01, 0x85, 0x01, //
            0xa4, 0x85, 0x02, 0x09, 0x30, 0x81, 0x02, 0xb4, // X in report 2
            0x09, 0x31, 0x81, 0x02, // Y back in report 1
        ];
        let layout = DescriptorLayout::try_from(bytes.as_slice()).unwrap();
        assert_eq!(layout.get_fields(Some(ReportId(1)), ReportType::Input).unwrap()[0].name, "Y");
        assert_eq!(layout.get_fields(Some(ReportId(2)), ReportType::Input).unwrap()[0].name, "X");
    }

    #[test]
    fn extended_usages() {
        let rdesc: ReportDescriptor = [
            Item::usage_page(UsagePage(0x01)),
            Item::report_size(ReportSize(1)),
            Item::report_count(ReportCount(2)),
            Item::usage(0x0009_0001),
            Item::usage(0x30),
            Item::input(MainFlags::new().variable()),
        ]
        .into_iter()
        .collect();
        let layout = analyze(&rdesc).unwrap();
        let fields: Vec<&FieldOp> = layout.fields().collect();
        assert_eq!(fields[0].usage_page, UsagePage(0x09));
        assert_eq!(fields[0].name, "Button_1");
        assert_eq!(fields[1].usage_page, UsagePage(0x01));
        assert_eq!(fields[1].name, "X");
    }

    #[test]
    fn large_usage_ranges() {
        // a range over all usages is never materialized
        let rdesc: ReportDescriptor = [
            Item::usage_page(UsagePage(0xff00)),
            Item::usage_minimum(UsageMinimum(0x0001)),
            Item::usage_maximum(UsageMaximum(0xffff)),
            Item::report_size(ReportSize(8)),
            Item::report_count(ReportCount(2)),
            Item::input(MainFlags::new().variable()),
        ]
        .into_iter()
        .collect();
        let layout = analyze(&rdesc).unwrap();
        assert_eq!(names(&layout), ["Usage 0x01", "Usage 0x02"]);
        assert_eq!(layout.fields().next().map(|f| f.usage_page_name()).as_deref(), Some("Vendor Defined (0xFF00)"));
    }

    #[test]
    fn usage_maximum_without_minimum() {
        let bytes = [0x05, 0x09, 0x29, 0x03, 0x75, 0x01, 0x95, 0x01, 0x81, 0x02];
        let layout = DescriptorLayout::try_from(bytes.as_slice()).unwrap();
        assert_eq!(names(&layout), ["Padding / Reserved"]);
    }

    #[test]
    fn report_too_large() {
        let bytes = [0x75, 0xff, 0x97, 0xff, 0xff, 0xff, 0x00, 0x81, 0x02];
        let err = DescriptorLayout::try_from(bytes.as_slice()).unwrap_err();
        assert!(matches!(err, ParserError::ReportTooLarge { report_type: ReportType::Input, .. }));

        // Report Size 0 with a huge count
        let bytes = [0x75, 0x00, 0x97, 0xff, 0xff, 0xff, 0x00, 0x81, 0x02];
        assert!(DescriptorLayout::try_from(bytes.as_slice()).is_err());
    }

    #[test]
    fn physical_and_units() {
        let bytes = [
            0x05, 0x01, 0x09, 0x39, 0x15, 0x00, 0x25, 0x07, 0x35, 0x00, 0x46, 0x3b, 0x01, //
            0x65, 0x14, 0x55, 0x0e, 0x75, 0x04, 0x95, 0x01, 0x81, 0x42,
        ];
        let layout = DescriptorLayout::try_from(bytes.as_slice()).unwrap();
        let hat = layout.fields().next().unwrap();
        assert_eq!(hat.name, "Hat_Switch");
        assert_eq!(hat.physical_minimum, Some(PhysicalMinimum(0)));
        assert_eq!(hat.physical_maximum, Some(PhysicalMaximum(315)));
        assert_eq!(hat.unit, Some(Unit(0x14)));
        assert_eq!(hat.unit_exponent, Some(UnitExponent(14)));
    }
}
