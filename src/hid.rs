// SPDX-License-Identifier: MIT

//! The HID Core items. This module handles converting a report descriptor byte
//! stream into its individual [Item]s and back.
//! Interpretation of the resulting items is left to [crate::analyze].
//!
//! In this document and unless stated otherwise, a reference to "Section a.b.c" refers to the
//! [HID Device Class Definition for HID 1.11](https://www.usb.org/document-library/device-class-definition-hid-111).
//!
//! # Parsing HID Report Descriptors
//!
//! Entry point is usually [`parse`] or [`ReportDescriptor::try_from(bytes)`](ReportDescriptor::try_from):
//!
//! ```
//! # use hidcodec::hid::*;
//! let bytes = [0x05, 0x01, 0x09, 0x02, 0xa1, 0x01, 0x15, 0x81, 0xc0];
//! let rdesc = parse(&bytes).unwrap();
//! assert_eq!(rdesc.len(), 5);
//! assert_eq!(rdesc[0].tag(), ItemTag::UsagePage);
//! assert_eq!(rdesc[3].value(), Some(-127));
//! assert_eq!(rdesc.bytes(), &bytes);
//! ```
//!
//! # Building HID Report Descriptors programmatically
//!
//! ```
//! # use hidcodec::hid::*;
//! # use hidcodec::types::*;
//! let rdesc: ReportDescriptor = [
//!     Item::usage_page(UsagePage(0x01)),
//!     Item::usage(0x02),
//!     Item::collection(CollectionType::Application),
//!     Item::logical_minimum(LogicalMinimum(-127)),
//!     Item::end_collection(),
//! ]
//! .into_iter()
//! .collect();
//! assert_eq!(rdesc.hex(), "05010902A1011581C0");
//! ```
//!
//! Note that items are **not** checked against each other, a descriptor is
//! just an ordered list of items.

use crate::types::*;
use crate::{ensure, ParserError};

use std::sync::OnceLock;
use thiserror::Error;

/// The header byte reserved for a Long Item, Section 6.2.2.3
pub const LONG_ITEM_HEADER: u8 = 0b11111110;

/// Convenience function to be extract a single bit as bool from a value
fn bit(bits: u32, bit: u8) -> bool {
    assert!(bit < 32);
    bits & (1 << bit) != 0
}

/// Recover the payload bit pattern of a value that was encoded in the
/// smallest signed width.
fn signed_bits(value: i64) -> u32 {
    match value {
        -128..=-1 => (value as i8) as u8 as u32,
        -32768..=-129 => (value as i16) as u16 as u32,
        _ => value as u32,
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ItemError {
    #[error("Value {value} does not fit into a {tag} item")]
    OutOfRange { tag: ItemTag, value: i64 },
    #[error("{tag} cannot be negative: {value}")]
    Negative { tag: ItemTag, value: i64 },
    #[error("Invalid data: {message}")]
    InvalidData { message: String },
}

type Result<T> = std::result::Result<T, ItemError>;

/// The data bytes of a HID item, guaranteed to
/// be of length 1, 2, or 4 bytes depending on the
/// input and in LE byte order.
///
/// This struct only exists for conversion from numbers to
/// a hid-compatible byte array.
struct HidBytes {
    /// The size code in the item header, Section 6.2.2.2
    size_code: u8,
    bytes: Vec<u8>,
}

impl HidBytes {
    fn none() -> HidBytes {
        HidBytes {
            size_code: 0b00,
            bytes: vec![],
        }
    }

    /// Smallest two's complement representation of `value`.
    fn signed(value: i64) -> HidBytes {
        const MIN16: i64 = i16::MIN as i64;
        const MAX16: i64 = i16::MAX as i64;
        let (size_code, bytes) = match value {
            -128..=127 => (0b01, (value as i8).to_le_bytes().to_vec()),
            MIN16..=MAX16 => (0b10, (value as i16).to_le_bytes().to_vec()),
            _ => (0b11, (value as i32).to_le_bytes().to_vec()),
        };
        HidBytes { size_code, bytes }
    }

    /// Smallest unsigned representation of `value`.
    fn unsigned(value: i64) -> HidBytes {
        let bytes = (value as u32).to_le_bytes();
        let (size_code, cutoff) = match value {
            0..=0xff => (0b01, 1),
            0x100..=0xffff => (0b10, 2),
            _ => (0b11, 4),
        };
        HidBytes {
            size_code,
            bytes: bytes[0..cutoff].to_vec(),
        }
    }

    /// Raw payload bytes, their length is checked by [Item::new].
    fn raw(bytes: &[u8]) -> HidBytes {
        let size_code = match bytes.len() {
            0 => 0b00,
            1 => 0b01,
            2 => 0b10,
            _ => 0b11,
        };
        HidBytes {
            size_code,
            bytes: bytes.to_vec(),
        }
    }

    fn take(self) -> Vec<u8> {
        self.bytes
    }
}

/// Represents one value extracted from a set of (LE) bytes.
pub(crate) struct HidValue {
    value: u32,
    nbytes: usize,
}

impl HidValue {
    /// The value interpreted as two's complement of its own width
    pub(crate) fn signed(&self) -> i64 {
        match self.nbytes {
            1 => ((self.value & 0xFF) as i8) as i64,
            2 => ((self.value & 0xFFFF) as i16) as i64,
            _ => (self.value as i32) as i64,
        }
    }

    pub(crate) fn unsigned(&self) -> i64 {
        self.value as i64
    }
}

impl TryFrom<&[u8]> for HidValue {
    type Error = ItemError;

    fn try_from(bytes: &[u8]) -> Result<HidValue> {
        let value = match *bytes {
            [b0] => b0 as u32,
            [b0, b1] => u16::from_le_bytes([b0, b1]) as u32,
            [b0, b1, b2, b3] => u32::from_le_bytes([b0, b1, b2, b3]),
            _ => {
                return Err(ItemError::InvalidData {
                    message: format!("Cannot convert {} bytes to a value", bytes.len()),
                })
            }
        };
        Ok(HidValue {
            value,
            nbytes: bytes.len(),
        })
    }
}

/// The type of an item as encoded in bits 2 and 3 of the header byte,
/// see Section 6.2.2.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemClass {
    Main,
    Global,
    Local,
    Reserved,
}

impl From<u8> for ItemClass {
    fn from(header: u8) -> ItemClass {
        match (header & 0b1100) >> 2 {
            0 => ItemClass::Main,
            1 => ItemClass::Global,
            2 => ItemClass::Local,
            _ => ItemClass::Reserved,
        }
    }
}

/// The tag of a short item, i.e. the upper 6 bits of the header byte.
///
/// Tags not known to this crate are kept as [ItemTag::Other] so a
/// descriptor with e.g. designator or string items can still be itemized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemTag {
    // Main
    Input,
    Output,
    Feature,
    Collection,
    EndCollection,
    // Global
    UsagePage,
    LogicalMinimum,
    LogicalMaximum,
    PhysicalMinimum,
    PhysicalMaximum,
    UnitExponent,
    Unit,
    ReportSize,
    ReportId,
    ReportCount,
    Push,
    Pop,
    // Local
    Usage,
    UsageMinimum,
    UsageMaximum,
    /// Any other tag, the value is `header & 0xFC`.
    Other(u8),
}

impl From<u8> for ItemTag {
    fn from(header: u8) -> ItemTag {
        match header & 0b11111100 {
            0b10000000 => ItemTag::Input,
            0b10010000 => ItemTag::Output,
            0b10110000 => ItemTag::Feature,
            0b10100000 => ItemTag::Collection,
            0b11000000 => ItemTag::EndCollection,
            0b00000100 => ItemTag::UsagePage,
            0b00010100 => ItemTag::LogicalMinimum,
            0b00100100 => ItemTag::LogicalMaximum,
            0b00110100 => ItemTag::PhysicalMinimum,
            0b01000100 => ItemTag::PhysicalMaximum,
            0b01010100 => ItemTag::UnitExponent,
            0b01100100 => ItemTag::Unit,
            0b01110100 => ItemTag::ReportSize,
            0b10000100 => ItemTag::ReportId,
            0b10010100 => ItemTag::ReportCount,
            0b10100100 => ItemTag::Push,
            0b10110100 => ItemTag::Pop,
            0b00001000 => ItemTag::Usage,
            0b00011000 => ItemTag::UsageMinimum,
            0b00101000 => ItemTag::UsageMaximum,
            n => ItemTag::Other(n),
        }
    }
}

impl ItemTag {
    /// The header byte of this tag with a size code of zero.
    pub fn prefix(&self) -> u8 {
        match self {
            ItemTag::Input => 0b10000000,
            ItemTag::Output => 0b10010000,
            ItemTag::Feature => 0b10110000,
            ItemTag::Collection => 0b10100000,
            ItemTag::EndCollection => 0b11000000,
            ItemTag::UsagePage => 0b00000100,
            ItemTag::LogicalMinimum => 0b00010100,
            ItemTag::LogicalMaximum => 0b00100100,
            ItemTag::PhysicalMinimum => 0b00110100,
            ItemTag::PhysicalMaximum => 0b01000100,
            ItemTag::UnitExponent => 0b01010100,
            ItemTag::Unit => 0b01100100,
            ItemTag::ReportSize => 0b01110100,
            ItemTag::ReportId => 0b10000100,
            ItemTag::ReportCount => 0b10010100,
            ItemTag::Push => 0b10100100,
            ItemTag::Pop => 0b10110100,
            ItemTag::Usage => 0b00001000,
            ItemTag::UsageMinimum => 0b00011000,
            ItemTag::UsageMaximum => 0b00101000,
            ItemTag::Other(n) => n & 0b11111100,
        }
    }

    pub fn class(&self) -> ItemClass {
        ItemClass::from(self.prefix())
    }

    /// Whether the payload of this tag is a two's complement value.
    ///
    /// Usages, the Usage Page and the report shape (ID, size, count)
    /// are unsigned, every other numeric item is signed.
    pub fn is_signed(&self) -> bool {
        !matches!(
            self,
            ItemTag::UsagePage
                | ItemTag::Usage
                | ItemTag::UsageMinimum
                | ItemTag::UsageMaximum
                | ItemTag::ReportId
                | ItemTag::ReportSize
                | ItemTag::ReportCount
        )
    }

    /// False for the items that never carry data.
    pub fn has_data(&self) -> bool {
        !matches!(self, ItemTag::EndCollection | ItemTag::Push | ItemTag::Pop)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ItemTag::Input => "Input",
            ItemTag::Output => "Output",
            ItemTag::Feature => "Feature",
            ItemTag::Collection => "Collection",
            ItemTag::EndCollection => "End Collection",
            ItemTag::UsagePage => "Usage Page",
            ItemTag::LogicalMinimum => "Logical Minimum",
            ItemTag::LogicalMaximum => "Logical Maximum",
            ItemTag::PhysicalMinimum => "Physical Minimum",
            ItemTag::PhysicalMaximum => "Physical Maximum",
            ItemTag::UnitExponent => "Unit Exponent",
            ItemTag::Unit => "Unit",
            ItemTag::ReportSize => "Report Size",
            ItemTag::ReportId => "Report ID",
            ItemTag::ReportCount => "Report Count",
            ItemTag::Push => "Push",
            ItemTag::Pop => "Pop",
            ItemTag::Usage => "Usage",
            ItemTag::UsageMinimum => "Usage Minimum",
            ItemTag::UsageMaximum => "Usage Maximum",
            ItemTag::Other(_) => "Unknown",
        }
    }
}

impl std::fmt::Display for ItemTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemTag::Other(n) => write!(f, "Unknown ({n:#04x})"),
            _ => write!(f, "{}", self.name()),
        }
    }
}

/// Main Data Item, see Section 6.2.5.
///
/// A data item is a Main item that "create a field within a report and include Input,
/// Output, and Feature.". These have shared properties provided by this trait.
///
/// These properties come in pairs (bit set or unset in the HID report descriptor item),
/// for readability in the caller, a function is provided for each state.
pub trait MainDataItem {
    /// True if the data is constant and never changes. This typically means the data
    /// can be ignored.
    fn is_constant(&self) -> bool;

    fn is_data(&self) -> bool {
        !self.is_constant()
    }

    /// True if the data is a variable field.
    ///
    /// Mutually exclusive with [MainDataItem::is_array].
    fn is_variable(&self) -> bool;

    /// True if the data is an array field, i.e. each element carries an
    /// index into the usages rather than a value.
    fn is_array(&self) -> bool {
        !self.is_variable()
    }

    /// True if the data is relative compared to a previous report
    fn is_relative(&self) -> bool;

    fn is_absolute(&self) -> bool {
        !self.is_relative()
    }

    /// True if the data wraps around at the logical
    /// minimum/maximum (e.g. a dial that can spin at 360 degrees).
    fn wraps(&self) -> bool;

    /// True if the data was pre-processed on the device
    /// and the logical range is not linear.
    fn is_nonlinear(&self) -> bool;

    /// True if the control does not have a preferred state it
    /// returns to when the user stops interacting.
    fn has_no_preferred_state(&self) -> bool;

    /// True if the control has a null state where it does not send
    /// data (e.g. a joystick in neutral state)
    fn has_null_state(&self) -> bool;

    /// True if the control emits a fixed size stream of bytes.
    fn is_buffered_bytes(&self) -> bool;
}

/// The flags of an Input, Output or Feature item, Section 6.2.2.5.
///
/// Only flags that differ from the default need to be set:
///
/// ```
/// # use hidcodec::hid::*;
/// let flags = MainFlags::new().constant().variable();
/// assert_eq!(flags.bits(), 0x03);
/// assert!(flags.is_constant() && flags.is_variable());
/// assert!(MainFlags::from(0x02).is_data());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MainFlags {
    is_constant: bool,
    is_variable: bool,
    is_relative: bool,
    wraps: bool,
    is_nonlinear: bool,
    has_no_preferred_state: bool,
    has_null_state: bool,
    /// Reserved on Input items
    is_volatile: bool,
    is_buffered_bytes: bool,
}

impl MainFlags {
    /// Data, Array, Absolute and all other flags unset.
    pub fn new() -> MainFlags {
        MainFlags::default()
    }

    pub fn constant(mut self) -> Self {
        self.is_constant = true;
        self
    }

    pub fn data(mut self) -> Self {
        self.is_constant = false;
        self
    }

    pub fn variable(mut self) -> Self {
        self.is_variable = true;
        self
    }

    pub fn array(mut self) -> Self {
        self.is_variable = false;
        self
    }

    pub fn relative(mut self) -> Self {
        self.is_relative = true;
        self
    }

    pub fn absolute(mut self) -> Self {
        self.is_relative = false;
        self
    }

    pub fn wrap(mut self) -> Self {
        self.wraps = true;
        self
    }

    pub fn nonlinear(mut self) -> Self {
        self.is_nonlinear = true;
        self
    }

    pub fn no_preferred_state(mut self) -> Self {
        self.has_no_preferred_state = true;
        self
    }

    pub fn null_state(mut self) -> Self {
        self.has_null_state = true;
        self
    }

    pub fn volatile(mut self) -> Self {
        self.is_volatile = true;
        self
    }

    pub fn buffered_bytes(mut self) -> Self {
        self.is_buffered_bytes = true;
        self
    }

    pub fn is_volatile(&self) -> bool {
        self.is_volatile
    }

    pub fn bits(&self) -> u32 {
        let mut flags: u32 = 0;

        if self.is_constant {
            flags |= 1 << 0;
        }
        if self.is_variable {
            flags |= 1 << 1;
        }
        if self.is_relative {
            flags |= 1 << 2;
        }
        if self.wraps {
            flags |= 1 << 3;
        }
        if self.is_nonlinear {
            flags |= 1 << 4;
        }
        if self.has_no_preferred_state {
            flags |= 1 << 5;
        }
        if self.has_null_state {
            flags |= 1 << 6;
        }
        if self.is_volatile {
            flags |= 1 << 7;
        }
        if self.is_buffered_bytes {
            flags |= 1 << 8;
        }
        flags
    }
}

impl From<u32> for MainFlags {
    fn from(data: u32) -> MainFlags {
        MainFlags {
            is_constant: bit(data, 0),
            is_variable: bit(data, 1),
            is_relative: bit(data, 2),
            wraps: bit(data, 3),
            is_nonlinear: bit(data, 4),
            has_no_preferred_state: bit(data, 5),
            has_null_state: bit(data, 6),
            is_volatile: bit(data, 7),
            is_buffered_bytes: bit(data, 8),
        }
    }
}

impl MainDataItem for MainFlags {
    fn is_constant(&self) -> bool {
        self.is_constant
    }

    fn is_variable(&self) -> bool {
        self.is_variable
    }

    fn is_relative(&self) -> bool {
        self.is_relative
    }

    fn wraps(&self) -> bool {
        self.wraps
    }

    fn is_nonlinear(&self) -> bool {
        self.is_nonlinear
    }

    fn has_no_preferred_state(&self) -> bool {
        self.has_no_preferred_state
    }

    fn has_null_state(&self) -> bool {
        self.has_null_state
    }

    fn is_buffered_bytes(&self) -> bool {
        self.is_buffered_bytes
    }
}

/// See Section 6.2.2.6. A collection groups several items together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum CollectionType {
    Physical,
    Application,
    Logical,
    Report,
    NamedArray,
    UsageSwitch,
    UsageModifier,
    Reserved { value: u8 },
    VendorDefined { value: u8 },
}

impl From<CollectionType> for u8 {
    fn from(c: CollectionType) -> u8 {
        match c {
            CollectionType::Physical => 0x00,
            CollectionType::Application => 0x01,
            CollectionType::Logical => 0x02,
            CollectionType::Report => 0x03,
            CollectionType::NamedArray => 0x04,
            CollectionType::UsageSwitch => 0x05,
            CollectionType::UsageModifier => 0x06,
            CollectionType::Reserved { value } => value,
            CollectionType::VendorDefined { value } => value,
        }
    }
}

impl From<u8> for CollectionType {
    fn from(v: u8) -> CollectionType {
        match v {
            0x00 => CollectionType::Physical,
            0x01 => CollectionType::Application,
            0x02 => CollectionType::Logical,
            0x03 => CollectionType::Report,
            0x04 => CollectionType::NamedArray,
            0x05 => CollectionType::UsageSwitch,
            0x06 => CollectionType::UsageModifier,
            value @ 0x07..=0x7f => CollectionType::Reserved { value },
            value @ 0x80..=0xff => CollectionType::VendorDefined { value },
        }
    }
}

impl std::fmt::Display for CollectionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectionType::Physical => write!(f, "Physical"),
            CollectionType::Application => write!(f, "Application"),
            CollectionType::Logical => write!(f, "Logical"),
            CollectionType::Report => write!(f, "Report"),
            CollectionType::NamedArray => write!(f, "Named Array"),
            CollectionType::UsageSwitch => write!(f, "Usage Switch"),
            CollectionType::UsageModifier => write!(f, "Usage Modifier"),
            CollectionType::Reserved { value } => write!(f, "Reserved ({value:#04x})"),
            CollectionType::VendorDefined { value } => write!(f, "Vendor Defined ({value:#04x})"),
        }
    }
}

/// The payload of an [Item].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemData {
    /// Zero data bytes
    None,
    /// A numeric value, serialized in the smallest width that fits
    /// the tag's signedness.
    Value(i64),
    /// Raw payload bytes, serialized as-is. Must be 0, 1, 2 or 4 bytes long.
    Raw(Vec<u8>),
}

/// A single short item, Section 6.2.2.2.
///
/// Serializes to `[header][0, 1, 2 or 4 data bytes]` where the header is
/// the tag's prefix ORed with the size code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    tag: ItemTag,
    data: ItemData,
}

impl Item {
    /// Create and validate an item for any tag, including tags unknown
    /// to this crate.
    ///
    /// ```
    /// # use hidcodec::hid::*;
    /// let item = Item::new(ItemTag::from(0xf0), ItemData::Value(0x55)).unwrap();
    /// assert_eq!(item.as_bytes(), [0xf1, 0x55]);
    ///
    /// assert!(Item::new(ItemTag::ReportCount, ItemData::Value(-1)).is_err());
    /// assert!(Item::new(ItemTag::LogicalMinimum, ItemData::Value(1 << 40)).is_err());
    /// ```
    pub fn new(tag: ItemTag, data: ItemData) -> Result<Item> {
        let data = if tag.has_data() { data } else { ItemData::None };
        let item = Item { tag, data };
        item.validate()?;
        Ok(item)
    }

    fn with_value(tag: ItemTag, value: i64) -> Item {
        Item {
            tag,
            data: ItemData::Value(value),
        }
    }

    fn validate(&self) -> Result<()> {
        match &self.data {
            ItemData::None => Ok(()),
            ItemData::Raw(bytes) => {
                ensure!(
                    matches!(bytes.len(), 0 | 1 | 2 | 4),
                    ItemError::InvalidData {
                        message: format!("Invalid payload length {}", bytes.len()),
                    }
                );
                Ok(())
            }
            ItemData::Value(value) => {
                let value = *value;
                let tag = self.tag;
                if matches!(tag, ItemTag::ReportSize | ItemTag::ReportCount) {
                    ensure!(value >= 0, ItemError::Negative { tag, value });
                }
                let fits = match tag {
                    ItemTag::ReportId => (0..=0xff).contains(&value),
                    _ if tag.is_signed() => {
                        (i32::MIN as i64..=i32::MAX as i64).contains(&value)
                    }
                    _ => (0..=u32::MAX as i64).contains(&value),
                };
                ensure!(fits, ItemError::OutOfRange { tag, value });
                Ok(())
            }
        }
    }

    pub fn tag(&self) -> ItemTag {
        self.tag
    }

    pub fn data(&self) -> &ItemData {
        &self.data
    }

    /// The numeric value of this item, with the tag's signedness applied.
    pub fn value(&self) -> Option<i64> {
        match &self.data {
            ItemData::None => None,
            ItemData::Value(v) => Some(*v),
            ItemData::Raw(bytes) => HidValue::try_from(bytes.as_slice()).ok().map(|v| {
                if self.tag.is_signed() {
                    v.signed()
                } else {
                    v.unsigned()
                }
            }),
        }
    }

    /// The payload as unsigned bit pattern, e.g. for flag items.
    pub fn bits(&self) -> Option<u32> {
        match &self.data {
            ItemData::None => None,
            ItemData::Value(v) if self.tag.is_signed() => Some(signed_bits(*v)),
            ItemData::Value(v) => Some(*v as u32),
            ItemData::Raw(bytes) => HidValue::try_from(bytes.as_slice()).ok().map(|v| v.value),
        }
    }

    /// The flags of an Input, Output or Feature item, `None` for
    /// any other item.
    pub fn main_flags(&self) -> Option<MainFlags> {
        match self.tag {
            ItemTag::Input | ItemTag::Output | ItemTag::Feature => {
                Some(MainFlags::from(self.bits().unwrap_or(0)))
            }
            _ => None,
        }
    }

    /// The length of this item in bytes, inclusive of the header byte.
    pub fn size(&self) -> usize {
        self.payload().bytes.len() + 1
    }

    fn payload(&self) -> HidBytes {
        match &self.data {
            ItemData::None => HidBytes::none(),
            ItemData::Value(v) if self.tag.is_signed() => HidBytes::signed(*v),
            ItemData::Value(v) => HidBytes::unsigned(*v),
            ItemData::Raw(bytes) => HidBytes::raw(bytes),
        }
    }

    /// Return the HID bytes representing this [Item].
    ///
    /// ```
    /// # use hidcodec::hid::*;
    /// # use hidcodec::types::*;
    /// let item = Item::logical_minimum(LogicalMinimum(128));
    /// let bytes = item.as_bytes();
    /// // first byte is the LogicalMinimum prefix plus two data bytes for signed 128
    /// assert_eq!(bytes, [0b00010100 + 2, 128, 0]);
    /// ```
    pub fn as_bytes(&self) -> Vec<u8> {
        let payload = self.payload();
        let header = self.tag.prefix() | payload.size_code;
        [vec![header], payload.take()].concat()
    }

    pub fn input(flags: MainFlags) -> Item {
        Item::with_value(ItemTag::Input, flags.bits() as i64)
    }

    pub fn output(flags: MainFlags) -> Item {
        Item::with_value(ItemTag::Output, flags.bits() as i64)
    }

    pub fn feature(flags: MainFlags) -> Item {
        Item::with_value(ItemTag::Feature, flags.bits() as i64)
    }

    pub fn collection(collection: CollectionType) -> Item {
        Item::with_value(ItemTag::Collection, u8::from(collection) as i64)
    }

    pub fn end_collection() -> Item {
        Item {
            tag: ItemTag::EndCollection,
            data: ItemData::None,
        }
    }

    pub fn usage_page(usage_page: UsagePage) -> Item {
        Item::with_value(ItemTag::UsagePage, u16::from(usage_page) as i64)
    }

    pub fn logical_minimum(minimum: LogicalMinimum) -> Item {
        Item::with_value(ItemTag::LogicalMinimum, i32::from(minimum) as i64)
    }

    pub fn logical_maximum(maximum: LogicalMaximum) -> Item {
        Item::with_value(ItemTag::LogicalMaximum, i32::from(maximum) as i64)
    }

    pub fn physical_minimum(minimum: PhysicalMinimum) -> Item {
        Item::with_value(ItemTag::PhysicalMinimum, i32::from(minimum) as i64)
    }

    pub fn physical_maximum(maximum: PhysicalMaximum) -> Item {
        Item::with_value(ItemTag::PhysicalMaximum, i32::from(maximum) as i64)
    }

    pub fn unit_exponent(exponent: UnitExponent) -> Item {
        Item::with_value(ItemTag::UnitExponent, i32::from(exponent) as i64)
    }

    pub fn unit(unit: Unit) -> Item {
        Item::with_value(ItemTag::Unit, i32::from(unit) as i64)
    }

    pub fn report_size(size: ReportSize) -> Item {
        Item::with_value(ItemTag::ReportSize, u32::from(size) as i64)
    }

    pub fn report_id(id: ReportId) -> Item {
        Item::with_value(ItemTag::ReportId, u8::from(id) as i64)
    }

    pub fn report_count(count: ReportCount) -> Item {
        Item::with_value(ItemTag::ReportCount, u32::from(count) as i64)
    }

    pub fn push() -> Item {
        Item {
            tag: ItemTag::Push,
            data: ItemData::None,
        }
    }

    pub fn pop() -> Item {
        Item {
            tag: ItemTag::Pop,
            data: ItemData::None,
        }
    }

    /// A Usage item. Values above 0xFFFF are extended usages with
    /// the Usage Page in the upper 16 bits.
    pub fn usage(usage: u32) -> Item {
        Item::with_value(ItemTag::Usage, usage as i64)
    }

    pub fn usage_minimum(minimum: UsageMinimum) -> Item {
        Item::with_value(ItemTag::UsageMinimum, u32::from(minimum) as i64)
    }

    pub fn usage_maximum(maximum: UsageMaximum) -> Item {
        Item::with_value(ItemTag::UsageMaximum, u32::from(maximum) as i64)
    }
}

/// One entry of [ReportDescriptor::summary], a flat description of an item
/// for inspection tooling.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ItemSummary {
    pub offset: usize,
    pub tag_code: u8,
    pub tag_name: String,
    pub data: Option<i64>,
}

/// An ordered sequence of [Item]s, the result of compiling or parsing.
///
/// The serialized bytes are computed on first access to [ReportDescriptor::bytes]
/// and kept until the next mutation.
#[derive(Debug, Clone, Default)]
pub struct ReportDescriptor {
    items: Vec<Item>,
    bytes: OnceLock<Vec<u8>>,
}

impl ReportDescriptor {
    pub fn new() -> ReportDescriptor {
        ReportDescriptor::default()
    }

    /// Append an item, invalidating the serialized bytes.
    pub fn push(&mut self, item: Item) {
        self.items.push(item);
        self.bytes = OnceLock::new();
    }

    /// Append all items, invalidating the serialized bytes.
    pub fn extend<I: IntoIterator<Item = Item>>(&mut self, items: I) {
        self.items.extend(items);
        self.bytes = OnceLock::new();
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    /// The serialized report descriptor.
    pub fn bytes(&self) -> &[u8] {
        self.bytes
            .get_or_init(|| self.items.iter().flat_map(|item| item.as_bytes()).collect())
    }

    /// The length of the serialized report descriptor in bytes.
    pub fn size(&self) -> usize {
        self.bytes().len()
    }

    /// The serialized report descriptor as upper-case hex string without separators.
    pub fn hex(&self) -> String {
        self.bytes().iter().map(|b| format!("{b:02X}")).collect()
    }

    /// The serialized report descriptor in standard base64.
    pub fn base64(&self) -> String {
        base64::encode(self.bytes())
    }

    /// A flat description of every item and its byte offset in [ReportDescriptor::bytes].
    pub fn summary(&self) -> Vec<ItemSummary> {
        let mut offset = 0;
        self.items
            .iter()
            .map(|item| {
                let summary = ItemSummary {
                    offset,
                    tag_code: item.tag().prefix(),
                    tag_name: item.tag().to_string(),
                    data: item.value(),
                };
                offset += item.size();
                summary
            })
            .collect()
    }
}

impl PartialEq for ReportDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.items == other.items
    }
}

impl Eq for ReportDescriptor {}

impl std::ops::Deref for ReportDescriptor {
    type Target = [Item];

    fn deref(&self) -> &Self::Target {
        &self.items
    }
}

impl From<Vec<Item>> for ReportDescriptor {
    fn from(items: Vec<Item>) -> ReportDescriptor {
        ReportDescriptor {
            items,
            bytes: OnceLock::new(),
        }
    }
}

impl FromIterator<Item> for ReportDescriptor {
    fn from_iter<I: IntoIterator<Item = Item>>(iter: I) -> Self {
        ReportDescriptor::from(iter.into_iter().collect::<Vec<Item>>())
    }
}

impl<'a> IntoIterator for &'a ReportDescriptor {
    type Item = &'a Item;
    type IntoIter = std::slice::Iter<'a, Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl TryFrom<&[u8]> for ReportDescriptor {
    type Error = ParserError;

    /// Attempts to itemize the given HID report descriptor.
    fn try_from(bytes: &[u8]) -> crate::Result<Self> {
        parse(bytes)
    }
}

/// Render a buffer for an error message: as text if the whole buffer is
/// printable ASCII (e.g. an error message piped in instead of a
/// descriptor), otherwise as hex bytes.
fn render_buffer(bytes: &[u8]) -> String {
    if !bytes.is_empty() && bytes.iter().all(|b| (32..=126).contains(b)) {
        format!("{:?}", String::from_utf8_lossy(bytes))
    } else {
        let hex: Vec<String> = bytes.iter().map(|b| format!("{b:02x}")).collect();
        format!("[{}]", hex.join(" "))
    }
}

/// Split the HID Report Descriptor represented by bytes into its set of
/// items.
///
/// Long items are rejected, unknown short item tags are kept as
/// [ItemTag::Other].
pub fn parse(bytes: &[u8]) -> crate::Result<ReportDescriptor> {
    let mut offset = 0;
    let mut items: Vec<Item> = Vec::new();
    while offset < bytes.len() {
        let header = bytes[offset];
        ensure!(
            header != LONG_ITEM_HEADER,
            ParserError::UnsupportedFeature {
                offset,
                message: "Long items are not supported".into(),
            }
        );

        let tag = ItemTag::from(header);
        let size = match header & 0b11 {
            0 => 0,
            1 => 1,
            2 => 2,
            _ => 4,
        };
        let start = offset + 1;
        let end = start + size;
        ensure!(
            end <= bytes.len(),
            ParserError::Protocol {
                offset,
                message: format!(
                    "Insufficient data for item payload, need {size} bytes but {} remain in {}",
                    bytes.len() - start,
                    render_buffer(bytes)
                ),
            }
        );

        let data = if size == 0 {
            ItemData::None
        } else {
            let value = HidValue::try_from(&bytes[start..end])
                .map_err(|source| ParserError::InvalidItem { offset, source })?;
            if tag.is_signed() {
                ItemData::Value(value.signed())
            } else {
                ItemData::Value(value.unsigned())
            }
        };

        if let ItemTag::Other(t) = tag {
            log::debug!("Unknown item tag {t:#04x} at offset {offset}, keeping it as generic item");
        } else if !tag.has_data() && size > 0 {
            log::debug!("Discarding {size} data bytes of {tag} at offset {offset}");
        }

        let item = Item::new(tag, data).map_err(|source| ParserError::InvalidItem { offset, source })?;
        items.push(item);
        offset = end;
    }
    Ok(ReportDescriptor::from(items))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_size() {
        let bytes = [0x05, 0x01, 0x26, 0xff, 0x00, 0x27, 0x00, 0x00, 0x01, 0x00, 0xc0];
        let rdesc = parse(&bytes).unwrap();
        let sizes: Vec<usize> = rdesc.iter().map(|i| i.size()).collect();
        assert_eq!(sizes, [2, 3, 5, 1]);
    }

    #[test]
    fn item_tag() {
        assert_eq!(ItemTag::from(0x05), ItemTag::UsagePage);
        assert_eq!(ItemTag::from(0x81), ItemTag::Input);
        assert_eq!(ItemTag::from(0xc0), ItemTag::EndCollection);
        assert_eq!(ItemTag::from(0x2a), ItemTag::UsageMaximum);
        assert_eq!(ItemTag::from(0xf1), ItemTag::Other(0xf0));

        assert_eq!(ItemTag::Input.class(), ItemClass::Main);
        assert_eq!(ItemTag::ReportId.class(), ItemClass::Global);
        assert_eq!(ItemTag::UsageMinimum.class(), ItemClass::Local);
        assert_eq!(ItemTag::Other(0xfc).class(), ItemClass::Reserved);

        for tag in [ItemTag::UsagePage, ItemTag::Usage, ItemTag::ReportSize] {
            assert!(!tag.is_signed());
            assert_eq!(ItemTag::from(tag.prefix()), tag);
        }
        for tag in [ItemTag::LogicalMinimum, ItemTag::Unit, ItemTag::Input] {
            assert!(tag.is_signed());
        }
    }

    #[test]
    fn hid_value() {
        let v = HidValue::try_from([0xff].as_slice()).unwrap();
        assert_eq!(v.signed(), -1);
        assert_eq!(v.unsigned(), 255);

        let v = HidValue::try_from([0x00, 0x80].as_slice()).unwrap();
        assert_eq!(v.signed(), -32768);
        assert_eq!(v.unsigned(), 0x8000);

        let v = HidValue::try_from([0xff, 0xff, 0xff, 0xff].as_slice()).unwrap();
        assert_eq!(v.signed(), -1);
        assert_eq!(v.unsigned(), u32::MAX as i64);

        assert!(HidValue::try_from([0x1, 0x2, 0x3].as_slice()).is_err());
        assert!(HidValue::try_from([].as_slice()).is_err());
    }

    #[test]
    fn hidbytes() {
        assert_eq!(HidBytes::unsigned(0).take(), [0x0]);
        assert_eq!(HidBytes::unsigned(255).take(), [0xff]);
        assert_eq!(HidBytes::unsigned(256).take(), [0x0, 0x1]);
        assert_eq!(HidBytes::unsigned(0xff00).take(), [0x0, 0xff]);
        assert_eq!(HidBytes::unsigned(0x10000).take(), [0x0, 0x0, 0x1, 0x0]);
        assert_eq!(HidBytes::unsigned(u32::MAX as i64).take(), [0xff, 0xff, 0xff, 0xff]);

        assert_eq!(HidBytes::signed(-1).take(), [0xff]);
        assert_eq!(HidBytes::signed(-127).take(), [0x81]);
        // >=128 signed is encoded over two bytes
        assert_eq!(HidBytes::signed(128).take(), [0x80, 0x0]);
        assert_eq!(HidBytes::signed(255).take(), [0xff, 0x0]);
        assert_eq!(HidBytes::signed(-129).take(), [0x7f, 0xff]);
        assert_eq!(HidBytes::signed(i16::MAX as i64 + 1).take(), [0x00, 0x80, 0x00, 0x00]);
        assert_eq!(HidBytes::signed(i32::MIN as i64).take(), [0x00, 0x00, 0x00, 0x80]);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serialize_summary() {
        let rdesc = parse(&[0x05, 0x01, 0x15, 0x81, 0xc0]).unwrap();
        let value = serde_json::to_value(rdesc.summary()).unwrap();
        assert_eq!(value[1]["offset"], 2);
        assert_eq!(value[1]["tag_code"], 0x14);
        assert_eq!(value[1]["data"], -127);
        assert!(value[2]["data"].is_null());
    }

    #[test]
    fn size_codes() {
        assert_eq!(HidBytes::none().size_code, 0b00);
        assert_eq!(HidBytes::unsigned(0xff).size_code, 0b01);
        assert_eq!(HidBytes::unsigned(0x100).size_code, 0b10);
        assert_eq!(HidBytes::unsigned(0x10000).size_code, 0b11);
        assert_eq!(HidBytes::signed(-32768).size_code, 0b10);
        assert_eq!(HidBytes::signed(-32769).size_code, 0b11);

        for (raw, header) in [(vec![], 0x08), (vec![1], 0x09), (vec![1, 0], 0x0a), (vec![1, 0, 0, 0], 0x0b)] {
            let item = Item::new(ItemTag::Usage, ItemData::Raw(raw.clone())).unwrap();
            let bytes = item.as_bytes();
            assert_eq!(bytes[0], header);
            assert_eq!(&bytes[1..], raw.as_slice());
            assert_eq!(item.size(), raw.len() + 1);
        }
    }

    #[test]
    fn item_bytes() {
        assert_eq!(Item::logical_minimum(LogicalMinimum(-127)).as_bytes(), [0x15, 0x81]);
        assert_eq!(Item::logical_maximum(LogicalMaximum(127)).as_bytes(), [0x25, 0x7f]);
        assert_eq!(Item::logical_maximum(LogicalMaximum(255)).as_bytes(), [0x26, 0xff, 0x00]);
        assert_eq!(Item::usage_page(UsagePage(0xff00)).as_bytes(), [0x06, 0x00, 0xff]);
        assert_eq!(Item::usage(0xe0).as_bytes(), [0x09, 0xe0]);
        assert_eq!(Item::report_size(ReportSize(0)).as_bytes(), [0x75, 0x00]);
        assert_eq!(Item::input(MainFlags::new().constant().variable()).as_bytes(), [0x81, 0x03]);
        assert_eq!(Item::collection(CollectionType::Application).as_bytes(), [0xa1, 0x01]);
        assert_eq!(Item::end_collection().as_bytes(), [0xc0]);
        assert_eq!(Item::push().as_bytes(), [0xa4]);
        assert_eq!(Item::pop().as_bytes(), [0xb4]);

        let raw = Item::new(ItemTag::Usage, ItemData::Raw(vec![0x30, 0x00])).unwrap();
        assert_eq!(raw.as_bytes(), [0x0a, 0x30, 0x00]);
        assert_eq!(raw.value(), Some(0x30));
        assert!(Item::new(ItemTag::Usage, ItemData::Raw(vec![0; 3])).is_err());
    }

    #[test]
    fn item_validation() {
        assert!(Item::new(ItemTag::ReportSize, ItemData::Value(-1)).is_err());
        assert!(Item::new(ItemTag::ReportCount, ItemData::Value(-4)).is_err());
        assert!(Item::new(ItemTag::ReportId, ItemData::Value(256)).is_err());
        assert!(Item::new(ItemTag::LogicalMaximum, ItemData::Value(i32::MAX as i64 + 1)).is_err());
        assert!(Item::new(ItemTag::Usage, ItemData::Value(u32::MAX as i64)).is_ok());
        assert!(Item::new(ItemTag::Usage, ItemData::Value(-1)).is_err());

        // Push never carries data
        let push = Item::new(ItemTag::Push, ItemData::Value(1)).unwrap();
        assert_eq!(push.data(), &ItemData::None);
    }

    #[test]
    fn main_flags() {
        let flags = MainFlags::from(0x1ff);
        assert!(flags.is_constant());
        assert!(flags.is_variable());
        assert!(flags.is_relative());
        assert!(flags.wraps());
        assert!(flags.is_nonlinear());
        assert!(flags.has_no_preferred_state());
        assert!(flags.has_null_state());
        assert!(flags.is_volatile());
        assert!(flags.is_buffered_bytes());
        assert_eq!(flags.bits(), 0x1ff);

        let flags = MainFlags::new();
        assert!(flags.is_data() && flags.is_array() && flags.is_absolute());

        // Output (Data,Var,Abs,Vol) encodes as signed 0x82 over two bytes
        let item = Item::output(MainFlags::new().variable().volatile());
        assert_eq!(item.as_bytes(), [0x92, 0x82, 0x00]);
        assert_eq!(item.main_flags(), Some(MainFlags::new().variable().volatile()));

        // A one-byte 0x82 decodes as -126 but keeps its bit pattern
        let rdesc = parse(&[0x91, 0x82]).unwrap();
        assert_eq!(rdesc[0].value(), Some(-126));
        let flags = rdesc[0].main_flags().unwrap();
        assert!(flags.is_volatile() && flags.is_variable() && !flags.is_buffered_bytes());

        assert_eq!(Item::usage_page(UsagePage(1)).main_flags(), None);
    }

    #[test]
    fn collection_type() {
        for v in 0..=255u8 {
            assert_eq!(u8::from(CollectionType::from(v)), v);
        }
        assert_eq!(CollectionType::from(0x04).to_string(), "Named Array");
        assert!(matches!(CollectionType::from(0x80), CollectionType::VendorDefined { value: 0x80 }));

        // vendor collection types decode as negative signed values
        let rdesc = parse(&[0xa1, 0x80]).unwrap();
        assert_eq!(rdesc[0].bits(), Some(0x80));
    }

    #[test]
    fn parse_signed_values() {
        let rdesc = parse(&[0x15, 0xff, 0x16, 0xff, 0xff, 0x17, 0xff, 0xff, 0xff, 0xff]).unwrap();
        assert_eq!(rdesc.len(), 3);
        for item in rdesc.iter() {
            assert_eq!(item.value(), Some(-1));
        }

        let rdesc = parse(&[0x05, 0xff, 0x06, 0x00, 0xff]).unwrap();
        assert_eq!(rdesc[0].value(), Some(0xff));
        assert_eq!(rdesc[1].value(), Some(0xff00));
    }

    #[test]
    fn parse_truncated() {
        let err = parse(&[0x05, 0x01, 0x26, 0xff]).unwrap_err();
        match err {
            ParserError::Protocol { offset, message } => {
                assert_eq!(offset, 2);
                assert!(message.contains("[05 01 26 ff]"));
            }
            e => panic!("Unexpected error {e}"),
        }

        // Printable input is shown as text
        let err = parse(b"Traceback!").unwrap_err();
        assert!(err.to_string().contains("\"Traceback!\""));
    }

    #[test]
    fn parse_long_item() {
        let err = parse(&[0x05, 0x01, 0xfe, 0x02, 0x10, 0x00, 0x00]).unwrap_err();
        assert!(matches!(err, ParserError::UnsupportedFeature { offset: 2, .. }));
    }

    #[test]
    fn parse_unknown_tag() {
        let rdesc = parse(&[0xf1, 0x55]).unwrap();
        assert_eq!(rdesc.len(), 1);
        assert_eq!(rdesc[0].tag(), ItemTag::Other(0xf0));
        assert_eq!(rdesc[0].value(), Some(0x55));
    }

    #[test]
    fn parse_invalid_report_id() {
        let err = parse(&[0x86, 0x00, 0x01]).unwrap_err();
        assert!(matches!(err, ParserError::InvalidItem { offset: 0, .. }));
    }

    #[test]
    fn cached_bytes() {
        let mut rdesc = ReportDescriptor::new();
        rdesc.push(Item::usage_page(UsagePage(0x01)));
        assert_eq!(rdesc.bytes(), [0x05, 0x01]);
        rdesc.push(Item::usage(0x02));
        assert_eq!(rdesc.bytes(), [0x05, 0x01, 0x09, 0x02]);
        rdesc.extend([Item::end_collection()]);
        assert_eq!(rdesc.size(), 5);
        assert_eq!(rdesc.hex(), "05010902C0");
        assert_eq!(rdesc.base64(), "BQEJAsA=");
    }

    #[test]
    fn summary() {
        let rdesc = parse(&[0x05, 0x01, 0x09, 0x02, 0xa1, 0x01, 0xc0]).unwrap();
        let summary = rdesc.summary();
        assert_eq!(summary.len(), 4);
        assert_eq!(summary[1].offset, 2);
        assert_eq!(summary[1].tag_name, "Usage");
        assert_eq!(summary[2].tag_code, 0xa0);
        assert_eq!(summary[3].data, None);
    }
}
