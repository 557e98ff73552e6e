// SPDX-License-Identifier: MIT

//! The declarative device description that [crate::compile] turns into a
//! [ReportDescriptor](crate::hid::ReportDescriptor).
//!
//! A schema is a tree of [Node]s: [ReportItem]s are the fields, a
//! [Collection] groups fields into a HID collection and a [ReportGroup]
//! assigns a Report ID to everything below it without emitting a
//! collection of its own.
//!
//! ```
//! # use hidcodec::schema::*;
//! # use hidcodec::usages;
//! let mouse = Collection::new(usages::GENERIC_DESKTOP, 0x02, CollectionType::Application)
//!     .add(ReportItem::buttons(3, 1))
//!     .add(ReportItem::padding(5))
//!     .add(ReportItem::axis(0x30).relative())
//!     .add(ReportItem::axis(0x31).relative());
//! let rdesc = hidcodec::compile(&mouse.into(), false);
//! assert_eq!(rdesc.bytes()[..6], [0x05, 0x01, 0x09, 0x02, 0xa1, 0x01]);
//! ```

use crate::types::*;
use crate::usages;
use crate::ConfigurationError;

pub use crate::hid::CollectionType;

/// The kind of report a field belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ReportType {
    #[default]
    Input,
    Output,
    Feature,
}

impl std::str::FromStr for ReportType {
    type Err = ConfigurationError;

    /// Parses `"input"`, `"output"` or `"feature"`, case-insensitive.
    fn from_str(s: &str) -> Result<ReportType, ConfigurationError> {
        match s.to_ascii_lowercase().as_str() {
            "input" => Ok(ReportType::Input),
            "output" => Ok(ReportType::Output),
            "feature" => Ok(ReportType::Feature),
            _ => Err(ConfigurationError::UnknownReportType { name: s.into() }),
        }
    }
}

impl std::fmt::Display for ReportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportType::Input => write!(f, "input"),
            ReportType::Output => write!(f, "output"),
            ReportType::Feature => write!(f, "feature"),
        }
    }
}

/// A field in the schema, compiled into the global and local items
/// describing it followed by an Input, Output or Feature item.
///
/// Usages are the raw usage values: a value above 0xFFFF is an
/// extended usage carrying its own Usage Page in the upper 16 bits.
/// An empty usage list declares a field without usages, typically padding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportItem {
    pub usage_page: UsagePage,
    pub usages: Vec<u32>,
    pub size: ReportSize,
    pub count: ReportCount,
    pub logical_minimum: LogicalMinimum,
    pub logical_maximum: LogicalMaximum,
    pub physical_minimum: Option<PhysicalMinimum>,
    pub physical_maximum: Option<PhysicalMaximum>,
    pub unit: Option<Unit>,
    pub unit_exponent: Option<UnitExponent>,
    pub report_type: ReportType,
    pub is_relative: bool,
    pub is_constant: bool,
    pub is_variable: bool,
}

impl ReportItem {
    /// A variable, absolute Input field with a logical range of 0 to 1.
    pub fn new(
        usage_page: UsagePage,
        usages: impl IntoIterator<Item = u32>,
        size: u32,
        count: u32,
    ) -> ReportItem {
        ReportItem {
            usage_page,
            usages: usages.into_iter().collect(),
            size: ReportSize(size),
            count: ReportCount(count),
            logical_minimum: LogicalMinimum(0),
            logical_maximum: LogicalMaximum(1),
            physical_minimum: None,
            physical_maximum: None,
            unit: None,
            unit_exponent: None,
            report_type: ReportType::Input,
            is_relative: false,
            is_constant: false,
            is_variable: true,
        }
    }

    /// A single-usage field built from a usage of the `hut` crate.
    #[cfg(feature = "hut")]
    pub fn from_usage(usage: impl hut::AsUsage, size: u32, count: u32) -> ReportItem {
        let usage = usage.usage();
        let usage_id = UsageId::from(&usage);
        ReportItem::new(UsagePage::from(&usage), [u16::from(usage_id) as u32], size, count)
    }

    pub fn logical_range(mut self, minimum: i32, maximum: i32) -> Self {
        self.logical_minimum = LogicalMinimum(minimum);
        self.logical_maximum = LogicalMaximum(maximum);
        self
    }

    pub fn physical_range(mut self, minimum: i32, maximum: i32) -> Self {
        self.physical_minimum = Some(PhysicalMinimum(minimum));
        self.physical_maximum = Some(PhysicalMaximum(maximum));
        self
    }

    pub fn unit(mut self, unit: i32, exponent: i32) -> Self {
        self.unit = Some(Unit(unit));
        self.unit_exponent = Some(UnitExponent(exponent));
        self
    }

    pub fn report_type(mut self, report_type: ReportType) -> Self {
        self.report_type = report_type;
        self
    }

    pub fn constant(mut self) -> Self {
        self.is_constant = true;
        self
    }

    pub fn relative(mut self) -> Self {
        self.is_relative = true;
        self
    }

    /// Turn this field into an array: each element holds an index
    /// into the usages instead of a value.
    pub fn array(mut self) -> Self {
        self.is_variable = false;
        self
    }

    pub fn is_array(&self) -> bool {
        !self.is_variable
    }

    /// The number of bits this field occupies in its report.
    pub fn bits(&self) -> usize {
        u32::from(self.size) as usize * u32::from(self.count) as usize
    }

    /// A Generic Desktop axis such as X (0x30) or Wheel (0x38),
    /// 8 bits with a range of -127 to 127.
    pub fn axis(usage: u32) -> ReportItem {
        ReportItem::new(usages::GENERIC_DESKTOP, [usage], 8, 1).logical_range(-127, 127)
    }

    /// `count` one-bit buttons numbered from `first`.
    pub fn buttons(count: u32, first: u32) -> ReportItem {
        ReportItem::new(usages::BUTTON, first..first + count, 1, count)
    }

    /// Constant bits without usage to align the following fields.
    pub fn padding(bits: u32) -> ReportItem {
        ReportItem::new(UsagePage(0), Vec::new(), bits, 1)
            .logical_range(0, 0)
            .constant()
    }

    /// A Hat Switch with eight directions in 45 degree steps.
    pub fn dpad() -> ReportItem {
        let mut item = ReportItem::new(usages::GENERIC_DESKTOP, [0x39], 4, 1)
            .logical_range(0, 7)
            .physical_range(0, 315);
        // English Rotation, degrees
        item.unit = Some(Unit(0x14));
        item
    }

    /// The key array of a boot protocol keyboard, one byte per key slot.
    pub fn keyboard_keys(count: u32) -> ReportItem {
        ReportItem::new(usages::KEYBOARD, 0..=101, 8, count)
            .logical_range(0, 101)
            .array()
    }

    /// Num Lock, Caps Lock, Scroll Lock, Compose and Kana as Output bits.
    pub fn leds() -> ReportItem {
        ReportItem::new(usages::LED, 0x01..=0x05, 1, 5).report_type(ReportType::Output)
    }

    /// A bitmask of Consumer media keys.
    pub fn media_keys(volume: bool, playback: bool) -> ReportItem {
        let mut media: Vec<u32> = vec![];
        if playback {
            // Scan Next Track, Scan Previous Track, Stop
            media.extend([0xb5, 0xb6, 0xb7]);
        }
        if volume {
            // Mute, Volume Increment, Volume Decrement
            media.extend([0xe2, 0xe9, 0xea]);
        }
        let count = media.len() as u32;
        ReportItem::new(usages::CONSUMER, media, 1, count)
    }
}

/// A HID collection, compiled into Usage Page, Usage and Collection items,
/// followed by its children and an End Collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection {
    pub usage_page: UsagePage,
    pub usage: u32,
    pub collection_type: CollectionType,
    pub children: Vec<Node>,
}

impl Collection {
    pub fn new(usage_page: UsagePage, usage: u32, collection_type: CollectionType) -> Self {
        Collection {
            usage_page,
            usage,
            collection_type,
            children: vec![],
        }
    }

    #[cfg(feature = "hut")]
    pub fn from_usage(usage: impl hut::AsUsage, collection_type: CollectionType) -> Self {
        let usage = usage.usage();
        let usage_id = UsageId::from(&usage);
        Collection::new(UsagePage::from(&usage), u16::from(usage_id) as u32, collection_type)
    }

    pub fn add(mut self, node: impl Into<Node>) -> Self {
        self.children.push(node.into());
        self
    }

    pub fn push(&mut self, node: impl Into<Node>) {
        self.children.push(node.into());
    }
}

/// Assigns a Report ID to all its children. This is a scope only,
/// no collection items are emitted for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportGroup {
    pub id: ReportId,
    pub children: Vec<Node>,
}

impl ReportGroup {
    pub fn new(id: ReportId) -> Self {
        ReportGroup {
            id,
            children: vec![],
        }
    }

    pub fn add(mut self, node: impl Into<Node>) -> Self {
        self.children.push(node.into());
        self
    }

    pub fn push(&mut self, node: impl Into<Node>) {
        self.children.push(node.into());
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Item(ReportItem),
    Collection(Collection),
    ReportGroup(ReportGroup),
}

impl From<ReportItem> for Node {
    fn from(item: ReportItem) -> Node {
        Node::Item(item)
    }
}

impl From<Collection> for Node {
    fn from(collection: Collection) -> Node {
        Node::Collection(collection)
    }
}

impl From<ReportGroup> for Node {
    fn from(group: ReportGroup) -> Node {
        Node::ReportGroup(group)
    }
}
