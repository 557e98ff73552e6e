// SPDX-License-Identifier: MIT

//! Standalone HID register types that exist for type safety only.
//! These are all simple wrappers around their underlying integer data type.
//!
//! In this document and unless stated otherwise, a reference to "Section a.b.c" refers to the
//! [HID Device Class Definition for HID 1.11](https://www.usb.org/document-library/device-class-definition-hid-111).

/// Creates a `From<Foo> for u32` and `From<u32> for Foo` implementation for the given `Foo` type.
/// Use like this: `impl_from(Foo, Foo, u32)`.
macro_rules! impl_from {
    ($tipo:ty, $tipo_expr:expr, $to:ty) => {
        impl From<$tipo> for $to {
            fn from(f: $tipo) -> $to {
                f.0
            }
        }
        impl From<&$tipo> for $to {
            fn from(f: &$tipo) -> $to {
                f.0
            }
        }
        impl From<$to> for $tipo {
            fn from(f: $to) -> Self {
                $tipo_expr(f)
            }
        }
    };
}

/// Creates a `impl Display for Foo` that just converts into the underlying number.
/// Use like this: `impl_fmt(Foo, u32)`.
macro_rules! impl_fmt {
    ($tipo:ty, $to:ty) => {
        impl std::fmt::Display for $tipo {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                let v: $to = self.into();
                write!(f, "{v}")
            }
        }
    };
}

// ---------- GLOBAL ITEMS ---------------------

/// Section 6.2.2.7, the Usage Page applied to subsequent usages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct UsagePage(pub u16);

impl_from!(UsagePage, UsagePage, u16);
impl_fmt!(UsagePage, u16);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct LogicalMinimum(pub i32);

impl_from!(LogicalMinimum, LogicalMinimum, i32);
impl_fmt!(LogicalMinimum, i32);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct LogicalMaximum(pub i32);

impl_from!(LogicalMaximum, LogicalMaximum, i32);
impl_fmt!(LogicalMaximum, i32);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct PhysicalMinimum(pub i32);

impl_from!(PhysicalMinimum, PhysicalMinimum, i32);
impl_fmt!(PhysicalMinimum, i32);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct PhysicalMaximum(pub i32);

impl_from!(PhysicalMaximum, PhysicalMaximum, i32);
impl_fmt!(PhysicalMaximum, i32);

/// The raw unit code. This crate does not interpret units, the
/// nibble-encoded system and exponents are passed through as-is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Unit(pub i32);

impl_from!(Unit, Unit, i32);
impl_fmt!(Unit, i32);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct UnitExponent(pub i32);

impl_from!(UnitExponent, UnitExponent, i32);
impl_fmt!(UnitExponent, i32);

/// The size of a single report field in bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct ReportSize(pub u32);

impl_from!(ReportSize, ReportSize, u32);
impl_fmt!(ReportSize, u32);

/// Report IDs are a single byte on the wire, Section 6.2.2.7.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct ReportId(pub u8);

impl From<&ReportId> for ReportId {
    fn from(report_id: &ReportId) -> ReportId {
        ReportId(u8::from(report_id))
    }
}

impl_from!(ReportId, ReportId, u8);
impl_fmt!(ReportId, u8);

/// The number of fields of [ReportSize] bits each.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct ReportCount(pub u32);

impl_from!(ReportCount, ReportCount, u32);
impl_fmt!(ReportCount, u32);

// ----------------- LOCAL ITEMS --------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct UsageId(pub u16);

impl_from!(UsageId, UsageId, u16);
impl_fmt!(UsageId, u16);

impl UsageId {
    /// Usage ID 0 is reserved, fields using it are treated as padding.
    pub fn is_reserved(&self) -> bool {
        self.0 == 0
    }
}

/// A Usage Minimum, possibly an extended usage with the
/// Usage Page in the upper 16 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageMinimum(pub u32);

impl_from!(UsageMinimum, UsageMinimum, u32);
impl_fmt!(UsageMinimum, u32);

/// A Usage Maximum, possibly an extended usage with the
/// Usage Page in the upper 16 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageMaximum(pub u32);

impl_from!(UsageMaximum, UsageMaximum, u32);
impl_fmt!(UsageMaximum, u32);

// ----------------- hut conversions --------------------

#[cfg(feature = "hut")]
impl From<&hut::UsagePage> for UsagePage {
    fn from(hut: &hut::UsagePage) -> UsagePage {
        use hut::AsUsagePage;
        UsagePage(hut.usage_page_value())
    }
}

#[cfg(feature = "hut")]
impl From<hut::UsagePage> for UsagePage {
    fn from(hut: hut::UsagePage) -> UsagePage {
        UsagePage::from(&hut)
    }
}

#[cfg(feature = "hut")]
impl From<&hut::Usage> for UsagePage {
    fn from(hut: &hut::Usage) -> UsagePage {
        use hut::AsUsage;
        UsagePage((hut.usage_value() >> 16) as u16)
    }
}

#[cfg(feature = "hut")]
impl From<&hut::Usage> for UsageId {
    fn from(hut: &hut::Usage) -> UsageId {
        use hut::AsUsage;
        UsageId((hut.usage_value() & 0xffff) as u16)
    }
}

#[cfg(feature = "hut")]
impl From<hut::Usage> for UsageId {
    fn from(hut: hut::Usage) -> UsageId {
        UsageId::from(&hut)
    }
}
