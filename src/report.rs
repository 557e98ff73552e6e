// SPDX-License-Identifier: MIT

//! Named field values of a single report.
//!
//! A [ReportValues] is bound to the [ReportLayoutGroup] it was created for and
//! holds one [FieldValue] for every data field of that group. Padding is not
//! part of the values.

use crate::codec::ReportCodec;
use crate::layout::ReportLayoutGroup;
use crate::schema::ReportType;
use crate::types::ReportId;
use crate::ReportError;

use std::collections::BTreeMap;

type Result<T> = std::result::Result<T, ReportError>;

/// The value of a single field. One-bit fields on the Button page
/// decode as [FieldValue::Bool], everything else as [FieldValue::Int].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
}

impl FieldValue {
    /// The numeric value, `true` is 1.
    pub fn as_i64(&self) -> i64 {
        match self {
            FieldValue::Bool(b) => *b as i64,
            FieldValue::Int(v) => *v,
        }
    }

    pub fn as_bool(&self) -> bool {
        self.as_i64() != 0
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> FieldValue {
        FieldValue::Bool(b)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> FieldValue {
        FieldValue::Int(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> FieldValue {
        FieldValue::Int(v as i64)
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Bool(b) => write!(f, "{b}"),
            FieldValue::Int(v) => write!(f, "{v}"),
        }
    }
}

/// Field values keyed by field name.
pub type FieldValues = BTreeMap<String, FieldValue>;

/// The values of one report, bound to its layout.
///
/// The layout is borrowed, the values are owned. Cloning a [ReportValues]
/// copies the values and shares the layout.
///
/// ```
/// # use hidcodec::*;
/// let bytes = [
///     0x05, 0x09, 0x19, 0x01, 0x29, 0x02, 0x15, 0x00, 0x25, 0x01, // Buttons 1-2, 0..1
///     0x75, 0x01, 0x95, 0x02, 0x81, 0x02,                         // 2x1 bit Input
///     0x75, 0x06, 0x95, 0x01, 0x81, 0x03,                         // 6 bit padding
/// ];
/// let layout = DescriptorLayout::try_from(bytes.as_slice()).unwrap();
/// let codec = ReportCodec::new(&layout);
///
/// let mut report = codec.create_report(None, ReportType::Input).unwrap();
/// assert_eq!(report["Button_1"], FieldValue::Bool(false));
/// report.set("Button_2", true).unwrap();
/// assert_eq!(report.encode(&codec).unwrap(), [0x02]);
///
/// let pressed = codec.decode(&[0x03], ReportType::Input, true).unwrap();
/// assert_eq!(report.delta(&pressed).unwrap().get("Button_1"), Some(&1));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ReportValues<'a> {
    layout: &'a ReportLayoutGroup,
    values: FieldValues,
}

impl<'a> ReportValues<'a> {
    /// Values initialized to each field's default.
    pub fn new(layout: &'a ReportLayoutGroup) -> Self {
        ReportValues {
            layout,
            values: layout.default_values(),
        }
    }

    /// Defaults, overwritten with the given values. Names not in the layout
    /// are taken as-is and caught by [Self::validate].
    pub fn with_values(layout: &'a ReportLayoutGroup, values: FieldValues) -> Self {
        let mut report = ReportValues::new(layout);
        report.values.extend(values);
        report
    }

    pub fn layout(&self) -> &'a ReportLayoutGroup {
        self.layout
    }

    pub fn report_id(&self) -> ReportId {
        self.layout.report_id()
    }

    pub fn report_type(&self) -> ReportType {
        self.layout.report_type()
    }

    pub fn get(&self, name: &str) -> Option<FieldValue> {
        self.values.get(name).copied()
    }

    /// Set the value of a field. Fails for names that are not a field
    /// of this report, the value itself is only checked by [Self::validate].
    pub fn set(&mut self, name: &str, value: impl Into<FieldValue>) -> Result<()> {
        match self.values.get_mut(name) {
            Some(v) => {
                *v = value.into();
                Ok(())
            }
            None => Err(ReportError::UnknownField { name: name.into() }),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, FieldValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn values(&self) -> &FieldValues {
        &self.values
    }

    pub fn into_values(self) -> FieldValues {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Check all values are present and within their logical range.
    pub fn validate(&self) -> Result<()> {
        self.layout.validate(&self.values, false, false)
    }

    /// Validate and encode these values into a report, including
    /// the Report ID byte if the codec's layout requires one.
    pub fn encode(&self, codec: &ReportCodec) -> Result<Vec<u8>> {
        self.validate()?;
        codec.encode(&self.values, Some(self.report_id()), self.report_type(), false)
    }

    /// The difference `other - self` of every field that changed.
    /// The result is widened to `i128`, the difference of two 64 bit
    /// values needs 65 bits.
    ///
    /// Both reports must have the same Report ID and report type.
    pub fn delta(&self, other: &ReportValues) -> Result<BTreeMap<String, i128>> {
        if self.report_id() != other.report_id() || self.report_type() != other.report_type() {
            return Err(ReportError::ReportMismatch {
                expected: (self.report_id(), self.report_type()),
                actual: (other.report_id(), other.report_type()),
            });
        }

        let deltas = self
            .values
            .iter()
            .filter_map(|(name, value)| {
                let other = other.values.get(name)?;
                let delta = other.as_i64() as i128 - value.as_i64() as i128;
                (delta != 0).then(|| (name.clone(), delta))
            })
            .collect();
        Ok(deltas)
    }
}

impl std::ops::Index<&str> for ReportValues<'_> {
    type Output = FieldValue;

    /// # Panics
    ///
    /// If `name` is not a field of this report.
    fn index(&self, name: &str) -> &FieldValue {
        &self.values[name]
    }
}
