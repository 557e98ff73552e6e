// SPDX-License-Identifier: MIT

//! The bit layout of the reports a device sends and receives, as
//! produced by [crate::analyze].
//!
//! The layout is nested:
//! - [DescriptorLayout]: all reports of a device, keyed by [ReportId]
//! - [ReportLayout]: one Report ID with its Input, Output and Feature groups
//! - [ReportLayoutGroup]: the [FieldOp]s of one Report ID and [ReportType]
//! - [FieldOp]: a single value in the report, at a given bit offset
//!
//! Bit offsets are relative to the report payload, i.e. they do not
//! include the Report ID byte.

use crate::report::{FieldValue, FieldValues};
use crate::schema::ReportType;
use crate::types::*;
use crate::usages;
use crate::{ensure, ReportError};

use std::collections::BTreeMap;
use std::sync::OnceLock;

type Result<T> = std::result::Result<T, ReportError>;

/// A single field of a report.
///
/// A FieldOp with a usage ID of 0 is padding. Padding occupies bits in the
/// report but is never decoded, validated or part of a [crate::ReportValues].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FieldOp {
    pub bit_offset: usize,
    pub bit_size: usize,
    pub usage_page: UsagePage,
    pub usage_id: UsageId,
    /// The unique name of this field within the descriptor
    pub name: String,
    pub logical_minimum: LogicalMinimum,
    pub logical_maximum: LogicalMaximum,
    pub physical_minimum: Option<PhysicalMinimum>,
    pub physical_maximum: Option<PhysicalMaximum>,
    pub unit: Option<Unit>,
    pub unit_exponent: Option<UnitExponent>,
    pub is_signed: bool,
    pub is_array: bool,
    pub report_id: ReportId,
    pub report_type: ReportType,
}

impl FieldOp {
    /// The mask covering the value bits of this field, `2^bit_size - 1`.
    pub fn mask(&self) -> u64 {
        match self.bit_size {
            0 => 0,
            n if n >= 64 => u64::MAX,
            n => (1u64 << n) - 1,
        }
    }

    pub fn byte_offset(&self) -> usize {
        self.bit_offset / 8
    }

    pub fn is_padding(&self) -> bool {
        self.usage_id.is_reserved()
    }

    /// One-bit fields on the Button page are represented as [FieldValue::Bool].
    pub fn is_button(&self) -> bool {
        self.usage_page == usages::BUTTON && self.bit_size == 1
    }

    /// True if `value` is within the logical range of this field.
    pub fn validate_value(&self, value: i64) -> bool {
        let minimum = i32::from(self.logical_minimum) as i64;
        let maximum = i32::from(self.logical_maximum) as i64;
        (minimum..=maximum).contains(&value)
    }

    /// The Logical Minimum for signed fields, otherwise zero.
    pub fn default_value(&self) -> FieldValue {
        if self.is_button() {
            FieldValue::Bool(false)
        } else if self.is_signed {
            FieldValue::Int(i32::from(self.logical_minimum) as i64)
        } else {
            FieldValue::Int(0)
        }
    }

    pub fn usage_page_name(&self) -> String {
        usages::page_name(self.usage_page)
    }
}

/// The fields of one report, i.e. one Report ID and one [ReportType].
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ReportLayoutGroup {
    report_id: ReportId,
    report_type: ReportType,
    fields: Vec<FieldOp>,
    #[cfg_attr(feature = "serde", serde(skip))]
    size_bytes: OnceLock<usize>,
}

impl PartialEq for ReportLayoutGroup {
    fn eq(&self, other: &Self) -> bool {
        self.report_id == other.report_id
            && self.report_type == other.report_type
            && self.fields == other.fields
    }
}

impl ReportLayoutGroup {
    pub fn new(report_id: ReportId, report_type: ReportType) -> Self {
        ReportLayoutGroup {
            report_id,
            report_type,
            ..Default::default()
        }
    }

    pub fn report_id(&self) -> ReportId {
        self.report_id
    }

    pub fn report_type(&self) -> ReportType {
        self.report_type
    }

    pub fn fields(&self) -> &[FieldOp] {
        &self.fields
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldOp> {
        self.fields.iter()
    }

    /// The fields that carry a value, i.e. everything but padding.
    pub fn data_fields(&self) -> impl Iterator<Item = &FieldOp> {
        self.fields.iter().filter(|f| !f.is_padding())
    }

    pub fn field(&self, name: &str) -> Option<&FieldOp> {
        self.data_fields().find(|f| f.name == name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Append a field. The field's Report ID and report type are
    /// set to this group's.
    pub fn add_field(&mut self, mut field: FieldOp) {
        field.report_id = self.report_id;
        field.report_type = self.report_type;
        self.fields.push(field);
        self.size_bytes = OnceLock::new();
    }

    /// The payload size in bytes, excluding the Report ID byte. This is the
    /// byte where the last field ends.
    pub fn size_bytes(&self) -> usize {
        *self.size_bytes.get_or_init(|| {
            self.fields
                .iter()
                .map(|f| (f.bit_offset + f.bit_size).div_ceil(8))
                .max()
                .unwrap_or(0)
        })
    }

    /// The default value of every data field, keyed by name.
    pub fn default_values(&self) -> FieldValues {
        self.data_fields()
            .map(|f| (f.name.clone(), f.default_value()))
            .collect()
    }

    /// Check `values` against this group: every data field must be present
    /// (unless `allow_missing`), within its logical range and no other names
    /// may be present (unless `allow_extra`).
    pub fn validate(&self, values: &FieldValues, allow_missing: bool, allow_extra: bool) -> Result<()> {
        for field in self.data_fields() {
            match values.get(&field.name) {
                None => ensure!(
                    allow_missing,
                    ReportError::MissingField {
                        name: field.name.clone(),
                    }
                ),
                Some(value) => {
                    let value = value.as_i64();
                    ensure!(
                        field.validate_value(value),
                        ReportError::OutOfRange {
                            name: field.name.clone(),
                            value,
                            minimum: field.logical_minimum.into(),
                            maximum: field.logical_maximum.into(),
                        }
                    );
                }
            }
        }

        if !allow_extra {
            if let Some(name) = values.keys().find(|name| self.field(name).is_none()) {
                return Err(ReportError::ExtraField { name: name.clone() });
            }
        }

        Ok(())
    }
}

impl<'a> IntoIterator for &'a ReportLayoutGroup {
    type Item = &'a FieldOp;
    type IntoIter = std::slice::Iter<'a, FieldOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

/// The Input, Output and Feature reports of a single Report ID.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ReportLayout {
    report_id: ReportId,
    input: ReportLayoutGroup,
    output: ReportLayoutGroup,
    feature: ReportLayoutGroup,
}

impl ReportLayout {
    pub fn new(report_id: ReportId) -> Self {
        ReportLayout {
            report_id,
            input: ReportLayoutGroup::new(report_id, ReportType::Input),
            output: ReportLayoutGroup::new(report_id, ReportType::Output),
            feature: ReportLayoutGroup::new(report_id, ReportType::Feature),
        }
    }

    /// A layout with the given fields, each field's Report ID is
    /// overwritten with `report_id`.
    pub fn from_fields(report_id: ReportId, fields: impl IntoIterator<Item = FieldOp>) -> Self {
        let mut layout = ReportLayout::new(report_id);
        fields.into_iter().for_each(|f| layout.add_field(f));
        layout
    }

    pub fn report_id(&self) -> ReportId {
        self.report_id
    }

    pub fn group(&self, report_type: ReportType) -> &ReportLayoutGroup {
        match report_type {
            ReportType::Input => &self.input,
            ReportType::Output => &self.output,
            ReportType::Feature => &self.feature,
        }
    }

    fn group_mut(&mut self, report_type: ReportType) -> &mut ReportLayoutGroup {
        match report_type {
            ReportType::Input => &mut self.input,
            ReportType::Output => &mut self.output,
            ReportType::Feature => &mut self.feature,
        }
    }

    pub fn groups(&self) -> impl Iterator<Item = &ReportLayoutGroup> {
        [&self.input, &self.output, &self.feature].into_iter()
    }

    /// Add the field to the group of its report type.
    pub fn add_field(&mut self, field: FieldOp) {
        self.group_mut(field.report_type).add_field(field);
    }

    /// All fields in Input, Output, Feature order.
    pub fn fields(&self) -> impl Iterator<Item = &FieldOp> {
        self.groups().flat_map(|g| g.iter())
    }
}

/// The layout of all reports described by a report descriptor.
///
/// ```
/// # use hidcodec::*;
/// # use hidcodec::types::*;
/// let bytes = [
///     0x05, 0x01, 0x09, 0x02, 0xa1, 0x01, // Generic Desktop, Mouse, Application
///     0x85, 0x05, 0x15, 0x81, 0x25, 0x7f, // Report ID 5, Logical Minimum -127, Maximum 127
///     0x75, 0x08, 0x95, 0x01, 0x09, 0x30, // Report Size 8, Report Count 1, Usage X
///     0x81, 0x06, 0xc0,                   // Input (Data,Var,Rel), End Collection
/// ];
/// let layout = DescriptorLayout::try_from(bytes.as_slice()).unwrap();
/// assert_eq!(layout.list_report_ids(), [ReportId(5)]);
/// assert!(layout.has_multiple_report_ids());
///
/// let fields = layout.get_fields(None, ReportType::Input).unwrap();
/// assert_eq!(fields[0].name, "X");
/// assert!(fields[0].is_signed);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DescriptorLayout {
    reports: BTreeMap<ReportId, ReportLayout>,
}

impl DescriptorLayout {
    pub fn new() -> Self {
        DescriptorLayout::default()
    }

    /// A layout from fields, grouped by each field's Report ID.
    pub fn from_fields(fields: impl IntoIterator<Item = FieldOp>) -> Self {
        let mut layout = DescriptorLayout::new();
        fields.into_iter().for_each(|f| layout.add_field(f));
        layout
    }

    pub fn add_field(&mut self, field: FieldOp) {
        self.reports
            .entry(field.report_id)
            .or_insert_with(|| ReportLayout::new(field.report_id))
            .add_field(field);
    }

    /// Replace the layout for the report's ID.
    pub fn set_report(&mut self, report: ReportLayout) {
        self.reports.insert(report.report_id, report);
    }

    /// All Report IDs in ascending order.
    pub fn list_report_ids(&self) -> Vec<ReportId> {
        self.reports.keys().copied().collect()
    }

    pub fn report(&self, report_id: ReportId) -> Option<&ReportLayout> {
        self.reports.get(&report_id)
    }

    pub fn group(&self, report_id: ReportId, report_type: ReportType) -> Option<&ReportLayoutGroup> {
        self.report(report_id).map(|r| r.group(report_type))
    }

    /// Every group of every report, in Report ID order.
    pub fn groups(&self) -> impl Iterator<Item = &ReportLayoutGroup> {
        self.reports.values().flat_map(|r| r.groups())
    }

    /// True if reports on the wire are prefixed with a Report ID byte.
    ///
    /// This is the case for more than one Report ID or a single
    /// Report ID other than zero.
    pub fn has_multiple_report_ids(&self) -> bool {
        match self.list_report_ids().as_slice() {
            [] => false,
            [id] => *id != ReportId(0),
            _ => true,
        }
    }

    /// Resolve an optional Report ID to the one to use.
    ///
    /// A given Report ID must exist. Without one, the layout must have
    /// at most one Report ID, an empty layout resolves to Report ID 0.
    pub fn resolve_report_id(&self, report_id: Option<ReportId>) -> Result<ReportId> {
        match report_id {
            Some(id) => {
                ensure!(
                    self.reports.contains_key(&id),
                    ReportError::UnknownReportId { id }
                );
                Ok(id)
            }
            None => match self.list_report_ids().as_slice() {
                [] => Ok(ReportId(0)),
                [id] => Ok(*id),
                ids => Err(ReportError::AmbiguousReportId { ids: ids.to_vec() }),
            },
        }
    }

    /// The group for the resolved Report ID, see [Self::resolve_report_id].
    pub fn resolve_group(&self, report_id: Option<ReportId>, report_type: ReportType) -> Result<&ReportLayoutGroup> {
        let id = self.resolve_report_id(report_id)?;
        self.group(id, report_type)
            .ok_or(ReportError::UnknownReportId { id })
    }

    pub fn get_fields(&self, report_id: Option<ReportId>, report_type: ReportType) -> Result<&[FieldOp]> {
        Ok(self.resolve_group(report_id, report_type)?.fields())
    }

    /// The payload size in bytes of the given report, excluding the Report ID byte.
    pub fn size(&self, report_id: Option<ReportId>, report_type: ReportType) -> Result<usize> {
        Ok(self.resolve_group(report_id, report_type)?.size_bytes())
    }

    /// All fields, ordered by Report ID and then Input, Output, Feature.
    pub fn fields(&self) -> impl Iterator<Item = &FieldOp> {
        self.reports.values().flat_map(|r| r.fields())
    }

    /// The total number of fields, including padding.
    pub fn len(&self) -> usize {
        self.fields().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
