// SPDX-License-Identifier: MIT

//! Converts between report bytes and named field values.
//!
//! A report on the wire is an optional Report ID byte followed by the
//! payload. The Report ID byte is present if the layout has more than one
//! Report ID or a single Report ID other than zero, see
//! [DescriptorLayout::has_multiple_report_ids].
//!
//! Fields are packed LSB first into the payload, a field's bit offset
//! counts from bit 0 of the first payload byte.

use crate::layout::{DescriptorLayout, FieldOp};
use crate::report::{FieldValue, FieldValues, ReportValues};
use crate::schema::ReportType;
use crate::types::ReportId;
use crate::{ensure, ReportError};

use bitvec::{field::BitField, order::Lsb0, view::BitView};

type Result<T> = std::result::Result<T, ReportError>;

/// Widest field this codec can represent as [FieldValue]. Unsigned fields
/// lose one bit to the sign of the `i64` value.
const MAX_FIELD_BITS: usize = 64;

fn check_field_size(field: &FieldOp) -> Result<()> {
    let maximum = if field.is_signed { MAX_FIELD_BITS } else { MAX_FIELD_BITS - 1 };
    ensure!(
        field.bit_size <= maximum,
        ReportError::UnsupportedFieldSize {
            name: field.name.clone(),
            bits: field.bit_size,
        }
    );
    Ok(())
}

/// Encoder and decoder for the reports of one [DescriptorLayout].
///
/// ```
/// # use hidcodec::*;
/// # use hidcodec::types::*;
/// let bytes = [
///     0x85, 0x01, 0x05, 0x01, 0x09, 0x30, 0x15, 0x81, 0x25, 0x7f, // Report ID 1, X, -127..127
///     0x75, 0x08, 0x95, 0x01, 0x81, 0x06,                         // 8 bit Input
///     0x85, 0x02, 0x09, 0x31, 0x81, 0x06,                         // Report ID 2, Y
/// ];
/// let layout = DescriptorLayout::try_from(bytes.as_slice()).unwrap();
/// let codec = ReportCodec::new(&layout);
///
/// let report = codec.decode(&[0x02, 0xf6], ReportType::Input, true).unwrap();
/// assert_eq!(report.report_id(), ReportId(2));
/// assert_eq!(report["Y"], FieldValue::Int(-10));
///
/// let values = FieldValues::from([("X".to_string(), FieldValue::Int(5))]);
/// let bytes = codec.encode(&values, Some(ReportId(1)), ReportType::Input, true).unwrap();
/// assert_eq!(bytes, [0x01, 0x05]);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ReportCodec<'a> {
    layout: &'a DescriptorLayout,
}

impl<'a> ReportCodec<'a> {
    pub fn new(layout: &'a DescriptorLayout) -> Self {
        ReportCodec { layout }
    }

    pub fn layout(&self) -> &'a DescriptorLayout {
        self.layout
    }

    /// A report with default values for the resolved Report ID,
    /// see [DescriptorLayout::resolve_report_id].
    pub fn create_report(&self, report_id: Option<ReportId>, report_type: ReportType) -> Result<ReportValues<'a>> {
        let group = self.layout.resolve_group(report_id, report_type)?;
        Ok(ReportValues::new(group))
    }

    /// Split off the Report ID byte if the layout uses Report IDs.
    fn split_report_id<'b>(&self, data: &'b [u8]) -> Result<(Option<ReportId>, &'b [u8])> {
        if !self.layout.has_multiple_report_ids() {
            return Ok((None, data));
        }
        match data {
            [id, payload @ ..] => Ok((Some(ReportId(*id)), payload)),
            [] => Err(ReportError::MissingReportId),
        }
    }

    /// Decode a report, including the Report ID byte if the layout
    /// uses Report IDs.
    ///
    /// With `check_size`, the payload must be exactly as long as the
    /// report. Otherwise a short payload is zero-extended and excess
    /// bytes are ignored. Padding is never decoded.
    pub fn decode(&self, data: &[u8], report_type: ReportType, check_size: bool) -> Result<ReportValues<'a>> {
        let (report_id, payload) = self.split_report_id(data)?;
        let group = self.layout.resolve_group(report_id, report_type)?;

        let expected = group.size_bytes();
        if check_size {
            ensure!(
                payload.len() == expected,
                ReportError::InvalidSize {
                    expected,
                    actual: payload.len(),
                }
            );
        }

        let mut buffer = payload.to_vec();
        if buffer.len() < expected {
            buffer.resize(expected, 0);
        }
        let bits = buffer.view_bits::<Lsb0>();

        let mut report = ReportValues::new(group);
        for field in group.data_fields() {
            check_field_size(field)?;
            let raw: u64 = match field.bit_size {
                0 => 0,
                n => bits[field.bit_offset..field.bit_offset + n].load_le(),
            };
            report.set(&field.name, extract_value(field, raw))?;
        }
        Ok(report)
    }

    /// Encode values into a report for the resolved Report ID, including
    /// the Report ID byte if the layout uses Report IDs.
    ///
    /// With `validate`, all fields must be present, within their logical
    /// range and no unknown names are allowed. Otherwise missing fields
    /// are encoded as zero and unknown names are ignored.
    ///
    /// Negative values are encoded in two's complement. A value that does
    /// not fit into the field's bits fails regardless of `validate`.
    pub fn encode(
        &self,
        values: &FieldValues,
        report_id: Option<ReportId>,
        report_type: ReportType,
        validate: bool,
    ) -> Result<Vec<u8>> {
        let group = self.layout.resolve_group(report_id, report_type)?;
        if validate {
            group.validate(values, false, false)?;
        }

        let mut payload = vec![0u8; group.size_bytes()];
        let bits = payload.view_bits_mut::<Lsb0>();
        for field in group.data_fields() {
            check_field_size(field)?;
            let value = values.get(&field.name).map(|v| v.as_i64()).unwrap_or(0);
            let raw = pack_value(field, value)?;
            if field.bit_size > 0 {
                bits[field.bit_offset..field.bit_offset + field.bit_size].store_le(raw);
            }
        }

        if self.layout.has_multiple_report_ids() {
            let id = u8::from(group.report_id());
            Ok([vec![id], payload].concat())
        } else {
            Ok(payload)
        }
    }
}

/// Sign-extend and convert the raw bits of a field.
fn extract_value(field: &FieldOp, raw: u64) -> FieldValue {
    let size = field.bit_size;
    let value = if field.is_signed && size > 0 && size < 64 && raw & (1 << (size - 1)) != 0 {
        raw as i64 - (1i64 << size)
    } else {
        raw as i64
    };

    if field.is_button() {
        FieldValue::Bool(value != 0)
    } else {
        FieldValue::Int(value)
    }
}

/// The bits of `value` for this field. Negative values are taken as
/// their `2^bit_size` complement, the result must fit into the field.
fn pack_value(field: &FieldOp, value: i64) -> Result<u64> {
    let size = field.bit_size;
    let raw: i128 = if value < 0 {
        (1i128 << size) + value as i128
    } else {
        value as i128
    };
    ensure!(
        (0..=field.mask() as i128).contains(&raw),
        ReportError::Overflow {
            name: field.name.clone(),
            value,
            bits: size,
        }
    );
    Ok(raw as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::*;
    use crate::usages;

    fn field(name: &str, bit_offset: usize, bit_size: usize, report_id: ReportId) -> FieldOp {
        FieldOp {
            bit_offset,
            bit_size,
            usage_page: usages::GENERIC_DESKTOP,
            usage_id: UsageId(0x30),
            name: name.into(),
            logical_minimum: LogicalMinimum(-127),
            logical_maximum: LogicalMaximum(127),
            physical_minimum: None,
            physical_maximum: None,
            unit: None,
            unit_exponent: None,
            is_signed: true,
            is_array: false,
            report_id,
            report_type: ReportType::Input,
        }
    }

    fn mouse(report_id: ReportId) -> DescriptorLayout {
        let button = |n: u16| FieldOp {
            usage_page: usages::BUTTON,
            usage_id: UsageId(n),
            logical_minimum: LogicalMinimum(0),
            logical_maximum: LogicalMaximum(1),
            is_signed: false,
            ..field(&format!("Button_{n}"), n as usize - 1, 1, report_id)
        };
        let padding = FieldOp {
            usage_page: UsagePage(0),
            usage_id: UsageId(0),
            ..field(usages::PADDING_NAME, 2, 6, report_id)
        };
        DescriptorLayout::from_fields([
            button(1),
            button(2),
            padding,
            field("X", 8, 8, report_id),
        ])
    }

    fn values(entries: &[(&str, FieldValue)]) -> FieldValues {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn encode_mouse() {
        let layout = mouse(ReportId(0));
        let codec = ReportCodec::new(&layout);
        let data = values(&[
            ("Button_1", true.into()),
            ("Button_2", true.into()),
            ("X", (-10).into()),
        ]);
        let bytes = codec.encode(&data, None, ReportType::Input, false).unwrap();
        assert_eq!(bytes, [0x03, 0xf6]);

        let bytes = codec.encode(&data, None, ReportType::Input, true).unwrap();
        assert_eq!(bytes, [0x03, 0xf6]);
    }

    #[test]
    fn decode_mouse() {
        let layout = mouse(ReportId(0));
        let codec = ReportCodec::new(&layout);
        let report = codec.decode(&[0x01, 0x81], ReportType::Input, true).unwrap();
        assert_eq!(report["Button_1"], FieldValue::Bool(true));
        assert_eq!(report["Button_2"], FieldValue::Bool(false));
        assert_eq!(report["X"], FieldValue::Int(-127));
        assert_eq!(report.len(), 3);
    }

    #[test]
    fn roundtrip_extremes() {
        let layout = mouse(ReportId(0));
        let codec = ReportCodec::new(&layout);
        for x in [-127, -1, 0, 1, 127] {
            let data = values(&[
                ("Button_1", false.into()),
                ("Button_2", true.into()),
                ("X", x.into()),
            ]);
            let bytes = codec.encode(&data, None, ReportType::Input, true).unwrap();
            let report = codec.decode(&bytes, ReportType::Input, true).unwrap();
            assert_eq!(report.values(), &data);
        }
    }

    #[test]
    fn report_id_prefix() {
        let layout = mouse(ReportId(3));
        let codec = ReportCodec::new(&layout);
        let data = values(&[("X", 1.into())]);
        let bytes = codec.encode(&data, None, ReportType::Input, false).unwrap();
        assert_eq!(bytes, [0x03, 0x00, 0x01]);

        let report = codec.decode(&bytes, ReportType::Input, true).unwrap();
        assert_eq!(report.report_id(), ReportId(3));
        assert_eq!(report["X"], FieldValue::Int(1));

        assert!(matches!(
            codec.decode(&[], ReportType::Input, true),
            Err(ReportError::MissingReportId)
        ));
        assert!(matches!(
            codec.decode(&[0x04, 0x00, 0x00], ReportType::Input, true),
            Err(ReportError::UnknownReportId { id: ReportId(4) })
        ));
    }

    #[test]
    fn ambiguous_report_id() {
        let layout = DescriptorLayout::from_fields([
            field("X", 0, 8, ReportId(5)),
            field("Y", 0, 8, ReportId(6)),
        ]);
        let codec = ReportCodec::new(&layout);
        let err = codec.encode(&FieldValues::new(), None, ReportType::Input, false).unwrap_err();
        assert!(matches!(err, ReportError::AmbiguousReportId { ref ids } if ids == &[ReportId(5), ReportId(6)]));
        assert!(codec.create_report(None, ReportType::Input).is_err());
        assert!(codec.create_report(Some(ReportId(6)), ReportType::Input).is_ok());
    }

    #[test]
    fn payload_size() {
        let layout = mouse(ReportId(0));
        let codec = ReportCodec::new(&layout);
        assert!(matches!(
            codec.decode(&[0x01], ReportType::Input, true),
            Err(ReportError::InvalidSize { expected: 2, actual: 1 })
        ));
        assert!(matches!(
            codec.decode(&[0x01, 0x02, 0x03], ReportType::Input, true),
            Err(ReportError::InvalidSize { expected: 2, actual: 3 })
        ));

        // short payloads are zero-extended
        let report = codec.decode(&[0x02], ReportType::Input, false).unwrap();
        assert_eq!(report["Button_2"], FieldValue::Bool(true));
        assert_eq!(report["X"], FieldValue::Int(0));
    }

    #[test]
    fn encode_validation() {
        let layout = mouse(ReportId(0));
        let codec = ReportCodec::new(&layout);

        let data = values(&[("X", 1.into())]);
        assert!(matches!(
            codec.encode(&data, None, ReportType::Input, true),
            Err(ReportError::MissingField { .. })
        ));
        // missing fields are zero without validation
        assert_eq!(codec.encode(&data, None, ReportType::Input, false).unwrap(), [0x00, 0x01]);

        let data = values(&[("X", 128.into())]);
        assert!(matches!(
            codec.encode(&data, None, ReportType::Input, true),
            Err(ReportError::MissingField { .. } | ReportError::OutOfRange { .. })
        ));
        // 128 fits into 8 bits even though it is out of the logical range
        assert_eq!(codec.encode(&data, None, ReportType::Input, false).unwrap(), [0x00, 0x80]);

        let data = values(&[("X", 256.into())]);
        assert!(matches!(
            codec.encode(&data, None, ReportType::Input, false),
            Err(ReportError::Overflow { value: 256, bits: 8, .. })
        ));
        let data = values(&[("X", (-257).into())]);
        assert!(matches!(
            codec.encode(&data, None, ReportType::Input, false),
            Err(ReportError::Overflow { value: -257, .. })
        ));

        let data = values(&[("Unknown", 1.into())]);
        assert!(codec.encode(&data, None, ReportType::Input, false).is_ok());
    }

    #[test]
    fn negative_values_wrap() {
        let layout = mouse(ReportId(0));
        let codec = ReportCodec::new(&layout);

        // 2^8 - 200
        let data = values(&[("X", (-200).into())]);
        assert_eq!(codec.encode(&data, None, ReportType::Input, false).unwrap(), [0x00, 56]);
        assert!(matches!(
            codec.encode(&data, None, ReportType::Input, true),
            Err(ReportError::MissingField { .. } | ReportError::OutOfRange { .. })
        ));

        let data = values(&[("X", (-256).into())]);
        assert_eq!(codec.encode(&data, None, ReportType::Input, false).unwrap(), [0x00, 0x00]);

        // a negative value for a one-bit button sets the bit
        let data = values(&[("Button_1", (-1).into())]);
        assert_eq!(codec.encode(&data, None, ReportType::Input, false).unwrap(), [0x01, 0x00]);
        let data = values(&[("Button_1", (-3).into())]);
        assert!(matches!(
            codec.encode(&data, None, ReportType::Input, false),
            Err(ReportError::Overflow { bits: 1, .. })
        ));
    }

    #[test]
    fn unaligned_fields() {
        let layout = DescriptorLayout::from_fields([
            field("A", 0, 3, ReportId(0)),
            field("B", 3, 12, ReportId(0)),
            field("C", 15, 1, ReportId(0)),
        ]);
        let codec = ReportCodec::new(&layout);
        let data = values(&[("A", (-1).into()), ("B", 0x7f.into()), ("C", 0.into())]);
        let bytes = codec.encode(&data, None, ReportType::Input, false).unwrap();
        // A = 0b111, B = 0x07f << 3
        assert_eq!(bytes, [0xff, 0x03]);
        let report = codec.decode(&bytes, ReportType::Input, true).unwrap();
        assert_eq!(report["A"], FieldValue::Int(-1));
        assert_eq!(report["B"], FieldValue::Int(0x7f));
    }

    #[test]
    fn wide_fields() {
        let layout = DescriptorLayout::from_fields([
            field("Wide", 0, 64, ReportId(0)),
            field("Huge", 64, 72, ReportId(0)),
        ]);
        let codec = ReportCodec::new(&layout);
        assert!(matches!(
            codec.decode(&[0u8; 17], ReportType::Input, true),
            Err(ReportError::UnsupportedFieldSize { bits: 72, .. })
        ));

        // unsigned 64 bit values do not fit an i64
        let layout = DescriptorLayout::from_fields([{
            let mut f = field("Wide", 0, 64, ReportId(0));
            f.is_signed = false;
            f
        }]);
        let codec = ReportCodec::new(&layout);
        assert!(matches!(
            codec.decode(&[0xff; 8], ReportType::Input, true),
            Err(ReportError::UnsupportedFieldSize { bits: 64, .. })
        ));
        let data = values(&[("Wide", 1.into())]);
        assert!(codec.encode(&data, None, ReportType::Input, false).is_err());

        let layout = DescriptorLayout::from_fields([
            field("Signed", 0, 64, ReportId(0)),
            {
                let mut f = field("Unsigned", 64, 63, ReportId(0));
                f.is_signed = false;
                f
            },
        ]);
        let codec = ReportCodec::new(&layout);
        let data = values(&[("Signed", (-1).into()), ("Unsigned", i64::MAX.into())]);
        let bytes = codec.encode(&data, None, ReportType::Input, false).unwrap();
        assert_eq!(bytes, [[0xff; 8], [0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x7f]].concat());
        let report = codec.decode(&bytes, ReportType::Input, true).unwrap();
        assert_eq!(report["Signed"], FieldValue::Int(-1));
        assert_eq!(report["Unsigned"], FieldValue::Int(i64::MAX));
    }
}
