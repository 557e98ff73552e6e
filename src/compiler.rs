// SPDX-License-Identifier: MIT

//! Compiles a [schema](crate::schema) tree into a [ReportDescriptor].
//!
//! The compiler tracks the HID global registers it has emitted so far and
//! only emits a global item when the value changes. Contiguous usages are
//! compressed into a Usage Minimum/Maximum pair.

use crate::hid::{Item, MainFlags, ReportDescriptor};
use crate::schema::{Collection, Node, ReportGroup, ReportItem, ReportType};
use crate::types::*;

/// The global registers as last emitted into the descriptor.
#[derive(Debug, Default)]
struct CompilerState {
    usage_page: Option<UsagePage>,
    logical_minimum: Option<LogicalMinimum>,
    logical_maximum: Option<LogicalMaximum>,
    physical_minimum: Option<PhysicalMinimum>,
    physical_maximum: Option<PhysicalMaximum>,
    unit_exponent: Option<UnitExponent>,
    unit: Option<Unit>,
    report_size: Option<ReportSize>,
    report_count: Option<ReportCount>,
    report_id: ReportId,
    /// Running bit count over all fields, for auto-padding
    bit_cursor: usize,
}

/// Emit `$item` if `$value` differs from the tracked register `$which`.
macro_rules! emit_if_changed {
    ($self:ident, $which:ident, $value:expr, $item:expr) => {
        let value = $value;
        if $self.state.$which != Some(value) {
            $self.rdesc.push(($item)(value));
            $self.state.$which = Some(value);
        }
    };
}

struct Compiler {
    state: CompilerState,
    rdesc: ReportDescriptor,
}

impl Compiler {
    fn new() -> Self {
        Compiler {
            state: CompilerState::default(),
            rdesc: ReportDescriptor::new(),
        }
    }

    fn visit(&mut self, node: &Node) {
        match node {
            Node::Item(item) => self.emit_item(item),
            Node::Collection(collection) => self.emit_collection(collection),
            Node::ReportGroup(group) => self.emit_report_group(group),
        }
    }

    fn emit_report_group(&mut self, group: &ReportGroup) {
        if group.id != self.state.report_id {
            self.rdesc.push(Item::report_id(group.id));
            self.state.report_id = group.id;
        }
        group.children.iter().for_each(|child| self.visit(child));
    }

    fn emit_collection(&mut self, collection: &Collection) {
        emit_if_changed!(self, usage_page, collection.usage_page, Item::usage_page);
        self.rdesc.push(Item::usage(collection.usage));
        self.rdesc.push(Item::collection(collection.collection_type));
        collection.children.iter().for_each(|child| self.visit(child));
        self.rdesc.push(Item::end_collection());
    }

    fn emit_usages(&mut self, usages: &[u32]) {
        match usages {
            [] => {}
            [usage] => self.rdesc.push(Item::usage(*usage)),
            _ => {
                let mut sorted = usages.to_vec();
                sorted.sort_unstable();
                let is_contiguous = sorted.windows(2).all(|w| w[1] == w[0] + 1);
                if is_contiguous {
                    let (first, last) = (sorted[0], sorted[sorted.len() - 1]);
                    self.rdesc.push(Item::usage_minimum(UsageMinimum(first)));
                    self.rdesc.push(Item::usage_maximum(UsageMaximum(last)));
                } else {
                    self.rdesc.extend(usages.iter().map(|u| Item::usage(*u)));
                }
            }
        }
    }

    fn emit_item(&mut self, item: &ReportItem) {
        // Fields without usages don't need a Usage Page
        if !item.usages.is_empty() {
            emit_if_changed!(self, usage_page, item.usage_page, Item::usage_page);
        }
        emit_if_changed!(self, logical_minimum, item.logical_minimum, Item::logical_minimum);
        emit_if_changed!(self, logical_maximum, item.logical_maximum, Item::logical_maximum);
        if let Some(minimum) = item.physical_minimum {
            emit_if_changed!(self, physical_minimum, minimum, Item::physical_minimum);
        }
        if let Some(maximum) = item.physical_maximum {
            emit_if_changed!(self, physical_maximum, maximum, Item::physical_maximum);
        }
        if let Some(exponent) = item.unit_exponent {
            emit_if_changed!(self, unit_exponent, exponent, Item::unit_exponent);
        }
        if let Some(unit) = item.unit {
            emit_if_changed!(self, unit, unit, Item::unit);
        }
        emit_if_changed!(self, report_size, item.size, Item::report_size);
        emit_if_changed!(self, report_count, item.count, Item::report_count);

        self.emit_usages(&item.usages);

        let mut flags = MainFlags::new();
        if item.is_constant {
            flags = flags.constant();
        }
        if item.is_variable {
            flags = flags.variable();
        }
        if item.is_relative {
            flags = flags.relative();
        }
        self.rdesc.push(match item.report_type {
            ReportType::Input => Item::input(flags),
            ReportType::Output => Item::output(flags),
            ReportType::Feature => Item::feature(flags),
        });

        self.state.bit_cursor += item.bits();
    }

    /// Pad the descriptor to a full byte with a constant Input field.
    ///
    /// The padding items are emitted unconditionally and do not update
    /// the tracked registers, nothing is compiled after them.
    fn align_to_byte(&mut self) {
        let remainder = self.state.bit_cursor % 8;
        if remainder != 0 {
            let bits = 8 - remainder;
            log::trace!("Padding descriptor with {bits} bits");
            self.rdesc.push(Item::report_size(ReportSize(bits as u32)));
            self.rdesc.push(Item::report_count(ReportCount(1)));
            self.rdesc.push(Item::input(MainFlags::new().constant().variable()));
        }
    }
}

/// Compile the schema rooted at `root` into a report descriptor.
///
/// With `auto_pad`, a constant Input field is appended if the fields
/// do not add up to a multiple of 8 bits.
///
/// The schema is trusted, no validation of e.g. logical ranges happens here.
///
/// ```
/// # use hidcodec::schema::*;
/// # use hidcodec::types::*;
/// let root = ReportGroup::new(ReportId(1)).add(ReportItem::buttons(3, 1));
/// let rdesc = hidcodec::compile(&root.into(), true);
/// assert_eq!(rdesc.hex(), "850105091500250175019503190129038102750595018103");
/// ```
pub fn compile(root: &Node, auto_pad: bool) -> ReportDescriptor {
    let mut compiler = Compiler::new();
    compiler.visit(root);
    if auto_pad {
        compiler.align_to_byte();
    }
    log::trace!(
        "Compiled {} items into {} bytes",
        compiler.rdesc.len(),
        compiler.rdesc.size()
    );
    compiler.rdesc
}
