// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::interrupt::IrqLine;

/// Edge-detecting driver for a level interrupt output.
///
/// The line is only touched when the computed condition differs from the
/// last one driven, so re-evaluating an unchanged status is free of edges.
#[derive(Debug, Clone, Default)]
pub struct IrqSignaler {
    line: Option<IrqLine>,
    raised: bool,
}

impl IrqSignaler {
    pub fn new(line: Option<IrqLine>) -> Self {
        Self {
            line,
            raised: false,
        }
    }

    pub fn is_raised(&self) -> bool {
        self.raised
    }

    pub fn line(&self) -> Option<&IrqLine> {
        self.line.as_ref()
    }

    /// Drive the line to `asserted`. Returns true when an edge was produced.
    pub fn update(&mut self, asserted: bool) -> bool {
        if asserted == self.raised {
            return false;
        }
        self.raised = asserted;
        if let Some(line) = &self.line {
            line.set_level(asserted);
        }
        true
    }

    /// Re-assert a stored level verbatim (snapshot restore).
    pub fn restore(&mut self, raised: bool) {
        self.raised = raised;
        if let Some(line) = &self.line {
            line.set_level(raised);
        }
    }

    pub fn reset(&mut self) {
        self.update(false);
    }
}
