// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Bitfield helpers and the PCA9541 register bit layout.

use bitflags::bitflags;

/// Replace the bits of `current` selected by `mask` with those of `incoming`.
pub const fn apply_masked(current: u8, incoming: u8, mask: u8) -> u8 {
    (current & !mask) | (incoming & mask)
}

/// Invert the `bit` field of `current` when `predicate` holds.
pub const fn toggle_if(current: u8, predicate: bool, bit: u8) -> u8 {
    if predicate {
        apply_masked(current, !current, bit)
    } else {
        current
    }
}

bitflags! {
    /// IENABLE (register 0). A set bit masks the matching ISTAT source.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Ienable: u8 {
        const INTIN = 1 << 0;
        const BUSINIT = 1 << 1;
        const BUSOK = 1 << 2;
        const BUSLOST = 1 << 3;

        const WRITE_MASK = 0x0f;
    }
}

bitflags! {
    /// CONTROL (register 1).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Control: u8 {
        const MYBUS = 1 << 0;
        const NMYBUS = 1 << 1;
        const BUSON = 1 << 2;
        const NBUSON = 1 << 3;
        const BUSINIT = 1 << 4;
        const TESTON = 1 << 6;
        const NTESTON = 1 << 7;

        /// NMYBUS and NBUSON belong to the other master.
        const WRITE_MASK = Self::NTESTON.bits()
            | Self::TESTON.bits()
            | Self::BUSINIT.bits()
            | Self::BUSON.bits()
            | Self::MYBUS.bits();
    }
}

bitflags! {
    /// ISTAT (register 2). Read-only from the bus.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Istat: u8 {
        const INTIN = 1 << 0;
        const BUSINIT = 1 << 1;
        const BUSOK = 1 << 2;
        const BUSLOST = 1 << 3;
        const MYTEST = 1 << 6;
        const NMYTEST = 1 << 7;

        const CLEAR_ON_READ = Self::BUSINIT.bits() | Self::BUSOK.bits() | Self::BUSLOST.bits();
        /// Test interrupts cannot be masked by IENABLE.
        const ALWAYS_ON = Self::MYTEST.bits() | Self::NMYTEST.bits();
    }
}

/// Bus ownership as derived from the low nibble of CONTROL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlState {
    /// This side owns the bus and the control bits agree.
    pub enabled: bool,
    pub bus_on: bool,
    pub have_control: bool,
}

const fn cs(enabled: bool, bus_on: bool, have_control: bool) -> ControlState {
    ControlState {
        enabled,
        bus_on,
        have_control,
    }
}

/// Indexed by NBUSON:BUSON:NMYBUS:MYBUS.
const CONTROL_STATES: [ControlState; 16] = [
    cs(false, false, true),  // 0000
    cs(false, false, false), // 0001
    cs(false, false, false), // 0010
    cs(false, false, true),  // 0011
    cs(true, true, true),    // 0100
    cs(false, true, false),  // 0101
    cs(false, true, false),  // 0110
    cs(true, true, true),    // 0111
    cs(true, true, true),    // 1000
    cs(false, true, false),  // 1001
    cs(false, true, false),  // 1010
    cs(true, true, true),    // 1011
    cs(false, false, true),  // 1100
    cs(false, false, false), // 1101
    cs(false, false, false), // 1110
    cs(false, false, true),  // 1111
];

impl ControlState {
    pub const fn decode(control: u8) -> Self {
        CONTROL_STATES[(control & 0x0f) as usize]
    }
}

/// Power the bus off from the other side, if it is on.
pub const fn set_bus_off(control: u8) -> u8 {
    toggle_if(
        control,
        ControlState::decode(control).bus_on,
        Control::NBUSON.bits(),
    )
}

pub const fn set_bus_on(control: u8) -> u8 {
    toggle_if(
        control,
        !ControlState::decode(control).bus_on,
        Control::NBUSON.bits(),
    )
}

pub const fn set_have_control(control: u8) -> u8 {
    toggle_if(
        control,
        !ControlState::decode(control).have_control,
        Control::NMYBUS.bits(),
    )
}

pub const fn set_not_have_control(control: u8) -> u8 {
    toggle_if(
        control,
        ControlState::decode(control).have_control,
        Control::NMYBUS.bits(),
    )
}
