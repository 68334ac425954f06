// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod other_master;
pub mod pca9540;
pub mod pca9541;
pub mod smbus_alert;
pub mod tmp102;
