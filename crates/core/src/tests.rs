// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

#[cfg(test)]
mod integration_tests {
    use crate::peripherals::other_master::OtherMasterMode;
    use crate::peripherals::pca9540::Pca9540;
    use crate::peripherals::pca9541::Pca9541;
    use crate::peripherals::tmp102::Tmp102;
    use crate::regs::Istat;
    use crate::smbus::SmbusSlave;
    use crate::{DeviceHandle, I2cError, I2cResult, Machine};
    use std::cell::RefCell;
    use std::rc::Rc;
    use switchsim_config::SystemManifest;

    const ARB: u8 = 0x74;
    const MUX: u8 = 0x70;
    const TEMP: u8 = 0x48;

    fn build(yaml: &str) -> Machine {
        let manifest = SystemManifest::from_yaml(yaml).unwrap();
        Machine::from_manifest(&manifest).unwrap()
    }

    fn arbiter(machine: &Machine, name: &str) -> Rc<RefCell<SmbusSlave<Pca9541>>> {
        match machine.device(name).map(|d| d.dev.clone()) {
            Some(DeviceHandle::Arbiter(arb)) => arb,
            other => panic!("{} is not an arbiter: {:?}", name, other),
        }
    }

    fn multiplexer(machine: &Machine, name: &str) -> Rc<RefCell<SmbusSlave<Pca9540>>> {
        match machine.device(name).map(|d| d.dev.clone()) {
            Some(DeviceHandle::Multiplexer(mux)) => mux,
            other => panic!("{} is not a multiplexer: {:?}", name, other),
        }
    }

    fn arbiter_system(sim: bool) -> Machine {
        build(&format!(
            r#"
name: "arbitrated"
devices:
  - {{ id: "arb", type: "pca9541", bus: "i2c0", address: 0x74, irq: 3, sim_other_master: {} }}
  - {{ id: "temp", type: "tmp102", bus: "arb.0", address: 0x48 }}
"#,
            sim
        ))
    }

    #[test]
    fn test_control_write_grants_bus() {
        let machine = arbiter_system(false);
        let root = machine.root();

        // NBUSON=0 BUSON=1 NMYBUS=0 MYBUS=0
        root.write_byte_data(ARB, 0x01, 0x04).unwrap();
        let state = arbiter(&machine, "arb").borrow().device().control_state();
        assert!(state.enabled);
        assert!(state.bus_on);
        assert!(state.have_control);
        assert_eq!(root.read_byte_data(ARB, 0x01).unwrap(), 0x04);

        // Traffic now reaches the sensor behind the arbiter.
        assert_eq!(root.read_block_data(TEMP, 0x00, 2).unwrap(), vec![0x19, 0x00]);
    }

    #[test]
    fn test_unowned_bus_refuses_traffic() {
        let machine = arbiter_system(false);
        assert_eq!(
            machine.root().read_byte_data(TEMP, 0x00),
            Err(I2cError::Nack)
        );
    }

    #[test]
    fn test_arbitration_timeout_never_grants() {
        let machine = arbiter_system(true);
        let root = machine.root();
        let arb = arbiter(&machine, "arb");
        arb.borrow_mut()
            .device_mut()
            .set_other_master_mode(OtherMasterMode::BusoffArbTimeout);

        root.write_byte_data(ARB, 0x01, 0x04).unwrap();
        // The other master switches the bus off under us on the first read.
        assert_eq!(root.read_byte_data(ARB, 0x01).unwrap(), 0x0C);
        assert_eq!(root.read_byte_data(ARB, 0x01).unwrap(), 0x0C);

        let dev = arb.borrow();
        let regs = dev.device().regs();
        assert_ne!(regs.istat & Istat::NMYTEST.bits(), 0);
        assert!(!dev.device().control_state().enabled);
        assert_eq!(dev.device().other_master().control_read_count(), 2);
        drop(dev);

        assert!(machine.irqs().pin(3).level);
        assert_eq!(root.read_byte_data(TEMP, 0x00), Err(I2cError::Nack));
    }

    #[test]
    fn test_other_master_cycles_on_release() {
        let machine = arbiter_system(true);
        let root = machine.root();
        let arb = arbiter(&machine, "arb");

        let mut seen = Vec::new();
        for _ in 0..OtherMasterMode::ALL.len() {
            seen.push(arb.borrow().device().other_master().mode());
            // Request then release the bus.
            root.write_byte_data(ARB, 0x01, 0x04).unwrap();
            root.write_byte_data(ARB, 0x01, 0x00).unwrap();
        }
        assert_eq!(seen, OtherMasterMode::ALL.to_vec());
        // The timeout mode moves on at the request already, so the release
        // after it lands one step further.
        assert_eq!(
            arb.borrow().device().other_master().mode(),
            OtherMasterMode::BusoffRequestOwnership
        );
    }

    fn mux_system() -> Machine {
        build(
            r#"
name: "muxed"
devices:
  - { id: "mux", type: "pca9540", bus: "i2c0", address: 0x70 }
  - { id: "t0", type: "tmp102", bus: "mux.0", address: 0x49 }
  - { id: "t1", type: "tmp102", bus: "mux.1", address: 0x48 }
"#,
        )
    }

    #[test]
    fn test_mux_routes_selected_channel_only() {
        let machine = mux_system();
        let root = machine.root();

        root.send_byte(MUX, 0x05).unwrap();
        assert_eq!(root.receive_byte(MUX).unwrap(), 0x05);
        assert_eq!(root.read_byte_data(TEMP, 0x00).unwrap(), 0x19);
        assert_eq!(root.read_byte_data(0x49, 0x00), Err(I2cError::Nack));

        root.send_byte(MUX, 0x04).unwrap();
        assert_eq!(root.read_byte_data(0x49, 0x00).unwrap(), 0x19);
        assert_eq!(root.read_byte_data(TEMP, 0x00), Err(I2cError::Nack));
    }

    #[test]
    fn test_mux_disabled_or_spare_selector_routes_nowhere() {
        let machine = mux_system();
        let root = machine.root();

        for selector in [0x00, 0x01, 0x86, 0x87] {
            root.send_byte(MUX, selector).unwrap();
            assert_eq!(multiplexer(&machine, "mux").borrow().device().read_select(), selector);
            assert_eq!(root.read_byte_data(TEMP, 0x00), Err(I2cError::Nack));
            assert_eq!(root.read_byte_data(0x49, 0x00), Err(I2cError::Nack));
        }
    }

    #[test]
    fn test_detach_destroys_proxy_and_reattach_recreates() {
        let mut machine = arbiter_system(false);
        let tmp = || DeviceHandle::Slave(Rc::new(RefCell::new(SmbusSlave::new(Tmp102::new()))));

        machine.add_device("extra", "arb.0", 0x05, tmp()).unwrap();
        let first = machine.root().device(0x05).unwrap();
        assert_eq!(
            arbiter(&machine, "arb").borrow().device().proxy_addresses(),
            vec![0x05, TEMP]
        );

        machine.detach_device("extra").unwrap();
        assert!(!machine.root().addresses().contains(&0x05));
        assert_eq!(
            arbiter(&machine, "arb").borrow().device().proxy_addresses(),
            vec![TEMP]
        );

        machine.add_device("extra", "arb.0", 0x05, tmp()).unwrap();
        let second = machine.root().device(0x05).unwrap();
        assert!(!Rc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_shared_address_across_mux_channels() {
        let mut machine = mux_system();
        let tmp = DeviceHandle::Slave(Rc::new(RefCell::new(SmbusSlave::new(Tmp102::new()))));
        machine.add_device("t0b", "mux.0", TEMP, tmp).unwrap();

        // One proxy now serves both channels.
        let proxy = machine.root().device(TEMP).unwrap();
        machine.detach_device("t1").unwrap();
        let still = machine.root().device(TEMP).unwrap();
        assert!(Rc::ptr_eq(&proxy, &still));

        machine.detach_device("t0b").unwrap();
        assert!(machine.root().device(TEMP).is_none());
    }

    #[test]
    fn test_nested_arbiter_mux_sensor() {
        let machine = build(
            r#"
name: "nested"
devices:
  - { id: "arb", type: "pca9541", bus: "i2c0", address: 0x74 }
  - { id: "mux", type: "pca9540", bus: "arb.0", address: 0x70 }
  - { id: "temp", type: "tmp102", bus: "mux.1", address: 0x48 }
"#,
        );
        let root = machine.root();
        assert_eq!(root.addresses(), vec![TEMP, MUX, ARB]);

        assert_eq!(root.send_byte(MUX, 0x05), Err(I2cError::Nack));
        root.write_byte_data(ARB, 0x01, 0x04).unwrap();
        root.send_byte(MUX, 0x05).unwrap();

        // Raise T_HIGH through both chips, read it back.
        root.write_block(TEMP, &[0x03, 0x5A, 0x00]).unwrap();
        assert_eq!(root.read_block_data(TEMP, 0x03, 2).unwrap(), vec![0x5A, 0x00]);
    }

    fn replay(machine: &Machine) -> Vec<I2cResult<Vec<u8>>> {
        let root = machine.root();
        let mut out = Vec::new();
        for _ in 0..3 {
            out.push(root.read_block_data(ARB, 0x11, 3));
            out.push(root.write_block(ARB, &[0x01, 0x04]).map(|_| Vec::new()));
            out.push(root.read_block_data(TEMP, 0x00, 2));
            out.push(root.read_block_data(ARB, 0x02, 1));
            out.push(root.write_block(ARB, &[0x01, 0x00]).map(|_| Vec::new()));
        }
        out
    }

    #[test]
    fn test_snapshot_restore_reproduces_trace() {
        let mut machine = arbiter_system(true);
        let root = machine.root();
        root.write_byte_data(ARB, 0x00, 0x0E).unwrap();
        root.write_byte_data(ARB, 0x01, 0x54).unwrap();
        root.read_byte_data(ARB, 0x01).unwrap();

        let saved = machine.snapshot();
        let before = replay(&machine);
        assert_ne!(machine.snapshot(), saved);

        machine.apply_snapshot(&saved).unwrap();
        assert_eq!(machine.snapshot(), saved);
        assert_eq!(replay(&machine), before);
    }

    #[test]
    fn test_restore_has_no_write_side_effects() {
        let mut machine = arbiter_system(true);
        let mut saved = machine.snapshot();
        // A live CONTROL write of 0 would advance the simulator.
        saved.devices.insert(
            "arb".into(),
            serde_json::json!({
                "curr_regnum": 1,
                "ienable": 0,
                "control": 0,
                "istat": 0x02,
                "irq_raised": true,
                "om_mode": "buson_i_own_it",
                "control_read_count": 1
            }),
        );

        machine.apply_snapshot(&saved).unwrap();
        let arb = arbiter(&machine, "arb");
        let dev = arb.borrow();
        assert_eq!(dev.device().other_master().mode(), OtherMasterMode::BusonIOwnIt);
        assert_eq!(dev.device().other_master().control_read_count(), 1);
        assert_eq!(dev.device().regs().istat, 0x02);
        assert!(dev.device().irq_raised());
        assert!(machine.irqs().pin(3).level);
    }

    #[test]
    fn test_snapshot_rejects_unknown_device() {
        let mut machine = arbiter_system(false);
        let mut snap = machine.snapshot();
        snap.devices.insert("ghost".into(), serde_json::json!({}));
        assert!(machine.apply_snapshot(&snap).is_err());
    }

    #[test]
    fn test_machine_reset() {
        let mut machine = mux_system();
        machine.root().send_byte(MUX, 0x05).unwrap();
        machine.reset();
        assert_eq!(multiplexer(&machine, "mux").borrow().device().read_select(), 0);
        assert_eq!(machine.root().read_byte_data(TEMP, 0x00), Err(I2cError::Nack));
    }

    #[test]
    fn test_alert_response_over_bus() {
        let machine = build(
            r#"
name: "alerting"
devices:
  - { id: "ara", type: "smbus_alert", bus: "i2c0", address: 0x0c, irq: 7 }
"#,
        );
        let root = machine.root();
        assert_eq!(root.receive_byte(0x0C), Err(I2cError::Nack));

        machine.alert("ara", 0x48).unwrap();
        machine.alert("ara", 0x2A).unwrap();
        assert!(machine.irqs().pin(7).level);

        assert_eq!(root.receive_byte(0x0C).unwrap(), 0x48);
        assert!(machine.irqs().pin(7).level);
        assert_eq!(root.receive_byte(0x0C).unwrap(), 0x2A);
        assert!(!machine.irqs().pin(7).level);
        assert_eq!(machine.irqs().pin(7).rising_edges, 1);
    }
}
