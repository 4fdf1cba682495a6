mod common;

use std::sync::Arc;

use common::MockTransport;
use dynio::{DynamixelBus, Model, Motor, ProtocolVersion};
use proptest::prelude::*;

fn round_trip(model: Model, protocol: ProtocolVersion, index: usize, raw: u32) {
    let mock = Arc::new(MockTransport::new());
    let bus = DynamixelBus::with_transport(mock.clone());
    let motor = bus.new_model(1, model, protocol, None).unwrap();

    let registers: Vec<_> = motor.table().iter().cloned().collect();
    let register = &registers[index % registers.len()];
    let value = register.width.mask(raw);

    motor.write_named(&register.name, value).unwrap();
    assert_eq!(motor.read_named(&register.name).unwrap(), value);
}

proptest! {
    #[test]
    fn ax12_named_round_trip(index in any::<usize>(), raw in any::<u32>()) {
        round_trip(Model::Ax12, ProtocolVersion::V1, index, raw);
    }

    #[test]
    fn mx106_v2_named_round_trip(index in any::<usize>(), raw in any::<u32>()) {
        round_trip(Model::Mx106, ProtocolVersion::V2, index, raw);
    }

    #[test]
    fn angle_stays_within_one_step(angle in 0.0f64..300.0) {
        let limits = dynio::ModelLimits::new(0, 1023, 300.0).unwrap();
        let position = limits.angle_to_position(angle).unwrap();
        let back = limits.position_to_angle(position).unwrap();
        prop_assert!((back - angle).abs() <= 300.0 / 1024.0);
    }
}
