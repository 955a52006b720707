//! S3 — setpoint distribution across a paralleled cluster (spec.md §8).

mod common;

use std::time::Duration;

use acsystem::leader::{Command, LeaderAggregate};
use acsystem::value::Value;
use common::{recording_member, wait_for_write};

#[tokio::test]
async fn ac_power_setpoint_distributes_evenly_per_phase() {
    let values = [
        ("/N2kSystemInstance", Value::Int(7)),
        ("/Ac/Out/L1/P", Value::Double(800.0)),
        ("/Ac/Out/L2/P", Value::Double(800.0)),
        ("/Ac/Out/L3/P", Value::Double(800.0)),
    ];
    let (m1, writes1) = recording_member("com.victronenergy.multi.ttyUSB0", 0, &values, &["/Ess/AcPowerSetpoint"]).await;
    let (m2, writes2) = recording_member("com.victronenergy.multi.ttyUSB1", 1, &values, &["/Ess/AcPowerSetpoint"]).await;

    let mut leader = LeaderAggregate::new(7, m1);
    leader.add_member(m2);
    leader.tick(); // establishes /Ac/Out/L{1,2,3}/P so the phase count is 3

    assert!(leader.apply_command(Command::AcPowerSetpoint(Value::Double(1800.0))));
    assert_eq!(leader.get_item("/Ess/AcPowerSetpoint").as_f64(), Some(1800.0));

    let w1 = wait_for_write(&writes1, "/Ess/AcPowerSetpoint", Duration::from_millis(500)).await;
    let w2 = wait_for_write(&writes2, "/Ess/AcPowerSetpoint", Duration::from_millis(500)).await;
    assert_eq!(w1.and_then(|v| v.as_f64()), Some(600.0));
    assert_eq!(w2.and_then(|v| v.as_f64()), Some(600.0));
}
