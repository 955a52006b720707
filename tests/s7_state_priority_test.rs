//! S7 — `/State` priority fold when members disagree (spec.md §8).

mod common;

use acsystem::leader::LeaderAggregate;
use acsystem::value::Value;
use common::member;

#[tokio::test]
async fn inverting_wins_over_bulk_in_the_state_fold() {
    let m1 = member("com.victronenergy.multi.ttyUSB0", 0, &[("/N2kSystemInstance", Value::Int(9)), ("/State", Value::Int(9))]).await;
    let m2 = member("com.victronenergy.multi.ttyUSB1", 1, &[("/N2kSystemInstance", Value::Int(9)), ("/State", Value::Int(3))]).await;

    let mut leader = LeaderAggregate::new(9, m1);
    leader.add_member(m2);
    leader.tick();

    assert_eq!(leader.get_item("/State").as_i64(), Some(9));
}
