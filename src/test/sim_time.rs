use crate::sim::SimTime;

#[test]
fn sim_time_unit_conversions() {
    assert_eq!(SimTime::from_micros(1), SimTime(1_000));
    assert_eq!(SimTime::from_millis(1), SimTime(1_000_000));
    assert_eq!(SimTime::from_millis(2_500).as_millis(), 2_500);
    assert_eq!(SimTime(1_999_999).as_millis(), 1);
}

#[test]
fn sim_time_unit_conversions_saturate_on_overflow() {
    assert_eq!(SimTime::from_micros(u64::MAX), SimTime(u64::MAX));
    assert_eq!(SimTime::from_millis(u64::MAX), SimTime(u64::MAX));
    assert_eq!(SimTime(u64::MAX - 1).after_millis(1), SimTime(u64::MAX));
}

#[test]
fn after_millis_adds_whole_milliseconds() {
    assert_eq!(SimTime::ZERO.after_millis(10), SimTime::from_millis(10));
    assert_eq!(SimTime::from_micros(500).after_millis(1), SimTime(1_500_000));
}
