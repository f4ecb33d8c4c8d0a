use super::*;
use std::time::Duration;

#[test]
fn fresh_signal_is_not_stopped() {
    let (_trigger, signal) = stop_pair().unwrap();
    assert!(!signal.is_stopped());
}

#[test]
fn close_is_observed_by_every_clone() {
    let (trigger, signal) = stop_pair().unwrap();
    let clone = signal.clone();
    trigger.close();

    assert!(signal.is_stopped());
    assert!(clone.is_stopped());
    assert!(clone
        .receiver()
        .recv_timeout(Duration::from_secs(1))
        .is_err());
}

#[test]
fn close_wakes_the_poll_fd() {
    let (trigger, signal) = stop_pair().unwrap();
    assert!(!signal.wake.is_woken());
    trigger.close();
    assert!(signal.wake.is_woken());
}

#[test]
fn each_pair_gets_a_new_id() {
    let (a, _) = stop_pair().unwrap();
    let (b, _) = stop_pair().unwrap();
    assert_ne!(a.id(), b.id());
}

#[test]
fn closing_one_cycle_leaves_the_next_running() {
    let (first, first_signal) = stop_pair().unwrap();
    let (_second, second_signal) = stop_pair().unwrap();
    first.close();

    assert!(first_signal.is_stopped());
    assert!(!second_signal.is_stopped());
}

#[test]
fn blocked_receiver_wakes_on_close() {
    let (trigger, signal) = stop_pair().unwrap();
    let waiter = std::thread::spawn(move || signal.receiver().recv().is_err());
    std::thread::sleep(Duration::from_millis(20));
    trigger.close();
    assert!(waiter.join().unwrap());
}
