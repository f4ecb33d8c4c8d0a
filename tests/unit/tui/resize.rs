use super::*;
use std::time::Duration;

#[test]
fn burst_of_notifications_coalesces() {
    let (tx, rx) = resize_channel();
    for _ in 0..10 {
        tx.notify();
    }
    assert!(rx.receiver().try_recv().is_ok());
    assert!(rx.receiver().try_recv().is_err());
}

#[test]
fn clear_drops_pending_notification() {
    let (tx, rx) = resize_channel();
    tx.notify();
    rx.clear();
    assert!(rx.receiver().try_recv().is_err());
}

#[test]
fn notify_after_receiver_dropped_is_harmless() {
    let (tx, rx) = resize_channel();
    drop(rx);
    tx.notify();
}

#[test]
fn sigwinch_is_forwarded_until_unregistered() {
    let (tx, rx) = resize_channel();
    let bridge = SignalBridge::register(tx).unwrap();

    signal_hook::low_level::raise(SIGWINCH).unwrap();
    assert!(rx
        .receiver()
        .recv_timeout(Duration::from_secs(2))
        .is_ok());

    bridge.unregister();
    // The forwarding thread owned the last sender.
    assert!(rx
        .receiver()
        .recv_timeout(Duration::from_millis(200))
        .is_err());
}
