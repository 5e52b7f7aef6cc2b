//! Cross-thread behavior: serialized commands, blocking waits, and the
//! supervisor tasks.

use std::sync::{Arc, Barrier, Mutex, mpsc};
use std::thread;
use std::time::Duration;

use garage_door::app::events::DoorNotification;
use garage_door::{DoorState, Error, SwitchId, SwitchState};

use crate::mock_hw::{DEBOUNCE_MS, PULSE_MS, RecordingListener, Rig};

#[test]
fn concurrent_opens_accept_exactly_one() {
    let rig = Rig::closed();
    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let ctrl = Arc::clone(&rig.ctrl);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                ctrl.request_open()
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let accepted = results.iter().filter(|r| **r == Ok(DoorState::Opening)).count();
    assert_eq!(accepted, 1);
    assert!(
        results
            .iter()
            .filter(|r| r.is_err())
            .all(|r| matches!(r, Err(Error::InvalidTransition { .. })))
    );
    assert_eq!(rig.relay.pulses(), 1);
    assert_eq!(rig.listener.states(), vec![DoorState::Opening]);
}

#[test]
fn slow_listener_does_not_let_later_changes_overtake() {
    let rig = Rig::closed();
    let (stalled_tx, stalled_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let stalled_tx = Mutex::new(stalled_tx);
    let release_rx = Mutex::new(release_rx);
    rig.ctrl.register_state_listener(move |n: &DoorNotification| {
        if n.state == DoorState::Opening && !n.is_position_only() {
            stalled_tx.lock().unwrap().send(()).unwrap();
            release_rx.lock().unwrap().recv().unwrap();
        }
    });
    let tail = RecordingListener::default();
    rig.ctrl.register_state_listener(tail.clone());

    let ctrl = Arc::clone(&rig.ctrl);
    let opener = thread::spawn(move || ctrl.request_open());
    stalled_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    // The whole travel completes while OPENING is still being delivered.
    rig.finish_pulse();
    rig.travel(SwitchId::ClosedLimit, SwitchId::OpenLimit);
    assert_eq!(rig.ctrl.state(), DoorState::Open);
    assert!(tail.states().is_empty(), "OPEN must not overtake OPENING");

    release_tx.send(()).unwrap();
    assert_eq!(opener.join().unwrap(), Ok(DoorState::Opening));
    assert_eq!(tail.states(), vec![DoorState::Opening, DoorState::Open]);
    assert_eq!(rig.listener.states(), tail.states());
}

#[test]
fn wait_for_state_wakes_on_arrival() {
    let rig = Rig::closed();
    let ctrl = Arc::clone(&rig.ctrl);
    let waiter = thread::spawn(move || ctrl.wait_for_state(DoorState::Open, Duration::from_secs(5)));

    rig.ctrl.request_open().unwrap();
    rig.finish_pulse();
    rig.travel(SwitchId::ClosedLimit, SwitchId::OpenLimit);

    assert!(waiter.join().unwrap());
}

#[test]
fn wait_for_state_times_out() {
    let rig = Rig::closed();
    assert!(!rig.ctrl.wait_for_state(DoorState::Open, Duration::from_millis(20)));
    assert!(rig.ctrl.wait_for_state(DoorState::Closed, Duration::from_millis(1)));
}

#[test]
fn supervisor_tasks_drive_edges_and_timers() {
    let rig = Rig::closed();
    rig.ctrl.spawn_tasks(Duration::from_millis(1)).unwrap();
    // Second call is a no-op.
    rig.ctrl.spawn_tasks(Duration::from_millis(1)).unwrap();

    rig.ctrl.request_open().unwrap();
    rig.clock.advance(PULSE_MS);
    for _ in 0..500 {
        if !rig.relay.is_high() {
            break;
        }
        thread::sleep(Duration::from_millis(1));
    }
    assert!(!rig.relay.is_high(), "timer task released the relay");

    rig.edge(SwitchId::ClosedLimit, SwitchState::Open);
    rig.clock.advance(DEBOUNCE_MS);
    rig.edge(SwitchId::OpenLimit, SwitchState::Open);
    rig.clock.advance(DEBOUNCE_MS);
    assert!(rig.ctrl.wait_for_state(DoorState::Open, Duration::from_secs(5)));

    rig.ctrl.deinit();
    assert!(matches!(rig.ctrl.request_close(), Err(Error::InvalidTransition { .. })));
}

#[test]
fn timer_task_trips_failsafe() {
    let rig = Rig::closed();
    rig.ctrl.spawn_tasks(Duration::from_millis(1)).unwrap();

    rig.ctrl.request_open().unwrap();
    rig.clock.advance(PULSE_MS);
    for _ in 0..500 {
        if !rig.relay.is_high() {
            break;
        }
        thread::sleep(Duration::from_millis(1));
    }
    rig.clock.advance(3_000);

    assert!(rig.ctrl.wait_for_state(DoorState::Error, Duration::from_secs(5)));
    rig.ctrl.deinit();
}

#[test]
fn dropping_last_handle_stops_tasks() {
    let rig = Rig::closed();
    rig.ctrl.spawn_tasks(Duration::from_millis(1)).unwrap();
    let weak = Arc::downgrade(&rig.ctrl);
    let Rig { ctrl, .. } = rig;
    drop(ctrl);

    // Tasks hold only weak handles, so the controller goes away.
    for _ in 0..500 {
        if weak.upgrade().is_none() {
            return;
        }
        thread::sleep(Duration::from_millis(1));
    }
    panic!("controller still alive after last handle dropped");
}
