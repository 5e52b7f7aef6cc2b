//! Command → FSM → relay / safety pipeline, driven through mock hardware
//! and a manual clock.

use std::sync::{Arc, Mutex};

use garage_door::app::commands::AppCommand;
use garage_door::app::events::DoorNotification;
use garage_door::diagnostics::EventKind;
use garage_door::events::EDGE_QUEUE_CAP;
use garage_door::{
    Direction, DoorCommand, DoorPosition, DoorState, Error, ErrorKind, SwitchId, SwitchPair, SwitchState,
};

use crate::mock_hw::{DEBOUNCE_MS, MockSwitches, Rig};

/// From CLOSED: open, wait for the pulse, leave the closed limit.
fn start_opening(rig: &Rig) {
    assert_eq!(rig.ctrl.request_open(), Ok(DoorState::Opening));
    rig.finish_pulse();
    rig.set_switch(SwitchId::ClosedLimit, SwitchState::Open);
}

// ── Normal operation ──────────────────────────────────────────

#[test]
fn open_then_close_full_cycle() {
    let rig = Rig::closed();
    assert_eq!(rig.ctrl.state(), DoorState::Closed);
    assert_eq!(rig.ctrl.position(), DoorPosition::CLOSED);

    assert_eq!(rig.ctrl.request_open(), Ok(DoorState::Opening));
    assert!(rig.relay.is_high(), "relay asserted on OPEN");
    assert!(rig.ctrl.is_moving());

    rig.finish_pulse();
    assert!(!rig.relay.is_high(), "relay released after pulse duration");

    rig.travel(SwitchId::ClosedLimit, SwitchId::OpenLimit);
    assert_eq!(rig.ctrl.state(), DoorState::Open);
    assert_eq!(rig.ctrl.position(), DoorPosition::OPEN);

    // Let the relay's minimum interval pass.
    rig.advance(1_000);
    assert_eq!(rig.ctrl.request_close(), Ok(DoorState::Closing));
    rig.finish_pulse();
    rig.travel(SwitchId::OpenLimit, SwitchId::ClosedLimit);

    assert_eq!(rig.ctrl.state(), DoorState::Closed);
    assert_eq!(rig.ctrl.position(), DoorPosition::CLOSED);
    assert_eq!(rig.ctrl.last_error(), None);
    assert_eq!(rig.relay.pulses(), 2);
    assert_eq!(
        rig.listener.states(),
        vec![DoorState::Opening, DoorState::Open, DoorState::Closing, DoorState::Closed]
    );
}

#[test]
fn position_frozen_while_moving_between_limits() {
    let rig = Rig::closed();
    start_opening(&rig);
    assert_eq!(rig.ctrl.state(), DoorState::Opening);
    assert_eq!(rig.ctrl.position(), DoorPosition::CLOSED);

    assert_eq!(rig.ctrl.request_stop(), Ok(DoorState::Stopped));
    assert_eq!(rig.ctrl.position(), DoorPosition::MIDPOINT);
}

#[test]
fn stop_mid_travel_then_resume() {
    let rig = Rig::closed();
    start_opening(&rig);
    let pulses = rig.relay.pulses();

    assert_eq!(rig.ctrl.request_stop(), Ok(DoorState::Stopped));
    assert_eq!(rig.relay.pulses(), pulses, "STOP never pulses the relay");

    rig.advance(1_000);
    assert_eq!(rig.ctrl.request_close(), Ok(DoorState::Closing));
    rig.finish_pulse();
    rig.set_switch(SwitchId::ClosedLimit, SwitchState::Closed);
    assert_eq!(rig.ctrl.state(), DoorState::Closed);
}

// ── Rejected commands ─────────────────────────────────────────

#[test]
fn invalid_transitions_leave_state_unchanged() {
    let rig = Rig::closed();

    assert_eq!(
        rig.ctrl.request_close(),
        Err(Error::InvalidTransition {
            from: DoorState::Closed,
            command: DoorCommand::Close,
        })
    );
    assert_eq!(
        rig.ctrl.request_reset(),
        Err(Error::InvalidTransition {
            from: DoorState::Closed,
            command: DoorCommand::Reset,
        })
    );
    assert_eq!(rig.ctrl.state(), DoorState::Closed);
    assert_eq!(rig.relay.pulses(), 0);
    assert!(rig.listener.notes().is_empty());

    rig.ctrl.request_open().unwrap();
    assert!(matches!(
        rig.ctrl.request_open(),
        Err(Error::InvalidTransition {
            from: DoorState::Opening,
            ..
        })
    ));
    assert_eq!(rig.ctrl.state(), DoorState::Opening);
}

#[test]
fn stop_at_rest_is_a_silent_noop() {
    let rig = Rig::closed();
    assert_eq!(rig.ctrl.request_stop(), Ok(DoorState::Closed));
    assert_eq!(rig.ctrl.state(), DoorState::Closed);
    assert!(rig.listener.notes().is_empty());
    assert_eq!(rig.relay.pulses(), 0);
}

#[test]
fn command_inside_min_interval_is_rate_limited() {
    let rig = Rig::closed();
    start_opening(&rig);
    rig.ctrl.request_stop().unwrap();

    // Pulse released at 500ms, now 550ms.
    assert_eq!(rig.ctrl.request_close(), Err(Error::RateLimited { wait_ms: 950 }));
    assert_eq!(rig.ctrl.state(), DoorState::Stopped, "rate limit leaves state unchanged");

    rig.advance(950);
    assert_eq!(rig.ctrl.request_close(), Ok(DoorState::Closing));
}

// ── Faults ────────────────────────────────────────────────────

#[test]
fn stuck_relay_forces_error() {
    let rig = Rig::closed();
    rig.ctrl.request_open().unwrap();
    rig.relay.set_stuck(true);

    rig.finish_pulse();
    assert_eq!(rig.ctrl.state(), DoorState::Opening, "release attempted, still asserted");

    rig.advance(101);
    assert_eq!(rig.ctrl.state(), DoorState::Error);
    assert_eq!(rig.ctrl.last_error(), Some(ErrorKind::StuckRelay));

    let last = *rig.listener.notes().last().unwrap();
    assert_eq!(last.state, DoorState::Error);
    assert_eq!(last.previous, DoorState::Opening);
    assert_eq!(last.error, Some(ErrorKind::StuckRelay));
}

#[test]
fn operation_timeout_forces_error() {
    let rig = Rig::closed();
    start_opening(&rig);

    rig.clock.set(29_999);
    rig.ctrl.service_timers();
    assert_eq!(rig.ctrl.state(), DoorState::Opening);

    rig.advance(1);
    assert_eq!(rig.ctrl.state(), DoorState::Error);
    assert_eq!(rig.ctrl.last_error(), Some(ErrorKind::OperationTimeout));
    assert!(!rig.relay.is_high());
}

#[test]
fn stop_before_timeout_disarms_failsafe() {
    let rig = Rig::closed();
    start_opening(&rig);

    rig.clock.set(29_999);
    assert_eq!(rig.ctrl.request_stop(), Ok(DoorState::Stopped));

    rig.advance(10_000);
    assert_eq!(rig.ctrl.state(), DoorState::Stopped);
    assert_eq!(rig.ctrl.last_error(), None);
}

#[test]
fn door_that_never_leaves_its_limit_is_obstructed() {
    let rig = Rig::closed();
    rig.ctrl.request_open().unwrap();
    rig.finish_pulse();

    rig.clock.set(2_999);
    rig.ctrl.service_timers();
    assert_eq!(rig.ctrl.state(), DoorState::Opening);

    rig.advance(1);
    assert_eq!(rig.ctrl.state(), DoorState::Error);
    assert_eq!(rig.ctrl.last_error(), Some(ErrorKind::Obstruction));
}

#[test]
fn reversal_to_origin_limit_is_obstruction() {
    let rig = Rig::closed();
    start_opening(&rig);

    rig.set_switch(SwitchId::ClosedLimit, SwitchState::Closed);
    assert_eq!(rig.ctrl.state(), DoorState::Error);
    assert_eq!(rig.ctrl.last_error(), Some(ErrorKind::Obstruction));
    assert_eq!(rig.ctrl.position(), DoorPosition::CLOSED);
}

#[test]
fn both_limits_while_moving_is_inconsistency() {
    let rig = Rig::closed();
    rig.ctrl.request_open().unwrap();
    rig.finish_pulse();

    rig.set_switch(SwitchId::OpenLimit, SwitchState::Open);
    assert_eq!(rig.ctrl.state(), DoorState::Error);
    assert_eq!(rig.ctrl.last_error(), Some(ErrorKind::SwitchInconsistency));
    assert_eq!(rig.ctrl.position(), DoorPosition::CLOSED, "position retained");
}

#[test]
fn error_rejects_movement_until_reset() {
    let rig = Rig::closed();
    rig.ctrl.request_open().unwrap();
    rig.finish_pulse();
    rig.set_switch(SwitchId::OpenLimit, SwitchState::Open);
    assert_eq!(rig.ctrl.state(), DoorState::Error);

    rig.advance(2_000);
    assert!(matches!(rig.ctrl.request_open(), Err(Error::InvalidTransition { .. })));
    assert!(matches!(rig.ctrl.request_close(), Err(Error::InvalidTransition { .. })));
    assert_eq!(rig.ctrl.request_stop(), Ok(DoorState::Error));

    // Still inconsistent: reset refused.
    assert_eq!(rig.ctrl.request_reset(), Err(Error::SwitchInconsistency));
    assert_eq!(rig.ctrl.state(), DoorState::Error);

    // Limit arrivals never leave ERROR on their own.
    rig.set_switch(SwitchId::ClosedLimit, SwitchState::Open);
    assert_eq!(rig.ctrl.state(), DoorState::Error);
    assert_eq!(rig.ctrl.position(), DoorPosition::OPEN);

    assert_eq!(rig.ctrl.request_reset(), Ok(DoorState::Open));
    assert_eq!(rig.ctrl.last_error(), None);
}

#[test]
fn reset_between_limits_enters_stopped() {
    let rig = Rig::closed();
    start_opening(&rig);
    rig.clock.set(30_000);
    rig.ctrl.service_timers();
    assert_eq!(rig.ctrl.state(), DoorState::Error);

    assert_eq!(rig.ctrl.request_reset(), Ok(DoorState::Stopped));
    assert_eq!(rig.ctrl.position(), DoorPosition::MIDPOINT);
}

// ── Boot and external motion ──────────────────────────────────

#[test]
fn boot_state_follows_switches() {
    let open = Rig::new(SwitchPair::AT_OPEN);
    assert_eq!(open.ctrl.state(), DoorState::Open);
    assert_eq!(open.ctrl.position(), DoorPosition::OPEN);

    let between = Rig::new(SwitchPair::BETWEEN);
    assert_eq!(between.ctrl.state(), DoorState::Stopped);
    assert_eq!(between.ctrl.position(), DoorPosition::MIDPOINT);

    let both = SwitchPair {
        closed_limit: SwitchState::Closed,
        open_limit: SwitchState::Open,
    };
    let broken = Rig::new(both);
    assert_eq!(broken.ctrl.state(), DoorState::Error);
    assert_eq!(broken.ctrl.last_error(), Some(ErrorKind::SwitchInconsistency));
}

#[test]
fn external_motion_syncs_resting_state() {
    let rig = Rig::closed();

    rig.set_switch(SwitchId::ClosedLimit, SwitchState::Open);
    assert_eq!(rig.ctrl.state(), DoorState::Closed);
    assert_eq!(rig.ctrl.position(), DoorPosition::MIDPOINT);

    rig.set_switch(SwitchId::OpenLimit, SwitchState::Open);
    assert_eq!(rig.ctrl.state(), DoorState::Open);
    assert_eq!(rig.ctrl.position(), DoorPosition::OPEN);
    assert_eq!(rig.relay.pulses(), 0);

    let notes = rig.listener.notes();
    assert_eq!(notes.len(), 2);
    assert!(notes[0].is_position_only());
    assert_eq!(notes[1].previous, DoorState::Closed);
    assert_eq!(notes[1].state, DoorState::Open);
}

// ── Debounce ──────────────────────────────────────────────────

#[test]
fn closing_travel_in_one_drain_arrives_cleanly() {
    let rig = Rig::new(SwitchPair::AT_OPEN);
    assert_eq!(rig.ctrl.request_close(), Ok(DoorState::Closing));
    rig.finish_pulse();

    // Both edges queued before the dispatcher runs: the open limit is left
    // 10ms before the closed limit is reached.
    rig.edge(SwitchId::OpenLimit, SwitchState::Closed);
    rig.clock.advance(10);
    rig.edge(SwitchId::ClosedLimit, SwitchState::Closed);
    rig.clock.advance(100);

    assert_eq!(rig.ctrl.process_edges(), 2);
    assert_eq!(rig.ctrl.state(), DoorState::Closed);
    assert_eq!(rig.ctrl.last_error(), None);
    assert_eq!(rig.ctrl.position(), DoorPosition::CLOSED);
    assert_eq!(rig.listener.states(), vec![DoorState::Closing, DoorState::Closed]);
}

#[test]
fn opening_travel_in_one_drain_arrives_cleanly() {
    let rig = Rig::closed();
    rig.ctrl.request_open().unwrap();
    rig.finish_pulse();

    rig.edge(SwitchId::ClosedLimit, SwitchState::Open);
    rig.clock.advance(10);
    rig.edge(SwitchId::OpenLimit, SwitchState::Open);
    rig.clock.advance(100);

    assert_eq!(rig.ctrl.process_edges(), 2);
    assert_eq!(rig.ctrl.state(), DoorState::Open);
    assert_eq!(rig.ctrl.last_error(), None);
}

#[test]
fn bouncing_switch_yields_one_change() {
    let rig = Rig::closed();
    rig.ctrl.request_open().unwrap();
    rig.finish_pulse();

    for i in 0..5 {
        let state = if i % 2 == 0 { SwitchState::Open } else { SwitchState::Closed };
        rig.edge(SwitchId::ClosedLimit, state);
        rig.clock.advance(5);
    }
    assert_eq!(rig.ctrl.process_edges(), 0, "still settling");
    assert_eq!(rig.ctrl.switches(), SwitchPair::AT_CLOSED);

    rig.clock.advance(DEBOUNCE_MS);
    assert_eq!(rig.ctrl.process_edges(), 1);
    assert_eq!(rig.ctrl.switches(), SwitchPair::BETWEEN);
    assert_eq!(rig.ctrl.state(), DoorState::Opening);
    assert!(rig.ctrl.metrics().switch_bounces >= 2);
}

#[test]
fn short_glitch_is_ignored() {
    let rig = Rig::closed();
    rig.edge(SwitchId::ClosedLimit, SwitchState::Open);
    rig.clock.advance(10);
    rig.edge(SwitchId::ClosedLimit, SwitchState::Closed);
    rig.clock.advance(DEBOUNCE_MS * 2);

    assert_eq!(rig.ctrl.process_edges(), 0);
    assert_eq!(rig.ctrl.position(), DoorPosition::CLOSED);
    assert!(rig.listener.notes().is_empty());
}

#[test]
fn queue_overflow_is_counted() {
    let rig = Rig::closed();
    let mut accepted = 0;
    for i in 0..40u64 {
        let level = i % 2 == 0;
        if rig.ctrl.on_raw_edge(SwitchId::OpenLimit, level, i) {
            accepted += 1;
        }
    }
    assert_eq!(accepted, 32);
    assert_eq!(rig.ctrl.metrics().dropped_edges, 8);
}

#[test]
fn dropped_final_edge_is_recovered_from_pin_levels() {
    let rig = Rig::closed();
    let pins = MockSwitches::new(SwitchPair::AT_CLOSED);
    rig.ctrl.register_switch_input(pins.clone());
    rig.ctrl.request_open().unwrap();
    rig.finish_pulse();

    // Bounce burst leaving the closed limit.  The queue fills on the last
    // Closed edge, so the final Open edge is lost.
    let t = rig.clock.now();
    let cap = EDGE_QUEUE_CAP as u64;
    for i in 0..=cap {
        let state = if i % 2 == 0 { SwitchState::Open } else { SwitchState::Closed };
        let level = SwitchId::ClosedLimit.level_for_state(state);
        assert_eq!(rig.ctrl.on_raw_edge(SwitchId::ClosedLimit, level, t + i / 4), i < cap);
    }
    pins.set(SwitchId::ClosedLimit, SwitchState::Open);

    rig.clock.advance(DEBOUNCE_MS);
    rig.ctrl.process_edges();
    rig.clock.advance(DEBOUNCE_MS);
    assert_eq!(rig.ctrl.process_edges(), 1);
    assert_eq!(rig.ctrl.switches(), SwitchPair::BETWEEN);

    // Departure was seen, so the obstruction grace window passes quietly.
    rig.advance(5_000);
    assert_eq!(rig.ctrl.state(), DoorState::Opening);
    assert_eq!(rig.ctrl.last_error(), None);
    assert_eq!(rig.ctrl.metrics().dropped_edges, 1);
}

#[test]
fn resync_picks_up_motion_the_isrs_missed() {
    let rig = Rig::closed();
    let pins = MockSwitches::new(SwitchPair::AT_CLOSED);
    rig.ctrl.register_switch_input(pins.clone());

    pins.set(SwitchId::ClosedLimit, SwitchState::Open);
    assert_eq!(rig.ctrl.process_edges(), 0, "levels only read on request");

    rig.ctrl.resync_switches();
    rig.ctrl.process_edges();
    rig.clock.advance(DEBOUNCE_MS);
    assert_eq!(rig.ctrl.process_edges(), 1);
    assert_eq!(rig.ctrl.switches(), SwitchPair::BETWEEN);
    assert_eq!(rig.ctrl.position(), DoorPosition::MIDPOINT);
}

// ── Listeners ─────────────────────────────────────────────────

#[test]
fn listeners_may_call_back_into_controller() {
    let rig = Rig::closed();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let weak = Arc::downgrade(&rig.ctrl);
    let sink = Arc::clone(&seen);
    rig.ctrl.register_state_listener(move |n: &DoorNotification| {
        if let Some(ctrl) = weak.upgrade() {
            // switches() takes the state lock: deadlocks if called under it.
            let _ = ctrl.switches();
            sink.lock().unwrap().push((n.state, ctrl.state(), ctrl.position()));
        }
    });

    start_opening(&rig);
    rig.set_switch(SwitchId::OpenLimit, SwitchState::Open);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    for (notified, observed, _) in seen.iter() {
        assert_eq!(notified, observed, "snapshot published before listeners run");
    }
    assert_eq!(seen[1].2, DoorPosition::OPEN);
}

#[test]
fn listener_can_issue_stop() {
    let rig = Rig::closed();
    let weak = Arc::downgrade(&rig.ctrl);
    rig.ctrl.register_state_listener(move |n: &DoorNotification| {
        if n.state == DoorState::Opening {
            if let Some(ctrl) = weak.upgrade() {
                assert_eq!(ctrl.request_stop(), Ok(DoorState::Stopped));
            }
        }
    });

    assert_eq!(rig.ctrl.request_open(), Ok(DoorState::Opening));
    assert_eq!(rig.ctrl.state(), DoorState::Stopped);
}

#[test]
fn fault_notification_carries_error() {
    let rig = Rig::closed();
    rig.ctrl.request_open().unwrap();
    rig.finish_pulse();
    rig.clock.set(3_000);
    rig.ctrl.service_timers();

    let faults: Vec<_> = rig.listener.notes().into_iter().filter(|n| n.error.is_some()).collect();
    assert_eq!(faults.len(), 1);
    assert_eq!(faults[0].error, Some(ErrorKind::Obstruction));
    assert_eq!(faults[0].state, DoorState::Error);
}

// ── Diagnostics ───────────────────────────────────────────────

#[test]
fn event_log_records_door_history() {
    let rig = Rig::closed();
    start_opening(&rig);
    rig.set_switch(SwitchId::OpenLimit, SwitchState::Open);

    let kinds: Vec<_> = rig.ctrl.recent_events().iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![
            EventKind::Boot,
            EventKind::CommandAccepted(DoorCommand::Open),
            EventKind::LimitReached(SwitchId::OpenLimit),
        ]
    );
    assert_eq!(rig.ctrl.recent_events().last().unwrap().state, DoorState::Open);
}

#[test]
fn metrics_count_activity() {
    let rig = Rig::closed();
    start_opening(&rig);
    rig.set_switch(SwitchId::OpenLimit, SwitchState::Open);

    let m = rig.ctrl.metrics();
    assert_eq!(m.relay_pulses, 1);
    assert_eq!(m.transitions, 2);
    assert_eq!(m.safety_trips, 0);
    assert_eq!(m.uptime_ms, rig.clock.now());
}

// ── Lifecycle ─────────────────────────────────────────────────

#[test]
fn commands_after_deinit_are_rejected() {
    let rig = Rig::closed();
    rig.ctrl.deinit();
    assert_eq!(
        rig.ctrl.request_open(),
        Err(Error::InvalidTransition {
            from: DoorState::Closed,
            command: DoorCommand::Open,
        })
    );
    assert_eq!(rig.relay.pulses(), 0);
}

#[test]
fn deinit_releases_relay_and_disarms() {
    let rig = Rig::closed();
    rig.ctrl.request_open().unwrap();
    assert!(rig.relay.is_high());

    rig.ctrl.deinit();
    assert!(!rig.relay.is_high());

    rig.advance(60_000);
    assert_eq!(rig.ctrl.last_error(), None, "failsafe disarmed");
}

#[test]
fn handle_dispatches_app_commands() {
    let rig = Rig::closed();
    assert_eq!(rig.ctrl.handle(DoorCommand::Open.into()), Ok(DoorState::Opening));
    assert_eq!(rig.ctrl.handle(AppCommand::Door(DoorCommand::Stop)), Ok(DoorState::Stopped));
    assert_eq!(rig.ctrl.handle(AppCommand::SetOperationTimeout(5_000)), Ok(DoorState::Stopped));
    assert_eq!(rig.ctrl.config().monitor.operation_timeout_ms, 5_000);
}

#[test]
fn shorter_timeout_applies_to_next_operation() {
    let rig = Rig::closed();
    rig.ctrl.set_operation_timeout(5_000).unwrap();
    start_opening(&rig);

    rig.clock.set(5_000);
    rig.ctrl.service_timers();
    assert_eq!(rig.ctrl.state(), DoorState::Error);
    assert_eq!(rig.ctrl.last_error(), Some(ErrorKind::OperationTimeout));
}

#[test]
fn obstruction_error_names_direction() {
    let rig = Rig::new(SwitchPair::AT_OPEN);
    rig.ctrl.request_close().unwrap();
    rig.finish_pulse();
    rig.set_switch(SwitchId::OpenLimit, SwitchState::Closed);
    rig.set_switch(SwitchId::OpenLimit, SwitchState::Open);

    assert_eq!(rig.ctrl.last_error(), Some(ErrorKind::Obstruction));
    let fault = rig
        .ctrl
        .recent_events()
        .into_iter()
        .find(|e| matches!(e.kind, EventKind::Fault(_)))
        .unwrap();
    assert_eq!(fault.kind, EventKind::Fault(ErrorKind::Obstruction));
    assert_eq!(
        Error::Obstruction {
            direction: Direction::Closing
        }
        .to_string(),
        "obstruction while Closing"
    );
}
