mod support;

use pretty_assertions::assert_eq;
use run_engine::{LaunchError, RunState};
use stream_protocol::Channel;
use support::{start_request, Harness};

#[test]
fn detach_releases_every_channel() {
    let harness = Harness::new(1);
    harness.controller.start(start_request()).expect("start");
    assert_eq!(harness.bus.total_subscribers(), 4);

    assert!(harness.controller.detach(|| true));
    assert_eq!(harness.bus.total_subscribers(), 0);

    // Detached, not stopped.
    let session = harness.controller.session();
    assert_eq!(session.state(), RunState::Running);
    assert!(!session.is_attached());
    assert!(session.log().is_frozen());
}

#[test]
fn declined_detach_keeps_observing() {
    let harness = Harness::new(1);
    harness.controller.start(start_request()).expect("start");

    assert!(!harness.controller.detach(|| false));
    assert_eq!(harness.bus.total_subscribers(), 4);
    assert!(harness.controller.session().is_attached());
}

#[test]
fn restart_holds_exactly_one_set_of_channels() {
    let harness = Harness::new(1);
    for expected_run_id in 1..=3 {
        assert!(harness.controller.detach(|| true));
        let run_id = harness.controller.start(start_request()).expect("start");
        assert_eq!(run_id, expected_run_id);
        assert_eq!(harness.bus.total_subscribers(), 4);
        for channel in Channel::ALL {
            assert_eq!(harness.bus.subscriber_count(channel, run_id), 1);
        }
    }
}

#[test]
fn partial_subscription_failure_leaves_no_listeners() {
    let harness = Harness::new(6);
    harness.bus.fail_subscriptions_on(Channel::Complete);

    let error = harness
        .controller
        .start(start_request())
        .expect_err("subscribe fails");
    assert!(matches!(
        error,
        LaunchError::Subscribe {
            run_id: 6,
            channel: Channel::Complete,
            ..
        }
    ));
    assert_eq!(harness.bus.total_subscribers(), 0);

    let session = harness.controller.session();
    assert_eq!(session.state(), RunState::Failed);
    assert_eq!(session.run_id(), Some(6));
    assert_eq!(session.run().started_at(), None);
    assert!(!session.is_attached());
    assert!(session.error().is_some());
}

#[test]
fn failed_subscription_can_be_retried() {
    let harness = Harness::new(6);
    harness.bus.fail_subscriptions_on(Channel::Cancelled);
    harness
        .controller
        .start(start_request())
        .expect_err("subscribe fails");

    harness.bus.clear_subscription_failures();
    let run_id = harness.controller.start(start_request()).expect("retry");
    assert_eq!(run_id, 7);
    assert_eq!(harness.bus.total_subscribers(), 4);
    assert_eq!(harness.controller.session().error(), None);
}

#[test]
fn detached_run_elapsed_time_stays_put() {
    let harness = Harness::new(1);
    harness.controller.start(start_request()).expect("start");
    harness.advance_seconds(3);
    assert!(harness.controller.tick());
    assert!(harness.controller.detach(|| true));

    harness.advance_seconds(60);
    assert!(!harness.controller.tick());

    let session = harness.controller.session();
    assert_eq!(session.state(), RunState::Running);
    assert_eq!(session.elapsed_seconds(), 3);
}
