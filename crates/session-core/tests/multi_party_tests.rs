//! Calls with more than one opponent

mod common;

use std::time::Duration;

use common::*;
use pretty_assertions::assert_eq;
use vcall_session_core::prelude::*;
use vcall_session_core::SignalKind;

fn accept(session_id: &SessionId, from: &str, to: &str) -> SignalMessage {
    SignalMessage::accept(session_id, &pid(from), &pid(to), None)
}

fn hang_up(session_id: &SessionId, from: &str, to: &str) -> SignalMessage {
    SignalMessage::hang_up(session_id, &pid(from), &pid(to), None)
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_opponent_does_not_fail_active_call() {
    let timeout = Duration::from_secs(30);
    let alice = TestPeer::with_timeout("alice", timeout);
    let mut events = alice.engine.subscribe();

    let session_id = alice
        .engine
        .initiate(["bob", "carol"], MediaKind::AudioVideo, None)
        .await
        .unwrap();
    assert_eq!(alice.state(&session_id).await, Some(CallState::Connecting));

    let offers = alice.channel.sent_of_kind(SignalKind::Offer);
    assert_eq!(offers.len(), 2);
    assert!(offers.iter().all(|offer| offer.session_id == session_id));

    alice.engine.handle_inbound(accept(&session_id, "bob", "alice")).await.unwrap();
    assert_eq!(alice.state(&session_id).await, Some(CallState::Active));

    let connected = wait_for(&mut events, |e| matches!(e, SessionEvent::SessionConnected { .. })).await;
    assert_eq!(
        connected,
        SessionEvent::SessionConnected {
            session_id: session_id.clone(),
            participant_id: pid("bob"),
        }
    );

    tokio::time::sleep(timeout * 2).await;

    let session = alice.engine.session(&session_id).await.unwrap();
    assert_eq!(session.state(), CallState::Active);
    assert!(session.connected_participant_ids().contains(&pid("bob")));
    assert!(!session.connected_participant_ids().contains(&pid("carol")));
    assert_eq!(alice.engine.stats().await.timeouts, 0);
}

#[tokio::test]
async fn test_non_initiator_hang_up_keeps_call_active() {
    let alice = TestPeer::new("alice");
    let mut events = alice.engine.subscribe();

    let session_id = alice
        .engine
        .initiate(["bob", "carol"], MediaKind::AudioVideo, None)
        .await
        .unwrap();
    alice.engine.handle_inbound(accept(&session_id, "bob", "alice")).await.unwrap();
    alice.engine.handle_inbound(accept(&session_id, "carol", "alice")).await.unwrap();
    drain(&mut events);

    alice.engine.handle_inbound(hang_up(&session_id, "bob", "alice")).await.unwrap();
    let session = alice.engine.session(&session_id).await.unwrap();
    assert_eq!(session.state(), CallState::Active);
    assert_eq!(session.connected_participant_ids().len(), 1);
    assert!(session.connected_participant_ids().contains(&pid("carol")));
    assert_eq!(
        drain(&mut events),
        vec![SessionEvent::RemoteParticipantLeft {
            session_id: session_id.clone(),
            participant_id: pid("bob"),
        }]
    );

    // the last one leaving ends the call
    alice.engine.handle_inbound(hang_up(&session_id, "carol", "alice")).await.unwrap();
    assert!(alice.engine.session(&session_id).await.is_none());
    let reason = wait_for_closed(&mut events, &session_id).await;
    assert_eq!(reason, CloseReason::AllParticipantsLeft);
}

#[tokio::test]
async fn test_initiator_hang_up_closes_callee_exactly_once() {
    let bob = TestPeer::new("bob");
    let mut events = bob.engine.subscribe();
    let session_id = SessionId::from("group-1");

    bob.engine
        .handle_inbound(offer_from(&session_id, "alice", "bob", &["alice", "bob", "carol"]))
        .await
        .unwrap();
    bob.engine.accept(&session_id, None).await.unwrap();
    for peer in ["alice", "carol"] {
        bob.engine
            .report_connection_state(&session_id, &pid(peer), PeerConnectionState::Connected)
            .await
            .unwrap();
    }
    assert_eq!(bob.state(&session_id).await, Some(CallState::Active));

    bob.engine.handle_inbound(hang_up(&session_id, "alice", "bob")).await.unwrap();
    assert!(bob.engine.session(&session_id).await.is_none());

    // a straggling hang up from the other callee finds nothing
    let err = bob.engine.handle_inbound(hang_up(&session_id, "carol", "bob")).await.unwrap_err();
    assert_eq!(err, SessionError::UnknownSession { session_id: session_id.clone() });

    let seen = drain(&mut events);
    let closed: Vec<_> = seen
        .iter()
        .filter(|e| matches!(e, SessionEvent::SessionClosed { .. }))
        .collect();
    assert_eq!(closed.len(), 1);
    assert!(!seen.iter().any(|e| matches!(e, SessionEvent::RemoteParticipantLeft { .. })));
    assert_eq!(
        seen.last(),
        Some(&SessionEvent::SessionClosed {
            session_id,
            reason: CloseReason::HangUp { by: pid("alice") },
        })
    );
}

#[tokio::test]
async fn test_callee_hang_up_notifies_every_remaining_participant() {
    let bob = TestPeer::new("bob");
    let session_id = SessionId::from("group-2");

    bob.engine
        .handle_inbound(offer_from(&session_id, "alice", "bob", &["alice", "bob", "carol"]))
        .await
        .unwrap();
    bob.engine.accept(&session_id, None).await.unwrap();

    let accepts = bob.channel.sent_of_kind(SignalKind::Accept);
    assert_eq!(accepts.len(), 1);
    assert_eq!(accepts[0].recipient_id, pid("alice"));

    bob.engine.hang_up(&session_id, None).await.unwrap();
    let mut recipients: Vec<ParticipantId> = bob
        .channel
        .sent_of_kind(SignalKind::HangUp)
        .into_iter()
        .map(|m| m.recipient_id)
        .collect();
    recipients.sort();
    assert_eq!(recipients, vec![pid("alice"), pid("carol")]);
}

#[tokio::test]
async fn test_partial_reject_then_accept() {
    let alice = TestPeer::new("alice");
    let mut events = alice.engine.subscribe();

    let session_id = alice
        .engine
        .initiate(["bob", "carol"], MediaKind::AudioOnly, None)
        .await
        .unwrap();
    drain(&mut events);

    let reject = SignalMessage::reject(&session_id, &pid("bob"), &pid("alice"), None);
    alice.engine.handle_inbound(reject).await.unwrap();
    assert_eq!(alice.state(&session_id).await, Some(CallState::Connecting));
    assert_eq!(
        drain(&mut events),
        vec![SessionEvent::ParticipantRejected {
            session_id: session_id.clone(),
            participant_id: pid("bob"),
        }]
    );

    alice.engine.handle_inbound(accept(&session_id, "carol", "alice")).await.unwrap();
    assert_eq!(alice.state(&session_id).await, Some(CallState::Active));

    // bob already declined and cannot connect afterwards
    alice
        .engine
        .report_connection_state(&session_id, &pid("bob"), PeerConnectionState::Connected)
        .await
        .unwrap();
    let session = alice.engine.session(&session_id).await.unwrap();
    assert!(!session.connected_participant_ids().contains(&pid("bob")));

    // hanging up only addresses carol
    alice.channel.take_sent();
    alice.engine.hang_up(&session_id, None).await.unwrap();
    let hang_ups = alice.channel.sent_of_kind(SignalKind::HangUp);
    assert_eq!(hang_ups.len(), 1);
    assert_eq!(hang_ups[0].recipient_id, pid("carol"));
}

#[tokio::test]
async fn test_everyone_rejecting_rejects_the_call() {
    let alice = TestPeer::new("alice");
    let mut events = alice.engine.subscribe();

    let session_id = alice
        .engine
        .initiate(["bob", "carol"], MediaKind::AudioVideo, None)
        .await
        .unwrap();
    for from in ["bob", "carol"] {
        let reject = SignalMessage::reject(&session_id, &pid(from), &pid("alice"), None);
        alice.engine.handle_inbound(reject).await.unwrap();
    }

    assert!(alice.engine.session(&session_id).await.is_none());
    let reason = wait_for_closed(&mut events, &session_id).await;
    assert_eq!(reason, CloseReason::Rejected { by: pid("carol") });
    assert_eq!(
        alice.media.calls(),
        vec![
            MediaCall::Attach(session_id.clone(), MediaKind::AudioVideo),
            MediaCall::Detach(session_id),
        ]
    );
}

#[tokio::test]
async fn test_connection_failure_of_last_participant_ends_call() {
    let alice = TestPeer::new("alice");
    let mut events = alice.engine.subscribe();

    let session_id = alice
        .engine
        .initiate(["bob"], MediaKind::AudioVideo, None)
        .await
        .unwrap();
    alice.engine.handle_inbound(accept(&session_id, "bob", "alice")).await.unwrap();
    alice
        .engine
        .report_connection_state(&session_id, &pid("bob"), PeerConnectionState::Disconnected)
        .await
        .unwrap();
    assert_eq!(alice.state(&session_id).await, Some(CallState::Active));

    alice
        .engine
        .report_connection_state(&session_id, &pid("bob"), PeerConnectionState::Failed)
        .await
        .unwrap();
    assert!(alice.engine.session(&session_id).await.is_none());
    assert_eq!(wait_for_closed(&mut events, &session_id).await, CloseReason::AllParticipantsLeft);
}
