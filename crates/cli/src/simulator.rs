//! Call scenarios played out between engines sharing one in-memory hub

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use vcall_session_core::prelude::*;

/// How the callees respond to the offer
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Scenario {
    /// Everyone accepts and the caller hangs up after the call duration
    Accept,
    /// Everyone declines
    Reject,
    /// Nobody answers and the answer timer fires
    NoAnswer,
    /// The first callee accepts, then leaves early
    EarlyLeave,
}

/// Outcome of one simulated call, as seen by the caller
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub session_id: SessionId,
    pub connected: Vec<ParticipantId>,
    pub left: Vec<ParticipantId>,
    pub reason: CloseReason,
    pub stats: EngineStats,
}

pub struct Simulation {
    hub: MemorySignalHub,
    caller: SignalingEngine,
    callees: Vec<SignalingEngine>,
}

impl Simulation {
    pub async fn new(caller: EngineConfig, callees: &[ParticipantId]) -> Result<Self> {
        let hub = MemorySignalHub::new();

        let caller_id = caller.local_participant.clone();
        let caller = Self::engine(&hub, caller)?;
        caller.start().await?;

        let mut engines = Vec::with_capacity(callees.len());
        for callee in callees {
            if *callee == caller_id {
                bail!("{} cannot call itself", callee);
            }
            let config = EngineConfig {
                local_participant: callee.clone(),
                ..caller.config().clone()
            };
            let engine = Self::engine(&hub, config)?;
            engine.start().await?;
            engines.push(engine);
        }

        Ok(Self { hub, caller, callees: engines })
    }

    fn engine(hub: &MemorySignalHub, config: EngineConfig) -> Result<SignalingEngine> {
        let channel = Arc::new(hub.connect(config.local_participant.clone()));
        SignalingEngine::builder()
            .with_config(config)
            .with_channel(channel)
            .build()
            .context("failed to build engine")
    }

    pub async fn run(
        &self,
        scenario: Scenario,
        media_kind: MediaKind,
        call_duration: Duration,
        user_info: Option<UserInfo>,
    ) -> Result<Report> {
        let responders: Vec<JoinHandle<()>> = self
            .callees
            .iter()
            .enumerate()
            .map(|(index, engine)| spawn_responder(engine.clone(), scenario, index == 0, call_duration))
            .collect();

        let mut events = self.caller.subscribe();
        let opponents: Vec<ParticipantId> = self.callees.iter().map(|e| e.local_participant().clone()).collect();
        let session_id = self.caller.initiate(opponents, media_kind, user_info).await?;
        info!("Calling with session {}", session_id);

        let mut connected = Vec::new();
        let mut left = Vec::new();
        let mut hang_up_at = None;

        let reason = loop {
            let event = match hang_up_at {
                Some(deadline) => match tokio::time::timeout_at(deadline, events.receive()).await {
                    Ok(event) => event?,
                    Err(_) => {
                        info!("Call duration elapsed, hanging up");
                        self.caller.hang_up(&session_id, None).await?;
                        hang_up_at = None;
                        continue;
                    }
                },
                None => events.receive().await?,
            };
            if event.session_id() != &session_id {
                continue;
            }

            match event {
                SessionEvent::SessionConnected { participant_id, .. } => {
                    info!("{} connected", participant_id);
                    self.caller
                        .report_remote_track(&session_id, &participant_id, TrackKind::Audio)
                        .await?;
                    if media_kind == MediaKind::AudioVideo {
                        self.caller
                            .report_remote_track(&session_id, &participant_id, TrackKind::Video)
                            .await?;
                    }
                    connected.push(participant_id);
                    if hang_up_at.is_none() && scenario != Scenario::EarlyLeave {
                        hang_up_at = Some(tokio::time::Instant::now() + call_duration);
                    }
                }
                SessionEvent::RemoteTrackAvailable { participant_id, track, .. } => {
                    info!("Rendering {:?} from {}", track, participant_id);
                }
                SessionEvent::ParticipantRejected { participant_id, .. } => info!("{} declined", participant_id),
                SessionEvent::RemoteParticipantLeft { participant_id, .. } => {
                    info!("{} left the call", participant_id);
                    left.push(participant_id);
                }
                SessionEvent::SessionClosed { reason, .. } => break reason,
                other => info!("{}", other.name()),
            }
        };

        for responder in responders {
            if let Err(e) = responder.await {
                warn!("Responder task failed: {}", e);
            }
        }

        Ok(Report {
            session_id,
            connected,
            left,
            reason,
            stats: self.caller.stats().await,
        })
    }

    pub async fn shutdown(&self) -> Result<()> {
        for engine in std::iter::once(&self.caller).chain(self.callees.iter()) {
            engine.shutdown().await?;
            self.hub.disconnect(engine.local_participant());
        }
        Ok(())
    }
}

/// Play the callee side of `scenario` until the call closes
fn spawn_responder(engine: SignalingEngine, scenario: Scenario, first: bool, call_duration: Duration) -> JoinHandle<()> {
    let mut events = engine.subscribe();
    tokio::spawn(async move {
        let mut initiators: HashMap<SessionId, ParticipantId> = HashMap::new();
        loop {
            let event = match events.receive().await {
                Ok(event) => event,
                Err(e) => {
                    warn!("{} stopped listening: {}", engine.local_participant(), e);
                    return;
                }
            };

            let result = match event {
                SessionEvent::IncomingCall { session_id, initiator_id, .. } => {
                    initiators.insert(session_id.clone(), initiator_id);
                    match scenario {
                        Scenario::Accept | Scenario::EarlyLeave => engine.accept(&session_id, None).await,
                        Scenario::Reject => {
                            let reason: UserInfo = [("reason".to_string(), "declined".to_string())].into_iter().collect();
                            engine.reject(&session_id, Some(reason)).await
                        }
                        Scenario::NoAnswer => Ok(()),
                    }
                }
                SessionEvent::CallAccepted { session_id, .. } => {
                    // the local media engine comes up towards the caller
                    match initiators.get(&session_id) {
                        Some(initiator) => {
                            engine
                                .report_connection_state(&session_id, initiator, PeerConnectionState::Connected)
                                .await
                        }
                        None => Ok(()),
                    }
                }
                SessionEvent::SessionConnected { session_id, .. } if first && scenario == Scenario::EarlyLeave => {
                    tokio::time::sleep(call_duration / 2).await;
                    engine.hang_up(&session_id, None).await
                }
                SessionEvent::SessionClosed { reason, .. } => {
                    info!("{} closed: {:?}", engine.local_participant(), reason);
                    return;
                }
                _ => Ok(()),
            };

            if let Err(e) = result {
                warn!("{} could not respond: {}", engine.local_participant(), e);
            }
        }
    })
}
