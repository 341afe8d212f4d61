//! Session manager — the single serialization point of the relay
//!
//! One manager runs per device. Commands from the caller, delegate events
//! from the transport, and timer ticks all funnel into one task that owns
//! the queue, the pending-reply map, the health tracker, and the state
//! machine. Externally observable state is published through a watch
//! channel; nothing else leaks out.

use crate::config::RelayConfig;
use crate::message::{
    decode_frame, encode_frame, RelayFrame, TranslationRequest, TranslationResponse,
};
use crate::session::correlator::{Correlator, PendingReply};
use crate::session::health::{ConnectionQuality, HealthTracker};
use crate::session::queue::{MessageQueue, QueuedMessage};
use crate::session::state::{ConnectionState, ReconnectBackoff};
use crate::transport::{PeerTransport, TransportError, TransportEvent};
use crate::RelayError;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

/// The phone-side bridge to the remote translation backend.
///
/// An endpoint constructed with a handler answers translation requests and
/// credits queries; an endpoint without one (the watch) is a pure
/// requester. Both roles answer health probes and language syncs.
#[async_trait]
pub trait TranslationHandler: Send + Sync {
    /// Run one translation request to completion
    async fn translate(&self, request: TranslationRequest) -> TranslationResponse;

    /// Current remaining usage budget
    async fn credits_remaining(&self) -> u32;
}

/// Externally observable relay state, published through a watch channel
#[derive(Debug, Clone, Serialize)]
pub struct LinkStatus {
    pub state: ConnectionState,
    pub reachable: bool,
    pub quality: ConnectionQuality,
    pub credits: Option<u32>,
    pub source_language: String,
    pub target_language: String,
    pub queued_messages: usize,
    pub last_response: Option<TranslationResponse>,
}

enum Command {
    Activate,
    SendTranslation {
        request: TranslationRequest,
        reply: oneshot::Sender<Result<TranslationResponse, RelayError>>,
    },
    RequestCredits {
        reply: Option<oneshot::Sender<Result<u32, RelayError>>>,
    },
    SyncLanguages {
        source: String,
        target: String,
        reply: Option<oneshot::Sender<Result<(), RelayError>>>,
    },
    ForceReconnect,
    ClearQueue,
    Shutdown,
}

/// Cloneable handle onto a running relay session
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<LinkStatus>,
}

impl SessionHandle {
    /// Request session activation; progress is visible via `status`
    pub async fn activate(&self) -> Result<(), RelayError> {
        self.commands
            .send(Command::Activate)
            .await
            .map_err(|_| RelayError::Shutdown)
    }

    /// Submit a translation request and wait for its terminal outcome.
    ///
    /// Submission never blocks on the round trip; the returned future
    /// resolves when the correlator delivers the response or a terminal
    /// failure (timeout, retries exhausted, queue cleared).
    pub async fn send_translation_request(
        &self,
        request: TranslationRequest,
    ) -> Result<TranslationResponse, RelayError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::SendTranslation { request, reply: tx })
            .await
            .map_err(|_| RelayError::Shutdown)?;
        rx.await.map_err(|_| RelayError::Shutdown)?
    }

    /// Ask the peer for the current credits figure and wait for it
    pub async fn request_credits_update(&self) -> Result<u32, RelayError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::RequestCredits { reply: Some(tx) })
            .await
            .map_err(|_| RelayError::Shutdown)?;
        rx.await.map_err(|_| RelayError::Shutdown)?
    }

    /// Fire-and-forget credits refresh; the result lands in `status`
    pub fn refresh_credits(&self) {
        let _ = self
            .commands
            .try_send(Command::RequestCredits { reply: None });
    }

    /// Replicate a new language pair to the peer and wait for the ack
    pub async fn sync_languages(
        &self,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Result<(), RelayError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::SyncLanguages {
                source: source.into(),
                target: target.into(),
                reply: Some(tx),
            })
            .await
            .map_err(|_| RelayError::Shutdown)?;
        rx.await.map_err(|_| RelayError::Shutdown)?
    }

    /// Tear the session down and rebuild it, starting from the backoff floor
    pub fn force_reconnection(&self) {
        let _ = self.commands.try_send(Command::ForceReconnect);
    }

    /// Drop every queued message, failing their completions
    pub fn clear_message_queue(&self) {
        let _ = self.commands.try_send(Command::ClearQueue);
    }

    /// Observe connection state, quality, credits, and queue depth
    pub fn status(&self) -> watch::Receiver<LinkStatus> {
        self.status.clone()
    }

    /// Stop the session task; pending completions fail with `Shutdown`
    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown).await;
    }
}

/// The relay session actor. Constructed explicitly and handed its
/// transport — never a process-wide singleton — so tests can run fresh
/// instances side by side.
pub struct SessionManager {
    config: RelayConfig,
    transport: Arc<dyn PeerTransport>,
    handler: Option<Arc<dyn TranslationHandler>>,
    queue: MessageQueue,
    correlator: Correlator,
    health: HealthTracker,
    backoff: ReconnectBackoff,
    state: ConnectionState,
    reachable: bool,
    credits: Option<u32>,
    source_language: String,
    target_language: String,
    last_response: Option<TranslationResponse>,
    reconnect_at: Option<Instant>,
    status_tx: watch::Sender<LinkStatus>,
}

impl SessionManager {
    /// Start a relay session over the given transport and return its handle
    pub fn spawn(
        transport: Arc<dyn PeerTransport>,
        events: mpsc::Receiver<TransportEvent>,
        config: RelayConfig,
        handler: Option<Arc<dyn TranslationHandler>>,
    ) -> SessionHandle {
        let (command_tx, command_rx) = mpsc::channel(32);

        let reachable = transport.is_reachable();
        let initial = LinkStatus {
            state: ConnectionState::Disconnected,
            reachable,
            quality: ConnectionQuality::Unknown,
            credits: None,
            source_language: config.default_source_language.clone(),
            target_language: config.default_target_language.clone(),
            queued_messages: 0,
            last_response: None,
        };
        let (status_tx, status_rx) = watch::channel(initial);

        let manager = SessionManager {
            queue: MessageQueue::new(config.queue_capacity),
            correlator: Correlator::new(),
            health: HealthTracker::new(config.latency_window, config.quality_thresholds.clone()),
            backoff: ReconnectBackoff::new(config.reconnect_floor, config.reconnect_ceiling),
            state: ConnectionState::Disconnected,
            reachable,
            credits: None,
            source_language: config.default_source_language.clone(),
            target_language: config.default_target_language.clone(),
            last_response: None,
            reconnect_at: None,
            status_tx,
            transport,
            handler,
            config,
        };

        tokio::spawn(manager.run(command_rx, events));

        SessionHandle {
            commands: command_tx,
            status: status_rx,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut events: mpsc::Receiver<TransportEvent>,
    ) {
        let mut drain_tick = time::interval(self.config.drain_tick);
        let mut sweep_tick = time::interval(self.config.sweep_interval);
        let mut health_tick = time::interval(self.config.health_interval);

        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(cmd) => {
                        if !self.handle_command(cmd).await {
                            break;
                        }
                    }
                    None => break,
                },
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => {
                        warn!("transport event channel closed");
                        break;
                    }
                },
                _ = drain_tick.tick() => self.tick().await,
                _ = sweep_tick.tick() => self.check_timeouts(),
                _ = health_tick.tick() => self.run_health_check().await,
            }
        }

        self.finish();
    }

    // ------------------------------------------------------------------------
    // COMMANDS
    // ------------------------------------------------------------------------

    async fn handle_command(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::Activate => {
                match self.state {
                    ConnectionState::Disconnected | ConnectionState::Error(_) => {
                        self.attempt_activation().await;
                    }
                    _ => debug!("activation requested while {}", self.state),
                }
            }
            Command::SendTranslation { request, reply } => {
                let id = request.id.clone();
                self.correlator.register(
                    id.as_str(),
                    PendingReply::Translation(reply),
                    Instant::now(),
                );
                self.enqueue_and_drain(RelayFrame::TranslationRequest(request))
                    .await;
                debug!("translation request {} submitted", id);
            }
            Command::RequestCredits { reply } => {
                let id = uuid::Uuid::new_v4().to_string();
                if let Some(tx) = reply {
                    self.correlator
                        .register(id.as_str(), PendingReply::Credits(tx), Instant::now());
                }
                self.enqueue_and_drain(RelayFrame::CreditsQuery { id }).await;
            }
            Command::SyncLanguages {
                source,
                target,
                reply,
            } => {
                self.source_language = source.clone();
                self.target_language = target.clone();
                let id = uuid::Uuid::new_v4().to_string();
                if let Some(tx) = reply {
                    self.correlator
                        .register(id.as_str(), PendingReply::Ack(tx), Instant::now());
                }
                self.enqueue_and_drain(RelayFrame::LanguageSync {
                    id,
                    source_language: source,
                    target_language: target,
                })
                .await;
            }
            Command::ForceReconnect => {
                info!("forced reconnection requested");
                self.backoff.reset();
                self.state = ConnectionState::Reconnecting;
                self.reconnect_at = Some(Instant::now() + self.backoff.next_delay());
                self.publish();
            }
            Command::ClearQueue => {
                let dropped = self.queue.drain_all();
                info!("clearing message queue ({} messages)", dropped.len());
                for msg in dropped {
                    self.correlator.fail(&msg.id, RelayError::QueueCleared);
                }
                self.publish();
            }
            Command::Shutdown => return false,
        }
        true
    }

    // ------------------------------------------------------------------------
    // TRANSPORT EVENTS
    // ------------------------------------------------------------------------

    async fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::ActivationCompleted { error: None } => {
                if !self.state.is_connected() {
                    self.on_connected().await;
                }
            }
            TransportEvent::ActivationCompleted { error: Some(reason) } => {
                warn!("session activation failed: {}", reason);
                self.state = ConnectionState::Error(reason);
                self.publish();
                self.schedule_reconnect();
            }
            TransportEvent::ReachabilityChanged(reachable) => {
                self.reachable = reachable;
                if reachable {
                    if self.state.is_connected() {
                        self.drain().await;
                    } else {
                        self.on_connected().await;
                    }
                } else if self.state.is_connected() {
                    info!("peer became unreachable");
                    self.state = ConnectionState::Disconnected;
                    self.health.reset();
                    self.schedule_reconnect();
                }
                self.publish();
            }
            TransportEvent::FrameReceived(bytes) => match decode_frame(&bytes) {
                Ok(frame) => self.handle_frame(frame).await,
                Err(e) => warn!("dropping undecodable frame: {}", e),
            },
            TransportEvent::FileReceived { data, metadata } => {
                debug!(
                    "file transfer received ({} bytes, kind {:?})",
                    data.len(),
                    metadata.get("kind").and_then(|v| v.as_str())
                );
                match decode_frame(&data) {
                    Ok(frame) => self.handle_frame(frame).await,
                    Err(e) => warn!("dropping undecodable file transfer: {}", e),
                }
            }
            TransportEvent::NetworkPathChanged { online: true } => {
                // The network being back does not make the peer session
                // usable by itself; kick an activation to bridge the two.
                if !self.state.is_connected() {
                    info!("network path restored, attempting reconnection");
                    self.reconnect_at = None;
                    self.attempt_activation().await;
                }
            }
            TransportEvent::NetworkPathChanged { online: false } => {
                debug!("network path lost");
            }
        }
    }

    async fn handle_frame(&mut self, frame: RelayFrame) {
        match frame {
            RelayFrame::TranslationRequest(request) => {
                self.answer_translation(request);
            }
            RelayFrame::TranslationResponse(response) => {
                let id = response.request_id.clone();
                let outcome = match response.error.clone() {
                    Some(e) => Err(RelayError::Peer(e)),
                    None => Ok(response.clone()),
                };
                // Only an authoritative (first) response touches published
                // state; late duplicates are discarded wholesale.
                if self.correlator.resolve_translation(&id, outcome) {
                    self.credits = Some(response.credits_remaining);
                    self.last_response = Some(response);
                    self.publish();
                }
            }
            RelayFrame::CreditsQuery { id } => {
                self.answer_credits_query(id);
            }
            RelayFrame::CreditsUpdate { id, credits } => {
                self.credits = Some(credits);
                self.correlator.resolve_credits(&id, credits);
                self.publish();
            }
            RelayFrame::LanguageSync {
                id,
                source_language,
                target_language,
            } => {
                info!(
                    "language pair set to {} → {}",
                    source_language, target_language
                );
                self.source_language = source_language;
                self.target_language = target_language;
                self.publish();
                self.send_reply(RelayFrame::LanguageAck { id }).await;
            }
            RelayFrame::LanguageAck { id } => {
                self.correlator.resolve_ack(&id);
            }
            RelayFrame::HealthProbe { id, sent_at_ms } => {
                self.send_reply(RelayFrame::HealthProbeReply { id, sent_at_ms })
                    .await;
            }
            RelayFrame::HealthProbeReply { id, sent_at_ms } => {
                let rtt_ms = unix_millis().saturating_sub(sent_at_ms);
                let rtt = std::time::Duration::from_millis(rtt_ms);
                if self.health.record_reply(&id, rtt).is_some() {
                    debug!("health probe rtt {}ms, quality {}", rtt_ms, self.health.quality());
                }
                self.publish();
            }
        }
    }

    /// Hand an incoming translation request to the backend handler, if this
    /// endpoint has one, and ship the response back off-loop.
    fn answer_translation(&self, request: TranslationRequest) {
        let handler = match &self.handler {
            Some(handler) => Arc::clone(handler),
            None => {
                debug!("no translation handler, ignoring request {}", request.id);
                return;
            }
        };
        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            let response = handler.translate(request).await;
            match encode_frame(&RelayFrame::TranslationResponse(response)) {
                Ok(bytes) => {
                    if let Err(e) = transport.send_frame(bytes).await {
                        warn!("failed to send translation response: {}", e);
                    }
                }
                Err(e) => warn!("failed to encode translation response: {}", e),
            }
        });
    }

    fn answer_credits_query(&self, id: String) {
        let handler = match &self.handler {
            Some(handler) => Arc::clone(handler),
            None => {
                debug!("no credits authority here, ignoring query {}", id);
                return;
            }
        };
        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            let credits = handler.credits_remaining().await;
            match encode_frame(&RelayFrame::CreditsUpdate { id, credits }) {
                Ok(bytes) => {
                    if let Err(e) = transport.send_frame(bytes).await {
                        warn!("failed to send credits update: {}", e);
                    }
                }
                Err(e) => warn!("failed to encode credits update: {}", e),
            }
        });
    }

    /// Best-effort direct send for replies; replies are never queued
    async fn send_reply(&self, frame: RelayFrame) {
        match encode_frame(&frame) {
            Ok(bytes) => {
                if let Err(e) = self.transport.send_frame(bytes).await {
                    debug!("reply send failed: {}", e);
                }
            }
            Err(e) => warn!("failed to encode reply: {}", e),
        }
    }

    // ------------------------------------------------------------------------
    // QUEUE & RETRY
    // ------------------------------------------------------------------------

    async fn enqueue_and_drain(&mut self, frame: RelayFrame) {
        let now = Instant::now();
        let msg = QueuedMessage::new(frame, self.config.max_retries, now);
        let kind = msg.kind;
        match self.queue.enqueue(msg) {
            Ok(()) => debug!("{} message queued ({} waiting)", kind, self.queue.len()),
            Err(rejected) => {
                warn!("queue full, dropping {} message {}", kind, rejected.id);
                self.correlator.fail(&rejected.id, RelayError::QueueFull);
            }
        }
        self.publish();
        if self.reachable {
            self.drain().await;
        }
    }

    async fn drain(&mut self) {
        if !self.reachable {
            return;
        }
        let batch = self
            .queue
            .take_ready(Instant::now(), self.config.drain_batch);
        if batch.is_empty() {
            return;
        }
        for msg in batch {
            match self.dispatch(&msg).await {
                Ok(()) => debug!("dispatched {} message {}", msg.kind, msg.id),
                Err(e) => self.on_dispatch_failure(msg, e),
            }
        }
        self.publish();
    }

    async fn dispatch(&self, msg: &QueuedMessage) -> Result<(), TransportError> {
        let bytes =
            encode_frame(&msg.frame).map_err(|e| TransportError::SendFailed(e.to_string()))?;

        // File-referenced recordings ride the transfer lane with metadata;
        // everything else uses the message channel.
        if let RelayFrame::TranslationRequest(request) = &msg.frame {
            if request.audio.is_file_ref() {
                let mut metadata = HashMap::new();
                metadata.insert(
                    "kind".to_string(),
                    serde_json::Value::String("translation-request".to_string()),
                );
                metadata.insert(
                    "request_id".to_string(),
                    serde_json::Value::String(msg.id.clone()),
                );
                return self.transport.transfer_file(bytes, metadata).await;
            }
        }
        self.transport.send_frame(bytes).await
    }

    fn on_dispatch_failure(&mut self, msg: QueuedMessage, error: TransportError) {
        debug!(
            "dispatch attempt {} for {} failed: {}",
            msg.retry_count + 1,
            msg.id,
            error
        );
        if let Err(spent) =
            self.queue
                .requeue_for_retry(msg, self.config.retry_base_delay, Instant::now())
        {
            let attempts = spent.retry_count + 1;
            warn!(
                "{} message {} failed permanently after {} attempts",
                spent.kind, spent.id, attempts
            );
            self.correlator
                .fail(&spent.id, RelayError::RetriesExhausted(attempts));
        }
    }

    fn check_timeouts(&mut self) {
        let now = Instant::now();
        let timeout = self.config.message_timeout;

        for msg in self.queue.remove_expired(now, timeout) {
            warn!("{} message {} timed out in queue", msg.kind, msg.id);
            self.correlator.fail(&msg.id, RelayError::Timeout);
        }
        for id in self.correlator.expired_ids(now, timeout) {
            warn!("request {} timed out awaiting reply", id);
            self.queue.remove(&id);
            self.correlator.fail(&id, RelayError::Timeout);
        }
        self.publish();
    }

    // ------------------------------------------------------------------------
    // CONNECTION LIFECYCLE
    // ------------------------------------------------------------------------

    async fn tick(&mut self) {
        if let Some(at) = self.reconnect_at {
            if Instant::now() >= at {
                self.reconnect_at = None;
                self.attempt_activation().await;
            }
        }
        if self.reachable && !self.queue.is_empty() {
            self.drain().await;
        }
    }

    async fn attempt_activation(&mut self) {
        info!("activating peer session");
        self.state = ConnectionState::Connecting;
        self.publish();
        if let Err(e) = self.transport.activate().await {
            warn!("activation request failed: {}", e);
            self.state = ConnectionState::Error(e.to_string());
            self.publish();
            self.schedule_reconnect();
        }
    }

    async fn on_connected(&mut self) {
        info!("peer session connected");
        self.state = ConnectionState::Connected;
        self.backoff.reset();
        self.reconnect_at = None;
        self.publish();
        self.drain().await;
        self.resync().await;
    }

    /// Pull credits and push the active language pair after (re)connecting.
    /// Only the requester side resyncs; the handler side is the authority.
    async fn resync(&mut self) {
        if self.handler.is_some() || !self.config.resync_on_connect {
            return;
        }
        let credits_id = uuid::Uuid::new_v4().to_string();
        self.enqueue_and_drain(RelayFrame::CreditsQuery { id: credits_id })
            .await;
        let sync_id = uuid::Uuid::new_v4().to_string();
        self.enqueue_and_drain(RelayFrame::LanguageSync {
            id: sync_id,
            source_language: self.source_language.clone(),
            target_language: self.target_language.clone(),
        })
        .await;
    }

    fn schedule_reconnect(&mut self) {
        let delay = self.backoff.next_delay();
        info!(
            "reconnect attempt {} in {:?}",
            self.backoff.attempt(),
            delay
        );
        self.state = ConnectionState::Reconnecting;
        self.reconnect_at = Some(Instant::now() + delay);
        self.publish();
    }

    async fn run_health_check(&mut self) {
        if !self.state.is_connected() {
            return;
        }
        let id = uuid::Uuid::new_v4().to_string();
        if self.health.begin_probe(id.clone()) {
            self.on_probe_missed();
            if !self.state.is_connected() {
                return;
            }
        }
        let frame = RelayFrame::HealthProbe {
            id,
            sent_at_ms: unix_millis(),
        };
        match encode_frame(&frame) {
            Ok(bytes) => {
                if let Err(e) = self.transport.send_frame(bytes).await {
                    debug!("health probe send failed: {}", e);
                    self.on_probe_missed();
                }
            }
            Err(e) => warn!("failed to encode health probe: {}", e),
        }
        self.publish();
    }

    /// A probe went unanswered or could not be sent. Never fabricate a
    /// latency sample; re-evaluate whether the peer is really there.
    fn on_probe_missed(&mut self) {
        if self.state.is_connected() && !self.transport.is_reachable() {
            info!("peer lost between health checks, reconnecting");
            self.reachable = false;
            self.state = ConnectionState::Disconnected;
            self.health.reset();
            self.schedule_reconnect();
        }
    }

    // ------------------------------------------------------------------------
    // SHUTDOWN & PUBLISHING
    // ------------------------------------------------------------------------

    fn finish(&mut self) {
        info!("relay session shutting down");
        for msg in self.queue.drain_all() {
            self.correlator.fail(&msg.id, RelayError::Shutdown);
        }
        self.correlator.fail_all(RelayError::Shutdown);
        self.publish();
    }

    fn publish(&self) {
        self.status_tx.send_replace(LinkStatus {
            state: self.state.clone(),
            reachable: self.reachable,
            quality: self.health.quality(),
            credits: self.credits,
            source_language: self.source_language.clone(),
            target_language: self.target_language.clone(),
            queued_messages: self.queue.len(),
            last_response: self.last_response.clone(),
        });
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::AudioPayload;
    use crate::transport::LoopbackLink;

    fn fast_config() -> RelayConfig {
        RelayConfig::fast()
    }

    struct Phrasebook;

    #[async_trait]
    impl TranslationHandler for Phrasebook {
        async fn translate(&self, request: TranslationRequest) -> TranslationResponse {
            TranslationResponse::success(request.id.clone(), "hello", "hola", None, 7)
        }

        async fn credits_remaining(&self) -> u32 {
            7
        }
    }

    #[tokio::test]
    async fn test_activate_reaches_connected() {
        let (link, watch_peer, _phone_peer) = LoopbackLink::pair();
        let handle = SessionManager::spawn(
            watch_peer.transport,
            watch_peer.events,
            fast_config(),
            None,
        );

        link.set_reachable(true);
        handle.activate().await.unwrap();

        let mut status = handle.status();
        status
            .wait_for(|s| s.state.is_connected())
            .await
            .unwrap();

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_clear_queue_fails_pending_completion() {
        let (_link, watch_peer, _phone_peer) = LoopbackLink::pair();
        // Link stays unreachable: the request parks in the queue.
        let handle = SessionManager::spawn(
            watch_peer.transport,
            watch_peer.events,
            fast_config(),
            None,
        );

        let request = TranslationRequest::new("en", "es", AudioPayload::Inline(vec![1]));
        let sender = handle.clone();
        let pending =
            tokio::spawn(async move { sender.send_translation_request(request).await });

        let mut status = handle.status();
        status.wait_for(|s| s.queued_messages == 1).await.unwrap();

        handle.clear_message_queue();
        let outcome = pending.await.unwrap();
        assert_eq!(outcome.unwrap_err(), RelayError::QueueCleared);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_fails_inflight_requests() {
        let (_link, watch_peer, _phone_peer) = LoopbackLink::pair();
        let handle = SessionManager::spawn(
            watch_peer.transport,
            watch_peer.events,
            fast_config(),
            None,
        );

        let request = TranslationRequest::new("en", "es", AudioPayload::Inline(vec![1]));
        let sender = handle.clone();
        let pending =
            tokio::spawn(async move { sender.send_translation_request(request).await });

        let mut status = handle.status();
        status.wait_for(|s| s.queued_messages == 1).await.unwrap();

        handle.shutdown().await;
        assert_eq!(pending.await.unwrap().unwrap_err(), RelayError::Shutdown);
    }

    #[tokio::test]
    async fn test_handler_side_answers_translation() {
        let (link, watch_peer, phone_peer) = LoopbackLink::pair();

        let phone = SessionManager::spawn(
            phone_peer.transport,
            phone_peer.events,
            fast_config(),
            Some(Arc::new(Phrasebook)),
        );
        let watch = SessionManager::spawn(
            watch_peer.transport,
            watch_peer.events,
            fast_config(),
            None,
        );

        link.set_reachable(true);
        watch.activate().await.unwrap();
        phone.activate().await.unwrap();

        let request = TranslationRequest::new("en", "es", AudioPayload::Inline(vec![1, 2]));
        let response = watch.send_translation_request(request).await.unwrap();
        assert_eq!(response.translated_text, "hola");
        assert_eq!(response.credits_remaining, 7);

        watch.shutdown().await;
        phone.shutdown().await;
    }
}
