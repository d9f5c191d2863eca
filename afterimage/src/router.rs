//! Per-service forwarding task with adaptive tuning
//!
//! Each router drains one service's outgoing channel. A message is forwarded
//! to its target (the display unless it names another) and, when it carries a
//! strength signal, escalates the service's tuning. A receive window with no
//! message relaxes the tuning instead. The router is the single writer of that
//! tuning; services only see `watch` snapshots.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bus::{ServiceRegistry, recv_timeout};
use crate::domain::{Message, ServiceId, TuningConfig, TuningEvent};

/// Default receive window before a router relaxes its tuning
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_secs(30);

/// Share of the tuning duration a router sleeps after forwarding
pub const DEFAULT_COOLDOWN_FACTOR: f64 = 0.9;

/// Counters a router returns when it stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStats {
    pub forwarded: u64,
    pub dropped: u64,
    pub timeouts: u64,
    pub escalations: u64,
}

/// Router settings shared by every router in a run
#[derive(Debug, Clone, Copy)]
pub struct RouterSettings {
    pub receive_timeout: Duration,
    pub cooldown_factor: f64,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            receive_timeout: DEFAULT_RECEIVE_TIMEOUT,
            cooldown_factor: DEFAULT_COOLDOWN_FACTOR,
        }
    }
}

/// Forwarding loop for one service
pub struct Router {
    service: ServiceId,
    outgoing: mpsc::Receiver<Message>,
    registry: Arc<ServiceRegistry>,
    tuning: Option<watch::Sender<TuningConfig>>,
    settings: RouterSettings,
    stats: RouterStats,
}

impl Router {
    pub fn new(
        service: ServiceId,
        outgoing: mpsc::Receiver<Message>,
        registry: Arc<ServiceRegistry>,
        settings: RouterSettings,
    ) -> Self {
        debug!(%service, ?settings, "Router::new: called");
        Self {
            service,
            outgoing,
            registry,
            tuning: None,
            settings,
            stats: RouterStats::default(),
        }
    }

    /// Make this router the writer of the service's tuning
    pub fn with_tuning(mut self, tuning: watch::Sender<TuningConfig>) -> Self {
        self.tuning = Some(tuning);
        self
    }

    pub fn service(&self) -> &ServiceId {
        &self.service
    }

    /// Run until `stop` fires
    pub async fn run(mut self, stop: CancellationToken) -> RouterStats {
        info!(service = %self.service, "Router started");

        loop {
            let received = tokio::select! {
                biased;
                _ = stop.cancelled() => {
                    debug!(service = %self.service, "Router::run: stop requested");
                    break;
                }
                received = recv_timeout(&mut self.outgoing, self.settings.receive_timeout) => received,
            };

            match received {
                Ok(Some(message)) => {
                    if let Some(cooldown) = self.handle(message) {
                        debug!(service = %self.service, ?cooldown, "Router::run: cooling down");
                        tokio::select! {
                            biased;
                            _ = stop.cancelled() => break,
                            _ = tokio::time::sleep(cooldown) => {}
                        }
                    }
                }
                Ok(None) => {
                    warn!(service = %self.service, "Service outgoing channel closed, router idling until stop");
                    self.idle_until_stopped(&stop).await;
                    break;
                }
                Err(e) if e.is_control_signal() => {
                    self.stats.timeouts += 1;
                    self.adjust(TuningEvent::Idle);
                }
                Err(e) => {
                    error!(service = %self.service, error = %e, "Router receive failed");
                }
            }
        }

        info!(service = %self.service, stats = ?self.stats, "Router stopped");
        self.stats
    }

    /// Relax once per receive window after the service has gone away
    async fn idle_until_stopped(&mut self, stop: &CancellationToken) {
        loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => return,
                _ = tokio::time::sleep(self.settings.receive_timeout) => {
                    self.stats.timeouts += 1;
                    self.adjust(TuningEvent::Idle);
                }
            }
        }
    }

    /// Forward one message; returns the cooldown to observe, if any
    fn handle(&mut self, message: Message) -> Option<Duration> {
        debug!(service = %self.service, kind = message.payload().kind(), "Router::handle: called");
        if let Err(e) = message.validate() {
            warn!(service = %self.service, error = %e, "Dropping invalid message");
            self.stats.dropped += 1;
            return None;
        }

        let drives_tuning = message.payload().is_strength_signal();
        let target = message.target().cloned().unwrap_or(ServiceId::DISPLAY);
        let forwarded = message.forward_to(target.clone());

        match self.registry.deliver(&target, forwarded) {
            Ok(()) => {
                self.stats.forwarded += 1;
                debug!(service = %self.service, %target, "Router::handle: forwarded");
            }
            Err(e) => {
                warn!(service = %self.service, %target, error = %e, "Dropping message");
                self.stats.dropped += 1;
            }
        }

        if !drives_tuning {
            return None;
        }
        self.adjust(TuningEvent::Delivered)?;
        let factor = self.settings.cooldown_factor;
        self.tuning.as_ref().and_then(|t| t.borrow().cooldown(factor))
    }

    fn adjust(&mut self, event: TuningEvent) -> Option<()> {
        let tuning = self.tuning.as_ref()?;
        tuning.send_modify(|t| t.apply(event));
        if event == TuningEvent::Delivered {
            self.stats.escalations += 1;
        }
        let t = tuning.borrow();
        debug!(
            service = %self.service,
            ?event,
            strength = t.strength,
            duration = t.duration,
            "Router::adjust: tuning updated"
        );
        Some(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DisplayStage, Payload, StrengthSignal};
    use serde_json::json;

    struct Harness {
        sensor_tx: mpsc::Sender<Message>,
        display_rx: mpsc::Receiver<Message>,
        led_rx: mpsc::Receiver<Message>,
        tuning_rx: watch::Receiver<TuningConfig>,
        stop: CancellationToken,
        task: tokio::task::JoinHandle<RouterStats>,
    }

    fn harness(tuning: TuningConfig, settings: RouterSettings) -> Harness {
        let (sensor_tx, sensor_rx) = mpsc::channel(16);
        let (display_tx, display_rx) = mpsc::channel(16);
        let (led_tx, led_rx) = mpsc::channel(16);
        let registry = Arc::new(
            ServiceRegistry::builder()
                .register(ServiceId::DISPLAY, display_tx)
                .register(ServiceId::LED, led_tx)
                .build(),
        );
        let (tuning_tx, tuning_rx) = watch::channel(tuning);
        let stop = CancellationToken::new();
        let router = Router::new(ServiceId::FACE_RECOGNITION, sensor_rx, registry, settings).with_tuning(tuning_tx);
        let task = tokio::spawn(router.run(stop.clone()));
        Harness {
            sensor_tx,
            display_rx,
            led_rx,
            tuning_rx,
            stop,
            task,
        }
    }

    fn reserved_face() -> TuningConfig {
        TuningConfig {
            strength: 10.0,
            strength_max: 100.0,
            strength_min: 0.0,
            strength_step: 4.0,
            duration: 4.0,
            duration_max: 10.0,
            duration_min: 1.0,
            duration_step: 1.0,
            stage: None,
            should_sleep_after_send: false,
        }
    }

    fn signal() -> Message {
        Message::new(
            ServiceId::FACE_RECOGNITION,
            Payload::Strength(StrengthSignal {
                duration: 4.0,
                strength: 10.0,
            }),
        )
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_forwards_to_display_and_escalates() {
        let mut h = harness(reserved_face(), RouterSettings::default());

        for _ in 0..5 {
            h.sensor_tx.send(signal().with_stage(DisplayStage::Blurry)).await.unwrap();
        }
        for _ in 0..5 {
            let forwarded = h.display_rx.recv().await.unwrap();
            assert_eq!(forwarded.origin(), &ServiceId::FACE_RECOGNITION);
            assert_eq!(forwarded.target(), Some(&ServiceId::DISPLAY));
            assert_eq!(forwarded.stage(), Some(DisplayStage::Blurry));
        }
        tokio::task::yield_now().await;

        assert_eq!(h.tuning_rx.borrow().strength, 30.0);
        assert_eq!(h.tuning_rx.borrow().duration, 9.0);

        h.stop.cancel();
        let stats = h.task.await.unwrap();
        assert_eq!(stats.forwarded, 5);
        assert_eq!(stats.escalations, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeouts_relax_to_min() {
        let settings = RouterSettings {
            receive_timeout: Duration::from_secs(30),
            ..Default::default()
        };
        let h = harness(reserved_face(), settings);

        tokio::time::sleep(Duration::from_secs(95)).await;
        assert_eq!(h.tuning_rx.borrow().strength, 0.0);
        assert_eq!(h.tuning_rx.borrow().duration, 1.0);

        h.stop.cancel();
        let stats = h.task.await.unwrap();
        assert_eq!(stats.timeouts, 3);
        assert_eq!(stats.forwarded, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_target_and_non_strength_payload() {
        let mut h = harness(reserved_face(), RouterSettings::default());

        let led = Message::new(ServiceId::ULTRASONIC, Payload::Data(json!({"distance": 20})))
            .unwrap()
            .with_target(ServiceId::LED);
        h.sensor_tx.send(led).await.unwrap();

        let received = h.led_rx.recv().await.unwrap();
        assert_eq!(received.origin(), &ServiceId::ULTRASONIC);
        assert!(h.display_rx.try_recv().is_err());
        assert_eq!(h.tuning_rx.borrow().strength, 10.0);

        h.stop.cancel();
        assert_eq!(h.task.await.unwrap().escalations, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_target_is_dropped_and_loop_continues() {
        let mut h = harness(reserved_face(), RouterSettings::default());

        let stray = signal().with_target(ServiceId::new("fog-machine").unwrap());
        h.sensor_tx.send(stray).await.unwrap();
        h.sensor_tx.send(signal()).await.unwrap();

        assert!(h.display_rx.recv().await.is_some());
        h.stop.cancel();
        let stats = h.task.await.unwrap();
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.forwarded, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_delays_next_message() {
        let tuning = TuningConfig {
            should_sleep_after_send: true,
            ..reserved_face()
        };
        let mut h = harness(tuning, RouterSettings::default());

        h.sensor_tx.send(signal()).await.unwrap();
        h.sensor_tx.send(signal()).await.unwrap();

        let start = tokio::time::Instant::now();
        h.display_rx.recv().await.unwrap();
        h.display_rx.recv().await.unwrap();

        // duration escalated to 5 after the first forward, cooldown 5 * 0.9
        assert!(start.elapsed() >= Duration::from_secs_f64(4.5));
        h.stop.cancel();
        h.task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_router_without_tuning_only_forwards() {
        let (tx, rx) = mpsc::channel(4);
        let (display_tx, mut display_rx) = mpsc::channel(4);
        let registry = Arc::new(ServiceRegistry::builder().register(ServiceId::DISPLAY, display_tx).build());
        let stop = CancellationToken::new();
        let task = tokio::spawn(Router::new(ServiceId::TOUCH, rx, registry, RouterSettings::default()).run(stop.clone()));

        tx.send(signal()).await.unwrap();
        assert!(display_rx.recv().await.is_some());

        stop.cancel();
        let stats = task.await.unwrap();
        assert_eq!(stats.forwarded, 1);
        assert_eq!(stats.escalations, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_service_channel_keeps_relaxing_until_stop() {
        let settings = RouterSettings {
            receive_timeout: Duration::from_secs(30),
            ..Default::default()
        };
        let h = harness(reserved_face(), settings);
        drop(h.sensor_tx);

        tokio::time::sleep(Duration::from_secs(95)).await;
        assert!(!h.task.is_finished());
        assert_eq!(h.tuning_rx.borrow().strength, 0.0);
        assert_eq!(h.tuning_rx.borrow().duration, 1.0);

        h.stop.cancel();
        let stats = h.task.await.unwrap();
        assert_eq!(stats.timeouts, 3);
    }
}
