//! Wiring, start-up and shutdown
//!
//! Start-up builds one channel pair per service, freezes the registry, spawns
//! every service task and one router per service. The render loop then runs
//! on the caller's task until the stop token fires. Shutdown cancels, joins
//! every task with a bound, then cleans up every service regardless of how
//! its task ended.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use eyre::Result;
use futures::future::join_all;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::actuators::{LedIndicator, VibrationMotor};
use crate::bus::{ChannelPair, ServiceRegistry};
use crate::config::{Config, Profile};
use crate::display::{DisplayService, DisplaySettings, Frame, ImageSource, RenderLoop, RenderStats, Surface};
use crate::domain::{ServiceId, TuningConfig};
use crate::error::ServiceError;
use crate::hardware::HardwareSet;
use crate::router::{Router, RouterSettings, RouterStats};
use crate::sensors::{FaceSensor, TouchSensor, UltrasonicSensor};
use crate::service::{DEFAULT_ERROR_BACKOFF, RunOutcome, Service, ServiceContext, ServiceHandle, spawn_service};

/// Services to run, each with optional adaptive tuning
pub struct ServiceSet {
    entries: Vec<(Box<dyn Service>, Option<TuningConfig>)>,
    frames: mpsc::Receiver<Frame>,
}

impl ServiceSet {
    /// Empty set fed by the display's frame channel
    pub fn new(frames: mpsc::Receiver<Frame>) -> Self {
        Self {
            entries: Vec::new(),
            frames,
        }
    }

    pub fn push(&mut self, service: Box<dyn Service>, tuning: Option<TuningConfig>) {
        debug!(service = %service.id(), adaptive = tuning.is_some(), "ServiceSet::push: called");
        self.entries.push((service, tuning));
    }

    pub fn ids(&self) -> Vec<ServiceId> {
        self.entries.iter().map(|(service, _)| service.id().clone()).collect()
    }

    /// The six services of the installation for `profile`
    pub fn installation(config: &Config, profile: &Profile, hardware: HardwareSet) -> Self {
        debug!(profile = %config.profile, "ServiceSet::installation: called");
        let (frames_tx, frames_rx) = mpsc::channel(config.display.frame_buffer.max(1));
        let poll = Duration::from_millis(config.sensors.poll_interval_ms);
        let threshold = config.sensors.ultrasonic_threshold.unwrap_or(profile.ultrasonic_threshold);

        let source = match &config.display.image_path {
            Some(path) => ImageSource::File(path.clone()),
            None => ImageSource::TestPattern {
                width: config.display.pattern_width,
                height: config.display.pattern_height,
            },
        };
        let display = DisplaySettings {
            source,
            tick_interval: Duration::from_millis(config.display.tick_interval_ms),
            level_step: profile.display_level_step,
            reinforcement_divisor: config.display.reinforcement_divisor,
            pulse_duration: Duration::from_millis(config.display.pulse_duration_ms),
        };

        let mut set = Self::new(frames_rx);
        set.push(
            Box::new(FaceSensor::new(hardware.faces, poll, profile.face.clone())),
            Some(profile.face.clone()),
        );
        set.push(
            Box::new(UltrasonicSensor::new(
                hardware.distance,
                threshold,
                poll,
                profile.ultrasonic.clone(),
            )),
            Some(profile.ultrasonic.clone()),
        );
        set.push(
            Box::new(TouchSensor::new(hardware.touch, profile.touch.clone())),
            Some(profile.touch.clone()),
        );
        set.push(Box::new(DisplayService::new(display, frames_tx)), None);
        set.push(Box::new(VibrationMotor::new(hardware.motor)), None);
        set.push(Box::new(LedIndicator::new(hardware.led)), None);
        set
    }
}

/// Timing knobs for the orchestrator
#[derive(Debug, Clone, Copy)]
pub struct OrchestratorSettings {
    pub router: RouterSettings,
    pub channel_capacity: usize,
    pub join_timeout: Duration,
    pub error_backoff: Duration,
}

impl OrchestratorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            router: RouterSettings {
                receive_timeout: config.router.receive_timeout(),
                cooldown_factor: config.router.cooldown_factor,
            },
            channel_capacity: config.channels.buffer_size,
            join_timeout: Duration::from_millis(config.shutdown.join_timeout_ms),
            error_backoff: DEFAULT_ERROR_BACKOFF,
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// What happened during shutdown
#[derive(Debug, Default)]
pub struct ShutdownReport {
    /// Services and routers that missed the join timeout
    pub timed_out: Vec<String>,
    /// Services whose setup failed
    pub startup_failures: Vec<ServiceId>,
    /// Services stopped by a fatal error
    pub failed: Vec<ServiceId>,
    /// Cleanup errors, one per failing service
    pub cleanup_errors: Vec<(ServiceId, String)>,
    /// Final counters of each router
    pub routers: Vec<(ServiceId, RouterStats)>,
    /// Render loop counters, if it ran
    pub render: Option<RenderStats>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.timed_out.is_empty()
            && self.startup_failures.is_empty()
            && self.failed.is_empty()
            && self.cleanup_errors.is_empty()
    }
}

/// Owns every running task
pub struct Orchestrator {
    settings: OrchestratorSettings,
    stop: CancellationToken,
    registry: Arc<ServiceRegistry>,
    services: Vec<ServiceHandle>,
    routers: Vec<(ServiceId, JoinHandle<RouterStats>)>,
    tunings: Vec<(ServiceId, watch::Receiver<TuningConfig>)>,
    render: RenderLoop,
    render_stats: Option<RenderStats>,
}

impl Orchestrator {
    /// Wire and spawn everything in `set`
    pub fn start(set: ServiceSet, settings: OrchestratorSettings) -> Result<Self> {
        info!(services = set.entries.len(), "Starting orchestrator");
        let stop = CancellationToken::new();

        let mut builder = ServiceRegistry::builder();
        let mut seen = HashSet::new();
        let mut wired = Vec::with_capacity(set.entries.len());
        for (service, tuning) in set.entries {
            let id = service.id().clone();
            if !seen.insert(id.clone()) {
                return Err(eyre::eyre!("Service {} is listed twice", id));
            }
            let pair = ChannelPair::new(settings.channel_capacity);
            builder = builder.register(id, pair.incoming_tx.clone());
            wired.push((service, tuning, pair));
        }
        let registry = Arc::new(builder.build());

        let mut services = Vec::with_capacity(wired.len());
        let mut routers = Vec::with_capacity(wired.len());
        let mut tunings = Vec::new();
        for (service, tuning, pair) in wired {
            let id = service.id().clone();
            let ChannelPair {
                incoming_rx,
                outgoing_tx,
                outgoing_rx,
                ..
            } = pair;

            let mut ctx = ServiceContext::new(id.clone(), incoming_rx, outgoing_tx);
            let mut router = Router::new(id.clone(), outgoing_rx, registry.clone(), settings.router);
            if let Some(tuning) = tuning {
                let (tx, rx) = watch::channel(tuning);
                ctx = ctx.with_tuning(rx.clone());
                router = router.with_tuning(tx);
                tunings.push((id.clone(), rx));
            }

            services.push(spawn_service(service, ctx, stop.child_token(), settings.error_backoff));
            routers.push((id, tokio::spawn(router.run(stop.child_token()))));
        }

        info!(services = services.len(), routers = routers.len(), "All services started");
        Ok(Self {
            settings,
            stop,
            registry,
            services,
            routers,
            tunings,
            render: RenderLoop::new(set.frames),
            render_stats: None,
        })
    }

    /// Token that stops everything when cancelled
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    /// Current tuning of an adaptive service
    pub fn tuning(&self, id: &ServiceId) -> Option<TuningConfig> {
        self.tunings
            .iter()
            .find(|(service, _)| service == id)
            .map(|(_, rx)| rx.borrow().clone())
    }

    /// Run the render loop on this task until stopped
    pub async fn run_until_stopped(&mut self, surface: &mut dyn Surface) -> RenderStats {
        debug!("Orchestrator::run_until_stopped: called");
        let stats = self.render.run(surface, &self.stop).await;
        self.render_stats = Some(stats);
        stats
    }

    /// Stop every task, then clean up every service
    pub async fn shutdown(mut self) -> ShutdownReport {
        info!("Shutting down");
        self.stop.cancel();
        let timeout = self.settings.join_timeout;
        let mut report = ShutdownReport {
            render: self.render_stats,
            ..Default::default()
        };

        let joins = self.routers.drain(..).map(|(id, mut task)| async move {
            let joined = tokio::time::timeout(timeout, &mut task).await;
            if joined.is_err() {
                task.abort();
            }
            (id, joined)
        });
        for (id, joined) in join_all(joins).await {
            match joined {
                Ok(Ok(stats)) => report.routers.push((id, stats)),
                Ok(Err(e)) => warn!(service = %id, error = %e, "Router task panicked"),
                Err(_) => {
                    let err = ServiceError::ShutdownTimeout {
                        service: format!("{} router", id),
                        timeout,
                    };
                    warn!(error = %err, "Router did not stop in time");
                    report.timed_out.push(format!("{} router", id));
                }
            }
        }

        let joins = self.services.iter_mut().map(|handle| async move {
            let joined = handle.join(timeout).await;
            (handle.id().clone(), joined)
        });
        for (id, joined) in join_all(joins).await {
            match joined {
                Ok(RunOutcome::Stopped) => {}
                Ok(RunOutcome::StartupFailed(_)) => report.startup_failures.push(id),
                Ok(RunOutcome::Failed(_)) => report.failed.push(id),
                Err(e) => {
                    warn!(error = %e, "Service did not stop in time");
                    report.timed_out.push(id.to_string());
                }
            }
        }

        for handle in &self.services {
            if let Err(e) = handle.cleanup().await {
                warn!(service = %handle.id(), error = %e, "Cleanup failed");
                report.cleanup_errors.push((handle.id().clone(), e.to_string()));
            }
        }

        info!(clean = report.is_clean(), "Shutdown complete");
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::HeadlessSurface;
    use crate::error::ServiceResult;
    use async_trait::async_trait;

    struct Broken {
        id: ServiceId,
    }

    impl Broken {
        fn new() -> Self {
            Self::with_id(ServiceId::LED)
        }

        fn with_id(id: ServiceId) -> Self {
            Self { id }
        }
    }

    #[async_trait]
    impl Service for Broken {
        fn id(&self) -> &ServiceId {
            &self.id
        }

        async fn setup(&mut self) -> ServiceResult<()> {
            Err(ServiceError::Device("led driver missing".to_string()))
        }

        async fn step(&mut self, _ctx: &mut ServiceContext) -> ServiceResult<()> {
            Ok(())
        }

        async fn cleanup(&mut self) -> ServiceResult<()> {
            Err(ServiceError::Device("led driver missing".to_string()))
        }
    }

    /// Setup that never finishes
    struct Stuck {
        id: ServiceId,
    }

    impl Stuck {
        fn with_id(id: ServiceId) -> Self {
            Self { id }
        }
    }

    #[async_trait]
    impl Service for Stuck {
        fn id(&self) -> &ServiceId {
            &self.id
        }

        async fn setup(&mut self) -> ServiceResult<()> {
            std::future::pending().await
        }

        async fn step(&mut self, _ctx: &mut ServiceContext) -> ServiceResult<()> {
            Ok(())
        }
    }

    fn test_config() -> Config {
        let mut config = Config::default();
        config.display.pattern_width = 16;
        config.display.pattern_height = 12;
        config
    }

    #[tokio::test(start_paused = true)]
    async fn test_installation_runs_and_shuts_down_cleanly() {
        let config = test_config();
        let profile = config.profile("reserved").unwrap();
        let set = ServiceSet::installation(&config, &profile, HardwareSet::simulated(11));
        assert_eq!(set.ids().len(), 6);

        let mut orchestrator = Orchestrator::start(set, OrchestratorSettings::from_config(&config)).unwrap();
        assert_eq!(orchestrator.registry().len(), 6);
        assert!(orchestrator.tuning(&ServiceId::TOUCH).is_some());
        assert!(orchestrator.tuning(&ServiceId::DISPLAY).is_none());

        let stop = orchestrator.stop_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            stop.cancel();
        });

        let mut surface = HeadlessSurface::new();
        let stats = orchestrator.run_until_stopped(&mut surface).await;
        assert!(stats.presented > 0);

        let report = orchestrator.shutdown().await;
        assert!(report.is_clean(), "{:?}", report);
        assert_eq!(report.routers.len(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_service_does_not_stop_others() {
        let (_frames_tx, frames_rx) = mpsc::channel(1);
        let mut set = ServiceSet::new(frames_rx);
        set.push(Box::new(Broken::new()), None);
        set.push(
            Box::new(VibrationMotor::new(Box::new(crate::hardware::SimulatedPwm::new("motor")))),
            None,
        );

        let orchestrator = Orchestrator::start(set, OrchestratorSettings::default()).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let report = orchestrator.shutdown().await;
        assert_eq!(report.startup_failures, vec![ServiceId::LED]);
        assert!(report.failed.is_empty());
        assert_eq!(report.cleanup_errors.len(), 1);
        assert!(report.timed_out.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_router_of_failed_service_relaxes_until_stop() {
        let (_frames_tx, frames_rx) = mpsc::channel(1);
        let mut set = ServiceSet::new(frames_rx);
        set.push(
            Box::new(Broken::with_id(ServiceId::FACE_RECOGNITION)),
            Some(Profile::reserved().face),
        );
        let settings = OrchestratorSettings {
            router: RouterSettings {
                receive_timeout: Duration::from_secs(30),
                cooldown_factor: 0.9,
            },
            ..Default::default()
        };

        let orchestrator = Orchestrator::start(set, settings).unwrap();
        tokio::time::sleep(Duration::from_secs(95)).await;

        let tuning = orchestrator.tuning(&ServiceId::FACE_RECOGNITION).unwrap();
        assert_eq!(tuning.strength, 0.0);
        assert_eq!(tuning.duration, 1.0);

        let report = orchestrator.shutdown().await;
        assert_eq!(report.startup_failures, vec![ServiceId::FACE_RECOGNITION]);
        assert_eq!(report.routers.len(), 1);
        assert_eq!(report.routers[0].1.timeouts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_services_share_one_join_timeout() {
        let (_frames_tx, frames_rx) = mpsc::channel(1);
        let mut set = ServiceSet::new(frames_rx);
        set.push(Box::new(Stuck::with_id(ServiceId::LED)), None);
        set.push(Box::new(Stuck::with_id(ServiceId::VIBRATION_MOTOR)), None);
        set.push(Box::new(Stuck::with_id(ServiceId::TOUCH)), None);
        let settings = OrchestratorSettings {
            join_timeout: Duration::from_secs(5),
            ..Default::default()
        };

        let orchestrator = Orchestrator::start(set, settings).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let start = tokio::time::Instant::now();
        let report = orchestrator.shutdown().await;
        assert!(start.elapsed() < Duration::from_secs(10));
        assert_eq!(report.timed_out.len(), 3);
    }

    #[tokio::test]
    async fn test_duplicate_service_rejected() {
        let (_frames_tx, frames_rx) = mpsc::channel(1);
        let mut set = ServiceSet::new(frames_rx);
        set.push(Box::new(Broken::new()), None);
        set.push(Box::new(Broken::new()), None);
        assert!(Orchestrator::start(set, OrchestratorSettings::default()).is_err());
    }
}
