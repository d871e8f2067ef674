//! Scheduler module driving poll cycles on each environment's interval.

use crate::config::PollMode;
use crate::environment::Environment;
use crate::logging::Logger;
use crate::poll::PollOrchestrator;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Runs poll loops until stopped.
pub struct Scheduler {
    orchestrator: Arc<PollOrchestrator>,
    environments: Vec<Arc<Environment>>,
    mode: PollMode,
    stop_tx: broadcast::Sender<()>,
    logger: Logger,
}

impl Scheduler {
    pub fn new(
        orchestrator: Arc<PollOrchestrator>,
        environments: Vec<Arc<Environment>>,
        mode: PollMode,
        logger: Logger,
    ) -> Self {
        let (stop_tx, _) = broadcast::channel(1);
        Self {
            orchestrator,
            environments,
            mode,
            stop_tx,
            logger,
        }
    }

    /// Spawn the poll loops and return their handles.
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        self.logger.info(&format!(
            "Starting scheduler with {} environments ({:?})",
            self.environments.len(),
            self.mode
        ));

        match self.mode {
            PollMode::PerEnvironment => self
                .environments
                .iter()
                .map(|env| {
                    tokio::spawn(run_environment_loop(
                        self.orchestrator.clone(),
                        env.clone(),
                        self.stop_tx.subscribe(),
                        self.logger.clone(),
                    ))
                })
                .collect(),
            PollMode::Flat => {
                if self.environments.is_empty() {
                    return Vec::new();
                }
                vec![tokio::spawn(run_flat_loop(
                    self.orchestrator.clone(),
                    self.environments.clone(),
                    self.stop_tx.subscribe(),
                    self.logger.clone(),
                ))]
            }
        }
    }

    /// Signal every loop to exit after its current cycle.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(());
    }
}

fn tick_interval(period: Duration) -> tokio::time::Interval {
    let mut interval = tokio::time::interval(period.max(Duration::from_millis(1)));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    interval
}

async fn run_environment_loop(
    orchestrator: Arc<PollOrchestrator>,
    env: Arc<Environment>,
    mut stop_rx: broadcast::Receiver<()>,
    logger: Logger,
) {
    // Stagger environments that share a start time
    let jitter = rand::random::<u64>() % 100;
    tokio::time::sleep(Duration::from_millis(jitter)).await;

    let mut interval = tick_interval(env.interval());
    loop {
        tokio::select! {
            _ = stop_rx.recv() => break,
            _ = interval.tick() => {
                if let Err(e) = orchestrator.poll_environment(&env).await {
                    logger.error(&format!("Critical error in environment '{}': {}", env.name(), e));
                    break;
                }
            }
        }
    }

    logger.info(&format!("Stopped polling environment '{}'", env.name()));
}

async fn run_flat_loop(
    orchestrator: Arc<PollOrchestrator>,
    envs: Vec<Arc<Environment>>,
    mut stop_rx: broadcast::Receiver<()>,
    logger: Logger,
) {
    let period = envs.iter().map(|e| e.interval()).min().unwrap_or(Duration::from_secs(1));
    let mut interval = tick_interval(period);

    loop {
        tokio::select! {
            _ = stop_rx.recv() => break,
            _ = interval.tick() => {
                if let Err(e) = orchestrator.poll_environments_flat(&envs).await {
                    logger.error(&format!("Critical error in flat poll: {}", e));
                    break;
                }
            }
        }
    }

    logger.info("Stopped flat polling");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CounterCatalog;
    use crate::metric::{MetricDefinition, MetricSpec, TargetBinding};
    use crate::poll::{BatchDispatcher, DispatchOptions};
    use crate::source::FakeMetricSource;
    use crate::target::Target;

    fn setup(mode: PollMode) -> (Arc<FakeMetricSource>, Arc<Environment>, Scheduler) {
        let catalog: CounterCatalog =
            [(238, "Memory"), (6, "Available Bytes")].into_iter().collect();
        let spec = MetricSpec::new("238-6", "SingleInstance", "", "Free memory");
        let binding = TargetBinding::new("web01", None);
        let metric = MetricDefinition::new(spec, binding, &catalog).unwrap();
        let target = Arc::new(Target::new("web01", "", None, vec![Arc::new(metric)]));
        target.set_reachable(true);
        let interval = Duration::from_millis(20);
        let env = Arc::new(Environment::new("prod", "", interval, vec![target]));

        let source = Arc::new(
            FakeMetricSource::new().with_value("web01", "\\Memory\\Available Bytes", 1.0),
        );
        let dispatcher = BatchDispatcher::new(
            source.clone(),
            DispatchOptions::default(),
            Logger::new("dispatcher"),
        );
        let orchestrator = Arc::new(PollOrchestrator::new(
            Arc::new(dispatcher),
            Logger::new("orchestrator"),
        ));
        let scheduler =
            Scheduler::new(orchestrator, vec![env.clone()], mode, Logger::new("scheduler"));
        (source, env, scheduler)
    }

    #[tokio::test(start_paused = true)]
    async fn test_environment_loop_polls_until_stopped() {
        let (source, env, scheduler) = setup(PollMode::PerEnvironment);
        let handles = scheduler.start();
        assert_eq!(handles.len(), 1);

        tokio::time::sleep(Duration::from_millis(250)).await;
        scheduler.stop();
        for handle in handles {
            handle.await.unwrap();
        }

        let polls = source.call_count();
        assert!(polls >= 2, "expected repeated polls, got {}", polls);
        assert!(env.last_query().is_some());
        assert_eq!(env.targets()[0].metrics()[0].history_len(), polls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flat_loop() {
        let (source, env, scheduler) = setup(PollMode::Flat);
        let handles = scheduler.start();

        tokio::time::sleep(Duration::from_millis(150)).await;
        scheduler.stop();
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(source.call_count() >= 2);
        assert!(env.last_query().is_some());
    }
}
