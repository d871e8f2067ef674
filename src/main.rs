//! countertrail - performance counter collector.

use countertrail::config::{CollectorConfig, CollectorFile};
use countertrail::logging::{self, LogConfig, Logger};
use countertrail::poll::{BatchDispatcher, PollOrchestrator};
use countertrail::probe::{ConnectivityProber, PingProber};
use countertrail::scheduler::Scheduler;
use countertrail::source::HttpMetricSource;
use countertrail::target::Target;
use countertrail::web::Server;

use std::collections::HashMap;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cfg = CollectorConfig::load();

    logging::init(&LogConfig {
        file: cfg.log_file.clone(),
        ..Default::default()
    })?;
    let logger = Logger::new("main");

    logger.info(&format!("Loading collector file {}", cfg.config_path.display()));
    let file = CollectorFile::load(&cfg.config_path)?;
    let environments = file.build(&Logger::new("config"))?;

    // Probe every distinct host once before the first cycle
    let prober = PingProber::new(cfg.probe_timeout, Logger::new("probe"));
    let mut by_host: HashMap<String, Vec<Arc<Target>>> = HashMap::new();
    for target in environments.iter().flat_map(|e| e.targets()) {
        by_host.entry(target.host().to_lowercase()).or_default().push(target.clone());
    }
    let mut probes = Vec::with_capacity(by_host.len());
    for (host, targets) in by_host {
        let prober = prober.clone();
        probes.push(tokio::spawn(async move {
            let reachable = prober.probe(&host).await;
            for target in &targets {
                target.set_reachable(reachable);
            }
            reachable
        }));
    }
    let mut reachable = 0;
    for probe in probes {
        if probe.await.unwrap_or(false) {
            reachable += 1;
        }
    }
    logger.info(&format!("{} host probes succeeded", reachable));

    let source = HttpMetricSource::new(
        &cfg.source_scheme,
        cfg.source_port,
        file.credentials.clone(),
    )?;
    let dispatcher = BatchDispatcher::new(
        Arc::new(source),
        cfg.dispatch_options(),
        Logger::new("dispatcher"),
    );
    let orchestrator = Arc::new(PollOrchestrator::new(
        Arc::new(dispatcher),
        Logger::new("orchestrator"),
    ));

    let scheduler = Scheduler::new(
        orchestrator,
        environments.clone(),
        cfg.poll_mode,
        Logger::new("scheduler"),
    );
    let _loops = scheduler.start();

    let server = Server::new(cfg.http_port, environments, Logger::new("web"));
    let result = server.start().await;

    scheduler.stop();
    result
}
