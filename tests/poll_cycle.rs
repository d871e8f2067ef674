use countertrail::config::CollectorFile;
use countertrail::logging::Logger;
use countertrail::metric::{MetricDefinition, MetricSpec, TargetBinding, NO_DATA_RETURNED};
use countertrail::poll::{BatchDispatcher, DispatchOptions, PollOrchestrator};
use countertrail::probe::StaticProber;
use countertrail::source::{FakeMetricSource, SourceError};
use countertrail::CounterCatalog;

use chrono::Utc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const COLLECTOR: &str = r#"{
    "catalog": {
        "238": "Memory", "6": "Available Bytes", "230": "Process", "6020": "% Processor Time",
        "2": "System", "10": "Processes"
    },
    "counters": {
        "memory": {
            "counter_id": "238-6", "set_type": "SingleInstance",
            "title": "Free memory", "unit": "MB",
            "conversion": {"factor": 1024, "exponent": 2, "mode": "Divide", "decimal_places": 2}
        },
        "cpu": {
            "counter_id": "230-6020", "set_type": "MultiInstance", "instance": "_Total",
            "title": "CPU", "unit": "%", "conversion": {"mode": "Identity", "decimal_places": 1}
        },
        "processes": {"counter_id": "2-10", "set_type": "SingleInstance", "title": "Processes"}
    },
    "environments": [{
        "name": "prod",
        "interval_secs": 2,
        "servers": [
            {"host": "web01", "counters": ["memory", "cpu", "processes"]},
            {"host": "db01", "counters": ["memory"]},
            {"host": "offline01", "counters": ["memory"]}
        ]
    }]
}"#;

fn orchestrator(source: Arc<FakeMetricSource>) -> PollOrchestrator {
    let dispatcher =
        BatchDispatcher::new(source, DispatchOptions::default(), Logger::new("dispatcher"));
    PollOrchestrator::new(Arc::new(dispatcher), Logger::new("orchestrator"))
}

#[tokio::test]
async fn full_environment_cycle() {
    let envs = CollectorFile::from_json(COLLECTOR)
        .unwrap()
        .build(&Logger::new("config"))
        .unwrap();
    let env = &envs[0];

    let prober = StaticProber::new(["web01", "db01"]);
    for target in env.targets() {
        target.refresh_availability(&prober).await;
    }

    // web01 answers for two of its three paths; db01 rejects the login
    let source = Arc::new(
        FakeMetricSource::new()
            .with_value("web01", "\\Memory\\Available Bytes", 2_097_152.0)
            .with_value("web01", "\\Process(_Total)\\% Processor Time", 12.345),
    );
    source.fail_host("db01", SourceError::Auth("logon failure".to_string()));

    let orch = orchestrator(source.clone());
    let poll = orch.poll_environment(env).await.unwrap();

    assert_eq!(poll.skipped, 1);
    assert_eq!(source.call_count(), 2);

    let web01 = &env.targets()[0];
    let memory = &web01.metrics()[0];
    let cpu = &web01.metrics()[1];
    let processes = &web01.metrics()[2];
    assert_eq!(memory.statistics().unwrap().current, 2.0);
    assert_eq!(cpu.statistics().unwrap().current, 12.3);
    assert_eq!(processes.last_error(), NO_DATA_RETURNED);
    assert_eq!(web01.statistics().total_counters, 3);
    assert_eq!(web01.statistics().available_counters, 3);

    let db01 = &env.targets()[1];
    assert!(!db01.metrics()[0].is_available());
    assert_eq!(db01.statistics().available_counters, 0);

    let stats = env.statistics();
    assert_eq!(stats.total_servers, 3);
    assert_eq!(stats.available_servers, 2);
    assert_eq!(stats.total_counters, 5);
    assert_eq!(stats.available_counters, 3);
    assert!(stats.last_query.is_some());

    // db01 recovers on the next cycle
    source.set_value("db01", "\\Memory\\Available Bytes", 1_048_576.0);
    orch.poll_environment(env).await.unwrap();
    assert!(db01.metrics()[0].is_available());
    assert_eq!(db01.metrics()[0].statistics().unwrap().current, 1.0);
    assert_eq!(memory.history_len(), 2);

    let snapshot = serde_json::to_value(env.snapshot(true)).unwrap();
    assert_eq!(snapshot["targets"][0]["metrics"][0]["title"], "Free memory (MB)");
    assert_eq!(snapshot["targets"][0]["metrics"][0]["graph"].as_array().unwrap().len(), 70);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_dispatches_over_disjoint_targets() {
    const TARGETS: usize = 32;
    const CYCLES: usize = 10;

    let catalog: CounterCatalog = [
        (238, "Memory"),
        (6, "Available Bytes"),
        (2, "System"),
        (10, "Processes"),
    ]
    .into_iter()
    .collect();
    let source = Arc::new(FakeMetricSource::new());
    let mut metrics = Vec::new();
    for i in 0..TARGETS {
        let host = format!("node{:03}", i);
        source.set_value(&host, "\\Memory\\Available Bytes", i as f64);
        source.set_value(&host, "\\System\\Processes", 100.0 + i as f64);
        for id in ["238-6", "2-10"] {
            let spec = MetricSpec::new(id, "SingleInstance", "", id);
            metrics.push(Arc::new(
                MetricDefinition::new(spec, TargetBinding::new(&host, None), &catalog).unwrap(),
            ));
        }
    }

    let dispatcher = Arc::new(BatchDispatcher::new(
        source.clone(),
        DispatchOptions::default(),
        Logger::new("dispatcher"),
    ));
    for _ in 0..CYCLES {
        dispatcher.dispatch(&metrics).await;
    }

    assert_eq!(source.call_count(), TARGETS * CYCLES);
    for metric in &metrics {
        assert_eq!(metric.history_len(), CYCLES);
        assert!(metric.last_error().is_empty());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writers_never_lose_points() {
    const TASKS: usize = 8;
    const POINTS: usize = 100;

    let catalog: CounterCatalog = [(238, "Memory"), (6, "Available Bytes")].into_iter().collect();
    let spec = MetricSpec::new("238-6", "SingleInstance", "", "shared")
        .with_history_capacity(TASKS * POINTS);
    let binding = TargetBinding::new("web01", None);
    let metric = Arc::new(MetricDefinition::new(spec, binding, &catalog).unwrap());
    let written = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..TASKS)
        .map(|task| {
            let metric = metric.clone();
            let written = written.clone();
            tokio::spawn(async move {
                for i in 0..POINTS {
                    metric.record_sample((task * POINTS + i) as f64, Utc::now()).unwrap();
                    written.fetch_add(1, Ordering::SeqCst);
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    let expected = written.load(Ordering::SeqCst);
    assert_eq!(expected, TASKS * POINTS);
    assert_eq!(metric.history_len(), expected);

    let mut values = metric
        .history_with_timestamps()
        .iter()
        .map(|p| p.value as usize)
        .collect::<Vec<_>>();
    values.sort_unstable();
    values.dedup();
    assert_eq!(values.len(), expected);
    assert_eq!(metric.statistics().unwrap().count, expected);
}
