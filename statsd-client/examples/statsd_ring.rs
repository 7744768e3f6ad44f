use std::time::{Duration, Instant, SystemTime};

use statsd_client::{
    AlertType, DeliveryStrategy, Event, ServiceCheck, ServiceCheckStatus, StatsdClient,
};

fn main() {
    tracing_subscriber::fmt::init();

    let client = StatsdClient::builder()
        .with_remote_address("localhost:9125")
        .expect("failed to parse remote address")
        .with_prefix("example")
        .with_constant_tags(["service:ring-example"])
        .with_delivery_strategy(DeliveryStrategy::Ring)
        .with_ring_consumers(2)
        .with_shutdown_timeout(Duration::from_secs(5))
        .build()
        .expect("failed to build StatsD client");

    client.event(
        &Event::new("started", "ring example started")
            .with_date(SystemTime::now())
            .with_alert_type(AlertType::Info),
        &[],
    );

    let threads = (0..4)
        .map(|worker| {
            let client = client.clone();
            std::thread::spawn(move || {
                let tag = format!("worker:{worker}");
                for i in 0..100_000u64 {
                    let start = Instant::now();
                    client.increment("iterations", &[tag.as_str()]);
                    client.set("seen", &(i % 100).to_string(), &[tag.as_str()]);
                    client.time("iteration", start.elapsed().as_millis() as u64, &[tag.as_str()]);
                }
            })
        })
        .collect::<Vec<_>>();

    for thread in threads {
        let _ = thread.join();
    }

    let check = ServiceCheck::new("example.ring", ServiceCheckStatus::Ok).with_message("all workers done");
    client.service_check(&check);
    println!("{:?}", client.telemetry());
    client.close();
}
