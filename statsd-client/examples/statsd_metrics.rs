use metrics::{counter, gauge, histogram};
use statsd_client::{AddressResolution, StatsdClient, StatsdError};

fn main() {
    tracing_subscriber::fmt::init();

    let client = StatsdClient::builder()
        .with_remote_address("localhost:9125")
        .expect("failed to parse remote address")
        .with_prefix("example")
        .with_address_resolution(AddressResolution::scheduled())
        .with_error_handler(|e: StatsdError| eprintln!("statsd error: {e}"))
        .install()
        .expect("failed to install StatsD recorder");

    counter!("idle_metric").increment(1);
    gauge!("testing").set(42.0);

    let server_loops = counter!("tcp_server_loops", "system" => "foo");
    let server_loops_delta_secs = histogram!("tcp_server_loop_delta_secs", "system" => "foo");

    // Pretend to do some work for a while.
    for _ in 0..1_000_000 {
        server_loops.increment(1);
        server_loops_delta_secs.record(rand::random::<f64>());

        let gauge = gauge!("lucky_iterations");
        if rand::random::<f64>() < 0.75 {
            gauge.increment(1.0);
        } else {
            gauge.decrement(1.0);
        }
    }

    println!("{:?}", client.telemetry());
    client.close();
}
