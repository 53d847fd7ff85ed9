use std::sync::{Arc, Mutex};
use std::time::Duration;

use smartlight_ac::{Config, Event, SmartLightClient};

/// Run with: SMARTLIGHT_HOST=192.168.1.40 cargo test --test integration -- --ignored
/// Requires a reachable unit running the ESPHome web server.
#[tokio::test]
#[ignore]
async fn discover_and_read_state() {
    let host = std::env::var("SMARTLIGHT_HOST").expect("SMARTLIGHT_HOST not set");
    let events: Arc<Mutex<Vec<Event>>> = Arc::new(Mutex::new(vec![]));
    let events_clone = events.clone();

    let client = SmartLightClient::builder(Config::new(host))
        .on_event(move |event| {
            events_clone.lock().unwrap().push(event.clone());
        })
        .build()
        .expect("build failed");

    let mut status = client.subscribe_status();
    tokio::time::timeout(
        Duration::from_secs(15),
        status.wait_for(|s| s.climate_entity_id.is_some()),
    )
    .await
    .expect("no climate state within 15s")
    .expect("engine stopped");

    let state = client.snapshot();
    assert!((16.0..=30.0).contains(&state.target_temperature));

    {
        let captured = events.lock().unwrap();
        assert!(captured.contains(&Event::StreamConnected));
    }

    client.shutdown().await;
}
