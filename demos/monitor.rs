use smartlight_ac::{Config, SmartLightClient};
use std::env;

#[tokio::main]
async fn main() -> smartlight_ac::Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    let host = args.get(1).expect("usage: monitor <host> [--simulate] [--verbose]");
    let simulate = args.iter().any(|a| a == "--simulate");
    let verbose = args.iter().any(|a| a == "--verbose");

    let mut config = Config::new(host).with_verbose_logging(verbose);
    config.simulation = simulate;

    let client = SmartLightClient::builder(config)
        .on_event(|event| {
            println!("{event:?}");
        })
        .on_snapshot(|state| {
            println!(
                "{:.1}\u{00b0}C -> {:.1}\u{00b0}C | mode: {} | {:?} | humidity: {:.0}%{}",
                state.current_temperature,
                state.target_temperature,
                state.mode,
                state.current_state,
                state.humidity,
                match state.outdoor_temperature {
                    Some(t) => format!(" | outdoor: {t:.1}\u{00b0}C"),
                    None => String::new(),
                },
            );
        })
        .build()?;

    println!("Watching {host}... (Ctrl-C to stop)");
    if let Err(e) = tokio::signal::ctrl_c().await {
        eprintln!("signal error: {e}");
    }
    client.shutdown().await;
    Ok(())
}
