use std::sync::Arc;

use apollo_client::Fallback;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> apollo_client::Result<()> {
    tracing_subscriber::fmt::init();

    let addr = std::env::var("APOLLO_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
    let client = Arc::new(
        apollo_client::builder()
            .app_id("SampleApp")
            .addr(&addr)
            .namespaces("application,mysql.json")
            .backup_dir("./backup")
            .default_value("application", "timeout", 30)
            .build()?,
    );

    // falls back to ./backup when the server is down
    client.init().await?;

    client.on_change(|event| {
        for change in &event.changes {
            println!(
                "{} {:?} {}: {:?} -> {:?}",
                event.namespace,
                change.change_type(),
                change.key(),
                change.old_value(),
                change.new_value()
            );
        }
        Ok(())
    });

    let shutdown = CancellationToken::new();
    let handle = client.start(shutdown.clone());

    let timeout = client
        .reader("application")
        .get_int("timeout")
        .unwrap_or_else(Fallback::into_value);
    println!("timeout = {}", timeout);
    println!("mysql.json host = {:?}", client.reader("mysql.json").get_string("host"));

    if tokio::signal::ctrl_c().await.is_err() {
        eprintln!("could not listen for Ctrl-C");
    }
    shutdown.cancel();
    if let Some(handle) = handle {
        let _ = handle.await;
    }
    Ok(())
}
