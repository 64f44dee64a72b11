use subscriber_janitor::config::get_configuration;
use subscriber_janitor::startup::Application;
use subscriber_janitor::telemetry::{get_subscriber, init_subscriber};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = get_subscriber(String::from("subscriber_janitor"), String::from("info"));

    init_subscriber(subscriber);

    let config = get_configuration()?;
    let application = Application::build(config).await?;

    match std::env::args().nth(1).as_deref() {
        Some("deactivate") => application.deactivate().await,
        Some("uninstall") => application.uninstall().await,
        _ => application.run_until_stopped().await?,
    }

    Ok(())
}
