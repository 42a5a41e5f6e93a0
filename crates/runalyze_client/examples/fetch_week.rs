use chrono::{Duration, Local};
use runalyze_client::utils::monday_on_or_after;
use runalyze_client::{RunalyzeClient, config::Config, http_client::ReqwestRunalyzeClient};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Example: expects RUNALYZE_USERNAME and RUNALYZE_PASSWORD in env
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("config error: {}", e);
            return Ok(());
        }
    };
    let client = ReqwestRunalyzeClient::new(&cfg)?;
    let last_week = monday_on_or_after(Local::now().date_naive()) - Duration::days(7);
    let html = match client.fetch_week(last_week).await {
        Err(e) if e.is_login_redirect() => {
            client.login().await?;
            client.persist_session().await?;
            client.fetch_week(last_week).await?
        }
        other => other?,
    };
    println!("week of {}: {} bytes of HTML", last_week, html.len());
    Ok(())
}
