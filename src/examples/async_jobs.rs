//! Async Jobs Example
//!
//! Fires requests as server-side jobs and collects their results later.
//!
//! Run with: cargo run --example async_jobs

use std::time::Duration;

use arangokit_rs::{ArangoClient, Auth, ClientConfig, JobStatus, QueryOptions};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    arangokit_rs::telemetry::init_telemetry(false)?;

    let client = ArangoClient::new(ClientConfig::new("http://127.0.0.1:8529"))?;
    let db = client.db("_system", Auth::basic("root", ""), true).await?;

    let async_db = db.begin_async_execution(true);
    let query = async_db
        .aql()
        .execute("FOR i IN 1..100000 COLLECT WITH COUNT INTO n RETURN n", QueryOptions::default())
        .await?
        .async_job()?;
    println!("Started job {}", query.id());

    while query.status().await? == JobStatus::Pending {
        println!("  still pending...");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    println!("Result: {:?}", query.result().await?.result);

    // Fire and forget: no job handle comes back
    let fire_and_forget = db.begin_async_execution(false);
    let outcome = fire_and_forget.version().await?;
    println!("Fire-and-forget returned nothing: {}", outcome.is_empty());

    println!("Jobs done on the server: {:?}", db.async_jobs(JobStatus::Done, Some(10)).await?.value()?);
    db.clear_async_jobs(None).await?;

    Ok(())
}
