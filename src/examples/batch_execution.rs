//! Batch Execution Example
//!
//! Queues several operations locally and sends them in one request.
//!
//! Run with: cargo run --example batch_execution

use arangokit_rs::{ArangoClient, Auth, ClientConfig, InsertOptions};
use serde_json::json;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    arangokit_rs::telemetry::init_telemetry(false)?;

    let client = ArangoClient::new(ClientConfig::new("http://127.0.0.1:8529"))?;
    let db = client.db("_system", Auth::basic("root", ""), true).await?;
    if !db.has_collection("students").await?.value()? {
        db.create_collection("students", false).await?.value()?;
    }

    let batch = db.begin_batch_execution(true);
    let students = batch.collection("students");

    let insert = students
        .insert(json!({"_key": "batch-1", "name": "Lily"}), InsertOptions::default())
        .await?
        .batch_job()?;
    // Same key again: this one fails on the server, the rest of the batch does not
    let duplicate = students
        .insert(json!({"_key": "batch-1", "name": "Lily"}), InsertOptions::default())
        .await?
        .batch_job()?;
    let count = students.count().await?.batch_job()?;

    println!("Queued {} jobs, nothing sent yet", batch.queued_jobs().unwrap_or_default().len());

    for job in batch.commit().await?.unwrap_or_default() {
        println!("Job {} -> {}", job.id(), job.status());
    }

    println!("Insert: {}", insert.result()?);
    match duplicate.result() {
        Ok(meta) => println!("Duplicate unexpectedly stored: {}", meta),
        Err(e) => println!("Duplicate rejected: {}", e),
    }
    println!("Count: {}", count.result()?);

    db.collection("students").delete(&json!("batch-1"), true).await?;
    Ok(())
}
