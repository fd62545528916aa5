//! Basic Usage Example
//!
//! Connects to a local server, creates a collection and works with documents.
//!
//! Run with: cargo run --example basic_usage
//! Expects a server on http://127.0.0.1:8529 with user root and an empty password.

use arangokit_rs::{ArangoClient, Auth, ClientConfig, InsertOptions, QueryOptions};
use serde_json::json;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    arangokit_rs::telemetry::init_telemetry(false)?;

    let client = ArangoClient::new(ClientConfig::new("http://127.0.0.1:8529"))?;
    let db = client.db("_system", Auth::basic("root", ""), true).await?;
    println!("Connected to {} (server {})\n", db.name(), db.version().await?.value()?);

    if !db.has_collection("students").await?.value()? {
        db.create_collection("students", false).await?.value()?;
    }
    let students = db.collection("students");

    for (key, name, age) in [("01", "Abby", 22), ("02", "John", 18), ("03", "Emma", 21)] {
        let meta = students
            .insert(json!({"_key": key, "name": name, "age": age}), InsertOptions::default().overwrite())
            .await?
            .value()?;
        println!("Inserted {}", meta["_id"]);
    }

    println!("\n{} students stored", students.count().await?.value()?);

    if let Some(doc) = students.get(&json!("02")).await?.value()? {
        println!("Fetched: {}", doc);
    }

    let adults = db
        .aql()
        .execute(
            "FOR s IN students FILTER s.age >= @min RETURN s.name",
            QueryOptions::default().bind_vars(json!({"min": 21})).count(),
        )
        .await?
        .value()?;
    println!("Students aged 21 or older: {:?}", adults.result);

    students.delete(&json!("03"), true).await?;
    println!("Deleted 03, exists now: {}", students.has(&json!("03")).await?.value()?);

    Ok(())
}
