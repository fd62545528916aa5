//! Transactions Example
//!
//! Runs inserts inside a stream transaction, then a JavaScript transaction.
//!
//! Run with: cargo run --example transactions

use arangokit_rs::{ArangoClient, Auth, ClientConfig, InsertOptions, JsTransaction, TransactionOptions};
use serde_json::json;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    arangokit_rs::telemetry::init_telemetry(false)?;

    let client = ArangoClient::new(ClientConfig::new("http://127.0.0.1:8529"))?;
    let db = client.db("_system", Auth::jwt("root", ""), true).await?;
    if !db.has_collection("accounts").await?.value()? {
        db.create_collection("accounts", false).await?.value()?;
    }

    let txn = db
        .begin_transaction(TransactionOptions::new().write(["accounts"]).sync(true))
        .await?;
    println!("Transaction {} is {}", txn.transaction_id(), txn.transaction_status().await?);

    let accounts = txn.collection("accounts");
    let inserted = async {
        accounts
            .insert(json!({"_key": "alice", "balance": 100}), InsertOptions::default().overwrite())
            .await?;
        accounts
            .insert(json!({"_key": "bob", "balance": 50}), InsertOptions::default().overwrite())
            .await
    }
    .await;

    match inserted {
        Ok(_) => {
            txn.commit_transaction().await?;
            println!("Committed, status now {}", txn.transaction_status().await?);
        }
        Err(e) => {
            txn.abort_transaction().await?;
            println!("Aborted: {}", e);
        }
    }

    let total = db
        .execute_transaction(
            JsTransaction::new(
                "function () { var db = require('@arangodb').db; \
                 return db.accounts.toArray().reduce(function (s, a) { return s + a.balance; }, 0); }",
            )
            .read(["accounts"]),
        )
        .await?
        .value()?;
    println!("Total balance: {}", total);

    Ok(())
}
