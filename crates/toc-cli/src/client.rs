//! HTTP client subcommands — talk to a Planner already started with `serve`.

use serde_json::json;

pub async fn submit(planner_url: &str, intent: &str) -> Result<(), Box<dyn std::error::Error>> {
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{planner_url}/intents"))
        .json(&json!({ "intent": intent }))
        .send()
        .await?;
    print_response(resp).await
}

pub async fn status(planner_url: &str, plan_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let client = reqwest::Client::new();
    let resp = client
        .get(format!("{planner_url}/plans/{plan_id}"))
        .send()
        .await?;
    print_response(resp).await
}

pub async fn cancel(planner_url: &str, plan_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{planner_url}/plans/{plan_id}/cancel"))
        .send()
        .await?;
    print_response(resp).await
}

async fn print_response(resp: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = resp.status();
    let body: serde_json::Value = resp.json().await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    if !status.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
