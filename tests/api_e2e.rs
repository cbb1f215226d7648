use actix_web::dev::ServerHandle;
use actix_web::{App, HttpServer};
use reqwest::Client;
use serde_json::{json, Value};
use std::net::TcpListener;
use tempfile::TempDir;
use tokio::time::{sleep, Duration};

/// Find a free port by binding to port 0
fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn start_server() -> (ServerHandle, String) {
    let port = free_port();
    let server = HttpServer::new(|| App::new().configure(knnreg::server::config))
        .bind(format!("127.0.0.1:{}", port))
        .unwrap()
        .run();
    let handle = server.handle();
    tokio::spawn(server);
    sleep(Duration::from_millis(200)).await;

    (handle, format!("http://127.0.0.1:{}", port))
}

async fn post(client: &Client, url: String, body: Value) -> (u16, Value) {
    let resp = client.post(url).json(&body).send().await.unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

/// Adds x = 0, 1, 2 with targets y = 1, 3, 5.
async fn seed(client: &Client, base: &str, db: &str) {
    let (status, body) = post(client, format!("{}/add", base), json!({
        "db": db,
        "dataset": "x",
        "points": [
            {"id": "a", "values": [0.0]},
            {"id": "b", "values": [1.0]},
            {"id": "c", "values": [2.0]}
        ]
    })).await;
    assert_eq!(status, 200);
    assert_eq!(body["added"], 3);

    let (status, body) = post(client, format!("{}/add", base), json!({
        "db": db,
        "dataset": "y",
        "points": [
            {"id": "a", "values": [1.0]},
            {"id": "b", "values": [3.0]},
            {"id": "c", "values": [5.0]}
        ]
    })).await;
    assert_eq!(status, 200);
    assert_eq!(body["added"], 3);
}

#[actix_web::test]
async fn test_fit_and_predict() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.knn").to_str().unwrap().to_string();
    let (handle, base) = start_server().await;
    let client = Client::new();

    seed(&client, &base, &db_path).await;

    // --- Fit with k = 1 ---
    let (status, body) = post(&client, format!("{}/fit", base), json!({
        "db": db_path,
        "source": "x",
        "target": "y",
        "num_neighbours": 1
    })).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["size"], 3);
    assert_eq!(body["cols"], 1);

    // --- Predict: nearest to 1.9 is c ---
    let (status, body) = post(&client, format!("{}/predict", base), json!({
        "db": db_path,
        "queries": [{"value": [1.9]}, {"value": [0.1]}]
    })).await;
    assert_eq!(status, 200);
    let results = body["results"].as_array().unwrap();
    assert_eq!(results[0]["prediction"], 5.0);
    assert_eq!(results[0]["message"], "Predict Success");
    assert_eq!(results[1]["prediction"], 1.0);

    // --- Per-request k override: uniform mean of all three ---
    let (_, body) = post(&client, format!("{}/predict", base), json!({
        "db": db_path,
        "queries": [{"value": [1.0]}],
        "k": 3,
        "weight": false
    })).await;
    assert_eq!(body["results"][0]["prediction"], 3.0);

    handle.stop(true).await;
}

#[actix_web::test]
async fn test_predict_errors_are_per_query() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.knn").to_str().unwrap().to_string();
    let (handle, base) = start_server().await;
    let client = Client::new();

    // Nothing fitted yet
    let (status, body) = post(&client, format!("{}/predict", base), json!({
        "db": db_path,
        "queries": [{"value": [1.0]}]
    })).await;
    assert_eq!(status, 200);
    assert!(body["results"][0]["prediction"].is_null());
    assert_eq!(body["results"][0]["status"], "NoDataFitted");

    seed(&client, &base, &db_path).await;
    post(&client, format!("{}/fit", base), json!({
        "db": db_path, "source": "x", "target": "y"
    })).await;

    // k larger than the fitted set
    let (_, body) = post(&client, format!("{}/predict", base), json!({
        "db": db_path,
        "queries": [{"value": [1.0]}],
        "k": 10
    })).await;
    assert_eq!(body["results"][0]["status"], "NotEnoughData");

    // Empty query
    let (_, body) = post(&client, format!("{}/predict", base), json!({
        "db": db_path,
        "queries": [{"value": []}]
    })).await;
    assert_eq!(body["results"][0]["status"], "EmptyBuffer");

    // Refit on two-dimensional features, then query with one value
    post(&client, format!("{}/add", base), json!({
        "db": db_path,
        "dataset": "xy",
        "points": [
            {"id": "a", "values": [0.0, 0.0]},
            {"id": "b", "values": [1.0, 1.0]},
            {"id": "c", "values": [2.0, 2.0]}
        ]
    })).await;
    let (status, _) = post(&client, format!("{}/fit", base), json!({
        "db": db_path, "source": "xy", "target": "y"
    })).await;
    assert_eq!(status, 200);

    let (_, body) = post(&client, format!("{}/predict", base), json!({
        "db": db_path,
        "queries": [{"value": [1.0]}, {"value": [1.0, 1.0]}]
    })).await;
    assert_eq!(body["results"][0]["status"], "WrongPointSize");
    assert_eq!(body["results"][1]["status"], "ok");

    handle.stop(true).await;
}

#[actix_web::test]
async fn test_fit_missing_dataset() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.knn").to_str().unwrap().to_string();
    let (handle, base) = start_server().await;
    let client = Client::new();

    let (status, body) = post(&client, format!("{}/fit", base), json!({
        "db": db_path, "source": "x", "target": "y"
    })).await;
    assert_eq!(status, 400);
    assert_eq!(body["status"], "NoDataSet");

    handle.stop(true).await;
}

#[actix_web::test]
async fn test_add_duplicate_and_wrong_size() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.knn").to_str().unwrap().to_string();
    let (handle, base) = start_server().await;
    let client = Client::new();

    let (status, body) = post(&client, format!("{}/add", base), json!({
        "db": db_path,
        "dataset": "d",
        "points": [
            {"id": "p", "values": [1.0, 2.0]},
            {"id": "p", "values": [3.0, 4.0]},
            {"id": "q", "values": [1.0]}
        ]
    })).await;
    assert_eq!(status, 200);
    assert_eq!(body["added"], 1);

    let results = body["results"].as_array().unwrap();
    assert_eq!(results[0]["status"], "ok");
    assert_eq!(results[1]["status"], "DuplicateLabel");
    assert_eq!(results[2]["status"], "WrongPointSize");

    handle.stop(true).await;
}

#[actix_web::test]
async fn test_get_existing_and_missing() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.knn").to_str().unwrap().to_string();
    let (handle, base) = start_server().await;
    let client = Client::new();

    seed(&client, &base, &db_path).await;

    let (status, body) = post(&client, format!("{}/get", base), json!({
        "db": db_path,
        "dataset": "x",
        "ids": ["b", "missing"]
    })).await;
    assert_eq!(status, 200);
    let results = body["results"].as_array().unwrap();

    assert_eq!(results[0]["id"], "b");
    assert_eq!(results[0]["values"], json!([1.0]));

    assert_eq!(results[1]["id"], "missing");
    assert!(results[1]["values"].is_null());

    // Unknown dataset
    let (status, body) = post(&client, format!("{}/get", base), json!({
        "db": db_path,
        "dataset": "nope",
        "ids": ["a"]
    })).await;
    assert_eq!(status, 404);
    assert_eq!(body["status"], "NoDataSet");

    handle.stop(true).await;
}

#[actix_web::test]
async fn test_delete_and_verify() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.knn").to_str().unwrap().to_string();
    let (handle, base) = start_server().await;
    let client = Client::new();

    seed(&client, &base, &db_path).await;

    let (status, body) = post(&client, format!("{}/delete", base), json!({
        "db": db_path,
        "dataset": "x",
        "ids": ["a", "ghost"]
    })).await;
    assert_eq!(status, 200);
    assert_eq!(body["deleted"], 1);
    assert_eq!(body["results"][1]["status"], "PointNotFound");

    // Deleted point is gone, others remain
    let (_, body) = post(&client, format!("{}/get", base), json!({
        "db": db_path,
        "dataset": "x",
        "ids": ["a", "c"]
    })).await;
    let results = body["results"].as_array().unwrap();
    assert!(results[0]["values"].is_null());
    assert_eq!(results[1]["values"], json!([2.0]));

    handle.stop(true).await;
}

#[actix_web::test]
async fn test_rejected_add_creates_no_dataset() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.knn").to_str().unwrap().to_string();
    let (handle, base) = start_server().await;
    let client = Client::new();

    let (status, body) = post(&client, format!("{}/add", base), json!({
        "db": db_path,
        "dataset": "empty",
        "points": [{"id": "p", "values": []}]
    })).await;
    assert_eq!(status, 200);
    assert_eq!(body["added"], 0);
    assert_eq!(body["results"][0]["status"], "EmptyBuffer");

    seed(&client, &base, &db_path).await;

    let (status, body) = post(&client, format!("{}/get", base), json!({
        "db": db_path,
        "dataset": "empty",
        "ids": ["p"]
    })).await;
    assert_eq!(status, 404);
    assert_eq!(body["status"], "NoDataSet");

    let (status, _) = post(&client, format!("{}/delete", base), json!({
        "db": db_path,
        "dataset": "empty",
        "ids": ["p"]
    })).await;
    assert_eq!(status, 404);

    handle.stop(true).await;
}
