//! REST API for knnreg.
//!
//! Provides a stateless HTTP server with JSON endpoints over a workspace file.
//! Each request includes a `db` field specifying the workspace file path.
//! The server loads the workspace from disk per request and saves after mutations.
//!
//! ## Endpoints
//!
//! - `POST /add` - Add labeled points to a named dataset
//! - `POST /get` - Retrieve points by ID
//! - `POST /delete` - Delete points by ID
//! - `POST /fit` - Fit the regressor on a source and a target dataset
//! - `POST /predict` - Predict values for query points
//!
//! ## Usage
//!
//! ```rust,no_run
//! use actix_web::{App, HttpServer};
//!
//! #[actix_web::main]
//! async fn main() -> std::io::Result<()> {
//!     HttpServer::new(|| App::new().configure(knnreg::server::config))
//!         .bind("0.0.0.0:7878")?
//!         .run()
//!         .await
//! }
//! ```

use crate::buffer::{BufferAdaptor, VecBuffer};
use crate::client::KnnRegressorQuery;
use crate::error::KnnError;
use crate::Workspace;
use actix_web::{web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

// --- Request structs ---

#[derive(Deserialize)]
struct PointEntry {
    id: String,
    values: Vec<f64>,
}

#[derive(Deserialize)]
struct Query {
    value: Vec<f64>,
}

#[derive(Deserialize)]
struct AddRequest {
    db: String,
    dataset: String,
    points: Vec<PointEntry>,
}

#[derive(Deserialize)]
struct GetRequest {
    db: String,
    dataset: String,
    ids: Vec<String>,
}

#[derive(Deserialize)]
struct DeleteRequest {
    db: String,
    dataset: String,
    ids: Vec<String>,
}

#[derive(Deserialize)]
struct FitRequest {
    db: String,
    source: String,
    target: String,
    num_neighbours: Option<usize>,
    weight: Option<bool>,
}

#[derive(Deserialize)]
struct PredictRequest {
    db: String,
    queries: Vec<Query>,
    k: Option<usize>,
    weight: Option<bool>,
}

// --- Response structs ---

#[derive(Serialize)]
struct ItemResult {
    id: String,
    status: String,
    message: String,
}

#[derive(Serialize)]
struct AddResponse {
    added: usize,
    results: Vec<ItemResult>,
}

#[derive(Serialize)]
struct GetResponse {
    results: Vec<GetResult>,
}

#[derive(Serialize)]
struct GetResult {
    id: String,
    values: Option<Vec<f64>>,
}

#[derive(Serialize)]
struct DeleteResponse {
    deleted: usize,
    results: Vec<ItemResult>,
}

#[derive(Serialize)]
struct FitResponse {
    status: String,
    size: usize,
    cols: usize,
}

#[derive(Serialize)]
struct PredictResponse {
    results: Vec<PredictResult>,
}

#[derive(Serialize)]
struct PredictResult {
    prediction: Option<f64>,
    status: String,
    message: String,
}

fn ok_item(id: &str, message: &str) -> ItemResult {
    ItemResult { id: id.to_string(), status: "ok".to_string(), message: message.to_string() }
}

fn error_item(id: &str, e: &KnnError) -> ItemResult {
    ItemResult { id: id.to_string(), status: e.status().to_string(), message: e.to_string() }
}

fn error_body(e: &KnnError) -> serde_json::Value {
    serde_json::json!({"error": e.to_string(), "status": e.status()})
}

/// Loads the workspace or answers with a 500 from the calling handler.
macro_rules! load_or_fail {
    ($path:expr) => {
        match Workspace::load_or_create(&$path) {
            Ok(ws) => ws,
            Err(e) => {
                error!(path = %$path, error = %e, "failed to load workspace");
                return HttpResponse::InternalServerError().json(error_body(&e));
            }
        }
    };
}

macro_rules! save_or_fail {
    ($ws:expr, $path:expr) => {
        if let Err(e) = $ws.save(&$path) {
            error!(path = %$path, error = %e, "failed to save workspace");
            return HttpResponse::InternalServerError().json(error_body(&e));
        }
    };
}

// --- Handlers ---

async fn add_handler(body: web::Json<AddRequest>) -> impl Responder {
    let mut ws = load_or_fail!(body.db);

    let mut results = Vec::new();
    let mut added = 0;

    for entry in &body.points {
        let buffer = VecBuffer::new(entry.values.clone());
        match ws.add_point(&body.dataset, &entry.id, Some(&buffer)) {
            Ok(()) => {
                added += 1;
                results.push(ok_item(&entry.id, "Added point"));
            }
            Err(e) => results.push(error_item(&entry.id, &e)),
        }
    }

    if added > 0 {
        save_or_fail!(ws, body.db);
    }
    debug!(dataset = %body.dataset, added, "add request");
    HttpResponse::Ok().json(AddResponse { added, results })
}

async fn get_handler(body: web::Json<GetRequest>) -> impl Responder {
    let ws = load_or_fail!(body.db);
    let Some(dataset) = ws.dataset(&body.dataset) else {
        return HttpResponse::NotFound().json(error_body(&KnnError::NoDataSet));
    };

    let results = body
        .ids
        .iter()
        .map(|id| {
            let mut buffer = VecBuffer::default();
            let values = dataset.get_point(id, Some(&mut buffer)).ok().map(|()| buffer.into_inner());
            GetResult { id: id.clone(), values }
        })
        .collect();

    HttpResponse::Ok().json(GetResponse { results })
}

async fn delete_handler(body: web::Json<DeleteRequest>) -> impl Responder {
    let mut ws = load_or_fail!(body.db);
    if ws.dataset(&body.dataset).is_none() {
        return HttpResponse::NotFound().json(error_body(&KnnError::NoDataSet));
    }

    let mut results = Vec::new();
    let mut deleted = 0;

    for id in &body.ids {
        match ws.delete_point(&body.dataset, id) {
            Ok(()) => {
                deleted += 1;
                results.push(ok_item(id, "Deleted point"));
            }
            Err(e) => results.push(error_item(id, &e)),
        }
    }

    save_or_fail!(ws, body.db);
    HttpResponse::Ok().json(DeleteResponse { deleted, results })
}

async fn fit_handler(body: web::Json<FitRequest>) -> impl Responder {
    let mut ws = load_or_fail!(body.db);

    let params = ws.regressor_mut().params_mut();
    if let Some(k) = body.num_neighbours {
        params.num_neighbours = k;
    }
    if let Some(weight) = body.weight {
        params.weight = weight;
    }

    if let Err(e) = ws.fit(&body.source, &body.target) {
        return HttpResponse::BadRequest().json(error_body(&e));
    }

    save_or_fail!(ws, body.db);
    let regressor = ws.regressor();
    HttpResponse::Ok().json(FitResponse { status: "ok".to_string(), size: regressor.size(), cols: regressor.cols() })
}

async fn predict_handler(body: web::Json<PredictRequest>) -> impl Responder {
    let ws = load_or_fail!(body.db);
    let regressor = ws.regressor();

    let mut query = KnnRegressorQuery::new(*regressor.params());
    if let Some(k) = body.k {
        query.params.num_neighbours = k;
    }
    if let Some(weight) = body.weight {
        query.params.weight = weight;
    }

    let results = body
        .queries
        .iter()
        .map(|q| {
            let input = VecBuffer::new(q.value.clone());
            let mut output = VecBuffer::zeros(1);
            match query.process(1.0, regressor, Some(&input), Some(&mut output)) {
                Ok(_) => PredictResult {
                    prediction: output.samples().first().copied(),
                    status: "ok".to_string(),
                    message: "Predict Success".to_string(),
                },
                Err(e) => PredictResult { prediction: None, status: e.status().to_string(), message: e.to_string() },
            }
        })
        .collect();

    HttpResponse::Ok().json(PredictResponse { results })
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/add").route(web::post().to(add_handler)))
       .service(web::resource("/get").route(web::post().to(get_handler)))
       .service(web::resource("/delete").route(web::post().to(delete_handler)))
       .service(web::resource("/fit").route(web::post().to(fit_handler)))
       .service(web::resource("/predict").route(web::post().to(predict_handler)));
}
