use actix_web::{web, HttpResponse, Responder};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::blockchain::{
    Block, BlockchainError, FailureReason, Ledger, MiningJobs, ValidationReport,
};

/// Shared state handed to every handler
#[derive(Debug, Clone)]
pub struct AppState {
    pub ledger: Ledger,
    pub jobs: MiningJobs,
    /// Random identifier of this node, fixed for the process lifetime
    pub node_id: String,
}

/// Data structure for the ledger state
pub type AppData = web::Data<AppState>;

/// Response for the mine endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct MineResponse {
    /// The message
    pub message: String,

    /// Index of the newly mined block
    pub index: u64,

    /// The accepted proof
    pub proof: u64,

    /// Hash of the newly mined block
    pub hash: String,

    /// Number of proofs tried
    pub attempts: u64,
}

/// Request for the add data endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct AddDataRequest {
    /// The data item to queue, any JSON value
    #[schema(value_type = Object)]
    pub in_data: Value,
}

/// Response for the add data endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct AddDataResponse {
    /// The message
    pub message: String,

    /// The block the item is expected to land in (a hint only)
    pub block_index: u64,
}

/// Response for the validate endpoint
#[derive(Serialize, ToSchema)]
pub struct ValidateResponse {
    /// 0 when the chain is intact, 1 otherwise
    pub code: u8,

    /// Whether the chain is intact
    pub valid: bool,

    /// Index of the first offending block
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_index: Option<u64>,

    /// Why the offending block failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,
}

impl From<ValidationReport> for ValidateResponse {
    fn from(report: ValidationReport) -> Self {
        let valid = report.is_valid();
        let (failed_index, reason) = match report {
            ValidationReport::Passed { .. } => (None, None),
            ValidationReport::Failed { index, reason } => (Some(index), Some(reason)),
        };

        ValidateResponse {
            code: if valid { 0 } else { 1 },
            valid,
            failed_index,
            reason,
        }
    }
}

/// Request for the get block endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct GetBlockRequest {
    /// Index of the block to fetch
    pub index: u64,
}

/// Full contents of a committed block
#[derive(Serialize, Deserialize, ToSchema)]
pub struct BlockResponse {
    pub index: u64,

    #[schema(value_type = String, example = "2023-01-01T12:00:00Z")]
    pub timestamp: DateTime<Utc>,

    #[schema(value_type = Object)]
    pub data: Vec<Value>,

    pub proof: u64,

    pub previous_hash: String,
}

impl From<Block> for BlockResponse {
    fn from(block: Block) -> Self {
        BlockResponse {
            index: block.index(),
            timestamp: block.timestamp(),
            data: block.payload().to_vec(),
            proof: block.proof(),
            previous_hash: block.previous_hash().to_string(),
        }
    }
}

/// Response for the node endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct NodeResponse {
    pub node_id: String,
    pub difficulty: u32,
    pub length: usize,
}

/// Response for the start job endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct JobStartedResponse {
    #[schema(value_type = String)]
    pub job_id: Uuid,
}

fn error_body(message: impl Into<String>) -> Value {
    serde_json::json!({ "error": message.into() })
}

/// Mine a new block
///
/// Searches for a proof that commits all pending data. The search runs on a
/// background job; the response waits for it to finish. A client that
/// disconnects first cancels the search.
#[utoipa::path(
    post,
    path = "/api/v1/mine",
    responses(
        (status = 200, description = "Block mined successfully", body = MineResponse),
        (status = 503, description = "Search stopped before a block was found"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn mine_block(state: AppData) -> impl Responder {
    let job = state.jobs.start_attached();
    let job_id = job.id();

    match job.finish().await {
        Ok(Ok(mined)) => HttpResponse::Ok().json(MineResponse {
            message: format!("We mined a new block ({})", mined.index),
            index: mined.index,
            proof: mined.proof,
            hash: mined.hash,
            attempts: mined.attempts,
        }),
        Ok(Err(err)) => HttpResponse::ServiceUnavailable().json(serde_json::json!({
            "error": format!("Failed to mine block: {}", err),
            "job_id": job_id,
        })),
        Err(err) => HttpResponse::InternalServerError()
            .json(error_body(format!("Mining job {} failed: {}", job_id, err))),
    }
}

/// Add data
///
/// Queues a data item for the next mined block
#[utoipa::path(
    post,
    path = "/api/v1/data/add",
    request_body = AddDataRequest,
    responses(
        (status = 201, description = "Data queued", body = AddDataResponse),
        (status = 400, description = "Invalid request")
    )
)]
pub async fn add_data(state: AppData, request: web::Json<AddDataRequest>) -> impl Responder {
    let block_index = state.ledger.submit_data(request.into_inner().in_data);

    HttpResponse::Created().json(AddDataResponse {
        message: format!("Data will be added to block {}", block_index),
        block_index,
    })
}

/// Get the chain
///
/// Returns index, hash and proof of every committed block
#[utoipa::path(
    get,
    path = "/api/v1/chain",
    responses(
        (status = 200, description = "Chain retrieved successfully", body = Vec<ChainEntry>)
    )
)]
pub async fn get_chain(state: AppData) -> impl Responder {
    HttpResponse::Ok().json(state.ledger.list_chain())
}

/// Check if the chain is valid
///
/// Validates a snapshot of the whole chain
#[utoipa::path(
    get,
    path = "/api/v1/validate",
    responses(
        (status = 200, description = "Chain validation status", body = ValidateResponse)
    )
)]
pub async fn validate_chain(state: AppData) -> impl Responder {
    HttpResponse::Ok().json(ValidateResponse::from(state.ledger.validate()))
}

/// Get a block
///
/// Returns the full contents of the block at the given index
#[utoipa::path(
    post,
    path = "/api/v1/block/get",
    request_body = GetBlockRequest,
    responses(
        (status = 200, description = "Block retrieved successfully", body = BlockResponse),
        (status = 400, description = "Invalid request or block index")
    )
)]
pub async fn get_block(state: AppData, request: web::Json<GetBlockRequest>) -> impl Responder {
    match state.ledger.get_block(request.index) {
        Ok(block) => HttpResponse::Ok().json(BlockResponse::from(block)),
        Err(err @ BlockchainError::OutOfRange { .. }) => {
            HttpResponse::BadRequest().json(serde_json::json!({
                "error": "Invalid Block",
                "detail": err.to_string(),
            }))
        }
        Err(err) => HttpResponse::InternalServerError().json(error_body(err.to_string())),
    }
}

/// Get pending data
///
/// Returns all data items waiting to be included in a block
#[utoipa::path(
    get,
    path = "/api/v1/pending",
    responses(
        (status = 200, description = "Pending data retrieved successfully")
    )
)]
pub async fn get_pending(state: AppData) -> impl Responder {
    HttpResponse::Ok().json(state.ledger.get_pending())
}

/// Get node information
#[utoipa::path(
    get,
    path = "/api/v1/node",
    responses(
        (status = 200, description = "Node information", body = NodeResponse)
    )
)]
pub async fn get_node(state: AppData) -> impl Responder {
    HttpResponse::Ok().json(NodeResponse {
        node_id: state.node_id.clone(),
        difficulty: state.ledger.difficulty(),
        length: state.ledger.len(),
    })
}

/// Start a mining job
///
/// Starts a proof search in the background and returns its id immediately
#[utoipa::path(
    post,
    path = "/api/v1/mine/jobs",
    responses(
        (status = 202, description = "Mining job started", body = JobStartedResponse)
    )
)]
pub async fn start_mining_job(state: AppData) -> impl Responder {
    // The job outlives the dropped handle.
    let (job_id, _handle) = state.jobs.start();
    HttpResponse::Accepted().json(JobStartedResponse { job_id })
}

/// Get a mining job
#[utoipa::path(
    get,
    path = "/api/v1/mine/jobs/{job_id}",
    params(("job_id" = String, Path, description = "Mining job id")),
    responses(
        (status = 200, description = "Mining job status", body = JobStatus),
        (status = 404, description = "Unknown job")
    )
)]
pub async fn get_mining_job(state: AppData, job_id: web::Path<Uuid>) -> impl Responder {
    match state.jobs.status(&job_id) {
        Some(status) => HttpResponse::Ok().json(status),
        None => HttpResponse::NotFound().json(error_body("Unknown mining job")),
    }
}

/// Cancel a mining job
#[utoipa::path(
    delete,
    path = "/api/v1/mine/jobs/{job_id}",
    params(("job_id" = String, Path, description = "Mining job id")),
    responses(
        (status = 202, description = "Cancellation requested", body = JobStatus),
        (status = 404, description = "Unknown job")
    )
)]
pub async fn cancel_mining_job(state: AppData, job_id: web::Path<Uuid>) -> impl Responder {
    match state.jobs.cancel(&job_id) {
        Some(status) => HttpResponse::Accepted().json(status),
        None => HttpResponse::NotFound().json(error_body("Unknown mining job")),
    }
}
