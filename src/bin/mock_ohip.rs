//! Mock OHIP API server
//!
//! Simulates the OHIP endpoints used by the sync service for local testing.
//!
//! Endpoints:
//! - POST /oauth/v1/tokens - password grant, returns a fresh access token
//! - GET  /hsk/v1/hotels/{hotel}/housekeepingOverview?floor=N - one floor of rooms
//! - GET  /fof/v1/hotels/{hotel}/rooms - every room
//!
//! Behavior:
//! 1. Rooms are numbered `{floor}{nn}`, e.g. 101..110 on floor 1
//! 2. Each issued token advances the cycle counter; statuses rotate per cycle
//! 3. GETs require a token issued by this server
//! 4. `--fail-floor N` answers floor N with HTTP 500
//!
//! Usage:
//!   cargo run --bin mock_ohip -- --port 8080 --rooms-per-floor 10

use bytes::Bytes;
use clap::Parser;
use http_body_util::{BodyExt, Full};
use hyper::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

const STATUSES: [&str; 5] = ["Vacant", "Occupied", "Dirty", "Clean", "Inspected"];

#[derive(Parser, Debug)]
#[command(name = "mock_ohip")]
#[command(about = "Mock OHIP housekeeping API for local simulation")]
struct Args {
    /// HTTP port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Number of floors served by the room details endpoint
    #[arg(long, default_value = "3")]
    floors: u32,

    /// Rooms on each floor
    #[arg(long, default_value = "10")]
    rooms_per_floor: u32,

    /// Floor answered with HTTP 500
    #[arg(long)]
    fail_floor: Option<u32>,

    /// Artificial delay before every response (ms)
    #[arg(long, default_value = "0")]
    delay_ms: u64,

    /// Reject token requests whose username differs
    #[arg(long)]
    username: Option<String>,
}

struct MockState {
    args: Args,
    cycle: AtomicU64,
    tokens: Mutex<FxHashSet<String>>,
}

fn room_id(floor: u32, index: u32) -> String {
    format!("{}{:02}", floor, index + 1)
}

fn status_for(floor: u32, index: u32, cycle: u64) -> &'static str {
    let slot = (floor as u64 * 7 + index as u64 + cycle) % STATUSES.len() as u64;
    STATUSES[slot as usize]
}

fn overview_body(floor: u32, rooms_per_floor: u32, cycle: u64) -> Value {
    let rooms: Vec<Value> = (0..rooms_per_floor)
        .map(|i| {
            json!({
                "roomId": room_id(floor, i),
                "floor": floor,
                "housekeeping": {
                    "housekeepingRoomStatus": { "housekeepingStatus": status_for(floor, i, cycle) }
                }
            })
        })
        .collect();
    json!({ "housekeepingRoomInfo": { "housekeepingRooms": { "room": rooms } } })
}

fn rooms_body(floors: u32, rooms_per_floor: u32, cycle: u64) -> Value {
    let rooms: Vec<Value> = (1..=floors)
        .flat_map(|floor| {
            (0..rooms_per_floor).map(move |i| {
                json!({
                    "roomId": room_id(floor, i),
                    "housekeeping": {
                        "roomStatus": { "frontOfficeStatus": status_for(floor, i, cycle) }
                    }
                })
            })
        })
        .collect();
    json!({ "hotelRoomsDetails": { "room": rooms } })
}

fn query_param<'a>(query: Option<&'a str>, name: &str) -> Option<&'a str> {
    query?.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == name).then_some(value)
    })
}

fn respond(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn bearer_ok(req: &Request<hyper::body::Incoming>, state: &MockState) -> bool {
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| state.tokens.lock().contains(token))
}

async fn issue_token(req: Request<hyper::body::Incoming>, state: &MockState) -> Response<Full<Bytes>> {
    let has_basic = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("Basic "));
    if !has_basic {
        return respond(StatusCode::UNAUTHORIZED, r#"{"error":"invalid_client"}"#);
    }

    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            eprintln!("[MOCK] Failed to read token body: {}", e);
            return respond(StatusCode::BAD_REQUEST, r#"{"error":"invalid_request"}"#);
        }
    };
    let form = String::from_utf8_lossy(&body).into_owned();
    if query_param(Some(form.as_str()), "grant_type") != Some("password") {
        return respond(StatusCode::BAD_REQUEST, r#"{"error":"unsupported_grant_type"}"#);
    }
    if let Some(expected) = &state.args.username {
        if query_param(Some(form.as_str()), "username") != Some(expected.as_str()) {
            println!("[MOCK] Token rejected (username)");
            return respond(StatusCode::UNAUTHORIZED, r#"{"error":"invalid_grant"}"#);
        }
    }

    let cycle = state.cycle.fetch_add(1, Ordering::Relaxed) + 1;
    let token = uuid::Uuid::now_v7().simple().to_string();
    state.tokens.lock().insert(token.clone());
    println!("[MOCK] Token issued (cycle {})", cycle);

    let body = json!({ "access_token": token, "token_type": "Bearer", "expires_in": 3600 });
    respond(StatusCode::OK, body.to_string())
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<MockState>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    if state.args.delay_ms > 0 {
        tokio::time::sleep(Duration::from_millis(state.args.delay_ms)).await;
    }

    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(str::to_string);
    let cycle = state.cycle.load(Ordering::Relaxed);

    let response = match (&method, path.as_str()) {
        (&Method::POST, "/oauth/v1/tokens") => issue_token(req, &state).await,
        (&Method::GET, p) if p.ends_with("/housekeepingOverview") => {
            if !bearer_ok(&req, &state) {
                respond(StatusCode::UNAUTHORIZED, r#"{"error":"invalid_token"}"#)
            } else {
                match query_param(query.as_deref(), "floor").and_then(|f| f.parse::<u32>().ok()) {
                    Some(floor) if Some(floor) == state.args.fail_floor => {
                        println!("[MOCK] Floor {} -> 500", floor);
                        respond(StatusCode::INTERNAL_SERVER_ERROR, r#"{"error":"internal"}"#)
                    }
                    Some(floor) => {
                        println!("[MOCK] Floor {} served (cycle {})", floor, cycle);
                        let body = overview_body(floor, state.args.rooms_per_floor, cycle);
                        respond(StatusCode::OK, body.to_string())
                    }
                    None => respond(StatusCode::BAD_REQUEST, r#"{"error":"missing_floor"}"#),
                }
            }
        }
        (&Method::GET, p) if p.ends_with("/rooms") => {
            if !bearer_ok(&req, &state) {
                respond(StatusCode::UNAUTHORIZED, r#"{"error":"invalid_token"}"#)
            } else {
                println!("[MOCK] Room details served (cycle {})", cycle);
                let body = rooms_body(state.args.floors, state.args.rooms_per_floor, cycle);
                respond(StatusCode::OK, body.to_string())
            }
        }
        _ => respond(StatusCode::NOT_FOUND, r#"{"error":"not_found"}"#),
    };

    Ok(response)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = TcpListener::bind(addr).await?;

    println!("[MOCK] OHIP mock listening on http://{}", addr);
    println!(
        "[MOCK] {} floors x {} rooms, fail_floor={:?}, delay={}ms",
        args.floors, args.rooms_per_floor, args.fail_floor, args.delay_ms
    );

    let state = Arc::new(MockState {
        args,
        cycle: AtomicU64::new(0),
        tokens: Mutex::new(FxHashSet::default()),
    });

    loop {
        let (stream, peer) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let state = state.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| handle_request(req, state.clone()));
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                eprintln!("[MOCK] Connection error from {}: {}", peer, e);
            }
        });
    }
}
