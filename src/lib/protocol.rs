//! ## Protocol Codec
//!
//! Builds the three outbound requests (`login`, `submit`, `keepalived`) and decodes the payloads
//! the client cares about on the way in: the login result (session id plus first job) and the
//! `job` notification.
//!
//! Requests are serialized through [`json_rpc::Request`], which keeps the wire field order
//! `id`, `jsonrpc`, `method`, `params`.
use serde::Serialize;
use serde_json::Value;

use crate::{
    job::{Job, JobError, JobResult},
    json_rpc::Request,
};

/// Request id reserved for the login request of every session.
pub const LOGIN_REQUEST_ID: u64 = 1;
/// Session ids must be strictly shorter than this.
pub const MAX_SESSION_ID_LEN: usize = 64;
/// Error messages starting with this (any case) mean the session is gone.
pub const AUTH_FAILURE_MARKER: &str = "Unauthenticated";

pub const METHOD_LOGIN: &str = "login";
pub const METHOD_SUBMIT: &str = "submit";
pub const METHOD_KEEPALIVE: &str = "keepalived";
pub const METHOD_JOB: &str = "job";

#[derive(Serialize)]
struct LoginParams<'a> {
    login: &'a str,
    pass: &'a str,
    agent: &'a str,
}

#[derive(Serialize)]
struct SubmitParams<'a> {
    id: &'a str,
    job_id: &'a str,
    nonce: String,
    result: String,
}

#[derive(Serialize)]
struct KeepaliveParams<'a> {
    id: &'a str,
}

pub fn login_request(user: &str, password: &str, agent: &str) -> Result<String, serde_json::Error> {
    Request::new(
        LOGIN_REQUEST_ID,
        METHOD_LOGIN,
        LoginParams {
            login: user,
            pass: password,
            agent,
        },
    )
    .to_line()
}

pub fn submit_request(
    id: u64,
    session_id: &str,
    result: &JobResult,
) -> Result<String, serde_json::Error> {
    Request::new(
        id,
        METHOD_SUBMIT,
        SubmitParams {
            id: session_id,
            job_id: &result.job_id,
            nonce: result.nonce_hex(),
            result: result.result_hex(),
        },
    )
    .to_line()
}

pub fn keepalive_request(id: u64, session_id: &str) -> Result<String, serde_json::Error> {
    Request::new(id, METHOD_KEEPALIVE, KeepaliveParams { id: session_id }).to_line()
}

/// `true` when a server error message reports a lost or refused authentication.
pub fn is_auth_failure(message: &str) -> bool {
    message
        .get(..AUTH_FAILURE_MARKER.len())
        .map(|prefix| prefix.eq_ignore_ascii_case(AUTH_FAILURE_MARKER))
        .unwrap_or(false)
}

/// Decodes job parameters, field by field.
pub fn parse_job(params: Option<&Value>, pool_id: u32, nicehash: bool) -> Result<Job, JobError> {
    let params = params
        .and_then(Value::as_object)
        .ok_or(JobError::NotAnObject)?;

    let mut job = Job::new(pool_id, nicehash);
    job.set_id(
        params
            .get("job_id")
            .and_then(Value::as_str)
            .ok_or(JobError::JobId)?,
    )?;
    job.set_blob(
        params
            .get("blob")
            .and_then(Value::as_str)
            .ok_or(JobError::Blob)?,
    )?;
    job.set_target(
        params
            .get("target")
            .and_then(Value::as_str)
            .ok_or(JobError::Target)?,
    )?;
    Ok(job)
}

/// Decodes a successful login result into the session id and the first job.
pub fn parse_login(result: &Value, pool_id: u32, nicehash: bool) -> Result<(String, Job), JobError> {
    let session_id = result
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| id.len() < MAX_SESSION_ID_LEN)
        .ok_or(JobError::SessionId)?;
    let job = parse_job(result.get("job"), pool_id, nicehash)?;
    Ok((session_id.to_string(), job))
}
