//! Tipos de wire da API REST do Automation Cloud.
//!
//! Os nomes dos campos seguem o JSON camelCase da API via `serde(rename_all)`.
//! As structs de resposta são tolerantes: campos opcionais usam default quando
//! ausentes, para que campos novos no servidor nunca quebrem a desserialização.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::job::{JobCategory, JobError, JobInput, JobState};

/// Corpo de `POST /jobs`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobRequest {
    pub service_id: String,
    pub category: JobCategory,
    pub input: Map<String, Value>,
}

/// Snapshot do job retornado por `POST /jobs` e `GET /jobs/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteJob {
    pub id: String,
    #[serde(default)]
    pub service_id: Option<String>,
    #[serde(default)]
    pub category: JobCategory,
    pub state: JobState,
    #[serde(default)]
    pub awaiting_input_key: Option<String>,
    #[serde(default)]
    pub error: Option<JobError>,
    #[serde(default)]
    pub tds_id: Option<String>,
}

/// Nomes dos eventos no log remoto de um job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RemoteEventName {
    AwaitingInput,
    CreateOutput,
    Success,
    Fail,
    TdsStart,
    TdsFinish,
    Restart,
    Processing,
    /// Qualquer nome que este cliente não conhece.
    #[serde(other)]
    Unknown,
}

/// Uma entrada do log de eventos do job (somente anexação).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEvent {
    pub id: String,
    pub name: RemoteEventName,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Output retornado por `GET /jobs/{id}/outputs/{key}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteOutput {
    #[serde(default)]
    pub job_id: Option<String>,
    pub key: String,
    #[serde(default)]
    pub data: Value,
}

/// Corpo de `POST /jobs/{id}/inputs`.
#[derive(Debug, Clone, Serialize)]
pub struct SendInputRequest<'a> {
    pub key: &'a str,
    pub data: &'a Value,
}

/// Corpo de `POST /services/{id}/previous-job-outputs`.
#[derive(Debug, Clone, Serialize)]
pub struct PreviousOutputsRequest<'a> {
    pub inputs: &'a [JobInput],
}

/// Output emitido por um job anterior do mesmo serviço.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviousJobOutput {
    pub job_id: String,
    pub key: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub variability: f64,
}

/// Resposta de `GET /jobs/{id}/end-user`.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessTokenResponse {
    pub token: String,
}

/// Envelope usado pelos endpoints de listagem.
#[derive(Debug, Clone, Deserialize)]
pub struct ListResponse<T> {
    pub data: Vec<T>,
}
