//! Erros estruturados expostos pelo gateway do Automation Cloud.
//!
//! Toda requisição que falha termina como um [`GatewayError`]. A API remota
//! responde falhas com um corpo JSON `{name, message, code?, details?}`, que
//! mapeia um para um na struct. Qualquer outra coisa (páginas de erro HTML,
//! corpo vazio, falha de conexão) vira um erro genérico com o status HTTP.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Nome usado para respostas não-2xx cujo corpo não é um objeto de erro reconhecido.
pub const REQUEST_FAILED: &str = "RequestFailedError";

/// Nome usado quando a requisição nunca produziu uma resposta.
pub const NETWORK_ERROR: &str = "NetworkError";

/// Erro retornado pela API remota (ou no caminho até ela).
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct GatewayError {
    /// Nome do erro, ex.: `InvalidInputs` ou [`REQUEST_FAILED`].
    pub name: String,
    /// Descrição legível.
    pub message: String,
    /// Código opcional para máquinas.
    pub code: Option<String>,
    /// Detalhes arbitrários anexados pelo servidor.
    pub details: Option<Value>,
    /// Status HTTP, quando houve resposta.
    pub status: Option<u16>,
}

/// Corpo de erro como enviado pela API remota.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    name: Option<String>,
    message: Option<String>,
    code: Option<String>,
    details: Option<Value>,
}

impl GatewayError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            code: None,
            details: None,
            status: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Erro genérico para uma resposta sem corpo estruturado.
    pub fn request_failed(method: &str, path: &str, status: u16) -> Self {
        Self::new(
            REQUEST_FAILED,
            format!("Request failed: {method} {path} ({status})"),
        )
        .with_status(status)
    }

    /// Monta o erro a partir do corpo da resposta, se ele tiver a forma `{name, message}`.
    pub fn from_body(body: &[u8], status: u16) -> Option<Self> {
        let body: ErrorBody = serde_json::from_slice(body).ok()?;
        match (body.name, body.message) {
            (Some(name), Some(message)) => Some(Self {
                name,
                message,
                code: body.code,
                details: body.details,
                status: Some(status),
            }),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        let name = if err.is_decode() {
            "ResponseDecodeError"
        } else {
            NETWORK_ERROR
        };
        let mut error = Self::new(name, err.to_string());
        error.status = err.status().map(|s| s.as_u16());
        error
    }
}
