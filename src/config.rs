//! Configuração do cliente, opcionalmente carregada de um arquivo TOML.
//!
//! A struct [`ClientConfig`] contém todos os parâmetros ajustáveis do SDK.
//! Campos ausentes no arquivo usam defaults sensíveis. Algumas variáveis de
//! ambiente têm precedência sobre o arquivo, para que credenciais nunca
//! precisem ser versionadas.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

/// Variável de ambiente com a chave secreta compartilhada.
pub const ENV_SECRET_KEY: &str = "AC_SECRET_KEY";
/// Variável de ambiente com o id de serviço padrão.
pub const ENV_SERVICE_ID: &str = "AC_SERVICE_ID";
/// Variável de ambiente que substitui a URL base da API.
pub const ENV_API_URL: &str = "AC_API_URL";

/// Como as requisições à API são autenticadas.
#[derive(Debug, Default, Deserialize)]
#[serde(from = "RawAuth")]
pub enum Auth {
    /// Nenhuma credencial é enviada.
    #[default]
    None,
    /// Chave secreta do app ou token de acesso do job, enviado como usuário Basic.
    SharedSecret(SecretString),
    /// Credenciais de cliente OAuth2, trocadas por um token bearer.
    OAuth2ClientCredentials {
        client_id: String,
        client_secret: SecretString,
    },
}

impl Auth {
    pub fn shared_secret(secret: impl Into<String>) -> Self {
        Auth::SharedSecret(SecretString::from(secret.into()))
    }

    pub fn oauth2(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Auth::OAuth2ClientCredentials {
            client_id: client_id.into(),
            client_secret: SecretString::from(client_secret.into()),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Auth::None)
    }
}

impl Clone for Auth {
    fn clone(&self) -> Self {
        match self {
            Auth::None => Auth::None,
            Auth::SharedSecret(secret) => Auth::shared_secret(secret.expose_secret()),
            Auth::OAuth2ClientCredentials {
                client_id,
                client_secret,
            } => Auth::oauth2(client_id.clone(), client_secret.expose_secret()),
        }
    }
}

// No TOML o segredo é uma string simples ou uma tabela `{ client_id, client_secret }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawAuth {
    SharedSecret(String),
    OAuth2 {
        client_id: String,
        client_secret: String,
    },
}

impl From<RawAuth> for Auth {
    fn from(raw: RawAuth) -> Self {
        match raw {
            RawAuth::SharedSecret(secret) => Auth::shared_secret(secret),
            RawAuth::OAuth2 {
                client_id,
                client_secret,
            } => Auth::oauth2(client_id, client_secret),
        }
    }
}

/// Configuração de nível superior do cliente.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Serviço cujos jobs este cliente cria, a menos que o job indique outro.
    #[serde(default)]
    pub service_id: Option<String>,

    #[serde(default)]
    pub auth: Auth,

    /// URL base da API, sem barra final.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Endpoint de token OAuth2.
    #[serde(default = "default_api_token_url")]
    pub api_token_url: String,

    /// Intervalo entre duas consultas ao log de eventos do job.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Quantas vezes uma requisição falha é reenviada.
    #[serde(default = "default_request_retry_count")]
    pub request_retry_count: u32,

    /// Atraso entre reenvios.
    #[serde(default = "default_request_retry_delay_ms")]
    pub request_retry_delay_ms: u64,

    /// Começa a acompanhar o job assim que ele é criado.
    #[serde(default = "default_auto_track")]
    pub auto_track: bool,

    /// Headers extras enviados em toda requisição à API.
    #[serde(default)]
    pub additional_headers: HashMap<String, String>,
}

fn default_api_url() -> String {
    "https://api.automationcloud.net".to_string()
}

fn default_api_token_url() -> String {
    "https://auth.automationcloud.net/auth/realms/automationcloud/protocol/openid-connect/token"
        .to_string()
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_request_retry_count() -> u32 {
    4
}

fn default_request_retry_delay_ms() -> u64 {
    500
}

fn default_auto_track() -> bool {
    true
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            service_id: None,
            auth: Auth::None,
            api_url: default_api_url(),
            api_token_url: default_api_token_url(),
            poll_interval_ms: default_poll_interval_ms(),
            request_retry_count: default_request_retry_count(),
            request_retry_delay_ms: default_request_retry_delay_ms(),
            auto_track: default_auto_track(),
            additional_headers: HashMap::new(),
        }
    }
}

impl ClientConfig {
    pub fn new(service_id: impl Into<String>) -> Self {
        Self {
            service_id: Some(service_id.into()),
            ..Self::default()
        }
    }

    pub fn with_auth(mut self, auth: Auth) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_api_token_url(mut self, url: impl Into<String>) -> Self {
        self.api_token_url = url.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_retry(mut self, count: u32, delay: Duration) -> Self {
        self.request_retry_count = count;
        self.request_retry_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_auto_track(mut self, auto_track: bool) -> Self {
        self.auto_track = auto_track;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.additional_headers.insert(name.into(), value.into());
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_retry_delay(&self) -> Duration {
        Duration::from_millis(self.request_retry_delay_ms)
    }

    /// Carrega a configuração de um arquivo TOML, ou usa os defaults se ele não
    /// existir, e aplica as variáveis de ambiente por cima.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str::<ClientConfig>(&contents)?
        } else {
            Self::default()
        };
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Valores do ambiente têm precedência sobre o arquivo. Valores vazios são ignorados.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |name: &str| lookup(name).filter(|v| !v.is_empty());
        if let Some(secret) = lookup(ENV_SECRET_KEY) {
            self.auth = Auth::shared_secret(secret);
        }
        if let Some(service_id) = lookup(ENV_SERVICE_ID) {
            self.service_id = Some(service_id);
        }
        if let Some(url) = lookup(ENV_API_URL) {
            self.api_url = url.trim_end_matches('/').to_string();
        }
    }
}
