//! Configuração unificada via TOML.
//!
//! Cada campo do MQTT tem um default fixo e pode ser sobrescrito de forma
//! independente por variável de ambiente `LUKI_MQTT_<CAMPO>`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Variável de ambiente com o caminho do `config.toml`.
pub const CONFIG_ENV: &str = "LUKI_CONFIG";

/// Prefixo das variáveis de override do MQTT.
pub const MQTT_ENV_PREFIX: &str = "LUKI_MQTT_";

/// Erros ao ler ou gravar a configuração.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Erro de IO na configuração: {0}")]
    Io(#[from] std::io::Error),

    #[error("Erro ao parsear TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Erro ao serializar TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Configuração inválida: {0}")]
    Validation(String),
}

/// Configuração do serviço MQTT.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Broker no formato `host[:port]` (vazio = serviço desabilitado)
    pub endpoint: String,
    /// Porta usada quando o endpoint não traz `:port`
    pub default_port: u16,
    /// Prefixo do client id
    pub client_id_prefix: String,
    /// Usuário (vazio = sem autenticação)
    pub username: String,
    /// Senha (vazio = sem autenticação)
    pub password: String,
    /// Tópico de status (reservado: hoje todos os envelopes, inclusive os
    /// de status, vão para `device_topic`)
    pub status_topic: String,
    /// Tópico dos envelopes de dispositivo
    pub device_topic: String,
    /// Intervalo entre reportes de status (segundos)
    pub status_interval_secs: u64,
    /// Keepalive do transporte (segundos)
    pub keepalive_secs: u32,
    /// Oculta credenciais nos logs
    pub hide_credentials: bool,
    /// Capacidade fixa da mailbox
    pub mailbox_capacity: usize,
    /// Espera máxima do worker na mailbox (ms)
    pub queue_timeout_ms: u64,
    /// Espera máxima pelo término do worker no stop (ms)
    pub stop_timeout_ms: u64,
    /// Pausa após o anúncio offline antes de desconectar (ms)
    pub offline_grace_ms: u64,
    /// Prioridade passada ao provedor de rede
    pub transport_priority: u8,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            endpoint: "120.78.190.249:1883".into(),
            default_port: 1883,
            client_id_prefix: "luki_l1".into(),
            username: String::new(),
            password: String::new(),
            status_topic: "luki/status".into(),
            device_topic: "luki/device".into(),
            status_interval_secs: 120,
            keepalive_secs: 240,
            hide_credentials: true,
            mailbox_capacity: 5,
            queue_timeout_ms: 1000,
            stop_timeout_ms: 3000,
            offline_grace_ms: 500,
            transport_priority: 1,
        }
    }
}

impl MqttConfig {
    pub fn queue_timeout(&self) -> Duration {
        Duration::from_millis(self.queue_timeout_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn offline_grace(&self) -> Duration {
        Duration::from_millis(self.offline_grace_ms)
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.status_interval_secs)
    }

    /// Aplica overrides `LUKI_MQTT_<CAMPO>` lidos por `lookup`.
    ///
    /// Valores que não parseiam são ignorados com um aviso.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |field: &str| lookup(&format!("{MQTT_ENV_PREFIX}{field}"));

        if let Some(v) = get("ENDPOINT") {
            self.endpoint = v;
        }
        if let Some(v) = get("CLIENT_ID_PREFIX") {
            self.client_id_prefix = v;
        }
        if let Some(v) = get("USERNAME") {
            self.username = v;
        }
        if let Some(v) = get("PASSWORD") {
            self.password = v;
        }
        if let Some(v) = get("STATUS_TOPIC") {
            self.status_topic = v;
        }
        if let Some(v) = get("DEVICE_TOPIC") {
            self.device_topic = v;
        }
        override_parsed(&mut self.default_port, "DEFAULT_PORT", get("DEFAULT_PORT"));
        override_parsed(
            &mut self.status_interval_secs,
            "STATUS_INTERVAL",
            get("STATUS_INTERVAL"),
        );
        override_parsed(&mut self.keepalive_secs, "KEEPALIVE", get("KEEPALIVE"));
        override_parsed(
            &mut self.mailbox_capacity,
            "MAILBOX_CAPACITY",
            get("MAILBOX_CAPACITY"),
        );
        override_parsed(
            &mut self.queue_timeout_ms,
            "QUEUE_TIMEOUT_MS",
            get("QUEUE_TIMEOUT_MS"),
        );
        override_parsed(
            &mut self.stop_timeout_ms,
            "STOP_TIMEOUT_MS",
            get("STOP_TIMEOUT_MS"),
        );
        override_parsed(
            &mut self.offline_grace_ms,
            "OFFLINE_GRACE_MS",
            get("OFFLINE_GRACE_MS"),
        );
        override_parsed(
            &mut self.transport_priority,
            "TRANSPORT_PRIORITY",
            get("TRANSPORT_PRIORITY"),
        );
        if let Some(v) = get("HIDE_CREDENTIALS") {
            match parse_flag(&v) {
                Some(flag) => self.hide_credentials = flag,
                None => warn!("Ignorando {MQTT_ENV_PREFIX}HIDE_CREDENTIALS inválido: '{v}'"),
            }
        }
    }
}

fn override_parsed<T: std::str::FromStr>(target: &mut T, field: &str, value: Option<String>) {
    let Some(raw) = value else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(v) => *target = v,
        Err(_) => warn!("Ignorando {MQTT_ENV_PREFIX}{field} inválido: '{raw}'"),
    }
}

/// Aceita `1/0`, `true/false`, `yes/no`, `on/off`.
fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Configuração do agente host (provedores concretos).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Endereço de hardware fixo (vazio = detectar interface de rede)
    pub hardware_address: String,
    /// Arquivo com o campo persistido do número de série (vazio = ausente)
    pub serial_file: String,
}

/// Configuração raiz do aplicativo.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub mqtt: MqttConfig,
    pub agent: AgentConfig,
}

impl AppConfig {
    /// Carrega configuração de um arquivo TOML.
    ///
    /// Arquivo ausente ou inválido resulta na configuração padrão.
    pub fn load(path: &Path) -> Self {
        if path.exists() {
            match Self::try_load(path) {
                Ok(config) => {
                    info!("Configuração carregada de {}", path.display());
                    return config;
                }
                Err(e) => warn!("Erro ao carregar {}: {}", path.display(), e),
            }
        }

        info!("Usando configuração padrão");
        AppConfig::default()
    }

    /// Carrega sem fallback, propagando o erro.
    pub fn try_load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str::<AppConfig>(&content)?)
    }

    /// Salva configuração em arquivo TOML.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuração salva em {}", path.display());
        Ok(())
    }

    /// Caminho do config: `LUKI_CONFIG` ou `config.toml` ao lado do executável.
    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return PathBuf::from(path);
        }
        let exe_dir = std::env::current_exe()
            .map(|p| p.parent().unwrap_or(Path::new(".")).to_path_buf())
            .unwrap_or_else(|_| PathBuf::from("."));
        exe_dir.join("config.toml")
    }

    /// Aplica overrides do ambiente do processo.
    pub fn apply_env_overrides(&mut self) {
        self.mqtt.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Valida a configuração e retorna lista de erros.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let mqtt = &self.mqtt;

        if mqtt.default_port == 0 {
            errors.push("Porta padrão do MQTT não pode ser 0".into());
        }
        if mqtt.mailbox_capacity == 0 {
            errors.push("Capacidade da mailbox não pode ser 0".into());
        }
        if mqtt.queue_timeout_ms == 0 {
            errors.push("Timeout da fila não pode ser 0".into());
        }
        if mqtt.keepalive_secs == 0 {
            errors.push("Keepalive não pode ser 0".into());
        }
        if mqtt.status_interval_secs == 0 {
            errors.push("Intervalo de status não pode ser 0".into());
        }
        if mqtt.status_topic.is_empty() || mqtt.device_topic.is_empty() {
            errors.push("Tópicos MQTT não podem ser vazios".into());
        }

        errors
    }
}
