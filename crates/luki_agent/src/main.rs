//! # Luki Agent
//!
//! Publica o status do host via MQTT em intervalo fixo e aceita comandos
//! pela entrada padrão para exercitar o ciclo sleep/wake.
//!
//! ## Uso
//! ```bash
//! luki_agent                        # usa o config padrão
//! LUKI_MQTT_ENDPOINT=broker:1883 luki_agent
//! ```
//!
//! Comandos: `status`, `msg <tipo> <texto>`, `sleep`, `wake`, `quit`.

mod device;
mod mqtt_transport;

use crossbeam_channel::{Receiver, bounded, never, select, tick};
use device::HostDevice;
use luki_core::{AppConfig, ServiceError, ServiceState, TelemetryService};
use mqtt_transport::MqttNetwork;
use std::io::BufRead;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use tracing::{error, info, warn};

/// Comando lido da entrada padrão.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Status,
    Message { kind: String, text: String },
    Sleep,
    Wake,
    Quit,
}

fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    let (head, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    match head {
        "status" => Some(Command::Status),
        "sleep" => Some(Command::Sleep),
        "wake" => Some(Command::Wake),
        "quit" | "exit" => Some(Command::Quit),
        "msg" => {
            let rest = rest.trim_start();
            let (kind, text) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            (!kind.is_empty()).then(|| Command::Message {
                kind: kind.to_string(),
                text: text.trim_start().to_string(),
            })
        }
        _ => None,
    }
}

/// Lê comandos numa thread dedicada. EOF encerra o canal.
fn spawn_stdin_reader() -> Receiver<Command> {
    let (tx, rx) = bounded(16);
    let spawned = thread::Builder::new()
        .name("stdin-commands".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_command(&line) {
                    Some(cmd) => {
                        if tx.send(cmd).is_err() {
                            break;
                        }
                    }
                    None => warn!("Comando desconhecido: {line}"),
                }
            }
        });
    if let Err(e) = spawned {
        warn!("Sem leitura de comandos: {e}");
    }
    rx
}

fn main() -> ExitCode {
    // ── Logging ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // ── Carregar config ──
    let config_path = AppConfig::default_path();
    let mut config = AppConfig::load(&config_path);

    // Salva config padrão se não existir
    if !config_path.exists() {
        if let Err(e) = config.save(&config_path) {
            warn!("Não foi possível salvar config padrão: {e}");
        }
    }
    config.apply_env_overrides();

    let problems = config.validate();
    if !problems.is_empty() {
        for problem in &problems {
            error!("Config inválida: {problem}");
        }
        return ExitCode::FAILURE;
    }

    let status_interval = config.mqtt.status_interval();
    let device = Arc::new(HostDevice::new(&config.agent));
    let mut service = TelemetryService::new(config.mqtt, Arc::new(MqttNetwork::default()), device);

    match service.start() {
        Ok(()) => {}
        Err(ServiceError::NotConfigured) => {
            warn!("Endpoint MQTT vazio, nada a publicar");
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            error!("Falha ao iniciar telemetria: {e}");
            return ExitCode::FAILURE;
        }
    }

    println!("╔══════════════════════════════════════════╗");
    println!("║         LUKI TELEMETRY AGENT             ║");
    println!("╠══════════════════════════════════════════╣");
    println!("║ Client:   {:<30} ║", service.client_id().unwrap_or("-"));
    println!("║ Broker:   {:<30} ║", service.config().endpoint);
    println!("║ Status:   a cada {:<23} ║", format!("{}s", status_interval.as_secs()));
    println!("╚══════════════════════════════════════════╝");

    let handle = service.handle();
    if let Err(e) = handle.publish_status_async() {
        warn!("Status inicial não enfileirado: {e}");
    }

    let ticker = tick(status_interval);
    let mut commands = spawn_stdin_reader();

    loop {
        let event = select! {
            recv(ticker) -> _ => None,
            recv(commands) -> cmd => Some(cmd.ok()),
        };
        match event {
            None => {
                if service.state() == ServiceState::Running {
                    if let Err(e) = handle.publish_status_async() {
                        warn!("Status periódico não enfileirado: {e}");
                    }
                }
            }
            // stdin fechado: segue só com o status periódico
            Some(None) => commands = never(),
            Some(Some(Command::Status)) => info!(
                "Estado {} | conectado={} | pendentes={} | descartadas={}",
                service.state(),
                service.is_connected(),
                service.pending(),
                service.dropped()
            ),
            Some(Some(Command::Message { kind, text })) => {
                if let Err(e) = handle.publish_device_message_async(&kind, &text) {
                    warn!("Mensagem não enfileirada: {e}");
                }
            }
            Some(Some(Command::Sleep)) => {
                if let Err(e) = service.stop() {
                    warn!("{e}");
                }
            }
            Some(Some(Command::Wake)) => {
                if let Err(e) = service.resume() {
                    warn!("{e}");
                }
            }
            Some(Some(Command::Quit)) => break,
        }
    }

    info!("Encerrando...");
    if let Err(e) = service.shutdown() {
        warn!("{e}");
    }
    ExitCode::SUCCESS
}
