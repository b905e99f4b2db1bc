//! Fleet service client (Supabase REST): robot status, clinic configuration,
//! remote commands and telemetry.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::CloudCredentials;
use crate::core::command::RemoteCommand;
use crate::services::poller::CommandFeed;
use crate::services::telemetry::TelemetryEvent;

const FLEET_TABLE: &str = "saas_frota_robos";
const CONFIG_TABLE: &str = "clinica_config_ia";
const COMMAND_TABLE: &str = "comandos_robo";
const TELEMETRY_TABLE: &str = "sessao_telemetria";
const DIARY_TABLE: &str = "sessao_diario_bordo";

/// Whether this robot may run, and which clinic it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FleetStatus {
    pub blocked: bool,
    pub clinic_id: Option<String>,
}

impl FleetStatus {
    fn blocked() -> Self {
        Self {
            blocked: true,
            clinic_id: None,
        }
    }
}

fn blocked_when_missing() -> Option<bool> {
    Some(true)
}

/// A missing flag blocks; an explicit null does not.
#[derive(Debug, Deserialize)]
struct FleetRow {
    #[serde(default = "blocked_when_missing")]
    status_bloqueio: Option<bool>,
    id_clinica: Option<Value>,
}

/// Clinic-level settings pushed to the robot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RemoteConfig {
    #[serde(rename = "prompt_personalidade_robo")]
    pub personality_prompt: Option<String>,
    #[serde(rename = "motor_voz_preferencial")]
    pub voice_engine: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IdRow {
    id: i64,
}

fn clinic_id(value: Option<Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn status_from_rows(rows: Vec<FleetRow>) -> Option<FleetStatus> {
    rows.into_iter().next().map(|row| FleetStatus {
        blocked: row.status_bloqueio.unwrap_or(false),
        clinic_id: clinic_id(row.id_clinica),
    })
}

/// Target table and row for a telemetry event.
fn telemetry_row(event: &TelemetryEvent, device_id: &str) -> (&'static str, Value) {
    match event {
        TelemetryEvent::Session { game, result, at } => (
            TELEMETRY_TABLE,
            json!({
                "mac_address": device_id,
                "jogo": game,
                "resultado": result.as_str(),
                "timestamp": at.timestamp_millis() as f64 / 1000.0,
            }),
        ),
        TelemetryEvent::Transcript { text, session_id, at } => (
            DIARY_TABLE,
            json!({
                "texto_transcrito": text,
                "timestamp": at.to_rfc3339(),
                "tipo_evento": "FALA_DETECTADA",
                "sessao_ludica_id": session_id,
            }),
        ),
        TelemetryEvent::Pong { at } => (
            TELEMETRY_TABLE,
            json!({
                "mac_address": device_id,
                "jogo": "sistema",
                "resultado": "PONG",
                "timestamp": at.timestamp_millis() as f64 / 1000.0,
            }),
        ),
    }
}

/// First non-loopback hardware address under `net_dir`, uppercased.
pub fn detect_device_id(net_dir: &Path) -> Option<String> {
    let mut interfaces: Vec<_> = std::fs::read_dir(net_dir)
        .ok()?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name() != "lo")
        .map(|e| e.path())
        .collect();
    interfaces.sort();

    interfaces.iter().find_map(|iface| {
        let mac = std::fs::read_to_string(iface.join("address")).ok()?;
        let mac = mac.trim().to_uppercase();
        (!mac.is_empty() && mac != "00:00:00:00:00:00").then_some(mac)
    })
}

pub struct CloudClient {
    http: reqwest::Client,
    rest: String,
    device_id: String,
}

impl CloudClient {
    pub fn new(credentials: &CloudCredentials, device_id: String) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&credentials.key).context("cloud key is not a valid header value")?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", credentials.key))
            .context("cloud key is not a valid header value")?;
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(10))
            .build()
            .context("cannot build HTTP client")?;

        Ok(Self {
            http,
            rest: format!("{}/rest/v1", credentials.url.trim_end_matches('/')),
            device_id,
        })
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    async fn select<T: serde::de::DeserializeOwned>(&self, table: &str, query: &[(&str, String)]) -> Result<Vec<T>> {
        let rows = self
            .http
            .get(format!("{}/{table}", self.rest))
            .query(query)
            .send()
            .await
            .with_context(|| format!("GET {table} failed"))?
            .error_for_status()
            .with_context(|| format!("GET {table} rejected"))?
            .json::<Vec<T>>()
            .await
            .with_context(|| format!("unreadable {table} rows"))?;
        Ok(rows)
    }

    async fn insert(&self, table: &str, row: &Value) -> Result<()> {
        self.http
            .post(format!("{}/{table}", self.rest))
            .json(row)
            .send()
            .await
            .with_context(|| format!("POST {table} failed"))?
            .error_for_status()
            .with_context(|| format!("POST {table} rejected"))?;
        Ok(())
    }

    pub async fn fetch_status(&self) -> Result<Option<FleetStatus>> {
        let rows: Vec<FleetRow> = self
            .select(
                FLEET_TABLE,
                &[
                    ("select", "status_bloqueio,id_clinica".to_string()),
                    ("mac_address", format!("eq.{}", self.device_id)),
                ],
            )
            .await?;
        Ok(status_from_rows(rows))
    }

    /// Unknown robots and unreachable fleets count as blocked.
    pub async fn check_status(&self) -> FleetStatus {
        match self.fetch_status().await {
            Ok(Some(status)) => status,
            Ok(None) => {
                warn!(device = %self.device_id, "robot not registered in fleet");
                FleetStatus::blocked()
            }
            Err(e) => {
                warn!(error = %format!("{e:#}"), "fleet status check failed");
                FleetStatus::blocked()
            }
        }
    }

    /// Empty config on any failure.
    pub async fn fetch_config(&self, clinic_id: &str) -> RemoteConfig {
        let rows: Result<Vec<RemoteConfig>> = self
            .select(
                CONFIG_TABLE,
                &[
                    ("select", "prompt_personalidade_robo,motor_voz_preferencial".to_string()),
                    ("id_clinica", format!("eq.{clinic_id}")),
                ],
            )
            .await;
        match rows {
            Ok(rows) => rows.into_iter().next().unwrap_or_default(),
            Err(e) => {
                warn!(error = %format!("{e:#}"), "cannot fetch clinic config");
                RemoteConfig::default()
            }
        }
    }

    pub async fn latest_command_id(&self) -> Result<Option<i64>> {
        let rows: Vec<IdRow> = self
            .select(
                COMMAND_TABLE,
                &[
                    ("select", "id".to_string()),
                    ("mac_address", format!("eq.{}", self.device_id)),
                    ("order", "id.desc".to_string()),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        Ok(rows.first().map(|r| r.id))
    }

    pub async fn commands_after(&self, last_id: i64) -> Result<Vec<RemoteCommand>> {
        self.select(
            COMMAND_TABLE,
            &[
                ("select", "*".to_string()),
                ("mac_address", format!("eq.{}", self.device_id)),
                ("id", format!("gt.{last_id}")),
                ("order", "id.asc".to_string()),
            ],
        )
        .await
    }

    pub async fn send(&self, event: &TelemetryEvent) -> Result<()> {
        let (table, row) = telemetry_row(event, &self.device_id);
        self.insert(table, &row).await
    }
}

/// Polls the command table, skipping whatever was queued before startup.
pub struct CloudCommandFeed {
    client: Arc<CloudClient>,
    last_id: Option<i64>,
}

impl CloudCommandFeed {
    pub fn new(client: Arc<CloudClient>) -> Self {
        Self { client, last_id: None }
    }
}

#[async_trait]
impl CommandFeed for CloudCommandFeed {
    async fn fetch(&mut self) -> Result<Vec<RemoteCommand>> {
        let last_id = match self.last_id {
            Some(id) => id,
            None => {
                let id = self.client.latest_command_id().await?.unwrap_or(0);
                debug!(last_id = id, "command cursor initialised");
                self.last_id = Some(id);
                return Ok(Vec::new());
            }
        };

        let commands = self.client.commands_after(last_id).await?;
        if let Some(max) = commands.iter().map(|c| c.id).max() {
            self.last_id = Some(max.max(last_id));
        }
        Ok(commands)
    }
}

/// Drains the telemetry channel. Without a client (offline) events are only logged.
pub fn spawn_uploader(
    client: Option<Arc<CloudClient>>,
    mut rx: mpsc::UnboundedReceiver<TelemetryEvent>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                // queued events go out before shutdown is honoured
                biased;
                event = rx.recv() => {
                    let Some(event) = event else { break };
                    match &client {
                        Some(client) => {
                            if let Err(e) = client.send(&event).await {
                                warn!(error = %format!("{e:#}"), ?event, "telemetry upload failed");
                            }
                        }
                        None => debug!(?event, "telemetry (offline)"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("telemetry uploader stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::telemetry::SessionResult;
    use chrono::{TimeZone, Utc};

    #[test]
    fn fleet_rows_map_to_status() {
        let rows: Vec<FleetRow> =
            serde_json::from_value(json!([{"status_bloqueio": false, "id_clinica": "c-1"}])).unwrap();
        assert_eq!(
            status_from_rows(rows),
            Some(FleetStatus {
                blocked: false,
                clinic_id: Some("c-1".into())
            })
        );

        let rows: Vec<FleetRow> = serde_json::from_value(json!([{"status_bloqueio": null, "id_clinica": 7}])).unwrap();
        assert_eq!(
            status_from_rows(rows),
            Some(FleetStatus {
                blocked: false,
                clinic_id: Some("7".into())
            })
        );

        let rows: Vec<FleetRow> = serde_json::from_value(json!([{"id_clinica": 7}])).unwrap();
        assert_eq!(status_from_rows(rows).map(|s| s.blocked), Some(true));
        assert_eq!(status_from_rows(Vec::new()), None);
    }

    #[test]
    fn remote_config_uses_dashboard_names() {
        let config: RemoteConfig = serde_json::from_value(json!({
            "prompt_personalidade_robo": "Seja calmo.",
            "motor_voz_preferencial": "espeak"
        }))
        .unwrap();
        assert_eq!(config.personality_prompt.as_deref(), Some("Seja calmo."));
        assert_eq!(config.voice_engine.as_deref(), Some("espeak"));
    }

    #[test]
    fn telemetry_rows_per_event() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let (table, row) = telemetry_row(
            &TelemetryEvent::Session {
                game: "colors".into(),
                result: SessionResult::Started,
                at,
            },
            "AA:BB",
        );
        assert_eq!(table, TELEMETRY_TABLE);
        assert_eq!(row["jogo"], "colors");
        assert_eq!(row["resultado"], "INICIO");
        assert_eq!(row["mac_address"], "AA:BB");
        assert_eq!(row["timestamp"], 1714564800.0);

        let (table, row) = telemetry_row(
            &TelemetryEvent::Transcript {
                text: "oi".into(),
                session_id: None,
                at,
            },
            "AA:BB",
        );
        assert_eq!(table, DIARY_TABLE);
        assert_eq!(row["tipo_evento"], "FALA_DETECTADA");
        assert!(row["sessao_ludica_id"].is_null());

        let (_, row) = telemetry_row(&TelemetryEvent::Pong { at }, "AA:BB");
        assert_eq!(row["resultado"], "PONG");
    }

    #[test]
    fn device_id_skips_loopback_and_zero_addresses() {
        let dir = tempfile::tempdir().unwrap();
        for (iface, mac) in [("lo", "00:00:00:00:00:00"), ("dummy0", "00:00:00:00:00:00"), ("eth0", "b8:27:eb:12:34:56")] {
            std::fs::create_dir(dir.path().join(iface)).unwrap();
            std::fs::write(dir.path().join(iface).join("address"), format!("{mac}\n")).unwrap();
        }
        assert_eq!(detect_device_id(dir.path()).as_deref(), Some("B8:27:EB:12:34:56"));
        assert_eq!(detect_device_id(&dir.path().join("missing")), None);
    }

    #[tokio::test]
    async fn offline_uploader_drains_until_shutdown() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = spawn_uploader(None, rx, stop_rx);
        tx.send(TelemetryEvent::pong()).unwrap();
        stop_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
    }
}
