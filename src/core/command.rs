use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Null or missing names become empty and parse as unknown commands.
fn lenient_name<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// A command row delivered by the fleet service, consumed once.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteCommand {
    #[serde(default)]
    pub id: i64,
    #[serde(rename = "comando", alias = "name", default, deserialize_with = "lenient_name")]
    pub name: String,
    #[serde(rename = "parametros", alias = "parameters", default)]
    pub parameters: Value,
}

impl RemoteCommand {
    pub fn new(name: &str, parameters: Value) -> Self {
        Self {
            id: 0,
            name: name.to_string(),
            parameters,
        }
    }

    /// First non-empty string parameter among `keys`.
    fn param(&self, keys: &[&str]) -> Option<String> {
        keys.iter()
            .find_map(|k| self.parameters.get(k).and_then(Value::as_str))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }
}

/// What the main loop does with a remote command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Stop,
    StartMode(String),
    Say(String),
    Ping,
    Unknown(String),
}

/// Legacy `JOGO_<NAME>` payloads name games the way the dashboard did.
fn legacy_mode(name: &str) -> String {
    match name {
        "CORES" => "colors".to_string(),
        "PAREAR" | "PAREAR_COR" => "pairing".to_string(),
        "PAPAGAIO" => "parrot".to_string(),
        "CONVERSA" => "conversation".to_string(),
        "DIARIO" => "diary".to_string(),
        other => other.to_lowercase(),
    }
}

impl Command {
    pub fn parse(cmd: &RemoteCommand) -> Self {
        let name = cmd.name.trim().to_uppercase();
        match name.as_str() {
            "STOP" | "PARAR" => Command::Stop,
            "PING" => Command::Ping,
            "START_MODE" | "START_GAME" | "JOGO" => match cmd.param(&["mode", "modo", "game", "jogo"]) {
                Some(mode) => Command::StartMode(mode.to_lowercase()),
                None => Command::Unknown(name),
            },
            "SAY" | "FALAR" => match cmd.param(&["text", "texto"]) {
                Some(text) => Command::Say(text),
                None => Command::Unknown(name),
            },
            _ => match name.strip_prefix("JOGO_") {
                Some(game) if !game.is_empty() => Command::StartMode(legacy_mode(game)),
                _ => Command::Unknown(name),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(name: &str, params: Value) -> Command {
        Command::parse(&RemoteCommand::new(name, params))
    }

    #[test]
    fn english_and_portuguese_names() {
        assert_eq!(parse("STOP", Value::Null), Command::Stop);
        assert_eq!(parse("parar", Value::Null), Command::Stop);
        assert_eq!(parse("PING", Value::Null), Command::Ping);
        assert_eq!(parse("START_MODE", json!({"mode": "Colors"})), Command::StartMode("colors".into()));
        assert_eq!(parse("SAY", json!({"text": " oi "})), Command::Say("oi".into()));
        assert_eq!(parse("FALAR", json!({"texto": "Olá!"})), Command::Say("Olá!".into()));
    }

    #[test]
    fn legacy_game_commands() {
        assert_eq!(parse("JOGO_CORES", Value::Null), Command::StartMode("colors".into()));
        assert_eq!(parse("JOGO_PAPAGAIO", Value::Null), Command::StartMode("parrot".into()));
        assert_eq!(parse("JOGO_XADREZ", Value::Null), Command::StartMode("xadrez".into()));
        assert_eq!(parse("JOGO_", Value::Null), Command::Unknown("JOGO_".into()));
    }

    #[test]
    fn missing_parameters_are_unknown() {
        assert_eq!(parse("SAY", json!({"text": ""})), Command::Unknown("SAY".into()));
        assert_eq!(parse("START_MODE", Value::Null), Command::Unknown("START_MODE".into()));
        assert_eq!(parse("DANCE", Value::Null), Command::Unknown("DANCE".into()));
    }

    #[test]
    fn deserializes_fleet_rows() {
        let row: RemoteCommand = serde_json::from_value(json!({
            "id": 42,
            "mac_address": "AA:BB",
            "comando": "FALAR",
            "parametros": {"texto": "oi"}
        }))
        .unwrap();
        assert_eq!(row.id, 42);
        assert_eq!(Command::parse(&row), Command::Say("oi".into()));

        let row: RemoteCommand = serde_json::from_value(json!({"id": 1, "comando": "PARAR", "parametros": null})).unwrap();
        assert_eq!(Command::parse(&row), Command::Stop);
    }

    #[test]
    fn a_row_without_a_name_does_not_sink_the_batch() {
        let rows: Vec<RemoteCommand> = serde_json::from_value(json!([
            {"id": 5, "comando": null},
            {"id": 6},
            {"id": 7, "comando": "PARAR"}
        ]))
        .unwrap();
        assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), vec![5, 6, 7]);
        assert_eq!(Command::parse(&rows[0]), Command::Unknown(String::new()));
        assert_eq!(Command::parse(&rows[1]), Command::Unknown(String::new()));
        assert_eq!(Command::parse(&rows[2]), Command::Stop);
    }
}
