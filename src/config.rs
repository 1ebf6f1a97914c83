//! User-controllable configuration (§3's **Config**), fed once from
//! `initialize.params.initializationOptions` and subsequently replaced by
//! `workspace/didChangeConfiguration`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};

use serde_derive::{Deserialize, Serialize};

/// Verbosity of `$/logTrace` notifications, mirrored by the `$/setTrace`
/// notification at runtime (see `AtomicTraceLevel` below, which is the
/// live atomic `server::dispatch::Coordinator` actually reads).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceLevel {
    Off,
    Messages,
    Verbose,
}

impl Default for TraceLevel {
    fn default() -> Self {
        TraceLevel::Off
    }
}

impl TraceLevel {
    fn from_u8(v: u8) -> TraceLevel {
        match v {
            1 => TraceLevel::Messages,
            2 => TraceLevel::Verbose,
            _ => TraceLevel::Off,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            TraceLevel::Off => 0,
            TraceLevel::Messages => 1,
            TraceLevel::Verbose => 2,
        }
    }
}

/// The live trace level, shared between the reader and worker contexts
/// (§5's "Trace level (atomic enum)"); updated by `$/setTrace` and read
/// whenever either context considers emitting a `$/logTrace` notification.
#[derive(Debug)]
pub struct AtomicTraceLevel(AtomicU8);

impl AtomicTraceLevel {
    pub fn new(level: TraceLevel) -> Self {
        AtomicTraceLevel(AtomicU8::new(level.as_u8()))
    }

    pub fn load(&self) -> TraceLevel {
        TraceLevel::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub fn store(&self, level: TraceLevel) {
        self.0.store(level.as_u8(), Ordering::SeqCst)
    }
}

impl Default for AtomicTraceLevel {
    fn default() -> Self {
        AtomicTraceLevel::new(TraceLevel::default())
    }
}

/// Deserialized user configuration. Every field has a sane default, since
/// clients are not required to send `initializationOptions` at all.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Initial `$/logTrace` verbosity, before any `$/setTrace` notification.
    pub trace_level: TraceLevel,
    /// When true, a postponable request whose named version is already
    /// stale at admission time is cancelled immediately instead of being
    /// added to the postponement table only to be invalidated moments
    /// later by the `change` that made it stale.
    pub short_circuit_stale_requests: bool,
    /// Seeds `indices_matter` on every freshly-guessed `Workspace`.
    pub indices_matter: bool,
    /// Seeds `impredicative_set` on every freshly-guessed `Workspace`.
    pub impredicative_set: bool,
    /// Seeds the debug bit on every freshly-guessed `Workspace`.
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            trace_level: TraceLevel::default(),
            short_circuit_stale_requests: true,
            indices_matter: false,
            impredicative_set: false,
            debug: false,
        }
    }
}

lazy_static::lazy_static! {
    /// Keys that are still accepted but should be reported to the user as
    /// deprecated, mapped to an optional hint about what replaced them.
    pub static ref DEPRECATED_OPTIONS: HashMap<&'static str, Option<&'static str>> = {
        [("impredicative_set_flag", Some("use `impredicative_set` instead"))]
            .iter()
            .copied()
            .collect()
    };
}

impl Config {
    /// Deserializes a `Config` from a JSON object, normalizing every
    /// first-level key to snake_case and reporting back (via the three
    /// out-parameters) any keys that, after normalization, collide
    /// (`dups`), aren't recognized (`unknowns`), or are deprecated
    /// (`deprecated`). The caller turns these into `window/showMessage`
    /// notifications rather than silently ignoring misconfiguration.
    pub fn try_deserialize(
        val: &serde_json::value::Value,
        dups: &mut HashMap<String, Vec<String>>,
        unknowns: &mut Vec<String>,
        deprecated: &mut Vec<String>,
    ) -> Result<Config, ()> {
        #[derive(Clone)]
        struct JsonValue(serde_json::value::Value);

        impl<'de> serde::de::IntoDeserializer<'de, serde_json::Error> for JsonValue {
            type Deserializer = serde_json::value::Value;
            fn into_deserializer(self) -> Self::Deserializer {
                self.0
            }
        }

        if let serde_json::Value::Object(map) = val {
            let seq = serde::de::value::MapDeserializer::new(map.iter().filter_map(|(k, v)| {
                use heck::SnakeCase;
                let snake_case = k.to_snake_case();
                let vec = dups.entry(snake_case.clone()).or_default();
                vec.push(k.to_string());

                if vec.len() == 1 {
                    if DEPRECATED_OPTIONS.contains_key(snake_case.as_str()) {
                        deprecated.push(snake_case.clone());
                    }
                    Some((snake_case, JsonValue(v.to_owned())))
                } else {
                    None
                }
            }));
            match serde_ignored::deserialize(seq, |path| unknowns.push(path.to_string())) {
                Ok(conf) => {
                    dups.retain(|_, v| v.len() > 1);
                    return Ok(conf);
                }
                Err(_) => {
                    dups.retain(|_, v| v.len() > 1);
                }
            }
        }
        Err(())
    }

    /// Replaces the whole configuration, as `workspace/didChangeConfiguration`
    /// does: unlike the `initialize` handshake there is no prior layer to
    /// merge with, since the client is expected to send a complete snapshot.
    pub fn update(&mut self, new: Config) {
        *self = new;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_permissive() {
        let value = serde_json::json!({});
        let config =
            Config::try_deserialize(&value, &mut Default::default(), &mut vec![], &mut vec![]).unwrap();
        assert_eq!(config.trace_level, TraceLevel::Off);
        assert!(config.short_circuit_stale_requests);
    }

    #[test]
    fn unknown_keys_are_reported_without_failing_deserialization() {
        let value = serde_json::json!({"debug": true, "bogusOption": 1});
        let mut unknowns = Vec::new();
        let config =
            Config::try_deserialize(&value, &mut Default::default(), &mut unknowns, &mut vec![]).unwrap();
        assert!(config.debug);
        assert_eq!(unknowns, vec!["bogusOption".to_owned()]);
    }

    #[test]
    fn duplicate_keys_after_snake_case_normalization_are_reported() {
        let value = serde_json::json!({"indicesMatter": true, "indices_matter": false});
        let mut dups = HashMap::new();
        let _ = Config::try_deserialize(&value, &mut dups, &mut vec![], &mut vec![]);
        assert!(dups.contains_key("indices_matter"));
        assert_eq!(dups["indices_matter"].len(), 2);
    }

    #[test]
    fn deprecated_keys_are_reported() {
        let value = serde_json::json!({"impredicative_set_flag": true});
        let mut deprecated = Vec::new();
        let config =
            Config::try_deserialize(&value, &mut Default::default(), &mut vec![], &mut deprecated);
        assert_eq!(deprecated, vec!["impredicative_set_flag".to_owned()]);
        // an unrecognized field name, even a deprecated one, doesn't map onto
        // any real Config field, so it also shows up as unknown to the caller
        assert!(config.is_ok());
    }

    #[test]
    fn atomic_trace_level_round_trips_through_store_and_load() {
        let level = AtomicTraceLevel::default();
        assert_eq!(level.load(), TraceLevel::Off);
        level.store(TraceLevel::Verbose);
        assert_eq!(level.load(), TraceLevel::Verbose);
    }

    #[test]
    fn update_replaces_wholesale() {
        let mut config = Config::default();
        config.debug = true;
        let mut replacement = Config::default();
        replacement.trace_level = TraceLevel::Verbose;
        config.update(replacement);
        assert!(!config.debug);
        assert_eq!(config.trace_level, TraceLevel::Verbose);
    }
}
