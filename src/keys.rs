//! Hotkey chords and the table binding them to control events.
//!
//! A chord is written `<mods>-<key>`, e.g. `C-S-F11`. Modifiers are `C`
//! (control), `S` (shift), `M` (mod1) and `H` (mod4). Key names compare
//! case-insensitively.
use std::{fmt, str::FromStr};

use crate::{
    conf::KeysConf,
    control::{ControlEvent, SignalKind},
    error::ConfigError,
};

const CONTROL: u8 = 1 << 0;
const SHIFT: u8 = 1 << 1;
const MOD1: u8 = 1 << 2;
const MOD4: u8 = 1 << 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chord {
    mods: u8,
    key: String,
}

impl FromStr for Chord {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (prefix, key) = match s.rfind('-') {
            Some(idx) => (&s[..idx], &s[idx + 1..]),
            None => ("", s),
        };
        if key.is_empty() {
            return Err("missing key name".into());
        }

        let mut mods = 0;
        for m in prefix.split('-').filter(|m| !m.is_empty()) {
            let bit = match m {
                "C" => CONTROL,
                "S" => SHIFT,
                "M" => MOD1,
                "H" => MOD4,
                other => return Err(format!("unknown modifier {other:?}")),
            };
            mods |= bit;
        }

        Ok(Self {
            mods,
            key: key.to_ascii_lowercase(),
        })
    }
}

impl fmt::Display for Chord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (bit, name) in [(CONTROL, "C"), (SHIFT, "S"), (MOD1, "M"), (MOD4, "H")] {
            if self.mods & bit != 0 {
                write!(f, "{name}-")?;
            }
        }
        f.write_str(&self.key)
    }
}

/// The four grabbed chords. Bare command words are accepted as well so a
/// hotkey daemon does not have to know which chords are configured.
#[derive(Debug, Clone)]
pub struct Bindings {
    table: [(Chord, ControlEvent); 4],
}

impl Bindings {
    pub fn new(conf: &KeysConf) -> Result<Self, ConfigError> {
        let parse = |chord: &str| {
            chord.parse::<Chord>().map_err(|reason| ConfigError::Binding {
                chord: chord.to_string(),
                reason,
            })
        };

        let table = [
            (parse(&conf.quit)?, ControlEvent::RequestQuit),
            (parse(&conf.abort)?, ControlEvent::RequestAbortRestart),
            (parse(&conf.kill)?, ControlEvent::RequestKillRestart),
            (parse(&conf.terminate)?, ControlEvent::RequestTerminateRestart),
        ];

        for (i, (chord, _)) in table.iter().enumerate() {
            if table[..i].iter().any(|(other, _)| other == chord) {
                return Err(ConfigError::Binding {
                    chord: chord.to_string(),
                    reason: "bound more than once".into(),
                });
            }
        }

        Ok(Self { table })
    }

    /// Maps one line from the control channel to an event.
    pub fn resolve(&self, line: &str) -> Option<ControlEvent> {
        let line = line.trim();
        if let Some(event) = command_word(line) {
            return Some(event);
        }
        let chord = line.parse::<Chord>().ok()?;
        self.table
            .iter()
            .find(|(bound, _)| *bound == chord)
            .map(|(_, event)| *event)
    }

    pub fn describe(&self) -> String {
        self.table
            .iter()
            .map(|(chord, event)| format!("{chord}({})", event.label()))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn command_word(word: &str) -> Option<ControlEvent> {
    match word {
        "quit" | "exit" => Some(ControlEvent::RequestQuit),
        "abort" => Some(ControlEvent::RequestAbortRestart),
        "kill" => Some(ControlEvent::RequestKillRestart),
        "terminate" | "term" => Some(ControlEvent::RequestTerminateRestart),
        "restart" => Some(ControlEvent::SoftRestart(SignalKind::Terminate)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_modifiers_in_any_order() {
        let a: Chord = "C-S-F6".parse().unwrap();
        let b: Chord = "S-C-f6".parse().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "C-S-f6");
    }

    #[test]
    fn rejects_unknown_modifier() {
        assert!("X-F6".parse::<Chord>().is_err());
        assert!("C-S-".parse::<Chord>().is_err());
    }

    #[test]
    fn default_table_matches_magic_keys() {
        let bindings = Bindings::new(&KeysConf::default()).unwrap();
        assert_eq!(
            bindings.resolve("C-S-Escape"),
            Some(ControlEvent::RequestQuit)
        );
        assert_eq!(
            bindings.resolve("C-S-F6"),
            Some(ControlEvent::RequestAbortRestart)
        );
        assert_eq!(
            bindings.resolve("C-S-F9"),
            Some(ControlEvent::RequestKillRestart)
        );
        assert_eq!(
            bindings.resolve("C-S-F11\r"),
            Some(ControlEvent::RequestTerminateRestart)
        );
    }

    #[test]
    fn modifiers_must_match_exactly() {
        let bindings = Bindings::new(&KeysConf::default()).unwrap();
        assert_eq!(bindings.resolve("C-F6"), None);
        assert_eq!(bindings.resolve("C-S-M-F6"), None);
        assert_eq!(bindings.resolve("C-S-F1"), None);
    }

    #[test]
    fn command_words_bypass_the_table() {
        let bindings = Bindings::new(&KeysConf::default()).unwrap();
        assert_eq!(bindings.resolve("kill"), Some(ControlEvent::RequestKillRestart));
        assert_eq!(
            bindings.resolve("restart"),
            Some(ControlEvent::SoftRestart(SignalKind::Terminate))
        );
    }

    #[test]
    fn duplicate_chords_are_refused() {
        let conf = KeysConf {
            kill: "C-S-F6".into(),
            ..KeysConf::default()
        };
        assert!(matches!(
            Bindings::new(&conf),
            Err(ConfigError::Binding { .. })
        ));
    }
}
