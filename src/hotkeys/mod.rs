use std::collections::HashMap;


/// Player and application controls that can be bound to keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    OsdToggle,
    Pause,
    Seek(i64),
    Volume(i64),
    NextAlternative,
    PreviousAlternative,
    SwitchAlternative,
    Quit,
}

/// Parses an action string from the configuration. `seek` and `volume` carry
/// a signed argument glued to the name: `seek+3`, `seek-3`, `volume+10`.
pub fn parse_action(action: &str) -> anyhow::Result<Action> {
    for (prefix, build) in [
        ("seek", Action::Seek as fn(i64) -> Action),
        ("volume", Action::Volume as fn(i64) -> Action),
    ] {
        if let Some(arg) = action.strip_prefix(prefix) {
            if !arg.is_empty() {
                let value: i64 = arg
                    .parse()
                    .map_err(|_| anyhow::anyhow!("Invalid action '{}'", action))?;
                return Ok(build(value));
            }
        }
    }

    match action {
        "osd_toggle" => Ok(Action::OsdToggle),
        "pause" => Ok(Action::Pause),
        "next_alternative" => Ok(Action::NextAlternative),
        "previous_alternative" => Ok(Action::PreviousAlternative),
        "switch_alternative" => Ok(Action::SwitchAlternative),
        "quit" => Ok(Action::Quit),
        _ => Err(anyhow::anyhow!("Invalid action '{}'", action)),
    }
}

/// In-window hotkey bindings, built from the configuration's key-name ->
/// action-string map.
pub struct HotkeyMap {
    bindings: HashMap<egui::Key, Action>,
}

impl HotkeyMap {
    pub fn from_config(hotkeys: &HashMap<String, String>) -> anyhow::Result<Self> {
        let mut bindings = HashMap::new();

        for (key_name, action_name) in hotkeys {
            let key = egui::Key::from_name(key_name)
                .ok_or_else(|| anyhow::anyhow!("Invalid hotkey '{}'", key_name))?;
            let action = parse_action(action_name).map_err(|_| {
                anyhow::anyhow!("Invalid action '{}' for hotkey '{}'", action_name, key_name)
            })?;
            bindings.insert(key, action);
        }

        Ok(Self { bindings })
    }

    pub fn action_for(&self, key: egui::Key) -> Option<Action> {
        self.bindings.get(&key).copied()
    }
}
