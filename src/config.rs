//! Configuration management for Surface Mapper
//!
//! A YAML file describes the MIDI ports, gesture timing, the surface's
//! controls and the views built on top of them. Components declared in views
//! report to a [`ConsoleActions`] sink.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;
use tokio::fs;

use crate::actions::{ActionButton, ActionGate, ActionRange, ActionToggle, ConsoleActions, ModeGate, ViewSelect};
use crate::component::{Button, Component, Gate, GestureConfig, Range, Toggle};
use crate::control::Control;
use crate::pattern::MessagePattern;
use crate::session::Session;
use crate::view::ViewDefinition;
use crate::BASE_MODE;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SurfaceConfig {
    #[serde(default)]
    pub midi: MidiConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    pub controls: BTreeMap<String, ControlConfig>,
    pub views: Vec<ViewConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_view: Option<String>,
}

/// MIDI ports; a port's index in these lists is the port byte of its messages
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MidiConfig {
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimingConfig {
    #[serde(default = "default_gesture_ms")]
    pub long_press_ms: u64,
    #[serde(default = "default_gesture_ms")]
    pub double_press_ms: u64,
    #[serde(default = "default_gesture_ms")]
    pub range_input_delay_ms: u64,
    #[serde(default = "default_flush_interval")]
    pub flush_interval_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            long_press_ms: default_gesture_ms(),
            double_press_ms: default_gesture_ms(),
            range_input_delay_ms: default_gesture_ms(),
            flush_interval_ms: default_flush_interval(),
        }
    }
}

impl TimingConfig {
    pub fn gestures(&self) -> GestureConfig {
        GestureConfig {
            long_press: Duration::from_millis(self.long_press_ms),
            double_press: Duration::from_millis(self.double_press_ms),
        }
    }

    pub fn range_input_delay(&self) -> Duration {
        Duration::from_millis(self.range_input_delay_ms)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ControlKind {
    Note,
    Cc,
    PitchBend,
    ChannelPressure,
    KeyPressure,
}

/// A physical control, either typed or given as raw patterns
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ControlConfig {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ControlKind>,
    #[serde(default)]
    pub port: u8,
    #[serde(default)]
    pub channel: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cc: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patterns: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub midi_out: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<bool>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Button,
    Toggle,
    Gate,
    Range,
    /// Gate holding `target` mode active
    Mode,
    /// Press activates the `target` view
    View,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ComponentConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ComponentKind,
    /// Mode the component is bound in; the base mode when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    pub controls: Vec<String>,
    /// Action name reported to the console; defaults to the component name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ViewConfig {
    pub name: String,
    #[serde(default)]
    pub extends: Vec<String>,
    #[serde(default)]
    pub components: Vec<ComponentConfig>,
}

impl SurfaceConfig {
    /// Load configuration from file with validation
    pub async fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path))?;

        Self::from_yaml(&contents).with_context(|| format!("Invalid config file: {}", path))
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: SurfaceConfig = serde_yaml::from_str(contents).context("Failed to parse YAML config")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.controls.is_empty() {
            anyhow::bail!("At least one control must be defined");
        }
        if self.views.is_empty() {
            anyhow::bail!("At least one view must be defined");
        }

        let port_count = self.midi.inputs.len().max(self.midi.outputs.len());
        for (name, control) in &self.controls {
            control
                .validate(port_count)
                .with_context(|| format!("Invalid control '{}'", name))?;
        }

        let mut view_names = HashSet::new();
        for (view_idx, view) in self.views.iter().enumerate() {
            if view.name.is_empty() {
                anyhow::bail!("View {} name cannot be empty", view_idx);
            }
            if !view_names.insert(view.name.as_str()) {
                anyhow::bail!("View '{}' is defined more than once", view.name);
            }
        }

        for view in &self.views {
            for parent in &view.extends {
                if !view_names.contains(parent.as_str()) {
                    anyhow::bail!("View '{}' extends unknown view '{}'", view.name, parent);
                }
            }
            for component in &view.components {
                self.validate_component(component, &view_names)
                    .with_context(|| format!("Invalid component '{}' in view '{}'", component.name, view.name))?;
            }
        }

        if let Some(initial) = &self.initial_view {
            if !view_names.contains(initial.as_str()) {
                anyhow::bail!("Initial view '{}' is not defined", initial);
            }
        }

        Ok(())
    }

    fn validate_component(&self, component: &ComponentConfig, view_names: &HashSet<&str>) -> Result<()> {
        if component.name.is_empty() {
            anyhow::bail!("Component name cannot be empty");
        }
        if component.controls.is_empty() {
            anyhow::bail!("Component must be bound to at least one control");
        }
        for control in &component.controls {
            if !self.controls.contains_key(control) {
                anyhow::bail!("Unknown control '{}'", control);
            }
        }

        match component.kind {
            ComponentKind::Mode => {
                let target = component.target()?;
                if target == BASE_MODE {
                    anyhow::bail!("Mode '{}' is reserved", BASE_MODE);
                }
            }
            ComponentKind::View => {
                let target = component.target()?;
                if !view_names.contains(target) {
                    anyhow::bail!("Target view '{}' is not defined", target);
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// View shown after init: `initial_view`, otherwise the first one
    pub fn initial_view(&self) -> Option<&str> {
        self.initial_view
            .as_deref()
            .or_else(|| self.views.first().map(|v| v.name.as_str()))
    }

    /// Register every control and view with `session`
    ///
    /// Components are built up front so configuration mistakes surface here
    /// rather than during view initialisation.
    pub fn register(&self, session: &mut Session, actions: &ConsoleActions) -> Result<()> {
        let controls = self
            .controls
            .iter()
            .map(|(name, control)| {
                control
                    .build()
                    .with_context(|| format!("Failed to build control '{}'", name))
                    .map(|built| (name.clone(), built))
            })
            .collect::<Result<Vec<_>>>()?;
        session
            .register_controls(controls)
            .context("Failed to register controls")?;

        let mut definitions = Vec::with_capacity(self.views.len());
        for view in &self.views {
            let mut components = Vec::with_capacity(view.components.len());
            for component in &view.components {
                let behaviour = component
                    .build(actions, &self.timing)
                    .with_context(|| format!("Failed to build component '{}'", component.name))?;
                let mode = component.mode.clone().unwrap_or_else(|| BASE_MODE.to_string());
                components.push((mode, component.name.clone(), component.controls.clone(), behaviour));
            }

            let definition = view
                .extends
                .iter()
                .fold(ViewDefinition::new(view.name.as_str()), |def, parent| def.extends(parent.as_str()));
            definitions.push(definition.with_components(move |builder| {
                for (mode, name, controls, behaviour) in components {
                    let controls: Vec<&str> = controls.iter().map(String::as_str).collect();
                    builder.add_boxed(&mode, &name, &controls, behaviour)?;
                }
                Ok(())
            }));
        }
        session
            .register_views(definitions)
            .context("Failed to register views")?;

        Ok(())
    }
}

impl ControlConfig {
    fn validate(&self, port_count: usize) -> Result<()> {
        if self.channel > 15 {
            anyhow::bail!("Invalid MIDI channel {} (must be 0-15)", self.channel);
        }
        if port_count > 0 && self.port as usize >= port_count {
            anyhow::bail!("Port {} is not configured (have {} ports)", self.port, port_count);
        }
        if let Some(key) = self.key {
            if key > 127 {
                anyhow::bail!("Invalid key {} (must be 0-127)", key);
            }
        }
        if let Some(cc) = self.cc {
            if cc > 127 {
                anyhow::bail!("Invalid CC number {} (must be 0-127)", cc);
            }
        }

        match (self.kind, &self.patterns) {
            (Some(_), Some(_)) => anyhow::bail!("Use either 'type' or 'patterns', not both"),
            (None, None) => anyhow::bail!("Either 'type' or 'patterns' is required"),
            (None, Some(patterns)) => {
                if patterns.is_empty() {
                    anyhow::bail!("At least one pattern is required");
                }
                for pattern in patterns {
                    MessagePattern::parse(pattern)?;
                }
            }
            (Some(kind @ (ControlKind::Note | ControlKind::KeyPressure)), None) => {
                if self.key.is_none() {
                    anyhow::bail!("{:?} type requires 'key' field", kind);
                }
            }
            (Some(ControlKind::Cc), None) => {
                if self.cc.is_none() {
                    anyhow::bail!("CC type requires 'cc' field");
                }
            }
            (Some(_), None) => {}
        }

        if let (Some(min), Some(max)) = (self.min, self.max) {
            if min > max {
                anyhow::bail!("Minimum {} is greater than maximum {}", min, max);
            }
        }
        Ok(())
    }

    pub fn build(&self) -> Result<Control> {
        let (port, channel) = (self.port, self.channel);
        let key = || self.key.context("Missing 'key' field");

        let mut control = match self.kind {
            Some(ControlKind::Note) => Control::note(port, channel, key()?),
            Some(ControlKind::KeyPressure) => Control::key_pressure(port, channel, key()?),
            Some(ControlKind::Cc) => {
                let cc = self.cc.context("Missing 'cc' field")?;
                Control::control_change(port, channel, cc)
            }
            Some(ControlKind::PitchBend) => Control::pitch_bend(port, channel),
            Some(ControlKind::ChannelPressure) => Control::channel_pressure(port, channel),
            None => {
                let patterns = self.patterns.as_deref().unwrap_or_default();
                let patterns: Vec<&str> = patterns.iter().map(String::as_str).collect();
                Control::from_patterns(&patterns)?
            }
        };

        if self.min.is_some() || self.max.is_some() {
            let min = self.min.unwrap_or(control.min_value());
            let max = self.max.unwrap_or(control.max_value());
            control = control.with_range(min, max);
        }
        if let Some(enabled) = self.midi_out {
            control = control.with_midi_out(enabled);
        }
        if let Some(enabled) = self.cache {
            control = control.with_cache(enabled);
        }
        Ok(control)
    }
}

impl ComponentConfig {
    fn target(&self) -> Result<&str> {
        self.target
            .as_deref()
            .with_context(|| format!("{:?} component requires 'target' field", self.kind))
    }

    pub fn build(&self, actions: &ConsoleActions, timing: &TimingConfig) -> Result<Box<dyn Component>> {
        let action = self.action.clone().unwrap_or_else(|| self.name.clone());
        let actions = actions.clone();

        let component: Box<dyn Component> = match self.kind {
            ComponentKind::Button => Box::new(Button::with_gestures(
                ActionButton::new(action, actions),
                timing.gestures(),
            )),
            ComponentKind::Toggle => Box::new(Toggle::new(ActionToggle::new(action, actions))),
            ComponentKind::Gate => Box::new(Gate::new(ActionGate::new(action, actions))),
            ComponentKind::Range => Box::new(
                Range::new(ActionRange::new(action, actions)).with_input_delay(timing.range_input_delay()),
            ),
            ComponentKind::Mode => Box::new(Gate::new(ModeGate::new(self.target()?))),
            ComponentKind::View => Box::new(Button::with_gestures(
                ViewSelect::new(self.target()?),
                timing.gestures(),
            )),
        };
        Ok(component)
    }
}

// Default value functions
fn default_gesture_ms() -> u64 { 350 }
fn default_flush_interval() -> u64 { 10 }

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Message, MidiMessage};
    use crate::output::MemorySink;
    use crate::scheduler::ManualClock;
    use std::io::Write;

    const SAMPLE: &str = r#"
midi:
  inputs: ["X-Touch"]
  outputs: ["X-Touch"]
timing:
  long_press_ms: 500
controls:
  PLAY:  { type: note, channel: 0, key: 94 }
  SHIFT: { type: note, channel: 0, key: 70 }
  FADER: { type: pitch_bend, channel: 0 }
  KNOB:  { type: cc, channel: 0, cc: 16 }
  PAD:   { patterns: ["B1??7F"], min: 0, max: 127 }
views:
  - name: GLOBAL
    components:
      - { name: shift, type: mode, target: SHIFT, controls: [SHIFT] }
  - name: MIX
    extends: [GLOBAL]
    components:
      - { name: play, type: toggle, controls: [PLAY], action: transport.play }
      - { name: volume, type: range, controls: [FADER], action: mixer.volume }
      - { name: alt, type: button, mode: SHIFT, controls: [PLAY], action: transport.stop }
initial_view: MIX
"#;

    fn with_sample(edit: impl FnOnce(&mut SurfaceConfig)) -> Result<()> {
        let mut config: SurfaceConfig = serde_yaml::from_str(SAMPLE)?;
        edit(&mut config);
        config.validate()
    }

    fn note(key: u8, velocity: u8) -> Message {
        MidiMessage::note_on(0, 0, key, velocity).into()
    }

    #[test]
    fn test_parse_sample() {
        let config = SurfaceConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.controls.len(), 5);
        assert_eq!(config.views.len(), 2);
        assert_eq!(config.views[1].extends, vec!["GLOBAL"]);
        assert_eq!(config.initial_view(), Some("MIX"));
        assert_eq!(config.timing.long_press_ms, 500);
        assert_eq!(config.timing.double_press_ms, 350);
        assert_eq!(config.timing.flush_interval(), Duration::from_millis(10));
        assert_eq!(config.controls["PAD"].kind, None);
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = SurfaceConfig::load(file.path().to_str().unwrap()).await.unwrap();
        assert_eq!(config.midi.inputs, vec!["X-Touch"]);
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.yaml");

        let err = SurfaceConfig::load(path.to_str().unwrap()).await.unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_unknown_component_type() {
        let yaml = SAMPLE.replace("type: toggle", "type: slider");
        assert!(SurfaceConfig::from_yaml(&yaml).is_err());
    }

    #[test]
    fn test_validation_failures() {
        assert!(with_sample(|c| c.views.clear()).is_err());
        assert!(with_sample(|c| c.initial_view = Some("NOPE".into())).is_err());
        assert!(with_sample(|c| c.controls.get_mut("PLAY").unwrap().channel = 16).is_err());
        assert!(with_sample(|c| c.controls.get_mut("KNOB").unwrap().cc = Some(128)).is_err());
        assert!(with_sample(|c| c.controls.get_mut("KNOB").unwrap().cc = None).is_err());
        assert!(with_sample(|c| c.controls.get_mut("PLAY").unwrap().port = 1).is_err());
        assert!(with_sample(|c| c.controls.get_mut("PAD").unwrap().patterns = Some(vec!["B0?".into()])).is_err());
        assert!(with_sample(|c| c.views[1].components[0].controls = vec!["MISSING".into()]).is_err());
        assert!(with_sample(|c| c.views[0].components[0].target = None).is_err());
        assert!(with_sample(|c| c.views[1].extends = vec!["NOPE".into()]).is_err());
        assert!(with_sample(|c| {
            let duplicate = c.views[0].clone();
            c.views.push(duplicate);
        })
        .is_err());
    }

    #[test]
    fn test_build_control_ranges() {
        let config = SurfaceConfig::from_yaml(SAMPLE).unwrap();
        let fader = config.controls["FADER"].build().unwrap();
        assert_eq!(fader.max_value(), 0x3FFF);

        let mut knob = config.controls["KNOB"].clone();
        knob.max = Some(64);
        assert_eq!(knob.build().unwrap().max_value(), 64);
    }

    #[test]
    fn test_register_runs_surface() {
        let config = SurfaceConfig::from_yaml(SAMPLE).unwrap();
        let actions = ConsoleActions::new();
        let sink = MemorySink::new();
        let mut session = Session::with_clock(Box::new(sink.clone()), Box::new(ManualClock::new()));

        config.register(&mut session, &actions).unwrap();
        session.init().unwrap();
        session.activate_view(config.initial_view().unwrap()).unwrap();

        assert_eq!(session.owner_of("PLAY"), Some("play"));
        assert_eq!(session.owner_of("SHIFT"), Some("shift"));

        session.on_midi_input(&note(94, 127)).unwrap();
        session.on_midi_input(&note(70, 127)).unwrap();
        assert_eq!(session.owner_of("PLAY"), Some("alt"));
        session.on_midi_input(&note(94, 127)).unwrap();

        assert_eq!(
            actions.summary(),
            vec![
                ("transport.play".to_string(), "on", None),
                ("transport.stop".to_string(), "press", None),
            ]
        );
    }

    #[test]
    fn test_overlapping_controls_fail_at_init() {
        let yaml = SAMPLE.replace(r#"PAD:   { patterns: ["B1??7F"], min: 0, max: 127 }"#, r#"PAD:   { patterns: ["B010??"] }"#);
        let config = SurfaceConfig::from_yaml(&yaml).unwrap();
        let mut session = Session::new(Box::new(MemorySink::new()));

        config.register(&mut session, &ConsoleActions::new()).unwrap();
        assert!(session.init().is_err());
    }
}
