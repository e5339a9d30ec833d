//! MIDI port plumbing
//!
//! Connects the configured input and output ports with midir. A port's
//! position in the configuration is its port index: inbound bytes are tagged
//! with it and outbound messages are routed by it.

use anyhow::{Context, Result};
use midir::{Ignore, MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::message::{format_hex, Message, MidiMessage, SysexMessage};
use crate::output::MidiSink;

const CLIENT_NAME: &str = "Surface-Mapper";

/// List available MIDI input ports
pub fn list_input_ports() -> Result<Vec<String>> {
    let midi_in = MidiInput::new("Surface-Mapper-List").context("Failed to create MIDI input")?;
    Ok(midi_in
        .ports()
        .iter()
        .filter_map(|port| midi_in.port_name(port).ok())
        .collect())
}

/// List available MIDI output ports
pub fn list_output_ports() -> Result<Vec<String>> {
    let midi_out = MidiOutput::new("Surface-Mapper-List").context("Failed to create MIDI output")?;
    Ok(midi_out
        .ports()
        .iter()
        .filter_map(|port| midi_out.port_name(port).ok())
        .collect())
}

/// Print all ports, marking the ones the configured names would pick
pub fn print_ports(inputs: &[String], outputs: &[String]) -> Result<()> {
    use colored::*;

    println!("\n{}", "=== Available MIDI Ports ===".bold().cyan());

    let sections = [
        ("Input Ports:", list_input_ports()?, inputs),
        ("Output Ports:", list_output_ports()?, outputs),
    ];
    for (title, ports, wanted) in sections {
        println!("\n{}", title.bold());
        if ports.is_empty() {
            println!("  {}", "No ports found".dimmed());
            continue;
        }
        for name in &ports {
            match wanted.iter().position(|w| matches_name(name, w)) {
                Some(index) => println!("  {} {}", format!("[port {}]", index).green(), name),
                None => println!("  {} {}", "[unused]".dimmed(), name),
            }
        }
    }

    println!();
    Ok(())
}

/// Case-insensitive substring match
fn matches_name(name: &str, pattern: &str) -> bool {
    name.to_lowercase().contains(&pattern.to_lowercase())
}

fn find_port<P>(ports: Vec<P>, name_of: impl Fn(&P) -> Option<String>, pattern: &str) -> Option<(P, String)> {
    ports.into_iter().find_map(|port| {
        let name = name_of(&port)?;
        if matches_name(&name, pattern) {
            Some((port, name))
        } else {
            None
        }
    })
}

/// Open input connections; keep the value alive to keep receiving
pub struct InputPorts {
    connections: Vec<MidiInputConnection<()>>,
}

impl InputPorts {
    /// Connect every named input, forwarding parsed messages to `tx`
    pub fn connect(names: &[String], tx: mpsc::Sender<Message>) -> Result<Self> {
        let mut connections = Vec::with_capacity(names.len());

        for (index, pattern) in names.iter().enumerate() {
            let port_index = u8::try_from(index).context("Too many input ports")?;

            let mut midi_in = MidiInput::new(&format!("{}-Input-{}", CLIENT_NAME, index))
                .context("Failed to create MIDI input")?;
            // Sysex, timing and active sensing are all wanted
            midi_in.ignore(Ignore::None);

            debug!("Found {} MIDI input ports", midi_in.port_count());
            let (port, port_name) = find_port(midi_in.ports(), |p| midi_in.port_name(p).ok(), pattern)
                .ok_or_else(|| anyhow::anyhow!("Input port '{}' not found", pattern))?;

            info!("Connecting to input port {}: {}", port_index, port_name);

            let tx = tx.clone();
            let connection = midi_in
                .connect(
                    &port,
                    CLIENT_NAME,
                    move |_timestamp, data, _| match Message::from_raw(port_index, data) {
                        Some(message) => {
                            if tx.try_send(message).is_err() {
                                warn!("⚠️  Input queue full, dropping {}", format_hex(data));
                            }
                        }
                        None => debug!("Failed to parse MIDI: {}", format_hex(data)),
                    },
                    (),
                )
                .map_err(|e| anyhow::anyhow!("{}", e))
                .with_context(|| format!("Failed to connect to input port: {}", port_name))?;
            connections.push(connection);
        }

        Ok(Self { connections })
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

/// Sink writing to connected output ports, indexed by port
#[derive(Default)]
pub struct PortSink {
    outputs: Vec<MidiOutputConnection>,
}

impl PortSink {
    /// Connect every named output in order
    pub fn connect(names: &[String]) -> Result<Self> {
        let mut outputs = Vec::with_capacity(names.len());

        for (index, pattern) in names.iter().enumerate() {
            let midi_out = MidiOutput::new(&format!("{}-Output-{}", CLIENT_NAME, index))
                .context("Failed to create MIDI output")?;

            debug!("Found {} MIDI output ports", midi_out.port_count());
            let (port, port_name) = find_port(midi_out.ports(), |p| midi_out.port_name(p).ok(), pattern)
                .ok_or_else(|| anyhow::anyhow!("Output port '{}' not found", pattern))?;

            info!("Connecting to output port {}: {}", index, port_name);
            let connection = midi_out
                .connect(&port, CLIENT_NAME)
                .map_err(|e| anyhow::anyhow!("{}", e))
                .with_context(|| format!("Failed to connect to output port: {}", port_name))?;
            outputs.push(connection);
        }

        Ok(Self { outputs })
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    fn write(&mut self, port: u8, data: &[u8]) -> crate::Result<()> {
        let output = self.outputs.get_mut(port as usize).ok_or_else(|| Error::Send {
            port,
            reason: "port is not connected".to_string(),
        })?;
        output.send(data).map_err(|e| Error::Send {
            port,
            reason: e.to_string(),
        })
    }
}

impl MidiSink for PortSink {
    fn send_midi(&mut self, message: &MidiMessage) -> crate::Result<()> {
        self.write(message.port, &message.encode())
    }

    fn send_sysex(&mut self, message: &SysexMessage) -> crate::Result<()> {
        self.write(message.port, &message.encode())
    }
}

/// Sink for running without hardware; logs and counts what would be sent
#[derive(Debug, Default)]
pub struct DryRunSink {
    sent: u64,
}

impl DryRunSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }
}

impl MidiSink for DryRunSink {
    fn send_midi(&mut self, message: &MidiMessage) -> crate::Result<()> {
        self.sent += 1;
        info!("[DRY] {} | {}", message.short_hex(), message);
        Ok(())
    }

    fn send_sysex(&mut self, message: &SysexMessage) -> crate::Result<()> {
        self.sent += 1;
        info!("[DRY] sysex port {}: {}", message.port, message.data);
        Ok(())
    }
}
