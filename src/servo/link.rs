// Serial protocol of the PWM bridge
//
// Packet format: [0xFF, 0xFF, ID, Length, Instruction, Params..., Checksum]
// ID is an output channel (pin) or the broadcast id for synchronised frames.
// The bridge never answers; every packet is fire-and-forget.

use serialport::{self, SerialPort};
use std::io::Write;
use std::time::Duration;
use tracing::debug;

use crate::config::{PULSE_MAX_US, PULSE_MIN_US};

/// Default serial configuration for the bridge
pub const DEFAULT_BAUDRATE: u32 = 115_200;
pub const DEFAULT_TIMEOUT_MS: u64 = 100;

/// Packet header bytes
const HEADER: [u8; 2] = [0xFF, 0xFF];

/// Addresses every channel at once
pub const BROADCAST_ID: u8 = 0xFE;

/// Instruction set
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum Instruction {
    /// Apply one channel's pulse immediately
    Write = 0x03,
    /// Apply several channels in a single output update
    SyncWrite = 0x83,
}

/// Convert an angle (clamped to 0-180 degrees) to a pulse width in microseconds
pub fn angle_to_pulse_us(angle: u8) -> u16 {
    let angle = angle.min(180) as u32;
    let range = (PULSE_MAX_US - PULSE_MIN_US) as u32;
    PULSE_MIN_US + (range * angle / 180) as u16
}

/// Framed writer towards the PWM bridge
pub struct ServoLink<W: Write = Box<dyn SerialPort>> {
    port: W,
}

impl ServoLink {
    /// Open the bridge's serial port
    pub fn open(port_name: &str) -> serialport::Result<Self> {
        Self::open_with_baudrate(port_name, DEFAULT_BAUDRATE)
    }

    /// Open with custom baudrate
    pub fn open_with_baudrate(port_name: &str, baudrate: u32) -> serialport::Result<Self> {
        let port = serialport::new(port_name, baudrate)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;

        Ok(Self { port })
    }
}

impl<W: Write> ServoLink<W> {
    /// Wrap an already open byte sink
    pub fn from_writer(port: W) -> Self {
        Self { port }
    }

    pub fn get_ref(&self) -> &W {
        &self.port
    }

    /// Calculate checksum for a packet (excluding header)
    fn checksum(data: &[u8]) -> u8 {
        let sum: u16 = data.iter().map(|&b| b as u16).sum();
        (!sum & 0xFF) as u8
    }

    /// Build a packet with header and checksum
    fn build_packet(id: u8, instruction: Instruction, params: &[u8]) -> Vec<u8> {
        let length = (params.len() + 2) as u8; // params + instruction + checksum
        let mut packet = Vec::with_capacity(6 + params.len());

        packet.extend_from_slice(&HEADER);
        packet.push(id);
        packet.push(length);
        packet.push(instruction as u8);
        packet.extend_from_slice(params);

        let checksum_data = &packet[2..]; // skip header
        packet.push(Self::checksum(checksum_data));

        packet
    }

    fn send_packet(&mut self, packet: &[u8]) -> std::io::Result<()> {
        self.port.write_all(packet)?;
        self.port.flush()
    }

    /// Set a single channel's pulse width, effective immediately
    pub fn write_pulse(&mut self, channel: u8, pulse_us: u16) -> std::io::Result<()> {
        let [lo, hi] = pulse_us.to_le_bytes();
        let packet = Self::build_packet(channel, Instruction::Write, &[lo, hi]);
        debug!("Write pulse to channel {}: {}us", channel, pulse_us);
        self.send_packet(&packet)
    }

    /// Set several channels' pulse widths in one output update
    /// data: [(channel, pulse_us), ...]
    pub fn sync_write_pulses(&mut self, data: &[(u8, u16)]) -> std::io::Result<()> {
        if data.is_empty() {
            return Ok(());
        }

        // [data_length, ch1, lo1, hi1, ch2, lo2, hi2, ...]
        let data_length: u8 = 2;
        let mut params = Vec::with_capacity(1 + data.len() * 3);
        params.push(data_length);

        for &(channel, pulse_us) in data {
            params.push(channel);
            params.extend_from_slice(&pulse_us.to_le_bytes());
        }

        let packet = Self::build_packet(BROADCAST_ID, Instruction::SyncWrite, &params);
        debug!("Sync write to {} channels", data.len());
        self.send_packet(&packet)
    }
}
