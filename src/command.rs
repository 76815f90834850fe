//! Control commands understood by the device firmware.
//!
//! Every command serializes to a flat JSON object whose first key is
//! `action`; the remaining keys follow in declaration order.

use std::io;

use serde::Serialize;
use serde::ser::Error as _;
use serde_json::ser::Formatter;

use crate::config::Topics;

/// Which control topic a command is published to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Wifi,
    Led,
    Rec,
}

impl Channel {
    pub fn topic(self, topics: &Topics) -> String {
        match self {
            Channel::Wifi => topics.wifi_control(),
            Channel::Led => topics.led_control(),
            Channel::Rec => topics.rec_control(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LedMode {
    Solid,
    Rainbow,
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Start,
    Stop,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum LedCommand {
    SetColor { r: u8, g: u8, b: u8 },
    SetMode { mode: LedMode },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RecCommand {
    Record {
        status: Status,
    },
    Playback {
        status: Status,
        #[serde(skip_serializing_if = "Option::is_none")]
        count: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        interval_ms: Option<u32>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum WifiCommand {
    List,
    Add { ssid: String, password: String },
    Set { ssid: String, password: String },
    Del { ssid: String },
    Clear,
    Apply,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Command {
    Led(LedCommand),
    Rec(RecCommand),
    Wifi(WifiCommand),
}

impl Command {
    pub fn set_color(r: u8, g: u8, b: u8) -> Self {
        Command::Led(LedCommand::SetColor { r, g, b })
    }

    pub fn set_mode(mode: LedMode) -> Self {
        Command::Led(LedCommand::SetMode { mode })
    }

    pub fn record(status: Status) -> Self {
        Command::Rec(RecCommand::Record { status })
    }

    pub fn playback_start(count: Option<u32>, interval_ms: Option<u32>) -> Self {
        Command::Rec(RecCommand::Playback {
            status: Status::Start,
            count,
            interval_ms,
        })
    }

    pub fn playback_stop() -> Self {
        Command::Rec(RecCommand::Playback {
            status: Status::Stop,
            count: None,
            interval_ms: None,
        })
    }

    pub fn wifi_list() -> Self {
        Command::Wifi(WifiCommand::List)
    }

    pub fn wifi_add(ssid: impl Into<String>, password: impl Into<String>) -> Self {
        Command::Wifi(WifiCommand::Add {
            ssid: ssid.into(),
            password: password.into(),
        })
    }

    pub fn wifi_set(ssid: impl Into<String>, password: impl Into<String>) -> Self {
        Command::Wifi(WifiCommand::Set {
            ssid: ssid.into(),
            password: password.into(),
        })
    }

    pub fn wifi_del(ssid: impl Into<String>) -> Self {
        Command::Wifi(WifiCommand::Del { ssid: ssid.into() })
    }

    pub fn channel(&self) -> Channel {
        match self {
            Command::Led(_) => Channel::Led,
            Command::Rec(_) => Channel::Rec,
            Command::Wifi(_) => Channel::Wifi,
        }
    }

    /// Single-line JSON text sent as the MQTT payload, with `", "` and
    /// `": "` separators. Non-ASCII text is written as UTF-8, not escaped.
    pub fn to_payload(&self) -> Result<String, serde_json::Error> {
        let mut buf = Vec::new();
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, SpacedFormatter);
        self.serialize(&mut ser)?;
        String::from_utf8(buf).map_err(serde_json::Error::custom)
    }
}

/// One line, a space after every `,` and `:`.
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}
