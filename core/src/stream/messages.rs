use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::types::now_millis;

// ============================================================================
// Inbound control messages
// ============================================================================

/// One inbound control frame. The schema is closed: an unknown `type` fails
/// to parse and is answered with an error frame instead of being ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe {
        /// Caller-chosen subscription id, echoed nowhere else; used to
        /// unsubscribe.
        id: String,
        channel: String,
        #[serde(default)]
        data: SubscribeOptions,
    },
    Unsubscribe {
        id: String,
    },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubscribeOptions {
    /// Poll cadence in milliseconds; required for every polled channel.
    pub interval: Option<u64>,
    pub filters: Option<HashMap<String, String>>,
    pub host_id: Option<i64>,
    pub container_id: Option<String>,
}

// ============================================================================
// Outbound frames
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerMessageType {
    Data,
    Error,
    Info,
}

/// One outbound frame, JSON-encoded one message per WebSocket text frame.
#[derive(Debug, Clone, Serialize)]
pub struct ServerMessage {
    #[serde(rename = "type")]
    pub kind: ServerMessageType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Unix milliseconds at frame construction.
    pub timestamp: i64,
}

impl ServerMessage {
    pub fn data(channel: &str, data: Value) -> Self {
        Self {
            kind: ServerMessageType::Data,
            channel: Some(channel.to_string()),
            data: Some(data),
            message: None,
            timestamp: now_millis(),
        }
    }

    pub fn error(channel: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            kind: ServerMessageType::Error,
            channel: channel.map(str::to_string),
            data: None,
            message: Some(message.into()),
            timestamp: now_millis(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            kind: ServerMessageType::Info,
            channel: None,
            data: None,
            message: Some(message.into()),
            timestamp: now_millis(),
        }
    }
}

// ============================================================================
// Channels
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    ContainerList,
    HostMetrics,
    ContainerStats,
    AllStats,
    /// Push-only re-publication of monitor events; no timer.
    Events,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ContainerList => "container_list",
            Self::HostMetrics => "host_metrics",
            Self::ContainerStats => "container_stats",
            Self::AllStats => "all_stats",
            Self::Events => "events",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "container_list" => Some(Self::ContainerList),
            "host_metrics" => Some(Self::HostMetrics),
            "container_stats" => Some(Self::ContainerStats),
            "all_stats" => Some(Self::AllStats),
            "events" => Some(Self::Events),
            _ => None,
        }
    }
}

/// Catalog entry describing one channel for discovery.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub requires_interval: bool,
    /// Accepted `data` parameters for subscribe.
    pub params: &'static [&'static str],
}

pub fn channel_catalog() -> Vec<ChannelInfo> {
    vec![
        ChannelInfo {
            name: "container_list",
            description: "All containers across reachable hosts, optionally filtered by state",
            requires_interval: true,
            params: &["interval", "filters.state"],
        },
        ChannelInfo {
            name: "host_metrics",
            description: "Engine and resource metrics per host, or for one host",
            requires_interval: true,
            params: &["interval", "hostId"],
        },
        ChannelInfo {
            name: "container_stats",
            description: "Resource usage of one container",
            requires_interval: true,
            params: &["interval", "hostId", "containerId"],
        },
        ChannelInfo {
            name: "all_stats",
            description: "Combined container stats and host metrics in one collection cycle",
            requires_interval: true,
            params: &["interval"],
        },
        ChannelInfo {
            name: "events",
            description: "Monitor events (lifecycle, health, errors) as they happen",
            requires_interval: false,
            params: &[],
        },
    ]
}
