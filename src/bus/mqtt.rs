// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! MQTT transport over `rumqttc`.
//!
//! [`MqttBus::connect`] splits the client in two:
//!
//! - [`MqttBus`]: cloneable handle used for publishing commands and for the
//!   final disconnect.
//! - [`MqttEventPump`]: owns the event loop. It must be polled for anything to
//!   happen, including outbound publishes, so it runs as its own task.
//!
//! On every ConnAck the pump re-subscribes to the configured topics and
//! announces `online` on the retained status topic; the broker publishes the
//! `offline` last will if the connection drops uncleanly.

use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, LastWill, MqttOptions, Outgoing, Packet, QoS};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};

use super::{BusError, BusEvent, CommandSink};
use crate::config::BusConfig;
use crate::resilience::retry::RetryConfig;

const ONLINE: &[u8] = b"online";
const OFFLINE: &[u8] = b"offline";

#[derive(Clone)]
pub struct MqttBus {
    client: AsyncClient,
    request_timeout: Duration,
    status_topic: String,
}

pub struct MqttEventPump {
    eventloop: EventLoop,
    client: AsyncClient,
    topics: Vec<String>,
    status_topic: String,
    reconnect: RetryConfig,
}

impl MqttBus {
    /// Build the client pair. No network traffic happens until the pump runs.
    pub fn connect<I, S>(config: &BusConfig, topics: I) -> (Self, MqttEventPump)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut options = MqttOptions::new(config.client_id.clone(), config.host.clone(), config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
        options.set_last_will(LastWill::new(
            config.status_topic.clone(),
            OFFLINE.to_vec(),
            QoS::AtLeastOnce,
            true,
        ));

        let (client, eventloop) = AsyncClient::new(options, config.channel_capacity);

        let bus = Self {
            client: client.clone(),
            request_timeout: config.request_timeout(),
            status_topic: config.status_topic.clone(),
        };
        let pump = MqttEventPump {
            eventloop,
            client,
            topics: topics.into_iter().map(Into::into).collect(),
            status_topic: config.status_topic.clone(),
            reconnect: RetryConfig::reconnect(),
        };
        (bus, pump)
    }

    /// Announce `offline` and close the connection. The pump exits once the
    /// disconnect has gone out.
    #[instrument(skip(self))]
    pub async fn disconnect(&self) -> Result<(), BusError> {
        let offline = self.client.publish(self.status_topic.clone(), QoS::AtLeastOnce, true, OFFLINE.to_vec());
        match timeout(self.request_timeout, offline).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Failed to announce offline status"),
            Err(_) => warn!("Timed out announcing offline status"),
        }

        timeout(self.request_timeout, self.client.disconnect())
            .await
            .map_err(|_| BusError::Timeout(self.request_timeout))?
            .map_err(|e| BusError::Publish { topic: "disconnect".into(), reason: e.to_string() })?;
        info!("MQTT disconnect requested");
        Ok(())
    }
}

#[async_trait]
impl CommandSink for MqttBus {
    async fn publish(&self, topic: &str, payload: &str) -> Result<(), BusError> {
        let request = self.client.publish(topic, QoS::AtLeastOnce, false, payload.as_bytes().to_vec());
        match timeout(self.request_timeout, request).await {
            Ok(Ok(())) => {
                debug!(topic, payload, "Published");
                Ok(())
            }
            Ok(Err(e)) => Err(BusError::Publish { topic: topic.to_string(), reason: e.to_string() }),
            Err(_) => Err(BusError::Timeout(self.request_timeout)),
        }
    }
}

impl MqttEventPump {
    /// Poll the connection until the client disconnects or `events` is closed.
    /// Connection errors are logged and retried after a pause.
    pub async fn run(mut self, events: mpsc::Sender<BusEvent>) {
        let mut backoff = self.reconnect.backoff();
        let mut connected = false;

        loop {
            let event = match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::Publish(p))) => Some(BusEvent::Message {
                    topic: p.topic.clone(),
                    payload: p.payload.to_vec(),
                    received_at: crate::now_millis(),
                }),
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!(topics = self.topics.len(), "MQTT connected");
                    self.on_connect();
                    backoff = self.reconnect.backoff();
                    connected = true;
                    crate::metrics::set_bus_connected(true);
                    Some(BusEvent::Connected)
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    warn!("Broker sent disconnect");
                    connected = false;
                    crate::metrics::set_bus_connected(false);
                    Some(BusEvent::Disconnected)
                }
                Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                    info!("MQTT client disconnected, event pump stopping");
                    crate::metrics::set_bus_connected(false);
                    return;
                }
                Ok(_) => None,
                Err(e) => {
                    let delay = backoff.next_delay();
                    error!(error = %e, attempt = backoff.attempts(), ?delay, "MQTT connection error");
                    crate::metrics::set_bus_connected(false);
                    let lost = std::mem::replace(&mut connected, false);
                    if lost && events.send(BusEvent::Disconnected).await.is_err() {
                        return;
                    }
                    tokio::time::sleep(delay).await;
                    None
                }
            };

            if let Some(event) = event {
                if events.send(event).await.is_err() {
                    debug!("Event receiver dropped, event pump stopping");
                    return;
                }
            }
        }
    }

    /// Subscriptions and the online announcement are queued without awaiting:
    /// the requests only go out once this loop polls again.
    fn on_connect(&self) {
        for topic in &self.topics {
            if let Err(e) = self.client.try_subscribe(topic.clone(), QoS::AtLeastOnce) {
                error!(topic = %topic, error = %e, "Subscribe failed");
            }
        }
        if let Err(e) = self.client.try_publish(self.status_topic.clone(), QoS::AtLeastOnce, true, ONLINE.to_vec()) {
            warn!(error = %e, "Failed to announce online status");
        }
    }
}
