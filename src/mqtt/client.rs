use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, Outgoing, Publish, QoS};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::ack;
use crate::config::{Config, Topics};
use crate::error::Result;
use crate::sequence::CommandSink;

pub struct MqttClient {
    client: AsyncClient,
    eventloop: EventLoop,
    topics: Topics,
}

/// Cloneable publishing handle; the event loop keeps running in its own task.
#[derive(Clone)]
pub struct MqttPublisher {
    client: AsyncClient,
}

impl MqttClient {
    pub fn new(config: &Config) -> Self {
        let mut mqttopts = MqttOptions::new(
            &config.mqtt.client_id,
            &config.mqtt.broker_host,
            config.mqtt.broker_port,
        );
        mqttopts.set_keep_alive(Duration::from_secs(config.mqtt.keep_alive_secs));

        if let (Some(user), Some(pass)) = (&config.mqtt.username, &config.mqtt.password) {
            mqttopts.set_credentials(user, pass);
        }

        let (client, eventloop) = AsyncClient::new(mqttopts, 100);

        Self {
            client,
            eventloop,
            topics: config.topics.clone(),
        }
    }

    pub fn publisher(&self) -> MqttPublisher {
        MqttPublisher {
            client: self.client.clone(),
        }
    }

    /// Run the MQTT event loop. Subscribes to the ACK topic on connect and
    /// signals `ready_tx`, prints every ACK and forwards its payload through
    /// `ack_tx`. Returns once our own DISCONNECT goes out; any connection
    /// error ends the loop with that error.
    pub async fn run(
        mut self,
        ready_tx: oneshot::Sender<()>,
        ack_tx: mpsc::Sender<Vec<u8>>,
    ) -> Result<()> {
        let ack_topic = self.topics.ack();
        let mut ready_tx = Some(ready_tx);

        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("Connected to MQTT broker");
                    self.client.subscribe(&ack_topic, QoS::AtMostOnce).await?;
                    info!("Subscribed to ACK topic: {}", ack_topic);
                    if let Some(tx) = ready_tx.take() {
                        let _ = tx.send(());
                    }
                }
                Ok(Event::Incoming(Incoming::SubAck(suback))) => {
                    debug!("SUBACK pkid={} codes={:?}", suback.pkid, suback.return_codes);
                }
                Ok(Event::Incoming(Incoming::Publish(publish))) => {
                    handle_publish(&ack_topic, &publish, &ack_tx);
                }
                Ok(event) if ends_loop(&event) => {
                    info!("Disconnected from MQTT broker");
                    return Ok(());
                }
                Ok(_) => {}
                Err(e) => {
                    error!("MQTT connection error: {}", e);
                    return Err(e.into());
                }
            }
        }
    }
}

/// Print and forward a publish if it arrived on the ACK topic. Returns
/// whether it did.
fn handle_publish(ack_topic: &str, publish: &Publish, ack_tx: &mpsc::Sender<Vec<u8>>) -> bool {
    if publish.topic != ack_topic {
        debug!("Ignoring message on {}", publish.topic);
        return false;
    }
    print_ack(&publish.topic, &publish.payload);
    if let Err(e) = ack_tx.try_send(publish.payload.to_vec()) {
        debug!("ACK not forwarded to runner: {}", e);
    }
    true
}

/// Our own DISCONNECT has been written; nothing more will arrive.
fn ends_loop(event: &Event) -> bool {
    matches!(event, Event::Outgoing(Outgoing::Disconnect))
}

fn print_ack(topic: &str, payload: &[u8]) {
    println!("\nACK on topic '{topic}':");
    println!("{}", ack::render(payload));
    println!("{}", "-".repeat(20));

    match ack::summarize(payload) {
        Some(summary) if summary.ok => info!("ACK {}", summary),
        Some(summary) => warn!("ACK {}", summary),
        None => debug!("ACK payload is not JSON"),
    }
    if let Some(networks) = ack::wifi_networks(payload) {
        info!("Device reports {} saved network(s): {:?}", networks.len(), networks);
    }
}

impl MqttPublisher {
    pub async fn disconnect(&self) -> Result<()> {
        self.client.disconnect().await?;
        Ok(())
    }
}

impl CommandSink for MqttPublisher {
    async fn publish(&self, topic: &str, payload: String) -> Result<()> {
        self.client
            .publish(topic, QoS::AtMostOnce, false, payload)
            .await?;
        Ok(())
    }
}
