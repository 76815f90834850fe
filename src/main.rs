mod ack;
mod command;
mod config;
mod error;
mod mqtt;
mod sequence;

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::HarnessError;
use crate::sequence::{Pacing, Runner};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = match config::Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("{}", HarnessError::Config(e));
            std::process::exit(1);
        }
    };

    info!(
        "Starting deop-harness (mqtt={}:{}, client_id={}, prefix={})",
        config.mqtt.broker_host,
        config.mqtt.broker_port,
        config.mqtt.client_id,
        config.topics.prefix,
    );

    let (ack_tx, ack_rx) = mpsc::channel::<Vec<u8>>(32);
    let (ready_tx, ready_rx) = oneshot::channel();

    let mqtt_client = mqtt::MqttClient::new(&config);
    let publisher = mqtt_client.publisher();
    let mut mqtt_handle = tokio::spawn(async move { mqtt_client.run(ready_tx, ack_tx).await });

    // Give the broker the settle window plus one keep-alive period to answer.
    let connect_timeout =
        config.harness.settle() + Duration::from_secs(config.mqtt.keep_alive_secs);
    match tokio::time::timeout(connect_timeout, ready_rx).await {
        Ok(Ok(())) => {}
        Ok(Err(_)) => {
            // Event loop gave up before CONNACK; surface its error.
            let err = match mqtt_handle.await {
                Ok(Err(e)) => e,
                Ok(Ok(())) => HarnessError::NotConnected,
                Err(e) => e.into(),
            };
            error!("Could not connect to MQTT broker: {}", err);
            std::process::exit(1);
        }
        Err(_) => {
            error!("{} within {:?}", HarnessError::NotConnected, connect_timeout);
            mqtt_handle.abort();
            std::process::exit(1);
        }
    }

    // Let the ACK subscription settle before the first command.
    tokio::time::sleep(config.harness.settle()).await;

    let pacing = if config.harness.wait_for_ack {
        Pacing::AwaitAck
    } else {
        Pacing::Fixed
    };
    let mut runner = Runner::new(
        publisher.clone(),
        config.topics.clone(),
        config.harness.step_delay(),
        pacing,
        ack_rx,
    );
    let plan = if config.harness.extended {
        sequence::extended_plan()
    } else {
        sequence::default_plan()
    };

    let outcome = tokio::select! {
        res = runner.run(&plan) => res,
        finished = &mut mqtt_handle => match finished {
            Ok(Ok(())) => Err(HarnessError::NotConnected),
            Ok(Err(e)) => Err(e),
            Err(e) => Err(e.into()),
        },
        _ = shutdown_signal() => {
            info!("Interrupted, stopping test sequence");
            Ok(())
        }
    };

    if let Err(e) = &outcome {
        error!("Test sequence aborted: {}", e);
    }

    disconnect(&publisher, mqtt_handle).await;
    info!("deop-harness finished");

    if outcome.is_err() {
        std::process::exit(1);
    }
}

async fn disconnect(publisher: &mqtt::MqttPublisher, mut handle: JoinHandle<error::Result<()>>) {
    if handle.is_finished() {
        return;
    }
    if let Err(e) = publisher.disconnect().await {
        warn!("Failed to request disconnect: {}", e);
        handle.abort();
        return;
    }
    if tokio::time::timeout(Duration::from_secs(2), &mut handle)
        .await
        .is_err()
    {
        warn!("MQTT event loop did not stop in time");
        handle.abort();
    }
}

async fn shutdown_signal() {
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to register SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Received SIGINT"),
        _ = sigterm => info!("Received SIGTERM"),
    }
}
