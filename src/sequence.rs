//! The scripted test run: an ordered plan of publishes and pauses, and the
//! runner that executes it against a [`CommandSink`].

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::command::{Command, LedMode, Status};
use crate::config::Topics;
use crate::error::Result;

/// Destination for encoded commands.
pub trait CommandSink {
    fn publish(&self, topic: &str, payload: String) -> impl Future<Output = Result<()>> + Send;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Section(&'static str),
    Publish(Command),
    Pause {
        secs: u64,
        note: Option<&'static str>,
    },
}

/// How the runner waits after each publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    /// Always sleep the full step delay.
    Fixed,
    /// Move on at the first ACK; the step delay becomes a timeout.
    AwaitAck,
}

fn pause(secs: u64, note: &'static str) -> Step {
    Step::Pause {
        secs,
        note: Some(note),
    }
}

/// LED, then recording/playback, then Wi-Fi list management.
pub fn default_plan() -> Vec<Step> {
    vec![
        Step::Section("LED control"),
        Step::Publish(Command::set_color(255, 0, 0)),
        Step::Publish(Command::set_color(0, 255, 0)),
        Step::Publish(Command::set_mode(LedMode::Rainbow)),
        pause(5, "rainbow mode running for 5 s"),
        Step::Publish(Command::set_mode(LedMode::Off)),
        Step::Section("REC control"),
        Step::Publish(Command::record(Status::Start)),
        pause(5, "recording for 5 s"),
        Step::Publish(Command::record(Status::Stop)),
        // recorder needs a moment to finalize
        Step::Pause {
            secs: 1,
            note: None,
        },
        Step::Publish(Command::playback_start(None, None)),
        pause(5, "playing back for 5 s"),
        Step::Publish(Command::playback_stop()),
        Step::Section("Wi-Fi control"),
        Step::Publish(Command::wifi_list()),
        Step::Publish(Command::wifi_add("test_wifi", "test_password")),
        Step::Publish(Command::wifi_list()),
        Step::Publish(Command::wifi_del("test_wifi")),
        Step::Publish(Command::wifi_list()),
    ]
}

/// The stock plan followed by checks of the optional command fields and
/// the non-destructive Wi-Fi actions.
pub fn extended_plan() -> Vec<Step> {
    let mut plan = default_plan();
    plan.extend([
        Step::Section("Extended checks"),
        Step::Publish(Command::set_mode(LedMode::Solid)),
        Step::Publish(Command::set_color(0, 0, 255)),
        Step::Publish(Command::set_mode(LedMode::Off)),
        Step::Publish(Command::record(Status::Start)),
        pause(3, "recording for 3 s"),
        Step::Publish(Command::record(Status::Stop)),
        Step::Publish(Command::playback_start(Some(2), Some(500))),
        pause(5, "playing back twice"),
        Step::Publish(Command::playback_stop()),
        Step::Publish(Command::wifi_set("test_wifi", "test_password")),
        Step::Publish(Command::wifi_list()),
        Step::Publish(Command::wifi_del("test_wifi")),
        Step::Publish(Command::wifi_list()),
    ]);
    plan
}

pub struct Runner<S> {
    sink: S,
    topics: Topics,
    step_delay: Duration,
    pacing: Pacing,
    acks: mpsc::Receiver<Vec<u8>>,
}

impl<S: CommandSink> Runner<S> {
    pub fn new(
        sink: S,
        topics: Topics,
        step_delay: Duration,
        pacing: Pacing,
        acks: mpsc::Receiver<Vec<u8>>,
    ) -> Self {
        Self {
            sink,
            topics,
            step_delay,
            pacing,
            acks,
        }
    }

    pub async fn run(&mut self, plan: &[Step]) -> Result<()> {
        info!(
            "Running {} steps (step delay {:?}, pacing {:?})",
            plan.len(),
            self.step_delay,
            self.pacing
        );
        println!("\n======= Starting device test sequence =======\n");

        for step in plan {
            match step {
                Step::Section(title) => println!("\n--- {title} ---"),
                Step::Publish(command) => self.publish(command).await?,
                Step::Pause { secs, note } => {
                    if let Some(note) = note {
                        println!("...{note}...");
                    }
                    tokio::time::sleep(Duration::from_secs(*secs)).await;
                }
            }
        }

        println!("\n======= Test sequence complete =======");
        Ok(())
    }

    async fn publish(&mut self, command: &Command) -> Result<()> {
        let topic = command.channel().topic(&self.topics);
        let payload = command.to_payload()?;

        // ACKs left over from earlier steps must not satisfy this one.
        while let Ok(stale) = self.acks.try_recv() {
            debug!("Discarding late ACK ({} bytes)", stale.len());
        }

        println!("\n>>> publish to '{topic}':");
        println!("{payload}");
        self.sink.publish(&topic, payload).await?;

        match self.pacing {
            Pacing::Fixed => tokio::time::sleep(self.step_delay).await,
            Pacing::AwaitAck => {
                match tokio::time::timeout(self.step_delay, self.acks.recv()).await {
                    Ok(Some(_)) => {}
                    Ok(None) => debug!("ACK channel closed"),
                    Err(_) => warn!("No ACK within {:?} for {}", self.step_delay, topic),
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HarnessError;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    #[derive(Clone, Default)]
    struct RecordingSink {
        sent: Arc<Mutex<Vec<(String, String)>>>,
        ack_tx: Option<mpsc::Sender<Vec<u8>>>,
    }

    impl CommandSink for RecordingSink {
        async fn publish(&self, topic: &str, payload: String) -> Result<()> {
            self.sent.lock().unwrap().push((topic.to_string(), payload));
            if let Some(tx) = &self.ack_tx {
                tx.try_send(br#"{"ok":true}"#.to_vec()).unwrap();
            }
            Ok(())
        }
    }

    struct FailingSink;

    impl CommandSink for FailingSink {
        async fn publish(&self, _topic: &str, _payload: String) -> Result<()> {
            Err(HarnessError::NotConnected)
        }
    }

    fn runner<S: CommandSink>(sink: S, pacing: Pacing) -> (Runner<S>, mpsc::Sender<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(8);
        let runner = Runner::new(sink, Topics::default(), Duration::from_secs(3), pacing, rx);
        (runner, tx)
    }

    #[test]
    fn default_plan_contents() {
        let published: Vec<Command> = default_plan()
            .into_iter()
            .filter_map(|step| match step {
                Step::Publish(cmd) => Some(cmd),
                _ => None,
            })
            .collect();
        assert_eq!(published.len(), 13);
        assert_eq!(published[0], Command::set_color(255, 0, 0));
        assert_eq!(published[3], Command::set_mode(LedMode::Off));
        assert_eq!(published[4], Command::record(Status::Start));
        assert_eq!(published[7], Command::playback_stop());
        assert_eq!(published[9], Command::wifi_add("test_wifi", "test_password"));
        assert_eq!(published[12], Command::wifi_list());
    }

    #[test]
    fn extended_plan_extends_default() {
        let default = default_plan();
        let extended = extended_plan();
        assert_eq!(&extended[..default.len()], &default[..]);
        assert!(extended.contains(&Step::Publish(Command::playback_start(Some(2), Some(500)))));
        assert!(extended.contains(&Step::Publish(Command::wifi_set("test_wifi", "test_password"))));
    }

    #[tokio::test(start_paused = true)]
    async fn fixed_pacing_publishes_plan_in_order() {
        let sink = RecordingSink::default();
        let (mut runner, _tx) = runner(sink.clone(), Pacing::Fixed);

        let start = Instant::now();
        runner.run(&default_plan()).await.unwrap();

        // 13 step delays of 3 s plus the 5 + 5 + 1 + 5 s pauses
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(55) && elapsed < Duration::from_secs(56));

        let sent = sink.sent.lock().unwrap();
        assert_eq!(sent.len(), 13);
        assert_eq!(
            sent[0],
            (
                "ShangHuYun/DEoP/Sub/led/control".to_string(),
                r#"{"action": "set_color", "r": 255, "g": 0, "b": 0}"#.to_string()
            )
        );
        assert_eq!(sent[4].0, "ShangHuYun/DEoP/Sub/rec/control");
        assert_eq!(sent[4].1, r#"{"action": "record", "status": "start"}"#);
        assert_eq!(sent[11].0, "ShangHuYun/DEoP/Sub/wifi/control");
        assert_eq!(sent[11].1, r#"{"action": "del", "ssid": "test_wifi"}"#);
        for (_, payload) in sent.iter() {
            let value: serde_json::Value = serde_json::from_str(payload).unwrap();
            assert!(value["action"].is_string());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn await_ack_moves_on_when_device_answers() {
        let (tx, rx) = mpsc::channel(8);
        let sink = RecordingSink {
            ack_tx: Some(tx),
            ..Default::default()
        };
        let mut runner = Runner::new(
            sink.clone(),
            Topics::default(),
            Duration::from_secs(3),
            Pacing::AwaitAck,
            rx,
        );

        let start = Instant::now();
        let plan = [
            Step::Publish(Command::wifi_list()),
            Step::Publish(Command::wifi_del("test_wifi")),
        ];
        runner.run(&plan).await.unwrap();

        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(sink.sent.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn await_ack_times_out_after_step_delay() {
        let (mut runner, _tx) = runner(RecordingSink::default(), Pacing::AwaitAck);

        let start = Instant::now();
        runner
            .run(&[Step::Publish(Command::wifi_list())])
            .await
            .unwrap();

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(3) && elapsed < Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn stale_ack_does_not_satisfy_next_publish() {
        let (mut runner, tx) = runner(RecordingSink::default(), Pacing::AwaitAck);
        tx.try_send(b"late".to_vec()).unwrap();

        let start = Instant::now();
        runner
            .run(&[Step::Publish(Command::wifi_list())])
            .await
            .unwrap();

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(3) && elapsed < Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn sink_error_stops_the_run() {
        let (mut runner, _tx) = runner(FailingSink, Pacing::Fixed);
        let plan = [
            Step::Publish(Command::set_mode(LedMode::Solid)),
            Step::Publish(Command::set_mode(LedMode::Off)),
        ];
        let err = runner.run(&plan).await.unwrap_err();
        assert!(matches!(err, HarnessError::NotConnected));
    }
}
