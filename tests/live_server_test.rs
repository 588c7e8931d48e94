// tests/live_server_test.rs
#![cfg(feature = "live_server")] // Needs the DSP host running on the default endpoint

use ctrl_push::{load_config, ControlMessageSender, SenderState};
use eyre::Result;
use tokio::time::{timeout, Duration};

const LIVE_TIMEOUT: Duration = Duration::from_secs(15);

#[tokio::test]
#[ignore]
async fn pushes_control_update_to_running_host() -> Result<()> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let config = load_config()?;
    let mut sender = ControlMessageSender::from_config(&config);
    let report = timeout(LIVE_TIMEOUT, sender.run()).await??;

    assert_eq!(report.frames_sent, 1);
    assert!(report.settled_for >= config.settle);
    assert_eq!(sender.state(), SenderState::Closed);
    Ok(())
}
