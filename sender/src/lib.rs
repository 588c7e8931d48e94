// sender/src/lib.rs

pub mod config;
pub mod error;
pub mod message;
pub mod sender;

pub use config::{load_config, Config};
pub use error::{ConfigError, FrameError, SenderError};
pub use message::{ControlMessage, DspSettings, Frame, OutboundFrame, OutputDeviceRequest};
pub use sender::{send_control_update, ControlMessageSender, ControlSession, SendReport, SenderState};
