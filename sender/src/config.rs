// sender/src/config.rs

use dotenv::dotenv;
use std::env;
use std::time::Duration;
use tokio_tungstenite::tungstenite::http::Uri;
use tracing::{debug, info};

use crate::error::ConfigError;
use crate::message::{DspSettings, Frame, OutputDeviceRequest};

pub const DEFAULT_ENDPOINT: &str = "ws://localhost:8000/ws";
pub const DEFAULT_SETTLE_MS: u64 = 1_000;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    // Endpoint
    pub endpoint: String,
    pub connect_timeout: Duration,

    // Wait after the last frame before closing
    pub settle: Duration,

    // Extra frames pushed after the control update
    pub dsp_settings: Option<DspSettings>,
    pub output_device: Option<OutputDeviceRequest>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            settle: Duration::from_millis(DEFAULT_SETTLE_MS),
            dsp_settings: None,
            output_device: None,
        }
    }
}

impl Config {
    /// Frames to send after the control update, in send order.
    pub fn extra_frames(&self) -> Vec<Frame> {
        let mut frames = Vec::new();
        if let Some(dsp) = self.dsp_settings {
            frames.push(Frame::from(dsp));
        }
        if let Some(device) = self.output_device {
            frames.push(Frame::from(device));
        }
        frames
    }

    /// Builds the config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |var_name: &str| lookup(var_name).filter(|s| !s.trim().is_empty());

        let parse_u64 = |var_name: &'static str, default: u64| -> Result<u64, ConfigError> {
            match read(var_name) {
                Some(s) => s
                    .trim()
                    .parse::<u64>()
                    .map_err(|e| ConfigError::invalid(var_name, &s, e)),
                None => Ok(default),
            }
        };
        let parse_f64 = |var_name: &'static str, default: f64| -> Result<f64, ConfigError> {
            match read(var_name) {
                Some(s) => {
                    let v = s
                        .trim()
                        .parse::<f64>()
                        .map_err(|e| ConfigError::invalid(var_name, &s, e))?;
                    if !v.is_finite() {
                        return Err(ConfigError::invalid(var_name, &s, "must be finite"));
                    }
                    Ok(v)
                }
                None => Ok(default),
            }
        };
        let parse_bool = |var_name: &'static str, default: bool| -> Result<bool, ConfigError> {
            match read(var_name) {
                Some(s) => match s.trim() {
                    v if v.eq_ignore_ascii_case("true") || v == "1" => Ok(true),
                    v if v.eq_ignore_ascii_case("false") || v == "0" => Ok(false),
                    _ => Err(ConfigError::invalid(var_name, &s, "expected true/false/1/0")),
                },
                None => Ok(default),
            }
        };

        // --- Endpoint ---
        let endpoint = read("CONTROL_WS_URL").unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        validate_endpoint(&endpoint)?;

        let connect_timeout_secs =
            parse_u64("CONTROL_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS)?;
        if connect_timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "CONTROL_CONNECT_TIMEOUT_SECS",
                "0",
                "must be greater than zero",
            ));
        }
        let settle_ms = parse_u64("CONTROL_SETTLE_MS", DEFAULT_SETTLE_MS)?;

        // --- Optional frames ---
        const DSP_VARS: [&str; 5] = [
            "DSP_AEC_ON",
            "DSP_AGC_ON",
            "DSP_NG_ON",
            "DSP_AGC_TARGET",
            "DSP_NG_THRESH",
        ];
        let dsp_settings = if DSP_VARS.iter().any(|v| read(*v).is_some()) {
            let defaults = DspSettings::default();
            Some(DspSettings {
                aec_on: parse_bool("DSP_AEC_ON", defaults.aec_on)?,
                agc_on: parse_bool("DSP_AGC_ON", defaults.agc_on)?,
                ng_on: parse_bool("DSP_NG_ON", defaults.ng_on)?,
                agc_target: parse_f64("DSP_AGC_TARGET", defaults.agc_target)?,
                ng_thresh: parse_f64("DSP_NG_THRESH", defaults.ng_thresh)?,
            })
        } else {
            None
        };

        let output_device = match read("CONTROL_OUTPUT_DEVICE") {
            Some(s) => {
                let id = s
                    .trim()
                    .parse::<i32>()
                    .map_err(|e| ConfigError::invalid("CONTROL_OUTPUT_DEVICE", &s, e))?;
                Some(
                    OutputDeviceRequest::new(id)
                        .map_err(|e| ConfigError::invalid("CONTROL_OUTPUT_DEVICE", &s, e))?,
                )
            }
            None => None,
        };

        Ok(Config {
            endpoint,
            connect_timeout: Duration::from_secs(connect_timeout_secs),
            settle: Duration::from_millis(settle_ms),
            dsp_settings,
            output_device,
        })
    }
}

fn validate_endpoint(endpoint: &str) -> Result<(), ConfigError> {
    let uri = endpoint
        .parse::<Uri>()
        .map_err(|e| ConfigError::invalid("CONTROL_WS_URL", endpoint, e))?;
    match uri.scheme_str() {
        Some("ws") | Some("wss") => {}
        _ => {
            return Err(ConfigError::invalid(
                "CONTROL_WS_URL",
                endpoint,
                "scheme must be ws or wss",
            ))
        }
    }
    if uri.host().is_none() {
        return Err(ConfigError::invalid("CONTROL_WS_URL", endpoint, "missing host"));
    }
    Ok(())
}

/// Reads `.env` (if present) and then the process environment.
pub fn load_config() -> Result<Config, ConfigError> {
    match dotenv() {
        Ok(path) => debug!(path = %path.display(), "Loaded .env file"),
        Err(_) => debug!("No .env file found, using process environment"),
    }
    let config = Config::from_lookup(|k| env::var(k).ok())?;
    info!(
        endpoint = %config.endpoint,
        settle_ms = config.settle.as_millis() as u64,
        extra_frames = config.extra_frames().len(),
        "Configuration loaded"
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_when_nothing_set() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.endpoint, "ws://localhost:8000/ws");
        assert_eq!(config.settle, Duration::from_secs(1));
        assert!(config.extra_frames().is_empty());
    }

    #[test]
    fn overrides_are_applied() {
        let config = config_from(&[
            ("CONTROL_WS_URL", "wss://dsp.local:9443/ws"),
            ("CONTROL_SETTLE_MS", "250"),
            ("CONTROL_CONNECT_TIMEOUT_SECS", "3"),
        ])
        .unwrap();
        assert_eq!(config.endpoint, "wss://dsp.local:9443/ws");
        assert_eq!(config.settle, Duration::from_millis(250));
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config = config_from(&[("CONTROL_WS_URL", "  "), ("CONTROL_SETTLE_MS", "")]).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn rejects_non_websocket_scheme() {
        let err = config_from(&[("CONTROL_WS_URL", "http://localhost:8000/ws")]).unwrap_err();
        assert!(err.to_string().contains("CONTROL_WS_URL"));
    }

    #[test]
    fn rejects_zero_connect_timeout_and_bad_numbers() {
        assert!(config_from(&[("CONTROL_CONNECT_TIMEOUT_SECS", "0")]).is_err());
        assert!(config_from(&[("CONTROL_SETTLE_MS", "soon")]).is_err());
        assert!(config_from(&[("DSP_AGC_TARGET", "NaN")]).is_err());
    }

    #[test]
    fn any_dsp_var_enables_dsp_frame_with_host_defaults() {
        let config = config_from(&[("DSP_NG_ON", "true"), ("DSP_NG_THRESH", "-45.5")]).unwrap();
        let dsp = config.dsp_settings.unwrap();
        assert!(dsp.aec_on);
        assert!(!dsp.agc_on);
        assert!(dsp.ng_on);
        assert_eq!(dsp.agc_target, -20.0);
        assert_eq!(dsp.ng_thresh, -45.5);
    }

    #[test]
    fn output_device_is_validated_and_ordered_last() {
        assert!(config_from(&[("CONTROL_OUTPUT_DEVICE", "-1")]).is_err());

        let config = config_from(&[("CONTROL_OUTPUT_DEVICE", "2"), ("DSP_AEC_ON", "0")]).unwrap();
        let kinds: Vec<_> = config
            .extra_frames()
            .iter()
            .map(|f| crate::message::OutboundFrame::kind(f))
            .collect();
        assert_eq!(kinds, vec!["dsp", "output_device"]);
    }
}
