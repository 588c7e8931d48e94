// sender/src/message.rs

use serde::{Deserialize, Serialize};

use crate::error::{FrameError, SenderError};

/// Anything that goes out as a single JSON text frame.
pub trait OutboundFrame: Serialize {
    /// Short label used in logs and error context.
    fn kind(&self) -> &'static str;

    fn to_payload(&self) -> Result<String, SenderError> {
        serde_json::to_string(self).map_err(|source| SenderError::Serialization {
            kind: self.kind(),
            source,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Control,
}

/// Adaptive filter parameter update. Fields are fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlMessage {
    #[serde(rename = "type")]
    kind: MessageType,
    active: bool,
    #[serde(serialize_with = "finite::serialize")]
    alpha: f64,
    #[serde(serialize_with = "finite::serialize")]
    leak_lambda: f64,
    #[serde(serialize_with = "finite::serialize")]
    mu_max: f64,
}

impl ControlMessage {
    pub const DEFAULT_ALPHA: f64 = 0.25;
    pub const DEFAULT_LEAK_LAMBDA: f64 = 0.005;
    pub const DEFAULT_MU_MAX: f64 = 0.1;

    pub fn new(active: bool, alpha: f64, leak_lambda: f64, mu_max: f64) -> Self {
        Self {
            kind: MessageType::Control,
            active,
            alpha,
            leak_lambda,
            mu_max,
        }
    }

    /// The update the host is tuned with during verification runs.
    pub fn standard() -> Self {
        Self::new(
            true,
            Self::DEFAULT_ALPHA,
            Self::DEFAULT_LEAK_LAMBDA,
            Self::DEFAULT_MU_MAX,
        )
    }

    pub fn active(&self) -> bool {
        self.active
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn leak_lambda(&self) -> f64 {
        self.leak_lambda
    }

    pub fn mu_max(&self) -> f64 {
        self.mu_max
    }
}

impl OutboundFrame for ControlMessage {
    fn kind(&self) -> &'static str {
        "control"
    }
}

/// Processing stage toggles and levels. The host reads the toggles as numbers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DspSettings {
    #[serde(with = "numeric_flag")]
    pub aec_on: bool,
    #[serde(with = "numeric_flag")]
    pub agc_on: bool,
    #[serde(with = "numeric_flag")]
    pub ng_on: bool,
    /// dB
    #[serde(serialize_with = "finite::serialize")]
    pub agc_target: f64,
    /// dB
    #[serde(serialize_with = "finite::serialize")]
    pub ng_thresh: f64,
}

impl Default for DspSettings {
    fn default() -> Self {
        Self {
            aec_on: true,
            agc_on: false,
            ng_on: false,
            agc_target: -20.0,
            ng_thresh: -50.0,
        }
    }
}

impl OutboundFrame for DspSettings {
    fn kind(&self) -> &'static str {
        "dsp"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputDeviceRequest {
    set_output_device: i32,
}

impl OutputDeviceRequest {
    pub fn new(device_id: i32) -> Result<Self, FrameError> {
        // -1 means "no change pending" on the host side.
        if device_id < 0 {
            return Err(FrameError::InvalidDeviceId(device_id));
        }
        Ok(Self {
            set_output_device: device_id,
        })
    }

    pub fn device_id(&self) -> i32 {
        self.set_output_device
    }
}

impl OutboundFrame for OutputDeviceRequest {
    fn kind(&self) -> &'static str {
        "output_device"
    }
}

/// Any frame the sender knows how to push.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Frame {
    Control(ControlMessage),
    Dsp(DspSettings),
    OutputDevice(OutputDeviceRequest),
}

impl OutboundFrame for Frame {
    fn kind(&self) -> &'static str {
        match self {
            Frame::Control(m) => m.kind(),
            Frame::Dsp(m) => m.kind(),
            Frame::OutputDevice(m) => m.kind(),
        }
    }
}

impl From<ControlMessage> for Frame {
    fn from(m: ControlMessage) -> Self {
        Frame::Control(m)
    }
}

impl From<DspSettings> for Frame {
    fn from(m: DspSettings) -> Self {
        Frame::Dsp(m)
    }
}

impl From<OutputDeviceRequest> for Frame {
    fn from(m: OutputDeviceRequest) -> Self {
        Frame::OutputDevice(m)
    }
}

/// serde_json writes NaN and infinities as `null`; refuse them instead.
mod finite {
    use serde::{ser, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, s: S) -> Result<S::Ok, S::Error> {
        if !value.is_finite() {
            return Err(ser::Error::custom(format!("non-finite value {value}")));
        }
        s.serialize_f64(*value)
    }
}

mod numeric_flag {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(flag: &bool, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u8(u8::from(*flag))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        match u8::deserialize(d)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(de::Error::custom(format!("expected 0 or 1, got {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn standard_control_message_wire_shape() {
        let payload = ControlMessage::standard().to_payload().unwrap();
        let value: Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(
            value,
            json!({"type": "control", "active": true, "alpha": 0.25, "leak_lambda": 0.005, "mu_max": 0.1})
        );
        assert_eq!(value.as_object().unwrap().len(), 5);
    }

    #[test]
    fn control_message_survives_json_round_trip() {
        let msg = ControlMessage::standard();
        let decoded: ControlMessage = serde_json::from_str(&msg.to_payload().unwrap()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn control_message_rejects_wrong_type_tag() {
        let raw = r#"{"type":"stats","active":true,"alpha":0.25,"leak_lambda":0.005,"mu_max":0.1}"#;
        assert!(serde_json::from_str::<ControlMessage>(raw).is_err());
    }

    #[test]
    fn control_message_requires_all_fields() {
        let raw = r#"{"type":"control","alpha":0.25,"leak_lambda":0.005,"mu_max":0.1}"#;
        assert!(serde_json::from_str::<ControlMessage>(raw).is_err());
    }

    #[test]
    fn non_finite_control_values_are_serialization_errors() {
        let err = ControlMessage::new(true, f64::NAN, 0.005, 0.1)
            .to_payload()
            .unwrap_err();
        assert!(err.is_serialization(), "unexpected error: {err}");
        assert!(matches!(err, SenderError::Serialization { kind: "control", .. }));

        let err = ControlMessage::new(true, 0.25, 0.005, f64::INFINITY)
            .to_payload()
            .unwrap_err();
        assert!(err.is_serialization());
    }

    #[test]
    fn non_finite_dsp_levels_are_serialization_errors() {
        let dsp = DspSettings {
            agc_target: f64::NAN,
            ..DspSettings::default()
        };
        assert!(dsp.to_payload().unwrap_err().is_serialization());

        let frame = Frame::from(DspSettings {
            ng_thresh: f64::NEG_INFINITY,
            ..DspSettings::default()
        });
        let err = frame.to_payload().unwrap_err();
        assert!(matches!(err, SenderError::Serialization { kind: "dsp", .. }));
    }

    #[test]
    fn dsp_settings_send_numeric_toggles() {
        let value = serde_json::to_value(DspSettings::default()).unwrap();
        assert_eq!(
            value,
            json!({"aec_on": 1, "agc_on": 0, "ng_on": 0, "agc_target": -20.0, "ng_thresh": -50.0})
        );
    }

    #[test]
    fn dsp_settings_reject_out_of_range_toggle() {
        let raw = r#"{"aec_on":2,"agc_on":0,"ng_on":0,"agc_target":-20.0,"ng_thresh":-50.0}"#;
        assert!(serde_json::from_str::<DspSettings>(raw).is_err());
    }

    #[test]
    fn output_device_request_shape_and_validation() {
        let req = OutputDeviceRequest::new(3).unwrap();
        assert_eq!(serde_json::to_value(req).unwrap(), json!({"set_output_device": 3}));
        assert!(matches!(
            OutputDeviceRequest::new(-1),
            Err(FrameError::InvalidDeviceId(-1))
        ));
    }

    #[test]
    fn frame_enum_serializes_inner_message_untagged() {
        let frame = Frame::from(ControlMessage::standard());
        assert_eq!(frame.kind(), "control");
        assert_eq!(
            serde_json::to_value(frame).unwrap(),
            serde_json::to_value(ControlMessage::standard()).unwrap()
        );
    }
}
