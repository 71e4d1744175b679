use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::encoder::Frame;
use crate::error::EnvError;

/// Messages sent to the simulator. Numeric payloads travel as strings, which
/// is what the simulator's JSON parser expects.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "msg_type", rename_all = "snake_case")]
pub enum Outgoing {
    Control {
        steering: String,
        throttle: String,
        brake: String,
    },
    ResetCar,
    LoadScene {
        scene_name: String,
    },
    CarConfig {
        body_style: String,
        body_r: String,
        body_g: String,
        body_b: String,
        car_name: String,
        font_size: String,
    },
    CamConfig {
        img_w: String,
        img_h: String,
        img_d: String,
        img_enc: String,
    },
    ExitScene,
    QuitApp,
}

impl Outgoing {
    pub fn control(steering: f32, throttle: f32) -> Self {
        Outgoing::Control {
            steering: steering.to_string(),
            throttle: throttle.to_string(),
            brake: "0.0".into(),
        }
    }

    pub fn car_config(body_style: &str, car_name: &str) -> Self {
        Outgoing::CarConfig {
            body_style: body_style.into(),
            body_r: "128".into(),
            body_g: "128".into(),
            body_b: "128".into(),
            car_name: car_name.into(),
            font_size: "100".into(),
        }
    }

    pub fn cam_config(width: usize, height: usize) -> Self {
        Outgoing::CamConfig {
            img_w: width.to_string(),
            img_h: height.to_string(),
            img_d: "3".into(),
            img_enc: "JPG".into(),
        }
    }

    /// One newline-terminated JSON line.
    pub fn to_line(&self) -> Result<String, EnvError> {
        let mut line = serde_json::to_string(self)
            .map_err(|e| EnvError::Protocol(format!("cannot encode message: {e}")))?;
        line.push('\n');
        Ok(line)
    }
}

/// Messages received from the simulator. Anything unrecognised maps to
/// [`Incoming::Unknown`] and is ignored by the client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "msg_type", rename_all = "snake_case")]
pub enum Incoming {
    Telemetry(Telemetry),
    SceneSelectionReady,
    CarLoaded,
    NeedCarConfig,
    Aborted,
    #[serde(other)]
    Unknown,
}

impl Incoming {
    pub fn parse(line: &str) -> Result<Self, EnvError> {
        serde_json::from_str(line)
            .map_err(|e| EnvError::Protocol(format!("malformed message {line:?}: {e}")))
    }
}

/// One telemetry frame.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Telemetry {
    /// Base64 encoded camera image (JPEG or PNG).
    pub image: String,
    pub speed: f64,
    pub cte: f64,
    #[serde(default = "no_hit")]
    pub hit: String,
    #[serde(default)]
    pub pos_x: f64,
    #[serde(default)]
    pub pos_y: f64,
    #[serde(default)]
    pub pos_z: f64,
}

fn no_hit() -> String {
    "none".into()
}

impl Telemetry {
    pub fn collided(&self) -> bool {
        self.hit != "none"
    }

    /// Decode the camera image into an RGB frame.
    pub fn frame(&self) -> Result<Frame, EnvError> {
        let bytes = STANDARD
            .decode(self.image.as_bytes())
            .map_err(|e| EnvError::Protocol(format!("bad image encoding: {e}")))?;
        let rgb = image::load_from_memory(&bytes)
            .map_err(|e| EnvError::Protocol(format!("undecodable camera image: {e}")))?
            .to_rgb8();
        let (width, height) = rgb.dimensions();
        Ok(Frame::from_rgb8(height as usize, width as usize, rgb.as_raw())?)
    }
}

#[cfg(test)]
pub(crate) fn encode_png(width: u32, height: u32, fill: [u8; 3]) -> String {
    use std::io::Cursor;

    let img = image::RgbImage::from_pixel(width, height, image::Rgb(fill));
    let mut bytes = Cursor::new(Vec::new());
    img.write_to(&mut bytes, image::ImageFormat::Png)
        .expect("png encoding");
    STANDARD.encode(bytes.into_inner())
}
