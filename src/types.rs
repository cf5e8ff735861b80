use std::{fmt, str::FromStr, time::Instant};

#[derive(Clone, Debug)]
pub struct Frame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
    #[allow(dead_code)]
    pub timestamp: Instant,
}

impl Frame {
    /// A frame is only usable for drawing once the capture reported its size.
    pub fn has_dimensions(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// Box in model space: `x`/`y` is the top-left corner.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Coordinate space of the boxes a detector produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoxSpace {
    /// Fractions of the frame width/height in [0, 1].
    Normalized,
    /// Pixels of the frame the detector saw.
    #[cfg_attr(not(test), allow(dead_code))]
    Pixel,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub class_id: String,
    pub score: f32,
    pub bbox: BoundingBox,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FacingMode {
    User,
    Environment,
}

impl FacingMode {
    pub fn toggled(self) -> Self {
        match self {
            FacingMode::User => FacingMode::Environment,
            FacingMode::Environment => FacingMode::User,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FacingMode::User => "user",
            FacingMode::Environment => "environment",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FacingMode::User => "前置摄像头",
            FacingMode::Environment => "后置摄像头",
        }
    }
}

impl fmt::Display for FacingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FacingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" | "front" => Ok(FacingMode::User),
            "environment" | "back" | "rear" => Ok(FacingMode::Environment),
            other => Err(format!("unknown facing mode `{other}`")),
        }
    }
}
