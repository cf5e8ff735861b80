use std::path::Path;

use anyhow::{Context, Result, anyhow};
use fast_image_resize::{PixelType, Resizer, images::Image};
use ndarray::Array4;
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;
use rayon::prelude::*;

use super::Detector;
use crate::{
    labels::coco_class_name,
    types::{BoundingBox, BoxSpace, Detection, Frame},
};

// Output order of the ONNX model zoo SSD-MobileNet graph.
const BOXES_OUTPUT: usize = 0;
const CLASSES_OUTPUT: usize = 1;
const SCORES_OUTPUT: usize = 2;
const COUNT_OUTPUT: usize = 3;

#[derive(Clone, Copy, Debug)]
pub struct SsdParams {
    pub min_score: f32,
    pub max_detections: usize,
    pub input_width: u32,
}

pub struct OrtSsdDetector {
    session: Session,
    params: SsdParams,
}

impl OrtSsdDetector {
    pub fn new(model_path: &Path, params: SsdParams) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(model_path)
            .with_context(|| format!("failed to load ORT session from {}", model_path.display()))?;

        Ok(Self { session, params })
    }
}

impl Detector for OrtSsdDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let input = prepare_input(frame, self.params.input_width)?;
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .context("failed to run SSD session")?;

        if outputs.len() <= SCORES_OUTPUT {
            return Err(anyhow!(
                "model returned {} outputs, expected boxes/classes/scores",
                outputs.len()
            ));
        }

        let boxes: Vec<f32> = outputs[BOXES_OUTPUT]
            .try_extract_array::<f32>()?
            .iter()
            .copied()
            .collect();
        let classes: Vec<f32> = outputs[CLASSES_OUTPUT]
            .try_extract_array::<f32>()?
            .iter()
            .copied()
            .collect();
        let scores: Vec<f32> = outputs[SCORES_OUTPUT]
            .try_extract_array::<f32>()?
            .iter()
            .copied()
            .collect();
        let count = if outputs.len() > COUNT_OUTPUT {
            outputs[COUNT_OUTPUT]
                .try_extract_array::<f32>()
                .ok()
                .and_then(|arr| arr.iter().next().copied())
                .map(|n| n.max(0.0) as usize)
        } else {
            None
        };

        decode_detections(&boxes, &classes, &scores, count, &self.params)
    }

    fn backend_label(&self) -> &'static str {
        "ort-ssd"
    }

    fn box_space(&self) -> BoxSpace {
        BoxSpace::Normalized
    }
}

/// Builds the uint8 NHWC RGB tensor, downscaling frames wider than
/// `max_width`. Boxes come back normalized, so the scale does not leak out.
fn prepare_input(frame: &Frame, max_width: u32) -> Result<Array4<u8>> {
    if !frame.has_dimensions() {
        return Err(anyhow!("frame has no dimensions"));
    }
    let expected = frame.width as usize * frame.height as usize * 4;
    if frame.rgba.len() != expected {
        return Err(anyhow!(
            "frame buffer is {} bytes, expected {expected}",
            frame.rgba.len()
        ));
    }

    let (width, height, rgba) = if frame.width > max_width {
        let height = ((frame.height as u64 * max_width as u64) / frame.width as u64).max(1) as u32;
        let src = Image::from_vec_u8(frame.width, frame.height, frame.rgba.clone(), PixelType::U8x4)?;
        let mut dst = Image::new(max_width, height, PixelType::U8x4);
        Resizer::new().resize(&src, &mut dst, None)?;
        (max_width, height, dst.into_vec())
    } else {
        (frame.width, frame.height, frame.rgba.clone())
    };

    let pixel_count = width as usize * height as usize;
    let mut rgb = vec![0u8; pixel_count * 3];
    rgb.par_chunks_mut(3)
        .zip(rgba.par_chunks_exact(4))
        .for_each(|(dst, src)| dst.copy_from_slice(&src[..3]));

    Array4::from_shape_vec((1, height as usize, width as usize, 3), rgb)
        .context("failed to shape input tensor")
}

/// Turns the raw SSD outputs into detections: boxes are `[ymin, xmin, ymax,
/// xmax]` fractions, classes are COCO ids.
pub(crate) fn decode_detections(
    boxes: &[f32],
    classes: &[f32],
    scores: &[f32],
    count: Option<usize>,
    params: &SsdParams,
) -> Result<Vec<Detection>> {
    let available = scores.len().min(classes.len()).min(boxes.len() / 4);
    if boxes.len() % 4 != 0 {
        return Err(anyhow!("boxes output has {} values, not a multiple of 4", boxes.len()));
    }
    let count = count.map_or(available, |n| n.min(available));

    let mut detections: Vec<Detection> = (0..count)
        .filter(|&i| scores[i] >= params.min_score)
        .filter_map(|i| {
            let class_name = coco_class_name(classes[i].round().max(0.0) as u32)?;
            let [ymin, xmin, ymax, xmax] = [
                boxes[i * 4].clamp(0.0, 1.0),
                boxes[i * 4 + 1].clamp(0.0, 1.0),
                boxes[i * 4 + 2].clamp(0.0, 1.0),
                boxes[i * 4 + 3].clamp(0.0, 1.0),
            ];
            if xmax <= xmin || ymax <= ymin {
                return None;
            }
            Some(Detection {
                class_id: class_name.to_string(),
                score: scores[i].clamp(0.0, 1.0),
                bbox: BoundingBox {
                    x: xmin,
                    y: ymin,
                    width: xmax - xmin,
                    height: ymax - ymin,
                },
            })
        })
        .collect();

    detections.sort_by(|a, b| b.score.total_cmp(&a.score));
    detections.truncate(params.max_detections);
    Ok(detections)
}
