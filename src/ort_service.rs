use crate::{
    config::{ModelConfig, Validatable},
    detection::{non_max_suppression, Detection},
    labels::ClassLabels,
    model_service::{ModelError, ModelService},
};
use async_trait::async_trait;
use image::{imageops::FilterType, DynamicImage, GenericImageView};
use ndarray::{Array, ArrayD, ArrayViewD, Axis, Ix3, Ix4};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

/// Resizes to the square model input and lays pixels out as `[1, 3, H, W]` in `[0, 1]`.
fn transform_image(image: &DynamicImage, input_size: u32) -> Array<f32, Ix4> {
    let size = input_size as usize;
    let img = image.resize_exact(input_size, input_size, FilterType::CatmullRom);

    let mut input = Array::zeros((1, 3, size, size));
    for pixel in img.pixels() {
        let x = pixel.0 as _;
        let y = pixel.1 as _;
        let [r, g, b, _] = pixel.2 .0;
        input[[0, 0, y, x]] = (r as f32) / 255.;
        input[[0, 1, y, x]] = (g as f32) / 255.;
        input[[0, 2, y, x]] = (b as f32) / 255.;
    }

    input
}

/// Decodes a YOLOv8 head of shape `[1, 4 + classes, anchors]`. Boxes come back
/// in the coordinates of an `img_width` x `img_height` image.
fn extract_detections(
    output: ArrayViewD<f32>,
    input_size: u32,
    img_width: u32,
    img_height: u32,
    labels: &ClassLabels,
    min_probability: f32,
) -> Result<Vec<Detection>, ModelError> {
    let output = output
        .into_dimensionality::<Ix3>()
        .map_err(|e| ModelError::InvalidOutput(format!("expected 3 dimensions: {}", e)))?;
    if output.shape()[0] != 1 || output.shape()[1] <= 4 {
        return Err(ModelError::InvalidOutput(format!(
            "unexpected output shape {:?}",
            output.shape()
        )));
    }

    let x_scale = img_width as f32 / input_size as f32;
    let y_scale = img_height as f32 / input_size as f32;

    let mut boxes = Vec::new();
    let anchors = output.index_axis(Axis(0), 0);

    for row in anchors.t().axis_iter(Axis(0)) {
        let best = row
            .iter()
            .skip(4)
            .copied()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(&b.1));
        let Some((class_id, prob)) = best else {
            continue;
        };

        if prob < min_probability {
            continue;
        }

        let xc = row[0] * x_scale;
        let yc = row[1] * y_scale;
        let w = row[2] * x_scale;
        let h = row[3] * y_scale;

        boxes.push(Detection {
            class_id,
            class_label: labels.name(class_id),
            confidence: prob,
            x1: xc - w / 2.,
            y1: yc - h / 2.,
            x2: xc + w / 2.,
            y2: yc + h / 2.,
        });
    }

    Ok(boxes)
}

#[derive(Clone)]
pub struct OrtModelService {
    sessions: Arc<Vec<Arc<Mutex<Session>>>>,
    counter: Arc<AtomicUsize>,
    labels: Arc<ClassLabels>,
    input_size: u32,
    min_probability: f32,
    iou_threshold: f32,
    max_detections: usize,
    output_name: String,
}

impl OrtModelService {
    pub fn new(model_config: &ModelConfig, labels: ClassLabels) -> Result<Self, ModelError> {
        model_config.validate().map_err(ModelError::MissingModel)?;

        ort::init().with_name("person_detection").commit()?;
        let num_instances = model_config.num_instances.max(1);
        let sessions = (0..num_instances)
            .map(|_| {
                let session = Session::builder()?
                    .with_optimization_level(GraphOptimizationLevel::Level3)?
                    .commit_from_file(model_config.get_path())?;
                Ok(Arc::new(Mutex::new(session)))
            })
            .collect::<Result<Vec<_>, ort::Error>>()?;

        if let Some(session) = sessions.first() {
            let session = session
                .lock()
                .map_err(|e| ModelError::Poisoned(e.to_string()))?;
            if !session
                .outputs
                .iter()
                .any(|output| output.name == model_config.output_name)
            {
                return Err(ModelError::InvalidOutput(format!(
                    "model has no output named {}",
                    model_config.output_name
                )));
            }
        }

        tracing::info!(
            "Created {} ONNX sessions from {:?}",
            num_instances,
            model_config.get_path()
        );

        Ok(Self {
            sessions: Arc::new(sessions),
            counter: Arc::new(AtomicUsize::new(0)),
            labels: Arc::new(labels),
            input_size: model_config.input_size,
            min_probability: model_config.min_probability,
            iou_threshold: model_config.iou_threshold,
            max_detections: model_config.max_detections,
            output_name: model_config.output_name.clone(),
        })
    }

    pub fn run_inference(&self, input: &Array<f32, Ix4>) -> Result<ArrayD<f32>, ModelError> {
        let index = self.counter.fetch_add(1, Ordering::SeqCst) % self.sessions.len();
        let mut session = self.sessions[index]
            .lock()
            .map_err(|e| ModelError::Poisoned(e.to_string()))?;

        tracing::debug!("Handling request with session {}", index);
        let owned_buffer;
        let input_view = if input.view().is_standard_layout() {
            input.view()
        } else {
            owned_buffer = input.as_standard_layout().to_owned();
            owned_buffer.view()
        };

        let tensor_ref = TensorRef::from_array_view(input_view)?;
        let outputs = session.run(ort::inputs![tensor_ref])?;

        let array = outputs[self.output_name.as_str()]
            .try_extract_array::<f32>()?
            .to_owned();

        Ok(array)
    }

    fn detect_blocking(&self, image: &DynamicImage) -> Result<Vec<Detection>, ModelError> {
        let (img_width, img_height) = image.dimensions();
        let input = transform_image(image, self.input_size);
        let output = self.run_inference(&input)?;

        let boxes = extract_detections(
            output.view(),
            self.input_size,
            img_width,
            img_height,
            &self.labels,
            self.min_probability,
        )?;

        Ok(non_max_suppression(
            boxes,
            self.iou_threshold,
            self.max_detections,
        ))
    }
}

#[async_trait]
impl ModelService for OrtModelService {
    async fn detect(&self, image: DynamicImage) -> Result<Vec<Detection>, ModelError> {
        let service = self.clone();
        tokio::task::spawn_blocking(move || service.detect_blocking(&image)).await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    #[test]
    fn test_transform_image() {
        let img = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_pixel(300, 300, Rgb([255, 0, 0]));
        let input = transform_image(&DynamicImage::ImageRgb8(img), 640);

        assert_eq!(input.shape(), &[1, 3, 640, 640]);
        assert!(input[[0, 0, 10, 10]] > 0.99);
        assert!(input[[0, 1, 10, 10]] < 0.01);
        assert!(input[[0, 2, 639, 639]] < 0.01);
    }

    #[test]
    fn test_extract_detections() {
        // 2 classes, 3 anchors laid out as [1, 6, 3].
        let mut output = ArrayD::<f32>::zeros(vec![1, 6, 3]);
        let anchors = [
            [320., 320., 64., 128., 0.9, 0.1],
            [100., 100., 10., 10., 0.2, 0.3],
            [500., 200., 40., 40., 0.05, 0.75],
        ];
        for (a, values) in anchors.iter().enumerate() {
            for (c, value) in values.iter().enumerate() {
                output[[0, c, a]] = *value;
            }
        }

        let labels = ClassLabels::from_vec(vec!["person".to_string(), "bicycle".to_string()]);
        let detections = extract_detections(output.view(), 640, 300, 300, &labels, 0.5).unwrap();

        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].class_label, "person");
        assert_eq!(detections[0].confidence, 0.9);
        assert!((detections[0].x1 - 135.).abs() < 1e-3);
        assert!((detections[0].y2 - 180.).abs() < 1e-3);
        assert_eq!(detections[1].class_id, 1);
        assert_eq!(detections[1].class_label, "bicycle");
    }

    #[test]
    fn test_extract_detections_rejects_bad_shape() {
        let output = ArrayD::<f32>::zeros(vec![6, 3]);
        let labels = ClassLabels::from_vec(vec!["person".to_string()]);
        let result = extract_detections(output.view(), 640, 300, 300, &labels, 0.5);

        assert!(matches!(result, Err(ModelError::InvalidOutput(_))));
    }
}
