#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub class_id: usize,
    pub class_label: String,
    pub confidence: f32,
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

fn intersection(box1: &Detection, box2: &Detection) -> f32 {
    let width = box1.x2.min(box2.x2) - box1.x1.max(box2.x1);
    let height = box1.y2.min(box2.y2) - box1.y1.max(box2.y1);
    width.max(0.) * height.max(0.)
}

fn union(box1: &Detection, box2: &Detection) -> f32 {
    ((box1.x2 - box1.x1) * (box1.y2 - box1.y1)) + ((box2.x2 - box2.x1) * (box2.y2 - box2.y1))
        - intersection(box1, box2)
}

pub fn iou(box1: &Detection, box2: &Detection) -> f32 {
    let union = union(box1, box2);
    if union <= 0. {
        return 0.;
    }
    intersection(box1, box2) / union
}

/// Greedy NMS. Output is sorted by descending confidence and capped at
/// `max_detections`.
pub fn non_max_suppression(
    mut boxes: Vec<Detection>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<Detection> {
    boxes.sort_by(|box1, box2| box2.confidence.total_cmp(&box1.confidence));
    let mut result = Vec::new();

    while !boxes.is_empty() && result.len() < max_detections {
        let best = boxes.remove(0);
        boxes.retain(|other| iou(&best, other) < iou_threshold);
        result.push(best);
    }

    result
}

pub fn contains_label(detections: &[Detection], label: &str) -> bool {
    detections
        .iter()
        .any(|detection| detection.class_label == label)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(label: &str, confidence: f32, x1: f32, y1: f32, x2: f32, y2: f32) -> Detection {
        Detection {
            class_id: 0,
            class_label: label.to_string(),
            confidence,
            x1,
            y1,
            x2,
            y2,
        }
    }

    #[test]
    fn test_iou() {
        let a = bbox("person", 0.9, 0., 0., 10., 10.);
        let b = bbox("person", 0.8, 5., 0., 15., 10.);
        let c = bbox("person", 0.8, 20., 20., 30., 30.);

        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
        assert!((iou(&a, &b) - 50. / 150.).abs() < 1e-6);
        assert_eq!(iou(&a, &c), 0.);
    }

    #[test]
    fn test_non_max_suppression() {
        let boxes = vec![
            bbox("dog", 0.6, 100., 100., 150., 150.),
            bbox("person", 0.8, 0.5, 0.5, 10.5, 10.5),
            bbox("person", 0.95, 0., 0., 10., 10.),
        ];

        let kept = non_max_suppression(boxes, 0.7, 20);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.95);
        assert_eq!(kept[1].class_label, "dog");
    }

    #[test]
    fn test_non_max_suppression_caps_output() {
        let boxes = (0..5)
            .map(|i| {
                let offset = i as f32 * 100.;
                bbox("car", 0.5 + i as f32 / 10., offset, 0., offset + 10., 10.)
            })
            .collect();

        let kept = non_max_suppression(boxes, 0.7, 3);
        assert_eq!(kept.len(), 3);
        assert!(kept[0].confidence > kept[2].confidence);
    }

    #[test]
    fn test_contains_label() {
        let detections = vec![
            bbox("bicycle", 0.88, 0., 0., 1., 1.),
            bbox("person", 0.95, 0., 0., 1., 1.),
        ];

        assert!(contains_label(&detections, "person"));
        assert!(!contains_label(&detections, "dog"));
        assert!(!contains_label(&[], "person"));
    }
}
