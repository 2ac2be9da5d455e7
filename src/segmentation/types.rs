/// Per-pixel category labels produced by a segmentation adapter.
///
/// Labels are row-major and align 1:1 with the pixels of the frame the mask
/// was computed from. Which label marks the foreground is declared by the
/// adapter that produced the mask and travels with it, since models disagree
/// on the convention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentationMask {
    labels: Vec<u8>,
    foreground_label: u8,
}

impl SegmentationMask {
    pub fn new(labels: Vec<u8>, foreground_label: u8) -> Self {
        Self {
            labels,
            foreground_label,
        }
    }

    pub fn labels(&self) -> &[u8] {
        &self.labels
    }

    pub fn foreground_label(&self) -> u8 {
        self.foreground_label
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn is_foreground(&self, index: usize) -> bool {
        self.labels.get(index) == Some(&self.foreground_label)
    }

    /// Share of pixels carrying the foreground label, 0.0 for an empty mask.
    pub fn coverage(&self) -> f32 {
        if self.labels.is_empty() {
            return 0.0;
        }
        let hits = self
            .labels
            .iter()
            .filter(|&&label| label == self.foreground_label)
            .count();
        hits as f32 / self.labels.len() as f32
    }
}
