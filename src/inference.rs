use crate::config::OverlayStyle;
use crate::error::{Result, ViewerError};
use crate::latent::LatentState;
use crate::model::{Decoder, DecoderHead, HeadOutput};

/// Decoded frame, RGB interleaved, row-major.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<u8>,
}

/// Per-pixel segmentation confidence in [0, 1].
struct SegmentationMask {
    confidence: Vec<f32>,
}

fn sigmoid(v: f32) -> f32 {
    1.0 / (1.0 + (-v).exp())
}

fn first_channel<'a>(head: DecoderHead, out: &'a HeadOutput) -> Result<&'a [f32]> {
    out.channel(0).ok_or_else(|| ViewerError::Inference {
        message: format!(
            "{} head returned {} values for {}x{}x{}",
            head.prefix(),
            out.data.len(),
            out.channels,
            out.height,
            out.width
        ),
    })
}

/// Runs both heads on `latent` and composites the segmentation overlay onto
/// the grayscale appearance image.
pub fn decode_latent(
    decoder: &dyn Decoder,
    latent: &[f32],
    overlay: &OverlayStyle,
) -> Result<DecodedImage> {
    if latent.len() != decoder.latent_dim() {
        return Err(ViewerError::ShapeMismatch {
            expected: decoder.latent_dim(),
            actual: latent.len(),
        });
    }

    let appearance = decoder.decode(DecoderHead::Appearance, latent)?;
    let segmentation = decoder.decode(DecoderHead::Segmentation, latent)?;
    if (appearance.width, appearance.height) != (segmentation.width, segmentation.height) {
        return Err(ViewerError::Inference {
            message: format!(
                "head sizes differ: appearance {}x{}, segmentation {}x{}",
                appearance.width, appearance.height, segmentation.width, segmentation.height
            ),
        });
    }

    let gray = first_channel(DecoderHead::Appearance, &appearance)?;
    let mask = SegmentationMask {
        confidence: first_channel(DecoderHead::Segmentation, &segmentation)?
            .iter()
            .map(|&v| sigmoid(v))
            .collect(),
    };

    let mut pixels = Vec::with_capacity(gray.len() * 3);
    for (&g, &c) in gray.iter().zip(&mask.confidence) {
        if c > overlay.threshold {
            pixels.extend(overlay.gain.map(|gain| (c * gain) as u8));
        } else {
            let v = (sigmoid(g) * 255.0) as u8;
            pixels.extend([v, v, v]);
        }
    }

    Ok(DecodedImage {
        width: appearance.width,
        height: appearance.height,
        pixels,
    })
}

type Observer = Box<dyn FnMut(&DecodedImage)>;

/// Owns the decoder and the latent vector, renders on demand and tells
/// subscribers about each new frame.
pub struct InferenceAdapter {
    decoder: Box<dyn Decoder>,
    latent: LatentState,
    overlay: OverlayStyle,
    observers: Vec<Observer>,
    last: Option<DecodedImage>,
}

impl InferenceAdapter {
    pub fn new(decoder: Box<dyn Decoder>, latent: LatentState, overlay: OverlayStyle) -> Self {
        Self {
            decoder,
            latent,
            overlay,
            observers: Vec::new(),
            last: None,
        }
    }

    /// Registers a callback run synchronously after every successful render.
    pub fn subscribe(&mut self, observer: impl FnMut(&DecodedImage) + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Decodes the current latent vector. On failure the previous frame is
    /// kept and no observer runs.
    pub fn infer(&mut self) -> Result<&DecodedImage> {
        let image = decode_latent(self.decoder.as_ref(), self.latent.as_slice(), &self.overlay)?;
        tracing::debug!(width = image.width, height = image.height, "rendered frame");
        for observer in &mut self.observers {
            observer(&image);
        }
        Ok(&*self.last.insert(image))
    }

    pub fn set_coordinate(&mut self, index: usize, value: f32) -> Result<()> {
        self.latent.set_coordinate(index, value)
    }

    pub fn reset_latent(&mut self) {
        self.latent.reset();
    }

    pub fn latent(&self) -> &LatentState {
        &self.latent
    }

    pub fn last_image(&self) -> Option<&DecodedImage> {
        self.last.as_ref()
    }
}
