use std::collections::HashMap;
use std::path::Path;

use candle_core::{DType, Device, Module, Tensor};
use candle_nn::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig, Linear, VarBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ViewerError};

/// Which of the two decoder outputs to compute.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecoderHead {
    Appearance,
    Segmentation,
}

impl DecoderHead {
    /// Parameter prefix of the head inside a checkpoint.
    pub fn prefix(self) -> &'static str {
        match self {
            DecoderHead::Appearance => "decoder",
            DecoderHead::Segmentation => "decoder_segmentation",
        }
    }
}

/// Raw (pre-sigmoid) output of one head, channel-major.
#[derive(Clone, Debug, PartialEq)]
pub struct HeadOutput {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
    pub data: Vec<f32>,
}

impl HeadOutput {
    pub fn channel(&self, c: usize) -> Option<&[f32]> {
        let plane = self.height * self.width;
        if c >= self.channels || self.data.len() != plane * self.channels {
            return None;
        }
        Some(&self.data[c * plane..(c + 1) * plane])
    }
}

/// A latent-to-image model with an appearance and a segmentation head.
pub trait Decoder {
    fn latent_dim(&self) -> usize;
    fn decode(&self, head: DecoderHead, latent: &[f32]) -> Result<HeadOutput>;
}

/// Layer sizes of one decoder head. Both heads share everything except the
/// number of output channels.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderArch {
    pub latent_dim: usize,
    pub seed_channels: usize,
    pub seed_size: usize,
    /// Output channels of each 2x upsampling stage
    pub stage_channels: Vec<usize>,
    pub appearance_channels: usize,
    pub segmentation_channels: usize,
    pub elu_alpha: f64,
}

impl Default for DecoderArch {
    fn default() -> Self {
        Self {
            latent_dim: 64,
            seed_channels: 256,
            seed_size: 2,
            stage_channels: vec![128, 64, 32, 16, 16],
            appearance_channels: 1,
            segmentation_channels: 1,
            elu_alpha: 1.0,
        }
    }
}

impl DecoderArch {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let load_err = |message: String| ViewerError::Load {
            path: path.display().to_string(),
            message,
        };
        let text = std::fs::read_to_string(path).map_err(|e| load_err(e.to_string()))?;
        let arch: DecoderArch =
            serde_json::from_str(&text).map_err(|e| load_err(format!("bad architecture: {e}")))?;
        arch.validate().map_err(load_err)?;
        Ok(arch)
    }

    /// Edge length of the decoded square image, saturating at `usize::MAX`.
    pub fn output_size(&self) -> usize {
        self.checked_output_size().unwrap_or(usize::MAX)
    }

    fn checked_output_size(&self) -> Option<usize> {
        let stages = u32::try_from(self.stage_channels.len()).ok()?;
        self.seed_size.checked_mul(1usize.checked_shl(stages)?)
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.latent_dim == 0 || self.seed_channels == 0 || self.seed_size == 0 {
            return Err("latent_dim, seed_channels and seed_size must be positive".into());
        }
        if self.stage_channels.contains(&0) {
            return Err("stage channels must be positive".into());
        }
        if self.appearance_channels == 0 || self.segmentation_channels == 0 {
            return Err("each head needs at least one output channel".into());
        }
        if self.checked_output_size().is_none() {
            return Err(format!(
                "{} stages from a {}px seed overflow the output size",
                self.stage_channels.len(),
                self.seed_size
            ));
        }
        Ok(())
    }
}

struct HeadStack {
    fc: Linear,
    ups: Vec<ConvTranspose2d>,
    out: Conv2d,
    seed_channels: usize,
    seed_size: usize,
    elu_alpha: f64,
}

impl HeadStack {
    fn new(arch: &DecoderArch, out_channels: usize, vb: VarBuilder) -> candle_core::Result<Self> {
        let seed_len = arch.seed_channels * arch.seed_size * arch.seed_size;
        let fc = candle_nn::linear(arch.latent_dim, seed_len, vb.pp("fc"))?;
        let up_cfg = ConvTranspose2dConfig {
            padding: 1,
            output_padding: 0,
            stride: 2,
            dilation: 1,
        };
        let mut ups = Vec::with_capacity(arch.stage_channels.len());
        let mut in_c = arch.seed_channels;
        for (i, &out_c) in arch.stage_channels.iter().enumerate() {
            ups.push(candle_nn::conv_transpose2d(
                in_c,
                out_c,
                4,
                up_cfg,
                vb.pp(format!("up.{i}")),
            )?);
            in_c = out_c;
        }
        let out_cfg = Conv2dConfig {
            padding: 1,
            ..Default::default()
        };
        let out = candle_nn::conv2d(in_c, out_channels, 3, out_cfg, vb.pp("out"))?;
        Ok(Self {
            fc,
            ups,
            out,
            seed_channels: arch.seed_channels,
            seed_size: arch.seed_size,
            elu_alpha: arch.elu_alpha,
        })
    }

    fn forward(&self, z: &Tensor) -> candle_core::Result<Tensor> {
        let x = self.fc.forward(z)?.elu(self.elu_alpha)?;
        let mut x = x.reshape((1, self.seed_channels, self.seed_size, self.seed_size))?;
        for up in &self.ups {
            x = up.forward(&x)?.elu(self.elu_alpha)?;
        }
        self.out.forward(&x)
    }
}

/// Convolutional decoder with the two heads of the trained autoencoder.
pub struct ConvDecoder {
    appearance: HeadStack,
    segmentation: HeadStack,
    latent_dim: usize,
    device: Device,
}

impl ConvDecoder {
    pub fn new(arch: &DecoderArch, vb: VarBuilder) -> candle_core::Result<Self> {
        let device = vb.device().clone();
        let appearance = HeadStack::new(
            arch,
            arch.appearance_channels,
            vb.pp(DecoderHead::Appearance.prefix()),
        )?;
        let segmentation = HeadStack::new(
            arch,
            arch.segmentation_channels,
            vb.pp(DecoderHead::Segmentation.prefix()),
        )?;
        Ok(Self {
            appearance,
            segmentation,
            latent_dim: arch.latent_dim,
            device,
        })
    }

    fn run(&self, head: DecoderHead, latent: &[f32]) -> candle_core::Result<HeadOutput> {
        let z = Tensor::from_slice(latent, (1, latent.len()), &self.device)?;
        let stack = match head {
            DecoderHead::Appearance => &self.appearance,
            DecoderHead::Segmentation => &self.segmentation,
        };
        let y = stack.forward(&z)?;
        let (_, channels, height, width) = y.dims4()?;
        let data = y.to_dtype(DType::F32)?.flatten_all()?.to_vec1::<f32>()?;
        Ok(HeadOutput {
            channels,
            height,
            width,
            data,
        })
    }
}

impl Decoder for ConvDecoder {
    fn latent_dim(&self) -> usize {
        self.latent_dim
    }

    fn decode(&self, head: DecoderHead, latent: &[f32]) -> Result<HeadOutput> {
        self.run(head, latent)
            .map_err(|e| ViewerError::inference(head.prefix(), e))
    }
}

/// Loads both decoder heads from a checkpoint.
///
/// `.safetensors` files are read directly. Anything else is treated as a
/// PyTorch pickle; the `model_state_dict` entry is used when the file is a
/// training checkpoint, otherwise the top-level dictionary.
pub fn load_checkpoint(path: &Path, arch: &DecoderArch, device: &Device) -> Result<ConvDecoder> {
    let load_err = |message: String| ViewerError::Load {
        path: path.display().to_string(),
        message,
    };
    if !path.exists() {
        return Err(load_err("file not found".into()));
    }

    let is_safetensors = path.extension().is_some_and(|ext| ext == "safetensors");
    let tensors: HashMap<String, Tensor> = if is_safetensors {
        candle_core::safetensors::load(path, device).map_err(|e| load_err(e.to_string()))?
    } else {
        read_pickle(path).map_err(|e| load_err(e.to_string()))?
    };
    tracing::info!("Read {} tensors from {}", tensors.len(), path.display());

    let vb = VarBuilder::from_tensors(tensors, DType::F32, device);
    let decoder = ConvDecoder::new(arch, vb).map_err(|e| load_err(e.to_string()))?;
    tracing::info!(
        "Loaded decoder: latent_dim={}, output={}x{}",
        arch.latent_dim,
        arch.output_size(),
        arch.output_size()
    );
    Ok(decoder)
}

fn read_pickle(path: &Path) -> candle_core::Result<HashMap<String, Tensor>> {
    let entries = match candle_core::pickle::read_all_with_key(path, Some("model_state_dict")) {
        Ok(entries) if !entries.is_empty() => entries,
        _ => candle_core::pickle::read_all(path)?,
    };
    Ok(entries.into_iter().collect())
}
