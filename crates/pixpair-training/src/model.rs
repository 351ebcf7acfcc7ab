//! Image-to-image model trait and the reference encoder/decoder CNN.
//!
//! Architecture of [`SampleCnn`]:
//! - 3 conv blocks (ReLU, 2x2 max pool, dropout) with 1x, 2x and 4x base filters
//! - a stride-2 conv bottleneck with 8x base filters
//! - 4 conv blocks followed by 2x nearest upsampling, back down to 1x base filters
//! - a 3x3 conv head with ReLU producing the output map
//!
//! The spatial size shrinks by 16 in the encoder, so inputs must be
//! divisible by 16 in both dimensions.

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        Dropout, DropoutConfig, PaddingConfig2d, Relu,
    },
    tensor::{
        backend::Backend,
        module::interpolate,
        ops::{InterpolateMode, InterpolateOptions},
        Tensor,
    },
};
use pixpair_core::{Error, ImageShape};

/// Total downsampling factor of the encoder
pub const SAMPLE_CNN_STRIDE: u32 = 16;

/// A model mapping an image batch `[N, C_in, H, W]` to `[N, C_out, H, W]`
pub trait PixelModel<B: Backend>: Module<B> {
    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4>;

    /// Human-readable layer listing, written to `architecture.txt`
    fn summary(&self) -> String;
}

/// Configuration for the SampleCnn model
#[derive(Config, Debug)]
pub struct SampleCnnConfig {
    /// Channels of the input images
    #[config(default = "3")]
    pub in_channels: usize,

    /// Channels of the predicted map
    #[config(default = "1")]
    pub out_channels: usize,

    /// Filters of the first block
    #[config(default = "32")]
    pub base_filters: usize,

    /// Dropout after every block
    #[config(default = "0.1")]
    pub dropout: f64,
}

/// Conv + ReLU, then optional pooling, then dropout
#[derive(Module, Debug)]
pub struct DownBlock<B: Backend> {
    pub conv: Conv2d<B>,
    pub relu: Relu,
    pub pool: Option<MaxPool2d>,
    pub dropout: Dropout,
}

impl<B: Backend> DownBlock<B> {
    fn new(
        in_channels: usize,
        out_channels: usize,
        strided: bool,
        dropout: f64,
        device: &B::Device,
    ) -> Self {
        let conv = if strided {
            Conv2dConfig::new([in_channels, out_channels], [3, 3])
                .with_stride([2, 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device)
        } else {
            Conv2dConfig::new([in_channels, out_channels], [3, 3])
                .with_padding(PaddingConfig2d::Same)
                .init(device)
        };

        let pool = if strided {
            None
        } else {
            Some(MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init())
        };

        Self {
            conv,
            relu: Relu::new(),
            pool,
            dropout: DropoutConfig::new(dropout).init(),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.relu.forward(self.conv.forward(x));
        let x = match &self.pool {
            Some(pool) => pool.forward(x),
            None => x,
        };
        self.dropout.forward(x)
    }

    fn describe(&self) -> String {
        let [out, inp, kh, kw] = self.conv.weight.val().dims();
        let reduce = match &self.pool {
            Some(_) => "maxpool 2x2",
            None => "stride 2",
        };
        format!("conv {kh}x{kw} {inp} -> {out}, relu, {reduce}, dropout")
    }
}

/// Conv + ReLU, then 2x nearest upsampling, then dropout
#[derive(Module, Debug)]
pub struct UpBlock<B: Backend> {
    pub conv: Conv2d<B>,
    pub relu: Relu,
    pub dropout: Dropout,
}

impl<B: Backend> UpBlock<B> {
    fn new(in_channels: usize, out_channels: usize, dropout: f64, device: &B::Device) -> Self {
        Self {
            conv: Conv2dConfig::new([in_channels, out_channels], [3, 3])
                .with_padding(PaddingConfig2d::Same)
                .init(device),
            relu: Relu::new(),
            dropout: DropoutConfig::new(dropout).init(),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.relu.forward(self.conv.forward(x));
        let [_, _, height, width] = x.dims();
        let x = interpolate(
            x,
            [height * 2, width * 2],
            InterpolateOptions::new(InterpolateMode::Nearest),
        );
        self.dropout.forward(x)
    }

    fn describe(&self) -> String {
        let [out, inp, kh, kw] = self.conv.weight.val().dims();
        format!("conv {kh}x{kw} {inp} -> {out}, relu, upsample 2x, dropout")
    }
}

/// Reference encoder/decoder for dense prediction
#[derive(Module, Debug)]
pub struct SampleCnn<B: Backend> {
    pub down1: DownBlock<B>,
    pub down2: DownBlock<B>,
    pub down3: DownBlock<B>,
    pub bottleneck: DownBlock<B>,
    pub up1: UpBlock<B>,
    pub up2: UpBlock<B>,
    pub up3: UpBlock<B>,
    pub up4: UpBlock<B>,
    pub head: Conv2d<B>,
    pub relu: Relu,
}

impl<B: Backend> SampleCnn<B> {
    pub fn new(config: &SampleCnnConfig, device: &B::Device) -> Self {
        let f = config.base_filters;
        let p = config.dropout;

        Self {
            down1: DownBlock::new(config.in_channels, f, false, p, device),
            down2: DownBlock::new(f, f * 2, false, p, device),
            down3: DownBlock::new(f * 2, f * 4, false, p, device),
            bottleneck: DownBlock::new(f * 4, f * 8, true, p, device),
            up1: UpBlock::new(f * 8, f * 8, p, device),
            up2: UpBlock::new(f * 8, f * 4, p, device),
            up3: UpBlock::new(f * 4, f * 2, p, device),
            up4: UpBlock::new(f * 2, f, p, device),
            head: Conv2dConfig::new([f, config.out_channels], [3, 3])
                .with_padding(PaddingConfig2d::Same)
                .init(device),
            relu: Relu::new(),
        }
    }
}

impl<B: Backend> PixelModel<B> for SampleCnn<B> {
    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.down1.forward(input);
        let x = self.down2.forward(x);
        let x = self.down3.forward(x);
        let x = self.bottleneck.forward(x);
        let x = self.up1.forward(x);
        let x = self.up2.forward(x);
        let x = self.up3.forward(x);
        let x = self.up4.forward(x);
        self.relu.forward(self.head.forward(x))
    }

    fn summary(&self) -> String {
        let [out, inp, kh, kw] = self.head.weight.val().dims();
        let layers = [
            ("down1", self.down1.describe()),
            ("down2", self.down2.describe()),
            ("down3", self.down3.describe()),
            ("bottleneck", self.bottleneck.describe()),
            ("up1", self.up1.describe()),
            ("up2", self.up2.describe()),
            ("up3", self.up3.describe()),
            ("up4", self.up4.describe()),
            ("head", format!("conv {kh}x{kw} {inp} -> {out}, relu")),
        ];

        let mut text = String::from("SampleCnn\n");
        for (name, description) in layers {
            text.push_str(&format!("  {name:<12}{description}\n"));
        }
        text.push_str(&format!("Total parameters: {}\n", self.num_params()));
        text
    }
}

/// Checks that a shape pair fits [`SampleCnn`]
pub fn check_sample_cnn_shapes(
    input_shape: ImageShape,
    output_shape: ImageShape,
) -> pixpair_core::Result<()> {
    if input_shape.width % SAMPLE_CNN_STRIDE != 0 || input_shape.height % SAMPLE_CNN_STRIDE != 0 {
        return Err(Error::Model(format!(
            "SampleCnn needs width and height divisible by {}, got {}",
            SAMPLE_CNN_STRIDE, input_shape
        )));
    }
    if (input_shape.width, input_shape.height) != (output_shape.width, output_shape.height) {
        return Err(Error::Model(format!(
            "SampleCnn predicts at input resolution: input {} vs output {}",
            input_shape, output_shape
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn small_model() -> SampleCnn<TestBackend> {
        let config = SampleCnnConfig::new().with_base_filters(2);
        SampleCnn::new(&config, &Default::default())
    }

    #[test]
    fn test_forward_keeps_resolution() {
        let model = small_model();
        let input = Tensor::<TestBackend, 4>::zeros([2, 3, 32, 16], &Default::default());
        let output = model.forward(input);
        assert_eq!(output.dims(), [2, 1, 32, 16]);
    }

    #[test]
    fn test_output_is_non_negative() {
        let model = small_model();
        let device = Default::default();
        let input = Tensor::<TestBackend, 4>::ones([1, 3, 16, 16], &device);
        let min: f32 = model.forward(input).min().into_scalar();
        assert!(min >= 0.0);
    }

    #[test]
    fn test_summary_lists_layers_and_params() {
        let model = small_model();
        let summary = model.summary();
        assert!(summary.contains("down1"));
        assert!(summary.contains("conv 3x3 3 -> 2"));
        assert!(summary.contains("stride 2"));
        assert!(summary.contains(&format!("Total parameters: {}", model.num_params())));
    }

    #[test]
    fn test_config_defaults_and_json() {
        let config = SampleCnnConfig::new();
        assert_eq!(config.in_channels, 3);
        assert_eq!(config.out_channels, 1);
        assert_eq!(config.base_filters, 32);

        let restored: SampleCnnConfig =
            serde_json::from_str(&serde_json::to_string(&config.with_dropout(0.3)).unwrap()).unwrap();
        assert_eq!(restored.dropout, 0.3);
    }

    #[test]
    fn test_shape_checks() {
        let input = ImageShape::new(64, 48, 3);
        assert!(check_sample_cnn_shapes(input, ImageShape::new(64, 48, 1)).is_ok());
        assert!(check_sample_cnn_shapes(ImageShape::new(60, 48, 3), ImageShape::new(60, 48, 1)).is_err());
        assert!(check_sample_cnn_shapes(input, ImageShape::new(32, 24, 1)).is_err());
    }
}
