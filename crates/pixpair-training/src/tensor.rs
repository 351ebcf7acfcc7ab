//! Conversion between decoded images and Burn tensors.

use burn::tensor::{backend::Backend, Tensor, TensorData};
use image::DynamicImage;
use pixpair_core::{Error, ImageShape, Result};
use pixpair_dataset::{chw_to_image, image_to_chw, ImageBatch};

/// A batch of paired tensors for training
#[derive(Clone, Debug)]
pub struct PairBatch<B: Backend> {
    /// Network inputs with shape [batch_size, input_channels, height, width]
    pub inputs: Tensor<B, 4>,
    /// Targets with shape [batch_size, output_channels, height, width]
    pub targets: Tensor<B, 4>,
}

/// Turns decoded image batches into tensors on one device
#[derive(Clone, Debug)]
pub struct PairBatcher<B: Backend> {
    device: B::Device,
    input_channels: u32,
    output_channels: u32,
}

impl<B: Backend> PairBatcher<B> {
    pub fn new(device: B::Device, input_channels: u32, output_channels: u32) -> Self {
        Self {
            device,
            input_channels,
            output_channels,
        }
    }

    pub fn batch(&self, batch: &ImageBatch) -> Result<PairBatch<B>> {
        Ok(PairBatch {
            inputs: images_to_tensor(&batch.inputs, self.input_channels, &self.device)?,
            targets: images_to_tensor(&batch.labels, self.output_channels, &self.device)?,
        })
    }
}

/// Stacks same-sized images into a `[N, C, H, W]` tensor with values in `[0, 1]`
pub fn images_to_tensor<B: Backend>(
    images: &[DynamicImage],
    channels: u32,
    device: &B::Device,
) -> Result<Tensor<B, 4>> {
    let first = images
        .first()
        .ok_or_else(|| Error::InvalidArgument("Cannot build a tensor from no images".to_string()))?;
    let sample = ImageShape::new(first.width(), first.height(), channels);
    let (width, height) = (sample.width, sample.height);

    let mut values = Vec::with_capacity(images.len() * sample.num_values());
    for image in images {
        if (image.width(), image.height()) != (width, height) {
            return Err(Error::InvalidArgument(format!(
                "Images in a batch must share one size: {}x{} vs {}x{}",
                width,
                height,
                image.width(),
                image.height()
            )));
        }
        values.extend(image_to_chw(image, channels)?);
    }

    let shape = [
        images.len(),
        channels as usize,
        height as usize,
        width as usize,
    ];
    Ok(Tensor::from_data(TensorData::new(values, shape), device))
}

/// Splits a `[N, C, H, W]` tensor into `N` 8-bit images, clipping to `[0, 1]`
pub fn tensor_to_images<B: Backend>(tensor: Tensor<B, 4>) -> Result<Vec<DynamicImage>> {
    let [batch, channels, height, width] = tensor.dims();
    let values = tensor
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| Error::Model(format!("Failed to read tensor data: {:?}", e)))?;

    let per_image = channels * height * width;
    values
        .chunks(per_image.max(1))
        .take(batch)
        .map(|chunk| chw_to_image(chunk, width as u32, height as u32, channels as u32))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use image::{GrayImage, Luma, Rgb, RgbImage};

    type TestBackend = NdArray;

    #[test]
    fn test_images_to_tensor_shape_and_scale() {
        let images = vec![
            DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 2, Rgb([255, 0, 0]))),
            DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 2, Rgb([0, 255, 0]))),
        ];
        let tensor = images_to_tensor::<TestBackend>(&images, 3, &Default::default()).unwrap();
        assert_eq!(tensor.dims(), [2, 3, 2, 4]);

        let values = tensor.into_data().to_vec::<f32>().unwrap();
        assert_eq!(values[0], 1.0);
        assert_eq!(values[8], 0.0);
        assert_eq!(values[24 + 8], 1.0);
    }

    #[test]
    fn test_mixed_sizes_rejected() {
        let images = vec![DynamicImage::new_rgb8(4, 4), DynamicImage::new_rgb8(2, 4)];
        let result = images_to_tensor::<TestBackend>(&images, 3, &Default::default());
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
        assert!(images_to_tensor::<TestBackend>(&[], 3, &Default::default()).is_err());
    }

    #[test]
    fn test_tensor_to_images_single_channel() {
        let images = vec![
            DynamicImage::ImageLuma8(GrayImage::from_pixel(3, 3, Luma([0]))),
            DynamicImage::ImageLuma8(GrayImage::from_pixel(3, 3, Luma([255]))),
        ];
        let tensor = images_to_tensor::<TestBackend>(&images, 1, &Default::default()).unwrap();
        let back = tensor_to_images(tensor).unwrap();

        assert_eq!(back.len(), 2);
        assert_eq!(back[0].to_luma8().get_pixel(1, 1)[0], 0);
        assert_eq!(back[1].to_luma8().get_pixel(2, 2)[0], 255);
    }

    #[test]
    fn test_batcher_uses_channel_counts() {
        let batch = ImageBatch {
            inputs: vec![DynamicImage::new_rgb8(8, 8)],
            labels: vec![DynamicImage::new_luma8(8, 8)],
        };
        let batcher = PairBatcher::<TestBackend>::new(Default::default(), 3, 1);
        let tensors = batcher.batch(&batch).unwrap();
        assert_eq!(tensors.inputs.dims(), [1, 3, 8, 8]);
        assert_eq!(tensors.targets.dims(), [1, 1, 8, 8]);
    }
}
