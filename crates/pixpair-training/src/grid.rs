//! Tiling images into a single picture for visual inspection.

use image::{imageops, DynamicImage, RgbImage};
use pixpair_core::{Error, Result};

/// Rows and columns of a grid holding `n` tiles.
///
/// `rows = floor(sqrt(n))`, `cols = ceil(n / rows)`.
pub fn grid_dims(n: usize) -> (usize, usize) {
    if n == 0 {
        return (0, 0);
    }
    let rows = ((n as f64).sqrt().floor() as usize).max(1);
    let cols = n.div_ceil(rows);
    (rows, cols)
}

/// Tiles same-sized images row-major into one RGB image.
///
/// Single-channel images are expanded to RGB; unused cells stay black.
pub fn stack_grid(images: &[DynamicImage]) -> Result<RgbImage> {
    let first = images
        .first()
        .ok_or_else(|| Error::InvalidArgument("Cannot build a grid from no images".to_string()))?;
    let (tile_width, tile_height) = (first.width(), first.height());

    if let Some(odd) = images
        .iter()
        .find(|image| (image.width(), image.height()) != (tile_width, tile_height))
    {
        return Err(Error::InvalidArgument(format!(
            "Grid tiles must share one size: {}x{} vs {}x{}",
            tile_width,
            tile_height,
            odd.width(),
            odd.height()
        )));
    }

    let (rows, cols) = grid_dims(images.len());
    let mut grid = RgbImage::new(tile_width * cols as u32, tile_height * rows as u32);

    for (i, image) in images.iter().enumerate() {
        let x = (i % cols) as i64 * tile_width as i64;
        let y = (i / cols) as i64 * tile_height as i64;
        imageops::replace(&mut grid, &image.to_rgb8(), x, y);
    }

    Ok(grid)
}

/// Alternates images of two lists: `a[0], b[0], a[1], b[1], ...`
///
/// Stops at the end of the shorter list.
pub fn interleave(a: &[DynamicImage], b: &[DynamicImage]) -> Vec<DynamicImage> {
    a.iter()
        .zip(b)
        .flat_map(|(first, second)| [first.clone(), second.clone()])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb};

    fn gray(value: u8) -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_pixel(2, 3, Luma([value])))
    }

    #[test]
    fn test_grid_dims() {
        assert_eq!(grid_dims(1), (1, 1));
        assert_eq!(grid_dims(2), (1, 2));
        assert_eq!(grid_dims(5), (2, 3));
        assert_eq!(grid_dims(8), (2, 4));
        assert_eq!(grid_dims(9), (3, 3));
        assert_eq!(grid_dims(16), (4, 4));
        assert_eq!(grid_dims(0), (0, 0));
    }

    #[test]
    fn test_five_tiles_fill_row_major_with_black_filler() {
        let images: Vec<_> = (1..=5).map(|i| gray(i * 40)).collect();
        let grid = stack_grid(&images).unwrap();

        assert_eq!(grid.dimensions(), (6, 6));
        assert_eq!(*grid.get_pixel(0, 0), Rgb([40, 40, 40]));
        assert_eq!(*grid.get_pixel(4, 0), Rgb([120, 120, 120]));
        assert_eq!(*grid.get_pixel(2, 3), Rgb([200, 200, 200]));
        assert_eq!(*grid.get_pixel(5, 5), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_nine_tiles_make_a_square() {
        let images: Vec<_> = (0..9).map(|i| gray(i * 20)).collect();
        let grid = stack_grid(&images).unwrap();

        assert_eq!(grid.dimensions(), (6, 9));
        for i in 0..9u32 {
            let pixel = grid.get_pixel((i % 3) * 2, (i / 3) * 3);
            assert_eq!(pixel[0], (i * 20) as u8);
        }
    }

    #[test]
    fn test_eight_tiles_need_no_filler() {
        let images: Vec<_> = (1..=8).map(|i| gray(i * 30)).collect();
        let grid = stack_grid(&images).unwrap();

        assert_eq!(grid.dimensions(), (8, 6));
        assert_eq!(grid.get_pixel(6, 0)[0], 120);
        assert_eq!(grid.get_pixel(7, 5)[0], 240);
        assert!(grid.pixels().all(|p| p[0] != 0));
    }

    #[test]
    fn test_mismatched_tiles_rejected() {
        let images = vec![gray(0), DynamicImage::new_rgb8(3, 3)];
        assert!(matches!(stack_grid(&images), Err(Error::InvalidArgument(_))));
        assert!(stack_grid(&[]).is_err());
    }

    #[test]
    fn test_interleave_pairs_inputs_with_predictions() {
        let inputs = vec![gray(1), gray(2)];
        let predictions = vec![gray(10), gray(20), gray(30)];
        let mixed = interleave(&inputs, &predictions);

        let values: Vec<u8> = mixed.iter().map(|i| i.to_luma8().get_pixel(0, 0)[0]).collect();
        assert_eq!(values, vec![1, 10, 2, 20]);
    }
}
