use opencv::{
    core::{self, Mat, Scalar, Size, CV_32F},
    dnn, imgproc,
    prelude::*,
};

/// Net input sides are kept at multiples of the network stride.
const NET_SIZE_MULTIPLE: i32 = 16;

/// Resizes `src` to fit inside `target` without distortion, padding the right and bottom edges
/// with zeros. Returns the applied scale factor and the padded image.
pub(crate) fn resize_fixed_aspect(src: &Mat, target: Size) -> opencv::Result<(f64, Mat)> {
    let src_size = src.size()?;
    let scale = fit_scale(src_size, target);

    let scaled = Size::new(
        ((src_size.width as f64 * scale).round() as i32).clamp(1, target.width),
        ((src_size.height as f64 * scale).round() as i32).clamp(1, target.height),
    );

    let interpolation = if scale < 1. {
        imgproc::INTER_AREA
    } else {
        imgproc::INTER_CUBIC
    };

    let mut resized = Mat::default();
    imgproc::resize(src, &mut resized, scaled, 0., 0., interpolation)?;

    let mut padded = Mat::default();
    core::copy_make_border(
        &resized,
        &mut padded,
        0,
        target.height - scaled.height,
        0,
        target.width - scaled.width,
        core::BORDER_CONSTANT,
        Scalar::all(0.),
    )?;

    Ok((scale, padded))
}

pub(crate) fn fit_scale(src: Size, target: Size) -> f64 {
    f64::min(
        target.width as f64 / src.width as f64,
        target.height as f64 / src.height as f64,
    )
}

/// Net input size for one of the averaged scales, floored to a multiple of 16.
pub(crate) fn scaled_net_size(base: Size, scale: f32) -> Size {
    let side = |length: i32| {
        let scaled = (length as f32 * scale) as i32;
        (scaled / NET_SIZE_MULTIPLE * NET_SIZE_MULTIPLE).max(NET_SIZE_MULTIPLE)
    };

    Size::new(side(base.width), side(base.height))
}

/// Scale factors `1, 1 - gap, 1 - 2 * gap, ...`, one per averaged scale.
pub(crate) fn scale_factors(num_scales: u32, scale_gap: f32) -> Vec<f32> {
    (0..num_scales)
        .map(|i| 1. - i as f32 * scale_gap)
        .take_while(|&scale| scale > 0.)
        .collect()
}

pub(crate) fn bgra_to_bgr(frame: &Mat) -> opencv::Result<Mat> {
    let mut bgr = Mat::default();
    imgproc::cvt_color(frame, &mut bgr, imgproc::COLOR_BGRA2BGR, 0)?;
    Ok(bgr)
}

/// Builds a `[1, 3, H, W]` float blob holding `pixel / 256 - 0.5`.
pub(crate) fn to_net_blob(bgr: &Mat) -> opencv::Result<Mat> {
    dnn::blob_from_image(
        bgr,
        1. / 256.,
        Size::default(),
        Scalar::all(128.),
        false,
        false,
        CV_32F,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    use opencv::core::CV_8UC3;

    #[test]
    fn test_scaled_net_sizes() {
        let base = Size::new(656, 368);

        assert_eq!(scaled_net_size(base, 1.), base);
        assert_eq!(scaled_net_size(base, 0.7), Size::new(448, 256));
        assert_eq!(scaled_net_size(base, 0.01), Size::new(16, 16));
    }

    #[test]
    fn test_scale_factors() {
        assert_eq!(scale_factors(1, 0.3), vec![1.]);
        assert_eq!(scale_factors(3, 0.25), vec![1., 0.75, 0.5]);
        // Scales that would reach zero are dropped.
        assert_eq!(scale_factors(4, 0.5), vec![1., 0.5]);
    }

    #[test]
    fn test_resize_keeps_aspect_and_pads() {
        let src = Mat::new_rows_cols_with_default(480, 640, CV_8UC3, Scalar::all(200.)).unwrap();
        let (scale, padded) = resize_fixed_aspect(&src, Size::new(1280, 1280)).unwrap();

        assert_eq!(scale, 2.);
        assert_eq!(padded.size().unwrap(), Size::new(1280, 1280));

        let bytes = padded.data_bytes().unwrap();
        // Top-left pixel is image, bottom-left pixel is padding.
        assert_eq!(bytes[0], 200);
        assert_eq!(bytes[(1279 * 1280) * 3], 0);
    }

    #[test]
    fn test_net_blob_normalization() {
        let src = Mat::new_rows_cols_with_default(2, 3, CV_8UC3, Scalar::all(192.)).unwrap();
        let blob = to_net_blob(&src).unwrap();

        let dims = blob.mat_size().iter().copied().collect::<Vec<_>>();
        assert_eq!(dims, vec![1, 3, 2, 3]);
        assert!(blob
            .data_typed::<f32>()
            .unwrap()
            .iter()
            .all(|&v| (v - 0.25).abs() < 1e-6));
    }
}
