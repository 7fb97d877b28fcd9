use opencv::{
    core::{self, Mat, Point, Scalar},
    imgproc,
    prelude::*,
};

use super::{Keypoint, KeypointSet};
use crate::config::PoseModel;

/// Parts scored below this are left out of the overlay.
const RENDER_THRESHOLD: f32 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Stroke {
    pub from: (f32, f32),
    pub to: (f32, f32),
    /// BGR, as OpenCV draws it.
    pub color: (u8, u8, u8),
}

/// Limbs whose two ends were both detected, mapped into output buffer coordinates.
pub(crate) fn limb_strokes(model: PoseModel, person: &[Keypoint], scale: f64) -> Vec<Stroke> {
    let colors = model.part_colors();
    let to_output = |k: &Keypoint| (k.x * scale as f32, k.y * scale as f32);

    model
        .limbs()
        .iter()
        .filter_map(|&(start, end)| {
            let (from, to) = (person.get(start)?, person.get(end)?);

            if from.score < RENDER_THRESHOLD || to.score < RENDER_THRESHOLD {
                return None;
            }

            let (r, g, b) = colors[end];
            Some(Stroke {
                from: to_output(from),
                to: to_output(to),
                color: (b, g, r),
            })
        })
        .collect()
}

fn point((x, y): (f32, f32)) -> Point {
    Point::new(x.round() as i32, y.round() as i32)
}

/// Draws every person's skeleton onto a copy of `canvas` and blends it back with `alpha`.
pub(crate) fn render_keypoints(
    canvas: &mut Mat,
    model: PoseModel,
    keypoints: &KeypointSet,
    scale: f64,
    alpha: f32,
) -> opencv::Result<()> {
    if keypoints.is_empty() {
        return Ok(());
    }

    let mut overlay = canvas.try_clone()?;

    let thickness = ((canvas.rows().min(canvas.cols()) as f64) / 180.).round().max(1.) as i32;
    let radius = thickness + 2;

    for person in keypoints.people() {
        for stroke in limb_strokes(model, person, scale) {
            let (b, g, r) = stroke.color;
            let color = Scalar::new(b as f64, g as f64, r as f64, 0.);

            imgproc::line(
                &mut overlay,
                point(stroke.from),
                point(stroke.to),
                color,
                thickness,
                imgproc::LINE_8,
                0,
            )?;
        }

        for (part, keypoint) in person.iter().enumerate() {
            if keypoint.score < RENDER_THRESHOLD {
                continue;
            }

            let (r, g, b) = model.part_colors()[part];
            imgproc::circle(
                &mut overlay,
                point((keypoint.x * scale as f32, keypoint.y * scale as f32)),
                radius,
                Scalar::new(b as f64, g as f64, r as f64, 0.),
                -1,
                imgproc::LINE_8,
                0,
            )?;
        }
    }

    let mut blended = Mat::default();
    core::add_weighted(
        &overlay,
        alpha as f64,
        &*canvas,
        1. - alpha as f64,
        0.,
        &mut blended,
        -1,
    )?;

    *canvas = blended;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use opencv::core::{Vec3f, CV_32FC3};

    fn coco_person(detected: &[(usize, f32, f32)]) -> Vec<Keypoint> {
        let mut person = vec![Keypoint::default(); PoseModel::Coco18.num_body_parts()];
        for &(part, x, y) in detected {
            person[part] = Keypoint { x, y, score: 0.9 };
        }
        person
    }

    #[test]
    fn test_strokes_need_both_ends() {
        // Neck, right shoulder and right elbow; left side missing.
        let person = coco_person(&[(1, 10., 10.), (2, 20., 10.), (3, 30., 20.)]);
        let strokes = limb_strokes(PoseModel::Coco18, &person, 2.);

        assert_eq!(strokes.len(), 2);
        assert_eq!(strokes[0].from, (20., 20.));
        assert_eq!(strokes[0].to, (40., 20.));
        // Colored after the right shoulder, (255, 85, 0) in RGB.
        assert_eq!(strokes[0].color, (0, 85, 255));
        assert_eq!(strokes[1].to, (60., 40.));
    }

    #[test]
    fn test_alpha_blending() {
        let person = coco_person(&[(1, 2., 2.), (2, 8., 2.)]);
        let keypoints = KeypointSet::new(vec![person]);

        for &(alpha, expect_drawn) in &[(0f32, false), (1f32, true)] {
            let mut canvas =
                Mat::new_rows_cols_with_default(10, 10, CV_32FC3, Scalar::all(0.)).unwrap();

            render_keypoints(&mut canvas, PoseModel::Coco18, &keypoints, 1., alpha).unwrap();

            let pixel = canvas.at_2d::<Vec3f>(2, 5).unwrap().0;
            let drawn = pixel.iter().any(|&c| c > 0.);
            assert_eq!(drawn, expect_drawn, "alpha {alpha}");
        }
    }

    #[test]
    fn test_empty_set_leaves_canvas_untouched() {
        let mut canvas =
            Mat::new_rows_cols_with_default(4, 4, CV_32FC3, Scalar::all(12.)).unwrap();

        render_keypoints(
            &mut canvas,
            PoseModel::Mpi15,
            &KeypointSet::default(),
            1.,
            1.,
        )
        .unwrap();

        assert_eq!(canvas.at_2d::<Vec3f>(0, 0).unwrap().0, [12., 12., 12.]);
    }
}
