use std::path::{Path, PathBuf};

use crate::config::PoseModel;

const COCO_BODY_PARTS: &[&str] = &[
    "Nose",
    "Neck",
    "RShoulder",
    "RElbow",
    "RWrist",
    "LShoulder",
    "LElbow",
    "LWrist",
    "RHip",
    "RKnee",
    "RAnkle",
    "LHip",
    "LKnee",
    "LAnkle",
    "REye",
    "LEye",
    "REar",
    "LEar",
];

const MPI_BODY_PARTS: &[&str] = &[
    "Head",
    "Neck",
    "RShoulder",
    "RElbow",
    "RWrist",
    "LShoulder",
    "LElbow",
    "LWrist",
    "RHip",
    "RKnee",
    "RAnkle",
    "LHip",
    "LKnee",
    "LAnkle",
    "Chest",
];

const COCO_LIMBS: &[(usize, usize)] = &[
    (1, 2),
    (1, 5),
    (2, 3),
    (3, 4),
    (5, 6),
    (6, 7),
    (1, 8),
    (8, 9),
    (9, 10),
    (1, 11),
    (11, 12),
    (12, 13),
    (1, 0),
    (0, 14),
    (14, 16),
    (0, 15),
    (15, 17),
];

const MPI_LIMBS: &[(usize, usize)] = &[
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 4),
    (1, 5),
    (5, 6),
    (6, 7),
    (1, 14),
    (14, 8),
    (8, 9),
    (9, 10),
    (14, 11),
    (11, 12),
    (12, 13),
];

// RGB, one per body part.
const COCO_COLORS: &[(u8, u8, u8)] = &[
    (255, 0, 85),
    (255, 0, 0),
    (255, 85, 0),
    (255, 170, 0),
    (255, 255, 0),
    (170, 255, 0),
    (85, 255, 0),
    (0, 255, 0),
    (0, 255, 85),
    (0, 255, 170),
    (0, 255, 255),
    (0, 170, 255),
    (0, 85, 255),
    (0, 0, 255),
    (255, 0, 170),
    (170, 0, 255),
    (255, 0, 255),
    (85, 0, 255),
];

const MPI_COLORS: &[(u8, u8, u8)] = &[
    (255, 0, 85),
    (255, 0, 0),
    (255, 85, 0),
    (255, 170, 0),
    (255, 255, 0),
    (170, 255, 0),
    (85, 255, 0),
    (43, 255, 0),
    (0, 255, 0),
    (0, 255, 85),
    (0, 255, 170),
    (0, 255, 255),
    (0, 170, 255),
    (0, 85, 255),
    (0, 0, 255),
];

impl PoseModel {
    pub fn body_parts(&self) -> &'static [&'static str] {
        match self {
            PoseModel::Coco18 => COCO_BODY_PARTS,
            PoseModel::Mpi15 | PoseModel::Mpi15Four => MPI_BODY_PARTS,
        }
    }

    pub fn num_body_parts(&self) -> usize {
        self.body_parts().len()
    }

    /// Body parts plus the trailing background channel.
    pub fn heatmap_channels(&self) -> usize {
        self.num_body_parts() + 1
    }

    pub fn limbs(&self) -> &'static [(usize, usize)] {
        match self {
            PoseModel::Coco18 => COCO_LIMBS,
            PoseModel::Mpi15 | PoseModel::Mpi15Four => MPI_LIMBS,
        }
    }

    pub fn part_colors(&self) -> &'static [(u8, u8, u8)] {
        match self {
            PoseModel::Coco18 => COCO_COLORS,
            PoseModel::Mpi15 | PoseModel::Mpi15Four => MPI_COLORS,
        }
    }

    pub fn model_files(&self, model_folder: &Path) -> (PathBuf, PathBuf) {
        let (dir, prototxt, weights) = match self {
            PoseModel::Coco18 => (
                "pose/coco",
                "pose_deploy_linevec.prototxt",
                "pose_iter_440000.caffemodel",
            ),
            PoseModel::Mpi15 => (
                "pose/mpi",
                "pose_deploy_linevec.prototxt",
                "pose_iter_160000.caffemodel",
            ),
            PoseModel::Mpi15Four => (
                "pose/mpi",
                "pose_deploy_linevec_faster_4_stages.prototxt",
                "pose_iter_160000.caffemodel",
            ),
        };

        let dir = model_folder.join(dir);
        (dir.join(prototxt), dir.join(weights))
    }
}
